//! Domain layer - pure business logic with no I/O.
//!
//! This layer contains the core concepts and invariants of bot insight:
//! - Request classification rules
//! - Event records and read-side views
//! - Settings and their clamping rules
//! - Dedupe key computation
//! - Request/response attributes and the captured snapshot
//!
//! All types in this layer are pure and easily testable.

pub mod classify;
pub mod event;
pub mod request;
pub mod settings;
pub mod signature;
