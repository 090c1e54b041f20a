//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic across a request's lifecycle:
//! - Request capture (snapshot taken early)
//! - Event recorder (classify, dedupe, write at response time)
//! - Maintenance scheduler (lazy retention pruning)
//! - Settings service (clamped configuration, re-read per operation)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod capture;
pub mod circuit_breaker;
pub mod dedupe;
pub mod maintenance;
pub mod metrics;
pub mod ports;
pub mod recorder;
pub mod settings;
