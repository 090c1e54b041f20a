//! Request and response attributes supplied by the hosting framework.

use crate::domain::settings::Settings;
use chrono::{DateTime, Utc};

/// What kind of request the hosting framework is serving.
///
/// Only `Visitor` requests are captured; the others are not real visitor
/// traffic and would pollute the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestKind {
    /// Regular front-end request
    #[default]
    Visitor,
    /// Administrative interface
    Admin,
    /// Background/cron-triggered request
    Cron,
    /// Asynchronous in-page request
    Async,
}

/// Header name of the CDN-supplied client address.
pub const CDN_CLIENT_IP_HEADER: &str = "cf-connecting-ip";

/// Header name of the proxy forwarding chain.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Raw attributes of an inbound request.
///
/// Header values are passed as the framework received them; the capture
/// step decides which ones to trust.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    pub kind: RequestKind,
    /// Transport-layer peer address.
    pub peer_addr: Option<String>,
    pub user_agent: Option<String>,
    /// `CF-Connecting-IP` header.
    pub cdn_client_ip: Option<String>,
    /// `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
    /// Path and query, e.g. `/search?q=x`.
    pub uri: String,
}

impl RequestParts {
    /// Visitor request for `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_cdn_client_ip(mut self, value: impl Into<String>) -> Self {
        self.cdn_client_ip = Some(value.into());
        self
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// Set a header by (case-insensitive) name. Headers the capture step
    /// does not read are ignored.
    pub fn with_header(self, name: &str, value: impl Into<String>) -> Self {
        if name.eq_ignore_ascii_case("user-agent") {
            self.with_user_agent(value)
        } else if name.eq_ignore_ascii_case(CDN_CLIENT_IP_HEADER) {
            self.with_cdn_client_ip(value)
        } else if name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER) {
            self.with_forwarded_for(value)
        } else {
            self
        }
    }
}

/// What the hosting framework knows once the response is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseOutcome {
    /// Status code set on the response, if any.
    pub status: Option<u16>,
    /// The framework's routing decided nothing matched the request.
    pub not_found: bool,
}

impl ResponseOutcome {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            not_found: false,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: None,
            not_found: true,
        }
    }

    /// Status to log: 200 when nothing was set, 404 whenever routing
    /// reported not-found.
    pub fn final_status(&self) -> u16 {
        if self.not_found {
            return 404;
        }
        match self.status {
            Some(status) if status > 0 => status,
            _ => 200,
        }
    }
}

/// Request attributes captured early, waiting for the response status.
///
/// Carries the settings in effect at capture time so that the later flush
/// uses them even if an admin changes settings mid-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCapture {
    pub captured_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub path: String,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_defaults_to_ok() {
        assert_eq!(ResponseOutcome::default().final_status(), 200);
        assert_eq!(
            ResponseOutcome {
                status: Some(0),
                not_found: false
            }
            .final_status(),
            200
        );
    }

    #[test]
    fn test_final_status_uses_reported_status() {
        assert_eq!(ResponseOutcome::with_status(503).final_status(), 503);
    }

    #[test]
    fn test_not_found_overrides_status() {
        let outcome = ResponseOutcome {
            status: Some(200),
            not_found: true,
        };
        assert_eq!(outcome.final_status(), 404);
        assert_eq!(ResponseOutcome::not_found().final_status(), 404);
    }

    #[test]
    fn test_with_header_routes_known_names() {
        let parts = RequestParts::new("/")
            .with_header("User-Agent", "curl/8")
            .with_header("CF-Connecting-IP", "198.51.100.7")
            .with_header("X-Forwarded-For", "203.0.113.1, 10.0.0.1")
            .with_header("Accept", "*/*");

        assert_eq!(parts.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(parts.cdn_client_ip.as_deref(), Some("198.51.100.7"));
        assert_eq!(
            parts.forwarded_for.as_deref(),
            Some("203.0.113.1, 10.0.0.1")
        );
        assert_eq!(parts.kind, RequestKind::Visitor);
    }
}
