//! Request capture.
//!
//! Runs early in the request lifecycle and snapshots the attributes the
//! recorder needs once the response status is known.

use crate::domain::request::{PendingCapture, RequestKind, RequestParts};
use crate::domain::settings::Settings;
use chrono::{DateTime, Utc};
use std::net::{IpAddr, SocketAddr};

/// Snapshots visitor requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCapture;

impl RequestCapture {
    /// Snapshot `request` if it is worth classifying later.
    ///
    /// Returns `None` for admin, cron and async requests, for requests
    /// without a user-agent, and when no client IP can be resolved.
    pub fn capture(
        request: &RequestParts,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Option<PendingCapture> {
        if request.kind != RequestKind::Visitor {
            return None;
        }

        let user_agent = request.user_agent.as_deref().filter(|ua| !ua.is_empty())?;
        let ip = resolve_client_ip(request, settings.trust_proxy)?;

        Some(PendingCapture {
            captured_at: now,
            ip,
            user_agent: user_agent.to_string(),
            path: strip_query(&request.uri).to_string(),
            settings: *settings,
        })
    }
}

/// Resolve the client address.
///
/// Without `trust_proxy` only the peer address counts. With it, the CDN
/// header wins over `X-Forwarded-For`, which wins over the peer. Header
/// values that are empty or not an IP literal fall through to the next
/// candidate.
pub fn resolve_client_ip(request: &RequestParts, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = [
            request.cdn_client_ip.as_deref(),
            request.forwarded_for.as_deref(),
        ];
        if let Some(ip) = forwarded.into_iter().flatten().find_map(first_ip) {
            return Some(ip.to_string());
        }
    }

    request.peer_addr.as_deref().and_then(peer_ip).map(|ip| ip.to_string())
}

/// First comma-separated entry of a header value, if it is an IP literal.
fn first_ip(value: &str) -> Option<IpAddr> {
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    first.parse().ok()
}

/// Peer addresses may come with a port attached.
fn peer_ip(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Path without query string; `/` when nothing is left.
pub fn strip_query(uri: &str) -> &str {
    match uri.split('?').next() {
        Some(path) if !path.is_empty() => path,
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> RequestParts {
        RequestParts::new("/page?utm=1")
            .with_peer_addr("192.0.2.10")
            .with_user_agent("Mozilla/5.0")
    }

    fn trusting() -> Settings {
        Settings {
            trust_proxy: true,
            ..Settings::default()
        }
    }

    #[test]
    fn test_capture_visitor_request() {
        let now = Utc::now();
        let pending = RequestCapture::capture(&visitor(), &Settings::default(), now).unwrap();

        assert_eq!(pending.captured_at, now);
        assert_eq!(pending.ip, "192.0.2.10");
        assert_eq!(pending.user_agent, "Mozilla/5.0");
        assert_eq!(pending.path, "/page");
        assert_eq!(pending.settings, Settings::default());
    }

    #[test]
    fn test_non_visitor_requests_are_skipped() {
        for kind in [RequestKind::Admin, RequestKind::Cron, RequestKind::Async] {
            let request = visitor().with_kind(kind);
            assert!(RequestCapture::capture(&request, &Settings::default(), Utc::now()).is_none());
        }
    }

    #[test]
    fn test_missing_or_empty_user_agent_is_skipped() {
        let mut request = visitor();
        request.user_agent = None;
        assert!(RequestCapture::capture(&request, &Settings::default(), Utc::now()).is_none());

        let request = visitor().with_user_agent("");
        assert!(RequestCapture::capture(&request, &Settings::default(), Utc::now()).is_none());
    }

    #[test]
    fn test_missing_ip_is_skipped() {
        let mut request = visitor();
        request.peer_addr = None;
        assert!(RequestCapture::capture(&request, &Settings::default(), Utc::now()).is_none());
    }

    #[test]
    fn test_untrusted_proxy_headers_are_ignored() {
        let request = visitor()
            .with_cdn_client_ip("198.51.100.1")
            .with_forwarded_for("203.0.113.5");
        assert_eq!(
            resolve_client_ip(&request, false).as_deref(),
            Some("192.0.2.10")
        );
    }

    #[test]
    fn test_trusted_proxy_header_precedence() {
        let both = visitor()
            .with_cdn_client_ip("198.51.100.1")
            .with_forwarded_for("203.0.113.5");
        assert_eq!(resolve_client_ip(&both, true).as_deref(), Some("198.51.100.1"));

        let forwarded = visitor().with_forwarded_for("203.0.113.5, 10.0.0.1");
        assert_eq!(
            resolve_client_ip(&forwarded, true).as_deref(),
            Some("203.0.113.5")
        );

        assert_eq!(resolve_client_ip(&visitor(), true).as_deref(), Some("192.0.2.10"));

        let pending = RequestCapture::capture(&both, &trusting(), Utc::now()).unwrap();
        assert_eq!(pending.ip, "198.51.100.1");
        assert!(pending.settings.trust_proxy);
    }

    #[test]
    fn test_invalid_header_values_fall_through() {
        let request = visitor()
            .with_cdn_client_ip("  ")
            .with_forwarded_for("unknown, 203.0.113.5");
        assert_eq!(
            resolve_client_ip(&request, true).as_deref(),
            Some("192.0.2.10")
        );

        let request = visitor()
            .with_cdn_client_ip("not-an-ip")
            .with_forwarded_for(" 2001:db8::1 ,10.0.0.1");
        assert_eq!(
            resolve_client_ip(&request, true).as_deref(),
            Some("2001:db8::1")
        );
    }

    #[test]
    fn test_peer_with_port() {
        let request = visitor().with_peer_addr("192.0.2.10:51234");
        assert_eq!(resolve_client_ip(&request, false).as_deref(), Some("192.0.2.10"));

        let request = visitor().with_peer_addr("[2001:db8::2]:443");
        assert_eq!(resolve_client_ip(&request, false).as_deref(), Some("2001:db8::2"));
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("/a/b?x=1&y=2"), "/a/b");
        assert_eq!(strip_query("/plain"), "/plain");
        assert_eq!(strip_query(""), "/");
        assert_eq!(strip_query("?only=query"), "/");
    }
}
