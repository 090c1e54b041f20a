//! Request classification rules.
//!
//! Two independent detectors run on every served request:
//! - Search-crawler detection by user-agent substring
//! - Risk detection by status code, probed path and scanner user-agent
//!
//! A request recognised as a crawler is never evaluated for risk.
//!
//! All matching is ASCII case-insensitive substring search over `static`
//! tables. Nothing here allocates, so the cost on the request path is a few
//! byte comparisons.

use crate::domain::event::{Category, RiskLevel};
use std::fmt;

/// Known crawlers, in evaluation order.
///
/// Each entry maps the stored crawler name to the user-agent needles that
/// identify it. The first entry with a matching needle wins.
pub static SEARCH_BOTS: &[(&str, &[&str])] = &[
    ("Googlebot", &["Googlebot"]),
    ("bingbot", &["bingbot"]),
    ("Slurp", &["Slurp"]),
    ("YandexBot", &["YandexBot"]),
    ("DuckDuckBot", &["DuckDuckBot"]),
];

/// Paths that only vulnerability probes ask for.
pub static SENSITIVE_PATHS: &[&str] = &[
    "/.env",
    "/wp-login.php",
    "/xmlrpc.php",
    "/wp-admin/",
    "/phpmyadmin",
    "/cgi-bin",
    "/actuator",
    "/vendor/",
    "/solr/",
    "/boaform",
    "/HNAP1",
    "/manager/html",
    "/server-status",
];

/// User-agent fragments of common scanning tools.
pub static SCANNER_TOOLS: &[&str] = &[
    "sqlmap",
    "acunetix",
    "nikto",
    "nmap",
    "masscan",
    "zgrab",
    "fuzz",
    "dirbuster",
];

/// Statuses emitted by edge proxies when the origin misbehaves.
const EDGE_STATUSES: &[u16] = &[444, 520, 521, 522, 523, 524, 525, 526];

/// Client-error statuses worth a mid-level record.
const CLIENT_ERROR_STATUSES: &[u16] = &[401, 403, 404];

/// Which risk rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskTag {
    /// Server error (status >= 500)
    Status5xx,
    /// Edge/proxy specific status (444, 520-526)
    StatusEdge,
    /// Request for a known sensitive path
    ProbePath,
    /// Unauthorized, forbidden or not found
    Status4xx,
    /// Scanner user-agent
    UaTool,
}

impl RiskTag {
    /// Tag as stored in the `subtype` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTag::Status5xx => "status_5xx",
            RiskTag::StatusEdge => "status_edge",
            RiskTag::ProbePath => "probe_path",
            RiskTag::Status4xx => "status_4xx",
            RiskTag::UaTool => "ua_tool",
        }
    }
}

impl fmt::Display for RiskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// A known search crawler, by name.
    Search(&'static str),
    /// Suspicious traffic. The level is never `RiskLevel::None`.
    Risk(RiskLevel, RiskTag),
}

impl Classification {
    /// Event category for this classification.
    pub fn category(&self) -> Category {
        match self {
            Classification::Search(_) => Category::Search,
            Classification::Risk(..) => Category::Risk,
        }
    }

    /// Crawler name or risk tag.
    pub fn subtype(&self) -> &'static str {
        match self {
            Classification::Search(name) => name,
            Classification::Risk(_, tag) => tag.as_str(),
        }
    }

    /// Risk level, `None` for crawlers.
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Classification::Search(_) => RiskLevel::None,
            Classification::Risk(level, _) => *level,
        }
    }
}

/// ASCII case-insensitive substring test.
#[inline]
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();

    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }

    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Match a user-agent against the crawler table.
///
/// Returns the crawler name of the first matching entry. An empty
/// user-agent never matches.
pub fn classify_search_bot(user_agent: &str) -> Option<&'static str> {
    if user_agent.is_empty() {
        return None;
    }

    SEARCH_BOTS
        .iter()
        .find(|(_, needles)| {
            needles
                .iter()
                .any(|needle| contains_ignore_ascii_case(user_agent, needle))
        })
        .map(|(name, _)| *name)
}

/// Evaluate the risk rules in priority order.
///
/// The first rule that matches decides; later rules are not consulted.
pub fn classify_risk(status: u16, path: &str, user_agent: &str) -> Option<(RiskLevel, RiskTag)> {
    if status >= 500 {
        return Some((RiskLevel::High, RiskTag::Status5xx));
    }

    if EDGE_STATUSES.contains(&status) {
        return Some((RiskLevel::High, RiskTag::StatusEdge));
    }

    if SENSITIVE_PATHS
        .iter()
        .any(|probe| contains_ignore_ascii_case(path, probe))
    {
        return Some((RiskLevel::High, RiskTag::ProbePath));
    }

    if CLIENT_ERROR_STATUSES.contains(&status) {
        return Some((RiskLevel::Mid, RiskTag::Status4xx));
    }

    if !user_agent.is_empty()
        && SCANNER_TOOLS
            .iter()
            .any(|tool| contains_ignore_ascii_case(user_agent, tool))
    {
        return Some((RiskLevel::Mid, RiskTag::UaTool));
    }

    None
}

/// Classify a finished request.
///
/// Crawler detection takes precedence: a crawler hitting a probe path or
/// receiving a 404 is still recorded as search traffic.
pub fn classify(status: u16, path: &str, user_agent: &str) -> Option<Classification> {
    if let Some(name) = classify_search_bot(user_agent) {
        return Some(Classification::Search(name));
    }

    classify_risk(status, path, user_agent).map(|(level, tag)| Classification::Risk(level, tag))
}
