//! Logged events and the read-side views over them.

use crate::domain::classify::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level classification of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Known search crawler
    Search,
    /// Suspicious traffic
    Risk,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Search => "search",
            Category::Risk => "risk",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category or risk level name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {:?}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Category::Search),
            "risk" => Ok(Category::Risk),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Severity of a risk event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Not a risk event
    None,
    /// Worth a look
    Mid,
    /// Probe or server failure
    High,
}

impl RiskLevel {
    /// Stored form. `None` is stored as the empty string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "",
            RiskLevel::Mid => "mid",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::None => f.write_str("none"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(RiskLevel::None),
            "mid" => Ok(RiskLevel::Mid),
            "high" => Ok(RiskLevel::High),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// One classified request, as persisted.
///
/// Built only through [`Event::new`], which takes a [`Classification`], so
/// category, subtype and risk level are always consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub created_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub path: String,
    pub status: u16,
    pub category: Category,
    pub subtype: String,
    pub risk_level: RiskLevel,
}

impl Event {
    pub fn new(
        classification: Classification,
        created_at: DateTime<Utc>,
        ip: impl Into<String>,
        user_agent: impl Into<String>,
        path: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            created_at,
            ip: ip.into(),
            user_agent: user_agent.into(),
            path: path.into(),
            status,
            category: classification.category(),
            subtype: classification.subtype().to_string(),
            risk_level: classification.risk_level(),
        }
    }
}

/// An event together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: Event,
}

/// Filter for listing events. Every criterion is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub category: Option<Category>,
    /// Exact status match. `Some(0)` is treated like `None`.
    pub status: Option<u16>,
    /// Substring searched in user-agent, path, ip and subtype.
    pub text: Option<String>,
}

impl EventFilter {
    /// Filter that matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Build a filter from loosely-typed admin input.
    ///
    /// Unknown categories and non-positive statuses are dropped; blank text
    /// is ignored.
    pub fn from_params(category: Option<&str>, status: Option<i64>, text: Option<&str>) -> Self {
        Self {
            category: category.and_then(|c| c.trim().parse().ok()),
            status: status
                .filter(|s| *s > 0)
                .and_then(|s| u16::try_from(s).ok()),
            text: text
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    /// Status criterion, with `0` normalised away.
    pub fn effective_status(&self) -> Option<u16> {
        self.status.filter(|s| *s > 0)
    }

    /// Text criterion, with blank text normalised away.
    pub fn effective_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Number of stored events per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub search: u64,
    pub risk: u64,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Search => self.search,
            Category::Risk => self.risk,
        }
    }

    pub fn total(&self) -> u64 {
        self.search.saturating_add(self.risk)
    }
}

/// Number of search events for one crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtypeCount {
    pub subtype: String,
    pub count: u64,
}

/// Dashboard numbers for the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightSummary {
    pub by_category: CategoryCounts,
    /// Search events per crawler, most frequent first.
    pub search_by_subtype: Vec<SubtypeCount>,
}
