//! Runtime settings and their clamping rules.
//!
//! Stored settings are never trusted: every value passes through
//! [`Settings::from_raw`] on the way in, which fills defaults and clamps
//! numbers into range. Nothing in this module returns an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Allowed retention window, in days.
pub const DAYS_KEEP_RANGE: (i64, i64) = (7, 365);

/// Allowed dedupe window, in seconds.
pub const DEDUPE_TTL_RANGE: (i64, i64) = (10, 600);

/// Page sizes the admin surface offers.
pub const PER_PAGE_CHOICES: [u32; 4] = [100, 200, 500, 1000];

pub const DEFAULT_DAYS_KEEP: u32 = 30;
pub const DEFAULT_PER_PAGE: u32 = 200;
pub const DEFAULT_DEDUPE_TTL: u32 = 60;

/// Validated settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Honour CDN / forwarded-for headers when resolving the client IP.
    pub trust_proxy: bool,
    /// Retention window in days, 7..=365.
    pub days_keep: u32,
    /// Page size for listings, one of [`PER_PAGE_CHOICES`].
    pub per_page: u32,
    /// Dedupe window in seconds, 10..=600.
    pub dedupe_ttl: u32,
    /// Whether repeated events are suppressed.
    pub enable_dedupe: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            days_keep: DEFAULT_DAYS_KEEP,
            per_page: DEFAULT_PER_PAGE,
            dedupe_ttl: DEFAULT_DEDUPE_TTL,
            enable_dedupe: true,
        }
    }
}

impl Settings {
    /// Build settings from raw values, falling back to defaults.
    pub fn from_raw(raw: &RawSettings) -> Self {
        Self::default().merged(raw)
    }

    /// Apply the fields present in `raw` on top of `self`, then clamp.
    ///
    /// Fields absent from `raw`, or present but unparseable, keep their
    /// current value.
    pub fn merged(&self, raw: &RawSettings) -> Self {
        let trust_proxy = raw.trust_proxy.as_ref().map_or(self.trust_proxy, as_flag);
        let enable_dedupe = raw
            .enable_dedupe
            .as_ref()
            .map_or(self.enable_dedupe, as_flag);

        let days_keep = raw
            .days_keep
            .as_ref()
            .and_then(as_int)
            .unwrap_or(i64::from(self.days_keep));
        let per_page = raw
            .per_page
            .as_ref()
            .and_then(as_int)
            .unwrap_or(i64::from(self.per_page));
        let dedupe_ttl = raw
            .dedupe_ttl
            .as_ref()
            .and_then(as_int)
            .unwrap_or(i64::from(self.dedupe_ttl));

        Self {
            trust_proxy,
            days_keep: clamp(days_keep, DAYS_KEEP_RANGE),
            per_page: snap_per_page(per_page),
            dedupe_ttl: clamp(dedupe_ttl, DEDUPE_TTL_RANGE),
            enable_dedupe,
        }
    }

    /// Re-apply range rules to an already typed value.
    pub fn clamped(self) -> Self {
        Self {
            days_keep: clamp(i64::from(self.days_keep), DAYS_KEEP_RANGE),
            per_page: snap_per_page(i64::from(self.per_page)),
            dedupe_ttl: clamp(i64::from(self.dedupe_ttl), DEDUPE_TTL_RANGE),
            ..self
        }
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.dedupe_ttl))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.days_keep))
    }

    /// Raw form with every field present, for persisting.
    pub fn to_raw(&self) -> RawSettings {
        RawSettings {
            trust_proxy: Some(Value::Bool(self.trust_proxy)),
            days_keep: Some(Value::from(self.days_keep)),
            per_page: Some(Value::from(self.per_page)),
            dedupe_ttl: Some(Value::from(self.dedupe_ttl)),
            enable_dedupe: Some(Value::Bool(self.enable_dedupe)),
        }
    }
}

/// Partial, loosely typed settings as submitted by the admin surface or
/// read back from storage.
///
/// Values may be JSON numbers, numeric strings or booleans; they are
/// interpreted leniently by [`Settings::merged`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_proxy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_keep: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_ttl: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dedupe: Option<Value>,
}

impl RawSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust_proxy(mut self, value: impl Into<Value>) -> Self {
        self.trust_proxy = Some(value.into());
        self
    }

    pub fn days_keep(mut self, value: impl Into<Value>) -> Self {
        self.days_keep = Some(value.into());
        self
    }

    pub fn per_page(mut self, value: impl Into<Value>) -> Self {
        self.per_page = Some(value.into());
        self
    }

    pub fn dedupe_ttl(mut self, value: impl Into<Value>) -> Self {
        self.dedupe_ttl = Some(value.into());
        self
    }

    pub fn enable_dedupe(mut self, value: impl Into<Value>) -> Self {
        self.enable_dedupe = Some(value.into());
        self
    }

    /// Parse stored JSON. Input that does not deserialize yields empty
    /// settings, which then resolve to defaults.
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }
}

fn clamp(value: i64, (min, max): (i64, i64)) -> u32 {
    // Both bounds fit in u32.
    value.clamp(min, max) as u32
}

fn snap_per_page(value: i64) -> u32 {
    PER_PAGE_CHOICES
        .iter()
        .copied()
        .find(|choice| i64::from(*choice) == value)
        .unwrap_or(DEFAULT_PER_PAGE)
}

/// Truthiness of a loosely typed flag.
fn as_flag(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty()
                || s == "0"
                || s.eq_ignore_ascii_case("false")
                || s.eq_ignore_ascii_case("off"))
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Integer value of a number or numeric string.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_raw(&RawSettings::default());
        assert_eq!(settings, Settings::default());
        assert!(!settings.trust_proxy);
        assert_eq!(settings.days_keep, 30);
        assert_eq!(settings.per_page, 200);
        assert_eq!(settings.dedupe_ttl, 60);
        assert!(settings.enable_dedupe);
    }

    #[test]
    fn test_days_keep_clamped() {
        assert_eq!(Settings::from_raw(&RawSettings::new().days_keep(1)).days_keep, 7);
        assert_eq!(Settings::from_raw(&RawSettings::new().days_keep(9000)).days_keep, 365);
        assert_eq!(Settings::from_raw(&RawSettings::new().days_keep(-5)).days_keep, 7);
        assert_eq!(Settings::from_raw(&RawSettings::new().days_keep(90)).days_keep, 90);
    }

    #[test]
    fn test_dedupe_ttl_clamped() {
        assert_eq!(Settings::from_raw(&RawSettings::new().dedupe_ttl(0)).dedupe_ttl, 10);
        assert_eq!(Settings::from_raw(&RawSettings::new().dedupe_ttl(3600)).dedupe_ttl, 600);
        assert_eq!(Settings::from_raw(&RawSettings::new().dedupe_ttl(120)).dedupe_ttl, 120);
    }

    #[test]
    fn test_per_page_snaps_to_default() {
        for choice in PER_PAGE_CHOICES {
            assert_eq!(
                Settings::from_raw(&RawSettings::new().per_page(choice)).per_page,
                choice
            );
        }
        assert_eq!(Settings::from_raw(&RawSettings::new().per_page(250)).per_page, 200);
        assert_eq!(Settings::from_raw(&RawSettings::new().per_page(0)).per_page, 200);
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let raw = RawSettings::new()
            .days_keep("45")
            .per_page(" 500 ")
            .dedupe_ttl("30");
        let settings = Settings::from_raw(&raw);
        assert_eq!(settings.days_keep, 45);
        assert_eq!(settings.per_page, 500);
        assert_eq!(settings.dedupe_ttl, 30);
    }

    #[test]
    fn test_garbage_keeps_current_value() {
        let current = Settings {
            days_keep: 90,
            ..Settings::default()
        };
        let raw = RawSettings::new().days_keep("ninety").dedupe_ttl(json!([1, 2]));
        let merged = current.merged(&raw);
        assert_eq!(merged.days_keep, 90);
        assert_eq!(merged.dedupe_ttl, 60);
    }

    #[test]
    fn test_flags_are_lenient() {
        let on = Settings::from_raw(&RawSettings::new().trust_proxy("1").enable_dedupe(1));
        assert!(on.trust_proxy);
        assert!(on.enable_dedupe);

        let off = Settings::from_raw(&RawSettings::new().trust_proxy(0).enable_dedupe("0"));
        assert!(!off.trust_proxy);
        assert!(!off.enable_dedupe);

        let off = Settings::from_raw(&RawSettings::new().enable_dedupe(Value::Null));
        assert!(!off.enable_dedupe);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let current = Settings {
            trust_proxy: true,
            days_keep: 14,
            per_page: 1000,
            dedupe_ttl: 300,
            enable_dedupe: false,
        };
        let merged = current.merged(&RawSettings::new().per_page(100));
        assert_eq!(
            merged,
            Settings {
                per_page: 100,
                ..current
            }
        );
    }

    #[test]
    fn test_from_json_tolerates_bad_input() {
        assert_eq!(RawSettings::from_json("not json"), RawSettings::default());
        assert_eq!(RawSettings::from_json("42"), RawSettings::default());

        let raw = RawSettings::from_json(r#"{"days_keep":"400","unknown":true}"#);
        assert_eq!(Settings::from_raw(&raw).days_keep, 365);
    }

    #[test]
    fn test_to_raw_round_trips() {
        let settings = Settings {
            trust_proxy: true,
            days_keep: 100,
            per_page: 500,
            dedupe_ttl: 45,
            enable_dedupe: false,
        };
        let json = serde_json::to_string(&settings.to_raw()).unwrap();
        assert_eq!(Settings::from_raw(&RawSettings::from_json(&json)), settings);
    }

    #[test]
    fn test_clamped_repairs_typed_values() {
        let settings = Settings {
            days_keep: 1,
            per_page: 3,
            dedupe_ttl: 100_000,
            ..Settings::default()
        };
        let clamped = settings.clamped();
        assert_eq!(clamped.days_keep, 7);
        assert_eq!(clamped.per_page, 200);
        assert_eq!(clamped.dedupe_ttl, 600);
    }

    #[test]
    fn test_durations() {
        let settings = Settings::default();
        assert_eq!(settings.dedupe_window(), Duration::from_secs(60));
        assert_eq!(settings.retention(), chrono::Duration::days(30));
    }
}
