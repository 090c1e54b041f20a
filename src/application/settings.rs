//! Settings persistence.

use crate::application::ports::{OptionStore, StoreError};
use crate::domain::settings::{RawSettings, Settings};
use std::sync::Arc;

/// Option name the settings are stored under, as JSON.
pub const SETTINGS_OPTION: &str = "settings";

/// Loads and saves [`Settings`] through an [`OptionStore`].
///
/// Stored values are never trusted: every load re-reads and re-clamps them,
/// so a save made through another handle on the same store takes effect on
/// the next operation.
#[derive(Debug)]
pub struct SettingsService {
    options: Arc<dyn OptionStore>,
}

impl SettingsService {
    pub fn new(options: Arc<dyn OptionStore>) -> Self {
        Self { options }
    }

    /// Current settings.
    ///
    /// A read failure yields the defaults.
    pub fn load(&self) -> Settings {
        match self.options.get(SETTINGS_OPTION) {
            Ok(Some(json)) => Settings::from_raw(&RawSettings::from_json(&json)),
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Merge the fields present in `raw` onto the current settings, clamp,
    /// persist and return the result.
    pub fn save(&self, raw: &RawSettings) -> Result<Settings, StoreError> {
        let settings = self.load().merged(raw);
        let json = serde_json::to_string(&settings)
            .map_err(|e| StoreError::Backend(format!("failed to encode settings: {}", e)))?;

        self.options.set(SETTINGS_OPTION, &json)?;

        tracing::info!(
            trust_proxy = settings.trust_proxy,
            days_keep = settings.days_keep,
            per_page = settings.per_page,
            dedupe_ttl = settings.dedupe_ttl,
            enable_dedupe = settings.enable_dedupe,
            "Settings saved"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite::SqliteStore;

    fn service() -> (SettingsService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        (SettingsService::new(store.clone()), store)
    }

    #[test]
    fn test_load_defaults_when_unset() {
        let (service, _) = service();
        assert_eq!(service.load(), Settings::default());
    }

    #[test]
    fn test_load_clamps_stored_values() {
        let (service, store) = service();
        store
            .set(
                SETTINGS_OPTION,
                r#"{"days_keep":"3","per_page":250,"dedupe_ttl":9999,"trust_proxy":"1"}"#,
            )
            .unwrap();

        let settings = service.load();
        assert_eq!(settings.days_keep, 7);
        assert_eq!(settings.per_page, 200);
        assert_eq!(settings.dedupe_ttl, 600);
        assert!(settings.trust_proxy);
        assert!(settings.enable_dedupe);
    }

    #[test]
    fn test_garbage_option_falls_back_to_defaults() {
        let (service, store) = service();
        store.set(SETTINGS_OPTION, "not json").unwrap();
        assert_eq!(service.load(), Settings::default());
    }

    #[test]
    fn test_save_merges_and_persists() {
        let (service, store) = service();
        service
            .save(&RawSettings::new().days_keep(90).enable_dedupe(false))
            .unwrap();
        let saved = service.save(&RawSettings::new().per_page("500")).unwrap();

        assert_eq!(saved.days_keep, 90);
        assert_eq!(saved.per_page, 500);
        assert!(!saved.enable_dedupe);

        let fresh = SettingsService::new(store);
        assert_eq!(fresh.load(), saved);
    }

    #[test]
    fn test_saves_from_another_service_are_seen() {
        let (worker, store) = service();
        let admin = SettingsService::new(store.clone());
        assert!(!worker.load().trust_proxy);

        admin
            .save(&RawSettings::new().trust_proxy(true).enable_dedupe(false))
            .unwrap();
        let seen = worker.load();
        assert!(seen.trust_proxy);
        assert!(!seen.enable_dedupe);

        store.set(SETTINGS_OPTION, r#"{"days_keep":45}"#).unwrap();
        assert_eq!(worker.load().days_keep, 45);
    }
}
