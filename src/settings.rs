//! Prediction settings store.
//!
//! A single source of truth for whether predictions run and how often. The
//! store is constructed once and shared by reference; every consumer observes
//! writes through a [`watch`] subscription.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::callback::{on_watch_change, CallbackHandle};
use crate::error::{Error, Result};

/// Key the settings are persisted under.
pub const STORAGE_KEY: &str = "parking-prediction-settings";

/// Default refresh interval in milliseconds.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// Refresh cadences offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefreshCadence {
    /// Every 15 seconds.
    FifteenSeconds,
    /// Every 30 seconds.
    #[default]
    ThirtySeconds,
    /// Every minute.
    OneMinute,
    /// Every two minutes.
    TwoMinutes,
}

impl RefreshCadence {
    /// All cadences, shortest first.
    pub const ALL: [RefreshCadence; 4] = [
        Self::FifteenSeconds,
        Self::ThirtySeconds,
        Self::OneMinute,
        Self::TwoMinutes,
    ];

    /// Interval in milliseconds.
    pub fn as_millis(&self) -> u64 {
        match self {
            Self::FifteenSeconds => 15_000,
            Self::ThirtySeconds => 30_000,
            Self::OneMinute => 60_000,
            Self::TwoMinutes => 120_000,
        }
    }

    /// Look up the cadence for an interval, if it is one of the allowed values.
    pub fn from_millis(ms: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_millis() == ms)
    }

    /// Get a human-readable name for this cadence.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FifteenSeconds => "15 seconds",
            Self::ThirtySeconds => "30 seconds",
            Self::OneMinute => "1 minute",
            Self::TwoMinutes => "2 minutes",
        }
    }
}

/// Global prediction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSettings {
    /// Whether predictions run at all.
    pub enabled: bool,
    /// Polling interval in milliseconds. Always positive.
    #[serde(rename = "refreshInterval")]
    pub refresh_interval_ms: u64,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

impl PredictionSettings {
    /// Polling interval as a duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// The matching cadence, if the interval is one of the offered values.
    pub fn cadence(&self) -> Option<RefreshCadence> {
        RefreshCadence::from_millis(self.refresh_interval_ms)
    }
}

/// Durable key-value storage for settings.
pub trait SettingsStorage: Send + Sync {
    /// Read the raw value for `key`, if any.
    fn read(&self, key: &str) -> Option<String>;

    /// Replace the raw value for `key`.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the settings files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStorage for FileStorage {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// In-process storage, for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Persisted, observable prediction settings.
pub struct SettingsStore {
    storage: Arc<dyn SettingsStorage>,
    settings_tx: watch::Sender<PredictionSettings>,
}

impl SettingsStore {
    /// Load settings from `storage`, falling back to defaults when the stored
    /// value is absent, unparsable, or has a zero interval.
    pub fn load(storage: Arc<dyn SettingsStorage>) -> Self {
        let settings = Self::read_settings(storage.as_ref());
        debug!(
            "Loaded prediction settings: enabled={}, interval={}ms",
            settings.enabled, settings.refresh_interval_ms
        );
        let (settings_tx, _) = watch::channel(settings);
        Self {
            storage,
            settings_tx,
        }
    }

    /// Create a store backed by a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStorage::new()))
    }

    fn read_settings(storage: &dyn SettingsStorage) -> PredictionSettings {
        let Some(raw) = storage.read(STORAGE_KEY) else {
            return PredictionSettings::default();
        };
        match serde_json::from_str::<PredictionSettings>(&raw) {
            Ok(settings) if settings.refresh_interval_ms > 0 => settings,
            Ok(_) => {
                warn!("Stored refresh interval is zero, using defaults");
                PredictionSettings::default()
            }
            Err(e) => {
                warn!("Stored prediction settings unreadable, using defaults: {}", e);
                PredictionSettings::default()
            }
        }
    }

    /// Get the current settings.
    pub fn get(&self) -> PredictionSettings {
        *self.settings_tx.borrow()
    }

    /// Check if predictions are enabled.
    pub fn is_enabled(&self) -> bool {
        self.settings_tx.borrow().enabled
    }

    /// Subscribe to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<PredictionSettings> {
        self.settings_tx.subscribe()
    }

    /// Register a callback for settings changes.
    pub fn on_settings_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&PredictionSettings) + Send + Sync + 'static,
    {
        on_watch_change(self.subscribe(), callback)
    }

    /// Flip `enabled`.
    pub fn toggle(&self) -> PredictionSettings {
        let updated = self.update(|s| s.enabled = !s.enabled);
        info!(
            "Predictions {}",
            if updated.enabled { "enabled" } else { "disabled" }
        );
        updated
    }

    /// Set `enabled` explicitly.
    pub fn set_enabled(&self, enabled: bool) -> PredictionSettings {
        self.update(|s| s.enabled = enabled)
    }

    /// Replace the refresh interval.
    pub fn set_refresh_interval(&self, cadence: RefreshCadence) -> PredictionSettings {
        info!("Prediction refresh interval set to {}", cadence.label());
        self.update(|s| s.refresh_interval_ms = cadence.as_millis())
    }

    /// Replace the refresh interval from raw milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless `ms` is one of
    /// 15000, 30000, 60000 or 120000.
    pub fn set_refresh_interval_ms(&self, ms: u64) -> Result<PredictionSettings> {
        let cadence = RefreshCadence::from_millis(ms).ok_or_else(|| Error::InvalidParameter {
            name: "refresh_interval_ms".to_string(),
            value: ms.to_string(),
        })?;
        Ok(self.set_refresh_interval(cadence))
    }

    fn update(&self, mutate: impl FnOnce(&mut PredictionSettings)) -> PredictionSettings {
        self.settings_tx.send_modify(mutate);
        let settings = self.get();
        self.persist(&settings);
        settings
    }

    fn persist(&self, settings: &PredictionSettings) {
        let result = serde_json::to_string(settings)
            .map_err(Error::from)
            .and_then(|raw| self.storage.write(STORAGE_KEY, &raw));
        if let Err(e) = result {
            warn!("Failed to persist prediction settings: {}", e);
        }
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("settings", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FailingStorage;

    impl SettingsStorage for FailingStorage {
        fn read(&self, _key: &str) -> Option<String> {
            None
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Storage(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn test_defaults_on_first_access() {
        let store = SettingsStore::in_memory();
        assert_eq!(
            store.get(),
            PredictionSettings {
                enabled: true,
                refresh_interval_ms: 30_000
            }
        );
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(STORAGE_KEY, "{not json").unwrap();
        let store = SettingsStore::load(storage);
        assert_eq!(store.get(), PredictionSettings::default());

        let storage = Arc::new(MemoryStorage::new());
        storage
            .write(STORAGE_KEY, r#"{"enabled":false,"refreshInterval":0}"#)
            .unwrap();
        let store = SettingsStore::load(storage);
        assert_eq!(store.get(), PredictionSettings::default());
    }

    #[test]
    fn test_reload_returns_persisted_value() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write(STORAGE_KEY, r#"{"enabled":false,"refreshInterval":30000}"#)
            .unwrap();

        let store = SettingsStore::load(storage);
        assert_eq!(
            store.get(),
            PredictionSettings {
                enabled: false,
                refresh_interval_ms: 30_000
            }
        );
    }

    #[test]
    fn test_writes_persist_and_round_trip() {
        let storage: Arc<dyn SettingsStorage> = Arc::new(MemoryStorage::new());
        let store = SettingsStore::load(storage.clone());

        store.toggle();
        let written = store.set_refresh_interval(RefreshCadence::TwoMinutes);

        let reloaded = SettingsStore::load(storage);
        assert_eq!(reloaded.get(), written);
        assert_eq!(
            written,
            PredictionSettings {
                enabled: false,
                refresh_interval_ms: 120_000
            }
        );
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().join("nested")));
        let store = SettingsStore::load(storage.clone());
        store.set_refresh_interval(RefreshCadence::FifteenSeconds);

        let raw = storage.read(STORAGE_KEY).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["refreshInterval"], 15_000);
        assert_eq!(json["enabled"], true);

        let reloaded = SettingsStore::load(storage);
        assert_eq!(reloaded.get().refresh_interval_ms, 15_000);
    }

    #[test]
    fn test_rejects_unlisted_interval() {
        let store = SettingsStore::in_memory();
        let err = store.set_refresh_interval_ms(45_000).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(store.get().refresh_interval_ms, 30_000);

        let settings = store.set_refresh_interval_ms(60_000).unwrap();
        assert_eq!(settings.cadence(), Some(RefreshCadence::OneMinute));
    }

    #[test]
    fn test_persistence_failure_is_not_surfaced() {
        let store = SettingsStore::load(Arc::new(FailingStorage));
        let settings = store.toggle();
        assert!(!settings.enabled);
        assert!(!store.is_enabled());
    }

    #[tokio::test]
    async fn test_subscribers_observe_writes() {
        let store = SettingsStore::in_memory();
        let mut rx = store.subscribe();

        store.toggle();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().enabled);

        store.set_refresh_interval(RefreshCadence::OneMinute);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_cadence_labels() {
        let labels: Vec<_> = RefreshCadence::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec!["15 seconds", "30 seconds", "1 minute", "2 minutes"]
        );
        assert_eq!(RefreshCadence::from_millis(1), None);
    }
}
