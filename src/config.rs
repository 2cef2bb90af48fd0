//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "PARKING_API_URL";

/// Environment variable holding the directory for persisted settings.
pub const SETTINGS_DIR_ENV: &str = "PARKING_SETTINGS_DIR";

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Timeout applied to every prediction-related request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for talking to the parking backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Directory for persisted settings. `None` keeps settings in memory.
    pub settings_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            settings_dir: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Self::default()
        }
    }

    /// Build a configuration from `PARKING_API_URL` and `PARKING_SETTINGS_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(API_URL_ENV)
            .filter(|s| !s.trim().is_empty())
            .map(normalize_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let settings_dir = lookup(SETTINGS_DIR_ENV)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            settings_dir,
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the settings directory.
    pub fn with_settings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings_dir = Some(dir.into());
        self
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000/api");
        assert_eq!(config.request_timeout, Duration::from_millis(10_000));
        assert!(config.settings_dir.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (API_URL_ENV, "https://parking.example.com/api/"),
            (SETTINGS_DIR_ENV, "/var/lib/parking"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url, "https://parking.example.com/api");
        assert_eq!(config.settings_dir, Some(PathBuf::from("/var/lib/parking")));
    }

    #[test]
    fn test_blank_env_falls_back() {
        let config = ClientConfig::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert!(config.settings_dir.is_none());
    }

    #[test]
    fn test_endpoint_join() {
        let config = ClientConfig::new("http://host:5000/api/");
        assert_eq!(config.endpoint("/free-slot"), "http://host:5000/api/free-slot");
        assert_eq!(
            config.endpoint("predict-availability"),
            "http://host:5000/api/predict-availability"
        );
    }
}
