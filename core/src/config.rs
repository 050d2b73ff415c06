/// Client-side configuration for talking to the translation backend
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::DEFAULT_BACKEND_URL;
use crate::guard::GuardPolicy;
use crate::poller::PollerOptions;
use crate::router::RoutingPolicy;

const CONFIG_DIR_NAME: &str = "mod-sync";
const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    /// Hold a sleep inhibitor while a job runs.
    #[serde(default = "default_true")]
    pub keep_awake: bool,
    #[serde(default)]
    pub guard: GuardPolicy,
    #[serde(default)]
    pub routing: RoutingPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll_interval_ms: 1000,
            request_timeout_secs: 30,
            keep_awake: true,
            guard: GuardPolicy::default(),
            routing: RoutingPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// `<config dir>/mod-sync/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.json"))
    }

    /// `<config dir>/mod-sync/settings.json`
    pub fn settings_cache_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("settings.json"))
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse JSON config: {}", e))
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))
    }

    /// Missing file → defaults. A file that exists but does not parse is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_json(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
        fs::write(path, self.to_json()?).map_err(|e| format!("Failed to write config file: {}", e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poller_options(&self) -> PollerOptions {
        PollerOptions {
            interval: self.poll_interval(),
            guard: self.guard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.backend_url, "http://127.0.0.1:8000/api");
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.guard.max_rejections, None);
        assert!(!config.routing.package_after_sync);
        assert!(config.keep_awake);
    }

    #[test]
    fn test_json_serialization() {
        let mut config = ClientConfig::default();
        config.guard.max_rejections = Some(30);
        config.routing.package_after_sync = true;
        let json = config.to_json().unwrap();
        assert!(json.contains("pollIntervalMs"));
        assert!(json.contains("maxRejections"));
        assert_eq!(ClientConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let json = r#"{"backendUrl":"http://10.0.0.2:8000/api","pollIntervalMs":10,"requestTimeoutSecs":5}"#;
        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
        assert!(config.keep_awake);
        assert_eq!(config.guard, GuardPolicy::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mod-sync").join("config.json");
        assert_eq!(
            ClientConfig::load_from_file(&path).unwrap(),
            ClientConfig::default()
        );

        let mut config = ClientConfig::default();
        config.poll_interval_ms = 500;
        config.save_to_file(&path).unwrap();
        assert_eq!(ClientConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{").unwrap();
        assert!(ClientConfig::load_from_file(&path).is_err());
    }
}
