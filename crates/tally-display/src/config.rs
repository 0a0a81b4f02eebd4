//! # Display Configuration
//!
//! Settings for a customer display process.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DISPLAY_ID=pole-1                                            │
//! │     TALLY_HUB_URL=ws://192.168.1.20:8766/ws                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/display.toml (Linux)                           │
//! │     ~/Library/Application Support/com.tally.pos/display.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [display]
//! id = "pole-1"
//! name = "Lane 1 customer screen"
//! dwell_ms = 5000
//!
//! [store]
//! id = "store-001"
//!
//! [hub]
//! url = "ws://192.168.1.20:8766/ws"
//! connect_timeout_secs = 10
//! initial_backoff_ms = 500
//! max_backoff_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{DisplayError, DisplayResult};
use crate::hub::DEFAULT_HUB_PORT;
use crate::protocol::{HelloPayload, DEFAULT_DWELL_MS};
use crate::transport::TransportConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Generated on first run if not provided.
    pub id: String,

    #[serde(default = "default_display_name")]
    pub name: String,

    /// Fallback dwell when a completed order does not carry one.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_display_name() -> String {
    "Customer Display".to_string()
}

fn default_dwell_ms() -> u64 {
    DEFAULT_DWELL_MS
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            id: format!("display-{}", Uuid::new_v4()),
            name: default_display_name(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub id: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            id: "default-store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_hub_url")]
    pub url: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// 0 retries forever.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_hub_url() -> String {
    format!("ws://127.0.0.1:{DEFAULT_HUB_PORT}/ws")
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            url: default_hub_url(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retries: 0,
        }
    }
}

// =============================================================================
// Display Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub hub: HubSettings,
}

impl DisplayConfig {
    /// Loads defaults, then the config file, then environment overrides.
    pub fn load(config_path: Option<PathBuf>) -> DisplayResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading display config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load display config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> DisplayResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DisplayError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Display config saved");
        Ok(())
    }

    pub fn validate(&self) -> DisplayResult<()> {
        if self.display.id.trim().is_empty() {
            return Err(DisplayError::InvalidConfig("display id must not be empty".into()));
        }
        if self.store.id.trim().is_empty() {
            return Err(DisplayError::InvalidConfig("store id must not be empty".into()));
        }

        let url = Url::parse(&self.hub.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(DisplayError::InvalidUrl(format!(
                "Hub URL must start with ws:// or wss://, got: {}",
                self.hub.url
            )));
        }

        if self.hub.initial_backoff_ms == 0 {
            return Err(DisplayError::InvalidConfig("initial_backoff_ms must be greater than 0".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_DISPLAY_ID") {
            debug!(display_id = %id, "Overriding display ID from environment");
            self.display.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_DISPLAY_NAME") {
            self.display.name = name;
        }

        if let Ok(id) = std::env::var("TALLY_STORE_ID") {
            self.store.id = id;
        }

        if let Ok(url) = std::env::var("TALLY_HUB_URL") {
            debug!(url = %url, "Overriding hub URL from environment");
            self.hub.url = url;
        }

        if let Ok(dwell) = std::env::var("TALLY_DWELL_MS") {
            match dwell.parse::<u64>() {
                Ok(ms) => self.display.dwell_ms = ms,
                Err(_) => warn!(value = %dwell, "Ignoring invalid TALLY_DWELL_MS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos").map(|dirs| dirs.config_dir().join("display.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.hub.url.clone(),
            connect_timeout: Duration::from_secs(self.hub.connect_timeout_secs),
            initial_backoff: Duration::from_millis(self.hub.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.hub.max_backoff_secs),
            max_retries: self.hub.max_retries,
        }
    }

    pub fn hello(&self) -> HelloPayload {
        HelloPayload::new(&self.display.id, &self.store.id)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.display.dwell_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DisplayConfig::default();
        assert!(config.display.id.starts_with("display-"));
        assert_eq!(config.display.dwell_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_validation() {
        let mut config = DisplayConfig::default();
        config.hub.url = "http://127.0.0.1:8766/ws".into();
        assert!(matches!(config.validate(), Err(DisplayError::InvalidUrl(_))));

        config.hub.url = "not a url".into();
        assert!(config.validate().is_err());

        config.hub.url = "wss://hub.local/ws".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: DisplayConfig = toml::from_str(
            r#"
            [display]
            id = "pole-1"

            [store]
            id = "store-9"
            "#,
        )
        .unwrap();

        assert_eq!(config.display.id, "pole-1");
        assert_eq!(config.display.dwell_ms, DEFAULT_DWELL_MS);
        assert_eq!(config.hello().store_id, "store-9");
        assert_eq!(config.transport_config().initial_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&DisplayConfig::default()).unwrap();
        assert!(toml_str.contains("[display]"));
        assert!(toml_str.contains("[hub]"));
    }
}
