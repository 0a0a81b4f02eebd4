//! # Terminal Configuration
//!
//! Settings for one checkout lane.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_STORE_ID=store-001                                           │
//! │     TALLY_TAX_RATE=8.25                                                │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/terminal.toml (Linux)                          │
//! │     ~/Library/Application Support/com.tally.pos/terminal.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! id = "store-001"
//! name = "Corner Market"
//! tax_rate_bps = 825
//!
//! [checkout]
//! reserve_on_checkout = true
//! reservation_ttl_secs = 900
//!
//! [display]
//! bind_addr = "0.0.0.0"
//! port = 8766
//! dwell_ms = 5000
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tally_core::validation::validate_tax_rate_bps;
use tally_core::TaxRate;
use tally_db::DbConfig;
use tally_display::{HubConfig, DEFAULT_DWELL_MS, DEFAULT_HUB_PORT};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub id: String,

    /// Printed on receipts.
    #[serde(default = "default_store_name")]
    pub name: String,

    /// e.g. 825 = 8.25%
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,
}

fn default_store_name() -> String {
    "Tally Dev Store".to_string()
}

fn default_tax_rate_bps() -> u32 {
    825
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            id: "default-store".to_string(),
            name: default_store_name(),
            tax_rate_bps: default_tax_rate_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Hold stock for every line when payment is selected.
    #[serde(default = "default_true")]
    pub reserve_on_checkout: bool,

    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reservation_ttl() -> u64 {
    15 * 60
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            reserve_on_checkout: true,
            reservation_ttl_secs: default_reservation_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Generated on first run if not provided.
    #[serde(default = "default_terminal_id")]
    pub terminal_id: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a completed order stays on the customer display.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_terminal_id() -> String {
    format!("terminal-{}", Uuid::new_v4())
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_HUB_PORT
}

fn default_dwell_ms() -> u64 {
    DEFAULT_DWELL_MS
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            terminal_id: default_terminal_id(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

// =============================================================================
// Terminal Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl TerminalConfig {
    /// Loads defaults, then the config file, then environment overrides.
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
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
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Terminal config saved");
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.store.id.trim().is_empty() {
            return Err(EngineError::InvalidConfig("store id must not be empty".into()));
        }
        validate_tax_rate_bps(self.store.tax_rate_bps).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        if self.checkout.reservation_ttl_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "reservation_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.display.bind_addr.trim().is_empty() {
            return Err(EngineError::InvalidConfig("display bind_addr must not be empty".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_STORE_ID") {
            debug!(store_id = %id, "Overriding store ID from environment");
            self.store.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_STORE_NAME") {
            self.store.name = name;
        }

        // Percent, e.g. "8.25"
        if let Ok(rate) = std::env::var("TALLY_TAX_RATE") {
            match rate.parse::<f64>() {
                Ok(pct) => self.store.tax_rate_bps = TaxRate::from_percentage(pct).bps(),
                Err(_) => warn!(value = %rate, "Ignoring invalid TALLY_TAX_RATE"),
            }
        }

        if let Ok(flag) = std::env::var("TALLY_RESERVE_ON_CHECKOUT") {
            self.checkout.reserve_on_checkout = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(ttl) = std::env::var("TALLY_RESERVATION_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(secs) => self.checkout.reservation_ttl_secs = secs,
                Err(_) => warn!(value = %ttl, "Ignoring invalid TALLY_RESERVATION_TTL_SECS"),
            }
        }

        if let Ok(port) = std::env::var("TALLY_HUB_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.display.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid TALLY_HUB_PORT"),
            }
        }

        if let Ok(dwell) = std::env::var("TALLY_DWELL_MS") {
            match dwell.parse::<u64>() {
                Ok(ms) => self.display.dwell_ms = ms,
                Err(_) => warn!(value = %dwell, "Ignoring invalid TALLY_DWELL_MS"),
            }
        }

        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos").map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.store.tax_rate_bps)
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.checkout.reservation_ttl_secs).unwrap_or(i64::MAX / 1000))
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            port: self.display.port,
            bind_addr: self.display.bind_addr.clone(),
            terminal_id: self.display.terminal_id.clone(),
            store_id: self.store.id.clone(),
        }
    }

    /// Configured path, or `tally.db` in the platform data directory.
    pub fn database_path(&self) -> EngineResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "tally", "pos")
            .ok_or_else(|| EngineError::InvalidConfig("Could not determine app data directory".into()))?;
        std::fs::create_dir_all(dirs.data_dir())?;
        Ok(dirs.data_dir().join("tally.db"))
    }

    pub fn db_config(&self) -> EngineResult<DbConfig> {
        Ok(DbConfig::new(self.database_path()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TerminalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tax_rate().bps(), 825);
        assert_eq!(config.display.port, 8766);
        assert_eq!(config.display.dwell_ms, 5000);
        assert!(config.checkout.reserve_on_checkout);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TerminalConfig::default();
        config.checkout.reservation_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = TerminalConfig::default();
        config.store.id = "  ".into();
        assert!(config.validate().is_err());

        let mut config = TerminalConfig::default();
        config.store.tax_rate_bps = 1_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hub_config_carries_store_id() {
        let mut config = TerminalConfig::default();
        config.store.id = "store-7".into();
        config.display.port = 0;

        let hub = config.hub_config();
        assert_eq!(hub.store_id, "store-7");
        assert_eq!(hub.port, 0);
        assert!(hub.terminal_id.starts_with("terminal-"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TerminalConfig = toml::from_str(
            r#"
            [store]
            id = "store-1"

            [checkout]
            reservation_ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.store.name, "Tally Dev Store");
        assert_eq!(config.reservation_ttl(), chrono::Duration::seconds(60));
        assert!(config.checkout.reserve_on_checkout);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_configured_database_path_wins() {
        let mut config = TerminalConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/lane-3.db"));
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/lane-3.db"));
    }
}
