//! Local configuration management.
//!
//! Config is stored at `~/.config/seatcap/config.toml` and contains:
//! - Instance-wide free-user cap settings
//! - Subscription portal connection details

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = "seatcap";
const CONFIG_FILE: &str = "config.toml";

/// Local configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Maximum billed users for a free root group (default: 5).
    #[serde(default = "default_dashboard_limit")]
    pub dashboard_limit: u64,

    /// Whether the free-user cap is enforced at all (default: true).
    #[serde(default = "default_true")]
    pub dashboard_limit_enabled: bool,

    /// Remaining seats at or below which a namespace counts as close to its limit.
    #[serde(default = "default_close_to_limit_threshold")]
    pub close_to_limit_threshold: u64,

    /// Expiry for the shared users-count cache entry. Unset means no expiry.
    #[serde(default)]
    pub users_count_cache_ttl_secs: Option<u64>,

    /// Base URL of the subscription portal.
    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,

    #[serde(default)]
    pub portal_admin_email: Option<String>,

    #[serde(default)]
    pub portal_admin_token: Option<String>,

    /// HTTP timeout for portal requests (default: 10).
    #[serde(default = "default_portal_timeout_secs")]
    pub portal_timeout_secs: u64,
}

fn default_dashboard_limit() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_close_to_limit_threshold() -> u64 {
    1
}

fn default_portal_base_url() -> String {
    "https://customers.example.com".to_string()
}

fn default_portal_timeout_secs() -> u64 {
    10
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dashboard_limit: default_dashboard_limit(),
            dashboard_limit_enabled: default_true(),
            close_to_limit_threshold: default_close_to_limit_threshold(),
            users_count_cache_ttl_secs: None,
            portal_base_url: default_portal_base_url(),
            portal_admin_email: None,
            portal_admin_token: None,
            portal_timeout_secs: default_portal_timeout_secs(),
        }
    }
}

impl LocalConfig {
    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&path, content).context("Failed to write config file")
    }

    /// Get the portal admin token as a SecretString.
    pub fn portal_admin_token_secret(&self) -> Option<SecretString> {
        self.portal_admin_token.clone().map(SecretString::from)
    }

    /// Check if portal credentials are configured.
    pub fn has_portal_credentials(&self) -> bool {
        let set = |v: &Option<String>| v.as_ref().is_some_and(|s| !s.is_empty());
        set(&self.portal_admin_email) && set(&self.portal_admin_token)
    }

    pub fn portal_timeout(&self) -> Duration {
        Duration::from_secs(self.portal_timeout_secs)
    }

    pub fn users_count_cache_ttl(&self) -> Option<Duration> {
        self.users_count_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Settings the cap enforcement reads.
    pub fn cap_settings(&self) -> CapSettings {
        CapSettings {
            enabled: self.dashboard_limit_enabled,
            limit: self.dashboard_limit,
            close_to_limit_threshold: self.close_to_limit_threshold,
            users_count_ttl: self.users_count_cache_ttl(),
        }
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}

/// Instance-wide free-user cap settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapSettings {
    pub enabled: bool,
    pub limit: u64,
    pub close_to_limit_threshold: u64,
    pub users_count_ttl: Option<Duration>,
}

impl Default for CapSettings {
    fn default() -> Self {
        LocalConfig::default().cap_settings()
    }
}
