//! # Edge Configuration
//!
//! Configuration for the edge agent and its sync client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OUTPOST_AUTHORITY_URL=https://members.example.org                  │
//! │     OUTPOST_AUTHORITY_TOKEN=...                                        │
//! │     OUTPOST_STATE_DIR=/var/lib/outpost                                 │
//! │     OUTPOST_LOCAL_BIND=0.0.0.0:8088                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                               │
//! │     ~/.config/outpost/edge.toml (Linux)                                │
//! │     ~/Library/Application Support/org.outpost.outpost/edge.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [authority]
//! url = "https://members.example.org"
//! token = "0f3c..."
//! timeout_secs = 5
//!
//! [storage]
//! state_dir = "/var/lib/outpost"
//!
//! [sync]
//! pull_interval_ms = 1000
//! push_interval_ms = 500
//! batch_size = 100
//!
//! [controller]
//! interval_secs = 30
//!
//! [local_api]
//! bind_addr = "127.0.0.1:8088"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use outpost_core::MAX_EVENT_BATCH;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Authority
// =============================================================================

/// Where the authority lives and how to authenticate to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritySettings {
    /// Base URL, e.g. `https://members.example.org`.
    #[serde(default)]
    pub url: String,

    /// Bearer token issued by the authority.
    #[serde(default)]
    pub token: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    5
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        AuthoritySettings {
            url: String::new(),
            token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Local disk layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Holds `state.json` and the `events/` buffer.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            state_dir: default_state_dir(),
        }
    }
}

// =============================================================================
// Sync Loops
// =============================================================================

/// Pull and push loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between state pulls (milliseconds, jittered).
    #[serde(default = "default_pull_interval")]
    pub pull_interval_ms: u64,

    /// Interval between event pushes (milliseconds, jittered).
    #[serde(default = "default_push_interval")]
    pub push_interval_ms: u64,

    /// Maximum buffered events per `POST /events`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_pull_interval() -> u64 {
    1000
}

fn default_push_interval() -> u64 {
    500
}

fn default_batch_size() -> usize {
    MAX_EVENT_BATCH
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            pull_interval_ms: default_pull_interval(),
            push_interval_ms: default_push_interval(),
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Local Consumers
// =============================================================================

/// Access controller reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Reconcile at least this often even without a state change (seconds).
    #[serde(default = "default_controller_interval")]
    pub interval_secs: u64,
}

fn default_controller_interval() -> u64 {
    30
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            interval_secs: default_controller_interval(),
        }
    }
}

/// LAN-only ingestion endpoint for local devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalApiSettings {
    #[serde(default = "default_local_bind")]
    pub bind_addr: String,
}

fn default_local_bind() -> String {
    "127.0.0.1:8088".to_string()
}

impl Default for LocalApiSettings {
    fn default() -> Self {
        LocalApiSettings {
            bind_addr: default_local_bind(),
        }
    }
}

// =============================================================================
// Main Edge Configuration
// =============================================================================

/// Complete edge agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub authority: AuthoritySettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub controller: ControllerSettings,

    #[serde(default)]
    pub local_api: LocalApiSettings,
}

impl EdgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (edge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading edge config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses one TOML file without applying overrides.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = self.authority.url.trim();
        if url.is_empty() {
            return Err(SyncError::InvalidConfig("authority.url is required".into()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SyncError::InvalidUrl(format!(
                "Authority URL must start with http:// or https://, got: {url}"
            )));
        }

        if self.authority.token.trim().is_empty() {
            return Err(SyncError::InvalidConfig("authority.token is required".into()));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.pull_interval_ms == 0 || self.sync.push_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "poll intervals must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OUTPOST_AUTHORITY_URL") {
            debug!(url = %url, "Overriding authority URL from environment");
            self.authority.url = url;
        }

        if let Ok(token) = std::env::var("OUTPOST_AUTHORITY_TOKEN") {
            self.authority.token = token;
        }

        if let Ok(dir) = std::env::var("OUTPOST_STATE_DIR") {
            debug!(dir = %dir, "Overriding state dir from environment");
            self.storage.state_dir = PathBuf::from(dir);
        }

        if let Ok(bind) = std::env::var("OUTPOST_LOCAL_BIND") {
            self.local_api.bind_addr = bind;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "outpost", "outpost")
            .map(|dirs| dirs.config_dir().join("edge.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.authority.timeout_secs.max(1))
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.sync.pull_interval_ms)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.sync.push_interval_ms)
    }

    pub fn controller_interval(&self) -> Duration {
        Duration::from_secs(self.controller.interval_secs.max(1))
    }

    /// A config pointing at `url` with `state_dir`, everything else default.
    pub fn for_authority(url: impl Into<String>, token: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
        let mut config = EdgeConfig::default();
        config.authority.url = url.into();
        config.authority.token = token.into();
        config.storage.state_dir = state_dir.into();
        config
    }
}
