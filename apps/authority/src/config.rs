//! Authority configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Authority configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// HTTP listen address
    pub bind_addr: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Webhook deliveries per second
    pub webhook_rps: u32,

    /// Discord role updates per second
    pub role_sync_rps: u32,

    /// Work-queue poll interval in seconds
    pub queue_poll_secs: u64,

    /// How often integration settings are re-read, in seconds
    pub settings_reload_secs: u64,

    /// Stored events older than this are deleted
    pub event_retention_days: i64,

    /// Discord REST base URL (overridable for tests and proxies)
    pub discord_api_base: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        AuthorityConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_path: PathBuf::from("./outpost.db"),
            webhook_rps: 5,
            role_sync_rps: 5,
            queue_poll_secs: 1,
            settings_reload_secs: 10,
            event_retention_days: 730,
            discord_api_base: "https://discord.com/api/v10".to_string(),
        }
    }
}

impl AuthorityConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AuthorityConfig::default();

        let config = AuthorityConfig {
            bind_addr: lookup("OUTPOST_BIND_ADDR").unwrap_or(defaults.bind_addr),

            database_path: lookup("OUTPOST_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            webhook_rps: parse_or(&lookup, "OUTPOST_WEBHOOK_RPS", defaults.webhook_rps)?,

            role_sync_rps: parse_or(&lookup, "OUTPOST_ROLE_SYNC_RPS", defaults.role_sync_rps)?,

            queue_poll_secs: parse_or(&lookup, "OUTPOST_QUEUE_POLL_SECS", defaults.queue_poll_secs)?,

            settings_reload_secs: parse_or(
                &lookup,
                "OUTPOST_SETTINGS_RELOAD_SECS",
                defaults.settings_reload_secs,
            )?,

            event_retention_days: parse_or(
                &lookup,
                "OUTPOST_EVENT_RETENTION_DAYS",
                defaults.event_retention_days,
            )?,

            discord_api_base: lookup("OUTPOST_DISCORD_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.discord_api_base),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_rps == 0 {
            return Err(ConfigError::InvalidValue("OUTPOST_WEBHOOK_RPS".to_string()));
        }
        if self.role_sync_rps == 0 {
            return Err(ConfigError::InvalidValue("OUTPOST_ROLE_SYNC_RPS".to_string()));
        }
        if self.queue_poll_secs == 0 {
            return Err(ConfigError::InvalidValue("OUTPOST_QUEUE_POLL_SECS".to_string()));
        }
        if self.settings_reload_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "OUTPOST_SETTINGS_RELOAD_SECS".to_string(),
            ));
        }
        if self.event_retention_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "OUTPOST_EVENT_RETENTION_DAYS".to_string(),
            ));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::MissingRequired("OUTPOST_BIND_ADDR".to_string()));
        }
        Ok(())
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_secs(self.queue_poll_secs)
    }

    pub fn settings_reload_interval(&self) -> Duration {
        Duration::from_secs(self.settings_reload_secs)
    }

    /// Retention window in seconds.
    pub fn event_retention_secs(&self) -> i64 {
        self.event_retention_days.saturating_mul(86_400)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuthorityConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AuthorityConfig::default());
        assert_eq!(config.event_retention_secs(), 730 * 86_400);
    }

    #[test]
    fn test_overrides() {
        let config = AuthorityConfig::from_lookup(lookup(&[
            ("OUTPOST_BIND_ADDR", "127.0.0.1:9000"),
            ("OUTPOST_WEBHOOK_RPS", "2"),
            ("OUTPOST_DISCORD_API_BASE", "http://localhost:1234/"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.webhook_rps, 2);
        assert_eq!(config.role_sync_rps, 5);
        assert_eq!(config.discord_api_base, "http://localhost:1234");
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = AuthorityConfig::from_lookup(lookup(&[("OUTPOST_QUEUE_POLL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name) if name == "OUTPOST_QUEUE_POLL_SECS"));

        let err = AuthorityConfig::from_lookup(lookup(&[("OUTPOST_ROLE_SYNC_RPS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name) if name == "OUTPOST_ROLE_SYNC_RPS"));
    }
}
