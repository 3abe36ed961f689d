//! Integration settings and their reload loop.
//!
//! Rows of `integration_settings` are folded into one immutable
//! [`IntegrationSettings`] value and published through a [`ConfigCell`].
//! Workers read a whole snapshot per item, so a reload never hands them a
//! bot token from one version and a guild from another.
//!
//! ```text
//! discord.bot_token     Bot token for the REST API
//! discord.guild_id      Guild holding the access role
//! discord.role_id       Role granted while access is enabled
//! webhook.<channel>     URL for webhook_queue rows on <channel>
//! ratelimit.webhook     Webhook deliveries per second
//! ratelimit.role_sync   Discord role calls per second
//! ```
//!
//! A missing or unparsable rate falls back to the environment default.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use outpost_db::{Database, DbResult};
use outpost_engine::{poll, CancellationToken, ConfigCell, EngineResult};

const WEBHOOK_PREFIX: &str = "webhook.";

/// Discord bot credentials and the role it manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordSettings {
    pub bot_token: String,
    pub guild_id: String,
    pub role_id: String,
}

/// One consistent view of every integration setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationSettings {
    /// Present only when token, guild and role are all set.
    pub discord: Option<DiscordSettings>,

    /// Webhook URL by channel name.
    pub webhook_urls: BTreeMap<String, String>,

    /// Overrides for the outbound rate limits, always non-zero.
    pub webhook_rps: Option<u32>,
    pub role_sync_rps: Option<u32>,
}

impl IntegrationSettings {
    /// Folds raw key/value rows. Unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut bot_token = None;
        let mut guild_id = None;
        let mut role_id = None;
        let mut webhook_urls = BTreeMap::new();
        let mut webhook_rps = None;
        let mut role_sync_rps = None;

        for (key, value) in pairs {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "discord.bot_token" => bot_token = Some(value),
                "discord.guild_id" => guild_id = Some(value),
                "discord.role_id" => role_id = Some(value),
                "ratelimit.webhook" => webhook_rps = parse_rate(&value),
                "ratelimit.role_sync" => role_sync_rps = parse_rate(&value),
                _ => {
                    if let Some(channel) = key.strip_prefix(WEBHOOK_PREFIX) {
                        webhook_urls.insert(channel.to_string(), value);
                    }
                }
            }
        }

        let discord = match (bot_token, guild_id, role_id) {
            (Some(bot_token), Some(guild_id), Some(role_id)) => Some(DiscordSettings {
                bot_token,
                guild_id,
                role_id,
            }),
            _ => None,
        };

        IntegrationSettings {
            discord,
            webhook_urls,
            webhook_rps,
            role_sync_rps,
        }
    }

    pub fn webhook_url(&self, channel: &str) -> Option<&str> {
        self.webhook_urls.get(channel).map(String::as_str)
    }
}

fn parse_rate(value: &str) -> Option<u32> {
    value.parse().ok().filter(|rps| *rps > 0)
}

/// Reads the table and publishes it if anything changed.
pub async fn reload_settings(
    db: &Database,
    cell: &ConfigCell<IntegrationSettings>,
) -> DbResult<bool> {
    let settings = IntegrationSettings::from_pairs(db.settings().all().await?);
    let discord_configured = settings.discord.is_some();
    let webhooks = settings.webhook_urls.len();

    let changed = cell.replace_if_changed(settings);
    if changed {
        info!(discord_configured, webhooks, "Integration settings reloaded");
    }
    Ok(changed)
}

/// Re-reads the settings every `interval` until cancelled.
pub async fn run_settings_reload(
    db: Database,
    cell: Arc<ConfigCell<IntegrationSettings>>,
    interval: Duration,
    cancel: CancellationToken,
) -> EngineResult<()> {
    poll(interval, &cancel, move |_| {
        let db = db.clone();
        let cell = cell.clone();
        async move {
            if let Err(e) = reload_settings(&db, &cell).await {
                error!(error = %e, "Failed to reload integration settings");
            }
            false
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_db::DbConfig;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_discord_needs_all_three_keys() {
        let partial = IntegrationSettings::from_pairs(pairs(&[
            ("discord.bot_token", "t"),
            ("discord.guild_id", "g"),
        ]));
        assert_eq!(partial.discord, None);

        let full = IntegrationSettings::from_pairs(pairs(&[
            ("discord.bot_token", "t"),
            ("discord.guild_id", "g"),
            ("discord.role_id", "r"),
            ("webhook.door", "http://hooks/door"),
            ("something.else", "x"),
        ]));
        assert_eq!(full.discord.as_ref().unwrap().role_id, "r");
        assert_eq!(full.webhook_url("door"), Some("http://hooks/door"));
        assert_eq!(full.webhook_url("printers"), None);
    }

    #[test]
    fn test_rate_overrides() {
        let settings = IntegrationSettings::from_pairs(pairs(&[
            ("ratelimit.webhook", "12"),
            ("ratelimit.role_sync", "0"),
        ]));
        assert_eq!(settings.webhook_rps, Some(12));
        assert_eq!(settings.role_sync_rps, None);

        let garbage = IntegrationSettings::from_pairs(pairs(&[("ratelimit.webhook", "fast")]));
        assert_eq!(garbage.webhook_rps, None);
    }

    #[tokio::test]
    async fn test_reload_publishes_only_changes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cell = ConfigCell::new(IntegrationSettings::default());

        // Empty table matches the default
        assert!(!reload_settings(&db, &cell).await.unwrap());

        db.settings().set("webhook.door", "http://hooks/door").await.unwrap();
        assert!(reload_settings(&db, &cell).await.unwrap());
        assert_eq!(cell.load().webhook_url("door"), Some("http://hooks/door"));

        assert!(!reload_settings(&db, &cell).await.unwrap());

        db.settings().remove("webhook.door").await.unwrap();
        assert!(reload_settings(&db, &cell).await.unwrap());
        assert_eq!(cell.load().webhook_url("door"), None);
    }
}
