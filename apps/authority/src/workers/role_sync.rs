//! Discord role sync queue.
//!
//! A trigger enqueues a row whenever a member with a Discord account is
//! created or has access toggled. Processing reads the member's access *now*
//! rather than trusting the row, so a burst of toggles converges on the
//! final value whatever order the rows are handled in.

use std::future::Future;
use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use tracing::debug;

use outpost_db::{MemberRepository, RoleSyncTask, WorkQueueRepository};
use outpost_engine::{CancellationToken, ConfigCell, DurableWorkQueue};

use super::settings::IntegrationSettings;
use super::{now, settle, WorkerError, WorkerResult};

/// Grants or revokes the access role for one chat user.
pub trait RoleSyncer: Send + Sync + 'static {
    fn set_role(
        &self,
        discord_user_id: &str,
        granted: bool,
    ) -> impl Future<Output = WorkerResult<()>> + Send;
}

// =============================================================================
// Discord
// =============================================================================

/// Discord REST implementation of [`RoleSyncer`].
///
/// ```text
/// PUT    {base}/guilds/{guild}/members/{user}/roles/{role}   grant
/// DELETE {base}/guilds/{guild}/members/{user}/roles/{role}   revoke
/// Authorization: Bot <token>
/// ```
#[derive(Debug, Clone)]
pub struct DiscordRoleSyncer {
    http: reqwest::Client,
    api_base: String,
    settings: Arc<ConfigCell<IntegrationSettings>>,
}

impl DiscordRoleSyncer {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        settings: Arc<ConfigCell<IntegrationSettings>>,
    ) -> Self {
        DiscordRoleSyncer {
            http,
            api_base: api_base.into(),
            settings,
        }
    }
}

impl RoleSyncer for DiscordRoleSyncer {
    async fn set_role(&self, discord_user_id: &str, granted: bool) -> WorkerResult<()> {
        let (url, bot_token) = {
            let settings = self.settings.load();
            let discord = settings
                .discord
                .as_ref()
                .ok_or_else(|| WorkerError::NotConfigured("discord".to_string()))?;
            (
                format!(
                    "{}/guilds/{}/members/{}/roles/{}",
                    self.api_base, discord.guild_id, discord_user_id, discord.role_id
                ),
                discord.bot_token.clone(),
            )
        };

        let method = if granted { Method::PUT } else { Method::DELETE };
        let response = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bot {bot_token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::UnexpectedStatus {
                target: "discord".to_string(),
                status: status.as_u16(),
            });
        }

        debug!(user = %discord_user_id, granted, "Discord role updated");
        Ok(())
    }
}

// =============================================================================
// Queue
// =============================================================================

/// `role_sync_queue` as a [`DurableWorkQueue`].
#[derive(Debug)]
pub struct RoleSyncQueue<R> {
    repo: WorkQueueRepository<RoleSyncTask>,
    members: MemberRepository,
    syncer: R,
}

impl<R: RoleSyncer> RoleSyncQueue<R> {
    pub fn new(repo: WorkQueueRepository<RoleSyncTask>, members: MemberRepository, syncer: R) -> Self {
        RoleSyncQueue {
            repo,
            members,
            syncer,
        }
    }

    pub fn syncer(&self) -> &R {
        &self.syncer
    }
}

impl<R: RoleSyncer> DurableWorkQueue for RoleSyncQueue<R> {
    type Item = RoleSyncTask;
    type Error = WorkerError;

    fn name(&self) -> &'static str {
        "role-sync"
    }

    async fn get_item(&self, _cancel: &CancellationToken) -> WorkerResult<Option<RoleSyncTask>> {
        Ok(self.repo.claim(now()).await?)
    }

    async fn process_item(&self, _cancel: &CancellationToken, item: &RoleSyncTask) -> WorkerResult<()> {
        // A deleted member loses the role
        let granted = self
            .members
            .access_enabled(item.member_id)
            .await?
            .unwrap_or(false);
        self.syncer.set_role(&item.discord_user_id, granted).await
    }

    async fn update_item(
        &self,
        _cancel: &CancellationToken,
        item: &RoleSyncTask,
        success: bool,
    ) -> WorkerResult<()> {
        settle(&self.repo, item, success).await
    }
}
