//! Chat webhook delivery queue.
//!
//! Each row names a channel; the URL for that channel comes from the current
//! [`IntegrationSettings`] snapshot at delivery time, so fixing a bad URL in
//! settings lets already-queued rows go out on their next attempt.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use outpost_db::{WebhookDelivery, WorkQueueRepository};
use outpost_engine::{CancellationToken, ConfigCell, DurableWorkQueue};

use super::settings::IntegrationSettings;
use super::{now, settle, WorkerError, WorkerResult};

/// `webhook_queue` as a [`DurableWorkQueue`].
#[derive(Debug)]
pub struct WebhookQueue {
    repo: WorkQueueRepository<WebhookDelivery>,
    http: reqwest::Client,
    settings: Arc<ConfigCell<IntegrationSettings>>,
}

impl WebhookQueue {
    pub fn new(
        repo: WorkQueueRepository<WebhookDelivery>,
        http: reqwest::Client,
        settings: Arc<ConfigCell<IntegrationSettings>>,
    ) -> Self {
        WebhookQueue {
            repo,
            http,
            settings,
        }
    }
}

impl DurableWorkQueue for WebhookQueue {
    type Item = WebhookDelivery;
    type Error = WorkerError;

    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn get_item(&self, _cancel: &CancellationToken) -> WorkerResult<Option<WebhookDelivery>> {
        Ok(self.repo.claim(now()).await?)
    }

    async fn process_item(&self, _cancel: &CancellationToken, item: &WebhookDelivery) -> WorkerResult<()> {
        let url = {
            let settings = self.settings.load();
            settings
                .webhook_url(&item.channel)
                .map(str::to_string)
                .ok_or_else(|| WorkerError::NotConfigured(format!("webhook channel '{}'", item.channel)))?
        };

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(item.payload.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::UnexpectedStatus {
                target: format!("webhook '{}'", item.channel),
                status: status.as_u16(),
            });
        }

        debug!(channel = %item.channel, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }

    async fn update_item(
        &self,
        _cancel: &CancellationToken,
        item: &WebhookDelivery,
        success: bool,
    ) -> WorkerResult<()> {
        settle(&self.repo, item, success).await
    }
}
