//! Outbound mail queue.

use std::future::Future;

use tracing::info;

use outpost_db::{OutboundMail, WorkQueueRepository};
use outpost_engine::{CancellationToken, DurableWorkQueue};

use super::{now, settle, WorkerError, WorkerResult};

/// Hands a message to whatever actually delivers mail.
pub trait MailSender: Send + Sync + 'static {
    fn send(&self, mail: &OutboundMail) -> impl Future<Output = WorkerResult<()>> + Send;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    async fn send(&self, mail: &OutboundMail) -> WorkerResult<()> {
        info!(
            to = %mail.recipient,
            subject = %mail.subject,
            bytes = mail.body.len(),
            "Mail (log only)"
        );
        Ok(())
    }
}

/// `outbound_mail` as a [`DurableWorkQueue`].
#[derive(Debug)]
pub struct MailQueue<S> {
    repo: WorkQueueRepository<OutboundMail>,
    sender: S,
}

impl<S: MailSender> MailQueue<S> {
    pub fn new(repo: WorkQueueRepository<OutboundMail>, sender: S) -> Self {
        MailQueue { repo, sender }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }
}

impl<S: MailSender> DurableWorkQueue for MailQueue<S> {
    type Item = OutboundMail;
    type Error = WorkerError;

    fn name(&self) -> &'static str {
        "mail"
    }

    async fn get_item(&self, _cancel: &CancellationToken) -> WorkerResult<Option<OutboundMail>> {
        Ok(self.repo.claim(now()).await?)
    }

    async fn process_item(&self, _cancel: &CancellationToken, item: &OutboundMail) -> WorkerResult<()> {
        self.sender.send(item).await
    }

    async fn update_item(
        &self,
        _cancel: &CancellationToken,
        item: &OutboundMail,
        success: bool,
    ) -> WorkerResult<()> {
        settle(&self.repo, item, success).await
    }
}
