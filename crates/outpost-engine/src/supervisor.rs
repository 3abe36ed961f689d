//! # Process Supervisor
//!
//! Runs a fixed set of tasks that are all meant to live until shutdown.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Supervised Task Lifecycle                           │
//! │                                                                         │
//! │  add(name, task) ... add(name, task)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run(shutdown)  ── spawns every task with a child token                 │
//! │       │                                                                 │
//! │       ├── shutdown fires ──► wait for tasks to wind down ──► Ok(())     │
//! │       │                                                                 │
//! │       └── a task returns or panics first ──► Err(..)                   │
//! │                                                  │                      │
//! │                                    run_or_exit ──► process::exit(1)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no per-task restart. A task that stops early means the process
//! is in a state nobody planned for, so the process stops too and the
//! service manager restarts it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EngineResult};

type TaskFuture = Pin<Box<dyn Future<Output = EngineResult<()>> + Send>>;
type TaskFactory = Box<dyn FnOnce(CancellationToken) -> TaskFuture + Send>;

/// Fail-fast supervisor for long-running tasks.
#[derive(Default)]
pub struct ProcessSupervisor {
    tasks: Vec<(String, TaskFactory)>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ProcessSupervisor")
            .field("tasks", &names)
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. It receives a token that fires on shutdown.
    pub fn add<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<()>> + Send + 'static,
    {
        self.tasks
            .push((name.into(), Box::new(move |token| Box::pin(task(token)))));
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts every task and blocks until `shutdown` fires.
    ///
    /// Returns an error as soon as any task returns (with or without an
    /// error) or panics while `shutdown` has not fired.
    pub async fn run(self, shutdown: CancellationToken) -> EngineResult<()> {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();

        for (name, factory) in self.tasks {
            let future = factory(shutdown.child_token());
            let handle = set.spawn(future);
            debug!(task = %name, "Supervised task started");
            names.insert(handle.id(), name);
        }

        info!(tasks = names.len(), "Supervisor running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                joined = set.join_next_with_id(), if !set.is_empty() => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    return Err(match joined {
                        Some(Ok((id, outcome))) => {
                            let name = names.remove(&id).unwrap_or_default();
                            let outcome = match outcome {
                                Ok(()) => "returned Ok".to_string(),
                                Err(e) => e.to_string(),
                            };
                            EngineError::TaskExited { name, outcome }
                        }
                        Some(Err(join_err)) => {
                            let name = names.remove(&join_err.id()).unwrap_or_default();
                            EngineError::TaskPanicked {
                                name,
                                message: join_err.to_string(),
                            }
                        }
                        None => EngineError::Task("task set drained unexpectedly".into()),
                    });
                }
            }
        }

        info!("Shutdown requested, waiting for supervised tasks");
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, Ok(()) | Err(EngineError::Cancelled))) => {
                    debug!(task = ?names.get(&id), "Supervised task stopped");
                }
                Ok((id, Err(e))) => {
                    warn!(task = ?names.get(&id), error = %e, "Supervised task failed during shutdown");
                }
                Err(join_err) => {
                    warn!(task = ?names.get(&join_err.id()), error = %join_err, "Supervised task panicked during shutdown");
                }
            }
        }

        info!("All supervised tasks stopped");
        Ok(())
    }

    /// Like [`run`](Self::run), but terminates the process on any
    /// invariant violation.
    pub async fn run_or_exit(self, shutdown: CancellationToken) {
        if let Err(e) = self.run(shutdown).await {
            error!(error = %e, "Supervised task stopped unexpectedly, exiting");
            std::process::exit(1);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn run_until_cancelled(token: CancellationToken) -> EngineResult<()> {
        token.cancelled().await;
        Err(EngineError::Cancelled)
    }

    async fn quit_immediately(_token: CancellationToken) -> EngineResult<()> {
        Ok(())
    }

    async fn fail_to_bind(_token: CancellationToken) -> EngineResult<()> {
        Err(EngineError::Task("bind failed".into()))
    }

    async fn panic_on_start(_token: CancellationToken) -> EngineResult<()> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_clean_shutdown() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.add("a", run_until_cancelled);
        supervisor.add("b", run_until_cancelled);
        assert_eq!(supervisor.len(), 2);

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        supervisor.run(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_early_return_is_fatal() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.add("forever", run_until_cancelled);
        supervisor.add("quitter", quit_immediately);

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        match err {
            EngineError::TaskExited { name, .. } => assert_eq!(name, "quitter"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_early_error_is_fatal() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.add("broken", fail_to_bind);

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("bind failed"));
    }

    #[tokio::test]
    async fn test_panic_is_fatal() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.add("panicky", panic_on_start);

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskPanicked { ref name, .. } if name == "panicky"));
    }

    #[tokio::test]
    async fn test_empty_supervisor_waits_for_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        ProcessSupervisor::new().run(shutdown).await.unwrap();
    }
}
