//! # Poll Loop
//!
//! A self-re-arming scheduler for "check for work, do it" loops.
//!
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        ▼                                              │
//!  cancelled? ──yes──► Err(Cancelled)                   │
//!        │ no                                           │
//!        ▼                                              │
//!   step(token) ──true──────────────────────────────────┤  (drain backlog)
//!        │ false                                        │
//!        ▼                                              │
//!   sleep(interval × U[0.9, 1.1)) ──or cancelled──► Err(Cancelled)
//!        │                                              │
//!        └──────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Scales `interval` by a random factor in `[0.9, 1.1)`.
///
/// Keeps independent loops with the same interval from polling in lockstep.
pub fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(0.9 + 0.2 * rand::random::<f64>())
}

/// Calls `step` until `cancel` fires.
///
/// `step` returning `true` means "there may be more, call again now";
/// `false` means "idle, wait one jittered tick". Only returns once
/// cancelled, always with [`EngineError::Cancelled`].
pub async fn poll<F, Fut>(interval: Duration, cancel: &CancellationToken, mut step: F) -> EngineResult<()>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if step(cancel.clone()).await {
            continue;
        }

        let wait = jittered(interval);
        trace!(?wait, "Poll loop idle");
        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..1000 {
            let d = jittered(base);
            assert!(d >= Duration::from_millis(900));
            assert!(d < Duration::from_millis(1100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_true_drains_without_sleeping() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result = poll(Duration::from_secs(60), &cancel, move |token| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
                    token.cancel();
                }
                true
            }
        })
        .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_waits_a_jittered_tick() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let _ = poll(Duration::from_secs(1), &cancel, move |token| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                    token.cancel();
                }
                false
            }
        })
        .await;

        // Four sleeps between five calls
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3600), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(4400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = poll(Duration::from_secs(3600), &cancel, |_| async { false }).await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(6));
    }
}
