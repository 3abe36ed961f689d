//! # Rate-Limited Queue
//!
//! Caps how fast a [`DurableWorkQueue`] can hit a third-party API.
//!
//! ## Token Bucket
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  capacity = 1 token, refilled continuously at N tokens / second        │
//! │                                                                         │
//! │  acquire():                                                            │
//! │    refill by elapsed × N (never above 1)                               │
//! │    tokens >= 1 ──► take one, return                                    │
//! │    otherwise   ──► sleep until one token has accrued, or cancelled     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With a single-token bucket operations are paced 1/N seconds apart, so
//! no one-second window ever sees more than N of them, including the first.
//!
//! The wrapper spends one token per claim. Every processed item was
//! claimed first, so downstream calls never exceed N per second no matter
//! how many rows are eligible. Waiting before the claim keeps a cancelled
//! wait from leaving a row claimed but unprocessed.
//!
//! N may change at runtime: [`RateLimitedQueue::with_rate_source`] is
//! consulted before every claim.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};
use crate::workqueue::DurableWorkQueue;

const CAPACITY: f64 = 1.0;

// =============================================================================
// Token Bucket
// =============================================================================

#[derive(Debug)]
struct BucketState {
    per_second: u32,
    tokens: f64,
    refilled_at: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * f64::from(self.per_second)).min(CAPACITY);
        self.refilled_at = now;
    }
}

/// Continuous-refill token bucket holding at most one token.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket allowing `per_second` operations per second.
    /// Zero is treated as one.
    pub fn new(per_second: u32) -> Self {
        TokenBucket {
            state: Mutex::new(BucketState {
                per_second: per_second.max(1),
                tokens: CAPACITY,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn per_second(&self) -> u32 {
        self.state.lock().per_second
    }

    /// Changes the refill rate. Tokens accrued so far are kept.
    /// Returns true if the rate actually changed.
    pub fn set_rate(&self, per_second: u32) -> bool {
        let per_second = per_second.max(1);
        let mut state = self.state.lock();
        if state.per_second == per_second {
            return false;
        }
        state.refill(Instant::now());
        state.per_second = per_second;
        true
    }

    /// Takes a token if one is available, otherwise returns how long until
    /// one will be.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        state.refill(Instant::now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / f64::from(state.per_second));
            Err(wait.max(Duration::from_millis(1)))
        }
    }

    /// Waits for a token.
    pub async fn acquire(&self, cancel: &CancellationToken) -> EngineResult<()> {
        loop {
            let wait = match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            trace!(?wait, "Rate limiter waiting");
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

// =============================================================================
// Queue Decorator
// =============================================================================

type RateSource = Box<dyn Fn() -> u32 + Send + Sync>;

/// A [`DurableWorkQueue`] whose claims are limited to N per second.
pub struct RateLimitedQueue<Q> {
    inner: Q,
    bucket: TokenBucket,
    rate_source: Option<RateSource>,
}

impl<Q: fmt::Debug> fmt::Debug for RateLimitedQueue<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedQueue")
            .field("inner", &self.inner)
            .field("bucket", &self.bucket)
            .field("rate_source", &self.rate_source.is_some())
            .finish()
    }
}

impl<Q: DurableWorkQueue> RateLimitedQueue<Q> {
    pub fn new(inner: Q, per_second: u32) -> Self {
        RateLimitedQueue {
            inner,
            bucket: TokenBucket::new(per_second),
            rate_source: None,
        }
    }

    /// Re-reads N from `source` before every claim, typically a
    /// [`ConfigCell`](crate::ConfigCell) snapshot.
    pub fn with_rate_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> u32 + Send + Sync + 'static,
    {
        self.rate_source = Some(Box::new(source));
        self
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    pub fn per_second(&self) -> u32 {
        self.bucket.per_second()
    }

    fn refresh_rate(&self) {
        let Some(source) = &self.rate_source else {
            return;
        };
        let per_second = source();
        if self.bucket.set_rate(per_second) {
            debug!(queue = self.inner.name(), per_second, "Rate limit changed");
        }
    }
}

impl<Q: DurableWorkQueue> DurableWorkQueue for RateLimitedQueue<Q> {
    type Item = Q::Item;
    type Error = Q::Error;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Cancellation while waiting reports "nothing eligible" so no row is
    /// left claimed but unprocessed.
    async fn get_item(&self, cancel: &CancellationToken) -> Result<Option<Q::Item>, Q::Error> {
        self.refresh_rate();
        if self.bucket.acquire(cancel).await.is_err() {
            return Ok(None);
        }
        self.inner.get_item(cancel).await
    }

    async fn process_item(&self, cancel: &CancellationToken, item: &Q::Item) -> Result<(), Q::Error> {
        self.inner.process_item(cancel, item).await
    }

    async fn update_item(
        &self,
        cancel: &CancellationToken,
        item: &Q::Item,
        success: bool,
    ) -> Result<(), Q::Error> {
        self.inner.update_item(cancel, item, success).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_cell::ConfigCell;
    use crate::workqueue::drive_once;
    use crate::workqueue::tests::FakeQueue;
    use std::sync::Arc;

    fn items(n: usize) -> FakeQueue {
        let names: Vec<String> = (0..n).map(|i| format!("item-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        FakeQueue::with_items(&refs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_paces_evenly() {
        let bucket = TokenBucket::new(5);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..15 {
            bucket.acquire(&cancel).await.unwrap();
        }

        // First immediately, the other 14 at 200ms each
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2790), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2900), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_second_exceeds_rate_even_at_start() {
        let bucket = TokenBucket::new(4);
        let cancel = CancellationToken::new();

        let mut stamps = Vec::new();
        for _ in 0..20 {
            bucket.acquire(&cancel).await.unwrap();
            stamps.push(Instant::now());
        }

        // Five consecutive operations always span a full second
        for window in stamps.windows(5) {
            let span = window[4].duration_since(window[0]);
            assert!(span >= Duration::from_millis(999), "{span:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_observes_cancellation() {
        let bucket = TokenBucket::new(1);
        let cancel = CancellationToken::new();
        bucket.acquire(&cancel).await.unwrap();

        cancel.cancel();
        assert!(bucket.acquire(&cancel).await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_throughput_is_capped() {
        let queue = Arc::new(RateLimitedQueue::new(items(12), 4));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        while drive_once(queue.as_ref(), &cancel).await {}

        // First immediately, the other 11 at 250ms each
        assert_eq!(queue.inner().processed.lock().len(), 12);
        assert!(start.elapsed() >= Duration::from_millis(2740));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_follows_source() {
        let rate = Arc::new(ConfigCell::new(10u32));
        let source = rate.clone();
        let queue = RateLimitedQueue::new(items(10), 1).with_rate_source(move || *source.load());
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..5 {
            assert!(drive_once(&queue, &cancel).await);
        }
        assert_eq!(queue.per_second(), 10);
        // 4 waits at 100ms, far below the 1/s it was built with
        let fast = start.elapsed();
        assert!(fast <= Duration::from_millis(500), "{fast:?}");

        rate.store(2);
        let start = Instant::now();
        for _ in 0..3 {
            assert!(drive_once(&queue, &cancel).await);
        }
        assert_eq!(queue.per_second(), 2);
        let slow = start.elapsed();
        assert!(slow >= Duration::from_millis(1000), "{slow:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_claims_nothing() {
        let queue = RateLimitedQueue::new(FakeQueue::with_items(&["a", "b"]), 1);
        let cancel = CancellationToken::new();

        assert!(drive_once(&queue, &cancel).await);
        cancel.cancel();
        assert!(!drive_once(&queue, &cancel).await);
        assert_eq!(queue.inner().items.lock().len(), 1);
    }
}
