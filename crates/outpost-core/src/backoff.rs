//! # Reschedule Backoff
//!
//! Delay arithmetic for work items whose side effect failed.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  failure #   previous delay   next delay                                │
//! │  ─────────   ──────────────   ──────────                                │
//! │      1             0              300s                                  │
//! │      2           300s             600s                                  │
//! │      3           600s            1200s                                  │
//! │     ...                           ...                                   │
//! │      9         76800s           86400s   ◄── capped                     │
//! │     10+        86400s           86400s                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The previous delay is persisted with the item, so the schedule survives
//! restarts and repeated failures compound.

/// Doubling, capped reschedule policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure (seconds).
    pub initial_secs: i64,

    /// Upper bound on any delay (seconds).
    pub max_secs: i64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial_secs: 300,
            max_secs: 86_400,
        }
    }
}

/// Where and how far a failed item gets pushed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    /// New eligibility time (unix seconds).
    pub send_at: i64,

    /// Delay applied this time; feed it back as `previous_secs` next time.
    pub backoff_secs: i64,
}

impl BackoffPolicy {
    /// Returns the delay to apply after a failure.
    ///
    /// ## Example
    /// ```rust
    /// use outpost_core::BackoffPolicy;
    ///
    /// let policy = BackoffPolicy::default();
    /// assert_eq!(policy.next_delay(0), 300);
    /// assert_eq!(policy.next_delay(300), 600);
    /// assert_eq!(policy.next_delay(80_000), 86_400);
    /// ```
    pub fn next_delay(&self, previous_secs: i64) -> i64 {
        let next = if previous_secs <= 0 {
            self.initial_secs
        } else {
            previous_secs.saturating_mul(2).max(self.initial_secs)
        };
        next.min(self.max_secs)
    }

    /// Computes the reschedule for an item that failed at `now`.
    pub fn reschedule(&self, previous_secs: i64, now: i64) -> Reschedule {
        let backoff_secs = self.next_delay(previous_secs);
        Reschedule {
            send_at: now.saturating_add(backoff_secs),
            backoff_secs,
        }
    }
}
