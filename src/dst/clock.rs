//! SimClock - Simulated Time
//!
//! `TigerStyle`: Deterministic, controllable time. Every tier reads the clock
//! it was constructed with, so TTL expiry, recency, and retry timing are all
//! reproducible under test.

use crate::constants::{DST_TIME_ADVANCE_MS_MAX, TIME_MS_PER_DAY, TIME_MS_PER_SEC};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A simulated clock shared between components.
///
/// `TigerStyle`:
/// - Time only moves forward
/// - All time operations are explicit
/// - Clones share the same underlying time
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current time in milliseconds since epoch (thread-safe)
    current_ms: Arc<AtomicU64>,
    /// Notify waiters when time advances
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock starting at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock seeded from the current wall time.
    ///
    /// Production entry point: the simulation host advances it from there.
    #[must_use]
    pub fn at_wall_time() -> Self {
        let ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        Self::at_ms(ms)
    }

    /// Get current time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let ms = i64::try_from(self.now_ms()).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    /// Advance time by the given milliseconds.
    ///
    /// # Panics
    /// Panics if ms exceeds `DST_TIME_ADVANCE_MS_MAX`.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        // Preconditions
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        let new_time = old_time.saturating_add(ms);

        // Wake anything sleeping on the clock
        self.notify.notify_waiters();

        // Postcondition
        assert!(new_time >= old_time, "time must not go backwards");

        new_time
    }

    /// Advance time by whole days, in daily increments.
    ///
    /// Long-window tests (e.g. the 30-day mid tier TTL) advance through this
    /// helper so each step stays within `DST_TIME_ADVANCE_MS_MAX`.
    pub fn advance_days(&self, days: u64) -> u64 {
        for _ in 0..days {
            self.advance_ms(TIME_MS_PER_DAY);
        }
        self.now_ms()
    }

    /// Get elapsed time since a given timestamp.
    ///
    /// # Panics
    /// Panics if `since` is in the future.
    #[must_use]
    pub fn elapsed_since(&self, since: u64) -> u64 {
        let current = self.now_ms();
        // Precondition
        assert!(
            since <= current,
            "elapsed_since({since}) is in the future (now={current})"
        );

        current - since
    }

    /// Sleep until the specified duration has passed.
    ///
    /// Yields and waits for the clock to be advanced by another task.
    pub async fn sleep_ms(&self, duration_ms: u64) {
        let target_ms = self.now_ms().saturating_add(duration_ms);

        while self.now_ms() < target_ms {
            self.notify.notified().await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
