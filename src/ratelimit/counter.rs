//! Fixed-window counter records.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Convert a window length into a chrono duration, saturating on overflow.
pub(crate) fn window_delta(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}

/// The instant a window opened at `now` closes, clamped to the latest
/// representable time.
pub(crate) fn window_end(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window_delta(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A counter for one storage key within one fixed window.
///
/// A record moves through `ABSENT -> ACTIVE -> EXPIRED -> ABSENT`. Expiry is
/// decided purely by comparing the current time with `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    /// Requests observed in the current window
    pub count: u64,
    /// When the current window opened
    pub window_start: DateTime<Utc>,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
}

impl CounterRecord {
    /// Open a new window with a single request recorded.
    pub fn start(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            reset_at: window_end(now, window),
        }
    }

    /// Whether the window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Record one request.
    ///
    /// An expired record restarts at 1 with a fresh window; a live record is
    /// incremented and keeps its original `reset_at`.
    pub fn hit(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.is_expired(now) {
            *self = Self::start(now, window);
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    /// Time left until the window closes.
    pub fn duration_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
