//! Session clock - turns wall-clock millis into cooldown decisions
//!
//! Cooldowns are deadlines compared against the authority's own clock on
//! every query. Nothing here schedules a callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::util::time::unix_millis;

/// Milliseconds since the Unix epoch, as observed by the authority
pub type Millis = u64;

/// Stateless cooldown arithmetic
pub struct SessionClock;

impl SessionClock {
    /// Deadline `duration` after `now`
    pub fn deadline(now: Millis, duration: Duration) -> Millis {
        now.saturating_add(duration.as_millis() as u64)
    }

    /// True once `now` has reached `deadline` (or there is no deadline)
    pub fn has_elapsed(now: Millis, deadline: Option<Millis>) -> bool {
        match deadline {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// Time left until `deadline`, zero if already reached
    pub fn remaining(now: Millis, deadline: Option<Millis>) -> Duration {
        deadline
            .map(|d| Duration::from_millis(d.saturating_sub(now)))
            .unwrap_or(Duration::ZERO)
    }
}

/// Source of "now" for a match authority
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        unix_millis()
    }
}

/// Hand-driven clock for deterministic tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
