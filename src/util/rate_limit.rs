//! Per-connection flood protection for WebSocket frames
//!
//! This only caps raw frame rate. Shot pacing is the match authority's
//! cooldown, never this limiter.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max client frames (votes and pings) per second per connection
pub const FRAME_RATE_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct PlayerRateLimiter {
    frame_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self::with_limit(FRAME_RATE_LIMIT)
    }

    pub fn with_limit(frames_per_second: u32) -> Self {
        Self {
            frame_limiter: create_limiter(frames_per_second),
        }
    }

    /// Returns true if the frame may be processed
    pub fn check_frame(&self) -> bool {
        self.frame_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_dropped() {
        let limiter = PlayerRateLimiter::with_limit(3);
        let allowed = (0..10).filter(|_| limiter.check_frame()).count();
        assert_eq!(allowed, 3);
    }
}
