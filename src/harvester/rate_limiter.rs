//! Token bucket pacing requests to the upstream node (GCRA via governor)

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rate limiter wait cancelled")
    }
}

impl std::error::Error for Cancelled {}

pub struct RateLimiter {
    limiter: DefaultDirectRateLimiter,
    rate_per_sec: u32,
    burst: u32,
}

impl RateLimiter {
    /// Refill `rate_per_sec` tokens per second, hold at most `burst`.
    /// Zero values are clamped to one.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate_per_sec.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst_size = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst_size);

        Self {
            limiter: GovernorLimiter::direct(quota),
            rate_per_sec: rate.get(),
            burst: burst_size.get(),
        }
    }

    /// Wait for a token. A fired `cancel` wins over a pending wait and
    /// leaves the bucket untouched.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    /// Take a token only if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn rate_per_sec(&self) -> u32 {
        self.rate_per_sec
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}
