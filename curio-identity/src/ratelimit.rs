//! Minimum spacing between calls to one upstream service.

use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};
use tracing::trace;

/// Enforces a minimum interval between call initiations.
///
/// Backed by a GCRA limiter with a burst of one cell: a caller is released
/// at least `min_interval` after the previous release, regardless of how
/// long the previous call took. Share one instance per upstream service.
pub struct RateLimiter {
    name: String,
    min_interval: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Creates a limiter. A zero interval never blocks.
    pub fn new(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval,
            limiter: Quota::with_period(min_interval).map(DefaultDirectRateLimiter::direct),
        }
    }

    /// A limiter that never blocks.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self::new(name, Duration::ZERO)
    }

    /// Returns the upstream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configured interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the caller may start its call.
    pub async fn gate(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
            trace!(upstream = %self.name, "Released");
        }
    }

    /// Claims a slot without waiting. Returns false if the caller must back off.
    pub fn try_gate(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
