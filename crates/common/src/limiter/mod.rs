//! Upstream model API rate limiting using a token bucket
//!
//! One direct (not keyed) limiter is shared by every concurrent query, so
//! a benchmark sweep cannot exceed the provider's request quota.

use crate::config::RateLimitConfig;
use crate::errors::{AppError, Result};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Create a new rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<Arc<GlobalRateLimiter>> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.requests_per_second must be at least 1".to_string(),
    })?;
    let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.burst must be at least 1".to_string(),
    })?;

    let quota = Quota::per_second(rate).allow_burst(burst);
    Ok(Arc::new(RateLimiter::direct(quota)))
}

/// Shared gate in front of every model call; cheap to clone
#[derive(Clone, Default)]
pub struct ModelRateLimiter {
    inner: Option<Arc<GlobalRateLimiter>>,
}

impl std::fmt::Debug for ModelRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRateLimiter")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}

impl ModelRateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let limiter = create_rate_limiter(config.requests_per_second, config.burst)?;
        Ok(Self {
            inner: Some(limiter),
        })
    }

    /// Limiter that never waits
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Wait until a request may be sent
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.inner {
            if limiter.check().is_err() {
                tracing::debug!("Model API rate limit reached, waiting");
                limiter.until_ready().await;
            }
        }
    }

    /// Take a permit without waiting; false when the bucket is empty
    pub fn try_acquire(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(100, 200).unwrap();
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_zero_quota_rejected() {
        assert!(create_rate_limiter(0, 10).is_err());
        assert!(create_rate_limiter(5, 0).is_err());
    }

    #[test]
    fn test_burst_is_enforced() {
        let config = RateLimitConfig {
            requests_per_second: 1,
            burst: 2,
            enabled: true,
        };
        let limiter = ModelRateLimiter::from_config(&config).unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_disabled_limiter_never_blocks() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let limiter = ModelRateLimiter::from_config(&config).unwrap();
        assert!(!limiter.is_enabled());
        for _ in 0..1000 {
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn test_rate_limiter_creation_result() {
        tokio_test::assert_ok!(create_rate_limiter(1, 1));
        tokio_test::assert_err!(create_rate_limiter(0, 1));
    }

    #[tokio::test]
    async fn test_until_ready_with_capacity_returns() {
        let limiter = ModelRateLimiter::from_config(&RateLimitConfig::default()).unwrap();
        limiter.until_ready().await;
        limiter.until_ready().await;
    }

    #[test]
    fn test_until_ready_waits_when_exhausted() {
        let config = RateLimitConfig {
            requests_per_second: 1,
            burst: 1,
            enabled: true,
        };
        let limiter = ModelRateLimiter::from_config(&config).unwrap();

        let mut first = tokio_test::task::spawn(limiter.until_ready());
        tokio_test::assert_ready!(first.poll());

        let mut second = tokio_test::task::spawn(limiter.until_ready());
        tokio_test::assert_pending!(second.poll());
    }
}
