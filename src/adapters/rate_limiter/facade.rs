//! Rate limit facade.
//!
//! The only entry point request code uses. Selects the distributed limiter
//! when the shared store is configured and healthy, and the in-process
//! fallback otherwise. A store fault is never allowed to disable
//! enforcement and never surfaces to the caller: every path ends in a
//! decision.

use redis::aio::MultiplexedConnection;

use crate::config::RateLimitConfig;
use crate::ports::{RateDecision, RateLimiter};

use super::in_memory::FallbackRateLimiter;
use super::redis::RedisRateLimiter;
use super::tiers::{PolicyTier, TierTable};

/// Facade over the distributed limiter and the in-process fallback.
///
/// Constructed once at startup by whichever component assembles the
/// middleware chain and shared behind an `Arc`; holds no global state.
pub struct RateLimitService {
    distributed: Option<Box<dyn RateLimiter>>,
    fallback: FallbackRateLimiter,
    tiers: TierTable,
}

impl RateLimitService {
    /// Create the service, wiring the distributed limiter only when the
    /// shared store's connection coordinates were supplied.
    pub fn new(config: &RateLimitConfig, conn: Option<MultiplexedConnection>) -> Self {
        let distributed: Option<Box<dyn RateLimiter>> = match conn {
            Some(conn) => Some(Box::new(RedisRateLimiter::new(conn))),
            None => {
                tracing::warn!(
                    "no counting store configured; rate limiting runs on the in-process fallback"
                );
                None
            }
        };
        Self::from_parts(config, distributed)
    }

    /// Create the service from an explicit distributed backend.
    pub fn from_parts(
        config: &RateLimitConfig,
        distributed: Option<Box<dyn RateLimiter>>,
    ) -> Self {
        Self {
            distributed,
            fallback: FallbackRateLimiter::from_config(config),
            tiers: TierTable::from_config(config),
        }
    }

    /// Whether the distributed limiter is wired in.
    pub fn has_distributed_store(&self) -> bool {
        self.distributed.is_some()
    }

    /// Count one request for `identifier` against the tier's budget.
    ///
    /// Infallible: infrastructure faults degrade to the fallback limiter
    /// rather than failing the request or waving it through.
    pub async fn check_rate_limit(&self, identifier: &str, tier: PolicyTier) -> RateDecision {
        let policy = self.tiers.policy(tier);
        let key = storage_key(tier, identifier);

        match &self.distributed {
            Some(store) => match store.check(&key, policy).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(
                        %tier,
                        error = %err,
                        "counting store check failed; degrading to in-process fallback"
                    );
                    self.fallback.limit(&key, policy.max_requests, policy.window_ms)
                }
            },
            None => {
                tracing::warn!(%tier, "counting store absent; serving decision from in-process fallback");
                self.fallback.limit(&key, policy.max_requests, policy.window_ms)
            }
        }
    }

    /// Current quota for `identifier` without consuming a request.
    pub async fn status(&self, identifier: &str, tier: PolicyTier) -> RateDecision {
        let policy = self.tiers.policy(tier);
        let key = storage_key(tier, identifier);

        if let Some(store) = &self.distributed {
            match store.status(&key, policy).await {
                Ok(decision) => return decision,
                Err(err) => {
                    tracing::error!(%tier, error = %err, "counting store status failed; reading fallback");
                }
            }
        }
        self.fallback.peek(&key, policy.max_requests, policy.window_ms)
    }

    /// Clear the current window for `identifier` (admin operation).
    ///
    /// Clears both backends so quota is restored regardless of which one
    /// serves the next request.
    pub async fn reset(&self, identifier: &str, tier: PolicyTier) {
        let policy = self.tiers.policy(tier);
        let key = storage_key(tier, identifier);

        if let Some(store) = &self.distributed {
            if let Err(err) = store.reset(&key, policy).await {
                tracing::error!(%tier, error = %err, "counting store reset failed");
            }
        }
        self.fallback.clear(&key);
    }
}

/// Storage key namespaced by tier, so one identifier is counted
/// independently per tier.
fn storage_key(tier: PolicyTier, identifier: &str) -> String {
    format!("ratelimit:{}:{}", tier.as_str(), identifier)
}

impl std::fmt::Debug for RateLimitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitService")
            .field("has_distributed_store", &self.has_distributed_store())
            .field("tiers", &self.tiers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{RateLimitError, TierPolicy};
    use async_trait::async_trait;

    /// Distributed backend that fails every call, simulating an
    /// unreachable store.
    struct UnreachableStore;

    #[async_trait]
    impl RateLimiter for UnreachableStore {
        async fn check(
            &self,
            _key: &str,
            _policy: TierPolicy,
        ) -> Result<RateDecision, RateLimitError> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }

        async fn status(
            &self,
            _key: &str,
            _policy: TierPolicy,
        ) -> Result<RateDecision, RateLimitError> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }

        async fn reset(&self, _key: &str, _policy: TierPolicy) -> Result<(), RateLimitError> {
            Err(RateLimitError::Unavailable("connection refused".into()))
        }
    }

    fn config() -> RateLimitConfig {
        RateLimitConfig::default()
    }

    #[tokio::test]
    async fn absent_store_still_enforces_limits() {
        let service = RateLimitService::new(&config(), None);
        assert!(!service.has_distributed_store());

        for remaining in (0..5).rev() {
            let decision = service
                .check_rate_limit("ip:203.0.113.5", PolicyTier::Auth)
                .await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }

        let denied = service
            .check_rate_limit("ip:203.0.113.5", PolicyTier::Auth)
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_fallback_without_fail_open() {
        let service =
            RateLimitService::from_parts(&config(), Some(Box::new(UnreachableStore)));

        // The very first call on an untouched key already counts: there
        // is no fail-open window while the store is down.
        for remaining in (0..5).rev() {
            let decision = service
                .check_rate_limit("ip:198.51.100.7", PolicyTier::Auth)
                .await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, remaining);
        }

        let denied = service
            .check_rate_limit("ip:198.51.100.7", PolicyTier::Auth)
            .await;
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn same_identifier_is_counted_independently_per_tier() {
        let service = RateLimitService::new(&config(), None);

        for _ in 0..5 {
            service
                .check_rate_limit("ip:203.0.113.5", PolicyTier::Auth)
                .await;
        }
        assert!(
            !service
                .check_rate_limit("ip:203.0.113.5", PolicyTier::Auth)
                .await
                .allowed
        );

        // Auth exhaustion leaves the public budget untouched.
        let public = service
            .check_rate_limit("ip:203.0.113.5", PolicyTier::Public)
            .await;
        assert!(public.allowed);
        assert_eq!(public.remaining, 119);
    }

    #[tokio::test]
    async fn status_does_not_consume_quota() {
        let service = RateLimitService::new(&config(), None);

        service
            .check_rate_limit("ip:203.0.113.5", PolicyTier::Financial)
            .await;

        let first = service.status("ip:203.0.113.5", PolicyTier::Financial).await;
        let second = service.status("ip:203.0.113.5", PolicyTier::Financial).await;
        assert_eq!(first.remaining, 9);
        assert_eq!(second.remaining, 9);
    }

    #[tokio::test]
    async fn reset_restores_full_quota() {
        let service = RateLimitService::new(&config(), None);

        for _ in 0..6 {
            service
                .check_rate_limit("user:bettor-1", PolicyTier::Auth)
                .await;
        }
        assert!(
            !service
                .check_rate_limit("user:bettor-1", PolicyTier::Auth)
                .await
                .allowed
        );

        service.reset("user:bettor-1", PolicyTier::Auth).await;
        let decision = service
            .check_rate_limit("user:bettor-1", PolicyTier::Auth)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn reset_clears_fallback_even_when_store_reset_fails() {
        let service =
            RateLimitService::from_parts(&config(), Some(Box::new(UnreachableStore)));

        for _ in 0..6 {
            service
                .check_rate_limit("user:bettor-2", PolicyTier::Auth)
                .await;
        }
        service.reset("user:bettor-2", PolicyTier::Auth).await;

        let decision = service
            .check_rate_limit("user:bettor-2", PolicyTier::Auth)
            .await;
        assert!(decision.allowed);
    }
}
