//! Rate limiting port for protecting the API surface and controlling costs.
//!
//! This port defines the count-and-compare interface implemented by the
//! distributed (Redis-backed) limiter and the in-process fallback limiter.
//! Implementations must be thread-safe and support concurrent access; the
//! increment-and-compare for a single key must be atomic.

use async_trait::async_trait;

/// Port for rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request against `key` and compare to the policy.
    ///
    /// Consumes quota whether or not the request ends up allowed.
    async fn check(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError>;

    /// Get the current quota for `key` without consuming a request.
    ///
    /// Useful for displaying limit information to callers.
    async fn status(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError>;

    /// Clear the current window for `key` (admin operation).
    async fn reset(&self, key: &str, policy: TierPolicy) -> Result<(), RateLimitError>;
}

/// Immutable request budget bound to a tier at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window duration in milliseconds.
    pub window_ms: u64,
}

/// Outcome of a rate limit check.
///
/// Produced fresh per call by whichever backend served it; both backends
/// uphold the same invariants (remaining decreases to zero within a
/// window, reset never moves backward within a window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// When the current window resets, in Unix milliseconds.
    pub reset_at_ms: u64,
}

impl RateDecision {
    /// Seconds a denied caller should wait before retrying.
    ///
    /// Rounds up to whole seconds and never goes below zero.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        (self.reset_at_ms.saturating_sub(now_ms) + 999) / 1000
    }
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The counting store is unreachable or returned a malformed response.
    #[error("counting store unavailable: {0}")]
    Unavailable(String),
}
