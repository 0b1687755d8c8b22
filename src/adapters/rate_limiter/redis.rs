//! Redis-backed rate limiter for multi-instance deployments.
//!
//! Approximates a sliding window with two fixed buckets per key: a Lua
//! script atomically increments the current bucket and reads the previous
//! one, and the effective count weights the previous bucket by how much of
//! it still overlaps the sliding window. Tighter at window boundaries than
//! a plain fixed-window counter, while staying O(1) per key in the store.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::domain::foundation::Timestamp;
use crate::ports::{RateDecision, RateLimitError, RateLimiter, TierPolicy};

/// Atomic count-and-read for the two window buckets.
///
/// KEYS[1] = current bucket, KEYS[2] = previous bucket,
/// ARGV[1] = window length in milliseconds. Bucket keys expire after two
/// windows so idle keys leave the store on their own.
static SLIDING_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local current = redis.call('INCR', KEYS[1])
        if current == 1 then
            redis.call('PEXPIRE', KEYS[1], ARGV[1] * 2)
        end

        local previous = tonumber(redis.call('GET', KEYS[2])) or 0

        return { current, previous }
        "#,
    )
});

/// Shared-store rate limiter, atomic per key across all instances.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
}

impl RedisRateLimiter {
    /// Create a new Redis rate limiter over an established connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn bucket_keys(key: &str, bucket: u64) -> (String, String) {
        (
            format!("{}:{}", key, bucket),
            format!("{}:{}", key, bucket.saturating_sub(1)),
        )
    }

    /// Weights the previous bucket by its remaining overlap with the
    /// sliding window and adds the current bucket's count.
    fn effective_count(current: u64, previous: u64, now_ms: u64, window_ms: u64) -> u64 {
        let elapsed_fraction = (now_ms % window_ms) as f64 / window_ms as f64;
        (previous as f64 * (1.0 - elapsed_fraction)).floor() as u64 + current
    }

    fn decision(current: u64, previous: u64, now_ms: u64, policy: TierPolicy) -> RateDecision {
        let window_ms = policy.window_ms.max(1);
        let effective = Self::effective_count(current, previous, now_ms, window_ms);
        let limit = u64::from(policy.max_requests);
        let bucket = now_ms / window_ms;

        RateDecision {
            allowed: effective <= limit,
            limit: policy.max_requests,
            remaining: limit.saturating_sub(effective) as u32,
            reset_at_ms: (bucket + 1) * window_ms,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError> {
        let now_ms = Timestamp::now().as_unix_millis();
        let window_ms = policy.window_ms.max(1);
        let (current_key, previous_key) = Self::bucket_keys(key, now_ms / window_ms);

        let mut conn = self.conn.clone();
        let (current, previous): (u64, u64) = SLIDING_WINDOW
            .key(&current_key)
            .key(&previous_key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| RateLimitError::Unavailable(e.to_string()))?;

        Ok(Self::decision(current, previous, now_ms, policy))
    }

    async fn status(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError> {
        let now_ms = Timestamp::now().as_unix_millis();
        let window_ms = policy.window_ms.max(1);
        let (current_key, previous_key) = Self::bucket_keys(key, now_ms / window_ms);

        let mut conn = self.conn.clone();
        let counts: Vec<Option<u64>> = conn
            .get(&[current_key, previous_key][..])
            .await
            .map_err(|e: redis::RedisError| RateLimitError::Unavailable(e.to_string()))?;

        let current = counts.first().copied().flatten().unwrap_or(0);
        let previous = counts.get(1).copied().flatten().unwrap_or(0);

        Ok(Self::decision(current, previous, now_ms, policy))
    }

    async fn reset(&self, key: &str, policy: TierPolicy) -> Result<(), RateLimitError> {
        let now_ms = Timestamp::now().as_unix_millis();
        let window_ms = policy.window_ms.max(1);
        let (current_key, previous_key) = Self::bucket_keys(key, now_ms / window_ms);

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&[current_key, previous_key][..])
            .await
            .map_err(|e: redis::RedisError| RateLimitError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Store-backed behavior is covered by integration environments with a
    // running Redis; the weighting math is testable here.

    fn policy() -> TierPolicy {
        TierPolicy {
            max_requests: 10,
            window_ms: 60_000,
        }
    }

    #[test]
    fn effective_count_ignores_previous_bucket_at_window_end() {
        // 59.9s into the bucket: almost none of the previous one overlaps.
        let effective = RedisRateLimiter::effective_count(3, 10, 59_900, 60_000);
        assert_eq!(effective, 3);
    }

    #[test]
    fn effective_count_weights_previous_bucket_at_window_start() {
        // 6s into the bucket: 90% of the previous bucket still counts.
        let effective = RedisRateLimiter::effective_count(1, 10, 66_000, 60_000);
        assert_eq!(effective, 10);
    }

    #[test]
    fn decision_denies_when_weighted_count_exceeds_limit() {
        let decision = RedisRateLimiter::decision(2, 10, 66_000, policy());
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn decision_allows_within_budget() {
        let decision = RedisRateLimiter::decision(4, 0, 30_000, policy());
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 6);
        assert_eq!(decision.reset_at_ms, 60_000);
    }

    #[test]
    fn bucket_keys_are_namespaced_per_window() {
        let (current, previous) = RedisRateLimiter::bucket_keys("ratelimit:auth:ip:1.2.3.4", 17);
        assert_eq!(current, "ratelimit:auth:ip:1.2.3.4:17");
        assert_eq!(previous, "ratelimit:auth:ip:1.2.3.4:16");
    }
}
