//! In-process fallback rate limiter.
//!
//! Used whenever the shared counting store is absent or failing. Counts
//! with a fixed window per key (O(1) memory per key, no request log) and
//! keeps the table bounded under sustained unique-key pressure, e.g.
//! rotating spoofed source addresses.
//!
//! Each process approximates independently; in degraded mode N instances
//! may admit up to N times the configured budget in aggregate. That is an
//! accepted property of fallback operation, not a bug.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::ports::{RateDecision, RateLimitError, RateLimiter, TierPolicy};

/// Bounded in-process limiter using fixed-window counters.
#[derive(Debug)]
pub struct FallbackRateLimiter {
    state: Mutex<FallbackState>,
    max_keys: usize,
    eviction_batch: usize,
    cleanup_interval_ms: u64,
}

#[derive(Debug)]
struct FallbackState {
    entries: HashMap<String, WindowEntry>,
    /// Monotonic insertion counter; orders entries for batch eviction.
    insert_seq: u64,
    last_cleanup_ms: u64,
}

/// State for a single rate limit window.
#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start_ms: u64,
    window_ms: u64,
    seq: u64,
}

impl WindowEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= self.window_ms
    }
}

impl FallbackRateLimiter {
    /// Create a fallback limiter with explicit bounds.
    pub fn new(max_keys: usize, eviction_batch: usize, cleanup_interval_secs: u64) -> Self {
        Self {
            state: Mutex::new(FallbackState {
                entries: HashMap::new(),
                insert_seq: 0,
                last_cleanup_ms: 0,
            }),
            max_keys,
            eviction_batch: eviction_batch.max(1),
            cleanup_interval_ms: cleanup_interval_secs.saturating_mul(1_000),
        }
    }

    /// Create a fallback limiter from startup configuration.
    pub fn from_config(config: &crate::config::RateLimitConfig) -> Self {
        Self::new(
            config.fallback_max_keys,
            config.fallback_eviction_batch,
            config.fallback_cleanup_interval_secs,
        )
    }

    /// Count one request against `key`. Never fails.
    pub fn limit(&self, key: &str, max_requests: u32, window_ms: u64) -> RateDecision {
        self.limit_at(key, max_requests, window_ms, Timestamp::now().as_unix_millis())
    }

    /// Quota snapshot for `key` without consuming a request.
    pub fn peek(&self, key: &str, max_requests: u32, window_ms: u64) -> RateDecision {
        let now_ms = Timestamp::now().as_unix_millis();
        let state = self.lock_state();

        match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now_ms) => RateDecision {
                allowed: entry.count < max_requests,
                limit: max_requests,
                remaining: max_requests.saturating_sub(entry.count),
                reset_at_ms: entry.window_start_ms + entry.window_ms,
            },
            _ => RateDecision {
                allowed: true,
                limit: max_requests,
                remaining: max_requests,
                reset_at_ms: now_ms + window_ms,
            },
        }
    }

    /// Drop any window tracked for `key`.
    pub fn clear(&self, key: &str) {
        self.lock_state().entries.remove(key);
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock_state().entries.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FallbackState> {
        // A poisoned lock only means a panic mid-update; the table is
        // still structurally sound, so keep serving.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn limit_at(&self, key: &str, max_requests: u32, window_ms: u64, now_ms: u64) -> RateDecision {
        let mut state = self.lock_state();

        if now_ms.saturating_sub(state.last_cleanup_ms) >= self.cleanup_interval_ms {
            Self::drop_expired(&mut state, now_ms);
        }

        if let Some(entry) = state.entries.get_mut(key) {
            if entry.is_expired(now_ms) {
                // Window elapsed: start a fresh one in place.
                entry.count = 1;
                entry.window_start_ms = now_ms;
                entry.window_ms = window_ms;
            } else {
                entry.count = entry.count.saturating_add(1);
            }

            let (count, reset_at_ms) = (entry.count, entry.window_start_ms + entry.window_ms);
            return if count > max_requests {
                RateDecision {
                    allowed: false,
                    limit: max_requests,
                    remaining: 0,
                    reset_at_ms,
                }
            } else {
                RateDecision {
                    allowed: true,
                    limit: max_requests,
                    remaining: max_requests - count,
                    reset_at_ms,
                }
            };
        }

        // Brand-new key: make room before inserting.
        if state.entries.len() >= self.max_keys {
            Self::drop_expired(&mut state, now_ms);
            if state.entries.len() >= self.max_keys {
                self.evict_oldest(&mut state);
            }
        }

        let seq = state.insert_seq;
        state.insert_seq += 1;
        state.entries.insert(
            key.to_string(),
            WindowEntry {
                count: 1,
                window_start_ms: now_ms,
                window_ms,
                seq,
            },
        );

        RateDecision {
            allowed: true,
            limit: max_requests,
            remaining: max_requests.saturating_sub(1),
            reset_at_ms: now_ms + window_ms,
        }
    }

    fn drop_expired(state: &mut FallbackState, now_ms: u64) {
        state.entries.retain(|_, entry| !entry.is_expired(now_ms));
        state.last_cleanup_ms = now_ms;
    }

    /// Bulk-evicts the oldest-inserted entries regardless of expiry, to
    /// guarantee forward progress under sustained unique-key pressure.
    fn evict_oldest(&self, state: &mut FallbackState) {
        let batch = self.eviction_batch.min(state.entries.len());
        let mut by_age: Vec<(u64, String)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(seq, _)| *seq);
        for (_, key) in by_age.into_iter().take(batch) {
            state.entries.remove(&key);
        }
        tracing::warn!(
            evicted = batch,
            tracked = state.entries.len(),
            "fallback table at capacity, evicted oldest entries"
        );
    }
}

#[async_trait]
impl RateLimiter for FallbackRateLimiter {
    async fn check(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError> {
        Ok(self.limit(key, policy.max_requests, policy.window_ms))
    }

    async fn status(&self, key: &str, policy: TierPolicy) -> Result<RateDecision, RateLimitError> {
        Ok(self.peek(key, policy.max_requests, policy.window_ms))
    }

    async fn reset(&self, key: &str, _policy: TierPolicy) -> Result<(), RateLimitError> {
        self.clear(key);
        Ok(())
    }
}
