//! Rate limit policy configuration.
//!
//! Defines the per-tier request budgets and the bounds of the in-process
//! fallback table. Windows are written as strings like `"1 m"` or `"30 s"`
//! and parsed into milliseconds at startup.

use serde::Deserialize;

use super::error::ValidationError;

/// Milliseconds used when a window specification cannot be parsed.
const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Complete rate limit configuration.
///
/// One policy per endpoint tier, plus the memory bounds of the fallback
/// limiter. Every field has a default so the governor works out of the box.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Login, registration, token refresh.
    #[serde(default = "TierPolicyConfig::auth")]
    pub auth: TierPolicyConfig,
    /// Bets, parlays, challenges, payments, payouts.
    #[serde(default = "TierPolicyConfig::financial")]
    pub financial: TierPolicyConfig,
    /// AI pick analysis.
    #[serde(default = "TierPolicyConfig::ai")]
    pub ai: TierPolicyConfig,
    /// Administrative operations.
    #[serde(default = "TierPolicyConfig::admin")]
    pub admin: TierPolicyConfig,
    /// Public sports and event listings.
    #[serde(default = "TierPolicyConfig::public_data")]
    pub public: TierPolicyConfig,
    /// Everything else.
    #[serde(default = "TierPolicyConfig::api")]
    pub api: TierPolicyConfig,

    /// Hard cap on the number of keys the fallback table may hold.
    #[serde(default = "default_fallback_max_keys")]
    pub fallback_max_keys: usize,

    /// How many of the oldest entries are dropped in one eviction pass.
    #[serde(default = "default_fallback_eviction_batch")]
    pub fallback_eviction_batch: usize,

    /// Seconds between opportunistic expired-entry sweeps.
    #[serde(default = "default_fallback_cleanup_interval_secs")]
    pub fallback_cleanup_interval_secs: u64,
}

/// Request budget for a single tier.
#[derive(Debug, Clone, Deserialize)]
pub struct TierPolicyConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window specification, e.g. `"1 m"`, `"30 s"`, `"1 h"`.
    pub window: String,
}

impl TierPolicyConfig {
    fn policy(max_requests: u32, window: &str) -> Self {
        Self {
            max_requests,
            window: window.to_string(),
        }
    }

    /// Default budget for the auth tier (credential-stuffing protection).
    pub fn auth() -> Self {
        Self::policy(5, "1 m")
    }

    /// Default budget for the financial tier (bet/payment flooding).
    pub fn financial() -> Self {
        Self::policy(10, "1 m")
    }

    /// Default budget for the AI tier (cost exhaustion).
    pub fn ai() -> Self {
        Self::policy(10, "1 m")
    }

    /// Default budget for the admin tier.
    pub fn admin() -> Self {
        Self::policy(30, "1 m")
    }

    /// Default budget for the public-data tier (scraping).
    pub fn public_data() -> Self {
        Self::policy(120, "1 m")
    }

    /// Default budget for the general API tier.
    pub fn api() -> Self {
        Self::policy(60, "1 m")
    }

    /// The window parsed into milliseconds.
    pub fn window_ms(&self) -> u64 {
        parse_window_ms(&self.window)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: TierPolicyConfig::auth(),
            financial: TierPolicyConfig::financial(),
            ai: TierPolicyConfig::ai(),
            admin: TierPolicyConfig::admin(),
            public: TierPolicyConfig::public_data(),
            api: TierPolicyConfig::api(),
            fallback_max_keys: default_fallback_max_keys(),
            fallback_eviction_batch: default_fallback_eviction_batch(),
            fallback_cleanup_interval_secs: default_fallback_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate the policy table and fallback bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, policy) in [
            ("auth", &self.auth),
            ("financial", &self.financial),
            ("ai", &self.ai),
            ("admin", &self.admin),
            ("public", &self.public),
            ("api", &self.api),
        ] {
            if policy.max_requests == 0 {
                return Err(ValidationError::ZeroRequestBudget(name));
            }
        }
        if self.fallback_eviction_batch == 0
            || self.fallback_max_keys == 0
            || self.fallback_eviction_batch > self.fallback_max_keys
        {
            return Err(ValidationError::InvalidFallbackBounds);
        }
        Ok(())
    }
}

/// Parses a window specification into milliseconds.
///
/// Grammar: `<integer><space>?<unit>` with unit one of `s`, `m`, `h`, `d`.
/// Unrecognized input yields one minute rather than an error, so a bad
/// policy string can never take down the request path.
pub fn parse_window_ms(spec: &str) -> u64 {
    let trimmed = spec.trim();
    let Some(unit_start) = trimmed.find(|c: char| !c.is_ascii_digit()) else {
        tracing::warn!(spec, "window specification has no unit, defaulting to 1 m");
        return DEFAULT_WINDOW_MS;
    };
    let (digits, rest) = trimmed.split_at(unit_start);
    let Ok(value) = digits.parse::<u64>() else {
        tracing::warn!(spec, "window specification has no count, defaulting to 1 m");
        return DEFAULT_WINDOW_MS;
    };
    let unit = rest.strip_prefix(' ').unwrap_or(rest);
    let scale: u64 = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => {
            tracing::warn!(spec, "unrecognized window unit, defaulting to 1 m");
            return DEFAULT_WINDOW_MS;
        }
    };
    value.saturating_mul(scale)
}

fn default_fallback_max_keys() -> usize {
    10_000
}

fn default_fallback_eviction_batch() -> usize {
    1_000
}

fn default_fallback_cleanup_interval_secs() -> u64 {
    60
}
