//! Abuse-policy tiers and route classification.
//!
//! Every route maps to exactly one tier; each tier binds a request budget
//! built once at startup. Classification is a fixed-priority prefix table,
//! kept as data so it stays testable away from any HTTP concerns.

use std::fmt;

use crate::config::RateLimitConfig;
use crate::ports::TierPolicy;

/// Endpoint abuse-policy class.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum PolicyTier {
    /// Login, registration, token refresh.
    Auth,
    /// Bets, parlays, challenges, payments, payouts.
    Financial,
    /// AI pick analysis.
    Ai,
    /// Administrative operations.
    Admin,
    /// Public sports and event listings.
    Public,
    /// Everything else.
    Api,
}

/// Route prefixes in match priority order; first match wins.
const ROUTE_TIERS: &[(&str, PolicyTier)] = &[
    ("/api/auth", PolicyTier::Auth),
    ("/api/bets", PolicyTier::Financial),
    ("/api/parlays", PolicyTier::Financial),
    ("/api/challenges", PolicyTier::Financial),
    ("/api/payments", PolicyTier::Financial),
    ("/api/payouts", PolicyTier::Financial),
    ("/api/ai", PolicyTier::Ai),
    ("/api/analysis", PolicyTier::Ai),
    ("/api/admin", PolicyTier::Admin),
    ("/api/sports", PolicyTier::Public),
    ("/api/events", PolicyTier::Public),
];

impl PolicyTier {
    /// All tiers, in table order.
    pub const ALL: [PolicyTier; 6] = [
        PolicyTier::Auth,
        PolicyTier::Financial,
        PolicyTier::Ai,
        PolicyTier::Admin,
        PolicyTier::Public,
        PolicyTier::Api,
    ];

    /// Classifies a request path into its policy tier.
    ///
    /// Total: any path that matches no prefix is general API traffic.
    pub fn for_route(path: &str) -> Self {
        for (prefix, tier) in ROUTE_TIERS {
            if path.starts_with(prefix) {
                return *tier;
            }
        }
        PolicyTier::Api
    }

    /// Returns the string representation of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyTier::Auth => "auth",
            PolicyTier::Financial => "financial",
            PolicyTier::Ai => "ai",
            PolicyTier::Admin => "admin",
            PolicyTier::Public => "public",
            PolicyTier::Api => "api",
        }
    }

    fn index(self) -> usize {
        match self {
            PolicyTier::Auth => 0,
            PolicyTier::Financial => 1,
            PolicyTier::Ai => 2,
            PolicyTier::Admin => 3,
            PolicyTier::Public => 4,
            PolicyTier::Api => 5,
        }
    }
}

impl fmt::Display for PolicyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable tier-to-budget lookup built once at process start.
#[derive(Debug, Clone)]
pub struct TierTable {
    policies: [TierPolicy; 6],
}

impl TierTable {
    /// Builds the table from startup configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let policy = |c: &crate::config::TierPolicyConfig| TierPolicy {
            max_requests: c.max_requests,
            window_ms: c.window_ms(),
        };
        Self {
            policies: [
                policy(&config.auth),
                policy(&config.financial),
                policy(&config.ai),
                policy(&config.admin),
                policy(&config.public),
                policy(&config.api),
            ],
        }
    }

    /// Returns the budget bound to `tier`.
    pub fn policy(&self, tier: PolicyTier) -> TierPolicy {
        self.policies[tier.index()]
    }
}
