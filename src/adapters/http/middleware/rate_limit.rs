//! Rate limiting middleware for axum.
//!
//! This module resolves a stable rate-limit identifier for each request,
//! checks it against the tier's budget through [`RateLimitService`], and
//! shapes the 429 rejection when the budget is exhausted.
//!
//! # Identity resolution
//!
//! An authenticated subject id always wins: it cannot be spoofed at the
//! application layer and keys the limit per account. Anonymous callers are
//! keyed by client address, taken from a prioritized list of proxy headers.
//! Any of those headers can originate from the untrusted client, so the
//! candidate address is validated before use; a candidate that fails
//! validation is discarded outright and the caller lands in the shared
//! `ip:unknown` bucket.
//!
//! # Response headers
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `x-ratelimit-limit`: Maximum requests allowed in the window
//! - `x-ratelimit-remaining`: Requests remaining in the current window
//! - `x-ratelimit-reset`: Unix milliseconds when the window resets
//! - `retry-after`: Seconds to wait (only on 429 responses)
//!
//! # Example
//!
//! ```ignore
//! use axum::{middleware, routing::post, Router};
//! use std::sync::Arc;
//!
//! let service = Arc::new(RateLimitService::new(&config.rate_limit, None));
//!
//! let app = Router::new()
//!     .route("/api/bets", post(place_bet))
//!     .layer(middleware::from_fn_with_state(service, rate_limit_middleware));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::rate_limiter::{PolicyTier, RateLimitService};
use crate::domain::foundation::{AuthenticatedUser, Timestamp, UserId};
use crate::ports::RateDecision;

/// Rate limiter middleware state.
pub type RateLimitState = Arc<RateLimitService>;

/// Identifier used when no header yields a validated address.
///
/// Collapses all unidentifiable callers into one shared bucket per tier, a
/// deliberate coarsening.
pub const UNKNOWN_IDENTIFIER: &str = "ip:unknown";

/// Address-bearing headers in trust order: infrastructure first, platform
/// forwarder second, then the generic variants.
const ADDRESS_HEADERS: [&str; 4] = [
    "cf-connecting-ip",
    "x-vercel-forwarded-for",
    "x-real-ip",
    "x-forwarded-for",
];

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix milliseconds when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// Rate limiting middleware enforcing the route's tier budget.
///
/// Classifies the path, resolves the caller identifier (authenticated user
/// if the auth middleware ran before this layer, client address otherwise),
/// and rejects with 429 when the budget is exhausted. Allowed responses are
/// decorated with the informational `x-ratelimit-*` headers.
pub async fn rate_limit_middleware(
    State(service): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let tier = PolicyTier::for_route(request.uri().path());
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.id.clone());

    let identifier = client_identifier(request.headers(), user_id.as_ref());
    let decision = service.check_rate_limit(&identifier, tier).await;

    if !decision.allowed {
        let now_ms = Timestamp::now().as_unix_millis();
        return RateLimitRejection {
            limit: decision.limit,
            retry_after_secs: decision.retry_after_secs(now_ms),
            reset_at_ms: decision.reset_at_ms,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(&mut response, &decision);
    response
}

/// Check one request against `tier`'s budget.
///
/// Returns `None` when the request may proceed, or a ready-to-send
/// rejection when the caller is over budget.
pub async fn enforce(
    service: &RateLimitService,
    request_headers: &HeaderMap,
    tier: PolicyTier,
    user_id: Option<&UserId>,
) -> Option<RateLimitRejection> {
    let identifier = client_identifier(request_headers, user_id);
    let decision = service.check_rate_limit(&identifier, tier).await;

    if decision.allowed {
        return None;
    }

    let now_ms = Timestamp::now().as_unix_millis();
    Some(RateLimitRejection {
        limit: decision.limit,
        retry_after_secs: decision.retry_after_secs(now_ms),
        reset_at_ms: decision.reset_at_ms,
    })
}

/// Resolve the stable rate-limit identifier for a request.
///
/// `user:<id>` when an authenticated subject is known, `ip:<address>` when
/// a proxy header yields a validated address, `ip:unknown` otherwise.
pub fn client_identifier(request_headers: &HeaderMap, user_id: Option<&UserId>) -> String {
    if let Some(id) = user_id {
        return format!("user:{}", id);
    }

    match candidate_address(request_headers) {
        Some(address) if is_valid_ip(&address) => format!("ip:{}", address),
        Some(address) => {
            tracing::warn!(
                candidate = %address,
                "discarding unparseable client address, using shared bucket"
            );
            UNKNOWN_IDENTIFIER.to_string()
        }
        None => {
            tracing::warn!("no address-bearing header present, using shared bucket");
            UNKNOWN_IDENTIFIER.to_string()
        }
    }
}

/// First present, non-empty value from the prioritized header list,
/// taking only the first hop of any comma-separated list.
fn candidate_address(request_headers: &HeaderMap) -> Option<String> {
    for name in ADDRESS_HEADERS {
        let Some(value) = request_headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let first_hop = value.split(',').next().unwrap_or("").trim();
        if !first_hop.is_empty() {
            return Some(first_hop.to_string());
        }
    }
    None
}

/// Validates a candidate client address as IPv4 or IPv6.
fn is_valid_ip(candidate: &str) -> bool {
    is_valid_ipv4(candidate) || is_valid_ipv6(candidate)
}

/// Strict dotted-quad check.
///
/// Rejects out-of-range octets and any octet with a leading zero, which
/// closes off octal-style ambiguity and format smuggling.
fn is_valid_ipv4(candidate: &str) -> bool {
    let mut octets = 0;
    for part in candidate.split('.') {
        octets += 1;
        if octets > 4
            || part.is_empty()
            || part.len() > 3
            || !part.bytes().all(|b| b.is_ascii_digit())
            || (part.len() > 1 && part.starts_with('0'))
        {
            return false;
        }
        match part.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}

/// IPv6 check: loopback, IPv4-mapped, full 8-hextet form, or a single
/// `::` compression.
fn is_valid_ipv6(candidate: &str) -> bool {
    if candidate == "::1" || candidate == "::" {
        return true;
    }
    if let Some(mapped) = candidate.strip_prefix("::ffff:") {
        return is_valid_ipv4(mapped);
    }

    let total_parts = candidate.split(':').count();
    match candidate.find("::") {
        Some(_) => {
            let mut halves = candidate.splitn(2, "::");
            let head = halves.next().unwrap_or("");
            let tail = halves.next().unwrap_or("");
            // Only one compression permitted, and neither side may hide
            // another empty group.
            if tail.contains("::") || !(2..=8).contains(&total_parts) {
                return false;
            }
            let side_ok =
                |side: &str| side.is_empty() || side.split(':').all(is_hextet);
            side_ok(head) && side_ok(tail)
        }
        None => total_parts == 8 && candidate.split(':').all(is_hextet),
    }
}

fn is_hextet(group: &str) -> bool {
    (1..=4).contains(&group.len()) && group.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Rejection for a caller over budget.
#[derive(Debug, Clone)]
pub struct RateLimitRejection {
    /// The rate limit that was exceeded.
    pub limit: u32,
    /// Seconds until the limit resets.
    pub retry_after_secs: u64,
    /// When the window resets, in Unix milliseconds.
    pub reset_at_ms: u64,
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too many requests",
                "retryAfter": self.retry_after_secs,
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(self.limit));
        headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
        headers.insert(
            headers::X_RATELIMIT_RESET.clone(),
            HeaderValue::from(self.reset_at_ms),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));

        response
    }
}

/// Add informational rate limit headers to an allowed response.
fn add_rate_limit_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    headers.insert(
        headers::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        headers::X_RATELIMIT_RESET.clone(),
        HeaderValue::from(decision.reset_at_ms),
    );
}
