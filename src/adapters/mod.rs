//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `rate_limiter` - Limiter backends (Redis, in-process fallback) and facade
//! - `http` - axum middleware enforcing rate decisions per request

pub mod http;
pub mod rate_limiter;
