//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `rate_limit` - Per-tier request throttling and 429 shaping

pub mod rate_limit;

pub use rate_limit::{
    client_identifier, enforce, rate_limit_middleware, RateLimitRejection, RateLimitState,
};
