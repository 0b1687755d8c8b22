//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port plus the facade that selects
//! between them per call.
//!
//! ## Available Adapters
//!
//! - `RedisRateLimiter` - Sliding-window counting against the shared store
//! - `FallbackRateLimiter` - Bounded in-process fixed-window approximation
//! - `RateLimitService` - Facade; the only entry point request code uses
//!
//! ## Usage
//!
//! ```ignore
//! use wagerline::adapters::rate_limiter::{PolicyTier, RateLimitService};
//!
//! // Without store coordinates the service runs on the fallback alone.
//! let service = RateLimitService::new(&config.rate_limit, None);
//! let decision = service.check_rate_limit("ip:203.0.113.5", PolicyTier::Auth).await;
//! ```

mod facade;
mod in_memory;
mod redis;
mod tiers;

pub use facade::RateLimitService;
pub use in_memory::FallbackRateLimiter;
pub use redis::RedisRateLimiter;
pub use tiers::{PolicyTier, TierTable};
