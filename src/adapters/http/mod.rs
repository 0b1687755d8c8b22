//! HTTP adapters for axum.

pub mod middleware;
