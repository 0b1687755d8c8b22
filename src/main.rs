//! WagerLine API server entry point.
//!
//! Assembles the rate-governor middleware chain over the API surface.
//! The demonstration routes stand in for the real endpoint handlers; every
//! request passes through tier classification, identity resolution, and
//! the rate limit check before reaching them.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Json, Router,
};
use redis::aio::MultiplexedConnection;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use wagerline::adapters::http::middleware::rate_limit_middleware;
use wagerline::adapters::rate_limiter::RateLimitService;
use wagerline::config::{AppConfig, RedisConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let store = connect_store(&config.redis).await;
    let service = Arc::new(RateLimitService::new(&config.rate_limit, store));

    let app = router(service, &config);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "wagerline listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connect to the shared counting store, if configured.
///
/// Connection problems are not fatal: the governor starts in degraded mode
/// and the facade serves decisions from the in-process fallback.
async fn connect_store(config: &RedisConfig) -> Option<MultiplexedConnection> {
    if !config.is_configured() {
        return None;
    }
    let url = config.url.as_deref()?;

    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "invalid counting store URL, starting in degraded mode");
            return None;
        }
    };

    match tokio::time::timeout(config.timeout(), client.get_multiplexed_async_connection()).await {
        Ok(Ok(conn)) => {
            tracing::info!("connected to counting store");
            Some(conn)
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "counting store connection failed, starting in degraded mode");
            None
        }
        Err(_) => {
            tracing::error!("counting store connection timed out, starting in degraded mode");
            None
        }
    }
}

/// Build the API router with the rate-governor middleware chain.
fn router(service: Arc<RateLimitService>, config: &AppConfig) -> Router {
    let cors = if config.server.cors_origins_list().is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_origins_list()
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/api/auth/login", post(placeholder))
        .route("/api/bets", post(placeholder))
        .route("/api/parlays", post(placeholder))
        .route("/api/ai/picks", post(placeholder))
        .route("/api/sports", get(placeholder))
        .route("/api/events", get(placeholder))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(
            service,
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors)
}

async fn placeholder() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
