//! FraudGuard - fraud scoring service and feature drift detection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       FRAUDGUARD                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────────┐   ┌──────────────────┐  │
//! │  │  API      │──►│ ScoringService │──►│ MetricsRecorder  │  │
//! │  │  (Axum)   │   │  + Classifier  │   │  (Prometheus)    │  │
//! │  └───────────┘   └───────┬────────┘   └──────────────────┘  │
//! │                          ▼                                   │
//! │                  ┌───────────────┐     ┌─────────────────┐   │
//! │                  │  AuditStore   │◄────│ drift-detector  │   │
//! │                  │ (SQLite/CSV)  │     │  (KS analyzer)  │   │
//! │                  └───────────────┘     └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod config;
pub mod db;
pub mod drift;
pub mod error;
pub mod features;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod scoring;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use config::Config;
use scoring::ScoringService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scoring: Arc<ScoringService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(scoring: Arc<ScoringService>, config: Config) -> Self {
        Self {
            scoring,
            config: Arc::new(config),
        }
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(handlers::health::check));

    // Protected routes (API token)
    let protected_routes = Router::new()
        .route("/predict", post(handlers::predict::predict))
        .route("/metrics", get(handlers::metrics::export))
        .route("/model/reload", post(handlers::model::reload))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_token,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
