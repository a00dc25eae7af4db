//! FraudGuard scoring server
//!
//! Serves `/predict`, `/health`, `/metrics` and `/model/reload`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fraudguard::audit;
use fraudguard::config::Config;
use fraudguard::features::FeatureContract;
use fraudguard::metrics::MetricsRecorder;
use fraudguard::model::{self, ModelHandle};
use fraudguard::scoring::{ScoringEngine, ScoringService};
use fraudguard::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fraudguard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("FraudGuard scoring server starting...");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("Fraud threshold: {}", config.fraud_threshold);

    match (&config.api_token, config.is_production()) {
        (Some(_), _) => {}
        (None, true) => {
            tracing::error!("API_TOKEN is not set in production, protected routes are open")
        }
        (None, false) => tracing::warn!("API_TOKEN is not set, protected routes are open"),
    }

    let contract = Arc::new(FeatureContract::fraud_default());
    tracing::info!(
        "Feature layout v{} ({} features, hash {:08x})",
        contract.version(),
        contract.expected_count(),
        contract.layout_hash()
    );

    // A missing or broken model leaves the service up but unavailable
    let handle = match model::load_model(&config.model_path, &contract) {
        Ok(loaded) => {
            tracing::info!("Model loaded: {}", loaded.info().kind);
            ModelHandle::with_model(loaded)
        }
        Err(e) => {
            tracing::error!("Failed to load model: {}", e);
            ModelHandle::empty()
        }
    };

    let audit_store = audit::open_store(&config, contract.clone())
        .await
        .context("Failed to open audit store")?;

    let metrics = Arc::new(MetricsRecorder::new().context("Failed to register metrics")?);

    let engine = ScoringEngine::new(Arc::new(handle));
    let scoring = ScoringService::new(contract, engine, metrics, audit_store)
        .with_threshold(config.fraud_threshold)
        .with_audit_timeout(Duration::from_millis(config.audit_timeout_ms));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(AppState::new(Arc::new(scoring), config));

    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
