//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::features::LayoutInfo;
use crate::model::ModelInfo;
use crate::scoring::EngineStats;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_loaded: bool,
    model: Option<ModelInfo>,
    layout: LayoutInfo,
    fraud_threshold: f64,
    engine: EngineStats,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let scoring = &state.scoring;
    let model = scoring.engine().model().info();

    Json(HealthResponse {
        status: if model.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: model.is_some(),
        model,
        layout: scoring.contract().info(),
        fraud_threshold: scoring.threshold(),
        engine: scoring.engine().stats(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
