//! Model management handlers

use axum::{extract::State, Json};

use crate::model::{self, ModelInfo};
use crate::{AppResult, AppState};

/// Reload the artifact at `MODEL_PATH`; the previous model stays on failure
pub async fn reload(State(state): State<AppState>) -> AppResult<Json<ModelInfo>> {
    let path = state.config.model_path.clone();
    let contract = state.scoring.contract().clone();

    let loaded = tokio::task::spawn_blocking(move || model::load_model(&path, &contract))
        .await
        .map_err(|e| crate::AppError::InternalError(format!("Reload task failed: {}", e)))??;

    let info = loaded.info();
    state.scoring.engine().model().swap(loaded);
    tracing::info!("Model reloaded: {} from {}", info.kind, info.source);

    Ok(Json(info))
}
