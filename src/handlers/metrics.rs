//! Prometheus exposition handler

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};

use crate::{AppResult, AppState};

pub async fn export(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let metrics = state.scoring.metrics();
    let body = metrics.render()?;
    Ok(([(CONTENT_TYPE, metrics.content_type())], body))
}
