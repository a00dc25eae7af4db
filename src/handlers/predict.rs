//! Prediction handler

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::scoring::ScoringError;
use crate::{AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub fraud_probability: Vec<f64>,
}

/// Score `{"data": [[f1, ..., fK], ...]}`
pub async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<PredictResponse>> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    score_body(state, body).instrument(span).await
}

async fn score_body(state: AppState, body: Bytes) -> AppResult<Json<PredictResponse>> {
    let batch = parse_batch(&body, state.scoring.contract().expected_count())?;
    let results = state.scoring.score(&batch).await?;

    Ok(Json(PredictResponse {
        fraud_probability: results.iter().map(|r| r.probability).collect(),
    }))
}

/// Turn the request body into rows; width and finiteness are left to the contract
fn parse_batch(body: &[u8], expected: usize) -> Result<Vec<Vec<f64>>, ScoringError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ScoringError::InvalidInput(format!("Invalid JSON: {}", e)))?;

    let data = payload
        .get("data")
        .ok_or_else(|| ScoringError::InvalidInput("No 'data' field in JSON".to_string()))?;

    let shape_error = |got: String| {
        ScoringError::InvalidInput(format!(
            "Expected 2D array with {} features, got {}",
            expected, got
        ))
    };

    let rows = data.as_array().ok_or_else(|| shape_error("a non-array value".to_string()))?;

    if !rows.is_empty() && rows.iter().all(|r| r.is_number()) {
        return Err(shape_error(format!("({},)", rows.len())));
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row
                .as_array()
                .ok_or_else(|| shape_error(format!("a non-array value in row {}", i)))?;
            cells
                .iter()
                .map(|cell| {
                    cell.as_f64()
                        .ok_or_else(|| shape_error(format!("a non-numeric value in row {}", i)))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: ScoringError) -> String {
        match err {
            ScoringError::InvalidInput(msg) => msg,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_valid_batch() {
        let rows = parse_batch(br#"{"data": [[1, 2.5], [0, -1e3]]}"#, 2).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.5], vec![0.0, -1000.0]]);
    }

    #[test]
    fn test_missing_data_field() {
        let err = parse_batch(br#"{"rows": []}"#, 2).unwrap_err();
        assert_eq!(message(err), "No 'data' field in JSON");
    }

    #[test]
    fn test_one_dimensional_data() {
        let err = parse_batch(br#"{"data": [1, 2, 3]}"#, 29).unwrap_err();
        assert_eq!(message(err), "Expected 2D array with 29 features, got (3,)");
    }

    #[test]
    fn test_non_numeric_cell() {
        let err = parse_batch(br#"{"data": [[1, "x"]]}"#, 2).unwrap_err();
        assert!(message(err).contains("non-numeric value in row 0"));

        let err = parse_batch(br#"{"data": [[1, null]]}"#, 2).unwrap_err();
        assert!(message(err).starts_with("Expected 2D array with 2 features"));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_batch(b"{not json", 2).unwrap_err();
        assert!(message(err).starts_with("Invalid JSON"));
    }

    #[test]
    fn test_ragged_rows_are_left_to_contract() {
        let rows = parse_batch(br#"{"data": [[1, 2], [3]]}"#, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].len(), 1);
    }
}
