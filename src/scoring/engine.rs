//! Scoring Engine - runs the loaded classifier over a validated batch

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use serde::Serialize;

use super::ScoringError;
use crate::model::ModelHandle;

/// Latency stats for `/health`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub inference_count: u64,
    pub avg_latency_ms: f64,
}

pub struct ScoringEngine {
    model: Arc<ModelHandle>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl ScoringEngine {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self {
            model,
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn is_available(&self) -> bool {
        self.model.is_loaded()
    }

    /// One probability per row, in row order.
    ///
    /// Rows must already have been checked against the feature contract.
    pub fn predict(&self, rows: &[Vec<f64>], n_features: usize) -> Result<Vec<f64>, ScoringError> {
        let model = self.model.current().ok_or(ScoringError::ModelUnavailable)?;

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((rows.len(), n_features), flat)
            .map_err(|e| ScoringError::InferenceFailure(format!("Array error: {}", e)))?;

        let start = Instant::now();
        let probabilities = model
            .predict_proba(matrix.view())
            .map_err(|e| ScoringError::InferenceFailure(e.to_string()))?;
        let elapsed_us = start.elapsed().as_micros() as u64;

        if probabilities.len() != rows.len() {
            return Err(ScoringError::InferenceFailure(format!(
                "model returned {} probabilities for {} rows",
                probabilities.len(),
                rows.len()
            )));
        }
        if let Some(bad) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ScoringError::InferenceFailure(format!(
                "model returned probability {} outside [0, 1]",
                bad
            )));
        }

        self.latency_sum_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Inference over {} rows took {}us", rows.len(), elapsed_us);

        Ok(probabilities)
    }

    pub fn stats(&self) -> EngineStats {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 { (sum as f64 / count as f64) / 1000.0 } else { 0.0 };

        EngineStats {
            inference_count: count,
            avg_latency_ms: avg,
        }
    }
}
