//! ONNX Runtime classifier (feature `onnx`)
//!
//! Expects a converted binary classifier whose probability output is either
//! `[N, 2]` (class 1 in the second column) or `[N]` / `[N, 1]`.

use std::path::Path;

use chrono::Utc;
use ndarray::ArrayView2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;

use super::{Classifier, ModelError, ModelInfo};
use crate::features::FeatureContract;

pub struct OnnxClassifier {
    // `Session::run` needs exclusive access
    session: Mutex<Session>,
    output_name: String,
    n_features: usize,
    info: ModelInfo,
}

impl OnnxClassifier {
    pub fn load(path: &Path, contract: &FeatureContract) -> Result<Self, ModelError> {
        let session = Session::builder()
            .map_err(|e| ModelError::Invalid(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Invalid(format!("Failed to set optimization: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| ModelError::Invalid(format!("Failed to load model: {}", e)))?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name == "probabilities")
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelError::Invalid("No output defined".to_string()))?;

        tracing::info!("ONNX model loaded, reading output '{}'", output_name);

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            n_features: contract.expected_count(),
            info: ModelInfo {
                kind: "onnx".to_string(),
                source: path.display().to_string(),
                feature_count: contract.expected_count(),
                loaded_at: Utc::now(),
            },
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError> {
        if matrix.ncols() != self.n_features {
            return Err(ModelError::Inference(format!(
                "expected {} columns, got {}",
                self.n_features,
                matrix.ncols()
            )));
        }
        let rows = matrix.nrows();

        let input = matrix.mapv(|v| v as f32);
        let input_tensor = Value::from_array(input)
            .map_err(|e| ModelError::Inference(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ModelError::Inference(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| ModelError::Inference("No output".to_string()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("Extract error: {}", e)))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let stride = match dims.as_slice() {
            [n] if *n as usize == rows => 1,
            [n, 1] if *n as usize == rows => 1,
            [n, 2] if *n as usize == rows => 2,
            other => {
                return Err(ModelError::Inference(format!(
                    "unexpected probability output shape {:?}",
                    other
                )))
            }
        };

        Ok((0..rows).map(|i| f64::from(data[i * stride + stride - 1])).collect())
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }
}
