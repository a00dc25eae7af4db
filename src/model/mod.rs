//! Model Module - classifier capability and the loaded-model slot
//!
//! The scoring core only depends on [`Classifier::predict_proba`]. Artifacts
//! are loaded from versioned, schema-checked files and swapped into a
//! [`ModelHandle`] as a whole, so in-flight requests keep the snapshot they
//! started with.

pub mod params;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use parking_lot::RwLock;
use serde::Serialize;

use crate::features::FeatureContract;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported model file type: {0}")]
    UnsupportedFormat(String),

    #[error(
        "model features do not match the feature contract: expected {expected:?}, got {actual:?}"
    )]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("invalid model parameters: {0}")]
    Invalid(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

// ============================================================================
// CLASSIFIER CAPABILITY
// ============================================================================

/// Metadata about a loaded model, reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub kind: String,
    pub source: String,
    pub feature_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// A trained binary classifier.
///
/// Implementations are read-only after construction and must be safe to call
/// from many requests at once.
pub trait Classifier: Send + Sync {
    /// Positive-class probability for every row of `matrix`, in row order
    fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError>;

    fn info(&self) -> ModelInfo;
}

// ============================================================================
// MODEL SLOT
// ============================================================================

/// Currently loaded classifier, replaced atomically on reload
#[derive(Default)]
pub struct ModelHandle {
    slot: RwLock<Option<Arc<dyn Classifier>>>,
}

impl ModelHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn Classifier>) -> Self {
        Self {
            slot: RwLock::new(Some(model)),
        }
    }

    /// Snapshot of the current model; the read lock is held only for the clone
    pub fn current(&self) -> Option<Arc<dyn Classifier>> {
        self.slot.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn info(&self) -> Option<ModelInfo> {
        self.current().map(|m| m.info())
    }

    /// Install a new model, returning the one it replaced
    pub fn swap(&self, model: Arc<dyn Classifier>) -> Option<Arc<dyn Classifier>> {
        self.slot.write().replace(model)
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load a model artifact, picking the backend from the file extension
pub fn load_model(
    path: &Path,
    contract: &FeatureContract,
) -> Result<Arc<dyn Classifier>, ModelError> {
    tracing::info!("Loading model from: {}", path.display());

    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => params::load_json(path, contract),
        #[cfg(feature = "onnx")]
        "onnx" => onnx::OnnxClassifier::load(path, contract)
            .map(|m| Arc::new(m) as Arc<dyn Classifier>),
        other => Err(ModelError::UnsupportedFormat(other.to_string())),
    }
}
