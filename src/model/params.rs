//! Versioned JSON model parameters
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "features": ["V1", "...", "Amount_scaled"],
//!   "model": { "kind": "forest", "trees": [ { "nodes": [...] } ] }
//! }
//! ```
//!
//! Tree nodes are either `{"feature", "threshold", "left", "right"}` splits
//! (go left when `x[feature] <= threshold`) or `{"value"}` leaves holding the
//! positive-class probability. Children always come after their parent.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Deserialize;

use super::{Classifier, ModelError, ModelInfo};
use crate::features::FeatureContract;

/// Only artifact layout understood by this build
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub features: Vec<String>,
    pub model: ModelParams,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    Logistic { weights: Vec<f64>, intercept: f64 },
    Forest { trees: Vec<DecisionTree> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Read and schema-check a JSON artifact
pub fn load_json(
    path: &Path,
    contract: &FeatureContract,
) -> Result<Arc<dyn Classifier>, ModelError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: ModelArtifact = serde_json::from_str(&raw)?;
    artifact.into_classifier(contract, path.display().to_string())
}

impl ModelArtifact {
    pub fn into_classifier(
        self,
        contract: &FeatureContract,
        source: String,
    ) -> Result<Arc<dyn Classifier>, ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion(self.format_version));
        }
        if self.features != contract.names() {
            return Err(ModelError::FeatureMismatch {
                expected: contract.names().to_vec(),
                actual: self.features,
            });
        }

        let n_features = contract.expected_count();
        match self.model {
            ModelParams::Logistic { weights, intercept } => {
                let model = LogisticModel::new(weights, intercept, n_features, source)?;
                tracing::info!("Logistic model loaded ({} features)", n_features);
                Ok(Arc::new(model))
            }
            ModelParams::Forest { trees } => {
                let model = ForestModel::new(trees, n_features, source)?;
                tracing::info!("Forest model loaded ({} trees)", model.trees.len());
                Ok(Arc::new(model))
            }
        }
    }
}

fn check_width(matrix: &ArrayView2<'_, f64>, n_features: usize) -> Result<(), ModelError> {
    if matrix.ncols() != n_features {
        return Err(ModelError::Inference(format!(
            "expected {} columns, got {}",
            n_features,
            matrix.ncols()
        )));
    }
    Ok(())
}

// ============================================================================
// LOGISTIC REGRESSION
// ============================================================================

pub struct LogisticModel {
    weights: Array1<f64>,
    intercept: f64,
    info: ModelInfo,
}

impl LogisticModel {
    pub fn new(
        weights: Vec<f64>,
        intercept: f64,
        n_features: usize,
        source: String,
    ) -> Result<Self, ModelError> {
        if weights.len() != n_features {
            return Err(ModelError::Invalid(format!(
                "expected {} weights, got {}",
                n_features,
                weights.len()
            )));
        }
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::Invalid("non-finite coefficient".to_string()));
        }

        Ok(Self {
            weights: Array1::from(weights),
            intercept,
            info: ModelInfo {
                kind: "logistic".to_string(),
                source,
                feature_count: n_features,
                loaded_at: Utc::now(),
            },
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for LogisticModel {
    fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError> {
        check_width(&matrix, self.weights.len())?;
        let logits = matrix.dot(&self.weights);
        Ok(logits.iter().map(|z| sigmoid(z + self.intercept)).collect())
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }
}

// ============================================================================
// RANDOM FOREST
// ============================================================================

pub struct ForestModel {
    trees: Vec<DecisionTree>,
    n_features: usize,
    info: ModelInfo,
}

impl ForestModel {
    pub fn new(
        trees: Vec<DecisionTree>,
        n_features: usize,
        source: String,
    ) -> Result<Self, ModelError> {
        if trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".to_string()));
        }
        for (t, tree) in trees.iter().enumerate() {
            validate_tree(t, tree, n_features)?;
        }

        Ok(Self {
            trees,
            n_features,
            info: ModelInfo {
                kind: "forest".to_string(),
                source,
                feature_count: n_features,
                loaded_at: Utc::now(),
            },
        })
    }
}

fn validate_tree(t: usize, tree: &DecisionTree, n_features: usize) -> Result<(), ModelError> {
    if tree.nodes.is_empty() {
        return Err(ModelError::Invalid(format!("tree {} has no nodes", t)));
    }

    for (i, node) in tree.nodes.iter().enumerate() {
        match *node {
            TreeNode::Split { feature, threshold, left, right } => {
                if feature >= n_features {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {}: feature index {} out of range",
                        t, i, feature
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {}: non-finite threshold",
                        t, i
                    )));
                }
                // Children after parent keeps traversal acyclic
                for child in [left, right] {
                    if child <= i || child >= tree.nodes.len() {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {}: invalid child index {}",
                            t, i, child
                        )));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {}: leaf probability {} outside [0, 1]",
                        t, i, value
                    )));
                }
            }
        }
    }
    Ok(())
}

impl DecisionTree {
    fn evaluate(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }
}

impl Classifier for ForestModel {
    fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError> {
        check_width(&matrix, self.n_features)?;
        let n_trees = self.trees.len() as f64;

        Ok(matrix
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|tree| tree.evaluate(row)).sum::<f64>() / n_trees)
            .collect())
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }
}
