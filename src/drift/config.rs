//! Drift configuration file
//!
//! ```json
//! { "ks_pvalue_threshold": 0.05, "features": ["V1", "V2", "Amount_scaled"] }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::DriftError;
use crate::features::FeatureContract;

pub const DEFAULT_KS_PVALUE_THRESHOLD: f64 = 0.05;

/// On-disk shape; every key optional
#[derive(Debug, Deserialize)]
struct DriftConfigFile {
    ks_pvalue_threshold: Option<f64>,
    features: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct DriftConfig {
    /// A feature drifts when its p-value falls below this
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub ks_pvalue_threshold: f64,

    /// Features to compare, in report order
    #[validate(length(min = 1))]
    pub features: Vec<String>,
}

impl DriftConfig {
    pub fn new(ks_pvalue_threshold: f64, features: Vec<String>) -> Result<Self, DriftError> {
        let config = Self {
            ks_pvalue_threshold,
            features,
        };
        config.check()?;
        Ok(config)
    }

    /// Compare every contract feature at the default threshold
    pub fn for_contract(contract: &FeatureContract) -> Self {
        Self {
            ks_pvalue_threshold: DEFAULT_KS_PVALUE_THRESHOLD,
            features: contract.names().to_vec(),
        }
    }

    /// Parse a config document; a missing `features` key means all contract features
    pub fn from_json_str(text: &str, contract: &FeatureContract) -> Result<Self, DriftError> {
        let raw: DriftConfigFile =
            serde_json::from_str(text).map_err(|e| DriftError::InvalidConfig(e.to_string()))?;

        Self::new(
            raw.ks_pvalue_threshold.unwrap_or(DEFAULT_KS_PVALUE_THRESHOLD),
            raw.features.unwrap_or_else(|| contract.names().to_vec()),
        )
    }

    pub fn load(path: &Path, contract: &FeatureContract) -> Result<Self, DriftError> {
        let text = std::fs::read_to_string(path).map_err(|source| DriftError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, contract)
    }

    pub fn check(&self) -> Result<(), DriftError> {
        self.validate()
            .map_err(|e| DriftError::InvalidConfig(e.to_string()))?;

        let mut seen = HashSet::new();
        if let Some(dup) = self.features.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(DriftError::InvalidConfig(format!("feature '{}' listed twice", dup)));
        }
        Ok(())
    }
}
