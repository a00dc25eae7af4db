//! Feature Contract - Centralized Feature Definition
//!
//! **This file controls the feature schema** shared by scoring, the audit
//! log and drift analysis.
//!
//! ## Rules:
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION

use crc32fast::Hasher;
use serde::Serialize;

use crate::scoring::ScoringError;

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
/// MUST be incremented when the default layout changes
pub const FEATURE_VERSION: u8 = 1;

/// Number of anonymized PCA components (`V1`..`V28`)
pub const PCA_COMPONENTS: usize = 28;

/// Trailing scaled transaction amount
pub const AMOUNT_FEATURE: &str = "Amount_scaled";

// ============================================================================
// CONTRACT
// ============================================================================

/// Ordered, fixed-size numeric feature schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    version: u8,
    names: Vec<String>,
}

impl FeatureContract {
    /// Build a contract from an explicit ordered name list
    pub fn new(version: u8, names: Vec<String>) -> Self {
        Self { version, names }
    }

    /// `V1`..`V28` followed by `Amount_scaled`
    pub fn fraud_default() -> Self {
        let mut names: Vec<String> = (1..=PCA_COMPONENTS).map(|i| format!("V{}", i)).collect();
        names.push(AMOUNT_FEATURE.to_string());
        Self::new(FEATURE_VERSION, names)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn expected_count(&self) -> usize {
        self.names.len()
    }

    /// True when the vector has the contract's width and only finite values
    pub fn validate(&self, vector: &[f64]) -> bool {
        vector.len() == self.expected_count() && vector.iter().all(|v| v.is_finite())
    }

    /// Validate a whole request batch.
    ///
    /// The error message reports the shape the way clients of the scoring
    /// endpoint have always seen it: `Expected 2D array with K features, got (N, k)`.
    pub fn check_batch(&self, rows: &[Vec<f64>]) -> Result<(), ScoringError> {
        let expected = self.expected_count();

        if rows.is_empty() {
            return Err(ScoringError::InvalidInput(format!(
                "Expected 2D array with {} features, got (0,)",
                expected
            )));
        }

        if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
            return Err(ScoringError::InvalidInput(format!(
                "Expected 2D array with {} features, got ({}, {})",
                expected,
                rows.len(),
                bad.len()
            )));
        }

        // Widths already match, so an invalid row holds a non-finite value
        if let Some((row_idx, row)) = rows.iter().enumerate().find(|(_, r)| !self.validate(r)) {
            if let Some(col_idx) = row.iter().position(|v| !v.is_finite()) {
                return Err(ScoringError::InvalidInput(format!(
                    "Non-finite value in row {} for feature '{}'",
                    row_idx, self.names[col_idx]
                )));
            }
        }

        Ok(())
    }

    /// CRC32 of version + ordered names, used to detect layout mismatches
    pub fn layout_hash(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&[self.version]);
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(&[0]); // Separator
        }
        hasher.finalize()
    }

    pub fn info(&self) -> LayoutInfo {
        LayoutInfo {
            version: self.version,
            hash: self.layout_hash(),
            feature_count: self.expected_count(),
            feature_names: self.names.clone(),
        }
    }
}

impl Default for FeatureContract {
    fn default() -> Self {
        Self::fraud_default()
    }
}

/// Layout summary for health output and logs
#[derive(Debug, Clone, Serialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

// ============================================================================
// TESTS
// ============================================================================
