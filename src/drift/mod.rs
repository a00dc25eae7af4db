//! Drift Detection Module
//!
//! Compares feature distributions between a reference dataset and live
//! traffic with the two-sample Kolmogorov-Smirnov test.
//!
//! ```text
//! reference ─┐
//!            ├─► per-feature KS ─► p-values ─► any p < threshold? ─► DriftReport
//! live ──────┘
//! ```

pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod ks;

use std::fmt;
use std::path::PathBuf;

pub use analyzer::{analyze, DriftReport};
pub use config::DriftConfig;
pub use dataset::{DataSource, Dataset};
pub use ks::{ks_two_sample, KsOutcome};

/// Which side of the comparison a dataset is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetRole {
    Reference,
    Live,
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetRole::Reference => write!(f, "reference"),
            DatasetRole::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("feature '{feature}' is missing from the {dataset} dataset")]
    MissingFeature { feature: String, dataset: DatasetRole },

    #[error(
        "feature '{feature}' has insufficient data: reference has {reference} observations, \
         live has {live}, at least 2 each are required"
    )]
    InsufficientData {
        feature: String,
        reference: usize,
        live: usize,
    },

    #[error("feature '{feature}' contains a non-finite value in the {dataset} dataset")]
    InvalidValue { feature: String, dataset: DatasetRole },

    #[error("invalid drift configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to write report: {0}")]
    Report(String),
}
