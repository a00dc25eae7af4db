//! Audit Store - durable append-only log of every scored row
//!
//! Each batch is written as one unit: either every row of the batch becomes
//! visible to readers or none does. The backend is picked from configuration.

pub mod csv;
pub mod sqlite;

use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::db::ColumnReadError;
use crate::drift::{DataSource, Dataset};
use crate::features::FeatureContract;

pub use self::csv::CsvAuditStore;
pub use self::sqlite::SqliteAuditStore;

/// One scored feature vector; the arrival timestamp is assigned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub features: Vec<f64>,
    pub probability: f64,
}

impl AuditRecord {
    pub fn new(features: Vec<f64>, probability: f64) -> Self {
        Self { features, probability }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("audit schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::PersistenceFailure(err.to_string())
    }
}

impl From<ColumnReadError> for AuditError {
    fn from(err: ColumnReadError) -> Self {
        AuditError::PersistenceFailure(err.to_string())
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::PersistenceFailure(err.to_string())
    }
}

/// Append-only storage for scored rows
#[axum::async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist all records of one batch atomically
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError>;

    /// Stored rows restricted to `features`; names the schema lacks are omitted
    async fn read_columns(&self, features: &[String]) -> Result<Dataset, AuditError>;

    fn describe(&self) -> String;
}

/// Reject any record whose width differs from the column layout
pub(crate) fn check_record_widths(
    records: &[AuditRecord],
    contract: &FeatureContract,
) -> Result<(), AuditError> {
    let expected = contract.expected_count();
    let mismatch = records
        .iter()
        .enumerate()
        .find(|(_, r)| r.features.len() != expected);
    if let Some((idx, record)) = mismatch {
        return Err(AuditError::SchemaMismatch(format!(
            "record {} has {} feature values, schema has {} feature columns",
            idx,
            record.features.len(),
            expected
        )));
    }
    Ok(())
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditBackend {
    Sqlite,
    Csv,
}

impl FromStr for AuditBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "db" => Ok(AuditBackend::Sqlite),
            "csv" | "file" => Ok(AuditBackend::Csv),
            other => Err(format!("unknown audit backend '{}'", other)),
        }
    }
}

/// Open the configured audit backend, creating its schema if needed
pub async fn open_store(
    config: &Config,
    contract: Arc<FeatureContract>,
) -> Result<Arc<dyn AuditStore>, AuditError> {
    let store: Arc<dyn AuditStore> = match config.audit_backend {
        AuditBackend::Sqlite => {
            Arc::new(SqliteAuditStore::open(&config.database_url, contract).await?)
        }
        AuditBackend::Csv => {
            Arc::new(CsvAuditStore::open(config.latest_data_path.clone(), contract)?)
        }
    };

    tracing::info!("Audit store: {}", store.describe());
    Ok(store)
}

/// Open an existing audit log for reading, picking the backend from the
/// location the way [`Dataset::load`] does. Nothing is created.
pub async fn open_reader(
    location: &str,
    contract: Arc<FeatureContract>,
) -> Result<Arc<dyn AuditStore>, AuditError> {
    let store: Arc<dyn AuditStore> = match DataSource::parse(location) {
        DataSource::Csv(path) => Arc::new(CsvAuditStore::open_existing(path, contract)?),
        DataSource::Sqlite(url) => {
            Arc::new(SqliteAuditStore::open_read_only(&url, contract).await?)
        }
    };

    tracing::debug!("Reading audit rows from {}", store.describe());
    Ok(store)
}
