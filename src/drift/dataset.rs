//! Column-oriented numeric datasets for drift comparison

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::DriftError;
use crate::db::{self, ColumnReadError};

/// Named numeric columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: BTreeMap<String, Vec<f64>>,
    rows: usize,
}

impl Dataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(name, values)` pairs; all columns must have the same length
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, DriftError> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut map = BTreeMap::new();

        for (name, values) in columns {
            if values.len() != rows {
                return Err(DriftError::Parse {
                    origin: "dataset".to_string(),
                    message: format!(
                        "column '{}' has {} values, expected {}",
                        name,
                        values.len(),
                        rows
                    ),
                });
            }
            map.insert(name, values);
        }

        Ok(Self { columns: map, rows })
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Parse CSV text with a header row, keeping only the `wanted` columns.
    ///
    /// Empty cells load as `NaN`; the comparator rejects them later. Columns
    /// that are not wanted are never interpreted, so they may hold any text.
    pub fn parse_csv(text: &str, wanted: &[String], origin: &str) -> Result<Self, DriftError> {
        let parse_err = |message: String| DriftError::Parse {
            origin: origin.to_string(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let header = reader.headers().map_err(|e| parse_err(e.to_string()))?.clone();
        let mut selected: Vec<(&String, usize)> = Vec::new();
        for name in wanted {
            if selected.iter().any(|(n, _)| *n == name) {
                continue;
            }
            if let Some(idx) = header.iter().position(|h| h == name.as_str()) {
                selected.push((name, idx));
            }
        }

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); selected.len()];
        for result in reader.records() {
            let record = result.map_err(|e| parse_err(e.to_string()))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            for ((name, idx), column) in selected.iter().zip(columns.iter_mut()) {
                let raw = record.get(*idx).unwrap_or_default();
                let value = if raw.is_empty() {
                    f64::NAN
                } else {
                    raw.parse::<f64>().map_err(|_| {
                        parse_err(format!(
                            "line {}: '{}' is not a number for '{}'",
                            line, raw, name
                        ))
                    })?
                };
                column.push(value);
            }
        }

        Self::from_columns(selected.into_iter().map(|(n, _)| n.clone()).zip(columns).collect())
    }

    /// Load a CSV file with a header row
    pub fn from_csv_path(path: &Path, wanted: &[String]) -> Result<Self, DriftError> {
        let text = std::fs::read_to_string(path).map_err(|source| DriftError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_csv(&text, wanted, &path.display().to_string())
    }

    /// Load the `requests` table of an existing SQLite database
    pub async fn from_sqlite(database_url: &str, wanted: &[String]) -> Result<Self, DriftError> {
        let pool = db::open_read_only(database_url).await?;
        let columns = db::fetch_numeric_columns(&pool, db::AUDIT_TABLE, wanted).await;
        pool.close().await;

        let columns = columns.map_err(|e| match e {
            ColumnReadError::Database(e) => DriftError::Database(e),
            other => DriftError::Parse {
                origin: database_url.to_string(),
                message: other.to_string(),
            },
        })?;
        Self::from_columns(columns)
    }

    /// Pick the loader from the location: `*.csv` files, anything else is SQLite
    pub async fn load(location: &str, wanted: &[String]) -> Result<Self, DriftError> {
        match DataSource::parse(location) {
            DataSource::Csv(path) => Self::from_csv_path(&path, wanted),
            DataSource::Sqlite(url) => Self::from_sqlite(&url, wanted).await,
        }
    }
}

/// Where a dataset is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Csv(PathBuf),
    /// `sqlite:` connection URL
    Sqlite(String),
}

impl DataSource {
    /// `*.csv` is a CSV file; anything else is a SQLite path or URL
    pub fn parse(location: &str) -> Self {
        if location.to_ascii_lowercase().ends_with(".csv") {
            return DataSource::Csv(PathBuf::from(location));
        }
        if location.starts_with("sqlite:") {
            DataSource::Sqlite(location.to_string())
        } else {
            DataSource::Sqlite(format!("sqlite://{}", location))
        }
    }
}
