//! CSV file audit backend
//!
//! The first line is the header (feature names, `probability`, `created_at`).
//! A batch is encoded completely in memory and written with a single
//! `write_all`; if the write fails the file is cut back to its previous
//! length. A trailing line without a newline is treated as crash residue and
//! ignored by readers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;

use super::{check_record_widths, AuditError, AuditRecord, AuditStore};
use crate::db::{PROBABILITY_COLUMN, TIMESTAMP_COLUMN};
use crate::drift::Dataset;
use crate::features::FeatureContract;

pub struct CsvAuditStore {
    path: PathBuf,
    contract: Arc<FeatureContract>,
    // Serializes writers (and readers against a half-written batch)
    lock: Arc<Mutex<()>>,
}

impl CsvAuditStore {
    /// Open or create the log file, checking the header of an existing one
    pub fn open(path: PathBuf, contract: Arc<FeatureContract>) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let expected = header_line(&contract);
        match read_header(&path)? {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Err(AuditError::SchemaMismatch(format!(
                    "{} has header '{}', expected '{}'",
                    path.display(),
                    actual,
                    expected
                )));
            }
            None => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)?;
                writeln!(file, "{}", expected)?;
                file.sync_data()?;
                tracing::info!("Created audit log {}", path.display());
            }
        }

        Ok(Self {
            path,
            contract,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Use an existing log as is, without creating it or checking its header
    pub fn open_existing(
        path: PathBuf,
        contract: Arc<FeatureContract>,
    ) -> Result<Self, AuditError> {
        if !path.is_file() {
            return Err(AuditError::PersistenceFailure(format!(
                "{} does not exist",
                path.display()
            )));
        }

        Ok(Self {
            path,
            contract,
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Render the whole batch; fails before anything touches the file
    fn encode_batch(&self, records: &[AuditRecord]) -> Result<Vec<u8>, AuditError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut writer = ::csv::Writer::from_writer(Vec::new());

        for (idx, record) in records.iter().enumerate() {
            if record.features.iter().any(|v| !v.is_finite()) {
                return Err(AuditError::PersistenceFailure(format!(
                    "record {} contains a non-finite feature value",
                    idx
                )));
            }
            if !(0.0..=1.0).contains(&record.probability) {
                return Err(AuditError::PersistenceFailure(format!(
                    "record {} has probability {} outside [0, 1]",
                    idx, record.probability
                )));
            }

            let mut fields: Vec<String> = record.features.iter().map(|v| v.to_string()).collect();
            fields.push(record.probability.to_string());
            fields.push(timestamp.clone());
            writer
                .write_record(&fields)
                .map_err(|e| AuditError::PersistenceFailure(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| AuditError::PersistenceFailure(e.error().to_string()))
    }
}

fn header_line(contract: &FeatureContract) -> String {
    let mut columns: Vec<&str> = contract.names().iter().map(|s| s.as_str()).collect();
    columns.push(PROBABILITY_COLUMN);
    columns.push(TIMESTAMP_COLUMN);
    columns.join(",")
}

/// `None` when the file is missing or empty
fn read_header(path: &Path) -> io::Result<Option<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut first = String::new();
    BufReader::new(file).read_line(&mut first)?;
    let first = first.trim_end_matches(['\r', '\n']);
    if first.is_empty() {
        Ok(None)
    } else {
        Ok(Some(first.to_string()))
    }
}

/// Sink a batch is appended to
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write `payload` in one go, restoring the old length on failure
fn append_payload<T: AppendTarget>(target: &mut T, payload: &[u8], path: &Path) -> io::Result<()> {
    let original_len = target.current_len()?;

    let result = target.write_all(payload).and_then(|_| target.sync());
    if let Err(e) = result {
        if let Err(truncate_err) = target.truncate_to(original_len) {
            tracing::error!(
                "Failed to roll back partial audit batch in {}: {}",
                path.display(),
                truncate_err
            );
        }
        return Err(e);
    }
    Ok(())
}

fn write_batch(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    append_payload(&mut file, payload, path)
}

/// File contents up to the last complete line
fn read_committed(path: &Path) -> io::Result<String> {
    let mut text = fs::read_to_string(path)?;
    if !text.ends_with('\n') {
        let keep = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if keep < text.len() {
            tracing::warn!("Ignoring incomplete trailing line in {}", path.display());
        }
        text.truncate(keep);
    }
    Ok(text)
}

#[axum::async_trait]
impl AuditStore for CsvAuditStore {
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        if records.is_empty() {
            return Ok(());
        }
        check_record_widths(records, &self.contract)?;
        let payload = self.encode_batch(records)?;

        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        let rows = records.len();

        // Runs to completion even if the caller stops waiting
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            write_batch(&path, &payload)
        })
        .await
        .map_err(|e| AuditError::PersistenceFailure(format!("writer task failed: {}", e)))??;

        tracing::debug!("Persisted {} audit rows", rows);
        Ok(())
    }

    async fn read_columns(&self, features: &[String]) -> Result<Dataset, AuditError> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        let text = tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            read_committed(&path)
        })
        .await
        .map_err(|e| AuditError::PersistenceFailure(format!("reader task failed: {}", e)))??;

        Dataset::parse_csv(&text, features, &self.path.display().to_string())
            .map_err(|e| AuditError::PersistenceFailure(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("csv file '{}'", self.path.display())
    }
}
