//! Database module - SQLite connection and audit schema

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::features::FeatureContract;

/// Table holding one row per scored feature vector
pub const AUDIT_TABLE: &str = "requests";
pub const ID_COLUMN: &str = "id";
pub const PROBABILITY_COLUMN: &str = "probability";
pub const TIMESTAMP_COLUMN: &str = "created_at";

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    // SQLite will not create missing directories on its own
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// Open an existing database without creating it
pub async fn open_read_only(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.read_only(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Quote an identifier for use in generated SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column layout of the audit table, in order
pub fn audit_columns(contract: &FeatureContract) -> Vec<String> {
    let mut columns = Vec::with_capacity(contract.expected_count() + 3);
    columns.push(ID_COLUMN.to_string());
    columns.extend(contract.names().iter().cloned());
    columns.push(PROBABILITY_COLUMN.to_string());
    columns.push(TIMESTAMP_COLUMN.to_string());
    columns
}

/// `CREATE TABLE` statement for the audit table
pub fn audit_schema_sql(contract: &FeatureContract) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n",
        AUDIT_TABLE, ID_COLUMN
    );
    for name in contract.names() {
        sql.push_str(&format!("    {} REAL NOT NULL,\n", quote_ident(name)));
    }
    sql.push_str(&format!(
        "    {p} REAL NOT NULL CHECK ({p} >= 0.0 AND {p} <= 1.0),\n",
        p = PROBABILITY_COLUMN
    ));
    sql.push_str(&format!(
        "    {} TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))\n)",
        TIMESTAMP_COLUMN
    ));
    sql
}

/// Column names of `table` in declaration order (empty when it does not exist)
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
        .fetch_all(pool)
        .await?;

    rows.iter().map(|r| r.try_get::<String, _>("name")).collect()
}

/// Outcome of checking the on-disk audit schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaState {
    Created,
    Matches,
    Mismatch { expected: Vec<String>, actual: Vec<String> },
}

/// Create the audit table if absent; never alter an existing one
pub async fn ensure_audit_schema(
    pool: &SqlitePool,
    contract: &FeatureContract,
) -> Result<SchemaState, sqlx::Error> {
    let expected = audit_columns(contract);
    let actual = table_columns(pool, AUDIT_TABLE).await?;

    if !actual.is_empty() {
        if actual == expected {
            return Ok(SchemaState::Matches);
        }
        return Ok(SchemaState::Mismatch { expected, actual });
    }

    sqlx::query(&audit_schema_sql(contract)).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_requests_created ON {}({})",
        AUDIT_TABLE, TIMESTAMP_COLUMN
    ))
    .execute(pool)
    .await?;

    tracing::info!("Audit schema applied successfully ({} columns)", expected.len());
    Ok(SchemaState::Created)
}

/// Failure while reading stored columns as numbers
#[derive(Debug, thiserror::Error)]
pub enum ColumnReadError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("column '{column}' holds a {kind} value in row {row}, expected a number")]
    NonNumeric { column: String, row: usize, kind: String },
}

/// Read numeric columns of `table` that exist, skipping unknown names.
///
/// Returns `(name, values)` pairs in the requested order. Integers and reals
/// load as `f64`, SQL `NULL` becomes `NaN`, and any text or blob cell fails.
pub async fn fetch_numeric_columns(
    pool: &SqlitePool,
    table: &str,
    wanted: &[String],
) -> Result<Vec<(String, Vec<f64>)>, ColumnReadError> {
    let existing: HashSet<String> = table_columns(pool, table).await?.into_iter().collect();
    let mut seen = HashSet::new();
    let selected: Vec<&String> = wanted
        .iter()
        .filter(|name| existing.contains(*name) && seen.insert(name.as_str()))
        .filter(|name| name.as_str() != ID_COLUMN && name.as_str() != TIMESTAMP_COLUMN)
        .collect();

    if selected.is_empty() {
        return Ok(Vec::new());
    }

    // Storage class and value side by side: t0, v0, t1, v1, ...
    let projection = selected
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let q = quote_ident(name);
            format!("typeof({q}) AS t{i}, CAST({q} AS REAL) AS v{i}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let order = if existing.contains(ID_COLUMN) {
        format!(" ORDER BY {}", ID_COLUMN)
    } else {
        String::new()
    };
    let sql = format!("SELECT {} FROM {}{}", projection, quote_ident(table), order);

    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); selected.len()];
    for (row_no, row) in rows.iter().enumerate() {
        for (idx, column) in columns.iter_mut().enumerate() {
            let kind: String = row.try_get(2 * idx)?;
            let value = match kind.as_str() {
                "integer" | "real" => row
                    .try_get::<Option<f64>, _>(2 * idx + 1)?
                    .unwrap_or(f64::NAN),
                "null" => f64::NAN,
                _ => {
                    return Err(ColumnReadError::NonNumeric {
                        column: selected[idx].clone(),
                        row: row_no,
                        kind,
                    })
                }
            };
            column.push(value);
        }
    }

    Ok(selected.into_iter().cloned().zip(columns).collect())
}
