//! SQLite audit backend - one transaction per batch

use std::sync::Arc;

use sqlx::SqlitePool;

use super::{check_record_widths, AuditError, AuditRecord, AuditStore};
use crate::db::{self, SchemaState, AUDIT_TABLE, PROBABILITY_COLUMN};
use crate::drift::Dataset;
use crate::features::FeatureContract;

pub struct SqliteAuditStore {
    pool: SqlitePool,
    contract: Arc<FeatureContract>,
    insert_sql: String,
}

impl SqliteAuditStore {
    pub async fn open(
        database_url: &str,
        contract: Arc<FeatureContract>,
    ) -> Result<Self, AuditError> {
        let pool = db::create_pool(database_url).await?;
        Self::from_pool(pool, contract).await
    }

    /// Existing database only; the schema is neither created nor checked
    pub async fn open_read_only(
        database_url: &str,
        contract: Arc<FeatureContract>,
    ) -> Result<Self, AuditError> {
        let pool = db::open_read_only(database_url).await?;
        let insert_sql = insert_statement(&contract);
        Ok(Self {
            pool,
            contract,
            insert_sql,
        })
    }

    pub async fn from_pool(
        pool: SqlitePool,
        contract: Arc<FeatureContract>,
    ) -> Result<Self, AuditError> {
        match db::ensure_audit_schema(&pool, &contract).await? {
            SchemaState::Mismatch { expected, actual } => {
                return Err(AuditError::SchemaMismatch(format!(
                    "table '{}' has columns {:?}, expected {:?}",
                    AUDIT_TABLE, actual, expected
                )));
            }
            SchemaState::Created | SchemaState::Matches => {}
        }

        let insert_sql = insert_statement(&contract);
        Ok(Self {
            pool,
            contract,
            insert_sql,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn insert_statement(contract: &FeatureContract) -> String {
    let mut columns: Vec<String> = contract.names().iter().map(|n| db::quote_ident(n)).collect();
    columns.push(PROBABILITY_COLUMN.to_string());
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        AUDIT_TABLE,
        columns.join(", "),
        placeholders
    )
}

#[axum::async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        if records.is_empty() {
            return Ok(());
        }
        check_record_widths(records, &self.contract)?;

        // Dropping the transaction on any error rolls the whole batch back
        let mut tx = self.pool.begin().await?;
        for record in records {
            let mut query = sqlx::query(&self.insert_sql);
            for value in &record.features {
                query = query.bind(*value);
            }
            query.bind(record.probability).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::debug!("Persisted {} audit rows", records.len());
        Ok(())
    }

    async fn read_columns(&self, features: &[String]) -> Result<Dataset, AuditError> {
        let columns = db::fetch_numeric_columns(&self.pool, AUDIT_TABLE, features).await?;
        Dataset::from_columns(columns).map_err(|e| AuditError::PersistenceFailure(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("sqlite table '{}'", AUDIT_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_contract() -> Arc<FeatureContract> {
        Arc::new(FeatureContract::new(1, vec!["a".into(), "b".into()]))
    }

    async fn open_temp(dir: &tempfile::TempDir) -> SqliteAuditStore {
        let url = format!("sqlite://{}", dir.path().join("requests.db").display());
        SqliteAuditStore::open(&url, tiny_contract()).await.unwrap()
    }

    async fn row_count(store: &SqliteAuditStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM requests")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir).await;

        store
            .append(&[
                AuditRecord::new(vec![1.0, 2.0], 0.25),
                AuditRecord::new(vec![3.0, 4.0], 0.75),
            ])
            .await
            .unwrap();

        let data = store
            .read_columns(&["b".to_string(), "probability".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert_eq!(data.row_count(), 2);
        assert_eq!(data.column("b"), Some(&[2.0, 4.0][..]));
        assert_eq!(data.column("probability"), Some(&[0.25, 0.75][..]));
        assert!(data.column("a").is_none());
        assert!(data.column("missing").is_none());
    }

    #[tokio::test]
    async fn test_failed_row_rolls_back_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir).await;

        store.append(&[AuditRecord::new(vec![0.0, 0.0], 0.1)]).await.unwrap();

        // Second row violates the probability CHECK constraint mid-batch
        let result = store
            .append(&[
                AuditRecord::new(vec![1.0, 1.0], 0.2),
                AuditRecord::new(vec![2.0, 2.0], 1.5),
                AuditRecord::new(vec![3.0, 3.0], 0.3),
            ])
            .await;

        assert!(matches!(result, Err(AuditError::PersistenceFailure(_))));
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn test_width_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir).await;

        let result = store
            .append(&[AuditRecord::new(vec![1.0, 1.0], 0.2), AuditRecord::new(vec![1.0], 0.2)])
            .await;

        assert!(matches!(result, Err(AuditError::SchemaMismatch(_))));
        assert_eq!(row_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_reopen_with_different_layout_fails() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("requests.db").display());
        SqliteAuditStore::open(&url, tiny_contract()).await.unwrap();

        let other = Arc::new(FeatureContract::new(1, vec!["a".into(), "b".into(), "c".into()]));
        let result = SqliteAuditStore::open(&url, other).await;
        assert!(matches!(result, Err(AuditError::SchemaMismatch(_))));
    }

    #[tokio::test]
    async fn test_concurrent_batches_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_temp(&dir).await);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let v = i as f64;
                let batch: Vec<AuditRecord> =
                    (0..5).map(|_| AuditRecord::new(vec![v, v], 0.5)).collect();
                store.append(&batch).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let data = store.read_columns(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(data.row_count(), 40);
        // Fields of one row never come from different batches
        let a = data.column("a").unwrap();
        let b = data.column("b").unwrap();
        assert!(a.iter().zip(b).all(|(x, y)| x == y));
    }

    #[tokio::test]
    async fn test_read_only_store_reads_but_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("requests.db").display());
        let writer = SqliteAuditStore::open(&url, tiny_contract()).await.unwrap();
        writer.append(&[AuditRecord::new(vec![1.0, 2.0], 0.5)]).await.unwrap();

        let reader = SqliteAuditStore::open_read_only(&url, tiny_contract()).await.unwrap();
        let data = reader.read_columns(&["a".to_string()]).await.unwrap();
        assert_eq!(data.column("a"), Some(&[1.0][..]));

        let result = reader.append(&[AuditRecord::new(vec![3.0, 4.0], 0.5)]).await;
        assert!(matches!(result, Err(AuditError::PersistenceFailure(_))));
        assert_eq!(row_count(&writer).await, 1);

        let missing = format!("sqlite://{}", dir.path().join("absent.db").display());
        assert!(SqliteAuditStore::open_read_only(&missing, tiny_contract()).await.is_err());
    }
}
