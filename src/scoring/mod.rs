//! Scoring Service
//!
//! ```text
//! batch ─► FeatureContract::check_batch ─► ScoringEngine ─► labels
//!                                                            │
//!                          metrics (always) ◄────────────────┤
//!                          audit append (best effort) ◄──────┘
//! ```
//!
//! Invalid input and a missing model fail before any side effect.

pub mod engine;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::audit::{AuditRecord, AuditStore};
use crate::features::FeatureContract;
use crate::metrics::MetricsRecorder;

pub use engine::{EngineStats, ScoringEngine};

/// Default decision threshold; a probability equal to it is fraud
pub const DEFAULT_FRAUD_THRESHOLD: f64 = 0.4;

/// Default upper bound on one audit append
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("Inference failed: {0}")]
    InferenceFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Fraud,
    Legit,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Fraud => "fraud",
            Label::Legit => "legit",
        }
    }

    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Label::Fraud
        } else {
            Label::Legit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreResult {
    pub probability: f64,
    pub label: Label,
}

pub struct ScoringService {
    contract: Arc<FeatureContract>,
    engine: ScoringEngine,
    metrics: Arc<MetricsRecorder>,
    audit: Arc<dyn AuditStore>,
    threshold: f64,
    audit_timeout: Duration,
}

impl ScoringService {
    pub fn new(
        contract: Arc<FeatureContract>,
        engine: ScoringEngine,
        metrics: Arc<MetricsRecorder>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            contract,
            engine,
            metrics,
            audit,
            threshold: DEFAULT_FRAUD_THRESHOLD,
            audit_timeout: DEFAULT_AUDIT_TIMEOUT,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score a batch of raw feature vectors, one result per row in input order
    pub async fn score(&self, batch: &[Vec<f64>]) -> Result<Vec<ScoreResult>, ScoringError> {
        self.contract.check_batch(batch)?;

        let probabilities = self.engine.predict(batch, self.contract.expected_count())?;

        let results: Vec<ScoreResult> = probabilities
            .into_iter()
            .map(|probability| ScoreResult {
                probability,
                label: Label::from_probability(probability, self.threshold),
            })
            .collect();

        self.metrics.record(&results);

        let records: Vec<AuditRecord> = batch
            .iter()
            .zip(&results)
            .map(|(row, result)| AuditRecord::new(row.clone(), result.probability))
            .collect();
        self.persist(&records).await;

        let frauds = results.iter().filter(|r| r.label == Label::Fraud).count();
        tracing::info!("Scored {} rows ({} flagged as fraud)", results.len(), frauds);

        Ok(results)
    }

    /// Audit failures never reach the caller
    async fn persist(&self, records: &[AuditRecord]) {
        match tokio::time::timeout(self.audit_timeout, self.audit.append(records)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Audit append failed for {} rows: {}", records.len(), e),
            Err(_) => tracing::error!(
                "Audit append timed out after {}ms for {} rows",
                self.audit_timeout.as_millis(),
                records.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditError;
    use crate::drift::Dataset;
    use crate::model::{Classifier, ModelError, ModelHandle, ModelInfo};
    use ndarray::ArrayView2;
    use parking_lot::Mutex;

    struct Fixed(f64);

    impl Classifier for Fixed {
        fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError> {
            Ok(vec![self.0; matrix.nrows()])
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                kind: "fixed".to_string(),
                source: "<test>".to_string(),
                feature_count: 3,
                loaded_at: chrono::Utc::now(),
            }
        }
    }

    /// First column is the probability
    struct Echo;

    impl Classifier for Echo {
        fn predict_proba(&self, matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>, ModelError> {
            Ok(matrix.column(0).to_vec())
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                kind: "echo".to_string(),
                source: "<test>".to_string(),
                feature_count: 3,
                loaded_at: chrono::Utc::now(),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<AuditRecord>>,
        fail: bool,
    }

    #[axum::async_trait]
    impl AuditStore for MemoryStore {
        async fn append(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
            if self.fail {
                return Err(AuditError::PersistenceFailure("disk full".to_string()));
            }
            self.rows.lock().extend_from_slice(records);
            Ok(())
        }

        async fn read_columns(&self, _features: &[String]) -> Result<Dataset, AuditError> {
            Ok(Dataset::empty())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn contract() -> Arc<FeatureContract> {
        Arc::new(FeatureContract::new(1, vec!["a".into(), "b".into(), "c".into()]))
    }

    fn service(model: Option<Arc<dyn Classifier>>, store: Arc<MemoryStore>) -> ScoringService {
        let handle = match model {
            Some(m) => ModelHandle::with_model(m),
            None => ModelHandle::empty(),
        };
        ScoringService::new(
            contract(),
            ScoringEngine::new(Arc::new(handle)),
            Arc::new(MetricsRecorder::new().unwrap()),
            store,
        )
    }

    #[test]
    fn test_label_boundary() {
        assert_eq!(Label::from_probability(0.4, 0.4), Label::Fraud);
        assert_eq!(Label::from_probability(0.39999, 0.4), Label::Legit);
        assert_eq!(Label::from_probability(1.0, 1.0), Label::Fraud);
        assert_eq!(Label::from_probability(0.0, 0.0), Label::Fraud);
    }

    #[tokio::test]
    async fn test_score_in_order_with_side_effects() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(Some(Arc::new(Echo)), store.clone());

        let batch = vec![vec![0.1, 0.0, 0.0], vec![0.4, 1.0, 2.0], vec![0.95, 3.0, 4.0]];
        let results = svc.score(&batch).await.unwrap();

        let probs: Vec<f64> = results.iter().map(|r| r.probability).collect();
        assert_eq!(probs, vec![0.1, 0.4, 0.95]);
        assert_eq!(
            results.iter().map(|r| r.label).collect::<Vec<_>>(),
            vec![Label::Legit, Label::Fraud, Label::Fraud]
        );

        let snap = svc.metrics().snapshot();
        assert_eq!((snap.fraud_total, snap.legit_total), (2, 1));

        let rows = store.rows.lock();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], AuditRecord::new(vec![0.4, 1.0, 2.0], 0.4));
    }

    #[tokio::test]
    async fn test_invalid_input_has_no_side_effects() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(Some(Arc::new(Fixed(0.9))), store.clone());

        for batch in [vec![], vec![vec![0.0, 0.0]], vec![vec![0.0, f64::NAN, 0.0]]] {
            let err = svc.score(&batch).await.unwrap_err();
            assert!(matches!(err, ScoringError::InvalidInput(_)));
        }

        assert_eq!(svc.metrics().snapshot().probability_count, 0);
        assert!(store.rows.lock().is_empty());
        assert_eq!(svc.engine().stats().inference_count, 0);
    }

    #[tokio::test]
    async fn test_missing_model_is_unavailable() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(None, store.clone());

        let err = tokio_test::assert_err!(svc.score(&[vec![0.0, 0.0, 0.0]]).await);
        assert_eq!(err, ScoringError::ModelUnavailable);
        assert_eq!(err.to_string(), "Model not loaded");
        assert!(store.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_model_output_fails() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(Some(Arc::new(Fixed(1.3))), store.clone());

        let err = svc.score(&[vec![0.0, 0.0, 0.0]]).await.unwrap_err();
        assert!(matches!(err, ScoringError::InferenceFailure(_)));
        assert_eq!(svc.metrics().snapshot().probability_count, 0);
        assert!(store.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_scoring() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let svc = service(Some(Arc::new(Fixed(0.2))), store).with_threshold(0.5);

        let results = tokio_test::assert_ok!(svc.score(&[vec![0.0, 0.0, 0.0]]).await);
        assert_eq!(results[0].label, Label::Legit);
        assert_eq!(svc.metrics().snapshot().legit_total, 1);
    }

    #[tokio::test]
    async fn test_model_swap_between_requests() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(Some(Arc::new(Fixed(0.1))), store);

        let first = svc.score(&[vec![0.0; 3]]).await.unwrap();
        svc.engine().model().swap(Arc::new(Fixed(0.8)));
        let second = svc.score(&[vec![0.0; 3]]).await.unwrap();

        assert_eq!(first[0].probability, 0.1);
        assert_eq!(second[0].probability, 0.8);
    }
}
