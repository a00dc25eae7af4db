//! Prediction metrics
//!
//! Each recorder owns its registry so tests and multiple app instances never
//! share counters.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;

use crate::scoring::{Label, ScoreResult};

/// Point-in-time copy of the recorded values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub fraud_total: u64,
    pub legit_total: u64,
    pub probability_count: u64,
    pub probability_sum: f64,
}

pub struct MetricsRecorder {
    registry: Registry,
    predictions: IntCounterVec,
    probabilities: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let predictions = IntCounterVec::new(
            Opts::new("predictions_total", "Total number of predictions made"),
            &["predicted_class"],
        )?;
        let probabilities = Histogram::with_opts(
            HistogramOpts::new("fraud_probabilities", "Distribution of fraud probabilities")
                .buckets((0..=10).map(|i| i as f64 / 10.0).collect()),
        )?;
        let app_info =
            IntGaugeVec::new(Opts::new("app_info", "Fraud scoring service"), &["version"])?;

        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(probabilities.clone()))?;
        registry.register(Box::new(app_info.clone()))?;

        // Both labels show up in the exposition before the first request
        for label in [Label::Fraud, Label::Legit] {
            predictions.with_label_values(&[label.as_str()]);
        }
        app_info.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1);

        Ok(Self {
            registry,
            predictions,
            probabilities,
        })
    }

    pub fn record(&self, results: &[ScoreResult]) {
        for result in results {
            self.predictions.with_label_values(&[result.label.as_str()]).inc();
            self.probabilities.observe(result.probability);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fraud_total: self.predictions.with_label_values(&[Label::Fraud.as_str()]).get(),
            legit_total: self.predictions.with_label_values(&[Label::Legit.as_str()]).get(),
            probability_count: self.probabilities.get_sample_count(),
            probability_sum: self.probabilities.get_sample_sum(),
        }
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(probability: f64, label: Label) -> ScoreResult {
        ScoreResult { probability, label }
    }

    #[test]
    fn test_fresh_recorder_exposes_zeroed_series() {
        let metrics = MetricsRecorder::new().unwrap();
        let text = metrics.render().unwrap();

        assert!(text.contains("predictions_total{predicted_class=\"fraud\"} 0"));
        assert!(text.contains("predictions_total{predicted_class=\"legit\"} 0"));
        assert!(text.contains("fraud_probabilities_bucket{le=\"0.5\"} 0"));
        assert!(text.contains("app_info{version="));
    }

    #[test]
    fn test_record_counts_and_buckets() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record(&[
            result(0.9, Label::Fraud),
            result(0.05, Label::Legit),
            result(0.3, Label::Legit),
        ]);

        let snap = metrics.snapshot();
        assert_eq!(snap.fraud_total, 1);
        assert_eq!(snap.legit_total, 2);
        assert_eq!(snap.probability_count, 3);
        assert!((snap.probability_sum - 1.25).abs() < 1e-9);

        let text = metrics.render().unwrap();
        assert!(text.contains("fraud_probabilities_bucket{le=\"0.1\"} 1"));
        assert!(text.contains("fraud_probabilities_bucket{le=\"1\"} 3"));
    }

    #[test]
    fn test_recorders_are_independent() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();
        a.record(&[result(0.8, Label::Fraud)]);
        assert_eq!(b.snapshot().fraud_total, 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record(&[result(0.7, Label::Fraud)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.fraud_total, 2000);
        assert_eq!(snap.probability_count, 2000);
    }
}
