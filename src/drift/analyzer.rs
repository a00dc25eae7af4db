//! Drift Analyzer - per-feature KS comparison and overall verdict

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ks::{ks_two_sample, ComparisonError};
use super::{Dataset, DatasetRole, DriftConfig, DriftError};

/// Result of one analyzer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub feature_pvalues: BTreeMap<String, f64>,
}

impl DriftReport {
    pub fn to_json(&self) -> Result<String, DriftError> {
        serde_json::to_string(self).map_err(|e| DriftError::Report(e.to_string()))
    }

    pub fn write_json(&self, path: &Path) -> Result<(), DriftError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| DriftError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Features whose p-value fell below `threshold`
    pub fn drifted_features(&self, threshold: f64) -> Vec<&str> {
        self.feature_pvalues
            .iter()
            .filter(|(_, p)| **p < threshold)
            .map(|(f, _)| f.as_str())
            .collect()
    }
}

/// Compare `reference` and `live` on every configured feature.
///
/// Any feature that cannot be tested aborts the run; no partial report is
/// produced.
pub fn analyze(
    reference: &Dataset,
    live: &Dataset,
    config: &DriftConfig,
) -> Result<DriftReport, DriftError> {
    config.check()?;

    let mut feature_pvalues = BTreeMap::new();

    for feature in &config.features {
        let ref_column = column(reference, feature, DatasetRole::Reference)?;
        let live_column = column(live, feature, DatasetRole::Live)?;

        let outcome = ks_two_sample(ref_column, live_column).map_err(|e| match e {
            ComparisonError::InsufficientData { left, right } => DriftError::InsufficientData {
                feature: feature.clone(),
                reference: left,
                live: right,
            },
            ComparisonError::NonFinite => DriftError::InvalidValue {
                feature: feature.clone(),
                dataset: if ref_column.iter().any(|v| !v.is_finite()) {
                    DatasetRole::Reference
                } else {
                    DatasetRole::Live
                },
            },
        })?;

        tracing::debug!(
            "KS {}: D={:.4}, p={:.4e} (n_ref={}, n_live={})",
            feature,
            outcome.statistic,
            outcome.p_value,
            ref_column.len(),
            live_column.len()
        );
        feature_pvalues.insert(feature.clone(), outcome.p_value);
    }

    let drift_detected = feature_pvalues.values().any(|p| *p < config.ks_pvalue_threshold);

    Ok(DriftReport {
        drift_detected,
        feature_pvalues,
    })
}

fn column<'a>(
    data: &'a Dataset,
    feature: &str,
    role: DatasetRole,
) -> Result<&'a [f64], DriftError> {
    data.column(feature).ok_or_else(|| DriftError::MissingFeature {
        feature: feature.to_string(),
        dataset: role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: &[(&str, Vec<f64>)]) -> Dataset {
        Dataset::from_columns(
            columns
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        )
        .unwrap()
    }

    fn spread(offset: f64, count: usize) -> Vec<f64> {
        (0..count).map(|i| offset + (i as f64 * 0.37).sin()).collect()
    }

    fn config(features: &[&str]) -> DriftConfig {
        DriftConfig::new(0.05, features.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_identical_datasets_no_drift() {
        let data = dataset(&[("a", spread(0.0, 80)), ("b", spread(3.0, 80))]);
        let report = analyze(&data, &data, &config(&["a", "b"])).unwrap();

        assert!(!report.drift_detected);
        assert!(report.feature_pvalues.values().all(|p| *p > 0.05));
        assert!(report.drifted_features(0.05).is_empty());
    }

    #[test]
    fn test_shifted_feature_flags_drift() {
        let reference = dataset(&[("a", spread(0.0, 80)), ("b", spread(0.0, 80))]);
        let live = dataset(&[("a", spread(0.0, 80)), ("b", spread(10.0, 80))]);
        let report = analyze(&reference, &live, &config(&["a", "b"])).unwrap();

        assert!(report.drift_detected);
        assert_eq!(report.drifted_features(0.05), vec!["b"]);
        assert!(report.feature_pvalues["b"] < 1e-6);
    }

    #[test]
    fn test_missing_live_feature() {
        let reference = dataset(&[("a", spread(0.0, 10)), ("b", spread(0.0, 10))]);
        let live = dataset(&[("a", spread(0.0, 10))]);
        let err = analyze(&reference, &live, &config(&["a", "b"])).unwrap_err();

        assert!(matches!(
            err,
            DriftError::MissingFeature { ref feature, dataset: DatasetRole::Live } if feature == "b"
        ));
    }

    #[test]
    fn test_insufficient_data_aborts() {
        let reference = dataset(&[("a", vec![1.0])]);
        let live = dataset(&[("a", spread(0.0, 10))]);
        let err = analyze(&reference, &live, &config(&["a"])).unwrap_err();

        assert!(matches!(err, DriftError::InsufficientData { reference: 1, live: 10, .. }));
    }

    #[test]
    fn test_non_finite_names_dataset() {
        let reference = dataset(&[("a", spread(0.0, 10))]);
        let mut values = spread(0.0, 10);
        values[4] = f64::NAN;
        let live = dataset(&[("a", values)]);
        let err = analyze(&reference, &live, &config(&["a"])).unwrap_err();

        assert!(matches!(err, DriftError::InvalidValue { dataset: DatasetRole::Live, .. }));
    }

    #[test]
    fn test_report_is_deterministic() {
        let reference = dataset(&[("z", spread(0.0, 50)), ("a", spread(0.2, 70))]);
        let live = dataset(&[("z", spread(0.1, 60)), ("a", spread(0.0, 40))]);
        let cfg = config(&["z", "a"]);

        let first = analyze(&reference, &live, &cfg).unwrap().to_json().unwrap();
        let second = analyze(&reference, &live, &cfg).unwrap().to_json().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("{\"drift_detected\":"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift_result.json");
        let data = dataset(&[("a", spread(0.0, 20))]);
        let report = analyze(&data, &data, &config(&["a"])).unwrap();
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: DriftReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report);
    }
}
