//! Drift detector
//!
//! Compares the reference dataset with recent scoring traffic and writes a
//! JSON report.
//!
//! | Variable            | Default                  |
//! |---------------------|--------------------------|
//! | `OLD_DATA_DB`       | `data/reference_data.db` |
//! | `NEW_DATA_DB`       | `data/requests.db`       |
//! | `DRIFT_CONFIG`      | `drift_config.json`      |
//! | `DRIFT_RESULT_PATH` | `drift_result.json`      |

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fraudguard::audit;
use fraudguard::drift::{analyze, Dataset, DriftConfig};
use fraudguard::features::FeatureContract;

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fraudguard=info,drift_detector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reference_source = var_or("OLD_DATA_DB", "data/reference_data.db");
    let live_source = var_or("NEW_DATA_DB", "data/requests.db");
    let config_path = PathBuf::from(var_or("DRIFT_CONFIG", "drift_config.json"));
    let result_path = PathBuf::from(var_or("DRIFT_RESULT_PATH", "drift_result.json"));

    let contract = Arc::new(FeatureContract::fraud_default());
    let config = DriftConfig::load(&config_path, &contract)
        .with_context(|| format!("Failed to load drift config {}", config_path.display()))?;

    tracing::info!(
        "Comparing {} features at p < {}",
        config.features.len(),
        config.ks_pvalue_threshold
    );

    let reference = Dataset::load(&reference_source, &config.features)
        .await
        .with_context(|| format!("Failed to load reference data from {}", reference_source))?;
    // Read through the audit store so a torn trailing row is skipped
    let live_store = audit::open_reader(&live_source, contract)
        .await
        .with_context(|| format!("Failed to open live data {}", live_source))?;
    let live = live_store
        .read_columns(&config.features)
        .await
        .with_context(|| format!("Failed to load live data from {}", live_source))?;

    tracing::info!(
        "Reference rows: {}, live rows: {}",
        reference.row_count(),
        live.row_count()
    );

    let report = analyze(&reference, &live, &config).context("Drift analysis failed")?;

    for feature in report.drifted_features(config.ks_pvalue_threshold) {
        tracing::warn!("Drift in {} (p={:.4e})", feature, report.feature_pvalues[feature]);
    }

    report
        .write_json(&result_path)
        .with_context(|| format!("Failed to write {}", result_path.display()))?;

    println!("Drift detected? {}", report.drift_detected);
    Ok(())
}
