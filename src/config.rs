//! Configuration module

use std::env;
use std::path::PathBuf;

use crate::audit::AuditBackend;
use crate::scoring::DEFAULT_FRAUD_THRESHOLD;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Model artifact (`.json`, or `.onnx` with the `onnx` feature)
    pub model_path: PathBuf,

    /// Probability at or above which a transaction is labelled fraud
    pub fraud_threshold: f64,

    /// Audit log backend
    pub audit_backend: AuditBackend,

    /// SQLite audit database
    pub database_url: String,

    /// CSV audit file
    pub latest_data_path: PathBuf,

    /// Upper bound on one audit append
    pub audit_timeout_ms: u64,

    /// Bearer token for protected routes; `None` leaves them open
    pub api_token: Option<String>,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            model_path: PathBuf::from("models/fraud_model.json"),
            fraud_threshold: DEFAULT_FRAUD_THRESHOLD,
            audit_backend: AuditBackend::Sqlite,
            database_url: "sqlite://data/requests.db".to_string(),
            latest_data_path: PathBuf::from("data/latest_data.csv"),
            audit_timeout_ms: 2000,
            api_token: None,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let fraud_threshold = match var("FRAUD_THRESHOLD").map(|t| t.parse::<f64>()) {
            None => defaults.fraud_threshold,
            Some(Ok(t)) if (0.0..=1.0).contains(&t) => t,
            Some(_) => {
                tracing::warn!(
                    "FRAUD_THRESHOLD must be a number within [0, 1], using {}",
                    defaults.fraud_threshold
                );
                defaults.fraud_threshold
            }
        };

        let audit_backend = match var("AUDIT_BACKEND").map(|b| b.parse::<AuditBackend>()) {
            None => defaults.audit_backend,
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                tracing::warn!("{}, using sqlite", e);
                defaults.audit_backend
            }
        };

        Self {
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),

            model_path: var("MODEL_PATH").map(PathBuf::from).unwrap_or(defaults.model_path),

            fraud_threshold,

            audit_backend,

            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),

            latest_data_path: var("LATEST_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.latest_data_path),

            audit_timeout_ms: var("AUDIT_TIMEOUT_MS")
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.audit_timeout_ms),

            api_token: var("API_TOKEN").filter(|t| !t.trim().is_empty()),

            environment: var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
