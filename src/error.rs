//! Error types for run setup and reporting.
//!
//! Request-level failures are never errors here: they are recorded as
//! [`Failure`](crate::classifier::Failure) values and only surface through the
//! aggregated error rate at the end of a run.

use crate::threshold::ThresholdParseError;

/// Problems detected while validating the run configuration.
///
/// Every variant aborts the run before the first virtual user starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not resolve target host '{host}': {reason}")]
    Unresolvable { host: String, reason: String },

    #[error("virtual user count must be at least 1")]
    NoUsers,

    #[error("run duration must be greater than zero")]
    ZeroDuration,

    #[error("category weights must be four non-negative numbers with a positive sum, got '{0}'")]
    InvalidWeights(String),

    #[error("pacing range {min_ms}..={max_ms}ms is empty")]
    InvalidPacing { min_ms: u64, max_ms: u64 },

    #[error("pacing step must be at least 1ms")]
    ZeroPacingStep,

    #[error("invalid threshold: {0}")]
    Threshold(#[from] ThresholdParseError),
}

/// Top-level error for a load run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
