//! Command-line and environment configuration.
//!
//! Every option can be set with a flag or a `LOADGEN_*` environment
//! variable. [`LoadArgs::validate`] runs once at startup and turns the raw
//! arguments into a [`RunConfig`].

use crate::catalog::{Catalog, Protocol};
use crate::classifier::IdFallback;
use crate::error::ConfigError;
use crate::executor::ClientSettings;
use crate::runner::{Pacing, RunOptions};
use crate::scheduler::Mix;
use crate::state::Baseline;
use crate::threshold::{self, ThresholdSpec};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Mixed CRUD load generator")]
pub struct LoadArgs {
    /// Target base URL.
    #[arg(long, env = "LOADGEN_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// GraphQL endpoint path under the base URL.
    #[arg(long, env = "LOADGEN_GRAPHQL_PATH", default_value = "/graphql")]
    pub graphql_path: String,

    /// Number of concurrent virtual users.
    #[arg(long, env = "LOADGEN_VUS", default_value_t = 50)]
    pub vus: usize,

    /// Timed window, e.g. `30s` or `2m`.
    #[arg(long, env = "LOADGEN_DURATION", default_value = "30s", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Query, create, update and delete weights.
    #[arg(long, env = "LOADGEN_WEIGHTS", default_value = "0.70,0.15,0.10,0.05")]
    pub weights: String,

    /// Pass/fail expression such as `response_time_combined:p(95)<2000`.
    /// Repeat for several; defaults apply when none are given.
    #[arg(long = "threshold", env = "LOADGEN_THRESHOLDS", value_delimiter = ',')]
    pub thresholds: Vec<String>,

    /// Shortest pause between iterations, in milliseconds.
    #[arg(long, env = "LOADGEN_PACING_MIN_MS", default_value_t = 1000)]
    pub pacing_min_ms: u64,

    /// Longest pause between iterations, in milliseconds.
    #[arg(long, env = "LOADGEN_PACING_MAX_MS", default_value_t = 3000)]
    pub pacing_max_ms: u64,

    /// Granularity of the pause; `1` draws any millisecond in range.
    #[arg(long, env = "LOADGEN_PACING_STEP_MS", default_value_t = 1000)]
    pub pacing_step_ms: u64,

    #[arg(long, env = "LOADGEN_REQUEST_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    #[arg(long, env = "LOADGEN_CONNECT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Unrecorded home-page requests sent before the timed window.
    #[arg(long, env = "LOADGEN_WARMUP", default_value_t = 0)]
    pub warmup: usize,

    /// Id to track when a successful create response carries none.
    #[arg(long, env = "LOADGEN_ID_FALLBACK", value_enum, default_value_t = IdFallback::Existing)]
    pub id_fallback: IdFallback,

    /// Id assumed to exist for courses, users, assignments and sections.
    #[arg(long, env = "LOADGEN_EXISTING_ID", default_value_t = 1)]
    pub existing_id: u64,

    /// Seed for reproducible draws.
    #[arg(long, env = "LOADGEN_SEED")]
    pub seed: Option<u64>,

    /// Write the JSON summary here.
    #[arg(long, env = "LOADGEN_RESULT_FILE")]
    pub result_file: Option<PathBuf>,

    /// Replace or append this run's section in a markdown results file.
    #[arg(long, env = "LOADGEN_RESULTS_MD")]
    pub results_md: Option<PathBuf>,

    #[arg(long, env = "LOADGEN_ACCEPT_INVALID_CERTS")]
    pub accept_invalid_certs: bool,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub protocol: Protocol,
    pub base_url: String,
    pub graphql_path: String,
    pub options: RunOptions,
    pub mix: Mix,
    pub thresholds: Vec<ThresholdSpec>,
    pub client: ClientSettings,
    pub fallback: IdFallback,
    pub baseline: Baseline,
    pub result_file: Option<PathBuf>,
    pub results_md: Option<PathBuf>,
}

impl RunConfig {
    pub fn catalog(&self) -> Catalog {
        Catalog::for_protocol(self.protocol, &self.graphql_path)
    }

    pub fn title(&self) -> &'static str {
        self.protocol.title()
    }
}

impl LoadArgs {
    pub fn validate(self, protocol: Protocol) -> Result<RunConfig, ConfigError> {
        let base_url = validate_url(&self.base_url)?;
        if self.vus == 0 {
            return Err(ConfigError::NoUsers);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        let mix = parse_weights(&self.weights)?;
        let pacing = Pacing::new(self.pacing_min_ms, self.pacing_max_ms)?.with_step(self.pacing_step_ms)?;
        let thresholds = if self.thresholds.is_empty() {
            threshold::defaults()
        } else {
            threshold::parse_all(&self.thresholds)?
        };
        let graphql_path = if self.graphql_path.starts_with('/') {
            self.graphql_path
        } else {
            format!("/{}", self.graphql_path)
        };

        Ok(RunConfig {
            protocol,
            base_url,
            graphql_path,
            options: RunOptions {
                vus: self.vus,
                duration: self.duration,
                pacing,
                warmup: self.warmup,
                seed: self.seed,
            },
            mix,
            thresholds,
            client: ClientSettings {
                request_timeout: self.request_timeout,
                connect_timeout: self.connect_timeout,
                accept_invalid_certs: self.accept_invalid_certs,
                ..ClientSettings::default()
            },
            fallback: self.id_fallback,
            baseline: Baseline::uniform(self.existing_id),
            result_file: self.result_file,
            results_md: self.results_md,
        })
    }
}

fn validate_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl { url: raw.to_string(), reason };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Parse `query,create,update,delete` weights.
pub fn parse_weights(raw: &str) -> Result<Mix, ConfigError> {
    let invalid = || ConfigError::InvalidWeights(raw.to_string());
    let weights: Vec<f64> = raw
        .split(',')
        .map(|w| w.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    let [query, create, update, delete] = weights.as_slice() else {
        return Err(invalid());
    };
    Mix::new(*query, *create, *update, *delete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Stat;

    fn args(extra: &[&str]) -> LoadArgs {
        let mut argv = vec!["load-rest-mix"];
        argv.extend_from_slice(extra);
        LoadArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = args(&[]).validate(Protocol::Rest).unwrap();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.graphql_path, "/graphql");
        assert_eq!(config.options.vus, 50);
        assert_eq!(config.options.duration, Duration::from_secs(30));
        assert_eq!(config.options.pacing, Pacing::default());
        assert_eq!(config.mix, Mix::default());
        assert_eq!(config.thresholds.len(), 2);
        assert_eq!(config.fallback, IdFallback::Existing);
        assert_eq!(config.baseline, Baseline::uniform(1));
        assert_eq!(config.client.request_timeout, Duration::from_secs(10));
        assert_eq!(config.client.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = args(&[
            "--base-url",
            "https://staging.example.com/",
            "--vus",
            "8",
            "--duration",
            "2m",
            "--threshold",
            "response_time_users:p(99)<800",
            "--threshold",
            "error_rate:rate<0.05",
            "--id-fallback",
            "none",
            "--existing-id",
            "3",
            "--graphql-path",
            "api/graphql",
        ])
        .validate(Protocol::Graphql)
        .unwrap();

        assert_eq!(config.base_url, "https://staging.example.com");
        assert_eq!(config.graphql_path, "/api/graphql");
        assert_eq!(config.options.vus, 8);
        assert_eq!(config.options.duration, Duration::from_secs(120));
        assert_eq!(config.thresholds.len(), 2);
        assert_eq!(config.thresholds[0].stat, Stat::Percentile(99.0));
        assert_eq!(config.fallback, IdFallback::None);
        assert_eq!(config.baseline.course, 3);
        assert_eq!(config.catalog().protocol, Protocol::Graphql);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(args(&["--vus", "0"]).validate(Protocol::Rest), Err(ConfigError::NoUsers)));
        assert!(matches!(args(&["--duration", "0s"]).validate(Protocol::Rest), Err(ConfigError::ZeroDuration)));
        assert!(matches!(
            args(&["--base-url", "localhost:8000"]).validate(Protocol::Rest),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            args(&["--pacing-min-ms", "5000"]).validate(Protocol::Rest),
            Err(ConfigError::InvalidPacing { .. })
        ));
        assert!(matches!(
            args(&["--pacing-step-ms", "0"]).validate(Protocol::Rest),
            Err(ConfigError::ZeroPacingStep)
        ));
        assert!(matches!(
            args(&["--threshold", "p95 under two seconds"]).validate(Protocol::Rest),
            Err(ConfigError::Threshold(_))
        ));
    }

    #[test]
    fn test_duration_must_parse() {
        assert!(LoadArgs::try_parse_from(["load-rest-mix", "--duration", "soon"]).is_err());
    }

    #[test]
    fn test_weights() {
        assert_eq!(parse_weights("0.70, 0.15, 0.10, 0.05").unwrap(), Mix::default());
        assert_eq!(parse_weights("1,0,0,0").unwrap().select(0.99), crate::catalog::Category::Query);
        assert!(matches!(parse_weights("0.7,0.3"), Err(ConfigError::InvalidWeights(_))));
        assert!(matches!(parse_weights("a,b,c,d"), Err(ConfigError::InvalidWeights(_))));
        assert!(matches!(parse_weights("0,0,0,0"), Err(ConfigError::InvalidWeights(_))));
    }
}
