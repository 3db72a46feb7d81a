//! Metrics aggregation.
//!
//! Latencies are kept at microsecond precision as fractional milliseconds,
//! per operation and combined across all requests. Success and error
//! counters are per iteration, not per request. All recording methods take
//! `&self` and are safe to call from every virtual user at once.

use crate::classifier::Failure;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Name of the distribution that receives every request's latency.
pub const COMBINED: &str = "response_time_combined";

/// Summary of one latency distribution, in milliseconds.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    /// Sorts `samples` in place. Returns `None` for an empty slice.
    pub fn from_samples(samples: &mut [f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = samples.len();
        Some(Self {
            count,
            min: samples[0],
            max: samples[count - 1],
            mean: samples.iter().sum::<f64>() / count as f64,
            p50: nearest_rank(samples, 50.0),
            p90: nearest_rank(samples, 90.0),
            p95: nearest_rank(samples, 95.0),
            p99: nearest_rank(samples, 99.0),
        })
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice: the value at
/// rank `ceil(p/100 * n)`, clamped to `1..=n`.
pub fn nearest_rank(sorted: &[f64], percent: f64) -> f64 {
    let n = sorted.len();
    let rank = (percent * n as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Per-operation samples.
#[derive(Debug, Default)]
struct Series {
    latencies: Vec<f64>,
    errors: u64,
}

/// Thread-safe aggregator shared by all virtual users.
#[derive(Debug, Default)]
pub struct Metrics {
    series: Mutex<HashMap<&'static str, Series>>,
    combined: Mutex<Vec<f64>>,
    failures: Mutex<BTreeMap<&'static str, u64>>,
    iterations: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
}

fn millis(latency: Duration) -> f64 {
    latency.as_secs_f64() * 1000.0
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request against its operation's distribution.
    pub fn record(&self, operation: &'static str, latency: Duration, success: bool) {
        let mut series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        let entry = series.entry(operation).or_default();
        entry.latencies.push(millis(latency));
        if !success {
            entry.errors += 1;
        }
    }

    /// Record one request in the combined distribution.
    pub fn record_combined(&self, latency: Duration) {
        let mut combined = self.combined.lock().unwrap_or_else(|e| e.into_inner());
        combined.push(millis(latency));
    }

    /// Count one failed request by taxonomy class.
    pub fn record_failure(&self, failure: &Failure) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        *failures.entry(failure.class()).or_insert(0) += 1;
    }

    /// Count a finished iteration, including ones that fired nothing.
    pub fn iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an iteration whose checks all passed.
    pub fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an iteration where at least one check failed.
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Errors over checked iterations; 0 when nothing was checked.
    pub fn error_rate(&self) -> f64 {
        let errors = self.errors();
        let checked = errors + self.successes();
        if checked == 0 {
            0.0
        } else {
            errors as f64 / checked as f64
        }
    }

    /// Total requests recorded in the combined distribution.
    pub fn requests(&self) -> usize {
        self.combined.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Raw samples of a named distribution, in recording order.
    pub fn samples(&self, metric: &str) -> Option<Vec<f64>> {
        if metric == COMBINED {
            let combined = self.combined.lock().unwrap_or_else(|e| e.into_inner());
            return (!combined.is_empty()).then(|| combined.clone());
        }
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.get(metric).map(|s| s.latencies.clone())
    }

    /// Stats for a named distribution; [`COMBINED`] selects the combined one.
    pub fn stats(&self, metric: &str) -> Option<LatencyStats> {
        let mut samples = self.samples(metric)?;
        LatencyStats::from_samples(&mut samples)
    }

    pub fn combined_stats(&self) -> Option<LatencyStats> {
        self.stats(COMBINED)
    }

    /// Failed request count for one operation.
    pub fn operation_errors(&self, operation: &str) -> u64 {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.get(operation).map(|s| s.errors).unwrap_or(0)
    }

    /// All operation names with at least one sample, sorted.
    pub fn operations(&self) -> Vec<String> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = series.keys().map(|name| name.to_string()).collect();
        names.sort();
        names
    }

    pub fn failures(&self) -> BTreeMap<&'static str, u64> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
