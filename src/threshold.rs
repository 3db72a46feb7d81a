//! Pass/fail thresholds in the `<metric>:<stat><op><bound>` form, e.g.
//! `error_rate:rate<0.1` or `response_time_combined:p(95)<2000`.

use crate::metrics::{nearest_rank, Metrics};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Metric name addressing the iteration error rate.
pub const ERROR_RATE: &str = "error_rate";

/// Thresholds applied when none are configured.
pub const DEFAULT_THRESHOLDS: [&str; 2] = ["error_rate:rate<0.1", "response_time_combined:p(95)<2000"];

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("threshold '{0}' must look like <metric>:<stat><op><bound>")]
    Shape(String),
    #[error("threshold '{spec}': unknown statistic '{stat}'")]
    Stat { spec: String, stat: String },
    #[error("threshold '{spec}': percentile must be within 0..=100")]
    Percentile { spec: String },
    #[error("threshold '{spec}': bound '{bound}' is not a number")]
    Bound { spec: String, bound: String },
    #[error("threshold '{spec}': 'rate' applies only to error_rate")]
    RateOnLatency { spec: String },
    #[error("threshold '{spec}': error_rate only supports 'rate'")]
    LatencyStatOnRate { spec: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stat {
    Rate,
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Count,
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate => write!(f, "rate"),
            Self::Percentile(p) => write!(f, "p({p})"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
        }
    }

    pub fn holds(&self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Gt => value > bound,
            Self::Ge => value >= bound,
            Self::Eq => value == bound,
        }
    }
}

/// One parsed threshold expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: String,
    pub stat: Stat,
    pub op: Op,
    pub bound: f64,
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}{}", self.metric, self.stat, self.op.as_str(), self.bound)
    }
}

impl FromStr for ThresholdSpec {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let shape = || ThresholdParseError::Shape(spec.to_string());
        let (metric, expr) = spec.split_once(':').ok_or_else(shape)?;
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(shape());
        }

        // Two-character operators first so "<=" is not read as "<".
        let (at, op) = ["<=", ">=", "==", "<", ">"]
            .iter()
            .find_map(|token| expr.find(*token).map(|at| (at, *token)))
            .ok_or_else(shape)?;
        let op = match op {
            "<=" => Op::Le,
            ">=" => Op::Ge,
            "==" => Op::Eq,
            "<" => Op::Lt,
            _ => Op::Gt,
        };
        let stat_text = expr[..at].trim();
        let bound_text = expr[at + op.as_str().len()..].trim();

        let stat = parse_stat(spec, stat_text)?;
        let bound: f64 = bound_text.parse().map_err(|_| ThresholdParseError::Bound {
            spec: spec.to_string(),
            bound: bound_text.to_string(),
        })?;
        if !bound.is_finite() {
            return Err(ThresholdParseError::Bound { spec: spec.to_string(), bound: bound_text.to_string() });
        }

        match (metric == ERROR_RATE, stat) {
            (true, Stat::Rate) | (false, Stat::Percentile(_) | Stat::Avg | Stat::Min | Stat::Max | Stat::Med | Stat::Count) => {}
            (true, _) => return Err(ThresholdParseError::LatencyStatOnRate { spec: spec.to_string() }),
            (false, Stat::Rate) => return Err(ThresholdParseError::RateOnLatency { spec: spec.to_string() }),
        }

        Ok(Self { metric: metric.to_string(), stat, op, bound })
    }
}

fn parse_stat(spec: &str, text: &str) -> Result<Stat, ThresholdParseError> {
    let stat = match text {
        "rate" => Stat::Rate,
        "avg" => Stat::Avg,
        "min" => Stat::Min,
        "max" => Stat::Max,
        "med" => Stat::Med,
        "count" => Stat::Count,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| ThresholdParseError::Stat { spec: spec.to_string(), stat: other.to_string() })?;
            let percent: f64 = inner
                .trim()
                .parse()
                .map_err(|_| ThresholdParseError::Stat { spec: spec.to_string(), stat: other.to_string() })?;
            if !(0.0..=100.0).contains(&percent) {
                return Err(ThresholdParseError::Percentile { spec: spec.to_string() });
            }
            Stat::Percentile(percent)
        }
    };
    Ok(stat)
}

/// Outcome of evaluating one threshold.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ThresholdResult {
    pub threshold: String,
    /// Observed value; `None` when the metric has no samples.
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ThresholdSpec {
    /// Evaluate against the run's metrics. A latency metric with no samples
    /// counts as 0 for `count` and passes every other statistic.
    pub fn evaluate(&self, metrics: &Metrics) -> ThresholdResult {
        let observed = if self.metric == ERROR_RATE {
            Some(metrics.error_rate())
        } else {
            self.latency_value(metrics)
        };
        let passed = observed.map_or(true, |value| self.op.holds(value, self.bound));
        ThresholdResult { threshold: self.to_string(), observed, passed }
    }

    fn latency_value(&self, metrics: &Metrics) -> Option<f64> {
        if let Stat::Percentile(percent) = self.stat {
            let mut samples = metrics.samples(&self.metric)?;
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            return Some(nearest_rank(&samples, percent));
        }
        let Some(stats) = metrics.stats(&self.metric) else {
            return (self.stat == Stat::Count).then_some(0.0);
        };
        match self.stat {
            Stat::Avg => Some(stats.mean),
            Stat::Min => Some(stats.min),
            Stat::Max => Some(stats.max),
            Stat::Med => Some(stats.p50),
            Stat::Count => Some(stats.count as f64),
            Stat::Rate | Stat::Percentile(_) => None,
        }
    }
}

/// Parse every expression, failing on the first malformed one.
pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Vec<ThresholdSpec>, ThresholdParseError> {
    specs.iter().map(|s| s.as_ref().parse()).collect()
}

pub fn defaults() -> Vec<ThresholdSpec> {
    DEFAULT_THRESHOLDS
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}
