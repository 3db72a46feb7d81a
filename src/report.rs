//! Run summary: text report, JSON result file and markdown results section.

use crate::catalog::Protocol;
use crate::error::LoadError;
use crate::metrics::{LatencyStats, Metrics, COMBINED};
use crate::runner::RunTiming;
use crate::threshold::{ThresholdResult, ThresholdSpec};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::Path;

/// Latency and error count for one operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OperationSummary {
    pub name: String,
    pub errors: u64,
    pub stats: LatencyStats,
}

/// Everything a run reports.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub test: String,
    pub protocol: Protocol,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub vus: usize,
    pub iterations: u64,
    pub successes: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub requests: usize,
    pub throughput: f64,
    pub combined: Option<LatencyStats>,
    pub operations: Vec<OperationSummary>,
    pub failures: BTreeMap<&'static str, u64>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
    pub summary: String,
}

fn test_name(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Rest => "rest-crud-mix",
        Protocol::Graphql => "graphql-crud-mix",
    }
}

impl RunSummary {
    pub fn collect(
        protocol: Protocol,
        vus: usize,
        timing: &RunTiming,
        metrics: &Metrics,
        thresholds: &[ThresholdSpec],
    ) -> Self {
        let duration_secs = timing.elapsed.as_secs_f64();
        let requests = metrics.requests();
        let throughput = if duration_secs > 0.0 {
            requests as f64 / duration_secs
        } else {
            0.0
        };
        let combined = metrics.combined_stats();
        let operations = metrics
            .operations()
            .into_iter()
            .filter_map(|name| {
                let stats = metrics.stats(&name)?;
                let errors = metrics.operation_errors(&name);
                Some(OperationSummary { name, errors, stats })
            })
            .collect();
        let thresholds: Vec<ThresholdResult> = thresholds.iter().map(|t| t.evaluate(metrics)).collect();
        let passed = thresholds.iter().all(|t| t.passed);
        let error_rate = metrics.error_rate();

        let summary = match &combined {
            Some(stats) => format!(
                "{:.0} req/s, p50={:.2}ms p95={:.2}ms p99={:.2}ms, error rate {:.2}%",
                throughput,
                stats.p50,
                stats.p95,
                stats.p99,
                error_rate * 100.0
            ),
            None => "no requests recorded".to_string(),
        };

        Self {
            test: test_name(protocol).to_string(),
            protocol,
            started_at: timing.started_at,
            duration_secs,
            vus,
            iterations: metrics.iterations(),
            successes: metrics.successes(),
            errors: metrics.errors(),
            error_rate,
            requests,
            throughput,
            combined,
            operations,
            failures: metrics.failures(),
            thresholds,
            passed,
            summary,
        }
    }

    /// Human-readable report for stdout.
    pub fn render_text(&self, title: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== {title} ===");
        let _ = writeln!(out, "  Started: {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "  Duration: {:.2}s | VUs: {}", self.duration_secs, self.vus);
        let _ = writeln!(
            out,
            "  Iterations: {} (passed {}, failed {}, error rate {:.2}%)",
            self.iterations,
            self.successes,
            self.errors,
            self.error_rate * 100.0
        );
        let _ = writeln!(out, "  Requests: {} ({:.1} req/s)", self.requests, self.throughput);

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  {:<40} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "metric", "count", "errors", "avg", "p50", "p90", "p95", "p99", "max"
        );
        let mut row = |name: &str, errors: Option<u64>, stats: &LatencyStats| {
            let errors = errors.map_or_else(|| "-".to_string(), |e| e.to_string());
            let _ = writeln!(
                out,
                "  {:<40} {:>7} {:>7} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
                name, stats.count, errors, stats.mean, stats.p50, stats.p90, stats.p95, stats.p99, stats.max
            );
        };
        if let Some(stats) = &self.combined {
            row(COMBINED, None, stats);
        }
        for op in &self.operations {
            row(&op.name, Some(op.errors), &op.stats);
        }

        if !self.failures.is_empty() {
            let breakdown: Vec<String> = self.failures.iter().map(|(class, n)| format!("{class}={n}")).collect();
            let _ = writeln!(out);
            let _ = writeln!(out, "  Failures: {}", breakdown.join(" "));
        }

        if !self.thresholds.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Thresholds:");
            for t in &self.thresholds {
                let verdict = if t.passed { "PASS" } else { "FAIL" };
                match t.observed {
                    Some(value) => {
                        let _ = writeln!(out, "    [{verdict}] {} (observed {value:.4})", t.threshold);
                    }
                    None => {
                        let _ = writeln!(out, "    [{verdict}] {} (no samples)", t.threshold);
                    }
                }
            }
        }
        out
    }

    /// Body of the markdown results section.
    pub fn markdown_section(&self) -> String {
        let (p50, p95, p99) = self
            .combined
            .as_ref()
            .map_or((0.0, 0.0, 0.0), |s| (s.p50, s.p95, s.p99));
        format!(
            "\n**Users**: {} | **Iterations**: {} | **Requests**: {} | **Duration**: {:.1}s\n\n\
             | p50 | p95 | p99 | Throughput | Error rate | Thresholds |\n\
             |-----|-----|-----|-----------|------------|------------|\n\
             | {:.2}ms | {:.2}ms | {:.2}ms | {:.0} req/s | {:.2}% | {} |\n\n",
            self.vus,
            self.iterations,
            self.requests,
            self.duration_secs,
            p50,
            p95,
            p99,
            self.throughput,
            self.error_rate * 100.0,
            if self.passed { "pass" } else { "fail" }
        )
    }

    /// Write the JSON summary to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), LoadError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Replace the `## <title>` section of a markdown results file, or append it
/// when absent. A missing file is created with a dated header.
pub fn update_section(path: &Path, title: &str, content: &str) -> io::Result<()> {
    if !path.exists() {
        let header = format!(
            "# CRUD Load Results\n\n**Test Date**: {}\n\n---\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M")
        );
        fs::write(path, header)?;
    }

    let existing = fs::read_to_string(path)?;
    let marker = format!("## {title}");

    if let Some(start) = existing.find(&marker) {
        let after = &existing[start + marker.len()..];
        let end = match after.find("\n## ") {
            Some(next) => start + marker.len() + next,
            None => existing.len(),
        };

        let mut updated = String::with_capacity(existing.len() + content.len());
        updated.push_str(&existing[..start]);
        updated.push_str(&marker);
        updated.push('\n');
        updated.push_str(content);
        updated.push_str(&existing[end..]);
        fs::write(path, updated)
    } else {
        let mut file = OpenOptions::new().append(true).open(path)?;
        writeln!(file, "{marker}")?;
        writeln!(file, "{content}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timing(secs: u64) -> RunTiming {
        RunTiming { started_at: Utc::now(), elapsed: Duration::from_secs(secs) }
    }

    fn sample_metrics() -> Metrics {
        let metrics = Metrics::new();
        for ms in [10, 20, 30, 40] {
            metrics.record("response_time_users", Duration::from_millis(ms), true);
            metrics.record_combined(Duration::from_millis(ms));
        }
        metrics.record("response_time_post_role", Duration::from_millis(80), false);
        metrics.record_combined(Duration::from_millis(80));
        metrics.record_failure(&crate::classifier::Failure::Status(500));
        metrics.iteration();
        metrics.iteration();
        metrics.success();
        metrics.error();
        metrics
    }

    #[test]
    fn test_collect_summarizes_metrics() {
        let metrics = sample_metrics();
        let thresholds = crate::threshold::defaults();
        let summary = RunSummary::collect(Protocol::Rest, 5, &timing(5), &metrics, &thresholds);

        assert_eq!(summary.test, "rest-crud-mix");
        assert_eq!(summary.requests, 5);
        assert_eq!(summary.throughput, 1.0);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.error_rate, 0.5);
        assert_eq!(summary.operations.len(), 2);
        assert_eq!(summary.operations[0].name, "response_time_post_role");
        assert_eq!(summary.operations[0].errors, 1);
        assert_eq!(summary.failures.get("status"), Some(&1));
        // error rate 0.5 breaks the default error_rate threshold
        assert!(!summary.passed);
        assert!(summary.thresholds[1].passed);
    }

    #[test]
    fn test_text_report_lists_every_metric() {
        let metrics = sample_metrics();
        let summary = RunSummary::collect(Protocol::Graphql, 1, &timing(1), &metrics, &crate::threshold::defaults());
        let text = summary.render_text(Protocol::Graphql.title());

        assert!(text.starts_with("=== GraphQL CRUD Mix ==="));
        assert!(text.contains(COMBINED));
        assert!(text.contains("response_time_users"));
        assert!(text.contains("Failures: status=1"));
        assert!(text.contains("[FAIL] error_rate:rate<0.1"));
        assert!(text.contains("[PASS] response_time_combined:p(95)<2000"));
    }

    #[test]
    fn test_empty_run_reports_no_requests() {
        let summary = RunSummary::collect(Protocol::Rest, 1, &timing(0), &Metrics::new(), &crate::threshold::defaults());
        assert_eq!(summary.summary, "no requests recorded");
        assert_eq!(summary.throughput, 0.0);
        assert!(summary.passed);
    }

    #[test]
    fn test_json_summary_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let summary = RunSummary::collect(Protocol::Rest, 2, &timing(5), &sample_metrics(), &[]);

        summary.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["test"], "rest-crud-mix");
        assert_eq!(value["protocol"], "rest");
        assert_eq!(value["vus"], 2);
        assert_eq!(value["requests"], 5);
        assert_eq!(value["errorRate"], 0.5);
        assert_eq!(value["combined"]["count"], 5);
        assert_eq!(value["passed"], true);
    }

    #[test]
    fn test_update_section_appends_then_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RESULTS.md");

        update_section(&path, "REST CRUD Mix", "first run\n").unwrap();
        update_section(&path, "GraphQL CRUD Mix", "graphql run\n").unwrap();
        update_section(&path, "REST CRUD Mix", "second run\n").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# CRUD Load Results"));
        assert!(!text.contains("first run"));
        assert!(text.contains("## REST CRUD Mix\nsecond run\n"));
        assert!(text.contains("## GraphQL CRUD Mix\ngraphql run"));
        assert_eq!(text.matches("## REST CRUD Mix").count(), 1);
        assert!(text.find("## REST CRUD Mix").unwrap() < text.find("## GraphQL CRUD Mix").unwrap());
    }

    #[test]
    fn test_markdown_section_carries_verdict() {
        let summary = RunSummary::collect(Protocol::Rest, 3, &timing(5), &sample_metrics(), &[]);
        let section = summary.markdown_section();
        assert!(section.contains("**Users**: 3"));
        assert!(section.contains("| pass |"));
    }
}
