//! Mixed CRUD load generation for REST and GraphQL course-management APIs.
//!
//! Virtual users repeatedly pick an operation category by weight, fire the
//! operations the draws select, classify each response and feed the metrics
//! aggregator. Ids returned by creates are tracked per entity kind so later
//! updates and deletes can address resources made during the same run.
//!
//! ## Modules
//! - [`catalog`]: operation tables for both protocol variants
//! - [`executor`]: HTTP execution into [`executor::Outcome`] values
//! - [`classifier`]: success predicates and created-id extraction
//! - [`state`]: created-id slots and the known-existing baseline
//! - [`scheduler`]: weighted category choice and per-iteration planning
//! - [`metrics`]: latency distributions and iteration counters
//! - [`threshold`]: pass/fail expressions evaluated at run end
//! - [`runner`]: the virtual-user pool
//! - [`report`]: text, JSON and markdown output
//! - [`config`]: flags and `LOADGEN_*` environment variables

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod threshold;

pub use catalog::{Catalog, Protocol};
pub use config::{LoadArgs, RunConfig};
pub use error::{ConfigError, LoadError};
pub use report::RunSummary;

use clap::Parser;
use executor::HttpExecutor;
use runner::LoadContext;
use state::RunState;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Exit Codes
// ============================================================================

/// Every threshold held.
pub const EXIT_PASS: u8 = 0;

/// The run completed but at least one threshold failed.
pub const EXIT_THRESHOLD_FAILED: u8 = 99;

/// Configuration or setup error; no load was generated.
pub const EXIT_ERROR: u8 = 2;

pub fn exit_status(summary: &RunSummary) -> u8 {
    if summary.passed {
        EXIT_PASS
    } else {
        EXIT_THRESHOLD_FAILED
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Log to stderr, filtered by `RUST_LOG` (default `crud_load=info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crud_load=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Preflight, run and report one configured load test.
pub async fn execute(config: &RunConfig) -> Result<RunSummary, LoadError> {
    runner::preflight(&config.base_url).await?;
    let executor = HttpExecutor::new(&config.base_url, &config.client)?;
    let ctx = Arc::new(LoadContext::new(
        config.catalog(),
        RunState::new(config.baseline),
        config.mix,
        config.fallback,
    ));

    let timing = runner::run(Arc::clone(&ctx), executor, &config.options).await;
    let summary = RunSummary::collect(
        config.protocol,
        config.options.vus,
        &timing,
        &ctx.metrics,
        &config.thresholds,
    );

    if let Some(path) = &config.result_file {
        summary.write_json(path)?;
        info!(path = %path.display(), "result file written");
    }
    if let Some(path) = &config.results_md {
        report::update_section(path, config.title(), &summary.markdown_section())?;
        info!(path = %path.display(), "results section updated");
    }
    Ok(summary)
}

/// Shared `main` of the load binaries.
pub async fn main_for(protocol: Protocol) -> ExitCode {
    init_tracing();
    let args = LoadArgs::parse();
    eprintln!("=== {} ===", protocol.title());

    let config = match args.validate(protocol) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    eprintln!(
        "\n--- Running {} VUs for {:.0}s against {} ---",
        config.options.vus,
        config.options.duration.as_secs_f64(),
        config.base_url
    );
    match execute(&config).await {
        Ok(summary) => {
            print!("{}", summary.render_text(config.title()));
            if !summary.passed {
                error!("one or more thresholds failed");
            }
            ExitCode::from(exit_status(&summary))
        }
        Err(e) => {
            error!(error = %e, "load run aborted");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
