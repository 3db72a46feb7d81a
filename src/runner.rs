//! Virtual-user pool.
//!
//! N tasks share one [`LoadContext`] and each owns its executor clone and
//! random source. A task loops `iteration, pacing sleep` until the deadline;
//! an iteration that has started is always allowed to finish.

use crate::catalog::{Catalog, Params};
use crate::classifier::IdFallback;
use crate::error::ConfigError;
use crate::executor::{Executor, WireRequest};
use crate::metrics::Metrics;
use crate::scheduler::{run_iteration, Dice, Mix, Planner};
use crate::state::{Baseline, RunState};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Maximum warmup requests in flight at once.
const WARMUP_CONCURRENCY: usize = 50;

/// Everything the virtual users share for one run.
#[derive(Debug)]
pub struct LoadContext {
    pub catalog: Catalog,
    pub state: RunState,
    pub metrics: Metrics,
    pub mix: Mix,
    pub fallback: IdFallback,
}

impl LoadContext {
    pub fn new(catalog: Catalog, state: RunState, mix: Mix, fallback: IdFallback) -> Self {
        Self {
            catalog,
            state,
            metrics: Metrics::new(),
            mix,
            fallback,
        }
    }

    pub fn baseline(&self) -> Baseline {
        self.state.baseline()
    }

    pub fn planner(&self) -> Planner<'_> {
        Planner::new(&self.catalog, &self.state, self.mix)
    }
}

/// End-of-iteration think time: one of `min_ms, min_ms + step_ms, ..` up to
/// `max_ms`, chosen uniformly. The default sleeps a whole 1, 2 or 3 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_ms: u64,
    pub max_ms: u64,
    pub step_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self { min_ms: 1000, max_ms: 3000, step_ms: 1000 }
    }
}

impl Pacing {
    /// Millisecond-granular range.
    pub fn new(min_ms: u64, max_ms: u64) -> Result<Self, ConfigError> {
        if min_ms > max_ms {
            return Err(ConfigError::InvalidPacing { min_ms, max_ms });
        }
        Ok(Self { min_ms, max_ms, step_ms: 1 })
    }

    pub fn with_step(self, step_ms: u64) -> Result<Self, ConfigError> {
        if step_ms == 0 {
            return Err(ConfigError::ZeroPacingStep);
        }
        Ok(Self { step_ms, ..self })
    }

    pub fn delay<D: Dice + ?Sized>(&self, dice: &mut D) -> Duration {
        let steps = (self.max_ms - self.min_ms) / self.step_ms;
        Duration::from_millis(self.min_ms + dice.between(0, steps) * self.step_ms)
    }
}

/// Pool shape for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub vus: usize,
    pub duration: Duration,
    pub pacing: Pacing,
    pub warmup: usize,
    /// Base seed; virtual user `n` draws from `seed + n`.
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            vus: 50,
            duration: Duration::from_secs(30),
            pacing: Pacing::default(),
            warmup: 0,
            seed: None,
        }
    }
}

/// Wall-clock facts about a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunTiming {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

fn dice_for(seed: Option<u64>, vu: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(vu as u64)),
        None => StdRng::from_entropy(),
    }
}

/// Resolve the target host before any load starts.
pub async fn preflight(base_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?.to_string();
    let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;

    // IPv6 literals come back bracketed from host_str.
    let lookup = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let mut addrs = tokio::net::lookup_host((lookup.as_str(), port))
        .await
        .map_err(|e| ConfigError::Unresolvable { host: host.clone(), reason: e.to_string() })?;
    match addrs.next() {
        Some(addr) => {
            debug!(%host, %addr, "target resolved");
            Ok(())
        }
        None => Err(ConfigError::Unresolvable { host, reason: "no addresses".to_string() }),
    }
}

/// Send `count` unrecorded requests to the home operation so the timed
/// window starts on warm connections.
pub async fn warmup<E>(ctx: &LoadContext, executor: &E, count: usize)
where
    E: Executor + Clone + 'static,
{
    let Some(home) = ctx.catalog.home() else { return };
    let request = home.build(&Params::new(ctx.baseline(), 0));
    let request: Arc<WireRequest> = Arc::new(request);

    let mut tasks = JoinSet::new();
    for _ in 0..count {
        let mut executor = executor.clone();
        let request = Arc::clone(&request);
        tasks.spawn(async move {
            let _ = executor.execute(&request).await;
        });
        if tasks.len() >= WARMUP_CONCURRENCY {
            tasks.join_next().await;
        }
    }
    while tasks.join_next().await.is_some() {}
    debug!(count, "warmup complete");
}

/// Drive `options.vus` virtual users against the target until
/// `options.duration` has elapsed, then wait for in-flight iterations.
pub async fn run<E>(ctx: Arc<LoadContext>, executor: E, options: &RunOptions) -> RunTiming
where
    E: Executor + Clone + 'static,
{
    if options.warmup > 0 {
        info!(requests = options.warmup, "warming up connections");
        warmup(&ctx, &executor, options.warmup).await;
    }

    let started_at = Utc::now();
    let start = Instant::now();
    let deadline = start + options.duration;
    info!(vus = options.vus, duration = ?options.duration, "starting virtual users");

    let mut tasks: JoinSet<(usize, u64)> = JoinSet::new();
    for vu in 0..options.vus {
        let ctx = Arc::clone(&ctx);
        let mut executor = executor.clone();
        let mut dice = dice_for(options.seed, vu);
        let pacing = options.pacing;

        tasks.spawn(async move {
            let mut iterations = 0u64;
            while Instant::now() < deadline {
                run_iteration(&ctx, &mut executor, &mut dice).await;
                iterations += 1;
                let wake = (Instant::now() + pacing.delay(&mut dice)).min(deadline);
                sleep_until(wake).await;
            }
            (vu, iterations)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((vu, iterations)) => debug!(vu, iterations, "virtual user finished"),
            Err(e) => warn!(error = %e, "virtual user task failed"),
        }
    }

    let elapsed = start.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        iterations = ctx.metrics.iterations(),
        requests = ctx.metrics.requests(),
        "run complete"
    );
    RunTiming { started_at, elapsed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Body, Outcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for Counting {
        async fn execute(&mut self, _request: &WireRequest) -> Outcome {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Outcome {
                status: Some(200),
                latency: Duration::from_millis(1),
                body: Body::Json(json!({"id": 3})),
            }
        }
    }

    fn context() -> Arc<LoadContext> {
        Arc::new(LoadContext::new(Catalog::rest(), RunState::default(), Mix::default(), IdFallback::Existing))
    }

    #[test]
    fn test_pacing_rejects_inverted_range() {
        assert!(matches!(
            Pacing::new(3000, 1000),
            Err(ConfigError::InvalidPacing { min_ms: 3000, max_ms: 1000 })
        ));
        assert!(Pacing::new(500, 500).is_ok());
    }

    #[test]
    fn test_pacing_delay_stays_in_range() {
        let pacing = Pacing::new(1000, 3000).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let delay = pacing.delay(&mut rng);
            assert!(delay >= Duration::from_millis(1000) && delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_default_pacing_sleeps_whole_seconds() {
        let pacing = Pacing::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..1000 {
            seen.insert(pacing.delay(&mut rng).as_millis());
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_pacing_step_must_be_positive() {
        assert!(matches!(Pacing::default().with_step(0), Err(ConfigError::ZeroPacingStep)));
        let pacing = Pacing::new(100, 350).unwrap().with_step(100).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let ms = pacing.delay(&mut rng).as_millis();
            assert!([100, 200, 300].contains(&ms), "{ms}");
        }
    }

    #[test]
    fn test_seeded_dice_are_reproducible_per_vu() {
        let mut a = dice_for(Some(9), 2);
        let mut b = dice_for(Some(9), 2);
        let mut c = dice_for(Some(9), 3);
        let first = a.roll();
        assert_eq!(first, b.roll());
        assert_ne!(first, c.roll());
    }

    #[tokio::test]
    async fn test_preflight_rejects_bad_urls() {
        assert!(matches!(preflight("not a url").await, Err(ConfigError::InvalidUrl { .. })));
        assert!(matches!(preflight("ftp://localhost/").await, Err(ConfigError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_preflight_resolves_loopback() {
        preflight("http://127.0.0.1:8000").await.unwrap();
        preflight("http://[::1]:8000/").await.unwrap();
    }

    #[tokio::test]
    async fn test_preflight_reports_unresolvable_host() {
        let result = preflight("http://nonexistent-host.invalid:8000").await;
        assert!(matches!(result, Err(ConfigError::Unresolvable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_users_pace_until_deadline() {
        let ctx = context();
        let options = RunOptions {
            vus: 3,
            duration: Duration::from_secs(10),
            pacing: Pacing::new(1000, 1000).unwrap(),
            warmup: 0,
            seed: Some(1),
        };

        let timing = run(Arc::clone(&ctx), Counting::default(), &options).await;

        assert_eq!(ctx.metrics.iterations(), 30);
        assert!(timing.elapsed >= Duration::from_secs(10) && timing.elapsed < Duration::from_secs(11));
        assert_eq!(ctx.metrics.errors(), 0);
    }

    #[derive(Clone)]
    struct Slow;

    #[async_trait]
    impl Executor for Slow {
        async fn execute(&mut self, _request: &WireRequest) -> Outcome {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Outcome::from_response(200, Duration::from_millis(50), b"[]")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_iteration_finishes_after_deadline() {
        let mix = Mix::new(1.0, 0.0, 0.0, 0.0).unwrap();
        let ctx = Arc::new(LoadContext::new(Catalog::rest(), RunState::default(), mix, IdFallback::Existing));
        let options = RunOptions {
            vus: 2,
            duration: Duration::from_millis(10),
            pacing: Pacing::new(5000, 5000).unwrap(),
            warmup: 0,
            seed: Some(4),
        };

        let timing = run(Arc::clone(&ctx), Slow, &options).await;

        assert_eq!(ctx.metrics.iterations(), 2);
        assert_eq!(ctx.metrics.successes(), 2);
        assert!(ctx.metrics.requests() >= 16);
        assert!(timing.elapsed >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_warmup_is_not_recorded() {
        let ctx = context();
        let executor = Counting::default();

        warmup(&ctx, &executor, 120).await;

        assert_eq!(executor.calls.load(Ordering::Relaxed), 120);
        assert_eq!(ctx.metrics.requests(), 0);
        assert_eq!(ctx.metrics.iterations(), 0);
    }
}
