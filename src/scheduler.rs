//! Operation mix scheduler.
//!
//! Every random decision goes through [`Dice`], so the selection tables in the
//! catalog drive a single generic routine and tests can script each draw.
//!
//! Draw order within one iteration:
//! 1. category roll
//! 2. query: detail roll, then the role pick when the detail set runs
//! 3. create: one fire roll per create operation
//! 4. update: per operation, a prefer-created roll when a created id is
//!    tracked, then a fire roll when a target exists
//! 5. delete: one fire roll per operation whose kind has a tracked created id

use crate::catalog::{Catalog, Category, Operation, Params, PREFER_CREATED_PROBABILITY};
use crate::classifier::classify;
use crate::error::ConfigError;
use crate::executor::Executor;
use crate::runner::LoadContext;
use crate::state::RunState;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

/// Highest role id the detail role lookup picks from.
pub const ROLE_PICK_MAX: u64 = 5;

/// Source of uniform draws in `[0, 1)`.
pub trait Dice {
    fn roll(&mut self) -> f64;

    /// Uniform integer in `low..=high`.
    fn between(&mut self, low: u64, high: u64) -> u64 {
        let span = high.saturating_sub(low) + 1;
        let offset = ((self.roll() * span as f64) as u64).min(span - 1);
        low + offset
    }

    /// `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.roll() < p
    }
}

impl Dice for StdRng {
    fn roll(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Category weights, selected by cumulative interval. Weights need not sum
/// to one; a roll is scaled by their total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mix {
    pub query: f64,
    pub create: f64,
    pub update: f64,
    pub delete: f64,
}

impl Default for Mix {
    fn default() -> Self {
        Self { query: 0.70, create: 0.15, update: 0.10, delete: 0.05 }
    }
}

impl Mix {
    pub fn new(query: f64, create: f64, update: f64, delete: f64) -> Result<Self, ConfigError> {
        let mix = Self { query, create, update, delete };
        let valid = Category::ALL.iter().all(|c| {
            let weight = mix.weight(*c);
            weight.is_finite() && weight >= 0.0
        });
        if !valid || mix.total() <= 0.0 {
            return Err(ConfigError::InvalidWeights(format!("{query},{create},{update},{delete}")));
        }
        Ok(mix)
    }

    pub fn weight(&self, category: Category) -> f64 {
        match category {
            Category::Query => self.query,
            Category::Create => self.create,
            Category::Update => self.update,
            Category::Delete => self.delete,
        }
    }

    pub fn total(&self) -> f64 {
        Category::ALL.iter().map(|c| self.weight(*c)).sum()
    }

    /// Map a roll in `[0, 1)` to a category. Intervals are half-open and
    /// laid out in [`Category::ALL`] order, so the first interval wins ties.
    pub fn select(&self, roll: f64) -> Category {
        let total = self.total();
        let point = if (total - 1.0).abs() < 1e-9 { roll } else { roll * total };
        let mut edge = 0.0;
        let mut last = Category::Query;
        for category in Category::ALL {
            let weight = self.weight(category);
            if weight <= 0.0 {
                continue;
            }
            edge += weight;
            last = category;
            if point < edge {
                return category;
            }
        }
        last
    }
}

/// One request chosen for this iteration.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub op: &'a Operation,
    pub target: u64,
    pub pick: u64,
}

/// Operations selected for one iteration, in execution order.
#[derive(Debug)]
pub struct Plan<'a> {
    pub category: Category,
    pub calls: Vec<Call<'a>>,
}

/// Turns draws into a [`Plan`] against the catalog and current run state.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    catalog: &'a Catalog,
    state: &'a RunState,
    mix: Mix,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, state: &'a RunState, mix: Mix) -> Self {
        Self { catalog, state, mix }
    }

    pub fn plan<D: Dice + ?Sized>(&self, dice: &mut D) -> Plan<'a> {
        let category = self.mix.select(dice.roll());
        let calls = match category {
            Category::Query => self.queries(dice),
            Category::Create => self.creates(dice),
            Category::Update => self.updates(dice),
            Category::Delete => self.deletes(dice),
        };
        Plan { category, calls }
    }

    fn queries<D: Dice + ?Sized>(&self, dice: &mut D) -> Vec<Call<'a>> {
        let mut calls: Vec<Call<'a>> = self.catalog.core.iter().map(|op| Call { op, target: 0, pick: 1 }).collect();
        if dice.chance(self.catalog.detail_probability) {
            let pick = dice.between(1, ROLE_PICK_MAX);
            calls.extend(self.catalog.detail.iter().map(|op| Call { op, target: 0, pick }));
        }
        calls
    }

    fn creates<D: Dice + ?Sized>(&self, dice: &mut D) -> Vec<Call<'a>> {
        self.catalog
            .creates
            .iter()
            .filter(|op| dice.chance(op.probability))
            .map(|op| Call { op, target: 0, pick: 1 })
            .collect()
    }

    fn updates<D: Dice + ?Sized>(&self, dice: &mut D) -> Vec<Call<'a>> {
        let mut calls = Vec::new();
        for op in &self.catalog.updates {
            let Some(kind) = op.kind else { continue };
            let target = match (self.state.created(kind), self.state.existing(kind)) {
                (Some(created), Some(existing)) => {
                    if dice.chance(PREFER_CREATED_PROBABILITY) {
                        created
                    } else {
                        existing
                    }
                }
                (Some(created), None) => {
                    if dice.chance(PREFER_CREATED_PROBABILITY) {
                        created
                    } else {
                        continue;
                    }
                }
                (None, Some(existing)) => existing,
                (None, None) => continue,
            };
            if dice.chance(op.probability) {
                calls.push(Call { op, target, pick: 1 });
            }
        }
        calls
    }

    fn deletes<D: Dice + ?Sized>(&self, dice: &mut D) -> Vec<Call<'a>> {
        let mut calls = Vec::new();
        for op in &self.catalog.deletes {
            let Some(kind) = op.kind else { continue };
            if self.state.created(kind).is_none() || !dice.chance(op.probability) {
                continue;
            }
            // Cleared on firing, whatever the response turns out to be.
            if let Some(target) = self.state.take_created(kind) {
                calls.push(Call { op, target, pick: 1 });
            }
        }
        calls
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    pub category: Category,
    pub fired: usize,
    pub failed: usize,
}

impl IterationReport {
    pub fn is_empty(&self) -> bool {
        self.fired == 0
    }
}

/// Plan, execute and record one virtual-user iteration.
///
/// Calls run sequentially. Every request feeds its own distribution and the
/// combined one; the iteration counters move once, and only when at least
/// one call fired.
pub async fn run_iteration<E, D>(ctx: &LoadContext, executor: &mut E, dice: &mut D) -> IterationReport
where
    E: Executor + ?Sized,
    D: Dice + ?Sized,
{
    let plan = ctx.planner().plan(dice);
    let baseline = ctx.state.baseline();
    let mut failed = 0;

    for call in &plan.calls {
        let op = call.op;
        let stamp = chrono::Utc::now().timestamp_millis();
        let params = Params::new(baseline, stamp).with_target(call.target).with_pick(call.pick);
        let request = op.build(&params);
        let outcome = executor.execute(&request).await;

        let fallback = ctx.fallback.resolve(op.kind.and_then(|kind| ctx.state.existing(kind)));
        let verdict = classify(op, &outcome, fallback);
        ctx.metrics.record(op.metric, outcome.latency, verdict.is_success());
        ctx.metrics.record_combined(outcome.latency);

        match &verdict.failure {
            Some(failure) => {
                failed += 1;
                ctx.metrics.record_failure(failure);
                debug!(metric = op.metric, check = op.check, %failure, "check failed");
            }
            None => match (op.category, op.kind, verdict.created) {
                (Category::Create, Some(kind), Some(id)) => ctx.state.set_created(kind, id),
                // A create that yields no id leaves nothing addressable.
                (Category::Create, Some(kind), None) => {
                    ctx.state.take_created(kind);
                }
                _ => {}
            },
        }
    }

    ctx.metrics.iteration();
    if !plan.calls.is_empty() {
        if failed == 0 {
            ctx.metrics.success();
        } else {
            ctx.metrics.error();
        }
    }

    IterationReport { category: plan.category, fired: plan.calls.len(), failed }
}
