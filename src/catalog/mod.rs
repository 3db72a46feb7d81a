//! Operation catalog.
//!
//! An [`Operation`] pairs a metric name and check label with a
//! [`RequestTemplate`], the protocol-specific capability that shapes the wire
//! request, judges the response and extracts created ids. The scheduler and
//! metrics core only ever see operations, so the REST and GraphQL variants
//! differ solely in which templates are wired into the [`Catalog`].

mod graphql;
mod rest;

pub use graphql::GraphqlTemplate;
pub use rest::RestTemplate;

use crate::classifier::Failure;
use crate::executor::{Outcome, WireRequest};
use crate::state::Baseline;
use std::fmt;

/// Entity kinds tracked by the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Course,
    User,
    Role,
    Section,
    Assignment,
    Enrollment,
    Submission,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::Course,
        Kind::User,
        Kind::Role,
        Kind::Section,
        Kind::Assignment,
        Kind::Enrollment,
        Kind::Submission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::User => "user",
            Self::Role => "role",
            Self::Section => "section",
            Self::Assignment => "assignment",
            Self::Enrollment => "enrollment",
            Self::Submission => "submission",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation categories, in selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Query,
    Create,
    Update,
    Delete,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Query,
        Category::Create,
        Category::Update,
        Category::Delete,
    ];
}

/// Which protocol variant a catalog speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Rest,
    Graphql,
}

impl Protocol {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Rest => "REST CRUD Mix",
            Self::Graphql => "GraphQL CRUD Mix",
        }
    }
}

/// Inputs available to a template when it builds a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    /// Target id for update/delete operations, 0 when unused.
    pub target: u64,
    pub baseline: Baseline,
    /// Millisecond timestamp used to keep created names unique.
    pub stamp: i64,
    /// Random role id for the role-by-id lookup.
    pub pick: u64,
}

impl Params {
    pub fn new(baseline: Baseline, stamp: i64) -> Self {
        Self { target: 0, baseline, stamp, pick: 1 }
    }

    pub fn with_target(mut self, target: u64) -> Self {
        self.target = target;
        self
    }

    pub fn with_pick(mut self, pick: u64) -> Self {
        self.pick = pick;
        self
    }
}

/// Protocol-specific request shaping and response judgement.
pub trait RequestTemplate: Send + Sync + fmt::Debug {
    fn build(&self, params: &Params) -> WireRequest;

    /// `Ok(())` when the response satisfies this operation's success predicate.
    fn check(&self, outcome: &Outcome) -> Result<(), Failure>;

    /// The id assigned by the server in a create response, if present.
    fn created_id(&self, outcome: &Outcome) -> Option<u64>;
}

/// A named, immutable unit of work against the target.
#[derive(Debug)]
pub struct Operation {
    /// Latency metric name, e.g. `response_time_create_course`.
    pub metric: &'static str,
    /// Human check label, e.g. `create course successful`.
    pub check: &'static str,
    pub category: Category,
    pub kind: Option<Kind>,
    /// Independent fire probability inside its category.
    pub probability: f64,
    template: Box<dyn RequestTemplate>,
}

impl Operation {
    pub fn query(
        metric: &'static str,
        check: &'static str,
        template: impl RequestTemplate + 'static,
    ) -> Self {
        Self {
            metric,
            check,
            category: Category::Query,
            kind: None,
            probability: 1.0,
            template: Box::new(template),
        }
    }

    pub fn mutation(
        category: Category,
        kind: Kind,
        probability: f64,
        metric: &'static str,
        check: &'static str,
        template: impl RequestTemplate + 'static,
    ) -> Self {
        Self {
            metric,
            check,
            category,
            kind: Some(kind),
            probability,
            template: Box::new(template),
        }
    }

    pub fn template(&self) -> &dyn RequestTemplate {
        self.template.as_ref()
    }

    pub fn build(&self, params: &Params) -> WireRequest {
        self.template.build(params)
    }
}

/// Probability that an update targets the tracked created id instead of the baseline.
pub const PREFER_CREATED_PROBABILITY: f64 = 0.25;

/// Probability that the secondary detail queries run alongside the core set.
pub const DETAIL_PROBABILITY: f64 = 0.30;

/// The full operation table for one protocol variant.
#[derive(Debug)]
pub struct Catalog {
    pub protocol: Protocol,
    /// Always executed when the query category is selected.
    pub core: Vec<Operation>,
    /// Executed together, with probability `detail_probability`.
    pub detail: Vec<Operation>,
    pub detail_probability: f64,
    pub creates: Vec<Operation>,
    pub updates: Vec<Operation>,
    pub deletes: Vec<Operation>,
}

impl Catalog {
    pub fn rest() -> Self {
        rest::catalog()
    }

    pub fn graphql(endpoint: &str) -> Self {
        graphql::catalog(endpoint)
    }

    pub fn for_protocol(protocol: Protocol, graphql_endpoint: &str) -> Self {
        match protocol {
            Protocol::Rest => Self::rest(),
            Protocol::Graphql => Self::graphql(graphql_endpoint),
        }
    }

    /// The landing-page operation, used for connection warmup.
    pub fn home(&self) -> Option<&Operation> {
        self.core.first()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.core
            .iter()
            .chain(&self.detail)
            .chain(&self.creates)
            .chain(&self.updates)
            .chain(&self.deletes)
    }

    pub fn find(&self, metric: &str) -> Option<&Operation> {
        self.operations().find(|op| op.metric == metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_catalog(catalog: &Catalog) {
        for op in &catalog.core {
            assert_eq!(op.category, Category::Query, "{}", op.metric);
        }
        for op in &catalog.creates {
            assert_eq!(op.category, Category::Create, "{}", op.metric);
            assert!(op.kind.is_some());
            assert!((0.2..=0.3).contains(&op.probability), "{}", op.metric);
        }
        for op in &catalog.updates {
            assert_eq!(op.category, Category::Update, "{}", op.metric);
            assert_eq!(op.probability, 0.25);
        }
        for op in &catalog.deletes {
            assert_eq!(op.category, Category::Delete, "{}", op.metric);
            assert_eq!(op.probability, 0.20);
        }
        let mut kinds = HashSet::new();
        for op in &catalog.creates {
            assert!(kinds.insert(op.kind), "duplicate create for {:?}", op.kind);
        }
    }

    #[test]
    fn test_rest_catalog_shape() {
        let catalog = Catalog::rest();
        check_catalog(&catalog);
        assert_eq!(catalog.protocol, Protocol::Rest);
        assert_eq!(catalog.core.len(), 8);
        assert_eq!(catalog.detail.len(), 11);
        assert_eq!(catalog.creates.len(), 6);
        assert_eq!(catalog.updates.len(), 4);
        assert_eq!(catalog.deletes.len(), 5);
    }

    #[test]
    fn test_graphql_catalog_shape() {
        let catalog = Catalog::graphql("/graphql");
        check_catalog(&catalog);
        assert_eq!(catalog.core.len(), 7);
        assert_eq!(catalog.detail.len(), 12);
        assert_eq!(catalog.creates.len(), 5);
        assert_eq!(catalog.updates.len(), 5);
        assert_eq!(catalog.deletes.len(), 3);
    }

    #[test]
    fn test_home_is_first_core_operation() {
        for catalog in [Catalog::rest(), Catalog::graphql("/graphql")] {
            let home = catalog.home().unwrap();
            assert_eq!(home.metric, "response_time_home");
            let params = Params::new(Baseline::default(), 0);
            assert_eq!(home.build(&params), WireRequest::get("/"));
        }
    }

    #[test]
    fn test_find_by_metric() {
        let catalog = Catalog::rest();
        let op = catalog.find("response_time_put_course").unwrap();
        assert_eq!(op.kind, Some(Kind::Course));
        assert!(catalog.find("response_time_nope").is_none());
    }
}
