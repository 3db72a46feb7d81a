//! Outcome classification.
//!
//! Pure functions of an operation and an outcome: classifying the same
//! outcome twice always yields the same verdict.

use crate::catalog::{Category, Operation};
use crate::executor::{Body, Outcome};
use serde_json::Value;
use std::fmt;

/// Why a request was counted as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// No response: connect failure, timeout, broken body.
    Transport,
    /// Response status was not one the operation accepts.
    Status(u16),
    /// GraphQL envelope carried a top-level `errors` entry.
    GraphqlErrors,
    /// Body decoded but lacked the expected data field.
    MissingField(&'static str),
    /// Body was expected to be JSON and was not.
    Decode,
}

impl Failure {
    /// Stable key used in the failure breakdown of the summary.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Status(_) => "status",
            Self::GraphqlErrors => "graphql_errors",
            Self::MissingField(_) => "missing_field",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport error"),
            Self::Status(code) => write!(f, "unexpected status {code}"),
            Self::GraphqlErrors => write!(f, "graphql errors in response"),
            Self::MissingField(field) => write!(f, "missing data field '{field}'"),
            Self::Decode => write!(f, "response body is not JSON"),
        }
    }
}

/// What to record as the created id when a successful create response
/// carries no usable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IdFallback {
    /// Track the kind's known-existing id instead. Later updates and deletes
    /// may then address a baseline resource rather than a created one.
    #[default]
    Existing,
    /// Leave the created-id slot untouched.
    None,
}

impl IdFallback {
    pub fn resolve(&self, existing: Option<u64>) -> Option<u64> {
        match self {
            Self::Existing => existing,
            Self::None => None,
        }
    }
}

/// Classification of one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub failure: Option<Failure>,
    /// New id to track, only for successful creates.
    pub created: Option<u64>,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Classify `outcome` for `op`.
///
/// `fallback` is the id tracked when a successful create response carries
/// no id; it is ignored for every other category.
pub fn classify(op: &Operation, outcome: &Outcome, fallback: Option<u64>) -> Verdict {
    let template = op.template();
    match template.check(outcome) {
        Ok(()) => {
            let created = if op.category == Category::Create {
                template.created_id(outcome).or(fallback)
            } else {
                None
            };
            Verdict { failure: None, created }
        }
        Err(failure) => Verdict { failure: Some(failure), created: None },
    }
}

/// Status-code predicate used by REST operations.
pub fn check_status(accept: &[u16], outcome: &Outcome) -> Result<(), Failure> {
    if matches!(outcome.body, Body::Transport(_)) {
        return Err(Failure::Transport);
    }
    match outcome.status {
        None => Err(Failure::Transport),
        Some(status) if accept.contains(&status) => Ok(()),
        Some(status) => Err(Failure::Status(status)),
    }
}

/// GraphQL envelope predicate: status 200, no top-level `errors`, and
/// `data.<field>` present and non-null. An empty list is present.
pub fn check_graphql(field: &'static str, outcome: &Outcome) -> Result<(), Failure> {
    let status = match (&outcome.body, outcome.status) {
        (Body::Transport(_), _) | (_, None) => return Err(Failure::Transport),
        (_, Some(status)) => status,
    };
    if status != 200 {
        return Err(Failure::Status(status));
    }
    let body = match &outcome.body {
        Body::Json(value) => value,
        _ => return Err(Failure::Decode),
    };
    if body.get("errors").is_some_and(|errors| !errors.is_null()) {
        return Err(Failure::GraphqlErrors);
    }
    match body.get("data").and_then(|data| data.get(field)) {
        Some(value) if !value.is_null() => Ok(()),
        _ => Err(Failure::MissingField(field)),
    }
}

/// Top-level `.id` of a REST create response.
pub fn rest_created_id(outcome: &Outcome) -> Option<u64> {
    outcome.json().and_then(|body| body.get("id")).and_then(parse_id)
}

/// `data.<field>.id` of a GraphQL mutation response.
pub fn graphql_created_id(field: &str, outcome: &Outcome) -> Option<u64> {
    outcome
        .json()
        .and_then(|body| body.get("data"))
        .and_then(|data| data.get(field))
        .and_then(|node| node.get("id"))
        .and_then(parse_id)
}

/// Accept numeric ids and the string form GraphQL `ID` scalars use.
/// Zero is not an id.
fn parse_id(value: &Value) -> Option<u64> {
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}
