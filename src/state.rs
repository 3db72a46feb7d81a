//! Shared run state: per-kind created ids and the known-existing baseline.
//!
//! One [`RunState`] is shared by every virtual user of a run. Each kind has a
//! single created-id slot, so two users creating the same kind concurrently
//! clobber each other's tracked id, and an update may target an id another
//! user has just deleted. Both are accepted: the run tracks at most one
//! pending resource per kind and relies on the target server to handle
//! concurrent writes.

use crate::catalog::Kind;
use std::collections::HashMap;
use std::sync::RwLock;

/// Ids assumed to exist on the target before the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub course: u64,
    pub user: u64,
    pub assignment: u64,
    pub section: u64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self::uniform(1)
    }
}

impl Baseline {
    pub fn uniform(id: u64) -> Self {
        Self { course: id, user: id, assignment: id, section: id }
    }

    /// The baseline id for `kind`, if one is assumed to exist.
    pub fn get(&self, kind: Kind) -> Option<u64> {
        match kind {
            Kind::Course => Some(self.course),
            Kind::User => Some(self.user),
            Kind::Assignment => Some(self.assignment),
            Kind::Section => Some(self.section),
            Kind::Role | Kind::Enrollment | Kind::Submission => None,
        }
    }
}

/// Created-id slots plus the read-only baseline.
#[derive(Debug, Default)]
pub struct RunState {
    baseline: Baseline,
    created: RwLock<HashMap<Kind, u64>>,
}

impl RunState {
    pub fn new(baseline: Baseline) -> Self {
        Self {
            baseline,
            created: RwLock::new(HashMap::new()),
        }
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub fn existing(&self, kind: Kind) -> Option<u64> {
        self.baseline.get(kind)
    }

    /// The id tracked from the latest successful create of `kind`.
    pub fn created(&self, kind: Kind) -> Option<u64> {
        let created = self.created.read().unwrap_or_else(|e| e.into_inner());
        created.get(&kind).copied()
    }

    /// Track `id` as the created resource for `kind`, replacing any previous one.
    pub fn set_created(&self, kind: Kind, id: u64) {
        let mut created = self.created.write().unwrap_or_else(|e| e.into_inner());
        created.insert(kind, id);
    }

    /// Clear and return the created id for `kind`.
    pub fn take_created(&self, kind: Kind) -> Option<u64> {
        let mut created = self.created.write().unwrap_or_else(|e| e.into_inner());
        created.remove(&kind)
    }
}
