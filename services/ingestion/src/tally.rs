//! Rejection tally: counts of excluded rows by reason

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use types::errors::{RejectKind, RejectReason};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionTally {
    by_kind: BTreeMap<RejectKind, u64>,
}

impl RejectionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: &RejectReason) {
        *self.by_kind.entry(reason.kind()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &RejectionTally) {
        for (kind, count) in &other.by_kind {
            *self.by_kind.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn count(&self, kind: RejectKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_kind.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Reasons in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (RejectKind, u64)> + '_ {
        self.by_kind.iter().map(|(k, v)| (*k, *v))
    }

    pub fn as_map(&self) -> &BTreeMap<RejectKind, u64> {
        &self.by_kind
    }
}
