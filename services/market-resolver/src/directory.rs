//! Dealer directory with two-stage lookup
//!
//! Stage one matches an exact dealer identifier. Stage two matches the
//! normalised name and succeeds only when exactly one dealer carries it.

use std::collections::BTreeMap;

use tracing::debug;

use types::dealer::{normalize_dealer_name, Dealer};
use types::errors::{DealerCandidate, ResolutionError};
use types::ids::DealerId;

/// Outcome of a dealer lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum DealerMatch<'a> {
    Identifier(&'a Dealer),
    UniqueName(&'a Dealer),
    Ambiguous(Vec<DealerCandidate>),
    NotFound,
}

impl<'a> DealerMatch<'a> {
    pub fn dealer(&self) -> Option<&'a Dealer> {
        match self {
            DealerMatch::Identifier(d) | DealerMatch::UniqueName(d) => Some(*d),
            _ => None,
        }
    }
}

/// Immutable dealer index built once per run.
#[derive(Debug, Clone, Default)]
pub struct DealerDirectory {
    by_id: BTreeMap<DealerId, Dealer>,
    by_name: BTreeMap<String, Vec<DealerId>>,
}

impl DealerDirectory {
    /// Build the index. For a repeated id the first dealer wins.
    pub fn new(dealers: impl IntoIterator<Item = Dealer>) -> Self {
        let mut by_id: BTreeMap<DealerId, Dealer> = BTreeMap::new();
        for dealer in dealers {
            by_id.entry(dealer.id).or_insert(dealer);
        }

        let mut by_name: BTreeMap<String, Vec<DealerId>> = BTreeMap::new();
        for dealer in by_id.values() {
            let key = dealer.normalized_name();
            if !key.is_empty() {
                by_name.entry(key).or_default().push(dealer.id);
            }
        }

        debug!(dealers = by_id.len(), names = by_name.len(), "DealerDirectory built");
        Self { by_id, by_name }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: DealerId) -> Option<&Dealer> {
        self.by_id.get(&id)
    }

    /// All dealers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Dealer> {
        self.by_id.values()
    }

    /// Look up a dealer by identifier text or by name.
    ///
    /// Text that parses as an identifier present in the directory is an
    /// identifier match; anything else is matched by name.
    pub fn lookup(&self, query: &str) -> DealerMatch<'_> {
        if let Some(dealer) = DealerId::parse(query).and_then(|id| self.by_id.get(&id)) {
            return DealerMatch::Identifier(dealer);
        }
        self.lookup_name(query)
    }

    pub fn lookup_name(&self, name: &str) -> DealerMatch<'_> {
        let key = normalize_dealer_name(name);
        let ids = match self.by_name.get(&key) {
            Some(ids) => ids,
            None => return DealerMatch::NotFound,
        };
        match ids.as_slice() {
            [] => DealerMatch::NotFound,
            [only] => self
                .by_id
                .get(only)
                .map(DealerMatch::UniqueName)
                .unwrap_or(DealerMatch::NotFound),
            many => DealerMatch::Ambiguous(
                many.iter()
                    .filter_map(|id| self.by_id.get(id))
                    .map(Dealer::to_candidate)
                    .collect(),
            ),
        }
    }

    /// Lookup converted into a typed failure.
    pub fn find(&self, query: &str) -> Result<&Dealer, ResolutionError> {
        match self.lookup(query) {
            DealerMatch::Identifier(d) | DealerMatch::UniqueName(d) => Ok(d),
            DealerMatch::Ambiguous(candidates) => Err(ResolutionError::AmbiguousDealer {
                name: query.trim().to_string(),
                candidates,
            }),
            DealerMatch::NotFound => Err(ResolutionError::DealerNotFound {
                query: query.trim().to_string(),
            }),
        }
    }

    pub fn find_id(&self, id: DealerId) -> Result<&Dealer, ResolutionError> {
        self.get(id).ok_or_else(|| ResolutionError::DealerNotFound {
            query: id.to_string(),
        })
    }
}
