//! Error types for the dealer-market pipeline
//!
//! Row-level problems (`RejectReason`) are absorbed and tallied by the
//! reader. Dealer-level problems (`ResolutionError`) fail one dealer's
//! analysis. `WindowError` rejects a window specification before the run
//! starts. `CoordinateError` fails a single distance computation and
//! `CapacityError` is fatal to the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::DealerId;

/// Why an input row was excluded from aggregation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("Missing vehicle identifier")]
    MissingVin,

    #[error("Missing dealer identifier")]
    MissingDealerId,

    #[error("Invalid dealer identifier: {0}")]
    InvalidDealerId(String),

    #[error("Missing status date")]
    MissingStatusDate,

    #[error("Unparseable status date: {0}")]
    UnparseableStatusDate(String),

    #[error("Invalid inventory type: {0}")]
    InvalidInventoryType(String),

    #[error("Invalid number in column {column}: {value}")]
    InvalidNumber { column: String, value: String },

    #[error("Malformed row: {0}")]
    MalformedRow(String),
}

impl RejectReason {
    /// Stable tally key for this reason.
    pub fn kind(&self) -> RejectKind {
        match self {
            RejectReason::MissingVin => RejectKind::MissingVin,
            RejectReason::MissingDealerId => RejectKind::MissingDealerId,
            RejectReason::InvalidDealerId(_) => RejectKind::InvalidDealerId,
            RejectReason::MissingStatusDate => RejectKind::MissingStatusDate,
            RejectReason::UnparseableStatusDate(_) => RejectKind::UnparseableStatusDate,
            RejectReason::InvalidInventoryType(_) => RejectKind::InvalidInventoryType,
            RejectReason::InvalidNumber { .. } => RejectKind::InvalidNumber,
            RejectReason::MalformedRow(_) => RejectKind::MalformedRow,
        }
    }
}

/// Value-free rejection category used as a tally key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    MissingVin,
    MissingDealerId,
    InvalidDealerId,
    MissingStatusDate,
    UnparseableStatusDate,
    InvalidInventoryType,
    InvalidNumber,
    MalformedRow,
}

/// A dealer that matched an ambiguous name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerCandidate {
    pub dealer_id: DealerId,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl std::fmt::Display for DealerCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.dealer_id)?;
        if let (Some(city), Some(state)) = (&self.city, &self.state) {
            write!(f, " {city}, {state}")?;
        }
        Ok(())
    }
}

fn join_candidates(candidates: &[DealerCandidate]) -> String {
    candidates
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to resolve a dealer to its competitive market.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionError {
    #[error("Dealer not found: {query}")]
    DealerNotFound { query: String },

    #[error("Ambiguous dealer name '{name}': {}", join_candidates(.candidates))]
    AmbiguousDealer {
        name: String,
        candidates: Vec<DealerCandidate>,
    },

    #[error("No market resolvable for dealer {dealer_id}: no mapping, proxy key or coordinates")]
    NoMarketResolvable { dealer_id: DealerId },
}

/// Out-of-range or non-finite coordinate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoordinateError {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

/// Invalid time-window specification.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowError {
    #[error("Invalid window specification '{0}': expected rolling:N, ytd or calendar:YYYY")]
    InvalidSpec(String),

    #[error("Window end {end} precedes start {start}")]
    Inverted { start: String, end: String },

    #[error("Window out of representable date range")]
    OutOfRange,
}

/// Chunk sizing that violates the configured memory bound.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityError {
    #[error("Chunk size {requested} exceeds configured limit of {limit} rows")]
    ChunkTooLarge { requested: usize, limit: usize },

    #[error("Chunk size must be at least one row")]
    ZeroChunkSize,
}
