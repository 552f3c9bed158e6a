//! Dealer reference data
//!
//! Loaded once per run and never mutated by the aggregation stages.

use serde::{Deserialize, Serialize};

use crate::errors::DealerCandidate;
use crate::ids::{DealerId, MarketAreaCode};
use crate::listing::ListingRecord;
use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dealer {
    pub id: DealerId,
    pub name: String,
    pub location: Location,
    /// Market-area code carried by the reference table itself, if any.
    pub market_area: Option<MarketAreaCode>,
}

impl Dealer {
    pub fn new(id: DealerId, name: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            market_area: None,
        }
    }

    pub fn with_market_area(mut self, code: MarketAreaCode) -> Self {
        self.market_area = Some(code);
        self
    }

    /// Reference entry derived from a listing row, for runs without a
    /// dealer table.
    pub fn from_listing(record: &ListingRecord) -> Self {
        Self {
            id: record.dealer_id,
            name: record.dealer_name.clone().unwrap_or_default(),
            location: record.location.clone(),
            market_area: None,
        }
    }

    /// Lookup key for name matching: lower-case, whitespace collapsed.
    pub fn normalized_name(&self) -> String {
        normalize_dealer_name(&self.name)
    }

    pub fn to_candidate(&self) -> DealerCandidate {
        DealerCandidate {
            dealer_id: self.id,
            name: self.name.clone(),
            city: self.location.city.clone(),
            state: self.location.state.clone(),
        }
    }
}

pub fn normalize_dealer_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
