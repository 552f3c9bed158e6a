//! Listing records: one validated row of the raw inventory feed
//!
//! The status date is treated as the sale date. That is a proxy: it is the
//! last-seen state of the listing, not a confirmed transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{DealerId, Vin};
use crate::location::{Coordinate, Location};

/// Inventory type of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryType {
    New,
    Used,
}

impl InventoryType {
    /// Case-insensitive parse of `new` / `used`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("new") {
            Some(InventoryType::New)
        } else if trimmed.eq_ignore_ascii_case("used") {
            Some(InventoryType::Used)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryType::New => "new",
            InventoryType::Used => "used",
        }
    }
}

impl fmt::Display for InventoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Global 0-based position of the data row in its source.
    /// Defines "first occurrence" for duplicate vehicle identifiers.
    pub ordinal: u64,
    pub vin: Vin,
    pub dealer_id: DealerId,
    pub dealer_name: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub model_year: Option<i32>,
    pub inventory_type: InventoryType,
    /// Used as the sale date.
    pub status_date: NaiveDate,
    pub price: Option<Decimal>,
    pub msrp: Option<Decimal>,
    pub location: Location,
}

impl ListingRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location.coordinate
    }

    /// Make normalised for grouping (trimmed, lower-case).
    pub fn make_key(&self) -> String {
        normalize_label(self.make.as_deref())
    }

    /// Model normalised for grouping (trimmed, lower-case).
    pub fn model_key(&self) -> String {
        normalize_label(self.model.as_deref())
    }
}

/// Grouping label used for make/model keys. Missing values group under "".
pub fn normalize_label(raw: Option<&str>) -> String {
    raw.map(|s| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .unwrap_or_default()
}
