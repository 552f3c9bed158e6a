//! Identifier types for dealers, vehicles, market areas and pipeline runs
//!
//! Dealer identifiers are the numeric ids carried by the listing feed.
//! Vehicle identifiers are normalised to upper case so that the same VIN
//! written with different casing deduplicates to one sale.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary key of a dealer in the listing feed and the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealerId(u64);

impl DealerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse a dealer id from feed text.
    ///
    /// Float-exported feeds write integer ids as `12345.0`; that form is
    /// accepted, any other fractional part is not.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = match trimmed.split_once('.') {
            Some((int_part, frac)) if !frac.is_empty() && frac.chars().all(|c| c == '0') => {
                int_part
            }
            Some(_) => return None,
            None => trimmed,
        };
        digits.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for DealerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DealerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Vehicle identifier. Unique per physical sale event within a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vin(String);

impl Vin {
    /// Normalise and wrap a raw identifier. Returns `None` for blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_ascii_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authoritative market-area code (DMA or equivalent) from a mapping source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketAreaCode(String);

impl MarketAreaCode {
    pub fn new(code: impl AsRef<str>) -> Option<Self> {
        let trimmed = code.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketAreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one pipeline run
///
/// Uses UUID v7 so run reports sort chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
