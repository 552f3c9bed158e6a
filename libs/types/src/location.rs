//! Geographic location types
//!
//! `Coordinate` is a plain value; range validation happens in the distance
//! utility so that bad reference data surfaces as a `CoordinateError` at the
//! point of use instead of being dropped while loading.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within
    /// [-90, 90] latitude / [-180, 180] longitude.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Postal and geographic location of a dealer or listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Option<Coordinate>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl Location {
    /// Synthesized market-area stand-in for this location.
    ///
    /// City+state is preferred; zip is used only when either city or state
    /// is missing.
    pub fn proxy_key(&self) -> Option<ProxyKey> {
        match (non_blank(&self.city), non_blank(&self.state)) {
            (Some(city), Some(state)) => Some(ProxyKey::CityState {
                city: normalize_place(city),
                state: normalize_place(state),
            }),
            _ => non_blank(&self.zip).map(|zip| ProxyKey::Zip(normalize_zip(zip))),
        }
    }

    /// Whether the location carries any postal component.
    pub fn has_postal(&self) -> bool {
        non_blank(&self.city).is_some()
            || non_blank(&self.state).is_some()
            || non_blank(&self.zip).is_some()
    }
}

/// Market-area key synthesized from postal fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyKey {
    CityState { city: String, state: String },
    Zip(String),
}

impl ProxyKey {
    /// Parse the textual form used in mapping tables: `CITY|STATE` or
    /// `ZIP:NNNNN`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(zip) = raw.strip_prefix("ZIP:").or_else(|| raw.strip_prefix("zip:")) {
            let zip = zip.trim();
            return (!zip.is_empty()).then(|| ProxyKey::Zip(normalize_zip(zip)));
        }
        let (city, state) = raw.split_once('|')?;
        let (city, state) = (city.trim(), state.trim());
        if city.is_empty() || state.is_empty() {
            return None;
        }
        Some(ProxyKey::CityState {
            city: normalize_place(city),
            state: normalize_place(state),
        })
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKey::CityState { city, state } => write!(f, "{city}|{state}"),
            ProxyKey::Zip(zip) => write!(f, "ZIP:{zip}"),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Upper-case and collapse internal whitespace.
pub fn normalize_place(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Keep the five-digit prefix of ZIP+4 values.
pub fn normalize_zip(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.split_once('-') {
        Some((head, _)) if head.len() == 5 => head.to_string(),
        _ => trimmed.to_string(),
    }
}
