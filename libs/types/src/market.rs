//! Market areas and the authoritative mapping table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::{DealerId, MarketAreaCode};
use crate::location::{Coordinate, ProxyKey};

/// Which resolution tier produced a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Mapping,
    ProxyKey,
    Radius,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionTier::Mapping => "mapping",
            ResolutionTier::ProxyKey => "proxy_key",
            ResolutionTier::Radius => "radius",
        };
        f.write_str(s)
    }
}

/// Identity of a competitive market.
///
/// In the radius tier the market has no stored code; its identity is the
/// search itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketArea {
    Mapped { code: MarketAreaCode },
    Proxy { key: ProxyKey },
    Radius { center: Coordinate, radius_miles: f64 },
}

impl MarketArea {
    pub fn tier(&self) -> ResolutionTier {
        match self {
            MarketArea::Mapped { .. } => ResolutionTier::Mapping,
            MarketArea::Proxy { .. } => ResolutionTier::ProxyKey,
            MarketArea::Radius { .. } => ResolutionTier::Radius,
        }
    }
}

impl fmt::Display for MarketArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketArea::Mapped { code } => write!(f, "{code}"),
            MarketArea::Proxy { key } => write!(f, "{key}"),
            MarketArea::Radius {
                center,
                radius_miles,
            } => write!(f, "{radius_miles} mi of {center}"),
        }
    }
}

/// Key column of a mapping table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingKey {
    Dealer(DealerId),
    Proxy(ProxyKey),
}

impl MappingKey {
    /// A key that parses as a dealer id is a dealer key; otherwise it must be
    /// a proxy key (`CITY|STATE` or `ZIP:NNNNN`).
    pub fn parse(raw: &str) -> Option<Self> {
        DealerId::parse(raw)
            .map(MappingKey::Dealer)
            .or_else(|| ProxyKey::parse(raw).map(MappingKey::Proxy))
    }
}

/// Authoritative dealer/proxy-key to market-area mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketAreaMapping {
    by_dealer: BTreeMap<DealerId, MarketAreaCode>,
    by_proxy: BTreeMap<ProxyKey, MarketAreaCode>,
}

impl MarketAreaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A later entry for the same key replaces the earlier
    /// one; the replaced code is returned.
    pub fn insert(&mut self, key: MappingKey, code: MarketAreaCode) -> Option<MarketAreaCode> {
        match key {
            MappingKey::Dealer(id) => self.by_dealer.insert(id, code),
            MappingKey::Proxy(proxy) => self.by_proxy.insert(proxy, code),
        }
    }

    pub fn for_dealer(&self, id: DealerId) -> Option<&MarketAreaCode> {
        self.by_dealer.get(&id)
    }

    pub fn for_proxy(&self, key: &ProxyKey) -> Option<&MarketAreaCode> {
        self.by_proxy.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_dealer.len() + self.by_proxy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
