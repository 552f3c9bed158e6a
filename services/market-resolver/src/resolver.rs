//! Three-tier market resolution
//!
//! Tiers, in strict priority order, chosen once per dealer:
//! 1. Mapping: the dealer's effective market-area code
//! 2. Proxy key: `CITY|STATE`, else `ZIP:NNNNN`
//! 3. Radius: every dealer within `radius_miles` of the target
//!
//! The effective code of a dealer is the mapping entry for its id, else the
//! reference table's own `market_area`, else a mapping entry for its proxy
//! key (city+state first, then zip).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use types::dealer::Dealer;
use types::errors::{CoordinateError, ResolutionError};
use types::ids::{DealerId, MarketAreaCode};
use types::location::{Coordinate, ProxyKey};
use types::market::{MarketArea, MarketAreaMapping, ResolutionTier};

use crate::directory::DealerDirectory;
use crate::geo;

/// Configuration for the market resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Radius-tier search radius in miles.
    pub radius_miles: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { radius_miles: 25.0 }
    }
}

/// A radius candidate dropped because its coordinates are unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub dealer_id: DealerId,
    pub error: CoordinateError,
}

/// The competitive market of one dealer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResolution {
    pub dealer_id: DealerId,
    pub tier: ResolutionTier,
    pub market: MarketArea,
    /// Every dealer in the market, target included, in id order.
    pub members: Vec<DealerId>,
    pub excluded: Vec<ExcludedCandidate>,
}

impl MarketResolution {
    /// Members other than the target.
    pub fn peers(&self) -> impl Iterator<Item = DealerId> + '_ {
        let target = self.dealer_id;
        self.members.iter().copied().filter(move |id| *id != target)
    }

    pub fn peer_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    pub fn contains(&self, dealer_id: DealerId) -> bool {
        self.members.binary_search(&dealer_id).is_ok()
    }
}

/// Read-only resolver over the run's reference data.
///
/// Holds no interior mutability and can be shared across threads by
/// reference.
#[derive(Debug, Clone)]
pub struct MarketResolver {
    directory: DealerDirectory,
    config: ResolverConfig,
    effective_codes: BTreeMap<DealerId, MarketAreaCode>,
    code_members: BTreeMap<MarketAreaCode, BTreeSet<DealerId>>,
    proxy_members: BTreeMap<ProxyKey, BTreeSet<DealerId>>,
}

impl MarketResolver {
    pub fn new(directory: DealerDirectory, mapping: &MarketAreaMapping, config: ResolverConfig) -> Self {
        let mut effective_codes = BTreeMap::new();
        let mut code_members: BTreeMap<MarketAreaCode, BTreeSet<DealerId>> = BTreeMap::new();
        let mut proxy_members: BTreeMap<ProxyKey, BTreeSet<DealerId>> = BTreeMap::new();

        for dealer in directory.iter() {
            if let Some(code) = effective_code(dealer, mapping) {
                code_members.entry(code.clone()).or_default().insert(dealer.id);
                effective_codes.insert(dealer.id, code);
            }
            if let Some(key) = dealer.location.proxy_key() {
                proxy_members.entry(key).or_default().insert(dealer.id);
            }
        }

        debug!(
            dealers = directory.len(),
            mapped = effective_codes.len(),
            market_codes = code_members.len(),
            proxy_keys = proxy_members.len(),
            radius_miles = config.radius_miles,
            "MarketResolver initialized"
        );

        Self {
            directory,
            config,
            effective_codes,
            code_members,
            proxy_members,
        }
    }

    pub fn with_defaults(directory: DealerDirectory, mapping: &MarketAreaMapping) -> Self {
        Self::new(directory, mapping, ResolverConfig::default())
    }

    pub fn directory(&self) -> &DealerDirectory {
        &self.directory
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Find a dealer by id or name, then resolve its market.
    pub fn resolve_query(&self, query: &str) -> Result<MarketResolution, ResolutionError> {
        let dealer = self.directory.find(query)?;
        self.resolve(dealer)
    }

    pub fn resolve_id(&self, id: DealerId) -> Result<MarketResolution, ResolutionError> {
        let dealer = self.directory.find_id(id)?;
        self.resolve(dealer)
    }

    /// Resolve the market of `dealer`.
    pub fn resolve(&self, dealer: &Dealer) -> Result<MarketResolution, ResolutionError> {
        let resolution = if let Some(code) = self.effective_codes.get(&dealer.id) {
            self.by_code(dealer, code)
        } else if let Some(key) = dealer.location.proxy_key() {
            self.by_proxy(dealer, key)
        } else if let Some(center) = dealer.location.coordinate.filter(Coordinate::is_valid) {
            self.by_radius(dealer, center)
        } else {
            warn!(dealer_id = %dealer.id, "No mapping, proxy key or usable coordinates");
            return Err(ResolutionError::NoMarketResolvable {
                dealer_id: dealer.id,
            });
        };

        debug!(
            dealer_id = %dealer.id,
            tier = %resolution.tier,
            market = %resolution.market,
            members = resolution.members.len(),
            excluded = resolution.excluded.len(),
            "Market resolved"
        );
        Ok(resolution)
    }

    fn by_code(&self, dealer: &Dealer, code: &MarketAreaCode) -> MarketResolution {
        let members = members_with(self.code_members.get(code), dealer.id);
        MarketResolution {
            dealer_id: dealer.id,
            tier: ResolutionTier::Mapping,
            market: MarketArea::Mapped { code: code.clone() },
            members,
            excluded: Vec::new(),
        }
    }

    fn by_proxy(&self, dealer: &Dealer, key: ProxyKey) -> MarketResolution {
        let members = members_with(self.proxy_members.get(&key), dealer.id);
        MarketResolution {
            dealer_id: dealer.id,
            tier: ResolutionTier::ProxyKey,
            market: MarketArea::Proxy { key },
            members,
            excluded: Vec::new(),
        }
    }

    fn by_radius(&self, dealer: &Dealer, center: Coordinate) -> MarketResolution {
        let radius = self.config.radius_miles;
        let mut members = vec![dealer.id];
        let mut excluded = Vec::new();

        for candidate in self.directory.iter() {
            if candidate.id == dealer.id {
                continue;
            }
            let Some(point) = candidate.location.coordinate else {
                continue;
            };
            match geo::within_radius(center, point, radius) {
                Ok(true) => members.push(candidate.id),
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        target_dealer = %dealer.id,
                        candidate = %candidate.id,
                        error = %error,
                        "Radius candidate excluded"
                    );
                    excluded.push(ExcludedCandidate {
                        dealer_id: candidate.id,
                        error,
                    });
                }
            }
        }
        members.sort_unstable();

        MarketResolution {
            dealer_id: dealer.id,
            tier: ResolutionTier::Radius,
            market: MarketArea::Radius {
                center,
                radius_miles: radius,
            },
            members,
            excluded,
        }
    }
}

fn effective_code(dealer: &Dealer, mapping: &MarketAreaMapping) -> Option<MarketAreaCode> {
    if let Some(code) = mapping.for_dealer(dealer.id) {
        return Some(code.clone());
    }
    if let Some(code) = &dealer.market_area {
        return Some(code.clone());
    }
    let location = &dealer.location;
    let city_state = match (&location.city, &location.state) {
        (Some(city), Some(state)) => ProxyKey::parse(&format!("{city}|{state}")),
        _ => None,
    };
    let zip = location
        .zip
        .as_deref()
        .and_then(|z| ProxyKey::parse(&format!("ZIP:{z}")));
    city_state
        .and_then(|key| mapping.for_proxy(&key).cloned())
        .or_else(|| zip.and_then(|key| mapping.for_proxy(&key).cloned()))
}

fn members_with(set: Option<&BTreeSet<DealerId>>, target: DealerId) -> Vec<DealerId> {
    let mut members: BTreeSet<DealerId> = set.cloned().unwrap_or_default();
    members.insert(target);
    members.into_iter().collect()
}
