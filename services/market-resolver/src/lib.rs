//! Market Resolver Service
//!
//! Maps a dealer to the set of peers it competes with:
//! - `geo`: haversine great-circle distance with coordinate validation
//! - `directory`: dealer index with identifier-then-unique-name lookup
//! - `resolver`: mapping, proxy-key and radius tiers in strict priority order
//!
//! Everything here is read-only over reference data loaded once per run.

pub mod directory;
pub mod geo;
pub mod resolver;

pub use directory::{DealerDirectory, DealerMatch};
pub use geo::{haversine_miles, within_radius, EARTH_RADIUS_MILES};
pub use resolver::{ExcludedCandidate, MarketResolution, MarketResolver, ResolverConfig};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
