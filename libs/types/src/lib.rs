//! Types library for dealer-market sales analysis
//!
//! This library provides the domain vocabulary shared by every pipeline stage.
//! It performs no I/O.
//!
//! # Modules
//! - `ids`: Identifiers (DealerId, Vin, MarketAreaCode, RunId)
//! - `location`: Coordinates, postal location, proxy keys
//! - `listing`: Validated listing rows
//! - `dealer`: Dealer reference data
//! - `market`: Market areas, resolution tiers, mapping table
//! - `window`: Half-open period windows and window policies
//! - `summary`: Sales summaries and competitor rankings
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod location;
pub mod listing;
pub mod dealer;
pub mod market;
pub mod window;
pub mod summary;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::location::*;
    pub use crate::listing::*;
    pub use crate::dealer::*;
    pub use crate::market::*;
    pub use crate::window::*;
    pub use crate::summary::*;
    pub use crate::errors::*;
}
