//! Sales Aggregator Service
//!
//! ```text
//!  RecordChunk ──► fold_chunk ──► PartialAggregate ─┐
//!  RecordChunk ──► fold_chunk ──► PartialAggregate ─┼─► merge ──► finalize ──► FinalizedSales
//!  RecordChunk ──► fold_chunk ──► PartialAggregate ─┘                              │
//!                                                                                   ▼
//!                                                      rank_market / market_overview / top_models
//! ```
//!
//! - `partial`: order-independent counters with first-occurrence VIN dedup
//! - `aggregator`: sequential driver, pass accounting and finalization
//! - `markets`: several peer sets folded in the same pass, each deduplicated on its own
//! - `parallel`: scoped worker threads over bounded channels
//! - `ranking`: competitor ordering and market share
//! - `insights`: market overview, top models, dealer profiles
//! - `tracker`: disappearance-based sold detection across snapshots

pub mod aggregator;
pub mod insights;
pub mod markets;
pub mod parallel;
pub mod partial;
pub mod ranking;
pub mod tracker;

pub use aggregator::{
    finalize, fold_stream, AggregateError, AggregationOutput, ChunkFold, FinalizedSales,
    PassSummary, SalesAggregator,
};
pub use insights::{
    dealer_profile, market_overview, top_models, DealerSalesProfile, MarketOverview, ModelSales,
    PeriodSales,
};
pub use markets::{combined_fingerprint, combined_stats, MarketAggregator, MarketPartials};
pub use parallel::aggregate_parallel;
pub use partial::{AggregateStats, AggregationScope, PartialAggregate, RecordOutcome};
pub use ranking::{
    market_share, rank_competitors, rank_market, CompetitorSales, RankingOptions, RankingRequest,
};
pub use tracker::{DisappearanceTracker, SoldVehicle, TrackerError, DEFAULT_DISAPPEAR_DAYS};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
