//! Dealer market analysis batch job
//!
//! ```text
//!  dealer table ─┐
//!  mapping table ┼─► MarketResolver ──► members per query ─┐
//!  listing feed ─┘                                         ▼
//!  listing feed ──► chunks ──► aggregate_parallel ──► FinalizedSales per peer set ──► rank_market ──► RunReport
//! ```
//!
//! - `config`: `PIPELINE_*` environment configuration
//! - `run`: the batch run itself
//! - `report`: run report and JSON export
//! - `error`: fatal run errors

pub mod config;
pub mod error;
pub mod report;
pub mod run;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use report::{DealerOutcome, DealerRef, RunReport};
pub use run::Pipeline;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
