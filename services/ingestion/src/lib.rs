//! Ingestion Service
//!
//! Streams the raw listing feed in bounded chunks and loads reference data:
//! - Column projection against the feed header
//! - Strict row validation into `ListingRecord` or a typed rejection
//! - Restartable chunk iteration with per-chunk rejection tallies
//! - Dealer table and market-area mapping loaders
//!
//! # Architecture
//!
//! ```text
//!   CSV source ──► ColumnIndex ──► validate_row ──► RecordChunk
//!                                      │                │
//!                                      └── RejectionTally
//!
//!   dealer table / mapping table ──► reference loaders
//! ```

pub mod columns;
pub mod reader;
pub mod reference;
pub mod row;
pub mod tally;

pub use columns::{parse_projection, Column, ColumnIndex};
pub use reader::{ChunkIter, IngestError, ListingSource, ReaderConfig, RecordChunk};
pub use reference::{derive_dealers, load_dealers, load_mapping, read_dealers, read_mapping, ReferenceError};
pub use row::{parse_status_date, validate_row};
pub use tally::RejectionTally;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
