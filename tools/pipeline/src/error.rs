use thiserror::Error;

use ingestion::{IngestError, ReferenceError};
use sales_aggregator::{AggregateError, TrackerError};
use types::errors::WindowError;

use crate::config::ConfigError;

/// Errors that stop a run. Per-dealer resolution failures are reported in
/// the run report instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Reference data error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Report export failed for {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
