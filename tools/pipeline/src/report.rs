//! Run report and JSON export

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ingestion::RejectionTally;
use market_resolver::ExcludedCandidate;
use sales_aggregator::{AggregateStats, DealerSalesProfile, MarketOverview, ModelSales, SoldVehicle};
use types::ids::{DealerId, RunId};
use types::market::{MarketArea, ResolutionTier};
use types::summary::CompetitorRanking;
use types::window::{PeriodGranularity, PeriodWindow, WindowSpec};

use crate::error::PipelineError;

/// The dealer an analysis was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerRef {
    pub id: DealerId,
    pub name: String,
}

/// Result of one dealer query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DealerOutcome {
    Resolved {
        query: String,
        dealer: DealerRef,
        tier: ResolutionTier,
        market: MarketArea,
        peer_count: usize,
        excluded_candidates: Vec<ExcludedCandidate>,
        /// Accounting of this market's own aggregate.
        stats: AggregateStats,
        fingerprint: String,
        ranking: CompetitorRanking,
        overview: MarketOverview,
        top_models: Vec<ModelSales>,
        profile: DealerSalesProfile,
    },
    Failed {
        query: String,
        error: String,
    },
}

impl DealerOutcome {
    pub fn query(&self) -> &str {
        match self {
            DealerOutcome::Resolved { query, .. } | DealerOutcome::Failed { query, .. } => query,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, DealerOutcome::Resolved { .. })
    }

    pub fn ranking(&self) -> Option<&CompetitorRanking> {
        match self {
            DealerOutcome::Resolved { ranking, .. } => Some(ranking),
            DealerOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub window_spec: WindowSpec,
    pub window: PeriodWindow,
    pub granularity: PeriodGranularity,
    pub reference_dealers: usize,
    pub chunks: u64,
    pub rows_processed: u64,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejections: RejectionTally,
    /// Distinct peer sets aggregated in the pass.
    pub markets: usize,
    /// Summed over markets; a row offered to two markets is considered twice.
    pub stats: AggregateStats,
    /// Over every market's fingerprint. Empty when no query resolved and no
    /// pass ran.
    pub fingerprint: String,
    pub outcomes: Vec<DealerOutcome>,
    /// Present only when disappearance tracking ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sold_vehicles: Option<Vec<SoldVehicle>>,
}

impl RunReport {
    pub fn resolved(&self) -> impl Iterator<Item = &DealerOutcome> {
        self.outcomes.iter().filter(|o| o.is_resolved())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DealerOutcome> {
        self.outcomes.iter().filter(|o| !o.is_resolved())
    }

    pub fn outcome(&self, query: &str) -> Option<&DealerOutcome> {
        self.outcomes.iter().find(|o| o.query() == query)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the pretty JSON report, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), PipelineError> {
        let export_err = |source| PipelineError::Export {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(export_err)?;
        }
        fs::write(path, self.to_json()?).map_err(export_err)
    }
}
