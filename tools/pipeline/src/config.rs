//! Run configuration from `PIPELINE_*` environment variables.

use std::path::PathBuf;
use std::thread;

use chrono::NaiveDate;
use thiserror::Error;

use ingestion::{parse_projection, ReaderConfig};
use market_resolver::ResolverConfig;
use sales_aggregator::{RankingOptions, DEFAULT_DISAPPEAR_DAYS};
use types::summary::SalesMetric;
use types::window::{PeriodGranularity, WindowSpec};

pub const ENV_SOURCE: &str = "PIPELINE_SOURCE";
pub const ENV_DEALERS_FILE: &str = "PIPELINE_DEALERS_FILE";
pub const ENV_MAPPING_FILE: &str = "PIPELINE_MAPPING_FILE";
pub const ENV_CHUNK_SIZE: &str = "PIPELINE_CHUNK_SIZE";
pub const ENV_MAX_CHUNK_ROWS: &str = "PIPELINE_MAX_CHUNK_ROWS";
pub const ENV_RADIUS_MILES: &str = "PIPELINE_RADIUS_MILES";
pub const ENV_WINDOW: &str = "PIPELINE_WINDOW";
pub const ENV_TODAY: &str = "PIPELINE_TODAY";
pub const ENV_GRANULARITY: &str = "PIPELINE_GRANULARITY";
pub const ENV_COLUMNS: &str = "PIPELINE_COLUMNS";
pub const ENV_TOP_K: &str = "PIPELINE_TOP_K";
pub const ENV_METRIC: &str = "PIPELINE_METRIC";
pub const ENV_TOP_MODELS: &str = "PIPELINE_TOP_MODELS";
pub const ENV_WORKERS: &str = "PIPELINE_WORKERS";
pub const ENV_REPORT: &str = "PIPELINE_REPORT";
pub const ENV_TRACKER_STATE: &str = "PIPELINE_TRACKER_STATE";
pub const ENV_DISAPPEAR_DAYS: &str = "PIPELINE_DISAPPEAR_DAYS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not set")]
    Missing { var: &'static str },

    #[error("{var}={value} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Listing feed.
    pub source: PathBuf,
    /// Dealer reference table. Derived from the feed when absent.
    pub dealers_file: Option<PathBuf>,
    pub mapping_file: Option<PathBuf>,
    pub reader: ReaderConfig,
    pub resolver: ResolverConfig,
    pub window: WindowSpec,
    /// Anchor for rolling and year-to-date windows. Defaults to the UTC date.
    pub today: Option<NaiveDate>,
    pub granularity: PeriodGranularity,
    pub ranking: RankingOptions,
    pub top_models: usize,
    pub workers: usize,
    pub report_path: Option<PathBuf>,
    /// Disappearance tracker state file; the tracker runs only when set.
    pub tracker_state: Option<PathBuf>,
    pub disappear_days: u32,
}

impl PipelineConfig {
    /// Defaults for everything but the feed path.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dealers_file: None,
            mapping_file: None,
            reader: ReaderConfig::default(),
            resolver: ResolverConfig::default(),
            window: WindowSpec::default(),
            today: None,
            granularity: PeriodGranularity::default(),
            ranking: RankingOptions::default(),
            top_models: 5,
            workers: default_workers(),
            report_path: None,
            tracker_state: None,
            disappear_days: DEFAULT_DISAPPEAR_DAYS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let source = get(ENV_SOURCE).ok_or(ConfigError::Missing { var: ENV_SOURCE })?;
        let mut config = Self::new(source.trim());

        config.dealers_file = get(ENV_DEALERS_FILE).map(PathBuf::from);
        config.mapping_file = get(ENV_MAPPING_FILE).map(PathBuf::from);
        config.report_path = get(ENV_REPORT).map(PathBuf::from);
        config.tracker_state = get(ENV_TRACKER_STATE).map(PathBuf::from);

        if let Some(raw) = get(ENV_CHUNK_SIZE) {
            config.reader.chunk_size = parse_number(ENV_CHUNK_SIZE, &raw)?;
        }
        if let Some(raw) = get(ENV_MAX_CHUNK_ROWS) {
            config.reader.max_chunk_rows = parse_number(ENV_MAX_CHUNK_ROWS, &raw)?;
        }
        if let Some(raw) = get(ENV_COLUMNS) {
            config.reader.projection = parse_projection(&raw).map_err(|column| {
                invalid(ENV_COLUMNS, &raw, format!("unknown column '{column}'"))
            })?;
        }
        config
            .reader
            .validate()
            .map_err(|e| invalid(ENV_CHUNK_SIZE, &config.reader.chunk_size.to_string(), e.to_string()))?;

        if let Some(raw) = get(ENV_RADIUS_MILES) {
            let radius: f64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_RADIUS_MILES, &raw, "not a number"))?;
            if !radius.is_finite() || radius <= 0.0 {
                return Err(invalid(ENV_RADIUS_MILES, &raw, "must be positive"));
            }
            config.resolver.radius_miles = radius;
        }

        if let Some(raw) = get(ENV_WINDOW) {
            config.window = WindowSpec::parse(&raw).map_err(|e| invalid(ENV_WINDOW, &raw, e.to_string()))?;
        }
        if let Some(raw) = get(ENV_TODAY) {
            let today = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| invalid(ENV_TODAY, &raw, "expected YYYY-MM-DD"))?;
            config.today = Some(today);
        }
        if let Some(raw) = get(ENV_GRANULARITY) {
            config.granularity = PeriodGranularity::parse(&raw)
                .ok_or_else(|| invalid(ENV_GRANULARITY, &raw, "expected month or window"))?;
        }

        if let Some(raw) = get(ENV_TOP_K) {
            let k: usize = parse_number(ENV_TOP_K, &raw)?;
            config.ranking.top_k = (k > 0).then_some(k);
        }
        if let Some(raw) = get(ENV_METRIC) {
            config.ranking.metric = SalesMetric::parse(&raw)
                .ok_or_else(|| invalid(ENV_METRIC, &raw, "expected total, new or used"))?;
        }
        if let Some(raw) = get(ENV_TOP_MODELS) {
            config.top_models = parse_number(ENV_TOP_MODELS, &raw)?;
        }
        if let Some(raw) = get(ENV_WORKERS) {
            let workers: usize = parse_number(ENV_WORKERS, &raw)?;
            if workers == 0 {
                return Err(invalid(ENV_WORKERS, &raw, "must be at least 1"));
            }
            config.workers = workers;
        }
        if let Some(raw) = get(ENV_DISAPPEAR_DAYS) {
            let days: u32 = parse_number(ENV_DISAPPEAR_DAYS, &raw)?;
            if days == 0 {
                return Err(invalid(ENV_DISAPPEAR_DAYS, &raw, "must be at least 1"));
            }
            config.disappear_days = days;
        }

        Ok(config)
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(var, raw, "not a non-negative integer"))
}
