//! One batch run: reference data, market resolution, a single aggregation
//! pass over the feed, then per-dealer ranking.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use ingestion::{derive_dealers, load_dealers, load_mapping, ListingSource};
use market_resolver::{DealerDirectory, MarketResolution, MarketResolver};
use sales_aggregator::{
    aggregate_parallel, combined_fingerprint, combined_stats, dealer_profile, market_overview,
    rank_market, top_models, AggregationScope, DisappearanceTracker, FinalizedSales,
    MarketAggregator, PassSummary, RankingRequest, SoldVehicle,
};
use types::errors::ResolutionError;
use types::ids::{DealerId, RunId};
use types::market::MarketAreaMapping;
use types::window::PeriodWindow;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::{DealerOutcome, DealerRef, RunReport};

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse every query against the configured feed.
    ///
    /// A query that cannot be resolved becomes a `Failed` outcome; only
    /// I/O, capacity and window errors abort the run.
    pub fn run<Q: AsRef<str>>(&self, queries: &[Q]) -> Result<RunReport, PipelineError> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let today = self.config.today.unwrap_or_else(|| started_at.date_naive());
        let window = self.config.window.resolve(today)?;
        let source = ListingSource::file(&self.config.source);

        info!(
            run_id = %run_id,
            source = %source.describe(),
            window = %window,
            queries = queries.len(),
            workers = self.config.workers,
            "Pipeline run started"
        );

        let resolver = self.build_resolver(&source)?;

        let resolutions: Vec<(String, Result<MarketResolution, ResolutionError>)> = queries
            .iter()
            .map(|q| {
                let query = q.as_ref().trim().to_string();
                let result = resolver.resolve_query(&query);
                if let Err(e) = &result {
                    warn!(query = %query, error = %e, "Dealer analysis skipped");
                }
                (query, result)
            })
            .collect();

        // One aggregate per distinct peer set, so duplicates resolve within
        // each market and never across markets.
        let market_sets: Vec<BTreeSet<DealerId>> = resolutions
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|r| r.members.iter().copied().collect::<BTreeSet<DealerId>>())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (pass, sales) = if market_sets.is_empty() {
            info!("No market resolved, skipping aggregation pass");
            (PassSummary::default(), Vec::new())
        } else {
            self.aggregate(&source, &market_sets, window)?
        };

        let outcomes: Vec<DealerOutcome> = resolutions
            .into_iter()
            .map(|(query, result)| {
                let resolution = match result {
                    Ok(resolution) => resolution,
                    Err(e) => {
                        return DealerOutcome::Failed {
                            query,
                            error: e.to_string(),
                        }
                    }
                };
                let members: BTreeSet<DealerId> = resolution.members.iter().copied().collect();
                match market_sets.binary_search(&members).ok().and_then(|i| sales.get(i)) {
                    Some(market_sales) => self.outcome(query, resolution, market_sales, &resolver, window),
                    // Every resolved peer set is aggregated above.
                    None => DealerOutcome::Failed {
                        query,
                        error: format!("No aggregate for dealer {}", resolution.dealer_id),
                    },
                }
            })
            .collect();

        let sold_vehicles = match &self.config.tracker_state {
            Some(path) => Some(self.track_snapshot(&source, today, path)?),
            None => None,
        };

        let finished_at = Utc::now();
        let report = RunReport {
            run_id,
            version: crate::VERSION.to_string(),
            started_at,
            finished_at,
            source: source.describe(),
            window_spec: self.config.window,
            window,
            granularity: self.config.granularity,
            reference_dealers: resolver.directory().len(),
            chunks: pass.chunks,
            rows_processed: pass.rows_processed,
            rows_accepted: pass.rows_accepted,
            rows_rejected: pass.rows_rejected,
            rejections: pass.rejections,
            markets: sales.len(),
            stats: combined_stats(&sales),
            fingerprint: combined_fingerprint(&sales),
            outcomes,
            sold_vehicles,
        };

        info!(
            run_id = %run_id,
            resolved = report.resolved().count(),
            failed = report.failed().count(),
            markets = report.markets,
            rows = report.rows_processed,
            rejected = report.rows_rejected,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Pipeline run complete"
        );
        Ok(report)
    }

    fn build_resolver(&self, source: &ListingSource) -> Result<MarketResolver, PipelineError> {
        let dealers = match &self.config.dealers_file {
            Some(path) => load_dealers(path)?,
            None => {
                info!("No dealer table configured, deriving dealers from the feed");
                derive_dealers(source, &self.config.reader)?
            }
        };
        let mapping = match &self.config.mapping_file {
            Some(path) => load_mapping(path)?,
            None => MarketAreaMapping::new(),
        };
        Ok(MarketResolver::new(
            DealerDirectory::new(dealers),
            &mapping,
            self.config.resolver.clone(),
        ))
    }

    /// Single pass over the source filling one aggregate per peer set.
    fn aggregate(
        &self,
        source: &ListingSource,
        market_sets: &[BTreeSet<DealerId>],
        window: PeriodWindow,
    ) -> Result<(PassSummary, Vec<FinalizedSales>), PipelineError> {
        let aggregator = MarketAggregator::new(market_sets.iter().map(|members| {
            AggregationScope::new(members.iter().copied(), window, self.config.granularity)
        }));
        let chunks = source.chunks(&self.config.reader)?;
        let output = aggregate_parallel(&aggregator, chunks, self.config.workers)?;
        let sales = aggregator.finalize(output.partial, Utc::now());
        Ok((output.pass, sales))
    }

    fn outcome(
        &self,
        query: String,
        resolution: MarketResolution,
        sales: &FinalizedSales,
        resolver: &MarketResolver,
        window: PeriodWindow,
    ) -> DealerOutcome {
        let directory = resolver.directory();
        let name_of = |id: DealerId| {
            directory
                .get(id)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let members: BTreeSet<DealerId> = resolution.members.iter().copied().collect();

        let ranking = rank_market(
            sales,
            RankingRequest {
                market: resolution.market.clone(),
                window,
                target: Some(resolution.dealer_id),
            },
            &resolution.members,
            name_of,
            &self.config.ranking,
        );
        let overview = market_overview(
            sales.summaries.iter().filter(|s| members.contains(&s.dealer_id)),
            &members,
        );
        let market_models = top_models(
            sales.models.iter().filter(|m| members.contains(&m.dealer_id)),
            None,
            None,
            self.config.top_models,
        );
        let profile =
            dealer_profile(resolution.dealer_id, &sales.summaries).with_empty_periods(&sales.periods());

        DealerOutcome::Resolved {
            query,
            dealer: DealerRef {
                id: resolution.dealer_id,
                name: name_of(resolution.dealer_id),
            },
            tier: resolution.tier,
            peer_count: resolution.peer_count(),
            market: resolution.market,
            excluded_candidates: resolution.excluded,
            stats: sales.stats,
            fingerprint: sales.fingerprint.clone(),
            ranking,
            overview,
            top_models: market_models,
            profile,
        }
    }

    /// Feed the whole source to the disappearance tracker as the snapshot
    /// for `date` and persist its state. Nothing is saved if the read fails.
    pub fn track_snapshot(
        &self,
        source: &ListingSource,
        date: NaiveDate,
        state_path: &Path,
    ) -> Result<Vec<SoldVehicle>, PipelineError> {
        let mut tracker = DisappearanceTracker::load_or_new(state_path, self.config.disappear_days)?;

        let mut failure = None;
        let records = source
            .chunks(&self.config.reader)?
            .map_while(|chunk| match chunk {
                Ok(chunk) => Some(chunk.records),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            })
            .flatten();
        let sold = tracker.observe(date, records)?;
        if let Some(e) = failure {
            return Err(e.into());
        }

        tracker.save(state_path)?;
        info!(
            %date,
            sold = sold.len(),
            tracked = tracker.tracked(),
            state = %state_path.display(),
            "Disappearance tracker updated"
        );
        Ok(sold)
    }
}
