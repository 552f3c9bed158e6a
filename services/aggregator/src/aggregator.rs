//! Sales Aggregator: single-pass fold over the record stream
//!
//! One pass yields both the per-dealer totals and the per-model refinement.
//! Results stay inside `PartialAggregate` values until the whole stream has
//! been consumed; only `finalize` produces the summaries handed to ranking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use ingestion::{IngestError, RecordChunk, RejectionTally};
use types::ids::DealerId;
use types::summary::{ModelSalesSummary, SalesCounts, SalesSummary};
use types::window::{PeriodGranularity, PeriodWindow};

use crate::partial::{AggregateStats, AggregationScope, PartialAggregate};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Aggregation worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Aggregation worker {worker} stopped accepting chunks")]
    WorkerDisconnected { worker: usize },
}

// ── Pass accounting ─────────────────────────────────────────────────

/// Row-level accounting of one pass over the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub chunks: u64,
    pub rows_processed: u64,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejections: RejectionTally,
}

impl PassSummary {
    pub fn record_chunk(&mut self, chunk: &RecordChunk) {
        self.chunks += 1;
        self.rows_processed += chunk.rows_read as u64;
        self.rows_accepted += chunk.accepted() as u64;
        self.rows_rejected += chunk.rejected();
        self.rejections.merge(&chunk.rejections);
    }

    pub fn merge(&mut self, other: &PassSummary) {
        self.chunks += other.chunks;
        self.rows_processed += other.rows_processed;
        self.rows_accepted += other.rows_accepted;
        self.rows_rejected += other.rows_rejected;
        self.rejections.merge(&other.rejections);
    }
}

/// Output of a full pass: the merged aggregate and its row accounting.
#[derive(Debug, Clone)]
pub struct AggregationOutput<P = PartialAggregate> {
    pub partial: P,
    pub pass: PassSummary,
}

// ── Chunk folding ───────────────────────────────────────────────────

/// A fold over record chunks whose partials merge associatively and
/// commutatively. Drivers (sequential or parallel) only see this trait.
pub trait ChunkFold: Sync {
    type Partial: Send;

    /// Identity element of `combine`.
    fn empty(&self) -> Self::Partial;

    /// Fold one chunk into an independent partial.
    fn fold(&self, chunk: &RecordChunk) -> Self::Partial;

    fn combine(&self, a: Self::Partial, b: Self::Partial) -> Self::Partial;
}

/// Consume a chunk stream on the calling thread.
pub fn fold_stream<F, I>(folder: &F, chunks: I) -> Result<AggregationOutput<F::Partial>, AggregateError>
where
    F: ChunkFold,
    I: IntoIterator<Item = Result<RecordChunk, IngestError>>,
{
    let mut partial = folder.empty();
    let mut pass = PassSummary::default();
    for chunk in chunks {
        let chunk = chunk?;
        pass.record_chunk(&chunk);
        partial = folder.combine(partial, folder.fold(&chunk));
    }
    info!(
        chunks = pass.chunks,
        rows = pass.rows_processed,
        rejected = pass.rows_rejected,
        "Aggregation pass complete"
    );
    Ok(AggregationOutput { partial, pass })
}

// ── Finalized results ───────────────────────────────────────────────

/// Immutable aggregate of a fully consumed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedSales {
    pub window: PeriodWindow,
    pub granularity: PeriodGranularity,
    /// Sorted by dealer, then period.
    pub summaries: Vec<SalesSummary>,
    /// Sorted by dealer, period, make, model, inventory type.
    pub models: Vec<ModelSalesSummary>,
    pub stats: AggregateStats,
    /// SHA-256 over the counters; independent of `finalized_at`.
    pub fingerprint: String,
    pub finalized_at: DateTime<Utc>,
}

impl FinalizedSales {
    pub fn summaries_for(&self, dealer_id: DealerId) -> impl Iterator<Item = &SalesSummary> {
        self.summaries
            .iter()
            .filter(move |s| s.dealer_id == dealer_id)
    }

    pub fn models_for(&self, dealer_id: DealerId) -> impl Iterator<Item = &ModelSalesSummary> {
        self.models.iter().filter(move |m| m.dealer_id == dealer_id)
    }

    /// Window totals per dealer.
    pub fn totals_by_dealer(&self) -> BTreeMap<DealerId, SalesCounts> {
        let mut totals: BTreeMap<DealerId, SalesCounts> = BTreeMap::new();
        for summary in &self.summaries {
            totals
                .entry(summary.dealer_id)
                .or_default()
                .add(&summary.counts());
        }
        totals
    }

    /// Every bucket of the window, including ones nobody sold in.
    pub fn periods(&self) -> Vec<PeriodWindow> {
        self.window.buckets(self.granularity)
    }

    pub fn dealer_totals(&self, dealer_id: DealerId) -> SalesCounts {
        let mut counts = SalesCounts::default();
        for summary in self.summaries_for(dealer_id) {
            counts.add(&summary.counts());
        }
        counts
    }
}

/// Turn a complete partial into immutable summaries.
pub fn finalize(
    partial: PartialAggregate,
    scope: &AggregationScope,
    finalized_at: DateTime<Utc>,
) -> FinalizedSales {
    let summaries: Vec<SalesSummary> = partial
        .totals()
        .iter()
        .map(|(key, counts)| SalesSummary::new(key.dealer_id, key.period, *counts, finalized_at))
        .collect();

    let models: Vec<ModelSalesSummary> = partial
        .models()
        .iter()
        .map(|(key, count)| ModelSalesSummary {
            dealer_id: key.dealer_id,
            period_start: key.period.start,
            period_end: key.period.end,
            make: key.make.clone(),
            model: key.model.clone(),
            inventory_type: key.inventory_type,
            sales_count: *count,
            last_updated: finalized_at,
        })
        .collect();

    let fingerprint = compute_fingerprint(&scope.window, &summaries, &models);

    info!(
        summaries = summaries.len(),
        model_rows = models.len(),
        counted = partial.stats().counted,
        duplicates = partial.stats().duplicates,
        fingerprint = %fingerprint,
        "Aggregate finalized"
    );

    FinalizedSales {
        window: scope.window,
        granularity: scope.granularity,
        summaries,
        models,
        stats: *partial.stats(),
        fingerprint,
        finalized_at,
    }
}

/// SHA-256 over window bounds and every counter row, in sorted order.
fn compute_fingerprint(
    window: &PeriodWindow,
    summaries: &[SalesSummary],
    models: &[ModelSalesSummary],
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(window.start.to_string().as_bytes());
    hasher.update(b"..");
    hasher.update(window.end.to_string().as_bytes());
    hasher.update(b"---");

    for s in summaries {
        hasher.update(
            format!(
                "{}:{}:{}:{}:{}:{}|",
                s.dealer_id, s.period_start, s.period_end, s.total_sales, s.new_sales, s.used_sales
            )
            .as_bytes(),
        );
    }
    hasher.update(b"---");

    for m in models {
        hasher.update(
            format!(
                "{}:{}:{}:{}:{}:{}:{}|",
                m.dealer_id, m.period_start, m.period_end, m.make, m.model, m.inventory_type, m.sales_count
            )
            .as_bytes(),
        );
    }

    format!("{:x}", hasher.finalize())
}

// ── Sequential driver ───────────────────────────────────────────────

/// Single-threaded aggregation over a chunk stream.
#[derive(Debug, Clone)]
pub struct SalesAggregator {
    scope: AggregationScope,
}

impl SalesAggregator {
    pub fn new(scope: AggregationScope) -> Self {
        info!(
            members = scope.members.len(),
            window = %scope.window,
            granularity = ?scope.granularity,
            "SalesAggregator initialized"
        );
        Self { scope }
    }

    pub fn scope(&self) -> &AggregationScope {
        &self.scope
    }

    /// Fold one chunk into an independent partial.
    pub fn fold_chunk(&self, chunk: &RecordChunk) -> PartialAggregate {
        let partial = PartialAggregate::from_records(&self.scope, &chunk.records);
        debug!(
            chunk = chunk.index,
            counted = partial.stats().counted,
            duplicates = partial.stats().duplicates,
            "Chunk folded"
        );
        partial
    }

    /// Consume the whole stream, one chunk at a time.
    pub fn aggregate<I>(&self, chunks: I) -> Result<AggregationOutput, AggregateError>
    where
        I: IntoIterator<Item = Result<RecordChunk, IngestError>>,
    {
        fold_stream(self, chunks)
    }

    pub fn finalize(&self, partial: PartialAggregate, finalized_at: DateTime<Utc>) -> FinalizedSales {
        finalize(partial, &self.scope, finalized_at)
    }
}

impl ChunkFold for SalesAggregator {
    type Partial = PartialAggregate;

    fn empty(&self) -> PartialAggregate {
        PartialAggregate::new()
    }

    fn fold(&self, chunk: &RecordChunk) -> PartialAggregate {
        self.fold_chunk(chunk)
    }

    fn combine(&self, a: PartialAggregate, b: PartialAggregate) -> PartialAggregate {
        a.merge(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use types::ids::Vin;
    use types::listing::{InventoryType, ListingRecord};
    use types::location::Location;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(ordinal: u64, vin: &str, dealer: u64, kind: InventoryType) -> ListingRecord {
        ListingRecord {
            ordinal,
            vin: Vin::new(vin).unwrap(),
            dealer_id: DealerId::new(dealer),
            dealer_name: None,
            make: Some("Ford".to_string()),
            model: Some("Escape".to_string()),
            trim: None,
            model_year: Some(2024),
            inventory_type: kind,
            status_date: date(2025, 2, 10),
            price: None,
            msrp: None,
            location: Location::default(),
        }
    }

    fn chunk(index: u64, records: Vec<ListingRecord>) -> RecordChunk {
        RecordChunk {
            index,
            first_ordinal: records.first().map(|r| r.ordinal).unwrap_or(0),
            rows_read: records.len(),
            records,
            rejections: RejectionTally::new(),
        }
    }

    fn scope() -> AggregationScope {
        AggregationScope::new(
            [DealerId::new(1), DealerId::new(2)],
            PeriodWindow::new(date(2025, 1, 1), date(2025, 4, 1)).unwrap(),
            PeriodGranularity::Window,
        )
    }

    #[test]
    fn test_aggregate_and_finalize() {
        let aggregator = SalesAggregator::new(scope());
        let chunks = vec![
            Ok(chunk(0, vec![record(0, "V1", 1, InventoryType::New), record(1, "V2", 1, InventoryType::Used)])),
            Ok(chunk(1, vec![record(2, "V1", 1, InventoryType::New), record(3, "V3", 2, InventoryType::New)])),
        ];
        let output = aggregator.aggregate(chunks).unwrap();
        assert_eq!(output.pass.chunks, 2);
        assert_eq!(output.pass.rows_processed, 4);

        let now = Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).unwrap();
        let finalized = aggregator.finalize(output.partial, now);
        assert_eq!(finalized.summaries.len(), 2);
        assert_eq!(finalized.dealer_totals(DealerId::new(1)), SalesCounts { total: 2, new: 1, used: 1 });
        assert_eq!(finalized.dealer_totals(DealerId::new(2)).total, 1);
        assert_eq!(finalized.stats.duplicates, 1);
        assert!(finalized.summaries.iter().all(|s| s.last_updated == now));
        assert_eq!(finalized.periods(), vec![finalized.window]);
        assert_eq!(finalized.fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_finalization_time() {
        let aggregator = SalesAggregator::new(scope());
        let records = vec![record(0, "V1", 1, InventoryType::New)];
        let partial = PartialAggregate::from_records(aggregator.scope(), &records);

        let a = aggregator.finalize(partial.clone(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let b = aggregator.finalize(partial, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.finalized_at, b.finalized_at);
    }

    #[test]
    fn test_ingest_error_aborts_pass() {
        let aggregator = SalesAggregator::new(scope());
        let chunks = vec![
            Ok(chunk(0, vec![record(0, "V1", 1, InventoryType::New)])),
            Err(IngestError::MissingColumn {
                column: "vin".to_string(),
            }),
        ];
        assert!(matches!(aggregator.aggregate(chunks), Err(AggregateError::Ingest(_))));
    }

    #[test]
    fn test_empty_stream_finalizes_empty() {
        let aggregator = SalesAggregator::new(scope());
        let output = aggregator
            .aggregate(Vec::<Result<RecordChunk, IngestError>>::new())
            .unwrap();
        let finalized = aggregator.finalize(output.partial, Utc::now());
        assert!(finalized.summaries.is_empty());
        assert!(finalized.totals_by_dealer().is_empty());
        assert_eq!(finalized.stats, AggregateStats::default());
    }
}
