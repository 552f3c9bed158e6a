//! Parallel fold across worker threads
//!
//! The reading thread deals chunks round-robin to `workers` scoped threads
//! over bounded channels of capacity one. Each worker folds its chunks into
//! its own partial; nothing mutable is shared. The partials are
//! merged once every worker has finished.
//!
//! At most one chunk is being read, one is queued per worker, and one is
//! being folded per worker, so resident chunk memory is bounded by
//! `chunk_size × (2 × workers + 1)`.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;

use tracing::{debug, info, warn};

use ingestion::{IngestError, RecordChunk};

use crate::aggregator::{fold_stream, AggregateError, AggregationOutput, ChunkFold, PassSummary};

/// Aggregate `chunks` on `workers` threads. `workers <= 1` runs inline.
pub fn aggregate_parallel<F, I>(
    folder: &F,
    chunks: I,
    workers: usize,
) -> Result<AggregationOutput<F::Partial>, AggregateError>
where
    F: ChunkFold,
    I: IntoIterator<Item = Result<RecordChunk, IngestError>>,
{
    if workers <= 1 {
        return fold_stream(folder, chunks);
    }

    info!(workers, "Parallel aggregation started");

    thread::scope(|scope| {
        let mut senders: Vec<SyncSender<RecordChunk>> = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, rx) = sync_channel::<RecordChunk>(1);
            senders.push(tx);
            handles.push(scope.spawn(move || fold_worker(folder, worker, rx)));
        }

        let mut pass = PassSummary::default();
        let mut failure: Option<AggregateError> = None;

        for (n, chunk) in chunks.into_iter().enumerate() {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Chunk read failed, stopping workers");
                    failure = Some(e.into());
                    break;
                }
            };
            pass.record_chunk(&chunk);
            let worker = n % workers;
            if senders[worker].send(chunk).is_err() {
                failure = Some(AggregateError::WorkerDisconnected { worker });
                break;
            }
        }

        // Closing the channels lets every worker drain and return.
        drop(senders);

        let mut merged = folder.empty();
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(partial) => merged = folder.combine(merged, partial),
                Err(_) => {
                    failure.get_or_insert(AggregateError::WorkerPanicked { worker });
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        info!(
            workers,
            chunks = pass.chunks,
            rows = pass.rows_processed,
            "Parallel aggregation complete"
        );
        Ok(AggregationOutput {
            partial: merged,
            pass,
        })
    })
}

fn fold_worker<F: ChunkFold>(folder: &F, worker: usize, rx: Receiver<RecordChunk>) -> F::Partial {
    let mut partial = folder.empty();
    let mut folded = 0u64;
    for chunk in rx {
        partial = folder.combine(partial, folder.fold(&chunk));
        folded += 1;
    }
    debug!(worker, chunks = folded, "Worker finished");
    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SalesAggregator;
    use crate::partial::AggregationScope;
    use chrono::NaiveDate;
    use ingestion::RejectionTally;
    use types::ids::{DealerId, Vin};
    use types::listing::{InventoryType, ListingRecord};
    use types::location::Location;
    use types::window::{PeriodGranularity, PeriodWindow};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn chunks(count: u64, per_chunk: u64) -> Vec<Result<RecordChunk, IngestError>> {
        (0..count)
            .map(|c| {
                let records: Vec<ListingRecord> = (0..per_chunk)
                    .map(|i| {
                        let ordinal = c * per_chunk + i;
                        ListingRecord {
                            ordinal,
                            // Identifiers repeat across chunks so duplicates span workers.
                            vin: Vin::new(format!("VIN{}", ordinal % 37)).unwrap(),
                            dealer_id: DealerId::new(ordinal % 4),
                            dealer_name: None,
                            make: Some("Toyota".to_string()),
                            model: Some(if ordinal % 2 == 0 { "Camry" } else { "RAV4" }.to_string()),
                            trim: None,
                            model_year: None,
                            inventory_type: if ordinal % 3 == 0 { InventoryType::New } else { InventoryType::Used },
                            status_date: date(1 + (ordinal % 28) as u32),
                            price: None,
                            msrp: None,
                            location: Location::default(),
                        }
                    })
                    .collect();
                Ok(RecordChunk {
                    index: c,
                    first_ordinal: c * per_chunk,
                    rows_read: records.len(),
                    records,
                    rejections: RejectionTally::new(),
                })
            })
            .collect()
    }

    fn aggregator() -> SalesAggregator {
        SalesAggregator::new(AggregationScope::new(
            [DealerId::new(0), DealerId::new(1), DealerId::new(3)],
            PeriodWindow::new(date(1), date(25)).unwrap(),
            PeriodGranularity::Month,
        ))
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let agg = aggregator();
        let sequential = agg.aggregate(chunks(12, 9)).unwrap();
        for workers in [2, 3, 5] {
            let parallel = aggregate_parallel(&agg, chunks(12, 9), workers).unwrap();
            assert_eq!(parallel.partial.totals(), sequential.partial.totals(), "workers={workers}");
            assert_eq!(parallel.partial.models(), sequential.partial.models());
            assert_eq!(parallel.partial.stats(), sequential.partial.stats());
            assert_eq!(parallel.pass, sequential.pass);
        }
    }

    #[test]
    fn test_read_error_surfaces() {
        let agg = aggregator();
        let mut input = chunks(4, 3);
        input.insert(
            2,
            Err(IngestError::MissingColumn {
                column: "vin".to_string(),
            }),
        );
        let result = aggregate_parallel(&agg, input, 3);
        assert!(matches!(result, Err(AggregateError::Ingest(_))));
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let agg = aggregator();
        let output = aggregate_parallel(&agg, chunks(3, 5), 1).unwrap();
        assert_eq!(output.pass.chunks, 3);
    }
}
