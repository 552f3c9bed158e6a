//! Record Stream Reader: bounded-memory chunked reads of the listing feed
//!
//! Features:
//! - Lazy, finite sequence of fixed-size row batches
//! - Column projection resolved once against the header
//! - Strict per-row validation with a rejection tally per chunk
//! - Restart from any chunk boundary (`chunks_from`)
//! - Chunk size checked against the configured memory bound before any read
//!
//! Resident memory for this stage is one chunk of rows plus one raw record
//! buffer, independent of source size.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;
use tracing::{debug, info};

use types::errors::{CapacityError, RejectReason};
use types::listing::ListingRecord;

use crate::columns::{Column, ColumnIndex};
use crate::row::validate_row;
use crate::tally::RejectionTally;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for the record stream reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Largest chunk the memory bound allows.
    pub max_chunk_rows: usize,
    /// Columns to read; everything else is ignored.
    pub projection: Vec<Column>,
    /// Field delimiter byte.
    pub delimiter: u8,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            max_chunk_rows: 1_000_000,
            projection: Column::ALL.to_vec(),
            delimiter: b',',
        }
    }
}

impl ReaderConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<(), CapacityError> {
        if self.chunk_size == 0 {
            return Err(CapacityError::ZeroChunkSize);
        }
        if self.chunk_size > self.max_chunk_rows {
            return Err(CapacityError::ChunkTooLarge {
                requested: self.chunk_size,
                limit: self.max_chunk_rows,
            });
        }
        Ok(())
    }
}

// ── Source ──────────────────────────────────────────────────────────

/// A restartable tabular source of listing rows.
///
/// Each call to `chunks`/`chunks_from` opens an independent pass.
#[derive(Debug, Clone)]
pub enum ListingSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl ListingSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        ListingSource::File(path.as_ref().to_path_buf())
    }

    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        ListingSource::Memory(Arc::from(bytes.into()))
    }

    pub fn describe(&self) -> String {
        match self {
            ListingSource::File(path) => path.display().to_string(),
            ListingSource::Memory(bytes) => format!("<memory: {} bytes>", bytes.len()),
        }
    }

    fn open(&self) -> Result<Box<dyn Read + Send>, IngestError> {
        match self {
            ListingSource::File(path) => {
                let file = File::open(path).map_err(|source| IngestError::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok(Box::new(file))
            }
            ListingSource::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }

    /// Iterate the source from the first chunk.
    pub fn chunks(&self, config: &ReaderConfig) -> Result<ChunkIter, IngestError> {
        self.chunks_from(config, 0)
    }

    /// Iterate the source starting at chunk `start_chunk`.
    ///
    /// Rows of earlier chunks are skipped without validation; chunk indices
    /// and row ordinals match those of a pass from the start.
    pub fn chunks_from(&self, config: &ReaderConfig, start_chunk: u64) -> Result<ChunkIter, IngestError> {
        config.validate()?;

        let mut reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .flexible(true)
            .from_reader(self.open()?);
        let headers = reader.headers()?.clone();
        let index = ColumnIndex::resolve(&headers, &config.projection)?;

        info!(
            source = %self.describe(),
            chunk_size = config.chunk_size,
            start_chunk,
            columns = config.projection.len(),
            "RecordStreamReader initialized"
        );

        let mut iter = ChunkIter {
            reader,
            index,
            chunk_size: config.chunk_size,
            next_chunk: start_chunk,
            next_ordinal: 0,
            record: StringRecord::new(),
            done: false,
        };
        iter.skip_rows(start_chunk.saturating_mul(config.chunk_size as u64))?;
        Ok(iter)
    }
}

// ── Chunks ──────────────────────────────────────────────────────────

/// One bounded batch of validated rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChunk {
    /// 0-based chunk position in the source.
    pub index: u64,
    /// Global ordinal of the first data row in this chunk.
    pub first_ordinal: u64,
    /// Data rows read, accepted or not.
    pub rows_read: usize,
    pub records: Vec<ListingRecord>,
    pub rejections: RejectionTally,
}

impl RecordChunk {
    pub fn accepted(&self) -> usize {
        self.records.len()
    }

    pub fn rejected(&self) -> u64 {
        self.rejections.total()
    }
}

/// Lazy iterator over the chunks of one pass.
pub struct ChunkIter {
    reader: csv::Reader<Box<dyn Read + Send>>,
    index: ColumnIndex,
    chunk_size: usize,
    next_chunk: u64,
    next_ordinal: u64,
    record: StringRecord,
    done: bool,
}

impl ChunkIter {
    fn skip_rows(&mut self, rows: u64) -> Result<(), IngestError> {
        let mut skipped = 0u64;
        let mut raw = csv::ByteRecord::new();
        while skipped < rows {
            match self.reader.read_byte_record(&mut raw) {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(_) => {}
            }
            skipped += 1;
        }
        self.next_ordinal = skipped;
        if skipped > 0 {
            debug!(rows = skipped, "Skipped rows before restart chunk");
        }
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Option<RecordChunk>, IngestError> {
        let first_ordinal = self.next_ordinal;
        let mut records = Vec::with_capacity(self.chunk_size.min(8_192));
        let mut rejections = RejectionTally::new();
        let mut rows_read = 0usize;

        while rows_read < self.chunk_size {
            let ordinal = self.next_ordinal;
            match self.reader.read_record(&mut self.record) {
                Ok(true) => match validate_row(&self.record, &self.index, ordinal) {
                    Ok(listing) => records.push(listing),
                    Err(reason) => {
                        debug!(ordinal, reason = %reason, "Row rejected");
                        rejections.record(&reason);
                    }
                },
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let reason = RejectReason::MalformedRow(e.to_string());
                    debug!(ordinal, reason = %reason, "Row rejected");
                    rejections.record(&reason);
                }
            }
            rows_read += 1;
            self.next_ordinal += 1;
        }

        if rows_read == 0 {
            return Ok(None);
        }

        let chunk = RecordChunk {
            index: self.next_chunk,
            first_ordinal,
            rows_read,
            records,
            rejections,
        };
        self.next_chunk += 1;

        debug!(
            chunk = chunk.index,
            rows = chunk.rows_read,
            accepted = chunk.accepted(),
            rejected = chunk.rejected(),
            "Chunk read"
        );
        Ok(Some(chunk))
    }
}

impl Iterator for ChunkIter {
    type Item = Result<RecordChunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::errors::RejectKind;

    const HEADER: &str = "vin,mc_dealer_id,seller_name,make,model,inventory_type,status_date,city,state\n";

    fn source(rows: &[&str]) -> ListingSource {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        ListingSource::memory(text.into_bytes())
    }

    fn config(chunk_size: usize) -> ReaderConfig {
        ReaderConfig {
            projection: vec![
                Column::Vin,
                Column::DealerId,
                Column::SellerName,
                Column::Make,
                Column::Model,
                Column::InventoryType,
                Column::StatusDate,
                Column::City,
                Column::State,
            ],
            ..ReaderConfig::default()
        }
        .with_chunk_size(chunk_size)
    }

    fn sample() -> ListingSource {
        source(&[
            "V1,1,ABC Motors,Honda,Civic,new,2025-01-05,Rochester,NY",
            "V2,1,ABC Motors,Honda,Accord,used,2025-01-06,Rochester,NY",
            "V3,,ABC Motors,Honda,Accord,used,2025-01-06,Rochester,NY",
            "V4,2,XYZ Auto,Ford,F-150,new,not-a-date,Rochester,NY",
            "V5,2,XYZ Auto,Ford,Escape,new,2025-02-01,Rochester,NY",
        ])
    }

    #[test]
    fn test_chunking_and_ordinals() {
        let chunks: Vec<RecordChunk> = sample()
            .chunks(&config(2))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].first_ordinal, 2);
        assert_eq!(chunks[2].rows_read, 1);
        assert_eq!(chunks[2].records[0].ordinal, 4);
        assert_eq!(chunks[1].accepted(), 0);
        assert_eq!(chunks[1].rejections.count(RejectKind::MissingDealerId), 1);
        assert_eq!(chunks[1].rejections.count(RejectKind::UnparseableStatusDate), 1);
    }

    #[test]
    fn test_chunks_from_matches_full_pass() {
        let full: Vec<RecordChunk> = sample()
            .chunks(&config(2))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let resumed: Vec<RecordChunk> = sample()
            .chunks_from(&config(2), 1)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(resumed.as_slice(), &full[1..]);
    }

    #[test]
    fn test_chunks_from_past_end_is_empty() {
        let mut iter = sample().chunks_from(&config(2), 10).unwrap();
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_capacity_checked_before_read() {
        let mut cfg = config(10);
        cfg.max_chunk_rows = 5;
        let err = ListingSource::file("/nonexistent/listings.csv")
            .chunks(&cfg)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            IngestError::Capacity(CapacityError::ChunkTooLarge { requested: 10, limit: 5 })
        ));

        let err = sample().chunks(&config(0)).err().unwrap();
        assert!(matches!(err, IngestError::Capacity(CapacityError::ZeroChunkSize)));
    }

    #[test]
    fn test_missing_required_header() {
        let src = ListingSource::memory(b"vin,seller_name\nV1,ABC\n".to_vec());
        let err = src.chunks(&ReaderConfig::default()).err().unwrap();
        assert!(matches!(err, IngestError::MissingColumn { .. }));
    }

    #[test]
    fn test_invalid_utf8_row_is_rejected_not_fatal() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"V1,1,ABC,Honda,Civic,new,2025-01-05,Rochester,NY\n");
        bytes.extend_from_slice(b"V2,1,AB\xff,Honda,Civic,new,2025-01-05,Rochester,NY\n");
        bytes.extend_from_slice(b"V3,1,ABC,Honda,Civic,new,2025-01-05,Rochester,NY\n");
        let chunks: Vec<RecordChunk> = ListingSource::memory(bytes)
            .chunks(&config(10))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].accepted(), 2);
        assert_eq!(chunks[0].rejections.count(RejectKind::MalformedRow), 1);
        assert_eq!(chunks[0].records[1].ordinal, 2);
    }

    #[test]
    fn test_missing_file() {
        let err = ListingSource::file("/nonexistent/listings.csv")
            .chunks(&config(10))
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Open { .. }));
    }

    #[test]
    fn test_empty_source_yields_no_chunks() {
        let mut iter = source(&[]).chunks(&config(10)).unwrap();
        assert!(iter.next().is_none());
    }
}
