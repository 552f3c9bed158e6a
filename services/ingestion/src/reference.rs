//! Reference-table loaders: dealer table and market-area mapping table
//!
//! Reference data is small and curated, so a malformed row fails the load
//! with its line number instead of being tallied.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;
use tracing::{info, warn};

use types::dealer::Dealer;
use types::ids::{DealerId, MarketAreaCode};
use types::location::{normalize_zip, Coordinate, Location};
use types::market::{MappingKey, MarketAreaMapping};

use crate::reader::{IngestError, ListingSource, ReaderConfig};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {table} table: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{table} table is missing column '{column}'")]
    MissingColumn { table: &'static str, column: &'static str },

    #[error("{table} table line {line}: {detail}")]
    InvalidRow {
        table: &'static str,
        line: u64,
        detail: String,
    },

    #[error("Failed to derive dealers from listings: {0}")]
    Ingest(#[from] IngestError),
}

const DEALER_TABLE: &str = "dealer";
const MAPPING_TABLE: &str = "mapping";

struct Headers<'h> {
    table: &'static str,
    record: &'h StringRecord,
}

impl Headers<'_> {
    fn required(&self, name: &'static str) -> Result<usize, ReferenceError> {
        self.optional(name).ok_or(ReferenceError::MissingColumn {
            table: self.table,
            column: name,
        })
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.record
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }
}

fn field(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn open_file(path: &Path) -> Result<File, ReferenceError> {
    File::open(path).map_err(|source| ReferenceError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// ── Dealer table ────────────────────────────────────────────────────

/// Load the dealer table from a CSV file.
pub fn load_dealers(path: impl AsRef<Path>) -> Result<Vec<Dealer>, ReferenceError> {
    let path = path.as_ref();
    let dealers = read_dealers(open_file(path)?)?;
    info!(path = %path.display(), dealers = dealers.len(), "Dealer table loaded");
    Ok(dealers)
}

/// Parse a dealer table. Returns dealers sorted by id; for a repeated id the
/// first row wins.
pub fn read_dealers<R: Read>(input: R) -> Result<Vec<Dealer>, ReferenceError> {
    let csv_err = |source: csv::Error| ReferenceError::Csv {
        table: DEALER_TABLE,
        source,
    };
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let header_record = reader.headers().map_err(csv_err)?.clone();
    let headers = Headers {
        table: DEALER_TABLE,
        record: &header_record,
    };

    let id_col = headers.required("dealer_id")?;
    let name_col = headers.required("name")?;
    let lat_col = headers.optional("latitude");
    let lon_col = headers.optional("longitude");
    let city_col = headers.optional("city");
    let state_col = headers.optional("state");
    let zip_col = headers.optional("zip");
    let area_col = headers.optional("market_area");

    let mut dealers: BTreeMap<DealerId, Dealer> = BTreeMap::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let line = line_of(&record);
        let invalid = |detail: String| ReferenceError::InvalidRow {
            table: DEALER_TABLE,
            line,
            detail,
        };

        let raw_id = field(&record, Some(id_col)).ok_or_else(|| invalid("missing dealer_id".into()))?;
        let id = DealerId::parse(raw_id)
            .ok_or_else(|| invalid(format!("invalid dealer_id '{raw_id}'")))?;
        let name = field(&record, Some(name_col)).unwrap_or_default();

        let coord = |col: Option<usize>, label: &str| -> Result<Option<f64>, ReferenceError> {
            match field(&record, col) {
                None => Ok(None),
                Some(raw) => raw
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| invalid(format!("invalid {label} '{raw}'"))),
            }
        };
        let coordinate = match (coord(lat_col, "latitude")?, coord(lon_col, "longitude")?) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        };

        let location = Location {
            coordinate,
            city: field(&record, city_col).map(str::to_string),
            state: field(&record, state_col).map(str::to_string),
            zip: field(&record, zip_col).map(normalize_zip),
        };
        let mut dealer = Dealer::new(id, name, location);
        dealer.market_area = field(&record, area_col).and_then(MarketAreaCode::new);

        if dealers.contains_key(&id) {
            warn!(dealer_id = %id, line, "Duplicate dealer_id in dealer table, keeping first");
            continue;
        }
        dealers.insert(id, dealer);
    }

    Ok(dealers.into_values().collect())
}

/// Build the reference set from the listing feed itself.
///
/// The first listing row seen for each dealer id supplies its name and
/// location. Rejected rows are ignored here; they are tallied by the
/// aggregation pass.
pub fn derive_dealers(source: &ListingSource, config: &ReaderConfig) -> Result<Vec<Dealer>, ReferenceError> {
    let mut dealers: BTreeMap<DealerId, Dealer> = BTreeMap::new();
    for chunk in source.chunks(config)? {
        let chunk = chunk?;
        for record in &chunk.records {
            dealers
                .entry(record.dealer_id)
                .or_insert_with(|| Dealer::from_listing(record));
        }
    }
    info!(
        source = %source.describe(),
        dealers = dealers.len(),
        "Dealer reference set derived from listings"
    );
    Ok(dealers.into_values().collect())
}

// ── Mapping table ───────────────────────────────────────────────────

/// Load the market-area mapping from a CSV file.
pub fn load_mapping(path: impl AsRef<Path>) -> Result<MarketAreaMapping, ReferenceError> {
    let path = path.as_ref();
    let mapping = read_mapping(open_file(path)?)?;
    info!(path = %path.display(), entries = mapping.len(), "Market-area mapping loaded");
    Ok(mapping)
}

/// Parse a mapping table with columns `key, market_area`.
///
/// `key` is a dealer id, `CITY|STATE`, or `ZIP:NNNNN`. A repeated key keeps
/// its last code.
pub fn read_mapping<R: Read>(input: R) -> Result<MarketAreaMapping, ReferenceError> {
    let csv_err = |source: csv::Error| ReferenceError::Csv {
        table: MAPPING_TABLE,
        source,
    };
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let header_record = reader.headers().map_err(csv_err)?.clone();
    let headers = Headers {
        table: MAPPING_TABLE,
        record: &header_record,
    };
    let key_col = headers.required("key")?;
    let area_col = headers.required("market_area")?;

    let mut mapping = MarketAreaMapping::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let line = line_of(&record);
        let invalid = |detail: String| ReferenceError::InvalidRow {
            table: MAPPING_TABLE,
            line,
            detail,
        };

        let raw_key = field(&record, Some(key_col)).ok_or_else(|| invalid("missing key".into()))?;
        let key = MappingKey::parse(raw_key)
            .ok_or_else(|| invalid(format!("unrecognised key '{raw_key}'")))?;
        let code = field(&record, Some(area_col))
            .and_then(MarketAreaCode::new)
            .ok_or_else(|| invalid("missing market_area".into()))?;

        if let Some(previous) = mapping.insert(key, code) {
            warn!(key = raw_key, previous = %previous, line, "Mapping key repeated, last entry wins");
        }
    }
    Ok(mapping)
}
