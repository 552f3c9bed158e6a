//! Column projection over the listing feed header

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reader::IngestError;

/// A column of the listing feed, named by its canonical source header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Vin,
    DealerId,
    SellerName,
    Make,
    Model,
    Trim,
    Year,
    InventoryType,
    StatusDate,
    Price,
    Msrp,
    Latitude,
    Longitude,
    City,
    State,
    Zip,
}

impl Column {
    pub const ALL: [Column; 16] = [
        Column::Vin,
        Column::DealerId,
        Column::SellerName,
        Column::Make,
        Column::Model,
        Column::Trim,
        Column::Year,
        Column::InventoryType,
        Column::StatusDate,
        Column::Price,
        Column::Msrp,
        Column::Latitude,
        Column::Longitude,
        Column::City,
        Column::State,
        Column::Zip,
    ];

    /// Columns without which a row can never be counted.
    pub const REQUIRED: [Column; 4] = [
        Column::Vin,
        Column::DealerId,
        Column::StatusDate,
        Column::InventoryType,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Vin => "vin",
            Column::DealerId => "mc_dealer_id",
            Column::SellerName => "seller_name",
            Column::Make => "make",
            Column::Model => "model",
            Column::Trim => "trim",
            Column::Year => "year",
            Column::InventoryType => "inventory_type",
            Column::StatusDate => "status_date",
            Column::Price => "price",
            Column::Msrp => "msrp",
            Column::Latitude => "latitude",
            Column::Longitude => "longitude",
            Column::City => "city",
            Column::State => "state",
            Column::Zip => "zip",
        }
    }

    pub fn from_header(raw: &str) -> Option<Column> {
        let wanted = raw.trim();
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.header().eq_ignore_ascii_case(wanted))
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Parse a comma-separated projection list such as `vin,mc_dealer_id,make`.
pub fn parse_projection(raw: &str) -> Result<Vec<Column>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| Column::from_header(name).ok_or_else(|| name.to_string()))
        .collect()
}

/// Position of each projected column in the source header.
///
/// Columns outside the projection have no index and read as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: [Option<usize>; 16],
    width: usize,
}

impl ColumnIndex {
    /// Resolve `projection` against `headers`.
    ///
    /// Fails with `MissingColumn` when a required column is not projected or
    /// a projected column is absent from the header.
    pub fn resolve(headers: &StringRecord, projection: &[Column]) -> Result<Self, IngestError> {
        for required in Column::REQUIRED {
            if !projection.contains(&required) {
                return Err(IngestError::MissingColumn {
                    column: required.header().to_string(),
                });
            }
        }

        let mut positions = [None; 16];
        for column in projection {
            let position = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column.header()))
                .ok_or_else(|| IngestError::MissingColumn {
                    column: column.header().to_string(),
                })?;
            positions[column.slot()] = Some(position);
        }

        Ok(Self {
            positions,
            width: headers.len(),
        })
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions[column.slot()]
    }

    /// Number of fields in the header row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Trimmed value of `column` in `record`; empty text reads as absent.
    pub fn get<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        self.position(column)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
