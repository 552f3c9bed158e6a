//! Strict row validation
//!
//! Every raw row becomes either a `ListingRecord` or a typed `RejectReason`.
//! Nothing is coerced to a default: a present-but-unparseable value rejects
//! the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use rust_decimal::Decimal;
use std::str::FromStr;

use types::errors::RejectReason;
use types::ids::{DealerId, Vin};
use types::listing::{InventoryType, ListingRecord};
use types::location::{normalize_zip, Coordinate, Location};

use crate::columns::{Column, ColumnIndex};

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Validate one data row. `ordinal` is the row's global 0-based position.
pub fn validate_row(
    record: &StringRecord,
    index: &ColumnIndex,
    ordinal: u64,
) -> Result<ListingRecord, RejectReason> {
    if record.len() < index.width() {
        return Err(RejectReason::MalformedRow(format!(
            "expected {} fields, found {}",
            index.width(),
            record.len()
        )));
    }

    let vin = index
        .get(record, Column::Vin)
        .and_then(Vin::new)
        .ok_or(RejectReason::MissingVin)?;

    let raw_dealer = index
        .get(record, Column::DealerId)
        .ok_or(RejectReason::MissingDealerId)?;
    let dealer_id = DealerId::parse(raw_dealer)
        .ok_or_else(|| RejectReason::InvalidDealerId(raw_dealer.to_string()))?;

    let raw_date = index
        .get(record, Column::StatusDate)
        .ok_or(RejectReason::MissingStatusDate)?;
    let status_date = parse_status_date(raw_date)
        .ok_or_else(|| RejectReason::UnparseableStatusDate(raw_date.to_string()))?;

    let raw_type = index.get(record, Column::InventoryType).unwrap_or("");
    let inventory_type = InventoryType::parse(raw_type)
        .ok_or_else(|| RejectReason::InvalidInventoryType(raw_type.to_string()))?;

    let model_year = optional(record, index, Column::Year, parse_year)?;
    let price = optional(record, index, Column::Price, parse_decimal)?;
    let msrp = optional(record, index, Column::Msrp, parse_decimal)?;
    let latitude = optional(record, index, Column::Latitude, parse_float)?;
    let longitude = optional(record, index, Column::Longitude, parse_float)?;

    let coordinate = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
        _ => None,
    };

    let text = |column| index.get(record, column).map(str::to_string);

    Ok(ListingRecord {
        ordinal,
        vin,
        dealer_id,
        dealer_name: text(Column::SellerName),
        make: text(Column::Make),
        model: text(Column::Model),
        trim: text(Column::Trim),
        model_year,
        inventory_type,
        status_date,
        price,
        msrp,
        location: Location {
            coordinate,
            city: text(Column::City),
            state: text(Column::State),
            zip: index.get(record, Column::Zip).map(normalize_zip),
        },
    })
}

/// Parse a status date, keeping only the date part of timestamps.
pub fn parse_status_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.date())
}

fn optional<T>(
    record: &StringRecord,
    index: &ColumnIndex,
    column: Column,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, RejectReason> {
    match index.get(record, column) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| RejectReason::InvalidNumber {
                column: column.header().to_string(),
                value: raw.to_string(),
            }),
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().or_else(|| {
        // Float-exported feeds write 2021 as 2021.0
        let value = raw.parse::<f64>().ok()?;
        (value.fract() == 0.0 && value.abs() < i32::MAX as f64).then_some(value as i32)
    })
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
