//! Disappearance-based sold detection
//!
//! Alternative to the status-date convention: feed successive daily
//! snapshots of active listings and a vehicle missing from
//! `disappear_days` consecutive snapshots is reported sold. State is
//! serializable so it can be carried between runs.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use types::ids::{DealerId, Vin};
use types::listing::ListingRecord;

pub const DEFAULT_DISAPPEAR_DAYS: u32 = 5;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Tracker state I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracker state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Snapshot {date} is not after last observed {last}")]
    OutOfOrder { date: NaiveDate, last: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedVehicle {
    pub dealer_id: DealerId,
    pub make: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
    pub last_seen: NaiveDate,
    pub missing_snapshots: u32,
}

/// A vehicle that stopped being listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldVehicle {
    pub vin: Vin,
    pub dealer_id: DealerId,
    pub make: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<i32>,
    pub last_seen: NaiveDate,
    pub detected_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisappearanceTracker {
    disappear_days: u32,
    last_snapshot: Option<NaiveDate>,
    vehicles: BTreeMap<Vin, TrackedVehicle>,
}

impl Default for DisappearanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DISAPPEAR_DAYS)
    }
}

impl DisappearanceTracker {
    /// `disappear_days` of zero is treated as one.
    pub fn new(disappear_days: u32) -> Self {
        Self {
            disappear_days: disappear_days.max(1),
            last_snapshot: None,
            vehicles: BTreeMap::new(),
        }
    }

    pub fn disappear_days(&self) -> u32 {
        self.disappear_days
    }

    pub fn tracked(&self) -> usize {
        self.vehicles.len()
    }

    pub fn get(&self, vin: &Vin) -> Option<&TrackedVehicle> {
        self.vehicles.get(vin)
    }

    /// Apply the snapshot for `date` and return vehicles newly considered sold.
    ///
    /// Snapshots must arrive in strictly increasing date order. A vehicle
    /// listed more than once in a snapshot keeps its first row.
    pub fn observe<I>(&mut self, date: NaiveDate, snapshot: I) -> Result<Vec<SoldVehicle>, TrackerError>
    where
        I: IntoIterator,
        I::Item: Borrow<ListingRecord>,
    {
        if let Some(last) = self.last_snapshot {
            if date <= last {
                return Err(TrackerError::OutOfOrder { date, last });
            }
        }

        let mut seen: BTreeSet<Vin> = BTreeSet::new();
        let mut added = 0usize;
        for record in snapshot {
            let record: &ListingRecord = record.borrow();
            if !seen.insert(record.vin.clone()) {
                continue;
            }
            match self.vehicles.get_mut(&record.vin) {
                Some(tracked) => {
                    tracked.last_seen = date;
                    tracked.missing_snapshots = 0;
                }
                None => {
                    self.vehicles.insert(
                        record.vin.clone(),
                        TrackedVehicle {
                            dealer_id: record.dealer_id,
                            make: record.make.clone(),
                            model: record.model.clone(),
                            model_year: record.model_year,
                            last_seen: date,
                            missing_snapshots: 0,
                        },
                    );
                    added += 1;
                }
            }
        }

        let mut sold = Vec::new();
        let threshold = self.disappear_days;
        self.vehicles.retain(|vin, tracked| {
            if seen.contains(vin) {
                return true;
            }
            tracked.missing_snapshots += 1;
            if tracked.missing_snapshots < threshold {
                return true;
            }
            sold.push(SoldVehicle {
                vin: vin.clone(),
                dealer_id: tracked.dealer_id,
                make: tracked.make.clone(),
                model: tracked.model.clone(),
                model_year: tracked.model_year,
                last_seen: tracked.last_seen,
                detected_on: date,
            });
            false
        });

        self.last_snapshot = Some(date);
        debug!(
            %date,
            listed = seen.len(),
            added,
            sold = sold.len(),
            tracked = self.vehicles.len(),
            "Snapshot observed"
        );
        Ok(sold)
    }

    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let raw = fs::read(path).map_err(|source| TrackerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tracker: Self = serde_json::from_slice(&raw)?;
        info!(path = %path.display(), tracked = tracker.vehicles.len(), "Tracker state loaded");
        Ok(tracker)
    }

    /// Load `path`, or start fresh when it does not exist.
    pub fn load_or_new(path: &Path, disappear_days: u32) -> Result<Self, TrackerError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new(disappear_days))
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TrackerError> {
        let raw = serde_json::to_vec_pretty(self)?;
        fs::write(path, raw).map_err(|source| TrackerError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
