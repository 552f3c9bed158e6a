//! Partial aggregates: immutable per-chunk results and their merge
//!
//! A `PartialAggregate` is built from any subset of the record stream and
//! combined with `merge`. Merge is associative and commutative: every
//! partitioning of the stream, merged in any order, yields the same
//! counters as a single pass.
//!
//! Duplicate vehicle identifiers are resolved by keeping the sale with the
//! smallest global row ordinal ("first occurrence"). The VIN index records
//! which sale currently holds each identifier, so a merge can retract the
//! losing sale's counters exactly.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use types::ids::{DealerId, Vin};
use types::listing::{InventoryType, ListingRecord};
use types::summary::SalesCounts;
use types::window::{PeriodGranularity, PeriodWindow};

/// What a pass aggregates: which dealers, over which window, in which
/// buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationScope {
    pub members: BTreeSet<DealerId>,
    pub window: PeriodWindow,
    pub granularity: PeriodGranularity,
}

impl AggregationScope {
    pub fn new(
        members: impl IntoIterator<Item = DealerId>,
        window: PeriodWindow,
        granularity: PeriodGranularity,
    ) -> Self {
        Self {
            members: members.into_iter().collect(),
            window,
            granularity,
        }
    }
}

/// Key of a per-dealer, per-period counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryKey {
    pub dealer_id: DealerId,
    pub period: PeriodWindow,
}

/// Key of a per-dealer, per-period, per-model counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub dealer_id: DealerId,
    pub period: PeriodWindow,
    pub make: String,
    pub model: String,
    pub inventory_type: InventoryType,
}

/// The counted sale currently holding a vehicle identifier.
///
/// Field order makes the derived `Ord` compare the ordinal first; ties on
/// the ordinal fall back to the remaining fields so the winner never depends
/// on merge order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaleEntry {
    pub ordinal: u64,
    pub dealer_id: DealerId,
    pub period: PeriodWindow,
    pub make: String,
    pub model: String,
    pub inventory_type: InventoryType,
}

impl SaleEntry {
    fn summary_key(&self) -> SummaryKey {
        SummaryKey {
            dealer_id: self.dealer_id,
            period: self.period,
        }
    }

    fn model_key(&self) -> ModelKey {
        ModelKey {
            dealer_id: self.dealer_id,
            period: self.period,
            make: self.make.clone(),
            model: self.model.clone(),
            inventory_type: self.inventory_type,
        }
    }
}

/// Row accounting for one or more partials. Merges by addition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Valid records offered to the aggregator.
    pub considered: u64,
    pub outside_market: u64,
    pub outside_window: u64,
    /// In-scope records not counted because their identifier was already
    /// held by an earlier sale.
    pub duplicates: u64,
    /// Distinct sales counted.
    pub counted: u64,
}

impl AggregateStats {
    pub fn add(&mut self, other: &AggregateStats) {
        self.considered += other.considered;
        self.outside_market += other.outside_market;
        self.outside_window += other.outside_window;
        self.duplicates += other.duplicates;
        self.counted += other.counted;
    }
}

/// Outcome of offering one record to a partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Counted,
    /// Counted, displacing a later occurrence of the same identifier.
    Replaced,
    Duplicate,
    OutsideMarket,
    OutsideWindow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialAggregate {
    totals: BTreeMap<SummaryKey, SalesCounts>,
    models: BTreeMap<ModelKey, u64>,
    vins: HashMap<Vin, SaleEntry>,
    stats: AggregateStats,
}

impl PartialAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of records into a fresh partial.
    pub fn from_records<'r>(
        scope: &AggregationScope,
        records: impl IntoIterator<Item = &'r ListingRecord>,
    ) -> Self {
        let mut partial = Self::new();
        for record in records {
            partial.add_record(scope, record);
        }
        partial
    }

    /// Offer one record: filter by market, then window, then deduplicate.
    pub fn add_record(&mut self, scope: &AggregationScope, record: &ListingRecord) -> RecordOutcome {
        self.stats.considered += 1;

        if !scope.members.contains(&record.dealer_id) {
            self.stats.outside_market += 1;
            return RecordOutcome::OutsideMarket;
        }
        let Some(period) = scope.window.bucket_for(record.status_date, scope.granularity) else {
            self.stats.outside_window += 1;
            return RecordOutcome::OutsideWindow;
        };

        let entry = SaleEntry {
            ordinal: record.ordinal,
            dealer_id: record.dealer_id,
            period,
            make: record.make_key(),
            model: record.model_key(),
            inventory_type: record.inventory_type,
        };
        self.offer(record.vin.clone(), entry)
    }

    /// Combine two partials.
    pub fn merge(self, other: PartialAggregate) -> PartialAggregate {
        // Fold the smaller VIN index into the larger one.
        let (mut base, incoming) = if self.vins.len() >= other.vins.len() {
            (self, other)
        } else {
            (other, self)
        };

        base.stats.considered += incoming.stats.considered;
        base.stats.outside_market += incoming.stats.outside_market;
        base.stats.outside_window += incoming.stats.outside_window;
        base.stats.duplicates += incoming.stats.duplicates;

        for (vin, entry) in incoming.vins {
            base.offer(vin, entry);
        }
        base
    }

    fn offer(&mut self, vin: Vin, entry: SaleEntry) -> RecordOutcome {
        match self.vins.entry(vin) {
            Entry::Vacant(slot) => {
                apply(&mut self.totals, &mut self.models, &entry);
                slot.insert(entry);
                self.stats.counted += 1;
                RecordOutcome::Counted
            }
            Entry::Occupied(mut slot) => {
                self.stats.duplicates += 1;
                if entry < *slot.get() {
                    retract(&mut self.totals, &mut self.models, slot.get());
                    apply(&mut self.totals, &mut self.models, &entry);
                    slot.insert(entry);
                    RecordOutcome::Replaced
                } else {
                    RecordOutcome::Duplicate
                }
            }
        }
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn totals(&self) -> &BTreeMap<SummaryKey, SalesCounts> {
        &self.totals
    }

    pub fn models(&self) -> &BTreeMap<ModelKey, u64> {
        &self.models
    }

    /// Distinct identifiers held.
    pub fn distinct_vins(&self) -> usize {
        self.vins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vins.is_empty()
    }

    /// Sale currently holding `vin`, if any.
    pub fn sale_for(&self, vin: &Vin) -> Option<&SaleEntry> {
        self.vins.get(vin)
    }
}

fn apply(
    totals: &mut BTreeMap<SummaryKey, SalesCounts>,
    models: &mut BTreeMap<ModelKey, u64>,
    entry: &SaleEntry,
) {
    totals
        .entry(entry.summary_key())
        .or_default()
        .record(entry.inventory_type);
    *models.entry(entry.model_key()).or_insert(0) += 1;
}

fn retract(
    totals: &mut BTreeMap<SummaryKey, SalesCounts>,
    models: &mut BTreeMap<ModelKey, u64>,
    entry: &SaleEntry,
) {
    let key = entry.summary_key();
    if let Some(counts) = totals.get_mut(&key) {
        counts.retract(entry.inventory_type);
        if counts.is_zero() {
            totals.remove(&key);
        }
    }
    let key = entry.model_key();
    if let Some(count) = models.get_mut(&key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            models.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use types::location::Location;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scope() -> AggregationScope {
        AggregationScope::new(
            [DealerId::new(1), DealerId::new(2)],
            PeriodWindow::new(date(2025, 1, 1), date(2025, 4, 1)).unwrap(),
            PeriodGranularity::Month,
        )
    }

    fn record(ordinal: u64, vin: &str, dealer: u64, day: NaiveDate, kind: InventoryType) -> ListingRecord {
        ListingRecord {
            ordinal,
            vin: Vin::new(vin).unwrap(),
            dealer_id: DealerId::new(dealer),
            dealer_name: None,
            make: Some("Honda".to_string()),
            model: Some(" Civic ".to_string()),
            trim: None,
            model_year: None,
            inventory_type: kind,
            status_date: day,
            price: None,
            msrp: None,
            location: Location::default(),
        }
    }

    #[test]
    fn test_filters_in_order() {
        let scope = scope();
        let mut partial = PartialAggregate::new();
        assert_eq!(
            partial.add_record(&scope, &record(0, "V1", 9, date(2025, 1, 5), InventoryType::New)),
            RecordOutcome::OutsideMarket
        );
        assert_eq!(
            partial.add_record(&scope, &record(1, "V1", 1, date(2025, 4, 1), InventoryType::New)),
            RecordOutcome::OutsideWindow
        );
        assert_eq!(
            partial.add_record(&scope, &record(2, "V1", 1, date(2025, 3, 31), InventoryType::New)),
            RecordOutcome::Counted
        );
        assert_eq!(
            partial.add_record(&scope, &record(3, "v1", 2, date(2025, 2, 1), InventoryType::Used)),
            RecordOutcome::Duplicate
        );

        let stats = partial.stats();
        assert_eq!(stats.considered, 4);
        assert_eq!(stats.outside_market, 1);
        assert_eq!(stats.outside_window, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.counted, 1);
    }

    #[test]
    fn test_month_buckets_and_model_keys() {
        let scope = scope();
        let partial = PartialAggregate::from_records(
            &scope,
            &[
                record(0, "V1", 1, date(2025, 1, 5), InventoryType::New),
                record(1, "V2", 1, date(2025, 1, 20), InventoryType::Used),
                record(2, "V3", 1, date(2025, 2, 2), InventoryType::Used),
            ],
        );
        let jan = SummaryKey {
            dealer_id: DealerId::new(1),
            period: PeriodWindow::new(date(2025, 1, 1), date(2025, 2, 1)).unwrap(),
        };
        assert_eq!(
            partial.totals()[&jan],
            SalesCounts { total: 2, new: 1, used: 1 }
        );
        assert_eq!(partial.totals().len(), 2);

        let key = partial.models().keys().next().unwrap();
        assert_eq!(key.make, "honda");
        assert_eq!(key.model, "civic");
    }

    #[test]
    fn test_earlier_occurrence_replaces_later() {
        let scope = scope();
        let later = PartialAggregate::from_records(
            &scope,
            &[record(10, "V1", 2, date(2025, 3, 1), InventoryType::Used)],
        );
        let earlier = PartialAggregate::from_records(
            &scope,
            &[record(3, "V1", 1, date(2025, 1, 9), InventoryType::New)],
        );

        let merged = later.merge(earlier);
        assert_eq!(merged.totals().len(), 1);
        let (key, counts) = merged.totals().iter().next().unwrap();
        assert_eq!(key.dealer_id, DealerId::new(1));
        assert_eq!(*counts, SalesCounts { total: 1, new: 1, used: 0 });
        assert_eq!(merged.models().len(), 1);
        assert_eq!(merged.stats().duplicates, 1);
        assert_eq!(merged.stats().counted, 1);
        assert_eq!(merged.sale_for(&Vin::new("V1").unwrap()).unwrap().ordinal, 3);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let scope = scope();
        let partial = PartialAggregate::from_records(
            &scope,
            &[
                record(0, "V1", 1, date(2025, 1, 5), InventoryType::New),
                record(1, "V2", 2, date(2025, 2, 5), InventoryType::Used),
            ],
        );
        let merged = partial.clone().merge(PartialAggregate::new());
        assert_eq!(merged, partial);
        let merged = PartialAggregate::new().merge(partial.clone());
        assert_eq!(merged, partial);
    }

    #[test]
    fn test_window_granularity_single_bucket() {
        let mut scope = scope();
        scope.granularity = PeriodGranularity::Window;
        let partial = PartialAggregate::from_records(
            &scope,
            &[
                record(0, "V1", 1, date(2025, 1, 5), InventoryType::New),
                record(1, "V2", 1, date(2025, 3, 5), InventoryType::New),
            ],
        );
        assert_eq!(partial.totals().len(), 1);
        let (key, counts) = partial.totals().iter().next().unwrap();
        assert_eq!(key.period, scope.window);
        assert_eq!(counts.total, 2);
    }
}
