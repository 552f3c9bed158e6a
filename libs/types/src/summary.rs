//! Aggregated sales summaries and competitor rankings
//!
//! These are the pipeline's output contracts. Summaries are only built from
//! a finalized aggregate; rankings are pure transforms over summaries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::DealerId;
use crate::listing::InventoryType;
use crate::market::MarketArea;
use crate::window::PeriodWindow;

/// Which counter a ranking or top-N list is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesMetric {
    #[default]
    Total,
    New,
    Used,
}

impl SalesMetric {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "total" => Some(SalesMetric::Total),
            "new" => Some(SalesMetric::New),
            "used" => Some(SalesMetric::Used),
            _ => None,
        }
    }
}

/// Total/new/used sales counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SalesCounts {
    pub total: u64,
    pub new: u64,
    pub used: u64,
}

impl SalesCounts {
    pub fn record(&mut self, inventory_type: InventoryType) {
        self.total += 1;
        match inventory_type {
            InventoryType::New => self.new += 1,
            InventoryType::Used => self.used += 1,
        }
    }

    /// Undo one `record` of the same type.
    pub fn retract(&mut self, inventory_type: InventoryType) {
        self.total = self.total.saturating_sub(1);
        match inventory_type {
            InventoryType::New => self.new = self.new.saturating_sub(1),
            InventoryType::Used => self.used = self.used.saturating_sub(1),
        }
    }

    pub fn add(&mut self, other: &SalesCounts) {
        self.total += other.total;
        self.new += other.new;
        self.used += other.used;
    }

    pub fn get(&self, metric: SalesMetric) -> u64 {
        match metric {
            SalesMetric::Total => self.total,
            SalesMetric::New => self.new,
            SalesMetric::Used => self.used,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0
    }
}

/// Per-dealer, per-period totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub dealer_id: DealerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_sales: u64,
    pub new_sales: u64,
    pub used_sales: u64,
    pub last_updated: DateTime<Utc>,
}

impl SalesSummary {
    pub fn new(
        dealer_id: DealerId,
        period: PeriodWindow,
        counts: SalesCounts,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            dealer_id,
            period_start: period.start,
            period_end: period.end,
            total_sales: counts.total,
            new_sales: counts.new,
            used_sales: counts.used,
            last_updated,
        }
    }

    pub fn counts(&self) -> SalesCounts {
        SalesCounts {
            total: self.total_sales,
            new: self.new_sales,
            used: self.used_sales,
        }
    }

    pub fn period(&self) -> PeriodWindow {
        PeriodWindow {
            start: self.period_start,
            end: self.period_end,
        }
    }
}

/// Per-dealer, per-period, per-(make, model, inventory type) count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSalesSummary {
    pub dealer_id: DealerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub make: String,
    pub model: String,
    pub inventory_type: InventoryType,
    pub sales_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// One row of a competitor ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDealer {
    /// 1-based position.
    pub rank: usize,
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub sales: u64,
    /// Percentage in `[0, 100]`.
    pub market_share: Decimal,
}

/// Ranked competitors for one market and window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRanking {
    pub market: MarketArea,
    pub window: PeriodWindow,
    pub metric: SalesMetric,
    /// Sum of the metric over every market member, not only the listed ones.
    pub total_market_sales: u64,
    /// Number of market members before any top-K truncation.
    pub dealer_count: usize,
    pub target: Option<DealerId>,
    pub target_rank: Option<usize>,
    pub target_share: Option<Decimal>,
    pub entries: Vec<RankedDealer>,
}

impl CompetitorRanking {
    pub fn entry(&self, dealer_id: DealerId) -> Option<&RankedDealer> {
        self.entries.iter().find(|e| e.dealer_id == dealer_id)
    }
}
