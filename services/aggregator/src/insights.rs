//! Market overview, top models and dealer sales profiles.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::ids::DealerId;
use types::listing::InventoryType;
use types::summary::{ModelSalesSummary, SalesCounts, SalesSummary};
use types::window::PeriodWindow;

use crate::ranking::market_share;

// ── Market overview ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub total_sales: u64,
    pub new_sales: u64,
    pub used_sales: u64,
    pub dealer_count: usize,
    pub avg_sales_per_dealer: Decimal,
    pub new_share: Decimal,
    pub used_share: Decimal,
}

/// Summarize the market formed by `members`.
///
/// Members with no summaries still count towards `dealer_count`. An empty
/// member set takes every summary given.
pub fn market_overview<'a>(
    summaries: impl IntoIterator<Item = &'a SalesSummary>,
    members: &BTreeSet<DealerId>,
) -> MarketOverview {
    let mut counts = SalesCounts::default();
    let mut dealers: BTreeSet<DealerId> = members.clone();
    for summary in summaries {
        if !members.is_empty() && !members.contains(&summary.dealer_id) {
            continue;
        }
        dealers.insert(summary.dealer_id);
        counts.add(&summary.counts());
    }

    let dealer_count = dealers.len();
    let avg_sales_per_dealer = if dealer_count == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(counts.total) / Decimal::from(dealer_count as u64))
            .round_dp(2)
            .normalize()
    };

    MarketOverview {
        total_sales: counts.total,
        new_sales: counts.new,
        used_sales: counts.used,
        dealer_count,
        avg_sales_per_dealer,
        new_share: market_share(counts.new, counts.total),
        used_share: market_share(counts.used, counts.total),
    }
}

// ── Top models ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSales {
    pub make: String,
    pub model: String,
    pub sales: u64,
}

/// Top `limit` (make, model) pairs by sales.
///
/// `dealer` narrows to one dealer, `None` covers every row given.
/// `inventory_type` narrows to new or used.
pub fn top_models<'a>(
    models: impl IntoIterator<Item = &'a ModelSalesSummary>,
    dealer: Option<DealerId>,
    inventory_type: Option<InventoryType>,
    limit: usize,
) -> Vec<ModelSales> {
    let mut by_model: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for row in models {
        if dealer.is_some_and(|d| d != row.dealer_id) {
            continue;
        }
        if inventory_type.is_some_and(|t| t != row.inventory_type) {
            continue;
        }
        *by_model
            .entry((row.make.as_str(), row.model.as_str()))
            .or_default() += row.sales_count;
    }

    let mut ranked: Vec<ModelSales> = by_model
        .into_iter()
        .map(|((make, model), sales)| ModelSales {
            make: make.to_string(),
            model: model.to_string(),
            sales,
        })
        .collect();
    // Stable sort keeps the (make, model) order of the map for ties.
    ranked.sort_by(|a, b| b.sales.cmp(&a.sales));
    ranked.truncate(limit);
    ranked
}

// ── Dealer sales profile ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSales {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub counts: SalesCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerSalesProfile {
    pub dealer_id: DealerId,
    pub totals: SalesCounts,
    pub new_share: Decimal,
    pub used_share: Decimal,
    /// Ordered by period start.
    pub periods: Vec<PeriodSales>,
}

pub fn dealer_profile<'a>(
    dealer_id: DealerId,
    summaries: impl IntoIterator<Item = &'a SalesSummary>,
) -> DealerSalesProfile {
    let mut periods: Vec<PeriodSales> = summaries
        .into_iter()
        .filter(|s| s.dealer_id == dealer_id)
        .map(|s| PeriodSales {
            period_start: s.period_start,
            period_end: s.period_end,
            counts: s.counts(),
        })
        .collect();
    periods.sort_by_key(|p| p.period_start);

    let mut totals = SalesCounts::default();
    for p in &periods {
        totals.add(&p.counts);
    }

    DealerSalesProfile {
        dealer_id,
        totals,
        new_share: market_share(totals.new, totals.total),
        used_share: market_share(totals.used, totals.total),
        periods,
    }
}

impl DealerSalesProfile {
    /// Add zero rows for every bucket in `periods` the dealer sold nothing in.
    pub fn with_empty_periods(mut self, periods: &[PeriodWindow]) -> Self {
        let held: BTreeSet<(NaiveDate, NaiveDate)> = self
            .periods
            .iter()
            .map(|p| (p.period_start, p.period_end))
            .collect();
        for period in periods {
            if !held.contains(&(period.start, period.end)) {
                self.periods.push(PeriodSales {
                    period_start: period.start,
                    period_end: period.end,
                    counts: SalesCounts::default(),
                });
            }
        }
        self.periods.sort_by_key(|p| p.period_start);
        self
    }
}
