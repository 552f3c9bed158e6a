//! Competitor Ranking Engine
//!
//! Pure transform over finalized summaries: no I/O, cheap to rerun under a
//! different metric or top-K.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use types::ids::DealerId;
use types::market::MarketArea;
use types::summary::{CompetitorRanking, RankedDealer, SalesCounts, SalesMetric};
use types::window::PeriodWindow;

use crate::aggregator::FinalizedSales;

/// Ranking options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingOptions {
    /// Keep only the first `k` entries. Shares are still computed over the
    /// whole market.
    pub top_k: Option<usize>,
    pub metric: SalesMetric,
}

/// One market member's sales going into a ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetitorSales {
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub counts: SalesCounts,
}

/// What is being ranked: a market, its window and the dealer asking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRequest {
    pub market: MarketArea,
    pub window: PeriodWindow,
    pub target: Option<DealerId>,
}

/// `100 × part / total`, or zero when the total is zero.
pub fn market_share(part: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(total)).normalize()
}

/// Rank competitors by the chosen metric, descending, ties by dealer id.
///
/// Repeated dealer ids are combined into one entry.
pub fn rank_competitors(
    request: RankingRequest,
    competitors: impl IntoIterator<Item = CompetitorSales>,
    options: &RankingOptions,
) -> CompetitorRanking {
    let mut combined: BTreeMap<DealerId, CompetitorSales> = BTreeMap::new();
    for competitor in competitors {
        match combined.get_mut(&competitor.dealer_id) {
            Some(existing) => existing.counts.add(&competitor.counts),
            None => {
                combined.insert(competitor.dealer_id, competitor);
            }
        }
    }

    let metric = options.metric;
    let total: u64 = combined.values().map(|c| c.counts.get(metric)).sum();

    let mut ordered: Vec<CompetitorSales> = combined.into_values().collect();
    ordered.sort_by(|a, b| {
        b.counts
            .get(metric)
            .cmp(&a.counts.get(metric))
            .then(a.dealer_id.cmp(&b.dealer_id))
    });

    let dealer_count = ordered.len();
    let mut entries: Vec<RankedDealer> = ordered
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let sales = c.counts.get(metric);
            RankedDealer {
                rank: i + 1,
                dealer_id: c.dealer_id,
                dealer_name: c.dealer_name,
                sales,
                market_share: market_share(sales, total),
            }
        })
        .collect();

    let target_entry = request
        .target
        .and_then(|t| entries.iter().find(|e| e.dealer_id == t));
    let target_rank = target_entry.map(|e| e.rank);
    let target_share = target_entry.map(|e| e.market_share);

    if let Some(k) = options.top_k {
        entries.truncate(k);
    }

    debug!(
        market = %request.market,
        metric = ?metric,
        dealers = dealer_count,
        total_sales = total,
        listed = entries.len(),
        "Competitors ranked"
    );

    CompetitorRanking {
        market: request.market,
        window: request.window,
        metric,
        total_market_sales: total,
        dealer_count,
        target: request.target,
        target_rank,
        target_share,
        entries,
    }
}

/// Rank every market member from a finalized aggregate.
///
/// Members without sales appear with zero sales and zero share. `name_of`
/// supplies display names.
pub fn rank_market<F>(
    sales: &FinalizedSales,
    request: RankingRequest,
    members: &[DealerId],
    name_of: F,
    options: &RankingOptions,
) -> CompetitorRanking
where
    F: Fn(DealerId) -> String,
{
    let totals = sales.totals_by_dealer();
    let competitors = members.iter().map(|id| CompetitorSales {
        dealer_id: *id,
        dealer_name: name_of(*id),
        counts: totals.get(id).copied().unwrap_or_default(),
    });
    rank_competitors(request, competitors, options)
}
