//! Several markets folded in one pass
//!
//! Each market keeps its own `PartialAggregate`, so duplicate identifiers
//! are resolved within that market's peer set only. A dealer's counts never
//! depend on which other markets share the pass.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use ingestion::RecordChunk;

use crate::aggregator::{ChunkFold, FinalizedSales, SalesAggregator};
use crate::partial::{AggregateStats, AggregationScope, PartialAggregate};

/// One partial per market, in the order the scopes were given to `MarketAggregator::new`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketPartials(Vec<PartialAggregate>);

impl MarketPartials {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MarketAggregator {
    markets: Vec<SalesAggregator>,
}

impl MarketAggregator {
    pub fn new(scopes: impl IntoIterator<Item = AggregationScope>) -> Self {
        let markets: Vec<SalesAggregator> = scopes.into_iter().map(SalesAggregator::new).collect();
        info!(markets = markets.len(), "MarketAggregator initialized");
        Self { markets }
    }

    /// Finalize every market, in scope order.
    pub fn finalize(&self, partials: MarketPartials, finalized_at: DateTime<Utc>) -> Vec<FinalizedSales> {
        self.markets
            .iter()
            .zip(partials.0)
            .map(|(market, partial)| market.finalize(partial, finalized_at))
            .collect()
    }
}

impl ChunkFold for MarketAggregator {
    type Partial = MarketPartials;

    fn empty(&self) -> MarketPartials {
        MarketPartials(self.markets.iter().map(|_| PartialAggregate::new()).collect())
    }

    fn fold(&self, chunk: &RecordChunk) -> MarketPartials {
        MarketPartials(self.markets.iter().map(|m| m.fold_chunk(chunk)).collect())
    }

    fn combine(&self, a: MarketPartials, b: MarketPartials) -> MarketPartials {
        MarketPartials(a.0.into_iter().zip(b.0).map(|(x, y)| x.merge(y)).collect())
    }
}

/// Stats of several markets added together.
pub fn combined_stats(sales: &[FinalizedSales]) -> AggregateStats {
    let mut stats = AggregateStats::default();
    for s in sales {
        stats.add(&s.stats);
    }
    stats
}

/// SHA-256 over the market fingerprints in order. Empty for no markets.
pub fn combined_fingerprint(sales: &[FinalizedSales]) -> String {
    if sales.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    for s in sales {
        hasher.update(s.fingerprint.as_bytes());
        hasher.update(b"|");
    }
    format!("{:x}", hasher.finalize())
}
