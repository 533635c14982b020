use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{FundingEntry, OrderBookSnapshot};
use crate::store::StorePort;

/// Read-only accessor for latest order books and funding entries over the
/// store, shared by EntryController, ExitController, PairValidator and
/// DeltaMonitor. Wraps `StorePort` so those components never reach into a
/// concrete store transport (per spec.md's port-boundary design note).
pub struct MarketDataView {
    store: Arc<dyn StorePort>,
}

impl MarketDataView {
    pub fn new(store: Arc<dyn StorePort>) -> Self {
        Self { store }
    }

    pub async fn latest_book(&self, exchange: &str, symbol: &str) -> Result<Option<OrderBookSnapshot>, StoreError> {
        self.store.get_latest_book(exchange, symbol).await
    }

    pub async fn latest_funding(&self, exchange: &str, symbol: &str) -> Result<Option<FundingEntry>, StoreError> {
        self.store.get_funding(exchange, symbol).await
    }

    /// A funding entry is stale once its age exceeds `2 * poll_interval`.
    pub fn is_fresh(entry: &FundingEntry, now: f64, poll_interval_secs: u64) -> bool {
        entry.age_seconds(now) <= 2.0 * poll_interval_secs as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FundingEntry;

    fn entry(timestamp: f64) -> FundingEntry {
        FundingEntry {
            exchange: "bitget".into(),
            perp_symbol: "BTC/USDT:USDT".into(),
            spot_symbol: "BTC/USDT".into(),
            funding_rate: 0.0005,
            funding_timestamp: timestamp,
            next_funding_timestamp: None,
            next_funding_rate: None,
            timestamp,
        }
    }

    #[test]
    fn fresh_within_twice_poll_interval() {
        assert!(MarketDataView::is_fresh(&entry(0.0), 599.0, 300));
    }

    #[test]
    fn stale_beyond_twice_poll_interval() {
        assert!(!MarketDataView::is_fresh(&entry(0.0), 601.0, 300));
    }
}
