use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::execution::OrderExecutionPort;
use crate::market_data::MarketDataView;
use crate::models::Position;
use crate::notify::{AlertLevel, NotificationPort};
use crate::position_store::PositionStore;
use crate::tier::TierRegistry;

pub const CHECK_INTERVAL_SECONDS: u64 = 30;
pub const REBALANCE_TIMEOUT_SECONDS: u64 = 60;

/// Periodic delta/basis check, drift alerting, and the shared
/// negative-funding observation counters ExitController's funding_negative
/// trigger reads. Grounded on `delta_monitor.py::DeltaMonitor`.
pub struct DeltaMonitor {
    market_data: MarketDataView,
    positions: Arc<PositionStore>,
    execution: Arc<dyn OrderExecutionPort>,
    notifier: Arc<dyn NotificationPort>,
    tiers: TierRegistry,
    negative_funding_counts: Mutex<HashMap<(String, String), u32>>,
}

impl DeltaMonitor {
    pub fn new(
        market_data: MarketDataView,
        positions: Arc<PositionStore>,
        execution: Arc<dyn OrderExecutionPort>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            market_data,
            positions,
            execution,
            notifier,
            tiers: TierRegistry::new(),
            negative_funding_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Increments the counter when `is_negative`, resets to zero otherwise,
    /// and returns the updated count.
    pub async fn track_negative_funding(&self, exchange: &str, symbol: &str, is_negative: bool) -> u32 {
        let mut counts = self.negative_funding_counts.lock().await;
        let key = (exchange.to_string(), symbol.to_string());
        let entry = counts.entry(key).or_insert(0);
        if is_negative {
            *entry += 1;
        } else {
            *entry = 0;
        }
        *entry
    }

    pub async fn reset_tracking(&self, exchange: &str, symbol: &str) {
        let mut counts = self.negative_funding_counts.lock().await;
        counts.remove(&(exchange.to_string(), symbol.to_string()));
    }

    /// Runs forever on a fixed 30s timer; intended to be spawned as its own task.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(CHECK_INTERVAL_SECONDS));
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_all_positions().await {
                error!("delta monitor tick failed: {e}");
            }
        }
    }

    pub async fn check_all_positions(&self) -> Result<(), StoreError> {
        let open_positions = self.positions.list(None).await?;
        for position in &open_positions {
            self.check_position(position).await?;
        }
        Ok(())
    }

    async fn check_position(&self, position: &Position) -> Result<(), StoreError> {
        let book = match self.market_data.latest_book(&position.exchange, &position.symbol).await? {
            Some(b) => b,
            None => return Ok(()),
        };
        let mid = book.mid_price();

        let delta = position.spot_quantity * mid - position.perp_quantity * mid;
        let threshold = match position.tier.as_deref().and_then(|name| self.tiers.tier_by_name(name)) {
            Some(tier) => tier.size_per_pair * tier.delta_alert_fraction,
            None => position.size_usdt * 0.02,
        };

        if delta.abs() > threshold {
            warn!(
                "delta drift on {}:{} = {:.2} USDT exceeds threshold {:.2}",
                position.exchange, position.symbol, delta, threshold
            );
            let _ = self
                .notifier
                .alert(AlertLevel::Warning, &format!("delta drift {:.2} on {}:{}", delta, position.exchange, position.symbol))
                .await;

            if !self.attempt_rebalance(position).await {
                error!("rebalance failed for {}:{}", position.exchange, position.symbol);
                let _ = self
                    .notifier
                    .alert(AlertLevel::Critical, &format!("rebalance failed for {}:{}", position.exchange, position.symbol))
                    .await;
            }
        }

        // basis_pct is structurally 0: mid is used as the proxy for both
        // legs (no separate perp order book key exists in the store contract).
        let basis_pct = 0.0;
        let unix_seconds = Position::now() as i64;
        self.positions.set_basis(&position.exchange, &position.symbol, unix_seconds, basis_pct).await?;

        Ok(())
    }

    /// Paper mode logs intent only and reports success; live mode declares
    /// the gap and returns false without submitting an order (human in the
    /// loop requirement per spec.md §4.7 / §9).
    async fn attempt_rebalance(&self, position: &Position) -> bool {
        if self.execution.is_paper() {
            warn!("[PAPER] would rebalance {}:{} (intent only)", position.exchange, position.symbol);
            true
        } else {
            error!("[LIVE] rebalance required for {}:{} but live rebalancing is not implemented", position.exchange, position.symbol);
            false
        }
    }
}
