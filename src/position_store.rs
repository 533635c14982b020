use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{Position, PositionStatus};
use crate::store::StorePort;
use crate::tier::TierRegistry;

/// CRUD over open positions and appended trade history, plus reconciliation.
/// Grounded on `position_manager.py::PositionManager`.
pub struct PositionStore {
    store: Arc<dyn StorePort>,
    max_positions_per_exchange: usize,
    max_total_positions: usize,
}

impl PositionStore {
    pub fn new(store: Arc<dyn StorePort>, max_positions_per_exchange: usize, max_total_positions: usize) -> Self {
        Self { store, max_positions_per_exchange, max_total_positions }
    }

    pub async fn get(&self, exchange: &str, symbol: &str) -> Result<Option<Position>, StoreError> {
        self.store.get_position(exchange, symbol).await
    }

    pub async fn save(&self, position: &Position) -> Result<(), StoreError> {
        self.store.save_position(position).await
    }

    pub async fn list(&self, exchange: Option<&str>) -> Result<Vec<Position>, StoreError> {
        self.store.list_positions(exchange).await
    }

    pub async fn history(&self) -> Result<Vec<Position>, StoreError> {
        self.store.trade_history().await
    }

    pub async fn set_basis(&self, exchange: &str, symbol: &str, unix_seconds: i64, basis_pct: f64) -> Result<(), StoreError> {
        self.store.set_basis(exchange, symbol, unix_seconds, basis_pct).await
    }

    /// Forbids duplicate identity and enforces per-exchange/total open quotas.
    pub async fn can_open(&self, exchange: &str, symbol: &str) -> Result<(bool, String), StoreError> {
        if self.store.get_position(exchange, symbol).await?.is_some() {
            return Ok((false, format!("position already open for {exchange}:{symbol}")));
        }

        let on_exchange = self.store.list_positions(Some(exchange)).await?.len();
        if on_exchange >= self.max_positions_per_exchange {
            return Ok((false, format!("max_positions_per_exchange ({}) reached for {exchange}", self.max_positions_per_exchange)));
        }

        let total = self.store.list_positions(None).await?.len();
        if total >= self.max_total_positions {
            return Ok((false, format!("max_total_positions ({}) reached", self.max_total_positions)));
        }

        Ok((true, String::new()))
    }

    /// Closes positions older than `max_age_seconds`, lacking a tier, or
    /// referencing a symbol no longer in the tier registry. Idempotent:
    /// positions it has already closed are no longer `open` and are skipped
    /// on a subsequent call. Invoked at startup.
    pub async fn reconcile(&self, now: f64, max_age_seconds: f64, tiers: &TierRegistry) -> Result<Vec<Position>, StoreError> {
        let open_positions = self.store.list_positions(None).await?;
        let mut reconciled = Vec::new();

        for mut position in open_positions {
            if !position.status.is_open() {
                continue;
            }

            let too_old = now - position.opened_at > max_age_seconds;
            let lacks_tier = position.tier.is_none();
            let invalid_symbol = tiers.tier_for(&position.symbol).is_none();

            if too_old || lacks_tier || invalid_symbol {
                position.status = PositionStatus::StaleClosed;
                position.closed_at = Some(now);
                position.realized_pnl = 0.0;
                position.exit_reason = Some("reconciled".to_string());
                self.store.save_position(&position).await?;
                reconciled.push(position);
            }
        }

        Ok(reconciled)
    }
}
