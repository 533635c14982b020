use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::entry::EntryController;
use crate::exit::ExitController;
use crate::metrics::MetricsAggregator;
use crate::models::Position;
use crate::position_store::PositionStore;
use crate::reserve_guard::ReserveGuard;
use crate::validator::MarketDataPort;

/// Owns the tick: `checkEntries(); reserveGuard(); checkExits(); every_10_ticks logMetrics()`,
/// on a fixed `check_interval`. Grounded on `strategy.py::BasisTradeStrategy.run`
/// and the teacher's `main.rs` task-loop shape, expanded with ReserveGuard
/// running ahead of ExitController per spec.md §2's control-flow order.
pub struct StrategyRunner {
    entry: EntryController,
    exit: Arc<ExitController>,
    reserve_guard: ReserveGuard,
    metrics: MetricsAggregator,
    positions: Arc<PositionStore>,
    check_interval: Duration,
    paper: bool,
}

impl StrategyRunner {
    pub fn new(
        entry: EntryController,
        exit: Arc<ExitController>,
        reserve_guard: ReserveGuard,
        metrics: MetricsAggregator,
        positions: Arc<PositionStore>,
        check_interval_seconds: u64,
        paper: bool,
    ) -> Self {
        Self { entry, exit, reserve_guard, metrics, positions, check_interval: Duration::from_secs(check_interval_seconds), paper }
    }

    /// Runs until the process is terminated. Signals are delivered by the
    /// outer supervisor; no transaction rollback is required since all
    /// writes are per-position and idempotent under the state machine.
    pub async fn run(&self, market: &dyn MarketDataPort, now_fn: impl Fn() -> f64) {
        let mode = if self.paper { "PAPER" } else { "LIVE" };
        info!("strategy runner started [{mode}] — check every {:?}", self.check_interval);

        let mut cycle_count: u64 = 0;
        let mut ticker = tokio::time::interval(self.check_interval);
        loop {
            ticker.tick().await;
            let now = now_fn();

            self.entry.check_entries(market, now).await;
            self.reserve_guard.enforce(now).await;
            self.exit.check_exits(now).await;

            cycle_count += 1;
            if cycle_count % 10 == 0 {
                self.log_summary(now).await;
            }
        }
    }

    /// Runs reconciliation once, intended to be called before entering the loop.
    pub async fn startup_reconcile(&self, now: f64, max_age_seconds: f64, tiers: &crate::tier::TierRegistry) -> Vec<Position> {
        match self.positions.reconcile(now, max_age_seconds, tiers).await {
            Ok(closed) => {
                if !closed.is_empty() {
                    info!("startup reconciliation closed {} stale position(s)", closed.len());
                }
                closed
            }
            Err(e) => {
                error!("startup reconciliation failed: {e}");
                Vec::new()
            }
        }
    }

    async fn log_summary(&self, now: f64) {
        match self.metrics.compute(now).await {
            Ok(metrics) => {
                let mode = if self.paper { "PAPER" } else { "LIVE" };
                warn!(
                    "[P&L SUMMARY] [{mode}] realized=${:.4} ({} trades) | funding=${:.4} | open={}",
                    metrics.total_realized_pnl, metrics.total_trades, metrics.total_funding_collected, metrics.open_positions
                );
            }
            Err(e) => error!("failed to compute P&L summary: {e}"),
        }
    }
}
