use std::sync::Arc;

use crate::config::CapitalConfig;
use crate::error::StoreError;
use crate::models::{CapitalState, Position};
use crate::position_store::PositionStore;

#[derive(Debug, Clone, PartialEq)]
pub struct PairYield {
    pub exchange: String,
    pub symbol: String,
    pub pnl_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_trades: usize,
    pub win_rate: f64,
    pub avg_pnl_per_trade: f64,
    pub total_realized_pnl: f64,
    pub total_funding_collected: f64,
    pub funding_yield_real: f64,
    pub avg_basis_cost: f64,
    pub net_pnl_ratio: f64,
    pub funding_vs_drift: f64,
    pub projected_monthly_yield: f64,
    pub best_pair: Option<PairYield>,
    pub worst_pair: Option<PairYield>,
    pub capital_deployed: f64,
    pub capital_free: f64,
    pub reserve_status: ReserveStatus,
    pub open_positions: usize,
    pub days_active: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveStatus {
    Ok,
    Alert,
}

/// Pure computation over trade history and current open positions, ported
/// from `metrics.py::calculate_metrics` / `format_report`.
pub struct MetricsAggregator {
    positions: Arc<PositionStore>,
    capital: CapitalConfig,
}

impl MetricsAggregator {
    pub fn new(positions: Arc<PositionStore>, capital: CapitalConfig) -> Self {
        Self { positions, capital }
    }

    pub async fn compute(&self, now: f64) -> Result<Metrics, StoreError> {
        let history = self.positions.history().await?;
        let open_positions = self.positions.list(None).await?;
        let state = CapitalState::compute(&open_positions, &history, self.capital.total, self.capital.operative);

        let total_trades = history.len();
        let wins = history.iter().filter(|p| p.realized_pnl > 0.0).count();
        let win_rate = if total_trades > 0 { wins as f64 / total_trades as f64 } else { 0.0 };

        let total_realized_pnl: f64 = history.iter().map(|p| p.realized_pnl).sum();
        let total_funding_collected: f64 = history.iter().map(|p| p.funding_collected).sum();
        let avg_pnl_per_trade = if total_trades > 0 { total_realized_pnl / total_trades as f64 } else { 0.0 };

        let total_size: f64 = history.iter().map(|p| p.size_usdt).sum();
        let funding_yield_real = if total_size > 0.0 { total_funding_collected / total_size * 100.0 } else { 0.0 };

        let avg_basis_cost = if total_trades > 0 {
            history.iter().map(|p| basis_cost_pct(p)).sum::<f64>() / total_trades as f64
        } else {
            0.0
        };

        let drift = total_realized_pnl - total_funding_collected;
        let funding_vs_drift = if drift.abs() > 1e-12 { (total_funding_collected / drift).abs() } else { f64::INFINITY };

        let net_pnl_ratio = if total_size > 0.0 { total_realized_pnl / total_size * 100.0 } else { 0.0 };

        let earliest_open = history.iter().map(|p| p.opened_at).chain(open_positions.iter().map(|p| p.opened_at)).fold(None, |acc, t| match acc {
            None => Some(t),
            Some(min) => Some(if t < min { t } else { min }),
        });
        let days_active = earliest_open.map(|t| (now - t) / 86400.0).unwrap_or(0.0).max(1.0 / 24.0);
        let projected_monthly_yield = (funding_yield_real / days_active) * 30.0;

        let (best_pair, worst_pair) = best_and_worst(&history);

        let reserve_status = if state.estimated_balance >= self.capital.operative { ReserveStatus::Ok } else { ReserveStatus::Alert };

        Ok(Metrics {
            total_trades,
            win_rate,
            avg_pnl_per_trade,
            total_realized_pnl,
            total_funding_collected,
            funding_yield_real,
            avg_basis_cost,
            net_pnl_ratio,
            funding_vs_drift,
            projected_monthly_yield,
            best_pair,
            worst_pair,
            capital_deployed: state.deployed,
            capital_free: state.free,
            reserve_status,
            open_positions: open_positions.len(),
            days_active,
        })
    }

    /// Renders the text report described in spec.md §4.9, structured after
    /// `metrics.py::format_report`.
    pub fn format_report(metrics: &Metrics) -> String {
        let mut out = String::new();
        out.push_str("=== BASIS TRADE ENGINE — PERFORMANCE REPORT ===\n");
        out.push_str(&format!("Trades:            {}\n", metrics.total_trades));
        out.push_str(&format!("Win rate:          {:.1}%\n", metrics.win_rate * 100.0));
        out.push_str(&format!("Avg PnL/trade:     ${:.4}\n", metrics.avg_pnl_per_trade));
        out.push_str(&format!("Total realized:    ${:.4}\n", metrics.total_realized_pnl));
        out.push_str(&format!("Total funding:     ${:.4}\n", metrics.total_funding_collected));
        out.push_str(&format!("Funding yield:     {:.2}%\n", metrics.funding_yield_real));
        out.push_str(&format!("Projected monthly: {:.2}%\n", metrics.projected_monthly_yield));
        out.push_str(&format!("Avg basis cost:    {:.4}%\n", metrics.avg_basis_cost));
        out.push_str(&format!("Net PnL ratio:     {:.2}%\n", metrics.net_pnl_ratio));
        if let Some(best) = &metrics.best_pair {
            out.push_str(&format!("Best pair:         {}:{} ({:.2}%)\n", best.exchange, best.symbol, best.pnl_ratio));
        }
        if let Some(worst) = &metrics.worst_pair {
            out.push_str(&format!("Worst pair:        {}:{} ({:.2}%)\n", worst.exchange, worst.symbol, worst.pnl_ratio));
        }
        out.push_str(&format!("Capital deployed:  ${:.2}\n", metrics.capital_deployed));
        out.push_str(&format!("Capital free:      ${:.2}\n", metrics.capital_free));
        out.push_str(&format!(
            "Reserve status:    {}\n",
            if metrics.reserve_status == ReserveStatus::Ok { "OK" } else { "ALERT" }
        ));
        out.push_str(&format!("Open positions:    {}\n", metrics.open_positions));
        out.push_str(&format!("Days active:       {:.1}\n", metrics.days_active));
        out
    }
}

fn basis_cost_pct(p: &Position) -> f64 {
    if p.perp_entry_price == 0.0 {
        return 0.0;
    }
    (p.spot_entry_price - p.perp_entry_price).abs() / p.perp_entry_price * 100.0
}

fn best_and_worst(history: &[Position]) -> (Option<PairYield>, Option<PairYield>) {
    let mut ratios: Vec<PairYield> = history
        .iter()
        .filter(|p| p.size_usdt > 0.0)
        .map(|p| PairYield { exchange: p.exchange.clone(), symbol: p.symbol.clone(), pnl_ratio: p.realized_pnl / p.size_usdt * 100.0 })
        .collect();

    if ratios.is_empty() {
        return (None, None);
    }
    ratios.sort_by(|a, b| a.pnl_ratio.partial_cmp(&b.pnl_ratio).unwrap());
    let worst = ratios.first().cloned();
    let best = ratios.last().cloned();
    (best, worst)
}
