use std::sync::Arc;

use log::{debug, warn};

use crate::breakeven::BreakevenEvaluator;
use crate::config::{CapitalConfig, TradingConfig};
use crate::execution::{OrderExecutionPort, TradeAction, TradeSignal};
use crate::market_data::MarketDataView;
use crate::models::{spot_to_perp, CapitalState, Position, PositionStatus};
use crate::notify::NotificationPort;
use crate::position_store::PositionStore;
use crate::tier::TierRegistry;
use crate::validator::{MarketDataPort, PairValidator};

/// Applies the entry gate pipeline (spec.md §4.5) for each (exchange, symbol)
/// pair and emits open intents to the execution adapter. Grounded on
/// `strategy.py::_evaluate_entry`, expanded to the full 8-step gate.
pub struct EntryController {
    tiers: TierRegistry,
    market_data: MarketDataView,
    positions: Arc<PositionStore>,
    execution: Arc<dyn OrderExecutionPort>,
    notifier: Arc<dyn NotificationPort>,
    trading: TradingConfig,
    capital: CapitalConfig,
    funding_poll_interval: u64,
}

impl EntryController {
    pub fn new(
        market_data: MarketDataView,
        positions: Arc<PositionStore>,
        execution: Arc<dyn OrderExecutionPort>,
        notifier: Arc<dyn NotificationPort>,
        trading: TradingConfig,
        capital: CapitalConfig,
        funding_poll_interval: u64,
    ) -> Self {
        Self { tiers: TierRegistry::new(), market_data, positions, execution, notifier, trading, capital, funding_poll_interval }
    }

    /// Runs the gate for every configured exchange x symbol pair.
    pub async fn check_entries(&self, market: &dyn MarketDataPort, now: f64) {
        for exchange in &self.trading.exchanges {
            for symbol in &self.trading.symbols {
                if let Err(e) = self.evaluate_entry(market, exchange, symbol, now).await {
                    debug!("entry evaluation failed for {exchange}:{symbol}: {e}");
                }
            }
        }
    }

    async fn evaluate_entry(&self, market: &dyn MarketDataPort, exchange: &str, symbol: &str, now: f64) -> Result<(), String> {
        // 1. blacklist / tier presence
        let tier = match self.tiers.tier_for(symbol) {
            Some(t) => t,
            None => return Ok(()),
        };

        // 2. latest FundingEntry exists and is fresh
        let funding = self
            .market_data
            .latest_funding(exchange, symbol)
            .await
            .map_err(|e| e.to_string())?;
        let funding = match funding {
            Some(f) => f,
            None => return Ok(()),
        };
        if !MarketDataView::is_fresh(&funding, now, self.funding_poll_interval) {
            return Ok(());
        }

        // 3. positive funding, at/above tier minimum
        if funding.funding_rate <= 0.0 || funding.funding_rate < tier.min_funding_rate {
            return Ok(());
        }

        // 4. annualized rate threshold
        let annualized = funding.annualized_rate_pct();
        if annualized < self.trading.min_entry_annualized_pct {
            return Ok(());
        }

        // 5. capital available
        let open_positions = self.positions.list(None).await.map_err(|e| e.to_string())?;
        let history = self.positions.history().await.map_err(|e| e.to_string())?;
        let capital_state = CapitalState::compute(&open_positions, &history, self.capital.total, self.capital.operative);
        if capital_state.free < tier.size_per_pair {
            return Ok(());
        }
        let open_in_tier = open_positions.iter().filter(|p| p.tier.as_deref() == Some(tier.name)).count();
        if open_in_tier >= tier.max_pairs_open {
            return Ok(());
        }
        if capital_state.estimated_balance < self.capital.operative {
            return Ok(());
        }

        // 6. PositionStore.can_open
        let (allowed, reason) = self.positions.can_open(exchange, symbol).await.map_err(|e| e.to_string())?;
        if !allowed {
            debug!("cannot open {symbol} on {exchange}: {reason}");
            return Ok(());
        }

        // 7. latest OrderBookSnapshot + breakeven viability
        let book = self.market_data.latest_book(exchange, symbol).await.map_err(|e| e.to_string())?;
        if book.is_none() {
            return Ok(());
        }
        let fees = self.tiers.fees_for(exchange);
        let breakeven = BreakevenEvaluator::evaluate(tier.size_per_pair, funding.funding_rate, fees);
        if !breakeven.viable {
            return Ok(());
        }

        // 8. PairValidator approval
        let perp_symbol = spot_to_perp(symbol);
        let validator = PairValidator::new(&self.tiers);
        let validation = validator.validate(market, exchange, symbol, &perp_symbol).await;
        if !validation.approved {
            debug!("pair validation rejected {symbol} on {exchange}: {:?}", validation.reasons);
            return Ok(());
        }

        let signal = TradeSignal {
            action: TradeAction::Open,
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            perp_symbol: perp_symbol.clone(),
            size_usdt: tier.size_per_pair,
            funding_rate: funding.funding_rate,
            annualized_rate: annualized,
            reason: format!("funding annualized {annualized:.1}% >= {}%", self.trading.min_entry_annualized_pct),
        };

        let (spot_fill, perp_fill) = match self.execution.execute_open(&signal).await {
            Ok(fills) => fills,
            Err(e) => {
                warn!("failed to execute open for {symbol} on {exchange}: {e}");
                return Ok(());
            }
        };

        let position = Position {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            perp_symbol,
            direction: "long_spot_short_perp".to_string(),
            status: PositionStatus::Open,
            size_usdt: tier.size_per_pair,
            tier: Some(tier.name.to_string()),
            spot_entry_price: spot_fill.price,
            spot_quantity: spot_fill.quantity,
            spot_exit_price: None,
            perp_entry_price: perp_fill.price,
            perp_quantity: perp_fill.quantity,
            perp_exit_price: None,
            entry_funding_rate: funding.funding_rate,
            entry_annualized_rate: annualized,
            funding_collected: 0.0,
            last_funding_update: now,
            opened_at: now,
            closed_at: None,
            realized_pnl: 0.0,
            exit_reason: None,
            paper: self.execution.is_paper(),
        };

        self.positions.save(&position).await.map_err(|e| e.to_string())?;

        let mode = if self.execution.is_paper() { "PAPER" } else { "LIVE" };
        warn!(
            "[{mode}] OPENED {symbol} on {exchange}: size=${:.0}, funding={:.4}% ({:.1}% ann)",
            tier.size_per_pair,
            funding.funding_rate * 100.0,
            annualized
        );

        if let Err(e) = self.notifier.position_opened(&position).await {
            warn!("failed to send trade opened notification: {e}");
        }

        Ok(())
    }
}
