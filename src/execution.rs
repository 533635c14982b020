use async_trait::async_trait;
use std::sync::Arc;

use crate::error::OrderError;
use crate::store::StorePort;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSignal {
    pub action: TradeAction,
    pub exchange: String,
    pub symbol: String,
    pub perp_symbol: String,
    pub size_usdt: f64,
    pub funding_rate: f64,
    pub annualized_rate: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Open,
    Close,
}

/// Translates open/close intents into exchange calls. Grounded on the
/// teacher's `ExchangeClient` trait (`exchange.rs`) and `executor.py`'s
/// paper/live split.
#[async_trait]
pub trait OrderExecutionPort: Send + Sync {
    fn is_paper(&self) -> bool;
    /// Returns (spot_fill, perp_fill) for a new long-spot/short-perp pair.
    async fn execute_open(&self, signal: &TradeSignal) -> Result<(Fill, Fill), OrderError>;
    /// Returns (spot_fill, perp_fill) closing out the given quantities.
    async fn execute_close(&self, signal: &TradeSignal, spot_quantity: f64, perp_quantity: f64) -> Result<(Fill, Fill), OrderError>;
}

/// Paper-trading adapter: simulates fills off the latest cached order book,
/// applying the teacher's `SimExchange` style immediate-fill assumption plus
/// a flat 0.1% estimated-slippage fee, matching `executor.py::_paper_open`.
pub struct PaperExecutionAdapter {
    store: Arc<dyn StorePort>,
    estimated_slippage_pct: f64,
}

impl PaperExecutionAdapter {
    pub fn new(store: Arc<dyn StorePort>) -> Self {
        Self { store, estimated_slippage_pct: 0.001 }
    }

    async fn simulated_fill(&self, exchange: &str, symbol: &str, size_usdt: f64, buying: bool) -> Result<Fill, OrderError> {
        let book = self
            .store
            .get_latest_book(exchange, symbol)
            .await
            .map_err(|e| OrderError::Network(e.to_string()))?
            .ok_or_else(|| OrderError::BadSymbol(format!("no cached order book for {exchange}:{symbol}")))?;

        let raw_price = if buying { book.ask } else { book.bid };
        let price = if buying {
            raw_price * (1.0 + self.estimated_slippage_pct)
        } else {
            raw_price * (1.0 - self.estimated_slippage_pct)
        };
        let quantity = size_usdt / price;
        Ok(Fill { price, quantity })
    }
}

#[async_trait]
impl OrderExecutionPort for PaperExecutionAdapter {
    fn is_paper(&self) -> bool {
        true
    }

    async fn execute_open(&self, signal: &TradeSignal) -> Result<(Fill, Fill), OrderError> {
        let spot_fill = self.simulated_fill(&signal.exchange, &signal.symbol, signal.size_usdt, true).await?;
        let perp_fill = self.simulated_fill(&signal.exchange, &signal.perp_symbol, signal.size_usdt, false).await?;
        Ok((spot_fill, perp_fill))
    }

    async fn execute_close(&self, signal: &TradeSignal, spot_quantity: f64, perp_quantity: f64) -> Result<(Fill, Fill), OrderError> {
        // Closing sells the spot leg and buys back the perp leg; price only
        // (quantity is whatever the position already holds).
        let spot_fill = self.simulated_fill(&signal.exchange, &signal.symbol, signal.size_usdt, false).await?;
        let perp_fill = self.simulated_fill(&signal.exchange, &signal.perp_symbol, signal.size_usdt, true).await?;
        Ok((Fill { price: spot_fill.price, quantity: spot_quantity }, Fill { price: perp_fill.price, quantity: perp_quantity }))
    }
}

/// Live adapter, grounded on the teacher's `LiveExchange` reqwest client.
/// Submits real market orders through a REST order-submission endpoint;
/// requires `{ID}_API_KEY`/`{ID}_SECRET` credentials supplied by the caller.
pub struct LiveExecutionAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl LiveExecutionAdapter {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_key, api_secret }
    }

    async fn submit_market_order(&self, symbol: &str, side: &str, size_usdt: f64) -> Result<Fill, OrderError> {
        let url = format!("{}/orders", self.base_url);
        let client_order_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("X-API-SECRET", &self.api_secret)
            .json(&serde_json::json!({
                "symbol": symbol,
                "side": side,
                "type": "market",
                "notional_usdt": size_usdt,
                "client_order_id": client_order_id,
            }))
            .send()
            .await
            .map_err(|e| OrderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrderError::Rejected(format!("exchange returned status {}", response.status())));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| OrderError::Network(e.to_string()))?;
        let price = body.get("fill_price").and_then(|v| v.as_f64()).ok_or_else(|| OrderError::Rejected("missing fill_price in response".to_string()))?;
        let quantity = body.get("fill_quantity").and_then(|v| v.as_f64()).ok_or_else(|| OrderError::Rejected("missing fill_quantity in response".to_string()))?;
        Ok(Fill { price, quantity })
    }
}

#[async_trait]
impl OrderExecutionPort for LiveExecutionAdapter {
    fn is_paper(&self) -> bool {
        false
    }

    async fn execute_open(&self, signal: &TradeSignal) -> Result<(Fill, Fill), OrderError> {
        let spot_fill = self.submit_market_order(&signal.symbol, "buy", signal.size_usdt).await?;
        let perp_fill = self.submit_market_order(&signal.perp_symbol, "sell", signal.size_usdt).await?;
        Ok((spot_fill, perp_fill))
    }

    async fn execute_close(&self, signal: &TradeSignal, spot_quantity: f64, perp_quantity: f64) -> Result<(Fill, Fill), OrderError> {
        let spot_fill = self.submit_market_order(&signal.symbol, "sell", spot_quantity * signal.size_usdt).await?;
        let perp_fill = self.submit_market_order(&signal.perp_symbol, "buy", perp_quantity * signal.size_usdt).await?;
        Ok((spot_fill, perp_fill))
    }
}
