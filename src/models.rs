use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Converts a spot symbol into its perpetual counterpart.
///
/// `BTC/USDT` -> `BTC/USDT:USDT`; a symbol that already carries a settle
/// suffix (contains `:`) is returned unchanged.
pub fn spot_to_perp(spot_symbol: &str) -> String {
    if spot_symbol.contains(':') {
        return spot_symbol.to_string();
    }
    match spot_symbol.split_once('/') {
        Some((_, quote)) => format!("{spot_symbol}:{quote}"),
        None => spot_symbol.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub timestamp: f64,
}

impl OrderBookSnapshot {
    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid_price();
        if mid == 0.0 {
            return 0.0;
        }
        (self.ask - self.bid) / mid * 100.0
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingEntry {
    pub exchange: String,
    pub perp_symbol: String,
    pub spot_symbol: String,
    pub funding_rate: f64,
    pub funding_timestamp: f64,
    #[serde(default)]
    pub next_funding_timestamp: Option<f64>,
    #[serde(default)]
    pub next_funding_rate: Option<f64>,
    pub timestamp: f64,
}

impl FundingEntry {
    /// `funding_rate * 3 periods/day * 365 days * 100` — the figure quoted to humans.
    pub fn annualized_rate_pct(&self) -> f64 {
        self.funding_rate * 3.0 * 365.0 * 100.0
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn age_seconds(&self, now: f64) -> f64 {
        now - self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
    StaleClosed,
}

impl PositionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionStatus::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub exchange: String,
    pub symbol: String,
    pub perp_symbol: String,
    pub direction: String,
    pub status: PositionStatus,
    pub size_usdt: f64,
    #[serde(default)]
    pub tier: Option<String>,

    pub spot_entry_price: f64,
    pub spot_quantity: f64,
    #[serde(default)]
    pub spot_exit_price: Option<f64>,

    pub perp_entry_price: f64,
    pub perp_quantity: f64,
    #[serde(default)]
    pub perp_exit_price: Option<f64>,

    pub entry_funding_rate: f64,
    pub entry_annualized_rate: f64,
    #[serde(default)]
    pub funding_collected: f64,
    #[serde(default)]
    pub last_funding_update: f64,

    pub opened_at: f64,
    #[serde(default)]
    pub closed_at: Option<f64>,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub exit_reason: Option<String>,
    pub paper: bool,
}

impl Position {
    pub fn redis_key(&self) -> String {
        format!("position:{}:{}", self.exchange, self.symbol)
    }

    pub fn now() -> f64 {
        Utc::now().timestamp() as f64
    }

    /// `(spot_exit-spot_entry)*spot_qty + (perp_entry-perp_exit)*perp_qty + funding_collected`.
    /// Valid only once the position is closed.
    pub fn calculate_pnl(&self) -> f64 {
        if !matches!(self.status, PositionStatus::Closed | PositionStatus::StaleClosed) {
            return 0.0;
        }
        let spot_exit = self.spot_exit_price.unwrap_or(self.spot_entry_price);
        let perp_exit = self.perp_exit_price.unwrap_or(self.perp_entry_price);
        (spot_exit - self.spot_entry_price) * self.spot_quantity
            + (self.perp_entry_price - perp_exit) * self.perp_quantity
            + self.funding_collected
    }

    pub fn estimate_unrealized_pnl(&self, spot_price: f64, perp_price: f64) -> f64 {
        (spot_price - self.spot_entry_price) * self.spot_quantity
            + (self.perp_entry_price - perp_price) * self.perp_quantity
            + self.funding_collected
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Derived capital snapshot; never persisted directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalState {
    pub deployed: f64,
    pub free: f64,
    pub estimated_balance: f64,
}

impl CapitalState {
    /// `deployed = sum(open.size_usdt)`, `free = operative - deployed`,
    /// `estimated_balance = total + sum(history.realized_pnl)`.
    pub fn compute(open_positions: &[Position], history: &[Position], total: f64, operative: f64) -> Self {
        let deployed: f64 = open_positions.iter().map(|p| p.size_usdt).sum();
        let realized: f64 = history.iter().map(|p| p.realized_pnl).sum();
        CapitalState { deployed, free: operative - deployed, estimated_balance: total + realized }
    }
}
