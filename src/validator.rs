use async_trait::async_trait;

use crate::error::OrderError;
use crate::tier::TierRegistry;

pub const MIN_FUNDING_RATE: f64 = 0.0001;
pub const MIN_CONSECUTIVE_POSITIVE_DAYS: usize = 7;
pub const MAX_SPREAD: f64 = 0.0005;
pub const MIN_VOLUME_24H: f64 = 5_000_000.0;
pub const MAX_OI_DROP_PCT: f64 = -0.10;

/// The exchange query surface `PairValidator` needs, kept separate from the
/// order execution adapter so validation never reaches into a concrete
/// exchange handle (spec.md design note on port boundaries).
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn current_funding_rate(&self, exchange: &str, perp_symbol: &str) -> Result<f64, OrderError>;
    /// Up to 7 days of historical per-period funding rates, oldest first.
    /// `Err(OrderError::Unsupported(_))` marks the endpoint as absent (non-blocking).
    async fn funding_history_7d(&self, exchange: &str, perp_symbol: &str) -> Result<Vec<f64>, OrderError>;
    async fn spot_perp_spread(&self, exchange: &str, spot_symbol: &str, perp_symbol: &str) -> Result<f64, OrderError>;
    async fn volume_24h(&self, exchange: &str, perp_symbol: &str) -> Result<f64, OrderError>;
    /// Fractional change in open interest over the last 24h (negative = drop).
    async fn open_interest_change_24h(&self, exchange: &str, perp_symbol: &str) -> Result<f64, OrderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub approved: bool,
    pub reasons: Vec<String>,
    pub funding_7d_avg: Option<f64>,
    pub spread: Option<f64>,
    pub volume_24h: Option<f64>,
    pub oi_change: Option<f64>,
}

/// Multi-check approval pipeline, ported from `pair_selector.py::validate_pair`.
pub struct PairValidator<'a> {
    tiers: &'a TierRegistry,
}

impl<'a> PairValidator<'a> {
    pub fn new(tiers: &'a TierRegistry) -> Self {
        Self { tiers }
    }

    pub async fn validate(
        &self,
        market: &dyn MarketDataPort,
        exchange: &str,
        spot_symbol: &str,
        perp_symbol: &str,
    ) -> ValidationReport {
        let mut reasons = Vec::new();
        let mut blocked = false;

        // 1. blacklist / tier presence — blocking
        if self.tiers.tier_for(spot_symbol).is_none() {
            reasons.push(format!("{spot_symbol} is blacklisted or not in any tier"));
            return ValidationReport { approved: false, reasons, funding_7d_avg: None, spread: None, volume_24h: None, oi_change: None };
        }

        // 2. current funding rate — blocking
        let current_rate = match market.current_funding_rate(exchange, perp_symbol).await {
            Ok(rate) => rate,
            Err(e) => {
                reasons.push(format!("funding rate fetch failed: {e}"));
                return ValidationReport { approved: false, reasons, funding_7d_avg: None, spread: None, volume_24h: None, oi_change: None };
            }
        };
        if current_rate <= MIN_FUNDING_RATE {
            reasons.push(format!("current funding rate {current_rate} <= minimum {MIN_FUNDING_RATE}"));
            blocked = true;
        }

        // 3. 7-day funding history, last 21 entries strictly positive — blocking
        // when the endpoint is supported but returns nothing; non-blocking only
        // when the endpoint itself is unsupported or the fetch failed outright.
        let mut funding_7d_avg = None;
        match market.funding_history_7d(exchange, perp_symbol).await {
            Ok(history) if history.is_empty() => {
                reasons.push("no funding history available".to_string());
                blocked = true;
            }
            Ok(history) => {
                let tail_len = history.len().min(21);
                let tail = &history[history.len() - tail_len..];
                if !tail.iter().all(|r| *r > 0.0) {
                    reasons.push("funding history contains a non-positive period in the last 21".to_string());
                    blocked = true;
                }
                funding_7d_avg = Some(history.iter().sum::<f64>() / history.len() as f64);
            }
            Err(OrderError::Unsupported(msg)) => {
                reasons.push(format!("funding history unsupported: {msg}"));
            }
            Err(e) => {
                reasons.push(format!("funding history fetch failed: {e}"));
            }
        }

        // 4. spread — blocking
        let mut spread = None;
        match market.spot_perp_spread(exchange, spot_symbol, perp_symbol).await {
            Ok(s) => {
                spread = Some(s);
                if s.abs() > MAX_SPREAD {
                    reasons.push(format!("spot/perp spread {s} exceeds {MAX_SPREAD}"));
                    blocked = true;
                }
            }
            Err(e) => {
                reasons.push(format!("spread fetch failed: {e}"));
                blocked = true;
            }
        }

        // 5. 24h volume — blocking
        let mut volume_24h = None;
        match market.volume_24h(exchange, perp_symbol).await {
            Ok(v) => {
                volume_24h = Some(v);
                if v < MIN_VOLUME_24H {
                    reasons.push(format!("24h volume {v} below minimum {MIN_VOLUME_24H}"));
                    blocked = true;
                }
            }
            Err(e) => {
                reasons.push(format!("volume fetch failed: {e}"));
                blocked = true;
            }
        }

        // 6. OI change — non-blocking if unsupported
        let mut oi_change = None;
        match market.open_interest_change_24h(exchange, perp_symbol).await {
            Ok(change) => {
                oi_change = Some(change);
                if change < MAX_OI_DROP_PCT {
                    reasons.push(format!("open interest change {change} worse than {MAX_OI_DROP_PCT}"));
                    blocked = true;
                }
            }
            Err(OrderError::Unsupported(msg)) => {
                reasons.push(format!("open interest unsupported: {msg}"));
            }
            Err(e) => {
                reasons.push(format!("open interest fetch failed: {e}"));
            }
        }

        let approved = !blocked;
        ValidationReport { approved, reasons, funding_7d_avg, spread, volume_24h, oi_change }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMarket {
        funding_rate: f64,
        history: Result<Vec<f64>, OrderError>,
        spread: f64,
        volume: f64,
        oi_change: Result<f64, OrderError>,
    }

    #[async_trait]
    impl MarketDataPort for FakeMarket {
        async fn current_funding_rate(&self, _exchange: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
            Ok(self.funding_rate)
        }
        async fn funding_history_7d(&self, _exchange: &str, _perp_symbol: &str) -> Result<Vec<f64>, OrderError> {
            match &self.history {
                Ok(v) => Ok(v.clone()),
                Err(OrderError::Unsupported(m)) => Err(OrderError::Unsupported(m.clone())),
                Err(_) => Err(OrderError::Network("boom".into())),
            }
        }
        async fn spot_perp_spread(&self, _exchange: &str, _spot: &str, _perp: &str) -> Result<f64, OrderError> {
            Ok(self.spread)
        }
        async fn volume_24h(&self, _exchange: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
            Ok(self.volume)
        }
        async fn open_interest_change_24h(&self, _exchange: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
            match &self.oi_change {
                Ok(v) => Ok(*v),
                Err(OrderError::Unsupported(m)) => Err(OrderError::Unsupported(m.clone())),
                Err(_) => Err(OrderError::Network("boom".into())),
            }
        }
    }

    fn healthy_market() -> FakeMarket {
        FakeMarket {
            funding_rate: 0.0005,
            history: Ok(vec![0.0002; 21]),
            spread: 0.0001,
            volume: 10_000_000.0,
            oi_change: Ok(0.0),
        }
    }

    #[tokio::test]
    async fn approves_a_healthy_pair() {
        let tiers = TierRegistry::new();
        let validator = PairValidator::new(&tiers);
        let market = healthy_market();
        let report = validator.validate(&market, "bitget", "BTC/USDT", "BTC/USDT:USDT").await;
        assert!(report.approved, "{:?}", report.reasons);
    }

    #[tokio::test]
    async fn blacklisted_symbol_is_vetoed_immediately() {
        let tiers = TierRegistry::new();
        let validator = PairValidator::new(&tiers);
        let market = healthy_market();
        let report = validator.validate(&market, "bitget", "ATOM/USDT", "ATOM/USDT:USDT").await;
        assert!(!report.approved);
    }

    #[tokio::test]
    async fn empty_funding_history_is_blocking() {
        let tiers = TierRegistry::new();
        let validator = PairValidator::new(&tiers);
        let mut market = healthy_market();
        market.history = Ok(vec![]);
        let report = validator.validate(&market, "bitget", "BTC/USDT", "BTC/USDT:USDT").await;
        assert!(!report.approved);
        assert!(report.reasons.iter().any(|r| r.contains("no funding history")));
    }

    #[tokio::test]
    async fn unsupported_oi_endpoint_is_non_blocking() {
        let tiers = TierRegistry::new();
        let validator = PairValidator::new(&tiers);
        let mut market = healthy_market();
        market.oi_change = Err(OrderError::Unsupported("no OI endpoint".into()));
        let report = validator.validate(&market, "bitget", "BTC/USDT", "BTC/USDT:USDT").await;
        assert!(report.approved, "{:?}", report.reasons);
        assert!(report.reasons.iter().any(|r| r.contains("unsupported")));
    }

    #[tokio::test]
    async fn spread_above_max_is_blocking() {
        let tiers = TierRegistry::new();
        let validator = PairValidator::new(&tiers);
        let mut market = healthy_market();
        market.spread = 0.001;
        let report = validator.validate(&market, "bitget", "BTC/USDT", "BTC/USDT:USDT").await;
        assert!(!report.approved);
    }
}
