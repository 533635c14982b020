/// Static capital/tier/fee tables, ported from `tier_config.py`. An open set
/// in principle (`tier_3` anticipated per spec design notes) — modeled as an
/// ordered collection searched by symbol rather than hard-coded branches.
#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub name: &'static str,
    pub symbols: &'static [&'static str],
    pub capital_total: f64,
    pub size_per_pair: f64,
    pub max_pairs_open: usize,
    pub min_funding_rate: f64,
    pub stop_loss_fraction: f64,
    pub delta_alert_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub spot: f64,
    pub perp_maker: f64,
    pub perp_taker: f64,
}

/// Fallback applied when an exchange has no entry in the fee table.
pub const DEFAULT_FEE_SCHEDULE: FeeSchedule = FeeSchedule {
    spot: 0.001,
    perp_maker: 0.0005,
    perp_taker: 0.001,
};

const TIER_1: Tier = Tier {
    name: "tier_1",
    symbols: &["BTC/USDT", "ETH/USDT", "SOL/USDT", "XRP/USDT"],
    capital_total: 1260.0,
    size_per_pair: 315.0,
    max_pairs_open: 4,
    min_funding_rate: 0.00008,
    stop_loss_fraction: 0.005,
    delta_alert_fraction: 0.02,
};

const TIER_2: Tier = Tier {
    name: "tier_2",
    symbols: &["WLD/USDT", "NEAR/USDT", "AVAX/USDT"],
    capital_total: 360.0,
    size_per_pair: 180.0,
    max_pairs_open: 2,
    min_funding_rate: 0.00015,
    stop_loss_fraction: 0.005,
    delta_alert_fraction: 0.02,
};

const TIERS: &[Tier] = &[TIER_1, TIER_2];

const BLACKLIST: &[&str] = &["ATOM/USDT", "DOT/USDT", "OP/USDT", "AAVE/USDT"];

fn fee_schedule_for(exchange: &str) -> FeeSchedule {
    match exchange {
        "bitget" => FeeSchedule { spot: 0.001, perp_maker: 0.0002, perp_taker: 0.0006 },
        "okx" => FeeSchedule { spot: 0.001, perp_maker: 0.0002, perp_taker: 0.0005 },
        "mexc" => FeeSchedule { spot: 0.0002, perp_maker: 0.0, perp_taker: 0.0006 },
        _ => DEFAULT_FEE_SCHEDULE,
    }
}

/// Static symbol->tier lookup and fee table, with no mutable state of its own.
pub struct TierRegistry {
    tiers: &'static [Tier],
    blacklist: &'static [&'static str],
}

impl Default for TierRegistry {
    fn default() -> Self {
        Self { tiers: TIERS, blacklist: BLACKLIST }
    }
}

impl TierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        self.blacklist.contains(&symbol)
    }

    /// Blacklist wins; otherwise first tier (in declaration order) containing the symbol.
    pub fn tier_for(&self, symbol: &str) -> Option<&'static Tier> {
        if self.is_blacklisted(symbol) {
            return None;
        }
        self.tiers.iter().find(|t| t.symbols.contains(&symbol))
    }

    pub fn tier_by_name(&self, name: &str) -> Option<&'static Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    pub fn fees_for(&self, exchange: &str) -> FeeSchedule {
        fee_schedule_for(exchange)
    }

    pub fn all_tier_symbols(&self) -> Vec<&'static str> {
        self.tiers.iter().flat_map(|t| t.symbols.iter().copied()).collect()
    }

    pub fn tiers(&self) -> &'static [Tier] {
        self.tiers
    }
}
