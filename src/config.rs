use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub total: f64,
    pub operative: f64,
    pub reserve_rebalance: f64,
    pub stable_buffer: f64,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self { total: 2000.0, operative: 1800.0, reserve_rebalance: 200.0, stable_buffer: 180.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub taker_fee_pct: f64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub paper_trading: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_min_entry_annualized_pct")]
    pub min_entry_annualized_pct: f64,
    #[serde(default = "default_min_exit_annualized_pct")]
    pub min_exit_annualized_pct: f64,
    #[serde(default = "default_max_positions_per_exchange")]
    pub max_positions_per_exchange: usize,
    #[serde(default = "default_max_total_positions")]
    pub max_total_positions: usize,
    #[serde(default)]
    pub exchanges: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_position_size_usdt")]
    pub position_size_usdt: f64,
}

fn default_check_interval() -> u64 {
    60
}
fn default_min_entry_annualized_pct() -> f64 {
    10.0
}
fn default_min_exit_annualized_pct() -> f64 {
    5.0
}
fn default_max_positions_per_exchange() -> usize {
    6
}
fn default_max_total_positions() -> usize {
    10
}
fn default_position_size_usdt() -> f64 {
    315.0
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            paper_trading: true,
            check_interval: default_check_interval(),
            min_entry_annualized_pct: default_min_entry_annualized_pct(),
            min_exit_annualized_pct: default_min_exit_annualized_pct(),
            max_positions_per_exchange: default_max_positions_per_exchange(),
            max_total_positions: default_max_total_positions(),
            exchanges: Vec::new(),
            symbols: Vec::new(),
            position_size_usdt: default_position_size_usdt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self { poll_interval: default_poll_interval() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub capital: CapitalConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl EngineConfig {
    /// Loads a YAML settings file, then applies `${VAR}` / `${VAR:-default}`
    /// environment overrides the same way `config.py::load_settings` does,
    /// reading process env (populated by `dotenvy` from a `.env` file if present).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let resolved = resolve_env_placeholders(&raw);
        let config: EngineConfig = serde_yaml::from_str(&resolved)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capital.operative > self.capital.total {
            return Err(ConfigError::Invalid(
                "capital.operative must not exceed capital.total".to_string(),
            ));
        }
        if self.trading.check_interval == 0 {
            return Err(ConfigError::Invalid("trading.check_interval must be > 0".to_string()));
        }
        Ok(())
    }

    /// `{ID}_API_KEY` / `{ID}_SECRET` / optional `{ID}_PASSWORD`, required only
    /// when `trading.paper_trading` is false.
    pub fn live_credentials(&self, exchange_id: &str) -> Option<(String, String, Option<String>)> {
        let prefix = exchange_id.to_uppercase();
        let key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
        let secret = std::env::var(format!("{prefix}_SECRET")).ok()?;
        let password = std::env::var(format!("{prefix}_PASSWORD")).ok();
        Some((key, secret, password))
    }
}

/// Resolves `${VAR}` and `${VAR:-default}` patterns against process
/// environment variables, mirroring `config.py`'s regex substitution.
fn resolve_env_placeholders(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = raw[i + 2..].find('}') {
                let inner = &raw[i + 2..i + 2 + end];
                let (var_name, default) = match inner.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (inner, None),
                };
                let resolved = std::env::var(var_name).ok().or_else(|| default.map(|d| d.to_string()));
                match resolved {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&raw[i..i + 2 + end + 1]),
                }
                i += 2 + end + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}
