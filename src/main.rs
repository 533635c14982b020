use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use xge_engine::config::EngineConfig;
use xge_engine::delta_monitor::DeltaMonitor;
use xge_engine::entry::EntryController;
use xge_engine::error::OrderError;
use xge_engine::execution::{LiveExecutionAdapter, OrderExecutionPort, PaperExecutionAdapter};
use xge_engine::exit::ExitController;
use xge_engine::market_data::MarketDataView;
use xge_engine::metrics::MetricsAggregator;
use xge_engine::models::Position;
use xge_engine::notify::{NotificationPort, NullNotifier, RedisNotifier};
use xge_engine::position_store::PositionStore;
use xge_engine::reserve_guard::ReserveGuard;
use xge_engine::runner::StrategyRunner;
use xge_engine::store::{RedisStore, StorePort};
use xge_engine::tier::TierRegistry;
use xge_engine::validator::MarketDataPort;

/// Market-data query surface backing `PairValidator`, implemented against
/// a generic REST exchange gateway. This is the out-of-scope "exchange
/// gateway" collaborator named in spec.md §1 — one concrete implementation
/// is provided so the binary runs end to end, grounded on the teacher's
/// `LiveExchange` reqwest client in spirit (`exchange.rs`).
struct RestMarketDataAdapter {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl RestMarketDataAdapter {
    fn new(base_url: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }
}

#[async_trait]
impl MarketDataPort for RestMarketDataAdapter {
    async fn current_funding_rate(&self, exchange: &str, perp_symbol: &str) -> Result<f64, OrderError> {
        let base = self.base_url.as_ref().ok_or_else(|| OrderError::Unsupported("no market data endpoint configured".to_string()))?;
        let url = format!("{base}/{exchange}/funding/{perp_symbol}");
        let resp = self.http.get(&url).send().await.map_err(|e| OrderError::Network(e.to_string()))?;
        let body: serde_json::Value = resp.json().await.map_err(|e| OrderError::Network(e.to_string()))?;
        body.get("funding_rate").and_then(|v| v.as_f64()).ok_or_else(|| OrderError::Unsupported("funding_rate missing".to_string()))
    }

    async fn funding_history_7d(&self, _exchange: &str, _perp_symbol: &str) -> Result<Vec<f64>, OrderError> {
        Err(OrderError::Unsupported("7-day funding history endpoint not configured".to_string()))
    }

    async fn spot_perp_spread(&self, _exchange: &str, _spot_symbol: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
        Err(OrderError::Unsupported("spot/perp spread endpoint not configured".to_string()))
    }

    async fn volume_24h(&self, _exchange: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
        Err(OrderError::Unsupported("24h volume endpoint not configured".to_string()))
    }

    async fn open_interest_change_24h(&self, _exchange: &str, _perp_symbol: &str) -> Result<f64, OrderError> {
        Err(OrderError::Unsupported("open interest endpoint not configured".to_string()))
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config_path = std::env::var("XGE_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = match EngineConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    if !config.trading.enabled {
        info!("trading.enabled=false; exiting");
        return;
    }

    let store: Arc<dyn StorePort> = match RedisStore::new(&config.redis_url) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("failed to connect to store at {}: {e}", config.redis_url);
            std::process::exit(1);
        }
    };

    let positions = Arc::new(PositionStore::new(
        store.clone(),
        config.trading.max_positions_per_exchange,
        config.trading.max_total_positions,
    ));

    let notifier: Arc<dyn NotificationPort> = if config.trading.paper_trading {
        Arc::new(NullNotifier)
    } else {
        Arc::new(RedisNotifier::new(store.clone()))
    };

    let execution: Arc<dyn OrderExecutionPort> = if config.trading.paper_trading {
        Arc::new(PaperExecutionAdapter::new(store.clone()))
    } else {
        let exchange_id = config.trading.exchanges.first().cloned().unwrap_or_default();
        let live_api_url = std::env::var("XGE_LIVE_API_URL").unwrap_or_else(|_| format!("https://api.{exchange_id}.com"));
        match config.live_credentials(&exchange_id) {
            Some((key, secret, _password)) => Arc::new(LiveExecutionAdapter::new(live_api_url, key, secret)),
            None => {
                eprintln!("live trading requires {}_API_KEY/{}_SECRET", exchange_id.to_uppercase(), exchange_id.to_uppercase());
                std::process::exit(1);
            }
        }
    };

    let market_query = RestMarketDataAdapter::new(std::env::var("XGE_MARKET_DATA_URL").ok());

    let entry = EntryController::new(
        MarketDataView::new(store.clone()),
        positions.clone(),
        execution.clone(),
        notifier.clone(),
        config.trading.clone(),
        config.capital.clone(),
        config.funding.poll_interval,
    );

    let delta_monitor = Arc::new(DeltaMonitor::new(MarketDataView::new(store.clone()), positions.clone(), execution.clone(), notifier.clone()));

    let exit = Arc::new(ExitController::new(
        MarketDataView::new(store.clone()),
        positions.clone(),
        execution.clone(),
        notifier.clone(),
        delta_monitor.clone(),
        config.trading.clone(),
        config.funding.poll_interval,
    ));

    let reserve_guard = ReserveGuard::new(positions.clone(), MarketDataView::new(store.clone()), exit.clone(), config.capital.clone());
    let metrics = MetricsAggregator::new(positions.clone(), config.capital.clone());

    let runner = StrategyRunner::new(
        entry,
        exit,
        reserve_guard,
        metrics,
        positions.clone(),
        config.trading.check_interval,
        config.trading.paper_trading,
    );

    let tiers = TierRegistry::new();
    let now = Position::now();
    runner.startup_reconcile(now, 7.0 * 86400.0, &tiers).await;

    let delta_monitor_task = tokio::spawn(async move {
        delta_monitor.run().await;
    });

    runner.run(&market_query, Position::now).await;

    warn!("strategy runner loop exited unexpectedly");
    delta_monitor_task.abort();
}
