use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::models::{FundingEntry, OrderBookSnapshot, Position};

const POSITION_TTL_SECONDS: usize = 7 * 86400;
const BASIS_TTL_SECONDS: usize = 86400;
const TRADE_HISTORY_KEY: &str = "trade_history";

/// The persistent key/value store boundary: latest-only order book and
/// funding entries, TTL'd open positions, an append-only trade history list,
/// and basis samples. Grounded on `redis_cache.py`'s key contract.
#[async_trait]
pub trait StorePort: Send + Sync {
    async fn set_latest_book(&self, book: &OrderBookSnapshot) -> Result<(), StoreError>;
    async fn get_latest_book(&self, exchange: &str, symbol: &str) -> Result<Option<OrderBookSnapshot>, StoreError>;

    async fn set_funding(&self, entry: &FundingEntry) -> Result<(), StoreError>;
    async fn get_funding(&self, exchange: &str, symbol: &str) -> Result<Option<FundingEntry>, StoreError>;

    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;
    async fn get_position(&self, exchange: &str, symbol: &str) -> Result<Option<Position>, StoreError>;
    async fn delete_position(&self, exchange: &str, symbol: &str) -> Result<(), StoreError>;
    async fn list_positions(&self, exchange: Option<&str>) -> Result<Vec<Position>, StoreError>;

    async fn append_trade_history(&self, position: &Position) -> Result<(), StoreError>;
    async fn trade_history(&self) -> Result<Vec<Position>, StoreError>;

    async fn set_basis(&self, exchange: &str, symbol: &str, unix_seconds: i64, basis_pct: f64) -> Result<(), StoreError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;
}

fn latest_key(exchange: &str, symbol: &str) -> String {
    format!("latest:{exchange}:{symbol}")
}

fn funding_key(exchange: &str, symbol: &str) -> String {
    format!("funding:{exchange}:{symbol}")
}

fn position_key(exchange: &str, symbol: &str) -> String {
    format!("position:{exchange}:{symbol}")
}

fn basis_key(exchange: &str, symbol: &str, unix_seconds: i64) -> String {
    format!("basis:{exchange}:{symbol}:{unix_seconds}")
}

/// Redis-backed implementation, grounded on the teacher's `publisher.rs`
/// redis connection-manager usage and `redis_cache.py`'s method surface.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::from)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::Connection, StoreError> {
        self.client.get_async_connection().await.map_err(StoreError::from)
    }
}

#[async_trait]
impl StorePort for RedisStore {
    async fn set_latest_book(&self, book: &OrderBookSnapshot) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = book.to_json()?;
        conn.set::<_, _, ()>(latest_key(&book.exchange, &book.symbol), payload).await.map_err(StoreError::from)
    }

    async fn get_latest_book(&self, exchange: &str, symbol: &str) -> Result<Option<OrderBookSnapshot>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(latest_key(exchange, symbol)).await.map_err(StoreError::from)?;
        raw.map(|r| OrderBookSnapshot::from_json(&r)).transpose()
    }

    async fn set_funding(&self, entry: &FundingEntry) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = entry.to_json()?;
        conn.set::<_, _, ()>(funding_key(&entry.exchange, &entry.spot_symbol), payload)
            .await
            .map_err(StoreError::from)
    }

    async fn get_funding(&self, exchange: &str, symbol: &str) -> Result<Option<FundingEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(funding_key(exchange, symbol)).await.map_err(StoreError::from)?;
        raw.map(|r| FundingEntry::from_json(&r)).transpose()
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        if position.status.is_open() {
            let mut conn = self.conn().await?;
            let payload = position.to_json()?;
            conn.set_ex::<_, _, ()>(position.redis_key(), payload, POSITION_TTL_SECONDS)
                .await
                .map_err(StoreError::from)
        } else {
            self.delete_position(&position.exchange, &position.symbol).await?;
            self.append_trade_history(position).await
        }
    }

    async fn get_position(&self, exchange: &str, symbol: &str) -> Result<Option<Position>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(position_key(exchange, symbol)).await.map_err(StoreError::from)?;
        raw.map(|r| Position::from_json(&r)).transpose()
    }

    async fn delete_position(&self, exchange: &str, symbol: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(position_key(exchange, symbol)).await.map_err(StoreError::from)
    }

    async fn list_positions(&self, exchange: Option<&str>) -> Result<Vec<Position>, StoreError> {
        let mut conn = self.conn().await?;
        let pattern = match exchange {
            Some(ex) => format!("position:{ex}:*"),
            None => "position:*".to_string(),
        };
        let keys: Vec<String> = conn.keys(pattern).await.map_err(StoreError::from)?;
        let mut positions = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await.map_err(StoreError::from)?;
            if let Some(raw) = raw {
                positions.push(Position::from_json(&raw)?);
            }
        }
        Ok(positions)
    }

    async fn append_trade_history(&self, position: &Position) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = position.to_json()?;
        conn.rpush::<_, _, ()>(TRADE_HISTORY_KEY, payload).await.map_err(StoreError::from)
    }

    async fn trade_history(&self) -> Result<Vec<Position>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(TRADE_HISTORY_KEY, 0, -1).await.map_err(StoreError::from)?;
        raw.iter().map(|r| Position::from_json(r)).collect()
    }

    async fn set_basis(&self, exchange: &str, symbol: &str, unix_seconds: i64, basis_pct: f64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(basis_key(exchange, symbol, unix_seconds), basis_pct.to_string(), BASIS_TTL_SECONDS)
            .await
            .map_err(StoreError::from)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.publish::<_, _, ()>(channel, payload).await.map_err(StoreError::from)
    }
}

/// In-memory implementation used by tests and paper-only runs, exercising
/// the exact same key-shape contract without a running Redis instance.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStore {
        latest_books: Mutex<HashMap<String, OrderBookSnapshot>>,
        funding: Mutex<HashMap<String, FundingEntry>>,
        positions: Mutex<HashMap<String, Position>>,
        history: Mutex<Vec<Position>>,
        basis: Mutex<HashMap<String, f64>>,
        published: Mutex<Vec<(String, String)>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn published_messages(&self) -> Vec<(String, String)> {
            self.published.lock().await.clone()
        }
    }

    #[async_trait]
    impl StorePort for InMemoryStore {
        async fn set_latest_book(&self, book: &OrderBookSnapshot) -> Result<(), StoreError> {
            self.latest_books.lock().await.insert(latest_key(&book.exchange, &book.symbol), book.clone());
            Ok(())
        }

        async fn get_latest_book(&self, exchange: &str, symbol: &str) -> Result<Option<OrderBookSnapshot>, StoreError> {
            Ok(self.latest_books.lock().await.get(&latest_key(exchange, symbol)).cloned())
        }

        async fn set_funding(&self, entry: &FundingEntry) -> Result<(), StoreError> {
            self.funding.lock().await.insert(funding_key(&entry.exchange, &entry.spot_symbol), entry.clone());
            Ok(())
        }

        async fn get_funding(&self, exchange: &str, symbol: &str) -> Result<Option<FundingEntry>, StoreError> {
            Ok(self.funding.lock().await.get(&funding_key(exchange, symbol)).cloned())
        }

        async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
            if position.status.is_open() {
                self.positions.lock().await.insert(position.redis_key(), position.clone());
            } else {
                self.delete_position(&position.exchange, &position.symbol).await?;
                self.append_trade_history(position).await?;
            }
            Ok(())
        }

        async fn get_position(&self, exchange: &str, symbol: &str) -> Result<Option<Position>, StoreError> {
            Ok(self.positions.lock().await.get(&position_key(exchange, symbol)).cloned())
        }

        async fn delete_position(&self, exchange: &str, symbol: &str) -> Result<(), StoreError> {
            self.positions.lock().await.remove(&position_key(exchange, symbol));
            Ok(())
        }

        async fn list_positions(&self, exchange: Option<&str>) -> Result<Vec<Position>, StoreError> {
            let guard = self.positions.lock().await;
            Ok(guard
                .values()
                .filter(|p| exchange.map(|ex| p.exchange == ex).unwrap_or(true))
                .cloned()
                .collect())
        }

        async fn append_trade_history(&self, position: &Position) -> Result<(), StoreError> {
            self.history.lock().await.push(position.clone());
            Ok(())
        }

        async fn trade_history(&self) -> Result<Vec<Position>, StoreError> {
            Ok(self.history.lock().await.clone())
        }

        async fn set_basis(&self, exchange: &str, symbol: &str, unix_seconds: i64, basis_pct: f64) -> Result<(), StoreError> {
            self.basis.lock().await.insert(basis_key(exchange, symbol, unix_seconds), basis_pct);
            Ok(())
        }

        async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
            self.published.lock().await.push((channel.to_string(), payload.to_string()));
            Ok(())
        }
    }
}
