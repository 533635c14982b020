use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::Position;
use crate::store::StorePort;

/// Notification sink invoked by EntryController, ExitController and
/// DeltaMonitor. Grounded on the teacher's `publisher.rs` channel-prefix
/// convention; the original `notifications/email.py` sends the same three
/// event kinds over a different transport (email).
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn position_opened(&self, position: &Position) -> Result<(), StoreError>;
    async fn position_closed(&self, position: &Position) -> Result<(), StoreError>;
    async fn alert(&self, level: AlertLevel, message: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

/// Publishes JSON payloads on `notify:opened` / `notify:closed` / `notify:alert`.
pub struct RedisNotifier {
    store: Arc<dyn StorePort>,
}

impl RedisNotifier {
    pub fn new(store: Arc<dyn StorePort>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationPort for RedisNotifier {
    async fn position_opened(&self, position: &Position) -> Result<(), StoreError> {
        let payload = position.to_json()?;
        self.store.publish("notify:opened", &payload).await
    }

    async fn position_closed(&self, position: &Position) -> Result<(), StoreError> {
        let payload = position.to_json()?;
        self.store.publish("notify:closed", &payload).await
    }

    async fn alert(&self, level: AlertLevel, message: &str) -> Result<(), StoreError> {
        let payload = serde_json::json!({ "level": level.as_str(), "message": message }).to_string();
        self.store.publish("notify:alert", &payload).await
    }
}

/// No-op sink for tests and paper-only runs without a configured store.
pub struct NullNotifier;

#[async_trait]
impl NotificationPort for NullNotifier {
    async fn position_opened(&self, _position: &Position) -> Result<(), StoreError> {
        Ok(())
    }

    async fn position_closed(&self, _position: &Position) -> Result<(), StoreError> {
        Ok(())
    }

    async fn alert(&self, _level: AlertLevel, _message: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionStatus;
    use crate::store::memory::InMemoryStore;

    fn sample_position() -> Position {
        Position {
            exchange: "bitget".into(),
            symbol: "BTC/USDT".into(),
            perp_symbol: "BTC/USDT:USDT".into(),
            direction: "long_spot_short_perp".into(),
            status: PositionStatus::Open,
            size_usdt: 315.0,
            tier: Some("tier_1".into()),
            spot_entry_price: 50000.0,
            spot_quantity: 0.0063,
            spot_exit_price: None,
            perp_entry_price: 50010.0,
            perp_quantity: 0.0063,
            perp_exit_price: None,
            entry_funding_rate: 0.0005,
            entry_annualized_rate: 54.75,
            funding_collected: 0.0,
            last_funding_update: 0.0,
            opened_at: 0.0,
            closed_at: None,
            realized_pnl: 0.0,
            exit_reason: None,
            paper: true,
        }
    }

    #[tokio::test]
    async fn redis_notifier_publishes_on_opened_channel() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = RedisNotifier::new(store.clone());
        notifier.position_opened(&sample_position()).await.unwrap();
        let published = store.published_messages().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "notify:opened");
    }

    #[tokio::test]
    async fn null_notifier_is_always_ok() {
        let notifier = NullNotifier;
        assert!(notifier.alert(AlertLevel::Critical, "test").await.is_ok());
    }
}
