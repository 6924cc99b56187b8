//! Exchange proxy seam
//!
//! The chain proxy answers per-exchange validation questions and publishes
//! on-chain fill and cancel notifications. The relay only consumes it through
//! [`ExchangeProxy`]; [`DummyExchangeProxy`] stands in for tests and local runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use types::order::Order;
use types::{B256, U256};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Chain endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("Contract call failed: {0}")]
    Call(String),
}

/// On-chain notification about (part of) an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    Fill {
        order_hash: B256,
        maker_amount: U256,
        taker_amount: U256,
    },
    Cancel {
        order_hash: B256,
        maker_amount: U256,
        taker_amount: U256,
    },
}

impl ExchangeEvent {
    pub fn order_hash(&self) -> B256 {
        match self {
            Self::Fill { order_hash, .. } | Self::Cancel { order_hash, .. } => *order_hash,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fill { .. } => "fill",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Exchange-specific validation capability and event source.
#[async_trait]
pub trait ExchangeProxy: Send + Sync {
    /// Whether the maker holds and has approved enough of the maker token.
    async fn funds_are_sufficient(&self, order: &Order) -> Result<bool, ProxyError>;

    /// Whether the amount already filled on-chain leaves the order fillable.
    async fn fill_amount_is_consistent(&self, order: &Order) -> Result<bool, ProxyError>;

    /// New receiver for this exchange's fill and cancel notifications.
    fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent>;
}

const EVENT_CAPACITY: usize = 1024;

/// Scriptable proxy. Accepts everything until told otherwise.
pub struct DummyExchangeProxy {
    funds_sufficient: AtomicBool,
    fill_consistent: AtomicBool,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
    events: broadcast::Sender<ExchangeEvent>,
}

impl DummyExchangeProxy {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            funds_sufficient: AtomicBool::new(true),
            fill_consistent: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            events,
        }
    }

    pub fn set_funds_sufficient(&self, verdict: bool) {
        self.funds_sufficient.store(verdict, Ordering::SeqCst);
    }

    pub fn set_fill_consistent(&self, verdict: bool) {
        self.fill_consistent.store(verdict, Ordering::SeqCst);
    }

    /// Make every capability call fail with [`ProxyError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every capability call.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Publish an event to current subscribers. Returns how many received it.
    pub fn emit(&self, event: ExchangeEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn emit_fill(&self, order_hash: B256, maker_amount: U256, taker_amount: U256) -> usize {
        self.emit(ExchangeEvent::Fill {
            order_hash,
            maker_amount,
            taker_amount,
        })
    }

    pub fn emit_cancel(&self, order_hash: B256, maker_amount: U256, taker_amount: U256) -> usize {
        self.emit(ExchangeEvent::Cancel {
            order_hash,
            maker_amount,
            taker_amount,
        })
    }

    async fn answer(&self, verdict: &AtomicBool) -> Result<bool, ProxyError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProxyError::Unavailable("dummy proxy switched off".into()));
        }
        Ok(verdict.load(Ordering::SeqCst))
    }
}

impl Default for DummyExchangeProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeProxy for DummyExchangeProxy {
    async fn funds_are_sufficient(&self, _order: &Order) -> Result<bool, ProxyError> {
        self.answer(&self.funds_sufficient).await
    }

    async fn fill_amount_is_consistent(&self, _order: &Order) -> Result<bool, ProxyError> {
        self.answer(&self.fill_consistent).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::testing::{exchange, token, OrderBuilder};

    fn order() -> Order {
        OrderBuilder::new(exchange(), token(1), token(2)).unsigned()
    }

    #[tokio::test]
    async fn test_dummy_accepts_by_default() {
        let proxy = DummyExchangeProxy::new();
        assert_eq!(proxy.funds_are_sufficient(&order()).await, Ok(true));
        assert_eq!(proxy.fill_amount_is_consistent(&order()).await, Ok(true));
    }

    #[tokio::test]
    async fn test_dummy_verdicts_and_failure() {
        let proxy = DummyExchangeProxy::new();
        proxy.set_funds_sufficient(false);
        assert_eq!(proxy.funds_are_sufficient(&order()).await, Ok(false));
        assert_eq!(proxy.fill_amount_is_consistent(&order()).await, Ok(true));

        proxy.set_unavailable(true);
        assert!(matches!(
            proxy.fill_amount_is_consistent(&order()).await,
            Err(ProxyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let proxy = DummyExchangeProxy::new();
        assert_eq!(proxy.emit_fill(B256::ZERO, U256::from(1), U256::from(2)), 0);

        let mut events = proxy.subscribe();
        let hash = B256::repeat_byte(7);
        assert_eq!(proxy.emit_cancel(hash, U256::from(3), U256::from(4)), 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.order_hash(), hash);
        assert_eq!(event.kind(), "cancel");
    }
}
