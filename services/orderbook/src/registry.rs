//! Trusted exchange registry
//!
//! Maps exchange contract addresses to their proxies. Orders for any other
//! exchange are refused. A running reconciler attaches a listener; each
//! registration then subscribes to the proxy's events inside the registry
//! lock, so no registration is missed between a snapshot and the listener.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::info;
use types::Address;

use crate::proxy::{ExchangeEvent, ExchangeProxy};

/// Event subscription handed to the reconciler for one registered exchange.
pub struct Attachment {
    pub exchange: Address,
    pub events: broadcast::Receiver<ExchangeEvent>,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<Address, Arc<dyn ExchangeProxy>>,
    listener: Option<mpsc::UnboundedSender<Attachment>>,
}

#[derive(Default)]
pub struct ExchangeRegistry {
    inner: RwLock<Inner>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `exchange`, replacing any previous proxy for it.
    ///
    /// Returns `true` if the exchange was not registered before.
    pub fn register(&self, exchange: Address, proxy: Arc<dyn ExchangeProxy>) -> bool {
        let mut inner = self.write();
        if let Some(listener) = &inner.listener {
            let attachment = Attachment {
                exchange,
                events: proxy.subscribe(),
            };
            if listener.send(attachment).is_err() {
                inner.listener = None;
            }
        }
        let added = inner.exchanges.insert(exchange, proxy).is_none();
        info!(exchange = %exchange, added, "Exchange registered");
        added
    }

    pub fn get(&self, exchange: &Address) -> Option<Arc<dyn ExchangeProxy>> {
        self.read().exchanges.get(exchange).cloned()
    }

    pub fn contains(&self, exchange: &Address) -> bool {
        self.read().exchanges.contains_key(exchange)
    }

    /// Registered exchange addresses, sorted.
    pub fn exchanges(&self) -> Vec<Address> {
        let mut exchanges: Vec<Address> = self.read().exchanges.keys().copied().collect();
        exchanges.sort();
        exchanges
    }

    /// Subscribe to every registered exchange now and to every later registration.
    ///
    /// Replaces any previously attached listener.
    pub(crate) fn attach(&self) -> mpsc::UnboundedReceiver<Attachment> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.write();
        for (exchange, proxy) in &inner.exchanges {
            // rx is alive, send cannot fail
            let _ = tx.send(Attachment {
                exchange: *exchange,
                events: proxy.subscribe(),
            });
        }
        inner.listener = Some(tx);
        rx
    }

    pub(crate) fn detach(&self) {
        self.write().listener = None;
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::DummyExchangeProxy;
    use types::{B256, U256};

    fn proxy() -> Arc<DummyExchangeProxy> {
        Arc::new(DummyExchangeProxy::new())
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ExchangeRegistry::new();
        let exchange = Address::repeat_byte(0xEE);
        assert!(!registry.contains(&exchange));

        assert!(registry.register(exchange, proxy()));
        assert!(!registry.register(exchange, proxy()));
        assert!(registry.contains(&exchange));
        assert!(registry.get(&exchange).is_some());
        assert_eq!(registry.exchanges(), vec![exchange]);
    }

    #[tokio::test]
    async fn test_attach_covers_existing_and_later_registrations() {
        let registry = ExchangeRegistry::new();
        let early = proxy();
        registry.register(Address::repeat_byte(1), early.clone());

        let mut attachments = registry.attach();
        let late = proxy();
        registry.register(Address::repeat_byte(2), late.clone());

        let mut first = attachments.recv().await.unwrap();
        let mut second = attachments.recv().await.unwrap();
        assert_eq!(first.exchange, Address::repeat_byte(1));
        assert_eq!(second.exchange, Address::repeat_byte(2));

        // subscriptions exist as soon as the attachment is created
        early.emit_fill(B256::ZERO, U256::from(1), U256::from(1));
        late.emit_fill(B256::ZERO, U256::from(2), U256::from(2));
        assert!(first.events.recv().await.is_ok());
        assert!(second.events.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_detach_stops_attachments() {
        let registry = ExchangeRegistry::new();
        let mut attachments = registry.attach();
        registry.detach();
        registry.register(Address::repeat_byte(3), proxy());
        assert!(attachments.recv().await.is_none());
    }
}
