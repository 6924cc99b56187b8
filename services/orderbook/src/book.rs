//! Order book coordinator
//!
//! Validates incoming orders against the trusted exchange set and the
//! exchange's own capability, then persists them through the guarded store.
//! Queries and mutations all go through [`SharedStore`], so every store
//! operation is serialized.
//!
//! Cloning an [`OrderBook`] is cheap; clones share the store, the registry
//! and the clock.

use std::sync::Arc;
use std::time::Duration;

use persistence::{BatchInsert, JournalConfig, OrderStore, SettlementUpdate};
use tracing::{debug, info, warn};
use types::address::NULL_ADDRESS;
use types::errors::InvalidReason;
use types::filter::{OrderFilter, TokenPair};
use types::order::Order;
use types::record::StoredOrder;
use types::{Address, B256, U256};

use crate::clock::{Clock, SystemClock};
use crate::error::OrderBookError;
use crate::guard::SharedStore;
use crate::proxy::{ExchangeProxy, ProxyError};
use crate::registry::ExchangeRegistry;

pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct OrderBook {
    store: SharedStore,
    registry: Arc<ExchangeRegistry>,
    clock: Arc<dyn Clock>,
    validation_timeout: Duration,
}

impl OrderBook {
    pub fn new(store: OrderStore) -> Self {
        Self::from_shared(SharedStore::new(store))
    }

    pub fn from_shared(store: SharedStore) -> Self {
        Self {
            store,
            registry: Arc::new(ExchangeRegistry::new()),
            clock: Arc::new(SystemClock),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }

    /// Open the store at `journal.dir` and wrap it in a book.
    pub fn open(journal: JournalConfig) -> Result<Self, OrderBookError> {
        Ok(Self::new(OrderStore::open(journal)?))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound for each exchange capability call.
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // ── Exchanges ───────────────────────────────────────────────────

    pub fn register_exchange(&self, exchange: Address, proxy: Arc<dyn ExchangeProxy>) {
        self.registry.register(exchange, proxy);
    }

    pub fn is_registered(&self, exchange: &Address) -> bool {
        self.registry.contains(exchange)
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Full validation with the reason for a refusal.
    ///
    /// Cheap local checks run first; the exchange capability is only asked
    /// about orders that pass them.
    pub async fn check(&self, order: &Order) -> Result<(), OrderBookError> {
        let hash = order.hash();
        let reject = |reason| Err(OrderBookError::invalid(hash, reason));

        if !order.validate_signature() {
            return reject(InvalidReason::BadSignature);
        }
        if !order.validate_addresses() {
            return reject(InvalidReason::AddressNotChecksummed);
        }

        let exchange = order.exchange_address.address();
        let Some(proxy) = self.registry.get(&exchange) else {
            return reject(InvalidReason::UnknownExchange {
                exchange: order.exchange_address.to_checksum(),
            });
        };

        if order.taker_address != NULL_ADDRESS {
            return reject(InvalidReason::TakerNotNull);
        }
        if order.fee_recipient != NULL_ADDRESS {
            return reject(InvalidReason::FeeRecipientNotNull);
        }

        let now = self.clock.now();
        if order.is_expired(now) {
            return reject(InvalidReason::Expired {
                expiration: order.expiration_timestamp_in_sec,
                now,
            });
        }

        let funds = self
            .ask_capability(exchange, proxy.funds_are_sufficient(order))
            .await?;
        if !funds {
            return reject(InvalidReason::InsufficientFunds);
        }

        let consistent = self
            .ask_capability(exchange, proxy.fill_amount_is_consistent(order))
            .await?;
        if !consistent {
            return reject(InvalidReason::InconsistentFillAmount);
        }

        Ok(())
    }

    /// Whether the order may enter the book.
    ///
    /// A capability that fails or times out counts as a refusal.
    pub async fn validate(&self, order: &Order) -> bool {
        match self.check(order).await {
            Ok(()) => true,
            Err(err) => {
                debug!(hash = %order.hash(), error = %err, "Order failed validation");
                false
            }
        }
    }

    async fn ask_capability(
        &self,
        exchange: Address,
        call: impl std::future::Future<Output = Result<bool, ProxyError>>,
    ) -> Result<bool, OrderBookError> {
        match tokio::time::timeout(self.validation_timeout, call).await {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(err)) => {
                warn!(exchange = %exchange, error = %err, "Exchange capability failed");
                Err(OrderBookError::ValidationCapabilityUnavailable {
                    exchange,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    exchange = %exchange,
                    timeout_ms = self.validation_timeout.as_millis() as u64,
                    "Exchange capability timed out"
                );
                Err(OrderBookError::ValidationCapabilityUnavailable {
                    exchange,
                    reason: format!("timed out after {:?}", self.validation_timeout),
                })
            }
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Validate and store one order.
    ///
    /// Returns `false` when the order was already in the book.
    pub async fn add_order(&self, order: Order) -> Result<bool, OrderBookError> {
        self.check(&order).await?;
        let hash = order.hash();
        let inserted = self.store.with(|store| store.insert(order)).await?;
        info!(hash = %hash, inserted, "Order added");
        Ok(inserted)
    }

    /// Validate every order, then store them all.
    ///
    /// Nothing is stored unless every order is valid. Storage is per-order
    /// idempotent; if an individual write fails the remaining orders are
    /// still stored and the first failure is returned.
    pub async fn add_orders(&self, orders: Vec<Order>) -> Result<BatchInsert, OrderBookError> {
        for order in &orders {
            self.check(order).await?;
        }

        let count = orders.len();
        let mut outcome = self.store.with(|store| store.insert_batch(orders)).await;
        info!(
            count,
            inserted = outcome.inserted.len(),
            duplicates = outcome.duplicates.len(),
            failed = outcome.failed.len(),
            "Order batch added"
        );

        if outcome.failed.is_empty() {
            Ok(outcome)
        } else {
            let (_, err) = outcome.failed.swap_remove(0);
            Err(err.into())
        }
    }

    pub async fn delete_order(&self, order: &Order) -> Result<bool, OrderBookError> {
        self.delete_order_by_hash(&order.hash()).await
    }

    pub async fn delete_order_by_hash(&self, hash: &B256) -> Result<bool, OrderBookError> {
        Ok(self.store.with(|store| store.delete_by_hash(hash)).await?)
    }

    pub async fn order_filled(
        &self,
        hash: &B256,
        maker_amount: U256,
        taker_amount: U256,
    ) -> Result<SettlementUpdate, OrderBookError> {
        Ok(self
            .store
            .with(|store| store.apply_fill(hash, maker_amount, taker_amount))
            .await?)
    }

    pub async fn order_cancelled(
        &self,
        hash: &B256,
        maker_amount: U256,
        taker_amount: U256,
    ) -> Result<SettlementUpdate, OrderBookError> {
        Ok(self
            .store
            .with(|store| store.apply_cancel(hash, maker_amount, taker_amount))
            .await?)
    }

    /// Drop every order that expired before `cutoff`.
    pub async fn purge_expired(&self, cutoff: u64) -> Result<usize, OrderBookError> {
        Ok(self.store.with(|store| store.purge_expired(cutoff)).await?)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Orders selling `pair.base` for `pair.quote`, cheapest first.
    pub async fn get_asks(&self, pair: TokenPair) -> Vec<StoredOrder> {
        self.store
            .with(|store| store.query_by_token_pair(pair.base, pair.quote, false))
            .await
    }

    /// Orders selling `pair.quote` for `pair.base`, highest price first.
    pub async fn get_bids(&self, pair: TokenPair) -> Vec<StoredOrder> {
        let reversed = pair.reversed();
        self.store
            .with(|store| store.query_by_token_pair(reversed.base, reversed.quote, true))
            .await
    }

    pub async fn get_order_by_hash(&self, hash: &B256) -> Option<StoredOrder> {
        self.store
            .with(|store| store.get_by_hash(hash).cloned())
            .await
    }

    pub async fn get_orders(&self, filter: &OrderFilter) -> Vec<StoredOrder> {
        self.store.with(|store| store.query(filter)).await
    }
}
