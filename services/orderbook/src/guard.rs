//! Concurrency guard around the order store
//!
//! One async mutex per store instance. Every store operation runs inside it,
//! so all mutations against a store are totally ordered. Composite operations
//! take the lock once and run as a closure over the locked store instead of
//! re-acquiring it.

use std::sync::Arc;

use persistence::OrderStore;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<OrderStore>>,
}

impl SharedStore {
    pub fn new(store: OrderStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `op` with exclusive access to the store.
    ///
    /// The lock is released when `op` returns, panics included.
    pub async fn with<R>(&self, op: impl FnOnce(&mut OrderStore) -> R) -> R {
        let mut store = self.inner.lock().await;
        op(&mut store)
    }

    pub async fn lock(&self) -> MutexGuard<'_, OrderStore> {
        self.inner.lock().await
    }
}
