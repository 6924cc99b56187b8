//! Order book coordinator for the order relay
//!
//! Accepts signed orders, validates them against the trusted exchanges and
//! keeps the stored book consistent with on-chain fills, cancels and the
//! wall clock.
//!
//! # Architecture
//!
//! ```text
//!  client orders            exchange proxies (fill / cancel events)
//!       │                              │
//!  ┌────▼─────┐                 ┌──────▼──────┐
//!  │OrderBook │◄────────────────┤ Reconciler  │◄── purge timer
//!  │ validate │                 └─────────────┘
//!  └────┬─────┘
//!       │  every store operation under one lock
//!  ┌────▼────────┐
//!  │ SharedStore │
//!  └────┬────────┘
//!  ┌────▼───────┐
//!  │ OrderStore │  journaled order table
//!  └────────────┘
//! ```

pub mod book;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod proxy;
pub mod reconciler;
pub mod registry;

pub use book::OrderBook;
pub use error::OrderBookError;
pub use guard::SharedStore;
pub use proxy::{DummyExchangeProxy, ExchangeEvent, ExchangeProxy, ProxyError};
pub use reconciler::Reconciler;
