//! Order table persistence for the relay
//!
//! Provides the append-only journal, sequential replay with corruption
//! detection, the persisted row layout and the [`OrderStore`] built on them.
//!
//! # Guarantees
//! - Every store mutation is journaled before the in-memory table changes
//! - With the default [`JournalConfig`], each mutation is fsynced before returning
//! - A torn final entry (crash mid-append) is truncated on open
//! - Corruption anywhere else fails the open

pub mod journal;
pub mod reader;
pub mod row;
pub mod store;

pub use journal::{FlushPolicy, FsyncPolicy, JournalConfig};
pub use store::{BatchInsert, OrderStore, SettlementUpdate, StoreError};
