//! Types library for the order relay
//!
//! Defines the signed order model shared by the store and the order book:
//! the canonical order hash, signature recovery, address well-formedness,
//! exact prices and the stored record with its fill/cancel counters.
//!
//! # Modules
//! - `address`: addresses that remember whether they were checksummed
//! - `signature`: `(v, r, s)` signatures and signer recovery
//! - `order`: the signed order and its identity hash
//! - `price`: exact rational prices
//! - `record`: stored orders with fill/cancel counters
//! - `filter`: query predicates and token pairs
//! - `errors`: error taxonomy

pub mod address;
pub mod errors;
pub mod filter;
pub mod order;
pub mod price;
pub mod record;
pub mod signature;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use alloy_primitives::{Address, B256, U256};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::*;
    pub use crate::errors::*;
    pub use crate::filter::*;
    pub use crate::order::Order;
    pub use crate::price::*;
    pub use crate::record::*;
    pub use crate::signature::*;
    pub use alloy_primitives::{Address, B256, U256};
}
