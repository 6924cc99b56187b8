//! Error types for the order book coordinator.

use persistence::StoreError;
use thiserror::Error;
use types::errors::InvalidReason;
use types::{Address, B256};

#[derive(Error, Debug)]
pub enum OrderBookError {
    #[error("Order {hash} rejected: {reason}")]
    OrderInvalid { hash: B256, reason: InvalidReason },

    #[error("Validation capability of exchange {exchange} unavailable: {reason}")]
    ValidationCapabilityUnavailable { exchange: Address, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrderBookError {
    pub fn invalid(hash: B256, reason: InvalidReason) -> Self {
        Self::OrderInvalid { hash, reason }
    }

    /// The reason an order was refused, if this is a rejection.
    pub fn invalid_reason(&self) -> Option<&InvalidReason> {
        match self {
            Self::OrderInvalid { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ValidationCapabilityUnavailable { .. })
    }
}
