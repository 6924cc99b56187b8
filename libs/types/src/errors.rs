//! Error types for the order model
//!
//! Construction errors are raised while turning untrusted text into an
//! [`Order`](crate::order::Order). Validation never errors: it yields an
//! [`InvalidReason`] that the order book wraps into its own error.

use thiserror::Error;

/// Failure to build an order from wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderParseError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed order document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for OrderParseError {
    fn from(err: serde_json::Error) -> Self {
        OrderParseError::Json(err.to_string())
    }
}

/// Why an otherwise well-formed order is refused by the relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("signature does not recover to the maker address")]
    BadSignature,

    #[error("address not in checksummed form")]
    AddressNotChecksummed,

    #[error("exchange {exchange} is not registered")]
    UnknownExchange { exchange: String },

    #[error("taker address must be the null address")]
    TakerNotNull,

    #[error("fee recipient must be the null address")]
    FeeRecipientNotNull,

    #[error("order expired at {expiration}, now {now}")]
    Expired { expiration: u64, now: u64 },

    #[error("maker funds are insufficient")]
    InsufficientFunds,

    #[error("filled amount on the exchange is inconsistent with the order")]
    InconsistentFillAmount,
}
