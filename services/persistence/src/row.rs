//! Order table row layout
//!
//! One row per order keyed by its hash. Numbers are stored as decimal text,
//! addresses in checksummed form. The hash and the signature components are
//! stored as hex **without** the `0x` prefix, the layout earlier deployments
//! wrote; the prefix is stripped on save and re-added on load. The `price`
//! column is derived and ignored on load.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::address::ChecksumAddress;
use types::order::Order;
use types::record::StoredOrder;
use types::signature::EcSignature;
use types::{B256, U256};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Invalid value in column {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Stored hash {stored} does not match recomputed hash {computed}")]
    HashMismatch { stored: String, computed: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    /// Primary key
    pub hash: String,
    pub exchange_address: String,
    pub maker_address: String,
    pub taker_address: String,
    pub maker_token_address: String,
    pub taker_token_address: String,
    pub fee_recipient: String,
    pub maker_token_amount: String,
    pub taker_token_amount: String,
    pub maker_fee: String,
    pub taker_fee: String,
    pub price: Option<String>,
    pub expiration_timestamp_in_sec: u64,
    pub salt: String,
    pub v: u8,
    pub r: String,
    pub s: String,
    pub filled_maker_token_amount: String,
    pub filled_taker_token_amount: String,
    pub cancelled_maker_token_amount: String,
    pub cancelled_taker_token_amount: String,
}

/// Row key for an order hash.
pub fn hash_key(hash: &B256) -> String {
    strip_hex_prefix(&hash.to_string()).to_owned()
}

/// Parse a row key back into an order hash.
pub fn parse_hash_key(key: &str) -> Result<B256, RowError> {
    parse_hex32("hash", key)
}

fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x").unwrap_or(text)
}

fn add_hex_prefix(text: &str) -> String {
    format!("0x{text}")
}

fn parse_hex32(column: &'static str, value: &str) -> Result<B256, RowError> {
    if value.starts_with("0x") {
        return Err(invalid(column, value));
    }
    B256::from_str(&add_hex_prefix(value)).map_err(|_| invalid(column, value))
}

fn parse_address(column: &'static str, value: &str) -> Result<ChecksumAddress, RowError> {
    ChecksumAddress::parse(value).map_err(|_| invalid(column, value))
}

fn parse_number(column: &'static str, value: &str) -> Result<U256, RowError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(column, value));
    }
    U256::from_str(value).map_err(|_| invalid(column, value))
}

fn invalid(column: &'static str, value: &str) -> RowError {
    RowError::InvalidColumn {
        column,
        value: value.to_owned(),
    }
}

impl From<&StoredOrder> for OrderRow {
    fn from(record: &StoredOrder) -> Self {
        let order = &record.order;
        Self {
            hash: hash_key(&order.hash()),
            exchange_address: order.exchange_address.to_checksum(),
            maker_address: order.maker_address.to_checksum(),
            taker_address: order.taker_address.to_checksum(),
            maker_token_address: order.maker_token_address.to_checksum(),
            taker_token_address: order.taker_token_address.to_checksum(),
            fee_recipient: order.fee_recipient.to_checksum(),
            maker_token_amount: order.maker_token_amount.to_string(),
            taker_token_amount: order.taker_token_amount.to_string(),
            maker_fee: order.maker_fee.to_string(),
            taker_fee: order.taker_fee.to_string(),
            price: order.price().to_decimal().map(|p| p.normalize().to_string()),
            expiration_timestamp_in_sec: order.expiration_timestamp_in_sec,
            salt: order.salt.to_string(),
            v: order.ec_signature.v,
            r: strip_hex_prefix(&order.ec_signature.r.to_string()).to_owned(),
            s: strip_hex_prefix(&order.ec_signature.s.to_string()).to_owned(),
            filled_maker_token_amount: record.filled_maker_token_amount.to_string(),
            filled_taker_token_amount: record.filled_taker_token_amount.to_string(),
            cancelled_maker_token_amount: record.cancelled_maker_token_amount.to_string(),
            cancelled_taker_token_amount: record.cancelled_taker_token_amount.to_string(),
        }
    }
}

impl TryFrom<OrderRow> for StoredOrder {
    type Error = RowError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order = Order {
            exchange_address: parse_address("exchange_address", &row.exchange_address)?,
            maker_address: parse_address("maker_address", &row.maker_address)?,
            taker_address: parse_address("taker_address", &row.taker_address)?,
            maker_token_address: parse_address("maker_token_address", &row.maker_token_address)?,
            taker_token_address: parse_address("taker_token_address", &row.taker_token_address)?,
            fee_recipient: parse_address("fee_recipient", &row.fee_recipient)?,
            maker_token_amount: parse_number("maker_token_amount", &row.maker_token_amount)?,
            taker_token_amount: parse_number("taker_token_amount", &row.taker_token_amount)?,
            maker_fee: parse_number("maker_fee", &row.maker_fee)?,
            taker_fee: parse_number("taker_fee", &row.taker_fee)?,
            expiration_timestamp_in_sec: row.expiration_timestamp_in_sec,
            salt: parse_number("salt", &row.salt)?,
            ec_signature: EcSignature::new(
                row.v,
                parse_hex32("r", &row.r)?,
                parse_hex32("s", &row.s)?,
            ),
        };

        let stored = parse_hash_key(&row.hash)?;
        let computed = order.hash();
        if stored != computed {
            return Err(RowError::HashMismatch {
                stored: row.hash,
                computed: hash_key(&computed),
            });
        }

        Ok(StoredOrder {
            order,
            filled_maker_token_amount: parse_number(
                "filled_maker_token_amount",
                &row.filled_maker_token_amount,
            )?,
            filled_taker_token_amount: parse_number(
                "filled_taker_token_amount",
                &row.filled_taker_token_amount,
            )?,
            cancelled_maker_token_amount: parse_number(
                "cancelled_maker_token_amount",
                &row.cancelled_maker_token_amount,
            )?,
            cancelled_taker_token_amount: parse_number(
                "cancelled_taker_token_amount",
                &row.cancelled_taker_token_amount,
            )?,
        })
    }
}
