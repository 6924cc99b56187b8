//! Signed exchange orders
//!
//! An [`Order`] is immutable once signed. Its identity is the keccak-256 hash
//! of the tightly packed order tuple, which is also the message the maker
//! signs. Signature fields are excluded from the hash.
//!
//! # Hashed layout
//! ```text
//! exchange | maker | taker | makerToken | takerToken | feeRecipient   (20 bytes each)
//! makerAmount | takerAmount | makerFee | takerFee | expiration | salt (32 bytes each, big-endian)
//! ```

use std::hash::{Hash, Hasher};

use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};

use crate::address::ChecksumAddress;
use crate::errors::OrderParseError;
use crate::price::Price;
use crate::signature::{signing_digest, EcSignature};

const PACKED_LEN: usize = 6 * 20 + 6 * 32;

/// Complete signed order as relayed to takers.
///
/// Serializes to the exchange's camelCase JSON document with numbers as
/// decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "exchangeContractAddress")]
    pub exchange_address: ChecksumAddress,
    #[serde(rename = "maker")]
    pub maker_address: ChecksumAddress,
    #[serde(rename = "taker")]
    pub taker_address: ChecksumAddress,
    pub maker_token_address: ChecksumAddress,
    pub taker_token_address: ChecksumAddress,
    pub fee_recipient: ChecksumAddress,
    #[serde(with = "decimal_string")]
    pub maker_token_amount: U256,
    #[serde(with = "decimal_string")]
    pub taker_token_amount: U256,
    #[serde(with = "decimal_string")]
    pub maker_fee: U256,
    #[serde(with = "decimal_string")]
    pub taker_fee: U256,
    #[serde(rename = "expirationUnixTimestampSec", with = "decimal_string")]
    pub expiration_timestamp_in_sec: u64,
    #[serde(with = "decimal_string")]
    pub salt: U256,
    pub ec_signature: EcSignature,
}

impl Order {
    /// Parse the JSON document a client submits.
    pub fn from_json(document: &str) -> Result<Self, OrderParseError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Canonical identity of the order.
    pub fn hash(&self) -> B256 {
        let mut packed = Vec::with_capacity(PACKED_LEN);
        for address in [
            &self.exchange_address,
            &self.maker_address,
            &self.taker_address,
            &self.maker_token_address,
            &self.taker_token_address,
            &self.fee_recipient,
        ] {
            packed.extend_from_slice(address.address().as_slice());
        }
        for number in [
            self.maker_token_amount,
            self.taker_token_amount,
            self.maker_fee,
            self.taker_fee,
            U256::from(self.expiration_timestamp_in_sec),
            self.salt,
        ] {
            packed.extend_from_slice(&number.to_be_bytes::<32>());
        }
        keccak256(&packed)
    }

    /// `0x`-prefixed hex rendering of [`Order::hash`].
    pub fn hash_hex(&self) -> String {
        self.hash().to_string()
    }

    /// Digest the maker has to sign for this order.
    pub fn signing_message(&self) -> B256 {
        signing_digest(&self.hash())
    }

    pub fn price(&self) -> Price {
        Price::new(self.taker_token_amount, self.maker_token_amount)
    }

    pub fn validate_signature(&self) -> bool {
        self.ec_signature
            .recover_signer(&self.hash())
            .is_some_and(|signer| self.maker_address == signer)
    }

    pub fn validate_addresses(&self) -> bool {
        [
            &self.exchange_address,
            &self.maker_token_address,
            &self.taker_token_address,
            &self.fee_recipient,
        ]
        .iter()
        .all(|address| address.is_checksummed())
    }

    pub fn validate(&self) -> bool {
        self.validate_signature() && self.validate_addresses()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expiration_timestamp_in_sec
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Order {}

impl Hash for Order {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Order::hash(self).hash(state);
    }
}

/// Numbers travel as decimal strings so 256-bit values survive JSON.
pub(crate) mod decimal_string {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(de::Error::custom(format!("not a decimal integer: {text:?}")));
        }
        text.parse().map_err(de::Error::custom)
    }
}
