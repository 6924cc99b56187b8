//! Account addresses that remember how they were written
//!
//! Clients submit addresses as text. The relay accepts any well-formed hex
//! address at construction time but only trusts the mixed-case EIP-55 form,
//! so the parsed value keeps a flag telling whether the input text was the
//! canonical checksummed rendering.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::OrderParseError;

/// The zero address. Relayed orders leave taker and fee recipient unset.
pub const NULL_ADDRESS: Address = Address::ZERO;

/// An address together with whether its source text was checksummed.
///
/// Equality and hashing only look at the address bytes.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumAddress {
    address: Address,
    checksummed: bool,
}

impl ChecksumAddress {
    /// Wrap a typed address. Typed values always render canonically.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            checksummed: true,
        }
    }

    /// Parse `0x`-prefixed hex text of any case.
    pub fn parse(text: &str) -> Result<Self, OrderParseError> {
        if !text.starts_with("0x") {
            return Err(OrderParseError::InvalidAddress(text.to_owned()));
        }
        let address = Address::from_str(text)
            .map_err(|_| OrderParseError::InvalidAddress(text.to_owned()))?;
        let checksummed = text == address.to_checksum(None);
        Ok(Self {
            address,
            checksummed,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether the source text was the EIP-55 rendering of this address.
    pub fn is_checksummed(&self) -> bool {
        self.checksummed
    }

    pub fn is_null(&self) -> bool {
        self.address == NULL_ADDRESS
    }

    /// Canonical EIP-55 text.
    pub fn to_checksum(&self) -> String {
        self.address.to_checksum(None)
    }
}

impl PartialEq for ChecksumAddress {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ChecksumAddress {}

impl Hash for ChecksumAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl PartialEq<Address> for ChecksumAddress {
    fn eq(&self, other: &Address) -> bool {
        self.address == *other
    }
}

impl From<Address> for ChecksumAddress {
    fn from(address: Address) -> Self {
        Self::new(address)
    }
}

impl FromStr for ChecksumAddress {
    type Err = OrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChecksumAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl Serialize for ChecksumAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for ChecksumAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
