//! Deterministic order fixtures for tests across the workspace.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `test-utils` feature.

use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::SigningKey;

use crate::address::{ChecksumAddress, NULL_ADDRESS};
use crate::order::Order;
use crate::signature::EcSignature;

/// 2100-01-01T00:00:00Z
pub const FAR_FUTURE: u64 = 4_102_444_800;

/// Exchange contract address used by fixtures.
pub fn exchange() -> Address {
    Address::repeat_byte(0xEE)
}

/// Token address derived from a single byte.
pub fn token(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// A maker holding a fixed private key.
pub struct TestMaker {
    key: SigningKey,
}

impl TestMaker {
    /// Key bytes are `[seed; 32]`; any non-zero seed is a valid scalar.
    pub fn from_seed(seed: u8) -> Self {
        assert_ne!(seed, 0, "seed must be non-zero");
        let key = SigningKey::from_slice(&[seed; 32]).expect("valid secp256k1 scalar");
        Self { key }
    }

    pub fn address(&self) -> Address {
        Address::from_private_key(&self.key)
    }

    /// Sign the order's personal-message digest in place.
    pub fn sign(&self, order: &mut Order) {
        let digest = order.signing_message();
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .expect("signing a 32-byte digest");
        let bytes = signature.to_bytes();
        order.ec_signature = EcSignature::new(
            27 + recovery_id.to_byte(),
            B256::from_slice(&bytes[..32]),
            B256::from_slice(&bytes[32..]),
        );
    }
}

/// Builder for open orders (null taker, null fee recipient).
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    pub fn new(exchange: Address, maker_token: Address, taker_token: Address) -> Self {
        Self {
            order: Order {
                exchange_address: ChecksumAddress::new(exchange),
                maker_address: ChecksumAddress::new(NULL_ADDRESS),
                taker_address: ChecksumAddress::new(NULL_ADDRESS),
                maker_token_address: ChecksumAddress::new(maker_token),
                taker_token_address: ChecksumAddress::new(taker_token),
                fee_recipient: ChecksumAddress::new(NULL_ADDRESS),
                maker_token_amount: U256::from(100),
                taker_token_amount: U256::from(200),
                maker_fee: U256::ZERO,
                taker_fee: U256::ZERO,
                expiration_timestamp_in_sec: FAR_FUTURE,
                salt: U256::ZERO,
                ec_signature: EcSignature::new(27, B256::ZERO, B256::ZERO),
            },
        }
    }

    pub fn maker(mut self, maker: Address) -> Self {
        self.order.maker_address = ChecksumAddress::new(maker);
        self
    }

    pub fn taker(mut self, taker: Address) -> Self {
        self.order.taker_address = ChecksumAddress::new(taker);
        self
    }

    pub fn fee_recipient(mut self, recipient: Address) -> Self {
        self.order.fee_recipient = ChecksumAddress::new(recipient);
        self
    }

    pub fn amounts(mut self, maker_amount: u64, taker_amount: u64) -> Self {
        self.order.maker_token_amount = U256::from(maker_amount);
        self.order.taker_token_amount = U256::from(taker_amount);
        self
    }

    pub fn fees(mut self, maker_fee: u64, taker_fee: u64) -> Self {
        self.order.maker_fee = U256::from(maker_fee);
        self.order.taker_fee = U256::from(taker_fee);
        self
    }

    pub fn expiration(mut self, expiration: u64) -> Self {
        self.order.expiration_timestamp_in_sec = expiration;
        self
    }

    pub fn salt(mut self, salt: u64) -> Self {
        self.order.salt = U256::from(salt);
        self
    }

    /// Order with a zeroed signature.
    pub fn unsigned(self) -> Order {
        self.order
    }

    /// Order made and signed by `maker`.
    pub fn sign(self, maker: &TestMaker) -> Order {
        let mut order = self.maker(maker.address()).order;
        maker.sign(&mut order);
        order
    }
}
