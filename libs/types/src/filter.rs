//! Query predicates over the order book

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::order::Order;

/// A market as seen from the ask side: orders selling `base` for `quote`.
///
/// The bids of `base/quote` are the asks of `quote/base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub base: Address,
    pub quote: Address,
}

impl TokenPair {
    pub fn new(base: Address, quote: Address) -> Self {
        Self { base, quote }
    }

    pub fn reversed(&self) -> Self {
        Self {
            base: self.quote,
            quote: self.base,
        }
    }
}

/// Independent optional predicates, ANDed together. The default matches
/// every order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub exchange: Option<Address>,
    /// Matches the maker token or the taker token
    pub token: Option<Address>,
    pub maker_token: Option<Address>,
    pub taker_token: Option<Address>,
    /// Matches the maker or the taker
    pub trader: Option<Address>,
    pub maker: Option<Address>,
    pub taker: Option<Address>,
    pub fee_recipient: Option<Address>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(mut self, address: Address) -> Self {
        self.exchange = Some(address);
        self
    }

    pub fn token(mut self, address: Address) -> Self {
        self.token = Some(address);
        self
    }

    pub fn maker_token(mut self, address: Address) -> Self {
        self.maker_token = Some(address);
        self
    }

    pub fn taker_token(mut self, address: Address) -> Self {
        self.taker_token = Some(address);
        self
    }

    pub fn trader(mut self, address: Address) -> Self {
        self.trader = Some(address);
        self
    }

    pub fn maker(mut self, address: Address) -> Self {
        self.maker = Some(address);
        self
    }

    pub fn taker(mut self, address: Address) -> Self {
        self.taker = Some(address);
        self
    }

    pub fn fee_recipient(mut self, address: Address) -> Self {
        self.fee_recipient = Some(address);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        fn check(wanted: Option<Address>, test: impl FnOnce(Address) -> bool) -> bool {
            wanted.map_or(true, test)
        }

        check(self.exchange, |a| order.exchange_address == a)
            && check(self.token, |a| {
                order.maker_token_address == a || order.taker_token_address == a
            })
            && check(self.maker_token, |a| order.maker_token_address == a)
            && check(self.taker_token, |a| order.taker_token_address == a)
            && check(self.trader, |a| order.maker_address == a || order.taker_address == a)
            && check(self.maker, |a| order.maker_address == a)
            && check(self.taker, |a| order.taker_address == a)
            && check(self.fee_recipient, |a| order.fee_recipient == a)
    }
}
