//! Stored order records
//!
//! A record is an [`Order`] plus the amounts already filled or cancelled
//! on-chain. Counters only grow. A record is fully settled once, on either
//! leg, filled plus cancelled reaches the order amount; settled records leave
//! the book.

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::order::{decimal_string, Order};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOrder {
    #[serde(flatten)]
    pub order: Order,
    #[serde(with = "decimal_string")]
    pub filled_maker_token_amount: U256,
    #[serde(with = "decimal_string")]
    pub filled_taker_token_amount: U256,
    #[serde(with = "decimal_string")]
    pub cancelled_maker_token_amount: U256,
    #[serde(with = "decimal_string")]
    pub cancelled_taker_token_amount: U256,
}

impl StoredOrder {
    /// Fresh record with zeroed counters.
    pub fn new(order: Order) -> Self {
        Self {
            order,
            filled_maker_token_amount: U256::ZERO,
            filled_taker_token_amount: U256::ZERO,
            cancelled_maker_token_amount: U256::ZERO,
            cancelled_taker_token_amount: U256::ZERO,
        }
    }

    pub fn hash(&self) -> B256 {
        self.order.hash()
    }

    pub fn add_fill(&mut self, maker_amount: U256, taker_amount: U256) {
        self.filled_maker_token_amount = self.filled_maker_token_amount.saturating_add(maker_amount);
        self.filled_taker_token_amount = self.filled_taker_token_amount.saturating_add(taker_amount);
    }

    pub fn add_cancel(&mut self, maker_amount: U256, taker_amount: U256) {
        self.cancelled_maker_token_amount =
            self.cancelled_maker_token_amount.saturating_add(maker_amount);
        self.cancelled_taker_token_amount =
            self.cancelled_taker_token_amount.saturating_add(taker_amount);
    }

    /// Maker amount consumed by fills and cancels together.
    pub fn settled_maker_token_amount(&self) -> U256 {
        self.filled_maker_token_amount
            .saturating_add(self.cancelled_maker_token_amount)
    }

    pub fn settled_taker_token_amount(&self) -> U256 {
        self.filled_taker_token_amount
            .saturating_add(self.cancelled_taker_token_amount)
    }

    /// Maker amount still available to takers.
    pub fn remaining_maker_token_amount(&self) -> U256 {
        self.order
            .maker_token_amount
            .saturating_sub(self.settled_maker_token_amount())
    }

    pub fn is_fully_settled(&self) -> bool {
        self.settled_maker_token_amount() >= self.order.maker_token_amount
            || self.settled_taker_token_amount() >= self.order.taker_token_amount
    }
}
