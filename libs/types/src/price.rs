//! Exact order prices
//!
//! A price is the ratio `taker_amount / maker_amount` kept as two 256-bit
//! integers. Comparisons cross-multiply into 512 bits so no precision is lost.
//! The `Decimal` projection is for display and for the derived storage column
//! only; it must not be used for settlement arithmetic.

use std::cmp::Ordering;
use std::fmt;

use alloy_primitives::{U256, U512};
use rust_decimal::Decimal;

/// Rational price of an order. A zero denominator sorts above every finite price.
#[derive(Debug, Clone, Copy)]
pub struct Price {
    numerator: U256,
    denominator: U256,
}

impl Price {
    pub fn new(numerator: U256, denominator: U256) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// Fixed-point projection, truncated to `Decimal` precision.
    ///
    /// `None` when the denominator is zero or an operand exceeds the 96-bit
    /// mantissa of `Decimal`.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.denominator.is_zero() {
            return None;
        }
        let numerator = to_decimal(self.numerator)?;
        let denominator = to_decimal(self.denominator)?;
        numerator.checked_div(denominator)
    }
}

fn to_decimal(value: U256) -> Option<Decimal> {
    let value = u128::try_from(value).ok()?;
    let value = i128::try_from(value).ok()?;
    Decimal::try_from_i128_with_scale(value, 0).ok()
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.denominator.is_zero(), other.denominator.is_zero()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let lhs: U512 = self.numerator.widening_mul(other.denominator);
                let rhs: U512 = other.numerator.widening_mul(self.denominator);
                lhs.cmp(&rhs)
            }
        }
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(decimal) => write!(f, "{}", decimal.normalize()),
            None => write!(f, "{}/{}", self.numerator, self.denominator),
        }
    }
}
