//! Exact fixed-precision decimal primitives for the trading core.
//!
//! Every price, quantity, and ledger amount in this workspace flows through
//! `rust_decimal::Decimal` (28 significant digits, exact base-10 arithmetic,
//! no binary floating point). This crate wraps that type in `Price`,
//! `Quantity`, and `Amount` newtypes so range invariants are checked once,
//! at construction, instead of at every call site.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum DecimalError {
    #[error("price {0} is not in the open interval (0, 1)")]
    PriceOutOfRange(Decimal),
    #[error("quantity {0} is negative")]
    NegativeQuantity(Decimal),
    #[error("quantity {0} exceeds the configured maximum {1}")]
    QuantityTooLarge(Decimal, Decimal),
    #[error("arithmetic overflow or precision loss computing {op}")]
    Arithmetic { op: &'static str },
}

/// A price strictly between 0 and 1. The API boundary additionally enforces
/// a 0.01 step; the core itself only enforces the open-interval bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Result<Self, DecimalError> {
        if value <= Decimal::ZERO || value >= Decimal::ONE {
            return Err(DecimalError::PriceOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// `(a + b) / 2`, exact because halving never loses precision.
    pub fn midpoint(a: Self, b: Self) -> Result<Self, DecimalError> {
        let sum = a
            .0
            .checked_add(b.0)
            .ok_or(DecimalError::Arithmetic { op: "midpoint sum" })?;
        let half = sum
            .checked_div(Decimal::TWO)
            .ok_or(DecimalError::Arithmetic { op: "midpoint halve" })?;
        Self::new(half)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative quantity of shares or units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> Result<Self, DecimalError> {
        if value < Decimal::ZERO {
            return Err(DecimalError::NegativeQuantity(value));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Result<Self, DecimalError> {
        let sum = self
            .0
            .checked_add(other.0)
            .ok_or(DecimalError::Arithmetic { op: "quantity add" })?;
        Ok(Self(sum))
    }

    /// Subtract, rejecting a result that would go negative.
    pub fn checked_sub(self, other: Self) -> Result<Self, DecimalError> {
        let diff = self
            .0
            .checked_sub(other.0)
            .ok_or(DecimalError::Arithmetic { op: "quantity sub" })?;
        Self::new(diff)
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed monetary amount: a ledger delta, a balance, a notional value.
/// Unlike `Price`/`Quantity` this carries no range constraint of its own —
/// the ledger enforces non-negativity on the *projected balance*, not on
/// every delta that feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Result<Self, DecimalError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(DecimalError::Arithmetic { op: "amount add" })
    }

    pub fn checked_neg(self) -> Result<Self, DecimalError> {
        self.0
            .checked_neg()
            .map(Self)
            .ok_or(DecimalError::Arithmetic { op: "amount negate" })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Price> for Amount {
    fn from(p: Price) -> Self {
        Self(p.0)
    }
}

impl From<Quantity> for Amount {
    fn from(q: Quantity) -> Self {
        Self(q.0)
    }
}

/// `price * quantity`, exact for the step sizes used at this core's boundary.
pub fn notional(price: Price, quantity: Quantity) -> Result<Amount, DecimalError> {
    price
        .value()
        .checked_mul(quantity.value())
        .map(Amount)
        .ok_or(DecimalError::Arithmetic { op: "notional" })
}

/// Render a decimal as a minimal string: no scientific notation, no
/// trailing zeros beyond the given number of fractional digits. Used only
/// at the display/serialization boundary — never inside the trading path,
/// where rounding is prohibited.
pub fn canonical_string(value: Decimal, max_fractional_digits: u32) -> String {
    let rounded = value.round_dp(max_fractional_digits);
    let normalized = rounded.normalize();
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_accepts_open_interval() {
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(0.99)).is_ok());
        assert!(Price::new(dec!(0.5)).is_ok());
    }

    #[test]
    fn test_price_rejects_boundary_and_outside() {
        assert_eq!(
            Price::new(dec!(0)).unwrap_err(),
            DecimalError::PriceOutOfRange(dec!(0))
        );
        assert_eq!(
            Price::new(dec!(1)).unwrap_err(),
            DecimalError::PriceOutOfRange(dec!(1))
        );
        assert!(Price::new(dec!(-0.1)).is_err());
        assert!(Price::new(dec!(1.5)).is_err());
    }

    #[test]
    fn test_quantity_rejects_negative() {
        assert!(Quantity::new(dec!(-1)).is_err());
        assert!(Quantity::new(dec!(0)).is_ok());
    }

    #[test]
    fn test_quantity_checked_sub_rejects_negative_result() {
        let a = Quantity::new(dec!(5)).unwrap();
        let b = Quantity::new(dec!(10)).unwrap();
        assert!(a.checked_sub(b).is_err());
    }

    #[test]
    fn test_midpoint_is_exact() {
        let bid = Price::new(dec!(0.50)).unwrap();
        let ask = Price::new(dec!(0.60)).unwrap();
        let mid = Price::midpoint(bid, ask).unwrap();
        assert_eq!(mid.value(), dec!(0.55));
    }

    #[test]
    fn test_notional_multiplies_exactly() {
        let price = Price::new(dec!(0.55)).unwrap();
        let qty = Quantity::new(dec!(50)).unwrap();
        let value = notional(price, qty).unwrap();
        assert_eq!(value.value(), dec!(27.50));
    }

    #[test]
    fn test_canonical_string_trims_trailing_zeros() {
        assert_eq!(canonical_string(dec!(27.500), 2), "27.5");
        assert_eq!(canonical_string(dec!(0.2730), 2), "0.27");
        assert_eq!(canonical_string(dec!(100), 8), "100");
    }
}
