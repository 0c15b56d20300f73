//! Money and subsidy types with precise decimal arithmetic
//!
//! This module provides a type-safe representation of monetary values
//! using rust_decimal for precise calculations without floating-point errors.
//! The ledger bills in a single currency (EUR), so `Money` carries no
//! currency code.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Subsidy must be between 0 and 100 percent, got {0}")]
    InvalidPercentage(Decimal),

    #[error("Subsidy fraction must be between 0 and 1, got {0}")]
    InvalidFraction(Decimal),
}

/// A monetary amount in euros
///
/// Amounts are stored with 4 decimal places internally so that sums of
/// subsidised line items do not drift; rendering always uses 2 places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    amount: Decimal,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount: amount.round_dp(4),
        }
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self { amount: dec!(0) }
    }

    /// Creates Money from an integer amount of cents
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2))
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the smaller of two amounts
    pub fn min(self, other: Money) -> Money {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Rounds to whole cents, half away from zero
    pub fn round_to_cents(&self) -> Self {
        Self {
            amount: self
                .amount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        }
    }

    /// Multiplies by a scalar (e.g. hours, quantity)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor)
    }

    /// Multiplies by a scalar, `None` if the product is not representable
    pub fn checked_multiply(&self, factor: Decimal) -> Option<Self> {
        self.amount.checked_mul(factor).map(Self::new)
    }

    /// Formats the amount with exactly two decimals, as printed on documents
    pub fn to_two_dp(&self) -> String {
        format!("{:.2}", self.round_to_cents().amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "€ {}", self.to_two_dp())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money::new(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.amount + other.amount)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.amount - other.amount)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

/// A subsidy rate stored as a percentage between 0 and 100
///
/// Operators enter subsidies as fractions (0.5 = 50%); the ledger stores
/// the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SubsidyPercent {
    value: Decimal,
}

impl SubsidyPercent {
    /// Creates a subsidy from a percentage (e.g. 25 for 25%)
    pub fn new(percent: Decimal) -> Result<Self, MoneyError> {
        if percent < Decimal::ZERO || percent > dec!(100) {
            return Err(MoneyError::InvalidPercentage(percent));
        }
        Ok(Self { value: percent })
    }

    /// Creates a subsidy from an operator-entered fraction (e.g. 0.25)
    pub fn from_fraction(fraction: Decimal) -> Result<Self, MoneyError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(MoneyError::InvalidFraction(fraction));
        }
        Self::new(fraction * dec!(100))
    }

    /// No subsidy
    pub fn none() -> Self {
        Self { value: dec!(0) }
    }

    /// Returns the percentage value (0-100)
    pub fn percent(&self) -> Decimal {
        self.value
    }

    /// Returns the subsidy amount for a gross cost
    pub fn subsidy_on(&self, gross: Money) -> Money {
        gross.multiply(self.value / dec!(100))
    }

    /// Returns the payable subtotal after subsidy: `gross - gross * pct / 100`
    pub fn subtotal_of(&self, gross: Money) -> Money {
        gross - self.subsidy_on(gross)
    }
}

impl TryFrom<Decimal> for SubsidyPercent {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        SubsidyPercent::new(value)
    }
}

impl From<SubsidyPercent> for Decimal {
    fn from(subsidy: SubsidyPercent) -> Decimal {
        subsidy.value
    }
}

impl fmt::Display for SubsidyPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value.round_dp(2))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn subsidy_and_subtotal_sum_to_gross(
            cents in 0i64..10_000_000i64,
            pct in 0u32..=100u32
        ) {
            let gross = Money::from_cents(cents);
            let subsidy = SubsidyPercent::new(Decimal::from(pct)).unwrap();

            prop_assert_eq!(subsidy.subsidy_on(gross) + subsidy.subtotal_of(gross), gross);
        }

        #[test]
        fn money_addition_is_associative(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
            c in -1_000_000i64..1_000_000i64
        ) {
            let ma = Money::from_cents(a);
            let mb = Money::from_cents(b);
            let mc = Money::from_cents(c);

            prop_assert_eq!((ma + mb) + mc, ma + (mb + mc));
        }
    }
}
