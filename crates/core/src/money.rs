//! Money value object.
//!
//! Amounts are held in decimal **major units** (e.g. dollars) for all domain
//! arithmetic. Conversion to integer minor units (cents) happens once, at the
//! payment-provider boundary, rounding half away from zero to two places.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Minor-unit precision of the operating currency (2 = cents).
const MINOR_UNIT_SCALE: u32 = 2;

/// A monetary amount in major units of the operating currency.
///
/// Compared by value. Callers must pre-round inputs to minor-unit precision;
/// this type never rounds during arithmetic, only at the minor-unit boundary.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole major units (e.g. `from_major(25)` is 25.00).
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Integer minor units (e.g. `from_minor_units(2550)` is 25.50).
    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_UNIT_SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Convert to integer minor units, rounding half away from zero.
    ///
    /// Fails only when the amount does not fit an `i64` of minor units.
    pub fn to_minor_units(&self) -> DomainResult<i64> {
        let rounded = self
            .0
            .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        let scaled = rounded
            .checked_mul(Decimal::from(10i64.pow(MINOR_UNIT_SCALE)))
            .ok_or_else(|| DomainError::invariant("money amount overflow"))?;
        scaled
            .to_i64()
            .ok_or_else(|| DomainError::invariant("money amount exceeds minor-unit range"))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}
