use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_with::DeserializeFromStr;

use std::{
    fmt::{Debug, Display},
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
    str::FromStr,
};

/// Represents an amount of money in the shop's own currency.
///
/// The amount is stored exactly as a [`Decimal`], but the [`Display`]
/// implementation formats it to 2 decimal places. Width and alignment flags
/// are honoured, so `format!("{:>12}", money)` lines up in a table.
#[derive(Clone, Copy, Default, DeserializeFromStr, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    #[must_use]
    pub fn amount(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds to whole cents, with midpoints rounded away from zero.
    #[must_use]
    pub fn round(self) -> Self {
        Self(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Removes tax charged at `rate` from a tax-inclusive amount.
    ///
    /// `rate` is a fraction, so 20% VAT is `0.2`. The result is rounded to
    /// cents.
    #[must_use]
    pub fn excluding_tax(self, rate: Decimal) -> Self {
        if rate.is_zero() {
            return self;
        }
        Self(self.0 / (Decimal::ONE + rate)).round()
    }

    /// Returns `self` as a percentage of `total`, or zero if `total` is zero.
    #[must_use]
    pub fn percent_of(self, total: Money) -> Decimal {
        if total.is_zero() {
            return Decimal::ZERO;
        }
        (self.0 / total.0 * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl Debug for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut cents = self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        cents.rescale(2);
        if cents.is_zero() {
            cents.set_sign_positive(true);
        }
        f.pad(&cents.to_string())
    }
}

impl FromStr for Money {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Decimal::from_str(&s.trim().replace(',', ""))?))
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}
