use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// A signed monetary amount. Positive is an inflow, negative an outflow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Builds an amount from an integer count of minor units (kopecks, cents).
    pub fn from_minor_units(units: i64) -> Self {
        Money(Decimal::new(units, 2))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// `-1`, `0` or `1`.
    pub fn sign(self) -> i8 {
        match self.0.cmp(&Decimal::ZERO) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    pub fn same_sign(self, other: Money) -> bool {
        self.sign() == other.sign()
    }

    /// Absolute distance between two amounts.
    pub fn distance(self, other: Money) -> Money {
        (self - other).abs()
    }

    /// Scales the amount by a fraction (`0.10` for 10%). Not rounded.
    pub fn scaled(self, fraction: Decimal) -> Money {
        Money(self.0 * fraction)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Money {
    fn from(decimal: Decimal) -> Self {
        Money::from_decimal(decimal)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().replace([' ', '\u{a0}'], "");
        Decimal::from_str(&s).map(Money::from_decimal)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_convert_to_two_decimals() {
        assert_eq!(Money::from_minor_units(-12345).to_string(), "-123.45");
        assert_eq!(Money::from_minor_units(5).to_string(), "0.05");
    }

    #[test]
    fn parse_trims_and_rounds() {
        let m: Money = " 1 000.005 ".parse().unwrap();
        assert_eq!(m, Money::from_minor_units(100_000));
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn sign_handling() {
        let pos = Money::from_minor_units(5000);
        let neg = -pos;
        assert_eq!(pos.sign(), 1);
        assert_eq!(neg.sign(), -1);
        assert_eq!(Money::zero().sign(), 0);
        assert!(!pos.same_sign(neg));
        assert!(neg.same_sign(Money::from_minor_units(-1)));
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Money::from_minor_units(-10_000);
        let b = Money::from_minor_units(-10_050);
        assert_eq!(a.distance(b), Money::from_minor_units(50));
        assert_eq!(b.distance(a), Money::from_minor_units(50));
    }

    #[test]
    fn scaled_keeps_precision() {
        let m = Money::from_minor_units(-30_000);
        assert_eq!(m.abs().scaled(Decimal::new(10, 2)), Money::from_minor_units(3_000));
    }
}
