use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Amounts are held in minor units (cents). Two decimal places matches what the storefront and ad platforms report.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A monetary amount in minor units of the tenant's reporting currency.
///
/// Money is serialized as a plain integer number of minor units. Use [`Money::from_major`] and [`Money::to_major`]
/// when converting to and from the decimal values that adapters report.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<f64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_major(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let major = abs / MINOR_UNITS_PER_MAJOR.unsigned_abs();
        let minor = abs % MINOR_UNITS_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{major}.{minor:02}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Converts a decimal amount (e.g. `19.99`) into minor units, rounding to the nearest cent.
    pub fn from_major(value: f64) -> Result<Self, MoneyConversionError> {
        if !value.is_finite() {
            return Err(MoneyConversionError(format!("{value} is not a finite number")));
        }
        let minor = (value * MINOR_UNITS_PER_MAJOR as f64).round();
        if minor > i64::MAX as f64 || minor < i64::MIN as f64 {
            return Err(MoneyConversionError(format!("{value} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(minor as i64))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / MINOR_UNITS_PER_MAJOR as f64
    }
}
