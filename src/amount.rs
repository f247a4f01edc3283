use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point money value with 4 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;

    pub const ZERO: Amount = Amount(0);

    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    /// Like `from_float`, but `None` for NaN, infinities and values outside
    /// the representable range.
    pub fn try_from_float(value: f64) -> Option<Self> {
        let scaled = (value * Self::SCALE as f64).round();
        // i64::MAX as f64 rounds up to 2^63, which itself does not fit
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return None;
        }
        Some(Amount(scaled as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Whole currency units, e.g. `Amount::from_units(500)` is `500.0000`.
    pub const fn from_units(units: i64) -> Self {
        Amount(units * Self::SCALE)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Amount(self.0.saturating_add(rhs.0))
    }

    /// `floor(self * multiplier)` in whole units. Negative amounts yield zero,
    /// results beyond `u64::MAX` saturate.
    pub fn mul_floor(self, multiplier: Multiplier) -> u64 {
        if self.0 <= 0 {
            return 0;
        }
        let product = self.0 as i128 * multiplier.hundredths() as i128;
        u64::try_from(product / (Self::SCALE as i128 * Multiplier::SCALE as i128))
            .unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:04}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

/// Point multiplier in hundredths: `Multiplier::from_hundredths(125)` is 1.25x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    const SCALE: u32 = 100;

    pub const ONE: Multiplier = Multiplier(Self::SCALE);

    pub const fn from_hundredths(value: u32) -> Self {
        Multiplier(value)
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}
