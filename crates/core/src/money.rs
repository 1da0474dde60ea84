//! Minor-unit monetary amounts.
//!
//! Amounts are stored as signed integer cents. Fractional intermediate values
//! (pro-rata ratios, rate × quantity products) only ever exist transiently and
//! are collapsed back to cents with half-up rounding.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Monetary amount in minor units (cents), currency-agnostic.
///
/// Signed: line amounts are non-negative by invariant, but variances
/// (new − original) are naturally negative for downward adjustments.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Parse a fractional major-unit value (e.g. `199.995` dollars) into cents.
    ///
    /// Rejects NaN and infinite input; rounds half-up at the cent boundary.
    pub fn from_major(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() {
            return Err(DomainError::validation(format!(
                "amount must be a finite number, got {value}"
            )));
        }
        Ok(Self(round_half_up(value * 100.0)))
    }

    /// Fractional major-unit representation (lossless for i64 cents well below 2^53).
    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Round a raw fractional cent value half-up to whole cents.
    pub fn round_cents(raw: f64) -> Self {
        Self(round_half_up(raw))
    }

    /// Clamp to the `amount >= 0` invariant.
    pub fn clamp_non_negative(self) -> Self {
        Self(self.0.max(0))
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, DomainError> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
            .ok_or_else(|| DomainError::invariant("monetary total overflow"))
    }
}

/// Standard half-up rounding: .5 rounds away from zero toward +inf for
/// positive values (0.5 → 1, 1.5 → 2, -0.5 → 0).
fn round_half_up(raw: f64) -> i64 {
    (raw + 0.5).floor() as i64
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_major_rounds_to_the_nearest_cent() {
        assert_eq!(Money::from_major(1.006).unwrap(), Money::from_cents(101));
        assert_eq!(Money::from_major(1.004).unwrap(), Money::from_cents(100));
        assert_eq!(Money::from_major(199.99).unwrap(), Money::from_cents(19_999));
        assert_eq!(Money::from_major(200.0).unwrap(), Money::from_cents(20_000));
    }

    #[test]
    fn from_major_rejects_non_finite() {
        assert!(Money::from_major(f64::NAN).is_err());
        assert!(Money::from_major(f64::INFINITY).is_err());
        assert!(Money::from_major(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn round_cents_half_up() {
        assert_eq!(Money::round_cents(50.5), Money::from_cents(51));
        assert_eq!(Money::round_cents(50.4999), Money::from_cents(50));
        assert_eq!(Money::round_cents(-0.5), Money::from_cents(0));
        assert_eq!(Money::round_cents(-1.2), Money::from_cents(-1));
    }

    #[test]
    fn clamp_floors_negatives_at_zero() {
        assert_eq!(Money::from_cents(-25).clamp_non_negative(), Money::ZERO);
        assert_eq!(
            Money::from_cents(25).clamp_non_negative(),
            Money::from_cents(25)
        );
    }

    #[test]
    fn display_formats_major_units() {
        assert_eq!(Money::from_cents(15_000).to_string(), "150.00");
        assert_eq!(Money::from_cents(-5_000).to_string(), "-50.00");
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
        assert_eq!(Money::from_cents(305).to_string(), "3.05");
    }

    #[test]
    fn sum_detects_overflow() {
        let nearly_max = Money::from_cents(i64::MAX - 1);
        assert!(Money::sum([nearly_max, Money::from_cents(10)]).is_err());
        assert_eq!(
            Money::sum([Money::from_cents(1), Money::from_cents(2)]).unwrap(),
            Money::from_cents(3)
        );
    }
}
