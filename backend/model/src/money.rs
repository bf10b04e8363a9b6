//! Fixed-point money and unit arithmetic.
//!
//! Amounts are always rounded half-even to 2 fractional digits; unit
//! quantities to 4. Never use `f64` for either — see spec.md §9.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

const MONEY_DP: u32 = 2;
const UNITS_DP: u32 = 4;

fn round_half_even(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

macro_rules! scaled_decimal {
    ($name:ident, $dp:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Decimal);

        impl $name {
            pub const DECIMAL_PLACES: u32 = $dp;

            pub fn new(value: Decimal) -> Self {
                Self(round_half_even(value, $dp))
            }

            pub fn zero() -> Self {
                Self(Decimal::ZERO)
            }

            pub fn raw(&self) -> Decimal {
                self.0
            }

            pub fn abs(&self) -> Self {
                Self(self.0.abs())
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            pub fn is_negative(&self) -> bool {
                self.0.is_sign_negative() && !self.0.is_zero()
            }
        }

        impl FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let cleaned = clean_numeric_literal(s);
                Decimal::from_str(&cleaned).map(Self::new)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self::new(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self::new(self.0 - rhs.0)
            }
        }

        impl From<Decimal> for $name {
            fn from(value: Decimal) -> Self {
                Self::new(value)
            }
        }
    };
}

scaled_decimal!(Money, MONEY_DP);
scaled_decimal!(Units, UNITS_DP);

impl Money {
    /// `unitsExpected = amount / offerPrice` — not itself rounded to money
    /// scale, the caller compares it against a `Units` value.
    pub fn implied_units(&self, price: Decimal) -> Option<Units> {
        if price.is_zero() {
            return None;
        }
        Some(Units::new(self.0 / price))
    }
}

impl Units {
    pub fn times_price(&self, price: Decimal) -> Money {
        Money::new(self.0 * price)
    }
}

/// A fraction in `[0, 1]`; bank CSV percent columns and `fundDistribution`
/// entries both normalize into this type.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(Decimal);

impl Percent {
    pub fn from_fraction(value: Decimal) -> Self {
        Self(value)
    }

    /// Accepts either a `0..1` fraction or a `0..100` whole percent and
    /// normalizes to a fraction, per spec.md's "as noted" ambiguity.
    pub fn from_whole_or_fraction(value: Decimal) -> Self {
        if value.abs() > Decimal::ONE {
            Self(value / Decimal::ONE_HUNDRED)
        } else {
            Self(value)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }
}

/// Strips currency symbols and thousand separators a statement column may
/// carry (`"KES 1,234.50"`, `"$1 000,00"`) before numeric parsing. Spec.md
/// §4.B requires the parser tolerate these.
pub fn clean_numeric_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut seen_digit = false;
    for ch in raw.trim().chars() {
        match ch {
            '0'..='9' | '.' | '-' => {
                seen_digit = true;
                out.push(ch);
            }
            ',' | ' ' | '\u{a0}' => {
                // thousands separator or stray whitespace: drop
            }
            _ if !seen_digit => {
                // currency symbol prefix: drop
            }
            _ => {
                // trailing currency symbol / unexpected char: drop
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rounds_half_even() {
        assert_eq!(Money::new(dec!(1.005)).raw(), dec!(1.00));
        assert_eq!(Money::new(dec!(1.015)).raw(), dec!(1.02));
        assert_eq!(Money::new(dec!(1.025)).raw(), dec!(1.02));
    }

    #[test]
    fn units_round_to_four_places() {
        assert_eq!(Units::new(dec!(1.00005)).raw(), dec!(1.0000));
        assert_eq!(Units::new(dec!(1.00015)).raw(), dec!(1.0002));
    }

    #[test]
    fn clean_numeric_literal_strips_symbols_and_separators() {
        assert_eq!(clean_numeric_literal("KES 1,234.50"), "1234.50");
        assert_eq!(clean_numeric_literal("$1 000.00"), "1000.00");
        assert_eq!(clean_numeric_literal("-500.25"), "-500.25");
    }

    #[test]
    fn money_from_str_handles_currency_formatting() {
        let m: Money = "KES 36,085.00".parse().unwrap();
        assert_eq!(m.raw(), dec!(36085.00));
    }

    #[test]
    fn implied_units_matches_amount_over_offer() {
        let amount = Money::new(dec!(36085));
        let units = amount.implied_units(dec!(12.50)).unwrap();
        assert_eq!(units.raw(), dec!(2886.8000));
    }

    #[test]
    fn percent_from_whole_normalizes() {
        assert_eq!(Percent::from_whole_or_fraction(dec!(25)).value(), dec!(0.25));
        assert_eq!(Percent::from_whole_or_fraction(dec!(0.25)).value(), dec!(0.25));
    }
}
