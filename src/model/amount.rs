//! Amount type for handling Etsy's monetary strings.
//!
//! Etsy statements write money as `€88.20`, `-€5.50` or `--` (not applicable). Some exports use
//! a comma as the decimal separator (`€88,20`). This module provides the `Amount` type which wraps
//! `Decimal`, parses those strings and renders the two output formats we need: a plain
//! `88.20` for human readable trails and the ledger format `88,20`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// The only currency symbol found in the statements we process.
pub const CURRENCY_SYMBOL: char = '€';

/// The token Etsy writes into a monetary column that does not apply to the row.
pub const NOT_APPLICABLE: &str = "--";

/// Represents a Euro amount.
///
/// # Examples
///
/// ```
/// # use etsy_ledger::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-€5.50").unwrap();
/// assert_eq!(amount.to_string(), "-5.50");
/// assert_eq!(amount.ledger(), "-5,50");
/// ```
///
/// The placeholder `--` is not an amount:
/// ```
/// # use etsy_ledger::model::Amount;
/// assert_eq!(Amount::parse_field("--").unwrap(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const ZERO: Amount = Amount {
        value: Decimal::ZERO,
    };

    /// Creates a new Amount from a Decimal value. A negative zero is normalized to zero.
    pub fn new(value: Decimal) -> Self {
        if value.is_zero() {
            Self::ZERO
        } else {
            Self { value }
        }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value().is_sign_negative()
    }

    /// The magnitude of the amount.
    pub fn abs(&self) -> Self {
        Self::new(self.value.abs())
    }

    /// Parses one monetary column. Empty cells and the `--` placeholder are `None`, anything else
    /// must be a valid amount.
    pub fn parse_field(s: &str) -> Result<Option<Self>, AmountError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == NOT_APPLICABLE {
            return Ok(None);
        }
        Amount::from_str(trimmed).map(Some)
    }

    /// Finds the first `€<value>` inside free text, e.g. `€123.45 sent to your bank account`.
    pub fn find_in_text(text: &str) -> Result<Self, AmountError> {
        let after_symbol = text
            .split_once(CURRENCY_SYMBOL)
            .map(|(_, rest)| rest.trim_start())
            .ok_or_else(|| AmountError::NotFound(text.to_string()))?;
        let token = after_symbol
            .split_whitespace()
            .next()
            .ok_or_else(|| AmountError::NotFound(text.to_string()))?;
        Amount::from_str(token)
    }

    /// The ledger rendering: two decimals, comma as decimal separator, no thousands separator.
    pub fn ledger(&self) -> String {
        self.to_string().replace('.', ",")
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub enum AmountError {
    /// The text is not a number once the currency symbol and sign are removed.
    Invalid(String, rust_decimal::Error),
    /// No `€` amount was found in a piece of free text.
    NotFound(String),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Invalid(s, e) => write!(f, "Invalid({s:?}, {e:?})"),
            AmountError::NotFound(s) => write!(f, "NotFound({s:?})"),
        }
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Invalid(s, e) => write!(f, "'{s}' is not a valid amount: {e}"),
            AmountError::NotFound(s) => write!(f, "no {CURRENCY_SYMBOL} amount found in '{s}'"),
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Invalid(_, e) => Some(e),
            AmountError::NotFound(_) => None,
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // A leading minus precedes the currency symbol: "-€5.50"
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(after_minus) => (true, after_minus),
            None => (false, trimmed),
        };

        let digits: String = rest
            .chars()
            .filter(|c| *c != CURRENCY_SYMBOL && !c.is_whitespace())
            .collect();

        let value = Decimal::from_str(&normalize_separators(&digits))
            .map_err(|e| AmountError::Invalid(s.to_string(), e))?;
        Ok(Amount::new(if negative { -value } else { value }))
    }
}

/// Rewrites `1.234,56`, `1,234.56` and `88,20` into the `1234.56` form `Decimal` understands.
/// When both separators appear, the one further right is the decimal separator.
fn normalize_separators(digits: &str) -> String {
    match (digits.rfind(','), digits.rfind('.')) {
        (Some(comma), Some(period)) if comma > period => {
            digits.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => digits.replace(',', ""),
        (Some(_), None) => digits.replace(',', "."),
        _ => digits.to_string(),
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rounded = self.value.round_dp(2);
        write!(f, "{rounded:.2}")
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.value + rhs.value)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new(self.value - rhs.value)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount::new(-self.value)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}
