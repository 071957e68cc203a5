//! Non-negative decimal amounts.
//!
//! Amounts travel as human-readable decimal strings (`"1"`, `"0.01"`) in
//! units of the transferred currency: SOL for native transfers, whole tokens
//! for SPL transfers. Conversion to integer base units (lamports, token base
//! units) happens only once the number of decimals is known.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::ErrorKind;

/// Most fractional digits a [`Decimal`] holds.
const MAX_SCALE: u8 = 28;

static AMOUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("invalid amount pattern"));

/// Errors produced while parsing or converting an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The string is not a plain non-negative decimal number.
    #[error("invalid amount: {0:?}")]
    Invalid(String),
    /// The decimal value is negative.
    #[error("amount must not be negative")]
    Negative,
    /// The amount has more fractional digits than the currency supports.
    #[error("amount has {scale} decimal places, at most {decimals} supported")]
    TooManyDecimals {
        /// Fractional digits of the amount.
        scale: u32,
        /// Decimals supported by the currency.
        decimals: u8,
    },
    /// The amount does not fit in 64-bit base units.
    #[error("amount overflows base units")]
    Overflow,
}

impl AmountError {
    /// Amount errors always stem from caller input.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedInput
    }
}

/// A non-negative decimal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    /// Creates an amount from a decimal value.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Negative`] for values below zero.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(value.normalize()))
    }

    /// Returns the decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Returns the number of fractional digits, ignoring trailing zeros.
    #[must_use]
    pub fn decimal_places(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Converts the amount into integer base units for a currency with
    /// `decimals` fractional digits (9 for SOL lamports).
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::TooManyDecimals`] if the amount is more precise
    /// than the currency, or [`AmountError::Overflow`] if it does not fit.
    pub fn to_base_units(&self, decimals: u8) -> Result<u64, AmountError> {
        let normalized = self.0.normalize();
        let scale = normalized.scale();
        if scale > u32::from(decimals) {
            return Err(AmountError::TooManyDecimals { scale, decimals });
        }
        let factor = 10i128
            .checked_pow(u32::from(decimals) - scale)
            .ok_or(AmountError::Overflow)?;
        let units = normalized
            .mantissa()
            .checked_mul(factor)
            .ok_or(AmountError::Overflow)?;
        u64::try_from(units).map_err(|_| AmountError::Overflow)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !AMOUNT_PATTERN.is_match(s) {
            return Err(AmountError::Invalid(s.to_owned()));
        }
        let fraction = s
            .split_once('.')
            .map_or(0, |(_, digits)| digits.trim_end_matches('0').len());
        let scale = u32::try_from(fraction).unwrap_or(u32::MAX);
        if scale > u32::from(MAX_SCALE) {
            return Err(AmountError::TooManyDecimals {
                scale,
                decimals: MAX_SCALE,
            });
        }
        let value = Decimal::from_str(s).map_err(|_| AmountError::Invalid(s.to_owned()))?;
        // Decimal rounds when all digits do not fit its mantissa.
        if value.normalize().scale() != scale {
            return Err(AmountError::Invalid(s.to_owned()));
        }
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}
