//! Monetary types: currency codes, rounding and locale-formatted amount parsing.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{LedgerError, Result};

/// Decimal places every ledger amount and balance is kept at.
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude an amount or balance may take: 9999999999999999.99,
/// the range of a `NUMERIC(18, 2)` column.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, MONEY_SCALE);

/// Currency code, stored trimmed and upper-cased (`ARS`, `USD`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code without validation.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse and validate a caller-supplied code.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::validation("currency is required", "currency"));
        }
        if code.len() > 8 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LedgerError::validation(
                format!("invalid currency code '{}'", code),
                "currency",
            ));
        }
        Ok(Self::new(code))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn ars() -> Self {
        Self::new("ARS")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Round to the ledger's money scale, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether `value` fits within `MAX_MONEY` in either direction.
pub fn within_money_range(value: Decimal) -> bool {
    value.abs() <= MAX_MONEY
}

/// Reject caller-supplied amounts outside the ledger's money range.
pub fn ensure_money_range(value: Decimal, field: &str) -> Result<Decimal> {
    if !within_money_range(value) {
        return Err(LedgerError::validation(
            format!("{} exceeds the maximum of {}", field, MAX_MONEY),
            field,
        ));
    }
    Ok(value)
}

/// Reject amounts carrying more than two decimal places.
pub fn ensure_money_scale(value: Decimal, field: &str) -> Result<Decimal> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::validation(
            format!("{} allows at most {} decimal places", field, MONEY_SCALE),
            field,
        ));
    }
    Ok(value)
}

/// Why a locale-formatted amount was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,
    #[error("ambiguous separators in '{0}'")]
    AmbiguousSeparators(String),
    #[error("'{0}' is not a number")]
    Malformed(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

/// Parse an amount typed in either `1.234,56` or `1,234.56` style.
///
/// Rules, applied after trimming and dropping inner spaces:
/// - when both `,` and `.` appear, the last one is the decimal separator and
///   the other kind is a thousands separator;
/// - a single `,` or a single `.` is the decimal separator;
/// - several separators of one kind alone are ambiguous and rejected;
/// - the normalized text must read `-?digits(.digits)?`.
pub fn parse_locale_decimal(input: &str) -> std::result::Result<Decimal, AmountParseError> {
    let compact: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let last_comma = compact.rfind(',');
    let last_dot = compact.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            let (decimal_sep, thousands_sep) = if comma > dot { (',', '.') } else { ('.', ',') };
            let without_thousands: String =
                compact.chars().filter(|c| *c != thousands_sep).collect();
            if without_thousands.matches(decimal_sep).count() > 1 {
                return Err(AmountParseError::AmbiguousSeparators(input.to_string()));
            }
            without_thousands.replace(decimal_sep, ".")
        }
        (Some(_), None) => {
            if compact.matches(',').count() > 1 {
                return Err(AmountParseError::AmbiguousSeparators(input.to_string()));
            }
            compact.replace(',', ".")
        }
        (None, Some(_)) => {
            if compact.matches('.').count() > 1 {
                return Err(AmountParseError::AmbiguousSeparators(input.to_string()));
            }
            compact
        }
        (None, None) => compact,
    };

    if !is_plain_decimal(&normalized) {
        return Err(AmountParseError::Malformed(input.to_string()));
    }

    Decimal::from_str(&normalized).map_err(|_| AmountParseError::OutOfRange(input.to_string()))
}

/// An amount as a client sends it: a JSON number or locale-formatted text.
///
/// Numbers are read straight into a `Decimal`; strings are kept verbatim for
/// `parse_locale_decimal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LocaleAmount {
    Number(Decimal),
    Text(String),
}

impl LocaleAmount {
    /// Parse into a decimal.
    pub fn parse(&self) -> std::result::Result<Decimal, AmountParseError> {
        match self {
            LocaleAmount::Number(value) => Ok(*value),
            LocaleAmount::Text(text) => parse_locale_decimal(text),
        }
    }
}

impl<'de> Deserialize<'de> for LocaleAmount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LocaleAmountVisitor)
    }
}

struct LocaleAmountVisitor;

impl<'de> Visitor<'de> for LocaleAmountVisitor {
    type Value = LocaleAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a locale-formatted amount string")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Self::Value, E> {
        Ok(LocaleAmount::Number(Decimal::from(value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Self::Value, E> {
        Ok(LocaleAmount::Number(Decimal::from(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Self::Value, E> {
        // Shortest round-trip text of the float, so 75.1 stays 75.1.
        Decimal::from_str(&value.to_string())
            .map(LocaleAmount::Number)
            .map_err(|_| E::invalid_value(de::Unexpected::Float(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
        Ok(LocaleAmount::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Self::Value, E> {
        Ok(LocaleAmount::Text(value))
    }
}

impl From<Decimal> for LocaleAmount {
    fn from(value: Decimal) -> Self {
        LocaleAmount::Number(value)
    }
}

impl From<&str> for LocaleAmount {
    fn from(s: &str) -> Self {
        LocaleAmount::Text(s.to_string())
    }
}

fn is_plain_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    all_digits(int_part) && frac_part.map_or(true, all_digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_locale_decimal("75").unwrap(), dec!(75));
        assert_eq!(parse_locale_decimal("-12.5").unwrap(), dec!(-12.5));
        assert_eq!(parse_locale_decimal("  1 500 ").unwrap(), dec!(1500));
    }

    #[test]
    fn test_single_separator_is_decimal() {
        assert_eq!(parse_locale_decimal("1234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_locale_decimal("1234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_locale_decimal("-0,5").unwrap(), dec!(-0.5));
    }

    #[test]
    fn test_last_separator_wins() {
        assert_eq!(parse_locale_decimal("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_locale_decimal("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_locale_decimal("1.234.567,89").unwrap(), dec!(1234567.89));
        assert_eq!(parse_locale_decimal("1,234,567.89").unwrap(), dec!(1234567.89));
    }

    #[test]
    fn test_rejects_ambiguous_and_malformed() {
        assert_eq!(parse_locale_decimal(""), Err(AmountParseError::Empty));
        assert!(matches!(
            parse_locale_decimal("1.234.567"),
            Err(AmountParseError::AmbiguousSeparators(_))
        ));
        assert!(matches!(
            parse_locale_decimal("1,234,567"),
            Err(AmountParseError::AmbiguousSeparators(_))
        ));
        assert!(matches!(
            parse_locale_decimal("1,234.567,8"),
            Err(AmountParseError::AmbiguousSeparators(_))
        ));
        for bad in ["abc", "12a", ".5", "5.", "--3", "+3", "1e5"] {
            assert!(
                matches!(parse_locale_decimal(bad), Err(AmountParseError::Malformed(_))),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
        assert_eq!(round_money(dec!(3.14159)), dec!(3.14));
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse(" usd ").unwrap(), Currency::usd());
        assert!(Currency::parse("").is_err());
        assert!(Currency::parse("U$D").is_err());
    }

    #[test]
    fn test_money_bounds() {
        assert_eq!(MAX_MONEY, dec!(9999999999999999.99));
        assert!(within_money_range(-MAX_MONEY));
        assert!(!within_money_range(MAX_MONEY + dec!(0.01)));
        assert!(ensure_money_range(dec!(10000000000000000), "amount").is_err());
        assert_eq!(
            ensure_money_range(Decimal::MAX, "amount").unwrap_err().field(),
            Some("amount")
        );

        assert!(ensure_money_scale(dec!(10.50), "amount").is_ok());
        assert!(ensure_money_scale(dec!(10.500), "amount").is_ok());
        assert!(ensure_money_scale(dec!(10.005), "amount").is_err());
    }

    #[test]
    fn test_locale_amount_from_json() {
        let number: LocaleAmount = serde_json::from_str("75.1").unwrap();
        assert_eq!(number, LocaleAmount::Number(dec!(75.1)));
        assert_eq!(number.parse().unwrap(), dec!(75.1));
        let big: LocaleAmount = serde_json::from_str("12345678901234567890").unwrap();
        assert_eq!(big.parse().unwrap(), dec!(12345678901234567890));
        let text: LocaleAmount = serde_json::from_str("\"1.234,50\"").unwrap();
        assert_eq!(text.parse().unwrap(), dec!(1234.50));
        assert!(LocaleAmount::from("n/a").parse().is_err());
    }
}
