//! Document types and the sign policy derived from them.
//!
//! Entries store an absolute amount; the direction of their effect on the
//! account balance comes only from the doc type, so changing the doc type
//! later re-signs the entry without touching its amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document type tag of a credit entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    /// Agency investment paid against the subject (debits the balance).
    Investment,
    /// Receipt issued to the subject (credits the balance).
    Receipt,
    /// Synthetic adjustment raising the balance.
    AdjustUp,
    /// Synthetic adjustment lowering the balance.
    AdjustDown,
    /// Manual movement; the default when no doc type is given.
    Manual,
    /// Any other tag, kept verbatim (lower-cased).
    Other(String),
}

impl DocType {
    /// Parse a raw tag: trimmed, case-insensitive, empty means `Manual`.
    pub fn parse(raw: &str) -> Self {
        let tag = raw.trim().to_lowercase();
        match tag.as_str() {
            "" | "manual" => DocType::Manual,
            "investment" => DocType::Investment,
            "receipt" => DocType::Receipt,
            "adjust_up" => DocType::AdjustUp,
            "adjust_down" => DocType::AdjustDown,
            _ => DocType::Other(tag),
        }
    }

    /// Parse an optional tag, defaulting to `Manual`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.map(Self::parse).unwrap_or(DocType::Manual)
    }

    /// Signed multiplier applied to an entry's absolute amount.
    pub fn sign(&self) -> i32 {
        match self {
            DocType::Investment | DocType::AdjustDown => -1,
            DocType::Receipt | DocType::AdjustUp | DocType::Manual | DocType::Other(_) => 1,
        }
    }

    /// Whether the tag is one of the documented doc types.
    pub fn is_known(&self) -> bool {
        !matches!(self, DocType::Other(_))
    }

    pub fn is_adjustment(&self) -> bool {
        matches!(self, DocType::AdjustUp | DocType::AdjustDown)
    }

    /// Adjustment doc type whose sign matches `delta`.
    pub fn adjustment_for(delta: Decimal) -> Self {
        if delta >= Decimal::ZERO {
            DocType::AdjustUp
        } else {
            DocType::AdjustDown
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DocType::Investment => "investment",
            DocType::Receipt => "receipt",
            DocType::AdjustUp => "adjust_up",
            DocType::AdjustDown => "adjust_down",
            DocType::Manual => "manual",
            DocType::Other(tag) => tag,
        }
    }
}

impl Default for DocType {
    fn default() -> Self {
        DocType::Manual
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DocType {
    fn from(raw: String) -> Self {
        DocType::parse(&raw)
    }
}

impl From<DocType> for String {
    fn from(doc_type: DocType) -> Self {
        doc_type.as_str().to_string()
    }
}

/// Sign of a raw doc type tag.
pub fn sign(doc_type: &str) -> i32 {
    DocType::parse(doc_type).sign()
}

/// Balance effect of `amount` under `doc_type`: `|amount| * sign`.
pub fn signed_delta(amount: Decimal, doc_type: &DocType) -> Decimal {
    amount.abs() * Decimal::from(doc_type.sign())
}
