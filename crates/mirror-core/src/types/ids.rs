use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MirrorError, Result};

/// Ledger-assigned order identifier. Orders are numbered in placement order,
/// which is what makes the smaller-ID-is-maker rule on trades work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-assigned trade identifier, monotonic in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookId(String);

impl BookId {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Textual account identity. The format is groups of 1-5 lowercase
/// alphanumerics joined by single dashes, at most 63 characters total.
/// User-supplied recipients must parse through [`AccountId::from_text`]
/// before any network call is made with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn from_text(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(MirrorError::InvalidRecipient("empty identity".into()));
        }
        if text.len() > 63 {
            return Err(MirrorError::InvalidRecipient(format!(
                "identity too long: {} chars",
                text.len()
            )));
        }
        for group in text.split('-') {
            if group.is_empty() || group.len() > 5 {
                return Err(MirrorError::InvalidRecipient(format!(
                    "malformed identity: {text:?}"
                )));
            }
            if !group.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()) {
                return Err(MirrorError::InvalidRecipient(format!(
                    "malformed identity: {text:?}"
                )));
            }
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_accepts_dashed_groups() {
        assert!(AccountId::from_text("alice-2dq3k").is_ok());
        assert!(AccountId::from_text("aaaaa-aa").is_ok());
        assert!(AccountId::from_text("x").is_ok());
    }

    #[test]
    fn account_id_rejects_malformed_text() {
        assert!(AccountId::from_text("").is_err());
        assert!(AccountId::from_text("-alice").is_err());
        assert!(AccountId::from_text("alice-").is_err());
        assert!(AccountId::from_text("alice--bob").is_err());
        assert!(AccountId::from_text("toolong-group1").is_err());
        assert!(AccountId::from_text("UPPER-case").is_err());
        assert!(AccountId::from_text("spa ce").is_err());
        let long = "abcde-".repeat(11) + "abcde";
        assert!(AccountId::from_text(&long).is_err());
    }

    #[test]
    fn order_ids_order_numerically() {
        assert!(OrderId(3) < OrderId(10));
    }
}
