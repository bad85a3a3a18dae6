use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Amount, OrderId, Side, TokenId};

/// Immutable book parameters, fetched once at book-task startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfig {
    pub base: TokenId,
    pub quote: TokenId,
    /// Maker fee numerator over `fee_denom`.
    pub maker_fee_num: u128,
    /// Taker fee numerator over `fee_denom`.
    pub taker_fee_num: u128,
    pub fee_denom: u128,
    /// Flat fee charged when closing an order, in base units.
    pub close_fee_base: u128,
    /// Flat fee charged when closing an order, in quote units.
    pub close_fee_quote: u128,
}

/// One displayed price tier on a side of a book. Price 0 means the slot is
/// empty and its task makes no network calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelState {
    pub price: u128,
    /// Orders resident at this price.
    pub oids: HashSet<OrderId>,
    /// Aggregate of the resident orders' amounts, excluding orders whose
    /// hydration has not finished.
    pub base: Amount,
}

impl LevelState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.price == 0
    }
}

/// Mutable order-entry form for a book. A failed placement leaves the typed
/// fields intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderForm {
    pub side: Side,
    pub price: String,
    pub amount: String,
    pub busy: bool,
}

impl Default for OrderForm {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            price: String::new(),
            amount: String::new(),
            busy: false,
        }
    }
}
