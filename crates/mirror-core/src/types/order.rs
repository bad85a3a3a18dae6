use serde::{Deserialize, Serialize};

use super::{AccountId, Amount, OrderId, TradeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// A mirrored order. Created as a placeholder when its ID is first seen and
/// filled in by the hydration pass; scalar fields stay `None` until then, and
/// readers must treat that as "not yet fetched", not "absent remotely".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Option<Side>,
    pub owner: Option<AccountId>,
    /// Limit price in quote base units; 0 until hydrated.
    pub price: u128,
    pub amount: Amount,
    /// Number of executions the ledger has recorded against this order.
    pub executions: u64,
    /// Settlement block of the placement.
    pub block: Option<u64>,
    pub subaccount: Option<Vec<u8>>,
    pub created_at: Option<u64>,
    pub expires_at: Option<u64>,
    pub closed_at: Option<u64>,
    pub closed_reason: Option<String>,
    /// Trade IDs this order participated in, append-only, in the order the
    /// remote paginates them.
    pub trades: Vec<TradeId>,
}

impl Order {
    pub fn placeholder(id: OrderId) -> Self {
        Self {
            id,
            side: None,
            owner: None,
            price: 0,
            amount: Amount::default(),
            executions: 0,
            block: None,
            subaccount: None,
            created_at: None,
            expires_at: None,
            closed_at: None,
            closed_reason: None,
            trades: Vec::new(),
        }
    }

    /// Scalar hydration has completed once the side is known.
    pub fn is_hydrated(&self) -> bool {
        self.side.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_unhydrated_and_open() {
        let order = Order::placeholder(OrderId(7));
        assert!(!order.is_hydrated());
        assert!(order.is_open());
        assert!(order.trades.is_empty());
    }
}
