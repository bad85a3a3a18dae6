use serde::{Deserialize, Serialize};

use super::{OrderId, TradeId};

/// Which role an order played in a trade. The order with the smaller numeric
/// ID rested on the book first and is the maker; the other is the taker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Maker,
    Taker,
}

/// A mirrored trade between one sell order and one buy order. Registered as
/// a placeholder when its ID is first seen, filled in by the hydration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub sell_id: Option<OrderId>,
    pub buy_id: Option<OrderId>,
    /// Executed quantity in base token units.
    pub base: u128,
    /// Executed quantity in quote token units.
    pub quote: u128,
    /// Fee charged to the sell side, in quote units.
    pub sell_fee: u128,
    /// Fee charged to the buy side, in base units.
    pub buy_fee: u128,
    pub executed_at: Option<u64>,
    /// Settlement block reference.
    pub block: Option<u64>,
}

impl Trade {
    pub fn placeholder(id: TradeId) -> Self {
        Self {
            id,
            sell_id: None,
            buy_id: None,
            base: 0,
            quote: 0,
            sell_fee: 0,
            buy_fee: 0,
            executed_at: None,
            block: None,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.sell_id.is_some() && self.buy_id.is_some()
    }

    pub fn maker_id(&self) -> Option<OrderId> {
        Some(self.sell_id?.min(self.buy_id?))
    }

    pub fn taker_id(&self) -> Option<OrderId> {
        Some(self.sell_id?.max(self.buy_id?))
    }

    /// Resolve the role of one participant; `None` if the trade is not yet
    /// hydrated or the order did not participate.
    pub fn role_of(&self, order: OrderId) -> Option<Role> {
        if self.sell_id != Some(order) && self.buy_id != Some(order) {
            return None;
        }
        if self.maker_id()? == order {
            Some(Role::Maker)
        } else {
            Some(Role::Taker)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(sell: u64, buy: u64) -> Trade {
        Trade {
            sell_id: Some(OrderId(sell)),
            buy_id: Some(OrderId(buy)),
            ..Trade::placeholder(TradeId(1))
        }
    }

    #[test]
    fn smaller_id_is_maker_from_either_side() {
        let t = trade(3, 10);
        assert_eq!(t.maker_id(), Some(OrderId(3)));
        assert_eq!(t.taker_id(), Some(OrderId(10)));
        assert_eq!(t.role_of(OrderId(3)), Some(Role::Maker));
        assert_eq!(t.role_of(OrderId(10)), Some(Role::Taker));

        // buy side placed first this time
        let t = trade(42, 7);
        assert_eq!(t.maker_id(), Some(OrderId(7)));
        assert_eq!(t.role_of(OrderId(42)), Some(Role::Taker));
        assert_eq!(t.role_of(OrderId(7)), Some(Role::Maker));
    }

    #[test]
    fn role_of_stranger_is_none() {
        let t = trade(3, 10);
        assert_eq!(t.role_of(OrderId(99)), None);
    }

    #[test]
    fn unhydrated_trade_has_no_roles() {
        let t = Trade::placeholder(TradeId(5));
        assert!(!t.is_hydrated());
        assert_eq!(t.maker_id(), None);
        assert_eq!(t.role_of(OrderId(1)), None);
    }
}
