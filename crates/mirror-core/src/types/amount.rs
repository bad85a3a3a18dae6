use serde::{Deserialize, Serialize};

/// Base-unit quantity triple carried by every order and aggregated per price
/// level. Invariant: `locked + filled <= initial`; the open remainder is
/// `initial - filled - locked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub initial: u128,
    pub locked: u128,
    pub filled: u128,
}

impl Amount {
    pub fn new(initial: u128, locked: u128, filled: u128) -> Self {
        Self {
            initial,
            locked,
            filled,
        }
    }

    /// Open quantity still on the book. Saturates so a transiently
    /// inconsistent remote snapshot can never yield a negative remainder.
    pub fn remaining(&self) -> u128 {
        self.initial
            .saturating_sub(self.filled)
            .saturating_sub(self.locked)
    }

    pub fn is_consistent(&self) -> bool {
        self.locked
            .checked_add(self.filled)
            .is_some_and(|sum| sum <= self.initial)
    }

    /// Accumulate another amount into this one (price-level aggregation).
    pub fn add(&mut self, other: &Amount) {
        self.initial = self.initial.saturating_add(other.initial);
        self.locked = self.locked.saturating_add(other.locked);
        self.filled = self.filled.saturating_add(other.filled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_initial_minus_filled_minus_locked() {
        let amount = Amount::new(100, 30, 20);
        assert_eq!(amount.remaining(), 50);
        assert!(amount.is_consistent());
    }

    #[test]
    fn remaining_never_goes_negative() {
        let amount = Amount::new(10, 20, 30);
        assert_eq!(amount.remaining(), 0);
        assert!(!amount.is_consistent());
    }

    #[test]
    fn consistency_holds_at_the_boundary() {
        assert!(Amount::new(50, 25, 25).is_consistent());
        assert!(!Amount::new(50, 26, 25).is_consistent());
    }

    #[test]
    fn add_accumulates_componentwise() {
        let mut total = Amount::default();
        total.add(&Amount::new(100, 10, 5));
        total.add(&Amount::new(50, 0, 25));
        assert_eq!(total, Amount::new(150, 10, 30));
    }
}
