use dashmap::DashMap;
use std::collections::HashMap;

use mirror_core::types::{BookConfig, BookId, LevelState, OrderForm, OrderId, Side, TradeId};

/// Mirror of one book's aggregate state. Level slots live in a separate map
/// (see [`BookStore::level`]) because each slot has its own writer task.
#[derive(Debug, Clone)]
pub struct BookState {
    pub config: BookConfig,
    /// The authenticated user's order IDs per side, append-only and
    /// deduplicated, in remote pagination order.
    pub user_buys: Vec<OrderId>,
    pub user_sells: Vec<OrderId>,
    /// The user's open price levels per side: price -> representative order.
    pub user_buy_levels: HashMap<u128, OrderId>,
    pub user_sell_levels: HashMap<u128, OrderId>,
    /// Most recent trades, newest first; `None` slots are not yet filled.
    /// Ring position matters for display, so comparisons are slot-wise.
    pub recents: Vec<Option<TradeId>>,
    pub form: OrderForm,
}

/// Key of one displayed price-level slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelKey {
    pub book: BookId,
    pub side: Side,
    pub slot: usize,
}

/// Book mirror arena plus the per-slot level states.
#[derive(Debug, Default)]
pub struct BookStore {
    books: DashMap<BookId, BookState>,
    levels: DashMap<LevelKey, LevelState>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the mirror for a discovered book with `depth` empty level
    /// slots per side and a `recents_len`-slot trade ring.
    pub fn insert(&self, id: &BookId, config: BookConfig, depth: usize, recents_len: usize) {
        for side in [Side::Buy, Side::Sell] {
            for slot in 0..depth {
                self.levels.insert(
                    LevelKey {
                        book: id.clone(),
                        side,
                        slot,
                    },
                    LevelState::empty(),
                );
            }
        }
        self.books.insert(
            id.clone(),
            BookState {
                config,
                user_buys: Vec::new(),
                user_sells: Vec::new(),
                user_buy_levels: HashMap::new(),
                user_sell_levels: HashMap::new(),
                recents: vec![None; recents_len],
                form: OrderForm::default(),
            },
        );
    }

    pub fn get(&self, id: &BookId) -> Option<BookState> {
        self.books.get(id).map(|b| b.clone())
    }

    pub fn update<R>(&self, id: &BookId, f: impl FnOnce(&mut BookState) -> R) -> Option<R> {
        self.books.get_mut(id).map(|mut b| f(&mut b))
    }

    pub fn level(&self, key: &LevelKey) -> Option<LevelState> {
        self.levels.get(key).map(|l| l.clone())
    }

    pub fn set_level(&self, key: LevelKey, state: LevelState) {
        self.levels.insert(key, state);
    }

    pub fn count(&self) -> usize {
        self.books.len()
    }
}
