use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use mirror_core::types::{Trade, TradeId};

/// Flat arena of mirrored trades keyed by ID, same shape and discipline as
/// the order arena.
#[derive(Debug, Default)]
pub struct TradeStore {
    trades: DashMap<TradeId, Trade>,
    pending: Mutex<Vec<TradeId>>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly discovered trade; queue it for hydration. Returns false
    /// if it is already tracked.
    pub fn register(&self, id: TradeId) -> bool {
        if self.trades.contains_key(&id) {
            return false;
        }
        self.trades.insert(id, Trade::placeholder(id));
        self.pending.lock().push(id);
        debug!(trade = %id, "trade registered for hydration");
        true
    }

    pub fn take_pending(&self) -> Vec<TradeId> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn requeue(&self, ids: Vec<TradeId>) {
        let mut pending = self.pending.lock();
        for id in ids {
            if !pending.contains(&id) {
                pending.push(id);
            }
        }
    }

    pub fn contains(&self, id: TradeId) -> bool {
        self.trades.contains_key(&id)
    }

    pub fn get(&self, id: TradeId) -> Option<Trade> {
        self.trades.get(&id).map(|t| t.clone())
    }

    pub fn update<R>(&self, id: TradeId, f: impl FnOnce(&mut Trade) -> R) -> Option<R> {
        self.trades.get_mut(&id).map(|mut t| f(&mut t))
    }

    pub fn count(&self) -> usize {
        self.trades.len()
    }
}
