use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use mirror_core::types::{Order, OrderId};

/// Flat arena of mirrored orders keyed by ID. Cross-references between
/// entities are IDs resolved through this map at read time, never embedded
/// pointers. The book task is the only writer of order fields; every other
/// task only registers IDs it discovers.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: DashMap<OrderId, Order>,
    /// IDs awaiting scalar hydration, in discovery order.
    pending: Mutex<Vec<OrderId>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly discovered order: insert a placeholder and queue it for
    /// hydration. Returns false (and does nothing) if it is already tracked.
    pub fn register(&self, id: OrderId) -> bool {
        if self.orders.contains_key(&id) {
            return false;
        }
        self.orders.insert(id, Order::placeholder(id));
        self.pending.lock().push(id);
        debug!(order = %id, "order registered for hydration");
        true
    }

    /// Drain the hydration queue.
    pub fn take_pending(&self) -> Vec<OrderId> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Put IDs back on the queue after a failed hydration pass so the next
    /// iteration retries them.
    pub fn requeue(&self, ids: Vec<OrderId>) {
        let mut pending = self.pending.lock();
        for id in ids {
            if !pending.contains(&id) {
                pending.push(id);
            }
        }
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|o| o.clone())
    }

    /// Apply a mutation to one order, returning the closure's result.
    /// `None` if the order is not tracked.
    pub fn update<R>(&self, id: OrderId, f: impl FnOnce(&mut Order) -> R) -> Option<R> {
        self.orders.get_mut(&id).map(|mut o| f(&mut o))
    }

    /// All tracked IDs, ascending, for the lifecycle batch fetch.
    pub fn ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.orders.iter().map(|o| *o.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn count(&self) -> usize {
        self.orders.len()
    }
}
