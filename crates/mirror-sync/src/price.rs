use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use mirror_core::types::{Amount, BookId, LevelState, OrderId, Side};
use mirror_core::{EventBus, MirrorConfig, Result};
use mirror_ledger::BookLedger;
use mirror_store::{LevelKey, MirrorStore};

use crate::wait::{wait_for_refresh, Waited};
use crate::{backoff, diff, pages};

/// Poll loop for one displayed price-level slot on one side of a book.
///
/// The slot is EMPTY while its price is 0 and makes no network calls; the
/// book task steers it to a tier through the `desired` watch channel. While
/// ACTIVE it paginates the orders resident at its price, registers unknown
/// IDs for hydration, and sums the amounts of the ones already hydrated.
pub struct PriceLevelSync {
    book: BookId,
    side: Side,
    slot: usize,
    ledger: Arc<dyn BookLedger>,
    store: Arc<MirrorStore>,
    bus: Arc<EventBus>,
    config: MirrorConfig,
    desired: watch::Receiver<u128>,
}

impl PriceLevelSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        book: BookId,
        side: Side,
        slot: usize,
        ledger: Arc<dyn BookLedger>,
        store: Arc<MirrorStore>,
        bus: Arc<EventBus>,
        config: MirrorConfig,
        desired: watch::Receiver<u128>,
    ) -> Self {
        Self {
            book,
            side,
            slot,
            ledger,
            store,
            bus,
            config,
            desired,
        }
    }

    fn key(&self) -> LevelKey {
        LevelKey {
            book: self.book.clone(),
            side: self.side,
            slot: self.slot,
        }
    }

    /// Paginate every order resident at `price`. Orders not yet in the
    /// shared mirror are registered for hydration and excluded from the sum
    /// until hydrated.
    async fn collect(&self, price: u128) -> Result<(HashSet<OrderId>, Amount)> {
        let ids = pages::drain(
            None,
            |id: &OrderId| *id,
            |cursor| match self.side {
                Side::Sell => self.ledger.asks_at(price, cursor, None),
                Side::Buy => self.ledger.bids_at(price, cursor, None),
            },
        )
        .await?;

        let mut oids = HashSet::with_capacity(ids.len());
        let mut base = Amount::default();
        for id in ids {
            if !oids.insert(id) {
                continue;
            }
            match self.store.orders.get(id) {
                Some(order) if order.is_hydrated() => base.add(&order.amount),
                // still fetching; excluded from the sum until hydrated
                Some(_) => {}
                None => {
                    self.store.orders.register(id);
                }
            }
        }
        Ok((oids, base))
    }

    /// One iteration; true if the mirror changed and a render is due.
    async fn poll_once(&self) -> bool {
        let key = self.key();
        let price = self.store.books.level(&key).map(|l| l.price).unwrap_or(0);
        let desired = *self.desired.borrow();

        if desired != price {
            // adopt the steering signal; the mirrored tier starts over
            self.store.books.set_level(
                key.clone(),
                LevelState {
                    price: desired,
                    ..LevelState::empty()
                },
            );
            if desired == 0 {
                debug!(book = %self.book, side = ?self.side, slot = self.slot, "level emptied");
                // the one transition into EMPTY renders, clearing stale rows
                return true;
            }
        }
        let price = desired;
        if price == 0 {
            // EMPTY: no network call, nothing changed
            return false;
        }

        match self.collect(price).await {
            Ok((oids, base)) => {
                let prev = self
                    .store
                    .books
                    .level(&key)
                    .map(|l| l.oids)
                    .unwrap_or_default();
                let changed = !diff::sets_equal(&prev, &oids);
                if oids.is_empty() {
                    // tier drained remotely; sit EMPTY until re-steered
                    self.store.books.set_level(key, LevelState::empty());
                } else {
                    self.store.books.set_level(key, LevelState { price, oids, base });
                }
                changed
            }
            Err(e) => {
                self.bus.error("price level poll", &e);
                false
            }
        }
    }

    pub async fn run(self: Arc<Self>) {
        let cadence = self.config.cadence;
        let mut delay = cadence.floor;
        loop {
            let changed = self.poll_once().await;
            if changed {
                self.bus.render();
            }
            delay = backoff::next(cadence, changed, delay);
            if wait_for_refresh(&self.bus, delay).await == Waited::Refreshed {
                delay = cadence.floor;
            }
        }
    }
}
