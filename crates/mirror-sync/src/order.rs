use std::sync::Arc;

use tracing::debug;

use mirror_core::types::{BookId, OrderId, TradeId};
use mirror_core::{EventBus, MirrorConfig};
use mirror_ledger::BookLedger;
use mirror_store::MirrorStore;

use crate::wait::{wait_for_refresh, Waited};
use crate::{backoff, pages};

/// Poll loop for one tracked order's trade participation. Spawned when the
/// order is first hydrated; paginates the order's trade-ID list from the
/// last known cursor and registers unseen trades for hydration. The list is
/// append-only, so the cursor never rewinds.
pub struct OrderTradesSync {
    book: BookId,
    id: OrderId,
    ledger: Arc<dyn BookLedger>,
    store: Arc<MirrorStore>,
    bus: Arc<EventBus>,
    config: MirrorConfig,
}

impl OrderTradesSync {
    pub fn new(
        book: BookId,
        id: OrderId,
        ledger: Arc<dyn BookLedger>,
        store: Arc<MirrorStore>,
        bus: Arc<EventBus>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            book,
            id,
            ledger,
            store,
            bus,
            config,
        }
    }

    /// One iteration: fetch pages past the last known trade ID, append them
    /// to the order, and queue unknown trades for hydration.
    async fn poll_once(&self) -> bool {
        let cursor = self
            .store
            .orders
            .get(self.id)
            .and_then(|order| order.trades.last().copied());

        let fetched: Vec<TradeId> = match pages::drain(
            cursor,
            |id: &TradeId| *id,
            |c| self.ledger.order_trades_of(self.id, c, None),
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                self.bus.error("order trades poll", &e);
                return false;
            }
        };
        if fetched.is_empty() {
            return false;
        }

        for tid in &fetched {
            self.store.trades.register(*tid);
        }
        debug!(book = %self.book, order = %self.id, new = fetched.len(), "order trades appended");
        self.store
            .orders
            .update(self.id, |order| order.trades.extend(fetched.iter().copied()));
        true
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

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::types::{AccountId, BookConfig, Side, TokenId};
    use mirror_ledger::sim::{SimOrder, SimTrade};
    use mirror_ledger::{LedgerConnector, SimExchange};

    fn book_config() -> BookConfig {
        BookConfig {
            base: TokenId::new("base"),
            quote: TokenId::new("quote"),
            maker_fee_num: 1,
            taker_fee_num: 2,
            fee_denom: 1000,
            close_fee_base: 0,
            close_fee_quote: 0,
        }
    }

    fn trade(sell: OrderId, buy: OrderId) -> SimTrade {
        SimTrade {
            sell_id: sell.0,
            buy_id: buy.0,
            base: 10,
            quote: 1000,
            sell_fee: 1,
            buy_fee: 1,
            executed_at: 1,
            block: 1,
        }
    }

    #[tokio::test]
    async fn appends_new_trades_and_registers_them() {
        let sim = SimExchange::with_page_size(2);
        let book = BookId::new("bk");
        sim.add_book(&book, book_config());
        let owner = AccountId::from_text("bob-aaaaa").unwrap();
        let sell = sim.insert_order(&book, SimOrder::open(Side::Sell, owner.clone(), 100, 50));
        let buy = sim.insert_order(&book, SimOrder::open(Side::Buy, owner, 100, 50));

        let t1 = sim.insert_trade(&book, trade(sell, buy));
        let t2 = sim.insert_trade(&book, trade(sell, buy));
        let t3 = sim.insert_trade(&book, trade(sell, buy));

        let store = Arc::new(MirrorStore::new());
        store.orders.register(sell);
        let sync = OrderTradesSync::new(
            book.clone(),
            sell,
            sim.book(&book),
            store.clone(),
            Arc::new(EventBus::new()),
            MirrorConfig::from_env(),
        );

        assert!(sync.poll_once().await);
        let order = store.orders.get(sell).unwrap();
        assert_eq!(order.trades, vec![t1, t2, t3]);
        for tid in [t1, t2, t3] {
            assert!(store.trades.contains(tid));
        }

        // nothing new: unchanged
        assert!(!sync.poll_once().await);

        // a later trade resumes from the stored cursor
        let t4 = sim.insert_trade(&book, trade(sell, buy));
        assert!(sync.poll_once().await);
        assert_eq!(store.orders.get(sell).unwrap().trades.last(), Some(&t4));
    }

    #[tokio::test]
    async fn transient_failure_leaves_the_cursor_alone() {
        let sim = SimExchange::new();
        let book = BookId::new("bk");
        sim.add_book(&book, book_config());
        let owner = AccountId::from_text("bob-aaaaa").unwrap();
        let sell = sim.insert_order(&book, SimOrder::open(Side::Sell, owner.clone(), 100, 50));
        let buy = sim.insert_order(&book, SimOrder::open(Side::Buy, owner, 100, 50));
        let t1 = sim.insert_trade(&book, trade(sell, buy));

        let store = Arc::new(MirrorStore::new());
        store.orders.register(sell);
        let sync = OrderTradesSync::new(
            book.clone(),
            sell,
            sim.book(&book),
            store.clone(),
            Arc::new(EventBus::new()),
            MirrorConfig::from_env(),
        );

        sim.fail_on("book.order_trades_of");
        assert!(!sync.poll_once().await);
        assert!(store.orders.get(sell).unwrap().trades.is_empty());

        sim.recover("book.order_trades_of");
        assert!(sync.poll_once().await);
        assert_eq!(store.orders.get(sell).unwrap().trades, vec![t1]);
    }
}
