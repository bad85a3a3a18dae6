use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::try_join;
use tracing::{debug, info};

use mirror_core::types::{AccountId, BookId, OrderId, Side, TokenMeta, TradeId};
use mirror_core::{EventBus, MirrorConfig, MirrorError, Result, Session};
use mirror_ledger::{BookLedger, TxReceipt};
use mirror_store::MirrorStore;

use crate::order::OrderTradesSync;
use crate::price::PriceLevelSync;
use crate::wait::{wait_for_refresh, Waited};
use crate::{backoff, diff, pages};

/// Aggregate poll loop for one book.
///
/// Owns everything the per-slot level tasks do not: steering the level slots
/// to the current best ask/bid tiers, the authenticated user's price-level
/// index and order-ID lists, order scalar hydration, the recent-trades ring,
/// trade hydration, and the order lifecycle sweep. Also carries the two
/// book-side mutating operations, `open` and `close`.
pub struct BookSync {
    id: BookId,
    ledger: Arc<dyn BookLedger>,
    store: Arc<MirrorStore>,
    session: Arc<Session>,
    bus: Arc<EventBus>,
    config: MirrorConfig,
    ask_steer: Vec<watch::Sender<u128>>,
    bid_steer: Vec<watch::Sender<u128>>,
    /// Orders that already have a trade-list poller running.
    spawned: Mutex<HashSet<OrderId>>,
}

impl BookSync {
    pub fn new(
        id: BookId,
        ledger: Arc<dyn BookLedger>,
        store: Arc<MirrorStore>,
        session: Arc<Session>,
        bus: Arc<EventBus>,
        config: MirrorConfig,
    ) -> Self {
        let ask_steer = (0..config.book_depth).map(|_| watch::channel(0u128).0).collect();
        let bid_steer = (0..config.book_depth).map(|_| watch::channel(0u128).0).collect();
        Self {
            id,
            ledger,
            store,
            session,
            bus,
            config,
            ask_steer,
            bid_steer,
            spawned: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &BookId {
        &self.id
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        // static parameters come first and failing to get them disables the
        // whole book subtree
        let book_config = match self.ledger.config().await {
            Ok(config) => config,
            Err(e) => {
                self.bus.error("book config", &e);
                return Err(e);
            }
        };
        self.store.books.insert(
            &self.id,
            book_config,
            self.config.book_depth,
            self.config.recent_trades,
        );
        info!(book = %self.id, depth = self.config.book_depth, "book configured");

        for (side, steers) in [(Side::Sell, &self.ask_steer), (Side::Buy, &self.bid_steer)] {
            for (slot, steer) in steers.iter().enumerate() {
                let task = Arc::new(PriceLevelSync::new(
                    self.id.clone(),
                    side,
                    slot,
                    self.ledger.clone(),
                    self.store.clone(),
                    self.bus.clone(),
                    self.config.clone(),
                    steer.subscribe(),
                ));
                tokio::spawn(task.run());
            }
        }

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

    /// One aggregate iteration. Sub-polls are sequential; the fan-out
    /// happens inside each one, and each one joins its own calls before
    /// touching the mirror.
    async fn poll_once(&self) -> bool {
        let mut changed = false;
        self.steer_levels().await;
        if let Some(account) = self.session.current() {
            changed |= self.poll_user_levels(&account).await;
            changed |= self.poll_user_orders(&account).await;
        }
        changed |= self.hydrate_orders().await;
        changed |= self.poll_recents().await;
        changed |= self.hydrate_trades().await;
        changed |= self.poll_lifecycle().await;
        changed
    }

    /// Fetch the best-N tiers and point each level slot at its price; slots
    /// past the end of the book are steered to 0 (EMPTY). The level tasks
    /// report their own changes.
    async fn steer_levels(&self) {
        let fetched = try_join!(
            self.ledger.ask_prices(Some(self.ask_steer.len())),
            self.ledger.bid_prices(Some(self.bid_steer.len())),
        );
        match fetched {
            Ok((asks, bids)) => {
                for (slot, steer) in self.ask_steer.iter().enumerate() {
                    let _ = steer.send(asks.get(slot).copied().unwrap_or(0));
                }
                for (slot, steer) in self.bid_steer.iter().enumerate() {
                    let _ = steer.send(bids.get(slot).copied().unwrap_or(0));
                }
            }
            Err(e) => self.bus.error("book prices", &e),
        }
    }

    /// Re-walk the user's open price levels on both sides and replace the
    /// mirrored index when membership changed.
    async fn poll_user_levels(&self, account: &AccountId) -> bool {
        let mut changed = false;
        for side in [Side::Buy, Side::Sell] {
            let fetched = pages::drain(
                None,
                |(price, _): &(u128, OrderId)| *price,
                |cursor| match side {
                    Side::Buy => self.ledger.buy_levels_of(account, cursor, None),
                    Side::Sell => self.ledger.sell_levels_of(account, cursor, None),
                },
            )
            .await;
            match fetched {
                Ok(pairs) => {
                    let levels: HashMap<u128, OrderId> = pairs.into_iter().collect();
                    for id in levels.values() {
                        self.store.orders.register(*id);
                    }
                    changed |= self
                        .store
                        .books
                        .update(&self.id, |book| {
                            let target = match side {
                                Side::Buy => &mut book.user_buy_levels,
                                Side::Sell => &mut book.user_sell_levels,
                            };
                            if diff::maps_equal(target, &levels) {
                                false
                            } else {
                                *target = levels;
                                true
                            }
                        })
                        .unwrap_or(false);
                }
                Err(e) => self.bus.error("user levels poll", &e),
            }
        }
        changed
    }

    /// Extend the user's order-ID lists from the last known ID, deduplicated
    /// through a set lookup.
    async fn poll_user_orders(&self, account: &AccountId) -> bool {
        let mut changed = false;
        for side in [Side::Buy, Side::Sell] {
            let cursor = self.store.books.get(&self.id).and_then(|book| match side {
                Side::Buy => book.user_buys.last().copied(),
                Side::Sell => book.user_sells.last().copied(),
            });
            let fetched = pages::drain(
                cursor,
                |id: &OrderId| *id,
                |c| match side {
                    Side::Buy => self.ledger.buy_orders_of(account, c, None),
                    Side::Sell => self.ledger.sell_orders_of(account, c, None),
                },
            )
            .await;
            match fetched {
                Ok(ids) if !ids.is_empty() => {
                    for id in &ids {
                        self.store.orders.register(*id);
                    }
                    changed |= self
                        .store
                        .books
                        .update(&self.id, |book| {
                            let list = match side {
                                Side::Buy => &mut book.user_buys,
                                Side::Sell => &mut book.user_sells,
                            };
                            let known: HashSet<OrderId> = list.iter().copied().collect();
                            let mut appended = false;
                            for id in ids {
                                if !known.contains(&id) {
                                    list.push(id);
                                    appended = true;
                                }
                            }
                            appended
                        })
                        .unwrap_or(false);
                }
                Ok(_) => {}
                Err(e) => self.bus.error("user orders poll", &e),
            }
        }
        changed
    }

    /// Drain the pending-order queue and fill in scalar fields through one
    /// joined fan-out of per-field batch queries. A failed fan-out requeues
    /// the whole batch for the next iteration.
    async fn hydrate_orders(&self) -> bool {
        let ids = self.store.orders.take_pending();
        if ids.is_empty() {
            return false;
        }
        let fetched = try_join!(
            self.ledger.order_sides_of(&ids),
            self.ledger.order_owners_of(&ids),
            self.ledger.order_blocks_of(&ids),
            self.ledger.order_executions_of(&ids),
            self.ledger.order_prices_of(&ids),
            self.ledger.order_expiries_of(&ids),
            self.ledger.order_initials_of(&ids),
            self.ledger.order_subaccounts_of(&ids),
            self.ledger.order_created_of(&ids),
        );
        let (sides, owners, blocks, executions, prices, expiries, initials, subaccounts, createds) =
            match fetched {
                Ok(batch) => batch,
                Err(e) => {
                    self.bus.error("order hydration", &e);
                    self.store.orders.requeue(ids);
                    return false;
                }
            };

        for (i, id) in ids.iter().enumerate() {
            self.store.orders.update(*id, |order| {
                order.side = sides.get(i).copied().flatten();
                order.owner = owners.get(i).cloned().flatten();
                order.block = blocks.get(i).copied().flatten();
                order.executions = executions.get(i).copied().flatten().unwrap_or(0);
                order.price = prices.get(i).copied().flatten().unwrap_or(0);
                order.expires_at = expiries.get(i).copied().flatten();
                order.amount.initial = initials.get(i).copied().flatten().unwrap_or(0);
                order.subaccount = subaccounts.get(i).cloned().flatten();
                order.created_at = createds.get(i).copied().flatten();
            });
            self.spawn_trade_poller(*id);
        }
        debug!(book = %self.id, count = ids.len(), "orders hydrated");
        true
    }

    fn spawn_trade_poller(&self, id: OrderId) {
        if !self.spawned.lock().insert(id) {
            return;
        }
        let task = Arc::new(OrderTradesSync::new(
            self.id.clone(),
            id,
            self.ledger.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.config.clone(),
        ));
        tokio::spawn(task.run());
    }

    /// Refresh the fixed-size ring of most recent trades. Compared slot-wise
    /// rather than as a set: position is display order.
    async fn poll_recents(&self) -> bool {
        let len = self.config.recent_trades;
        match self.ledger.trade_ids(Some(len)).await {
            Ok(tids) => {
                for tid in &tids {
                    self.store.trades.register(*tid);
                }
                let mut ring: Vec<Option<TradeId>> = tids.into_iter().map(Some).collect();
                ring.resize(len, None);
                self.store
                    .books
                    .update(&self.id, |book| {
                        if book.recents == ring {
                            false
                        } else {
                            book.recents = ring;
                            true
                        }
                    })
                    .unwrap_or(false)
            }
            Err(e) => {
                self.bus.error("recent trades poll", &e);
                false
            }
        }
    }

    /// Drain the pending-trade queue and fill in trade fields through one
    /// joined fan-out of per-field batch queries.
    async fn hydrate_trades(&self) -> bool {
        let ids = self.store.trades.take_pending();
        if ids.is_empty() {
            return false;
        }
        let fetched = try_join!(
            self.ledger.trade_sell_ids_of(&ids),
            self.ledger.trade_buy_ids_of(&ids),
            self.ledger.trade_bases_of(&ids),
            self.ledger.trade_quotes_of(&ids),
            self.ledger.trade_sell_fees_of(&ids),
            self.ledger.trade_buy_fees_of(&ids),
            self.ledger.trade_executed_of(&ids),
            self.ledger.trade_blocks_of(&ids),
        );
        let (sell_ids, buy_ids, bases, quotes, sell_fees, buy_fees, executed_ats, blocks) =
            match fetched {
                Ok(batch) => batch,
                Err(e) => {
                    self.bus.error("trade hydration", &e);
                    self.store.trades.requeue(ids);
                    return false;
                }
            };

        for (i, id) in ids.iter().enumerate() {
            self.store.trades.update(*id, |trade| {
                trade.sell_id = sell_ids.get(i).copied().flatten();
                trade.buy_id = buy_ids.get(i).copied().flatten();
                trade.base = bases.get(i).copied().flatten().unwrap_or(0);
                trade.quote = quotes.get(i).copied().flatten().unwrap_or(0);
                trade.sell_fee = sell_fees.get(i).copied().flatten().unwrap_or(0);
                trade.buy_fee = buy_fees.get(i).copied().flatten().unwrap_or(0);
                trade.executed_at = executed_ats.get(i).copied().flatten();
                trade.block = blocks.get(i).copied().flatten();
            });
        }
        debug!(book = %self.id, count = ids.len(), "trades hydrated");
        true
    }

    /// Re-fetch the four mutable fields for every tracked order and diff
    /// each field individually.
    async fn poll_lifecycle(&self) -> bool {
        let ids = self.store.orders.ids();
        if ids.is_empty() {
            return false;
        }
        let fetched = try_join!(
            self.ledger.order_closed_at_of(&ids),
            self.ledger.order_closed_reasons_of(&ids),
            self.ledger.order_locked_of(&ids),
            self.ledger.order_filled_of(&ids),
        );
        let (closed_ats, reasons, lockeds, filleds) = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                self.bus.error("order lifecycle poll", &e);
                return false;
            }
        };

        let mut changed = false;
        for (i, id) in ids.iter().enumerate() {
            changed |= self
                .store
                .orders
                .update(*id, |order| {
                    let mut touched = false;
                    let closed_at = closed_ats.get(i).copied().flatten();
                    if order.closed_at != closed_at {
                        order.closed_at = closed_at;
                        touched = true;
                    }
                    let reason = reasons.get(i).cloned().flatten();
                    if order.closed_reason != reason {
                        order.closed_reason = reason;
                        touched = true;
                    }
                    if let Some(locked) = lockeds.get(i).copied().flatten() {
                        if order.amount.locked != locked {
                            order.amount.locked = locked;
                            touched = true;
                        }
                    }
                    if let Some(filled) = filleds.get(i).copied().flatten() {
                        if order.amount.filled != filled {
                            order.amount.filled = filled;
                            touched = true;
                        }
                    }
                    touched
                })
                .unwrap_or(false);
        }
        changed
    }

    fn parse_positive(&self, meta: &TokenMeta, text: &str, what: &str) -> Result<u128> {
        match meta.to_raw(text) {
            Ok(0) => {
                let e = MirrorError::InvalidAmount(format!("{what} must be positive"));
                self.bus.error("order entry", &e);
                Err(e)
            }
            Ok(raw) => Ok(raw),
            Err(e) => {
                self.bus.error("order entry", &e);
                Err(e)
            }
        }
    }

    /// Validate and submit a new order. On settlement the entry form is
    /// reset and a refresh broadcast forces every task back to fast polling;
    /// on rejection the typed fields stay put for resubmission.
    pub async fn open(&self, side: Side, price_text: &str, amount_text: &str) -> Result<TxReceipt> {
        let book = self
            .store
            .books
            .get(&self.id)
            .ok_or_else(|| MirrorError::Init(format!("book {} not configured", self.id)))?;
        let quote_meta = self
            .store
            .tokens
            .meta(&book.config.quote)
            .ok_or_else(|| MirrorError::MetadataMissing(book.config.quote.to_string()))?;
        let base_meta = self
            .store
            .tokens
            .meta(&book.config.base)
            .ok_or_else(|| MirrorError::MetadataMissing(book.config.base.to_string()))?;

        let price = self.parse_positive(&quote_meta, price_text, "price")?;
        let amount = self.parse_positive(&base_meta, amount_text, "amount")?;

        let claimed = self
            .store
            .books
            .update(&self.id, |book| {
                if book.form.busy {
                    false
                } else {
                    book.form.busy = true;
                    true
                }
            })
            .unwrap_or(false);
        if !claimed {
            return Err(MirrorError::Busy);
        }

        let result = self.ledger.place(side, price, amount).await;
        match &result {
            Ok(TxReceipt::Settled(block)) => {
                self.store.books.update(&self.id, |book| {
                    book.form.busy = false;
                    book.form.price.clear();
                    book.form.amount.clear();
                });
                self.bus.success("order placed", block);
                self.bus.refresh();
            }
            Ok(TxReceipt::Rejected(reason)) => {
                self.store.books.update(&self.id, |book| book.form.busy = false);
                self.bus.error("order rejected", reason);
            }
            Err(e) => {
                self.store.books.update(&self.id, |book| book.form.busy = false);
                self.bus.error("order placement", e);
            }
        }
        result
    }

    /// Cancel one or more orders. Settlement broadcasts a refresh instead of
    /// waiting for the next natural poll to observe the closure.
    pub async fn close(&self, ids: &[OrderId]) -> Result<TxReceipt> {
        if ids.is_empty() {
            let e = MirrorError::InvalidAmount("no orders selected".into());
            self.bus.error("order close", &e);
            return Err(e);
        }
        let result = self.ledger.cancel(ids).await;
        match &result {
            Ok(TxReceipt::Settled(block)) => {
                self.bus.success("orders closed", block);
                self.bus.refresh();
            }
            Ok(TxReceipt::Rejected(reason)) => self.bus.error("close rejected", reason),
            Err(e) => self.bus.error("order close", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::types::BookConfig;
    use mirror_core::types::TokenId;
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

    fn meta(symbol: &str) -> TokenMeta {
        TokenMeta {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 8,
            fee: 10,
        }
    }

    fn account(text: &str) -> AccountId {
        AccountId::from_text(text).unwrap()
    }

    struct Fixture {
        sim: SimExchange,
        book: BookId,
        store: Arc<MirrorStore>,
        session: Arc<Session>,
        bus: Arc<EventBus>,
        sync: BookSync,
    }

    fn fixture() -> Fixture {
        let sim = SimExchange::with_page_size(2);
        let book = BookId::new("bk");
        sim.add_book(&book, book_config());

        let store = Arc::new(MirrorStore::new());
        let config = MirrorConfig::from_env();
        store.books.insert(&book, book_config(), config.book_depth, config.recent_trades);
        store.tokens.set_meta(&TokenId::new("base"), meta("BASE"));
        store.tokens.set_meta(&TokenId::new("quote"), meta("QUOTE"));

        let session = Arc::new(Session::new());
        let bus = Arc::new(EventBus::new());
        let sync = BookSync::new(
            book.clone(),
            sim.book(&book),
            store.clone(),
            session.clone(),
            bus.clone(),
            config,
        );
        Fixture {
            sim,
            book,
            store,
            session,
            bus,
            sync,
        }
    }

    #[tokio::test]
    async fn discovers_and_hydrates_user_orders() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.session.sign_in(alice.clone());
        f.sim.set_actor(&alice);

        let buy = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice.clone(), 90, 40));
        let sell = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Sell, alice.clone(), 110, 60));

        assert!(f.sync.poll_once().await);

        let state = f.store.books.get(&f.book).unwrap();
        assert_eq!(state.user_buys, vec![buy]);
        assert_eq!(state.user_sells, vec![sell]);
        assert_eq!(state.user_buy_levels.get(&90), Some(&buy));
        assert_eq!(state.user_sell_levels.get(&110), Some(&sell));

        // hydration landed scalar fields in the arena
        let mirrored = f.store.orders.get(buy).unwrap();
        assert_eq!(mirrored.side, Some(Side::Buy));
        assert_eq!(mirrored.owner, Some(alice));
        assert_eq!(mirrored.price, 90);
        assert_eq!(mirrored.amount.initial, 40);

        // steady state: nothing new
        assert!(!f.sync.poll_once().await);
    }

    #[tokio::test]
    async fn user_order_lists_dedupe_and_resume() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.session.sign_in(alice.clone());

        let first = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice.clone(), 90, 40));
        assert!(f.sync.poll_once().await);
        assert!(!f.sync.poll_once().await);

        let second = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice.clone(), 91, 40));
        assert!(f.sync.poll_once().await);

        let state = f.store.books.get(&f.book).unwrap();
        assert_eq!(state.user_buys, vec![first, second]);
    }

    #[tokio::test]
    async fn recents_ring_is_slot_wise() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        let sell = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Sell, alice.clone(), 100, 50));
        let buy = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice, 100, 50));

        let t1 = f.sim.insert_trade(
            &f.book,
            SimTrade {
                sell_id: sell.0,
                buy_id: buy.0,
                base: 10,
                quote: 1000,
                sell_fee: 1,
                buy_fee: 1,
                executed_at: 1,
                block: 1,
            },
        );

        assert!(f.sync.poll_once().await);
        let state = f.store.books.get(&f.book).unwrap();
        assert_eq!(state.recents[0], Some(t1));
        assert!(state.recents[1..].iter().all(Option::is_none));

        // trade got hydrated in the same iteration it was registered
        let trade = f.store.trades.get(t1).unwrap();
        assert_eq!(trade.sell_id, Some(sell));
        assert_eq!(trade.buy_id, Some(buy));
        assert_eq!(trade.base, 10);

        // a newer trade shifts the ring: slot-wise change even though the
        // old ID is still present
        let t2 = f.sim.insert_trade(
            &f.book,
            SimTrade {
                sell_id: sell.0,
                buy_id: buy.0,
                base: 5,
                quote: 500,
                sell_fee: 1,
                buy_fee: 1,
                executed_at: 2,
                block: 2,
            },
        );
        assert!(f.sync.poll_once().await);
        let state = f.store.books.get(&f.book).unwrap();
        assert_eq!(state.recents[0], Some(t2));
        assert_eq!(state.recents[1], Some(t1));
    }

    #[tokio::test]
    async fn lifecycle_sweep_diffs_each_field() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.session.sign_in(alice.clone());
        let buy = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice, 90, 40));

        assert!(f.sync.poll_once().await);
        assert!(!f.sync.poll_once().await);

        f.sim.set_order_fill(&f.book, buy, 5, 10);
        assert!(f.sync.poll_once().await);
        let order = f.store.orders.get(buy).unwrap();
        assert_eq!(order.amount.locked, 5);
        assert_eq!(order.amount.filled, 10);
        assert!(order.amount.is_consistent());

        f.sim.close_sim_order(&f.book, buy, "expired");
        assert!(f.sync.poll_once().await);
        let order = f.store.orders.get(buy).unwrap();
        assert!(order.closed_at.is_some());
        assert_eq!(order.closed_reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn failed_hydration_requeues_the_batch() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.session.sign_in(alice.clone());
        f.sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice, 90, 40));

        f.sim.fail_on("book.order_sides_of");
        f.sync.poll_once().await;
        // batch went back on the queue and retries once the fault clears
        f.sim.recover("book.order_sides_of");
        assert!(f.sync.poll_once().await);
        let ids = f.store.orders.ids();
        assert_eq!(ids.len(), 1);
        assert!(f.store.orders.get(ids[0]).unwrap().is_hydrated());
    }

    #[tokio::test]
    async fn open_resets_the_form_and_broadcasts_refresh() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.session.sign_in(alice.clone());
        f.sim.set_actor(&alice);
        f.store.books.update(&f.book, |book| {
            book.form.price = "1.5".into();
            book.form.amount = "2".into();
        });

        let mut refresh = f.bus.subscribe_refresh();
        let receipt = f.sync.open(Side::Buy, "1.5", "2").await.unwrap();
        assert!(receipt.is_settled());
        assert!(refresh.try_recv().is_ok());

        let form = f.store.books.get(&f.book).unwrap().form;
        assert!(form.price.is_empty());
        assert!(form.amount.is_empty());
        assert!(!form.busy);
    }

    #[tokio::test]
    async fn open_rejects_bad_input_without_a_network_call() {
        let f = fixture();
        f.sim.reset_calls();
        assert!(f.sync.open(Side::Buy, "0", "2").await.is_err());
        assert!(f.sync.open(Side::Buy, "1.5", "abc").await.is_err());
        assert!(f.sim.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_open_keeps_the_typed_fields() {
        let f = fixture();
        // no actor signed in on the sim side: the ledger rejects
        f.store.books.update(&f.book, |book| {
            book.form.price = "1.5".into();
            book.form.amount = "2".into();
        });
        let mut refresh = f.bus.subscribe_refresh();
        let receipt = f.sync.open(Side::Buy, "1.5", "2").await.unwrap();
        assert!(matches!(receipt, TxReceipt::Rejected(_)));
        assert!(refresh.try_recv().is_err());

        let form = f.store.books.get(&f.book).unwrap().form;
        assert_eq!(form.price, "1.5");
        assert_eq!(form.amount, "2");
        assert!(!form.busy);
    }

    #[tokio::test]
    async fn close_settles_and_refreshes() {
        let f = fixture();
        let alice = account("alice-2dq3k");
        f.sim.set_actor(&alice);
        let buy = f
            .sim
            .insert_order(&f.book, SimOrder::open(Side::Buy, alice, 90, 40));

        let mut refresh = f.bus.subscribe_refresh();
        let receipt = f.sync.close(&[buy]).await.unwrap();
        assert!(receipt.is_settled());
        assert!(refresh.try_recv().is_ok());

        assert!(f.sync.close(&[]).await.is_err());
    }
}
