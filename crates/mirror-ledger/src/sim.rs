//! Deterministic in-memory exchange implementing the ledger traits.
//!
//! Serves two purposes: the demo backend for the binary, and the test double
//! for the sync tasks. State is seeded through the builder methods; every
//! trait call is appended to a call log so tests can assert exactly which
//! remote calls were made and in what order, and any method can be forced to
//! fail by its `kind.method` key to exercise the transient-error paths.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mirror_core::time::now_nanos;
use mirror_core::types::{
    AccountId, Allowance, BookConfig, BookId, OrderId, Side, TokenId, TokenMeta, TradeId,
};
use mirror_core::{MirrorError, Result};

use crate::api::{BookLedger, LedgerConnector, TokenLedger, VaultLedger};
use crate::receipt::TxReceipt;

/// A seeded or placed order inside the simulator.
#[derive(Debug, Clone)]
pub struct SimOrder {
    pub side: Side,
    pub owner: AccountId,
    pub price: u128,
    pub initial: u128,
    pub locked: u128,
    pub filled: u128,
    pub executions: u64,
    pub block: u64,
    pub subaccount: Option<Vec<u8>>,
    pub created_at: u64,
    pub expires_at: u64,
    pub closed_at: Option<u64>,
    pub closed_reason: Option<String>,
    pub trades: Vec<u64>,
}

impl SimOrder {
    pub fn open(side: Side, owner: AccountId, price: u128, initial: u128) -> Self {
        Self {
            side,
            owner,
            price,
            initial,
            locked: 0,
            filled: 0,
            executions: 0,
            block: 0,
            subaccount: None,
            created_at: 0,
            expires_at: 0,
            closed_at: None,
            closed_reason: None,
            trades: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// A seeded trade inside the simulator.
#[derive(Debug, Clone)]
pub struct SimTrade {
    pub sell_id: u64,
    pub buy_id: u64,
    pub base: u128,
    pub quote: u128,
    pub sell_fee: u128,
    pub buy_fee: u128,
    pub executed_at: u64,
    pub block: u64,
}

#[derive(Debug)]
struct SimToken {
    meta: TokenMeta,
    balances: HashMap<AccountId, u128>,
    allowances: HashMap<AccountId, Allowance>,
}

#[derive(Debug)]
struct SimBook {
    config: BookConfig,
    orders: BTreeMap<u64, SimOrder>,
    trades: BTreeMap<u64, SimTrade>,
    /// Newest first.
    recent: Vec<u64>,
}

#[derive(Debug)]
struct SimState {
    /// Page size for cursor-paginated queries when the caller passes no limit.
    page: usize,
    actor: RwLock<Option<AccountId>>,
    tokens: DashMap<TokenId, SimToken>,
    books: DashMap<BookId, SimBook>,
    unlocked: RwLock<HashMap<(TokenId, AccountId), u128>>,
    withdrawal_fees: RwLock<HashMap<TokenId, u128>>,
    calls: Mutex<Vec<String>>,
    failing: RwLock<HashSet<String>>,
    next_block: AtomicU64,
    next_order: AtomicU64,
    next_trade: AtomicU64,
}

impl SimState {
    /// Log the call and fail it if an injected fault matches its key.
    fn record(&self, key: &str, entity: &str) -> Result<()> {
        self.calls.lock().push(format!("{key} {entity}"));
        if self.failing.read().contains(key) {
            return Err(MirrorError::Transport(format!("injected failure: {key}")));
        }
        Ok(())
    }

    fn actor(&self) -> Option<AccountId> {
        self.actor.read().clone()
    }

    fn settle(&self) -> u64 {
        self.next_block.fetch_add(1, Ordering::Relaxed)
    }
}

/// The simulated exchange; cheap to clone, shares its state.
#[derive(Clone)]
pub struct SimExchange {
    state: Arc<SimState>,
}

impl SimExchange {
    pub fn new() -> Self {
        Self::with_page_size(3)
    }

    pub fn with_page_size(page: usize) -> Self {
        Self {
            state: Arc::new(SimState {
                page: page.max(1),
                actor: RwLock::new(None),
                tokens: DashMap::new(),
                books: DashMap::new(),
                unlocked: RwLock::new(HashMap::new()),
                withdrawal_fees: RwLock::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                failing: RwLock::new(HashSet::new()),
                next_block: AtomicU64::new(1),
                next_order: AtomicU64::new(1),
                next_trade: AtomicU64::new(1),
            }),
        }
    }

    // ---- seeding -----------------------------------------------------------

    pub fn add_token(&self, id: &TokenId, meta: TokenMeta) {
        self.state.tokens.insert(
            id.clone(),
            SimToken {
                meta,
                balances: HashMap::new(),
                allowances: HashMap::new(),
            },
        );
    }

    pub fn add_book(&self, id: &BookId, config: BookConfig) {
        self.state.books.insert(
            id.clone(),
            SimBook {
                config,
                orders: BTreeMap::new(),
                trades: BTreeMap::new(),
                recent: Vec::new(),
            },
        );
    }

    pub fn credit(&self, token: &TokenId, account: &AccountId, amount: u128) {
        if let Some(mut t) = self.state.tokens.get_mut(token) {
            *t.balances.entry(account.clone()).or_default() += amount;
        }
    }

    pub fn grant_allowance(&self, token: &TokenId, account: &AccountId, allowance: Allowance) {
        if let Some(mut t) = self.state.tokens.get_mut(token) {
            t.allowances.insert(account.clone(), allowance);
        }
    }

    pub fn set_unlocked(&self, token: &TokenId, account: &AccountId, amount: u128) {
        self.state
            .unlocked
            .write()
            .insert((token.clone(), account.clone()), amount);
    }

    pub fn set_withdrawal_fee(&self, token: &TokenId, fee: u128) {
        self.state.withdrawal_fees.write().insert(token.clone(), fee);
    }

    pub fn insert_order(&self, book: &BookId, order: SimOrder) -> OrderId {
        let id = self.state.next_order.fetch_add(1, Ordering::Relaxed);
        if let Some(mut b) = self.state.books.get_mut(book) {
            b.orders.insert(id, order);
        }
        OrderId(id)
    }

    /// Record an executed trade, linking it into both orders' trade lists and
    /// the front of the recents ring.
    pub fn insert_trade(&self, book: &BookId, trade: SimTrade) -> TradeId {
        let id = self.state.next_trade.fetch_add(1, Ordering::Relaxed);
        if let Some(mut b) = self.state.books.get_mut(book) {
            for oid in [trade.sell_id, trade.buy_id] {
                if let Some(order) = b.orders.get_mut(&oid) {
                    order.trades.push(id);
                    order.executions += 1;
                }
            }
            b.recent.insert(0, id);
            b.trades.insert(id, trade);
        }
        TradeId(id)
    }

    pub fn close_sim_order(&self, book: &BookId, id: OrderId, reason: &str) {
        if let Some(mut b) = self.state.books.get_mut(book) {
            if let Some(order) = b.orders.get_mut(&id.0) {
                order.closed_at = Some(now_nanos());
                order.closed_reason = Some(reason.to_string());
                order.locked = 0;
            }
        }
    }

    pub fn set_order_fill(&self, book: &BookId, id: OrderId, locked: u128, filled: u128) {
        if let Some(mut b) = self.state.books.get_mut(book) {
            if let Some(order) = b.orders.get_mut(&id.0) {
                order.locked = locked;
                order.filled = filled;
            }
        }
    }

    /// The signer used for write calls; stands in for the wallet identity.
    pub fn set_actor(&self, account: &AccountId) {
        *self.state.actor.write() = Some(account.clone());
    }

    // ---- test instrumentation ----------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.state.calls.lock().clear();
    }

    /// Force every call whose `kind.method` key matches to fail until
    /// [`SimExchange::recover`] is called with the same key.
    pub fn fail_on(&self, key: &str) {
        self.state.failing.write().insert(key.to_string());
    }

    pub fn recover(&self, key: &str) {
        self.state.failing.write().remove(key);
    }

    pub fn wallet_balance(&self, token: &TokenId, account: &AccountId) -> u128 {
        self.state
            .tokens
            .get(token)
            .and_then(|t| t.balances.get(account).copied())
            .unwrap_or(0)
    }

    pub fn unlocked_balance(&self, token: &TokenId, account: &AccountId) -> u128 {
        self.state
            .unlocked
            .read()
            .get(&(token.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for SimExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerConnector for SimExchange {
    fn token(&self, id: &TokenId) -> Arc<dyn TokenLedger> {
        Arc::new(SimTokenHandle {
            state: self.state.clone(),
            id: id.clone(),
        })
    }

    fn book(&self, id: &BookId) -> Arc<dyn BookLedger> {
        Arc::new(SimBookHandle {
            state: self.state.clone(),
            id: id.clone(),
        })
    }

    fn vault(&self) -> Arc<dyn VaultLedger> {
        Arc::new(SimVaultHandle {
            state: self.state.clone(),
        })
    }
}

fn paged<T: Clone>(items: &[T], skip_past: Option<usize>, take: usize) -> Vec<T> {
    let start = skip_past.map(|i| i + 1).unwrap_or(0);
    items.iter().skip(start).take(take).cloned().collect()
}

// ---- token ----------------------------------------------------------------

struct SimTokenHandle {
    state: Arc<SimState>,
    id: TokenId,
}

impl SimTokenHandle {
    fn with<T>(&self, f: impl FnOnce(&SimToken) -> T) -> Result<T> {
        self.state
            .tokens
            .get(&self.id)
            .map(|t| f(&t))
            .ok_or_else(|| MirrorError::Transport(format!("unknown token: {}", self.id)))
    }
}

#[async_trait]
impl TokenLedger for SimTokenHandle {
    async fn name(&self) -> Result<String> {
        self.state.record("token.name", self.id.as_str())?;
        self.with(|t| t.meta.name.clone())
    }

    async fn symbol(&self) -> Result<String> {
        self.state.record("token.symbol", self.id.as_str())?;
        self.with(|t| t.meta.symbol.clone())
    }

    async fn decimals(&self) -> Result<u8> {
        self.state.record("token.decimals", self.id.as_str())?;
        self.with(|t| t.meta.decimals)
    }

    async fn fee(&self) -> Result<u128> {
        self.state.record("token.fee", self.id.as_str())?;
        self.with(|t| t.meta.fee)
    }

    async fn balance_of(&self, account: &AccountId) -> Result<u128> {
        self.state.record("token.balance_of", self.id.as_str())?;
        self.with(|t| t.balances.get(account).copied().unwrap_or(0))
    }

    async fn allowance_of(&self, account: &AccountId) -> Result<Allowance> {
        self.state.record("token.allowance_of", self.id.as_str())?;
        self.with(|t| t.allowances.get(account).copied().unwrap_or_default())
    }

    async fn approve(&self, amount: u128) -> Result<TxReceipt> {
        self.state.record("token.approve", self.id.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        let mut token = self
            .state
            .tokens
            .get_mut(&self.id)
            .ok_or_else(|| MirrorError::Transport(format!("unknown token: {}", self.id)))?;
        token.allowances.insert(
            actor,
            Allowance {
                amount,
                expires_at: None,
            },
        );
        Ok(TxReceipt::Settled(self.state.settle()))
    }

    async fn transfer(&self, to: &AccountId, amount: u128) -> Result<TxReceipt> {
        self.state.record("token.transfer", self.id.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        let mut token = self
            .state
            .tokens
            .get_mut(&self.id)
            .ok_or_else(|| MirrorError::Transport(format!("unknown token: {}", self.id)))?;
        let from = token.balances.entry(actor).or_default();
        if *from < amount {
            return Ok(TxReceipt::Rejected("insufficient funds".into()));
        }
        *from -= amount;
        *token.balances.entry(to.clone()).or_default() += amount;
        Ok(TxReceipt::Settled(self.state.settle()))
    }
}

// ---- book -----------------------------------------------------------------

struct SimBookHandle {
    state: Arc<SimState>,
    id: BookId,
}

impl SimBookHandle {
    fn with<T>(&self, f: impl FnOnce(&SimBook) -> T) -> Result<T> {
        self.state
            .books
            .get(&self.id)
            .map(|b| f(&b))
            .ok_or_else(|| MirrorError::Transport(format!("unknown book: {}", self.id)))
    }

    fn order_field<T>(
        &self,
        ids: &[OrderId],
        f: impl Fn(&SimOrder) -> Option<T>,
    ) -> Result<Vec<Option<T>>> {
        self.with(|b| ids.iter().map(|id| b.orders.get(&id.0).and_then(&f)).collect())
    }

    fn trade_field<T>(
        &self,
        ids: &[TradeId],
        f: impl Fn(&SimTrade) -> Option<T>,
    ) -> Result<Vec<Option<T>>> {
        self.with(|b| ids.iter().map(|id| b.trades.get(&id.0).and_then(&f)).collect())
    }

    /// Open orders on one side at one price, ascending by ID.
    fn resident_ids(&self, side: Side, price: u128) -> Result<Vec<OrderId>> {
        self.with(|b| {
            b.orders
                .iter()
                .filter(|(_, o)| o.side == side && o.price == price && o.is_open())
                .map(|(id, _)| OrderId(*id))
                .collect()
        })
    }
}

#[async_trait]
impl BookLedger for SimBookHandle {
    async fn config(&self) -> Result<BookConfig> {
        self.state.record("book.config", self.id.as_str())?;
        self.with(|b| b.config.clone())
    }

    async fn ask_prices(&self, limit: Option<usize>) -> Result<Vec<u128>> {
        self.state.record("book.ask_prices", self.id.as_str())?;
        self.with(|b| {
            let mut prices: Vec<u128> = b
                .orders
                .values()
                .filter(|o| o.side == Side::Sell && o.is_open())
                .map(|o| o.price)
                .collect();
            prices.sort_unstable();
            prices.dedup();
            prices.truncate(limit.unwrap_or(usize::MAX));
            prices
        })
    }

    async fn bid_prices(&self, limit: Option<usize>) -> Result<Vec<u128>> {
        self.state.record("book.bid_prices", self.id.as_str())?;
        self.with(|b| {
            let mut prices: Vec<u128> = b
                .orders
                .values()
                .filter(|o| o.side == Side::Buy && o.is_open())
                .map(|o| o.price)
                .collect();
            prices.sort_unstable_by(|a, b| b.cmp(a));
            prices.dedup();
            prices.truncate(limit.unwrap_or(usize::MAX));
            prices
        })
    }

    async fn asks_at(
        &self,
        price: u128,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>> {
        self.state.record("book.asks_at", self.id.as_str())?;
        let ids = self.resident_ids(Side::Sell, price)?;
        let past = cursor.and_then(|c| ids.iter().position(|id| *id == c));
        if cursor.is_some() && past.is_none() {
            return Ok(Vec::new());
        }
        Ok(paged(&ids, past, limit.unwrap_or(self.state.page)))
    }

    async fn bids_at(
        &self,
        price: u128,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>> {
        self.state.record("book.bids_at", self.id.as_str())?;
        let ids = self.resident_ids(Side::Buy, price)?;
        let past = cursor.and_then(|c| ids.iter().position(|id| *id == c));
        if cursor.is_some() && past.is_none() {
            return Ok(Vec::new());
        }
        Ok(paged(&ids, past, limit.unwrap_or(self.state.page)))
    }

    async fn buy_levels_of(
        &self,
        account: &AccountId,
        cursor: Option<u128>,
        limit: Option<usize>,
    ) -> Result<Vec<(u128, OrderId)>> {
        self.state.record("book.buy_levels_of", self.id.as_str())?;
        self.user_levels(account, Side::Buy, cursor, limit)
    }

    async fn sell_levels_of(
        &self,
        account: &AccountId,
        cursor: Option<u128>,
        limit: Option<usize>,
    ) -> Result<Vec<(u128, OrderId)>> {
        self.state.record("book.sell_levels_of", self.id.as_str())?;
        self.user_levels(account, Side::Sell, cursor, limit)
    }

    async fn buy_orders_of(
        &self,
        account: &AccountId,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>> {
        self.state.record("book.buy_orders_of", self.id.as_str())?;
        self.user_orders(account, Side::Buy, cursor, limit)
    }

    async fn sell_orders_of(
        &self,
        account: &AccountId,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>> {
        self.state.record("book.sell_orders_of", self.id.as_str())?;
        self.user_orders(account, Side::Sell, cursor, limit)
    }

    async fn order_sides_of(&self, ids: &[OrderId]) -> Result<Vec<Option<Side>>> {
        self.state.record("book.order_sides_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.side))
    }

    async fn order_owners_of(&self, ids: &[OrderId]) -> Result<Vec<Option<AccountId>>> {
        self.state.record("book.order_owners_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.owner.clone()))
    }

    async fn order_blocks_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>> {
        self.state.record("book.order_blocks_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.block))
    }

    async fn order_executions_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>> {
        self.state
            .record("book.order_executions_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.executions))
    }

    async fn order_prices_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.order_prices_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.price))
    }

    async fn order_expiries_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>> {
        self.state.record("book.order_expiries_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.expires_at))
    }

    async fn order_initials_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.order_initials_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.initial))
    }

    async fn order_subaccounts_of(&self, ids: &[OrderId]) -> Result<Vec<Option<Vec<u8>>>> {
        self.state
            .record("book.order_subaccounts_of", self.id.as_str())?;
        self.order_field(ids, |o| o.subaccount.clone())
    }

    async fn order_created_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>> {
        self.state.record("book.order_created_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.created_at))
    }

    async fn order_closed_at_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>> {
        self.state
            .record("book.order_closed_at_of", self.id.as_str())?;
        self.order_field(ids, |o| o.closed_at)
    }

    async fn order_closed_reasons_of(&self, ids: &[OrderId]) -> Result<Vec<Option<String>>> {
        self.state
            .record("book.order_closed_reasons_of", self.id.as_str())?;
        self.order_field(ids, |o| o.closed_reason.clone())
    }

    async fn order_locked_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.order_locked_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.locked))
    }

    async fn order_filled_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.order_filled_of", self.id.as_str())?;
        self.order_field(ids, |o| Some(o.filled))
    }

    async fn order_trades_of(
        &self,
        id: OrderId,
        cursor: Option<TradeId>,
        limit: Option<usize>,
    ) -> Result<Vec<TradeId>> {
        self.state.record("book.order_trades_of", self.id.as_str())?;
        self.with(|b| {
            let Some(order) = b.orders.get(&id.0) else {
                return Vec::new();
            };
            order
                .trades
                .iter()
                .filter(|t| cursor.map_or(true, |c| **t > c.0))
                .take(limit.unwrap_or(self.state.page))
                .map(|t| TradeId(*t))
                .collect()
        })
    }

    async fn trade_ids(&self, limit: Option<usize>) -> Result<Vec<TradeId>> {
        self.state.record("book.trade_ids", self.id.as_str())?;
        self.with(|b| {
            b.recent
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|t| TradeId(*t))
                .collect()
        })
    }

    async fn trade_sell_ids_of(&self, ids: &[TradeId]) -> Result<Vec<Option<OrderId>>> {
        self.state.record("book.trade_sell_ids_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(OrderId(t.sell_id)))
    }

    async fn trade_buy_ids_of(&self, ids: &[TradeId]) -> Result<Vec<Option<OrderId>>> {
        self.state.record("book.trade_buy_ids_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(OrderId(t.buy_id)))
    }

    async fn trade_bases_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.trade_bases_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.base))
    }

    async fn trade_quotes_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.trade_quotes_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.quote))
    }

    async fn trade_sell_fees_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>> {
        self.state
            .record("book.trade_sell_fees_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.sell_fee))
    }

    async fn trade_buy_fees_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>> {
        self.state.record("book.trade_buy_fees_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.buy_fee))
    }

    async fn trade_executed_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u64>>> {
        self.state.record("book.trade_executed_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.executed_at))
    }

    async fn trade_blocks_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u64>>> {
        self.state.record("book.trade_blocks_of", self.id.as_str())?;
        self.trade_field(ids, |t| Some(t.block))
    }

    async fn place(&self, side: Side, price: u128, amount: u128) -> Result<TxReceipt> {
        self.state.record("book.place", self.id.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        if price == 0 || amount == 0 {
            return Ok(TxReceipt::Rejected("zero price or amount".into()));
        }
        let id = self.state.next_order.fetch_add(1, Ordering::Relaxed);
        let block = self.state.settle();
        let mut book = self
            .state
            .books
            .get_mut(&self.id)
            .ok_or_else(|| MirrorError::Transport(format!("unknown book: {}", self.id)))?;
        book.orders.insert(
            id,
            SimOrder {
                block,
                created_at: now_nanos(),
                ..SimOrder::open(side, actor, price, amount)
            },
        );
        Ok(TxReceipt::Settled(block))
    }

    async fn cancel(&self, ids: &[OrderId]) -> Result<TxReceipt> {
        self.state.record("book.cancel", self.id.as_str())?;
        if self.state.actor().is_none() {
            return Ok(TxReceipt::Rejected("no signer".into()));
        }
        let mut book = self
            .state
            .books
            .get_mut(&self.id)
            .ok_or_else(|| MirrorError::Transport(format!("unknown book: {}", self.id)))?;
        // all-or-nothing: refuse the batch before touching any order
        for id in ids {
            match book.orders.get(&id.0) {
                Some(order) if order.is_open() => {}
                Some(_) => return Ok(TxReceipt::Rejected(format!("order {id} already closed"))),
                None => return Ok(TxReceipt::Rejected(format!("unknown order: {id}"))),
            }
        }
        for id in ids {
            if let Some(order) = book.orders.get_mut(&id.0) {
                order.closed_at = Some(now_nanos());
                order.closed_reason = Some("canceled".into());
                order.locked = 0;
            }
        }
        Ok(TxReceipt::Settled(self.state.settle()))
    }
}

impl SimBookHandle {
    fn user_levels(
        &self,
        account: &AccountId,
        side: Side,
        cursor: Option<u128>,
        limit: Option<usize>,
    ) -> Result<Vec<(u128, OrderId)>> {
        self.with(|b| {
            let mut by_price: BTreeMap<u128, u64> = BTreeMap::new();
            for (id, order) in &b.orders {
                if order.side == side && order.is_open() && &order.owner == account {
                    by_price.entry(order.price).or_insert(*id);
                }
            }
            by_price
                .into_iter()
                .filter(|(price, _)| cursor.map_or(true, |c| *price > c))
                .take(limit.unwrap_or(self.state.page))
                .map(|(price, id)| (price, OrderId(id)))
                .collect()
        })
    }

    fn user_orders(
        &self,
        account: &AccountId,
        side: Side,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>> {
        self.with(|b| {
            b.orders
                .iter()
                .filter(|(id, o)| {
                    o.side == side && &o.owner == account && cursor.map_or(true, |c| **id > c.0)
                })
                .take(limit.unwrap_or(self.state.page))
                .map(|(id, _)| OrderId(*id))
                .collect()
        })
    }
}

// ---- vault ----------------------------------------------------------------

struct SimVaultHandle {
    state: Arc<SimState>,
}

#[async_trait]
impl VaultLedger for SimVaultHandle {
    async fn tokens(&self, cursor: Option<TokenId>, limit: Option<usize>) -> Result<Vec<TokenId>> {
        self.state.record("vault.tokens", "-")?;
        let mut ids: Vec<TokenId> = self.state.tokens.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        let past = cursor.and_then(|c| ids.iter().position(|id| *id == c));
        Ok(paged(&ids, past, limit.unwrap_or(self.state.page)))
    }

    async fn books(&self, cursor: Option<BookId>, limit: Option<usize>) -> Result<Vec<BookId>> {
        self.state.record("vault.books", "-")?;
        let mut ids: Vec<BookId> = self.state.books.iter().map(|b| b.key().clone()).collect();
        ids.sort();
        let past = cursor.and_then(|c| ids.iter().position(|id| *id == c));
        Ok(paged(&ids, past, limit.unwrap_or(self.state.page)))
    }

    async fn withdrawal_fees_of(&self, ids: &[TokenId]) -> Result<Vec<Option<u128>>> {
        self.state.record("vault.withdrawal_fees_of", "-")?;
        let fees = self.state.withdrawal_fees.read();
        Ok(ids.iter().map(|id| fees.get(id).copied()).collect())
    }

    async fn unlocked_balances_of(&self, pairs: &[(TokenId, AccountId)]) -> Result<Vec<u128>> {
        self.state.record("vault.unlocked_balances_of", "-")?;
        let unlocked = self.state.unlocked.read();
        Ok(pairs
            .iter()
            .map(|pair| unlocked.get(pair).copied().unwrap_or(0))
            .collect())
    }

    async fn deposit(&self, token: &TokenId, amount: u128) -> Result<TxReceipt> {
        self.state.record("vault.deposit", token.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        let mut entry = self
            .state
            .tokens
            .get_mut(token)
            .ok_or_else(|| MirrorError::Transport(format!("unknown token: {token}")))?;
        let allowance = entry.allowances.get(&actor).copied().unwrap_or_default();
        if !allowance.covers(amount, now_nanos()) {
            return Ok(TxReceipt::Rejected("insufficient allowance".into()));
        }
        let balance = entry.balances.entry(actor.clone()).or_default();
        if *balance < amount {
            return Ok(TxReceipt::Rejected("insufficient funds".into()));
        }
        *balance -= amount;
        if let Some(a) = entry.allowances.get_mut(&actor) {
            a.amount = a.amount.saturating_sub(amount);
        }
        drop(entry);
        *self
            .state
            .unlocked
            .write()
            .entry((token.clone(), actor))
            .or_default() += amount;
        Ok(TxReceipt::Settled(self.state.settle()))
    }

    async fn withdraw(&self, token: &TokenId, amount: u128) -> Result<TxReceipt> {
        self.state.record("vault.withdraw", token.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        let fee = self
            .state
            .withdrawal_fees
            .read()
            .get(token)
            .copied()
            .unwrap_or(0);
        {
            let mut unlocked = self.state.unlocked.write();
            let held = unlocked.entry((token.clone(), actor.clone())).or_default();
            if *held < amount {
                return Ok(TxReceipt::Rejected("insufficient vault balance".into()));
            }
            *held -= amount;
        }
        if let Some(mut entry) = self.state.tokens.get_mut(token) {
            *entry.balances.entry(actor).or_default() += amount.saturating_sub(fee);
        }
        Ok(TxReceipt::Settled(self.state.settle()))
    }

    async fn transfer(
        &self,
        token: &TokenId,
        to: &AccountId,
        amount: u128,
    ) -> Result<TxReceipt> {
        self.state.record("vault.transfer", token.as_str())?;
        let Some(actor) = self.state.actor() else {
            return Ok(TxReceipt::Rejected("no signer".into()));
        };
        let mut unlocked = self.state.unlocked.write();
        let held = unlocked.entry((token.clone(), actor)).or_default();
        if *held < amount {
            return Ok(TxReceipt::Rejected("insufficient vault balance".into()));
        }
        *held -= amount;
        *unlocked.entry((token.clone(), to.clone())).or_default() += amount;
        Ok(TxReceipt::Settled(self.state.settle()))
    }
}
