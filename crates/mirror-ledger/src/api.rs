//! Abstract remote ledger interfaces.
//!
//! Every paginated query takes a `(cursor, limit)` pair; the cursor is
//! exclusive ("items after this one"), `None` starts from the beginning, and
//! an empty page means the end was reached. Batched queries take a slice of
//! IDs and return a `Vec` of the same length, `None` marking fields the
//! remote has no value for.

use async_trait::async_trait;
use std::sync::Arc;

use mirror_core::types::{
    AccountId, Allowance, BookConfig, BookId, OrderId, Side, TokenId, TradeId,
};
use mirror_core::Result;

use crate::receipt::TxReceipt;

/// Read/write interface of one token ledger. The allowance spender is the
/// vault the connector was built for.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn name(&self) -> Result<String>;
    async fn symbol(&self) -> Result<String>;
    async fn decimals(&self) -> Result<u8>;
    async fn fee(&self) -> Result<u128>;

    async fn balance_of(&self, account: &AccountId) -> Result<u128>;
    async fn allowance_of(&self, account: &AccountId) -> Result<Allowance>;

    async fn approve(&self, amount: u128) -> Result<TxReceipt>;
    async fn transfer(&self, to: &AccountId, amount: u128) -> Result<TxReceipt>;
}

/// Read/write interface of one order book.
#[async_trait]
pub trait BookLedger: Send + Sync {
    async fn config(&self) -> Result<BookConfig>;

    /// Best ask prices, ascending, at most `limit`.
    async fn ask_prices(&self, limit: Option<usize>) -> Result<Vec<u128>>;
    /// Best bid prices, descending, at most `limit`.
    async fn bid_prices(&self, limit: Option<usize>) -> Result<Vec<u128>>;

    /// Open sell orders resident at `price`, ascending by ID.
    async fn asks_at(
        &self,
        price: u128,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>>;
    /// Open buy orders resident at `price`, ascending by ID.
    async fn bids_at(
        &self,
        price: u128,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>>;

    /// The account's open buy price levels as `(price, representative order)`.
    async fn buy_levels_of(
        &self,
        account: &AccountId,
        cursor: Option<u128>,
        limit: Option<usize>,
    ) -> Result<Vec<(u128, OrderId)>>;
    async fn sell_levels_of(
        &self,
        account: &AccountId,
        cursor: Option<u128>,
        limit: Option<usize>,
    ) -> Result<Vec<(u128, OrderId)>>;

    /// The account's buy order IDs, ascending.
    async fn buy_orders_of(
        &self,
        account: &AccountId,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>>;
    async fn sell_orders_of(
        &self,
        account: &AccountId,
        cursor: Option<OrderId>,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>>;

    // Per-field order scalar batches, fetched once per order at hydration.
    async fn order_sides_of(&self, ids: &[OrderId]) -> Result<Vec<Option<Side>>>;
    async fn order_owners_of(&self, ids: &[OrderId]) -> Result<Vec<Option<AccountId>>>;
    async fn order_blocks_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>>;
    async fn order_executions_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>>;
    async fn order_prices_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>>;
    async fn order_expiries_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>>;
    async fn order_initials_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>>;
    async fn order_subaccounts_of(&self, ids: &[OrderId]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn order_created_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>>;

    // Per-field order mutable batches, re-fetched every book iteration.
    async fn order_closed_at_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u64>>>;
    async fn order_closed_reasons_of(&self, ids: &[OrderId]) -> Result<Vec<Option<String>>>;
    async fn order_locked_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>>;
    async fn order_filled_of(&self, ids: &[OrderId]) -> Result<Vec<Option<u128>>>;

    /// Trade IDs one order participated in, in execution order.
    async fn order_trades_of(
        &self,
        id: OrderId,
        cursor: Option<TradeId>,
        limit: Option<usize>,
    ) -> Result<Vec<TradeId>>;

    /// Most recent trade IDs, newest first, at most `limit`.
    async fn trade_ids(&self, limit: Option<usize>) -> Result<Vec<TradeId>>;

    // Per-field trade scalar batches, fetched once per trade at hydration.
    async fn trade_sell_ids_of(&self, ids: &[TradeId]) -> Result<Vec<Option<OrderId>>>;
    async fn trade_buy_ids_of(&self, ids: &[TradeId]) -> Result<Vec<Option<OrderId>>>;
    async fn trade_bases_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>>;
    async fn trade_quotes_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>>;
    async fn trade_sell_fees_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>>;
    async fn trade_buy_fees_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u128>>>;
    async fn trade_executed_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u64>>>;
    async fn trade_blocks_of(&self, ids: &[TradeId]) -> Result<Vec<Option<u64>>>;

    async fn place(&self, side: Side, price: u128, amount: u128) -> Result<TxReceipt>;
    async fn cancel(&self, ids: &[OrderId]) -> Result<TxReceipt>;
}

/// Read/write interface of the vault.
#[async_trait]
pub trait VaultLedger: Send + Sync {
    async fn tokens(&self, cursor: Option<TokenId>, limit: Option<usize>) -> Result<Vec<TokenId>>;
    async fn books(&self, cursor: Option<BookId>, limit: Option<usize>) -> Result<Vec<BookId>>;

    async fn withdrawal_fees_of(&self, ids: &[TokenId]) -> Result<Vec<Option<u128>>>;
    async fn unlocked_balances_of(&self, pairs: &[(TokenId, AccountId)]) -> Result<Vec<u128>>;

    async fn deposit(&self, token: &TokenId, amount: u128) -> Result<TxReceipt>;
    async fn withdraw(&self, token: &TokenId, amount: u128) -> Result<TxReceipt>;
    async fn transfer(&self, token: &TokenId, to: &AccountId, amount: u128)
        -> Result<TxReceipt>;
}

/// Hands out per-entity ledger handles, one per remote canister/contract.
pub trait LedgerConnector: Send + Sync {
    fn token(&self, id: &TokenId) -> Arc<dyn TokenLedger>;
    fn book(&self, id: &BookId) -> Arc<dyn BookLedger>;
    fn vault(&self) -> Arc<dyn VaultLedger>;
}
