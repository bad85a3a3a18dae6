use std::sync::Arc;

use tokio::try_join;
use tracing::{debug, info};

use mirror_core::types::{AccountId, TokenId, TokenMeta};
use mirror_core::{EventBus, MirrorConfig, Result, Session};
use mirror_ledger::{TokenLedger, TxReceipt};
use mirror_store::MirrorStore;

use crate::backoff;
use crate::wait::{wait_for_refresh, Waited};

/// Self-restarting poll loop for one token: immutable metadata once, then
/// the authenticated account's balance and vault allowance forever.
pub struct TokenSync {
    id: TokenId,
    ledger: Arc<dyn TokenLedger>,
    store: Arc<MirrorStore>,
    session: Arc<Session>,
    bus: Arc<EventBus>,
    config: MirrorConfig,
}

impl TokenSync {
    pub fn new(
        id: TokenId,
        ledger: Arc<dyn TokenLedger>,
        store: Arc<MirrorStore>,
        session: Arc<Session>,
        bus: Arc<EventBus>,
        config: MirrorConfig,
    ) -> Self {
        store.tokens.ensure(&id);
        Self {
            id,
            ledger,
            store,
            session,
            bus,
            config,
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    /// One-time metadata fetch. Failure here is fatal for this token: the
    /// task surfaces the error and stops without retrying.
    async fn hydrate_meta(&self) -> Result<()> {
        let (name, symbol, decimals, fee) = try_join!(
            self.ledger.name(),
            self.ledger.symbol(),
            self.ledger.decimals(),
            self.ledger.fee(),
        )?;
        self.store.tokens.set_meta(
            &self.id,
            TokenMeta {
                name,
                symbol,
                decimals,
                fee,
            },
        );
        Ok(())
    }

    /// One steady-state iteration: join balance and allowance fetches, then
    /// apply both. No authenticated account counts as an unchanged poll.
    async fn poll_once(&self) -> Result<bool> {
        let Some(account) = self.session.current() else {
            return Ok(false);
        };
        let (balance, allowance) = try_join!(
            self.ledger.balance_of(&account),
            self.ledger.allowance_of(&account),
        )?;
        let changed = self
            .store
            .tokens
            .update(&self.id, |token| {
                let changed = token.balance != balance || token.allowance != allowance;
                token.balance = balance;
                token.allowance = allowance;
                changed
            })
            .unwrap_or(false);
        Ok(changed)
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        if let Err(e) = self.hydrate_meta().await {
            self.bus.error("token metadata", &e);
            return Err(e);
        }
        info!(token = %self.id, "token metadata hydrated");

        let cadence = self.config.cadence;
        let mut delay = cadence.floor;
        loop {
            let changed = match self.poll_once().await {
                Ok(changed) => {
                    if changed {
                        self.bus.render();
                    }
                    changed
                }
                Err(e) => {
                    debug!(token = %self.id, error = %e, "balance poll failed");
                    self.bus.error("token balance poll", &e);
                    false
                }
            };
            delay = backoff::next(cadence, changed, delay);
            if wait_for_refresh(&self.bus, delay).await == Waited::Refreshed {
                delay = cadence.floor;
            }
        }
    }

    /// Display helper: render a raw quantity at this token's precision.
    /// Falls back to the raw integer while metadata is still loading.
    pub fn to_display(&self, raw: u128) -> String {
        match self.store.tokens.meta(&self.id) {
            Some(meta) => meta.to_display(raw),
            None => raw.to_string(),
        }
    }

    /// Parse a user-typed decimal amount into raw base units.
    pub fn to_raw(&self, text: &str) -> Result<u128> {
        let meta = self
            .store
            .tokens
            .meta(&self.id)
            .ok_or_else(|| mirror_core::MirrorError::MetadataMissing(self.id.to_string()))?;
        meta.to_raw(text)
    }

    /// Display price of one whole base token denominated in this (quote)
    /// token, from a raw executed quote/base pair.
    pub fn price(&self, base: &TokenMeta, quote_raw: u128, base_raw: u128) -> Option<f64> {
        self.store
            .tokens
            .meta(&self.id)?
            .price(base, quote_raw, base_raw)
    }

    /// Pass-through approve call; the raw receipt goes straight back to the
    /// caller, which decides what to broadcast.
    pub async fn approve(&self, amount: u128) -> Result<TxReceipt> {
        self.ledger.approve(amount).await
    }

    /// Pass-through token-ledger transfer (wallet funds, not vault funds).
    pub async fn transfer(&self, to: &AccountId, amount: u128) -> Result<TxReceipt> {
        self.ledger.transfer(to, amount).await
    }

}
