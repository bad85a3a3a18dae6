use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use mirror_core::time::now_nanos;
use mirror_core::types::{AccountId, BookId, TokenId};
use mirror_core::{EventBus, MirrorConfig, MirrorError, Result, Session};
use mirror_ledger::{LedgerConnector, TxReceipt, VaultLedger};
use mirror_store::MirrorStore;

use crate::book::BookSync;
use crate::token::TokenSync;
use crate::wait::{wait_for_refresh, Waited};
use crate::{backoff, pages};

/// Top of the task tree. Discovers the vault's tokens and books once (fatal
/// if that fails — with no tokens nothing can function), spawns one token
/// task and one book task per discovered entity, then polls the
/// authenticated account's unlocked balances. Carries the three vault-side
/// mutating operations.
pub struct VaultSync {
    connector: Arc<dyn LedgerConnector>,
    ledger: Arc<dyn VaultLedger>,
    store: Arc<MirrorStore>,
    session: Arc<Session>,
    bus: Arc<EventBus>,
    config: MirrorConfig,
    tokens: RwLock<Vec<TokenId>>,
    token_tasks: RwLock<HashMap<TokenId, Arc<TokenSync>>>,
}

impl VaultSync {
    pub fn new(
        connector: Arc<dyn LedgerConnector>,
        store: Arc<MirrorStore>,
        session: Arc<Session>,
        bus: Arc<EventBus>,
        config: MirrorConfig,
    ) -> Self {
        let ledger = connector.vault();
        Self {
            connector,
            ledger,
            store,
            session,
            bus,
            config,
            tokens: RwLock::new(Vec::new()),
            token_tasks: RwLock::new(HashMap::new()),
        }
    }

    /// The token task handle for pass-through approve/transfer calls.
    pub fn token_sync(&self, id: &TokenId) -> Option<Arc<TokenSync>> {
        self.token_tasks.read().get(id).cloned()
    }

    async fn discover(&self) -> Result<(Vec<TokenId>, Vec<BookId>)> {
        let books = pages::drain(
            None,
            |id: &BookId| id.clone(),
            |cursor| self.ledger.books(cursor, None),
        )
        .await?;
        let tokens = pages::drain(
            None,
            |id: &TokenId| id.clone(),
            |cursor| self.ledger.tokens(cursor, None),
        )
        .await?;
        if tokens.is_empty() {
            return Err(MirrorError::Init("vault reports no tokens".into()));
        }
        Ok((tokens, books))
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (tokens, books) = match self.discover().await {
            Ok(found) => found,
            Err(e) => {
                self.bus.error("vault discovery", &e);
                return Err(e);
            }
        };
        info!(tokens = tokens.len(), books = books.len(), "vault discovered");

        for token in &tokens {
            self.store.vault.ensure(token);
            let task = Arc::new(TokenSync::new(
                token.clone(),
                self.connector.token(token),
                self.store.clone(),
                self.session.clone(),
                self.bus.clone(),
                self.config.clone(),
            ));
            self.token_tasks.write().insert(token.clone(), task.clone());
            tokio::spawn(task.run());
        }
        for book in &books {
            let task = Arc::new(BookSync::new(
                book.clone(),
                self.connector.book(book),
                self.store.clone(),
                self.session.clone(),
                self.bus.clone(),
                self.config.clone(),
            ));
            tokio::spawn(task.run());
        }

        // withdrawal fees are static; fetched once alongside discovery and
        // fatal on failure like the rest of initialization
        let fees = self.ledger.withdrawal_fees_of(&tokens).await.map_err(|e| {
            self.bus.error("vault withdrawal fees", &e);
            e
        })?;
        for (token, fee) in tokens.iter().zip(fees) {
            if let Some(fee) = fee {
                self.store.vault.set_withdrawal_fee(token, fee);
            }
        }
        *self.tokens.write() = tokens;

        self.balance_loop().await;
        Ok(())
    }

    /// Unlocked-balance poll loop. Returns (rather than idling) as soon as
    /// no account is authenticated; the child token and book tasks keep
    /// running on their own.
    async fn balance_loop(&self) {
        let cadence = self.config.cadence;
        let mut delay = cadence.floor;
        loop {
            let Some(account) = self.session.current() else {
                info!("session ended, vault balance polling stopped");
                return;
            };
            let changed = match self.poll_balances(&account).await {
                Ok(changed) => {
                    if changed {
                        self.bus.render();
                    }
                    changed
                }
                Err(e) => {
                    debug!(error = %e, "vault balance poll failed");
                    self.bus.error("vault balances", &e);
                    false
                }
            };
            delay = backoff::next(cadence, changed, delay);
            if wait_for_refresh(&self.bus, delay).await == Waited::Refreshed {
                delay = cadence.floor;
            }
        }
    }

    async fn poll_balances(&self, account: &AccountId) -> Result<bool> {
        let tokens = self.tokens.read().clone();
        let pairs: Vec<(TokenId, AccountId)> = tokens
            .iter()
            .map(|token| (token.clone(), account.clone()))
            .collect();
        let balances = self.ledger.unlocked_balances_of(&pairs).await?;
        let mut changed = false;
        for (token, unlocked) in tokens.iter().zip(balances) {
            changed |= self.store.vault.set_unlocked(token, unlocked);
        }
        Ok(changed)
    }

    fn parse_amount(&self, token: &TokenId, text: &str, op: &str) -> Result<u128> {
        let meta = self
            .store
            .tokens
            .meta(token)
            .ok_or_else(|| MirrorError::MetadataMissing(token.to_string()))?;
        match meta.to_raw(text) {
            Ok(0) => {
                let e = MirrorError::InvalidAmount(format!("{op} amount must be positive"));
                self.bus.error(op, &e);
                Err(e)
            }
            Ok(raw) => Ok(raw),
            Err(e) => {
                self.bus.error(op, &e);
                Err(e)
            }
        }
    }

    /// Claim the per-token busy flag; refused while an operation is in
    /// flight.
    fn claim_busy(&self, token: &TokenId) -> Result<()> {
        let claimed = self
            .store
            .vault
            .update(token, |entry| {
                if entry.form.busy {
                    false
                } else {
                    entry.form.busy = true;
                    true
                }
            })
            .unwrap_or(false);
        if claimed {
            Ok(())
        } else {
            Err(MirrorError::Busy)
        }
    }

    fn release_busy(&self, token: &TokenId) {
        self.store.vault.update(token, |entry| entry.form.busy = false);
    }

    /// Settle bookkeeping common to the three operations: notices, form
    /// handling, and the refresh broadcast on success. A failed call leaves
    /// the typed fields untouched for resubmission.
    fn conclude(
        &self,
        token: &TokenId,
        op: &str,
        result: &Result<TxReceipt>,
        clear_recipient: bool,
    ) {
        self.release_busy(token);
        match result {
            Ok(TxReceipt::Settled(block)) => {
                self.store.vault.update(token, |entry| {
                    entry.form.amount.clear();
                    if clear_recipient {
                        entry.form.recipient.clear();
                    }
                });
                self.bus.success(op, format!("settled at block {block}"));
                self.bus.refresh();
            }
            Ok(TxReceipt::Rejected(reason)) => self.bus.error(op, reason),
            Err(e) => self.bus.error(op, e),
        }
    }

    /// Move wallet funds into the vault. When the mirrored allowance cannot
    /// cover the amount (too small or expired), an approve for exactly that
    /// amount runs first and is awaited before the deposit is submitted —
    /// the deposit call reads the allowance, not a fresh approval receipt.
    pub async fn deposit(&self, token: &TokenId, amount_text: &str) -> Result<TxReceipt> {
        let amount = self.parse_amount(token, amount_text, "deposit")?;
        self.claim_busy(token)?;
        let result = self.deposit_inner(token, amount).await;
        self.conclude(token, "deposit", &result, false);
        result
    }

    async fn deposit_inner(&self, token: &TokenId, amount: u128) -> Result<TxReceipt> {
        let allowance = self
            .store
            .tokens
            .get(token)
            .map(|state| state.allowance)
            .unwrap_or_default();
        if !allowance.covers(amount, now_nanos()) {
            debug!(token = %token, "allowance short or expired, approving first");
            let handle = self.connector.token(token);
            match handle.approve(amount).await? {
                TxReceipt::Settled(_) => {}
                rejected @ TxReceipt::Rejected(_) => return Ok(rejected),
            }
        }
        self.ledger.deposit(token, amount).await
    }

    /// Move vault funds back to the wallet. No approval phase: the vault
    /// already holds these funds.
    pub async fn withdraw(&self, token: &TokenId, amount_text: &str) -> Result<TxReceipt> {
        let amount = self.parse_amount(token, amount_text, "withdraw")?;
        self.claim_busy(token)?;
        let result = self.ledger.withdraw(token, amount).await;
        self.conclude(token, "withdraw", &result, false);
        result
    }

    /// Move vault funds to another account. The recipient must parse as a
    /// well-formed identity before any network call happens.
    pub async fn transfer(
        &self,
        token: &TokenId,
        amount_text: &str,
        recipient_text: &str,
    ) -> Result<TxReceipt> {
        let amount = self.parse_amount(token, amount_text, "transfer")?;
        let recipient = match AccountId::from_text(recipient_text.trim()) {
            Ok(recipient) => recipient,
            Err(e) => {
                self.bus.error("transfer", &e);
                return Err(e);
            }
        };
        self.claim_busy(token)?;
        let result = self.ledger.transfer(token, &recipient, amount).await;
        self.conclude(token, "transfer", &result, true);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::types::{Allowance, BookConfig, TokenMeta};
    use mirror_ledger::SimExchange;

    fn meta() -> TokenMeta {
        TokenMeta {
            name: "Test".into(),
            symbol: "TST".into(),
            decimals: 2,
            fee: 1,
        }
    }

    fn account(text: &str) -> AccountId {
        AccountId::from_text(text).unwrap()
    }

    struct Fixture {
        sim: SimExchange,
        token: TokenId,
        store: Arc<MirrorStore>,
        sync: VaultSync,
        alice: AccountId,
    }

    fn fixture() -> Fixture {
        let sim = SimExchange::new();
        let token = TokenId::new("tkn");
        let alice = account("alice-2dq3k");
        sim.add_token(&token, meta());
        sim.credit(&token, &alice, 10_000);
        sim.set_withdrawal_fee(&token, 5);
        sim.set_actor(&alice);

        let store = Arc::new(MirrorStore::new());
        store.tokens.set_meta(&token, meta());
        store.vault.ensure(&token);

        let session = Arc::new(Session::new());
        session.sign_in(alice.clone());

        let sync = VaultSync::new(
            Arc::new(sim.clone()),
            store.clone(),
            session.clone(),
            Arc::new(EventBus::new()),
            MirrorConfig::from_env(),
        );
        *sync.tokens.write() = vec![token.clone()];
        Fixture {
            sim,
            token,
            store,
            sync,
            alice,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_populates_every_mirror_slice() {
        use mirror_ledger::sim::SimOrder;
        use mirror_core::types::Side;
        use std::time::Duration;

        let sim = SimExchange::new();
        let token = TokenId::new("tkn");
        let alice = account("alice-2dq3k");
        sim.add_token(&token, meta());
        sim.credit(&token, &alice, 10_000);
        sim.set_withdrawal_fee(&token, 5);
        sim.set_unlocked(&token, &alice, 700);
        sim.set_actor(&alice);

        let book = BookId::new("bk");
        sim.add_book(
            &book,
            BookConfig {
                base: token.clone(),
                quote: token.clone(),
                maker_fee_num: 1,
                taker_fee_num: 2,
                fee_denom: 1000,
                close_fee_base: 0,
                close_fee_quote: 0,
            },
        );
        sim.insert_order(&book, SimOrder::open(Side::Sell, alice.clone(), 100, 50));
        sim.insert_order(&book, SimOrder::open(Side::Buy, alice.clone(), 90, 40));

        let store = Arc::new(MirrorStore::new());
        let session = Arc::new(Session::new());
        session.sign_in(alice.clone());

        let vault = Arc::new(VaultSync::new(
            Arc::new(sim.clone()),
            store.clone(),
            session.clone(),
            Arc::new(EventBus::new()),
            MirrorConfig::from_env(),
        ));
        let engine = tokio::spawn(Arc::clone(&vault).run());

        // paused clock: sleeps auto-advance, so the task tree spins freely
        let mut ready = false;
        for _ in 0..300 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let populated = store.tokens.meta(&token).is_some()
                && store.books.get(&book).is_some()
                && store.orders.count() == 2
                && store.vault.get(&token).map(|e| e.unlocked) == Some(700)
                && store
                    .books
                    .get(&book)
                    .map(|b| b.user_buys.len() == 1 && b.user_sells.len() == 1)
                    .unwrap_or(false);
            if populated {
                ready = true;
                break;
            }
        }
        assert!(ready, "engine never converged on the seeded state");
        assert_eq!(store.vault.get(&token).unwrap().withdrawal_fee, 5);

        // signing out ends the balance loop and the vault task returns
        session.sign_out();
        for _ in 0..300 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if engine.is_finished() {
                break;
            }
        }
        assert!(engine.is_finished());
    }

    #[tokio::test]
    async fn discovery_fails_without_tokens() {
        let sim = SimExchange::new();
        let sync = Arc::new(VaultSync::new(
            Arc::new(sim),
            Arc::new(MirrorStore::new()),
            Arc::new(Session::new()),
            Arc::new(EventBus::new()),
            MirrorConfig::from_env(),
        ));
        assert!(matches!(
            Arc::clone(&sync).run().await,
            Err(MirrorError::Init(_))
        ));
    }

    #[tokio::test]
    async fn balances_diff_against_the_mirror() {
        let f = fixture();
        f.sim.set_unlocked(&f.token, &f.alice, 700);

        assert!(f.sync.poll_balances(&f.alice).await.unwrap());
        assert_eq!(f.store.vault.get(&f.token).unwrap().unlocked, 700);
        assert!(!f.sync.poll_balances(&f.alice).await.unwrap());

        f.sim.set_unlocked(&f.token, &f.alice, 650);
        assert!(f.sync.poll_balances(&f.alice).await.unwrap());
    }

    #[tokio::test]
    async fn deposit_rejects_zero_without_any_network_call() {
        let f = fixture();
        f.sim.reset_calls();
        assert!(matches!(
            f.sync.deposit(&f.token, "0").await,
            Err(MirrorError::InvalidAmount(_))
        ));
        assert!(matches!(
            f.sync.deposit(&f.token, "nonsense").await,
            Err(MirrorError::InvalidAmount(_))
        ));
        assert!(f.sim.calls().is_empty());
        // the form was never marked busy
        assert!(!f.store.vault.get(&f.token).unwrap().form.busy);
    }

    #[tokio::test]
    async fn deposit_approves_first_when_allowance_is_short() {
        let f = fixture();
        f.sim.reset_calls();

        // mirror shows no allowance: approve must run, then deposit, in order
        let receipt = f.sync.deposit(&f.token, "5").await.unwrap();
        assert!(receipt.is_settled());
        assert_eq!(
            f.sim.calls(),
            vec!["token.approve tkn".to_string(), "vault.deposit tkn".to_string()]
        );
        assert_eq!(f.sim.unlocked_balance(&f.token, &f.alice), 500);
    }

    #[tokio::test]
    async fn deposit_skips_approval_when_allowance_covers() {
        let f = fixture();
        // both the mirror and the remote hold a sufficient, unexpired grant
        f.sim.grant_allowance(
            &f.token,
            &f.alice,
            Allowance {
                amount: 1_000,
                expires_at: None,
            },
        );
        f.store.tokens.update(&f.token, |state| {
            state.allowance = Allowance {
                amount: 1_000,
                expires_at: None,
            };
        });
        f.sim.reset_calls();

        let receipt = f.sync.deposit(&f.token, "5").await.unwrap();
        assert!(receipt.is_settled());
        assert_eq!(f.sim.calls(), vec!["vault.deposit tkn".to_string()]);
    }

    #[tokio::test]
    async fn expired_allowance_forces_a_fresh_approval() {
        let f = fixture();
        // remote and mirror agree on an expired grant
        let expired = Allowance {
            amount: 1_000,
            expires_at: Some(1),
        };
        f.sim.grant_allowance(&f.token, &f.alice, expired);
        f.store
            .tokens
            .update(&f.token, |state| state.allowance = expired);
        f.sim.reset_calls();

        let receipt = f.sync.deposit(&f.token, "5").await.unwrap();
        assert!(receipt.is_settled());
        assert_eq!(
            f.sim.calls(),
            vec!["token.approve tkn".to_string(), "vault.deposit tkn".to_string()]
        );
    }

    #[tokio::test]
    async fn settled_deposit_clears_the_amount_and_refreshes() {
        let f = fixture();
        f.store.vault.update(&f.token, |entry| {
            entry.form.amount = "5".into();
        });
        let mut refresh = f.sync.bus.subscribe_refresh();

        f.sync.deposit(&f.token, "5").await.unwrap();
        let entry = f.store.vault.get(&f.token).unwrap();
        assert!(entry.form.amount.is_empty());
        assert!(!entry.form.busy);
        assert!(refresh.try_recv().is_ok());
    }

    #[tokio::test]
    async fn rejected_deposit_keeps_the_typed_amount() {
        let f = fixture();
        // wallet can't cover it: the ledger rejects the deposit itself
        f.sim.grant_allowance(
            &f.token,
            &f.alice,
            Allowance {
                amount: u128::MAX,
                expires_at: None,
            },
        );
        f.store.tokens.update(&f.token, |state| {
            state.allowance = Allowance {
                amount: u128::MAX,
                expires_at: None,
            };
        });
        f.store.vault.update(&f.token, |entry| {
            entry.form.amount = "999.99".into();
        });
        let mut refresh = f.sync.bus.subscribe_refresh();

        let receipt = f.sync.deposit(&f.token, "999.99").await.unwrap();
        assert!(matches!(receipt, TxReceipt::Rejected(_)));
        let entry = f.store.vault.get(&f.token).unwrap();
        assert_eq!(entry.form.amount, "999.99");
        assert!(!entry.form.busy);
        assert!(refresh.try_recv().is_err());
    }

    #[tokio::test]
    async fn withdraw_goes_straight_to_the_ledger() {
        let f = fixture();
        f.sim.set_unlocked(&f.token, &f.alice, 1_000);
        f.sim.reset_calls();

        let receipt = f.sync.withdraw(&f.token, "5").await.unwrap();
        assert!(receipt.is_settled());
        // no approval phase
        assert_eq!(f.sim.calls(), vec!["vault.withdraw tkn".to_string()]);
        assert_eq!(f.sim.unlocked_balance(&f.token, &f.alice), 500);
    }

    #[tokio::test]
    async fn transfer_validates_the_recipient_before_any_call() {
        let f = fixture();
        f.sim.set_unlocked(&f.token, &f.alice, 1_000);
        f.sim.reset_calls();

        for bad in ["", "   ", "-bad-", "UPPER", "waytoolong-group"] {
            assert!(matches!(
                f.sync.transfer(&f.token, "5", bad).await,
                Err(MirrorError::InvalidRecipient(_))
            ));
        }
        assert!(f.sim.calls().is_empty());

        let receipt = f.sync.transfer(&f.token, "5", "bob-aaaaa").await.unwrap();
        assert!(receipt.is_settled());
        assert_eq!(f.sim.calls(), vec!["vault.transfer tkn".to_string()]);
        assert_eq!(
            f.sim.unlocked_balance(&f.token, &account("bob-aaaaa")),
            500
        );
    }

    #[tokio::test]
    async fn busy_operations_do_not_overlap() {
        let f = fixture();
        f.store.vault.update(&f.token, |entry| entry.form.busy = true);
        assert!(matches!(
            f.sync.withdraw(&f.token, "5").await,
            Err(MirrorError::Busy)
        ));
    }
}
