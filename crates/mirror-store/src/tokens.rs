use dashmap::DashMap;

use mirror_core::types::{Allowance, TokenId, TokenMeta};

/// Wallet-side mirror of one token: metadata plus the authenticated
/// account's balance and vault allowance. `meta` stays `None` until the
/// token task's one-time metadata fetch succeeds.
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    pub meta: Option<TokenMeta>,
    pub balance: u128,
    pub allowance: Allowance,
}

/// Token mirror arena. Each token's state is written only by its own sync
/// task.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: DashMap<TokenId, TokenState>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&self, id: &TokenId) {
        self.tokens.entry(id.clone()).or_default();
    }

    pub fn set_meta(&self, id: &TokenId, meta: TokenMeta) {
        self.tokens.entry(id.clone()).or_default().meta = Some(meta);
    }

    pub fn meta(&self, id: &TokenId) -> Option<TokenMeta> {
        self.tokens.get(id).and_then(|t| t.meta.clone())
    }

    pub fn get(&self, id: &TokenId) -> Option<TokenState> {
        self.tokens.get(id).map(|t| t.clone())
    }

    pub fn update<R>(&self, id: &TokenId, f: impl FnOnce(&mut TokenState) -> R) -> Option<R> {
        self.tokens.get_mut(id).map(|mut t| f(&mut t))
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }
}
