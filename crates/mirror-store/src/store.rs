use std::sync::Arc;

use crate::books::BookStore;
use crate::orders::OrderStore;
use crate::tokens::TokenStore;
use crate::trades::TradeStore;
use crate::vault::VaultStore;

/// All entity mirrors behind one handle. Each slice has exactly one writer
/// task; everything else reads, and treats an absent key as "not yet
/// hydrated".
#[derive(Debug)]
pub struct MirrorStore {
    pub tokens: Arc<TokenStore>,
    pub orders: Arc<OrderStore>,
    pub trades: Arc<TradeStore>,
    pub books: Arc<BookStore>,
    pub vault: Arc<VaultStore>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(TokenStore::new()),
            orders: Arc::new(OrderStore::new()),
            trades: Arc::new(TradeStore::new()),
            books: Arc::new(BookStore::new()),
            vault: Arc::new(VaultStore::new()),
        }
    }
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new()
    }
}
