use dashmap::DashMap;

use mirror_core::types::{TokenId, TransferForm};

/// Vault-side mirror for one token: the authenticated account's unlocked
/// balance, the withdrawal fee, and the deposit/withdraw/transfer input
/// form.
#[derive(Debug, Clone, Default)]
pub struct VaultEntry {
    pub unlocked: u128,
    pub withdrawal_fee: u128,
    pub form: TransferForm,
}

/// Vault mirror arena, written only by the vault task (balances) and its
/// mutating operations (forms).
#[derive(Debug, Default)]
pub struct VaultStore {
    entries: DashMap<TokenId, VaultEntry>,
}

impl VaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&self, id: &TokenId) {
        self.entries.entry(id.clone()).or_default();
    }

    pub fn set_withdrawal_fee(&self, id: &TokenId, fee: u128) {
        self.entries.entry(id.clone()).or_default().withdrawal_fee = fee;
    }

    /// Overwrite the unlocked balance; true if the value changed.
    pub fn set_unlocked(&self, id: &TokenId, unlocked: u128) -> bool {
        let mut entry = self.entries.entry(id.clone()).or_default();
        let changed = entry.unlocked != unlocked;
        entry.unlocked = unlocked;
        changed
    }

    pub fn get(&self, id: &TokenId) -> Option<VaultEntry> {
        self.entries.get(id).map(|e| e.clone())
    }

    pub fn update<R>(&self, id: &TokenId, f: impl FnOnce(&mut VaultEntry) -> R) -> Option<R> {
        self.entries.get_mut(id).map(|mut e| f(&mut e))
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_unlocked_reports_changes() {
        let store = VaultStore::new();
        let id = TokenId::new("tkn");
        assert!(store.set_unlocked(&id, 100));
        assert!(!store.set_unlocked(&id, 100));
        assert!(store.set_unlocked(&id, 99));
        assert_eq!(store.get(&id).unwrap().unlocked, 99);
    }
}
