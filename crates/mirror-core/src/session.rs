use parking_lot::RwLock;

use crate::types::AccountId;

/// The authenticated account, if any. The wallet/login collaborator (out of
/// scope here) writes it; sync tasks read it every iteration and treat
/// "none" as an idle poll.
#[derive(Debug, Default)]
pub struct Session {
    account: RwLock<Option<AccountId>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, account: AccountId) {
        *self.account.write() = Some(account);
    }

    pub fn sign_out(&self) {
        *self.account.write() = None;
    }

    pub fn current(&self) -> Option<AccountId> {
        self.account.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.read().is_some()
    }
}
