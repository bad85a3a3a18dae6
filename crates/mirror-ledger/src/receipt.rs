/// Outcome of a remote write call that reached the ledger. A transport
/// failure is a `MirrorError` instead; a `Rejected` receipt is the ledger's
/// own structured refusal. Neither is ever retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxReceipt {
    /// Accepted; carries the settlement block reference.
    Settled(u64),
    /// Refused by the ledger with a reason, surfaced verbatim to the user.
    Rejected(String),
}

impl TxReceipt {
    pub fn is_settled(&self) -> bool {
        matches!(self, TxReceipt::Settled(_))
    }
}
