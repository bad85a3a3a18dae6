use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("initialization failed: {0}")]
    Init(String),

    #[error("ledger call failed: {0}")]
    Transport(String),

    #[error("rejected by ledger: {0}")]
    Rejected(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("no account is signed in")]
    NotAuthenticated,

    #[error("operation already in flight")]
    Busy,

    #[error("token metadata not loaded: {0}")]
    MetadataMissing(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
