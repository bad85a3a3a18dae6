pub mod api;
pub mod receipt;
pub mod sim;

pub use api::{BookLedger, LedgerConnector, TokenLedger, VaultLedger};
pub use receipt::TxReceipt;
pub use sim::SimExchange;
