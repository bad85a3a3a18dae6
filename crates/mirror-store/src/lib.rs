pub mod books;
pub mod orders;
pub mod store;
pub mod tokens;
pub mod trades;
pub mod vault;

pub use books::{BookState, BookStore, LevelKey};
pub use orders::OrderStore;
pub use store::MirrorStore;
pub use tokens::{TokenState, TokenStore};
pub use trades::TradeStore;
pub use vault::{VaultEntry, VaultStore};
