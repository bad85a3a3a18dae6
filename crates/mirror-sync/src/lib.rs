pub mod backoff;
pub mod book;
pub mod diff;
pub mod order;
pub mod pages;
pub mod price;
pub mod token;
pub mod vault;
pub mod wait;

pub use book::BookSync;
pub use order::OrderTradesSync;
pub use price::PriceLevelSync;
pub use token::TokenSync;
pub use vault::VaultSync;
pub use wait::{wait_for_refresh, Waited};
