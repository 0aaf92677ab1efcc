pub mod auth;
pub mod balance;
pub mod clob_client;
pub mod data_client;
pub mod trading;
pub mod types;
pub mod wallet;

pub use auth::ClobAuth;
pub use balance::{BalanceChecker, Balances};
pub use clob_client::ClobClient;
pub use data_client::DataClient;
pub use trading::TradingClient;
pub use wallet::TraderWallet;
