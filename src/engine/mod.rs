pub mod limits;
pub mod sizing;
pub mod trade_engine;

pub use limits::{LimitGuard, LimitViolation};
pub use trade_engine::TradeEngine;
