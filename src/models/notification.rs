use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payload for a trade-opened notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOpened {
    pub target_user: String,
    pub target_name: Option<String>,
    pub market_slug: String,
    pub market_id: String,
    pub outcome: String,
    pub amount_usd: Decimal,
    pub price: Decimal,
    pub new_balance: Option<String>,
}

/// Payload for a trade-closed notification (sell mirror or redemption).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeClosed {
    pub target_user: String,
    pub market_slug: String,
    pub market_id: String,
    pub outcome: String,
    pub amount_usd: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
}

impl TradeClosed {
    /// Plain-language result label for the sink.
    pub fn result_label(&self) -> &'static str {
        if self.pnl > Decimal::ZERO {
            "WON"
        } else if self.pnl < Decimal::ZERO {
            "LOST"
        } else {
            "CLOSED"
        }
    }
}
