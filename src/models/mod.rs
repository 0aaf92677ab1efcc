pub mod notification;
pub mod position;

pub use notification::{TradeClosed, TradeOpened};
pub use position::{Position, PositionStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// TradeEvent — the trade-detected message emitted by the chain monitor
// ---------------------------------------------------------------------------

/// A fill on the exchange contract involving a target account.
///
/// Asset ids are full uint256 decimal strings; `"0"` is the collateral
/// (USDC) sentinel. Events are emitted in `(block_number, log_index)` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Matched target address, lowercase hex.
    pub user: String,
    pub tx_hash: String,
    pub maker: String,
    pub taker: String,
    pub maker_asset_id: String,
    pub taker_asset_id: String,
    pub side: Side,
    pub block_number: u64,
    pub log_index: u64,
}

impl TradeEvent {
    /// Idempotency key: one reaction per fill per matched user.
    pub fn dedup_key(&self) -> String {
        format!("{}-{}", self.tx_hash, self.user.to_lowercase())
    }

    /// The asset id the user traded (the non-collateral leg).
    pub fn outcome_asset_id(&self) -> &str {
        if self.maker_asset_id == "0" {
            &self.taker_asset_id
        } else {
            &self.maker_asset_id
        }
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fill: user={} side={} tx={} block={} idx={}",
            &self.user[..10.min(self.user.len())],
            self.side,
            &self.tx_hash[..10.min(self.tx_hash.len())],
            self.block_number,
            self.log_index,
        )
    }
}

// ---------------------------------------------------------------------------
// MarketRef — a resolved asset id
// ---------------------------------------------------------------------------

/// Human-meaningful market metadata for an opaque CTF token id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRef {
    pub market_id: String,
    pub outcome: String,
    pub slug: String,
    pub asset_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(maker_asset: &str, taker_asset: &str) -> TradeEvent {
        TradeEvent {
            user: "0xAbC123".into(),
            tx_hash: "0xdeadbeef".into(),
            maker: "0xmaker".into(),
            taker: "0xtaker".into(),
            maker_asset_id: maker_asset.into(),
            taker_asset_id: taker_asset.into(),
            side: Side::Buy,
            block_number: 1,
            log_index: 0,
        }
    }

    #[test]
    fn dedup_key_lowercases_user() {
        let e = event("0", "42");
        assert_eq!(e.dedup_key(), "0xdeadbeef-0xabc123");
    }

    #[test]
    fn outcome_asset_skips_collateral_sentinel() {
        assert_eq!(event("0", "42").outcome_asset_id(), "42");
        assert_eq!(event("42", "0").outcome_asset_id(), "42");
    }
}
