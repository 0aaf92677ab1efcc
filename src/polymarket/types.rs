use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A holding reported by the Polymarket data API (`/positions?user=`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPosition {
    pub asset: String,
    pub condition_id: String,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub initial_value: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
    #[serde(default)]
    pub cur_price: Decimal,
    #[serde(default)]
    pub redeemable: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    pub outcome: String,
    #[serde(default)]
    pub outcome_index: u32,
    #[serde(default)]
    pub negative_risk: bool,
}

/// A fill reported by the data API (`/trades?user=`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrade {
    pub asset: String,
    pub condition_id: String,
    pub side: String,
    pub outcome: String,
    #[serde(default)]
    pub outcome_index: u32,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// One price level of a CLOB order book. Prices and sizes arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Order book snapshot for a single token (`/book?token_id=`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Lowest ask price, if the book has any asks.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks
            .iter()
            .filter_map(|l| l.price.parse::<Decimal>().ok())
            .min()
    }

    /// Highest bid price, if the book has any bids.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids
            .iter()
            .filter_map(|l| l.price.parse::<Decimal>().ok())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn level(price: &str) -> BookLevel {
        BookLevel {
            price: price.into(),
            size: "100".into(),
        }
    }

    #[test]
    fn best_prices_from_unsorted_book() {
        let book = OrderBook {
            bids: vec![level("0.31"), level("0.35"), level("0.29")],
            asks: vec![level("0.40"), level("0.37"), level("0.42")],
        };
        assert_eq!(book.best_bid(), Some(d("0.35")));
        assert_eq!(book.best_ask(), Some(d("0.37")));
    }

    #[test]
    fn empty_book_has_no_prices() {
        let book = OrderBook::default();
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn api_position_parses_camel_case() {
        let raw = r#"{
            "asset": "123456",
            "conditionId": "0xabc",
            "size": 10.5,
            "avgPrice": 0.42,
            "initialValue": 4.41,
            "currentValue": 5.0,
            "curPrice": 0.48,
            "redeemable": true,
            "slug": "will-it-happen",
            "outcome": "Yes",
            "outcomeIndex": 0,
            "negativeRisk": false
        }"#;
        let pos: ApiPosition = serde_json::from_str(raw).unwrap();
        assert_eq!(pos.condition_id, "0xabc");
        assert_eq!(pos.outcome, "Yes");
        assert!(pos.redeemable);
        assert_eq!(pos.avg_price, d("0.42"));
    }
}
