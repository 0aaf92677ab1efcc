use rust_decimal::{Decimal, RoundingStrategy};

/// Exchange minimum order price; limits are clamped below it.
const MAX_LIMIT_PRICE: &str = "0.99";

/// Premium applied over the ask so the order crosses the spread.
const LIMIT_PREMIUM_PCT: &str = "1.01";

/// Shares to buy for a fixed dollar target: enough whole shares to cover
/// the target at the ask, never below the exchange minimum order size.
pub fn order_shares(target_usd: Decimal, ask: Decimal, min_shares: u64) -> Decimal {
    let min = Decimal::from(min_shares);
    if ask <= Decimal::ZERO {
        return min;
    }
    let needed = (target_usd / ask).ceil();
    needed.max(min)
}

/// Marketable limit price: 1% over the ask, rounded to the venue's 3
/// decimal tick, capped at 0.99.
pub fn buy_limit_price(ask: Decimal) -> Decimal {
    let premium: Decimal = LIMIT_PREMIUM_PCT.parse().expect("const");
    let cap: Decimal = MAX_LIMIT_PRICE.parse().expect("const");

    (ask * premium)
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn minimum_order_size_wins_for_small_targets() {
        // $1 at 0.37 needs 3 shares, below the 5-share venue minimum
        assert_eq!(order_shares(d("1"), d("0.37"), 5), d("5"));
    }

    #[test]
    fn large_targets_round_up_to_whole_shares() {
        assert_eq!(order_shares(d("10"), d("0.37"), 5), d("28"));
    }

    #[test]
    fn zero_ask_falls_back_to_minimum() {
        assert_eq!(order_shares(d("1"), Decimal::ZERO, 5), d("5"));
    }

    #[test]
    fn limit_price_adds_one_percent() {
        assert_eq!(buy_limit_price(d("0.50")), d("0.505"));
    }

    #[test]
    fn limit_price_rounds_to_three_decimals() {
        assert_eq!(buy_limit_price(d("0.333")), d("0.336"));
    }

    #[test]
    fn limit_price_capped_near_one() {
        assert_eq!(buy_limit_price(d("0.99")), d("0.99"));
    }
}
