use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use thiserror::Error;

/// Why a mirrored buy was refused.
#[derive(Debug, Error)]
pub enum LimitViolation {
    #[error("market exposure {current} + {adding} exceeds cap {max}")]
    ExposureExceeded {
        current: Decimal,
        adding: Decimal,
        max: Decimal,
    },

    #[error("cooldown active for {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },
}

/// Pre-trade checks: a per-market exposure cap across all outcomes, and
/// a per-(market, outcome) cooldown between consecutive buys.
pub struct LimitGuard {
    max_market_exposure: Decimal,
    cooldown: Duration,
    recent: Mutex<HashMap<(String, String), Instant>>,
}

impl LimitGuard {
    pub fn new(max_market_exposure: Decimal, cooldown: Duration) -> Self {
        Self {
            max_market_exposure,
            cooldown,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_buy(
        &self,
        market_id: &str,
        outcome: &str,
        current_exposure: Decimal,
        adding: Decimal,
    ) -> Result<(), LimitViolation> {
        if current_exposure + adding > self.max_market_exposure {
            return Err(LimitViolation::ExposureExceeded {
                current: current_exposure,
                adding,
                max: self.max_market_exposure,
            });
        }

        let key = (market_id.to_string(), outcome.to_string());
        if let Some(last) = self.recent.lock().unwrap().get(&key) {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                return Err(LimitViolation::CooldownActive {
                    remaining_secs: (self.cooldown - elapsed).as_secs(),
                });
            }
        }

        Ok(())
    }

    /// Start the cooldown clock after a successful buy.
    pub fn record_buy(&self, market_id: &str, outcome: &str) {
        self.recent
            .lock()
            .unwrap()
            .insert((market_id.to_string(), outcome.to_string()), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn guard() -> LimitGuard {
        LimitGuard::new(d("10"), Duration::from_secs(60))
    }

    #[test]
    fn buy_within_cap_passes() {
        assert!(guard().check_buy("m", "Yes", d("6"), d("1")).is_ok());
    }

    #[test]
    fn second_large_buy_trips_exposure_cap() {
        // Two $6 buys in a $10 market: the first fits, the second does not
        let g = guard();
        assert!(g.check_buy("m", "Yes", d("0"), d("6")).is_ok());
        let err = g.check_buy("m", "No", d("6"), d("6")).unwrap_err();
        assert!(matches!(err, LimitViolation::ExposureExceeded { .. }));
    }

    #[test]
    fn exposure_exactly_at_cap_passes() {
        assert!(guard().check_buy("m", "Yes", d("4"), d("6")).is_ok());
    }

    #[test]
    fn cooldown_blocks_repeat_buy_on_same_outcome() {
        let g = guard();
        g.record_buy("m", "Yes");
        let err = g.check_buy("m", "Yes", d("0"), d("1")).unwrap_err();
        assert!(matches!(err, LimitViolation::CooldownActive { .. }));
        // Other outcomes are unaffected
        assert!(g.check_buy("m", "No", d("0"), d("1")).is_ok());
    }
}
