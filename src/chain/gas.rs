use alloy::providers::Provider;

const GWEI: u128 = 1_000_000_000;

/// Bump applied to the observed priority fee when it already exceeds the
/// floor, expressed in percent.
const PRIORITY_BUMP_PCT: u128 = 10;

/// Max fee margin over (base + priority), expressed as a multiplier.
const MAX_FEE_MARGIN: u128 = 2;

/// Aggressive pricing for nonce-rescue transactions that must confirm
/// ahead of a stuck backlog.
pub const RESCUE_PRIORITY_GWEI: u128 = 150;
pub const RESCUE_MAX_GWEI: u128 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasFees {
    pub fn rescue() -> Self {
        Self {
            max_fee_per_gas: RESCUE_MAX_GWEI * GWEI,
            max_priority_fee_per_gas: RESCUE_PRIORITY_GWEI * GWEI,
        }
    }
}

/// EIP-1559 fee oracle tuned for Polygon, where validators ignore
/// transactions tipping below roughly 30 gwei.
#[derive(Debug, Clone)]
pub struct GasOracle {
    priority_floor: u128,
    max_fee_cap: u128,
}

impl GasOracle {
    pub fn new(priority_floor_gwei: u64, max_fee_cap_gwei: u64) -> Self {
        Self {
            priority_floor: priority_floor_gwei as u128 * GWEI,
            max_fee_cap: max_fee_cap_gwei as u128 * GWEI,
        }
    }

    /// Current fee recommendation. Falls back to floor-priced defaults
    /// when the node's estimate is unavailable.
    pub async fn fees<P: Provider>(&self, provider: &P) -> GasFees {
        match provider.estimate_eip1559_fees().await {
            Ok(est) => {
                let observed_priority = est.max_priority_fee_per_gas;
                let base = est.max_fee_per_gas.saturating_sub(observed_priority);
                self.compute(base, observed_priority)
            }
            Err(e) => {
                tracing::warn!(error = %e, "fee estimation failed, using floor defaults");
                self.compute(self.priority_floor, 0)
            }
        }
    }

    /// Priority is the floor, bumped 10% above the observed tip when the
    /// network is paying more. Max fee carries a 2x margin over base plus
    /// priority, clipped to the cap.
    fn compute(&self, base_fee: u128, observed_priority: u128) -> GasFees {
        let priority = if observed_priority > self.priority_floor {
            observed_priority + observed_priority * PRIORITY_BUMP_PCT / 100
        } else {
            self.priority_floor
        };

        let max_fee = (base_fee + priority)
            .saturating_mul(MAX_FEE_MARGIN)
            .min(self.max_fee_cap);

        GasFees {
            max_fee_per_gas: max_fee.max(priority),
            max_priority_fee_per_gas: priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> GasOracle {
        GasOracle::new(35, 600)
    }

    #[test]
    fn quiet_network_uses_floor_priority() {
        let fees = oracle().compute(20 * GWEI, 25 * GWEI);
        assert_eq!(fees.max_priority_fee_per_gas, 35 * GWEI);
        assert_eq!(fees.max_fee_per_gas, (20 + 35) * 2 * GWEI);
    }

    #[test]
    fn busy_network_bumps_observed_priority() {
        let fees = oracle().compute(100 * GWEI, 50 * GWEI);
        assert_eq!(fees.max_priority_fee_per_gas, 55 * GWEI);
        assert_eq!(fees.max_fee_per_gas, (100 + 55) * 2 * GWEI);
    }

    #[test]
    fn max_fee_is_capped() {
        let fees = oracle().compute(500 * GWEI, 200 * GWEI);
        assert_eq!(fees.max_fee_per_gas, 600 * GWEI);
        assert!(fees.max_fee_per_gas >= fees.max_priority_fee_per_gas);
    }

    #[test]
    fn rescue_fees_are_fixed() {
        let fees = GasFees::rescue();
        assert_eq!(fees.max_priority_fee_per_gas, 150 * GWEI);
        assert_eq!(fees.max_fee_per_gas, 600 * GWEI);
    }
}
