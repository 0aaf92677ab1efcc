use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider};
use rust_decimal::Decimal;
use serde::Serialize;

use super::clob_client::ClobClient;
use super::data_client::DataClient;

/// How long to stay quiet after a balance fetch fails. Public endpoints
/// rate-limit aggressively and the balance line is decorative.
const ERROR_THROTTLE: Duration = Duration::from_secs(3_600);

const WEI_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Snapshot of the account's funds: native gas token (POL), spendable
/// USDC, and the mark value of open Polymarket holdings.
#[derive(Debug, Clone, Serialize)]
pub struct Balances {
    pub pol: Decimal,
    pub usdc: Decimal,
    pub portfolio_value: Decimal,
}

/// Fetches account balances for notification footers and the control
/// API, backing off for an hour after any failure.
pub struct BalanceChecker {
    clob: ClobClient,
    data: DataClient,
    provider: DynProvider,
    address: String,
    last_error: Mutex<Option<Instant>>,
}

impl BalanceChecker {
    pub fn new(clob: ClobClient, data: DataClient, provider: DynProvider, address: String) -> Self {
        Self {
            clob,
            data,
            provider,
            address,
            last_error: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Full balance snapshot: gas token from the chain, cash from the
    /// CLOB, portfolio value summed over data-API holdings.
    pub async fn balances(&self) -> anyhow::Result<Balances> {
        let account = Address::from_str(&self.address)?;
        let wei = self.provider.get_balance(account).await?;
        let usdc = self.clob.get_collateral_balance(&self.address).await?;
        let portfolio_value = self
            .data
            .get_positions(&self.address)
            .await?
            .iter()
            .map(|p| p.current_value)
            .sum();

        Ok(Balances {
            pol: wei_to_token(wei),
            usdc,
            portfolio_value,
        })
    }

    /// Current USDC balance, or None while throttled or on failure.
    pub async fn usdc_balance(&self) -> Option<Decimal> {
        if self.throttled() {
            return None;
        }

        match self.clob.get_collateral_balance(&self.address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::warn!(error = %e, "balance fetch failed, throttling for an hour");
                *self.last_error.lock().unwrap() = Some(Instant::now());
                None
            }
        }
    }

    /// Formatted balance line for a notification, if available.
    pub async fn balance_line(&self) -> Option<String> {
        self.usdc_balance()
            .await
            .map(|b| format!("${:.2}", b))
    }

    fn throttled(&self) -> bool {
        self.last_error
            .lock()
            .unwrap()
            .map(|t| t.elapsed() < ERROR_THROTTLE)
            .unwrap_or(false)
    }
}

fn wei_to_token(wei: U256) -> Decimal {
    let whole = wei / U256::from(WEI_PER_TOKEN);
    let frac = wei % U256::from(WEI_PER_TOKEN);
    // Saturate absurd whole-token counts; the remainder always fits
    let whole = Decimal::from(u64::try_from(whole).unwrap_or(u64::MAX));
    let frac = Decimal::from(frac.to::<u64>()) / Decimal::from(WEI_PER_TOKEN);
    whole + frac
}
