use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use super::gas::{GasFees, GasOracle};
use super::{IConditionalTokens, IProxyWallet, ProxyCall, CONDITIONAL_TOKENS, USDC_E};
use crate::db::position_repo;
use crate::errors::ChainErrorKind;
use crate::models::notification::TradeClosed;
use crate::polymarket::types::ApiPosition;
use crate::polymarket::DataClient;
use crate::services::notifier::Notifier;

/// How long to wait for a redemption receipt before treating the
/// transaction as not yet confirmed.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct RedemptionReport {
    pub rescued: bool,
    pub redeemed: usize,
    pub settled: usize,
}

/// Claims winnings from resolved markets and settles the corresponding
/// ledger rows.
pub struct RedemptionEngine {
    provider: DynProvider,
    pool: SqlitePool,
    data: DataClient,
    oracle: GasOracle,
    notifier: Arc<Notifier>,
    /// Signer address, the account that pays gas.
    signer_address: Address,
    /// Funds-holding wallet. Redemptions are relayed through it when set.
    proxy_address: Option<Address>,
    nonce_backlog_threshold: u64,
    inter_redemption_delay: Duration,
    claim_interval: Duration,
    in_pass: AtomicBool,
}

impl RedemptionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: DynProvider,
        pool: SqlitePool,
        data: DataClient,
        oracle: GasOracle,
        notifier: Arc<Notifier>,
        signer_address: Address,
        proxy_address: Option<Address>,
        nonce_backlog_threshold: u64,
        inter_redemption_delay: Duration,
        claim_interval: Duration,
    ) -> Self {
        Self {
            provider,
            pool,
            data,
            oracle,
            notifier,
            signer_address,
            proxy_address,
            nonce_backlog_threshold,
            inter_redemption_delay,
            claim_interval,
            in_pass: AtomicBool::new(false),
        }
    }

    /// The wallet whose holdings are scanned for redeemables.
    fn funds_address(&self) -> Address {
        self.proxy_address.unwrap_or(self.signer_address)
    }

    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.claim_interval.as_secs(),
            account = %self.funds_address(),
            "redemption engine started"
        );

        let mut ticker = tokio::time::interval(self.claim_interval);
        loop {
            ticker.tick().await;
            match self.run_pass().await {
                Ok(report) => {
                    if report.redeemed > 0 || report.rescued {
                        tracing::info!(
                            redeemed = report.redeemed,
                            settled = report.settled,
                            rescued = report.rescued,
                            "redemption pass complete"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "redemption pass failed"),
            }
        }
    }

    /// One full claim pass. Re-entrant calls (manual trigger racing the
    /// timer) are rejected.
    pub async fn run_pass(&self) -> anyhow::Result<RedemptionReport> {
        if self.in_pass.swap(true, Ordering::SeqCst) {
            anyhow::bail!("redemption pass already running");
        }
        let result = self.pass_inner().await;
        self.in_pass.store(false, Ordering::SeqCst);
        result
    }

    async fn pass_inner(&self) -> anyhow::Result<RedemptionReport> {
        let mut report = RedemptionReport::default();

        // A stuck nonce backlog would queue every redemption behind it.
        // Rescue first and let the next pass do the claiming.
        let (pending, confirmed) = self.nonce_state().await?;
        if plan_pass(pending, confirmed, self.nonce_backlog_threshold) == PassAction::Rescue {
            self.rescue_nonce().await?;
            report.rescued = true;
            return Ok(report);
        }

        let account = format!("{:#x}", self.funds_address());
        let positions = self.data.get_positions(&account).await?;
        let redeemable: Vec<&ApiPosition> = positions.iter().filter(|p| p.redeemable).collect();

        if redeemable.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = redeemable.len(), "redeemable positions found");

        for pos in redeemable {
            match self.redeem_one(pos).await {
                Ok(confirmed) => {
                    report.redeemed += 1;
                    if confirmed && self.settle(pos).await? {
                        report.settled += 1;
                    }
                }
                Err(e) => {
                    let kind = ChainErrorKind::classify(&e.to_string());
                    tracing::warn!(
                        condition = %pos.condition_id,
                        error = %e,
                        ?kind,
                        "redemption failed"
                    );
                    if kind == ChainErrorKind::InsufficientFunds {
                        self.notifier
                            .notify_error(
                                "insufficient-funds",
                                "Redemption failed: signer cannot pay gas.",
                            )
                            .await;
                    }
                    if kind.aborts_batch() {
                        break;
                    }
                }
            }
            tokio::time::sleep(self.inter_redemption_delay).await;
        }

        Ok(report)
    }

    async fn nonce_state(&self) -> anyhow::Result<(u64, u64)> {
        let pending = self
            .provider
            .get_transaction_count(self.signer_address)
            .pending()
            .await?;
        let confirmed = self
            .provider
            .get_transaction_count(self.signer_address)
            .latest()
            .await?;
        Ok((pending, confirmed))
    }

    /// Replace the oldest pending transaction with an aggressively priced
    /// zero-value self-transfer, unsticking the queue behind it.
    async fn rescue_nonce(&self) -> anyhow::Result<()> {
        let confirmed = self
            .provider
            .get_transaction_count(self.signer_address)
            .latest()
            .await?;
        let fees = GasFees::rescue();

        tracing::warn!(nonce = confirmed, "nonce backlog detected, sending rescue transfer");
        metrics::counter!("nonce_rescues_total").increment(1);

        let tx = TransactionRequest::default()
            .with_to(self.signer_address)
            .with_value(U256::ZERO)
            .with_nonce(confirmed)
            .with_gas_limit(21_000)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let receipt = self
            .provider
            .send_transaction(tx)
            .await?
            .with_timeout(Some(RECEIPT_TIMEOUT))
            .get_receipt()
            .await?;

        tracing::info!(tx = %receipt.transaction_hash, "rescue transfer confirmed");
        Ok(())
    }

    /// Submit one `redeemPositions` call. Returns true once the receipt
    /// landed; a timeout leaves the claim pending for the next pass.
    async fn redeem_one(&self, pos: &ApiPosition) -> anyhow::Result<bool> {
        let condition_id = B256::from_str(&pos.condition_id)?;
        let index_sets = vec![U256::from(1u64) << (pos.outcome_index as usize)];
        let fees = self.oracle.fees(&self.provider).await;

        // Relay through the proxy wallet when one holds the tokens; a
        // failed relay falls back to a direct call from the signer.
        let pending = match self.proxy_address {
            Some(proxy) => {
                let calldata = IConditionalTokens::redeemPositionsCall {
                    collateralToken: USDC_E,
                    parentCollectionId: B256::ZERO,
                    conditionId: condition_id,
                    indexSets: index_sets.clone(),
                }
                .abi_encode();

                let wallet = IProxyWallet::new(proxy, &self.provider);
                let call = wallet
                    .proxy(vec![ProxyCall {
                        typeCode: 1,
                        to: CONDITIONAL_TOKENS,
                        value: U256::ZERO,
                        data: calldata.into(),
                    }])
                    .max_fee_per_gas(fees.max_fee_per_gas)
                    .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

                match call.send().await {
                    Ok(pending) => pending,
                    Err(e) if relay_may_fall_back(&e.to_string()) => {
                        tracing::warn!(error = %e, "proxy relay failed, trying direct call");
                        self.send_direct(condition_id, index_sets, fees).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => self.send_direct(condition_id, index_sets, fees).await?,
        };

        let tx_hash = *pending.tx_hash();
        match pending
            .with_timeout(Some(RECEIPT_TIMEOUT))
            .get_receipt()
            .await
        {
            Ok(receipt) => {
                metrics::counter!("redemptions_total").increment(1);
                tracing::info!(
                    tx = %receipt.transaction_hash,
                    condition = %pos.condition_id,
                    outcome = %pos.outcome,
                    "redemption confirmed"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(tx = %tx_hash, error = %e, "redemption not yet confirmed");
                Ok(false)
            }
        }
    }

    async fn send_direct(
        &self,
        condition_id: B256,
        index_sets: Vec<U256>,
        fees: GasFees,
    ) -> anyhow::Result<alloy::providers::PendingTransactionBuilder<alloy::network::Ethereum>> {
        let ctf = IConditionalTokens::new(CONDITIONAL_TOKENS, &self.provider);
        let call = ctf
            .redeemPositions(USDC_E, B256::ZERO, condition_id, index_sets)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
        Ok(call.send().await?)
    }

    /// Close the matching ledger row at full payout and notify.
    async fn settle(&self, pos: &ApiPosition) -> anyhow::Result<bool> {
        let Some(row) = position_repo::find_by_asset_id(&self.pool, &pos.asset).await? else {
            tracing::debug!(asset = %pos.asset, "no open ledger row for redeemed asset");
            return Ok(false);
        };

        let pnl = redemption_pnl(row.amount_usd, row.entry_price);
        let closed = position_repo::close(&self.pool, row.id, Decimal::ONE, pnl).await?;
        if !closed {
            return Ok(false);
        }

        self.notifier
            .notify_closed(TradeClosed {
                target_user: row.target_user.unwrap_or_default(),
                market_slug: row.slug.unwrap_or_else(|| row.market_id.clone()),
                market_id: row.market_id,
                outcome: row.outcome,
                amount_usd: row.amount_usd,
                entry_price: row.entry_price,
                exit_price: Decimal::ONE,
                pnl,
            })
            .await;

        Ok(true)
    }
}

/// What a claim pass should do given the signer's nonce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassAction {
    /// Unstick the queue; no redemptions this cycle.
    Rescue,
    /// Queue is healthy, claim as usual.
    Redeem,
}

/// A backlog of transactions stuck behind an underpriced one shows up as
/// pending nonce running ahead of the confirmed nonce.
fn plan_pass(pending: u64, confirmed: u64, threshold: u64) -> PassAction {
    if pending.saturating_sub(confirmed) > threshold {
        PassAction::Rescue
    } else {
        PassAction::Redeem
    }
}

/// A relay rejection worth retrying directly. Conditions that would sink
/// the direct call just the same (no gas money, rate limit, fee cap)
/// surface as errors instead.
fn relay_may_fall_back(message: &str) -> bool {
    !ChainErrorKind::classify(message).aborts_batch()
}

/// A winning outcome token pays out exactly one dollar, so the profit is
/// the share count minus what the shares cost.
fn redemption_pnl(amount_usd: Decimal, entry_price: Decimal) -> Decimal {
    if entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let shares = amount_usd / entry_price;
    shares - amount_usd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn win_pnl_is_shares_minus_cost() {
        // $4 at 0.40 buys 10 shares, paying out $10
        assert_eq!(redemption_pnl(d("4.00"), d("0.40")), d("6.00"));
    }

    #[test]
    fn zero_entry_price_yields_zero_pnl() {
        assert_eq!(redemption_pnl(d("4.00"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn backlog_over_threshold_rescues_instead_of_redeeming() {
        // Pending 20 vs confirmed 12: backlog 8 exceeds threshold 5, so
        // the pass sends the self-transfer and claims nothing
        assert_eq!(plan_pass(20, 12, 5), PassAction::Rescue);
        assert_eq!(plan_pass(17, 12, 5), PassAction::Redeem);
        // Confirmed ahead of pending never underflows
        assert_eq!(plan_pass(10, 12, 5), PassAction::Redeem);
    }

    #[test]
    fn fatal_relay_errors_do_not_fall_back_to_direct_call() {
        assert!(!relay_may_fall_back("insufficient funds for gas * price + value"));
        assert!(!relay_may_fall_back("429 Too Many Requests"));
        assert!(!relay_may_fall_back("max fee per gas less than block base fee"));
        // A proxy-specific revert is worth retrying directly
        assert!(relay_may_fall_back("execution reverted: not owner"));
    }

    #[test]
    fn index_set_is_one_shifted_by_outcome() {
        assert_eq!(U256::from(1u64) << 0usize, U256::from(1u64));
        assert_eq!(U256::from(1u64) << 1usize, U256::from(2u64));
    }
}
