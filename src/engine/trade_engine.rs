use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use super::limits::LimitGuard;
use super::sizing;
use crate::db::position_repo;
use crate::errors::ChainErrorKind;
use crate::models::{MarketRef, Side, TradeClosed, TradeEvent, TradeOpened};
use crate::polymarket::{BalanceChecker, ClobClient, DataClient, TradingClient};
use crate::resolver::AssetResolver;
use crate::services::notifier::Notifier;

/// Mirrors detected target fills with small fixed-size orders.
///
/// Events are consumed one at a time from the monitor's channel, so a
/// buy and its follow-up sell for the same market can never interleave.
pub struct TradeEngine {
    pool: SqlitePool,
    resolver: Arc<AssetResolver>,
    clob: ClobClient,
    data: DataClient,
    /// None in dry-run mode (no private key configured).
    trading: Option<Arc<TradingClient>>,
    balance: Option<Arc<BalanceChecker>>,
    notifier: Arc<Notifier>,
    limits: LimitGuard,
    target_usd: Decimal,
    min_order_shares: u64,
    target_names: std::collections::HashMap<String, String>,
    /// Funds-holding wallet, lowercase hex. Used to look up live share
    /// balances before selling.
    funds_address: Option<String>,
    paused: Arc<AtomicBool>,
}

impl TradeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        resolver: Arc<AssetResolver>,
        clob: ClobClient,
        data: DataClient,
        trading: Option<Arc<TradingClient>>,
        balance: Option<Arc<BalanceChecker>>,
        notifier: Arc<Notifier>,
        limits: LimitGuard,
        target_usd: Decimal,
        min_order_shares: u64,
        target_names: std::collections::HashMap<String, String>,
        funds_address: Option<String>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            resolver,
            clob,
            data,
            trading,
            balance,
            notifier,
            limits,
            target_usd,
            min_order_shares,
            target_names,
            funds_address,
            paused,
        }
    }

    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TradeEvent>) {
        tracing::info!(
            dry_run = self.trading.is_none(),
            target_usd = %self.target_usd,
            "trade engine started"
        );

        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle(&event).await {
                tracing::warn!(error = %e, %event, "failed to mirror fill");
                metrics::counter!("mirror_errors_total").increment(1);
            }
        }

        tracing::info!("trade channel closed, engine stopping");
    }

    async fn handle(&self, event: &TradeEvent) -> anyhow::Result<()> {
        if self.paused.load(Ordering::SeqCst) {
            tracing::info!(%event, "paused, skipping fill");
            metrics::counter!("fills_skipped_paused_total").increment(1);
            return Ok(());
        }

        // Without a signer no order can be sent; observe and log only,
        // leaving the ledger and cooldowns untouched.
        if self.trading.is_none() {
            tracing::info!(%event, "dry run, fill observed but not mirrored");
            metrics::counter!("fills_skipped_dry_run_total").increment(1);
            return Ok(());
        }

        let asset_id = event.outcome_asset_id().to_string();
        let Some(market) = self.resolver.resolve(&event.user, &asset_id).await? else {
            tracing::warn!(asset_id, "unresolvable asset, skipping fill");
            return Ok(());
        };

        match event.side {
            Side::Buy => self.mirror_buy(event, &market, &asset_id).await,
            Side::Sell => self.mirror_sell(event, &market, &asset_id).await,
        }
    }

    async fn mirror_buy(
        &self,
        event: &TradeEvent,
        market: &MarketRef,
        asset_id: &str,
    ) -> anyhow::Result<()> {
        let exposure = position_repo::total_open_exposure(&self.pool, &market.market_id).await?;
        if let Err(violation) =
            self.limits
                .check_buy(&market.market_id, &market.outcome, exposure, self.target_usd)
        {
            tracing::info!(market = %market.slug, %violation, "buy refused");
            metrics::counter!("buys_refused_total").increment(1);
            return Ok(());
        }

        let book = self.clob.get_book(asset_id).await?;
        let Some(ask) = book.best_ask() else {
            tracing::warn!(asset_id, "empty ask book, cannot mirror buy");
            return Ok(());
        };
        if ask <= Decimal::ZERO || ask >= Decimal::ONE {
            tracing::warn!(asset_id, %ask, "ask outside (0,1), cannot mirror buy");
            return Ok(());
        }

        let shares = sizing::order_shares(self.target_usd, ask, self.min_order_shares);
        let limit = sizing::buy_limit_price(ask);
        let cost = shares * limit;

        if let Some(trading) = &self.trading {
            if let Err(e) = trading
                .place_limit_order(asset_id, Side::Buy, shares, limit)
                .await
            {
                self.alert_if_insufficient_funds(&e).await;
                return Err(e);
            }
        }

        self.limits.record_buy(&market.market_id, &market.outcome);

        position_repo::open_or_add(
            &self.pool,
            &market.market_id,
            &market.outcome,
            Some(asset_id),
            cost,
            limit,
            Some(&event.user),
            Some(&market.slug),
        )
        .await?;

        metrics::counter!("buys_mirrored_total").increment(1);

        let new_balance = match &self.balance {
            Some(b) => b.balance_line().await,
            None => None,
        };
        self.notifier
            .notify_opened(TradeOpened {
                target_user: event.user.clone(),
                target_name: self.target_names.get(&event.user).cloned(),
                market_slug: market.slug.clone(),
                market_id: market.market_id.clone(),
                outcome: market.outcome.clone(),
                amount_usd: cost,
                price: limit,
                new_balance,
            })
            .await;

        Ok(())
    }

    async fn mirror_sell(
        &self,
        event: &TradeEvent,
        market: &MarketRef,
        asset_id: &str,
    ) -> anyhow::Result<()> {
        let position = match position_repo::find_by_asset_id(&self.pool, asset_id).await? {
            Some(p) => Some(p),
            None => position_repo::find_open(&self.pool, &market.market_id, &market.outcome).await?,
        };
        let Some(position) = position else {
            tracing::info!(market = %market.slug, "target sold, no position held");
            return Ok(());
        };

        if position.entry_price <= Decimal::ZERO {
            anyhow::bail!("position {} has no entry price", position.id);
        }

        let live = self.live_size(asset_id).await;
        if matches!(live, Some(size) if size <= Decimal::ZERO) {
            tracing::info!(id = position.id, "no live balance, closing row without order");
            position_repo::close(&self.pool, position.id, position.entry_price, Decimal::ZERO)
                .await?;
            return Ok(());
        }
        let shares = shares_to_sell(live, position.amount_usd, position.entry_price);

        // Best bid is the realistic fill estimate for a deep-discount sell.
        let book = self.clob.get_book(asset_id).await?;
        let exit_price = book.best_bid().unwrap_or(position.entry_price);

        if let Some(trading) = &self.trading {
            if let Err(e) = trading.sell_at_market(asset_id, shares).await {
                if is_dead_book_error(&e.to_string()) {
                    tracing::info!(id = position.id, "book gone, closing row without order");
                    position_repo::close(
                        &self.pool,
                        position.id,
                        position.entry_price,
                        Decimal::ZERO,
                    )
                    .await?;
                    return Ok(());
                }
                self.alert_if_insufficient_funds(&e).await;
                return Err(e);
            }
        }

        let pnl = (exit_price - position.entry_price) * shares;
        position_repo::close(&self.pool, position.id, exit_price, pnl).await?;

        metrics::counter!("sells_mirrored_total").increment(1);

        self.notifier
            .notify_closed(TradeClosed {
                target_user: event.user.clone(),
                market_slug: market.slug.clone(),
                market_id: market.market_id.clone(),
                outcome: market.outcome.clone(),
                amount_usd: position.amount_usd,
                entry_price: position.entry_price,
                exit_price,
                pnl,
            })
            .await;

        Ok(())
    }

    /// Liquidate every open position at market. Returns how many rows
    /// were closed.
    pub async fn close_all(&self) -> anyhow::Result<usize> {
        let Some(trading) = &self.trading else {
            anyhow::bail!("no signer configured, close-all unavailable");
        };

        let open = position_repo::get_open_positions(&self.pool).await?;
        let mut closed = 0usize;

        for position in open {
            let Some(asset_id) = position.asset_id.clone() else {
                tracing::warn!(id = position.id, "open row lacks asset id, skipping");
                continue;
            };
            if position.entry_price <= Decimal::ZERO {
                tracing::warn!(id = position.id, "open row lacks entry price, skipping");
                continue;
            }

            // Nothing held on chain means the row is stale; close it flat.
            let live = self.live_size(&asset_id).await;
            if matches!(live, Some(size) if size <= Decimal::ZERO) {
                if position_repo::close(&self.pool, position.id, position.entry_price, Decimal::ZERO)
                    .await?
                {
                    closed += 1;
                }
                continue;
            }
            let shares = shares_to_sell(live, position.amount_usd, position.entry_price);

            let exit_price = match self.clob.get_book(&asset_id).await {
                Ok(book) => book.best_bid().unwrap_or(position.entry_price),
                Err(e) => {
                    tracing::warn!(id = position.id, error = %e, "book fetch failed, skipping");
                    continue;
                }
            };

            if let Err(e) = trading.sell_at_market(&asset_id, shares).await {
                if is_dead_book_error(&e.to_string()) {
                    tracing::info!(id = position.id, "book gone, closing row without order");
                    if position_repo::close(
                        &self.pool,
                        position.id,
                        position.entry_price,
                        Decimal::ZERO,
                    )
                    .await?
                    {
                        closed += 1;
                    }
                } else {
                    self.alert_if_insufficient_funds(&e).await;
                    tracing::warn!(id = position.id, error = %e, "close order failed");
                }
                continue;
            }

            let pnl = (exit_price - position.entry_price) * shares;
            if position_repo::close(&self.pool, position.id, exit_price, pnl).await? {
                closed += 1;
            }
        }

        tracing::info!(closed, "close-all pass finished");
        Ok(closed)
    }

    /// Live share balance for an asset in the funds wallet, per the data
    /// API. None when the index is unreachable or no wallet is known;
    /// Some(0) when the index answers but reports nothing held.
    async fn live_size(&self, asset_id: &str) -> Option<Decimal> {
        let account = self.funds_address.as_ref()?;
        match self.data.get_positions(account).await {
            Ok(positions) => Some(
                positions
                    .iter()
                    .find(|p| p.asset == asset_id)
                    .map(|p| p.size)
                    .unwrap_or(Decimal::ZERO),
            ),
            Err(e) => {
                tracing::warn!(asset_id, error = %e, "live balance lookup failed");
                None
            }
        }
    }

    async fn alert_if_insufficient_funds(&self, error: &anyhow::Error) {
        if ChainErrorKind::classify(&error.to_string()) == ChainErrorKind::InsufficientFunds {
            self.notifier
                .notify_error(
                    "insufficient-funds",
                    "Order rejected: account cannot fund the trade.",
                )
                .await;
        }
    }
}

/// Shares to liquidate. The index's live balance is authoritative;
/// add-on buys accumulate cost at a frozen entry price, so dividing cost
/// basis by entry price overstates holdings bought at higher prices.
/// Reconstruction is the fallback when the index is unreachable.
fn shares_to_sell(live_size: Option<Decimal>, amount_usd: Decimal, entry_price: Decimal) -> Decimal {
    match live_size {
        Some(size) => size,
        None => amount_usd / entry_price,
    }
}

/// CLOB rejection for a market whose book was torn down (resolved or
/// delisted). Holding the row open forever is pointless; the position
/// settles via redemption or is worthless.
fn is_dead_book_error(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("orderbook does not exist") || m.contains("no orderbook")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn live_balance_overrides_cost_basis_reconstruction() {
        // $2.50 @ 0.5 plus a $4.00 add-on at 0.8: cost basis 6.50 with
        // entry frozen at 0.5 reconstructs to 13, but only 10 are held
        assert_eq!(shares_to_sell(Some(d("10")), d("6.50"), d("0.5")), d("10"));
    }

    #[test]
    fn reconstruction_used_when_index_unreachable() {
        assert_eq!(shares_to_sell(None, d("6.50"), d("0.5")), d("13"));
    }

    #[test]
    fn dead_book_rejections_detected() {
        assert!(is_dead_book_error("CLOB error: Orderbook does not exist"));
        assert!(is_dead_book_error("no orderbook for token"));
        assert!(!is_dead_book_error("insufficient funds"));
    }

    fn offline_engine(pool: SqlitePool) -> TradeEngine {
        let http = reqwest::Client::new();
        let resolver = Arc::new(AssetResolver::new(
            pool.clone(),
            DataClient::new(http.clone()),
            Duration::from_millis(1),
        ));
        TradeEngine::new(
            pool,
            resolver,
            ClobClient::new(http.clone(), None),
            DataClient::new(http),
            None,
            None,
            Arc::new(Notifier::new(None, None)),
            LimitGuard::new(d("10"), Duration::from_secs(60)),
            Decimal::ONE,
            5,
            HashMap::new(),
            None,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn dry_run_leaves_ledger_untouched() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let engine = offline_engine(pool.clone());
        let event = TradeEvent {
            user: "0xabc".into(),
            tx_hash: "0xdeadbeef".into(),
            maker: "0xabc".into(),
            taker: "0xdef".into(),
            maker_asset_id: "0".into(),
            taker_asset_id: "42".into(),
            side: Side::Buy,
            block_number: 10,
            log_index: 0,
        };

        engine.handle(&event).await.unwrap();

        let open = position_repo::get_open_positions(&pool).await.unwrap();
        assert!(open.is_empty());
        // Cooldown was not stamped either: a later live buy would pass
        assert!(engine.limits.check_buy("m", "Yes", d("0"), d("1")).is_ok());
    }

    #[tokio::test]
    async fn close_all_refuses_without_signer() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        position_repo::open_or_add(
            &pool,
            "0xcond",
            "Yes",
            Some("42"),
            d("1"),
            d("0.5"),
            None,
            None,
        )
        .await
        .unwrap();

        let engine = offline_engine(pool.clone());
        assert!(engine.close_all().await.is_err());

        let open = position_repo::get_open_positions(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
