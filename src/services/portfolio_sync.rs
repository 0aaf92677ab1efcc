use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::db::position_repo::{self, AuthoritativeHolding, ReconcileSummary};
use crate::models::MarketRef;
use crate::polymarket::DataClient;
use crate::resolver::AssetResolver;

/// Reconciles the local ledger against the exchange's view of our own
/// account. Run at startup (where it also warms the resolver cache with
/// every held asset) and then periodically, so the ledger tracks
/// balance changes made outside the bot.
pub struct PortfolioSync {
    pool: SqlitePool,
    data: DataClient,
    resolver: Arc<AssetResolver>,
    /// Funds-holding wallet address, lowercase hex.
    account: String,
}

impl PortfolioSync {
    pub fn new(
        pool: SqlitePool,
        data: DataClient,
        resolver: Arc<AssetResolver>,
        account: String,
    ) -> Self {
        Self {
            pool,
            data,
            resolver,
            account,
        }
    }

    /// Recurring reconciliation loop. The caller is expected to have run
    /// the startup sync already, so the first interval tick is consumed.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = self.sync_once().await {
                tracing::warn!(error = %e, "periodic portfolio sync failed");
            }
        }
    }

    pub async fn sync_once(&self) -> anyhow::Result<ReconcileSummary> {
        let positions = self.data.get_positions(&self.account).await?;

        for p in &positions {
            self.resolver.seed(MarketRef {
                market_id: p.condition_id.clone(),
                outcome: p.outcome.clone(),
                slug: p.slug.clone().unwrap_or_default(),
                asset_id: p.asset.clone(),
            });
        }

        // Redeemable holdings stay in the ledger; the redemption engine
        // settles them with real PnL.
        let holdings: Vec<AuthoritativeHolding> = positions
            .iter()
            .map(|p| AuthoritativeHolding {
                asset_id: p.asset.clone(),
                market_id: p.condition_id.clone(),
                outcome: p.outcome.clone(),
                slug: p.slug.clone(),
                avg_price: p.avg_price,
                initial_value: p.initial_value,
            })
            .collect();

        let summary = position_repo::reconcile(&self.pool, &holdings).await?;
        tracing::info!(
            held = holdings.len(),
            seeded = summary.seeded,
            closed = summary.closed,
            "portfolio sync complete"
        );
        Ok(summary)
    }
}
