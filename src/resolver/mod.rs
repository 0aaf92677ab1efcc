use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::db::position_repo;
use crate::models::MarketRef;
use crate::polymarket::DataClient;

const LOOKUP_ATTEMPTS: u32 = 3;

/// Maps opaque CTF token ids to market metadata.
///
/// Resolution walks three tiers: an in-memory cache, the local ledger,
/// and finally the data API (positions, then trade history) for the
/// account that produced the fill. The data API lags the chain by a few
/// seconds, so API lookups retry with a delay.
pub struct AssetResolver {
    pool: SqlitePool,
    data: DataClient,
    cache: Mutex<HashMap<String, MarketRef>>,
    indexing_delay: Duration,
}

impl AssetResolver {
    pub fn new(pool: SqlitePool, data: DataClient, indexing_delay: Duration) -> Self {
        Self {
            pool,
            data,
            cache: Mutex::new(HashMap::new()),
            indexing_delay,
        }
    }

    /// Pre-populate the cache, typically from a portfolio sync.
    pub fn seed(&self, market: MarketRef) {
        self.cache
            .lock()
            .unwrap()
            .insert(market.asset_id.clone(), market);
    }

    pub fn cached(&self, asset_id: &str) -> Option<MarketRef> {
        self.cache.lock().unwrap().get(asset_id).cloned()
    }

    /// Resolve an asset id, consulting `user`'s holdings and trade
    /// history when local tiers miss. Returns None when every tier
    /// comes up empty.
    pub async fn resolve(&self, user: &str, asset_id: &str) -> anyhow::Result<Option<MarketRef>> {
        if let Some(hit) = self.cached(asset_id) {
            return Ok(Some(hit));
        }

        if let Some(pos) = position_repo::find_by_asset_id(&self.pool, asset_id).await? {
            let market = MarketRef {
                market_id: pos.market_id,
                outcome: pos.outcome,
                slug: pos.slug.unwrap_or_default(),
                asset_id: asset_id.to_string(),
            };
            self.seed(market.clone());
            return Ok(Some(market));
        }

        if let Some(market) = self.lookup_via_api(user, asset_id).await {
            self.seed(market.clone());
            return Ok(Some(market));
        }

        tracing::warn!(asset_id, user, "asset resolution failed on every tier");
        Ok(None)
    }

    async fn lookup_via_api(&self, user: &str, asset_id: &str) -> Option<MarketRef> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            match self.data.get_positions(user).await {
                Ok(positions) => {
                    if let Some(p) = positions.iter().find(|p| p.asset == asset_id) {
                        return Some(MarketRef {
                            market_id: p.condition_id.clone(),
                            outcome: p.outcome.clone(),
                            slug: p.slug.clone().unwrap_or_default(),
                            asset_id: asset_id.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "positions lookup failed");
                }
            }
            tokio::time::sleep(self.indexing_delay).await;
        }

        // Sells can vanish from holdings before we look; trade history
        // still names the market.
        for attempt in 1..=LOOKUP_ATTEMPTS {
            match self.data.get_trades(user).await {
                Ok(trades) => {
                    if let Some(t) = trades.iter().find(|t| t.asset == asset_id) {
                        return Some(MarketRef {
                            market_id: t.condition_id.clone(),
                            outcome: t.outcome.clone(),
                            slug: t.slug.clone().unwrap_or_default(),
                            asset_id: asset_id.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "trades lookup failed");
                }
            }
            tokio::time::sleep(self.indexing_delay).await;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(asset: &str) -> MarketRef {
        MarketRef {
            market_id: "0xcond".into(),
            outcome: "Yes".into(),
            slug: "some-market".into(),
            asset_id: asset.into(),
        }
    }

    // Single connection so every query sees the same in-memory database.
    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn cache_tier_hits_without_io() {
        let pool = test_pool().await;

        let resolver = AssetResolver::new(
            pool,
            DataClient::new(reqwest::Client::new()),
            Duration::from_millis(1),
        );
        resolver.seed(market("42"));

        let got = resolver.resolve("0xuser", "42").await.unwrap();
        assert_eq!(got, Some(market("42")));
    }

    #[tokio::test]
    async fn ledger_tier_populates_cache() {
        let pool = test_pool().await;

        position_repo::open_or_add(
            &pool,
            "0xcond",
            "Yes",
            Some("42"),
            "1".parse().unwrap(),
            "0.5".parse().unwrap(),
            None,
            Some("some-market"),
        )
        .await
        .unwrap();

        let resolver = AssetResolver::new(
            pool,
            DataClient::new(reqwest::Client::new()),
            Duration::from_millis(1),
        );

        let got = resolver.resolve("0xuser", "42").await.unwrap().unwrap();
        assert_eq!(got.market_id, "0xcond");
        assert!(resolver.cached("42").is_some());
    }
}
