use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use crate::models::{Position, PositionStatus};

/// Raw row shape. SQLite stores money columns as REAL, so decimals cross
/// the boundary as f64 and are rebuilt on the way out.
#[derive(sqlx::FromRow)]
struct PositionRow {
    id: i64,
    market_id: String,
    outcome: String,
    asset_id: Option<String>,
    amount_usd: f64,
    entry_price: f64,
    exit_price: Option<f64>,
    pnl: Option<f64>,
    status: String,
    target_user: Option<String>,
    slug: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PositionRow> for Position {
    fn from(r: PositionRow) -> Self {
        Position {
            id: r.id,
            market_id: r.market_id,
            outcome: r.outcome,
            asset_id: r.asset_id,
            amount_usd: dec(r.amount_usd),
            entry_price: dec(r.entry_price),
            exit_price: r.exit_price.map(dec),
            pnl: r.pnl.map(dec),
            status: PositionStatus::from_str(&r.status),
            target_user: r.target_user,
            slug: r.slug,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

fn real(v: Decimal) -> f64 {
    v.to_f64().unwrap_or(0.0)
}

/// Open a new position or fold an add-on buy into the existing open row.
///
/// The partial unique index on (market_id, outcome) WHERE status = 'OPEN'
/// guarantees at most one open row per outcome; add-ons accumulate cost
/// basis and keep the original entry price.
#[allow(clippy::too_many_arguments)]
pub async fn open_or_add(
    pool: &SqlitePool,
    market_id: &str,
    outcome: &str,
    asset_id: Option<&str>,
    amount_usd: Decimal,
    entry_price: Decimal,
    target_user: Option<&str>,
    slug: Option<&str>,
) -> anyhow::Result<Position> {
    let existing = find_open(pool, market_id, outcome).await?;

    let row = match existing {
        Some(pos) => {
            sqlx::query_as::<_, PositionRow>(
                r#"
                UPDATE positions
                SET amount_usd = amount_usd + ?,
                    asset_id = COALESCE(?, asset_id),
                    updated_at = ?
                WHERE id = ?
                RETURNING *
                "#,
            )
            .bind(real(amount_usd))
            .bind(asset_id)
            .bind(Utc::now())
            .bind(pos.id)
            .fetch_one(pool)
            .await?
        }
        None => {
            let now = Utc::now();
            sqlx::query_as::<_, PositionRow>(
                r#"
                INSERT INTO positions
                    (market_id, outcome, asset_id, amount_usd, entry_price,
                     status, target_user, slug, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 'OPEN', ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(market_id)
            .bind(outcome)
            .bind(asset_id)
            .bind(real(amount_usd))
            .bind(real(entry_price))
            .bind(target_user)
            .bind(slug)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await?
        }
    };

    Ok(row.into())
}

/// Close an open position, recording the exit price and realized PnL.
/// A second close of the same row is a no-op.
pub async fn close(
    pool: &SqlitePool,
    id: i64,
    exit_price: Decimal,
    pnl: Decimal,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE positions
        SET status = 'CLOSED', exit_price = ?, pnl = ?, updated_at = ?
        WHERE id = ? AND status = 'OPEN'
        "#,
    )
    .bind(real(exit_price))
    .bind(real(pnl))
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// The single open row for a market/outcome pair, if any.
pub async fn find_open(
    pool: &SqlitePool,
    market_id: &str,
    outcome: &str,
) -> anyhow::Result<Option<Position>> {
    let row = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions WHERE market_id = ? AND outcome = ? AND status = 'OPEN' LIMIT 1",
    )
    .bind(market_id)
    .bind(outcome)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Look up an open position by its on-chain asset (token) id.
pub async fn find_by_asset_id(
    pool: &SqlitePool,
    asset_id: &str,
) -> anyhow::Result<Option<Position>> {
    let row = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions WHERE asset_id = ? AND status = 'OPEN' LIMIT 1",
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// Sum of open cost basis across every outcome of one market.
pub async fn total_open_exposure(pool: &SqlitePool, market_id: &str) -> anyhow::Result<Decimal> {
    let (total,): (f64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount_usd), 0) FROM positions WHERE market_id = ? AND status = 'OPEN'",
    )
    .bind(market_id)
    .fetch_one(pool)
    .await?;

    Ok(dec(total))
}

/// All open positions, most recently touched first.
pub async fn get_open_positions(pool: &SqlitePool) -> anyhow::Result<Vec<Position>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions WHERE status = 'OPEN' ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Recently closed positions.
pub async fn get_closed_positions(pool: &SqlitePool, limit: i64) -> anyhow::Result<Vec<Position>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions WHERE status = 'CLOSED' ORDER BY updated_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// One authoritative holding reported by the exchange, used to reconcile
/// the local ledger after a restart.
#[derive(Debug, Clone)]
pub struct AuthoritativeHolding {
    pub asset_id: String,
    pub market_id: String,
    pub outcome: String,
    pub slug: Option<String>,
    pub avg_price: Decimal,
    pub initial_value: Decimal,
}

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub seeded: usize,
    pub closed: usize,
}

/// Bring the ledger in line with the exchange's view of our account:
/// open rows with no matching holding are closed at their entry price
/// (zero PnL), and holdings with no open row are seeded.
pub async fn reconcile(
    pool: &SqlitePool,
    holdings: &[AuthoritativeHolding],
) -> anyhow::Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    let open = get_open_positions(pool).await?;
    for pos in &open {
        let still_held = match &pos.asset_id {
            Some(asset) => holdings.iter().any(|h| &h.asset_id == asset),
            // Rows without an asset id cannot be matched; leave them alone.
            None => true,
        };
        if !still_held && close(pool, pos.id, pos.entry_price, Decimal::ZERO).await? {
            summary.closed += 1;
        }
    }

    for h in holdings {
        let known = find_by_asset_id(pool, &h.asset_id).await?.is_some()
            || find_open(pool, &h.market_id, &h.outcome).await?.is_some();
        if !known {
            open_or_add(
                pool,
                &h.market_id,
                &h.outcome,
                Some(&h.asset_id),
                h.initial_value,
                h.avg_price,
                None,
                h.slug.as_deref(),
            )
            .await?;
            summary.seeded += 1;
        }
    }

    Ok(summary)
}
