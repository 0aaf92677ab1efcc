use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use polycopy::db::position_repo;
use polycopy::models::Position;

/// Fresh in-memory database with migrations applied. A single connection
/// keeps every query on the same in-memory instance.
#[allow(dead_code)]
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

#[allow(dead_code)]
pub async fn seed_open_position(
    pool: &SqlitePool,
    market_id: &str,
    outcome: &str,
    asset_id: &str,
    amount_usd: Decimal,
    entry_price: Decimal,
) -> Position {
    position_repo::open_or_add(
        pool,
        market_id,
        outcome,
        Some(asset_id),
        amount_usd,
        entry_price,
        Some("0xtarget"),
        Some("test-market"),
    )
    .await
    .expect("failed to seed position")
}

#[allow(dead_code)]
pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}
