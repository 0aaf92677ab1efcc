use sqlx::SqlitePool;

/// Record an activity key as processed. Returns false if the key was
/// already present, making replayed fills a no-op for the caller.
pub async fn try_mark_processed(
    pool: &SqlitePool,
    key: &str,
    user_address: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO processed_activities (id, user_address, created_at) VALUES (?, ?, ?)",
    )
    .bind(key)
    .bind(user_address)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
