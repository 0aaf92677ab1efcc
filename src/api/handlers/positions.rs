use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::position_repo;
use crate::errors::AppError;
use crate::models::Position;
use crate::AppState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/positions — every open ledger row.
pub async fn open(State(state): State<AppState>) -> Result<Json<Vec<Position>>, AppError> {
    let positions = position_repo::get_open_positions(&state.db).await?;
    Ok(Json(positions))
}

/// GET /api/positions/history — recently closed rows.
pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<Position>>, AppError> {
    let limit = q.limit.clamp(1, 500);
    let positions = position_repo::get_closed_positions(&state.db, limit).await?;
    Ok(Json(positions))
}
