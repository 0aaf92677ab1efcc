use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::AppState;

/// POST /api/control/pause — stop mirroring new fills.
pub async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    state.pause_flag.store(true, Ordering::SeqCst);
    tracing::warn!("mirroring PAUSED via control API");
    (StatusCode::OK, Json(json!({ "status": "paused" })))
}

/// POST /api/control/resume — resume mirroring.
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    state.pause_flag.store(false, Ordering::SeqCst);
    tracing::info!("mirroring RESUMED via control API");
    (StatusCode::OK, Json(json!({ "status": "running" })))
}

/// GET /api/control/status — run mode and pause state.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let paused = state.pause_flag.load(Ordering::SeqCst);
    let mode = if state.live_trading { "live" } else { "dry_run" };

    Json(json!({
        "mode": mode,
        "paused": paused,
        "wallet": state.wallet_address,
        "targets": state.config.target_users,
    }))
}

/// GET /api/balance — gas token, cash and portfolio value, when
/// credentials allow it.
pub async fn balance(State(state): State<AppState>) -> impl IntoResponse {
    let Some(checker) = &state.balance_checker else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "balance checker not configured" })),
        );
    };

    match checker.balances().await {
        Ok(b) => (StatusCode::OK, Json(json!(b))),
        Err(e) => {
            tracing::warn!(error = %e, "balance snapshot failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "balance unavailable" })),
            )
        }
    }
}

/// POST /api/control/claim — kick off a redemption pass in the background.
pub async fn claim(State(state): State<AppState>) -> impl IntoResponse {
    let Some(redemption) = state.redemption.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no signer configured" })),
        );
    };

    tokio::spawn(async move {
        match redemption.run_pass().await {
            Ok(report) => tracing::info!(
                redeemed = report.redeemed,
                settled = report.settled,
                rescued = report.rescued,
                "manual redemption pass finished"
            ),
            Err(e) => tracing::warn!(error = %e, "manual redemption pass failed"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
}

/// POST /api/control/close-all — liquidate every open position.
pub async fn close_all(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let closed = state.engine.close_all().await?;
    Ok(Json(json!({ "closed": closed })))
}
