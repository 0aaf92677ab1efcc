use axum::extract::State;
use axum::response::IntoResponse;

use crate::AppState;

/// Prometheus text exposition of all registered metrics.
pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
