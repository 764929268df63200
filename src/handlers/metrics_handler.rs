use super::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// Handle /metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.render())
}
