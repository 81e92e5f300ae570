use axum::extract::State;
use axum::http::StatusCode;

use shopflow_core::health::readiness;

use crate::state::AppState;

/// `GET /readyz`: ready while the broker connection is up.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    readiness(state.registry.supervisor().is_connected().await)
}
