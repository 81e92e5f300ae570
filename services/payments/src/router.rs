use axum::{
    Router,
    routing::{get, post},
};

use shopflow_core::health::healthz;
use shopflow_core::middleware::{request_id_layer, trace_layer};

use crate::handlers::{
    bill::{create_bill, deposit, get_balance},
    health::readyz,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bills
        .route("/bills/{id}", post(create_bill))
        .route("/bills/{id}/deposit", post(deposit))
        .route("/bills/{id}/balance", get(get_balance))
        .layer(trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}
