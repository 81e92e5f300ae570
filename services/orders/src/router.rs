use axum::{
    Router,
    routing::{get, post},
};

use shopflow_core::health::healthz;
use shopflow_core::middleware::{request_id_layer, trace_layer};

use crate::handlers::{
    health::readyz,
    order::{create_order, get_order_status, list_orders},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Orders
        .route("/orders/{user_id}", post(create_order))
        .route("/orders/{user_id}", get(list_orders))
        .route("/orders/status/{order_id}", get(get_order_status))
        .layer(trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}
