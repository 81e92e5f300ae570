use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopflow_domain::id::{OrderId, UserId};

use crate::domain::types::Order;
use crate::error::OrdersServiceError;
use crate::state::AppState;
use crate::usecase::order::{
    CreateOrderInput, CreateOrderUseCase, GetOrderUseCase, ListOrdersUseCase,
};

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
    pub status: &'static str,
    #[serde(serialize_with = "shopflow_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "shopflow_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            amount: order.amount,
            description: order.description,
            status: order.status.as_str(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// ── POST /orders/{user_id} ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub description: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), OrdersServiceError> {
    let usecase = CreateOrderUseCase {
        repo: state.order_repo(),
    };
    let order = usecase
        .execute(CreateOrderInput {
            user_id: UserId(user_id),
            amount: body.amount,
            description: body.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

// ── GET /orders/{user_id} ────────────────────────────────────────────────────

pub async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<OrderResponse>>, OrdersServiceError> {
    let usecase = ListOrdersUseCase {
        repo: state.order_repo(),
    };
    let orders = usecase.execute(UserId(user_id)).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

// ── GET /orders/status/{order_id} ────────────────────────────────────────────

pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, OrdersServiceError> {
    let usecase = GetOrderUseCase {
        repo: state.order_repo(),
    };
    let order = usecase.execute(OrderId(order_id)).await?;
    Ok(Json(order.into()))
}
