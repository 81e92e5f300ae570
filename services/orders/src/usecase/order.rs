use chrono::Utc;
use uuid::Uuid;

use shopflow_domain::id::{OrderId, UserId};
use shopflow_messaging::outbox::NewOutboxMessage;
use shopflow_messaging::topology::{ORDERS_EXCHANGE, PAYMENT_REQUEST_KEY};

use crate::domain::repository::OrderRepository;
use crate::domain::types::{Order, OrderStatus, validate_description};
use crate::error::OrdersServiceError;

// ── CreateOrder ──────────────────────────────────────────────────────────────

pub struct CreateOrderInput {
    pub user_id: UserId,
    pub amount: i64,
    pub description: String,
}

pub struct CreateOrderUseCase<R: OrderRepository> {
    pub repo: R,
}

impl<R: OrderRepository> CreateOrderUseCase<R> {
    /// Store a new order together with the payment request that charges it.
    pub async fn execute(&self, input: CreateOrderInput) -> Result<Order, OrdersServiceError> {
        if input.amount <= 0 {
            return Err(OrdersServiceError::InvalidAmount);
        }
        if !validate_description(&input.description) {
            return Err(OrdersServiceError::InvalidDescription);
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId(Uuid::now_v7()),
            user_id: input.user_id,
            amount: input.amount,
            description: input.description.trim().to_owned(),
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        };
        let message = NewOutboxMessage::json(
            ORDERS_EXCHANGE,
            PAYMENT_REQUEST_KEY,
            &order.payment_request(),
        )
        .map_err(anyhow::Error::from)?
        .with_header("order_id", order.id.to_string());

        self.repo.create_and_enqueue(&order, &message).await?;
        tracing::info!(order_id = %order.id, message_id = %message.message_id, "order created");
        Ok(order)
    }
}

// ── GetOrder ─────────────────────────────────────────────────────────────────

pub struct GetOrderUseCase<R: OrderRepository> {
    pub repo: R,
}

impl<R: OrderRepository> GetOrderUseCase<R> {
    pub async fn execute(&self, id: OrderId) -> Result<Order, OrdersServiceError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(OrdersServiceError::OrderNotFound)
    }
}

// ── ListOrders ───────────────────────────────────────────────────────────────

pub struct ListOrdersUseCase<R: OrderRepository> {
    pub repo: R,
}

impl<R: OrderRepository> ListOrdersUseCase<R> {
    pub async fn execute(&self, user_id: UserId) -> Result<Vec<Order>, OrdersServiceError> {
        self.repo.list_by_user(user_id).await
    }
}
