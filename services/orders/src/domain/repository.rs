#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use shopflow_domain::id::{OrderId, UserId};
use shopflow_messaging::outbox::NewOutboxMessage;

use crate::domain::types::{Order, OrderStatus};
use crate::error::OrdersServiceError;

/// Repository for orders.
pub trait OrderRepository: Send + Sync {
    /// Insert the order and its outbox message atomically (same transaction).
    async fn create_and_enqueue(
        &self,
        order: &Order,
        message: &NewOutboxMessage,
    ) -> Result<(), OrdersServiceError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrdersServiceError>;

    /// Newest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, OrdersServiceError>;

    /// Move the order from `from` to `to`. Returns false when the order was
    /// no longer in `from`.
    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, OrdersServiceError>;
}
