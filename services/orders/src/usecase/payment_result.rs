use chrono::Utc;

use shopflow_domain::payment::PaymentResult;

use crate::domain::repository::OrderRepository;
use crate::domain::types::OrderStatus;
use crate::error::OrdersServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Applied(OrderStatus),
    /// The order had already left `new`; nothing changed.
    AlreadySettled(OrderStatus),
}

pub struct ApplyPaymentResultUseCase<R: OrderRepository> {
    pub repo: R,
}

impl<R: OrderRepository> ApplyPaymentResultUseCase<R> {
    /// Finish the order on success, cancel it on failure.
    pub async fn execute(&self, result: &PaymentResult) -> Result<Settlement, OrdersServiceError> {
        let order = self
            .repo
            .find_by_id(result.order_id)
            .await?
            .ok_or(OrdersServiceError::OrderNotFound)?;
        if order.status.is_terminal() {
            return Ok(Settlement::AlreadySettled(order.status));
        }

        let target = if result.is_success() {
            OrderStatus::Finished
        } else {
            OrderStatus::Canceled
        };
        let changed = self
            .repo
            .transition(order.id, OrderStatus::New, target, Utc::now())
            .await?;
        if !changed {
            let current = self
                .repo
                .find_by_id(order.id)
                .await?
                .map_or(target, |o| o.status);
            return Ok(Settlement::AlreadySettled(current));
        }
        Ok(Settlement::Applied(target))
    }
}
