//! Inbox callback for `payment.result` messages.

use async_trait::async_trait;

use shopflow_domain::payment::PaymentResult;
use shopflow_messaging::MessagingError;
use shopflow_messaging::inbox::{InboundHandler, InboxRecord};

use crate::domain::repository::OrderRepository;
use crate::infra::db::DbOrderRepository;
use crate::usecase::payment_result::{ApplyPaymentResultUseCase, Settlement};

/// Apply one drained payment result. Unknown orders are reported as handler
/// failures so the inbox retries and eventually quarantines them.
pub async fn apply_payment_result<R: OrderRepository>(
    repo: R,
    record: &InboxRecord,
) -> Result<(), MessagingError> {
    let result: PaymentResult = record.decode()?;
    let usecase = ApplyPaymentResultUseCase { repo };
    match usecase.execute(&result).await {
        Ok(Settlement::Applied(status)) => {
            tracing::info!(
                order_id = %result.order_id,
                message_id = %record.message_id,
                %status,
                reason = result.reason.as_deref().unwrap_or(""),
                "order settled"
            );
            Ok(())
        }
        Ok(Settlement::AlreadySettled(status)) => {
            tracing::info!(order_id = %result.order_id, %status, "order already settled");
            Ok(())
        }
        Err(e) => Err(MessagingError::handler(e)),
    }
}

pub struct PaymentResultHandler {
    repo: DbOrderRepository,
}

impl PaymentResultHandler {
    pub fn new(repo: DbOrderRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl InboundHandler for PaymentResultHandler {
    async fn handle(&self, record: &InboxRecord) -> Result<(), MessagingError> {
        apply_payment_result(self.repo.clone(), record).await
    }
}
