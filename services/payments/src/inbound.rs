//! Inbox callback for `payment.request` messages.

use async_trait::async_trait;

use shopflow_domain::payment::PaymentRequest;
use shopflow_messaging::MessagingError;
use shopflow_messaging::inbox::{InboundHandler, InboxRecord};

use crate::domain::repository::BillRepository;
use crate::infra::db::DbBillRepository;
use crate::usecase::payment_request::ProcessPaymentRequestUseCase;

pub async fn process_payment_request<R: BillRepository>(
    repo: R,
    record: &InboxRecord,
) -> Result<(), MessagingError> {
    let request: PaymentRequest = record.decode()?;
    let usecase = ProcessPaymentRequestUseCase { repo };
    usecase
        .execute(&request)
        .await
        .map(|_| ())
        .map_err(MessagingError::handler)
}

pub struct PaymentRequestHandler {
    repo: DbBillRepository,
}

impl PaymentRequestHandler {
    pub fn new(repo: DbBillRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl InboundHandler for PaymentRequestHandler {
    async fn handle(&self, record: &InboxRecord) -> Result<(), MessagingError> {
        process_payment_request(self.repo.clone(), record).await
    }
}
