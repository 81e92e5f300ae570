use shopflow_domain::payment::{PaymentRequest, PaymentResult};

use crate::domain::repository::BillRepository;
use crate::error::PaymentsServiceError;

pub struct ProcessPaymentRequestUseCase<R: BillRepository> {
    pub repo: R,
}

impl<R: BillRepository> ProcessPaymentRequestUseCase<R> {
    /// Charge the request and queue its result. Refusals are results, not
    /// errors; only infrastructure failures return `Err`.
    pub async fn execute(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, PaymentsServiceError> {
        let result = self.repo.charge_and_enqueue(request).await?;
        if result.is_success() {
            tracing::info!(
                order_id = %request.order_id,
                amount = request.amount,
                "payment charged"
            );
        } else {
            tracing::info!(
                order_id = %request.order_id,
                reason = result.reason.as_deref().unwrap_or(""),
                "payment refused"
            );
        }
        Ok(result)
    }
}
