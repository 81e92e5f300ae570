use chrono::Utc;
use uuid::Uuid;

use shopflow_domain::id::{OrderId, UserId};
use shopflow_domain::payment::{PaymentRequest, PaymentResult};
use shopflow_messaging::MessagingError;
use shopflow_messaging::inbox::InboxRecord;
use shopflow_orders::domain::types::{Order, OrderStatus};
use shopflow_orders::inbound::apply_payment_result;
use shopflow_orders::usecase::payment_result::{ApplyPaymentResultUseCase, Settlement};

use crate::helpers::{MockOrderRepo, test_order};

fn request_for(order: &Order) -> PaymentRequest {
    order.payment_request()
}

fn record(result: &PaymentResult) -> InboxRecord {
    InboxRecord::new(
        "m1",
        "orders.payment_results",
        &serde_json::to_vec(result).unwrap(),
        Utc::now(),
    )
}

#[tokio::test]
async fn should_finish_order_on_successful_payment() {
    let order = test_order(OrderStatus::New);
    let repo = MockOrderRepo::new(vec![order.clone()]);
    let uc = ApplyPaymentResultUseCase { repo: repo.clone() };

    let settlement = uc
        .execute(&PaymentResult::success(&request_for(&order)))
        .await
        .unwrap();

    assert_eq!(settlement, Settlement::Applied(OrderStatus::Finished));
    assert_eq!(repo.status_of(order.id), Some(OrderStatus::Finished));
}

#[tokio::test]
async fn should_cancel_order_on_failed_payment() {
    let order = test_order(OrderStatus::New);
    let repo = MockOrderRepo::new(vec![order.clone()]);
    let result = PaymentResult::failed(&request_for(&order), "insufficient funds");

    apply_payment_result(repo.clone(), &record(&result)).await.unwrap();

    assert_eq!(repo.status_of(order.id), Some(OrderStatus::Canceled));
}

#[tokio::test]
async fn should_leave_terminal_order_untouched() {
    let order = test_order(OrderStatus::Canceled);
    let repo = MockOrderRepo::new(vec![order.clone()]);
    let uc = ApplyPaymentResultUseCase { repo: repo.clone() };

    let settlement = uc
        .execute(&PaymentResult::success(&request_for(&order)))
        .await
        .unwrap();

    assert_eq!(settlement, Settlement::AlreadySettled(OrderStatus::Canceled));
    assert_eq!(repo.status_of(order.id), Some(OrderStatus::Canceled));
}

#[tokio::test]
async fn should_report_unknown_order_as_retryable_failure() {
    let request = PaymentRequest {
        order_id: OrderId(Uuid::now_v7()),
        user_id: UserId(Uuid::now_v7()),
        amount: 10,
        description: "ghost".to_owned(),
    };

    let err = apply_payment_result(
        MockOrderRepo::empty(),
        &record(&PaymentResult::success(&request)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, MessagingError::HandlerFailure(_)), "got {err:?}");
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn should_reject_malformed_result_permanently() {
    let bad = InboxRecord::new("m1", "orders.payment_results", b"{\"status\":1}", Utc::now());

    let err = apply_payment_result(MockOrderRepo::empty(), &bad).await.unwrap_err();

    assert!(err.is_permanent());
}
