use chrono::{Duration, Utc};

use shopflow_domain::payment::{PaymentRequest, PaymentStatus};
use shopflow_messaging::inbox::InboxRecord;
use shopflow_payments::domain::types::{
    BillStatus, INSUFFICIENT_FUNDS, NO_ACTIVE_BILL,
};
use shopflow_payments::inbound::process_payment_request;
use shopflow_payments::usecase::payment_request::ProcessPaymentRequestUseCase;

use crate::helpers::{MockBillRepo, new_user, older_bill, payment_request, test_bill};

fn record(request: &PaymentRequest) -> InboxRecord {
    InboxRecord::new(
        "m1",
        "payments.payment_requests",
        &serde_json::to_vec(request).unwrap(),
        Utc::now(),
    )
}

#[tokio::test]
async fn should_debit_bill_and_enqueue_success() {
    let user = new_user();
    let bill = test_bill(user, 2_000, BillStatus::Active);
    let repo = MockBillRepo::new(vec![bill.clone()]);
    let request = payment_request(user, 1_500);

    process_payment_request(repo.clone(), &record(&request)).await.unwrap();

    assert_eq!(repo.balance_of(bill.id), Some(500));
    let outbox = repo.outbox.lock().unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].order_id, request.order_id);
    assert_eq!(outbox[0].status, PaymentStatus::Success);
}

#[tokio::test]
async fn should_enqueue_failure_when_funds_are_short() {
    let user = new_user();
    let bill = test_bill(user, 100, BillStatus::Active);
    let repo = MockBillRepo::new(vec![bill.clone()]);

    let result = ProcessPaymentRequestUseCase { repo: repo.clone() }
        .execute(&payment_request(user, 1_500))
        .await
        .unwrap();

    assert_eq!(result.status, PaymentStatus::Failed);
    assert_eq!(result.reason.as_deref(), Some(INSUFFICIENT_FUNDS));
    assert_eq!(repo.balance_of(bill.id), Some(100));
    assert_eq!(repo.outbox.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_enqueue_failure_without_active_bill() {
    let user = new_user();
    let repo = MockBillRepo::new(vec![test_bill(user, 10_000, BillStatus::Suspended)]);

    let result = ProcessPaymentRequestUseCase { repo }
        .execute(&payment_request(user, 1))
        .await
        .unwrap();

    assert_eq!(result.reason.as_deref(), Some(NO_ACTIVE_BILL));
}

#[tokio::test]
async fn should_charge_the_oldest_active_bill() {
    let user = new_user();
    let oldest = older_bill(user, 1_000, Duration::hours(2));
    let newer = older_bill(user, 1_000, Duration::hours(1));
    let repo = MockBillRepo::new(vec![newer.clone(), oldest.clone()]);

    ProcessPaymentRequestUseCase { repo: repo.clone() }
        .execute(&payment_request(user, 300))
        .await
        .unwrap();

    assert_eq!(repo.balance_of(oldest.id), Some(700));
    assert_eq!(repo.balance_of(newer.id), Some(1_000));
}

#[tokio::test]
async fn should_quarantine_malformed_request() {
    let bad = InboxRecord::new("m1", "payments.payment_requests", b"not json", Utc::now());

    let err = process_payment_request(MockBillRepo::empty(), &bad)
        .await
        .unwrap_err();

    assert!(err.is_permanent(), "got {err:?}");
}
