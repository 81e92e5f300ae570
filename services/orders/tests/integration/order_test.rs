use uuid::Uuid;

use shopflow_domain::id::{OrderId, UserId};
use shopflow_domain::payment::PaymentRequest;
use shopflow_orders::domain::types::OrderStatus;
use shopflow_orders::error::OrdersServiceError;
use shopflow_orders::usecase::order::{
    CreateOrderInput, CreateOrderUseCase, GetOrderUseCase, ListOrdersUseCase,
};

use crate::helpers::{MockOrderRepo, test_order};

fn input(amount: i64, description: &str) -> CreateOrderInput {
    CreateOrderInput {
        user_id: UserId(Uuid::now_v7()),
        amount,
        description: description.to_owned(),
    }
}

#[tokio::test]
async fn should_create_order_with_payment_request_in_outbox() {
    let repo = MockOrderRepo::empty();
    let uc = CreateOrderUseCase { repo: repo.clone() };

    let order = uc.execute(input(1500, "  book  ")).await.unwrap();

    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.description, "book");
    let outbox = repo.outbox.lock().unwrap();
    assert_eq!(outbox.len(), 1, "expected exactly one outbox message");
    let message = &outbox[0];
    assert_eq!(message.exchange, "orders");
    assert_eq!(message.routing_key, "payment.request");
    let request: PaymentRequest = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(request.order_id, order.id);
    assert_eq!(request.amount, 1500);
    assert_eq!(
        message.headers.as_ref().unwrap()["order_id"],
        order.id.to_string()
    );
}

#[tokio::test]
async fn should_reject_non_positive_amount() {
    let repo = MockOrderRepo::empty();
    let uc = CreateOrderUseCase { repo: repo.clone() };

    for amount in [0, -10] {
        let result = uc.execute(input(amount, "book")).await;
        assert!(
            matches!(result, Err(OrdersServiceError::InvalidAmount)),
            "expected InvalidAmount, got {result:?}"
        );
    }
    assert!(repo.orders.lock().unwrap().is_empty());
    assert!(repo.outbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_reject_blank_description() {
    let uc = CreateOrderUseCase {
        repo: MockOrderRepo::empty(),
    };

    let result = uc.execute(input(100, " ")).await;

    assert!(matches!(result, Err(OrdersServiceError::InvalidDescription)));
}

#[tokio::test]
async fn should_surface_transaction_failure_as_internal() {
    let uc = CreateOrderUseCase {
        repo: MockOrderRepo::failing(),
    };

    let result = uc.execute(input(100, "book")).await;

    assert!(matches!(result, Err(OrdersServiceError::Internal(_))));
}

#[tokio::test]
async fn should_return_not_found_for_unknown_order() {
    let uc = GetOrderUseCase {
        repo: MockOrderRepo::empty(),
    };

    let result = uc.execute(OrderId(Uuid::now_v7())).await;

    assert!(matches!(result, Err(OrdersServiceError::OrderNotFound)));
}

#[tokio::test]
async fn should_list_only_the_users_orders() {
    let mine = test_order(OrderStatus::New);
    let mut second = test_order(OrderStatus::Finished);
    second.user_id = mine.user_id;
    second.created_at = mine.created_at + chrono::Duration::seconds(1);
    let other = test_order(OrderStatus::New);
    let uc = ListOrdersUseCase {
        repo: MockOrderRepo::new(vec![mine.clone(), second.clone(), other]),
    };

    let orders = uc.execute(mine.user_id).await.unwrap();

    let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.id, mine.id]);
}
