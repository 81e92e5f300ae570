use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use shopflow_messaging::broker::Broker;
use shopflow_messaging::config::MessagingConfig;
use shopflow_messaging::error::MessagingError;
use shopflow_messaging::inbox::{InboxRecord, MemoryInboxStore, inbound_fn};
use shopflow_messaging::memory::MemoryBroker;
use shopflow_messaging::outbox::{MemoryOutboxStore, NewOutboxMessage, OutboxStatus, OutboxStore};
use shopflow_messaging::runtime::{MessagingRuntime, Subscription};
use shopflow_messaging::topology::{
    ORDERS_EXCHANGE, PAYMENT_REQUEST_KEY, PAYMENT_RESULT_KEY, PAYMENTS_EXCHANGE,
    payment_request_consumer, payment_result_consumer, shop_topology,
};

use crate::helpers::eventually;

fn fast_config() -> MessagingConfig {
    MessagingConfig::from_lookup(|key| match key {
        "RABBITMQ_URL" => Some("memory://shop".to_owned()),
        "RABBITMQ_RECONNECT_DELAY_MS" => Some("50".to_owned()),
        "OUTBOX_POLL_INTERVAL_MS" | "INBOX_POLL_INTERVAL_MS" => Some("20".to_owned()),
        "OUTBOX_RETRY_BASE_DELAY_MS" => Some("20".to_owned()),
        _ => None,
    })
    .unwrap()
}

struct Side {
    runtime: MessagingRuntime,
    outbox: MemoryOutboxStore,
    inbox: MemoryInboxStore,
}

/// Payments side: answers every request with a success result through its
/// own outbox.
async fn payments_side(broker: &MemoryBroker, shutdown: &CancellationToken) -> Side {
    let outbox = MemoryOutboxStore::new();
    let inbox = MemoryInboxStore::new();
    let results = outbox.clone();
    let handler = inbound_fn(move |record: InboxRecord| {
        let results = results.clone();
        async move {
            let request: Value = record.decode()?;
            let result = json!({ "order_id": request["order_id"], "status": "success" });
            results
                .insert(NewOutboxMessage::json(PAYMENTS_EXCHANGE, PAYMENT_RESULT_KEY, &result)?)
                .await?;
            Ok::<(), MessagingError>(())
        }
    });
    let broker: Arc<dyn Broker> = Arc::new(broker.clone());
    let runtime = MessagingRuntime::start(
        broker,
        &fast_config(),
        &shop_topology(),
        Arc::new(outbox.clone()),
        Arc::new(inbox.clone()),
        Subscription {
            consumer: payment_request_consumer(10),
            handler: Arc::new(handler),
        },
        shutdown,
    )
    .await
    .unwrap();
    Side {
        runtime,
        outbox,
        inbox,
    }
}

/// Orders side: records the order ids of every result it drains.
async fn orders_side(
    broker: &MemoryBroker,
    shutdown: &CancellationToken,
) -> (Side, Arc<Mutex<Vec<String>>>) {
    let outbox = MemoryOutboxStore::new();
    let inbox = MemoryInboxStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let handler = inbound_fn(move |record: InboxRecord| {
        let log = Arc::clone(&log);
        async move {
            let result: Value = record.decode()?;
            log.lock()
                .unwrap()
                .push(result["order_id"].as_str().unwrap_or_default().to_owned());
            Ok::<(), MessagingError>(())
        }
    });
    let broker: Arc<dyn Broker> = Arc::new(broker.clone());
    let runtime = MessagingRuntime::start(
        broker,
        &fast_config(),
        &shop_topology(),
        Arc::new(outbox.clone()),
        Arc::new(inbox.clone()),
        Subscription {
            consumer: payment_result_consumer(10),
            handler: Arc::new(handler),
        },
        shutdown,
    )
    .await
    .unwrap();
    (
        Side {
            runtime,
            outbox,
            inbox,
        },
        seen,
    )
}

async fn submit_request(side: &Side, order_id: &str, message_id: &str) {
    side.outbox
        .insert(
            NewOutboxMessage::json(
                ORDERS_EXCHANGE,
                PAYMENT_REQUEST_KEY,
                &json!({ "order_id": order_id }),
            )
            .unwrap()
            .with_message_id(message_id),
        )
        .await
        .unwrap();
}

// ── Round trip ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_carry_request_and_result_between_services() {
    let broker = MemoryBroker::new();
    let shutdown = CancellationToken::new();
    let payments = payments_side(&broker, &shutdown).await;
    let (orders, seen) = orders_side(&broker, &shutdown).await;

    submit_request(&orders, "o1", "m1").await;

    eventually(Duration::from_secs(5), || {
        let seen = Arc::clone(&seen);
        async move { *seen.lock().unwrap() == vec!["o1".to_owned()] }
    })
    .await;
    let request = orders.outbox.find_by_message_id("m1").await.unwrap().unwrap();
    assert_eq!(request.status, OutboxStatus::Sent);
    let (orders_inbox, payments_inbox, results) = (
        orders.inbox.clone(),
        payments.inbox.clone(),
        payments.outbox.clone(),
    );
    eventually(Duration::from_secs(1), || {
        let settled = orders_inbox.records().iter().all(|r| r.processed)
            && payments_inbox.records().iter().all(|r| r.processed)
            && results.records().iter().all(|r| r.status == OutboxStatus::Sent);
        async move { settled }
    })
    .await;
    assert_eq!(payments.inbox.records().len(), 1);
    assert_eq!(orders.inbox.records().len(), 1);

    orders.runtime.close().await.unwrap();
    payments.runtime.close().await.unwrap();
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_process_duplicate_request_once() {
    let broker = MemoryBroker::new();
    let shutdown = CancellationToken::new();
    let payments = payments_side(&broker, &shutdown).await;
    let (orders, seen) = orders_side(&broker, &shutdown).await;

    submit_request(&orders, "o1", "m1").await;
    eventually(Duration::from_secs(5), || {
        let seen = Arc::clone(&seen);
        async move { seen.lock().unwrap().len() == 1 }
    })
    .await;
    orders.outbox.readmit("m1").await.unwrap();
    let record = orders.outbox.find_by_message_id("m1").await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Sent, "sent rows are never readmitted");

    payments
        .runtime
        .inbox()
        .save("m1", "payments.payment_requests", br#"{"order_id":"o1"}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(payments.inbox.records().len(), 1);
    assert_eq!(payments.outbox.records().len(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);

    shutdown.cancel();
    orders.runtime.close().await.unwrap();
    payments.runtime.close().await.unwrap();
}

#[tokio::test]
async fn should_report_readiness_from_the_supervisor() {
    let broker = MemoryBroker::new();
    let shutdown = CancellationToken::new();
    let payments = payments_side(&broker, &shutdown).await;

    assert!(payments.runtime.is_ready().await);
    let registry = payments.runtime.registry();
    payments.runtime.close().await.unwrap();

    assert!(!registry.supervisor().is_connected().await);
}

#[tokio::test]
async fn should_fail_to_start_when_broker_unreachable() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let shutdown = CancellationToken::new();

    let result = MessagingRuntime::start(
        Arc::new(broker.clone()),
        &fast_config(),
        &shop_topology(),
        Arc::new(MemoryOutboxStore::new()),
        Arc::new(MemoryInboxStore::new()),
        Subscription {
            consumer: payment_request_consumer(1),
            handler: Arc::new(inbound_fn(|_record: InboxRecord| async {
                Ok::<(), MessagingError>(())
            })),
        },
        &shutdown,
    )
    .await;

    assert!(result.is_err());
}
