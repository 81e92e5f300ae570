use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shopflow_messaging::consumer::{Consumer, DeliveryHandler, handler_fn};
use shopflow_messaging::envelope::Envelope;
use shopflow_messaging::error::MessagingError;
use shopflow_messaging::topology::{
    PAYMENT_REQUESTS_QUEUE, payment_request_consumer, payment_request_publisher,
};

use crate::helpers::{Harness, eventually, recording_handler};

fn consumer(
    harness: &Harness,
    handler: Arc<dyn DeliveryHandler>,
    shutdown: &CancellationToken,
) -> Arc<Consumer> {
    Arc::new(
        Consumer::new(
            harness.registry.channels(),
            payment_request_consumer(10),
            handler,
            shutdown,
        )
        .with_retry_delay(Duration::from_millis(50)),
    )
}

async fn publish_request(harness: &Harness, message_id: &str) {
    harness
        .registry
        .get_or_create_publisher("requests", payment_request_publisher())
        .publish_with_id(message_id, br#"{"order_id":"o1"}"#.to_vec(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn should_ack_deliveries_the_handler_accepts() {
    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let (handler, seen) = recording_handler(false);
    let consumer = consumer(&harness, handler, &shutdown);
    let task = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.start().await }
    });

    publish_request(&harness, "m1").await;
    publish_request(&harness, "m2").await;

    eventually(Duration::from_secs(2), || async { seen.lock().unwrap().len() == 2 }).await;
    eventually(Duration::from_secs(2), || async {
        harness.broker.unacked_count(PAYMENT_REQUESTS_QUEUE) == 0
    })
    .await;
    assert_eq!(harness.broker.queue_depth(PAYMENT_REQUESTS_QUEUE), 0);
    assert_eq!(*seen.lock().unwrap(), vec!["m1".to_owned(), "m2".to_owned()]);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn should_requeue_failing_delivery_indefinitely() {
    const REDELIVERIES: usize = 5;

    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let (handler, seen) = recording_handler(true);
    let consumer = consumer(&harness, handler, &shutdown);
    let task = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.start().await }
    });

    publish_request(&harness, "m1").await;

    eventually(Duration::from_secs(2), || async {
        seen.lock().unwrap().len() > REDELIVERIES
    })
    .await;
    consumer.stop();
    task.await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert!(seen.len() >= REDELIVERIES + 1);
    assert!(seen.iter().all(|id| id == "m1"));
    assert_eq!(
        harness.broker.queue_depth(PAYMENT_REQUESTS_QUEUE)
            + harness.broker.unacked_count(PAYMENT_REQUESTS_QUEUE),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn should_requeue_delivery_when_handler_times_out() {
    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&calls);
    let handler = handler_fn(move |_envelope: Envelope| {
        let counter = Arc::clone(&counter);
        async move {
            let call = {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call == 1 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok::<(), MessagingError>(())
        }
    });
    let consumer = Arc::new(
        Consumer::new(
            harness.registry.channels(),
            payment_request_consumer(1),
            Arc::new(handler),
            &shutdown,
        )
        .with_handler_timeout(Duration::from_secs(1)),
    );
    let task = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.start().await }
    });

    publish_request(&harness, "m1").await;

    eventually(Duration::from_secs(10), || async { *calls.lock().unwrap() == 2 }).await;
    eventually(Duration::from_secs(10), || async {
        harness.broker.unacked_count(PAYMENT_REQUESTS_QUEUE) == 0
    })
    .await;
    assert_eq!(harness.broker.queue_depth(PAYMENT_REQUESTS_QUEUE), 0);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn should_resume_consuming_after_broker_outage() {
    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let (handler, seen) = recording_handler(false);
    let consumer = consumer(&harness, handler, &shutdown);
    let task = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.start().await }
    });

    publish_request(&harness, "m1").await;
    eventually(Duration::from_secs(1), || async { seen.lock().unwrap().len() == 1 }).await;

    harness.broker.sever_connections();
    eventually(Duration::from_secs(5), || async { harness.supervisor.is_connected().await }).await;

    publish_request(&harness, "m2").await;
    eventually(Duration::from_secs(5), || async { seen.lock().unwrap().len() == 2 }).await;
    assert_eq!(seen.lock().unwrap()[1], "m2");

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn should_exit_when_shutdown_is_cancelled() {
    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let (handler, _seen) = recording_handler(false);
    let consumer = consumer(&harness, handler, &shutdown);
    let task = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.start().await }
    });

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("consumer should stop")
        .unwrap();
    assert!(consumer.is_stopped());
}

#[tokio::test]
async fn should_stop_one_consumer_without_touching_the_shared_token() {
    let harness = Harness::connected().await;
    let shutdown = CancellationToken::new();
    let (handler, _seen) = recording_handler(false);
    let consumer = consumer(&harness, handler, &shutdown);

    consumer.stop();
    consumer.start().await;

    assert!(consumer.is_stopped());
    assert!(!shutdown.is_cancelled());
}
