use std::sync::Arc;
use std::time::Duration;

use shopflow_messaging::connection::{ChannelProvider, ConnectionState, ConnectionSupervisor};
use shopflow_messaging::error::MessagingError;
use shopflow_messaging::memory::MemoryBroker;
use shopflow_messaging::topology::payment_request_publisher;

use crate::helpers::{Harness, RECONNECT_DELAY, SlowBroker, connection_config, supervisor};

#[tokio::test]
async fn should_hand_out_channel_once_connected() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 3);

    supervisor.connect().await.unwrap();

    assert_eq!(supervisor.state().await, ConnectionState::Connected);
    assert!(supervisor.is_connected().await);
    assert!(supervisor.channel().await.is_ok());
    assert_eq!(broker.connection_count(), 1);
}

#[tokio::test]
async fn should_report_not_connected_before_connect() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 3);

    let result = supervisor.channel().await;
    assert!(matches!(result, Err(MessagingError::NotConnected)));
    assert_eq!(supervisor.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn should_fail_connect_when_broker_unreachable() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let supervisor = supervisor(&broker, 3);

    let result = supervisor.connect().await;
    assert!(
        matches!(result, Err(MessagingError::ConnectFailure(_))),
        "expected ConnectFailure, got {result:?}"
    );
}

#[tokio::test]
async fn should_close_idempotently_and_refuse_reconnect() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 3);
    supervisor.connect().await.unwrap();

    supervisor.close().await.unwrap();
    supervisor.close().await.unwrap();

    assert_eq!(supervisor.state().await, ConnectionState::ShuttingDown);
    assert_eq!(broker.open_connections(), 0);
    assert!(matches!(
        supervisor.channel().await,
        Err(MessagingError::NotConnected)
    ));
    assert!(matches!(
        supervisor.connect().await,
        Err(MessagingError::ShuttingDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn should_reconnect_within_delay_after_connection_loss() {
    let harness = Harness::connected().await;

    harness.broker.sever_connections();
    tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(1)).await;

    assert_eq!(harness.supervisor.state().await, ConnectionState::Connected);
    assert_eq!(harness.supervisor.reconnect_count().await, 0);
    assert_eq!(harness.broker.connection_count(), 2);

    let publisher = harness
        .registry
        .get_or_create_publisher("requests", payment_request_publisher());
    publisher
        .publish(&serde_json::json!({"order_id": "o1"}))
        .await
        .unwrap();
    assert_eq!(harness.broker.queue_depth("payments.payment_requests"), 1);
}

#[tokio::test(start_paused = true)]
async fn should_keep_retrying_while_budget_remains() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 5);
    supervisor.connect().await.unwrap();

    broker.set_reachable(false);
    broker.sever_connections();
    tokio::time::sleep(RECONNECT_DELAY * 2 + Duration::from_millis(1)).await;
    assert_eq!(supervisor.state().await, ConnectionState::Disconnected);
    assert_eq!(supervisor.reconnect_count().await, 3);

    broker.set_reachable(true);
    tokio::time::sleep(RECONNECT_DELAY).await;
    assert_eq!(supervisor.state().await, ConnectionState::Connected);
    assert_eq!(supervisor.reconnect_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn should_give_up_once_reconnect_budget_is_exhausted() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 2);
    supervisor.connect().await.unwrap();

    broker.set_reachable(false);
    broker.sever_connections();
    tokio::time::sleep(RECONNECT_DELAY * 5).await;

    assert_eq!(supervisor.state().await, ConnectionState::Disconnected);
    assert_eq!(supervisor.reconnect_count().await, 2);

    broker.set_reachable(true);
    tokio::time::sleep(RECONNECT_DELAY * 5).await;
    assert_eq!(supervisor.state().await, ConnectionState::Disconnected);
    assert_eq!(broker.connection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn should_not_reconnect_after_close() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 3);
    supervisor.connect().await.unwrap();

    supervisor.close().await.unwrap();
    tokio::time::sleep(RECONNECT_DELAY * 3).await;

    assert_eq!(broker.connection_count(), 1);
    assert_eq!(supervisor.state().await, ConnectionState::ShuttingDown);
}

#[tokio::test(start_paused = true)]
async fn should_answer_not_connected_while_handshake_is_in_progress() {
    let broker = MemoryBroker::new();
    let slow = SlowBroker {
        inner: broker.clone(),
        delay: Duration::from_secs(30),
    };
    let supervisor = ConnectionSupervisor::new(Arc::new(slow), connection_config(3));
    let connecting = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.connect().await }
    });
    tokio::task::yield_now().await;

    let channel = tokio::time::timeout(Duration::from_millis(100), supervisor.channel())
        .await
        .expect("channel() must not wait for the handshake");
    assert!(matches!(channel, Err(MessagingError::NotConnected)));
    let ready = tokio::time::timeout(Duration::from_millis(100), supervisor.is_connected())
        .await
        .expect("is_connected() must not wait for the handshake");
    assert!(!ready);

    connecting.await.unwrap().unwrap();
    assert!(supervisor.channel().await.is_ok());
    assert_eq!(broker.open_connections(), 1);
}

#[tokio::test]
async fn should_release_replaced_connection_on_second_connect() {
    let broker = MemoryBroker::new();
    let supervisor = supervisor(&broker, 3);

    supervisor.connect().await.unwrap();
    supervisor.connect().await.unwrap();

    assert_eq!(broker.connection_count(), 2);
    assert_eq!(broker.open_connections(), 1);
    assert_eq!(supervisor.state().await, ConnectionState::Connected);

    supervisor.close().await.unwrap();
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn should_discard_connection_finished_after_close() {
    let broker = MemoryBroker::new();
    let slow = SlowBroker {
        inner: broker.clone(),
        delay: Duration::from_secs(1),
    };
    let supervisor = ConnectionSupervisor::new(Arc::new(slow), connection_config(3));
    let connecting = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.connect().await }
    });
    tokio::task::yield_now().await;

    supervisor.close().await.unwrap();
    let result = connecting.await.unwrap();

    assert!(matches!(result, Err(MessagingError::ShuttingDown)));
    assert_eq!(broker.open_connections(), 0);
}
