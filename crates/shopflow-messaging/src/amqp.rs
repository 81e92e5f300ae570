//! RabbitMQ transport built on `lapin`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::BoxFuture;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::oneshot;

use crate::broker::{
    Acker, Broker, BrokerChannel, BrokerConnection, ConsumeOptions, Delivery, DeliveryStream,
    PublishFlags,
};
use crate::envelope::{DeliveryMode, Envelope, ExchangeKind, Headers};
use crate::error::MessagingError;

const REPLY_SUCCESS: u16 = 200;

fn broker_err(err: lapin::Error) -> MessagingError {
    MessagingError::Broker(err.to_string())
}

fn publish_err(err: lapin::Error) -> MessagingError {
    MessagingError::PublishFailure(err.to_string())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpBroker;

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| MessagingError::ConnectFailure(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        connection.on_error(move |err| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(err.to_string());
            }
        });

        Ok(Arc::new(AmqpConnection {
            connection,
            disconnect: Mutex::new(Some(rx)),
        }))
    }
}

struct AmqpConnection {
    connection: Connection,
    disconnect: Mutex<Option<oneshot::Receiver<String>>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError> {
        let channel = self.connection.create_channel().await.map_err(broker_err)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(broker_err)?;
        Ok(Arc::new(AmqpChannel { channel }))
    }

    fn on_disconnect(&self) -> BoxFuture<'static, String> {
        let rx = self
            .disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Box::pin(async move {
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| "connection dropped".to_owned()),
                None => futures::future::pending().await,
            }
        })
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    async fn close(&self) -> Result<(), MessagingError> {
        if !self.is_open() {
            return Ok(());
        }
        self.connection
            .close(REPLY_SUCCESS, "shutting down")
            .await
            .map_err(broker_err)
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), MessagingError> {
        let kind = match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        };
        let options = ExchangeDeclareOptions {
            durable,
            ..Default::default()
        };
        self.channel
            .exchange_declare(name, kind, options, FieldTable::default())
            .await
            .map_err(broker_err)
    }

    async fn declare_queue(
        &self,
        name: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<(), MessagingError> {
        let options = QueueDeclareOptions {
            durable,
            auto_delete,
            ..Default::default()
        };
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(broker_err)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        flags: PublishFlags,
        envelope: Envelope,
    ) -> Result<(), MessagingError> {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(envelope.content_type))
            .with_delivery_mode(envelope.delivery_mode as u8)
            .with_timestamp(u64::try_from(envelope.timestamp.timestamp()).unwrap_or_default())
            .with_headers(to_field_table(&envelope.headers));
        if let Some(id) = envelope.message_id {
            properties = properties.with_message_id(ShortString::from(id));
        }

        let options = BasicPublishOptions {
            mandatory: flags.mandatory,
            immediate: flags.immediate,
        };
        let confirm = self
            .channel
            .basic_publish(exchange, routing_key, options, &envelope.body, properties)
            .await
            .map_err(publish_err)?;

        match confirm.await.map_err(publish_err)? {
            Confirmation::Nack(_) => Err(MessagingError::PublishFailure(
                "broker rejected the message".to_owned(),
            )),
            Confirmation::Ack(Some(_)) => Err(MessagingError::PublishFailure(format!(
                "unroutable message for '{exchange}' with key '{routing_key}'"
            ))),
            _ => Ok(()),
        }
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), MessagingError> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(broker_err)
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, MessagingError> {
        let consume_options = BasicConsumeOptions {
            no_ack: options.auto_ack,
            exclusive: options.exclusive,
            ..Default::default()
        };
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &options.consumer_tag,
                consume_options,
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)?;

        Ok(consumer
            .map(|item| item.map(into_delivery).map_err(broker_err))
            .boxed())
    }

    async fn close(&self) -> Result<(), MessagingError> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(broker_err)
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(broker_err)
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        let options = BasicNackOptions {
            requeue,
            multiple: false,
        };
        self.acker
            .nack(options)
            .await
            .map(|_| ())
            .map_err(broker_err)
    }
}

fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
    let properties = &delivery.properties;
    let envelope = Envelope {
        content_type: properties
            .content_type()
            .as_ref()
            .map(|ct| ct.as_str().to_owned())
            .unwrap_or_default(),
        body: delivery.data,
        message_id: properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_owned()),
        timestamp: properties
            .timestamp()
            .and_then(|ts| i64::try_from(ts).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now),
        delivery_mode: properties
            .delivery_mode()
            .map_or(DeliveryMode::Transient, DeliveryMode::from_amqp),
        headers: from_field_table(properties.headers().as_ref()),
    };
    Delivery::new(
        envelope,
        delivery.redelivered,
        Box::new(AmqpAcker {
            acker: delivery.acker,
        }),
    )
}

fn to_field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }
    table
}

fn from_field_table(table: Option<&FieldTable>) -> Headers {
    let Some(table) = table else {
        return Headers::new();
    };
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| header_value(value).map(|v| (key.as_str().to_owned(), v)))
        .collect()
}

fn header_value(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_owned()),
        AMQPValue::Boolean(b) => Some(b.to_string()),
        AMQPValue::LongInt(n) => Some(n.to_string()),
        AMQPValue::LongLongInt(n) => Some(n.to_string()),
        AMQPValue::LongUInt(n) => Some(n.to_string()),
        _ => None,
    }
}
