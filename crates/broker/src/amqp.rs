//! AMQP transport backed by [`lapin`].
//!
//! [`AmqpTransport`] owns one connection and one channel. Connecting
//! declares the task topology plus an exclusive, broker-named reply queue
//! and spawns a reader task that drains that queue. The reader hands a
//! reply to the single outstanding call when the correlation ids match and
//! drops everything else.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::messages::{Envelope, CONTENT_TYPE_JSON, DELIVERY_MODE_PERSISTENT};
use crate::topology::{task_topology, Declaration, TASK_EXCHANGE};
use crate::transport::{Transport, TransportError};

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

type ReplySender = oneshot::Sender<Result<Vec<u8>, TransportError>>;

/// The one call currently waiting for a reply.
struct PendingReply {
    correlation_id: String,
    tx: ReplySender,
}

type PendingSlot = Arc<Mutex<Option<PendingReply>>>;

/// Live transport talking to a RabbitMQ broker.
pub struct AmqpTransport {
    config: BrokerConfig,
    session: Option<Session>,
}

/// Everything that lives and dies with one broker connection.
struct Session {
    connection: Connection,
    channel: Channel,
    reply_queue: String,
    pending: PendingSlot,
    reader: JoinHandle<()>,
}

impl AmqpTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Name of the current reply queue, if connected.
    pub fn reply_queue(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.reply_queue.as_str())
    }

    async fn open_session(&self) -> Result<Session, TransportError> {
        let connection =
            Connection::connect(&self.config.amqp_uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        for decl in task_topology() {
            declare(&channel, &decl).await?;
        }

        let reply = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let reply_queue = reply.name().as_str().to_string();

        let consumer = channel
            .basic_consume(
                &reply_queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let pending: PendingSlot = Arc::new(Mutex::new(None));
        let reader = tokio::spawn(read_replies(consumer, Arc::clone(&pending)));

        tracing::info!(
            broker = %self.config.redacted_uri(),
            reply_queue = %reply_queue,
            "Connected to broker and declared topology",
        );

        Ok(Session {
            connection,
            channel,
            reply_queue,
            pending,
            reader,
        })
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn connect_topology(&mut self) -> Result<(), TransportError> {
        self.close().await;
        let session = self.open_session().await?;
        self.session = Some(session);
        Ok(())
    }

    async fn call(&mut self, envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;

        let (tx, rx) = oneshot::channel();
        let _guard = PendingGuard::register(&session.pending, &envelope.correlation_id, tx);

        let properties = BasicProperties::default()
            .with_correlation_id(envelope.correlation_id.clone().into())
            .with_reply_to(session.reply_queue.clone().into())
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type(CONTENT_TYPE_JSON.into());

        let confirmation = session
            .channel
            .basic_publish(
                TASK_EXCHANGE,
                &envelope.routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(TransportError::PublishRejected(
                envelope.correlation_id.clone(),
            ));
        }

        tracing::debug!(
            correlation_id = %envelope.correlation_id,
            routing_key = %envelope.routing_key,
            "Request published, awaiting reply",
        );

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(TransportError::ConnectionLost(
                "reply consumer stopped".into(),
            )),
        }
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.reader.abort();
        if let Err(e) = session.channel.close(REPLY_SUCCESS, "OK").await {
            tracing::debug!(error = %e, "Channel close failed");
        }
        if let Err(e) = session.connection.close(REPLY_SUCCESS, "OK").await {
            tracing::debug!(error = %e, "Connection close failed");
        }
        tracing::info!("Broker connection closed");
    }
}

/// Apply one topology declaration on `channel`.
async fn declare(channel: &Channel, decl: &Declaration) -> Result<(), lapin::Error> {
    match decl {
        Declaration::Exchange { name } => {
            channel
                .exchange_declare(
                    name,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
        }
        Declaration::Queue { name } => channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ()),
        Declaration::Binding {
            queue,
            exchange,
            routing_key,
        } => {
            channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
        }
    }
}

/// Drain the reply queue until the consumer stops.
async fn read_replies(mut consumer: Consumer, pending: PendingSlot) {
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let correlation_id = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string());
                deliver(&pending, correlation_id.as_deref(), delivery.data);
            }
            Err(e) => {
                tracing::error!(error = %e, "Reply consumer error");
                fail_pending(&pending, format!("reply consumer error: {e}"));
                return;
            }
        }
    }

    tracing::warn!("Reply consumer stream ended");
    fail_pending(&pending, "reply consumer stream ended".into());
}

/// Hand `body` to the outstanding call if the correlation id matches.
fn deliver(pending: &PendingSlot, correlation_id: Option<&str>, body: Vec<u8>) {
    let mut slot = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let matches = matches!(
        (slot.as_ref(), correlation_id),
        (Some(p), Some(id)) if p.correlation_id == id
    );

    if matches {
        if let Some(p) = slot.take() {
            // The receiver is gone if the caller already gave up.
            let _ = p.tx.send(Ok(body));
        }
    } else {
        tracing::debug!(
            correlation_id = correlation_id.unwrap_or("<none>"),
            "Dropping uncorrelated reply",
        );
    }
}

fn fail_pending(pending: &PendingSlot, reason: String) {
    let taken = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(p) = taken {
        let _ = p.tx.send(Err(TransportError::ConnectionLost(reason)));
    }
}

/// Registers a call in the pending slot and clears it again when the call
/// finishes or is abandoned.
struct PendingGuard<'a> {
    slot: &'a PendingSlot,
}

impl<'a> PendingGuard<'a> {
    fn register(slot: &'a PendingSlot, correlation_id: &str, tx: ReplySender) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(PendingReply {
            correlation_id: correlation_id.to_string(),
            tx,
        });
        Self { slot }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_with(correlation_id: &str) -> (PendingSlot, oneshot::Receiver<Result<Vec<u8>, TransportError>>) {
        let slot: PendingSlot = Arc::new(Mutex::new(None));
        let (tx, rx) = oneshot::channel();
        *slot.lock().unwrap() = Some(PendingReply {
            correlation_id: correlation_id.into(),
            tx,
        });
        (slot, rx)
    }

    #[tokio::test]
    async fn matching_reply_is_delivered() {
        let (slot, rx) = slot_with("abc");
        deliver(&slot, Some("abc"), b"{}".to_vec());
        assert_eq!(rx.await.unwrap().unwrap(), b"{}".to_vec());
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_reply_is_dropped() {
        let (slot, mut rx) = slot_with("abc");
        deliver(&slot, Some("stale"), b"{}".to_vec());
        deliver(&slot, None, b"{}".to_vec());
        assert!(rx.try_recv().is_err());
        assert!(slot.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn consumer_failure_fails_outstanding_call() {
        let (slot, rx) = slot_with("abc");
        fail_pending(&slot, "gone".into());
        assert!(matches!(
            rx.await.unwrap(),
            Err(TransportError::ConnectionLost(reason)) if reason == "gone"
        ));
    }

    #[test]
    fn guard_clears_slot_on_drop() {
        let slot: PendingSlot = Arc::new(Mutex::new(None));
        let (tx, _rx) = oneshot::channel();
        {
            let _guard = PendingGuard::register(&slot, "abc", tx);
            assert!(slot.lock().unwrap().is_some());
        }
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn reply_after_abandoned_call_is_dropped() {
        let slot: PendingSlot = Arc::new(Mutex::new(None));
        let (tx, rx) = oneshot::channel();
        drop(PendingGuard::register(&slot, "abc", tx));
        drop(rx);
        deliver(&slot, Some("abc"), b"late".to_vec());
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn close_without_session_is_a_no_op() {
        let mut transport = AmqpTransport::new(BrokerConfig::default());
        transport.close().await;
        transport.close().await;
        assert!(transport.reply_queue().is_none());
    }

    #[tokio::test]
    async fn call_without_session_is_rejected() {
        let mut transport = AmqpTransport::new(BrokerConfig::default());
        let envelope = Envelope {
            routing_key: "task.arqueo".into(),
            correlation_id: "c".into(),
            body: Vec::new(),
        };
        assert!(matches!(
            transport.call(&envelope).await,
            Err(TransportError::NotConnected)
        ));
    }
}
