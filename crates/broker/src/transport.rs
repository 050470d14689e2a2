//! Transport abstraction over the broker connection.
//!
//! The dispatch client depends only on [`Transport`]; the live AMQP
//! implementation and the test double are interchangeable behind it.

use async_trait::async_trait;

use crate::messages::Envelope;

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The AMQP client library reported a failure.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// A call was made before the topology was set up.
    #[error("Transport is not connected")]
    NotConnected,

    /// The broker negatively acknowledged a publish.
    #[error("Broker rejected publish of {0}")]
    PublishRejected(String),

    /// The reply consumer stopped while a call was outstanding.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failure injected by a test double.
    #[error("{0}")]
    Simulated(String),
}

/// A request/reply channel to the executor.
///
/// At most one call is outstanding at a time; implementations may rely on
/// that when matching replies.
#[async_trait]
pub trait Transport: Send {
    /// Open a session and declare the exchange, task queues, bindings and
    /// the exclusive reply queue. Replaces any existing session. Every
    /// declaration is idempotent.
    async fn connect_topology(&mut self) -> Result<(), TransportError>;

    /// Publish `envelope` and wait for the reply carrying the same
    /// correlation id. Returns the raw reply body.
    ///
    /// Has no deadline of its own; the caller bounds the wait. Dropping
    /// the future abandons the call and any late reply is discarded.
    async fn call(&mut self, envelope: &Envelope) -> Result<Vec<u8>, TransportError>;

    /// Release the session. Safe to call repeatedly or when never
    /// connected.
    async fn close(&mut self);
}
