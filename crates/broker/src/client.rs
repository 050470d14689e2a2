//! Synchronous request/reply dispatch over an asynchronous transport.
//!
//! [`DispatchClient`] performs exactly one remote call per operation:
//! publish, then wait for the correlated reply or the deadline, whichever
//! comes first. Connecting is retried with backoff. A transport failure
//! resets the session and is still reported to the caller; the call itself
//! is never silently re-sent.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Ready -> AwaitingReply -> Ready
//!       ^                                     |
//!       +------------ transport error --------+
//! ```

use std::time::Duration;

use sical_core::{DispatchResponse, OperationSpec};

use crate::messages::{DispatchRequest, TaskParameters};
use crate::reconnect::RetryPolicy;
use crate::transport::{Transport, TransportError};

/// Production deadline for an executor reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(75);

/// Settings for a [`DispatchClient`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long to wait for a correlated reply.
    pub reply_timeout: Duration,
    /// Connect-time retry policy.
    pub retry: RetryPolicy,
    /// Parameters attached to every request.
    pub parameters: TaskParameters,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            retry: RetryPolicy::default(),
            parameters: TaskParameters::default(),
        }
    }
}

/// Connection state of a [`DispatchClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting { attempt: u32 },
    Ready,
    AwaitingReply,
}

/// Errors from a single dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The broker could not be reached within the retry budget.
    #[error("Could not connect to broker after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// No correlated reply arrived before the deadline.
    #[error("No reply for {op_id} within {}s", .timeout.as_secs_f64())]
    Timeout { op_id: String, timeout: Duration },

    /// The transport failed mid-call. The session has been reset.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request body could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The reply body was not a JSON object.
    #[error("Invalid reply for {op_id}: {source}")]
    InvalidReply {
        op_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One-call-at-a-time dispatcher that owns its transport.
pub struct DispatchClient<T: Transport> {
    transport: T,
    config: DispatchConfig,
    state: ClientState,
}

impl<T: Transport> DispatchClient<T> {
    /// Wrap a transport. Nothing is connected until the first
    /// [`connect`](Self::connect) or [`send`](Self::send).
    pub fn new(transport: T, config: DispatchConfig) -> Self {
        Self {
            transport,
            config,
            state: ClientState::Disconnected,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Establish the session and topology, retrying with backoff.
    ///
    /// A no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), DispatchError> {
        if self.state != ClientState::Disconnected {
            return Ok(());
        }

        let mut backoff = self.config.retry.backoff();
        loop {
            let attempt = backoff.attempt();
            self.state = ClientState::Connecting { attempt };

            match self.transport.connect_topology().await {
                Ok(()) => {
                    self.state = ClientState::Ready;
                    tracing::info!(attempt, "Dispatch client ready");
                    return Ok(());
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Broker connect attempt {attempt} failed, retrying",
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.state = ClientState::Disconnected;
                        tracing::error!(
                            attempts = attempt,
                            error = %e,
                            "Giving up on broker connection",
                        );
                        return Err(DispatchError::Connection {
                            attempts: attempt,
                            source: e,
                        });
                    }
                },
            }
        }
    }

    /// Dispatch one operation and wait for its reply.
    pub async fn send(&mut self, op: &OperationSpec) -> Result<DispatchResponse, DispatchError> {
        self.connect().await?;

        let correlation_id = uuid::Uuid::new_v4().to_string();
        let request = DispatchRequest::new(op, correlation_id, self.config.parameters.clone());
        let envelope = request.to_envelope().map_err(DispatchError::Encode)?;

        tracing::debug!(
            op_id = %op.op_id,
            correlation_id = %envelope.correlation_id,
            routing_key = %envelope.routing_key,
            "Dispatching operation",
        );

        self.state = ClientState::AwaitingReply;
        let timeout = self.config.reply_timeout;
        let outcome = tokio::time::timeout(timeout, self.transport.call(&envelope)).await;

        match outcome {
            Err(_elapsed) => {
                self.state = ClientState::Ready;
                tracing::warn!(
                    op_id = %op.op_id,
                    correlation_id = %envelope.correlation_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Reply deadline elapsed",
                );
                Err(DispatchError::Timeout {
                    op_id: op.op_id.clone(),
                    timeout,
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(op_id = %op.op_id, error = %e, "Transport failed mid-call");
                self.reset_session().await;
                Err(DispatchError::Transport(e))
            }
            Ok(Ok(body)) => {
                self.state = ClientState::Ready;
                DispatchResponse::from_reply(&body).map_err(|source| DispatchError::InvalidReply {
                    op_id: op.op_id.clone(),
                    source,
                })
            }
        }
    }

    /// Release the connection. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ClientState::Disconnected {
            return;
        }
        self.transport.close().await;
        self.state = ClientState::Disconnected;
    }

    /// Tear the session down and build a fresh one. A failed reconnect
    /// leaves the client disconnected; the next call tries again.
    async fn reset_session(&mut self) {
        self.transport.close().await;
        self.state = ClientState::Disconnected;
        if let Err(e) = self.connect().await {
            tracing::warn!(error = %e, "Session reset failed, will reconnect on next call");
        }
    }
}
