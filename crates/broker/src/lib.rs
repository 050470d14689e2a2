//! Broker plumbing for the SICAL executor.
//!
//! Provides the [`Transport`](transport::Transport) abstraction with an
//! AMQP implementation, the request/reply wire messages, connect-time
//! backoff, and the [`DispatchClient`](client::DispatchClient) that turns one
//! operation into one synchronous remote call.

pub mod amqp;
pub mod client;
pub mod config;
pub mod messages;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod reconnect;
pub mod topology;
pub mod transport;

pub use amqp::AmqpTransport;
pub use client::{ClientState, DispatchClient, DispatchConfig, DispatchError};
pub use config::BrokerConfig;
pub use reconnect::RetryPolicy;
pub use transport::{Transport, TransportError};
