//! Wire messages exchanged with the executor.
//!
//! Requests are JSON bodies published with AMQP properties carrying the
//! correlation id and reply-to address. Replies are JSON objects with at
//! least a `status` field; decoding them lives in
//! [`sical_core::DispatchResponse::from_reply`].

use serde::{Deserialize, Serialize};
use sical_core::{OperationSpec, TaskType};

/// Content type set on every published request.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// AMQP persistent delivery mode.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Execution hints passed through to the executor.
///
/// `retry_count` is metadata only; the dispatch client never re-sends a
/// request on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParameters {
    pub priority: String,
    pub retry_count: u32,
}

impl Default for TaskParameters {
    fn default() -> Self {
        Self {
            priority: "normal".into(),
            retry_count: 3,
        }
    }
}

/// Operation body nested inside a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationData {
    pub operation: serde_json::Value,
    pub parameters: TaskParameters,
}

/// Request body published for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub operation_data: OperationData,
    pub parameters: TaskParameters,
    /// Same value as the AMQP correlation id.
    pub task_id: String,
    pub task_type: TaskType,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl DispatchRequest {
    pub fn new(op: &OperationSpec, correlation_id: String, parameters: TaskParameters) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        Self {
            operation_data: OperationData {
                operation: op.payload(),
                parameters: parameters.clone(),
            },
            parameters,
            task_id: correlation_id,
            task_type: op.task_type(),
            timestamp,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.task_id
    }

    /// Serialize into a publishable envelope routed by task type.
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            routing_key: self.task_type.routing_key(),
            correlation_id: self.task_id.clone(),
            body: serde_json::to_vec(self)?,
        })
    }
}

/// A serialized request plus the routing metadata a transport needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub routing_key: String,
    pub correlation_id: String,
    pub body: Vec<u8>,
}
