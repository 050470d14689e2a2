//! Executor replies, per-operation results, and the per-job verdict.

use serde::{Deserialize, Serialize};

use crate::operation::{OperationKind, OperationSpec};

// ---------------------------------------------------------------------------
// DispatchStatus
// ---------------------------------------------------------------------------

/// Status reported by the executor for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Completed,
    Failed,
    Unknown,
}

impl DispatchStatus {
    /// Parse the executor's `status` string. Unrecognized values map to
    /// `Unknown`.
    pub fn from_reply(status: Option<&str>) -> Self {
        match status {
            Some("COMPLETED") => Self::Completed,
            Some("FAILED") | Some("ERROR") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Completed
    }
}

// ---------------------------------------------------------------------------
// DispatchResponse
// ---------------------------------------------------------------------------

/// Decoded executor reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: DispatchStatus,
    /// Full reply body, kept opaque.
    pub payload: serde_json::Value,
    /// Error text reported by the executor, if any.
    pub error: Option<String>,
}

impl DispatchResponse {
    /// Decode a reply body.
    ///
    /// The body must be a JSON object. `error` is read from the `error` key,
    /// or from `message` when the status is not `COMPLETED`.
    pub fn from_reply(body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: serde_json::Value = serde_json::from_slice(body)?;
        if !payload.is_object() {
            return Err(serde::de::Error::custom("reply body is not a JSON object"));
        }

        let status = DispatchStatus::from_reply(payload.get("status").and_then(|s| s.as_str()));
        let error = payload
            .get("error")
            .and_then(|e| e.as_str())
            .or_else(|| {
                if status.is_success() {
                    None
                } else {
                    payload.get("message").and_then(|m| m.as_str())
                }
            })
            .map(str::to_string);

        Ok(Self {
            status,
            payload,
            error,
        })
    }
}

// ---------------------------------------------------------------------------
// OperationResult
// ---------------------------------------------------------------------------

/// Outcome of one operation, in the shape written to the results artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub index: usize,
    pub op_id: String,
    #[serde(rename = "tipo")]
    pub kind: OperationKind,
    pub status: DispatchStatus,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl OperationResult {
    /// Result for an operation the executor answered.
    pub fn answered(op: &OperationSpec, response: DispatchResponse) -> Self {
        Self {
            index: op.index,
            op_id: op.op_id.clone(),
            kind: op.kind,
            status: response.status,
            response: Some(response.payload),
            error: response.error,
        }
    }

    /// Result for an operation whose call raised an error.
    pub fn errored(op: &OperationSpec, error: impl Into<String>) -> Self {
        Self {
            index: op.index,
            op_id: op.op_id.clone(),
            kind: op.kind,
            status: DispatchStatus::Failed,
            response: None,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }
}

// ---------------------------------------------------------------------------
// JobStatus / JobResult
// ---------------------------------------------------------------------------

/// Overall verdict for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
    Partial,
}

impl JobStatus {
    /// `Completed` when nothing failed, `Failed` when nothing succeeded,
    /// `Partial` otherwise. A job with no operations is `Completed`.
    pub fn classify(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Completed
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Partial => "PARTIAL",
        }
    }
}

/// Aggregated outcome of every operation in a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub overall_status: JobStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Per-operation results in dispatch order.
    pub results: Vec<OperationResult>,
}

impl JobResult {
    /// Count and classify a list of results.
    pub fn from_results(results: Vec<OperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let failed = results.len() - succeeded;
        Self {
            overall_status: JobStatus::classify(succeeded, failed),
            total: results.len(),
            succeeded,
            failed,
            results,
        }
    }

    /// Verdict for a job that could not be attempted at all: every
    /// operation is marked failed with the same error.
    pub fn failed_without_attempts(operations: &[OperationSpec], error: &str) -> Self {
        Self::from_results(
            operations
                .iter()
                .map(|op| OperationResult::errored(op, error))
                .collect(),
        )
    }

    /// Verdict for a job rejected before any operation could be typed.
    /// Every one of the `total` operations counts as failed; there are no
    /// per-operation entries. Only a job with at least one operation can be
    /// rejected this way.
    pub fn rejected(total: usize) -> Self {
        debug_assert!(total > 0, "a rejected job has at least one operation");
        Self {
            overall_status: JobStatus::Failed,
            total,
            succeeded: 0,
            failed: total,
            results: Vec::new(),
        }
    }

    /// Results that did not succeed, in dispatch order.
    pub fn failures(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }
}
