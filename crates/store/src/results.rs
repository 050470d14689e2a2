//! Results artifact written next to a relocated job.

use serde::{Deserialize, Serialize};
use sical_core::types::Timestamp;
use sical_core::{JobResult, JobStatus, OperationResult};

/// Contents of `<job>_results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsArtifact {
    pub task_file: String,
    pub processed_at: Timestamp,
    pub overall_status: JobStatus,
    pub total_operations: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub operation_results: Vec<OperationResult>,
    /// Job-level error when no operation could be attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultsArtifact {
    pub fn new(task_file: impl Into<String>, result: &JobResult) -> Self {
        Self {
            task_file: task_file.into(),
            processed_at: chrono::Utc::now(),
            overall_status: result.overall_status,
            total_operations: result.total,
            succeeded_count: result.succeeded,
            failed_count: result.failed,
            operation_results: result.results.clone(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// `mov.json` -> `mov_results.json`.
pub fn results_file_name(job_id: &str) -> String {
    match job_id.strip_suffix(crate::store::JOB_SUFFIX) {
        Some(stem) => format!("{stem}_results{}", crate::store::JOB_SUFFIX),
        None => format!("{job_id}_results{}", crate::store::JOB_SUFFIX),
    }
}
