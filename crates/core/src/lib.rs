//! Domain model for the SICAL job-dispatch core.
//!
//! Job files, the operations decomposed from them, executor replies and the
//! per-job verdict. Nothing in this crate touches the broker or the
//! filesystem.

pub mod decompose;
pub mod error;
pub mod job;
pub mod operation;
pub mod outcome;
pub mod types;

pub use decompose::decompose;
pub use error::CoreError;
pub use job::{BankMovement, JobFile, OperationRecord};
pub use operation::{format_op_id, OperationKind, OperationSpec, TaskType, EXECUTOR_FIELDS};
pub use outcome::{DispatchResponse, DispatchStatus, JobResult, JobStatus, OperationResult};
