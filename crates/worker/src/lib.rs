//! SICAL dispatch worker.
//!
//! Turns job files in the pending area into one synchronous broker call per
//! operation and files each job under processed, partial or failed
//! according to how many of its operations succeeded.

pub mod aggregator;
pub mod config;
pub mod runner;

pub use aggregator::dispatch_all;
pub use config::{ConfigError, WorkerConfig};
pub use runner::{JobRunner, JobSummary};
