//! File-backed job store.
//!
//! Jobs arrive as JSON files in a pending directory and leave it by a
//! single rename into exactly one terminal directory (processed, failed or
//! partial), next to a `_results.json` companion describing the outcome.

pub mod error;
pub mod layout;
pub mod results;
pub mod store;

pub use error::StoreError;
pub use layout::{JobAreas, TerminalArea};
pub use results::ResultsArtifact;
pub use store::{locate, JobStore, PendingJobs, JOB_SUFFIX};
