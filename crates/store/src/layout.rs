//! Directory layout of the job areas.

use std::path::{Path, PathBuf};

use sical_core::JobStatus;

use crate::error::StoreError;

pub const PENDING_DIR: &str = "pending_files";
pub const PROCESSED_DIR: &str = "processed_files";
pub const FAILED_DIR: &str = "failed";
pub const PARTIAL_DIR: &str = "partial";

/// Where a job ends up once it leaves the pending area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalArea {
    Processed,
    Failed,
    Partial,
}

impl TerminalArea {
    pub const ALL: [TerminalArea; 3] = [Self::Processed, Self::Failed, Self::Partial];

    /// Area matching a job verdict.
    pub fn for_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Completed => Self::Processed,
            JobStatus::Failed => Self::Failed,
            JobStatus::Partial => Self::Partial,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Processed => PROCESSED_DIR,
            Self::Failed => FAILED_DIR,
            Self::Partial => PARTIAL_DIR,
        }
    }
}

/// The four job directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAreas {
    pub pending: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
    pub partial: PathBuf,
}

impl JobAreas {
    /// Standard layout under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            pending: root.join(PENDING_DIR),
            processed: root.join(PROCESSED_DIR),
            failed: root.join(FAILED_DIR),
            partial: root.join(PARTIAL_DIR),
        }
    }

    pub fn terminal(&self, area: TerminalArea) -> &Path {
        match area {
            TerminalArea::Processed => &self.processed,
            TerminalArea::Failed => &self.failed,
            TerminalArea::Partial => &self.partial,
        }
    }

    /// Create every area that does not exist yet.
    pub fn ensure(&self) -> Result<(), StoreError> {
        for dir in [&self.pending, &self.processed, &self.failed, &self.partial] {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        tracing::debug!(pending = %self.pending.display(), "Job areas ensured");
        Ok(())
    }
}
