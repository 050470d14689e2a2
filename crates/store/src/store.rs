//! Pending-area scanning, loading, relocation, and results persistence.

use std::ffi::OsString;
use std::fs::ReadDir;
use std::path::{Path, PathBuf};

use sical_core::{JobFile, JobResult};

use crate::error::StoreError;
use crate::layout::{JobAreas, TerminalArea};
use crate::results::{results_file_name, ResultsArtifact};

/// Suffix a pending file must carry to be picked up.
pub const JOB_SUFFIX: &str = ".json";

/// Job store rooted at a set of [`JobAreas`].
#[derive(Debug, Clone)]
pub struct JobStore {
    areas: JobAreas,
}

impl JobStore {
    /// Open a store, creating any missing area.
    pub fn open(areas: JobAreas) -> Result<Self, StoreError> {
        areas.ensure()?;
        Ok(Self { areas })
    }

    pub fn areas(&self) -> &JobAreas {
        &self.areas
    }

    /// Lazily list pending job ids. Each call starts a fresh listing.
    pub fn scan(&self) -> Result<PendingJobs, StoreError> {
        let entries = std::fs::read_dir(&self.areas.pending)
            .map_err(|e| StoreError::io(&self.areas.pending, e))?;
        Ok(PendingJobs { entries })
    }

    /// Read and parse a pending job.
    pub fn load(&self, id: &str) -> Result<JobFile, StoreError> {
        let path = self.areas.pending.join(id);
        let bytes = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        JobFile::parse(id, &bytes).map_err(|source| StoreError::MalformedJob {
            id: id.to_string(),
            source,
        })
    }

    /// Move a job from pending into `area` with a single rename.
    ///
    /// Returns the new path.
    pub fn transition(&self, id: &str, area: TerminalArea) -> Result<PathBuf, StoreError> {
        let from = self.areas.pending.join(id);
        let to = self.areas.terminal(area).join(id);

        if to.exists() {
            tracing::warn!(
                job_id = %id,
                area = area.dir_name(),
                "Replacing an earlier job file with the same name",
            );
        }

        std::fs::rename(&from, &to).map_err(|e| StoreError::io(&from, e))?;
        tracing::debug!(job_id = %id, area = area.dir_name(), "Job relocated");
        Ok(to)
    }

    /// Write the results artifact for `id` into `area`.
    ///
    /// The artifact is written to a temporary name first and renamed into
    /// place, so readers never observe a half-written file.
    pub fn persist_results(
        &self,
        id: &str,
        area: TerminalArea,
        artifact: &ResultsArtifact,
    ) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_vec_pretty(artifact).map_err(|source| StoreError::Encode {
            id: id.to_string(),
            source,
        })?;

        let dir = self.areas.terminal(area);
        let target = dir.join(results_file_name(id));
        let staging = dir.join(format!(".{}.tmp", results_file_name(id)));

        std::fs::write(&staging, json).map_err(|e| StoreError::io(&staging, e))?;
        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(StoreError::io(&target, e));
        }
        Ok(target)
    }

    /// Build and persist the artifact for a finished job.
    pub fn persist_job_result(
        &self,
        id: &str,
        area: TerminalArea,
        result: &JobResult,
        error: Option<&str>,
    ) -> Result<PathBuf, StoreError> {
        let mut artifact = ResultsArtifact::new(id, result);
        if let Some(error) = error {
            artifact = artifact.with_error(error);
        }
        self.persist_results(id, area, &artifact)
    }

    /// Whether `id` is still waiting in the pending area.
    pub fn is_pending(&self, id: &str) -> bool {
        self.areas.pending.join(id).is_file()
    }
}

/// Lazy iterator over pending job ids.
///
/// Entries that cannot be read, are not regular files, or lack
/// [`JOB_SUFFIX`] are skipped.
pub struct PendingJobs {
    entries: ReadDir,
}

impl Iterator for PendingJobs {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable pending entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(id) = job_id(entry.file_name()) {
                return Some(id);
            }
        }
        None
    }
}

fn job_id(name: OsString) -> Option<String> {
    let name = name.into_string().ok()?;
    if name.ends_with(JOB_SUFFIX) && !name.starts_with('.') {
        Some(name)
    } else {
        None
    }
}

/// Where `id` currently lives, if anywhere.
pub fn locate(areas: &JobAreas, id: &str) -> Vec<PathBuf> {
    std::iter::once(areas.pending.as_path())
        .chain(TerminalArea::ALL.iter().map(|a| areas.terminal(*a)))
        .map(|dir: &Path| dir.join(id))
        .filter(|p| p.is_file())
        .collect()
}
