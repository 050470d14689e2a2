//! Job runner: drives pending jobs through decomposition, dispatch and
//! relocation.
//!
//! Each pass takes a snapshot of the pending area and handles its jobs one
//! at a time:
//!
//! ```text
//! load -> decompose -> dispatch_all -> persist results -> transition
//! ```
//!
//! A job leaves the pending area through exactly one rename, after its
//! results artifact has been written. A single dispatch client is created
//! on first use within a pass, shared by every job in that pass, and closed
//! when the pass ends.

use std::io;
use std::time::Duration;

use sical_broker::{DispatchClient, DispatchConfig, Transport};
use sical_core::{decompose, JobFile, JobResult, JobStatus};
use sical_store::{JobStore, StoreError, TerminalArea};
use tokio_util::sync::CancellationToken;

use crate::aggregator::dispatch_all;

/// What happened to one job in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: String,
    pub area: TerminalArea,
    /// `None` when the job never reached classification (unreadable file).
    pub status: Option<JobStatus>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobSummary {
    fn unprocessed(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            area: TerminalArea::Failed,
            status: None,
            total: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    fn classified(job_id: &str, area: TerminalArea, result: &JobResult) -> Self {
        Self {
            job_id: job_id.to_string(),
            area,
            status: Some(result.overall_status),
            total: result.total,
            succeeded: result.succeeded,
            failed: result.failed,
        }
    }
}

/// Processes the pending area with transports built by `make_transport`.
pub struct JobRunner<F> {
    store: JobStore,
    dispatch: DispatchConfig,
    make_transport: F,
}

impl<F, T> JobRunner<F>
where
    F: FnMut() -> T,
    T: Transport,
{
    pub fn new(store: JobStore, dispatch: DispatchConfig, make_transport: F) -> Self {
        Self {
            store,
            dispatch,
            make_transport,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run one pass over the pending area.
    ///
    /// Only a failure to list the pending area is returned as an error;
    /// per-job problems are logged and reflected in the summaries. Jobs that
    /// disappear mid-pass are skipped and have no summary.
    pub async fn process_pending(&mut self) -> Result<Vec<JobSummary>, StoreError> {
        let mut ids: Vec<String> = self.store.scan()?.collect();
        ids.sort();

        if ids.is_empty() {
            tracing::debug!("No pending jobs");
            return Ok(Vec::new());
        }
        tracing::info!(count = ids.len(), "Processing pending jobs");

        let mut client = None;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(summary) = self.process_job(id, &mut client).await {
                summaries.push(summary);
            }
        }

        if let Some(mut client) = client {
            client.close().await;
        }

        let count = |area: TerminalArea| summaries.iter().filter(|s| s.area == area).count();
        let (completed, partial, failed) = (
            count(TerminalArea::Processed),
            count(TerminalArea::Partial),
            count(TerminalArea::Failed),
        );
        tracing::info!(
            jobs = summaries.len(),
            completed,
            partial,
            failed,
            "Pass finished",
        );
        Ok(summaries)
    }

    async fn process_job(
        &mut self,
        id: &str,
        client: &mut Option<DispatchClient<T>>,
    ) -> Option<JobSummary> {
        let job = match self.store.load(id) {
            Ok(job) => job,
            Err(StoreError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(job_id = %id, "Job vanished from pending before it was read");
                return None;
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Cannot read job, moving to failed");
                return self
                    .relocate(id, TerminalArea::Failed)
                    .then(|| JobSummary::unprocessed(id));
            }
        };

        log_job_header(&job);

        let (result, job_error) = match decompose(&job) {
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Job rejected during decomposition");
                (JobResult::rejected(job.operations.len()), Some(e.to_string()))
            }
            Ok(operations) if operations.is_empty() => {
                tracing::warn!(job_id = %id, "Job has no operations");
                (JobResult::from_results(Vec::new()), None)
            }
            Ok(operations) => {
                let make_transport = &mut self.make_transport;
                let dispatch = &self.dispatch;
                let client = client
                    .get_or_insert_with(|| DispatchClient::new(make_transport(), dispatch.clone()));

                match client.connect().await {
                    Ok(()) => (dispatch_all(client, &operations).await, None),
                    Err(e) => {
                        tracing::error!(
                            job_id = %id,
                            error = %e,
                            "No dispatch client available, failing every operation",
                        );
                        let error = e.to_string();
                        (JobResult::failed_without_attempts(&operations, &error), Some(error))
                    }
                }
            }
        };

        let area = TerminalArea::for_status(result.overall_status);

        if !self.store.is_pending(id) {
            tracing::warn!(job_id = %id, "Job vanished from pending during processing, skipping");
            return None;
        }

        if let Err(e) = self
            .store
            .persist_job_result(id, area, &result, job_error.as_deref())
        {
            tracing::warn!(job_id = %id, error = %e, "Failed to write results artifact");
        }

        if !self.relocate(id, area) {
            return None;
        }

        log_job_summary(id, area, &result);
        Some(JobSummary::classified(id, area, &result))
    }

    /// Move `id` out of pending. Returns `false` when the job stays put.
    fn relocate(&self, id: &str, area: TerminalArea) -> bool {
        match self.store.transition(id, area) {
            Ok(_) => true,
            Err(StoreError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(job_id = %id, "Job vanished from pending before relocation");
                false
            }
            Err(e) => {
                tracing::error!(
                    job_id = %id,
                    area = area.dir_name(),
                    error = %e,
                    "Failed to relocate job, it stays pending",
                );
                false
            }
        }
    }

    /// Run passes until `cancel` fires.
    ///
    /// With no `poll_interval` a single pass is made and its error, if any,
    /// is returned. Otherwise listing failures are logged and the next pass
    /// starts after the interval.
    pub async fn run(
        &mut self,
        poll_interval: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        let Some(interval) = poll_interval else {
            self.process_pending().await?;
            return Ok(());
        };

        tracing::info!(interval_secs = interval.as_secs(), "Polling pending area");
        loop {
            // A pass in progress is never interrupted; cancellation takes
            // effect between passes.
            if let Err(e) = self.process_pending().await {
                tracing::error!(error = %e, "Pass failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        Ok(())
    }
}

fn log_job_header(job: &JobFile) {
    let concept = job
        .bank_movement
        .as_ref()
        .and_then(|bank| bank.concept_preview())
        .unwrap_or_default();
    tracing::info!(
        job_id = %job.id,
        operations = job.operations.len(),
        concept = %concept,
        "Processing job",
    );

    match (job.count_hint(), &job.declared_count) {
        (Some(declared), _) if declared as usize != job.operations.len() => {
            tracing::warn!(
                job_id = %job.id,
                declared,
                actual = job.operations.len(),
                "Declared operation count does not match the operation list",
            );
        }
        (None, Some(raw)) if !raw.is_null() => {
            tracing::warn!(job_id = %job.id, num_operaciones = %raw, "Unusable declared operation count");
        }
        _ => {}
    }
    match (job.total_hint(), &job.declared_total) {
        (Some(total), _) => {
            tracing::debug!(job_id = %job.id, liquido = total, "Declared net amount");
        }
        (None, Some(raw)) if !raw.is_null() => {
            tracing::warn!(job_id = %job.id, liquido_operaciones = %raw, "Unusable declared net amount");
        }
        _ => {}
    }
}

fn log_job_summary(id: &str, area: TerminalArea, result: &JobResult) {
    tracing::info!(
        job_id = %id,
        status = result.overall_status.as_str(),
        area = area.dir_name(),
        total = result.total,
        succeeded = result.succeeded,
        failed = result.failed,
        "Job finished",
    );
    for failure in result.failures() {
        tracing::warn!(
            job_id = %id,
            op_id = %failure.op_id,
            index = failure.index,
            tipo = %failure.kind,
            error = failure.error.as_deref().unwrap_or("no error text"),
            "Operation failed",
        );
    }
}
