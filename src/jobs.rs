//! Registry of background ingestion jobs.
//!
//! A job moves `Pending -> Processing -> Completed | Failed` and nothing else.
//! Finished jobs stay queryable until [`JobRegistry::sweep_finished_before`]
//! is called; the registry never drops them on its own.

use crate::config::JobConfig;
use crate::ingest::{Ingestor, Progress};
use crate::upload::RowCounts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub rows_seen: usize,
    pub rows_written: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<RowCounts>,
    pub error: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("unknown job {0}")]
    NotFound(JobId),
    #[error("job {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
    next_id: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new pending job.
    pub fn create(&self) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let job = Job {
            id,
            status: JobStatus::Pending,
            rows_seen: 0,
            rows_written: 0,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
            error: None,
        };
        self.lock().insert(id, job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        update: impl FnOnce(&mut Job),
    ) -> Result<(), JobError> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        let allowed = matches!(
            (job.status, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if !allowed {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }
        job.status = to;
        if to.is_finished() {
            job.ended_at = Some(Utc::now());
        }
        update(job);
        Ok(())
    }

    pub fn begin(&self, id: JobId) -> Result<(), JobError> {
        self.transition(id, JobStatus::Processing, |_| {})?;
        info!(job = %id, "job processing");
        Ok(())
    }

    /// Update the counters of a processing job.
    pub fn record_progress(&self, id: JobId, progress: Progress) -> Result<(), JobError> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Processing,
            });
        }
        job.rows_seen = progress.rows_seen;
        job.rows_written = progress.rows_written;
        Ok(())
    }

    pub fn complete(&self, id: JobId, counts: RowCounts) -> Result<(), JobError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.rows_seen = counts.total_rows;
            job.rows_written = counts.valid_rows;
            job.result = Some(counts);
        })?;
        info!(job = %id, total = counts.total_rows, valid = counts.valid_rows, "job completed");
        Ok(())
    }

    pub fn fail(&self, id: JobId, message: impl Into<String>) -> Result<(), JobError> {
        let message = message.into();
        error!(job = %id, error = %message, "job failed");
        self.transition(id, JobStatus::Failed, |job| job.error = Some(message))
    }

    /// Run `ingestor` over `reader` on a background task and track it.
    pub fn spawn_ingest<R>(&self, ingestor: Ingestor, reader: R) -> JobId
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.create();
        let registry = self.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.begin(id) {
                warn!(job = %id, error = %e, "job could not start");
                return;
            }
            let progress_registry = registry.clone();
            let outcome = ingestor
                .ingest_with_progress(reader, move |p| {
                    if let Err(e) = progress_registry.record_progress(id, p) {
                        warn!(job = %id, error = %e, "job progress not recorded");
                    }
                })
                .await;
            let recorded = match outcome {
                Ok(summary) => registry.complete(id, RowCounts::from(&summary)),
                Err(e) => registry.fail(id, e.to_string()),
            };
            if let Err(e) = recorded {
                warn!(job = %id, error = %e, "job result not recorded");
            }
        });
        id
    }

    /// Drop finished jobs that ended before `cutoff`; returns how many.
    pub fn sweep_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|id, job| {
            let expired = job.status.is_finished() && job.ended_at.is_some_and(|t| t < cutoff);
            if expired {
                info!(job = %id, "job swept");
            }
            !expired
        });
        before - jobs.len()
    }

    /// Drop finished jobs older than `config.max_age_hours`.
    pub fn sweep(&self, config: &JobConfig) -> usize {
        self.sweep_finished_before(Utc::now() - chrono::Duration::hours(config.max_age_hours))
    }
}
