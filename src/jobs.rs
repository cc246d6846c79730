//! In-memory tracking of background ingestion jobs.
//!
//! A job is created when `POST /ingest` is accepted, advanced by the
//! [`JobSink`] the ingestion pipeline reports into, and finished as
//! `completed` or `failed`. Jobs live for the lifetime of the process.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::progress::{IngestEvent, IngestProgressReporter};

/// Lifecycle of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Snapshot of one job, as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    /// Files finished so far, out of `total`.
    pub processed: u64,
    pub total: u64,
    /// Last progress note, the completion summary or the failure reason.
    pub message: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Thread-safe table of jobs keyed by id.
#[derive(Default)]
pub struct JobTracker {
    jobs: Mutex<HashMap<String, JobProgress>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `pending` job with a fresh id.
    pub fn create_job(&self, total: u64, metadata: BTreeMap<String, String>) -> JobProgress {
        let job = JobProgress {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            processed: 0,
            total,
            message: None,
            metadata,
        };
        self.jobs.lock().insert(job.job_id.clone(), job.clone());
        job
    }

    /// Apply `f` to the job if it exists.
    pub fn update<F: FnOnce(&mut JobProgress)>(&self, job_id: &str, f: F) {
        if let Some(job) = self.jobs.lock().get_mut(job_id) {
            f(job);
        }
    }

    pub fn fail(&self, job_id: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = Some(message);
        });
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobProgress> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn list_jobs(&self) -> Vec<JobProgress> {
        let mut jobs: Vec<_> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }
}

/// Progress sink that writes ingestion events into one tracked job.
pub struct JobSink {
    tracker: Arc<JobTracker>,
    job_id: String,
}

impl JobSink {
    pub fn new(tracker: Arc<JobTracker>, job_id: impl Into<String>) -> Self {
        Self {
            tracker,
            job_id: job_id.into(),
        }
    }
}

impl IngestProgressReporter for JobSink {
    fn report(&self, event: IngestEvent) {
        self.tracker.update(&self.job_id, |job| match event {
            IngestEvent::Started { total } => {
                job.status = JobStatus::Running;
                job.total = total;
            }
            IngestEvent::Processed { file, n, .. } => {
                job.processed = n;
                job.message = Some(format!("Processed {}", file));
            }
            IngestEvent::Finished { files, chunks } => {
                job.status = JobStatus::Completed;
                job.message = Some(format!("Indexed {} document(s), {} chunk(s)", files, chunks));
            }
        });
    }
}
