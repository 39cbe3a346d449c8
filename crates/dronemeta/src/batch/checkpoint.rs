use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::batch::progress::BatchProgress;
use crate::error::BatchError;
use crate::storage::write_atomic;
use crate::worker::{Job, JobStatus};

/// One job as stored in the checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub video_path: PathBuf,
    pub job_id: String,
    pub status: JobStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
    pub processing_time: Option<f64>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            video_path: job.video_path.clone(),
            job_id: job.job_id.clone(),
            status: job.status,
            start_time: job.start_time,
            end_time: job.end_time,
            attempts: job.attempts,
            error_message: job.error_message.clone(),
            output_files: job.output_files.clone(),
            processing_time: job.processing_time(),
        }
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            video_path: record.video_path,
            status: record.status,
            attempts: record.attempts,
            start_time: record.start_time,
            end_time: record.end_time,
            error_message: record.error_message,
            output_files: record.output_files,
            result: None,
        }
    }
}

/// On-disk layout. Derived values are written for readers of the file and
/// recomputed from `jobs` on load.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    batch_id: String,
    total_jobs: usize,
    completed_jobs: usize,
    failed_jobs: usize,
    skipped_jobs: usize,
    in_progress_jobs: usize,
    pending_jobs: usize,
    processed_jobs: usize,
    remaining_jobs: usize,
    success_rate: f64,
    completion_percentage: f64,
    start_time: DateTime<Utc>,
    last_update: Option<DateTime<Utc>>,
    estimated_completion: Option<DateTime<Utc>>,
    jobs: BTreeMap<String, JobRecord>,
}

impl From<&BatchProgress> for CheckpointFile {
    fn from(progress: &BatchProgress) -> Self {
        let counts = progress.counts();
        Self {
            batch_id: progress.batch_id().to_string(),
            total_jobs: counts.total,
            completed_jobs: counts.completed,
            failed_jobs: counts.failed,
            skipped_jobs: counts.skipped,
            in_progress_jobs: counts.in_progress,
            pending_jobs: counts.pending,
            processed_jobs: counts.processed(),
            remaining_jobs: counts.remaining(),
            success_rate: progress.success_rate(),
            completion_percentage: progress.completion_percentage(),
            start_time: progress.start_time(),
            last_update: progress.last_update(),
            estimated_completion: progress.estimated_completion(),
            jobs: progress
                .jobs()
                .iter()
                .map(|job| (job.job_id.clone(), JobRecord::from(job)))
                .collect(),
        }
    }
}

impl From<CheckpointFile> for BatchProgress {
    fn from(file: CheckpointFile) -> Self {
        let mut jobs: Vec<Job> = file.jobs.into_values().map(Job::from).collect();
        // Discovery order is path order.
        jobs.sort_by(|a, b| a.video_path.cmp(&b.video_path));
        BatchProgress::from_jobs(file.batch_id, file.start_time, file.last_update, jobs)
    }
}

/// JSON checkpoint file holding the full state of one batch.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads whatever batch the file holds. `Ok(None)` when there is no file.
    pub fn read(&self) -> Result<Option<BatchProgress>, BatchError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let read_error = |reason: String| BatchError::CheckpointRead {
            path: self.path.clone(),
            reason,
        };
        let content = std::fs::read(&self.path).map_err(|e| read_error(e.to_string()))?;
        let file: CheckpointFile =
            serde_json::from_slice(&content).map_err(|e| read_error(e.to_string()))?;
        Ok(Some(file.into()))
    }

    /// Progress for `batch_id`, or `None` when the file is missing, holds a
    /// different batch, or cannot be parsed.
    pub fn load(&self, batch_id: &str) -> Option<BatchProgress> {
        match self.read() {
            Ok(Some(progress)) if progress.batch_id() == batch_id => {
                info!(
                    "Loaded checkpoint for batch {} ({}/{} processed)",
                    batch_id,
                    progress.processed(),
                    progress.total()
                );
                Some(progress)
            }
            Ok(Some(progress)) => {
                warn!(
                    "Checkpoint {} belongs to batch {}, not {}; starting fresh",
                    self.path.display(),
                    progress.batch_id(),
                    batch_id
                );
                None
            }
            Ok(None) => {
                debug!("No checkpoint at {}", self.path.display());
                None
            }
            Err(e) => {
                error!("{}; starting fresh", e);
                None
            }
        }
    }

    /// Stamps `last_update` and replaces the file atomically.
    pub fn save(&self, progress: &mut BatchProgress) -> Result<(), BatchError> {
        progress.touch();
        let encoded = serde_json::to_vec_pretty(&CheckpointFile::from(&*progress))?;
        write_atomic(&self.path, &encoded).map_err(|source| BatchError::CheckpointWrite {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            "Checkpoint saved to {} ({} processed)",
            self.path.display(),
            progress.processed()
        );
        Ok(())
    }
}
