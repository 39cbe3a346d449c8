use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::batch::progress::BatchProgress;
use crate::worker::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJob {
    pub filename: String,
    pub error: String,
    pub attempts: u32,
}

/// End-of-run report over a batch's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub success_rate: f64,
    pub completion_percentage: f64,
    pub total_time_seconds: f64,
    pub average_processing_time: f64,
    pub min_processing_time: f64,
    pub max_processing_time: f64,
    /// Failed jobs grouped by the text before the first colon of their error.
    pub error_types: BTreeMap<String, usize>,
    pub failed_jobs: Vec<FailedJob>,
}

pub fn error_type(message: &str) -> String {
    let head = message.split(':').next().unwrap_or(message).trim();
    if head.is_empty() {
        "Unknown".to_string()
    } else {
        head.to_string()
    }
}

pub fn summarize(progress: &BatchProgress) -> BatchSummary {
    let durations: Vec<f64> = progress
        .jobs()
        .iter()
        .filter(|job| job.status == JobStatus::Completed)
        .filter_map(|job| job.processing_time())
        .collect();

    let (average, min, max) = if durations.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = durations.iter().sum();
        (
            sum / durations.len() as f64,
            durations.iter().copied().fold(f64::INFINITY, f64::min),
            durations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };

    let mut error_types = BTreeMap::new();
    let mut failed_jobs = Vec::new();
    for job in progress.jobs().iter().filter(|j| j.status == JobStatus::Failed) {
        let error = job
            .error_message
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        *error_types.entry(error_type(&error)).or_insert(0) += 1;
        failed_jobs.push(FailedJob {
            filename: job.file_name(),
            error,
            attempts: job.attempts,
        });
    }

    let end = progress.last_update().unwrap_or_else(Utc::now);
    let total_time_seconds = (end - progress.start_time())
        .num_milliseconds()
        .max(0) as f64
        / 1000.0;

    BatchSummary {
        batch_id: progress.batch_id().to_string(),
        total_jobs: progress.total(),
        completed: progress.completed(),
        failed: progress.failed(),
        skipped: progress.skipped(),
        pending: progress.pending(),
        success_rate: progress.success_rate(),
        completion_percentage: progress.completion_percentage(),
        total_time_seconds,
        average_processing_time: average,
        min_processing_time: min,
        max_processing_time: max,
        error_types,
        failed_jobs,
    }
}
