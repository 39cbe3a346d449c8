use std::path::Path;

use log::{error, info};

use crate::batch::progress::BatchProgress;
use crate::worker::Job;

/// Things that happen while a batch runs, in the order they happen.
pub enum BatchEvent<'a> {
    Started {
        progress: &'a BatchProgress,
        scheduled: usize,
    },
    JobFinished {
        job: &'a Job,
        progress: &'a BatchProgress,
    },
    CheckpointSaved {
        path: &'a Path,
    },
    BreakerTripped {
        success_rate: f64,
        threshold: f64,
    },
    ShutdownRequested,
    Finished {
        progress: &'a BatchProgress,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &BatchEvent<'_>);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: &BatchEvent<'_>) {}
}

/// Writes one log line per event.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: &BatchEvent<'_>) {
        match event {
            BatchEvent::Started {
                progress,
                scheduled,
            } => info!(
                "Batch {}: {} jobs, {} to process",
                progress.batch_id(),
                progress.total(),
                scheduled
            ),
            BatchEvent::JobFinished { job, progress } => info!(
                "[{}/{}] {} {} ({:.1}%)",
                progress.processed(),
                progress.total(),
                job.file_name(),
                job.status,
                progress.completion_percentage()
            ),
            BatchEvent::CheckpointSaved { path } => {
                info!("Progress saved to {}", path.display())
            }
            BatchEvent::BreakerTripped {
                success_rate,
                threshold,
            } => error!(
                "Success rate {:.1}% is below {:.1}%",
                success_rate, threshold
            ),
            BatchEvent::ShutdownRequested => info!("Shutdown requested, draining in-flight jobs"),
            BatchEvent::Finished { progress } => info!(
                "Batch {} finished: {} completed, {} failed, {} skipped, {} pending",
                progress.batch_id(),
                progress.completed(),
                progress.failed(),
                progress.skipped(),
                progress.pending()
            ),
        }
    }
}
