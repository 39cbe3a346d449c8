use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use tracing::info_span;

use crate::batch::checkpoint::CheckpointStore;
use crate::batch::progress::BatchProgress;
use crate::batch::reporter::{BatchEvent, ProgressReporter};
use crate::batch::summary::{summarize, BatchSummary};
use crate::config::schema::{BatchConfig, Config};
use crate::config::validate_config;
use crate::error::{BatchError, WorkerError};
use crate::pipeline::JobRunner;
use crate::worker::{RetryPolicy, VideoScanner, WorkerPool};

/// Why submission stopped before the queue ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Breaker,
    Shutdown,
}

/// Runs a batch: discovery, resume, the worker pool, checkpoints and the
/// failure-rate breaker.
pub struct BatchProcessor {
    config: BatchConfig,
    runner: Arc<dyn JobRunner>,
    reporter: Arc<dyn ProgressReporter>,
    checkpoint: CheckpointStore,
    shutdown: Arc<AtomicBool>,
}

impl BatchProcessor {
    pub fn new(
        config: &Config,
        runner: Arc<dyn JobRunner>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, BatchError> {
        validate_config(config)?;
        let checkpoint = CheckpointStore::new(
            config
                .output
                .directory
                .join(&config.batch.progress_file_name),
        );
        Ok(Self {
            config: config.batch.clone(),
            runner,
            reporter,
            checkpoint,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Setting the flag stops submission; in-flight jobs still finish.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn discover<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<PathBuf> {
        VideoScanner::new(paths).scan()
    }

    pub fn load_progress(&self, batch_id: &str) -> Option<BatchProgress> {
        if !self.config.enable_progress_file {
            return None;
        }
        self.checkpoint.load(batch_id)
    }

    pub fn save_progress(&self, progress: &mut BatchProgress) -> Result<(), BatchError> {
        if !self.config.enable_progress_file {
            return Ok(());
        }
        self.checkpoint.save(progress)?;
        self.reporter.report(&BatchEvent::CheckpointSaved {
            path: self.checkpoint.path(),
        });
        Ok(())
    }

    pub fn batch_summary(&self, progress: &BatchProgress) -> BatchSummary {
        summarize(progress)
    }

    pub fn process_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        batch_id: Option<&str>,
    ) -> Result<BatchProgress, BatchError> {
        let files = self.discover(paths);
        if files.is_empty() {
            return Err(BatchError::NoInput);
        }

        let batch_id = batch_id
            .map(str::to_string)
            .unwrap_or_else(BatchProgress::generate_batch_id);
        let _batch_span = info_span!("batch", batch_id = %batch_id).entered();

        let resumed = if self.config.enable_resume {
            self.load_progress(&batch_id)
        } else {
            None
        };
        let mut progress = match resumed {
            Some(mut progress) => {
                let added = progress.reconcile(&files);
                info!(
                    "Resuming batch {} ({} processed, {} new files)",
                    batch_id,
                    progress.processed(),
                    added
                );
                progress
            }
            None => BatchProgress::new(batch_id, &files),
        };

        let mut queue: VecDeque<String> = progress
            .requeue(&files, self.config.skip_completed, self.config.retry_attempts)
            .into();
        self.reporter.report(&BatchEvent::Started {
            progress: &progress,
            scheduled: queue.len(),
        });

        if !queue.is_empty() {
            self.run_queue(&mut progress, &mut queue)?;
        } else {
            info!("Nothing to process in batch {}", progress.batch_id());
        }

        if let Err(e) = self.save_progress(&mut progress) {
            error!("Final checkpoint failed: {}", e);
        }
        self.reporter
            .report(&BatchEvent::Finished { progress: &progress });
        Ok(progress)
    }

    fn run_queue(
        &self,
        progress: &mut BatchProgress,
        queue: &mut VecDeque<String>,
    ) -> Result<(), BatchError> {
        let worker_count = self.config.max_workers.min(queue.len()).max(1);
        let pool = WorkerPool::new(
            Arc::clone(&self.runner),
            RetryPolicy::from_config(&self.config),
            worker_count,
        )?;

        let threshold = 100.0 - self.config.max_error_percentage;
        let mut in_flight = 0usize;
        let mut breaker_tripped = false;
        let mut stop: Option<StopReason> = None;

        loop {
            if stop.is_none() && self.shutdown.load(Ordering::Relaxed) {
                stop = Some(StopReason::Shutdown);
                self.reporter.report(&BatchEvent::ShutdownRequested);
            }

            while stop.is_none() && in_flight < worker_count {
                let Some(job_id) = queue.pop_front() else {
                    break;
                };
                if let Some(job) = progress.mark_submitted(&job_id) {
                    pool.submit(job)?;
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            let finished = pool.recv_result().ok_or(WorkerError::ChannelClosed)?;
            in_flight -= 1;
            let job_id = finished.job_id.clone();
            progress.record_finished(finished);
            if let Some(job) = progress.job(&job_id) {
                self.reporter.report(&BatchEvent::JobFinished {
                    job,
                    progress: &*progress,
                });
            }

            if progress.processed() % self.config.save_progress_interval == 0 {
                if let Err(e) = self.save_progress(progress) {
                    error!("Checkpoint failed, continuing: {}", e);
                }
            }

            if !breaker_tripped
                && progress.processed() > self.config.breaker_grace_jobs
                && progress.success_rate() < threshold
            {
                breaker_tripped = true;
                self.reporter.report(&BatchEvent::BreakerTripped {
                    success_rate: progress.success_rate(),
                    threshold,
                });
                if self.config.continue_on_error {
                    warn!("Failure rate above limit, continuing as configured");
                } else if stop.is_none() {
                    error!(
                        "Stopping batch {}: success rate {:.1}% below {:.1}%",
                        progress.batch_id(),
                        progress.success_rate(),
                        threshold
                    );
                    stop = Some(StopReason::Breaker);
                }
            }
        }

        if let Some(reason) = stop {
            info!(
                "Submission stopped ({:?}); {} jobs left pending",
                reason,
                queue.len()
            );
        }

        pool.shutdown();
        pool.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::reporter::NoopProgress;
    use crate::formatter::test_support::sample_result;
    use crate::pipeline::{JobOutput, PipelineError};
    use crate::worker::JobStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails every file whose stem parses to a number below `fail_below`.
    struct CountingRunner {
        fail_below: usize,
        calls: Mutex<HashMap<PathBuf, u32>>,
    }

    impl CountingRunner {
        fn new(fail_below: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_below,
                calls: Mutex::new(HashMap::new()),
            })
        }

        fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }
    }

    impl JobRunner for CountingRunner {
        fn run(&self, video_path: &Path) -> Result<JobOutput, PipelineError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(video_path.to_path_buf())
                .or_insert(0) += 1;
            let stem: usize = video_path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(usize::MAX);
            if stem < self.fail_below {
                return Err(PipelineError::Extraction("corrupt file".to_string()));
            }
            let name = video_path.file_name().unwrap().to_string_lossy().to_string();
            Ok(JobOutput {
                result: sample_result(&name),
                output_files: vec![],
            })
        }
    }

    fn write_videos(dir: &Path, count: usize) {
        for i in 0..count {
            std::fs::write(dir.join(format!("{:02}.mp4", i)), b"").unwrap();
        }
    }

    fn config(output: &Path) -> Config {
        let mut config = Config::default();
        config.output.directory = output.to_path_buf();
        config.batch.max_workers = 1;
        config.batch.retry_attempts = 1;
        config.batch.retry_delay = 0.0;
        config
    }

    fn processor(config: &Config, runner: Arc<CountingRunner>) -> BatchProcessor {
        BatchProcessor::new(config, runner, Arc::new(NoopProgress)).unwrap()
    }

    #[test]
    fn test_no_input_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let processor = processor(&config(temp_dir.path()), CountingRunner::new(0));
        assert!(matches!(
            processor.process_batch(&[temp_dir.path()], Some("b")),
            Err(BatchError::NoInput)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.batch.max_workers = 0;
        assert!(matches!(
            BatchProcessor::new(&config, CountingRunner::new(0), Arc::new(NoopProgress)),
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn test_breaker_stops_submission() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 20);
        let mut config = config(output.path());
        config.batch.max_error_percentage = 50.0;
        config.batch.continue_on_error = false;
        let runner = CountingRunner::new(11);

        let progress = processor(&config, runner.clone())
            .process_batch(&[input.path()], Some("breaker"))
            .unwrap();

        assert_eq!(progress.failed(), 11);
        assert_eq!(progress.completed(), 0);
        assert_eq!(progress.pending(), 9);
        assert_eq!(runner.total_calls(), 11);
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_breaker_only_logs_when_continuing() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 20);
        let mut config = config(output.path());
        config.batch.continue_on_error = true;

        let progress = processor(&config, CountingRunner::new(11))
            .process_batch(&[input.path()], Some("breaker"))
            .unwrap();

        assert_eq!(progress.failed(), 11);
        assert_eq!(progress.completed(), 9);
        assert_eq!(progress.pending(), 0);
    }

    #[test]
    fn test_resume_does_not_rerun_finished_jobs() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 4);
        let mut config = config(output.path());
        config.batch.retry_attempts = 2;
        config.batch.continue_on_error = true;

        let first = CountingRunner::new(1);
        let progress = processor(&config, first.clone())
            .process_batch(&[input.path()], Some("resume"))
            .unwrap();
        assert_eq!(progress.completed(), 3);
        assert_eq!(progress.failed(), 1);
        assert_eq!(first.total_calls(), 5);

        // The failed job used its whole budget, so nothing runs again.
        let second = CountingRunner::new(0);
        let progress = processor(&config, second.clone())
            .process_batch(&[input.path()], Some("resume"))
            .unwrap();
        assert_eq!(second.total_calls(), 0);
        assert_eq!(progress.completed(), 3);
        assert_eq!(progress.failed(), 1);

        // A larger budget retries only the failed job.
        config.batch.retry_attempts = 3;
        let third = CountingRunner::new(0);
        let progress = processor(&config, third.clone())
            .process_batch(&[input.path()], Some("resume"))
            .unwrap();
        assert_eq!(third.total_calls(), 1);
        assert_eq!(progress.completed(), 4);
        assert_eq!(progress.job("job_0000").unwrap().attempts, 3);
    }

    #[test]
    fn test_without_skip_completed_everything_reruns() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 3);
        let mut config = config(output.path());

        processor(&config, CountingRunner::new(0))
            .process_batch(&[input.path()], Some("again"))
            .unwrap();

        config.batch.skip_completed = false;
        let runner = CountingRunner::new(0);
        let progress = processor(&config, runner.clone())
            .process_batch(&[input.path()], Some("again"))
            .unwrap();

        assert_eq!(runner.total_calls(), 3);
        assert_eq!(progress.completed(), 3);
        assert!(progress.jobs().iter().all(|j| j.attempts == 1));
    }

    #[test]
    fn test_other_batch_id_starts_fresh() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 2);
        let config = config(output.path());

        processor(&config, CountingRunner::new(0))
            .process_batch(&[input.path()], Some("one"))
            .unwrap();
        let runner = CountingRunner::new(0);
        processor(&config, runner.clone())
            .process_batch(&[input.path()], Some("two"))
            .unwrap();

        assert_eq!(runner.total_calls(), 2);
    }

    #[test]
    fn test_checkpoint_written_at_end() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 3);
        let mut config = config(output.path());
        config.batch.save_progress_interval = 100;

        let processor = processor(&config, CountingRunner::new(0));
        processor
            .process_batch(&[input.path()], Some("final"))
            .unwrap();

        let saved = processor.checkpoint().read().unwrap().unwrap();
        assert_eq!(saved.batch_id(), "final");
        assert_eq!(saved.completed(), 3);
        assert!(saved.jobs().iter().all(|j| j.status == JobStatus::Completed));
    }

    #[test]
    fn test_progress_file_disabled() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 2);
        let mut config = config(output.path());
        config.batch.enable_progress_file = false;

        let processor = processor(&config, CountingRunner::new(0));
        processor
            .process_batch(&[input.path()], Some("nofile"))
            .unwrap();

        assert!(!processor.checkpoint().path().exists());
    }

    #[test]
    fn test_shutdown_before_start_leaves_everything_pending() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_videos(input.path(), 3);
        let runner = CountingRunner::new(0);
        let processor = processor(&config(output.path()), runner.clone());

        processor.shutdown_handle().store(true, Ordering::Relaxed);
        let progress = processor
            .process_batch(&[input.path()], Some("stop"))
            .unwrap();

        assert_eq!(runner.total_calls(), 0);
        assert_eq!(progress.pending(), 3);
    }
}
