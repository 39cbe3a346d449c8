use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, info, warn};

use crate::config::schema::BatchConfig;
use crate::pipeline::{JobOutput, JobRunner, PipelineError};
use crate::worker::job::{Job, JobStatus};

/// Attempt budget, linear backoff and per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            base_delay: config.retry_delay(),
            timeout: config.timeout(),
        }
    }

    /// Pause after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs one job to a terminal state. Failures never escape: they end up in
/// the job's status and error message.
pub fn execute_job(runner: &Arc<dyn JobRunner>, mut job: Job, policy: &RetryPolicy) -> Job {
    job.status = JobStatus::Processing;
    job.start_time = Some(Utc::now());
    job.end_time = None;
    job.result = None;

    if let Some(existing) = runner.existing_outputs(&job.video_path) {
        debug!("{}: outputs already present, skipping", job.job_id);
        job.status = JobStatus::Skipped;
        job.output_files = existing;
        job.error_message = None;
        job.end_time = Some(Utc::now());
        return job;
    }

    let first_attempt = job.attempts + 1;
    for attempt in first_attempt..=policy.max_attempts {
        job.attempts = attempt;
        match run_with_timeout(runner, &job.video_path, policy.timeout) {
            Ok(output) => {
                job.status = JobStatus::Completed;
                job.error_message = None;
                job.output_files = output.output_files;
                job.result = Some(output.result);
                job.end_time = Some(Utc::now());
                return job;
            }
            Err(e) => {
                warn!(
                    "{} attempt {}/{} failed for {}: {}",
                    job.job_id,
                    attempt,
                    policy.max_attempts,
                    job.file_name(),
                    e
                );
                job.error_message = Some(e.to_string());
                if attempt < policy.max_attempts {
                    let delay = policy.delay_after(attempt);
                    debug!("{}: retrying in {:?}", job.job_id, delay);
                    thread::sleep(delay);
                }
            }
        }
    }

    if job.error_message.is_none() {
        job.error_message = Some(format!(
            "Retry budget exhausted: {} of {} attempts already used",
            job.attempts, policy.max_attempts
        ));
    }
    info!("{} failed after {} attempts", job.job_id, job.attempts);
    job.status = JobStatus::Failed;
    job.end_time = Some(Utc::now());
    job
}

/// Runs one attempt on a helper thread. An attempt past its deadline counts
/// as a timeout, but this still waits for its thread to return, so two
/// attempts on the same file never overlap. External tools are killed at the
/// same deadline, which bounds the wait.
fn run_with_timeout(
    runner: &Arc<dyn JobRunner>,
    video_path: &Path,
    timeout: Duration,
) -> Result<JobOutput, PipelineError> {
    let (tx, rx) = bounded(1);
    let runner = Arc::clone(runner);
    let path = video_path.to_path_buf();

    thread::Builder::new()
        .name("dronemeta-attempt".to_string())
        .spawn(move || {
            let _ = tx.send(runner.run(&path));
        })
        .map_err(|e| PipelineError::Spawn(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "{} exceeded {:?}; waiting for the attempt to wind down",
                video_path.display(),
                timeout
            );
            // The late result is discarded either way.
            let _ = rx.recv();
            Err(PipelineError::Timeout {
                seconds: timeout.as_secs_f64(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Panicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::test_support::sample_result;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyRunner {
        failures: u32,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
        delay: Duration,
    }

    impl FlakyRunner {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }
    }

    impl JobRunner for FlakyRunner {
        fn run(&self, video_path: &Path) -> Result<JobOutput, PipelineError> {
            self.call_times.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(self.delay);
            if call <= self.failures {
                return Err(PipelineError::Extraction(format!("probe failed on call {}", call)));
            }
            let name = video_path.file_name().unwrap().to_string_lossy().to_string();
            Ok(JobOutput {
                result: sample_result(&name),
                output_files: vec![PathBuf::from(format!("{}.json", name))],
            })
        }
    }

    struct SkippingRunner;

    impl JobRunner for SkippingRunner {
        fn run(&self, _video_path: &Path) -> Result<JobOutput, PipelineError> {
            panic!("must not run");
        }

        fn existing_outputs(&self, _video_path: &Path) -> Option<Vec<PathBuf>> {
            Some(vec![PathBuf::from("out/a.mp4.json")])
        }
    }

    struct PanickingRunner;

    impl JobRunner for PanickingRunner {
        fn run(&self, _video_path: &Path) -> Result<JobOutput, PipelineError> {
            panic!("decoder crashed");
        }
    }

    fn policy(max_attempts: u32, base_delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            timeout: Duration::from_secs(5),
        }
    }

    fn job() -> Job {
        Job::new(0, PathBuf::from("/flights/a.mp4"))
    }

    #[test]
    fn test_immediate_success() {
        let flaky = Arc::new(FlakyRunner {
            delay: Duration::from_millis(5),
            ..FlakyRunner::new(0)
        });
        let runner: Arc<dyn JobRunner> = flaky.clone();

        let job = execute_job(&runner, job(), &policy(3, 0));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert!(job.end_time.unwrap() > job.start_time.unwrap());
        assert!(job.result.is_some());
        assert_eq!(job.output_files, vec![PathBuf::from("a.mp4.json")]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_always_failing_job_uses_whole_budget() {
        let flaky = Arc::new(FlakyRunner::new(u32::MAX));
        let runner: Arc<dyn JobRunner> = flaky.clone();

        let job = execute_job(&runner, job(), &policy(3, 0));

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Extraction failed: probe failed on call 3")
        );
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_then_success() {
        let runner: Arc<dyn JobRunner> = Arc::new(FlakyRunner::new(1));
        let job = execute_job(&runner, job(), &policy(3, 0));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 2);
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let flaky = Arc::new(FlakyRunner::new(u32::MAX));
        let runner: Arc<dyn JobRunner> = flaky.clone();
        let policy = policy(3, 40);
        assert_eq!(policy.delay_after(1), Duration::from_millis(40));
        assert_eq!(policy.delay_after(2), Duration::from_millis(80));

        execute_job(&runner, job(), &policy);

        let times = flaky.call_times.lock().unwrap();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(40));
        assert!(times[2] - times[1] >= Duration::from_millis(80));
    }

    #[test]
    fn test_resumed_job_continues_attempt_count() {
        let flaky = Arc::new(FlakyRunner::new(u32::MAX));
        let runner: Arc<dyn JobRunner> = flaky.clone();
        let mut resumed = job();
        resumed.attempts = 1;

        let job = execute_job(&runner, resumed, &policy(2, 0));

        assert_eq!(job.attempts, 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_is_a_failure() {
        let runner: Arc<dyn JobRunner> = Arc::new(FlakyRunner {
            delay: Duration::from_millis(300),
            ..FlakyRunner::new(0)
        });
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            timeout: Duration::from_millis(50),
        };

        let job = execute_job(&runner, job(), &policy);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Timeout: attempt exceeded 0.05s")
        );
    }

    /// Sleeps on every call and records how many calls ran at once.
    struct SlowRunner {
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicU32,
    }

    impl JobRunner for SlowRunner {
        fn run(&self, _video_path: &Path) -> Result<JobOutput, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);
            Err(PipelineError::Extraction("too slow".to_string()))
        }
    }

    #[test]
    fn test_timed_out_attempt_never_overlaps_its_retry() {
        let slow = Arc::new(SlowRunner {
            delay: Duration::from_millis(250),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicU32::new(0),
        });
        let runner: Arc<dyn JobRunner> = slow.clone();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            timeout: Duration::from_millis(100),
        };

        let job = execute_job(&runner, job(), &policy);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Timeout: attempt exceeded 0.1s")
        );
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
        // The abandoned second attempt has also finished by the time the job returns.
        assert_eq!(slow.running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_existing_outputs_skip_without_attempt() {
        let runner: Arc<dyn JobRunner> = Arc::new(SkippingRunner);
        let job = execute_job(&runner, job(), &policy(3, 0));

        assert_eq!(job.status, JobStatus::Skipped);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.output_files, vec![PathBuf::from("out/a.mp4.json")]);
    }

    #[test]
    fn test_panicking_attempt_is_recorded() {
        let runner: Arc<dyn JobRunner> = Arc::new(PanickingRunner);
        let job = execute_job(&runner, job(), &policy(1, 0));

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().starts_with("Worker panic"));
    }
}
