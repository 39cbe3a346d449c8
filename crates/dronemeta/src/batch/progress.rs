use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::worker::{Job, JobStatus};

/// Job counts by status. `total` always equals the sum of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut counts = Self::default();
        for job in jobs {
            counts.add(job.status);
        }
        counts
    }

    fn slot(&mut self, status: JobStatus) -> &mut usize {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Processing => &mut self.in_progress,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Skipped => &mut self.skipped,
        }
    }

    fn add(&mut self, status: JobStatus) {
        *self.slot(status) += 1;
        self.total += 1;
    }

    fn transfer(&mut self, from: JobStatus, to: JobStatus) {
        let source = self.slot(from);
        *source = source.saturating_sub(1);
        *self.slot(to) += 1;
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.processed())
            .saturating_sub(self.in_progress)
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.in_progress + self.processed() == self.total
    }
}

/// Aggregate state of a batch run. Only the orchestrating thread mutates it.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    batch_id: String,
    start_time: DateTime<Utc>,
    last_update: Option<DateTime<Utc>>,
    estimated_completion: Option<DateTime<Utc>>,
    counts: StatusCounts,
    jobs: Vec<Job>,
    index: HashMap<String, usize>,
}

impl BatchProgress {
    /// Fresh progress with one pending job per file, in the given order.
    pub fn new(batch_id: impl Into<String>, files: &[PathBuf]) -> Self {
        let jobs = files
            .iter()
            .enumerate()
            .map(|(i, path)| Job::new(i, path.clone()))
            .collect();
        Self::from_jobs(batch_id.into(), Utc::now(), None, jobs)
    }

    /// Rebuilds progress from stored jobs. Counters are recomputed and jobs
    /// left `processing` by an interrupted run go back to pending.
    pub fn from_jobs(
        batch_id: String,
        start_time: DateTime<Utc>,
        last_update: Option<DateTime<Utc>>,
        mut jobs: Vec<Job>,
    ) -> Self {
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Processing {
                debug!("{} was interrupted, returning it to pending", job.job_id);
                job.status = JobStatus::Pending;
            }
        }
        let index = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.job_id.clone(), i))
            .collect();
        let counts = StatusCounts::from_jobs(&jobs);

        let mut progress = Self {
            batch_id,
            start_time,
            last_update,
            estimated_completion: None,
            counts,
            jobs,
            index,
        };
        progress.update_estimate();
        progress
    }

    /// `batch_%Y%m%d_%H%M%S` in local time.
    pub fn generate_batch_id() -> String {
        Local::now().format("batch_%Y%m%d_%H%M%S").to_string()
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn estimated_completion(&self) -> Option<DateTime<Utc>> {
        self.estimated_completion
    }

    pub fn counts(&self) -> StatusCounts {
        self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.total
    }

    pub fn completed(&self) -> usize {
        self.counts.completed
    }

    pub fn failed(&self) -> usize {
        self.counts.failed
    }

    pub fn skipped(&self) -> usize {
        self.counts.skipped
    }

    pub fn pending(&self) -> usize {
        self.counts.pending
    }

    pub fn in_progress(&self) -> usize {
        self.counts.in_progress
    }

    pub fn processed(&self) -> usize {
        self.counts.processed()
    }

    pub fn remaining(&self) -> usize {
        self.counts.remaining()
    }

    pub fn success_rate(&self) -> f64 {
        match self.processed() {
            0 => 0.0,
            processed => self.counts.completed as f64 / processed as f64 * 100.0,
        }
    }

    pub fn completion_percentage(&self) -> f64 {
        match self.counts.total {
            0 => 0.0,
            total => self.processed() as f64 / total as f64 * 100.0,
        }
    }

    /// Jobs in discovery order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.index.get(job_id).map(|&i| &self.jobs[i])
    }

    /// Counters agree with the stored jobs.
    pub fn is_consistent(&self) -> bool {
        self.counts.is_consistent() && self.counts == StatusCounts::from_jobs(&self.jobs)
    }

    /// Adds pending jobs for files this progress does not know yet and
    /// returns how many were added.
    pub fn reconcile(&mut self, files: &[PathBuf]) -> usize {
        let known: HashSet<PathBuf> = self.jobs.iter().map(|j| j.video_path.clone()).collect();
        let mut next_index = self
            .jobs
            .iter()
            .filter_map(Job::index)
            .max()
            .map_or(self.jobs.len(), |max| max + 1);

        let mut added = 0;
        for path in files.iter().filter(|p| !known.contains(*p)) {
            while self.index.contains_key(&Job::id_for(next_index)) {
                next_index += 1;
            }
            self.insert(Job::new(next_index, path.clone()));
            next_index += 1;
            added += 1;
        }

        let discovered: HashSet<&PathBuf> = files.iter().collect();
        let vanished = self
            .jobs
            .iter()
            .filter(|j| !discovered.contains(&j.video_path))
            .count();
        if vanished > 0 {
            warn!(
                "{} jobs in batch {} refer to files that were not rediscovered",
                vanished, self.batch_id
            );
        }
        added
    }

    fn insert(&mut self, job: Job) {
        self.counts.add(job.status);
        self.index.insert(job.job_id.clone(), self.jobs.len());
        self.jobs.push(job);
    }

    /// Picks the jobs this run executes and moves them back to pending.
    /// Pending jobs always run; failed jobs run while they have attempts
    /// left; completed and skipped jobs run again with a fresh budget only
    /// when `skip_completed` is off. Jobs whose files were not rediscovered
    /// are left alone.
    pub fn requeue(
        &mut self,
        files: &[PathBuf],
        skip_completed: bool,
        retry_attempts: u32,
    ) -> Vec<String> {
        let discovered: HashSet<&PathBuf> = files.iter().collect();
        let mut scheduled = Vec::new();

        for job in self.jobs.iter_mut() {
            if !discovered.contains(&job.video_path) {
                continue;
            }
            let run = match job.status {
                JobStatus::Pending => true,
                JobStatus::Failed => job.attempts < retry_attempts,
                JobStatus::Completed | JobStatus::Skipped => !skip_completed,
                JobStatus::Processing => false,
            };
            if !run {
                continue;
            }

            let previous = job.status;
            match previous {
                JobStatus::Completed | JobStatus::Skipped => job.reset(),
                _ => job.status = JobStatus::Pending,
            }
            self.counts.transfer(previous, JobStatus::Pending);
            scheduled.push(job.job_id.clone());
        }
        scheduled
    }

    /// Marks a pending job as handed to a worker and returns a copy for it.
    pub fn mark_submitted(&mut self, job_id: &str) -> Option<Job> {
        let &i = self.index.get(job_id)?;
        let job = &mut self.jobs[i];
        if job.status != JobStatus::Pending {
            warn!("{} is {}, not submitting it", job_id, job.status);
            return None;
        }
        job.status = JobStatus::Processing;
        self.counts.transfer(JobStatus::Pending, JobStatus::Processing);
        Some(job.clone())
    }

    /// Stores a job a worker finished and refreshes the estimate.
    pub fn record_finished(&mut self, job: Job) {
        let Some(&i) = self.index.get(&job.job_id) else {
            warn!("Ignoring result for unknown job {}", job.job_id);
            return;
        };
        let previous = self.jobs[i].status;
        self.counts.transfer(previous, job.status);
        self.jobs[i] = job;
        self.update_estimate();
    }

    pub(crate) fn touch(&mut self) {
        self.last_update = Some(Utc::now());
    }

    /// Linear extrapolation of elapsed time over processed jobs.
    fn update_estimate(&mut self) {
        let processed = self.processed();
        if processed == 0 {
            self.estimated_completion = None;
            return;
        }
        let now = Utc::now();
        let per_job = (now - self.start_time) / processed as i32;
        self.estimated_completion = Some(now + per_job * self.remaining() as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("/flights/{:02}.mp4", i)))
            .collect()
    }

    fn finish(progress: &mut BatchProgress, job_id: &str, status: JobStatus) {
        let mut job = progress.mark_submitted(job_id).unwrap();
        job.status = status;
        job.attempts = 1;
        progress.record_finished(job);
    }

    #[test]
    fn test_new_progress() {
        let progress = BatchProgress::new("batch_a", &files(3));
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.pending(), 3);
        assert_eq!(progress.processed(), 0);
        assert_eq!(progress.success_rate(), 0.0);
        assert_eq!(progress.completion_percentage(), 0.0);
        assert!(progress.estimated_completion().is_none());
        assert_eq!(progress.jobs()[2].job_id, "job_0002");
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_counters_follow_transitions() {
        let mut progress = BatchProgress::new("batch_a", &files(4));

        let submitted = progress.mark_submitted("job_0000").unwrap();
        assert_eq!(submitted.status, JobStatus::Processing);
        assert_eq!(progress.in_progress(), 1);
        assert_eq!(progress.remaining(), 3);
        assert!(progress.mark_submitted("job_0000").is_none());

        let mut done = submitted;
        done.status = JobStatus::Completed;
        progress.record_finished(done);
        finish(&mut progress, "job_0001", JobStatus::Failed);
        finish(&mut progress, "job_0002", JobStatus::Skipped);

        let counts = progress.counts();
        assert_eq!(
            (counts.completed, counts.failed, counts.skipped, counts.pending),
            (1, 1, 1, 1)
        );
        assert_eq!(progress.processed(), 3);
        assert!((progress.success_rate() - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(progress.completion_percentage(), 75.0);
        assert!(progress.estimated_completion().is_some());
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_interrupted_jobs_return_to_pending() {
        let mut jobs: Vec<Job> = files(2)
            .into_iter()
            .enumerate()
            .map(|(i, p)| Job::new(i, p))
            .collect();
        jobs[0].status = JobStatus::Processing;
        jobs[1].status = JobStatus::Completed;

        let progress = BatchProgress::from_jobs("b".to_string(), Utc::now(), None, jobs);

        assert_eq!(progress.job("job_0000").unwrap().status, JobStatus::Pending);
        assert_eq!(progress.pending(), 1);
        assert_eq!(progress.completed(), 1);
        assert_eq!(progress.in_progress(), 0);
    }

    #[test]
    fn test_requeue_partition() {
        let mut progress = BatchProgress::new("batch_a", &files(4));
        finish(&mut progress, "job_0000", JobStatus::Completed);
        finish(&mut progress, "job_0001", JobStatus::Failed);
        finish(&mut progress, "job_0002", JobStatus::Skipped);

        let mut keep = progress.clone();
        assert_eq!(keep.requeue(&files(4), true, 1), vec!["job_0003"]);
        assert_eq!(keep.requeue(&files(4), true, 2), vec!["job_0001", "job_0003"]);
        assert_eq!(keep.job("job_0001").unwrap().attempts, 1);
        assert!(keep.is_consistent());

        let scheduled = progress.requeue(&files(4), false, 1);
        assert_eq!(scheduled, vec!["job_0000", "job_0002", "job_0003"]);
        assert_eq!(progress.job("job_0000").unwrap().attempts, 0);
        assert_eq!(progress.failed(), 1);
        assert_eq!(progress.pending(), 3);
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_reconcile_appends_new_files() {
        let mut progress = BatchProgress::new("batch_a", &files(2));
        let mut more = files(3);
        more.push(PathBuf::from("/flights/new.mp4"));

        assert_eq!(progress.reconcile(&more), 2);
        assert_eq!(progress.total(), 4);
        assert_eq!(progress.jobs()[3].job_id, "job_0003");
        assert_eq!(progress.jobs()[3].video_path, PathBuf::from("/flights/new.mp4"));
        assert_eq!(progress.reconcile(&more), 0);
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_requeue_ignores_vanished_files() {
        let mut progress = BatchProgress::new("batch_a", &files(3));
        let scheduled = progress.requeue(&files(2), true, 1);
        assert_eq!(scheduled, vec!["job_0000", "job_0001"]);
    }

    #[test]
    fn test_generated_batch_id_shape() {
        let id = BatchProgress::generate_batch_id();
        assert!(id.starts_with("batch_"));
        assert_eq!(id.len(), "batch_20240101_120000".len());
    }
}
