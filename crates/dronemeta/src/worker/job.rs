use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{file_name_of, VideoAnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Completed, failed or skipped.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One video's worth of work. The id is positional (`job_0000`, ...) and
/// stays with the file across resumed runs.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub video_path: PathBuf,
    pub status: JobStatus,
    pub attempts: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub error_message: Option<String>,
    pub output_files: Vec<PathBuf>,
    /// Analysis of a successful run. Kept in memory only.
    pub result: Option<VideoAnalysisResult>,
}

impl Job {
    pub fn new(index: usize, video_path: PathBuf) -> Self {
        Self {
            job_id: Self::id_for(index),
            video_path,
            status: JobStatus::Pending,
            attempts: 0,
            start_time: None,
            end_time: None,
            error_message: None,
            output_files: Vec::new(),
            result: None,
        }
    }

    pub fn id_for(index: usize) -> String {
        format!("job_{:04}", index)
    }

    /// Numeric position encoded in the id, if it has the usual shape.
    pub fn index(&self) -> Option<usize> {
        self.job_id.strip_prefix("job_")?.parse().ok()
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.video_path)
    }

    pub fn path(&self) -> &Path {
        &self.video_path
    }

    /// Wall time between start and end, in seconds.
    pub fn processing_time(&self) -> Option<f64> {
        let (start, end) = (self.start_time?, self.end_time?);
        let micros = (end - start).num_microseconds()?;
        Some(micros as f64 / 1_000_000.0)
    }

    /// Back to pending with a fresh attempt budget.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.start_time = None;
        self.end_time = None;
        self.error_message = None;
        self.output_files.clear();
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_ids_are_positional() {
        let job = Job::new(7, PathBuf::from("/flights/DJI_0007.MP4"));
        assert_eq!(job.job_id, "job_0007");
        assert_eq!(job.index(), Some(7));
        assert_eq!(job.file_name(), "DJI_0007.MP4");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(Job::id_for(12345), "job_12345");
    }

    #[test]
    fn test_processing_time() {
        let mut job = Job::new(0, PathBuf::from("a.mp4"));
        assert_eq!(job.processing_time(), None);

        let start = Utc::now();
        job.start_time = Some(start);
        job.end_time = Some(start + Duration::milliseconds(2500));
        assert_eq!(job.processing_time(), Some(2.5));
    }

    #[test]
    fn test_reset() {
        let mut job = Job::new(0, PathBuf::from("a.mp4"));
        job.status = JobStatus::Completed;
        job.attempts = 2;
        job.start_time = Some(Utc::now());
        job.error_message = Some("Timeout: attempt exceeded 1s".to_string());
        job.output_files.push(PathBuf::from("a.mp4.json"));

        job.reset();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.start_time.is_none());
        assert!(job.error_message.is_none());
        assert!(job.output_files.is_empty());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Skipped).unwrap(),
            "\"skipped\""
        );
        let status: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert!(!status.is_finished());
        assert!(JobStatus::Failed.is_finished());
    }
}
