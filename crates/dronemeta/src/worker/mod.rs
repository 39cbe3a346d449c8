pub mod executor;
pub mod job;
pub mod pool;
pub mod scanner;

pub use executor::{execute_job, RetryPolicy};
pub use job::{Job, JobStatus};
pub use pool::WorkerPool;
pub use scanner::{is_video_file, VideoScanner};
