pub mod checkpoint;
pub mod processor;
pub mod progress;
pub mod reporter;
pub mod summary;

pub use checkpoint::{CheckpointStore, JobRecord};
pub use processor::BatchProcessor;
pub use progress::{BatchProgress, StatusCounts};
pub use reporter::{BatchEvent, LogProgress, NoopProgress, ProgressReporter};
pub use summary::{summarize, BatchSummary, FailedJob};
