pub mod error;
pub mod runner;

pub use error::PipelineError;
pub use runner::{analyze_file, JobOutput, JobRunner, Pipeline};
