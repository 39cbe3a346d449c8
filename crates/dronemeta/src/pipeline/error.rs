use thiserror::Error;

/// Failure of a single attempt. The display text before the first colon is
/// the error type used when failures are grouped in batch summaries.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Output generation failed: {0}")]
    Output(#[from] crate::error::FormatError),

    #[error("Timeout: attempt exceeded {seconds}s")]
    Timeout { seconds: f64 },

    #[error("Worker panic: attempt thread terminated without a result")]
    Panicked,

    #[error("Spawn failed: {0}")]
    Spawn(String),
}
