pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod flight;
pub mod formatter;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod storage;
pub mod telemetry;
pub mod tools;
pub mod worker;

pub use batch::{BatchProcessor, BatchProgress, BatchSummary};
pub use classifier::MissionClassifier;
pub use config::{load_config, Config};
pub use error::{
    BatchError, ConfigError, DronemetaError, ExtractError, FlightError, FormatError, Result,
    TelemetryError, WorkerError,
};
pub use extractor::MetadataExtractor;
pub use flight::{FlightProcessor, FlightReport};
pub use models::{MissionType, VideoAnalysisResult};
pub use pipeline::{JobRunner, Pipeline, PipelineError};
