use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DronemetaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Output error: {0}")]
    Format(#[from] FormatError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Flight error: {0}")]
    Flight(#[from] FlightError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid classification rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} is not available: {message}")]
    ToolUnavailable { tool: &'static str, message: String },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: &'static str, message: String },

    #[error("Failed to parse {tool} output: {message}")]
    ParseOutput { tool: &'static str, message: String },

    #[error("No subtitle sidecar next to '{0}'")]
    NoSidecar(PathBuf),
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {reason}")]
    WriteFile { path: PathBuf, reason: String },

    #[error("{formatter} rendering failed: {message}")]
    Render {
        formatter: &'static str,
        message: String,
    },

    #[error("Thumbnail generation failed for '{video}': {message}")]
    Thumbnail { video: String, message: String },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No video files found in input paths")]
    NoInput,

    #[error("Invalid batch configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker pool failed: {0}")]
    Worker(#[from] WorkerError),

    #[error("Failed to write checkpoint '{path}': {source}")]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode checkpoint: {0}")]
    CheckpointEncode(#[from] serde_json::Error),

    #[error("Failed to read checkpoint '{path}': {reason}")]
    CheckpointRead { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to read flight log '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed flight log '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Flight log '{path}' is missing essential columns: {columns}")]
    MissingColumns { path: PathBuf, columns: String },

    #[error("Flight log '{0}' has no rows with a position and timestamp")]
    NoSamples(PathBuf),
}

#[derive(Error, Debug)]
pub enum FlightError {
    #[error("Flight directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No flight directories with telemetry or media under {0}")]
    NoFlights(PathBuf),
}

pub type Result<T> = std::result::Result<T, DronemetaError>;
