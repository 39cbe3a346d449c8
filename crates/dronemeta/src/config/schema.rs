use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flight::InspectionType;
use crate::models::MissionType;
use crate::telemetry::GeoBounds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub flight: FlightConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Seconds allowed for one attempt (extract, classify, write outputs).
    #[serde(default = "default_timeout")]
    pub timeout_per_video: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff in seconds; attempt `k` waits `retry_delay * k` before the next.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default = "default_save_interval")]
    pub save_progress_interval: usize,
    #[serde(default = "default_true")]
    pub enable_progress_file: bool,
    #[serde(default = "default_progress_file_name")]
    pub progress_file_name: String,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    #[serde(default = "default_max_error_percentage")]
    pub max_error_percentage: f64,
    #[serde(default = "default_breaker_grace_jobs")]
    pub breaker_grace_jobs: usize,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default = "default_true")]
    pub enable_resume: bool,
    #[serde(default = "default_true")]
    pub skip_completed: bool,
}

fn default_max_workers() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_timeout() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_save_interval() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_progress_file_name() -> String {
    "batch_progress.json".to_string()
}

fn default_max_error_percentage() -> f64 {
    50.0
}

fn default_breaker_grace_jobs() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout_per_video: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            save_progress_interval: default_save_interval(),
            enable_progress_file: true,
            progress_file_name: default_progress_file_name(),
            continue_on_error: true,
            max_error_percentage: default_max_error_percentage(),
            breaker_grace_jobs: default_breaker_grace_jobs(),
            overwrite_existing: false,
            enable_resume: true,
            skip_completed: true,
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_per_video)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay.max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Json,
    Csv,
    Thumbnail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,
    /// Copy each batch's outputs into per-mission folders afterwards.
    #[serde(default)]
    pub organize_by_mission: bool,
    #[serde(default = "default_organized_directory")]
    pub organized_directory: PathBuf,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("dronemeta-output")
}

fn default_organized_directory() -> PathBuf {
    PathBuf::from("organized")
}

fn default_formats() -> Vec<OutputFormat> {
    vec![
        OutputFormat::Markdown,
        OutputFormat::Json,
        OutputFormat::Csv,
        OutputFormat::Thumbnail,
    ]
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            formats: default_formats(),
            organize_by_mission: false,
            organized_directory: default_organized_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Seek position in seconds.
    #[serde(default = "default_thumbnail_timestamp")]
    pub timestamp: f64,
    #[serde(default = "default_thumbnail_width")]
    pub width: u32,
    /// ffmpeg `-q:v` scale, 1 (best) to 31.
    #[serde(default = "default_thumbnail_quality")]
    pub quality: u8,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

fn default_thumbnail_timestamp() -> f64 {
    3.0
}

fn default_thumbnail_width() -> u32 {
    640
}

fn default_thumbnail_quality() -> u8 {
    2
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            timestamp: default_thumbnail_timestamp(),
            width: default_thumbnail_width(),
            quality: default_thumbnail_quality(),
            fallback_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_mission")]
    pub default_mission: MissionType,
    #[serde(default = "default_true")]
    pub use_builtin_rules: bool,
    /// Extra rules evaluated after the built-in ones.
    #[serde(default)]
    pub rules: Vec<ClassificationRule>,
    /// File name to forced label.
    #[serde(default)]
    pub manual_overrides: BTreeMap<String, MissionType>,
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_mission() -> MissionType {
    MissionType::Box
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            default_mission: default_mission(),
            use_builtin_rules: true,
            rules: Vec::new(),
            manual_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub name: String,
    pub mission: MissionType,
    #[serde(default)]
    pub filename_patterns: Vec<String>,
    /// Matched against each directory component of the video's parent path.
    #[serde(default)]
    pub directory_patterns: Vec<String>,
    /// Inclusive `[min, max]` in meters.
    #[serde(default)]
    pub altitude_range: Option<(f64, f64)>,
    /// Inclusive `[min, max]` in seconds.
    #[serde(default)]
    pub duration_range: Option<(f64, f64)>,
    #[serde(default)]
    pub vendor_keywords: Vec<String>,
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,
    #[serde(default = "default_pattern_weight")]
    pub pattern_weight: f64,
    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,
}

fn default_base_confidence() -> f64 {
    0.5
}

fn default_pattern_weight() -> f64 {
    0.4
}

fn default_metadata_weight() -> f64 {
    0.3
}

impl ClassificationRule {
    pub fn new(name: impl Into<String>, mission: MissionType) -> Self {
        Self {
            name: name.into(),
            mission,
            filename_patterns: Vec::new(),
            directory_patterns: Vec::new(),
            altitude_range: None,
            duration_range: None,
            vendor_keywords: Vec::new(),
            base_confidence: default_base_confidence(),
            pattern_weight: default_pattern_weight(),
            metadata_weight: default_metadata_weight(),
        }
    }

    pub fn patterns(&self) -> impl Iterator<Item = &String> {
        self.filename_patterns
            .iter()
            .chain(self.directory_patterns.iter())
    }
}

/// Settings for flight-directory reports built from telemetry logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightConfig {
    /// Known bays. A flight whose directory names one of these ids is
    /// mapped onto it.
    #[serde(default)]
    pub bays: Vec<BayConfig>,
}

impl FlightConfig {
    pub fn bay(&self, id: &str) -> Option<&BayConfig> {
        self.bays.iter().find(|bay| bay.id.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bay_type: Option<String>,
    pub bounds: GeoBounds,
    /// Expected inspections, most common first.
    #[serde(default)]
    pub inspection_types: Vec<InspectionType>,
}

impl BayConfig {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Bay {}", self.id))
    }
}
