//! Data types shared by the extractor, classifier and formatters.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basic facts about a video file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFile {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_seconds: Option<f64>,
    /// Recording time as reported by the container or sidecar, verbatim.
    pub created_at: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl VideoFile {
    pub fn from_path(path: &Path) -> Self {
        Self {
            filename: file_name_of(path),
            path: path.to_path_buf(),
            size_bytes: 0,
            duration_seconds: None,
            created_at: None,
            extracted_at: Utc::now(),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Duration as `MM:SS` (or `H:MM:SS` past an hour).
    pub fn duration_formatted(&self) -> Option<String> {
        let total = self.duration_seconds?.max(0.0).round() as u64;
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
        if hours > 0 {
            Some(format!("{}:{:02}:{:02}", hours, minutes, seconds))
        } else {
            Some(format!("{:02}:{:02}", minutes, seconds))
        }
    }

    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filename.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSpecs {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container_format: Option<String>,
    pub framerate: Option<f64>,
    pub bitrate: Option<u64>,
}

impl TechnicalSpecs {
    pub fn resolution_string(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }

    pub fn is_4k(&self) -> bool {
        self.width.is_some_and(|w| w >= 3840)
    }

    pub fn is_hd(&self) -> bool {
        self.height.is_some_and(|h| h >= 720)
    }

    /// Coarse quality bucket used by the tabular resolution dimension.
    pub fn quality_category(&self) -> &'static str {
        match self.width {
            Some(w) if w >= 3840 => "4K",
            Some(w) if w >= 1920 => "Full HD",
            Some(w) if w >= 1280 => "HD",
            Some(_) => "Standard",
            None => "Unknown",
        }
    }

    /// Fills every empty field from `other`, leaving populated fields untouched.
    pub fn fill_missing(&mut self, other: TechnicalSpecs) {
        self.width = self.width.or(other.width);
        self.height = self.height.or(other.height);
        self.video_codec = self.video_codec.take().or(other.video_codec);
        self.audio_codec = self.audio_codec.take().or(other.audio_codec);
        self.container_format = self.container_format.take().or(other.container_format);
        self.framerate = self.framerate.or(other.framerate);
        self.bitrate = self.bitrate.or(other.bitrate);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_meters: Option<f64>,
    /// Which probe produced the fix (`ffprobe`, `srt`).
    pub source: String,
}

impl GpsFix {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionType {
    Box,
    Safety,
}

impl MissionType {
    pub const ALL: [MissionType; 2] = [MissionType::Box, MissionType::Safety];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionType::Box => "box",
            MissionType::Safety => "safety",
        }
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "box" => Ok(MissionType::Box),
            "safety" => Ok(MissionType::Safety),
            other => Err(format!("unknown mission type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionData {
    pub mission_type: MissionType,
    pub confidence: f64,
    /// `rule:<name>`, `default_<label>` or `manual_override`.
    pub method: String,
    pub bay_designation: Option<String>,
    pub max_altitude: Option<f64>,
    pub flight_distance_miles: Option<f64>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl MissionData {
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.7
    }
}

/// Everything known about one video after extraction and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysisResult {
    pub video: VideoFile,
    pub specs: TechnicalSpecs,
    pub gps: Option<GpsFix>,
    pub mission: Option<MissionData>,
    #[serde(default)]
    pub vendor_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub extraction_success: bool,
}

impl VideoAnalysisResult {
    pub fn summary_line(&self) -> String {
        let mut parts = vec![self.video.filename.clone()];
        if let Some(res) = self.specs.resolution_string() {
            parts.push(res);
        }
        if let Some(duration) = self.video.duration_formatted() {
            parts.push(duration);
        }
        if let Some(mission) = &self.mission {
            parts.push(format!("{} ({:.0}%)", mission.mission_type, mission.confidence * 100.0));
        }
        parts.join(" | ")
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
