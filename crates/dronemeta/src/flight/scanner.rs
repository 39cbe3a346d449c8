use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::FlightError;

/// Above this many media files a directory is worth sampling first.
const LARGE_MEDIA_COUNT: usize = 50;
/// More sidecars than this suggests a close, multi-clip inspection.
const DETAILED_SRT_COUNT: usize = 5;

fn case_insensitive(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build().unwrap())
        .collect()
}

static AIRDATA_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| case_insensitive(&[r"Flight-Airdata\.csv$", r"-airdata\.csv$"]));
static SRT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| case_insensitive(&[r"\.srt$"]));
static MEDIA_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| case_insensitive(&[r"\.(mp4|mov|avi|jpg|jpeg|dng)$"]));
static FLIGHT_RECORD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    case_insensitive(&[
        r"^FlightRecord_.*\.txt$",
        r"^flight_log.*\.txt$",
        r"flight.*record.*\.txt$",
    ])
});

/// Bay names: `8B-7F`, `8D`, `bay_8B-7F`, `A1`. Only the `bay` prefix
/// ignores case, so ordinary lowercase folder names never read as bays.
static BAY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^([0-9A-F]{1,2}[A-F]-[0-9A-F]{1,2}[A-F])$",
        r"^([0-9A-F]{1,2}[A-F])$",
        r"^(?i:bay)[_-]?([a-zA-Z0-9\-]+)$",
        r"^([A-Z]\d+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const INSPECTION_INDICATORS: [(InspectionType, &[&str]); 5] = [
    (InspectionType::Angles, &["angles", "angle", "angular"]),
    (InspectionType::Detailed, &["detail", "detailed", "close", "closeup"]),
    (InspectionType::Overview, &["overview", "general", "wide", "survey"]),
    (InspectionType::Perimeter, &["perimeter", "boundary", "edge"]),
    (InspectionType::Emergency, &["emergency", "urgent", "incident"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionType {
    Overview,
    Detailed,
    Angles,
    Survey,
    Perimeter,
    Emergency,
}

impl InspectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionType::Overview => "overview",
            InspectionType::Detailed => "detailed",
            InspectionType::Angles => "angles",
            InspectionType::Survey => "survey",
            InspectionType::Perimeter => "perimeter",
            InspectionType::Emergency => "emergency",
        }
    }
}

impl fmt::Display for InspectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Airdata,
    Srt,
    Media,
    FlightRecord,
}

/// Classifies a file by name. Airdata wins over plain media so that
/// `MP4-...-Flight-Airdata.csv` is read as telemetry.
pub fn classify_file(file_name: &str) -> Option<FileKind> {
    let matches = |patterns: &[Regex]| patterns.iter().any(|re| re.is_match(file_name));
    if matches(&AIRDATA_PATTERNS) {
        Some(FileKind::Airdata)
    } else if matches(&SRT_PATTERNS) {
        Some(FileKind::Srt)
    } else if matches(&MEDIA_PATTERNS) {
        Some(FileKind::Media)
    } else if matches(&FLIGHT_RECORD_PATTERNS) {
        Some(FileKind::FlightRecord)
    } else {
        None
    }
}

pub fn bay_id_from_name(name: &str) -> Option<String> {
    BAY_PATTERNS
        .iter()
        .find_map(|re| re.captures(name))
        .map(|caps| caps[1].to_string())
}

/// First bay name found walking from the directory up to the root.
pub fn identify_bay(directory: &Path) -> Option<String> {
    let found = directory
        .ancestors()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .find_map(bay_id_from_name);
    match &found {
        Some(bay) => info!("Identified bay '{}' from {}", bay, directory.display()),
        None => debug!("No bay name in {}", directory.display()),
    }
    found
}

/// Inspection type named by a path component, if any.
pub fn inspection_from_path(directory: &Path) -> Option<InspectionType> {
    let components: Vec<String> = directory
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .map(str::to_lowercase)
        .collect();

    INSPECTION_INDICATORS
        .iter()
        .find(|(_, indicators)| {
            indicators
                .iter()
                .any(|i| components.iter().any(|c| c.contains(i)))
        })
        .map(|(kind, _)| *kind)
}

/// Everything discovered in one flight directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightDataset {
    pub directory: PathBuf,
    pub airdata_files: Vec<PathBuf>,
    pub srt_files: Vec<PathBuf>,
    pub media_files: Vec<PathBuf>,
    pub flight_record_files: Vec<PathBuf>,
    pub bay_id: Option<String>,
    /// Set only when the directory names its inspection.
    pub inspection_type: Option<InspectionType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub has_telemetry: bool,
    pub has_media: bool,
    pub has_gps_source: bool,
    pub has_bay_id: bool,
    pub has_inspection_type: bool,
    pub files_accessible: bool,
    pub file_access_rate: f64,
    pub is_complete: bool,
}

impl Completeness {
    /// Check name and outcome pairs, in display order.
    pub fn checks(&self) -> [(&'static str, bool); 7] {
        [
            ("has_telemetry", self.has_telemetry),
            ("has_media", self.has_media),
            ("has_gps_source", self.has_gps_source),
            ("has_bay_id", self.has_bay_id),
            ("has_inspection_type", self.has_inspection_type),
            ("files_accessible", self.files_accessible),
            ("is_complete", self.is_complete),
        ]
    }
}

impl FlightDataset {
    fn all_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.airdata_files
            .iter()
            .chain(&self.srt_files)
            .chain(&self.media_files)
            .chain(&self.flight_record_files)
    }

    pub fn has_flight_data(&self) -> bool {
        !self.airdata_files.is_empty() || !self.srt_files.is_empty() || !self.media_files.is_empty()
    }

    pub fn video_count(&self) -> usize {
        self.media_files
            .iter()
            .filter(|p| has_extension(p, &["mp4", "mov", "avi"]))
            .count()
    }

    pub fn photo_count(&self) -> usize {
        self.media_files
            .iter()
            .filter(|p| has_extension(p, &["jpg", "jpeg", "dng"]))
            .count()
    }

    /// Inspection type guessed from the files when the directory does not
    /// name one.
    pub fn inferred_inspection(&self) -> Option<InspectionType> {
        if self.srt_files.len() > DETAILED_SRT_COUNT {
            Some(InspectionType::Detailed)
        } else if self.photo_count() > self.video_count() {
            Some(InspectionType::Overview)
        } else {
            None
        }
    }

    pub fn completeness(&self) -> Completeness {
        let total = self.all_files().count();
        let accessible = self
            .all_files()
            .filter(|p| std::fs::metadata(p).is_ok())
            .count();
        let has_telemetry = !self.airdata_files.is_empty() || !self.srt_files.is_empty();
        let has_media = !self.media_files.is_empty();
        let files_accessible = accessible == total;

        Completeness {
            has_telemetry,
            has_media,
            has_gps_source: !self.airdata_files.is_empty(),
            has_bay_id: self.bay_id.is_some(),
            has_inspection_type: self.inspection_type.is_some(),
            files_accessible,
            file_access_rate: accessible as f64 / total.max(1) as f64,
            is_complete: has_telemetry && has_media && files_accessible,
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        let mut advice = Vec::new();
        let completeness = self.completeness();

        if self.airdata_files.is_empty() {
            if self.srt_files.is_empty() {
                advice.push(
                    "No telemetry found. GPS must be recovered from the media by hand.".to_string(),
                );
            } else {
                advice.push(
                    "No Airdata CSV found. Position and timing will come from the SRT sidecars."
                        .to_string(),
                );
            }
        }
        if self.srt_files.is_empty() {
            advice.push("No SRT sidecars found. Camera settings will be unavailable.".to_string());
        }
        if self.bay_id.is_none() {
            advice.push("Bay not detected. Assign the bay by hand.".to_string());
        }
        if self.inspection_type.is_none() {
            advice.push("Inspection type not named. It will be inferred.".to_string());
        }
        if self.airdata_files.len() > 1 {
            advice.push(format!(
                "{} Airdata CSV files found. Their telemetry will be merged.",
                self.airdata_files.len()
            ));
        }
        if self.media_files.len() > LARGE_MEDIA_COUNT {
            advice.push(format!(
                "{} media files found. Consider sampling them for a first pass.",
                self.media_files.len()
            ));
        }
        if !completeness.files_accessible {
            let total = self.all_files().count();
            let missing = total - (completeness.file_access_rate * total as f64).round() as usize;
            advice.push(format!(
                "{} files are inaccessible. Check permissions and paths.",
                missing
            ));
        }

        if advice.is_empty() {
            advice.push("Dataset is complete and ready for processing.".to_string());
        }
        advice
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Walks a flight directory and sorts its files by kind.
pub fn scan_flight_directory(directory: &Path) -> Result<FlightDataset, FlightError> {
    if !directory.is_dir() {
        return Err(FlightError::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut dataset = FlightDataset {
        directory: directory.to_path_buf(),
        ..FlightDataset::default()
    };

    for entry in WalkDir::new(directory).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let bucket = match classify_file(name) {
            Some(FileKind::Airdata) => &mut dataset.airdata_files,
            Some(FileKind::Srt) => &mut dataset.srt_files,
            Some(FileKind::Media) => &mut dataset.media_files,
            Some(FileKind::FlightRecord) => &mut dataset.flight_record_files,
            None => continue,
        };
        bucket.push(entry.into_path());
    }

    dataset.bay_id = identify_bay(directory);
    dataset.inspection_type = inspection_from_path(directory);

    info!(
        "Discovered {} Airdata CSV, {} SRT and {} media files in {}",
        dataset.airdata_files.len(),
        dataset.srt_files.len(),
        dataset.media_files.len(),
        directory.display()
    );
    Ok(dataset)
}
