//! Video metadata extraction.
//!
//! A [`MetadataExtractor`] runs its probes in order against one file and
//! merges their reports field by field: the first probe to supply a value
//! wins. A probe that fails only adds a warning.

pub mod ffprobe;
pub mod srt;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};

use crate::error::ExtractError;
use crate::models::{GpsFix, MissionData, TechnicalSpecs, VideoAnalysisResult, VideoFile};
use crate::sanitize;

pub use ffprobe::FfprobeProbe;
pub use srt::SrtSidecarProbe;

/// Partial metadata produced by one probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub duration_seconds: Option<f64>,
    pub created_at: Option<String>,
    pub specs: TechnicalSpecs,
    pub gps: Option<GpsFix>,
    pub vendor_metadata: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl ProbeReport {
    /// Merges `other` into `self` without overwriting anything already set.
    pub fn merge_from(&mut self, other: ProbeReport) {
        self.duration_seconds = self.duration_seconds.or(other.duration_seconds);
        self.created_at = self.created_at.take().or(other.created_at);
        self.specs.fill_missing(other.specs);
        if self.gps.is_none() {
            self.gps = other.gps;
        }
        for (key, value) in other.vendor_metadata {
            self.vendor_metadata.entry(key).or_insert(value);
        }
        self.warnings.extend(other.warnings);
    }
}

pub trait MetadataProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn probe(&self, path: &Path) -> Result<ProbeReport, ExtractError>;
}

/// Outcome of extracting one file. `success` is false only when the file
/// itself cannot be read.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub success: bool,
    pub video: VideoFile,
    pub specs: TechnicalSpecs,
    pub gps: Option<GpsFix>,
    pub vendor_metadata: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    fn failed(path: &Path, error: String) -> Self {
        Self {
            success: false,
            video: VideoFile::from_path(path),
            specs: TechnicalSpecs::default(),
            gps: None,
            vendor_metadata: BTreeMap::new(),
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn into_analysis(self, mission: Option<MissionData>) -> VideoAnalysisResult {
        VideoAnalysisResult {
            video: self.video,
            specs: self.specs,
            gps: self.gps,
            mission,
            vendor_metadata: self.vendor_metadata,
            errors: self.errors,
            warnings: self.warnings,
            extraction_success: self.success,
        }
    }
}

pub struct MetadataExtractor {
    probes: Vec<Box<dyn MetadataProbe>>,
}

impl MetadataExtractor {
    pub fn new(probes: Vec<Box<dyn MetadataProbe>>) -> Self {
        Self { probes }
    }

    /// ffprobe first, then the DJI subtitle sidecar. ffprobe is killed after
    /// `tool_deadline`.
    pub fn with_default_probes(tool_deadline: Duration) -> Self {
        Self::new(vec![
            Box::new(FfprobeProbe::new().with_deadline(tool_deadline)),
            Box::new(SrtSidecarProbe::new()),
        ])
    }

    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn extract(&self, path: &Path) -> ExtractionReport {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return ExtractionReport::failed(
                    path,
                    format!("Not a regular file: {}", path.display()),
                )
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ExtractionReport::failed(
                    path,
                    ExtractError::FileNotFound(path.to_path_buf()).to_string(),
                )
            }
            Err(e) => {
                return ExtractionReport::failed(
                    path,
                    ExtractError::ReadFile {
                        path: path.to_path_buf(),
                        source: e,
                    }
                    .to_string(),
                )
            }
        };

        let mut merged = ProbeReport::default();
        for probe in &self.probes {
            match probe.probe(path) {
                Ok(report) => {
                    debug!("{} probe succeeded for {}", probe.name(), path.display());
                    merged.merge_from(report);
                }
                Err(e) => {
                    warn!("{} probe failed for {}: {}", probe.name(), path.display(), e);
                    merged.warnings.push(format!("{}: {}", probe.name(), e));
                }
            }
        }

        if let Some(fix) = &merged.gps {
            debug!(
                "{} located near {} ({})",
                sanitize::redact_path(path),
                sanitize::coarse_fix(fix),
                fix.source
            );
        }

        let mut video = VideoFile::from_path(path);
        video.size_bytes = metadata.len();
        video.duration_seconds = merged.duration_seconds;
        video.created_at = merged.created_at;

        ExtractionReport {
            success: true,
            video,
            specs: merged.specs,
            gps: merged.gps,
            vendor_metadata: merged.vendor_metadata,
            errors: Vec::new(),
            warnings: merged.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedProbe {
        name: &'static str,
        report: Option<ProbeReport>,
    }

    impl MetadataProbe for FixedProbe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&self, _path: &Path) -> Result<ProbeReport, ExtractError> {
            self.report.clone().ok_or(ExtractError::ToolUnavailable {
                tool: "fixed",
                message: "not installed".to_string(),
            })
        }
    }

    fn video_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("DJI_0001.MP4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        path
    }

    #[test]
    fn test_first_non_null_wins() {
        let dir = TempDir::new().unwrap();
        let path = video_file(&dir);

        let mut first = ProbeReport {
            duration_seconds: Some(120.0),
            ..Default::default()
        };
        first.specs.width = Some(3840);
        first.vendor_metadata.insert("make".to_string(), "DJI".to_string());

        let mut second = ProbeReport {
            duration_seconds: Some(90.0),
            gps: Some(GpsFix {
                latitude: 37.7749,
                longitude: -122.4194,
                altitude_meters: Some(30.0),
                source: "srt".to_string(),
            }),
            ..Default::default()
        };
        second.specs.width = Some(1920);
        second.specs.height = Some(2160);
        second.vendor_metadata.insert("make".to_string(), "Other".to_string());
        second.vendor_metadata.insert("iso".to_string(), "100".to_string());

        let extractor = MetadataExtractor::new(vec![
            Box::new(FixedProbe { name: "a", report: Some(first) }),
            Box::new(FixedProbe { name: "b", report: Some(second) }),
        ]);
        let report = extractor.extract(&path);

        assert!(report.success);
        assert_eq!(report.video.size_bytes, 2048);
        assert_eq!(report.video.duration_seconds, Some(120.0));
        assert_eq!(report.specs.width, Some(3840));
        assert_eq!(report.specs.height, Some(2160));
        assert!(report.gps.is_some());
        assert_eq!(report.vendor_metadata["make"], "DJI");
        assert_eq!(report.vendor_metadata["iso"], "100");
    }

    #[test]
    fn test_failed_probe_adds_warning() {
        let dir = TempDir::new().unwrap();
        let path = video_file(&dir);

        let extractor = MetadataExtractor::new(vec![Box::new(FixedProbe {
            name: "ffprobe",
            report: None,
        })]);
        let report = extractor.extract(&path);

        assert!(report.success);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("ffprobe:"));
    }

    #[test]
    fn test_missing_file_is_total_failure() {
        let extractor = MetadataExtractor::new(vec![]);
        let report = extractor.extract(Path::new("/nonexistent/flight.mp4"));

        assert!(!report.success);
        assert_eq!(report.video.filename, "flight.mp4");
        assert!(report.errors[0].contains("File not found"));

        let analysis = report.into_analysis(None);
        assert!(!analysis.extraction_success);
    }

    #[test]
    fn test_directory_is_not_a_video() {
        let dir = TempDir::new().unwrap();
        let report = MetadataExtractor::new(vec![]).extract(dir.path());
        assert!(!report.success);
    }
}
