use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info_span;

use crate::config::{BayConfig, FlightConfig};
use crate::error::FlightError;
use crate::extractor::srt::{parse_srt, SrtFrame};
use crate::flight::scanner::{scan_flight_directory, Completeness, FlightDataset, InspectionType};
use crate::sanitize::redact_path;
use crate::telemetry::airdata::{parse_datetime, MediaEvent, MediaEventKind};
use crate::telemetry::{
    consistency_checks, detect_anomalies, parse_airdata, Anomaly, FlightLog, FlightMetrics,
    FlightPath, Grade, PhaseSpan, QualityScore, TelemetrySample,
};

const FEET_PER_METER: f64 = 3.28084;
const HIGH_CONFIDENCE: f64 = 0.8;
const ACCEPTABLE_QUALITY: f64 = 0.7;
/// Confidence of a bay named by the directory when there is no track to check.
const NAME_ONLY_BAY_CONFIDENCE: f64 = 0.5;
const SRT_ASSUMED_SATELLITES: f64 = 10.0;
const SRT_ASSUMED_BATTERY: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySource {
    Airdata,
    Srt,
    /// Nothing usable; metrics are stand-ins.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayMapping {
    pub bay_id: String,
    pub bay_name: String,
    pub bay_type: Option<String>,
    pub inspection_type: Option<InspectionType>,
    pub confidence: f64,
    /// Share of track points inside the bay bounds, in percent.
    pub coverage_percent: f64,
}

impl BayMapping {
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= HIGH_CONFIDENCE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionClassification {
    pub inspection_type: InspectionType,
    pub confidence: f64,
    /// What decided the type: `directory_name`, `bay`, `files` or `default`.
    pub basis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub photos: usize,
    pub videos: usize,
    pub video_seconds: f64,
    pub photo_files: usize,
    pub video_files: usize,
}

/// Automated report for one flight directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightReport {
    pub flight_id: String,
    pub directory: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub telemetry_source: TelemetrySource,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub bay_mapping: Option<BayMapping>,
    pub metrics: FlightMetrics,
    pub path: FlightPath,
    pub inspection: InspectionClassification,
    pub media: MediaSummary,
    pub quality: QualityScore,
    pub grade: Grade,
    pub phases: Vec<PhaseSpan>,
    pub consistency: BTreeMap<String, bool>,
    pub anomalies: Vec<Anomaly>,
    pub completeness: Completeness,
    pub recommendations: Vec<String>,
    pub annotations: BTreeMap<String, Value>,
    /// Fields a person should confirm before the report is filed.
    pub verification_needed: Vec<String>,
    pub processing_seconds: f64,
}

impl FlightReport {
    pub fn bay_id(&self) -> Option<&str> {
        self.bay_mapping.as_ref().map(|m| m.bay_id.as_str())
    }
}

/// Turns flight directories (telemetry, sidecars, media) into reports.
pub struct FlightProcessor {
    config: FlightConfig,
}

impl FlightProcessor {
    pub fn new(config: FlightConfig) -> Self {
        Self { config }
    }

    pub fn process_directory(&self, directory: &Path) -> Result<FlightReport, FlightError> {
        let _span = info_span!("flight", directory = %redact_path(directory)).entered();
        let started = Instant::now();

        let dataset = scan_flight_directory(directory)?;
        let completeness = dataset.completeness();
        if !completeness.is_complete {
            warn!(
                "{} is incomplete: telemetry={} media={} accessible={}",
                directory.display(),
                completeness.has_telemetry,
                completeness.has_media,
                completeness.files_accessible
            );
        }

        let (log, source) = self.load_flight_log(&dataset);
        let telemetry = (source != TelemetrySource::None).then_some(&log);

        let metrics = match telemetry {
            Some(log) => FlightMetrics::from_log(log),
            None => FlightMetrics::default(),
        };
        let quality = QualityScore::assess(telemetry, &metrics);
        let path = FlightPath::from_log(&log);
        let bay_mapping = dataset
            .bay_id
            .as_deref()
            .and_then(|id| self.config.bay(id))
            .map(|bay| map_to_bay(bay, &path));
        let inspection = classify_inspection(&dataset, bay_mapping.as_ref());
        let anomalies = detect_anomalies(telemetry, &metrics);
        let consistency = telemetry.map(consistency_checks).unwrap_or_default();

        let mut report = FlightReport {
            flight_id: log.flight_id.clone(),
            directory: directory.to_path_buf(),
            generated_at: Utc::now(),
            telemetry_source: source,
            started_at: telemetry.and_then(FlightLog::start),
            ended_at: telemetry.and_then(FlightLog::end),
            media: summarize_media(&log.media_events, &dataset),
            grade: quality.grade(),
            phases: log.phases.clone(),
            recommendations: dataset.recommendations(),
            bay_mapping,
            metrics,
            path,
            inspection,
            quality,
            consistency,
            anomalies,
            completeness,
            annotations: BTreeMap::new(),
            verification_needed: Vec::new(),
            processing_seconds: 0.0,
        };
        report.annotations = annotations(&report);
        report.verification_needed = verification_needed(&report);
        report.processing_seconds = started.elapsed().as_secs_f64();

        info!(
            "Flight {} graded {} ({:.2}) in {:.2}s",
            report.flight_id, report.grade, report.quality.overall, report.processing_seconds
        );
        Ok(report)
    }

    /// Reports for every subdirectory that holds telemetry or media.
    /// Directories that fail are logged and left out; a parent with no such
    /// subdirectory is an error.
    pub fn process_batch_directories(
        &self,
        parent: &Path,
    ) -> Result<Vec<FlightReport>, FlightError> {
        if !parent.is_dir() {
            return Err(FlightError::DirectoryNotFound(parent.to_path_buf()));
        }

        let mut candidates: Vec<PathBuf> = std::fs::read_dir(parent)
            .map_err(|_| FlightError::DirectoryNotFound(parent.to_path_buf()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .filter(|path| {
                scan_flight_directory(path)
                    .map(|dataset| dataset.has_flight_data())
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();
        if candidates.is_empty() {
            return Err(FlightError::NoFlights(parent.to_path_buf()));
        }
        info!("Found {} flight directories under {}", candidates.len(), parent.display());

        let reports: Vec<FlightReport> = candidates
            .iter()
            .filter_map(|dir| match self.process_directory(dir) {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Failed to process {}: {}", dir.display(), e);
                    None
                }
            })
            .collect();

        info!(
            "Processed {}/{} flight directories",
            reports.len(),
            candidates.len()
        );
        Ok(reports)
    }

    /// Airdata logs first, then SRT sidecars, then an empty stand-in.
    fn load_flight_log(&self, dataset: &FlightDataset) -> (FlightLog, TelemetrySource) {
        let logs: Vec<FlightLog> = dataset
            .airdata_files
            .iter()
            .filter_map(|path| {
                parse_airdata(path)
                    .map_err(|e| error!("Skipping flight log: {}", e))
                    .ok()
            })
            .collect();
        let srt_clips: Vec<(PathBuf, Vec<TelemetrySample>)> = dataset
            .srt_files
            .iter()
            .filter_map(|path| match std::fs::read_to_string(path) {
                Ok(content) => Some((path.clone(), samples_from_frames(&parse_srt(&content)))),
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    None
                }
            })
            .filter(|(_, samples)| !samples.is_empty())
            .collect();

        let (mut log, source) = match FlightLog::merge(logs) {
            Some(log) => (log, TelemetrySource::Airdata),
            None if !srt_clips.is_empty() => {
                let sources = srt_clips.iter().map(|(p, _)| p.clone()).collect();
                let samples = srt_clips.iter().flat_map(|(_, s)| s.clone()).collect();
                let mut log = FlightLog::from_samples("srt", sources, samples);
                let stamp = log
                    .start()
                    .map(|s| s.format("%Y%m%d_%H%M").to_string())
                    .unwrap_or_default();
                log.flight_id = format!("srt_{}_{}", bay_label(dataset), stamp);
                (log, TelemetrySource::Srt)
            }
            None => {
                let id = format!(
                    "minimal_{}_{}",
                    bay_label(dataset),
                    Utc::now().format("%Y%m%d_%H%M")
                );
                let sources = vec![dataset.directory.clone()];
                (FlightLog::from_samples(id, sources, Vec::new()), TelemetrySource::None)
            }
        };

        // Sidecars describe clips the Airdata flags may already cover.
        let has_video_events = log
            .media_events
            .iter()
            .any(|e| e.kind != MediaEventKind::Photo);
        if !has_video_events {
            for (_, samples) in &srt_clips {
                log.media_events.extend(clip_events(samples));
            }
            log.media_events.sort_by_key(|e| e.recorded_at);
        }

        (log, source)
    }
}

fn bay_label(dataset: &FlightDataset) -> &str {
    dataset.bay_id.as_deref().unwrap_or("unknown")
}

/// Sidecar frames as telemetry. Speed, battery and satellites are not in
/// the sidecar and get neutral values.
fn samples_from_frames(frames: &[SrtFrame]) -> Vec<TelemetrySample> {
    frames
        .iter()
        .filter_map(|frame| {
            let recorded_at = frame.recorded_at.as_deref().and_then(parse_datetime)?;
            let mut sample = TelemetrySample::at(recorded_at, frame.latitude()?, frame.longitude()?);
            let altitude = frame.altitude().map(|m| m * FEET_PER_METER);
            sample.altitude_feet = altitude;
            sample.height_feet = altitude;
            sample.speed_mph = Some(0.0);
            sample.satellites = Some(SRT_ASSUMED_SATELLITES);
            sample.battery_percent = Some(SRT_ASSUMED_BATTERY);
            Some(sample)
        })
        .collect()
}

fn clip_events(samples: &[TelemetrySample]) -> Vec<MediaEvent> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Vec::new();
    };
    let event = |kind, sample: &TelemetrySample| MediaEvent {
        kind,
        recorded_at: sample.recorded_at,
        latitude: sample.latitude,
        longitude: sample.longitude,
        altitude_feet: sample.altitude_feet,
        satellites: None,
        duration_seconds: None,
    };

    let mut end = event(MediaEventKind::VideoEnd, last);
    end.duration_seconds =
        Some((last.recorded_at - first.recorded_at).num_milliseconds().max(0) as f64 / 1000.0);
    vec![event(MediaEventKind::VideoStart, first), end]
}

pub fn map_to_bay(bay: &BayConfig, path: &FlightPath) -> BayMapping {
    let (coverage_percent, confidence) = if path.points.is_empty() {
        (0.0, NAME_ONLY_BAY_CONFIDENCE)
    } else {
        let inside = path
            .points
            .iter()
            .filter(|p| bay.bounds.contains(p.latitude, p.longitude))
            .count();
        let coverage = inside as f64 / path.points.len() as f64 * 100.0;
        (coverage, (coverage / 100.0).min(1.0))
    };

    BayMapping {
        bay_id: bay.id.clone(),
        bay_name: bay.display_name(),
        bay_type: bay.bay_type.clone(),
        inspection_type: bay.inspection_types.first().copied(),
        confidence,
        coverage_percent,
    }
}

pub fn classify_inspection(
    dataset: &FlightDataset,
    bay: Option<&BayMapping>,
) -> InspectionClassification {
    let (inspection_type, confidence, basis) =
        if let Some(kind) = dataset.inspection_type {
            (kind, 0.8, "directory_name")
        } else if let Some(kind) = bay.and_then(|b| b.inspection_type) {
            (kind, 0.7, "bay")
        } else if let Some(kind) = dataset.inferred_inspection() {
            (kind, 0.6, "files")
        } else {
            (InspectionType::Survey, 0.5, "default")
        };

    InspectionClassification {
        inspection_type,
        confidence,
        basis: basis.to_string(),
    }
}

fn summarize_media(events: &[MediaEvent], dataset: &FlightDataset) -> MediaSummary {
    let count = |kind: MediaEventKind| events.iter().filter(|e| e.kind == kind).count();
    MediaSummary {
        photos: count(MediaEventKind::Photo),
        videos: count(MediaEventKind::VideoEnd),
        video_seconds: events.iter().filter_map(|e| e.duration_seconds).sum(),
        photo_files: dataset.photo_count(),
        video_files: dataset.video_count(),
    }
}

fn annotations(report: &FlightReport) -> BTreeMap<String, Value> {
    let mut annotations = BTreeMap::from([
        (
            "flight_duration_minutes".to_string(),
            json!(report.metrics.duration_seconds / 60.0),
        ),
        (
            "max_altitude_ft".to_string(),
            json!(report.metrics.max_altitude_feet),
        ),
        (
            "total_distance_miles".to_string(),
            json!(report.metrics.total_distance_miles),
        ),
        (
            "media_captured".to_string(),
            json!({
                "photos": report.media.photos,
                "videos": report.media.videos,
                "video_duration_minutes": report.media.video_seconds / 60.0,
            }),
        ),
        ("flight_pattern".to_string(), json!(report.path.pattern())),
        ("quality_grade".to_string(), json!(report.grade.as_str())),
        ("anomalies_detected".to_string(), json!(report.anomalies.len())),
        (
            "processing_timestamp".to_string(),
            json!(report.generated_at.to_rfc3339()),
        ),
    ]);

    if let Some(bay) = &report.bay_mapping {
        annotations.insert(
            "bay_identification".to_string(),
            json!({
                "bay_id": bay.bay_id,
                "confidence": bay.confidence,
                "coverage_percent": bay.coverage_percent,
            }),
        );
    }
    annotations
}

fn verification_needed(report: &FlightReport) -> Vec<String> {
    let mut fields = Vec::new();
    if !report
        .bay_mapping
        .as_ref()
        .is_some_and(BayMapping::is_high_confidence)
    {
        fields.push("bay_identification");
    }
    if report.inspection.confidence < HIGH_CONFIDENCE {
        fields.push("inspection_type");
    }
    if report.quality.overall < ACCEPTABLE_QUALITY {
        fields.push("flight_quality_assessment");
    }
    if !report.anomalies.is_empty() {
        fields.push("anomaly_review");
    }
    fields.into_iter().map(str::to_string).collect()
}
