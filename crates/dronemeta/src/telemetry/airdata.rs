//! Airdata flight-log CSV parsing.
//!
//! Airdata exports one row per telemetry tick (about 10 Hz). Some exports
//! prefix every line with its line number and a pipe (`12|2024-05-01 ...`),
//! which is stripped before the CSV reader sees the text.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

pub const ESSENTIAL_COLUMNS: [&str; 4] = ["datetime(utc)", "latitude", "longitude", "speed(mph)"];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// One telemetry row with a usable position and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub recorded_at: DateTime<Utc>,
    /// Milliseconds since the log started, when the export carries it.
    pub time_ms: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Height above the takeoff point.
    pub height_feet: Option<f64>,
    pub altitude_feet: Option<f64>,
    pub speed_mph: Option<f64>,
    pub mileage_feet: Option<f64>,
    pub battery_percent: Option<f64>,
    pub satellites: Option<f64>,
    pub is_photo: bool,
    pub is_video: bool,
    pub flyc_state: Option<String>,
}

impl TelemetrySample {
    pub fn at(recorded_at: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            recorded_at,
            time_ms: None,
            latitude,
            longitude,
            height_feet: None,
            altitude_feet: None,
            speed_mph: None,
            mileage_feet: None,
            battery_percent: None,
            satellites: None,
            is_photo: false,
            is_video: false,
            flyc_state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaEventKind {
    Photo,
    VideoStart,
    VideoEnd,
}

impl MediaEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaEventKind::Photo => "photo",
            MediaEventKind::VideoStart => "video_start",
            MediaEventKind::VideoEnd => "video_end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEvent {
    pub kind: MediaEventKind,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_feet: Option<f64>,
    pub satellites: Option<f64>,
    /// Set on `VideoEnd`: seconds since the matching start.
    pub duration_seconds: Option<f64>,
}

impl MediaEvent {
    fn from_sample(kind: MediaEventKind, sample: &TelemetrySample) -> Self {
        Self {
            kind,
            recorded_at: sample.recorded_at,
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude_feet: sample.altitude_feet,
            satellites: sample.satellites,
            duration_seconds: None,
        }
    }
}

/// Flight controller states that mark a phase of the flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightPhase {
    #[serde(rename = "Motors_Started")]
    MotorsStarted,
    #[serde(rename = "Assisted_Takeoff")]
    AssistedTakeoff,
    #[serde(rename = "P-GPS")]
    PositionHold,
    Hovering,
    Landing,
    #[serde(rename = "Motors_Stopped")]
    MotorsStopped,
}

impl FlightPhase {
    /// Maps a `flycState` value; other controller states are not phases.
    pub fn from_state(state: &str) -> Option<Self> {
        match state.trim() {
            "Motors_Started" => Some(FlightPhase::MotorsStarted),
            "Assisted_Takeoff" => Some(FlightPhase::AssistedTakeoff),
            "P-GPS" => Some(FlightPhase::PositionHold),
            "Hovering" => Some(FlightPhase::Hovering),
            "Landing" => Some(FlightPhase::Landing),
            "Motors_Stopped" => Some(FlightPhase::MotorsStopped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightPhase::MotorsStarted => "Motors_Started",
            FlightPhase::AssistedTakeoff => "Assisted_Takeoff",
            FlightPhase::PositionHold => "P-GPS",
            FlightPhase::Hovering => "Hovering",
            FlightPhase::Landing => "Landing",
            FlightPhase::MotorsStopped => "Motors_Stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpan {
    pub phase: FlightPhase,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Telemetry of one flight, possibly stitched from several exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightLog {
    pub flight_id: String,
    pub sources: Vec<PathBuf>,
    pub samples: Vec<TelemetrySample>,
    pub media_events: Vec<MediaEvent>,
    pub phases: Vec<PhaseSpan>,
}

impl FlightLog {
    /// Sorts the samples and derives media events and phases from them.
    pub fn from_samples(
        flight_id: impl Into<String>,
        sources: Vec<PathBuf>,
        mut samples: Vec<TelemetrySample>,
    ) -> Self {
        samples.sort_by(|a, b| {
            a.recorded_at.cmp(&b.recorded_at).then_with(|| {
                a.time_ms
                    .partial_cmp(&b.time_ms)
                    .unwrap_or(Ordering::Equal)
            })
        });
        let media_events = media_events(&samples);
        let phases = flight_phases(&samples);
        Self {
            flight_id: flight_id.into(),
            sources,
            samples,
            media_events,
            phases,
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.recorded_at)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.recorded_at)
    }

    pub fn duration_seconds(&self) -> f64 {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    /// Stitches several logs of the same flight together. The id of the
    /// earliest log wins.
    pub fn merge(logs: Vec<FlightLog>) -> Option<FlightLog> {
        let flight_id = logs
            .iter()
            .filter_map(|log| log.start().map(|start| (start, &log.flight_id)))
            .min_by_key(|(start, _)| *start)
            .map(|(_, id)| id.clone())?;

        let mut sources = Vec::new();
        let mut samples = Vec::new();
        for log in logs {
            sources.extend(log.sources);
            samples.extend(log.samples);
        }
        Some(FlightLog::from_samples(flight_id, sources, samples))
    }
}

pub fn parse_airdata(path: &Path) -> Result<FlightLog, TelemetryError> {
    let content = std::fs::read_to_string(path).map_err(|e| TelemetryError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_airdata_str(path, &content)
}

/// Parses export text; `path` names the log in errors and seeds the flight id.
pub fn parse_airdata_str(path: &Path, content: &str) -> Result<FlightLog, TelemetryError> {
    let text = strip_line_numbers(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let csv_error = |source: csv::Error| TelemetryError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers: HashMap<String, usize> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();

    let missing: Vec<&str> = ESSENTIAL_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(TelemetryError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing.join(", "),
        });
    }

    let column = |name: &str| headers.get(name).copied();
    let columns = Columns {
        datetime: column("datetime(utc)"),
        time_ms: column("time(millisecond)"),
        latitude: column("latitude"),
        longitude: column("longitude"),
        height: column("height_above_takeoff(feet)"),
        altitude: column("altitude(feet)"),
        speed: column("speed(mph)"),
        mileage: column("mileage(feet)"),
        battery: column("battery_percent"),
        satellites: column("satellites"),
        is_photo: column("isPhoto"),
        is_video: column("isVideo"),
        flyc_state: column("flycState"),
    };
    if columns.is_photo.is_none() && columns.is_video.is_none() {
        warn!("{}: no media event columns", path.display());
    }

    let mut samples = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        match columns.sample(&record) {
            Some(sample) => samples.push(sample),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(
            "{}: dropped {} rows without a position or timestamp",
            path.display(),
            dropped
        );
    }
    if samples.is_empty() {
        return Err(TelemetryError::NoSamples(path.to_path_buf()));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flight")
        .to_string();
    let mut log = FlightLog::from_samples(stem, vec![path.to_path_buf()], samples);
    if let Some(start) = log.start() {
        log.flight_id = format!("{}_{}", log.flight_id, start.format("%Y%m%d_%H%M"));
    }

    info!(
        "Parsed {} samples, {} media events and {} phases from {}",
        log.samples.len(),
        log.media_events.len(),
        log.phases.len(),
        path.display()
    );
    Ok(log)
}

struct Columns {
    datetime: Option<usize>,
    time_ms: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    height: Option<usize>,
    altitude: Option<usize>,
    speed: Option<usize>,
    mileage: Option<usize>,
    battery: Option<usize>,
    satellites: Option<usize>,
    is_photo: Option<usize>,
    is_video: Option<usize>,
    flyc_state: Option<usize>,
}

impl Columns {
    fn sample(&self, record: &csv::StringRecord) -> Option<TelemetrySample> {
        let text = |idx: Option<usize>| idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty());
        let number = |idx: Option<usize>| {
            text(idx)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let flag = |idx: Option<usize>| text(idx).map(parse_flag).unwrap_or(false);

        Some(TelemetrySample {
            recorded_at: text(self.datetime).and_then(parse_datetime)?,
            time_ms: number(self.time_ms),
            latitude: number(self.latitude)?,
            longitude: number(self.longitude)?,
            height_feet: number(self.height),
            altitude_feet: number(self.altitude),
            speed_mph: number(self.speed),
            mileage_feet: number(self.mileage),
            battery_percent: number(self.battery),
            satellites: number(self.satellites),
            is_photo: flag(self.is_photo),
            is_video: flag(self.is_video),
            flyc_state: text(self.flyc_state).map(str::to_string),
        })
    }
}

/// Drops a leading `<digits>|` from every line.
fn strip_line_numbers(content: &str) -> String {
    content
        .lines()
        .map(|line| match line.split_once('|') {
            Some((prefix, rest))
                if !prefix.is_empty() && prefix.trim().bytes().all(|b| b.is_ascii_digit()) =>
            {
                rest
            }
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.parse::<f64>().map(|n| n != 0.0).unwrap_or(false)
}

/// A photo is one event per rising edge of `isPhoto`; a recording runs from
/// the rising to the falling edge of `isVideo`.
fn media_events(samples: &[TelemetrySample]) -> Vec<MediaEvent> {
    let mut events = Vec::new();
    let mut photo_high = false;
    let mut recording: Option<&TelemetrySample> = None;

    for sample in samples {
        if sample.is_photo && !photo_high {
            events.push(MediaEvent::from_sample(MediaEventKind::Photo, sample));
        }
        photo_high = sample.is_photo;

        match (sample.is_video, recording) {
            (true, None) => {
                events.push(MediaEvent::from_sample(MediaEventKind::VideoStart, sample));
                recording = Some(sample);
            }
            (false, Some(start)) => {
                events.push(video_end(start, sample));
                recording = None;
            }
            _ => {}
        }
    }

    if let (Some(start), Some(last)) = (recording, samples.last()) {
        events.push(video_end(start, last));
    }
    events
}

fn video_end(start: &TelemetrySample, end: &TelemetrySample) -> MediaEvent {
    let mut event = MediaEvent::from_sample(MediaEventKind::VideoEnd, end);
    event.duration_seconds =
        Some((end.recorded_at - start.recorded_at).num_milliseconds().max(0) as f64 / 1000.0);
    event
}

fn flight_phases(samples: &[TelemetrySample]) -> Vec<PhaseSpan> {
    let mut spans = Vec::new();
    let mut current: Option<(FlightPhase, DateTime<Utc>)> = None;

    for sample in samples {
        let Some(phase) = sample.flyc_state.as_deref().and_then(FlightPhase::from_state) else {
            continue;
        };
        match current {
            Some((active, _)) if active == phase => {}
            Some((active, start)) => {
                spans.push(PhaseSpan {
                    phase: active,
                    start,
                    end: sample.recorded_at,
                });
                current = Some((phase, sample.recorded_at));
            }
            None => current = Some((phase, sample.recorded_at)),
        }
    }

    if let (Some((phase, start)), Some(last)) = (current, samples.last()) {
        spans.push(PhaseSpan {
            phase,
            start,
            end: last.recorded_at,
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "time(millisecond),datetime(utc),latitude,longitude,height_above_takeoff(feet),speed(mph),mileage(feet),satellites,isPhoto,isVideo,battery_percent,altitude(feet),flycState";

    fn export(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    #[test]
    fn test_parse_basic_export() {
        let csv = export(&[
            "0,2024-05-01 14:30:00.0,37.7749,-122.4194,0,0,0,12,0,0,95,0,Motors_Started",
            "100,2024-05-01 14:30:00.1,37.7750,-122.4195,10,5,50,13,1,0,95,10,P-GPS",
            "200,2024-05-01 14:30:00.2,37.7751,-122.4196,20,6,100,14,0,0,94,20,P-GPS",
        ]);
        let log = parse_airdata_str(Path::new("/logs/May-1st-Flight-Airdata.csv"), &csv).unwrap();

        assert_eq!(log.flight_id, "May-1st-Flight-Airdata_20240501_1430");
        assert_eq!(log.samples.len(), 3);
        assert_eq!(log.samples[1].height_feet, Some(10.0));
        assert_eq!(log.samples[2].battery_percent, Some(94.0));
        assert!((log.duration_seconds() - 0.2).abs() < 1e-9);
        assert_eq!(log.media_events.len(), 1);
        assert_eq!(log.media_events[0].kind, MediaEventKind::Photo);
    }

    #[test]
    fn test_strips_line_number_prefixes() {
        let csv = format!(
            "1|{}\n2|0,2024-05-01 14:30:00,37.7749,-122.4194,0,0,0,12,0,0,95,0,\n3|100,2024-05-01 14:30:01,37.7750,-122.4195,5,1,10,12,0,0,95,5,",
            HEADER
        );
        let log = parse_airdata_str(Path::new("flight.csv"), &csv).unwrap();
        assert_eq!(log.samples.len(), 2);
        assert_eq!(log.samples[0].time_ms, Some(0.0));
    }

    #[test]
    fn test_missing_essential_columns() {
        let result = parse_airdata_str(
            Path::new("bad.csv"),
            "datetime(utc),latitude\n2024-05-01 14:30:00,37.7",
        );
        match result {
            Err(TelemetryError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, "longitude, speed(mph)");
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_rows_without_position_are_dropped() {
        let csv = export(&[
            "0,2024-05-01 14:30:00,,,0,0,0,12,0,0,95,0,",
            "100,not a date,37.7,-122.4,0,0,0,12,0,0,95,0,",
            "200,2024-05-01 14:30:02,37.7,-122.4,0,0,0,12,0,0,95,0,",
        ]);
        let log = parse_airdata_str(Path::new("f.csv"), &csv).unwrap();
        assert_eq!(log.samples.len(), 1);

        let empty = export(&["0,2024-05-01 14:30:00,,,0,0,0,12,0,0,95,0,"]);
        assert!(matches!(
            parse_airdata_str(Path::new("f.csv"), &empty),
            Err(TelemetryError::NoSamples(_))
        ));
    }

    #[test]
    fn test_video_start_and_end_from_flag_edges() {
        let csv = export(&[
            "0,2024-05-01 14:30:00,37.7,-122.4,0,0,0,12,0,0,95,0,",
            "1000,2024-05-01 14:30:01,37.7,-122.4,0,0,0,12,0,1,95,0,",
            "2000,2024-05-01 14:30:02,37.7,-122.4,0,0,0,12,0,1,95,0,",
            "5000,2024-05-01 14:30:05,37.7,-122.4,0,0,0,12,0,0,95,0,",
            "6000,2024-05-01 14:30:06,37.7,-122.4,0,0,0,12,0,true,95,0,",
            "8000,2024-05-01 14:30:08,37.7,-122.4,0,0,0,12,0,1,95,0,",
        ]);
        let log = parse_airdata_str(Path::new("f.csv"), &csv).unwrap();
        let kinds: Vec<_> = log.media_events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MediaEventKind::VideoStart,
                MediaEventKind::VideoEnd,
                MediaEventKind::VideoStart,
                MediaEventKind::VideoEnd,
            ]
        );
        assert_eq!(log.media_events[1].duration_seconds, Some(4.0));
        // Still recording when the log ends.
        assert_eq!(log.media_events[3].duration_seconds, Some(2.0));
    }

    #[test]
    fn test_phases_follow_controller_state() {
        let csv = export(&[
            "0,2024-05-01 14:30:00,37.7,-122.4,0,0,0,12,0,0,95,0,Motors_Started",
            "1000,2024-05-01 14:30:01,37.7,-122.4,0,0,0,12,0,0,95,0,GoHome",
            "2000,2024-05-01 14:30:02,37.7,-122.4,0,0,0,12,0,0,95,0,P-GPS",
            "3000,2024-05-01 14:30:03,37.7,-122.4,0,0,0,12,0,0,95,0,P-GPS",
            "4000,2024-05-01 14:30:04,37.7,-122.4,0,0,0,12,0,0,95,0,Landing",
            "5000,2024-05-01 14:30:05,37.7,-122.4,0,0,0,12,0,0,95,0,",
        ]);
        let log = parse_airdata_str(Path::new("f.csv"), &csv).unwrap();
        let phases: Vec<_> = log.phases.iter().map(|p| p.phase).collect();
        assert_eq!(
            phases,
            vec![
                FlightPhase::MotorsStarted,
                FlightPhase::PositionHold,
                FlightPhase::Landing
            ]
        );
        assert_eq!(log.phases[0].end, log.phases[1].start);
        assert_eq!(log.phases[2].end, log.end().unwrap());
    }

    #[test]
    fn test_merge_orders_samples_and_keeps_earliest_id() {
        let later = export(&["0,2024-05-01 15:00:00,37.7,-122.4,0,0,0,12,0,0,80,0,"]);
        let earlier = export(&["0,2024-05-01 14:00:00,37.7,-122.4,0,0,0,12,0,0,95,0,"]);
        let merged = FlightLog::merge(vec![
            parse_airdata_str(Path::new("b.csv"), &later).unwrap(),
            parse_airdata_str(Path::new("a.csv"), &earlier).unwrap(),
        ])
        .unwrap();

        assert_eq!(merged.flight_id, "a_20240501_1400");
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(merged.samples[0].battery_percent, Some(95.0));
        assert!(FlightLog::merge(Vec::new()).is_none());
    }

    #[test]
    fn test_datetime_formats() {
        assert!(parse_datetime("2024-05-01 14:30:00").is_some());
        assert!(parse_datetime("2024-05-01T14:30:00.250").is_some());
        assert!(parse_datetime("2024/05/01 14:30:00").is_some());
        assert!(parse_datetime("2024-05-01T14:30:00Z").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
