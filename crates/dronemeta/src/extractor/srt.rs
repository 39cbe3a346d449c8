//! DJI subtitle sidecar (`.SRT`) parsing.
//!
//! DJI aircraft write one subtitle block per frame, carrying camera settings
//! and position as bracketed `key: value` pairs:
//!
//! ```text
//! 1
//! 00:00:00,000 --> 00:00:00,033
//! <font size="28">FrameCnt: 1, DiffTime: 33ms
//! 2023-04-25 10:15:32.123
//! [iso: 100] [shutter: 1/1000.0] [fnum: 2.8] [ev: 0] [latitude: 37.774900] [longitude: -122.419400] [rel_alt: 30.200 abs_alt: 85.100] </font>
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractError;
use crate::extractor::{MetadataProbe, ProbeReport};
use crate::models::GpsFix;

const PROBE_NAME: &str = "srt";

static RE_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").unwrap());
static RE_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]+)\s*:\s*([^\s\[\]]+)").unwrap());
static RE_TIMECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .unwrap()
});
static RE_DATETIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap());

const CAMERA_KEYS: &[&str] = &["iso", "shutter", "fnum", "ev", "ct", "color_md", "focal_len"];
const ALTITUDE_KEYS: &[&str] = &["rel_alt", "altitude", "abs_alt"];

/// One subtitle block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SrtFrame {
    pub end_seconds: Option<f64>,
    pub recorded_at: Option<String>,
    pub values: BTreeMap<String, String>,
}

impl SrtFrame {
    fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key)?.parse().ok()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.number("latitude")
    }

    /// Some firmware spells it `longtitude`.
    pub fn longitude(&self) -> Option<f64> {
        self.number("longitude").or_else(|| self.number("longtitude"))
    }

    pub fn altitude(&self) -> Option<f64> {
        ALTITUDE_KEYS.iter().find_map(|k| self.number(k))
    }
}

pub fn parse_srt(content: &str) -> Vec<SrtFrame> {
    let normalized = content.replace("\r\n", "\n");
    let mut frames = Vec::new();

    for block in normalized.split("\n\n") {
        let mut frame = SrtFrame::default();

        for line in block.lines().map(str::trim) {
            if let Some(caps) = RE_TIMECODE.captures(line) {
                let part = |i: usize| caps[i].parse::<f64>().unwrap_or(0.0);
                frame.end_seconds =
                    Some(part(5) * 3600.0 + part(6) * 60.0 + part(7) + part(8) / 1000.0);
                continue;
            }
            if RE_DATETIME.is_match(line) {
                frame.recorded_at = Some(line.to_string());
                continue;
            }
            for bracket in RE_BRACKET.captures_iter(line) {
                for pair in RE_PAIR.captures_iter(&bracket[1]) {
                    frame
                        .values
                        .insert(pair[1].to_ascii_lowercase(), pair[2].to_string());
                }
            }
        }

        if frame.end_seconds.is_some() || !frame.values.is_empty() {
            frames.push(frame);
        }
    }

    frames
}

/// Builds a probe report from parsed frames: position from the first frame
/// with a usable fix, camera settings from the first frame carrying them.
pub fn report_from_frames(frames: &[SrtFrame]) -> ProbeReport {
    let mut report = ProbeReport::default();
    if frames.is_empty() {
        report
            .warnings
            .push("srt: sidecar contains no frames".to_string());
        return report;
    }

    report.gps = frames.iter().find_map(|frame| {
        let fix = GpsFix {
            latitude: frame.latitude()?,
            longitude: frame.longitude()?,
            altitude_meters: frame.altitude(),
            source: PROBE_NAME.to_string(),
        };
        fix.is_valid().then_some(fix)
    });

    if let Some(settings) = frames
        .iter()
        .find(|f| CAMERA_KEYS.iter().any(|k| f.values.contains_key(*k)))
    {
        for key in CAMERA_KEYS {
            if let Some(value) = settings.values.get(*key) {
                report.vendor_metadata.insert(key.to_string(), value.clone());
            }
        }
    }

    report.created_at = frames.iter().find_map(|f| f.recorded_at.clone());
    report.duration_seconds = frames.iter().filter_map(|f| f.end_seconds).reduce(f64::max);

    let max_altitude = frames.iter().filter_map(SrtFrame::altitude).reduce(f64::max);
    if let Some(max) = max_altitude {
        report
            .vendor_metadata
            .insert("srt_max_altitude".to_string(), format!("{:.1}", max));
    }
    report
        .vendor_metadata
        .insert("srt_frames".to_string(), frames.len().to_string());

    report
}

/// Locates `<stem>.SRT` or `<stem>.srt` next to the video.
pub fn find_sidecar(video: &Path) -> Option<PathBuf> {
    ["SRT", "srt"]
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

pub struct SrtSidecarProbe;

impl SrtSidecarProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SrtSidecarProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProbe for SrtSidecarProbe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn probe(&self, path: &Path) -> Result<ProbeReport, ExtractError> {
        let sidecar =
            find_sidecar(path).ok_or_else(|| ExtractError::NoSidecar(path.to_path_buf()))?;

        let bytes = std::fs::read(&sidecar).map_err(|e| ExtractError::ReadFile {
            path: sidecar.clone(),
            source: e,
        })?;
        let content = String::from_utf8_lossy(&bytes);

        Ok(report_from_frames(&parse_srt(&content)))
    }
}
