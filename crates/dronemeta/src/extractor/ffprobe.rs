use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ExtractError;
use crate::extractor::{MetadataProbe, ProbeReport};
use crate::models::GpsFix;
use crate::tools;

const TOOL: &str = "ffprobe";

/// Tag keys or values mentioning any of these are kept as vendor metadata.
const VENDOR_KEYWORDS: &[&str] = &[
    "dji", "drone", "gps", "altitude", "gimbal", "camera", "iso", "shutter", "latitude",
    "longitude", "xmp",
];

const LOCATION_TAGS: &[&str] = &[
    "location",
    "location-eng",
    "com.apple.quicktime.location.iso6709",
];

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<FfprobeStream>>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
}

/// Runs `ffprobe -show_format -show_streams` and reads its JSON output.
pub struct FfprobeProbe {
    binary: Option<PathBuf>,
    deadline: Duration,
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self {
            binary: None,
            deadline: tools::DEFAULT_TOOL_DEADLINE,
        }
    }

    /// Uses a fixed binary instead of resolving one from the environment.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary: Some(binary),
            ..Self::new()
        }
    }

    /// ffprobe is killed once it runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProbe for FfprobeProbe {
    fn name(&self) -> &'static str {
        TOOL
    }

    fn probe(&self, path: &Path) -> Result<ProbeReport, ExtractError> {
        let binary = self.binary.clone().unwrap_or_else(tools::ffprobe_path);

        let mut command = Command::new(&binary);
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path);
        let output = tools::output_with_deadline(&mut command, self.deadline).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ExtractError::ToolFailed {
                    tool: TOOL,
                    message: e.to_string(),
                }
            } else {
                ExtractError::ToolUnavailable {
                    tool: TOOL,
                    message: format!("cannot run '{}': {}", binary.display(), e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ToolFailed {
                tool: TOOL,
                message: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        parse_ffprobe_json(&output.stdout)
    }
}

pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<ProbeReport, ExtractError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::ParseOutput {
            tool: TOOL,
            message: e.to_string(),
        })?;

    let mut report = ProbeReport::default();

    for stream in parsed.streams.unwrap_or_default() {
        match stream.codec_type.as_deref() {
            Some("video") if report.specs.video_codec.is_none() => {
                report.specs.video_codec = stream.codec_name;
                report.specs.width = stream.width;
                report.specs.height = stream.height;
                report.specs.framerate = parse_frame_rate(stream.avg_frame_rate.as_deref())
                    .or_else(|| parse_frame_rate(stream.r_frame_rate.as_deref()));
                if report.specs.bitrate.is_none() {
                    report.specs.bitrate = stream.bit_rate.and_then(|b| b.parse().ok());
                }
                report.duration_seconds = parse_seconds(stream.duration.as_deref());
            }
            Some("audio") if report.specs.audio_codec.is_none() => {
                report.specs.audio_codec = stream.codec_name;
            }
            _ => {}
        }
    }

    if let Some(format) = parsed.format {
        report.specs.container_format = format.format_name;
        if let Some(duration) = parse_seconds(format.duration.as_deref()) {
            report.duration_seconds = Some(duration);
        }
        if let Some(bitrate) = format.bit_rate.and_then(|b| b.parse().ok()) {
            report.specs.bitrate = Some(bitrate);
        }

        for (key, value) in format.tags {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let lowered_key = key.to_ascii_lowercase();

            if lowered_key == "creation_time" {
                report.created_at = Some(value.clone());
            }
            if report.gps.is_none() && LOCATION_TAGS.contains(&lowered_key.as_str()) {
                report.gps = parse_iso6709(&value);
            }

            let lowered_value = value.to_ascii_lowercase();
            if VENDOR_KEYWORDS
                .iter()
                .any(|k| lowered_key.contains(k) || lowered_value.contains(k))
            {
                report.vendor_metadata.insert(key, value);
            }
        }
    }

    Ok(report)
}

/// Parses frame rates like `30000/1001` or `25`.
pub fn parse_frame_rate(rate: Option<&str>) -> Option<f64> {
    let rate = rate?;
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    rate.trim().parse::<f64>().ok().filter(|r| *r > 0.0)
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parses an ISO 6709 point such as `+37.7749-122.4194+010.000/`.
pub fn parse_iso6709(value: &str) -> Option<GpsFix> {
    let body = value.trim().trim_end_matches('/');
    let mut parts: Vec<String> = Vec::new();

    for ch in body.chars() {
        match ch {
            '+' | '-' => parts.push(ch.to_string()),
            '0'..='9' | '.' => parts.last_mut()?.push(ch),
            _ => return None,
        }
    }

    let numbers: Vec<f64> = parts
        .iter()
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match numbers.as_slice() {
        [lat, lon] | [lat, lon, _] => Some(GpsFix {
            latitude: *lat,
            longitude: *lon,
            altitude_meters: numbers.get(2).copied(),
            source: TOOL.to_string(),
        })
        .filter(GpsFix::is_valid),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 3840, "height": 2160,
             "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001",
             "duration": "120.100000", "bit_rate": "100000000"},
            {"codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "120.120000",
            "bit_rate": "100450000",
            "tags": {
                "creation_time": "2023-04-25T10:15:32.000000Z",
                "encoder": "DJI Mini3",
                "location": "+37.7749-122.4194+010.000/",
                "major_brand": "mp42"
            }
        }
    }"#;

    #[test]
    fn test_parse_sample_output() {
        let report = parse_ffprobe_json(SAMPLE.as_bytes()).unwrap();

        assert_eq!(report.specs.width, Some(3840));
        assert_eq!(report.specs.height, Some(2160));
        assert_eq!(report.specs.video_codec.as_deref(), Some("h264"));
        assert_eq!(report.specs.audio_codec.as_deref(), Some("aac"));
        assert_eq!(report.specs.bitrate, Some(100_450_000));
        assert_eq!(report.duration_seconds, Some(120.12));
        assert!((report.specs.framerate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(
            report.created_at.as_deref(),
            Some("2023-04-25T10:15:32.000000Z")
        );

        assert_eq!(report.vendor_metadata.get("encoder").map(String::as_str), Some("DJI Mini3"));
        assert!(!report.vendor_metadata.contains_key("major_brand"));

        let gps = report.gps.unwrap();
        assert_eq!(gps.latitude, 37.7749);
        assert_eq!(gps.longitude, -122.4194);
        assert_eq!(gps.altitude_meters, Some(10.0));
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let result = parse_ffprobe_json(b"not json");
        assert!(matches!(result, Err(ExtractError::ParseOutput { .. })));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate(Some("25")), Some(25.0));
        assert_eq!(parse_frame_rate(Some("60/1")), Some(60.0));
        assert_eq!(parse_frame_rate(Some("0/0")), None);
        assert_eq!(parse_frame_rate(None), None);
    }

    #[test]
    fn test_parse_iso6709_without_altitude() {
        let fix = parse_iso6709("-33.8688+151.2093/").unwrap();
        assert_eq!(fix.latitude, -33.8688);
        assert_eq!(fix.longitude, 151.2093);
        assert_eq!(fix.altitude_meters, None);
        assert!(parse_iso6709("somewhere").is_none());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let probe = FfprobeProbe::with_binary(PathBuf::from("/nonexistent/bin/ffprobe"));
        let result = probe.probe(Path::new("/tmp/flight.mp4"));
        assert!(matches!(result, Err(ExtractError::ToolUnavailable { .. })));
    }
}
