use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::FormatError;
use crate::formatter::{output_stem, OutputFormatter};
use crate::models::VideoAnalysisResult;
use crate::storage::OutputWriter;

const FACT_HEADERS: [&str; 14] = [
    "flight_id",
    "video_filename",
    "duration_seconds",
    "file_size_mb",
    "resolution_width",
    "resolution_height",
    "video_codec",
    "gps_latitude",
    "gps_longitude",
    "gps_altitude",
    "mission_type",
    "bay_designation",
    "extraction_timestamp",
    "processing_success",
];

/// CSV tables for loading into a reporting model: a facts table plus
/// altitude, bay and resolution dimensions.
pub struct TabularFormatter {
    writer: OutputWriter,
}

impl TabularFormatter {
    pub fn new(writer: OutputWriter) -> Self {
        Self { writer }
    }

    fn single_file(video_path: &Path) -> PathBuf {
        Path::new("tables").join(format!("{}.facts.csv", output_stem(video_path)))
    }

    fn write_table(&self, name: &str, table: Result<Vec<u8>, FormatError>) -> Option<PathBuf> {
        let written = table.and_then(|bytes| self.writer.replace(name, &bytes).into_result());
        match written {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write {}: {}", name, e);
                None
            }
        }
    }
}

impl OutputFormatter for TabularFormatter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf> {
        vec![self.writer.resolve(Self::single_file(video_path))]
    }

    fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError> {
        let table = facts_table(std::slice::from_ref(result))?;
        let path = self
            .writer
            .write(Self::single_file(&result.video.path), &table)
            .into_result()?;
        Ok(vec![path])
    }

    /// Consolidated tables only; per-video fact files are left alone.
    fn format_batch(&self, results: &[VideoAnalysisResult]) -> Vec<PathBuf> {
        if results.is_empty() {
            return Vec::new();
        }

        [
            ("flight_facts.csv", facts_table(results)),
            ("altitude_dimension.csv", altitude_dimension(results)),
            ("bay_dimension.csv", bay_dimension(results)),
            ("resolution_dimension.csv", resolution_dimension(results)),
        ]
        .into_iter()
        .filter_map(|(name, table)| self.write_table(name, table))
        .collect()
    }
}

fn render_error(e: impl std::fmt::Display) -> FormatError {
    FormatError::Render {
        formatter: "csv",
        message: e.to_string(),
    }
}

fn build_table<I, R>(headers: &[&str], rows: I) -> Result<Vec<u8>, FormatError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers).map_err(render_error)?;
    for row in rows {
        writer.write_record(row).map_err(render_error)?;
    }
    writer.into_inner().map_err(render_error)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn facts_table(results: &[VideoAnalysisResult]) -> Result<Vec<u8>, FormatError> {
    let rows = results.iter().enumerate().map(|(i, result)| {
        let video = &result.video;
        let specs = &result.specs;
        let gps = result.gps.as_ref().filter(|g| g.is_valid());
        let mission = result.mission.as_ref();

        vec![
            format!("flight_{:03}", i + 1),
            video.filename.clone(),
            video.duration_seconds.unwrap_or(0.0).to_string(),
            format!("{:.2}", video.size_mb()),
            specs.width.unwrap_or(0).to_string(),
            specs.height.unwrap_or(0).to_string(),
            specs
                .video_codec
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            optional(gps.map(|g| g.latitude)),
            optional(gps.map(|g| g.longitude)),
            optional(result.gps.as_ref().and_then(|g| g.altitude_meters)),
            mission
                .map(|m| m.mission_type.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            optional(mission.and_then(|m| m.bay_designation.clone())),
            video.extracted_at.to_rfc3339(),
            result.extraction_success.to_string(),
        ]
    });
    build_table(&FACT_HEADERS, rows)
}

fn altitude_category(meters: f64) -> &'static str {
    if meters < 50.0 {
        "low"
    } else if meters < 150.0 {
        "medium"
    } else {
        "high"
    }
}

pub fn altitude_dimension(results: &[VideoAnalysisResult]) -> Result<Vec<u8>, FormatError> {
    let mut altitudes: Vec<f64> = results
        .iter()
        .filter_map(|r| r.gps.as_ref()?.altitude_meters)
        .collect();
    altitudes.sort_by(f64::total_cmp);
    altitudes.dedup();

    let rows = altitudes.into_iter().enumerate().map(|(i, alt)| {
        vec![
            format!("alt_{:03}", i + 1),
            alt.to_string(),
            altitude_category(alt).to_string(),
        ]
    });
    build_table(&["altitude_id", "altitude_meters", "altitude_category"], rows)
}

pub fn bay_dimension(results: &[VideoAnalysisResult]) -> Result<Vec<u8>, FormatError> {
    let bays: BTreeSet<&str> = results
        .iter()
        .filter_map(|r| r.mission.as_ref()?.bay_designation.as_deref())
        .collect();

    let rows = bays.into_iter().enumerate().map(|(i, bay)| {
        vec![
            format!("bay_{:03}", i + 1),
            bay.to_string(),
            "inspection_bay".to_string(),
        ]
    });
    build_table(&["bay_id", "bay_name", "bay_type"], rows)
}

pub fn resolution_dimension(results: &[VideoAnalysisResult]) -> Result<Vec<u8>, FormatError> {
    let resolutions: BTreeSet<(u32, u32)> = results
        .iter()
        .filter_map(|r| Some((r.specs.width?, r.specs.height?)))
        .collect();

    let rows = resolutions
        .into_iter()
        .enumerate()
        .map(|(i, (width, height))| {
            let specs = crate::models::TechnicalSpecs {
                width: Some(width),
                height: Some(height),
                ..Default::default()
            };
            vec![
                format!("res_{:03}", i + 1),
                width.to_string(),
                height.to_string(),
                format!("{}x{}", width, height),
                specs.quality_category().to_string(),
            ]
        });
    build_table(
        &[
            "resolution_id",
            "width",
            "height",
            "resolution_name",
            "quality_category",
        ],
        rows,
    )
}
