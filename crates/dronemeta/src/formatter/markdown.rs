use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::warn;

use crate::error::FormatError;
use crate::formatter::thumbnail::thumbnail_file_name;
use crate::formatter::{output_stem, OutputFormatter};
use crate::models::VideoAnalysisResult;
use crate::storage::OutputWriter;

const INDEX_FILE: &str = "DATASET_INDEX.md";
const REPORT_FILE: &str = "PROCESSING_REPORT.txt";
const REPORT_ERROR_LIMIT: usize = 2;
const VENDOR_FIELD_LIMIT: usize = 10;
const MESSAGE_LIMIT: usize = 3;

/// One documentation page per video, plus a dataset index in batch mode.
pub struct MarkdownFormatter {
    writer: OutputWriter,
}

impl MarkdownFormatter {
    pub fn new(writer: OutputWriter) -> Self {
        Self { writer }
    }

    fn file_name(video_path: &Path) -> String {
        format!("{}.md", output_stem(video_path))
    }

    fn replace_aggregate(&self, name: &str, content: &str, written: &mut Vec<PathBuf>) {
        match self.writer.replace(name, content.as_bytes()).into_result() {
            Ok(path) => written.push(path),
            Err(e) => warn!("Failed to write {}: {}", name, e),
        }
    }
}

impl OutputFormatter for MarkdownFormatter {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf> {
        vec![self.writer.resolve(Self::file_name(video_path))]
    }

    fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError> {
        let page = render_page(result);
        let path = self
            .writer
            .write(Self::file_name(&result.video.path), page.as_bytes())
            .into_result()?;
        Ok(vec![path])
    }

    fn format_batch(&self, results: &[VideoAnalysisResult]) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for result in results {
            match self.format_single(result) {
                Ok(paths) => written.extend(paths),
                Err(e) => warn!("markdown formatter failed for {}: {}", result.video.filename, e),
            }
        }

        if results.is_empty() {
            return written;
        }

        self.replace_aggregate(INDEX_FILE, &render_index(results), &mut written);
        for (mission, entries) in group_by_mission(results, mission_key) {
            let name = format!("{}_README.md", mission);
            self.replace_aggregate(&name, &render_mission_readme(&mission, &entries), &mut written);
        }
        self.replace_aggregate(REPORT_FILE, &render_processing_report(results), &mut written);
        written
    }
}

pub fn render_page(result: &VideoAnalysisResult) -> String {
    let video = &result.video;
    let specs = &result.specs;
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", video.filename);

    out.push_str("## Video Information\n\n");
    let _ = writeln!(out, "- **Filename**: {}", video.filename);
    let _ = writeln!(
        out,
        "- **File Size**: {:.2} MB ({} bytes)",
        video.size_mb(),
        video.size_bytes
    );
    if let Some(duration) = video.duration_formatted() {
        let _ = writeln!(out, "- **Duration**: {}", duration);
    }
    if let Some(created) = &video.created_at {
        let _ = writeln!(out, "- **Recorded**: {}", created);
    }
    let _ = writeln!(
        out,
        "- **Analysis Date**: {}\n",
        video.extracted_at.format("%Y-%m-%d %H:%M:%S")
    );

    if *specs != Default::default() {
        out.push_str("## Technical Specifications\n\n");
        if let Some(resolution) = specs.resolution_string() {
            let _ = writeln!(out, "- **Resolution**: {}", resolution);
            if specs.is_4k() {
                out.push_str("  - 4K Ultra HD quality\n");
            } else if specs.is_hd() {
                out.push_str("  - HD quality\n");
            }
        }
        if let Some(codec) = &specs.video_codec {
            let _ = writeln!(out, "- **Video Codec**: {}", codec);
        }
        if let Some(codec) = &specs.audio_codec {
            let _ = writeln!(out, "- **Audio Codec**: {}", codec);
        }
        if let Some(container) = &specs.container_format {
            let _ = writeln!(out, "- **Container Format**: {}", container);
        }
        if let Some(fps) = specs.framerate {
            let _ = writeln!(out, "- **Frame Rate**: {:.1} fps", fps);
        }
        if let Some(bitrate) = specs.bitrate {
            let _ = writeln!(out, "- **Bitrate**: {} bps", bitrate);
        }
        if let Some(ratio) = specs.aspect_ratio() {
            let _ = writeln!(out, "- **Aspect Ratio**: {:.2}:1", ratio);
        }
        out.push('\n');
    }

    if let Some(gps) = &result.gps {
        out.push_str("## GPS Information\n\n");
        let _ = writeln!(
            out,
            "- **Coordinates**: {:.6}, {:.6}",
            gps.latitude, gps.longitude
        );
        if let Some(altitude) = gps.altitude_meters {
            let _ = writeln!(out, "- **Altitude**: {:.1} meters", altitude);
        }
        let _ = writeln!(out, "- **Source**: {}\n", gps.source);
    }

    if let Some(mission) = &result.mission {
        out.push_str("## Mission Information\n\n");
        let _ = writeln!(
            out,
            "- **Mission Type**: {}",
            title_case(mission.mission_type.as_str())
        );
        if let Some(bay) = &mission.bay_designation {
            let _ = writeln!(out, "- **Bay**: {}", bay);
        }
        let _ = writeln!(
            out,
            "- **Classification Confidence**: {:.1}%",
            mission.confidence * 100.0
        );
        let _ = writeln!(out, "- **Classification Method**: {}", mission.method);
        if let Some(altitude) = mission.max_altitude {
            let _ = writeln!(out, "- **Max Altitude**: {:.1} meters", altitude);
        }
        if let Some(distance) = mission.flight_distance_miles {
            let _ = writeln!(out, "- **Estimated Flight Distance**: {:.2} miles", distance);
        }
        for note in &mission.notes {
            let _ = writeln!(out, "- **Note**: {}", note);
        }
        out.push('\n');
    }

    if !result.vendor_metadata.is_empty() {
        out.push_str("## Vendor Metadata\n\n");
        for (key, value) in result.vendor_metadata.iter().take(VENDOR_FIELD_LIMIT) {
            let _ = writeln!(out, "- **{}**: {}", key, value);
        }
        if result.vendor_metadata.len() > VENDOR_FIELD_LIMIT {
            let _ = writeln!(
                out,
                "- *(and {} more fields...)*",
                result.vendor_metadata.len() - VENDOR_FIELD_LIMIT
            );
        }
        out.push('\n');
    }

    out.push_str("## Processing Information\n\n");
    let _ = writeln!(
        out,
        "- **Extraction Success**: {}",
        if result.extraction_success { "Yes" } else { "No" }
    );
    write_messages(&mut out, "Errors", &result.errors);
    write_messages(&mut out, "Warnings", &result.warnings);
    out.push('\n');

    out.push_str("## Media\n\n### Thumbnail\n\n");
    let _ = writeln!(
        out,
        "![{} thumbnail](thumbnails/{})\n",
        video.filename,
        thumbnail_file_name(&video.path)
    );

    let _ = writeln!(
        out,
        "---\n\n*Generated by dronemeta on {}*",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );

    out
}

fn write_messages(out: &mut String, label: &str, messages: &[String]) {
    if messages.is_empty() {
        return;
    }
    let _ = writeln!(out, "- **{}**: {}", label, messages.len());
    for message in messages.iter().take(MESSAGE_LIMIT) {
        let _ = writeln!(out, "  - {}", message);
    }
    if messages.len() > MESSAGE_LIMIT {
        let _ = writeln!(out, "  - *(and {} more...)*", messages.len() - MESSAGE_LIMIT);
    }
}

fn title_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn mission_label(result: &VideoAnalysisResult) -> String {
    result
        .mission
        .as_ref()
        .map(|m| title_case(m.mission_type.as_str()))
        .unwrap_or_else(|| "Unclassified".to_string())
}

fn mission_key(result: &VideoAnalysisResult) -> String {
    result
        .mission
        .as_ref()
        .map(|m| m.mission_type.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn group_by_mission<F>(
    results: &[VideoAnalysisResult],
    key: F,
) -> BTreeMap<String, Vec<&VideoAnalysisResult>>
where
    F: Fn(&VideoAnalysisResult) -> String,
{
    let mut groups: BTreeMap<String, Vec<&VideoAnalysisResult>> = BTreeMap::new();
    for result in results {
        groups.entry(key(result)).or_default().push(result);
    }
    groups
}

fn has_gps(result: &VideoAnalysisResult) -> bool {
    result.gps.as_ref().is_some_and(|g| g.is_valid())
}

/// Overview of a batch grouped by mission type.
pub fn render_index(results: &[VideoAnalysisResult]) -> String {
    let by_mission = group_by_mission(results, mission_label);

    let total_duration: f64 = results
        .iter()
        .filter_map(|r| r.video.duration_seconds)
        .sum();
    let total_bytes: u64 = results.iter().map(|r| r.video.size_bytes).sum();

    let mut out = String::new();
    out.push_str("# Dataset Index\n\n## Overview\n\n");
    let _ = writeln!(out, "- **Videos**: {}", results.len());
    let _ = writeln!(out, "- **Total Duration**: {:.1} minutes", total_duration / 60.0);
    let _ = writeln!(
        out,
        "- **Total Size**: {:.2} GB\n",
        total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    );

    for (label, entries) in &by_mission {
        let _ = writeln!(out, "## {} Missions ({})\n", label, entries.len());
        out.push_str("| Video | Duration | Resolution | Bay | Confidence |\n");
        out.push_str("|---|---|---|---|---|\n");
        for result in entries {
            let mission = result.mission.as_ref();
            let _ = writeln!(
                out,
                "| [{name}]({page}.md) | {} | {} | {} | {} |",
                result.video.duration_formatted().unwrap_or_else(|| "-".into()),
                result.specs.resolution_string().unwrap_or_else(|| "-".into()),
                mission
                    .and_then(|m| m.bay_designation.clone())
                    .unwrap_or_else(|| "-".into()),
                mission
                    .map(|m| format!("{:.0}%", m.confidence * 100.0))
                    .unwrap_or_else(|| "-".into()),
                name = result.video.filename,
                page = output_stem(&result.video.path),
            );
        }
        out.push('\n');
    }

    out
}

/// Statistics and a file listing for one mission type.
pub fn render_mission_readme(mission: &str, results: &[&VideoAnalysisResult]) -> String {
    let total_seconds: f64 = results
        .iter()
        .filter_map(|r| r.video.duration_seconds)
        .sum();
    let total_mb: f64 = results.iter().map(|r| r.video.size_mb()).sum();
    let with_gps = results.iter().filter(|r| has_gps(r)).count();
    let gps_share = if results.is_empty() {
        0.0
    } else {
        with_gps as f64 / results.len() as f64 * 100.0
    };
    let whole_seconds = total_seconds.max(0.0) as u64;

    let mut out = String::new();
    let _ = writeln!(out, "# {} Mission Videos\n", title_case(mission));
    let _ = writeln!(
        out,
        "This directory contains {} videos classified as '{}' missions.\n",
        results.len(),
        mission
    );

    out.push_str("## Mission Statistics\n\n");
    let _ = writeln!(out, "- **Video Count**: {}", results.len());
    let _ = writeln!(
        out,
        "- **Total Duration**: {}m {}s",
        whole_seconds / 60,
        whole_seconds % 60
    );
    let _ = writeln!(out, "- **Total Size**: {:.2} MB", total_mb);
    let _ = writeln!(out, "- **Videos with GPS**: {} ({:.1}%)\n", with_gps, gps_share);

    out.push_str("## Video Files\n\n");
    for result in results {
        let video = &result.video;
        let _ = writeln!(out, "### {}\n", video.filename);
        let _ = writeln!(
            out,
            "- **Duration**: {}",
            video.duration_formatted().unwrap_or_else(|| "Unknown".into())
        );
        let _ = writeln!(out, "- **Size**: {:.1}MB", video.size_mb());
        let _ = writeln!(
            out,
            "- **GPS**: {}",
            if has_gps(result) { "GPS" } else { "No GPS" }
        );
        if let Some(resolution) = result.specs.resolution_string() {
            let _ = writeln!(out, "- **Resolution**: {}", resolution);
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "---\n\n*Generated on {}*",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    out
}

/// Plain-text summary of a batch with a per-video status block.
pub fn render_processing_report(results: &[VideoAnalysisResult]) -> String {
    let successful = results.iter().filter(|r| r.extraction_success).count();
    let failed = results.len() - successful;
    let rate = if results.is_empty() {
        0.0
    } else {
        successful as f64 / results.len() as f64 * 100.0
    };

    let mut out = String::new();
    out.push_str("DRONE METADATA PROCESSING REPORT\n");
    let _ = writeln!(out, "{}\n", "=".repeat(50));
    let _ = writeln!(out, "Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    let _ = writeln!(out, "PROCESSING SUMMARY\n{}", "-".repeat(20));
    let _ = writeln!(out, "Total Videos: {}", results.len());
    let _ = writeln!(out, "Successful: {}", successful);
    let _ = writeln!(out, "Failed: {}", failed);
    let _ = writeln!(out, "Success Rate: {:.1}%\n", rate);

    let _ = writeln!(out, "DETAILED RESULTS\n{}", "-".repeat(20));
    for (i, result) in results.iter().enumerate() {
        let video = &result.video;
        let _ = writeln!(out, "{:2}. {}", i + 1, video.filename);
        let _ = writeln!(
            out,
            "    Status: {}",
            if result.extraction_success { "SUCCESS" } else { "FAILED" }
        );
        let _ = writeln!(out, "    Size: {:.2} MB", video.size_mb());
        let _ = writeln!(
            out,
            "    Duration: {}",
            video.duration_formatted().unwrap_or_else(|| "Unknown".into())
        );
        if !result.errors.is_empty() {
            let _ = writeln!(out, "    Errors: {}", result.errors.len());
            for error in result.errors.iter().take(REPORT_ERROR_LIMIT) {
                let _ = writeln!(out, "      - {}", error);
            }
        }
        out.push('\n');
    }
    out
}
