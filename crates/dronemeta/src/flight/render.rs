//! Flight report files: JSON, Markdown and a one-row CSV, plus the batch
//! summary written next to a directory of reports.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::flight::report::FlightReport;
use crate::storage::write_atomic;

pub const BATCH_SUMMARY_FILE: &str = "batch_summary.json";

const CSV_HEADERS: [&str; 14] = [
    "flight_id",
    "bay_id",
    "inspection_type",
    "quality_grade",
    "quality_score",
    "duration_minutes",
    "max_altitude_ft",
    "avg_altitude_ft",
    "max_speed_mph",
    "distance_miles",
    "battery_consumed_pct",
    "photos",
    "videos",
    "anomalies",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Markdown => "md",
        }
    }
}

fn render_error(message: impl ToString) -> FormatError {
    FormatError::Render {
        formatter: "flight",
        message: message.to_string(),
    }
}

pub fn render_report(report: &FlightReport, format: ReportFormat) -> Result<String, FormatError> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(report).map_err(render_error),
        ReportFormat::Csv => render_csv(report),
        ReportFormat::Markdown => Ok(render_markdown(report)),
    }
}

fn render_csv(report: &FlightReport) -> Result<String, FormatError> {
    let m = &report.metrics;
    let row = [
        report.flight_id.clone(),
        report.bay_id().unwrap_or("").to_string(),
        report.inspection.inspection_type.to_string(),
        report.grade.to_string(),
        format!("{:.3}", report.quality.overall),
        format!("{:.1}", m.duration_seconds / 60.0),
        format!("{:.1}", m.max_altitude_feet),
        format!("{:.1}", m.avg_altitude_feet),
        format!("{:.1}", m.max_speed_mph),
        format!("{:.2}", m.total_distance_miles),
        format!("{:.1}", m.battery_consumed),
        report.media.photos.to_string(),
        report.media.videos.to_string(),
        report.anomalies.len().to_string(),
    ];

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS).map_err(render_error)?;
    writer.write_record(&row).map_err(render_error)?;
    let bytes = writer.into_inner().map_err(render_error)?;
    String::from_utf8(bytes).map_err(render_error)
}

fn check_mark(score: f64) -> &'static str {
    if score > 0.8 {
        "ok"
    } else {
        "review"
    }
}

fn title_words(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_markdown(report: &FlightReport) -> String {
    let m = &report.metrics;
    let q = &report.quality;
    let mut md = String::new();

    let _ = writeln!(md, "# Flight Report: {}\n", report.flight_id);
    let _ = writeln!(
        md,
        "**Generated:** {}  ",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(md, "**Processing Time:** {:.1}s\n", report.processing_seconds);

    let _ = writeln!(md, "## Summary\n");
    let _ = writeln!(md, "- **Bay:** {}", report.bay_id().unwrap_or("Unknown"));
    let _ = writeln!(
        md,
        "- **Inspection Type:** {} ({:.0}% confidence)",
        report.inspection.inspection_type,
        report.inspection.confidence * 100.0
    );
    let _ = writeln!(md, "- **Quality Grade:** {} ({:.2})", report.grade, q.overall);
    let _ = writeln!(md, "- **Flight Pattern:** {}\n", report.path.pattern());

    let _ = writeln!(md, "## Flight Metrics\n");
    let _ = writeln!(md, "| Metric | Value |");
    let _ = writeln!(md, "|--------|-------|");
    let _ = writeln!(md, "| Duration | {:.1} min |", m.duration_seconds / 60.0);
    let _ = writeln!(md, "| Max Altitude | {:.1} ft |", m.max_altitude_feet);
    let _ = writeln!(md, "| Average Altitude | {:.1} ft |", m.avg_altitude_feet);
    let _ = writeln!(md, "| Max Speed | {:.1} mph |", m.max_speed_mph);
    let _ = writeln!(md, "| Total Distance | {:.2} miles |", m.total_distance_miles);
    let _ = writeln!(md, "| Battery Consumed | {:.1}% |", m.battery_consumed);
    let _ = writeln!(md, "| GPS Quality | {:.1} satellites |\n", m.satellites_avg);

    let _ = writeln!(md, "## Media Summary\n");
    let _ = writeln!(md, "- **Photos:** {}", report.media.photos);
    let _ = writeln!(md, "- **Videos:** {}", report.media.videos);
    let _ = writeln!(
        md,
        "- **Video Duration:** {:.1} minutes\n",
        report.media.video_seconds / 60.0
    );

    let _ = writeln!(md, "## Quality Assessment\n");
    let _ = writeln!(md, "| Component | Score | Rating |");
    let _ = writeln!(md, "|-----------|-------|--------|");
    let _ = writeln!(md, "| Overall | {:.2} | {} |", q.overall, report.grade);
    for (name, score) in [
        ("GPS Quality", q.gps),
        ("Battery Health", q.battery),
        ("Flight Stability", q.stability),
        ("Coverage", q.coverage),
    ] {
        let _ = writeln!(md, "| {} | {:.2} | {} |", name, score, check_mark(score));
    }

    if !report.phases.is_empty() {
        let _ = writeln!(md, "\n## Flight Phases\n");
        for span in &report.phases {
            let _ = writeln!(
                md,
                "- {}: {} to {}",
                span.phase.as_str(),
                span.start.format("%H:%M:%S"),
                span.end.format("%H:%M:%S")
            );
        }
    }

    if !report.anomalies.is_empty() {
        let _ = writeln!(md, "\n## Anomalies ({})\n", report.anomalies.len());
        for anomaly in &report.anomalies {
            let _ = writeln!(
                md,
                "- **{}:** {}",
                anomaly.severity.as_str().to_uppercase(),
                anomaly.description
            );
        }
    }

    if !report.verification_needed.is_empty() {
        let _ = writeln!(md, "\n## Human Verification Required\n");
        for field in &report.verification_needed {
            let _ = writeln!(md, "- {}", title_words(field));
        }
    }

    md
}

/// Aggregates over a batch of flight reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightBatchSummary {
    pub total_flights: usize,
    pub generated_at: DateTime<Utc>,
    pub avg_processing_seconds: f64,
    pub total_processing_seconds: f64,
    pub quality_distribution: BTreeMap<String, usize>,
    pub bay_distribution: BTreeMap<String, usize>,
    pub avg_altitude_ft: f64,
    pub avg_distance_miles: f64,
    pub avg_battery_consumed_pct: f64,
    pub total_anomalies: usize,
    pub flights_with_anomalies: usize,
    pub anomaly_types: BTreeSet<String>,
}

pub fn batch_summary(reports: &[FlightReport]) -> FlightBatchSummary {
    let total = reports.len();
    let mean = |value: fn(&FlightReport) -> f64| {
        if total == 0 {
            0.0
        } else {
            reports.iter().map(value).sum::<f64>() / total as f64
        }
    };
    let round = |value: f64, places: i32| {
        let scale = 10f64.powi(places);
        (value * scale).round() / scale
    };

    let mut quality_distribution = BTreeMap::new();
    let mut bay_distribution = BTreeMap::new();
    for report in reports {
        *quality_distribution
            .entry(report.grade.to_string())
            .or_insert(0) += 1;
        if let Some(bay) = report.bay_id() {
            *bay_distribution.entry(bay.to_string()).or_insert(0) += 1;
        }
    }

    let total_processing_seconds: f64 = reports.iter().map(|r| r.processing_seconds).sum();
    FlightBatchSummary {
        total_flights: total,
        generated_at: Utc::now(),
        avg_processing_seconds: mean(|r| r.processing_seconds),
        total_processing_seconds,
        quality_distribution,
        bay_distribution,
        avg_altitude_ft: round(mean(|r| r.metrics.avg_altitude_feet), 1),
        avg_distance_miles: round(mean(|r| r.metrics.total_distance_miles), 2),
        avg_battery_consumed_pct: round(mean(|r| r.metrics.battery_consumed), 1),
        total_anomalies: reports.iter().map(|r| r.anomalies.len()).sum(),
        flights_with_anomalies: reports.iter().filter(|r| !r.anomalies.is_empty()).count(),
        anomaly_types: reports
            .iter()
            .flat_map(|r| r.anomalies.iter().map(|a| a.kind.clone()))
            .collect(),
    }
}

pub fn write_report(
    report: &FlightReport,
    path: &Path,
    format: ReportFormat,
) -> Result<PathBuf, FormatError> {
    let content = render_report(report, format)?;
    write_atomic(path, content.as_bytes()).map_err(|e| FormatError::WriteFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!("Flight report written to {}", path.display());
    Ok(path.to_path_buf())
}

/// Writes `flight_report_<id>.<ext>` per report and, when asked, the batch
/// summary. Returns every path written.
pub fn write_batch_reports(
    reports: &[FlightReport],
    directory: &Path,
    format: ReportFormat,
    with_summary: bool,
) -> Result<Vec<PathBuf>, FormatError> {
    let mut written = Vec::with_capacity(reports.len() + 1);
    for report in reports {
        let name = format!("flight_report_{}.{}", report.flight_id, format.extension());
        written.push(write_report(report, &directory.join(name), format)?);
    }

    if with_summary {
        let path = directory.join(BATCH_SUMMARY_FILE);
        let json = serde_json::to_string_pretty(&batch_summary(reports)).map_err(render_error)?;
        write_atomic(&path, json.as_bytes()).map_err(|e| FormatError::WriteFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        written.push(path);
    }
    Ok(written)
}
