//! Flight-directory reports: discover telemetry and media in a flight
//! folder, then grade the flight and map it onto a known bay.

pub mod render;
pub mod report;
pub mod scanner;

pub use render::{
    batch_summary, render_markdown, render_report, write_batch_reports, write_report,
    FlightBatchSummary, ReportFormat,
};
pub use report::{
    BayMapping, FlightProcessor, FlightReport, InspectionClassification, MediaSummary,
    TelemetrySource,
};
pub use scanner::{scan_flight_directory, Completeness, FlightDataset, InspectionType};
