//! Airdata flight-log telemetry: parsing, derived metrics and quality scoring.

pub mod airdata;
pub mod metrics;
pub mod quality;

pub use airdata::{
    parse_airdata, parse_airdata_str, FlightLog, FlightPhase, MediaEvent, MediaEventKind,
    PhaseSpan, TelemetrySample,
};
pub use metrics::{consistency_checks, FlightMetrics, FlightPath, GeoBounds, GeoPoint};
pub use quality::{detect_anomalies, Anomaly, Grade, QualityScore, Severity};
