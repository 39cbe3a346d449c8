use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::airdata::FlightLog;
use crate::telemetry::metrics::{speed_variance, FlightMetrics};

/// Satellite count treated as a perfect fix.
const FULL_SATELLITES: f64 = 15.0;
/// Battery percent consumed that scores zero.
const BATTERY_BUDGET: f64 = 50.0;
const SPEED_VARIANCE_LIMIT: f64 = 100.0;
/// One media event expected per this many seconds of flight.
const SECONDS_PER_MEDIA_EVENT: f64 = 30.0;
const MIN_EXPECTED_MEDIA: usize = 10;
const EQUIPMENT_SCORE: f64 = 0.9;
const POOR_GPS_SATELLITES: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Grade::A
        } else if score >= 0.8 {
            Grade::B
        } else if score >= 0.7 {
            Grade::C
        } else if score >= 0.6 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component scores in `[0, 1]`; the overall score is their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall: f64,
    pub gps: f64,
    pub battery: f64,
    pub stability: f64,
    pub coverage: f64,
    pub equipment: f64,
}

impl QualityScore {
    pub fn assess(log: Option<&FlightLog>, metrics: &FlightMetrics) -> Self {
        let gps = (metrics.satellites_avg / FULL_SATELLITES).min(1.0);
        let battery = (1.0 - metrics.battery_consumed / BATTERY_BUDGET).max(0.0);
        let stability = log
            .and_then(speed_variance)
            .map(|variance| (1.0 - variance / SPEED_VARIANCE_LIMIT).max(0.0))
            .unwrap_or(0.5);

        let media_count = log.map(|l| l.media_events.len()).unwrap_or(0);
        let expected = MIN_EXPECTED_MEDIA
            .max((metrics.duration_seconds / SECONDS_PER_MEDIA_EVENT) as usize);
        let coverage = (media_count as f64 / expected as f64).min(1.0);

        Self::from_components(gps, battery, stability, coverage, EQUIPMENT_SCORE)
    }

    pub fn from_components(
        gps: f64,
        battery: f64,
        stability: f64,
        coverage: f64,
        equipment: f64,
    ) -> Self {
        Self {
            overall: (gps + battery + stability + coverage + equipment) / 5.0,
            gps,
            battery,
            stability,
            coverage,
            equipment,
        }
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(self.overall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub affected_metrics: Vec<String>,
    pub suggested_action: Option<String>,
    pub detected_at: Option<DateTime<Utc>>,
}

pub fn detect_anomalies(log: Option<&FlightLog>, metrics: &FlightMetrics) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if metrics.battery_consumed > BATTERY_BUDGET {
        anomalies.push(Anomaly {
            kind: "high_battery_consumption".to_string(),
            severity: Severity::Medium,
            description: format!(
                "High battery consumption: {:.1}%",
                metrics.battery_consumed
            ),
            affected_metrics: vec!["battery_consumed".to_string()],
            suggested_action: Some("Check flight duration and power management".to_string()),
            detected_at: log.and_then(FlightLog::end),
        });
    }

    if metrics.satellites_avg < POOR_GPS_SATELLITES {
        anomalies.push(Anomaly {
            kind: "poor_gps_quality".to_string(),
            severity: Severity::Medium,
            description: format!("Low GPS satellite count: {:.1}", metrics.satellites_avg),
            affected_metrics: vec!["satellites_avg".to_string()],
            suggested_action: Some("Verify GPS positioning accuracy".to_string()),
            detected_at: log.and_then(FlightLog::start),
        });
    }

    anomalies
}
