use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::telemetry::airdata::{FlightLog, TelemetrySample};

const FEET_PER_MILE: f64 = 5280.0;
/// Rough miles per degree, good enough for ranking paths.
const MILES_PER_DEGREE: f64 = 69.0;
const CIRCULAR_CLOSURE_DEGREES: f64 = 0.001;
const LINEAR_DEVIATION_DEGREES: f64 = 0.0005;
const CIRCUIT_COMPLETION_DEGREES: f64 = 0.002;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightMetrics {
    pub max_altitude_feet: f64,
    pub avg_altitude_feet: f64,
    pub min_altitude_feet: f64,
    pub max_speed_mph: f64,
    pub avg_speed_mph: f64,
    pub total_distance_miles: f64,
    pub battery_start: f64,
    pub battery_end: f64,
    pub battery_consumed: f64,
    pub satellites_avg: f64,
    pub satellites_max: u32,
    pub satellites_min: u32,
    pub duration_seconds: f64,
}

impl Default for FlightMetrics {
    /// Stand-in for flights without telemetry: nominal GPS, full battery.
    fn default() -> Self {
        Self {
            max_altitude_feet: 0.0,
            avg_altitude_feet: 0.0,
            min_altitude_feet: 0.0,
            max_speed_mph: 0.0,
            avg_speed_mph: 0.0,
            total_distance_miles: 0.0,
            battery_start: 100.0,
            battery_end: 100.0,
            battery_consumed: 0.0,
            satellites_avg: 10.0,
            satellites_max: 15,
            satellites_min: 10,
            duration_seconds: 0.0,
        }
    }
}

impl FlightMetrics {
    pub fn from_log(log: &FlightLog) -> Self {
        let samples = &log.samples;
        let mut metrics = FlightMetrics {
            duration_seconds: log.duration_seconds(),
            ..FlightMetrics::default()
        };

        let heights = values(samples, |s| s.height_feet.or(s.altitude_feet));
        if let Some(stats) = Stats::of(&heights) {
            metrics.max_altitude_feet = stats.max;
            metrics.avg_altitude_feet = stats.mean;
            metrics.min_altitude_feet = stats.min;
        }

        let speeds = values(samples, |s| s.speed_mph);
        if let Some(stats) = Stats::of(&speeds) {
            metrics.max_speed_mph = stats.max;
            metrics.avg_speed_mph = stats.mean;
        }

        let mileage = values(samples, |s| s.mileage_feet);
        if let Some(stats) = Stats::of(&mileage) {
            metrics.total_distance_miles = stats.max / FEET_PER_MILE;
        }

        let battery = values(samples, |s| s.battery_percent);
        if let (Some(first), Some(last)) = (battery.first(), battery.last()) {
            metrics.battery_start = *first;
            metrics.battery_end = *last;
            metrics.battery_consumed = first - last;
        }

        let satellites = values(samples, |s| s.satellites);
        if let Some(stats) = Stats::of(&satellites) {
            metrics.satellites_avg = stats.mean;
            metrics.satellites_max = stats.max.max(0.0) as u32;
            metrics.satellites_min = stats.min.max(0.0) as u32;
        }

        metrics
    }

    pub fn altitude_range_feet(&self) -> f64 {
        self.max_altitude_feet - self.min_altitude_feet
    }

    /// Battery percent per mile flown.
    pub fn battery_per_mile(&self) -> f64 {
        if self.total_distance_miles == 0.0 {
            0.0
        } else {
            self.battery_consumed / self.total_distance_miles
        }
    }
}

/// Sample variance of the speeds, `None` below two readings.
pub fn speed_variance(log: &FlightLog) -> Option<f64> {
    let speeds = values(&log.samples, |s| s.speed_mph);
    if speeds.len() < 2 {
        return None;
    }
    let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
    let squares: f64 = speeds.iter().map(|v| (v - mean).powi(2)).sum();
    Some(squares / (speeds.len() - 1) as f64)
}

/// Sanity checks over the raw telemetry. Checks whose columns are absent
/// are left out of the map.
pub fn consistency_checks(log: &FlightLog) -> BTreeMap<String, bool> {
    let samples = &log.samples;
    let mut checks = BTreeMap::new();

    let intervals: Vec<f64> = samples
        .windows(2)
        .map(|pair| match (pair[0].time_ms, pair[1].time_ms) {
            (Some(a), Some(b)) => (b - a) / 1000.0,
            _ => (pair[1].recorded_at - pair[0].recorded_at).num_milliseconds() as f64 / 1000.0,
        })
        .collect();
    if !intervals.is_empty() {
        // Airdata logs at 10 Hz.
        checks.insert(
            "timestamp_continuity".to_string(),
            share(&intervals, |d| d > 0.05 && d < 0.2) > 0.9,
        );
    }

    if !samples.is_empty() {
        let valid = samples
            .iter()
            .filter(|s| {
                (-90.0..=90.0).contains(&s.latitude) && (-180.0..=180.0).contains(&s.longitude)
            })
            .count();
        checks.insert(
            "gps_validity".to_string(),
            valid as f64 / samples.len() as f64 > 0.95,
        );
    }

    let battery = values(samples, |s| s.battery_percent);
    if battery.len() >= 2 {
        let diffs: Vec<f64> = battery.windows(2).map(|p| p[1] - p[0]).collect();
        let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
        checks.insert("battery_consistency".to_string(), mean <= 1.0);
    }

    let heights = values(samples, |s| s.height_feet);
    if !heights.is_empty() {
        checks.insert(
            "altitude_reasonable".to_string(),
            heights.iter().all(|h| (0.0..=1000.0).contains(h)),
        );
    }

    checks
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Geometry of the track flown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPath {
    #[serde(skip)]
    pub points: Vec<GeoPoint>,
    pub point_count: usize,
    pub total_distance_miles: f64,
    pub bounds: Option<GeoBounds>,
    pub centroid: Option<GeoPoint>,
    pub is_circular: bool,
    pub is_linear: bool,
    /// 0 to 1; how close the track comes to closing its loop.
    pub circuit_completion: f64,
}

impl FlightPath {
    pub fn from_points(points: Vec<GeoPoint>) -> Self {
        let bounds = bounds_of(&points);
        let centroid = (!points.is_empty()).then(|| {
            let n = points.len() as f64;
            GeoPoint {
                latitude: points.iter().map(|p| p.latitude).sum::<f64>() / n,
                longitude: points.iter().map(|p| p.longitude).sum::<f64>() / n,
            }
        });

        Self {
            total_distance_miles: path_distance(&points),
            is_circular: is_circular(&points),
            is_linear: is_linear(&points),
            circuit_completion: circuit_completion(&points),
            point_count: points.len(),
            bounds,
            centroid,
            points,
        }
    }

    pub fn from_log(log: &FlightLog) -> Self {
        Self::from_points(
            log.samples
                .iter()
                .map(|s| GeoPoint {
                    latitude: s.latitude,
                    longitude: s.longitude,
                })
                .collect(),
        )
    }

    pub fn pattern(&self) -> &'static str {
        if self.is_circular {
            "circular"
        } else if self.is_linear {
            "linear"
        } else {
            "irregular"
        }
    }
}

fn bounds_of(points: &[GeoPoint]) -> Option<GeoBounds> {
    let first = points.first()?;
    let mut bounds = GeoBounds {
        min_lat: first.latitude,
        max_lat: first.latitude,
        min_lon: first.longitude,
        max_lon: first.longitude,
    };
    for p in &points[1..] {
        bounds.min_lat = bounds.min_lat.min(p.latitude);
        bounds.max_lat = bounds.max_lat.max(p.latitude);
        bounds.min_lon = bounds.min_lon.min(p.longitude);
        bounds.max_lon = bounds.max_lon.max(p.longitude);
    }
    Some(bounds)
}

fn closure_gap(points: &[GeoPoint]) -> Option<(f64, f64)> {
    let (first, last) = (points.first()?, points.last()?);
    Some((
        (first.latitude - last.latitude).abs(),
        (first.longitude - last.longitude).abs(),
    ))
}

fn is_circular(points: &[GeoPoint]) -> bool {
    if points.len() < 10 {
        return false;
    }
    closure_gap(points)
        .map(|(dlat, dlon)| dlat < CIRCULAR_CLOSURE_DEGREES && dlon < CIRCULAR_CLOSURE_DEGREES)
        .unwrap_or(false)
}

/// Average distance of the points from the straight line joining the ends.
fn is_linear(points: &[GeoPoint]) -> bool {
    if points.len() < 5 {
        return false;
    }
    let (start, end) = (points[0], points[points.len() - 1]);
    let dx = end.longitude - start.longitude;
    let dy = end.latitude - start.latitude;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return false;
    }

    let deviation: f64 = points
        .iter()
        .map(|p| {
            ((p.longitude - start.longitude) * dy - (p.latitude - start.latitude) * dx).abs()
                / length
        })
        .sum::<f64>()
        / points.len() as f64;
    deviation < LINEAR_DEVIATION_DEGREES
}

fn circuit_completion(points: &[GeoPoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let Some((dlat, dlon)) = closure_gap(points) else {
        return 0.0;
    };
    let gap = (dlat * dlat + dlon * dlon).sqrt();
    (1.0 - gap / CIRCUIT_COMPLETION_DEGREES).clamp(0.0, 1.0)
}

fn path_distance(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| {
            let dlat = pair[1].latitude - pair[0].latitude;
            let dlon = pair[1].longitude - pair[0].longitude;
            (dlat * dlat + dlon * dlon).sqrt() * MILES_PER_DEGREE
        })
        .sum()
}

fn values(samples: &[TelemetrySample], field: impl Fn(&TelemetrySample) -> Option<f64>) -> Vec<f64> {
    samples.iter().filter_map(field).collect()
}

fn share(values: &[f64], predicate: impl Fn(f64) -> bool) -> f64 {
    values.iter().filter(|v| predicate(**v)).count() as f64 / values.len() as f64
}

struct Stats {
    min: f64,
    max: f64,
    mean: f64,
}

impl Stats {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: values.iter().sum::<f64>() / values.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn log_of(samples: Vec<TelemetrySample>) -> FlightLog {
        FlightLog::from_samples("test", Vec::new(), samples)
    }

    fn tick(index: i64, lat: f64, lon: f64) -> TelemetrySample {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap();
        let mut sample = TelemetrySample::at(start + Duration::milliseconds(index * 100), lat, lon);
        sample.time_ms = Some(index as f64 * 100.0);
        sample
    }

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_metrics_from_log() {
        let samples = (0..5)
            .map(|i| {
                let mut s = tick(i, 37.0, -122.0);
                s.height_feet = Some(i as f64 * 10.0);
                s.speed_mph = Some(i as f64 * 2.0);
                s.mileage_feet = Some(i as f64 * 1320.0);
                s.battery_percent = Some(90.0 - i as f64);
                s.satellites = Some(10.0 + i as f64);
                s
            })
            .collect();
        let metrics = FlightMetrics::from_log(&log_of(samples));

        assert_eq!(metrics.max_altitude_feet, 40.0);
        assert_eq!(metrics.avg_altitude_feet, 20.0);
        assert_eq!(metrics.min_altitude_feet, 0.0);
        assert_eq!(metrics.max_speed_mph, 8.0);
        assert_eq!(metrics.total_distance_miles, 1.0);
        assert_eq!(metrics.battery_consumed, 4.0);
        assert_eq!(metrics.satellites_avg, 12.0);
        assert_eq!((metrics.satellites_min, metrics.satellites_max), (10, 14));
        assert!((metrics.duration_seconds - 0.4).abs() < 1e-9);
        assert_eq!(metrics.battery_per_mile(), 4.0);
    }

    #[test]
    fn test_metrics_without_columns_keep_defaults() {
        let metrics = FlightMetrics::from_log(&log_of(vec![tick(0, 37.0, -122.0)]));
        assert_eq!(metrics.battery_start, 100.0);
        assert_eq!(metrics.satellites_avg, 10.0);
        assert_eq!(metrics.max_speed_mph, 0.0);
    }

    #[test]
    fn test_speed_variance_needs_two_readings() {
        let mut one = tick(0, 37.0, -122.0);
        one.speed_mph = Some(5.0);
        assert_eq!(speed_variance(&log_of(vec![one.clone()])), None);

        let mut two = tick(1, 37.0, -122.0);
        two.speed_mph = Some(7.0);
        assert_eq!(speed_variance(&log_of(vec![one, two])), Some(2.0));
    }

    #[test]
    fn test_consistency_checks() {
        let samples: Vec<_> = (0..20)
            .map(|i| {
                let mut s = tick(i, 37.0, -122.0);
                s.battery_percent = Some(100.0 - i as f64 * 0.1);
                s.height_feet = Some(50.0);
                s
            })
            .collect();
        let checks = consistency_checks(&log_of(samples));
        assert_eq!(checks.get("timestamp_continuity"), Some(&true));
        assert_eq!(checks.get("gps_validity"), Some(&true));
        assert_eq!(checks.get("battery_consistency"), Some(&true));
        assert_eq!(checks.get("altitude_reasonable"), Some(&true));

        let mut sparse = vec![tick(0, 95.0, -122.0), tick(30, 95.0, -122.0)];
        sparse[1].height_feet = Some(2000.0);
        let checks = consistency_checks(&log_of(sparse));
        assert_eq!(checks.get("timestamp_continuity"), Some(&false));
        assert_eq!(checks.get("gps_validity"), Some(&false));
        assert_eq!(checks.get("altitude_reasonable"), Some(&false));
        assert!(!checks.contains_key("battery_consistency"));
    }

    #[test]
    fn test_circular_path() {
        let points: Vec<_> = (0..=12)
            .map(|i| {
                let angle = i as f64 / 12.0 * std::f64::consts::TAU;
                point(37.0 + 0.01 * angle.sin(), -122.0 + 0.01 * angle.cos())
            })
            .collect();
        let path = FlightPath::from_points(points);
        assert!(path.is_circular);
        assert_eq!(path.pattern(), "circular");
        assert!(path.circuit_completion > 0.99);
        let centroid = path.centroid.unwrap();
        assert!((centroid.latitude - 37.0).abs() < 0.002);
    }

    #[test]
    fn test_linear_path() {
        let points: Vec<_> = (0..6).map(|i| point(37.0 + i as f64 * 0.001, -122.0)).collect();
        let path = FlightPath::from_points(points);
        assert!(path.is_linear);
        assert!(!path.is_circular);
        assert_eq!(path.circuit_completion, 0.0);
        assert!((path.total_distance_miles - 0.005 * 69.0).abs() < 1e-9);
        let bounds = path.bounds.unwrap();
        assert!(bounds.contains(37.002, -122.0));
        assert!(!bounds.contains(37.01, -122.0));
    }

    #[test]
    fn test_empty_path() {
        let path = FlightPath::from_points(Vec::new());
        assert!(path.bounds.is_none());
        assert!(path.centroid.is_none());
        assert_eq!(path.pattern(), "irregular");
        assert_eq!(path.total_distance_miles, 0.0);
    }
}
