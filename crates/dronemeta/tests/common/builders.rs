//! Builders for configs, DJI subtitle sidecars and flight-log exports.

#![allow(dead_code)]

use std::fmt::Write;
use std::path::Path;

use dronemeta::config::schema::{BayConfig, ClassificationRule, Config, OutputFormat};
use dronemeta::models::MissionType;

/// Builder for `Config` instances tuned for fast, deterministic tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Single worker, one attempt, no backoff, no thumbnails.
    pub fn new(output_dir: &Path) -> Self {
        let mut config = Config::default();
        config.output.directory = output_dir.to_path_buf();
        config.output.formats = vec![OutputFormat::Json, OutputFormat::Markdown, OutputFormat::Csv];
        config.batch.max_workers = 1;
        config.batch.retry_attempts = 1;
        config.batch.retry_delay = 0.0;
        config.batch.timeout_per_video = 30;
        Self { config }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.config.batch.max_workers = count;
        self
    }

    pub fn retries(mut self, attempts: u32) -> Self {
        self.config.batch.retry_attempts = attempts;
        self
    }

    pub fn formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.config.output.formats = formats;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.batch.overwrite_existing = overwrite;
        self
    }

    pub fn resume(mut self, enabled: bool) -> Self {
        self.config.batch.enable_resume = enabled;
        self
    }

    pub fn save_interval(mut self, interval: usize) -> Self {
        self.config.batch.save_progress_interval = interval;
        self
    }

    pub fn stop_on_errors(mut self, max_error_percentage: f64) -> Self {
        self.config.batch.continue_on_error = false;
        self.config.batch.max_error_percentage = max_error_percentage;
        self
    }

    pub fn rule(mut self, rule: ClassificationRule) -> Self {
        self.config.classifier.rules.push(rule);
        self
    }

    pub fn manual_override(mut self, filename: &str, mission: MissionType) -> Self {
        self.config
            .classifier
            .manual_overrides
            .insert(filename.to_string(), mission);
        self
    }

    pub fn organize(mut self) -> Self {
        self.config.output.organize_by_mission = true;
        self
    }

    pub fn bay(mut self, bay: BayConfig) -> Self {
        self.config.flight.bays.push(bay);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// One frame of a modern DJI sidecar.
pub struct SrtFrameBuilder {
    pub latitude: f64,
    pub longitude: f64,
    pub rel_alt: f64,
    pub iso: u32,
}

impl Default for SrtFrameBuilder {
    fn default() -> Self {
        Self {
            latitude: 37.7749,
            longitude: -122.4194,
            rel_alt: 25.0,
            iso: 100,
        }
    }
}

/// Sidecar with `frames` one-second blocks, all at the same position.
pub fn srt_sidecar(frame: &SrtFrameBuilder, frames: usize) -> String {
    let mut out = String::new();
    for i in 0..frames {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "00:00:{:02},000 --> 00:00:{:02},000",
            i % 60,
            (i + 1) % 60
        );
        let _ = writeln!(
            out,
            "<font size=\"28\">FrameCnt: {}, DiffTime: 1000ms",
            i + 1
        );
        let _ = writeln!(out, "2024-05-01 09:30:{:02}.000", i % 60);
        let _ = writeln!(
            out,
            "[iso: {}] [shutter: 1/500.0] [fnum: 2.8] [ev: 0] [latitude: {:.6}] [longitude: {:.6}] [rel_alt: {:.3} abs_alt: {:.3}] </font>",
            frame.iso,
            frame.latitude,
            frame.longitude,
            frame.rel_alt,
            frame.rel_alt + 50.0
        );
        out.push('\n');
    }
    out
}

/// A flight-log CSV export: `rows` 10 Hz samples along a short north-bound
/// line starting at `origin`, a photo every second.
pub struct AirdataBuilder {
    pub origin: (f64, f64),
    pub rows: usize,
    pub satellites: u32,
    pub battery_start: f64,
    pub battery_drop: f64,
}

impl Default for AirdataBuilder {
    fn default() -> Self {
        Self {
            origin: (46.0132, 13.2506),
            rows: 30,
            satellites: 14,
            battery_start: 95.0,
            battery_drop: 3.0,
        }
    }
}

impl AirdataBuilder {
    pub fn build(&self) -> String {
        let mut out = String::from(
            "time(millisecond),datetime(utc),latitude,longitude,height_above_takeoff(feet),speed(mph),mileage(feet),satellites,isPhoto,isVideo,battery_percent,altitude(feet),flycState\n",
        );
        let last = self.rows.saturating_sub(1).max(1) as f64;
        for i in 0..self.rows {
            let battery = self.battery_start - self.battery_drop * i as f64 / last;
            let state = if i == 0 { "Motors_Started" } else { "P-GPS" };
            let _ = writeln!(
                out,
                "{},2024-05-01 14:30:{:02}.{},{:.6},{:.6},{},8.0,{},{},{},0,{:.1},{},{}",
                i * 100,
                i / 10,
                i % 10,
                self.origin.0 + i as f64 * 0.000001,
                self.origin.1,
                20 + i,
                i * 12,
                self.satellites,
                u8::from(i % 10 == 0),
                battery,
                1100 + i,
                state
            );
        }
        out
    }
}
