//! Test harness for isolated batch runs.
//!
//! The pipeline it builds reads only `.SRT` sidecars, so tests never depend
//! on ffprobe or ffmpeg being installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use dronemeta::batch::{BatchEvent, BatchProcessor, NoopProgress, ProgressReporter};
use dronemeta::classifier::MissionClassifier;
use dronemeta::config::schema::Config;
use dronemeta::extractor::{MetadataExtractor, SrtSidecarProbe};
use dronemeta::formatter::{output_stem, FormatterSet};
use dronemeta::pipeline::{JobRunner, Pipeline};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let input_dir = base.join("input");
        let output_dir = base.join("output");
        let config_dir = base.join("config");

        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            input_dir,
            output_dir,
            config_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file under the input dir, creating parent directories.
    pub fn write_input(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create input subdir");
        }
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// A placeholder video plus, when given, its `.SRT` sidecar.
    pub fn write_video(&self, relative: &str, srt: Option<&str>) -> PathBuf {
        let video = self.write_input(relative, b"\x00\x00\x00\x18ftypmp42");
        if let Some(content) = srt {
            let sidecar = video.with_extension("SRT");
            std::fs::write(&sidecar, content).expect("Failed to write sidecar");
        }
        video
    }

    /// Writes `config` as YAML into the config dir.
    pub fn write_config(&self, filename: &str, config: &Config) -> PathBuf {
        let path = self.config_dir.join(filename);
        let yaml = serde_yaml::to_string(config).expect("Failed to serialize config");
        std::fs::write(&path, yaml).expect("Failed to write config file");
        path
    }

    pub fn output(&self, relative: &str) -> PathBuf {
        self.output_dir.join(relative)
    }

    /// Output file for an input video, e.g. `video_output("box/a.mp4", "tables/", ".facts.csv")`.
    pub fn video_output(&self, relative_video: &str, dir: &str, suffix: &str) -> PathBuf {
        let stem = output_stem(&self.input_dir.join(relative_video));
        self.output_dir.join(format!("{}{}{}", dir, stem, suffix))
    }

    pub fn pipeline(&self, config: &Config) -> Arc<Pipeline> {
        let overwrite = config.batch.overwrite_existing;
        Arc::new(Pipeline::new(
            MetadataExtractor::new(vec![Box::new(SrtSidecarProbe::new())]),
            MissionClassifier::new(&config.classifier).expect("Invalid classifier config"),
            FormatterSet::from_config(config, overwrite),
            overwrite,
        ))
    }

    pub fn processor(&self, config: &Config) -> BatchProcessor {
        self.processor_with(config, self.pipeline(config), Arc::new(NoopProgress))
    }

    pub fn processor_with(
        &self,
        config: &Config,
        runner: Arc<dyn JobRunner>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BatchProcessor {
        BatchProcessor::new(config, runner, reporter).expect("Invalid batch config")
    }
}

/// Reporter that checks the counter invariant at every event it sees and
/// counts checkpoint saves.
#[derive(Default)]
pub struct InvariantReporter {
    pub observations: Mutex<usize>,
    pub violations: Mutex<Vec<String>>,
    pub processed_seen: Mutex<Vec<usize>>,
    pub checkpoints_saved: Mutex<usize>,
}

impl ProgressReporter for InvariantReporter {
    fn report(&self, event: &BatchEvent<'_>) {
        if let BatchEvent::CheckpointSaved { .. } = event {
            *self.checkpoints_saved.lock().unwrap() += 1;
            return;
        }
        let progress = match event {
            BatchEvent::Started { progress, .. }
            | BatchEvent::JobFinished { progress, .. }
            | BatchEvent::Finished { progress } => *progress,
            _ => return,
        };
        *self.observations.lock().unwrap() += 1;
        self.processed_seen.lock().unwrap().push(progress.processed());
        if !progress.is_consistent() {
            self.violations
                .lock()
                .unwrap()
                .push(format!("{:?}", progress.counts()));
        }
    }
}
