use std::path::{Path, PathBuf};

use tracing::{debug, info_span, warn};

use crate::classifier::MissionClassifier;
use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::extractor::MetadataExtractor;
use crate::formatter::FormatterSet;
use crate::models::VideoAnalysisResult;
use crate::sanitize;

use super::error::PipelineError;

/// What a successful attempt produced.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub result: VideoAnalysisResult,
    pub output_files: Vec<PathBuf>,
}

/// The per-file work a batch executes. Implementations must be safe to call
/// from several worker threads at once.
pub trait JobRunner: Send + Sync {
    fn run(&self, video_path: &Path) -> Result<JobOutput, PipelineError>;

    /// Outputs that make running this file unnecessary, if all of them exist.
    fn existing_outputs(&self, _video_path: &Path) -> Option<Vec<PathBuf>> {
        None
    }
}

/// Extract, classify and format one video.
pub struct Pipeline {
    extractor: MetadataExtractor,
    classifier: MissionClassifier,
    formatters: FormatterSet,
    overwrite_existing: bool,
}

impl Pipeline {
    pub fn new(
        extractor: MetadataExtractor,
        classifier: MissionClassifier,
        formatters: FormatterSet,
        overwrite_existing: bool,
    ) -> Self {
        Self {
            extractor,
            classifier,
            formatters,
            overwrite_existing,
        }
    }

    /// Production constructor: default probes and the formatters named in
    /// config. External tools get the per-video timeout as their deadline.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let overwrite = config.batch.overwrite_existing;
        Ok(Self::new(
            MetadataExtractor::with_default_probes(config.batch.timeout()),
            MissionClassifier::new(&config.classifier)?,
            FormatterSet::from_config(config, overwrite),
            overwrite,
        ))
    }

    pub fn formatters(&self) -> &FormatterSet {
        &self.formatters
    }

    /// Extraction and classification without writing anything.
    pub fn analyze(&self, video_path: &Path) -> Result<VideoAnalysisResult, PipelineError> {
        let report = {
            let _step = info_span!("extract").entered();
            self.extractor.extract(video_path)
        };

        if !report.success {
            return Err(PipelineError::Extraction(report.errors.join("; ")));
        }
        for warning in &report.warnings {
            debug!(warning = %warning, "extraction warning");
        }

        let mut result = report.into_analysis(None);
        {
            let _step = info_span!("classify").entered();
            result.mission = Some(self.classifier.classify(&result, Some(video_path)));
        }
        Ok(result)
    }
}

/// One-shot analysis of a single file with the production probes.
pub fn analyze_file(config: &Config, video_path: &Path) -> crate::Result<VideoAnalysisResult> {
    let pipeline = Pipeline::from_config(config)?;
    Ok(pipeline.analyze(video_path)?)
}

impl JobRunner for Pipeline {
    fn run(&self, video_path: &Path) -> Result<JobOutput, PipelineError> {
        let filename = sanitize::redact_path(video_path);
        let _pipeline_span = info_span!("pipeline", filename = %filename).entered();

        let result = self.analyze(video_path)?;

        let output_files = {
            let _step = info_span!("format").entered();
            self.formatters.format_single(&result).map_err(|e| {
                warn!(error = %e, "output generation failed");
                PipelineError::from(e)
            })?
        };

        Ok(JobOutput {
            result,
            output_files,
        })
    }

    fn existing_outputs(&self, video_path: &Path) -> Option<Vec<PathBuf>> {
        if self.overwrite_existing {
            return None;
        }
        let planned = self.formatters.planned_outputs(video_path);
        (!planned.is_empty() && planned.iter().all(|p| p.exists())).then_some(planned)
    }
}
