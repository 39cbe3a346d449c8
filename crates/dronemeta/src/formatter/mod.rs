//! Output formatters.
//!
//! Each formatter renders an analysis result into one or more files under the
//! output directory. Formatters are built by the caller and handed to the
//! pipeline as a [`FormatterSet`].

pub mod json;
pub mod markdown;
pub mod organizer;
pub mod tabular;
pub mod thumbnail;

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::schema::{Config, OutputFormat};
use crate::error::FormatError;
use crate::models::{file_name_of, VideoAnalysisResult};
use crate::storage::OutputWriter;

pub use json::JsonFormatter;
pub use markdown::MarkdownFormatter;
pub use organizer::{MissionOrganizer, OrganizationSummary};
pub use tabular::TabularFormatter;
pub use thumbnail::ThumbnailFormatter;

const STEM_DIGEST_LEN: usize = 8;

/// Base name of every per-video output: the file name plus a short blake3
/// digest of the absolute video path. Same-named videos in different
/// folders get different stems.
pub fn output_stem(video_path: &Path) -> String {
    let absolute =
        std::path::absolute(video_path).unwrap_or_else(|_| video_path.to_path_buf());
    let digest = blake3::hash(absolute.as_os_str().as_encoded_bytes()).to_hex();
    format!(
        "{}_{}",
        file_name_of(video_path),
        &digest.as_str()[..STEM_DIGEST_LEN]
    )
}

pub trait OutputFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Files `format_single` would produce for this video.
    fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf>;

    fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError>;

    /// Formats every result; a failing item is logged and left out.
    fn format_batch(&self, results: &[VideoAnalysisResult]) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for result in results {
            match self.format_single(result) {
                Ok(paths) => written.extend(paths),
                Err(e) => warn!(
                    "{} formatter failed for {}: {}",
                    self.name(),
                    result.video.filename,
                    e
                ),
            }
        }
        written
    }
}

#[derive(Default)]
pub struct FormatterSet {
    formatters: Vec<Box<dyn OutputFormatter>>,
}

impl FormatterSet {
    pub fn new(formatters: Vec<Box<dyn OutputFormatter>>) -> Self {
        Self { formatters }
    }

    /// Builds the formatters named in `output.formats`, in that order.
    pub fn from_config(config: &Config, overwrite: bool) -> Self {
        let writer = OutputWriter::new(&config.output.directory, overwrite);
        let mut formatters: Vec<Box<dyn OutputFormatter>> = Vec::new();

        for format in &config.output.formats {
            let formatter: Box<dyn OutputFormatter> = match format {
                OutputFormat::Markdown => Box::new(MarkdownFormatter::new(writer.clone())),
                OutputFormat::Json => Box::new(JsonFormatter::new(writer.clone())),
                OutputFormat::Csv => Box::new(TabularFormatter::new(writer.clone())),
                OutputFormat::Thumbnail => Box::new(
                    ThumbnailFormatter::new(writer.clone(), config.thumbnail.clone())
                        .with_deadline(config.batch.timeout()),
                ),
            };
            if formatters.iter().any(|f| f.name() == formatter.name()) {
                continue;
            }
            formatters.push(formatter);
        }

        info!(
            "Output formatters: {}",
            formatters
                .iter()
                .map(|f| f.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self { formatters }
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formatters.iter().map(|f| f.name()).collect()
    }

    pub fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf> {
        self.formatters
            .iter()
            .flat_map(|f| f.planned_outputs(video_path))
            .collect()
    }

    /// Runs every formatter; the first failure fails the whole video.
    pub fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError> {
        let mut written = Vec::new();
        for formatter in &self.formatters {
            written.extend(formatter.format_single(result)?);
        }
        Ok(written)
    }

    pub fn format_batch(&self, results: &[VideoAnalysisResult]) -> Vec<PathBuf> {
        self.formatters
            .iter()
            .flat_map(|f| f.format_batch(results))
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OutputFormat;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_follows_format_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.output.directory = temp_dir.path().to_path_buf();
        config.output.formats = vec![OutputFormat::Json, OutputFormat::Markdown, OutputFormat::Json];

        let set = FormatterSet::from_config(&config, false);
        assert_eq!(set.names(), vec!["json", "markdown"]);

        let video = Path::new("/flights/DJI_0001.MP4");
        let stem = output_stem(video);
        assert_eq!(
            set.planned_outputs(video),
            vec![
                temp_dir.path().join(format!("{}.json", stem)),
                temp_dir.path().join(format!("{}.md", stem)),
            ]
        );
    }

    #[test]
    fn test_output_stem_separates_same_named_videos() {
        let a = output_stem(Path::new("/flights/flight_a/DJI_0001.MP4"));
        let b = output_stem(Path::new("/flights/flight_b/DJI_0001.MP4"));

        assert!(a.starts_with("DJI_0001.MP4_"));
        assert_eq!(a.len(), "DJI_0001.MP4_".len() + STEM_DIGEST_LEN);
        assert_ne!(a, b);
        assert_eq!(a, output_stem(Path::new("/flights/flight_a/DJI_0001.MP4")));
    }

    #[test]
    fn test_output_stem_ignores_relative_spelling() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            output_stem(Path::new("DJI_0001.MP4")),
            output_stem(&cwd.join("DJI_0001.MP4"))
        );
    }

    #[test]
    fn test_format_single_collects_all_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(temp_dir.path(), false);
        let set = FormatterSet::new(vec![
            Box::new(JsonFormatter::new(writer.clone())),
            Box::new(TabularFormatter::new(writer)),
        ]);

        let result = test_support::sample_result("DJI_0001.MP4");
        let written = set.format_single(&result).unwrap();

        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }
}
