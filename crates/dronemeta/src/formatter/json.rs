use std::path::{Path, PathBuf};

use log::warn;

use crate::error::FormatError;
use crate::formatter::{output_stem, OutputFormatter};
use crate::models::VideoAnalysisResult;
use crate::storage::OutputWriter;

const BATCH_FILE: &str = "analysis_results.json";

/// Full analysis result as pretty-printed JSON, one file per video.
pub struct JsonFormatter {
    writer: OutputWriter,
}

impl JsonFormatter {
    pub fn new(writer: OutputWriter) -> Self {
        Self { writer }
    }

    fn file_name(video_path: &Path) -> String {
        format!("{}.json", output_stem(video_path))
    }
}

impl OutputFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf> {
        vec![self.writer.resolve(Self::file_name(video_path))]
    }

    fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError> {
        let body = serde_json::to_vec_pretty(result).map_err(|e| FormatError::Render {
            formatter: "json",
            message: e.to_string(),
        })?;

        let path = self
            .writer
            .write(Self::file_name(&result.video.path), &body)
            .into_result()?;
        Ok(vec![path])
    }

    /// Per-video files plus one array holding every result.
    fn format_batch(&self, results: &[VideoAnalysisResult]) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for result in results {
            match self.format_single(result) {
                Ok(paths) => written.extend(paths),
                Err(e) => warn!("json formatter failed for {}: {}", result.video.filename, e),
            }
        }

        if results.is_empty() {
            return written;
        }
        match serde_json::to_vec_pretty(results) {
            Ok(body) => match self.writer.replace(BATCH_FILE, &body).into_result() {
                Ok(path) => written.push(path),
                Err(e) => warn!("Failed to write {}: {}", BATCH_FILE, e),
            },
            Err(e) => warn!("Failed to encode batch results: {}", e),
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::test_support::sample_result;
    use tempfile::TempDir;

    #[test]
    fn test_json_round_trips_result() {
        let temp_dir = TempDir::new().unwrap();
        let formatter = JsonFormatter::new(OutputWriter::new(temp_dir.path(), false));
        let result = sample_result("DJI_0001.MP4");

        let written = formatter.format_single(&result).unwrap();
        assert_eq!(
            written,
            vec![temp_dir
                .path()
                .join(format!("{}.json", output_stem(&result.video.path)))]
        );

        let parsed: VideoAnalysisResult =
            serde_json::from_slice(&std::fs::read(&written[0]).unwrap()).unwrap();
        assert_eq!(parsed.video.filename, "DJI_0001.MP4");
        assert_eq!(parsed.specs.width, Some(3840));
        assert_eq!(parsed.mission.unwrap().bay_designation.as_deref(), Some("8B-7F"));
        assert_eq!(parsed.vendor_metadata, result.vendor_metadata);
    }

    #[test]
    fn test_batch_writes_combined_file() {
        let temp_dir = TempDir::new().unwrap();
        let formatter = JsonFormatter::new(OutputWriter::new(temp_dir.path(), false));
        let results = vec![sample_result("a.mp4"), sample_result("b.mp4")];

        let written = formatter.format_batch(&results);

        assert_eq!(written.len(), 3);
        let combined: Vec<VideoAnalysisResult> = serde_json::from_slice(
            &std::fs::read(temp_dir.path().join(BATCH_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(combined.len(), 2);
    }

    #[test]
    fn test_combined_file_is_rebuilt_each_batch() {
        let temp_dir = TempDir::new().unwrap();
        let formatter = JsonFormatter::new(OutputWriter::new(temp_dir.path(), false));

        formatter.format_batch(&[sample_result("a.mp4")]);
        formatter.format_batch(&[sample_result("a.mp4"), sample_result("b.mp4")]);

        let combined: Vec<VideoAnalysisResult> = serde_json::from_slice(
            &std::fs::read(temp_dir.path().join(BATCH_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1].video.filename, "b.mp4");
    }
}
