use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use log::{debug, warn};

use crate::config::schema::ThumbnailConfig;
use crate::error::FormatError;
use crate::formatter::{output_stem, OutputFormatter};
use crate::models::{file_name_of, VideoAnalysisResult};
use crate::storage::{ensure_directory, OutputWriter};
use crate::tools;

const THUMBNAIL_DIR: &str = "thumbnails";
const PLACEHOLDER_GREY: Rgb<u8> = Rgb([96, 96, 96]);

pub fn thumbnail_file_name(video_path: &Path) -> String {
    format!("{}_thumbnail.jpg", output_stem(video_path))
}

/// Poster frame grabbed with ffmpeg, or a grey placeholder when that fails
/// and fallback is enabled.
pub struct ThumbnailFormatter {
    writer: OutputWriter,
    config: ThumbnailConfig,
    ffmpeg: Option<PathBuf>,
    deadline: Duration,
}

impl ThumbnailFormatter {
    pub fn new(writer: OutputWriter, config: ThumbnailConfig) -> Self {
        Self {
            writer,
            config,
            ffmpeg: None,
            deadline: tools::DEFAULT_TOOL_DEADLINE,
        }
    }

    /// ffmpeg is killed once it runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Uses a fixed ffmpeg binary instead of resolving one from the environment.
    pub fn with_ffmpeg_binary(mut self, binary: PathBuf) -> Self {
        self.ffmpeg = Some(binary);
        self
    }

    fn relative_path(video_path: &Path) -> PathBuf {
        Path::new(THUMBNAIL_DIR).join(thumbnail_file_name(video_path))
    }

    fn extract_frame(&self, video: &Path, target: &Path) -> Result<(), FormatError> {
        let failure = |message: String| FormatError::Thumbnail {
            video: file_name_of(video),
            message,
        };

        let directory = target.parent().unwrap_or_else(|| Path::new("."));
        ensure_directory(directory)?;
        let temp_path = directory.join(format!(".{}.tmp.jpg", file_name_of(target)));

        let binary = self.ffmpeg.clone().unwrap_or_else(tools::ffmpeg_path);
        let mut command = Command::new(&binary);
        command
            .args(["-y", "-v", "error", "-ss"])
            .arg(format!("{:.3}", self.config.timestamp))
            .arg("-i")
            .arg(video)
            .args(["-vframes", "1", "-vf"])
            .arg(format!("scale={}:-2", self.config.width))
            .arg("-q:v")
            .arg(self.config.quality.to_string())
            .arg(&temp_path);
        let output = tools::output_with_deadline(&mut command, self.deadline).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            failure(format!("cannot run '{}': {}", binary.display(), e))
        })?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&temp_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!("ffmpeg failed: {}", stderr.trim())));
        }

        // ffmpeg exits cleanly without writing a frame when seeking past the end.
        let size = std::fs::metadata(&temp_path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = std::fs::remove_file(&temp_path);
            return Err(failure("ffmpeg produced no frame".to_string()));
        }

        std::fs::rename(&temp_path, target).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            FormatError::WriteFile {
                path: target.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }
}

impl OutputFormatter for ThumbnailFormatter {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    fn planned_outputs(&self, video_path: &Path) -> Vec<PathBuf> {
        vec![self.writer.resolve(Self::relative_path(video_path))]
    }

    fn format_single(&self, result: &VideoAnalysisResult) -> Result<Vec<PathBuf>, FormatError> {
        let relative = Self::relative_path(&result.video.path);
        let target = self.writer.resolve(&relative);
        if self.writer.should_skip(&target) {
            debug!("Keeping existing thumbnail {}", target.display());
            return Ok(vec![target]);
        }

        match self.extract_frame(&result.video.path, &target) {
            Ok(()) => Ok(vec![target]),
            Err(e) if self.config.fallback_enabled => {
                warn!("{}; writing placeholder thumbnail", e);
                let bytes = placeholder_jpeg(self.config.width, self.config.quality)?;
                let path = self.writer.write(&relative, &bytes).into_result()?;
                Ok(vec![path])
            }
            Err(e) => Err(e),
        }
    }
}

/// Grey 16:9 JPEG used when no frame can be extracted.
pub fn placeholder_jpeg(width: u32, ffmpeg_quality: u8) -> Result<Vec<u8>, FormatError> {
    let width = width.max(16);
    let height = (width * 9 / 16).max(9);
    let image = RgbImage::from_pixel(width, height, PLACEHOLDER_GREY);

    // ffmpeg's -q:v runs 1 (best) to 31; JPEG quality runs the other way.
    let quality = 100u8.saturating_sub(ffmpeg_quality.saturating_sub(1).saturating_mul(3));

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.max(1))
        .encode_image(&image)
        .map_err(|e| FormatError::Render {
            formatter: "thumbnail",
            message: e.to_string(),
        })?;
    Ok(bytes)
}
