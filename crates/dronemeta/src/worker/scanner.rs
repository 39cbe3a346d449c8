use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

/// Case-insensitive extension check.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Expands files and directories into the sorted, de-duplicated list of
/// videos a batch works on.
pub struct VideoScanner {
    inputs: Vec<PathBuf>,
}

impl VideoScanner {
    pub fn new<P: AsRef<Path>>(inputs: &[P]) -> Self {
        Self {
            inputs: inputs.iter().map(|p| p.as_ref().to_path_buf()).collect(),
        }
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn scan(&self) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();

        for input in &self.inputs {
            if input.is_file() {
                if is_video_file(input) {
                    found.insert(input.clone());
                } else {
                    debug!("Ignoring non-video input {}", input.display());
                }
                continue;
            }

            if !input.is_dir() {
                warn!("Input path does not exist: {}", input.display());
                continue;
            }

            for entry in WalkDir::new(input).min_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", input.display(), e);
                        continue;
                    }
                };
                if entry.file_type().is_file() && is_video_file(entry.path()) {
                    debug!("Found video: {}", entry.path().display());
                    found.insert(entry.into_path());
                }
            }
        }

        info!(
            "Discovered {} videos in {} input paths",
            found.len(),
            self.inputs.len()
        );
        found.into_iter().collect()
    }
}
