use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::FormatError;

/// Result of asking the writer to produce one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// The file already existed and overwriting is disabled.
    SkippedExisting(PathBuf),
    Failed { path: PathBuf, reason: String },
}

impl WriteOutcome {
    pub fn path(&self) -> &Path {
        match self {
            WriteOutcome::Written(path)
            | WriteOutcome::SkippedExisting(path)
            | WriteOutcome::Failed { path, .. } => path,
        }
    }

    /// Both written and pre-existing files count as produced output.
    pub fn into_result(self) -> Result<PathBuf, FormatError> {
        match self {
            WriteOutcome::Written(path) | WriteOutcome::SkippedExisting(path) => Ok(path),
            WriteOutcome::Failed { path, reason } => Err(FormatError::WriteFile { path, reason }),
        }
    }
}

/// Writes output files, honoring the overwrite setting.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_directory: PathBuf,
    overwrite: bool,
}

impl OutputWriter {
    pub fn new<P: AsRef<Path>>(output_directory: P, overwrite: bool) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
            overwrite,
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Path of `relative` inside the output directory.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.output_directory.join(relative)
    }

    /// Existing target and no overwrite: returns `SkippedExisting` untouched.
    pub fn should_skip(&self, path: &Path) -> bool {
        !self.overwrite && path.exists()
    }

    pub fn write(&self, relative: impl AsRef<Path>, content: &[u8]) -> WriteOutcome {
        let path = self.resolve(relative);
        if self.should_skip(&path) {
            debug!("Keeping existing {}", path.display());
            return WriteOutcome::SkippedExisting(path);
        }
        Self::store(path, content)
    }

    /// Writes regardless of the overwrite setting. Used for batch-wide
    /// aggregates, which must reflect the current run.
    pub fn replace(&self, relative: impl AsRef<Path>, content: &[u8]) -> WriteOutcome {
        Self::store(self.resolve(relative), content)
    }

    fn store(path: PathBuf, content: &[u8]) -> WriteOutcome {
        match write_atomic(&path, content) {
            Ok(()) => WriteOutcome::Written(path),
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                WriteOutcome::Failed {
                    reason: e.to_string(),
                    path,
                }
            }
        }
    }
}

pub fn ensure_directory(path: &Path) -> Result<(), FormatError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| FormatError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Writes `content` to a sibling temp file, then renames it over `path`.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let (temp_path, mut file) = create_temp_sibling(path)?;
    let written = file
        .write_all(content)
        .and_then(|_| file.sync_all())
        .and_then(|_| {
            drop(file);
            std::fs::rename(&temp_path, path)
        });

    if written.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    written
}

/// Creates a uniquely named temp file next to `path` with `create_new`,
/// so concurrent writers never share one.
fn create_temp_sibling(path: &Path) -> std::io::Result<(PathBuf, std::fs::File)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let directory = path.parent().unwrap_or_else(|| Path::new("."));

    let mut last_error = None;
    for counter in 0..1000u32 {
        let candidate = directory.join(format!(".{}.{}.{}.tmp", name, std::process::id(), counter));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                last_error = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free temp file name")
    }))
}
