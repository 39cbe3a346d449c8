//! Mission-based layout of formatter outputs.
//!
//! Copies each video's outputs into `<root>/<mission>/{metadata, metadata/thumbnails,
//! reports, semantic}` and records the run in `batch_reports/`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::schema::Config;
use crate::error::FormatError;
use crate::models::{MissionType, VideoAnalysisResult};
use crate::storage::{ensure_directory, write_atomic};

const MISSION_SUBDIRECTORIES: [&str; 4] =
    ["metadata", "metadata/thumbnails", "reports", "semantic"];
const BATCH_REPORTS_DIR: &str = "batch_reports";
const LOGS_DIR: &str = "logs";

/// Subdirectory of a mission folder that receives files with this extension.
pub fn target_subdirectory(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg" | "png") => "metadata/thumbnails",
        Some("md" | "json") => "metadata",
        Some("csv") => "semantic",
        Some("html" | "txt") => "reports",
        _ => "metadata",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    /// False when the target already existed and was kept.
    pub copied: bool,
}

#[derive(Debug, Default)]
pub struct OrganizationSummary {
    pub videos: usize,
    pub files: Vec<OrganizedFile>,
    pub directories_created: Vec<PathBuf>,
    pub mission_counts: BTreeMap<String, usize>,
    pub report_path: Option<PathBuf>,
}

impl OrganizationSummary {
    pub fn copied(&self) -> usize {
        self.files.iter().filter(|f| f.copied).count()
    }
}

pub struct MissionOrganizer {
    root: PathBuf,
    overwrite: bool,
}

impl MissionOrganizer {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            root: root.into(),
            overwrite,
        }
    }

    /// A relative `organized_directory` is placed under the output directory.
    pub fn from_config(config: &Config, overwrite: bool) -> Self {
        let organized = &config.output.organized_directory;
        let root = if organized.is_absolute() {
            organized.clone()
        } else {
            config.output.directory.join(organized)
        };
        Self::new(root, overwrite)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unclassified videos go with box missions.
    pub fn mission_of(result: &VideoAnalysisResult) -> MissionType {
        result
            .mission
            .as_ref()
            .map(|m| m.mission_type)
            .unwrap_or(MissionType::Box)
    }

    /// Creates the mission layout and copies whatever `outputs_of` names for
    /// each result. Missing sources are skipped with a warning.
    pub fn organize<F>(
        &self,
        results: &[VideoAnalysisResult],
        outputs_of: F,
    ) -> Result<OrganizationSummary, FormatError>
    where
        F: Fn(&VideoAnalysisResult) -> Vec<PathBuf>,
    {
        let mut summary = OrganizationSummary {
            videos: results.len(),
            ..OrganizationSummary::default()
        };
        self.create_layout(&mut summary)?;

        for result in results {
            let mission = Self::mission_of(result);
            *summary
                .mission_counts
                .entry(mission.as_str().to_string())
                .or_insert(0) += 1;

            for source in outputs_of(result) {
                if !source.is_file() {
                    warn!("Output {} is missing, not organizing it", source.display());
                    continue;
                }
                summary.files.push(self.place(&source, mission)?);
            }
        }

        let report = render_organization_summary(&summary, &self.root);
        let report_path = self.root.join(BATCH_REPORTS_DIR).join(format!(
            "organization_summary_{}.md",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        write_atomic(&report_path, report.as_bytes()).map_err(|e| FormatError::WriteFile {
            path: report_path.clone(),
            reason: e.to_string(),
        })?;
        summary.report_path = Some(report_path);

        info!(
            "Organized {} files ({} copied) for {} videos under {}",
            summary.files.len(),
            summary.copied(),
            summary.videos,
            self.root.display()
        );
        Ok(summary)
    }

    fn create_layout(&self, summary: &mut OrganizationSummary) -> Result<(), FormatError> {
        let mut directories = Vec::new();
        for mission in MissionType::ALL {
            for sub in MISSION_SUBDIRECTORIES {
                directories.push(self.root.join(mission.as_str()).join(sub));
            }
        }
        directories.push(self.root.join(BATCH_REPORTS_DIR));
        directories.push(self.root.join(LOGS_DIR));

        for directory in directories {
            if !directory.is_dir() {
                ensure_directory(&directory)?;
                summary.directories_created.push(directory);
            }
        }
        Ok(())
    }

    fn place(&self, source: &Path, mission: MissionType) -> Result<OrganizedFile, FormatError> {
        let file_name = source.file_name().unwrap_or(source.as_os_str());
        let target = self
            .root
            .join(mission.as_str())
            .join(target_subdirectory(source))
            .join(file_name);

        if same_file(source, &target) || (!self.overwrite && target.exists()) {
            debug!("Keeping existing {}", target.display());
            return Ok(OrganizedFile {
                source: source.to_path_buf(),
                target,
                copied: false,
            });
        }

        std::fs::copy(source, &target).map_err(|e| FormatError::Copy {
            from: source.to_path_buf(),
            to: target.clone(),
            source: e,
        })?;
        Ok(OrganizedFile {
            source: source.to_path_buf(),
            target,
            copied: true,
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

pub fn render_organization_summary(summary: &OrganizationSummary, root: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Batch Organization Summary\n");
    let _ = writeln!(
        out,
        "Generated: {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    let _ = writeln!(out, "## Overview\n");
    let _ = writeln!(out, "- **Total videos processed**: {}", summary.videos);
    let _ = writeln!(out, "- **Files organized**: {}", summary.copied());
    let _ = writeln!(
        out,
        "- **Directories created**: {}\n",
        summary.directories_created.len()
    );

    let _ = writeln!(out, "## Mission Type Distribution\n");
    for (mission, count) in &summary.mission_counts {
        let _ = writeln!(out, "- {}: {} videos", mission, count);
    }
    out.push('\n');

    let _ = writeln!(out, "## Directory Structure Created\n");
    let _ = writeln!(out, "```");
    let _ = writeln!(out, "{}/", root.display());
    let mut tree: BTreeSet<&Path> = BTreeSet::new();
    for directory in &summary.directories_created {
        for ancestor in relative_to(directory, root).ancestors() {
            if !ancestor.as_os_str().is_empty() {
                tree.insert(ancestor);
            }
        }
    }
    for entry in tree {
        let depth = entry.components().count();
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(out, "{}{}/", "  ".repeat(depth), name);
    }
    let _ = writeln!(out, "```\n");

    let _ = writeln!(out, "## File Organization Details\n");
    for file in summary.files.iter().filter(|f| f.copied) {
        let name = file
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "- `{}` -> `{}`",
            name,
            relative_to(&file.target, root).display()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::test_support::sample_result;
    use tempfile::TempDir;

    fn write_outputs(dir: &Path, stem: &str) -> Vec<PathBuf> {
        ["md", "json", "csv"]
            .iter()
            .map(|ext| {
                let path = dir.join(format!("{}.{}", stem, ext));
                std::fs::write(&path, ext.as_bytes()).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_target_subdirectory_by_extension() {
        assert_eq!(target_subdirectory(Path::new("a.JPG")), "metadata/thumbnails");
        assert_eq!(target_subdirectory(Path::new("a.png")), "metadata/thumbnails");
        assert_eq!(target_subdirectory(Path::new("a.md")), "metadata");
        assert_eq!(target_subdirectory(Path::new("a.json")), "metadata");
        assert_eq!(target_subdirectory(Path::new("a.csv")), "semantic");
        assert_eq!(target_subdirectory(Path::new("a.txt")), "reports");
        assert_eq!(target_subdirectory(Path::new("a.bin")), "metadata");
    }

    #[test]
    fn test_organize_copies_into_mission_layout() {
        let output = TempDir::new().unwrap();
        let organizer = MissionOrganizer::new(output.path().join("organized"), false);

        let boxed = sample_result("DJI_0001.MP4");
        let mut safety = sample_result("DJI_0002.MP4");
        if let Some(mission) = safety.mission.as_mut() {
            mission.mission_type = MissionType::Safety;
        }
        let mut unclassified = sample_result("DJI_0003.MP4");
        unclassified.mission = None;

        let out = output.path().to_path_buf();
        let summary = organizer
            .organize(&[boxed, safety, unclassified], |r| {
                write_outputs(&out, &r.video.filename)
            })
            .unwrap();

        let root = organizer.root();
        assert!(root.join("box/metadata/DJI_0001.MP4.md").is_file());
        assert!(root.join("box/semantic/DJI_0001.MP4.csv").is_file());
        assert!(root.join("safety/metadata/DJI_0002.MP4.json").is_file());
        assert!(root.join("box/metadata/DJI_0003.MP4.md").is_file());
        assert!(root.join("logs").is_dir());
        assert!(root.join("safety/reports").is_dir());

        assert_eq!(summary.videos, 3);
        assert_eq!(summary.copied(), 9);
        assert_eq!(summary.mission_counts.get("box"), Some(&2));
        assert_eq!(summary.mission_counts.get("safety"), Some(&1));
        assert_eq!(summary.directories_created.len(), 10);

        let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
        assert!(report.starts_with("# Batch Organization Summary"));
        assert!(report.contains("- **Files organized**: 9"));
        assert!(report.contains("- box: 2 videos"));
        assert!(report.contains("- `DJI_0002.MP4.json` -> `safety/metadata/DJI_0002.MP4.json`"));
    }

    #[test]
    fn test_existing_targets_are_kept_without_overwrite() {
        let output = TempDir::new().unwrap();
        let root = output.path().join("organized");
        let result = sample_result("DJI_0001.MP4");
        let out = output.path().to_path_buf();

        MissionOrganizer::new(&root, false)
            .organize(std::slice::from_ref(&result), |r| {
                write_outputs(&out, &r.video.filename)
            })
            .unwrap();
        std::fs::write(root.join("box/metadata/DJI_0001.MP4.md"), "edited").unwrap();

        let second = MissionOrganizer::new(&root, false)
            .organize(std::slice::from_ref(&result), |r| {
                write_outputs(&out, &r.video.filename)
            })
            .unwrap();
        assert_eq!(second.copied(), 0);
        assert!(second.directories_created.is_empty());
        assert_eq!(
            std::fs::read_to_string(root.join("box/metadata/DJI_0001.MP4.md")).unwrap(),
            "edited"
        );

        let third = MissionOrganizer::new(&root, true)
            .organize(std::slice::from_ref(&result), |r| {
                write_outputs(&out, &r.video.filename)
            })
            .unwrap();
        assert_eq!(third.copied(), 3);
        assert_eq!(
            std::fs::read_to_string(root.join("box/metadata/DJI_0001.MP4.md")).unwrap(),
            "md"
        );
    }

    #[test]
    fn test_missing_outputs_are_skipped() {
        let output = TempDir::new().unwrap();
        let organizer = MissionOrganizer::new(output.path().join("organized"), false);
        let missing = output.path().join("gone.json");

        let summary = organizer
            .organize(&[sample_result("DJI_0001.MP4")], |_| vec![missing.clone()])
            .unwrap();
        assert!(summary.files.is_empty());
        assert!(summary.report_path.is_some());
    }

    #[test]
    fn test_relative_root_is_under_output_directory() {
        let mut config = Config::default();
        config.output.directory = PathBuf::from("/data/out");
        assert_eq!(
            MissionOrganizer::from_config(&config, false).root(),
            Path::new("/data/out/organized")
        );

        config.output.organized_directory = PathBuf::from("/srv/missions");
        assert_eq!(
            MissionOrganizer::from_config(&config, false).root(),
            Path::new("/srv/missions")
        );
    }
}
