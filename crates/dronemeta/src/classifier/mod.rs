pub mod rules;

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use log::{debug, info};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::config::schema::{ClassificationRule, ClassifierConfig};
use crate::error::ConfigError;
use crate::models::{MissionData, MissionType, VideoAnalysisResult};

pub use rules::builtin_rules;

const FILENAME_MATCH_SCORE: f64 = 0.8;
const DIRECTORY_MATCH_SCORE: f64 = 0.7;
const RANGE_MATCH_SCORE: f64 = 0.3;
const KEYWORD_MATCH_SCORE: f64 = 0.2;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const HIGH_CONFIDENCE: f64 = 0.7;
const ASSUMED_SPEED_MPH: f64 = 10.0;

pub struct MissionClassifier {
    rules: Vec<ClassificationRule>,
    min_confidence: f64,
    default_mission: MissionType,
    manual_overrides: BTreeMap<String, MissionType>,
    /// Pre-compiled regex patterns, indexed by pattern string
    compiled_patterns: HashMap<String, Regex>,
}

/// Distribution summary over a set of classifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationStatistics {
    pub total: usize,
    pub distribution: BTreeMap<MissionType, usize>,
    pub average_confidence: f64,
    pub high_confidence_percentage: f64,
}

impl MissionClassifier {
    /// Builds a classifier from config. Configured rules replace built-ins of
    /// the same name and are appended otherwise.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let mut rules = if config.use_builtin_rules {
            builtin_rules()
        } else {
            Vec::new()
        };
        for rule in &config.rules {
            match rules.iter_mut().find(|r| r.name == rule.name) {
                Some(existing) => *existing = rule.clone(),
                None => rules.push(rule.clone()),
            }
        }

        let mut compiled_patterns = HashMap::new();
        for rule in &rules {
            for pattern in rule.patterns() {
                if compiled_patterns.contains_key(pattern) {
                    continue;
                }
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidRule {
                        name: rule.name.clone(),
                        reason: format!("invalid pattern '{}': {}", pattern, e),
                    })?;
                compiled_patterns.insert(pattern.clone(), regex);
            }
        }

        info!("Mission classifier initialized with {} rules", rules.len());

        Ok(Self {
            rules,
            min_confidence: config.min_confidence,
            default_mission: config.default_mission,
            manual_overrides: config.manual_overrides.clone(),
            compiled_patterns,
        })
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn add_manual_override(&mut self, filename: impl Into<String>, mission: MissionType) {
        let filename = filename.into();
        info!("Manual classification override: {} -> {}", filename, mission);
        self.manual_overrides.insert(filename, mission);
    }

    /// Classifies one video. Directory rules only fire when `video_path` is given.
    pub fn classify(&self, result: &VideoAnalysisResult, video_path: Option<&Path>) -> MissionData {
        let filename = result.video.filename.as_str();
        let directories = video_path.map(directory_components).unwrap_or_default();

        if let Some(mission) = self.manual_overrides.get(filename) {
            return MissionData {
                mission_type: *mission,
                confidence: 1.0,
                method: "manual_override".to_string(),
                bay_designation: extract_bay_designation(&directories),
                max_altitude: max_altitude(result),
                flight_distance_miles: flight_distance(result),
                notes: vec![format!("Manual classification override for {}", filename)],
            };
        }

        let mut best: Option<(&ClassificationRule, f64)> = None;
        for rule in &self.rules {
            let confidence = self.score(rule, filename, &directories, result);
            debug!("Rule {} scored {:.3} for {}", rule.name, confidence, filename);
            if best.map_or(true, |(_, top)| confidence > top) {
                best = Some((rule, confidence));
            }
        }

        let (mission_type, confidence, method) = match best {
            Some((rule, confidence)) if confidence >= self.min_confidence => {
                (rule.mission, confidence, format!("rule:{}", rule.name))
            }
            _ => (
                self.default_mission,
                FALLBACK_CONFIDENCE,
                format!("default_{}", self.default_mission),
            ),
        };

        info!(
            "Classified {} as {} (confidence: {:.2}, method: {})",
            filename, mission_type, confidence, method
        );

        MissionData {
            mission_type,
            confidence,
            method,
            bay_designation: extract_bay_designation(&directories),
            max_altitude: max_altitude(result),
            flight_distance_miles: flight_distance(result),
            notes: Vec::new(),
        }
    }

    fn score(
        &self,
        rule: &ClassificationRule,
        filename: &str,
        directories: &[String],
        result: &VideoAnalysisResult,
    ) -> f64 {
        let filename_score = if self.any_match(&rule.filename_patterns, |re| re.is_match(filename)) {
            FILENAME_MATCH_SCORE
        } else {
            0.0
        };
        let directory_score = if self.any_match(&rule.directory_patterns, |re| {
            directories.iter().any(|d| re.is_match(d))
        }) {
            DIRECTORY_MATCH_SCORE
        } else {
            0.0
        };
        let metadata_score = metadata_score(rule, result);

        let total = rule.base_confidence
            + filename_score * rule.pattern_weight
            + directory_score * rule.pattern_weight
            + metadata_score * rule.metadata_weight;
        total.min(1.0)
    }

    fn any_match(&self, patterns: &[String], test: impl Fn(&Regex) -> bool) -> bool {
        patterns
            .iter()
            .filter_map(|p| self.compiled_patterns.get(p))
            .any(test)
    }
}

fn metadata_score(rule: &ClassificationRule, result: &VideoAnalysisResult) -> f64 {
    let mut score = 0.0;

    let altitude = result.gps.as_ref().and_then(|g| g.altitude_meters);
    if let (Some((min, max)), Some(alt)) = (rule.altitude_range, altitude) {
        if (min..=max).contains(&alt) {
            score += RANGE_MATCH_SCORE;
        }
    }

    if let (Some((min, max)), Some(duration)) = (rule.duration_range, result.video.duration_seconds) {
        if (min..=max).contains(&duration) {
            score += RANGE_MATCH_SCORE;
        }
    }

    for keyword in &rule.vendor_keywords {
        let keyword = keyword.to_lowercase();
        let found = result.vendor_metadata.iter().any(|(k, v)| {
            k.to_lowercase().contains(&keyword) || v.to_lowercase().contains(&keyword)
        });
        if found {
            score += KEYWORD_MATCH_SCORE;
        }
    }

    f64::min(score, 1.0)
}

fn directory_components(video_path: &Path) -> Vec<String> {
    video_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Deepest directory named like a bay (`8B-7F`, `8D`).
fn extract_bay_designation(directories: &[String]) -> Option<String> {
    directories
        .iter()
        .rev()
        .find(|d| is_bay_name(d))
        .cloned()
}

fn is_bay_name(name: &str) -> bool {
    fn unit(part: &str) -> bool {
        let digits = part.trim_end_matches(|c: char| c.is_ascii_uppercase());
        let letters = part.len() - digits.len();
        letters == 1 && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }

    match name.split_once('-') {
        Some((left, right)) => unit(left) && unit(right),
        None => unit(name),
    }
}

fn max_altitude(result: &VideoAnalysisResult) -> Option<f64> {
    result.gps.as_ref().and_then(|g| g.altitude_meters)
}

fn flight_distance(result: &VideoAnalysisResult) -> Option<f64> {
    result
        .video
        .duration_seconds
        .map(|seconds| seconds / 3600.0 * ASSUMED_SPEED_MPH)
}

pub fn classification_statistics(missions: &[MissionData]) -> ClassificationStatistics {
    let total = missions.len();
    let mut distribution = BTreeMap::new();
    for mission in missions {
        *distribution.entry(mission.mission_type).or_insert(0) += 1;
    }

    if total == 0 {
        return ClassificationStatistics {
            total,
            distribution,
            average_confidence: 0.0,
            high_confidence_percentage: 0.0,
        };
    }

    let confidence_sum: f64 = missions.iter().map(|m| m.confidence).sum();
    let high = missions
        .iter()
        .filter(|m| m.confidence >= HIGH_CONFIDENCE)
        .count();

    ClassificationStatistics {
        total,
        distribution,
        average_confidence: confidence_sum / total as f64,
        high_confidence_percentage: high as f64 / total as f64 * 100.0,
    }
}
