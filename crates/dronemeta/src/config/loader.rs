use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::config::schema::{BayConfig, ClassificationRule, Config};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json` files are JSON; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let config: Config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        // An empty YAML document deserializes to unit, not a map.
        ConfigFormat::Yaml if content.trim().is_empty() => Config::default(),
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let batch = &config.batch;
    if batch.max_workers == 0 {
        return Err(ConfigError::validation("batch.max_workers must be at least 1"));
    }
    if batch.timeout_per_video == 0 {
        return Err(ConfigError::validation(
            "batch.timeout_per_video must be at least 1 second",
        ));
    }
    if batch.retry_attempts == 0 {
        return Err(ConfigError::validation("batch.retry_attempts must be at least 1"));
    }
    if !batch.retry_delay.is_finite() || batch.retry_delay < 0.0 {
        return Err(ConfigError::validation(
            "batch.retry_delay must be a non-negative number of seconds",
        ));
    }
    if batch.save_progress_interval == 0 {
        return Err(ConfigError::validation(
            "batch.save_progress_interval must be at least 1",
        ));
    }
    if !(0.0..=100.0).contains(&batch.max_error_percentage) {
        return Err(ConfigError::validation(format!(
            "batch.max_error_percentage must be between 0 and 100, got {}",
            batch.max_error_percentage
        )));
    }
    if batch.progress_file_name.trim().is_empty() {
        return Err(ConfigError::validation(
            "batch.progress_file_name must not be empty",
        ));
    }

    if config.output.formats.is_empty() {
        return Err(ConfigError::validation(
            "output.formats must name at least one format",
        ));
    }

    let thumb = &config.thumbnail;
    if thumb.width == 0 {
        return Err(ConfigError::validation("thumbnail.width must be greater than 0"));
    }
    if !(1..=31).contains(&thumb.quality) {
        return Err(ConfigError::validation(format!(
            "thumbnail.quality must be between 1 and 31, got {}",
            thumb.quality
        )));
    }
    if !thumb.timestamp.is_finite() || thumb.timestamp < 0.0 {
        return Err(ConfigError::validation(
            "thumbnail.timestamp must be a non-negative number of seconds",
        ));
    }

    let classifier = &config.classifier;
    if !(0.0..=1.0).contains(&classifier.min_confidence) {
        return Err(ConfigError::validation(format!(
            "classifier.min_confidence must be between 0 and 1, got {}",
            classifier.min_confidence
        )));
    }

    let mut names = HashSet::new();
    for rule in &classifier.rules {
        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: "Duplicate rule name".to_string(),
            });
        }
        validate_rule(rule)?;
    }

    if config.output.organize_by_mission
        && config.output.organized_directory.as_os_str().is_empty()
    {
        return Err(ConfigError::validation(
            "output.organized_directory must not be empty",
        ));
    }

    let mut bay_ids = HashSet::new();
    for bay in &config.flight.bays {
        if !bay_ids.insert(bay.id.to_ascii_uppercase()) {
            return Err(ConfigError::validation(format!(
                "flight.bays has duplicate id '{}'",
                bay.id
            )));
        }
        validate_bay(bay)?;
    }

    Ok(())
}

fn validate_bay(bay: &BayConfig) -> Result<(), ConfigError> {
    if bay.id.trim().is_empty() {
        return Err(ConfigError::validation("flight.bays entries need an id"));
    }
    let b = &bay.bounds;
    let ordered = b.min_lat <= b.max_lat && b.min_lon <= b.max_lon;
    let in_range = (-90.0..=90.0).contains(&b.min_lat)
        && (-90.0..=90.0).contains(&b.max_lat)
        && (-180.0..=180.0).contains(&b.min_lon)
        && (-180.0..=180.0).contains(&b.max_lon);
    if !ordered || !in_range {
        return Err(ConfigError::validation(format!(
            "flight.bays '{}' has invalid bounds",
            bay.id
        )));
    }
    Ok(())
}

fn validate_rule(rule: &ClassificationRule) -> Result<(), ConfigError> {
    if rule.name.trim().is_empty() {
        return Err(ConfigError::InvalidRule {
            name: rule.name.clone(),
            reason: "Rule name must not be empty".to_string(),
        });
    }

    for pattern in rule.patterns() {
        if let Err(e) = Regex::new(pattern) {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: format!("invalid pattern '{}': {}", pattern, e),
            });
        }
    }

    for (label, range) in [
        ("altitude_range", rule.altitude_range),
        ("duration_range", rule.duration_range),
    ] {
        if let Some((min, max)) = range {
            if min > max {
                return Err(ConfigError::InvalidRule {
                    name: rule.name.clone(),
                    reason: format!("{} minimum {} exceeds maximum {}", label, min, max),
                });
            }
        }
    }

    for (label, value) in [
        ("base_confidence", rule.base_confidence),
        ("pattern_weight", rule.pattern_weight),
        ("metadata_weight", rule.metadata_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: format!("{} must be between 0 and 1, got {}", label, value),
            });
        }
    }

    Ok(())
}
