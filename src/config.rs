//! Configuration management for the log reader
//!
//! This module provides the reader configuration and loads it from a
//! configuration directory, trying `log-reader.yml`, `log-reader.json` and
//! `log-reader.toml` in that order.
//!
//! **YAML Format:**
//! ```yaml
//! path: /var/www/storage/logs
//! filename: "laravel-*.log"
//! environment: production
//! level: [error, critical]
//! order_by_field: date
//! order_by_direction: desc
//! default_log_parser: standard
//! ```

use crate::error::{ReaderError, Result};
use crate::logs::ParserType;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Directory storing the log files
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Glob pattern of the log filenames (all files with an extension if unset)
    #[serde(default)]
    pub filename: Option<String>,
    /// Only read entries logged in this environment
    #[serde(default)]
    pub environment: Option<String>,
    /// Only read entries with these levels; a list or a comma-separated string
    #[serde(default, deserialize_with = "deserialize_levels")]
    pub level: Option<Vec<String>>,
    /// Field to order entries by
    #[serde(default = "default_order_by_field")]
    pub order_by_field: String,
    /// Direction to order entries in
    #[serde(default = "default_order_by_direction")]
    pub order_by_direction: String,
    /// Grammar used to parse entries
    #[serde(default)]
    pub default_log_parser: ParserType,
    /// File keeping the read state between runs
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

fn default_path() -> PathBuf {
    PathBuf::from("storage/logs")
}

fn default_order_by_field() -> String {
    "date".to_string()
}

fn default_order_by_direction() -> String {
    "asc".to_string()
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            filename: None,
            environment: None,
            level: None,
            order_by_field: default_order_by_field(),
            order_by_direction: default_order_by_direction(),
            default_log_parser: ParserType::default(),
            cache_file: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelSetting {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_levels<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<LevelSetting>::deserialize(deserializer)?.map(|setting| match setting {
            LevelSetting::List(levels) => levels,
            LevelSetting::Csv(levels) => parse_level_list(&levels),
        }),
    )
}

/// Split `"error, warning"` into `["error", "warning"]`, dropping blanks
pub fn parse_level_list(levels: &str) -> Vec<String> {
    levels
        .split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load reader configuration from the config directory
pub fn load_reader_config(config_dir: &Path) -> Result<ReaderConfig> {
    let yaml_path = config_dir.join("log-reader.yml");
    let json_path = config_dir.join("log-reader.json");
    let toml_path = config_dir.join("log-reader.toml");

    let read = |path: &Path| {
        std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config(format!("failed to read {}: {}", path.display(), e)))
    };

    let config = if yaml_path.exists() {
        serde_yaml::from_str(&read(&yaml_path)?)
            .map_err(|e| ReaderError::Config(format!("{}: {}", yaml_path.display(), e)))?
    } else if json_path.exists() {
        serde_json::from_str(&read(&json_path)?)
            .map_err(|e| ReaderError::Config(format!("{}: {}", json_path.display(), e)))?
    } else if toml_path.exists() {
        toml::from_str(&read(&toml_path)?)
            .map_err(|e| ReaderError::Config(format!("{}: {}", toml_path.display(), e)))?
    } else {
        // Return default configuration if no config file exists
        ReaderConfig::default()
    };

    Ok(config)
}
