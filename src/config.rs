use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV_VAR: &str = "PLATESENSE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid allowed_characters pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlateConfig {
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Which reading a plate is judged by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    #[default]
    Raw,
    Filtered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub text_source: TextSource,
    /// Regex character-class body, e.g. `A-Z0-9_-`. Unset means any character.
    pub allowed_characters: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Maximum edit distance at which two entities are treated as one plate.
    pub merge_threshold: usize,
    /// Readings must be longer than this fraction of the median reading length.
    pub length_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_fps: f64,
    /// Largest frame gap that is still interpolated. 0 disables the limit.
    pub max_gap: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 9,
            text_source: TextSource::Raw,
            allowed_characters: None,
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 2,
            length_ratio: 0.75,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_fps: 30.0,
            max_gap: 4,
        }
    }
}

impl PlaybackConfig {
    pub fn max_gap(&self) -> Option<u32> {
        (self.max_gap > 0).then_some(self.max_gap)
    }
}

impl PlateConfig {
    /// Load from `PLATESENSE_CONFIG` or the user config dir, falling back to
    /// defaults when neither exists or parses.
    pub fn load() -> Self {
        if let Some(config_path) = Self::config_file_path()
            && let Ok(config) = Self::load_from(&config_path)
        {
            return config;
        }
        Self::default()
    }

    /// Load an explicitly named file. Unlike [`PlateConfig::load`], failures are reported.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config_file_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("platesense");
            path
        })
    }
}
