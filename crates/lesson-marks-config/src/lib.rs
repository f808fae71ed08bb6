use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// JSON file holding every saved note
    #[serde(default = "Config::default_notes_path")]
    pub notes_path: PathBuf,
    /// Reader id notes are filed under
    #[serde(default = "Config::default_user")]
    pub user: String,
    #[serde(default)]
    pub restore: RestoreConfig,
}

/// Timing of highlight restoration, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub settle_delay_ms: u64,
    pub focus_retry_delays_ms: Vec<u64>,
    pub flash_duration_ms: u64,
    pub strict_source_match: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            focus_retry_delays_ms: vec![0, 120, 400],
            flash_duration_ms: 2000,
            strict_source_match: true,
        }
    }
}

impl RestoreConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn focus_retry_delays(&self) -> Vec<Duration> {
        self.focus_retry_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_duration_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_path: Self::default_notes_path(),
            user: Self::default_user(),
            restore: RestoreConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.notes_path = Self::expand_path(&config.notes_path).unwrap_or(config.notes_path);

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/lesson-marks");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn default_notes_path() -> PathBuf {
        let data_dir = shellexpand::tilde("~/.local/share/lesson-marks");
        PathBuf::from(data_dir.as_ref()).join("notes.json")
    }

    fn default_user() -> String {
        "local".to_string()
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
