//! Config loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Apply the settings-service (GSettings) target.
    pub apply_gsettings: bool,
    /// Apply the ini-file (KDE) target.
    pub apply_ini: bool,
    /// Translate well-known Windows policy keys into native settings during
    /// user-scope synthesis.
    pub windows_mapping: bool,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apply_gsettings: true,
            apply_ini: true,
            windows_mapping: false,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn load() -> Result<Config, ConfigError> {
    let path = config_path();
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path,
        reason: e.to_string(),
    })
}

pub fn load_or_init() -> Config {
    let path = config_path();
    if path.exists() {
        match load() {
            Ok(mut cfg) => {
                apply_env_overrides(&mut cfg);
                return cfg;
            }
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                let mut cfg = Config::default();
                apply_env_overrides(&mut cfg);
                return cfg;
            }
        }
    }

    let mut cfg = Config::default();
    if let Err(e) = write_config(&path, &cfg) {
        tracing::warn!("failed to write default config: {e}");
    }
    apply_env_overrides(&mut cfg);
    cfg
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("GP_WINDOWS_MAPPING") {
        config.windows_mapping = boolish(&raw).unwrap_or(config.windows_mapping);
    }
    if let Ok(raw) = std::env::var("GP_APPLY_GSETTINGS") {
        config.apply_gsettings = boolish(&raw).unwrap_or(config.apply_gsettings);
    }
    if let Ok(raw) = std::env::var("GP_APPLY_INI") {
        config.apply_ini = boolish(&raw).unwrap_or(config.apply_ini);
    }
}

fn boolish(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            tracing::warn!(value = other, "unrecognized boolean override, ignoring");
            None
        }
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    let contents = toml::to_string_pretty(cfg).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_error = |reason: String| ConfigError::Write {
        path: path.to_path_buf(),
        reason,
    };
    let dir = path
        .parent()
        .ok_or_else(|| write_error("config path missing parent directory".to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| write_error(format!("failed to create temp file: {e}")))?;
    fs::write(temp.path(), data).map_err(|e| write_error(format!("temp file write: {e}")))?;
    temp.persist(path)
        .map_err(|e| write_error(format!("persist: {e}")))?;
    Ok(())
}
