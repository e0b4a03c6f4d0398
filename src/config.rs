//! `manifold.toml` manifest: the fixed set of supervised processes.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::term::DEFAULT_SCROLLBACK;

pub const MANIFEST_FILE: &str = "manifold.toml";

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    pub processes: IndexMap<String, ProcessEntry>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scrollback: default_scrollback(),
        }
    }
}

fn default_scrollback() -> usize {
    DEFAULT_SCROLLBACK
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessEntry {
    pub run: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

fn default_autostart() -> bool {
    true
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    NoProcesses,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed to read `{}`: {error}", path.display())
            }
            ConfigError::Parse { path, error } => {
                write!(f, "failed to parse `{}`: {error}", path.display())
            }
            ConfigError::NoProcesses => {
                write!(f, "manifest defines no processes to supervise")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            error,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|error| ConfigError::Parse {
            path: path.to_owned(),
            error,
        })?;
        if config.processes.is_empty() {
            return Err(ConfigError::NoProcesses);
        }
        Ok(config)
    }
}
