use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::{plog_debug, Error, Result};

/// Maximum nesting depth applied when the config does not override it.
///
/// Depth 2 allows a root plan, sub-plans, and sub-sub-plans; anything
/// deeper is rejected at parse time.
pub const DEFAULT_MAX_DEPTH: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Worker commands keyed by worker tag ("frontend", "backend", ...).
    #[serde(default)]
    pub workers: HashMap<String, String>,
    /// Fallback command for worker tags without an explicit entry.
    pub command: Option<String>,
    /// Build/test command run once per tree after execution.
    pub verify_command: Option<String>,
    /// Maximum plan nesting depth (root = 0).
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
}

fn default_max_depth() -> u8 {
    DEFAULT_MAX_DEPTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: HashMap::new(),
            command: None,
            verify_command: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    pub fn parallx_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".parallx"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::parallx_dir()?.join("parallx.toml"))
    }

    /// Command for the given worker tag, falling back to the default.
    pub fn worker_command(&self, tag: &str) -> &str {
        self.workers
            .get(tag)
            .map(String::as_str)
            .or(self.command.as_deref())
            .unwrap_or("claude")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        plog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            plog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        plog_debug!(
            "Config loaded: workers={}, command={:?}, verify={:?}, max_depth={}",
            config.workers.len(),
            config.command,
            config.verify_command,
            config.max_depth
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::parallx_dir()?;
        if !dir.exists() {
            plog_debug!("Creating parallx directory: {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        plog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
