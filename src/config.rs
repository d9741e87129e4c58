use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine settings, read once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Calls taking at least this long are logged as warnings.
    pub slow_query_threshold_ms: u64,
    /// Log every statement. When unset, follows whether DEBUG records are
    /// enabled for this crate.
    pub verbose: Option<bool>,
    /// Reindent statements in log records.
    pub pretty_sql: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 2000,
            verbose: None,
            pretty_sql: true,
        }
    }
}

impl EngineConfig {
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
            .unwrap_or_else(|| tracing::enabled!(tracing::Level::DEBUG))
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pgcompose")
            .join("engine.toml")
    }

    /// Load from the user configuration directory, falling back to the
    /// defaults when there is no configuration file.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid engine configuration in {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
