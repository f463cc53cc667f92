use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matching::DEFAULT_MATCH_THRESHOLD;

/// Environment variable overriding `planning.match_threshold`
pub const MATCH_THRESHOLD_ENV: &str = "GEO_ASSISTANT_MATCH_THRESHOLD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub planning: PlanningConfig,
}

/// Settings for planning, matching and execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Minimum similarity (0-1) for tool and layer-name matches (default: 0.6)
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Keep executing later steps after a step fails (default: false)
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Upper bound on steps in one plan (default: unbounded)
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Ask the complexity strategy about ambiguous requests (default: true)
    #[serde(default = "default_true")]
    pub consult_llm_on_ambiguity: bool,
}

fn default_match_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            continue_on_failure: false,
            max_steps: None,
            consult_llm_on_ambiguity: true,
        }
    }
}

impl Config {
    /// Load from the user config file, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from `path` and apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load the user config file as stored, without environment overrides
    ///
    /// Use this when the config is edited and saved back.
    pub fn load_stored() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_file(&config_path)
    }

    /// Load `path` as stored, without environment overrides
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("geo-assistant").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.planning.match_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("planning.match_threshold must be within 0..=1, got {}", threshold);
        }
        if self.planning.max_steps == Some(0) {
            anyhow::bail!("planning.max_steps must be at least 1");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let Ok(raw) = std::env::var(MATCH_THRESHOLD_ENV) else {
            return;
        };
        match raw.trim().parse::<f32>() {
            Ok(value) if (0.0..=1.0).contains(&value) => self.planning.match_threshold = value,
            _ => tracing::warn!("Ignoring invalid {}={:?}", MATCH_THRESHOLD_ENV, raw),
        }
    }
}
