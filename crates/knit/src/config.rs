//! Configuration management for knit.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Command-line flags
//! 2. Environment variables (KNIT_CONFIG, KNIT_COMPILER)
//! 3. Config file (platform data directory, config.toml)
//! 4. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use knit_core::LoaderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registry settings handed to knit-core
    #[serde(default)]
    pub loader: LoaderConfig,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "knit", "knit") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".knit")
    }
}

impl Config {
    /// Load configuration from the config file, defaults when it is missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("KNIT_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Loader configuration with `roots` appended to the configured roots.
    pub fn loader_with_roots(&self, roots: &[PathBuf]) -> LoaderConfig {
        let mut loader = self.loader.clone();
        for root in roots {
            if !loader.resource_roots.contains(root) {
                loader.resource_roots.push(root.clone());
            }
        }
        loader
    }
}
