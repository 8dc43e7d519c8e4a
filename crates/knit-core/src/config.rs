//! Loader configuration.
//!
//! Controls where extension resources are looked up:
//! 1. Strategies - the resource directory tiers, scanned in order
//! 2. Resource roots - filesystem directories standing in for classpath roots
//! 3. Legacy aliases - renamed package prefixes probed for old resource names

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory of the internal tier.
pub const INTERNAL_DIRECTORY: &str = "META-INF/knit/internal/";
/// Directory of the regular tier.
pub const KNIT_DIRECTORY: &str = "META-INF/knit/";
/// Directory of the service-loader compatible tier.
pub const SERVICES_DIRECTORY: &str = "META-INF/services/";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Resource tiers, highest precedence first
    #[serde(default = "default_strategies")]
    pub strategies: Vec<LoadingStrategy>,

    /// Filesystem roots searched for resource files
    #[serde(default)]
    pub resource_roots: Vec<PathBuf>,

    /// Package renames probed as backward-compatible resource names
    #[serde(default)]
    pub legacy_aliases: Vec<LegacyAlias>,

    /// Compiler backend used for adaptive classes (point default when unset)
    #[serde(default)]
    pub compiler: Option<String>,
}

/// One resource tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingStrategy {
    /// Directory prefix, ending with `/`
    pub directory: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl LoadingStrategy {
    pub fn new(directory: impl Into<String>) -> Self {
        let mut directory = directory.into();
        if !directory.ends_with('/') {
            directory.push('/');
        }
        Self {
            directory,
            enabled: true,
        }
    }

    /// Resource path of a point's file in this tier.
    pub fn resource_path(&self, point: &str) -> String {
        format!("{}{}", self.directory, point)
    }
}

/// A renamed package prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAlias {
    /// Prefix used by current point names
    pub current: String,
    /// Prefix the same points had before the rename
    pub legacy: String,
}

impl LegacyAlias {
    pub fn new(current: impl Into<String>, legacy: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            legacy: legacy.into(),
        }
    }

    /// Legacy spelling of `point`, when the alias applies.
    pub fn rename(&self, point: &str) -> Option<String> {
        point
            .strip_prefix(&self.current)
            .filter(|rest| rest.is_empty() || rest.starts_with('.'))
            .map(|rest| format!("{}{}", self.legacy, rest))
    }
}

// Default value functions
fn default_strategies() -> Vec<LoadingStrategy> {
    vec![
        LoadingStrategy::new(INTERNAL_DIRECTORY),
        LoadingStrategy::new(KNIT_DIRECTORY),
        LoadingStrategy::new(SERVICES_DIRECTORY),
    ]
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            resource_roots: Vec::new(),
            legacy_aliases: Vec::new(),
            compiler: None,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML file, defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::ConfigParse { message, .. } => Error::ConfigParse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Add a filesystem resource root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_roots.push(root.into());
        self
    }

    /// Add a legacy package alias
    pub fn with_legacy_alias(mut self, alias: LegacyAlias) -> Self {
        self.legacy_aliases.push(alias);
        self
    }

    /// Set the compiler backend
    pub fn with_compiler(mut self, name: impl Into<String>) -> Self {
        self.compiler = Some(name.into());
        self
    }

    /// Enabled tiers, in precedence order.
    pub fn enabled_strategies(&self) -> impl Iterator<Item = &LoadingStrategy> {
        self.strategies.iter().filter(|s| s.enabled)
    }

    /// Every resource path probed for `point`: each tier, then its legacy names.
    pub fn resource_paths(&self, point: &str) -> Vec<String> {
        let mut paths = Vec::new();
        for strategy in self.enabled_strategies() {
            paths.push(strategy.resource_path(point));
            for alias in &self.legacy_aliases {
                if let Some(legacy) = alias.rename(point) {
                    paths.push(strategy.resource_path(&legacy));
                }
            }
        }
        paths
    }
}
