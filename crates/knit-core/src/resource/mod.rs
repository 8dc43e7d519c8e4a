//! Extension resource files.
//!
//! A resource file is named after the qualified extension point and lists its
//! implementations, one per line:
//!
//! ```text
//! # comment
//! en=com.example.EnglishGreeter
//! fr, french = com.example.FrenchGreeter
//! com.example.GermanGreeter
//! ```
//!
//! Readers yield every file found at a resource path across their roots; the
//! registry decides precedence.

mod line;

pub use line::{ResourceLine, parse_line, parse_resource};

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::INTERNAL_DIRECTORY;
use crate::error::{Error, Result};

/// One resource file found at a resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Where the file came from (filesystem path or embedded origin)
    pub origin: String,
    pub content: String,
}

impl Resource {
    pub fn new(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            content: content.into(),
        }
    }

    /// Parsed entries of this file.
    pub fn lines(&self) -> Vec<ResourceLine> {
        parse_resource(&self.content)
    }
}

/// Source of resource files, the role a classpath plays.
pub trait ResourceReader: Send + Sync {
    /// Every file at `path` (e.g. `META-INF/knit/com.example.Greeter`).
    fn read(&self, path: &str) -> Result<Vec<Resource>>;

    /// Human readable description of the roots searched.
    fn describe(&self) -> Vec<String>;
}

/// Reads resource files below a list of filesystem roots.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResources {
    roots: Vec<PathBuf>,
}

impl DirectoryResources {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ResourceReader for DirectoryResources {
    fn read(&self, path: &str) -> Result<Vec<Resource>> {
        let mut found = Vec::new();
        for root in &self.roots {
            let file = root.join(path);
            if !file.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&file)
                .map_err(|e| Error::io(file.display().to_string(), e))?;
            debug!("Read extension resource {}", file.display());
            found.push(Resource::new(file.display().to_string(), content));
        }
        Ok(found)
    }

    fn describe(&self) -> Vec<String> {
        self.roots.iter().map(|r| r.display().to_string()).collect()
    }
}

/// In-memory resource files, used for the built-in points and in tests.
#[derive(Debug, Default)]
pub struct EmbeddedResources {
    files: RwLock<BTreeMap<String, Vec<Resource>>>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources shipped with the crate.
    pub fn builtin() -> Self {
        let resources = Self::new();
        resources.insert(
            format!("{INTERNAL_DIRECTORY}{}", crate::compiler::COMPILER_POINT),
            "knit-core",
            crate::compiler::BUILTIN_RESOURCE,
        );
        resources
    }

    /// Add a file at `path`
    pub fn insert(&self, path: impl Into<String>, origin: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .entry(path.into())
            .or_default()
            .push(Resource::new(origin, content));
    }

    /// Add a file at `path` (builder form)
    pub fn with(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let origin = format!("embedded:{path}");
        self.insert(path, origin, content);
        self
    }
}

impl ResourceReader for EmbeddedResources {
    fn read(&self, path: &str) -> Result<Vec<Resource>> {
        Ok(self.files.read().get(path).cloned().unwrap_or_default())
    }

    fn describe(&self) -> Vec<String> {
        vec![format!("embedded ({} files)", self.files.read().len())]
    }
}

/// Concatenates readers in order.
#[derive(Clone, Default)]
pub struct ChainedResources {
    readers: Vec<Arc<dyn ResourceReader>>,
}

impl ChainedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reader
    pub fn with(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.readers.push(reader);
        self
    }
}

impl ResourceReader for ChainedResources {
    fn read(&self, path: &str) -> Result<Vec<Resource>> {
        let mut found = Vec::new();
        for reader in &self.readers {
            found.extend(reader.read(path)?);
        }
        Ok(found)
    }

    fn describe(&self) -> Vec<String> {
        self.readers.iter().flat_map(|r| r.describe()).collect()
    }
}
