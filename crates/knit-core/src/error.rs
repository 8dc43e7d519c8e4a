//! Error types for knit-core.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias using knit-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for extension loading.
///
/// Errors are `Clone` so that a failed adaptive build can be cached and
/// handed back unchanged on every later request.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Registry configuration errors
    #[error("Configuration error on extension point {point}: {message}")]
    Configuration { point: String, message: String },

    #[error(
        "Duplicate extension {point} name {name} on {existing} and {duplicate}"
    )]
    DuplicateExtension {
        point: String,
        name: String,
        existing: String,
        duplicate: String,
    },

    #[error("No such extension {point} by name {name}{detail}")]
    ExtensionNotFound {
        point: String,
        name: String,
        detail: String,
    },

    #[error("Failed to inject {property} into {class}: {message}")]
    Injection {
        class: String,
        property: String,
        message: String,
    },

    // Adaptive dispatch errors
    #[error(
        "No adaptive method exists on extension {point}, refuse to create the adaptive class"
    )]
    NoAdaptiveMethod { point: String },

    #[error("Failed to generate adaptive class for {point}.{method}: {message}")]
    AdaptiveGeneration {
        point: String,
        method: String,
        message: String,
    },

    #[error("The method {method} of extension {point} is not adaptive")]
    UnsupportedAdaptiveMethod { point: String, method: String },

    #[error("{argument} == null in adaptive method {point}.{method}")]
    NullArgument {
        point: String,
        method: String,
        argument: String,
    },

    // Carrier errors
    #[error("Invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    // Compiler errors
    #[error("Invalid source: {message}")]
    InvalidSource { message: String },

    #[error("Source of {class} does not end with \"}}\"")]
    MalformedSource { class: String, source_text: String },

    #[error("Failed to compile class {class}: {message}")]
    Compilation {
        class: String,
        message: String,
        source_text: String,
        trace: String,
    },

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    // IO errors
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: String, message: String },
}

impl Error {
    /// Create a configuration error for an extension point
    pub fn configuration(point: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            point: point.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error without recorded causes
    pub fn not_found(point: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ExtensionNotFound {
            point: point.into(),
            name: name.into(),
            detail: String::new(),
        }
    }

    /// Create the error raised when adaptive dispatch resolves an empty name
    pub fn unresolved(point: impl Into<String>, carrier: &str, keys: &[impl AsRef<str>]) -> Self {
        let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        Self::ExtensionNotFound {
            point: point.into(),
            name: "(unresolved)".into(),
            detail: format!(": failed to get extension name from url({carrier}) use keys({keys:?})"),
        }
    }

    /// Create a generation error for an adaptive method
    pub fn generation(
        point: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AdaptiveGeneration {
            point: point.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create an IO error tagged with the path being read
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap a backend failure with the offending source and a rendered trace
    pub fn compilation(
        class: impl Into<String>,
        cause: &(dyn std::error::Error + 'static),
        source_text: impl Into<String>,
    ) -> Self {
        Self::Compilation {
            class: class.into(),
            message: cause.to_string(),
            source_text: source_text.into(),
            trace: render_trace(cause),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ExtensionNotFound { .. })
    }

    /// Check if this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this error came out of source generation or compilation
    pub fn is_compilation(&self) -> bool {
        matches!(
            self,
            Self::NoAdaptiveMethod { .. }
                | Self::AdaptiveGeneration { .. }
                | Self::InvalidSource { .. }
                | Self::MalformedSource { .. }
                | Self::Compilation { .. }
        )
    }

    /// The generated source attached to compilation failures, if any
    pub fn source_text(&self) -> Option<&str> {
        match self {
            Self::MalformedSource { source_text, .. } | Self::Compilation { source_text, .. } => {
                Some(source_text)
            }
            _ => None,
        }
    }
}

/// Render an error chain followed by the captured backtrace.
fn render_trace(cause: &(dyn std::error::Error + 'static)) -> String {
    let mut out = cause.to_string();
    let mut next = cause.source();
    while let Some(err) = next {
        out.push_str("\ncaused by: ");
        out.push_str(&err.to_string());
        next = err.source();
    }
    let backtrace = std::backtrace::Backtrace::capture();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        out.push('\n');
        out.push_str(&backtrace.to_string());
    }
    out
}
