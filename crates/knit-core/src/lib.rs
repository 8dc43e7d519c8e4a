//! knit-core - Named extension points for Rust
//!
//! This crate provides the extension registry used by the knit CLI and by
//! applications embedding it:
//!
//! - **extension**: per-point loaders, injection and activation
//! - **resource**: resource files mapping names to implementation classes
//! - **metadata**: point descriptors and activation rules
//! - **adaptive**: adaptive source generation and runtime dispatch
//! - **compiler**: compiler backends for adaptive sources
//! - **url**: the parameter carrier adaptive dispatch reads
//! - **config**: loading strategies and registry configuration
//! - **holder**: once-initialised cells backing the caches

pub mod adaptive;
pub mod compiler;
pub mod config;
pub mod error;
pub mod extension;
pub mod holder;
pub mod metadata;
pub mod resource;
pub mod url;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export commonly used types
pub use adaptive::{AdaptiveClassCodeGenerator, AdaptiveDispatcher, Arg, CarrierProvider, Invocation};
pub use compiler::{ClassLoader, CompiledClass, Compiler};
pub use config::LoaderConfig;
pub use error::{Error, Result};
pub use extension::{
    ClassCatalog, ExtensionClass, ExtensionLoader, ExtensionLoaders, ExtensionPoint, Inject,
    ObjectType, Setter, injected,
};
pub use holder::Holder;
pub use metadata::{Activate, MethodSpec, ParamSpec, PointDescriptor};
pub use url::{ParameterCarrier, Url};
