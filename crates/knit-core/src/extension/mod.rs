//! Named extension points.
//!
//! - **class**: implementation classes, the injection contract and the catalog
//! - **loaders**: the registry of per-point loaders
//! - **loader**: one point's name map, instance cache and adaptive slot
//! - **activate**: selection and ordering of activatable extensions
//! - **factory**: collaborators resolving injected objects
//!
//! ## Usage
//!
//! ```ignore
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self, url: &Url, who: &str) -> knit_core::Result<String>;
//! }
//!
//! impl ExtensionPoint for dyn Greeter {
//!     fn descriptor() -> PointDescriptor {
//!         PointDescriptor::new("com.example.Greeter").with_default("en")
//!     }
//! }
//!
//! let catalog = ClassCatalog::new()
//!     .with(ExtensionClass::<dyn Greeter>::extension("com.example.EnglishGreeter", || English, |e| e));
//! let loaders = ExtensionLoaders::new(LoaderConfig::default().with_root("plugins"), catalog);
//!
//! let greeter = loaders.loader::<dyn Greeter>()?.extension("en")?;
//! ```

mod activate;
mod class;
mod classes;
mod factory;
mod loader;
mod loaders;

pub use activate::{DEFAULT_TOKEN, REMOVE_DEFAULT_TOKEN, sort_activations};
pub use class::{
    AdaptiveContext, AnyObject, ClassCatalog, ClassKind, ExtensionClass, Inject, ObjectType,
    ParamType, PointResolver, Setter, injected,
};
pub use factory::{
    AdaptiveExtensionFactory, ExtensionFactory, ObjectExtensionFactory, SpiExtensionFactory,
};
pub use loader::ExtensionLoader;
pub use loaders::{ExtensionLoaders, WeakLoaders};

use std::sync::Arc;

use crate::adaptive::AdaptiveDispatcher;
use crate::metadata::PointDescriptor;

/// A trait that can have named implementations.
///
/// Implemented for the trait object type (`impl ExtensionPoint for dyn Greeter`);
/// point traits should have `Send + Sync` as supertraits.
///
/// # Panics
///
/// On a generated adaptive instance, calling a method that is not adaptive
/// returns [`Error::UnsupportedAdaptiveMethod`](crate::Error::UnsupportedAdaptiveMethod)
/// when it returns a `Result` and panics otherwise. Give such methods a
/// `Result` return type when callers may hold the adaptive instance.
pub trait ExtensionPoint: Send + Sync + 'static {
    /// Qualified name, default extension and method signatures.
    fn descriptor() -> PointDescriptor;

    /// Forwarding object for a runtime-compiled adaptive class.
    ///
    /// Points whose adaptive class is generated at runtime return a small
    /// implementation that calls [`AdaptiveDispatcher::select`] in each
    /// adaptive method. The default has none.
    fn adaptive_shim(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        let _ = dispatcher;
        None
    }
}
