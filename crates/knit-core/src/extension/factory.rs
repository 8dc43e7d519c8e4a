//! Injection factories.
//!
//! The registry asks its factory for every object-typed setter of a freshly
//! constructed instance. The composite [`AdaptiveExtensionFactory`] tries the
//! point factory first, then objects registered by the embedder.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::class::{AnyObject, ObjectType};
use super::loaders::ExtensionLoaders;
use crate::error::Result;

/// Resolves an object of a given type and property name.
pub trait ExtensionFactory: Send + Sync {
    /// `Ok(None)` when this factory has nothing for the request.
    fn get_extension(
        &self,
        loaders: &ExtensionLoaders,
        ty: &ObjectType,
        name: &str,
    ) -> Result<Option<AnyObject>>;
}

/// Resolves extension point types to the point's adaptive instance.
#[derive(Debug, Default)]
pub struct SpiExtensionFactory;

impl ExtensionFactory for SpiExtensionFactory {
    fn get_extension(
        &self,
        loaders: &ExtensionLoaders,
        ty: &ObjectType,
        _name: &str,
    ) -> Result<Option<AnyObject>> {
        match ty.resolver() {
            Some(resolve) => resolve(loaders),
            None => Ok(None),
        }
    }
}

/// Named objects registered by the embedder.
#[derive(Default)]
pub struct ObjectExtensionFactory {
    objects: RwLock<HashMap<TypeId, BTreeMap<String, AnyObject>>>,
}

impl ObjectExtensionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`; setters of type `O` can receive it.
    pub fn register<O: Any + Send + Sync>(&self, name: impl Into<String>, value: O) {
        let name = name.into();
        debug!("Registered injectable object {} ({})", name, std::any::type_name::<O>());
        self.objects
            .write()
            .entry(TypeId::of::<O>())
            .or_default()
            .insert(name, Arc::new(value));
    }

    /// Remove every registered object
    pub fn clear(&self) {
        self.objects.write().clear();
    }

    pub fn len(&self) -> usize {
        self.objects.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExtensionFactory for ObjectExtensionFactory {
    /// Lookup by name first, then the only object of the type if unique.
    fn get_extension(
        &self,
        _loaders: &ExtensionLoaders,
        ty: &ObjectType,
        name: &str,
    ) -> Result<Option<AnyObject>> {
        let objects = self.objects.read();
        let Some(named) = objects.get(&ty.type_id()) else {
            return Ok(None);
        };
        if let Some(object) = named.get(name) {
            return Ok(Some(object.clone()));
        }
        if named.len() == 1 {
            return Ok(named.values().next().cloned());
        }
        Ok(None)
    }
}

/// Tries each factory in order; the first hit wins.
#[derive(Clone, Default)]
pub struct AdaptiveExtensionFactory {
    factories: Vec<Arc<dyn ExtensionFactory>>,
}

impl AdaptiveExtensionFactory {
    pub fn new(factories: Vec<Arc<dyn ExtensionFactory>>) -> Self {
        Self { factories }
    }
}

impl ExtensionFactory for AdaptiveExtensionFactory {
    fn get_extension(
        &self,
        loaders: &ExtensionLoaders,
        ty: &ObjectType,
        name: &str,
    ) -> Result<Option<AnyObject>> {
        for factory in &self.factories {
            if let Some(object) = factory.get_extension(loaders, ty, name)? {
                return Ok(Some(object));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::extension::ClassCatalog;

    #[derive(Debug, Clone, PartialEq)]
    struct Endpoint(&'static str);

    #[test]
    fn test_object_factory_by_name_then_unique_type() {
        let loaders = ExtensionLoaders::new(LoaderConfig::default(), ClassCatalog::new());
        let factory = ObjectExtensionFactory::new();
        let ty = ObjectType::of::<Endpoint>();

        factory.register("primary", Endpoint("a"));
        let found = factory.get_extension(&loaders, &ty, "other").unwrap().unwrap();
        assert_eq!(found.downcast_ref::<Endpoint>(), Some(&Endpoint("a")));

        factory.register("backup", Endpoint("b"));
        assert!(factory.get_extension(&loaders, &ty, "other").unwrap().is_none());
        let found = factory.get_extension(&loaders, &ty, "backup").unwrap().unwrap();
        assert_eq!(found.downcast_ref::<Endpoint>(), Some(&Endpoint("b")));
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn test_spi_factory_ignores_plain_objects() {
        let loaders = ExtensionLoaders::new(LoaderConfig::default(), ClassCatalog::new());
        let ty = ObjectType::of::<Endpoint>();

        assert!(SpiExtensionFactory.get_extension(&loaders, &ty, "x").unwrap().is_none());
    }
}
