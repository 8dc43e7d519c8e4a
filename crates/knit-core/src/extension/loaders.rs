//! Registry of per-point extension loaders.

use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::class::{AnyObject, ClassCatalog, Construct, ExtensionClass, Inject, Instance, ParamType};
use super::factory::{
    AdaptiveExtensionFactory, ExtensionFactory, ObjectExtensionFactory, SpiExtensionFactory,
};
use super::loader::ExtensionLoader;
use super::ExtensionPoint;
use crate::compiler::{self, ClassLoader};
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::holder::Holder;
use crate::resource::{ChainedResources, DirectoryResources, EmbeddedResources, ResourceReader};

struct Registry {
    config: LoaderConfig,
    catalog: ClassCatalog,
    resources: Arc<dyn ResourceReader>,
    objects: Arc<ObjectExtensionFactory>,
    factory: Arc<dyn ExtensionFactory>,
    /// One loader per point type
    loaders: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    /// Undecorated instances per (point, implementation type)
    instances: Mutex<HashMap<(TypeId, String), Arc<Holder<AnyObject>>>>,
    class_loader: RwLock<Arc<ClassLoader>>,
    default_compiler: RwLock<Option<String>>,
}

/// Handle to an extension registry.
///
/// Cloning is cheap and every clone shares the same caches. There is no
/// process-wide registry: embedders create one and pass it where needed.
#[derive(Clone)]
pub struct ExtensionLoaders {
    inner: Arc<Registry>,
}

/// Non-owning registry handle held by loaders and adaptive classes.
#[derive(Clone)]
pub struct WeakLoaders {
    inner: Weak<Registry>,
}

impl WeakLoaders {
    pub fn upgrade(&self) -> Result<ExtensionLoaders> {
        self.inner
            .upgrade()
            .map(|inner| ExtensionLoaders { inner })
            .ok_or_else(|| Error::configuration("*", "extension registry has been dropped"))
    }
}

impl fmt::Debug for WeakLoaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakLoaders")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl ExtensionLoaders {
    /// Registry reading resources from the configured roots.
    pub fn new(config: LoaderConfig, catalog: ClassCatalog) -> Self {
        let directories = DirectoryResources::new(config.resource_roots.clone());
        Self::with_resources(config, catalog, Arc::new(directories))
    }

    /// Registry reading resources from `resources`.
    ///
    /// The built-in resources and classes are always available.
    pub fn with_resources(
        config: LoaderConfig,
        mut catalog: ClassCatalog,
        resources: Arc<dyn ResourceReader>,
    ) -> Self {
        catalog.merge(&compiler::builtin_classes());
        let resources = ChainedResources::new()
            .with(Arc::new(EmbeddedResources::builtin()))
            .with(resources);

        let objects = Arc::new(ObjectExtensionFactory::new());
        let factories: Vec<Arc<dyn ExtensionFactory>> =
            vec![Arc::new(SpiExtensionFactory), objects.clone()];
        let factory = AdaptiveExtensionFactory::new(factories);
        let default_compiler = config.compiler.clone();

        Self {
            inner: Arc::new(Registry {
                config,
                catalog,
                resources: Arc::new(resources),
                objects,
                factory: Arc::new(factory),
                loaders: Mutex::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                class_loader: RwLock::new(Arc::new(ClassLoader::new("knit"))),
                default_compiler: RwLock::new(default_compiler),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.inner.catalog
    }

    pub fn resources(&self) -> Arc<dyn ResourceReader> {
        self.inner.resources.clone()
    }

    /// Class loader that compiled adaptive classes are defined into.
    pub fn class_loader(&self) -> Arc<ClassLoader> {
        self.inner.class_loader.read().clone()
    }

    /// Compiler backend selected for adaptive classes, if any.
    pub fn default_compiler(&self) -> Option<String> {
        self.inner.default_compiler.read().clone()
    }

    /// Select the compiler backend; `None` falls back to the point default
    pub fn set_default_compiler(&self, name: Option<&str>) {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        debug!("Default compiler set to {:?}", name);
        *self.inner.default_compiler.write() = name;
    }

    /// Make `value` injectable into setters of type `O`
    pub fn register_object<O: Any + Send + Sync>(&self, name: impl Into<String>, value: O) {
        self.inner.objects.register(name, value);
    }

    /// The loader for point `T`, created on first use.
    pub fn loader<T: ExtensionPoint + ?Sized>(&self) -> Result<Arc<ExtensionLoader<T>>> {
        let type_id = TypeId::of::<T>();
        let mut loaders = self.inner.loaders.lock();
        if let Some(existing) = loaders.get(&type_id) {
            if let Ok(loader) = existing.clone().downcast::<ExtensionLoader<T>>() {
                return Ok(loader);
            }
        }

        let loader = ExtensionLoader::<T>::new(self.downgrade())?;
        loaders.insert(type_id, loader.clone());
        Ok(loader)
    }

    /// Drop every loader, cached instance and compiled class.
    pub fn reset(&self) {
        self.inner.loaders.lock().clear();
        self.inner.instances.lock().clear();
        *self.inner.class_loader.write() = Arc::new(ClassLoader::new("knit"));
        debug!("Extension registry reset");
    }

    /// Drop the loader and cached instances of point `T`.
    pub fn reset_point<T: ExtensionPoint + ?Sized>(&self) {
        let type_id = TypeId::of::<T>();
        self.inner.loaders.lock().remove(&type_id);
        self.inner
            .instances
            .lock()
            .retain(|(point, _), _| *point != type_id);
    }

    pub fn downgrade(&self) -> WeakLoaders {
        WeakLoaders {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The shared undecorated instance of `class`.
    pub(crate) fn raw_instance<T: ExtensionPoint + ?Sized>(
        &self,
        class: &ExtensionClass<T>,
    ) -> Result<Instance<T>> {
        let key = (TypeId::of::<T>(), class.type_name().to_string());
        let holder = self.inner.instances.lock().entry(key).or_default().clone();

        let object = holder.get_or_try_init(|| {
            let instance = class.construct(Construct::Plain).ok_or_else(|| {
                Error::configuration(
                    T::descriptor().name,
                    format!("{} is not a plain extension class", class.type_name()),
                )
            })?;
            debug!("Instantiated extension class {}", class.type_name());
            let object: AnyObject = Arc::new(instance);
            Ok::<_, Error>(object)
        })?;

        object
            .downcast_ref::<Instance<T>>()
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(class.type_name().to_string()))
    }

    /// Offer every object-typed setter of `target` a value; failures are logged.
    pub(crate) fn inject(&self, target: &dyn Inject, class: &str) {
        for setter in target.setters() {
            if setter.is_disabled() {
                continue;
            }
            let ParamType::Object(ty) = setter.param() else {
                continue;
            };
            let Some(property) = setter.property() else {
                continue;
            };

            match self.inner.factory.get_extension(self, ty, &property) {
                Ok(Some(object)) => {
                    if let Err(e) = target.set(setter.method(), object) {
                        warn!(
                            "Failed to inject via method {} of {}: {}",
                            setter.method(),
                            class,
                            e
                        );
                    } else {
                        debug!("Injected {} into {}", property, class);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Failed to resolve {} ({}) for {}: {}",
                    property,
                    ty.type_name(),
                    class,
                    e
                ),
            }
        }
    }
}

impl fmt::Debug for ExtensionLoaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoaders")
            .field("config", &self.inner.config)
            .field("loaders", &self.inner.loaders.lock().len())
            .finish()
    }
}
