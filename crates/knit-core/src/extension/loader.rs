//! Per-point extension loader.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error};

use super::activate::{DEFAULT_TOKEN, REMOVE_DEFAULT_TOKEN, group_matches, is_active, sort_activations};
use super::class::{AdaptiveContext, ClassKind, Construct, ExtensionClass, Lookup};
use super::classes::ClassMap;
use super::loaders::WeakLoaders;
use super::ExtensionPoint;
use crate::adaptive::{AdaptiveClassCodeGenerator, AdaptiveDispatcher};
use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::holder::Holder;
use crate::metadata::{Activate, PointDescriptor};
use crate::url::ParameterCarrier;

/// Name alias for the point's default extension.
const TRUE_ALIAS: &str = "true";

/// Resolves, instantiates and caches the extensions of one point.
///
/// Obtained from [`ExtensionLoaders::loader`](super::ExtensionLoaders::loader).
/// The name map is scanned once on first use; every extension is created at
/// most once per name, with concurrent callers of the same name blocking on
/// that name only.
pub struct ExtensionLoader<T: ?Sized> {
    point: PointDescriptor,
    loaders: WeakLoaders,
    this: Weak<Self>,
    classes: Holder<Arc<ClassMap<T>>>,
    /// Serialises administrative changes to the name map
    admin: Mutex<()>,
    instances: Mutex<HashMap<String, Arc<Holder<Arc<T>>>>>,
    adaptive: Holder<std::result::Result<Arc<T>, Error>>,
}

impl<T: ExtensionPoint + ?Sized> ExtensionLoader<T> {
    pub(crate) fn new(loaders: WeakLoaders) -> Result<Arc<Self>> {
        let point = T::descriptor();
        point.validate()?;
        if std::mem::size_of::<&T>() != 2 * std::mem::size_of::<usize>() {
            return Err(Error::configuration(
                &point.name,
                format!(
                    "Extension type ({}) is not a trait object",
                    std::any::type_name::<T>()
                ),
            ));
        }

        debug!("Created extension loader for {}", point.name);
        Ok(Arc::new_cyclic(|this| Self {
            point,
            loaders,
            this: this.clone(),
            classes: Holder::new(),
            admin: Mutex::new(()),
            instances: Mutex::new(HashMap::new()),
            adaptive: Holder::new(),
        }))
    }

    pub fn point(&self) -> &PointDescriptor {
        &self.point
    }

    fn classes(&self) -> Result<Arc<ClassMap<T>>> {
        self.classes.get_or_try_init(|| {
            let loaders = self.loaders.upgrade()?;
            let map = ClassMap::load(
                &self.point,
                loaders.config(),
                &*loaders.resources(),
                loaders.catalog(),
            )?;
            debug!(
                "Loaded {} extension classes for {} ({} wrappers, adaptive: {})",
                map.extensions.len(),
                self.point.name,
                map.wrappers.len(),
                map.adaptive.is_some()
            );
            Ok::<_, Error>(Arc::new(map))
        })
    }

    fn check_name<'a>(&self, name: &'a str) -> Result<&'a str> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::configuration(
                &self.point.name,
                "Extension name == null",
            ));
        }
        Ok(name)
    }

    /// The singleton registered under `name`; `"true"` means the default.
    pub fn extension(&self, name: &str) -> Result<Arc<T>> {
        let name = self.check_name(name)?;
        if name == TRUE_ALIAS {
            return self
                .default_extension()?
                .ok_or_else(|| Error::not_found(&self.point.name, name));
        }

        // Unknown names must not leave a holder behind
        let classes = self.classes()?;
        if !classes.extensions.contains_key(name) {
            return Err(classes.not_found(&self.point, name));
        }

        let holder = self
            .instances
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        holder.get_or_try_init(|| self.create_extension(name))
    }

    fn create_extension(&self, name: &str) -> Result<Arc<T>> {
        let classes = self.classes()?;
        let Some(class) = classes.extensions.get(name) else {
            return Err(classes.not_found(&self.point, name));
        };

        let loaders = self.loaders.upgrade()?;
        let raw = loaders.raw_instance(class)?;
        loaders.inject(&*raw.inject, class.type_name());

        let mut target = raw.target;
        for wrapper in &classes.wrappers {
            let wrapped = wrapper
                .construct(Construct::Wrap(target.clone()))
                .ok_or_else(|| {
                    Error::configuration(
                        &self.point.name,
                        format!("{} is not a wrapper class", wrapper.type_name()),
                    )
                })?;
            loaders.inject(&*wrapped.inject, wrapper.type_name());
            target = wrapped.target;
        }

        debug!(
            "Created extension {} of {} ({}, {} wrappers)",
            name,
            self.point.name,
            class.type_name(),
            classes.wrappers.len()
        );
        Ok(target)
    }

    /// Declared default name, if any.
    pub fn default_extension_name(&self) -> Option<&str> {
        self.point
            .default_extension()
            .filter(|name| *name != TRUE_ALIAS)
    }

    /// The default extension, `None` when the point declares no default.
    pub fn default_extension(&self) -> Result<Option<Arc<T>>> {
        match self.default_extension_name() {
            Some(name) => self.extension(name).map(Some),
            None => Ok(None),
        }
    }

    pub fn has_extension(&self, name: &str) -> Result<bool> {
        let name = self.check_name(name)?;
        Ok(self.classes()?.extensions.contains_key(name))
    }

    /// Every registered name, sorted.
    pub fn supported_extensions(&self) -> Result<Vec<String>> {
        Ok(self.classes()?.extensions.keys().cloned().collect())
    }

    /// Names whose instance has been created, sorted.
    pub fn loaded_extensions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .lock()
            .iter()
            .filter(|(_, holder)| holder.is_set())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// The instance of `name` if already created; never creates one.
    pub fn loaded_extension(&self, name: &str) -> Option<Arc<T>> {
        let holder = self.instances.lock().get(name.trim()).cloned()?;
        holder.get()
    }

    /// First name registered for the implementation type `type_name`.
    pub fn extension_name_of(&self, type_name: &str) -> Result<Option<String>> {
        Ok(self.classes()?.names.get(type_name).cloned())
    }

    fn resolve_class(&self, type_name: &str) -> Result<ExtensionClass<T>> {
        if type_name == self.point.name {
            return Err(Error::configuration(
                &self.point.name,
                format!("Input type {type_name} can't be the extension point itself"),
            ));
        }
        let loaders = self.loaders.upgrade()?;
        match loaders.catalog().lookup::<T>(type_name) {
            Lookup::Found(class) => Ok(class),
            Lookup::WrongPoint => Err(Error::configuration(
                &self.point.name,
                format!("Input type {type_name} doesn't implement the extension point"),
            )),
            Lookup::Unknown => Err(Error::ClassNotFound(type_name.to_string())),
        }
    }

    /// Register `type_name` under `name` at runtime.
    ///
    /// Adaptive classes take the adaptive slot (fatal if occupied) and wrappers
    /// join the wrapper list; `name` is ignored for both.
    pub fn add_extension(&self, name: &str, type_name: &str) -> Result<()> {
        let _admin = self.admin.lock();
        let class = self.resolve_class(type_name)?;
        let mut map = ClassMap::clone(&*self.classes()?);

        match class.kind() {
            ClassKind::Adaptive => {
                if map.adaptive.is_some() {
                    return Err(Error::configuration(
                        &self.point.name,
                        "Adaptive extension already exists",
                    ));
                }
                map.adaptive = Some(class);
            }
            ClassKind::Wrapper => map.add_class(&self.point, class, &[])?,
            ClassKind::Extension => {
                let name = self.check_name(name)?;
                if let Some(existing) = map.extensions.get(name) {
                    return Err(Error::configuration(
                        &self.point.name,
                        format!(
                            "Extension name {name} already exists ({})",
                            existing.type_name()
                        ),
                    ));
                }
                map.add_class(&self.point, class, &[name.to_string()])?;
            }
        }

        self.classes.set(Arc::new(map));
        debug!("Added extension {} ({}) to {}", name, type_name, self.point.name);
        Ok(())
    }

    /// Replace the class registered under `name`, or the adaptive class.
    ///
    /// The cached instance of the replaced name is dropped; replacing the
    /// adaptive class discards the cached adaptive instance.
    pub fn replace_extension(&self, name: &str, type_name: &str) -> Result<()> {
        let _admin = self.admin.lock();
        let class = self.resolve_class(type_name)?;
        let mut map = ClassMap::clone(&*self.classes()?);

        match class.kind() {
            ClassKind::Adaptive => {
                if map.adaptive.is_none() {
                    return Err(Error::configuration(
                        &self.point.name,
                        "Adaptive extension does not exist",
                    ));
                }
                map.adaptive = Some(class);
                self.classes.set(Arc::new(map));
                self.adaptive.reset();
            }
            ClassKind::Wrapper => {
                return Err(Error::configuration(
                    &self.point.name,
                    format!("Wrapper class {type_name} can't replace extension {name}"),
                ));
            }
            ClassKind::Extension => {
                let name = self.check_name(name)?;
                let Some(previous) = map.extensions.get(name).cloned() else {
                    return Err(Error::configuration(
                        &self.point.name,
                        format!("Extension name {name} doesn't exist"),
                    ));
                };

                if map.names.get(previous.type_name()).map(String::as_str) == Some(name) {
                    map.names.remove(previous.type_name());
                }
                match class.activation() {
                    Some(rule) => {
                        map.activates.insert(name.to_string(), rule.clone());
                    }
                    None => {
                        map.activates.remove(name);
                    }
                }
                map.names
                    .entry(class.type_name().to_string())
                    .or_insert_with(|| name.to_string());
                map.extensions.insert(name.to_string(), class);

                self.classes.set(Arc::new(map));
                self.instances.lock().remove(name);
            }
        }

        debug!("Replaced extension {} with {} on {}", name, type_name, self.point.name);
        Ok(())
    }

    /// The adaptive instance, built on first use.
    ///
    /// A failed build is cached: every later call returns the same error.
    pub fn adaptive_extension(&self) -> Result<Arc<T>> {
        self.adaptive.get_or_init(|| {
            let created = self.create_adaptive();
            if let Err(e) = &created {
                error!("Failed to create adaptive instance of {}: {}", self.point.name, e);
            }
            created
        })
    }

    fn create_adaptive(&self) -> Result<Arc<T>> {
        let classes = self.classes()?;
        let loaders = self.loaders.upgrade()?;

        if let Some(class) = &classes.adaptive {
            let context = AdaptiveContext::new(self.loaders.clone(), self.this.clone());
            let instance = class
                .construct(Construct::Adaptive(context))
                .ok_or_else(|| {
                    Error::configuration(
                        &self.point.name,
                        format!("{} is not an adaptive class", class.type_name()),
                    )
                })?;
            loaders.inject(&*instance.inject, class.type_name());
            debug!("Using adaptive class {} for {}", class.type_name(), self.point.name);
            return Ok(instance.target);
        }

        let source = AdaptiveClassCodeGenerator::new(&self.point).generate()?;
        debug!("Generated adaptive source for {}:\n{}", self.point.name, source);

        let compiler = loaders.loader::<dyn Compiler>()?.adaptive_extension()?;
        let class = compiler.compile(&source, &loaders.class_loader())?;
        if class.point.as_deref() != Some(self.point.name.as_str()) {
            return Err(Error::generation(
                &self.point.name,
                "*",
                format!("compiled class {} dispatches another point", class.name),
            ));
        }

        let dispatcher = AdaptiveDispatcher::new(class, self.this.clone());
        T::adaptive_shim(dispatcher).ok_or_else(|| {
            Error::generation(
                &self.point.name,
                "*",
                "the point provides no adaptive shim for a compiled class",
            )
        })
    }

    /// Extensions activated for `carrier`, followed by the explicit `values`.
    ///
    /// `-name` excludes `name`, `-default` drops every automatic activation
    /// and `default` marks where automatic activations go among the
    /// explicit names.
    pub fn activate_extensions<S: AsRef<str>>(
        &self,
        carrier: &dyn ParameterCarrier,
        values: &[S],
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        let names: Vec<&str> = values
            .iter()
            .map(|v| v.as_ref().trim())
            .filter(|v| !v.is_empty())
            .collect();
        let negated = |name: &str| names.iter().any(|n| n.strip_prefix('-') == Some(name));

        let mut activated = Vec::new();
        if !names.contains(&REMOVE_DEFAULT_TOKEN) {
            let classes = self.classes()?;
            let candidates: Vec<(String, Activate)> = classes
                .activates
                .iter()
                .filter(|(name, rule)| {
                    group_matches(group, rule)
                        && !names.contains(&name.as_str())
                        && !negated(name)
                        && is_active(rule, carrier)
                })
                .map(|(name, rule)| (name.clone(), rule.clone()))
                .collect();

            for name in sort_activations(&candidates) {
                activated.push(self.extension(&name)?);
            }
        }

        let mut explicit = Vec::new();
        for name in &names {
            if name.starts_with('-') || negated(name) {
                continue;
            }
            if *name == DEFAULT_TOKEN {
                explicit.append(&mut activated);
                activated = std::mem::take(&mut explicit);
                continue;
            }
            explicit.push(self.extension(name)?);
        }
        activated.append(&mut explicit);

        Ok(activated)
    }

    /// [`activate_extensions`](Self::activate_extensions) with the names read
    /// from the comma separated carrier parameter `key`.
    pub fn activate_extensions_by_key(
        &self,
        carrier: &dyn ParameterCarrier,
        key: &str,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>> {
        let value = carrier.parameter(key).unwrap_or("");
        let values: Vec<&str> = value.split(',').collect();
        self.activate_extensions(carrier, &values, group)
    }

    /// Null check used by generated adaptive classes.
    pub fn require<'a, V: ?Sized>(
        value: Option<&'a V>,
        method: &str,
        argument: &str,
    ) -> Result<&'a V> {
        value.ok_or_else(|| Error::NullArgument {
            point: T::descriptor().name,
            method: method.to_string(),
            argument: argument.to_string(),
        })
    }

    /// Fails when adaptive name resolution produced an empty name.
    pub fn require_name(name: &str, carrier: &dyn ParameterCarrier, keys: &[&str]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::unresolved(T::descriptor().name, &carrier.describe(), keys));
        }
        Ok(())
    }

    /// Error returned by non-adaptive methods of generated classes.
    pub fn unsupported(method: &str) -> Error {
        Error::UnsupportedAdaptiveMethod {
            point: T::descriptor().name,
            method: method.to_string(),
        }
    }

    /// Upgrade the weak loader handle held by generated classes.
    pub fn upgrade(loader: &Weak<Self>) -> Result<Arc<Self>> {
        loader.upgrade().ok_or_else(|| {
            Error::configuration(T::descriptor().name, "extension loader has been dropped")
        })
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("point", &self.point.name)
            .field("loaded", &self.instances.lock().len())
            .field("adaptive", &self.adaptive.is_set())
            .finish()
    }
}
