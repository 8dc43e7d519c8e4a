//! Implementation classes and the injection contract.
//!
//! An [`ExtensionClass`] is the registration-time description of one
//! implementation type: its qualified name (the name resource lines refer to),
//! whether it is a plain extension, a wrapper or the hand-written adaptive
//! class, its activation rule, and how to construct it. Classes are collected
//! in a [`ClassCatalog`] that the registry resolves resource lines against.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use super::loader::ExtensionLoader;
use super::loaders::{ExtensionLoaders, WeakLoaders};
use super::ExtensionPoint;
use crate::error::{Error, Result};
use crate::metadata::Activate;

/// Type-erased object handed to a setter.
pub type AnyObject = Arc<dyn Any + Send + Sync>;

/// Resolves the adaptive instance of a point for injection.
pub type PointResolver = fn(&ExtensionLoaders) -> Result<Option<AnyObject>>;

/// Explicit dependency declaration of an implementation.
///
/// After construction the registry walks [`Inject::setters`] and offers each
/// object-typed setter a value resolved by the injection factory.
pub trait Inject: Send + Sync {
    fn setters(&self) -> Vec<Setter> {
        Vec::new()
    }

    /// Receive the value for setter `method`.
    fn set(&self, method: &str, value: AnyObject) -> Result<()> {
        let _ = value;
        Err(Error::Injection {
            class: std::any::type_name::<Self>().to_string(),
            property: method.to_string(),
            message: "no such setter".into(),
        })
    }
}

/// Downcast an injected object to the setter's parameter type.
pub fn injected<O: Clone + 'static>(value: &AnyObject) -> Option<O> {
    value.downcast_ref::<O>().cloned()
}

/// A single-argument setter.
#[derive(Debug, Clone)]
pub struct Setter {
    method: String,
    param: ParamType,
    disabled: bool,
}

impl Setter {
    /// Setter taking an object
    pub fn object(method: impl Into<String>, ty: ObjectType) -> Self {
        Self {
            method: method.into(),
            param: ParamType::Object(ty),
            disabled: false,
        }
    }

    /// Setter taking a primitive value, never injected
    pub fn primitive(method: impl Into<String>, ty: &'static str) -> Self {
        Self {
            method: method.into(),
            param: ParamType::Primitive(ty),
            disabled: false,
        }
    }

    /// Mark the setter injection-disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn param(&self) -> &ParamType {
        &self.param
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Property name: `set_foo` and `setFoo` both give `foo`.
    pub fn property(&self) -> Option<String> {
        if let Some(rest) = self.method.strip_prefix("set_") {
            return (!rest.is_empty()).then(|| rest.to_string());
        }
        let rest = self.method.strip_prefix("set")?;
        let mut chars = rest.chars();
        let first = chars.next()?;
        if !first.is_uppercase() {
            return None;
        }
        Some(first.to_lowercase().chain(chars).collect())
    }
}

/// Parameter type of a setter.
#[derive(Debug, Clone)]
pub enum ParamType {
    Primitive(&'static str),
    Object(ObjectType),
}

/// Object parameter type, identified by `TypeId`.
#[derive(Clone, Copy)]
pub struct ObjectType {
    type_id: TypeId,
    type_name: &'static str,
    point: Option<PointResolver>,
}

impl ObjectType {
    /// An arbitrary object type, resolved by name from registered objects.
    pub fn of<O: Any + Send + Sync>() -> Self {
        Self {
            type_id: TypeId::of::<O>(),
            type_name: std::any::type_name::<O>(),
            point: None,
        }
    }

    /// An extension point; the injected value is the point's `Arc<P>`.
    pub fn point<P: ExtensionPoint + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<Arc<P>>(),
            type_name: std::any::type_name::<P>(),
            point: Some(resolve_point::<P>),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_point(&self) -> bool {
        self.point.is_some()
    }

    pub(crate) fn resolver(&self) -> Option<PointResolver> {
        self.point
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("type_name", &self.type_name)
            .field("point", &self.point.is_some())
            .finish()
    }
}

fn resolve_point<P: ExtensionPoint + ?Sized>(loaders: &ExtensionLoaders) -> Result<Option<AnyObject>> {
    let loader = loaders.loader::<P>()?;
    if loader.supported_extensions()?.is_empty() {
        return Ok(None);
    }
    let object: AnyObject = Arc::new(loader.adaptive_extension()?);
    Ok(Some(object))
}

/// Category of an implementation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Named implementation built by default construction
    Extension,
    /// Decorator constructed around another instance of the point
    Wrapper,
    /// Hand-written adaptive dispatcher
    Adaptive,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension => write!(f, "extension"),
            Self::Wrapper => write!(f, "wrapper"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// What a hand-written adaptive class is constructed with.
pub struct AdaptiveContext<T: ?Sized> {
    loaders: WeakLoaders,
    loader: Weak<ExtensionLoader<T>>,
}

impl<T: ?Sized> AdaptiveContext<T> {
    pub(crate) fn new(loaders: WeakLoaders, loader: Weak<ExtensionLoader<T>>) -> Self {
        Self { loaders, loader }
    }

    /// The registry owning the point.
    pub fn loaders(&self) -> WeakLoaders {
        self.loaders.clone()
    }

    /// The loader of the point being dispatched.
    pub fn loader(&self) -> Weak<ExtensionLoader<T>> {
        self.loader.clone()
    }
}

impl<T: ?Sized> Clone for AdaptiveContext<T> {
    fn clone(&self) -> Self {
        Self {
            loaders: self.loaders.clone(),
            loader: self.loader.clone(),
        }
    }
}

pub(crate) enum Construct<T: ?Sized> {
    Plain,
    Wrap(Arc<T>),
    Adaptive(AdaptiveContext<T>),
}

/// A constructed object seen both as the point and as an injection target.
pub(crate) struct Instance<T: ?Sized> {
    pub target: Arc<T>,
    pub inject: Arc<dyn Inject>,
}

impl<T: ?Sized> Instance<T> {
    fn of<E, U>(value: E, upcast: &U) -> Self
    where
        E: Inject + 'static,
        U: Fn(Arc<E>) -> Arc<T>,
    {
        let value = Arc::new(value);
        Self {
            target: upcast(value.clone()),
            inject: value,
        }
    }
}

impl<T: ?Sized> Clone for Instance<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            inject: self.inject.clone(),
        }
    }
}

type Constructor<T> = dyn Fn(Construct<T>) -> Option<Instance<T>> + Send + Sync;

/// Registration of one implementation type for point `T`.
pub struct ExtensionClass<T: ?Sized> {
    type_name: String,
    kind: ClassKind,
    name: Option<String>,
    activate: Option<Activate>,
    construct: Arc<Constructor<T>>,
}

impl<T: ?Sized + 'static> ExtensionClass<T> {
    fn new<F>(type_name: impl Into<String>, kind: ClassKind, construct: F) -> Self
    where
        F: Fn(Construct<T>) -> Option<Instance<T>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            kind,
            name: None,
            activate: None,
            construct: Arc::new(construct),
        }
    }

    /// A plain extension built with `create`.
    ///
    /// `upcast` turns the concrete `Arc<E>` into the point, usually `|e| e`.
    pub fn extension<E, C, U>(type_name: impl Into<String>, create: C, upcast: U) -> Self
    where
        E: Inject + 'static,
        C: Fn() -> E + Send + Sync + 'static,
        U: Fn(Arc<E>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::new(type_name, ClassKind::Extension, move |construct| match construct {
            Construct::Plain => Some(Instance::of(create(), &upcast)),
            _ => None,
        })
    }

    /// A wrapper built around the instance it decorates.
    pub fn wrapper<E, C, U>(type_name: impl Into<String>, wrap: C, upcast: U) -> Self
    where
        E: Inject + 'static,
        C: Fn(Arc<T>) -> E + Send + Sync + 'static,
        U: Fn(Arc<E>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::new(type_name, ClassKind::Wrapper, move |construct| match construct {
            Construct::Wrap(inner) => Some(Instance::of(wrap(inner), &upcast)),
            _ => None,
        })
    }

    /// A hand-written adaptive class.
    pub fn adaptive<E, C, U>(type_name: impl Into<String>, create: C, upcast: U) -> Self
    where
        E: Inject + 'static,
        C: Fn(AdaptiveContext<T>) -> E + Send + Sync + 'static,
        U: Fn(Arc<E>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::new(type_name, ClassKind::Adaptive, move |construct| match construct {
            Construct::Adaptive(context) => Some(Instance::of(create(context), &upcast)),
            _ => None,
        })
    }

    /// Declare the extension name used for bare resource lines
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach an activation rule
    pub fn activate(mut self, rule: Activate) -> Self {
        self.activate = Some(rule);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn declared_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn activation(&self) -> Option<&Activate> {
        self.activate.as_ref()
    }

    /// Last segment of the type name.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.type_name)
    }

    pub(crate) fn construct(&self, construct: Construct<T>) -> Option<Instance<T>> {
        (self.construct)(construct)
    }
}

impl<T: ?Sized> Clone for ExtensionClass<T> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            kind: self.kind,
            name: self.name.clone(),
            activate: self.activate.clone(),
            construct: self.construct.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionClass")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// Last segment of a `.` or `::` qualified name.
pub(crate) fn simple_name(type_name: &str) -> &str {
    type_name
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(type_name)
}

pub(crate) enum Lookup<T: ?Sized> {
    Found(ExtensionClass<T>),
    /// Known type that does not implement the point
    WrongPoint,
    Unknown,
}

/// Known implementation classes by qualified type name.
///
/// A type implementing several points is registered once per point.
#[derive(Clone, Default)]
pub struct ClassCatalog {
    classes: HashMap<String, Vec<Arc<dyn Any + Send + Sync>>>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, replacing an earlier registration for the same point
    pub fn register<T: ?Sized + 'static>(&mut self, class: ExtensionClass<T>) -> &mut Self {
        let entries = self.classes.entry(class.type_name.clone()).or_default();
        entries.retain(|entry| !entry.is::<ExtensionClass<T>>());
        entries.push(Arc::new(class));
        self
    }

    /// Register a class (builder form)
    pub fn with<T: ?Sized + 'static>(mut self, class: ExtensionClass<T>) -> Self {
        self.register(class);
        self
    }

    /// Add every class of `other`, keeping ours on conflict
    pub fn merge(&mut self, other: &ClassCatalog) {
        for (name, entries) in &other.classes {
            let mine = self.classes.entry(name.clone()).or_default();
            for entry in entries {
                let entry_type = (**entry).type_id();
                if !mine.iter().any(|m| (**m).type_id() == entry_type) {
                    mine.push(entry.clone());
                }
            }
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.classes.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn lookup<T: ?Sized + 'static>(&self, type_name: &str) -> Lookup<T> {
        let Some(entries) = self.classes.get(type_name) else {
            return Lookup::Unknown;
        };
        entries
            .iter()
            .find_map(|entry| entry.downcast_ref::<ExtensionClass<T>>())
            .map(|class| Lookup::Found(class.clone()))
            .unwrap_or(Lookup::WrongPoint)
    }
}

impl fmt::Debug for ClassCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassCatalog")
            .field("classes", &self.type_names())
            .finish()
    }
}
