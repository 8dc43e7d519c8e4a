//! Compilers for generated adaptive sources.
//!
//! - **pattern**: targeted regex scan assembling the class incrementally
//! - **syntax**: full parse with `syn`, served through a child class loader
//! - **adaptive**: delegates to the configured backend, resolved through
//!   the registry like any other extension
//!
//! All backends share one front end ([`compile_source`]) that extracts the
//! module and struct names, consults the caller's [`ClassLoader`], checks the
//! unit is closed and wraps backend failures with the offending source.

mod adaptive;
mod pattern;
mod syntax;

pub use adaptive::AdaptiveCompiler;
pub use pattern::{ClassBuilder, PatternCompiler};
pub use syntax::SynCompiler;

use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::extension::{ClassCatalog, ExtensionClass, ExtensionPoint};
use crate::metadata::PointDescriptor;

/// Qualified name of the compiler extension point.
pub const COMPILER_POINT: &str = "knit.compiler.Compiler";

/// Built-in resource file of the compiler point.
pub const BUILTIN_RESOURCE: &str = "\
adaptive=knit.compiler.AdaptiveCompiler
pattern=knit.compiler.PatternCompiler
syn=knit.compiler.SynCompiler
";

/// Failure type returned by compiler backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turns adaptive class source into a loadable [`CompiledClass`].
pub trait Compiler: Send + Sync {
    /// Compile `source`, defining the result in `class_loader`.
    ///
    /// A class the loader already knows is returned without compiling.
    fn compile(&self, source: &str, class_loader: &Arc<ClassLoader>) -> Result<Arc<CompiledClass>>;
}

impl ExtensionPoint for dyn Compiler {
    fn descriptor() -> PointDescriptor {
        PointDescriptor::new(COMPILER_POINT).with_default("pattern")
    }
}

/// Classes of the built-in compilers.
pub fn builtin_classes() -> ClassCatalog {
    ClassCatalog::new()
        .with(ExtensionClass::<dyn Compiler>::adaptive(
            "knit.compiler.AdaptiveCompiler",
            |context| AdaptiveCompiler::new(context.loaders()),
            |c| c,
        ))
        .with(ExtensionClass::<dyn Compiler>::extension(
            "knit.compiler.PatternCompiler",
            PatternCompiler::new,
            |c| c,
        ))
        .with(ExtensionClass::<dyn Compiler>::extension(
            "knit.compiler.SynCompiler",
            SynCompiler::new,
            |c| c,
        ))
}

/// How a compiled adaptive method behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodDispatch {
    /// Not adaptive: every call fails
    Unsupported,
    Adaptive(DispatchPlan),
}

/// Where the carrier comes from and which keys select the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub carrier: CarrierLocator,
    /// Argument exposing the invoked method name, for per-method keys
    pub invocation: Option<usize>,
    /// Keys in lookup order
    pub keys: Vec<String>,
    /// Innermost fallback name
    pub default: Option<String>,
}

/// Argument index of the carrier, optionally behind a getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierLocator {
    pub index: usize,
    pub getter: Option<String>,
}

impl CarrierLocator {
    /// Parse `arg0` or `arg0.url()`.
    pub fn parse(argument: &str) -> Option<Self> {
        let (arg, getter) = match argument.split_once('.') {
            Some((arg, getter)) => (arg, Some(getter.strip_suffix("()")?.to_string())),
            None => (argument, None),
        };
        let index = arg.strip_prefix("arg")?.parse().ok()?;
        Some(Self { index, getter })
    }
}

/// A compiled adaptive class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClass {
    /// `module::Struct`
    pub name: String,
    pub package: String,
    pub simple_name: String,
    pub imports: Vec<String>,
    /// Implemented trait paths
    pub interfaces: Vec<String>,
    /// `(name, type)` pairs
    pub fields: Vec<(String, String)>,
    /// Value of the `POINT` constant
    pub point: Option<String>,
    pub methods: BTreeMap<String, MethodDispatch>,
    /// Backend that produced the class
    pub compiler: String,
    pub source: String,
}

impl CompiledClass {
    /// Whether the class implements `path` (matched on its last segment too).
    pub fn implements(&self, path: &str) -> bool {
        let last = |p: &str| p.rsplit("::").next().map(str::to_string);
        self.interfaces
            .iter()
            .any(|i| i == path || last(i) == last(path))
    }
}

/// Lookup order of a class loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegation {
    ParentFirst,
    /// Own classes shadow the parent's
    ChildFirst,
}

/// Namespace of compiled classes, optionally chained to a parent.
pub struct ClassLoader {
    name: String,
    parent: Option<Arc<ClassLoader>>,
    delegation: Delegation,
    classes: RwLock<HashMap<String, Arc<CompiledClass>>>,
}

impl ClassLoader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            delegation: Delegation::ParentFirst,
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// A loader that serves its own classes before asking `parent`.
    pub fn child(name: impl Into<String>, parent: Arc<ClassLoader>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
            delegation: Delegation::ChildFirst,
            classes: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ClassLoader>> {
        self.parent.as_ref()
    }

    pub fn delegation(&self) -> Delegation {
        self.delegation
    }

    /// Class defined in this loader itself.
    pub fn find_class(&self, name: &str) -> Option<Arc<CompiledClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Class visible through this loader and its parents.
    pub fn load_class(&self, name: &str) -> Result<Arc<CompiledClass>> {
        let from_parent = || {
            self.parent
                .as_ref()
                .and_then(|parent| parent.load_class(name).ok())
        };
        let found = match self.delegation {
            Delegation::ChildFirst => self.find_class(name).or_else(from_parent),
            Delegation::ParentFirst => from_parent().or_else(|| self.find_class(name)),
        };
        found.ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    /// Define `class`, replacing a class of the same name.
    pub fn define(&self, class: Arc<CompiledClass>) {
        debug!("Defined class {} in loader {}", class.name, self.name);
        self.classes.write().insert(class.name.clone(), class);
    }

    /// Names of classes defined in this loader, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLoader")
            .field("name", &self.name)
            .field("delegation", &self.delegation)
            .field("classes", &self.class_names())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .finish()
    }
}

static MODULE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pub\s+mod\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid module pattern")
});

static STRUCT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pub\s+struct\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid struct pattern")
});

/// Module and struct names of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassName {
    pub package: String,
    pub simple_name: String,
}

impl ClassName {
    /// Extract the first module and the first struct of `source`.
    pub fn of(source: &str) -> Result<Self> {
        let simple_name = STRUCT_PATTERN
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidSource {
                message: format!("no struct name found in source: {}", preview(source)),
            })?;
        let package = MODULE_PATTERN
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Ok(Self {
            package,
            simple_name,
        })
    }

    pub fn qualified(&self) -> String {
        if self.package.is_empty() {
            self.simple_name.clone()
        } else {
            format!("{}::{}", self.package, self.simple_name)
        }
    }
}

fn preview(source: &str) -> String {
    const MAX: usize = 80;
    let trimmed = source.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

/// Front end shared by the backends.
pub(crate) fn compile_source<F>(
    source: &str,
    class_loader: &Arc<ClassLoader>,
    backend: F,
) -> Result<Arc<CompiledClass>>
where
    F: FnOnce(&ClassName, &str) -> std::result::Result<CompiledClass, BoxError>,
{
    let class_name = ClassName::of(source)?;
    let qualified = class_name.qualified();

    if let Ok(existing) = class_loader.load_class(&qualified) {
        debug!("Class {} already loaded by {}", qualified, class_loader.name());
        return Ok(existing);
    }

    if !source.trim_end().ends_with('}') {
        return Err(Error::MalformedSource {
            class: qualified,
            source_text: source.to_string(),
        });
    }

    let class = backend(&class_name, source)
        .map_err(|e| Error::compilation(&qualified, &*e, source))?;
    let class = Arc::new(class);
    class_loader.define(class.clone());
    Ok(class)
}
