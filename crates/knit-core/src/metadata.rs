//! Declarative metadata carried by extension points and implementations.
//!
//! These structs play the part annotations play elsewhere: a point declares
//! its qualified name, default extension and method signatures through a
//! [`PointDescriptor`]; an implementation declares activation rules through
//! [`Activate`]. Descriptors are serializable so tools can generate adaptive
//! sources from a TOML description.

use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Conventional dispatch key that reads the carrier's protocol field.
pub const PROTOCOL_KEY: &str = "protocol";

/// Description of an extension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointDescriptor {
    /// Dot-qualified name, also the resource file name (`com.example.Greeter`)
    pub name: String,

    /// Rust path of the trait used in generated sources
    #[serde(default)]
    pub rust_path: Option<String>,

    /// Name of the default extension
    #[serde(default)]
    pub default_name: Option<String>,

    /// Method signatures, in declaration order
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

impl PointDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rust_path: None,
            default_name: None,
            methods: Vec::new(),
        }
    }

    /// Set the default extension name
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Set the Rust path of the trait
    pub fn with_rust_path(mut self, path: impl Into<String>) -> Self {
        self.rust_path = Some(path.into());
        self
    }

    /// Append a method signature
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Last segment of the qualified name.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Everything before the last segment; empty for unqualified names.
    pub fn package(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or("")
    }

    /// Rust path of the trait, derived from the qualified name when unset.
    pub fn trait_path(&self) -> String {
        match &self.rust_path {
            Some(path) => path.clone(),
            None => format!("crate::{}", self.name.replace('.', "::")),
        }
    }

    /// Default extension name with blanks treated as absent.
    pub fn default_extension(&self) -> Option<&str> {
        self.default_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Dispatch key used when an adaptive method declares none.
    ///
    /// The simple name is split on camel case into lower-case words joined
    /// by dots; a trailing `Service` word is dropped.
    pub fn default_key(&self) -> String {
        let snake = self.simple_name().to_snake_case();
        let mut words: Vec<&str> = snake.split('_').filter(|w| !w.is_empty()).collect();
        if words.len() > 1 && words.last() == Some(&"service") {
            words.pop();
        }
        words.join(".")
    }

    pub fn has_adaptive_method(&self) -> bool {
        self.methods.iter().any(|m| m.adaptive.is_some())
    }

    /// Check the descriptor is usable as an extension point.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration(
                "<unnamed>",
                "extension point name must not be blank",
            ));
        }

        if let Some(default) = &self.default_name {
            let names = default
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|n| !n.is_empty())
                .count();
            if names > 1 {
                return Err(Error::configuration(
                    &self.name,
                    format!("more than 1 default extension name: {default}"),
                ));
            }
        }

        Ok(())
    }
}

/// Signature of one point method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,

    #[serde(default)]
    pub params: Vec<ParamSpec>,

    /// Return type as written in the trait
    pub returns: String,

    /// Present when the method dispatches adaptively
    #[serde(default)]
    pub adaptive: Option<Adaptive>,
}

impl MethodSpec {
    /// A method that is not adaptive.
    ///
    /// The generated adaptive class panics in it unless `returns` is a `Result`.
    pub fn new(name: impl Into<String>, returns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: returns.into(),
            adaptive: None,
        }
    }

    /// An adaptive method dispatching on `keys` (empty: derived key).
    pub fn adaptive<I, S>(name: impl Into<String>, returns: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            adaptive: Some(Adaptive {
                keys: keys.into_iter().map(Into::into).collect(),
            }),
            ..Self::new(name, returns)
        }
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

/// Adaptive marker with the explicitly declared dispatch keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adaptive {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// What a parameter contributes to dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    /// Plain argument, forwarded untouched
    #[default]
    Value,
    /// The parameter is the carrier itself
    Carrier,
    /// The parameter exposes `method_name()`
    Invocation,
}

/// One method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    /// Type as written in the trait, e.g. `&knit_core::Url` or `Option<&Invoker>`
    pub ty: String,

    #[serde(default)]
    pub role: ParamRole,

    /// Zero-argument getters returning `Option<&Url>`, in scan order
    #[serde(default)]
    pub getters: Vec<String>,
}

impl ParamSpec {
    pub fn value(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            role: ParamRole::Value,
            getters: Vec::new(),
        }
    }

    pub fn carrier(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            role: ParamRole::Carrier,
            ..Self::value(name, ty)
        }
    }

    pub fn invocation(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            role: ParamRole::Invocation,
            ..Self::value(name, ty)
        }
    }

    /// Declare a getter returning the carrier
    pub fn getter(mut self, getter: impl Into<String>) -> Self {
        self.getters.push(getter.into());
        self
    }

    /// `Option<..>` parameters may be absent and get a null check.
    pub fn is_nullable(&self) -> bool {
        self.ty.trim_start().starts_with("Option<")
    }
}

/// Activation rule attached to an implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activate {
    /// Groups this extension participates in (empty: every group)
    #[serde(default)]
    pub group: Vec<String>,

    /// Carrier keys that must all be present, as `key` or `key:value`
    #[serde(default)]
    pub value: Vec<String>,

    /// Extensions this one must precede
    #[serde(default)]
    pub before: Vec<String>,

    /// Extensions this one must follow
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub order: i32,
}

impl Activate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn value<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}
