//! Interpreter for compiled adaptive classes.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::compiler::{CarrierLocator, CompiledClass, DispatchPlan, MethodDispatch};
use crate::error::{Error, Result};
use crate::extension::{ExtensionLoader, ExtensionPoint};
use crate::metadata::PROTOCOL_KEY;
use crate::url::ParameterCarrier;

/// A call context exposing the name of the method being invoked.
pub trait Invocation: Send + Sync {
    fn method_name(&self) -> &str;
}

/// An argument that exposes the carrier through a named getter.
pub trait CarrierProvider: Send + Sync {
    /// The carrier returned by getter `getter`, if any.
    fn carrier(&self, getter: &str) -> Option<&dyn ParameterCarrier>;
}

/// One call argument as seen by the dispatcher.
///
/// `None` payloads stand for absent `Option` arguments.
#[derive(Clone, Copy)]
pub enum Arg<'a> {
    Carrier(Option<&'a dyn ParameterCarrier>),
    Provider(Option<&'a dyn CarrierProvider>),
    Invocation(Option<&'a dyn Invocation>),
    /// Any argument not taking part in dispatch
    Value,
}

impl<'a> Arg<'a> {
    pub fn carrier(carrier: &'a dyn ParameterCarrier) -> Self {
        Self::Carrier(Some(carrier))
    }

    pub fn provider(provider: &'a dyn CarrierProvider) -> Self {
        Self::Provider(Some(provider))
    }

    pub fn invocation(invocation: &'a dyn Invocation) -> Self {
        Self::Invocation(Some(invocation))
    }
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Carrier(c) => write!(f, "Carrier({:?})", c.map(|c| c.describe())),
            Self::Provider(p) => write!(f, "Provider({})", if p.is_some() { "some" } else { "none" }),
            Self::Invocation(i) => write!(f, "Invocation({:?})", i.map(|i| i.method_name())),
            Self::Value => write!(f, "Value"),
        }
    }
}

/// Runs the dispatch plans of a compiled adaptive class.
///
/// Points hand this to their [`ExtensionPoint::adaptive_shim`], whose
/// methods call [`AdaptiveDispatcher::select`] and forward to the result.
pub struct AdaptiveDispatcher<T: ?Sized> {
    class: Arc<CompiledClass>,
    loader: Weak<ExtensionLoader<T>>,
}

impl<T: ?Sized> AdaptiveDispatcher<T> {
    pub(crate) fn new(class: Arc<CompiledClass>, loader: Weak<ExtensionLoader<T>>) -> Self {
        Self { class, loader }
    }

    pub fn class(&self) -> &Arc<CompiledClass> {
        &self.class
    }

    fn point(&self) -> &str {
        self.class.point.as_deref().unwrap_or(&self.class.name)
    }

    fn plan(&self, method: &str) -> Result<&DispatchPlan> {
        match self.class.methods.get(method) {
            Some(MethodDispatch::Adaptive(plan)) => Ok(plan),
            Some(MethodDispatch::Unsupported) => Err(Error::UnsupportedAdaptiveMethod {
                point: self.point().to_string(),
                method: method.to_string(),
            }),
            None => Err(Error::generation(
                self.point(),
                method,
                format!("method not found in compiled class {}", self.class.name),
            )),
        }
    }

    fn null(&self, method: &str, argument: String) -> Error {
        Error::NullArgument {
            point: self.point().to_string(),
            method: method.to_string(),
            argument,
        }
    }

    fn mismatch(&self, method: &str, index: usize, expected: &str) -> Error {
        Error::generation(
            self.point(),
            method,
            format!("argument {index} is not the {expected} the compiled plan expects"),
        )
    }

    fn carrier<'a>(
        &self,
        method: &str,
        locator: &CarrierLocator,
        args: &[Arg<'a>],
    ) -> Result<&'a dyn ParameterCarrier> {
        let index = locator.index;
        match (args.get(index), locator.getter.as_deref()) {
            (Some(Arg::Carrier(Some(carrier))), None) => Ok(*carrier),
            (Some(Arg::Carrier(None)), None) => Err(self.null(method, format!("arg{index}"))),
            (Some(Arg::Provider(Some(provider))), Some(getter)) => provider
                .carrier(getter)
                .ok_or_else(|| self.null(method, format!("arg{index}.{getter}()"))),
            (Some(Arg::Provider(None)), Some(_)) => Err(self.null(method, format!("arg{index}"))),
            _ => Err(self.mismatch(method, index, "carrier")),
        }
    }

    /// Resolve the extension name `method` dispatches to for `args`.
    ///
    /// The carrier is located and null-checked first, then the invocation.
    /// Keys are tried in declared order, each falling back to the next and
    /// the last to the point default; the protocol key reads the carrier's
    /// protocol field.
    pub fn extension_name(&self, method: &str, args: &[Arg<'_>]) -> Result<String> {
        let plan = self.plan(method)?;
        let carrier = self.carrier(method, &plan.carrier, args)?;

        let method_name = match plan.invocation {
            Some(index) => match args.get(index) {
                Some(Arg::Invocation(Some(invocation))) => Some(invocation.method_name()),
                Some(Arg::Invocation(None)) => return Err(self.null(method, format!("arg{index}"))),
                _ => return Err(self.mismatch(method, index, "invocation")),
            },
            None => None,
        };

        let mut name = plan.default.clone().unwrap_or_default();
        for key in plan.keys.iter().rev() {
            name = if key == PROTOCOL_KEY {
                carrier.protocol_or(&name)
            } else if let Some(method_name) = method_name {
                carrier.method_parameter_or(method_name, key, &name)
            } else {
                carrier.parameter_or(key, &name)
            };
        }

        if name.is_empty() {
            return Err(Error::unresolved(self.point(), &carrier.describe(), plan.keys.as_slice()));
        }
        Ok(name)
    }
}

impl<T: ExtensionPoint + ?Sized> AdaptiveDispatcher<T> {
    /// The extension `method` should be forwarded to for `args`.
    pub fn select(&self, method: &str, args: &[Arg<'_>]) -> Result<Arc<T>> {
        let name = self.extension_name(method, args)?;
        ExtensionLoader::upgrade(&self.loader)?.extension(&name)
    }
}

impl<T: ?Sized> fmt::Debug for AdaptiveDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveDispatcher")
            .field("class", &self.class.name)
            .finish()
    }
}
