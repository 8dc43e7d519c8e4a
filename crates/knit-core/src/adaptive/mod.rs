//! Adaptive dispatch.
//!
//! An adaptive extension picks the concrete extension per call from the
//! arguments. [`AdaptiveClassCodeGenerator`] turns a point's method
//! signatures into the source of a dispatch class; a [`Compiler`] backend
//! turns that source into a [`CompiledClass`] whose dispatch plans
//! [`AdaptiveDispatcher`] interprets at call time.
//!
//! [`Compiler`]: crate::compiler::Compiler
//! [`CompiledClass`]: crate::compiler::CompiledClass

mod dispatch;
mod generator;

pub use dispatch::{AdaptiveDispatcher, Arg, CarrierProvider, Invocation};
pub use generator::AdaptiveClassCodeGenerator;
