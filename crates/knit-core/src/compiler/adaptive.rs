//! Compiler that delegates to the configured backend.

use std::sync::Arc;
use tracing::debug;

use super::{ClassLoader, CompiledClass, Compiler};
use crate::error::{Error, Result};
use crate::extension::{Inject, WeakLoaders};

/// Compiler that forwards to the registry's configured backend.
///
/// The backend named by [`ExtensionLoaders::set_default_compiler`] wins;
/// otherwise the compiler point's default extension is used.
///
/// [`ExtensionLoaders::set_default_compiler`]: crate::extension::ExtensionLoaders::set_default_compiler
#[derive(Debug)]
pub struct AdaptiveCompiler {
    loaders: WeakLoaders,
}

impl AdaptiveCompiler {
    pub fn new(loaders: WeakLoaders) -> Self {
        Self { loaders }
    }
}

impl Inject for AdaptiveCompiler {}

impl Compiler for AdaptiveCompiler {
    fn compile(&self, source: &str, class_loader: &Arc<ClassLoader>) -> Result<Arc<CompiledClass>> {
        let loaders = self.loaders.upgrade()?;
        let loader = loaders.loader::<dyn Compiler>()?;

        let compiler = match loaders.default_compiler() {
            Some(name) => {
                debug!("Compiling with configured compiler {}", name);
                loader.extension(&name)?
            }
            None => loader.default_extension()?.ok_or_else(|| {
                Error::configuration(loader.point().name.clone(), "no default compiler")
            })?,
        };
        compiler.compile(source, class_loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdaptiveClassCodeGenerator;
    use crate::fixtures;

    #[test]
    fn test_uses_point_default() {
        let loaders = fixtures::loaders();
        let compiler = loaders.loader::<dyn Compiler>().unwrap().adaptive_extension().unwrap();
        let source = AdaptiveClassCodeGenerator::new(&fixtures::echo_point()).generate().unwrap();

        let class = compiler.compile(&source, &loaders.class_loader()).unwrap();
        assert_eq!(class.compiler, "pattern");
    }

    #[test]
    fn test_configured_compiler_wins() {
        let loaders = fixtures::loaders();
        loaders.set_default_compiler(Some("syn"));
        let compiler = loaders.loader::<dyn Compiler>().unwrap().adaptive_extension().unwrap();
        let source = AdaptiveClassCodeGenerator::new(&fixtures::greeter_point()).generate().unwrap();

        let class = compiler.compile(&source, &Arc::new(ClassLoader::new("test"))).unwrap();
        assert_eq!(class.compiler, "syn");
    }

    #[test]
    fn test_unknown_configured_compiler() {
        let loaders = fixtures::loaders();
        loaders.set_default_compiler(Some("bytecode"));
        let compiler = loaders.loader::<dyn Compiler>().unwrap().adaptive_extension().unwrap();
        let source = AdaptiveClassCodeGenerator::new(&fixtures::echo_point()).generate().unwrap();

        let err = compiler.compile(&source, &Arc::new(ClassLoader::new("test"))).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_dropped_registry() {
        let compiler = AdaptiveCompiler::new(fixtures::loaders().downgrade());
        let source = AdaptiveClassCodeGenerator::new(&fixtures::echo_point()).generate().unwrap();

        assert!(compiler.compile(&source, &Arc::new(ClassLoader::new("test"))).is_err());
    }
}
