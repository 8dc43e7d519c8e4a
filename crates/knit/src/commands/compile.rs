//! Compile generated adaptive source.

use anyhow::{Context, Result};
use colored::Colorize;
use knit_core::compiler::MethodDispatch;
use knit_core::{ClassCatalog, CompiledClass, Compiler, ExtensionLoaders};
use std::sync::Arc;
use tracing::debug;

use crate::cli::CompileCommand;
use crate::config::Config;
use crate::error::KnitError;

/// Execute compile command.
pub fn execute(cmd: CompileCommand, config: &Config) -> Result<()> {
    let source = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let class = compile(&source, cmd.compiler.as_deref(), config)?;

    if cmd.json {
        let methods: serde_json::Map<String, serde_json::Value> = class
            .methods
            .iter()
            .map(|(name, dispatch)| (name.clone(), describe(dispatch).into()))
            .collect();
        let report = serde_json::json!({
            "class": class.name,
            "point": class.point,
            "compiler": class.compiler,
            "interfaces": class.interfaces,
            "methods": methods,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", class.name.bold(), format!("({})", class.compiler).dimmed());
    println!("{}", "═".repeat(60));
    println!("  Point: {}", class.point.as_deref().unwrap_or("(none)"));
    println!("  Implements: {}", class.interfaces.join(", "));
    println!();
    println!("  {}", "Methods:".cyan());
    for (name, dispatch) in &class.methods {
        let line = describe(dispatch);
        match dispatch {
            MethodDispatch::Unsupported => println!("    {} {}: {}", "○".yellow(), name, line.dimmed()),
            MethodDispatch::Adaptive(_) => println!("    {} {}: {}", "●".green(), name.bold(), line),
        }
    }

    Ok(())
}

/// Compile `source` with the named backend, or the configured one.
pub fn compile(source: &str, compiler: Option<&str>, config: &Config) -> Result<Arc<CompiledClass>> {
    let loaders = ExtensionLoaders::new(config.loader.clone(), ClassCatalog::new());
    let loader = loaders.loader::<dyn Compiler>()?;

    if let Some(name) = compiler {
        if !loader.has_extension(name)? {
            return Err(KnitError::CompilerNotAvailable(name.to_string()).into());
        }
        loaders.set_default_compiler(Some(name));
    }

    let class = loader
        .adaptive_extension()?
        .compile(source, &loaders.class_loader())
        .map_err(|e| {
            if let Some(text) = e.source_text() {
                debug!("Rejected source:\n{}", text);
            }
            KnitError::from(e)
        })?;
    Ok(class)
}

/// One-line rendering of a dispatch plan.
pub fn describe(dispatch: &MethodDispatch) -> String {
    let MethodDispatch::Adaptive(plan) = dispatch else {
        return "unsupported".to_string();
    };

    let mut carrier = format!("arg{}", plan.carrier.index);
    if let Some(getter) = &plan.carrier.getter {
        carrier.push_str(&format!(".{getter}()"));
    }
    let mut out = format!("carrier {carrier}, keys [{}]", plan.keys.join(", "));
    if let Some(index) = plan.invocation {
        out.push_str(&format!(", per-method via arg{index}"));
    }
    match &plan.default {
        Some(default) => out.push_str(&format!(", default {default}")),
        None => out.push_str(", no default"),
    }
    out
}
