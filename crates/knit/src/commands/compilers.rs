//! Compiler backend listing.

use anyhow::Result;
use colored::Colorize;
use knit_core::{ClassCatalog, Compiler, ExtensionLoaders};
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilerReport {
    /// Backends registered for the compiler point
    pub backends: Vec<String>,
    /// Default declared by the compiler point
    pub point_default: Option<String>,
    /// Backend selected by configuration, if any
    pub configured: Option<String>,
}

impl CompilerReport {
    /// Backend the adaptive compiler delegates to.
    pub fn effective(&self) -> Option<&str> {
        self.configured.as_deref().or(self.point_default.as_deref())
    }
}

/// Execute compilers command.
pub fn execute(json: bool, config: &Config) -> Result<()> {
    let loaders = ExtensionLoaders::new(config.loader.clone(), ClassCatalog::new());
    let report = report(&loaders)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Compiler Backends".bold());
    println!("{}", "═".repeat(60));
    let effective = report.effective();
    for backend in &report.backends {
        if Some(backend.as_str()) == effective {
            println!("{} {} {}", "●".green(), backend.bold(), "(effective)".dimmed());
        } else {
            println!("{} {}", "○".dimmed(), backend);
        }
    }

    if let Some(configured) = &report.configured {
        if !report.backends.contains(configured) {
            println!();
            println!(
                "{}",
                format!("✗ configured compiler {configured} is not registered").red()
            );
        }
    }

    Ok(())
}

pub fn report(loaders: &ExtensionLoaders) -> Result<CompilerReport> {
    let loader = loaders.loader::<dyn Compiler>()?;
    Ok(CompilerReport {
        backends: loader.supported_extensions()?,
        point_default: loader.default_extension_name().map(str::to_string),
        configured: loaders.default_compiler(),
    })
}
