//! Resource scan command.

use anyhow::{Context, Result};
use colored::Colorize;
use knit_core::LoaderConfig;
use knit_core::resource::{DirectoryResources, ResourceReader};
use serde::Serialize;
use std::collections::HashMap;

use crate::cli::ScanCommand;
use crate::config::Config;

/// One resource line found for a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEntry {
    /// Resource path the file was found at
    pub path: String,
    pub origin: String,
    pub line: usize,
    /// Declared names; empty for bare lines
    pub names: Vec<String>,
    pub class_name: String,
    /// Class an earlier line already bound one of the names to
    pub duplicate_of: Option<String>,
}

/// Execute scan command.
pub fn execute(cmd: ScanCommand, config: &Config) -> Result<()> {
    let loader = config.loader_with_roots(&cmd.roots);
    let reader = DirectoryResources::new(loader.resource_roots.clone());
    let entries = scan(&reader, &loader, &cmd.point)
        .with_context(|| format!("Failed to scan resources of {}", cmd.point))?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", format!("No resources found for {}.", cmd.point).yellow());
        if loader.resource_roots.is_empty() {
            println!("  Use {} to add a resource root.", "--root".cyan());
        }
        return Ok(());
    }

    println!("{}", cmd.point.bold());
    println!("{}", "═".repeat(60));

    let mut current_path: Option<&str> = None;
    for entry in &entries {
        if current_path != Some(entry.path.as_str()) {
            println!();
            println!("  {}", entry.path.cyan());
            current_path = Some(entry.path.as_str());
        }

        let names = if entry.names.is_empty() {
            "(derived)".dimmed().to_string()
        } else {
            entry.names.join(", ")
        };
        let mark = match &entry.duplicate_of {
            Some(existing) => format!("✗ duplicate of {existing}").red(),
            None => "●".green(),
        };
        println!(
            "    {} {} = {} {}",
            mark,
            names.bold(),
            entry.class_name,
            format!("({}:{})", entry.origin, entry.line).dimmed()
        );
    }

    let duplicates = entries.iter().filter(|e| e.duplicate_of.is_some()).count();
    println!();
    if duplicates > 0 {
        println!("{}", format!("✗ {} conflicting name(s)", duplicates).red().bold());
    } else {
        println!("{}", format!("✓ {} entries", entries.len()).green());
    }

    Ok(())
}

/// Entries of `point` across the enabled tiers, in precedence order.
pub fn scan(reader: &dyn ResourceReader, loader: &LoaderConfig, point: &str) -> Result<Vec<ScanEntry>> {
    let mut entries = Vec::new();
    let mut bound: HashMap<String, String> = HashMap::new();

    for path in loader.resource_paths(point) {
        for resource in reader.read(&path)? {
            for line in resource.lines() {
                let duplicate_of = line.names.iter().find_map(|name| {
                    bound
                        .get(name)
                        .filter(|class| **class != line.class_name)
                        .cloned()
                });
                for name in &line.names {
                    bound
                        .entry(name.clone())
                        .or_insert_with(|| line.class_name.clone());
                }

                entries.push(ScanEntry {
                    path: path.clone(),
                    origin: resource.origin.clone(),
                    line: line.line_no,
                    names: line.names,
                    class_name: line.class_name,
                    duplicate_of,
                });
            }
        }
    }

    Ok(entries)
}
