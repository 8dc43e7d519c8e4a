//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;
use knit_core::{ClassCatalog, Compiler, ExtensionLoaders};
use std::path::Path;

use crate::config::Config;

pub fn execute(config: &Config) -> Result<()> {
    println!("{}", "knit Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check config file
    print!("  Config file: ");
    let config_path = Config::config_path();
    if config_path.exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check compiler backends
    print!("  Compilers: ");
    let loaders = ExtensionLoaders::new(config.loader.clone(), ClassCatalog::new());
    match loaders
        .loader::<dyn Compiler>()
        .and_then(|loader| loader.supported_extensions())
    {
        Ok(backends) => {
            println!("{}", format!("✓ {}", backends.join(", ")).green());
            if let Some(configured) = loaders.default_compiler() {
                print!("  Configured compiler ({}): ", configured);
                if backends.contains(&configured) {
                    println!("{}", "✓ registered".green());
                } else {
                    println!("{}", "✗ not registered".red());
                    issues.push(format!("Compiler {configured} is not registered"));
                }
            }
        }
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push("Compiler point failed to load".to_string());
        }
    }

    // Check resource roots
    println!();
    println!("  {}", "Resource roots:".cyan());
    if config.loader.resource_roots.is_empty() {
        println!("    {}", "○ none configured".yellow());
    }
    for root in &config.loader.resource_roots {
        println!("    {}:", root.display());
        if !root.is_dir() {
            println!("      {}", "✗ not a directory".red());
            issues.push(format!("Resource root {} is missing", root.display()));
            continue;
        }

        for strategy in config.loader.enabled_strategies() {
            print!("      {}: ", strategy.directory);
            match count_files(&root.join(&strategy.directory)) {
                Some(Ok(count)) => println!("{}", format!("✓ {} file(s)", count).green()),
                Some(Err(e)) => {
                    println!("{}", format!("✗ {}", e).red());
                    issues.push(format!(
                        "Cannot read {} in {}",
                        strategy.directory,
                        root.display()
                    ));
                }
                None => println!("{}", "○ absent".yellow()),
            }
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}

/// Regular files directly in `dir`; `None` when it does not exist.
fn count_files(dir: &Path) -> Option<std::io::Result<usize>> {
    if !dir.exists() {
        return None;
    }
    let count = std::fs::read_dir(dir).and_then(|entries| {
        let mut count = 0;
        for entry in entries {
            if entry?.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    });
    Some(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_count_files_skips_directories() {
        let temp = tempdir().expect("Failed to create temp dir");
        let dir = temp.path().join("META-INF/knit");
        std::fs::create_dir_all(dir.join("internal")).unwrap();
        std::fs::write(dir.join("com.example.Greeter"), "en=com.example.English").unwrap();

        assert_eq!(count_files(&dir).unwrap().unwrap(), 1);
        assert!(count_files(&temp.path().join("META-INF/services")).is_none());
    }
}
