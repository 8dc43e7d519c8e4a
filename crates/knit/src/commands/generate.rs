//! Adaptive source generation from a point description.

use anyhow::{Context, Result};
use knit_core::{AdaptiveClassCodeGenerator, PointDescriptor};
use std::path::Path;
use tracing::info;

use crate::cli::GenerateCommand;
use crate::error::KnitError;

/// Execute generate command.
pub fn execute(cmd: GenerateCommand) -> Result<()> {
    let source = generate_file(&cmd.file)?;

    match cmd.out {
        Some(path) => {
            std::fs::write(&path, &source)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote adaptive source to {}", path.display());
        }
        None => print!("{}", source),
    }

    Ok(())
}

/// Read a TOML point description and generate its adaptive source.
pub fn generate_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let point: PointDescriptor =
        toml::from_str(&content).map_err(|e| KnitError::PointDescription {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    point.validate().map_err(KnitError::from)?;

    let source = AdaptiveClassCodeGenerator::new(&point)
        .generate()
        .map_err(KnitError::from)?;
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GREETER: &str = r#"
name = "com.example.Greeter"
default_name = "en"
rust_path = "demo::Greeter"

[[methods]]
name = "greet"
returns = "knit_core::Result<String>"
adaptive = { keys = ["greeter"] }

[[methods.params]]
name = "url"
ty = "&knit_core::Url"
role = "carrier"

[[methods.params]]
name = "who"
ty = "&str"
"#;

    #[test]
    fn test_generate_from_description() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("greeter.toml");
        std::fs::write(&path, GREETER).unwrap();

        let source = generate_file(&path).unwrap();
        assert!(source.starts_with("pub mod com_example {"));
        assert!(source.contains("pub struct GreeterAdaptive {"));
        assert!(source.contains("impl demo::Greeter for GreeterAdaptive {"));
    }

    #[test]
    fn test_invalid_description() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "methods = 3").unwrap();

        let err = generate_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnitError>(),
            Some(KnitError::PointDescription { .. })
        ));
    }

    #[test]
    fn test_point_without_adaptive_method() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("plain.toml");
        std::fs::write(&path, "name = \"com.example.Plain\"\n").unwrap();

        let err = generate_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnitError>(),
            Some(KnitError::Core(knit_core::Error::NoAdaptiveMethod { .. }))
        ));
    }

    #[test]
    fn test_writes_output_file() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("greeter.toml");
        let out = temp.path().join("greeter_adaptive.rs");
        std::fs::write(&path, GREETER).unwrap();

        execute(GenerateCommand {
            file: path,
            out: Some(out.clone()),
        })
        .unwrap();
        assert!(std::fs::read_to_string(out).unwrap().contains("GreeterAdaptive"));
    }
}
