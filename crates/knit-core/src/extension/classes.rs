//! Resolved name → class map of one extension point.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

use super::class::{ClassCatalog, ClassKind, ExtensionClass, Lookup, simple_name};
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::metadata::{Activate, PointDescriptor};
use crate::resource::{ResourceLine, ResourceReader};

/// A resource line that could not be turned into a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadFailure {
    pub line: String,
    pub message: String,
}

pub(crate) struct ClassMap<T: ?Sized> {
    pub extensions: BTreeMap<String, ExtensionClass<T>>,
    /// Implementation type name → first registered name
    pub names: HashMap<String, String>,
    /// First name of each activatable class → its rule
    pub activates: BTreeMap<String, Activate>,
    /// In registration order
    pub wrappers: Vec<ExtensionClass<T>>,
    pub adaptive: Option<ExtensionClass<T>>,
    pub failures: Vec<LoadFailure>,
}

impl<T: ?Sized> Default for ClassMap<T> {
    fn default() -> Self {
        Self {
            extensions: BTreeMap::new(),
            names: HashMap::new(),
            activates: BTreeMap::new(),
            wrappers: Vec::new(),
            adaptive: None,
            failures: Vec::new(),
        }
    }
}

impl<T: ?Sized> Clone for ClassMap<T> {
    fn clone(&self) -> Self {
        Self {
            extensions: self.extensions.clone(),
            names: self.names.clone(),
            activates: self.activates.clone(),
            wrappers: self.wrappers.clone(),
            adaptive: self.adaptive.clone(),
            failures: self.failures.clone(),
        }
    }
}

impl<T: ?Sized + 'static> ClassMap<T> {
    /// Scan every tier for the point's resource files.
    ///
    /// Lines naming unknown types, or types registered for another point, are
    /// recorded and skipped. Conflicting names and a second adaptive class
    /// abort the scan.
    pub fn load(
        point: &PointDescriptor,
        config: &LoaderConfig,
        resources: &dyn ResourceReader,
        catalog: &ClassCatalog,
    ) -> Result<Self> {
        let mut map = Self::default();

        for path in config.resource_paths(&point.name) {
            let found = match resources.read(&path) {
                Ok(found) => found,
                Err(e) => {
                    error!("Failed to read extension resource {}: {}", path, e);
                    map.failures.push(LoadFailure {
                        line: path.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for resource in found {
                for line in resource.lines() {
                    map.load_line(point, catalog, &resource.origin, &line)?;
                }
            }
        }

        Ok(map)
    }

    fn load_line(
        &mut self,
        point: &PointDescriptor,
        catalog: &ClassCatalog,
        origin: &str,
        line: &ResourceLine,
    ) -> Result<()> {
        let class = match catalog.lookup::<T>(&line.class_name) {
            Lookup::Found(class) => class,
            Lookup::WrongPoint => {
                self.record(
                    origin,
                    line,
                    format!(
                        "{} is not a subtype of extension point {}",
                        line.class_name, point.name
                    ),
                );
                return Ok(());
            }
            Lookup::Unknown => {
                self.record(origin, line, format!("class {} not found", line.class_name));
                return Ok(());
            }
        };

        let names = if line.names.is_empty() {
            derive_name(point, &class).into_iter().collect()
        } else {
            line.names.clone()
        };
        if names.is_empty() && class.kind() == ClassKind::Extension {
            self.record(
                origin,
                line,
                format!("no extension name for the class {}", line.class_name),
            );
            return Ok(());
        }

        self.add_class(point, class, &names)
    }

    fn record(&mut self, origin: &str, line: &ResourceLine, cause: String) {
        let message = format!(
            "Failed to load extension class (interface: {}, class line: {}) in {}:{}, cause: {}",
            line.class_name, line.raw, origin, line.line_no, cause
        );
        error!("{}", message);
        self.failures.push(LoadFailure {
            line: line.raw.clone(),
            message,
        });
    }

    /// Register `class` under `names` according to its kind.
    pub fn add_class(
        &mut self,
        point: &PointDescriptor,
        class: ExtensionClass<T>,
        names: &[String],
    ) -> Result<()> {
        match class.kind() {
            ClassKind::Adaptive => match &self.adaptive {
                Some(existing) if existing.type_name() != class.type_name() => {
                    Err(Error::configuration(
                        &point.name,
                        format!(
                            "More than 1 adaptive class found: {}, {}",
                            existing.type_name(),
                            class.type_name()
                        ),
                    ))
                }
                Some(_) => Ok(()),
                None => {
                    debug!("Adaptive class of {} is {}", point.name, class.type_name());
                    self.adaptive = Some(class);
                    Ok(())
                }
            },
            ClassKind::Wrapper => {
                if !self
                    .wrappers
                    .iter()
                    .any(|w| w.type_name() == class.type_name())
                {
                    self.wrappers.push(class);
                }
                Ok(())
            }
            ClassKind::Extension => {
                let Some(first) = names.first() else {
                    return Err(Error::configuration(
                        &point.name,
                        format!("no extension name for the class {}", class.type_name()),
                    ));
                };

                for name in names {
                    if let Some(existing) = self.extensions.get(name) {
                        if existing.type_name() != class.type_name() {
                            return Err(Error::DuplicateExtension {
                                point: point.name.clone(),
                                name: name.clone(),
                                existing: existing.type_name().to_string(),
                                duplicate: class.type_name().to_string(),
                            });
                        }
                    }
                }

                if let Some(rule) = class.activation() {
                    self.activates
                        .entry(first.clone())
                        .or_insert_with(|| rule.clone());
                }
                self.names
                    .entry(class.type_name().to_string())
                    .or_insert_with(|| first.clone());
                for name in names {
                    self.extensions
                        .entry(name.clone())
                        .or_insert_with(|| class.clone());
                }
                Ok(())
            }
        }
    }

    /// Not-found error carrying the load failures that mention `name`.
    pub fn not_found(&self, point: &PointDescriptor, name: &str) -> Error {
        let needle = name.to_lowercase();
        let causes: Vec<&LoadFailure> = self
            .failures
            .iter()
            .filter(|f| f.line.to_lowercase().contains(&needle))
            .collect();

        let mut detail = String::new();
        if !causes.is_empty() {
            detail.push_str(", possible causes:");
            for (i, cause) in causes.iter().enumerate() {
                detail.push_str(&format!("\n({}) {}:\n{}", i + 1, cause.line, cause.message));
            }
        }

        Error::ExtensionNotFound {
            point: point.name.clone(),
            name: name.to_string(),
            detail,
        }
    }
}

/// Name for a bare line: the declared name, else the simple type name with
/// the point's simple name stripped from its end, lower-cased.
pub(crate) fn derive_name<T: ?Sized + 'static>(
    point: &PointDescriptor,
    class: &ExtensionClass<T>,
) -> Option<String> {
    if let Some(name) = class.declared_name().map(str::trim).filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    let simple = simple_name(class.type_name());
    let stripped = simple.strip_suffix(point.simple_name()).unwrap_or(simple);
    (!stripped.is_empty()).then(|| stripped.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Greeter};
    use crate::resource::EmbeddedResources;

    fn load(content: &str) -> Result<ClassMap<dyn Greeter>> {
        let resources =
            EmbeddedResources::new().with("META-INF/knit/com.example.Greeter", content);
        ClassMap::load(
            &fixtures::greeter_point(),
            &LoaderConfig::default(),
            &resources,
            &fixtures::catalog(),
        )
    }

    #[test]
    fn test_names_and_derived_names() {
        let map = load("en=com.example.EnglishGreeter\ncom.example.GermanGreeter\n").unwrap();

        let names: Vec<&String> = map.extensions.keys().collect();
        assert_eq!(names, vec!["en", "german"]);
        assert_eq!(
            map.names.get("com.example.GermanGreeter").map(String::as_str),
            Some("german")
        );
    }

    #[test]
    fn test_same_class_twice_is_skipped() {
        let map = load("en=com.example.EnglishGreeter\nen=com.example.EnglishGreeter\n").unwrap();
        assert_eq!(map.extensions.len(), 1);
    }

    #[test]
    fn test_conflicting_names_are_fatal() {
        let err = load("en=com.example.EnglishGreeter\nen=com.example.FrenchGreeter\n")
            .err()
            .expect("duplicate name must fail");
        match err {
            Error::DuplicateExtension {
                name,
                existing,
                duplicate,
                ..
            } => {
                assert_eq!(name, "en");
                assert_eq!(existing, "com.example.EnglishGreeter");
                assert_eq!(duplicate, "com.example.FrenchGreeter");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrappers_and_unknown_classes() {
        let map = load(
            "com.example.LoudGreeter\nit=com.example.ItalianGreeter\nbad=com.example.AFilter\n",
        )
        .unwrap();

        assert_eq!(map.wrappers.len(), 1);
        assert!(map.extensions.is_empty());
        assert_eq!(map.failures.len(), 2);

        let err = map.not_found(&fixtures::greeter_point(), "it");
        let message = err.to_string();
        assert!(message.contains("possible causes"));
        assert!(message.contains("com.example.ItalianGreeter not found"));
    }

    #[test]
    fn test_multiple_names_on_one_line() {
        let map = load("fr, french = com.example.FrenchGreeter\n").unwrap();

        assert!(map.extensions.contains_key("fr"));
        assert!(map.extensions.contains_key("french"));
        assert_eq!(
            map.names.get("com.example.FrenchGreeter").map(String::as_str),
            Some("fr")
        );
    }
}
