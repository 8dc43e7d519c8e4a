//! A generated adaptive unit compiled into the crate ahead of time.
//!
//! `generated/translator_adaptive.rs` is the generator's output for
//! [`translator_point`]; regenerate it when the generator changes.

use knit_core::resource::EmbeddedResources;
use knit_core::{
    AdaptiveClassCodeGenerator, ClassCatalog, Error, ExtensionClass, ExtensionLoaders,
    ExtensionPoint, Inject, LoaderConfig, MethodSpec, ParamSpec, PointDescriptor, Url,
};
use std::sync::Arc;

pub trait Translator: Send + Sync {
    fn translate(&self, url: Option<&Url>, text: &str) -> knit_core::Result<String>;

    /// Not adaptive; the generated class panics when called.
    fn describe(&self) -> String;

    fn flush(&self) -> knit_core::Result<()>;
}

fn translator_point() -> PointDescriptor {
    PointDescriptor::new("org.demo.Translator")
        .with_default("upper")
        .with_rust_path("crate::Translator")
        .method(
            MethodSpec::adaptive("translate", "knit_core::Result<String>", ["lang"])
                .param(ParamSpec::carrier("url", "Option<&knit_core::Url>"))
                .param(ParamSpec::value("text", "&str")),
        )
        .method(MethodSpec::new("describe", "String"))
        .method(MethodSpec::new("flush", "knit_core::Result<()>"))
}

impl ExtensionPoint for dyn Translator {
    fn descriptor() -> PointDescriptor {
        translator_point()
    }
}

include!("generated/translator_adaptive.rs");

struct Upper;

impl Inject for Upper {}

impl Translator for Upper {
    fn translate(&self, _url: Option<&Url>, text: &str) -> knit_core::Result<String> {
        Ok(text.to_uppercase())
    }

    fn describe(&self) -> String {
        "upper".to_string()
    }

    fn flush(&self) -> knit_core::Result<()> {
        Ok(())
    }
}

struct Lower;

impl Inject for Lower {}

impl Translator for Lower {
    fn translate(&self, _url: Option<&Url>, text: &str) -> knit_core::Result<String> {
        Ok(text.to_lowercase())
    }

    fn describe(&self) -> String {
        "lower".to_string()
    }

    fn flush(&self) -> knit_core::Result<()> {
        Ok(())
    }
}

fn loaders() -> ExtensionLoaders {
    let catalog = ClassCatalog::new()
        .with(ExtensionClass::<dyn Translator>::extension("org.demo.Upper", || Upper, |e| e))
        .with(ExtensionClass::<dyn Translator>::extension("org.demo.Lower", || Lower, |e| e))
        .with(ExtensionClass::<dyn Translator>::adaptive(
            "org.demo.TranslatorAdaptive",
            |context| org_demo::TranslatorAdaptive::new(context.loader()),
            |e| e,
        ));
    let resources = EmbeddedResources::new().with(
        "META-INF/knit/org.demo.Translator",
        "upper=org.demo.Upper\nlower=org.demo.Lower\norg.demo.TranslatorAdaptive\n",
    );
    ExtensionLoaders::with_resources(LoaderConfig::default(), catalog, Arc::new(resources))
}

fn adaptive(loaders: &ExtensionLoaders) -> Arc<dyn Translator> {
    loaders
        .loader::<dyn Translator>()
        .unwrap()
        .adaptive_extension()
        .unwrap()
}

#[test]
fn test_checked_in_unit_matches_generator() {
    let generated = AdaptiveClassCodeGenerator::new(&translator_point())
        .generate()
        .unwrap();
    let checked_in = include_str!("generated/translator_adaptive.rs");

    let tokens = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
    assert_eq!(tokens(&generated), tokens(checked_in));
    assert_eq!(org_demo::POINT, translator_point().name);
}

#[test]
fn test_dispatches_on_carrier_key() {
    let loaders = loaders();
    let translator = adaptive(&loaders);

    let url = Url::new("knit").with_parameter("lang", "lower");
    assert_eq!(translator.translate(Some(&url), "Hi Ann").unwrap(), "hi ann");
}

#[test]
fn test_falls_back_to_default() {
    let loaders = loaders();
    let translator = adaptive(&loaders);

    let url = Url::new("knit");
    assert_eq!(translator.translate(Some(&url), "Hi Ann").unwrap(), "HI ANN");

    let url = Url::new("knit").with_parameter("lang", "");
    assert_eq!(translator.translate(Some(&url), "Hi Ann").unwrap(), "HI ANN");
}

#[test]
fn test_missing_carrier_is_null_argument() {
    let loaders = loaders();
    let translator = adaptive(&loaders);

    match translator.translate(None, "Hi Ann") {
        Err(Error::NullArgument {
            point,
            method,
            argument,
        }) => {
            assert_eq!(point, "org.demo.Translator");
            assert_eq!(method, "translate");
            assert_eq!(argument, "arg0");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_unknown_name_is_not_found() {
    let loaders = loaders();
    let translator = adaptive(&loaders);

    let url = Url::new("knit").with_parameter("lang", "klingon");
    assert!(translator.translate(Some(&url), "Hi").unwrap_err().is_not_found());
}

#[test]
fn test_plain_methods_are_unsupported() {
    let loaders = loaders();
    let translator = adaptive(&loaders);

    assert!(matches!(
        translator.flush(),
        Err(Error::UnsupportedAdaptiveMethod { .. })
    ));
}

#[test]
#[should_panic(expected = "The method describe of extension org.demo.Translator is not adaptive")]
fn test_plain_method_without_result_panics() {
    let loaders = loaders();
    adaptive(&loaders).describe();
}
