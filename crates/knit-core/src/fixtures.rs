//! Points and implementations shared by unit tests.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::adaptive::{AdaptiveDispatcher, Arg};
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::extension::{
    AnyObject, ClassCatalog, ExtensionClass, ExtensionLoaders, ExtensionPoint, Inject, ObjectType,
    Setter, injected,
};
use crate::metadata::{Activate, MethodSpec, ParamSpec, PointDescriptor};
use crate::resource::EmbeddedResources;
use crate::url::Url;

pub trait Greeter: Send + Sync {
    fn greet(&self, url: &Url, who: &str) -> Result<String>;

    fn language(&self) -> Result<String>;
}

pub fn greeter_point() -> PointDescriptor {
    PointDescriptor::new("com.example.Greeter")
        .with_default("en")
        .with_rust_path("crate::fixtures::Greeter")
        .method(
            MethodSpec::adaptive("greet", "Result<String>", ["greeter"])
                .param(ParamSpec::carrier("url", "&knit_core::Url"))
                .param(ParamSpec::value("who", "&str")),
        )
        .method(MethodSpec::new("language", "Result<String>"))
}

struct GreeterShim(AdaptiveDispatcher<dyn Greeter>);

impl Greeter for GreeterShim {
    fn greet(&self, url: &Url, who: &str) -> Result<String> {
        self.0
            .select("greet", &[Arg::carrier(url), Arg::Value])?
            .greet(url, who)
    }

    fn language(&self) -> Result<String> {
        self.0.select("language", &[])?.language()
    }
}

impl ExtensionPoint for dyn Greeter {
    fn descriptor() -> PointDescriptor {
        greeter_point()
    }

    fn adaptive_shim(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        Some(Arc::new(GreeterShim(dispatcher)))
    }
}

pub struct EnglishGreeter;

impl Inject for EnglishGreeter {}

impl Greeter for EnglishGreeter {
    fn greet(&self, _url: &Url, who: &str) -> Result<String> {
        Ok(format!("Hello, {who}"))
    }

    fn language(&self) -> Result<String> {
        Ok("en".into())
    }
}

pub struct FrenchGreeter;

impl Inject for FrenchGreeter {}

impl Greeter for FrenchGreeter {
    fn greet(&self, _url: &Url, who: &str) -> Result<String> {
        Ok(format!("Bonjour, {who}"))
    }

    fn language(&self) -> Result<String> {
        Ok("fr".into())
    }
}

pub struct GermanGreeter;

impl Inject for GermanGreeter {}

impl Greeter for GermanGreeter {
    fn greet(&self, _url: &Url, who: &str) -> Result<String> {
        Ok(format!("Hallo, {who}"))
    }

    fn language(&self) -> Result<String> {
        Ok("de".into())
    }
}

pub struct LoudGreeter {
    inner: Arc<dyn Greeter>,
}

impl Inject for LoudGreeter {}

impl Greeter for LoudGreeter {
    fn greet(&self, url: &Url, who: &str) -> Result<String> {
        Ok(self.inner.greet(url, who)?.to_uppercase())
    }

    fn language(&self) -> Result<String> {
        self.inner.language()
    }
}

pub struct PoliteGreeter {
    inner: Arc<dyn Greeter>,
}

impl Inject for PoliteGreeter {}

impl Greeter for PoliteGreeter {
    fn greet(&self, url: &Url, who: &str) -> Result<String> {
        Ok(format!("{}, please", self.inner.greet(url, who)?))
    }

    fn language(&self) -> Result<String> {
        self.inner.language()
    }
}

pub trait Echo: Send + Sync {
    fn echo(&self, url: &Url, msg: &str) -> Result<String>;
}

pub fn echo_point() -> PointDescriptor {
    PointDescriptor::new("com.example.Echo")
        .with_rust_path("crate::fixtures::Echo")
        .method(
            MethodSpec::adaptive("echo", "Result<String>", ["foo"])
                .param(ParamSpec::carrier("url", "&knit_core::Url"))
                .param(ParamSpec::value("msg", "&str")),
        )
}

struct EchoShim(AdaptiveDispatcher<dyn Echo>);

impl Echo for EchoShim {
    fn echo(&self, url: &Url, msg: &str) -> Result<String> {
        self.0
            .select("echo", &[Arg::carrier(url), Arg::Value])?
            .echo(url, msg)
    }
}

impl ExtensionPoint for dyn Echo {
    fn descriptor() -> PointDescriptor {
        echo_point()
    }

    fn adaptive_shim(dispatcher: AdaptiveDispatcher<Self>) -> Option<Arc<Self>> {
        Some(Arc::new(EchoShim(dispatcher)))
    }
}

pub struct PrefixEcho(&'static str);

impl Inject for PrefixEcho {}

impl Echo for PrefixEcho {
    fn echo(&self, _url: &Url, msg: &str) -> Result<String> {
        Ok(format!("{}:{msg}", self.0))
    }
}

/// Echoes through the injected greeter.
#[derive(Default)]
pub struct WelcomeEcho {
    greeter: Mutex<Option<Arc<dyn Greeter>>>,
}

impl Inject for WelcomeEcho {
    fn setters(&self) -> Vec<Setter> {
        vec![
            Setter::object("set_greeter", ObjectType::point::<dyn Greeter>()),
            Setter::primitive("setTimeout", "u64"),
            Setter::object("set_backup", ObjectType::point::<dyn Greeter>()).disabled(),
        ]
    }

    fn set(&self, method: &str, value: AnyObject) -> Result<()> {
        match method {
            "set_greeter" => {
                let greeter = injected::<Arc<dyn Greeter>>(&value).ok_or_else(|| Error::Injection {
                    class: "com.example.WelcomeEcho".into(),
                    property: "greeter".into(),
                    message: "not a greeter".into(),
                })?;
                *self.greeter.lock() = Some(greeter);
                Ok(())
            }
            other => Err(Error::Injection {
                class: "com.example.WelcomeEcho".into(),
                property: other.into(),
                message: "no such setter".into(),
            }),
        }
    }
}

impl Echo for WelcomeEcho {
    fn echo(&self, url: &Url, msg: &str) -> Result<String> {
        let greeter = self
            .greeter
            .lock()
            .clone()
            .ok_or_else(|| Error::configuration("com.example.Echo", "greeter not injected"))?;
        greeter.greet(url, msg)
    }
}

pub trait Filter: Send + Sync {
    fn name(&self) -> String;
}

impl ExtensionPoint for dyn Filter {
    fn descriptor() -> PointDescriptor {
        PointDescriptor::new("com.example.Filter")
            .with_rust_path("crate::fixtures::Filter")
            .method(MethodSpec::new("name", "String"))
    }
}

pub struct NamedFilter(&'static str);

impl Inject for NamedFilter {}

impl Filter for NamedFilter {
    fn name(&self) -> String {
        self.0.to_string()
    }
}

pub fn catalog() -> ClassCatalog {
    ClassCatalog::new()
        .with(ExtensionClass::<dyn Greeter>::extension(
            "com.example.EnglishGreeter",
            || EnglishGreeter,
            |e| e,
        ))
        .with(ExtensionClass::<dyn Greeter>::extension(
            "com.example.FrenchGreeter",
            || FrenchGreeter,
            |e| e,
        ))
        .with(ExtensionClass::<dyn Greeter>::extension(
            "com.example.GermanGreeter",
            || GermanGreeter,
            |e| e,
        ))
        .with(ExtensionClass::<dyn Greeter>::wrapper(
            "com.example.LoudGreeter",
            |inner| LoudGreeter { inner },
            |e| e,
        ))
        .with(ExtensionClass::<dyn Greeter>::wrapper(
            "com.example.PoliteGreeter",
            |inner| PoliteGreeter { inner },
            |e| e,
        ))
        .with(ExtensionClass::<dyn Echo>::extension(
            "com.example.BarEcho",
            || PrefixEcho("bar"),
            |e| e,
        ))
        .with(ExtensionClass::<dyn Echo>::extension(
            "com.example.BazEcho",
            || PrefixEcho("baz"),
            |e| e,
        ))
        .with(ExtensionClass::<dyn Echo>::extension(
            "com.example.WelcomeEcho",
            WelcomeEcho::default,
            |e| e,
        ))
        .with(
            ExtensionClass::<dyn Filter>::extension("com.example.AFilter", || NamedFilter("a"), |e| e)
                .activate(Activate::new().order(1)),
        )
        .with(
            ExtensionClass::<dyn Filter>::extension("com.example.BFilter", || NamedFilter("b"), |e| e)
                .activate(Activate::new().order(2).after(["a"])),
        )
        .with(
            ExtensionClass::<dyn Filter>::extension(
                "com.example.CacheFilter",
                || NamedFilter("cache"),
                |e| e,
            )
            .activate(Activate::new().group(["consumer"]).value(["cache"]).order(0)),
        )
        .with(ExtensionClass::<dyn Filter>::extension(
            "com.example.PlainFilter",
            || NamedFilter("plain"),
            |e| e,
        ))
        .with(ExtensionClass::<dyn Filter>::adaptive(
            "com.example.FilterAdaptive",
            |_context| NamedFilter("adaptive"),
            |e| e,
        ))
}

pub fn resources() -> EmbeddedResources {
    EmbeddedResources::new()
        .with(
            "META-INF/knit/com.example.Greeter",
            "en=com.example.EnglishGreeter\nfr=com.example.FrenchGreeter\ncom.example.GermanGreeter\n",
        )
        .with(
            "META-INF/knit/com.example.Echo",
            "bar=com.example.BarEcho\nbaz=com.example.BazEcho\nwelcome=com.example.WelcomeEcho\n",
        )
        .with(
            "META-INF/knit/com.example.Filter",
            "com.example.BFilter\ncom.example.AFilter\ncache=com.example.CacheFilter\nplain=com.example.PlainFilter\n",
        )
}

pub fn loaders() -> ExtensionLoaders {
    ExtensionLoaders::with_resources(LoaderConfig::default(), catalog(), Arc::new(resources()))
}
