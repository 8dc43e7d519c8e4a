//! Source generator for adaptive classes.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::metadata::{MethodSpec, PROTOCOL_KEY, ParamRole, ParamSpec, PointDescriptor};

const INDENT: &str = "    ";

/// Emits the Rust source of a point's adaptive class.
///
/// The unit is a single module named after the point's package, importing
/// only the loader type and holding one struct, `<Simple>Adaptive`, that
/// implements the point trait. Output depends on the descriptor alone.
///
/// Non-adaptive methods returning `Result` fail with
/// [`Error::UnsupportedAdaptiveMethod`]; any other non-adaptive method panics
/// with that error's message.
#[derive(Debug)]
pub struct AdaptiveClassCodeGenerator<'a> {
    point: &'a PointDescriptor,
}

impl<'a> AdaptiveClassCodeGenerator<'a> {
    pub fn new(point: &'a PointDescriptor) -> Self {
        Self { point }
    }

    /// Module the class lives in.
    ///
    /// Dots become `_`. An underscore is escaped as `_0` and a dot before a
    /// digit as `_1`, so distinct packages never share a module. The root
    /// package maps to `_adaptive`.
    pub fn module_name(&self) -> String {
        let package = self.point.package();
        if package.is_empty() {
            return "_adaptive".to_string();
        }

        let mut module = String::with_capacity(package.len());
        let mut chars = package.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '_' => module.push_str("_0"),
                '.' if chars.peek().is_some_and(char::is_ascii_digit) => module.push_str("_1"),
                '.' => module.push('_'),
                c => module.push(c),
            }
        }
        module
    }

    pub fn class_name(&self) -> String {
        format!("{}Adaptive", self.point.simple_name())
    }

    /// Generate the complete unit.
    pub fn generate(&self) -> Result<String> {
        if !self.point.has_adaptive_method() {
            return Err(Error::NoAdaptiveMethod {
                point: self.point.name.clone(),
            });
        }

        let class = self.class_name();
        let trait_path = self.point.trait_path();
        let mut out = String::new();

        let _ = writeln!(out, "pub mod {} {{", self.module_name());
        let _ = writeln!(out, "{INDENT}use knit_core::ExtensionLoader;");
        out.push('\n');
        let _ = writeln!(out, "{INDENT}pub const POINT: &str = {:?};", self.point.name);
        out.push('\n');
        let _ = writeln!(out, "{INDENT}type Loader = ExtensionLoader<dyn {trait_path}>;");
        out.push('\n');
        let _ = writeln!(out, "{INDENT}pub struct {class} {{");
        let _ = writeln!(out, "{INDENT}{INDENT}loader: std::sync::Weak<Loader>,");
        let _ = writeln!(out, "{INDENT}}}");
        out.push('\n');
        let _ = writeln!(out, "{INDENT}impl {class} {{");
        let _ = writeln!(
            out,
            "{INDENT}{INDENT}pub fn new(loader: std::sync::Weak<Loader>) -> Self {{"
        );
        let _ = writeln!(out, "{INDENT}{INDENT}{INDENT}Self {{ loader }}");
        let _ = writeln!(out, "{INDENT}{INDENT}}}");
        let _ = writeln!(out, "{INDENT}}}");
        out.push('\n');
        let _ = writeln!(out, "{INDENT}impl knit_core::Inject for {class} {{}}");
        out.push('\n');
        let _ = writeln!(out, "{INDENT}impl {trait_path} for {class} {{");
        for (i, method) in self.point.methods.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&self.generate_method(method)?);
        }
        let _ = writeln!(out, "{INDENT}}}");
        out.push_str("}\n");

        Ok(out)
    }

    fn generate_method(&self, method: &MethodSpec) -> Result<String> {
        let adaptive = method.adaptive.is_some();
        let params: Vec<String> = method
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let prefix = if adaptive { "" } else { "_" };
                format!("{prefix}arg{i}: {}", param.ty)
            })
            .collect();

        let returns = method.returns.trim();
        let mut signature = format!("fn {}(&self", method.name);
        for param in &params {
            signature.push_str(", ");
            signature.push_str(param);
        }
        signature.push(')');
        if !returns.is_empty() && returns != "()" {
            signature.push_str(" -> ");
            signature.push_str(returns);
        }

        let body = if adaptive {
            self.generate_adaptive_body(method)?
        } else {
            vec![self.generate_unsupported(method)]
        };

        let pad = INDENT.repeat(2);
        let mut out = format!("{pad}{signature} {{\n");
        for line in body {
            let _ = writeln!(out, "{pad}{INDENT}{line}");
        }
        let _ = writeln!(out, "{pad}}}");
        Ok(out)
    }

    fn generate_unsupported(&self, method: &MethodSpec) -> String {
        if returns_result(&method.returns) {
            format!("Err(Loader::unsupported({:?}).into())", method.name)
        } else {
            format!("panic!(\"{{}}\", Loader::unsupported({:?}))", method.name)
        }
    }

    fn generate_adaptive_body(&self, method: &MethodSpec) -> Result<Vec<String>> {
        if !returns_result(&method.returns) {
            return Err(Error::generation(
                &self.point.name,
                &method.name,
                format!(
                    "adaptive methods must return a Result, found `{}`",
                    method.returns
                ),
            ));
        }

        let mut lines = self.generate_carrier(method)?;

        let invocation = method
            .params
            .iter()
            .position(|p| p.role == ParamRole::Invocation);
        if let Some(index) = invocation {
            let param = &method.params[index];
            let value = if param.is_nullable() {
                format!(
                    "Loader::require(arg{index}, {:?}, \"arg{index}\")?",
                    method.name
                )
            } else {
                format!("arg{index}")
            };
            lines.push(format!(
                "let method_name = knit_core::Invocation::method_name({value});"
            ));
        }

        let keys = self.keys(method)?;
        lines.push(format!(
            "let ext_name = {};",
            self.name_expression(&keys, invocation.is_some())
        ));
        let quoted: Vec<String> = keys.iter().map(|k| format!("{k:?}")).collect();
        lines.push(format!(
            "Loader::require_name(&ext_name, carrier, &[{}])?;",
            quoted.join(", ")
        ));
        lines.push("let extension = Loader::upgrade(&self.loader)?.extension(&ext_name)?;".to_string());

        let args: Vec<String> = (0..method.params.len()).map(|i| format!("arg{i}")).collect();
        let mut call = format!("{}::{}(&*extension", self.point.trait_path(), method.name);
        for arg in &args {
            call.push_str(", ");
            call.push_str(arg);
        }
        call.push(')');
        lines.push(call);

        Ok(lines)
    }

    /// Statements binding `carrier`, with null checks for `Option` arguments.
    fn generate_carrier(&self, method: &MethodSpec) -> Result<Vec<String>> {
        let name = &method.name;

        if let Some(index) = method.params.iter().position(|p| p.role == ParamRole::Carrier) {
            let line = if method.params[index].is_nullable() {
                format!("let carrier = Loader::require(arg{index}, {name:?}, \"arg{index}\")?;")
            } else {
                format!("let carrier = arg{index};")
            };
            return Ok(vec![line]);
        }

        let provider = method
            .params
            .iter()
            .enumerate()
            .find_map(|(index, param)| first_getter(param).map(|getter| (index, param, getter)));
        let Some((index, param, getter)) = provider else {
            return Err(Error::generation(
                &self.point.name,
                name,
                "no carrier parameter or carrier getter found",
            ));
        };

        let described = format!("arg{index}.{getter}()");
        if param.is_nullable() {
            Ok(vec![
                format!("let arg{index}_value = Loader::require(arg{index}, {name:?}, \"arg{index}\")?;"),
                format!(
                    "let carrier = Loader::require(arg{index}_value.{getter}(), {name:?}, {described:?})?;"
                ),
            ])
        } else {
            Ok(vec![format!(
                "let carrier = Loader::require({described}, {name:?}, {described:?})?;"
            )])
        }
    }

    /// Declared keys, or the key derived from the point name.
    fn keys(&self, method: &MethodSpec) -> Result<Vec<String>> {
        let declared: Vec<String> = method
            .adaptive
            .iter()
            .flat_map(|a| a.keys.iter())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !declared.is_empty() {
            return Ok(declared);
        }

        let derived = self.point.default_key();
        if derived.is_empty() {
            return Err(Error::generation(
                &self.point.name,
                &method.name,
                "no dispatch key declared and none derivable from the point name",
            ));
        }
        Ok(vec![derived])
    }

    /// Nested lookups, first key outermost, default name innermost.
    fn name_expression(&self, keys: &[String], per_method: bool) -> String {
        let default = self.point.default_extension().unwrap_or("");
        let mut expr = format!("{default:?}");
        let mut owned = false;

        for key in keys.iter().rev() {
            let fallback = if owned { format!("&{expr}") } else { expr };
            expr = if key == PROTOCOL_KEY {
                format!("knit_core::ParameterCarrier::protocol_or(carrier, {fallback})")
            } else if per_method {
                format!(
                    "knit_core::ParameterCarrier::method_parameter_or(carrier, method_name, {key:?}, {fallback})"
                )
            } else {
                format!("knit_core::ParameterCarrier::parameter_or(carrier, {key:?}, {fallback})")
            };
            owned = true;
        }

        expr
    }
}

fn first_getter(param: &ParamSpec) -> Option<&str> {
    if param.role != ParamRole::Value {
        return None;
    }
    param
        .getters
        .iter()
        .map(|g| g.trim())
        .find(|g| !g.is_empty())
}

/// `Result<..>` or a path ending in `Result<..>`.
fn returns_result(returns: &str) -> bool {
    let head = returns.trim().split('<').next().unwrap_or("");
    head.rsplit("::").next().map(str::trim) == Some("Result") && returns.contains('<')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MethodSpec, ParamSpec};

    fn echo_point() -> PointDescriptor {
        PointDescriptor::new("com.example.Echo")
            .with_rust_path("crate::Echo")
            .method(
                MethodSpec::adaptive("echo", "knit_core::Result<String>", ["foo"])
                    .param(ParamSpec::carrier("url", "&knit_core::Url"))
                    .param(ParamSpec::value("msg", "&str")),
            )
            .method(MethodSpec::new("name", "String"))
    }

    #[test]
    fn test_generates_complete_unit() {
        let source = AdaptiveClassCodeGenerator::new(&echo_point()).generate().unwrap();

        assert!(source.starts_with("pub mod com_example {\n"));
        assert!(source.contains("use knit_core::ExtensionLoader;"));
        assert!(source.contains("pub const POINT: &str = \"com.example.Echo\";"));
        assert!(source.contains("pub struct EchoAdaptive {"));
        assert!(source.contains("impl crate::Echo for EchoAdaptive {"));
        assert!(source.contains("let carrier = arg0;"));
        assert!(source.contains(
            "let ext_name = knit_core::ParameterCarrier::parameter_or(carrier, \"foo\", \"\");"
        ));
        assert!(source.contains("Loader::require_name(&ext_name, carrier, &[\"foo\"])?;"));
        assert!(source.contains("crate::Echo::echo(&*extension, arg0, arg1)"));
        assert!(source.contains("fn name(&self) -> String {"));
        assert!(source.contains("panic!(\"{}\", Loader::unsupported(\"name\"))"));
        assert!(source.trim_end().ends_with('}'));
    }

    #[test]
    fn test_output_is_deterministic() {
        let point = echo_point();
        let first = AdaptiveClassCodeGenerator::new(&point).generate().unwrap();
        let second = AdaptiveClassCodeGenerator::new(&point).generate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_adaptive_method_is_refused() {
        let point = PointDescriptor::new("com.example.Plain").method(MethodSpec::new("run", "()"));
        let err = AdaptiveClassCodeGenerator::new(&point).generate().unwrap_err();
        assert!(matches!(err, Error::NoAdaptiveMethod { .. }));
    }

    #[test]
    fn test_missing_carrier_names_the_method() {
        let point = PointDescriptor::new("com.example.Broken").method(
            MethodSpec::adaptive("run", "Result<(), knit_core::Error>", Vec::<String>::new())
                .param(ParamSpec::value("x", "u32")),
        );
        match AdaptiveClassCodeGenerator::new(&point).generate() {
            Err(Error::AdaptiveGeneration { method, .. }) => assert_eq!(method, "run"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_adaptive_method_must_return_result() {
        let point = PointDescriptor::new("com.example.Broken").method(
            MethodSpec::adaptive("run", "String", ["k"])
                .param(ParamSpec::carrier("url", "&knit_core::Url")),
        );
        assert!(AdaptiveClassCodeGenerator::new(&point).generate().is_err());
    }

    #[test]
    fn test_key_fallback_chain_with_protocol_and_default() {
        let point = PointDescriptor::new("com.example.rpc.Protocol")
            .with_default("knit")
            .method(
                MethodSpec::adaptive("export", "Result<String>", ["transport", "protocol"])
                    .param(ParamSpec::carrier("url", "&knit_core::Url")),
            );
        let source = AdaptiveClassCodeGenerator::new(&point).generate().unwrap();

        assert!(source.starts_with("pub mod com_example_rpc {"));
        assert!(source.contains(
            "let ext_name = knit_core::ParameterCarrier::parameter_or(carrier, \"transport\", \
             &knit_core::ParameterCarrier::protocol_or(carrier, \"knit\"));"
        ));
    }

    #[test]
    fn test_derived_key_getter_and_invocation() {
        let point = PointDescriptor::new("com.example.LoadBalanceService").method(
            MethodSpec::adaptive("select", "Result<String>", Vec::<String>::new())
                .param(ParamSpec::value("invoker", "Option<&Invoker>").getter("url"))
                .param(ParamSpec::invocation("invocation", "&Call")),
        );
        let source = AdaptiveClassCodeGenerator::new(&point).generate().unwrap();

        assert!(source.contains(
            "let arg0_value = Loader::require(arg0, \"select\", \"arg0\")?;"
        ));
        assert!(source.contains(
            "let carrier = Loader::require(arg0_value.url(), \"select\", \"arg0.url()\")?;"
        ));
        assert!(source.contains("let method_name = knit_core::Invocation::method_name(arg1);"));
        assert!(source.contains(
            "knit_core::ParameterCarrier::method_parameter_or(carrier, method_name, \"load.balance\", \"\")"
        ));
    }

    #[test]
    fn test_module_names_are_distinct_per_package() {
        let module = |name: &str| {
            AdaptiveClassCodeGenerator::new(&PointDescriptor::new(name)).module_name()
        };

        assert_eq!(module("com.example.Echo"), "com_example");
        assert_eq!(module("com_example.Echo"), "com_0example");
        assert_eq!(module("com.v1_x.Echo"), "com_v1_0x");
        assert_eq!(module("Echo"), "_adaptive");
        assert_ne!(module("a.0b.Echo"), module("a_b.Echo"));
        assert_ne!(module("a._b.Echo"), module("a_.b.Echo"));
        assert_ne!(module("adaptive.Echo"), module("Echo"));
    }

    #[test]
    fn test_colliding_packages_compile_to_separate_classes() {
        use crate::compiler::{ClassLoader, Compiler, PatternCompiler};
        use std::sync::Arc;

        let loader = Arc::new(ClassLoader::new("shared"));
        let compiler = PatternCompiler::new();
        for name in ["com.example.Echo", "com_example.Echo"] {
            let point = PointDescriptor::new(name).method(
                MethodSpec::adaptive("echo", "knit_core::Result<String>", ["foo"])
                    .param(ParamSpec::carrier("url", "&knit_core::Url")),
            );
            let source = AdaptiveClassCodeGenerator::new(&point).generate().unwrap();
            let class = compiler.compile(&source, &loader).unwrap();
            assert_eq!(class.point.as_deref(), Some(name));
        }
        assert_eq!(
            loader.class_names(),
            vec!["com_0example::EchoAdaptive", "com_example::EchoAdaptive"]
        );
    }

    #[test]
    fn test_returns_result() {
        assert!(returns_result("Result<String>"));
        assert!(returns_result("knit_core::Result<()>"));
        assert!(returns_result("std::result::Result<u8, MyError>"));
        assert!(!returns_result("String"));
        assert!(!returns_result("ResultSet"));
    }
}
