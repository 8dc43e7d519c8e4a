//! Regex-driven compiler backend.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::{
    BoxError, CarrierLocator, ClassLoader, ClassName, CompiledClass, Compiler, DispatchPlan,
    MethodDispatch, compile_source,
};
use crate::error::Result;
use crate::extension::Inject;
use crate::metadata::PROTOCOL_KEY;

static USE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+([^;]+);").expect("valid use pattern"));

static POINT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"pub\s+const\s+POINT\s*:\s*&(?:'static\s+)?str\s*=\s*"((?:[^"\\]|\\.)*)"\s*;"#)
        .expect("valid point pattern")
});

static IMPL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"impl\s+([A-Za-z_][A-Za-z0-9_:]*)\s+for\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid impl pattern")
});

static METHOD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"fn\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*&self").expect("valid method pattern")
});

static CARRIER_LET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"let\s+carrier\s*=\s*([^;]+);").expect("valid carrier pattern"));

static METHOD_NAME_LET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"let\s+method_name\s*=\s*([^;]+);").expect("valid method name pattern")
});

static EXT_NAME_LET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"let\s+ext_name\s*=\s*([^;]+);").expect("valid extension name pattern")
});

static LOOKUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(protocol_or|method_parameter_or|parameter_or)\(\s*carrier\s*,\s*(?:method_name\s*,\s*)?(?:"((?:[^"\\]|\\.)*)"\s*,)?"#,
    )
    .expect("valid lookup pattern")
});

static LITERAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid literal pattern"));

static ARG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\barg(\d+)\b").expect("valid argument pattern"));

/// Incremental assembly of a [`CompiledClass`].
#[derive(Debug)]
pub struct ClassBuilder {
    name: ClassName,
    imports: Vec<String>,
    interfaces: Vec<String>,
    fields: Vec<(String, String)>,
    point: Option<String>,
    methods: BTreeMap<String, MethodDispatch>,
    source: String,
}

impl ClassBuilder {
    pub fn new(name: &ClassName, source: &str) -> Self {
        Self {
            name: name.clone(),
            imports: Vec::new(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            point: None,
            methods: BTreeMap::new(),
            source: source.to_string(),
        }
    }

    pub fn add_import(&mut self, path: impl Into<String>) -> &mut Self {
        self.imports.push(path.into());
        self
    }

    pub fn add_interface(&mut self, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        if !self.interfaces.contains(&path) {
            self.interfaces.push(path);
        }
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, ty: impl Into<String>) -> &mut Self {
        self.fields.push((name.into(), ty.into()));
        self
    }

    pub fn set_point(&mut self, point: impl Into<String>) -> &mut Self {
        self.point = Some(point.into());
        self
    }

    pub fn add_method(&mut self, name: impl Into<String>, dispatch: MethodDispatch) -> &mut Self {
        self.methods.insert(name.into(), dispatch);
        self
    }

    pub fn build(self, compiler: &str) -> CompiledClass {
        CompiledClass {
            name: self.name.qualified(),
            package: self.name.package,
            simple_name: self.name.simple_name,
            imports: self.imports,
            interfaces: self.interfaces,
            fields: self.fields,
            point: self.point,
            methods: self.methods,
            compiler: compiler.to_string(),
            source: self.source,
        }
    }
}

/// Builds classes from targeted patterns over the source text.
#[derive(Debug, Default)]
pub struct PatternCompiler;

impl PatternCompiler {
    pub fn new() -> Self {
        Self
    }

    fn do_compile(&self, name: &ClassName, source: &str) -> std::result::Result<CompiledClass, BoxError> {
        let mut builder = ClassBuilder::new(name, source);

        for captures in USE_PATTERN.captures_iter(source) {
            builder.add_import(captures[1].trim());
        }

        if let Some(captures) = POINT_PATTERN.captures(source) {
            builder.set_point(unescape(&captures[1]));
        }

        let struct_decl = format!("struct {}", name.simple_name);
        if let Some(start) = source.find(&struct_decl) {
            let after = start + struct_decl.len();
            let open = source[after..].find(['{', ';']).map(|i| after + i);
            if let Some(open) = open.filter(|i| source.as_bytes()[*i] == b'{') {
                let body = block(source, open).ok_or("unterminated struct body")?;
                for field in split_top_level(body) {
                    let (field, ty) = field
                        .split_once(':')
                        .ok_or_else(|| format!("malformed field `{field}`"))?;
                    let field = field.trim().trim_start_matches("pub ").trim();
                    builder.add_field(field, ty.trim());
                }
            }
        }

        let mut implemented = false;
        for captures in IMPL_PATTERN.captures_iter(source) {
            if captures[2] != name.simple_name {
                continue;
            }
            implemented = true;
            builder.add_interface(&captures[1]);

            let after = captures.get(0).map(|m| m.end()).unwrap_or(0);
            let open = source[after..]
                .find('{')
                .map(|i| after + i)
                .ok_or("impl block without body")?;
            let body = block(source, open).ok_or("unterminated impl block")?;

            for method in METHOD_PATTERN.captures_iter(body) {
                let method_name = &method[1];
                let after = method.get(0).map(|m| m.end()).unwrap_or(0);
                let open = body[after..]
                    .find('{')
                    .map(|i| after + i)
                    .ok_or_else(|| format!("method {method_name} has no body"))?;
                let method_body =
                    block(body, open).ok_or_else(|| format!("unterminated body of {method_name}"))?;
                let dispatch = parse_method(method_body)
                    .map_err(|e| format!("method {method_name}: {e}"))?;
                builder.add_method(method_name, dispatch);
            }
        }

        if !implemented {
            return Err(format!("class {} implements no trait", name.qualified()).into());
        }

        Ok(builder.build("pattern"))
    }
}

impl Inject for PatternCompiler {}

impl Compiler for PatternCompiler {
    fn compile(&self, source: &str, class_loader: &Arc<ClassLoader>) -> Result<Arc<CompiledClass>> {
        compile_source(source, class_loader, |name, source| {
            debug!("Compiling {} with the pattern compiler", name.qualified());
            self.do_compile(name, source)
        })
    }
}

/// Dispatch plan of one method body.
fn parse_method(body: &str) -> std::result::Result<MethodDispatch, BoxError> {
    if body.contains("unsupported(") {
        return Ok(MethodDispatch::Unsupported);
    }

    let carrier = CARRIER_LET
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .ok_or("no carrier binding")?;
    let argument = if carrier.contains("require(") {
        literals(&carrier).pop().ok_or("carrier null check names no argument")?
    } else {
        carrier
    };
    let carrier =
        CarrierLocator::parse(&argument).ok_or_else(|| format!("unrecognised carrier `{argument}`"))?;

    let invocation = match METHOD_NAME_LET.captures(body) {
        Some(captures) => {
            let index = ARG_PATTERN
                .captures(&captures[1])
                .and_then(|c| c[1].parse().ok())
                .ok_or("method name binding reads no argument")?;
            Some(index)
        }
        None => None,
    };

    let expr = EXT_NAME_LET
        .captures(body)
        .map(|c| c[1].to_string())
        .ok_or("no extension name binding")?;
    let mut keys = Vec::new();
    for lookup in LOOKUP_PATTERN.captures_iter(&expr) {
        match (&lookup[1], lookup.get(2)) {
            ("protocol_or", _) => keys.push(PROTOCOL_KEY.to_string()),
            (_, Some(key)) => keys.push(unescape(key.as_str())),
            (function, None) => return Err(format!("{function} without a key literal").into()),
        }
    }
    if keys.is_empty() {
        return Err("extension name binding performs no lookup".into());
    }
    let default = literals(&expr).pop().filter(|d| !d.is_empty());

    Ok(MethodDispatch::Adaptive(DispatchPlan {
        carrier,
        invocation,
        keys,
        default,
    }))
}

fn literals(text: &str) -> Vec<String> {
    LITERAL_PATTERN
        .captures_iter(text)
        .map(|c| unescape(&c[1]))
        .collect()
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Contents between the brace at `open` and its match, skipping string literals.
pub(crate) fn block(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside `<>`, `()` and `[]`, dropping empty entries.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdaptiveClassCodeGenerator;
    use crate::error::Error;
    use crate::fixtures;

    fn compile(source: &str) -> Result<Arc<CompiledClass>> {
        PatternCompiler::new().compile(source, &Arc::new(ClassLoader::new("test")))
    }

    #[test]
    fn test_compiles_generated_echo() {
        let source = AdaptiveClassCodeGenerator::new(&fixtures::echo_point())
            .generate()
            .unwrap();
        let class = compile(&source).unwrap();

        assert_eq!(class.name, "com_example::EchoAdaptive");
        assert_eq!(class.point.as_deref(), Some("com.example.Echo"));
        assert_eq!(class.imports, vec!["knit_core::ExtensionLoader"]);
        assert_eq!(
            class.fields,
            vec![("loader".to_string(), "std::sync::Weak<Loader>".to_string())]
        );
        assert!(class.implements("crate::fixtures::Echo"));
        assert!(class.implements("knit_core::Inject"));
        assert_eq!(
            class.methods.get("echo"),
            Some(&MethodDispatch::Adaptive(DispatchPlan {
                carrier: CarrierLocator {
                    index: 0,
                    getter: None
                },
                invocation: None,
                keys: vec!["foo".into()],
                default: None,
            }))
        );
        assert_eq!(class.compiler, "pattern");
    }

    #[test]
    fn test_compiles_generated_greeter() {
        let source = AdaptiveClassCodeGenerator::new(&fixtures::greeter_point())
            .generate()
            .unwrap();
        let class = compile(&source).unwrap();

        match class.methods.get("greet") {
            Some(MethodDispatch::Adaptive(plan)) => {
                assert_eq!(plan.keys, vec!["greeter"]);
                assert_eq!(plan.default.as_deref(), Some("en"));
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
        assert_eq!(class.methods.get("language"), Some(&MethodDispatch::Unsupported));
    }

    #[test]
    fn test_rejects_class_without_impl() {
        let err = compile("pub mod demo {\n    pub struct Lone {\n        x: u8,\n    }\n}\n").unwrap_err();
        assert!(matches!(err, Error::Compilation { .. }));
        assert!(err.to_string().contains("implements no trait"));
    }

    #[test]
    fn test_block_and_split_helpers() {
        let text = r#"fn a() { let s = "}"; { inner } } tail"#;
        let open = text.find('{').unwrap();
        assert_eq!(block(text, open), Some(r#" let s = "}"; { inner } "#));

        assert_eq!(
            split_top_level(" a: HashMap<String, u8>,\n b: (u8, u8), "),
            vec!["a: HashMap<String, u8>", "b: (u8, u8)"]
        );
    }
}
