//! `syn`-based compiler backend.
//!
//! Sources and outputs are kept as in-memory file objects. Every class is
//! defined in its own child [`ClassLoader`] that serves it before delegating
//! to the caller's loader; recompiling an unchanged source is answered by
//! that loader instead of the parser.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use syn::visit::{self, Visit};
use syn::{
    Expr, ExprCall, Fields, GenericArgument, ImplItem, Item, Lit, Local, Macro, Pat, Path,
    PathArguments, Type, UseTree,
};
use tracing::debug;

use super::{
    BoxError, CarrierLocator, ClassBuilder, ClassLoader, ClassName, CompiledClass, Compiler,
    DispatchPlan, MethodDispatch, compile_source,
};
use crate::error::{Error, Result};
use crate::extension::Inject;
use crate::metadata::PROTOCOL_KEY;

/// Source handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub class: String,
    pub text: String,
}

/// Output of one compilation, with the loader that defined it.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub class: String,
    pub compiled: Arc<CompiledClass>,
    pub loader: Arc<ClassLoader>,
}

#[derive(Debug, Default)]
struct FileManager {
    sources: Mutex<BTreeMap<String, SourceFile>>,
    outputs: Mutex<BTreeMap<String, ClassFile>>,
}

/// Parses the full unit with `syn` and reads the dispatch plans off the AST.
#[derive(Debug, Default)]
pub struct SynCompiler {
    files: FileManager,
}

impl SynCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source last compiled for `class`.
    pub fn source_file(&self, class: &str) -> Option<SourceFile> {
        self.files.sources.lock().get(class).cloned()
    }

    /// Classes this compiler has produced, sorted.
    pub fn class_files(&self) -> Vec<String> {
        self.files.outputs.lock().keys().cloned().collect()
    }

    pub fn class_file(&self, class: &str) -> Option<ClassFile> {
        self.files.outputs.lock().get(class).cloned()
    }

    /// Resolve `class` through the child loader that compiled it.
    pub fn load_class(&self, class: &str) -> Result<Arc<CompiledClass>> {
        match self.class_file(class) {
            Some(file) => file.loader.load_class(&file.class),
            None => Err(Error::ClassNotFound(class.to_string())),
        }
    }

    /// Previous output for `class` if it was compiled from `source`.
    fn compiled_from(&self, class: &str, source: &str) -> Option<Arc<CompiledClass>> {
        let unchanged = self
            .files
            .sources
            .lock()
            .get(class)
            .is_some_and(|file| file.text == source);
        if !unchanged {
            return None;
        }
        self.load_class(class).ok()
    }

    fn do_compile(
        &self,
        name: &ClassName,
        source: &str,
        class_loader: &Arc<ClassLoader>,
    ) -> std::result::Result<CompiledClass, BoxError> {
        let qualified = name.qualified();
        if let Some(compiled) = self.compiled_from(&qualified, source) {
            debug!("Reusing {} from its syn class loader", qualified);
            return Ok(CompiledClass::clone(&compiled));
        }

        self.files.sources.lock().insert(
            qualified.clone(),
            SourceFile {
                class: qualified.clone(),
                text: source.to_string(),
            },
        );

        let file = syn::parse_file(source)?;
        let items = if name.package.is_empty() {
            &file.items
        } else {
            file.items
                .iter()
                .find_map(|item| match item {
                    Item::Mod(module) if module.ident == name.package => {
                        module.content.as_ref().map(|(_, items)| items)
                    }
                    _ => None,
                })
                .ok_or_else(|| format!("module {} has no inline body", name.package))?
        };

        let mut builder = ClassBuilder::new(name, source);
        let mut implemented = false;
        for item in items {
            match item {
                Item::Use(item) => {
                    builder.add_import(render_use(&item.tree));
                }
                Item::Const(item) if item.ident == "POINT" => {
                    if let Expr::Lit(expr) = &*item.expr {
                        if let Lit::Str(value) = &expr.lit {
                            builder.set_point(value.value());
                        }
                    }
                }
                Item::Struct(item) if item.ident == name.simple_name => {
                    if let Fields::Named(fields) = &item.fields {
                        for field in &fields.named {
                            if let Some(ident) = &field.ident {
                                builder.add_field(ident.to_string(), render_type(&field.ty));
                            }
                        }
                    }
                }
                Item::Impl(item) if is_type(&item.self_ty, &name.simple_name) => {
                    let Some((_, path, _)) = &item.trait_ else {
                        continue;
                    };
                    implemented = true;
                    builder.add_interface(render_path(path));

                    for member in &item.items {
                        let ImplItem::Fn(method) = member else {
                            continue;
                        };
                        if method.sig.receiver().is_none() {
                            continue;
                        }
                        let method_name = method.sig.ident.to_string();
                        let dispatch = analyze(&method.block)
                            .map_err(|e| format!("method {method_name}: {e}"))?;
                        builder.add_method(method_name, dispatch);
                    }
                }
                _ => {}
            }
        }

        if !implemented {
            return Err(format!("class {qualified} implements no trait").into());
        }

        let class = Arc::new(builder.build("syn"));
        let loader = Arc::new(ClassLoader::child(
            format!("syn:{qualified}"),
            class_loader.clone(),
        ));
        loader.define(class.clone());

        self.files.outputs.lock().insert(
            qualified.clone(),
            ClassFile {
                class: qualified,
                compiled: class.clone(),
                loader,
            },
        );
        Ok(CompiledClass::clone(&class))
    }
}

impl Inject for SynCompiler {}

impl Compiler for SynCompiler {
    fn compile(&self, source: &str, class_loader: &Arc<ClassLoader>) -> Result<Arc<CompiledClass>> {
        compile_source(source, class_loader, |name, source| {
            debug!("Compiling {} with the syn compiler", name.qualified());
            self.do_compile(name, source, class_loader)
        })
    }
}

fn is_type(ty: &Type, simple_name: &str) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == simple_name),
        _ => false,
    }
}

/// Walks a method body for the bindings the generator emits.
#[derive(Default)]
struct BodyVisitor {
    unsupported: bool,
    carrier: Option<CarrierLocator>,
    invocation: Option<usize>,
    keys: Vec<String>,
    default: Option<String>,
    lookup: Option<std::result::Result<(), String>>,
}

impl<'ast> Visit<'ast> for BodyVisitor {
    fn visit_local(&mut self, local: &'ast Local) {
        if let (Pat::Ident(pat), Some(init)) = (&local.pat, &local.init) {
            let expr = &*init.expr;
            match pat.ident.to_string().as_str() {
                "carrier" => self.carrier = carrier_locator(expr),
                "method_name" => self.invocation = first_argument(expr),
                "ext_name" => {
                    self.lookup = Some(collect_lookups(expr, &mut self.keys, &mut self.default));
                }
                _ => {}
            }
        }
        visit::visit_local(self, local);
    }

    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        if expr_path_ends_with(&call.func, "unsupported") {
            self.unsupported = true;
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        if mac.path.is_ident("panic") && mac.tokens.to_string().contains("unsupported") {
            self.unsupported = true;
        }
        visit::visit_macro(self, mac);
    }
}

/// Collects `argN` identifiers in visit order.
#[derive(Default)]
struct ArgumentVisitor {
    indices: Vec<usize>,
}

impl<'ast> Visit<'ast> for ArgumentVisitor {
    fn visit_path(&mut self, path: &'ast Path) {
        if let Some(index) = path
            .get_ident()
            .and_then(|ident| ident.to_string().strip_prefix("arg")?.parse().ok())
        {
            self.indices.push(index);
        }
        visit::visit_path(self, path);
    }
}

fn analyze(block: &syn::Block) -> std::result::Result<MethodDispatch, BoxError> {
    let mut visitor = BodyVisitor::default();
    visitor.visit_block(block);

    if visitor.unsupported {
        return Ok(MethodDispatch::Unsupported);
    }
    let carrier = visitor.carrier.ok_or("no carrier binding")?;
    match visitor.lookup {
        None => return Err("no extension name binding".into()),
        Some(Err(e)) => return Err(e.into()),
        Some(Ok(())) => {}
    }
    if visitor.keys.is_empty() {
        return Err("extension name binding performs no lookup".into());
    }

    Ok(MethodDispatch::Adaptive(DispatchPlan {
        carrier,
        invocation: visitor.invocation,
        keys: visitor.keys,
        default: visitor.default,
    }))
}

fn carrier_locator(expr: &Expr) -> Option<CarrierLocator> {
    match expr {
        Expr::Path(path) => CarrierLocator::parse(&path.path.get_ident()?.to_string()),
        Expr::Try(expr) => carrier_locator(&expr.expr),
        Expr::Paren(expr) => carrier_locator(&expr.expr),
        Expr::Call(call) if expr_path_ends_with(&call.func, "require") => {
            match call.args.last()? {
                Expr::Lit(lit) => match &lit.lit {
                    Lit::Str(value) => CarrierLocator::parse(&value.value()),
                    _ => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

fn first_argument(expr: &Expr) -> Option<usize> {
    let mut visitor = ArgumentVisitor::default();
    visitor.visit_expr(expr);
    visitor.indices.first().copied()
}

/// Keys outermost first; the innermost literal is the default name.
fn collect_lookups(
    expr: &Expr,
    keys: &mut Vec<String>,
    default: &mut Option<String>,
) -> std::result::Result<(), String> {
    match expr {
        Expr::Reference(expr) => collect_lookups(&expr.expr, keys, default),
        Expr::Paren(expr) => collect_lookups(&expr.expr, keys, default),
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(value) => {
                let value = value.value();
                *default = (!value.is_empty()).then_some(value);
                Ok(())
            }
            _ => Err("default name is not a string literal".into()),
        },
        Expr::Call(call) => {
            let args: Vec<&Expr> = call.args.iter().collect();
            let function = last_segment(&call.func).unwrap_or_default();
            let (key, fallback) = match (function.as_str(), args.as_slice()) {
                ("protocol_or", [_, fallback]) => (PROTOCOL_KEY.to_string(), *fallback),
                ("parameter_or", [_, key, fallback]) => (string_literal(key)?, *fallback),
                ("method_parameter_or", [_, _, key, fallback]) => (string_literal(key)?, *fallback),
                _ => return Err(format!("unexpected call `{function}` in extension name")),
            };
            keys.push(key);
            collect_lookups(fallback, keys, default)
        }
        _ => Err("unexpected expression in extension name".into()),
    }
}

fn string_literal(expr: &Expr) -> std::result::Result<String, String> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(value) => Ok(value.value()),
            _ => Err("key is not a string literal".into()),
        },
        _ => Err("key is not a literal".into()),
    }
}

fn last_segment(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn expr_path_ends_with(expr: &Expr, name: &str) -> bool {
    last_segment(expr).as_deref() == Some(name)
}

fn render_use(tree: &UseTree) -> String {
    match tree {
        UseTree::Path(path) => format!("{}::{}", path.ident, render_use(&path.tree)),
        UseTree::Name(name) => name.ident.to_string(),
        UseTree::Rename(rename) => format!("{} as {}", rename.ident, rename.rename),
        UseTree::Glob(_) => "*".to_string(),
        UseTree::Group(group) => {
            let items: Vec<String> = group.items.iter().map(render_use).collect();
            format!("{{{}}}", items.join(", "))
        }
    }
}

fn render_path(path: &Path) -> String {
    let mut out = String::new();
    if path.leading_colon.is_some() {
        out.push_str("::");
    }
    for (i, segment) in path.segments.iter().enumerate() {
        if i > 0 {
            out.push_str("::");
        }
        out.push_str(&segment.ident.to_string());
        match &segment.arguments {
            PathArguments::None => {}
            PathArguments::AngleBracketed(args) => {
                let rendered: Vec<String> = args
                    .args
                    .iter()
                    .map(|arg| match arg {
                        GenericArgument::Type(ty) => render_type(ty),
                        GenericArgument::Lifetime(lifetime) => format!("'{}", lifetime.ident),
                        _ => "_".to_string(),
                    })
                    .collect();
                out.push('<');
                out.push_str(&rendered.join(", "));
                out.push('>');
            }
            PathArguments::Parenthesized(args) => {
                let inputs: Vec<String> = args.inputs.iter().map(render_type).collect();
                out.push('(');
                out.push_str(&inputs.join(", "));
                out.push(')');
            }
        }
    }
    out
}

fn render_type(ty: &Type) -> String {
    match ty {
        Type::Path(path) => render_path(&path.path),
        Type::Reference(reference) => {
            let mut out = String::from("&");
            if let Some(lifetime) = &reference.lifetime {
                out.push_str(&format!("'{} ", lifetime.ident));
            }
            if reference.mutability.is_some() {
                out.push_str("mut ");
            }
            out.push_str(&render_type(&reference.elem));
            out
        }
        Type::Tuple(tuple) => {
            let elems: Vec<String> = tuple.elems.iter().map(render_type).collect();
            format!("({})", elems.join(", "))
        }
        Type::Slice(slice) => format!("[{}]", render_type(&slice.elem)),
        Type::Paren(paren) => render_type(&paren.elem),
        Type::TraitObject(object) => {
            let bounds: Vec<String> = object
                .bounds
                .iter()
                .filter_map(|bound| match bound {
                    syn::TypeParamBound::Trait(bound) => Some(render_path(&bound.path)),
                    _ => None,
                })
                .collect();
            format!("dyn {}", bounds.join(" + "))
        }
        _ => "_".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdaptiveClassCodeGenerator;
    use crate::compiler::PatternCompiler;
    use crate::fixtures;
    use crate::metadata::{MethodSpec, ParamSpec, PointDescriptor};

    fn generate(point: &PointDescriptor) -> String {
        AdaptiveClassCodeGenerator::new(point).generate().unwrap()
    }

    #[test]
    fn test_agrees_with_pattern_compiler() {
        let points = [
            fixtures::echo_point(),
            fixtures::greeter_point(),
            PointDescriptor::new("com.example.LoadBalance")
                .with_default("random")
                .method(
                    MethodSpec::adaptive("select", "Result<String>", ["lb", "protocol"])
                        .param(ParamSpec::value("invoker", "Option<&Invoker>").getter("url"))
                        .param(ParamSpec::invocation("call", "Option<&Call>")),
                ),
        ];

        for point in &points {
            let source = generate(point);
            let parsed = SynCompiler::new()
                .compile(&source, &Arc::new(ClassLoader::new("syn")))
                .unwrap();
            let scanned = PatternCompiler::new()
                .compile(&source, &Arc::new(ClassLoader::new("pattern")))
                .unwrap();

            assert_eq!(parsed.name, scanned.name);
            assert_eq!(parsed.point, scanned.point);
            assert_eq!(parsed.imports, scanned.imports);
            assert_eq!(parsed.interfaces, scanned.interfaces);
            assert_eq!(parsed.fields, scanned.fields);
            assert_eq!(parsed.methods, scanned.methods);
            assert_eq!(parsed.compiler, "syn");
        }
    }

    #[test]
    fn test_keeps_file_objects() {
        let compiler = SynCompiler::new();
        let source = generate(&fixtures::echo_point());
        compiler
            .compile(&source, &Arc::new(ClassLoader::new("syn")))
            .unwrap();

        assert_eq!(compiler.class_files(), vec!["com_example::EchoAdaptive"]);
        let file = compiler.source_file("com_example::EchoAdaptive").unwrap();
        assert_eq!(file.text, source);

        let output = compiler.class_file("com_example::EchoAdaptive").unwrap();
        assert_eq!(output.class, "com_example::EchoAdaptive");
        assert_eq!(output.loader.name(), "syn:com_example::EchoAdaptive");
        assert_eq!(output.loader.class_names(), vec!["com_example::EchoAdaptive"]);
        assert!(Arc::ptr_eq(
            &output.compiled,
            &compiler.load_class("com_example::EchoAdaptive").unwrap()
        ));
        assert!(matches!(
            compiler.load_class("com_example::GreeterAdaptive"),
            Err(Error::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_child_loader_shadows_the_caller_loader() {
        let compiler = SynCompiler::new();
        let source = generate(&fixtures::echo_point());
        let parent = Arc::new(ClassLoader::new("registry"));
        compiler.compile(&source, &parent).unwrap();

        let output = compiler.class_file("com_example::EchoAdaptive").unwrap();
        assert!(Arc::ptr_eq(output.loader.parent().unwrap(), &parent));

        let mut other = CompiledClass::clone(&output.compiled);
        other.compiler = "other".to_string();
        parent.define(Arc::new(other));

        assert_eq!(parent.load_class("com_example::EchoAdaptive").unwrap().compiler, "other");
        assert_eq!(compiler.load_class("com_example::EchoAdaptive").unwrap().compiler, "syn");
    }

    #[test]
    fn test_unchanged_source_is_served_by_child_loader() {
        let compiler = SynCompiler::new();
        let source = generate(&fixtures::echo_point());
        compiler.compile(&source, &Arc::new(ClassLoader::new("first"))).unwrap();
        let first = compiler.class_file("com_example::EchoAdaptive").unwrap();

        let second_parent = Arc::new(ClassLoader::new("second"));
        let class = compiler.compile(&source, &second_parent).unwrap();
        let second = compiler.class_file("com_example::EchoAdaptive").unwrap();

        // Still the first child loader; no new parse
        assert!(Arc::ptr_eq(&first.loader, &second.loader));
        assert_eq!(class.methods, first.compiled.methods);
        assert!(second_parent.find_class("com_example::EchoAdaptive").is_some());
    }

    #[test]
    fn test_syntax_error_is_wrapped() {
        let source = "pub mod demo {\n    pub struct Broken {\n        loader: ,\n    }\n}\n";
        let err = SynCompiler::new()
            .compile(source, &Arc::new(ClassLoader::new("syn")))
            .unwrap_err();

        assert!(matches!(err, Error::Compilation { .. }));
        assert_eq!(err.source_text(), Some(source));
    }

    #[test]
    fn test_render_type() {
        let ty: Type = syn::parse_str("&'a mut std::collections::HashMap<String, Vec<u8>>").unwrap();
        assert_eq!(
            render_type(&ty),
            "&'a mut std::collections::HashMap<String, Vec<u8>>"
        );

        let ty: Type = syn::parse_str("(u8, [String], Box<dyn Fn(u8)>)").unwrap();
        assert_eq!(render_type(&ty), "(u8, [String], Box<dyn Fn(u8)>)");
    }
}
