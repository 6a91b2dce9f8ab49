//! Rust writer.
//!
//! The output uses value semantics: non-`Copy` values are cloned where they
//! are used by value, classes become structs with an inherent `impl`, and an
//! in-module base class is held in a `base` field that member access walks.
//! Throws become panics; a `try` runs its body under `catch_unwind`.

use super::{
    Grammar, binary_operands, bind_stmt, binding_type, classes_in_base_order, continues_loop,
    escape_string, float_literal, is_super_call, map_key, marker_lines, render_op, snake_case,
    unary_strength, unrenderable, wrap,
};
use crate::config::TranslateConfig;
use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::{AnnotatedModule, TypeEnv};
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Writer;
use std::collections::BTreeSet;

/// Static instance of the Rust writer for registry.
pub static RUST_WRITER: RustWriterImpl = RustWriterImpl;

/// Rust writer implementing the Writer trait.
pub struct RustWriterImpl;

impl Writer for RustWriterImpl {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError> {
        RustWriter::emit(module, config)
    }
}

type Emit<T = ()> = Result<T, GenerationError>;

const GRAMMAR: Grammar = Grammar::Rust;

const KEYWORDS: &[&str] = &[
    "as", "box", "const", "crate", "dyn", "enum", "extern", "fn", "impl", "in", "loop", "match",
    "mod", "move", "mut", "pub", "ref", "static", "struct", "trait", "type", "unsafe", "use",
    "where", "yield",
];

/// Emits IR as Rust source code.
pub struct RustWriter<'m> {
    output: String,
    indent: usize,
    imports: ImportSet,
    env: TypeEnv<'m>,
    module: &'m Module,
    dynamic: String,
    /// Names rebound after their declaration in the current function.
    mutable: BTreeSet<String>,
    /// Methods of any class that take `&mut self`.
    mutating_calls: BTreeSet<&'m str>,
    /// Name of the receiver: `self` in methods, `this` while a constructor
    /// builds its value.
    receiver: Option<&'static str>,
    class: Option<&'m Class>,
    in_async: bool,
    at: Span,
}

impl<'m> RustWriter<'m> {
    /// Emit a module to Rust source.
    pub fn emit(annotated: &'m AnnotatedModule, config: &TranslateConfig) -> Emit<String> {
        let mut writer = Self {
            output: String::new(),
            indent: 0,
            imports: ImportSet::new(),
            env: TypeEnv::with_signatures(&annotated.signatures),
            module: &annotated.module,
            dynamic: config.rust.dynamic_type.clone(),
            mutable: BTreeSet::new(),
            mutating_calls: annotated.module.classes.iter().flat_map(mutating_methods).collect(),
            receiver: None,
            class: None,
            in_async: false,
            at: Span::default(),
        };
        let sections = writer.write_module()?;
        Ok(writer.finish(sections))
    }

    fn write_module(&mut self) -> Emit<Vec<String>> {
        let module = self.module;
        let mut sections = Vec::new();
        if !module.variables.is_empty() {
            for var in &module.variables {
                self.write_variable(var)?;
            }
            sections.push(self.take());
        }
        for def in &module.type_defs {
            self.write_type_def(def);
            sections.push(self.take());
        }
        for e in &module.enums {
            self.write_enum(e);
            sections.push(self.take());
        }
        for class in classes_in_base_order(module) {
            self.write_class(class)?;
            sections.push(self.take());
        }
        for func in &module.functions {
            self.write_fn(func, None)?;
            sections.push(self.take());
        }
        if !module.statements.is_empty() {
            self.at = Span::default();
            self.mutable = self.mutable_names(&module.statements);
            self.line("fn main() {");
            self.write_block(&module.statements)?;
            self.line("}");
            sections.push(self.take());
        }
        Ok(sections)
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn finish(self, sections: Vec<String>) -> String {
        let mut out = String::new();
        for (module, names) in self.imports.iter() {
            match names.as_slice() {
                [] => out.push_str(&format!("use {module};\n")),
                [one] => out.push_str(&format!("use {module}::{one};\n")),
                many => out.push_str(&format!("use {module}::{{{}}};\n", many.join(", "))),
            }
        }
        let body = sections.join("\n");
        if !out.is_empty() && !body.is_empty() {
            out.push('\n');
        }
        out.push_str(&body);
        out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn pad(&self) -> String {
        "    ".repeat(self.indent)
    }

    fn error(&self, node: &str, message: impl Into<String>) -> GenerationError {
        unrenderable(node, self.at, message)
    }

    fn is_enum(&self, name: &str) -> bool {
        self.module.enums.iter().any(|e| e.name == name)
    }

    /// The module variable `name` refers to, unless a local shadows it.
    fn module_variable(&self, name: &str) -> Option<&'m Variable> {
        if self.env.is_local(name) {
            return None;
        }
        self.module.variables.iter().find(|v| v.name == name)
    }

    /// Names rebound, mutated in place, or used as the receiver of a
    /// `&mut self` method in `body`.
    fn mutable_names(&self, body: &[Stmt]) -> BTreeSet<String> {
        let mut out = visit::reassigned_names(body);
        visit::walk_all_exprs(body, &mut |e| {
            if let Expr::Call { callee, .. } = e
                && let Expr::Member { object, property } = callee.as_ref()
                && let Expr::Ident(name) = object.as_ref()
                && self.mutating_calls.contains(property.as_str())
            {
                out.insert(name.clone());
            }
        });
        out
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn write_variable(&mut self, var: &Variable) -> Emit {
        self.at = var.span;
        let name = const_name(&var.name);
        let ty = binding_type(&self.env, &var.ty, var.value.as_ref());
        match &var.value {
            Some(Expr::Literal(Literal::String(s))) => {
                self.line(&format!("const {name}: &str = \"{}\";", escape(s)));
            }
            Some(Expr::Literal(lit)) if !matches!(lit, Literal::Null) => {
                let rust_ty = self.type_name(&ty);
                self.line(&format!("const {name}: {rust_ty} = {};", self.literal(lit, &ty)));
            }
            value => {
                self.imports.add("std::sync:LazyLock");
                let rust_ty = self.type_name(&ty);
                let value = match value {
                    Some(v) => self.value_as(v, Some(&ty))?,
                    None => "Default::default()".to_string(),
                };
                self.line(&format!(
                    "static {name}: LazyLock<{rust_ty}> = LazyLock::new(|| {value});"
                ));
            }
        }
        Ok(())
    }

    fn write_doc(&mut self, doc: &str) {
        for l in doc.lines() {
            if l.is_empty() {
                self.line("///");
            } else {
                self.line(&format!("/// {l}"));
            }
        }
    }

    fn write_type_def(&mut self, def: &TypeDef) {
        if let Some(doc) = &def.doc {
            self.write_doc(doc);
        }
        match &def.kind {
            TypeDefKind::Alias(ty) => {
                let ty = self.type_name(ty);
                self.line(&format!("pub type {} = {ty};", def.name));
            }
            TypeDefKind::Record(fields)
                if !fields.is_empty()
                    && fields
                        .iter()
                        .all(|f| matches!(f.ty.kind, TypeKind::Function { .. })) =>
            {
                self.line(&format!("pub trait {} {{", def.name));
                self.indent += 1;
                for f in fields {
                    if let TypeKind::Function { params, ret } = &f.ty.kind {
                        let mut sig = vec!["&self".to_string()];
                        sig.extend(
                            params
                                .iter()
                                .enumerate()
                                .map(|(i, p)| format!("a{i}: {}", self.type_name(p))),
                        );
                        let ret = self.ret_suffix(ret);
                        self.line(&format!("fn {}({}){ret};", ident(&f.name), sig.join(", ")));
                    }
                }
                self.indent -= 1;
                self.line("}");
            }
            TypeDefKind::Record(fields) => {
                self.line("#[derive(Debug, Clone, Default)]");
                self.line(&format!("pub struct {} {{", def.name));
                self.indent += 1;
                for f in fields {
                    let ty = self.type_name(&f.ty);
                    self.line(&format!("pub {}: {ty},", ident(&f.name)));
                }
                self.indent -= 1;
                self.line("}");
            }
        }
    }

    fn write_enum(&mut self, e: &Enum) {
        let strings: Vec<(&str, &str)> = e
            .variants
            .iter()
            .filter_map(|v| match &v.value {
                Some(Literal::String(s)) => Some((v.name.as_str(), s.as_str())),
                _ => None,
            })
            .collect();
        self.line("#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]");
        self.line(&format!("pub enum {} {{", e.name));
        self.indent += 1;
        for (i, v) in e.variants.iter().enumerate() {
            if i == 0 {
                self.line("#[default]");
            }
            match &v.value {
                Some(Literal::Int(n)) => self.line(&format!("{} = {n},", v.name)),
                _ => self.line(&format!("{},", v.name)),
            }
        }
        self.indent -= 1;
        self.line("}");
        if !strings.is_empty() {
            self.output.push('\n');
            self.line(&format!("impl {} {{", e.name));
            self.indent += 1;
            self.line("pub fn value(self) -> &'static str {");
            self.indent += 1;
            self.line("match self {");
            self.indent += 1;
            for (name, value) in &strings {
                self.line(&format!("Self::{name} => \"{}\",", escape(value)));
            }
            if strings.len() < e.variants.len() {
                self.line("_ => \"\",");
            }
            self.indent -= 1;
            self.line("}");
            self.indent -= 1;
            self.line("}");
            self.indent -= 1;
            self.line("}");
        }
    }

    /// In-module base, held in the `base` field.
    fn base_of(&self, class: &Class) -> Option<&'m Class> {
        class.base.as_deref().and_then(|b| self.module.class(b))
    }

    fn write_class(&mut self, class: &'m Class) -> Emit {
        self.at = class.span;
        if let Some(doc) = &class.doc {
            self.write_doc(doc);
        }
        self.line("#[derive(Debug, Clone, Default)]");
        self.line(&format!("pub struct {} {{", class.name));
        self.indent += 1;
        if let Some(base) = self.base_of(class) {
            self.line(&format!("pub base: {},", base.name));
        }
        for prop in class.properties.iter().filter(|p| !p.is_static) {
            let ty = self.type_name(&prop.ty);
            self.line(&format!("pub {}: {ty},", ident(&prop.name)));
        }
        self.indent -= 1;
        self.line("}");

        self.output.push('\n');
        self.line(&format!("impl {} {{", class.name));
        self.indent += 1;
        self.class = Some(class);
        self.env.set_class(Some(&class.name));
        let result = self.write_impl_body(class);
        self.env.set_class(None);
        self.class = None;
        result?;
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn write_impl_body(&mut self, class: &'m Class) -> Emit {
        let mut first = true;
        for prop in class.properties.iter().filter(|p| p.is_static) {
            first = false;
            let ty = self.type_name(&prop.ty);
            let value = match &prop.default {
                Some(d) => self.value_as(d, Some(&prop.ty))?,
                None => "Default::default()".to_string(),
            };
            self.line(&format!("pub const {}: {ty} = {value};", const_name(&prop.name)));
        }
        if !first {
            self.output.push('\n');
        }
        self.write_constructor(class)?;
        let mutating = mutating_methods(class);
        for method in &class.methods {
            self.output.push('\n');
            let recv = if method.is_static {
                None
            } else if mutating.contains(method.name.as_str()) {
                Some("&mut self")
            } else {
                Some("&self")
            };
            self.write_fn(method, recv)?;
        }
        Ok(())
    }

    fn write_constructor(&mut self, class: &'m Class) -> Emit {
        let ctor = class.constructor();
        let (params, body): (&[Param], &[Stmt]) = match ctor {
            Some(c) => (&c.params, &c.body),
            None => (&[], &[]),
        };
        if let Some(c) = ctor {
            self.at = c.span;
        }
        self.mutable = self.mutable_names(body);
        let rendered = self.params(params);
        self.line(&format!("pub fn new({rendered}) -> Self {{"));
        self.env.push_scope();
        self.env.bind_params(params);
        self.indent += 1;
        let result = self.constructor_body(class, body);
        self.indent -= 1;
        self.env.pop_scope();
        self.receiver = None;
        result?;
        self.line("}");
        Ok(())
    }

    fn constructor_body(&mut self, class: &'m Class, body: &[Stmt]) -> Emit {
        let mut fields: Vec<(String, String)> = Vec::new();
        for p in class.properties.iter().filter(|p| !p.is_static) {
            if let Some(d) = &p.default {
                fields.push((p.name.clone(), self.value_as(d, Some(&p.ty))?));
            }
        }
        if let Some((prefix, assigned)) = literal_constructor(body) {
            self.write_stmts(prefix)?;
            for (name, value) in assigned {
                let ty = class.property(&name).map(|p| p.ty.clone());
                let value = self.value_as(value, ty.as_ref())?;
                match fields.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = value,
                    None => fields.push((name, value)),
                }
            }
            let literal = self.struct_literal(class, &fields);
            self.line(&literal);
            return Ok(());
        }
        let literal = self.struct_literal(class, &fields);
        self.line(&format!("let mut this = {literal};"));
        self.receiver = Some("this");
        self.write_stmts(body)?;
        if !matches!(body.last(), Some(Stmt::Return(_))) {
            self.line("this");
        }
        Ok(())
    }

    fn struct_literal(&self, class: &Class, fields: &[(String, String)]) -> String {
        let complete = fields.len() == class.properties.iter().filter(|p| !p.is_static).count()
            && self.base_of(class).is_none();
        let mut parts: Vec<String> = fields
            .iter()
            .map(|(n, v)| {
                if ident(n) == *v {
                    v.clone()
                } else {
                    format!("{}: {v}", ident(n))
                }
            })
            .collect();
        if !complete {
            parts.push("..Default::default()".to_string());
        }
        format!("Self {{ {} }}", parts.join(", "))
    }

    fn write_fn(&mut self, func: &Function, receiver: Option<&'static str>) -> Emit {
        self.at = func.span;
        if let Some(doc) = &func.doc {
            self.write_doc(doc);
        }
        self.mutable = self.mutable_names(&func.body);
        let mut params = Vec::new();
        if let Some(r) = receiver {
            params.push(r.to_string());
        }
        let rendered = self.params(&func.params);
        if !rendered.is_empty() {
            params.push(rendered);
        }
        let ret = self.ret_suffix(&func.ret);
        let vis = if self.class.is_some() || !func.name.starts_with('_') {
            "pub "
        } else {
            ""
        };
        let asyncness = if func.is_async { "async " } else { "" };
        self.line(&format!(
            "{vis}{asyncness}fn {}({}){ret} {{",
            ident(&func.name),
            params.join(", ")
        ));
        self.receiver = receiver.map(|_| "self");
        self.in_async = func.is_async;
        self.env.push_scope();
        self.env.bind_params(&func.params);
        self.indent += 1;
        let result = self.write_stmts(&func.body);
        self.indent -= 1;
        self.env.pop_scope();
        self.receiver = None;
        self.in_async = false;
        result?;
        self.line("}");
        Ok(())
    }

    /// Parameters; those rebound in the body are `mut`.
    fn params(&mut self, params: &[Param]) -> String {
        params
            .iter()
            .map(|p| {
                let ty = if p.variadic {
                    format!("Vec<{}>", self.type_name(&p.ty))
                } else {
                    self.type_name(&p.ty)
                };
                let mutable = if self.mutable.contains(&p.name) { "mut " } else { "" };
                format!("{mutable}{}: {ty}", ident(&p.name))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn ret_suffix(&mut self, ty: &Type) -> String {
        if ty.is_void() {
            String::new()
        } else {
            format!(" -> {}", self.type_name(ty))
        }
    }

    fn type_name(&mut self, ty: &Type) -> String {
        let inner = match &ty.kind {
            TypeKind::Any | TypeKind::Union(_) | TypeKind::Void => self.dynamic.clone(),
            TypeKind::Primitive(Primitive::Null) => return format!("Option<{}>", self.dynamic),
            TypeKind::Primitive(Primitive::Int) => "i64".to_string(),
            TypeKind::Primitive(Primitive::Float) => "f64".to_string(),
            TypeKind::Primitive(Primitive::String) => "String".to_string(),
            TypeKind::Primitive(Primitive::Bool) => "bool".to_string(),
            TypeKind::Named(n) if idioms::is_canonical_exception(n) => "String".to_string(),
            TypeKind::Named(n) => n.clone(),
            TypeKind::Sequence(t) => format!("Vec<{}>", self.type_name(t)),
            TypeKind::Map(k, v) => {
                self.imports.add("std::collections:HashMap");
                let key = self.type_name(&map_key(k));
                format!("HashMap<{key}, {}>", self.type_name(v))
            }
            TypeKind::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                let ret = self.ret_suffix(ret);
                format!("Box<dyn Fn({}){ret}>", params.join(", "))
            }
        };
        if ty.optional {
            format!("Option<{inner}>")
        } else {
            inner
        }
    }

    fn is_copy(&self, ty: &Type) -> bool {
        match &ty.kind {
            TypeKind::Primitive(p) => *p != Primitive::String,
            TypeKind::Named(n) => self.is_enum(n),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn write_stmts(&mut self, stmts: &[Stmt]) -> Emit {
        for stmt in stmts {
            self.write_stmt(stmt)?;
        }
        Ok(())
    }

    fn write_block(&mut self, body: &[Stmt]) -> Emit {
        self.env.push_scope();
        self.indent += 1;
        let result = self.write_stmts(body);
        self.indent -= 1;
        self.env.pop_scope();
        result
    }

    fn let_keyword(&self, name: &str) -> &'static str {
        if self.mutable.contains(name) {
            "let mut"
        } else {
            "let"
        }
    }

    fn write_stmt(&mut self, stmt: &Stmt) -> Emit {
        match stmt {
            Stmt::Assign {
                target,
                value,
                ty,
                declare,
            } => {
                let s = self.assignment(target, value, ty, *declare)?;
                self.line(&s);
            }
            Stmt::Declare { name, ty } => {
                let rust_ty = self.type_name(ty);
                let kw = self.let_keyword(name);
                self.line(&format!("{kw} {}: {rust_ty} = Default::default();", ident(name)));
            }
            Stmt::Return(None) if self.receiver == Some("this") => self.line("return this;"),
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(e)) => {
                let e = self.value(e)?;
                self.line(&format!("return {e};"));
            }
            Stmt::If {
                test,
                then_body,
                elifs,
                else_body,
            } => {
                let test = self.expr(test)?;
                self.line(&format!("if {test} {{"));
                self.write_block(then_body)?;
                for elif in elifs {
                    let test = self.expr(&elif.test)?;
                    self.line(&format!("}} else if {test} {{"));
                    self.write_block(&elif.body)?;
                }
                if let Some(else_body) = else_body {
                    self.line("} else {");
                    self.write_block(else_body)?;
                }
                self.line("}");
            }
            Stmt::ForEach {
                mode,
                key,
                value,
                iterable,
                body,
            } => {
                let source = self.atom(iterable)?;
                let source_ty = self.env.type_of(iterable);
                let value = ident(value);
                let key = key.as_deref().map_or_else(|| "_".to_string(), ident);
                let header = match mode {
                    IterMode::Items if source_ty.is_map() => {
                        format!("for {value} in {source}.keys().cloned() {{")
                    }
                    IterMode::Items if source_ty.is_string() => {
                        format!("for {value} in {source}.chars().map(String::from) {{")
                    }
                    IterMode::Items => format!("for {value} in {source}.clone() {{"),
                    IterMode::Indexed => {
                        format!("for ({key}, {value}) in (0i64..).zip({source}.clone()) {{")
                    }
                    IterMode::Entries => format!("for ({key}, {value}) in {source}.clone() {{"),
                };
                self.line(&header);
                self.env.push_scope();
                self.env.bind_loop(stmt);
                self.write_block(body)?;
                self.env.pop_scope();
                self.line("}");
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.atom(start)?;
                let end_s = self.atom(end)?;
                let range = match step {
                    None => format!("{start}..{end_s}"),
                    Some(Expr::Literal(Literal::Int(-1))) => format!("({end_s} + 1..={start}).rev()"),
                    Some(Expr::Literal(Literal::Int(n))) if *n < 0 => {
                        format!("({end_s} + 1..={start}).rev().step_by({})", -n)
                    }
                    Some(step) => {
                        let step = self.atom(step)?;
                        format!("({start}..{end_s}).step_by({step} as usize)")
                    }
                };
                self.line(&format!("for {} in {range} {{", ident(var)));
                self.env.push_scope();
                self.env.bind_loop(stmt);
                self.write_block(body)?;
                self.env.pop_scope();
                self.line("}");
            }
            Stmt::ForClassic {
                init,
                test,
                update,
                body,
            } => {
                if update.is_some() && continues_loop(body) {
                    return Err(self.error(
                        stmt.kind_name(),
                        "continue would skip the loop update in a while loop",
                    ));
                }
                self.line("{");
                self.indent += 1;
                self.env.push_scope();
                if let Some(init) = init {
                    self.write_stmt(init)?;
                }
                let test = match test {
                    Some(t) => format!("while {} {{", self.expr(t)?),
                    None => "loop {".to_string(),
                };
                self.line(&test);
                self.env.push_scope();
                self.indent += 1;
                self.write_stmts(body)?;
                if let Some(update) = update {
                    self.write_stmt(update)?;
                }
                self.indent -= 1;
                self.env.pop_scope();
                self.line("}");
                self.env.pop_scope();
                self.indent -= 1;
                self.line("}");
            }
            Stmt::While { test, body } => {
                match test {
                    Expr::Literal(Literal::Bool(true)) => self.line("loop {"),
                    _ => {
                        let test = self.expr(test)?;
                        self.line(&format!("while {test} {{"));
                    }
                }
                self.write_block(body)?;
                self.line("}");
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => self.write_try(stmt, body, handlers, finally.as_deref())?,
            Stmt::Throw(e) => {
                let panic = self.panic(e)?;
                self.line(&format!("{panic};"));
            }
            Stmt::Expr(e) if is_super_call(stmt) => {
                let Expr::Call { args, .. } = e else {
                    return Ok(());
                };
                let base = self.class.and_then(|c| self.base_of(c));
                match (base, self.receiver) {
                    (Some(base), Some(recv)) => {
                        let args = self.values(args)?;
                        self.line(&format!("{recv}.base = {}::new({args});", base.name));
                    }
                    _ => {
                        let args = self.exprs(args)?;
                        self.line(&format!("// base constructor call dropped: super({args})"));
                    }
                }
            }
            Stmt::Expr(e) => {
                let e = self.expr(e)?;
                self.line(&format!("{e};"));
            }
            Stmt::Break => self.line("break;"),
            Stmt::Continue => self.line("continue;"),
            Stmt::Pass => {}
            Stmt::Unsupported(marker) => {
                for l in marker_lines(marker) {
                    self.line(&format!("// {l}"));
                }
            }
        }
        bind_stmt(&mut self.env, stmt);
        Ok(())
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, ty: &Type, declare: bool) -> Emit<String> {
        if declare && let Expr::Ident(name) = target {
            let kw = self.let_keyword(name);
            let annotated = ty.is_resolved() && self.env.type_of(value) != *ty;
            let shown = binding_type(&self.env, ty, Some(value));
            let value = self.value_as(value, Some(ty))?;
            if annotated || value.starts_with("vec![]") || value.starts_with("HashMap::new()") {
                let rust_ty = self.type_name(&shown);
                return Ok(format!("{kw} {}: {rust_ty} = {value};", ident(name)));
            }
            return Ok(format!("{kw} {} = {value};", ident(name)));
        }
        // Map element assignment inserts.
        if let Expr::Index { object, index } = target
            && self.env.type_of(object).is_map()
        {
            let map = self.atom(object)?;
            let key = self.value(index)?;
            let value = self.value(value)?;
            return Ok(format!("{map}.insert({key}, {value});"));
        }
        let target_s = self.expr(target)?;
        if let Expr::Binary { left, op, right } = value
            && **left == *target
            && matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
            && self.env.type_of(left).is_numeric()
            && self.env.type_of(left) == self.env.type_of(right)
        {
            let right = self.expr(right)?;
            return Ok(format!("{target_s} {}= {right};", op.c_symbol()));
        }
        let expected = self.env.type_of(target);
        let value = self.value_as(value, Some(&expected))?;
        Ok(format!("{target_s} = {value};"))
    }

    fn write_try(
        &mut self,
        stmt: &Stmt,
        body: &[Stmt],
        handlers: &[Catch],
        finally: Option<&[Stmt]>,
    ) -> Emit {
        let escapes = |stmts: &[Stmt]| {
            visit::any_stmt(stmts, |s| {
                matches!(s, Stmt::Return(_) | Stmt::Break | Stmt::Continue)
            })
        };
        if escapes(body) || handlers.iter().any(|h| escapes(&h.body)) {
            return Err(self.error(
                stmt.kind_name(),
                "control flow leaving a try block cannot cross catch_unwind",
            ));
        }
        self.line("let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {");
        self.write_block(body)?;
        self.line("}));");
        if let Some(handler) = handlers.first() {
            self.line("if let Err(payload) = outcome {");
            self.indent += 1;
            self.env.push_scope();
            if let Some(b) = &handler.binding {
                self.line(&format!(
                    "let {} = payload.downcast_ref::<String>().cloned().unwrap_or_default();",
                    ident(b)
                ));
                self.env.declare(b, Type::string());
            }
            let result = self.write_stmts(&handler.body);
            self.env.pop_scope();
            result?;
            self.indent -= 1;
            self.line("}");
        } else {
            self.line("let _ = outcome;");
        }
        if let Some(f) = finally {
            self.env.push_scope();
            let result = self.write_stmts(f);
            self.env.pop_scope();
            result?;
        }
        Ok(())
    }

    /// `panic!` carrying the thrown message.
    fn panic(&mut self, e: &Expr) -> Emit<String> {
        match e {
            Expr::Construct { class, args } if !self.module.is_class(class) => match args.as_slice() {
                [] => Ok(format!("panic!(\"{class}\")")),
                [Expr::Format(parts)] => {
                    let (format, values) = self.format_args(parts)?;
                    Ok(format!("panic!({format}{values})"))
                }
                [message] => Ok(format!("panic!(\"{{}}\", {})", self.expr(message)?)),
                _ => Ok(format!("panic!(\"{{:?}}\", ({}))", self.exprs(args)?)),
            },
            other => Ok(format!("panic!(\"{{:?}}\", {})", self.expr(other)?)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn exprs(&mut self, exprs: &[Expr]) -> Emit<String> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            out.push(self.expr(e)?);
        }
        Ok(out.join(", "))
    }

    fn values(&mut self, exprs: &[Expr]) -> Emit<String> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            out.push(self.value(e)?);
        }
        Ok(out.join(", "))
    }

    /// Arguments typed by the callee's parameters, with omitted trailing
    /// arguments filled from defaults and variadic tails collected.
    fn call_args(&mut self, callee: Option<&Function>, args: &[Expr]) -> Emit<String> {
        let Some(func) = callee else {
            return self.values(args);
        };
        let mut out = Vec::with_capacity(func.params.len());
        for (i, p) in func.params.iter().enumerate() {
            if p.variadic {
                let mut rest = Vec::new();
                for a in args.iter().skip(i) {
                    rest.push(self.value_as(a, Some(&p.ty))?);
                }
                out.push(format!("vec![{}]", rest.join(", ")));
                break;
            }
            match (args.get(i), &p.default) {
                (Some(a), _) => out.push(self.value_as(a, Some(&p.ty))?),
                (None, Some(d)) => out.push(self.value_as(d, Some(&p.ty))?),
                (None, None) => {}
            }
        }
        Ok(out.join(", "))
    }

    fn atom(&mut self, e: &Expr) -> Emit<String> {
        let s = self.expr(e)?;
        Ok(wrap(e, s, u8::MAX, GRAMMAR))
    }

    /// `e` in a position that takes ownership.
    fn value(&mut self, e: &Expr) -> Emit<String> {
        self.value_as(e, None)
    }

    fn value_as(&mut self, e: &Expr, expected: Option<&Type>) -> Emit<String> {
        if let Expr::Ident(name) = e
            && let Some(var) = self.module_variable(name)
            && is_lazy(var)
        {
            let name = const_name(&var.name);
            return Ok(if self.is_copy(&self.env.type_of(e)) {
                format!("*{name}")
            } else {
                format!("{name}.clone()")
            });
        }
        let place = matches!(e, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. });
        let rendered = self.expr_as(e, expected)?;
        if let Expr::Literal(Literal::String(_)) = e {
            return Ok(format!("{rendered}.to_string()"));
        }
        if place && !self.is_copy(&self.env.type_of(e)) && !self.is_module_function(e) {
            return Ok(format!("{rendered}.clone()"));
        }
        Ok(rendered)
    }

    fn is_module_function(&self, e: &Expr) -> bool {
        matches!(e, Expr::Ident(n) if !self.env.is_bound(n) && self.module.function(n).is_some())
    }

    fn expr(&mut self, e: &Expr) -> Emit<String> {
        self.expr_as(e, None)
    }

    fn literal(&self, lit: &Literal, expected: &Type) -> String {
        match lit {
            Literal::Null => "None".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(n) if expected.is_float() => format!("{n}.0"),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) if f.is_nan() => "f64::NAN".to_string(),
            Literal::Float(f) if f.is_infinite() && *f > 0.0 => "f64::INFINITY".to_string(),
            Literal::Float(f) if f.is_infinite() => "f64::NEG_INFINITY".to_string(),
            Literal::Float(f) => float_literal(*f),
            Literal::String(s) => format!("\"{}\"", escape(s)),
        }
    }

    fn expr_as(&mut self, e: &Expr, expected: Option<&Type>) -> Emit<String> {
        Ok(match e {
            Expr::Literal(lit) => {
                let any = Type::any();
                self.literal(lit, expected.unwrap_or(&any))
            }
            Expr::Ident(name) => match self.module_variable(name) {
                Some(var) => {
                    let name = const_name(&var.name);
                    match &var.value {
                        Some(Expr::Literal(Literal::String(_))) => format!("{name}.to_string()"),
                        _ if is_lazy(var) => format!("(*{name})"),
                        _ => name,
                    }
                }
                None => ident(name),
            },
            Expr::This => match self.receiver {
                Some(r) => r.to_string(),
                None => return Err(self.error(e.kind_name(), "receiver outside a method")),
            },
            Expr::Binary { left, op, right } => self.binary(left, *op, right)?,
            Expr::Unary { op, operand } => {
                let s = self.expr(operand)?;
                let s = wrap(operand, s, unary_strength(*op, GRAMMAR) + 1, GRAMMAR);
                match op {
                    UnaryOp::Neg => format!("-{s}"),
                    UnaryOp::Not | UnaryOp::BitNot => format!("!{s}"),
                }
            }
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Operation { op, args } => self.operation(*op, args)?,
            Expr::Construct { class, args } if self.module.is_class(class) => {
                let module = self.module;
                let ctor = module.class(class).and_then(Class::constructor);
                let args = self.call_args(ctor, args)?;
                format!("{class}::new({args})")
            }
            // Exceptions as values carry their message.
            Expr::Construct { class, args } if idioms::is_canonical_exception(class) => {
                match args.as_slice() {
                    [] => format!("\"{class}\".to_string()"),
                    [message] => self.value(message)?,
                    _ => format!("format!(\"{{:?}}\", ({}))", self.exprs(args)?),
                }
            }
            Expr::Construct { class, args } => format!("{class}::new({})", self.values(args)?),
            Expr::Member { object, property } => self.member(object, property)?,
            Expr::Index { object, index } => {
                let obj = self.atom(object)?;
                if self.env.type_of(object).is_map() {
                    let key = self.expr(index)?;
                    format!("{obj}[&{key}]")
                } else {
                    match index.as_ref() {
                        Expr::Literal(Literal::Int(n)) if *n < 0 => {
                            format!("{obj}[{obj}.len() - {}]", -n)
                        }
                        Expr::Literal(Literal::Int(n)) => format!("{obj}[{n}]"),
                        _ => format!("{obj}[{} as usize]", self.atom(index)?),
                    }
                }
            }
            Expr::Array(items) => {
                let elem = expected
                    .filter(|t| t.is_sequence())
                    .map(Type::element)
                    .unwrap_or_else(|| self.env.type_of(e).element());
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.value_as(item, Some(&elem))?);
                }
                format!("vec![{}]", out.join(", "))
            }
            Expr::Map(pairs) => {
                self.imports.add("std::collections:HashMap");
                if pairs.is_empty() {
                    "HashMap::new()".to_string()
                } else {
                    let ty = match expected {
                        Some(t) if t.is_map() => t.clone(),
                        _ => self.env.type_of(e),
                    };
                    let (kt, vt) = ty
                        .map_parts()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .unwrap_or_else(|| (Type::any(), Type::any()));
                    let mut out = Vec::with_capacity(pairs.len());
                    for (k, v) in pairs {
                        out.push(format!(
                            "({}, {})",
                            self.value_as(k, Some(&kt))?,
                            self.value_as(v, Some(&vt))?
                        ));
                    }
                    format!("HashMap::from([{}])", out.join(", "))
                }
            }
            Expr::Ternary {
                test,
                then,
                otherwise,
            } => {
                let t = self.expr(test)?;
                let a = self.value_as(then, expected)?;
                let b = self.value_as(otherwise, expected)?;
                format!("if {t} {{ {a} }} else {{ {b} }}")
            }
            Expr::Lambda(lambda) => self.lambda(lambda)?,
            Expr::Comprehension(c) => self.comprehension(c)?,
            Expr::Await(inner) if self.in_async => format!("{}.await", self.atom(inner)?),
            Expr::Await(_) => {
                return Err(self.error(e.kind_name(), "await outside an async function"));
            }
            Expr::Format(parts) => {
                let (format, values) = self.format_args(parts)?;
                format!("format!({format}{values})")
            }
        })
    }

    /// A format string and its `, arg, ...` tail. Values without `Display`
    /// use `{:?}`.
    fn format_args(&mut self, parts: &[FormatPart]) -> Emit<(String, String)> {
        let mut format = String::new();
        let mut values = String::new();
        for part in parts {
            match part {
                FormatPart::Text(t) => {
                    format.push_str(&escape(t).replace('{', "{{").replace('}', "}}"))
                }
                FormatPart::Expr(e) => {
                    format.push_str(self.placeholder(e));
                    values.push_str(", ");
                    values.push_str(&self.expr(e)?);
                }
            }
        }
        Ok((format!("\"{format}\""), values))
    }

    fn placeholder(&self, e: &Expr) -> &'static str {
        let ty = self.env.type_of(e);
        let display = matches!(ty.kind, TypeKind::Primitive(p) if p != Primitive::Null)
            && !ty.optional;
        if display { "{}" } else { "{:?}" }
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Emit<String> {
        let lt = self.env.type_of(left);
        let rt = self.env.type_of(right);
        let both_int = lt.is_int() && rt.is_int();
        if op == BinaryOp::Add && (lt.is_string() || rt.is_string()) {
            let (l_ph, r_ph) = (self.placeholder(left), self.placeholder(right));
            let l = self.expr(left)?;
            let r = self.expr(right)?;
            return Ok(format!("format!(\"{l_ph}{r_ph}\", {l}, {r})"));
        }
        if op == BinaryOp::Mul && lt.is_string() && rt.is_int() {
            let l = self.atom(left)?;
            let r = self.atom(right)?;
            return Ok(format!("{l}.repeat({r} as usize)"));
        }
        let as_float = |e: &Expr, s: String, ty: &Type, other: &Type| match e {
            Expr::Literal(Literal::Int(n)) if other.is_float() => format!("{n}.0"),
            _ if ty.is_int() && other.is_float() => format!("({s} as f64)"),
            _ => s,
        };
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        // Methods on a bare integer literal need its type spelled out.
        let receiver = |e: &Expr, s: String| match e {
            Expr::Literal(Literal::Int(n)) => format!("{n}i64"),
            _ => wrap(e, s, u8::MAX, GRAMMAR),
        };
        match op {
            BinaryOp::Pow if both_int => {
                let l = receiver(left, l);
                let r = wrap(right, r, u8::MAX, GRAMMAR);
                return Ok(format!("{l}.pow({r} as u32)"));
            }
            BinaryOp::Pow => {
                let l = wrap(left, as_float(left, l, &lt, &Type::float()), u8::MAX, GRAMMAR);
                let r = as_float(right, r, &rt, &Type::float());
                return Ok(format!("{l}.powf({r})"));
            }
            BinaryOp::Div if both_int => {
                return Ok(format!("({l} as f64) / ({r} as f64)"));
            }
            BinaryOp::FloorDiv if both_int => {
                let l = receiver(left, l);
                return Ok(format!("{l}.div_euclid({r})"));
            }
            BinaryOp::FloorDiv => {
                let l = as_float(left, l, &lt, &rt);
                let r = as_float(right, r, &rt, &lt);
                let (l, r) = binary_operands(BinaryOp::Div, (left, l), (right, r), GRAMMAR);
                return Ok(format!("({l} / {r}).floor()"));
            }
            _ => {}
        }
        let l = as_float(left, l, &lt, &rt);
        let r = as_float(right, r, &rt, &lt);
        let (l, r) = binary_operands(op, (left, l), (right, r), GRAMMAR);
        Ok(format!("{l} {} {r}", op.c_symbol()))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Emit<String> {
        let module = self.module;
        match callee {
            Expr::Ident(name) if !self.env.is_bound(name) && module.function(name).is_some() => {
                let args = self.call_args(module.function(name), args)?;
                let call = format!("{}({args})", ident(name));
                Ok(call)
            }
            Expr::Member { object, property } if object.as_ident() == Some("super") => {
                let args = self.values(args)?;
                let recv = self.receiver.unwrap_or("self");
                Ok(format!("{recv}.base.{}({args})", ident(property)))
            }
            Expr::Member { object, property }
                if object
                    .as_ident()
                    .is_some_and(|c| module.is_class(c) && !self.env.is_bound(c)) =>
            {
                let class = object.as_ident().unwrap_or_default();
                let method = module.class(class).and_then(|c| c.method(property));
                let args = self.call_args(method, args)?;
                Ok(format!("{class}::{}({args})", ident(property)))
            }
            Expr::Member { object, property } => {
                let owner = match self.env.type_of(object).kind {
                    TypeKind::Named(name) => module.class(&name),
                    _ => None,
                };
                let method = owner.and_then(|c| self.method_path(c, property));
                let path = method.as_ref().map(|(p, _)| p.clone()).unwrap_or_default();
                let obj = self.atom(object)?;
                let args = self.call_args(method.map(|(_, m)| m), args)?;
                Ok(format!("{obj}{path}.{}({args})", ident(property)))
            }
            _ => {
                let f = self.atom(callee)?;
                Ok(format!("{f}({})", self.values(args)?))
            }
        }
    }

    /// `.base` hops to the class that declares `method`.
    fn method_path(&self, class: &'m Class, method: &str) -> Option<(String, &'m Function)> {
        let mut path = String::new();
        let mut current = class;
        for _ in 0..self.module.classes.len() + 1 {
            if let Some(m) = current.method(method) {
                return Some((path, m));
            }
            current = self.base_of(current)?;
            path.push_str(".base");
        }
        None
    }

    fn property_path(&self, class: &'m Class, property: &str) -> String {
        let mut path = String::new();
        let mut current = class;
        for _ in 0..self.module.classes.len() + 1 {
            if current.property(property).is_some() {
                return path;
            }
            match self.base_of(current) {
                Some(base) => current = base,
                None => return String::new(),
            }
            path.push_str(".base");
        }
        String::new()
    }

    fn member(&mut self, object: &Expr, property: &str) -> Emit<String> {
        let module = self.module;
        if let Some(owner) = object.as_ident()
            && !self.env.is_bound(owner)
        {
            if self.is_enum(owner) {
                return Ok(format!("{owner}::{property}"));
            }
            if module
                .class(owner)
                .and_then(|c| c.property(property))
                .is_some_and(|p| p.is_static)
            {
                return Ok(format!("{owner}::{}", const_name(property)));
            }
        }
        let owner = match (object, self.env.type_of(object).kind) {
            (Expr::This, _) => self.class,
            (_, TypeKind::Named(name)) => module.class(&name),
            _ => None,
        };
        let path = owner.map(|c| self.property_path(c, property)).unwrap_or_default();
        Ok(format!("{}{path}.{}", self.atom(object)?, ident(property)))
    }

    fn operation(&mut self, op: Op, args: &[Expr]) -> Emit<String> {
        if op == Op::Print {
            let mut format = Vec::with_capacity(args.len());
            let mut values = String::new();
            for a in args {
                format.push(self.placeholder(a));
                values.push_str(", ");
                values.push_str(&self.expr(a)?);
            }
            return Ok(format!("println!(\"{}\"{values})", format.join(" ")));
        }
        let receiver = args
            .first()
            .map(|a| Receiver::of(&self.env.type_of(a)))
            .unwrap_or(Receiver::Any);
        let mut rendered = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            // Receivers are borrowed; the rest are moved in.
            let s = if i == 0 { self.expr(a)? } else { self.value(a)? };
            rendered.push((a, s));
        }
        render_op(op, Language::Rust, receiver, &rendered, GRAMMAR, &mut self.imports)
            .ok_or_else(|| self.error("operation", format!("no Rust form for {}", op.name())))
    }

    fn closure_params(&mut self, params: &[Param]) -> String {
        params
            .iter()
            .map(|p| {
                if p.ty.is_resolved() {
                    format!("{}: {}", ident(&p.name), self.type_name(&p.ty))
                } else {
                    ident(&p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn lambda(&mut self, lambda: &Lambda) -> Emit<String> {
        let params = self.closure_params(&lambda.params);
        self.env.push_scope();
        self.env.bind_params(&lambda.params);
        let result = match &lambda.body {
            LambdaBody::Expr(body) => self.value(body).map(|b| format!("|{params}| {b}")),
            LambdaBody::Block(stmts) => {
                let saved = self.take();
                self.indent += 1;
                let result = self.write_stmts(stmts);
                self.indent -= 1;
                let inner = std::mem::replace(&mut self.output, saved);
                result.map(|()| format!("move |{params}| {{\n{inner}{}}}", self.pad()))
            }
        };
        self.env.pop_scope();
        result
    }

    fn comprehension(&mut self, c: &Comprehension) -> Emit<String> {
        let source_ty = self.env.type_of(&c.source);
        let source = self.atom(&c.source)?;
        let iter = if source_ty.is_map() {
            format!("{source}.keys().cloned()")
        } else if source_ty.is_string() {
            format!("{source}.chars().map(String::from)")
        } else {
            format!("{source}.iter().cloned()")
        };
        self.env.push_scope();
        let var_ty = if source_ty.is_map() {
            source_ty
                .map_parts()
                .map_or_else(Type::any, |(k, _)| k.clone())
        } else {
            source_ty.element()
        };
        self.env.declare(&c.var, var_ty);
        let parts = self.comprehension_parts(c);
        self.env.pop_scope();
        let (filter, item) = parts?;
        let var = ident(&c.var);
        let chain = match filter {
            Some(f) => format!("{iter}.filter_map(|{var}| ({f}).then(|| {item}))"),
            None if super::is_identity(c) && c.key.is_none() => iter,
            None => format!("{iter}.map(|{var}| {item})"),
        };
        let collection = match c.kind {
            ComprehensionKind::Map => {
                self.imports.add("std::collections:HashMap");
                "HashMap<_, _>"
            }
            ComprehensionKind::Set => {
                self.imports.add("std::collections:HashSet");
                "HashSet<_>"
            }
            ComprehensionKind::List | ComprehensionKind::Generator => "Vec<_>",
        };
        Ok(format!("{chain}.collect::<{collection}>()"))
    }

    fn comprehension_parts(&mut self, c: &Comprehension) -> Emit<(Option<String>, String)> {
        let filter = match &c.filter {
            Some(f) => Some(self.expr(f)?),
            None => None,
        };
        let item = match &c.key {
            Some(key) => format!("({}, {})", self.value(key)?, self.value(&c.transform)?),
            None => self.value(&c.transform)?,
        };
        Ok((filter, item))
    }
}

/// Methods that assign through `self`, directly or by calling one that does.
fn mutating_methods(class: &Class) -> BTreeSet<&str> {
    let mut out: BTreeSet<&str> = BTreeSet::new();
    loop {
        let before = out.len();
        for m in class.methods.iter().filter(|m| !m.is_static) {
            if out.contains(m.name.as_str()) {
                continue;
            }
            let mut mutates = visit::any_stmt(&m.body, |s| match s {
                Stmt::Assign { target, .. } => rooted_at_this(target),
                Stmt::Expr(Expr::Operation {
                    op: Op::Append,
                    args,
                }) => args.first().is_some_and(rooted_at_this),
                _ => false,
            });
            visit::walk_all_exprs(&m.body, &mut |e| {
                if let Expr::Call { callee, .. } = e
                    && let Expr::Member { object, property } = callee.as_ref()
                    && matches!(object.as_ref(), Expr::This)
                    && out.contains(property.as_str())
                {
                    mutates = true;
                }
            });
            if mutates {
                out.insert(m.name.as_str());
            }
        }
        if out.len() == before {
            return out;
        }
    }
}

fn rooted_at_this(e: &Expr) -> bool {
    match e {
        Expr::This => true,
        Expr::Member { object, .. } | Expr::Index { object, .. } => rooted_at_this(object),
        _ => false,
    }
}

/// Leading statements that never touch the receiver, then one assignment
/// per field.
fn literal_constructor(body: &[Stmt]) -> Option<(&[Stmt], Vec<(String, &Expr)>)> {
    let split = body
        .iter()
        .rposition(|s| field_assignment(s).is_none())
        .map_or(0, |i| i + 1);
    let (prefix, assigns) = body.split_at(split);
    let mut touches = visit::any_stmt(prefix, |s| matches!(s, Stmt::Return(_)));
    visit::walk_all_exprs(prefix, &mut |e| {
        touches |= matches!(e, Expr::This) || e.as_ident() == Some("super");
    });
    if touches {
        return None;
    }
    let mut fields: Vec<(String, &Expr)> = Vec::with_capacity(assigns.len());
    for stmt in assigns {
        let (name, value) = field_assignment(stmt)?;
        if fields.iter().any(|(n, _)| n == name) {
            return None;
        }
        fields.push((name.to_string(), value));
    }
    Some((prefix, fields))
}

fn field_assignment(stmt: &Stmt) -> Option<(&str, &Expr)> {
    let Stmt::Assign {
        target: Expr::Member { object, property },
        value,
        ..
    } = stmt
    else {
        return None;
    };
    if !matches!(object.as_ref(), Expr::This) {
        return None;
    }
    let mut uses_this = false;
    visit::walk_expr(value, &mut |e| uses_this |= matches!(e, Expr::This));
    (!uses_this).then_some((property.as_str(), value))
}

/// Module variables that are not a plain literal live in a `LazyLock`.
fn is_lazy(var: &Variable) -> bool {
    !matches!(&var.value, Some(Expr::Literal(lit)) if !matches!(lit, Literal::Null))
}

fn const_name(name: &str) -> String {
    snake_case(name).to_uppercase()
}

fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("r#{name}")
    } else {
        name.to_string()
    }
}

/// Rust strings take `\u{..}` escapes.
fn escape(s: &str) -> String {
    escape_string(s, |code| format!("\\u{{{code:x}}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::infer::infer;

    fn emit(module: Module) -> String {
        let annotated = infer(module, &InferenceConfig::default());
        RustWriter::emit(&annotated, &TranslateConfig::default()).unwrap()
    }

    fn script(stmts: Vec<Stmt>) -> Module {
        let mut module = Module::new("main");
        module.statements = stmts;
        module
    }

    #[test]
    fn test_function() {
        let mut module = Module::new("calc");
        module.functions.push(
            Function::new(
                "add",
                vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
                Type::int(),
                vec![Stmt::return_stmt(Some(Expr::binary(
                    Expr::ident("a"),
                    BinaryOp::Add,
                    Expr::ident("b"),
                )))],
            )
            .unwrap(),
        );
        insta::assert_snapshot!(emit(module), @r"
        pub fn add(a: i64, b: i64) -> i64 {
            return a + b;
        }
        ");
    }

    #[test]
    fn test_mutable_binding() {
        let output = emit(script(vec![
            Stmt::declare("total", Expr::int(0)),
            Stmt::declare("fixed", Expr::int(1)),
            Stmt::assign(
                Expr::ident("total"),
                Expr::binary(Expr::ident("total"), BinaryOp::Add, Expr::ident("fixed")),
            ),
        ]));
        assert!(output.contains("let mut total = 0;"));
        assert!(output.contains("let fixed = 1;"));
        assert!(output.contains("total += fixed;"));
    }

    #[test]
    fn test_print_and_strings() {
        let output = emit(script(vec![
            Stmt::declare("name", Expr::string("a\"b")),
            Stmt::expr(Expr::op(
                Op::Print,
                vec![Expr::string("hi"), Expr::ident("name")],
            )),
        ]));
        assert!(output.contains("let name = \"a\\\"b\".to_string();"));
        assert!(output.contains("println!(\"{} {}\", \"hi\", name);"));
    }

    #[test]
    fn test_class_with_base() {
        let mut animal = Class::new("Animal");
        animal.properties.push(Property::new("name", Type::string()));
        animal
            .set_constructor(
                Function::new(
                    "constructor",
                    vec![Param::new("name", Type::string())],
                    Type::void(),
                    vec![Stmt::assign(
                        Expr::member(Expr::This, "name"),
                        Expr::ident("name"),
                    )],
                )
                .unwrap(),
            )
            .unwrap();
        let mut dog = Class::new("Dog");
        dog.base = Some("Animal".into());
        dog.methods.push(
            Function::new(
                "label",
                vec![],
                Type::string(),
                vec![Stmt::return_stmt(Some(Expr::member(Expr::This, "name")))],
            )
            .unwrap(),
        );
        let mut module = Module::new("zoo");
        module.classes.push(animal);
        module.classes.push(dog);
        let output = emit(module);
        assert!(output.contains(
            "pub fn new(name: String) -> Self {\n        Self { name: name.clone() }\n    }"
        ));
        assert!(output.contains("pub struct Dog {\n    pub base: Animal,\n}"));
        assert!(output.contains("pub fn label(&self) -> String {\n        return self.base.name.clone();"));
    }

    #[test]
    fn test_module_variables_use_declared_names() {
        let mut module = script(vec![
            Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("maxSize")])),
            Stmt::declare("copy", Expr::ident("names")),
            Stmt::declare(
                "doubled",
                Expr::binary(Expr::ident("limit"), BinaryOp::Mul, Expr::int(2)),
            ),
        ]);
        let variable = |name: &str, value: Expr| Variable {
            name: name.into(),
            ty: Type::any(),
            value: Some(value),
            constant: false,
            span: Span::default(),
        };
        module.variables = vec![
            variable("maxSize", Expr::int(3)),
            variable("names", Expr::Array(vec![Expr::string("a")])),
            variable("limit", Expr::binary(Expr::int(2), BinaryOp::Add, Expr::int(1))),
        ];
        let output = emit(module);
        assert!(output.starts_with("use std::sync::LazyLock;\n"));
        assert!(output.contains("const MAX_SIZE: i64 = 3;"));
        assert!(output.contains("static NAMES: LazyLock<Vec<String>> = LazyLock::new(||"));
        assert!(output.contains("static LIMIT: LazyLock<i64> = LazyLock::new(|| 2 + 1);"));
        assert!(output.contains("MAX_SIZE"));
        assert!(output.contains("let copy = NAMES.clone();"));
        assert!(output.contains("let doubled = (*LIMIT) * 2;"));
        assert!(!output.contains("maxSize"));
    }

    #[test]
    fn test_local_shadows_module_variable() {
        let mut module = Module::new("main");
        module.variables.push(Variable {
            name: "limit".into(),
            ty: Type::int(),
            value: Some(Expr::int(3)),
            constant: false,
            span: Span::default(),
        });
        module.functions.push(
            Function::new(
                "clamp",
                vec![Param::new("limit", Type::int())],
                Type::int(),
                vec![Stmt::return_stmt(Some(Expr::ident("limit")))],
            )
            .unwrap(),
        );
        let output = emit(module);
        assert!(output.contains("const LIMIT: i64 = 3;"));
        assert!(output.contains("return limit;"));
    }

    #[test]
    fn test_mutating_receiver_is_mut() {
        let mut counter = Class::new("Counter");
        counter.properties.push(Property::new("count", Type::int()));
        counter.methods.push(
            Function::new(
                "incr",
                vec![],
                Type::void(),
                vec![Stmt::assign(
                    Expr::member(Expr::This, "count"),
                    Expr::binary(Expr::member(Expr::This, "count"), BinaryOp::Add, Expr::int(1)),
                )],
            )
            .unwrap(),
        );
        counter.methods.push(
            Function::new(
                "get",
                vec![],
                Type::int(),
                vec![Stmt::return_stmt(Some(Expr::member(Expr::This, "count")))],
            )
            .unwrap(),
        );
        let mut module = script(vec![
            Stmt::declare("c", Expr::Construct { class: "Counter".into(), args: vec![] }),
            Stmt::expr(Expr::call(Expr::member(Expr::ident("c"), "incr"), vec![])),
            Stmt::declare("d", Expr::Construct { class: "Counter".into(), args: vec![] }),
            Stmt::expr(Expr::op(
                Op::Print,
                vec![Expr::call(Expr::member(Expr::ident("d"), "get"), vec![])],
            )),
        ]);
        module.classes.push(counter);
        let output = emit(module);
        assert!(output.contains("pub fn incr(&mut self) {"));
        assert!(output.contains("let mut c = Counter::new();"));
        assert!(output.contains("let d = Counter::new();"));
    }

    #[test]
    fn test_range_loops() {
        let output = emit(script(vec![
            Stmt::ForRange {
                var: "i".into(),
                start: Expr::int(0),
                end: Expr::int(3),
                step: None,
                body: vec![Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("i")]))],
            },
            Stmt::ForRange {
                var: "j".into(),
                start: Expr::int(10),
                end: Expr::int(0),
                step: Some(Expr::int(-1)),
                body: vec![Stmt::Pass],
            },
        ]));
        assert!(output.contains("for i in 0..3 {"));
        assert!(output.contains("for j in (0 + 1..=10).rev() {"));
    }

    #[test]
    fn test_comprehension_chain() {
        let c = Comprehension::builder("x")
            .source(Expr::ident("xs"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .filter(Some(Expr::binary(Expr::ident("x"), BinaryOp::Gt, Expr::int(1))))
            .build()
            .unwrap();
        let output = emit(script(vec![
            Stmt::declare("xs", Expr::Array(vec![Expr::int(1), Expr::int(2)])),
            Stmt::declare("ys", Expr::Comprehension(Box::new(c))),
        ]));
        assert!(output.contains("let xs = vec![1, 2];"));
        assert!(output.contains(
            "let ys = xs.iter().cloned().filter_map(|x| (x > 1).then(|| x * 2)).collect::<Vec<_>>();"
        ));
    }

    #[test]
    fn test_map_insert_and_floor_div() {
        let output = emit(script(vec![
            Stmt::declare(
                "m",
                Expr::Map(vec![(Expr::string("a"), Expr::int(1))]),
            ),
            Stmt::assign(
                Expr::index(Expr::ident("m"), Expr::string("b")),
                Expr::int(2),
            ),
            Stmt::declare(
                "q",
                Expr::binary(Expr::int(7), BinaryOp::FloorDiv, Expr::int(2)),
            ),
        ]));
        assert!(output.starts_with("use std::collections::HashMap;\n"));
        assert!(output.contains("let mut m = HashMap::from([(\"a\".to_string(), 1)]);"));
        assert!(output.contains("m.insert(\"b\".to_string(), 2);"));
        assert!(output.contains("let q = 7i64.div_euclid(2);"));
    }

    #[test]
    fn test_throw_panics() {
        let output = emit(script(vec![Stmt::Throw(Expr::Construct {
            class: "ValueError".into(),
            args: vec![Expr::string("bad")],
        })]));
        assert!(output.contains("panic!(\"{}\", \"bad\");"));
    }

    #[test]
    fn test_untyped_map_has_string_keys() {
        let output = emit(script(vec![Stmt::declare("m", Expr::Map(vec![]))]));
        assert!(output.contains("HashMap<String, "), "{output}");
        assert!(!output.contains("HashMap<serde_json::Value"), "{output}");
    }
}
