//! C# writer.
//!
//! Module variables, free functions and top-level statements live in one
//! static class (`Program` unless configured); statements become its `Main`.
//! Classes map one to one. Comprehensions use LINQ.

use super::{
    Grammar, binary_operands, bind_stmt, binding_type, classes_in_base_order, escape_string, float_literal,
    is_identity, is_super_call, map_key, marker_lines, render_op, unary_strength, unicode_escape,
    unrenderable, wrap,
};
use crate::config::TranslateConfig;
use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::{AnnotatedModule, TypeEnv};
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Writer;

/// Static instance of the C# writer for registry.
pub static CSHARP_WRITER: CSharpWriterImpl = CSharpWriterImpl;

/// C# writer implementing the Writer trait.
pub struct CSharpWriterImpl;

impl Writer for CSharpWriterImpl {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError> {
        CSharpWriter::emit(module, config)
    }
}

type Emit<T = ()> = Result<T, GenerationError>;

const GRAMMAR: Grammar = Grammar::CLike;
const LANG: Language = Language::CSharp;
const GENERIC: &str = "System.Collections.Generic";

/// Emits IR as C# source code.
pub struct CSharpWriter<'m> {
    output: String,
    indent: usize,
    imports: ImportSet,
    /// `using N = T;` lines for type aliases.
    aliases: Vec<String>,
    env: TypeEnv<'m>,
    module: &'m Module,
    namespace: Option<String>,
    class_name: String,
    /// Whether the writer is inside a module class rather than the static
    /// holder class.
    in_class: bool,
    at: Span,
}

impl<'m> CSharpWriter<'m> {
    /// Emit a module to C# source.
    pub fn emit(annotated: &'m AnnotatedModule, config: &TranslateConfig) -> Emit<String> {
        let mut writer = Self {
            output: String::new(),
            indent: 0,
            imports: ImportSet::new(),
            aliases: Vec::new(),
            env: TypeEnv::with_signatures(&annotated.signatures),
            module: &annotated.module,
            namespace: config.csharp.namespace.clone(),
            class_name: config.csharp.class_name.clone(),
            in_class: false,
            at: Span::default(),
        };
        let sections = writer.write_module()?;
        Ok(writer.finish(sections))
    }

    fn write_module(&mut self) -> Emit<Vec<String>> {
        let module = self.module;
        let mut sections = Vec::new();
        for def in &module.type_defs {
            if let TypeDefKind::Alias(ty) = &def.kind {
                let ty = self.type_name(ty);
                self.aliases.push(format!("using {} = {ty};", def.name));
            } else {
                self.write_type_def(def);
                sections.push(self.take());
            }
        }
        for e in &module.enums {
            self.write_enum(e);
            sections.push(self.take());
        }
        for class in classes_in_base_order(module) {
            self.write_class(class)?;
            sections.push(self.take());
        }
        if !module.variables.is_empty()
            || !module.functions.is_empty()
            || !module.statements.is_empty()
        {
            self.write_program()?;
            sections.push(self.take());
        }
        Ok(sections)
    }

    /// The static class holding module-level code.
    fn write_program(&mut self) -> Emit {
        let module = self.module;
        self.line(&format!("public static class {}", self.class_name));
        self.line("{");
        self.indent += 1;
        let mut first = true;
        for var in &module.variables {
            self.write_variable(var)?;
            first = false;
        }
        for func in &module.functions {
            if !first {
                self.output.push('\n');
            }
            first = false;
            self.write_function(func, None)?;
        }
        if !module.statements.is_empty() {
            if !first {
                self.output.push('\n');
            }
            self.at = Span::default();
            self.line("public static void Main()");
            self.line("{");
            self.write_block(&module.statements)?;
            self.line("}");
        }
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn finish(self, sections: Vec<String>) -> String {
        let mut out = String::new();
        for (module, _) in self.imports.iter() {
            out.push_str(&format!("using {module};\n"));
        }
        for alias in &self.aliases {
            out.push_str(alias);
            out.push('\n');
        }
        if let Some(ns) = &self.namespace {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("namespace {ns};\n"));
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

    fn string_enum(&self, name: &str) -> bool {
        self.module.enums.iter().any(|e| {
            e.name == name
                && e
                    .variants
                    .iter()
                    .any(|v| matches!(v.value, Some(Literal::String(_))))
        })
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn write_doc(&mut self, doc: &str) {
        self.line("/// <summary>");
        for l in doc.lines() {
            self.line(&format!("/// {l}"));
        }
        self.line("/// </summary>");
    }

    fn write_variable(&mut self, var: &Variable) -> Emit {
        self.at = var.span;
        let ty = binding_type(&self.env, &var.ty, var.value.as_ref());
        let cs_ty = self.type_name(&ty);
        match &var.value {
            Some(v @ Expr::Literal(lit)) if var.constant && !matches!(lit, Literal::Null) => {
                let v = self.expr_as(v, Some(&ty))?;
                self.line(&format!("public const {cs_ty} {} = {v};", var.name));
            }
            Some(v) => {
                let v = self.expr_as(v, Some(&ty))?;
                self.line(&format!("public static {cs_ty} {} = {v};", var.name));
            }
            None => self.line(&format!("public static {cs_ty} {};", var.name)),
        }
        Ok(())
    }

    fn write_type_def(&mut self, def: &TypeDef) {
        if let Some(doc) = &def.doc {
            self.write_doc(doc);
        }
        let TypeDefKind::Record(fields) = &def.kind else {
            return;
        };
        let interface = !fields.is_empty()
            && fields
                .iter()
                .all(|f| matches!(f.ty.kind, TypeKind::Function { .. }));
        if interface {
            self.line(&format!("public interface {}", def.name));
            self.line("{");
            self.indent += 1;
            for f in fields {
                if let TypeKind::Function { params, ret } = &f.ty.kind {
                    let params: Vec<String> = params
                        .iter()
                        .enumerate()
                        .map(|(i, p)| format!("{} a{i}", self.type_name(p)))
                        .collect();
                    let ret = self.return_type(ret, false);
                    self.line(&format!("{ret} {}({});", f.name, params.join(", ")));
                }
            }
        } else {
            self.line(&format!("public class {}", def.name));
            self.line("{");
            self.indent += 1;
            for f in fields {
                let ty = self.type_name(&f.ty);
                self.line(&format!("public {ty} {} {{ get; set; }}", f.name));
            }
        }
        self.indent -= 1;
        self.line("}");
    }

    fn write_enum(&mut self, e: &Enum) {
        if self.string_enum(&e.name) {
            // C# enums are integral; string values become constants.
            self.line(&format!("public static class {}", e.name));
            self.line("{");
            self.indent += 1;
            for v in &e.variants {
                let value = match &v.value {
                    Some(lit) => literal(lit),
                    None => format!("\"{}\"", v.name),
                };
                self.line(&format!("public const string {} = {value};", v.name));
            }
        } else {
            self.line(&format!("public enum {}", e.name));
            self.line("{");
            self.indent += 1;
            for v in &e.variants {
                match &v.value {
                    Some(Literal::Int(n)) => self.line(&format!("{} = {n},", v.name)),
                    _ => self.line(&format!("{},", v.name)),
                }
            }
        }
        self.indent -= 1;
        self.line("}");
    }

    fn write_class(&mut self, class: &Class) -> Emit {
        self.at = class.span;
        if let Some(doc) = &class.doc {
            self.write_doc(doc);
        }
        match &class.base {
            Some(base) => {
                let base = self.class_ref(base);
                self.line(&format!("public class {} : {base}", class.name));
            }
            None => self.line(&format!("public class {}", class.name)),
        }
        self.line("{");
        self.indent += 1;
        self.in_class = true;
        self.env.set_class(Some(&class.name));
        let result = self.write_members(class);
        self.env.set_class(None);
        self.in_class = false;
        result?;
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn write_members(&mut self, class: &Class) -> Emit {
        let mut first = true;
        for prop in &class.properties {
            let keyword = if prop.is_static { "public static" } else { "public" };
            let ty = self.type_name(&prop.ty);
            match &prop.default {
                Some(d) => {
                    let d = self.expr_as(d, Some(&prop.ty))?;
                    self.line(&format!("{keyword} {ty} {} = {d};", prop.name));
                }
                None => self.line(&format!("{keyword} {ty} {};", prop.name)),
            }
            first = false;
        }
        let members = class.constructor().into_iter().chain(&class.methods);
        for func in members {
            if !first {
                self.output.push('\n');
            }
            first = false;
            self.write_function(func, Some(class))?;
        }
        Ok(())
    }

    fn write_function(&mut self, func: &Function, class: Option<&Class>) -> Emit {
        self.at = func.span;
        if let Some(doc) = &func.doc {
            self.write_doc(doc);
        }
        let params = self.params(&func.params)?;
        let is_ctor = class.is_some() && func.name == "constructor";
        let mut body: &[Stmt] = &func.body;
        let head = match class {
            Some(class) if is_ctor => {
                let mut head = format!("public {}({params})", class.name);
                if let Some(Stmt::Expr(Expr::Call { args, .. })) = body.first()
                    && body.first().is_some_and(is_super_call)
                {
                    head.push_str(&format!(" : base({})", self.exprs(args)?));
                    body = &body[1..];
                }
                head
            }
            _ => {
                let mut head = String::from("public ");
                if func.is_static || class.is_none() {
                    head.push_str("static ");
                }
                if func.is_async {
                    head.push_str("async ");
                }
                let ret = self.return_type(&func.ret, func.is_async);
                format!("{head}{ret} {}({params})", func.name)
            }
        };
        self.line(&head);
        self.line("{");
        self.env.push_scope();
        self.env.bind_params(&func.params);
        let result = self.write_block(body);
        self.env.pop_scope();
        result?;
        self.line("}");
        Ok(())
    }

    fn params(&mut self, params: &[Param]) -> Emit<String> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            let ty = self.type_name(&p.ty);
            if p.variadic {
                out.push(format!("params {ty}[] {}", p.name));
                continue;
            }
            match &p.default {
                // Defaults must be compile-time constants.
                Some(d @ Expr::Literal(_)) => {
                    let d = self.expr_as(d, Some(&p.ty))?;
                    out.push(format!("{ty} {} = {d}", p.name));
                }
                Some(_) => out.push(format!("{ty} {} = default", p.name)),
                None => out.push(format!("{ty} {}", p.name)),
            }
        }
        Ok(out.join(", "))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// A class name as written in C#; exceptions map to their .NET type.
    fn class_ref(&mut self, name: &str) -> String {
        if !idioms::is_canonical_exception(name) || self.module.is_class(name) {
            return name.to_string();
        }
        let native = idioms::native_exception(LANG, name);
        self.imports.add("System");
        if native == "KeyNotFoundException" {
            self.imports.add(GENERIC);
        }
        native
    }

    fn return_type(&mut self, ty: &Type, is_async: bool) -> String {
        if is_async {
            self.imports.add("System.Threading.Tasks");
            return if ty.is_void() {
                "Task".to_string()
            } else {
                format!("Task<{}>", self.type_name(ty))
            };
        }
        if ty.is_void() {
            "void".to_string()
        } else {
            self.type_name(ty)
        }
    }

    fn type_name(&mut self, ty: &Type) -> String {
        let inner = match &ty.kind {
            TypeKind::Any | TypeKind::Union(_) | TypeKind::Void => "object".to_string(),
            TypeKind::Primitive(Primitive::Null) => return "object?".to_string(),
            TypeKind::Primitive(Primitive::Int) => "int".to_string(),
            TypeKind::Primitive(Primitive::Float) => "double".to_string(),
            TypeKind::Primitive(Primitive::String) => "string".to_string(),
            TypeKind::Primitive(Primitive::Bool) => "bool".to_string(),
            TypeKind::Named(n) if self.string_enum(n) => "string".to_string(),
            TypeKind::Named(n) => self.class_ref(n),
            TypeKind::Sequence(t) => {
                self.imports.add(GENERIC);
                format!("List<{}>", self.type_name(t))
            }
            TypeKind::Map(k, v) => {
                self.imports.add(GENERIC);
                let key = self.type_name(&map_key(k));
                format!("Dictionary<{key}, {}>", self.type_name(v))
            }
            TypeKind::Function { params, ret } => {
                self.imports.add("System");
                let mut args: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                if ret.is_void() {
                    if args.is_empty() {
                        "Action".to_string()
                    } else {
                        format!("Action<{}>", args.join(", "))
                    }
                } else {
                    args.push(self.type_name(ret));
                    format!("Func<{}>", args.join(", "))
                }
            }
        };
        if ty.optional && !inner.ends_with('?') {
            format!("{inner}?")
        } else {
            inner
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

    /// `{ body }` on their own lines.
    fn write_braced(&mut self, body: &[Stmt]) -> Emit {
        self.line("{");
        self.write_block(body)?;
        self.line("}");
        Ok(())
    }

    fn write_stmt(&mut self, stmt: &Stmt) -> Emit {
        match stmt {
            Stmt::Assign { .. } => {
                let s = self.clause(stmt)?;
                self.line(&format!("{s};"));
            }
            Stmt::Declare { name, ty } => {
                let ty = self.type_name(ty);
                self.line(&format!("{ty} {name} = default;"));
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(e)) => {
                let e = self.expr(e)?;
                self.line(&format!("return {e};"));
            }
            Stmt::If {
                test,
                then_body,
                elifs,
                else_body,
            } => {
                let test = self.expr(test)?;
                self.line(&format!("if ({test})"));
                self.write_braced(then_body)?;
                for elif in elifs {
                    let test = self.expr(&elif.test)?;
                    self.line(&format!("else if ({test})"));
                    self.write_braced(&elif.body)?;
                }
                if let Some(else_body) = else_body {
                    self.line("else");
                    self.write_braced(else_body)?;
                }
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
                let key = key.as_deref().unwrap_or("_");
                let header = match mode {
                    IterMode::Items if source_ty.is_map() => {
                        format!("foreach (var {value} in {source}.Keys)")
                    }
                    IterMode::Items if source_ty.is_string() => {
                        self.imports.add("System.Linq");
                        format!("foreach (var {value} in {source}.Select(c => c.ToString()))")
                    }
                    IterMode::Items => format!("foreach (var {value} in {source})"),
                    IterMode::Indexed => {
                        self.imports.add("System.Linq");
                        format!(
                            "foreach (var ({value}, {key}) in {source}.Select((v, i) => (v, i)))"
                        )
                    }
                    IterMode::Entries => format!("foreach (var ({key}, {value}) in {source})"),
                };
                self.line(&header);
                self.env.push_scope();
                self.env.bind_loop(stmt);
                let result = self.write_braced(body);
                self.env.pop_scope();
                result?;
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.expr(start)?;
                let end = self.expr(end)?;
                let (cmp, update) = match step {
                    None => ("<", format!("{var}++")),
                    Some(Expr::Literal(Literal::Int(-1))) => (">", format!("{var}--")),
                    Some(Expr::Literal(Literal::Int(n))) if *n < 0 => {
                        (">", format!("{var} -= {}", -n))
                    }
                    Some(step) => ("<", format!("{var} += {}", self.expr(step)?)),
                };
                self.line(&format!(
                    "for (var {var} = {start}; {var} {cmp} {end}; {update})"
                ));
                self.env.push_scope();
                self.env.bind_loop(stmt);
                let result = self.write_braced(body);
                self.env.pop_scope();
                result?;
            }
            Stmt::ForClassic {
                init,
                test,
                update,
                body,
            } => {
                self.env.push_scope();
                let init = match init.as_deref() {
                    Some(s) => {
                        let rendered = self.clause(s)?;
                        bind_stmt(&mut self.env, s);
                        rendered
                    }
                    None => String::new(),
                };
                let test = match test {
                    Some(t) => self.expr(t)?,
                    None => String::new(),
                };
                let update = match update.as_deref() {
                    Some(s) => self.clause(s)?,
                    None => String::new(),
                };
                self.line(&format!("for ({init}; {test}; {update})"));
                let result = self.write_braced(body);
                self.env.pop_scope();
                result?;
            }
            Stmt::While { test, body } => {
                let test = self.expr(test)?;
                self.line(&format!("while ({test})"));
                self.write_braced(body)?;
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                self.line("try");
                self.write_braced(body)?;
                for h in handlers {
                    let class = self.class_ref(h.exception.as_deref().unwrap_or("Exception"));
                    match &h.binding {
                        Some(b) => self.line(&format!("catch ({class} {b})")),
                        None if h.exception.is_none() => self.line("catch"),
                        None => self.line(&format!("catch ({class})")),
                    }
                    self.env.push_scope();
                    if let Some(b) = &h.binding {
                        self.env.declare(b, Type::named(class.clone()));
                    }
                    let result = self.write_braced(&h.body);
                    self.env.pop_scope();
                    result?;
                }
                if let Some(f) = finally {
                    self.line("finally");
                    self.write_braced(f)?;
                }
            }
            Stmt::Throw(e) => {
                let e = self.expr(e)?;
                self.line(&format!("throw {e};"));
            }
            Stmt::Expr(_) if is_super_call(stmt) => {
                return Err(self.error(
                    stmt.kind_name(),
                    "base constructor call must come first in a C# constructor",
                ));
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

    /// An assignment or expression without its `;`, as used in loop headers.
    fn clause(&mut self, stmt: &Stmt) -> Emit<String> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                ty,
                declare,
            } => {
                let target_s = self.expr(target)?;
                if *declare {
                    let value_ty = self.env.type_of(value);
                    let explicit = matches!(value, Expr::Literal(Literal::Null))
                        || matches!(value, Expr::Array(items) if items.is_empty())
                        || matches!(value, Expr::Map(pairs) if pairs.is_empty())
                        || matches!(value, Expr::Lambda(_))
                        || (ty.is_resolved() && value_ty != *ty);
                    let value_s = self.expr_as(value, Some(ty))?;
                    if explicit {
                        let shown = if ty.is_resolved() || value_ty.is_any() { ty } else { &value_ty };
                        let cs_ty = self.type_name(shown);
                        return Ok(format!("{cs_ty} {target_s} = {value_s}"));
                    }
                    return Ok(format!("var {target_s} = {value_s}"));
                }
                if let Expr::Binary { left, op, right } = value
                    && **left == *target
                    && !matches!(op, BinaryOp::FloorDiv | BinaryOp::Pow)
                    && (op.is_arithmetic() || op.is_bitwise())
                {
                    match (op, right.as_ref()) {
                        (BinaryOp::Add, Expr::Literal(Literal::Int(1))) => {
                            return Ok(format!("{target_s}++"));
                        }
                        (BinaryOp::Sub, Expr::Literal(Literal::Int(1))) => {
                            return Ok(format!("{target_s}--"));
                        }
                        _ => {}
                    }
                    let right = self.expr(right)?;
                    return Ok(format!("{target_s} {}= {right}", op.c_symbol()));
                }
                let value = self.expr(value)?;
                Ok(format!("{target_s} = {value}"))
            }
            Stmt::Expr(e) => self.expr(e),
            other => Err(self.error(other.kind_name(), "not valid in a for-loop clause")),
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

    fn atom(&mut self, e: &Expr) -> Emit<String> {
        let s = self.expr(e)?;
        Ok(wrap(e, s, u8::MAX, GRAMMAR))
    }

    fn expr(&mut self, e: &Expr) -> Emit<String> {
        self.expr_as(e, None)
    }

    fn expr_as(&mut self, e: &Expr, expected: Option<&Type>) -> Emit<String> {
        let expected = expected.filter(|t| t.is_resolved());
        Ok(match e {
            Expr::Literal(Literal::Int(n)) if expected.is_some_and(Type::is_float) => {
                format!("{n}.0")
            }
            Expr::Literal(lit) => literal(lit),
            Expr::Ident(name) => name.clone(),
            Expr::This => "this".to_string(),
            Expr::Binary { left, op, right } => self.binary(left, *op, right)?,
            Expr::Unary { op, operand } => {
                let s = self.expr(operand)?;
                let s = wrap(operand, s, unary_strength(*op, GRAMMAR) + 1, GRAMMAR);
                match op {
                    UnaryOp::Neg => format!("-{s}"),
                    UnaryOp::Not => format!("!{s}"),
                    UnaryOp::BitNot => format!("~{s}"),
                }
            }
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Operation { op, args } => self.operation(*op, args)?,
            Expr::Construct { class, args } => {
                let class = self.class_ref(class);
                format!("new {class}({})", self.exprs(args)?)
            }
            Expr::Member { object, property } => match object.as_ref() {
                Expr::Ident(name) if name == "super" => format!("base.{property}"),
                _ => format!("{}.{property}", self.atom(object)?),
            },
            Expr::Index { object, index } => {
                let obj = self.atom(object)?;
                match index.as_ref() {
                    Expr::Literal(Literal::Int(n)) if *n < 0 => format!("{obj}[^{}]", -n),
                    _ => format!("{obj}[{}]", self.expr(index)?),
                }
            }
            Expr::Array(items) => {
                let ty = match expected {
                    Some(t) if t.is_sequence() => t.clone(),
                    _ => self.env.type_of(e),
                };
                let cs_ty = self.type_name(&ty);
                let elem = ty.element();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.expr_as(item, Some(&elem))?);
                }
                if out.is_empty() {
                    format!("new {cs_ty}()")
                } else {
                    format!("new {cs_ty} {{ {} }}", out.join(", "))
                }
            }
            Expr::Map(pairs) => {
                let ty = match expected {
                    Some(t) if t.is_map() => t.clone(),
                    _ => self.env.type_of(e),
                };
                let cs_ty = self.type_name(&ty);
                let (kt, vt) = ty
                    .map_parts()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .unwrap_or_else(|| (Type::any(), Type::any()));
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push(format!(
                        "[{}] = {}",
                        self.expr_as(k, Some(&kt))?,
                        self.expr_as(v, Some(&vt))?
                    ));
                }
                if out.is_empty() {
                    format!("new {cs_ty}()")
                } else {
                    format!("new {cs_ty} {{ {} }}", out.join(", "))
                }
            }
            Expr::Ternary {
                test,
                then,
                otherwise,
            } => {
                let t = self.expr(test)?;
                let t = wrap(test, t, 3, GRAMMAR);
                let a = self.expr_as(then, expected)?;
                let b = self.expr_as(otherwise, expected)?;
                format!("{t} ? {a} : {b}")
            }
            Expr::Lambda(lambda) => self.lambda(lambda)?,
            Expr::Comprehension(c) => self.comprehension(c)?,
            Expr::Await(inner) => format!("await {}", self.atom(inner)?),
            Expr::Format(parts) => {
                let mut out = String::from("$\"");
                for part in parts {
                    match part {
                        FormatPart::Text(t) => out.push_str(
                            &escape_string(t, unicode_escape)
                                .replace('{', "{{")
                                .replace('}', "}}"),
                        ),
                        FormatPart::Expr(e) => {
                            let s = self.expr(e)?;
                            // A conditional inside a hole needs parentheses.
                            let s = if matches!(e, Expr::Ternary { .. }) {
                                format!("({s})")
                            } else {
                                s
                            };
                            out.push('{');
                            out.push_str(&s);
                            out.push('}');
                        }
                    }
                }
                out.push('"');
                out
            }
        })
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Emit<String> {
        let both_int = self.env.type_of(left).is_int() && self.env.type_of(right).is_int();
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        match op {
            BinaryOp::Pow => {
                self.imports.add("System");
                let call = format!("Math.Pow({l}, {r})");
                return Ok(if both_int { format!("(int){call}") } else { call });
            }
            BinaryOp::FloorDiv => {
                self.imports.add("System");
                let (l, r) = binary_operands(BinaryOp::Div, (left, l), (right, r), GRAMMAR);
                return Ok(if both_int {
                    format!("(int)Math.Floor((double){l} / {r})")
                } else {
                    format!("Math.Floor({l} / {r})")
                });
            }
            BinaryOp::Div if both_int => {
                let (l, r) = binary_operands(op, (left, l), (right, r), GRAMMAR);
                return Ok(format!("(double){l} / {r}"));
            }
            _ => {}
        }
        let (l, r) = binary_operands(op, (left, l), (right, r), GRAMMAR);
        Ok(format!("{l} {} {r}", op.c_symbol()))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Emit<String> {
        let args_s = self.exprs(args)?;
        match callee {
            // Free functions live on the holder class.
            Expr::Ident(name)
                if self.in_class
                    && !self.env.is_bound(name)
                    && self.module.function(name).is_some() =>
            {
                Ok(format!("{}.{name}({args_s})", self.class_name))
            }
            Expr::Lambda(_) => Ok(format!("({})({args_s})", self.expr(callee)?)),
            other => Ok(format!("{}({args_s})", self.atom(other)?)),
        }
    }

    fn operation(&mut self, op: Op, args: &[Expr]) -> Emit<String> {
        if op == Op::Print && args.len() != 1 {
            self.imports.add("System");
            let mut holes = Vec::with_capacity(args.len());
            for a in args {
                holes.push(format!("{{{}}}", self.expr(a)?));
            }
            return Ok(format!("Console.WriteLine($\"{}\")", holes.join(" ")));
        }
        let receiver = args
            .first()
            .map(|a| Receiver::of(&self.env.type_of(a)))
            .unwrap_or(Receiver::Any);
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push((a, self.expr(a)?));
        }
        render_op(op, LANG, receiver, &rendered, GRAMMAR, &mut self.imports)
            .ok_or_else(|| self.error("operation", format!("no C# form for {}", op.name())))
    }

    fn lambda(&mut self, lambda: &Lambda) -> Emit<String> {
        let mut params = Vec::with_capacity(lambda.params.len());
        for p in &lambda.params {
            if p.ty.is_resolved() {
                params.push(format!("{} {}", self.type_name(&p.ty), p.name));
            } else {
                params.push(p.name.clone());
            }
        }
        let asyncness = if lambda.is_async { "async " } else { "" };
        let params = format!("{asyncness}({})", params.join(", "));
        self.env.push_scope();
        self.env.bind_params(&lambda.params);
        let result = match &lambda.body {
            LambdaBody::Expr(body) => self.expr(body).map(|b| format!("{params} => {b}")),
            LambdaBody::Block(stmts) => {
                let saved = self.take();
                self.indent += 1;
                let result = self.write_stmts(stmts);
                self.indent -= 1;
                let inner = std::mem::replace(&mut self.output, saved);
                result.map(|()| format!("{params} =>\n{0}{{\n{inner}{0}}}", self.pad()))
            }
        };
        self.env.pop_scope();
        result
    }

    fn comprehension(&mut self, c: &Comprehension) -> Emit<String> {
        self.imports.add("System.Linq");
        let source_ty = self.env.type_of(&c.source);
        let mut chain = self.atom(&c.source)?;
        if source_ty.is_map() {
            chain.push_str(".Keys");
        } else if source_ty.is_string() {
            chain.push_str(".Select(ch => ch.ToString())");
        }
        self.env.push_scope();
        let var_ty = if source_ty.is_map() {
            source_ty
                .map_parts()
                .map_or_else(Type::any, |(k, _)| k.clone())
        } else {
            source_ty.element()
        };
        self.env.declare(&c.var, var_ty);
        let result = self.comprehension_chain(c, chain);
        self.env.pop_scope();
        result
    }

    fn comprehension_chain(&mut self, c: &Comprehension, mut chain: String) -> Emit<String> {
        let var = &c.var;
        if let Some(f) = &c.filter {
            chain.push_str(&format!(".Where({var} => {})", self.expr(f)?));
        }
        match (&c.kind, &c.key) {
            (ComprehensionKind::Map, Some(key)) => {
                let key = self.expr(key)?;
                let value = self.expr(&c.transform)?;
                chain.push_str(&format!(".ToDictionary({var} => {key}, {var} => {value})"));
            }
            (kind, _) => {
                if !is_identity(c) {
                    chain.push_str(&format!(".Select({var} => {})", self.expr(&c.transform)?));
                }
                if *kind == ComprehensionKind::Set {
                    chain.push_str(".ToHashSet()");
                } else {
                    chain.push_str(".ToList()");
                }
            }
        }
        Ok(chain)
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.is_nan() => "double.NaN".to_string(),
        Literal::Float(f) if f.is_infinite() && *f > 0.0 => "double.PositiveInfinity".to_string(),
        Literal::Float(f) if f.is_infinite() => "double.NegativeInfinity".to_string(),
        Literal::Float(f) => float_literal(*f),
        Literal::String(s) => format!("\"{}\"", escape_string(s, unicode_escape)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::infer::infer;

    fn emit_with(module: Module, config: &TranslateConfig) -> String {
        let annotated = infer(module, &InferenceConfig::default());
        CSharpWriter::emit(&annotated, config).unwrap()
    }

    fn emit(module: Module) -> String {
        emit_with(module, &TranslateConfig::default())
    }

    fn script(stmts: Vec<Stmt>) -> Module {
        let mut module = Module::new("main");
        module.statements = stmts;
        module
    }

    #[test]
    fn test_program_class() {
        let output = emit(script(vec![
            Stmt::declare("x", Expr::int(42)),
            Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("x")])),
        ]));
        insta::assert_snapshot!(output, @r"
        using System;

        public static class Program
        {
            public static void Main()
            {
                var x = 42;
                Console.WriteLine(x);
            }
        }
        ");
    }

    #[test]
    fn test_namespace_and_class_name() {
        let mut config = TranslateConfig::default();
        config.csharp.namespace = Some("Acme.Tools".into());
        config.csharp.class_name = "Entry".into();
        let output = emit_with(script(vec![Stmt::Pass]), &config);
        assert!(output.starts_with("namespace Acme.Tools;\n\npublic static class Entry\n{"));
    }

    #[test]
    fn test_class_with_base_call() {
        let mut class = Class::new("NotFound");
        class.base = Some("KeyError".into());
        class
            .set_constructor(
                Function::new(
                    "constructor",
                    vec![Param::new("key", Type::string())],
                    Type::void(),
                    vec![Stmt::expr(Expr::call(
                        Expr::ident("super"),
                        vec![Expr::ident("key")],
                    ))],
                )
                .unwrap(),
            )
            .unwrap();
        let mut module = Module::new("errors");
        module.classes.push(class);
        let output = emit(module);
        assert!(output.contains("public class NotFound : KeyNotFoundException"));
        assert!(output.contains("public NotFound(string key) : base(key)\n    {\n    }"));
    }

    #[test]
    fn test_linq_comprehension() {
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
        assert!(output.contains("var xs = new List<int> { 1, 2 };"));
        assert!(output.contains("var ys = xs.Where(x => x > 1).Select(x => x * 2).ToList();"));
        assert!(output.contains("using System.Linq;"));
    }

    #[test]
    fn test_typed_catch() {
        let output = emit(script(vec![Stmt::Try {
            body: vec![Stmt::Throw(Expr::Construct {
                class: "ValueError".into(),
                args: vec![Expr::string("bad")],
            })],
            handlers: vec![Catch {
                exception: Some("ValueError".into()),
                binding: Some("e".into()),
                body: vec![Stmt::Pass],
            }],
            finally: None,
        }]));
        assert!(output.contains("throw new ArgumentException(\"bad\");"));
        assert!(output.contains("catch (ArgumentException e)"));
    }

    #[test]
    fn test_interpolated_string() {
        let output = emit(script(vec![
            Stmt::declare("n", Expr::int(1)),
            Stmt::declare(
                "s",
                Expr::Format(vec![
                    FormatPart::Text("{n}=".into()),
                    FormatPart::Expr(Expr::ident("n")),
                ]),
            ),
        ]));
        assert!(output.contains("var s = $\"{{n}}={n}\";"));
    }

    #[test]
    fn test_untyped_map_has_string_keys() {
        let output = emit(script(vec![Stmt::declare("m", Expr::Map(vec![]))]));
        assert!(
            output.contains("Dictionary<string, object> m = new Dictionary<string, object>();"),
            "{output}"
        );
    }
}
