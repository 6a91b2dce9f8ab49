//! TypeScript and JavaScript writer.
//!
//! One writer serves both: JavaScript output is the TypeScript output with
//! annotations, interfaces and type aliases left out, and enums lowered to
//! frozen objects.

use super::{
    Grammar, binary_operands, bind_stmt, classes_in_base_order, escape_string, float_literal,
    is_identity, marker_lines, render_op, unary_strength, unicode_escape, unrenderable, wrap,
};
use crate::config::TranslateConfig;
use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::{AnnotatedModule, TypeEnv};
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Writer;
use std::collections::BTreeSet;

/// Static instance of the TypeScript writer for registry.
pub static TYPESCRIPT_WRITER: TypeScriptWriterImpl = TypeScriptWriterImpl {
    language: Language::TypeScript,
};

/// Static instance of the JavaScript writer for registry.
pub static JAVASCRIPT_WRITER: TypeScriptWriterImpl = TypeScriptWriterImpl {
    language: Language::JavaScript,
};

/// TypeScript/JavaScript writer implementing the Writer trait.
pub struct TypeScriptWriterImpl {
    language: Language,
}

impl Writer for TypeScriptWriterImpl {
    fn language(&self) -> Language {
        self.language
    }

    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError> {
        TypeScriptWriter::emit(module, config, self.language == Language::TypeScript)
    }
}

type Emit<T = ()> = Result<T, GenerationError>;

const GRAMMAR: Grammar = Grammar::CLike;
const LANG: Language = Language::TypeScript;

/// Emits IR as TypeScript (or, untyped, JavaScript) source code.
pub struct TypeScriptWriter<'m> {
    output: String,
    indent: usize,
    indent_width: usize,
    typed: bool,
    imports: ImportSet,
    env: TypeEnv<'m>,
    /// Locals assigned after their declaration in the body being written.
    reassigned: BTreeSet<String>,
    at: Span,
}

impl<'m> TypeScriptWriter<'m> {
    /// Emit a module. `typed` selects TypeScript over JavaScript.
    pub fn emit(
        annotated: &'m AnnotatedModule,
        config: &TranslateConfig,
        typed: bool,
    ) -> Emit<String> {
        let mut writer = Self {
            output: String::new(),
            indent: 0,
            indent_width: config.typescript.indent.max(1),
            typed,
            imports: ImportSet::new(),
            env: TypeEnv::with_signatures(&annotated.signatures),
            reassigned: BTreeSet::new(),
            at: Span::default(),
        };
        let sections = writer.write_module(&annotated.module)?;
        Ok(writer.finish(sections))
    }

    fn write_module(&mut self, module: &Module) -> Emit<Vec<String>> {
        let mut sections = Vec::new();
        if !module.variables.is_empty() {
            for var in &module.variables {
                self.write_variable(var)?;
            }
            sections.push(self.take());
        }
        if self.typed {
            for def in &module.type_defs {
                self.write_type_def(def)?;
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
        for func in &module.functions {
            self.write_function(func, None)?;
            sections.push(self.take());
        }
        if !module.statements.is_empty() {
            self.at = Span::default();
            self.reassigned = assigned_later(&module.statements);
            self.write_stmts(&module.statements)?;
            sections.push(self.take());
        }
        Ok(sections)
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn finish(self, sections: Vec<String>) -> String {
        let mut out = String::new();
        for (module, items) in self.imports.iter() {
            if items.is_empty() {
                out.push_str(&format!("import \"{module}\";\n"));
            } else {
                out.push_str(&format!(
                    "import {{ {} }} from \"{module}\";\n",
                    items.join(", ")
                ));
            }
        }
        for section in sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&section);
        }
        out
    }

    fn pad(&self) -> String {
        " ".repeat(self.indent * self.indent_width)
    }

    fn line(&mut self, text: &str) {
        let pad = self.pad();
        self.output.push_str(&pad);
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn error(&self, node: &str, message: impl Into<String>) -> GenerationError {
        unrenderable(node, self.at, message)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn write_variable(&mut self, var: &Variable) -> Emit {
        self.at = var.span;
        let keyword = if var.constant { "const" } else { "let" };
        let hint = self.annotation(&var.ty);
        match &var.value {
            Some(v) => {
                let value = self.expr(v)?;
                self.line(&format!("{keyword} {}{hint} = {value};", var.name));
            }
            None => self.line(&format!("let {}{hint};", var.name)),
        }
        Ok(())
    }

    fn write_type_def(&mut self, def: &TypeDef) -> Emit {
        if let Some(doc) = &def.doc {
            self.write_doc(doc);
        }
        match &def.kind {
            TypeDefKind::Alias(ty) => {
                let ty = self.type_name(ty);
                self.line(&format!("type {} = {ty};", def.name));
            }
            TypeDefKind::Record(fields) => {
                self.line(&format!("interface {} {{", def.name));
                self.indent += 1;
                for field in fields {
                    let mark = if field.ty.optional { "?" } else { "" };
                    let ty = self.type_name(&field.ty.clone().with_optional(false));
                    self.line(&format!("{}{mark}: {ty};", field.name));
                }
                self.indent -= 1;
                self.line("}");
            }
        }
        Ok(())
    }

    fn write_enum(&mut self, e: &Enum) {
        if self.typed {
            self.line(&format!("enum {} {{", e.name));
            self.indent += 1;
            for variant in &e.variants {
                match &variant.value {
                    Some(lit) => self.line(&format!("{} = {},", variant.name, literal(lit))),
                    None => self.line(&format!("{},", variant.name)),
                }
            }
            self.indent -= 1;
            self.line("}");
            return;
        }
        self.line(&format!("const {} = Object.freeze({{", e.name));
        self.indent += 1;
        let mut next = 0;
        for variant in &e.variants {
            let value = match &variant.value {
                Some(Literal::Int(n)) => {
                    next = n + 1;
                    n.to_string()
                }
                Some(lit) => literal(lit),
                None => {
                    next += 1;
                    (next - 1).to_string()
                }
            };
            self.line(&format!("{}: {value},", variant.name));
        }
        self.indent -= 1;
        self.line("});");
    }

    fn write_class(&mut self, class: &Class) -> Emit {
        self.at = class.span;
        if let Some(doc) = &class.doc {
            self.write_doc(doc);
        }
        match &class.base {
            Some(base) => self.line(&format!(
                "class {} extends {} {{",
                class.name,
                idioms::native_exception(LANG, base)
            )),
            None => self.line(&format!("class {} {{", class.name)),
        }
        self.indent += 1;
        self.env.set_class(Some(&class.name));
        let mut first = true;
        for prop in &class.properties {
            let keyword = if prop.is_static { "static " } else { "" };
            let hint = self.annotation(&prop.ty);
            match &prop.default {
                Some(d) => {
                    let d = self.expr(d)?;
                    self.line(&format!("{keyword}{}{hint} = {d};", prop.name));
                }
                None => self.line(&format!("{keyword}{}{hint};", prop.name)),
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
        self.env.set_class(None);
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn write_function(&mut self, func: &Function, class: Option<&Class>) -> Emit {
        self.at = func.span;
        if let Some(doc) = &func.doc {
            self.write_doc(doc);
        }
        let is_ctor = class.is_some() && func.name == "constructor";
        let mut head = String::new();
        if class.is_some() && func.is_static {
            head.push_str("static ");
        }
        if func.is_async {
            head.push_str("async ");
        }
        if class.is_none() {
            head.push_str("function ");
        }
        head.push_str(&func.name);
        let params = self.params(&func.params)?;
        let ret = if is_ctor {
            String::new()
        } else if self.typed && func.is_async && !func.ret.is_any() {
            format!(": Promise<{}>", self.type_name(&func.ret))
        } else {
            self.annotation(&func.ret)
        };
        self.line(&format!("{head}({params}){ret} {{"));
        self.reassigned = assigned_later(&func.body);
        self.write_body(&func.params, &func.body)?;
        self.line("}");
        Ok(())
    }

    fn params(&mut self, params: &[Param]) -> Emit<String> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            let mut s = String::new();
            if p.variadic {
                s.push_str("...");
            }
            s.push_str(&p.name);
            if p.variadic && self.typed && !p.ty.is_any() {
                s.push_str(&format!(": {}[]", self.element_type(&p.ty)));
            } else if !p.variadic {
                s.push_str(&self.annotation(&p.ty));
            }
            if let Some(d) = &p.default {
                s.push_str(&format!(" = {}", self.expr(d)?));
            }
            out.push(s);
        }
        Ok(out.join(", "))
    }

    /// Function body in its own scope, parameters bound.
    fn write_body(&mut self, params: &[Param], body: &[Stmt]) -> Emit {
        self.env.push_scope();
        self.env.bind_params(params);
        self.indent += 1;
        let result = self.write_stmts(body);
        self.indent -= 1;
        self.env.pop_scope();
        result
    }

    fn write_doc(&mut self, doc: &str) {
        self.line("/**");
        for l in doc.lines() {
            let l = l.replace("*/", "* /");
            if l.is_empty() {
                self.line(" *");
            } else {
                self.line(&format!(" * {l}"));
            }
        }
        self.line(" */");
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// `: T`, or nothing when untyped or unknown.
    fn annotation(&mut self, ty: &Type) -> String {
        if !self.typed || ty.is_any() {
            return String::new();
        }
        format!(": {}", self.type_name(ty))
    }

    fn element_type(&mut self, ty: &Type) -> String {
        let s = self.type_name(ty);
        if ty.optional || matches!(ty.kind, TypeKind::Union(_) | TypeKind::Function { .. }) {
            format!("({s})")
        } else {
            s
        }
    }

    fn type_name(&mut self, ty: &Type) -> String {
        let base = match &ty.kind {
            TypeKind::Any => "any".to_string(),
            TypeKind::Void => "void".to_string(),
            TypeKind::Primitive(Primitive::Int | Primitive::Float) => "number".to_string(),
            TypeKind::Primitive(Primitive::String) => "string".to_string(),
            TypeKind::Primitive(Primitive::Bool) => "boolean".to_string(),
            TypeKind::Primitive(Primitive::Null) => "null".to_string(),
            TypeKind::Named(name) => idioms::native_exception(LANG, name),
            TypeKind::Sequence(t) => format!("{}[]", self.element_type(t)),
            TypeKind::Map(k, v) => {
                let key = if k.is_numeric() { "number" } else { "string" };
                format!("Record<{key}, {}>", self.type_name(v))
            }
            TypeKind::Function { params, ret } => {
                let params: Vec<String> = params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("a{i}: {}", self.type_name(p)))
                    .collect();
                format!("({}) => {}", params.join(", "), self.type_name(ret))
            }
            TypeKind::Union(members) => members
                .iter()
                .map(|m| self.type_name(m))
                .collect::<Vec<_>>()
                .join(" | "),
        };
        if ty.optional && !ty.is_null() {
            format!("{base} | null")
        } else {
            base
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

    /// A braced block body: indented, in its own scope.
    fn write_block(&mut self, body: &[Stmt]) -> Emit {
        self.env.push_scope();
        self.indent += 1;
        let result = self.write_stmts(body);
        self.indent -= 1;
        self.env.pop_scope();
        result
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
                self.line(&format!("{s};"));
            }
            Stmt::Declare { name, ty } => {
                let hint = self.annotation(ty);
                self.line(&format!("let {name}{hint};"));
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
                self.line(&format!("if ({test}) {{"));
                self.write_block(then_body)?;
                for elif in elifs {
                    let test = self.expr(&elif.test)?;
                    self.line(&format!("}} else if ({test}) {{"));
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
                let key = key.as_deref().unwrap_or("_");
                let header = match mode {
                    IterMode::Items if self.env.type_of(iterable).is_map() => {
                        format!("for (const {value} of Object.keys({source})) {{")
                    }
                    IterMode::Items => format!("for (const {value} of {source}) {{"),
                    IterMode::Indexed => {
                        format!("for (const [{key}, {value}] of {source}.entries()) {{")
                    }
                    IterMode::Entries => {
                        format!("for (const [{key}, {value}] of Object.entries({source})) {{")
                    }
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
                    "for (let {var} = {start}; {var} {cmp} {end}; {update}) {{"
                ));
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
                self.env.push_scope();
                let init_s = match init.as_deref() {
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
                self.line(&format!("for ({init_s}; {test}; {update}) {{"));
                self.write_block(body)?;
                self.env.pop_scope();
                self.line("}");
            }
            Stmt::While { test, body } => {
                let test = self.expr(test)?;
                self.line(&format!("while ({test}) {{"));
                self.write_block(body)?;
                self.line("}");
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => self.write_try(body, handlers, finally.as_deref())?,
            Stmt::Throw(e) => {
                let e = self.expr(e)?;
                self.line(&format!("throw {e};"));
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

    /// Render an assignment without the trailing semicolon.
    fn assignment(&mut self, target: &Expr, value: &Expr, ty: &Type, declare: bool) -> Emit<String> {
        let target_s = self.expr(target)?;
        if declare {
            let keyword = match target {
                Expr::Ident(name) if !self.reassigned.contains(name) => "const",
                _ => "let",
            };
            let hint = if ty.is_resolved() && self.env.type_of(value) != *ty {
                self.annotation(ty)
            } else {
                String::new()
            };
            let value = self.expr(value)?;
            return Ok(format!("{keyword} {target_s}{hint} = {value}"));
        }
        if let Expr::Binary { left, op, right } = value
            && **left == *target
            && (op.is_arithmetic() || op.is_bitwise())
            && *op != BinaryOp::FloorDiv
        {
            if *op == BinaryOp::Add && matches!(right.as_ref(), Expr::Literal(Literal::Int(1))) {
                return Ok(format!("{target_s}++"));
            }
            let right = self.expr(right)?;
            return Ok(format!("{target_s} {}= {right}", symbol(*op)));
        }
        let value = self.expr(value)?;
        Ok(format!("{target_s} = {value}"))
    }

    /// Init or update clause of a classic for loop.
    fn clause(&mut self, stmt: &Stmt) -> Emit<String> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                declare,
                ..
            } => {
                // The loop variable is always reassigned by the update clause.
                let s = self.assignment(target, value, &Type::any(), false)?;
                Ok(if *declare { format!("let {s}") } else { s })
            }
            Stmt::Expr(e) => self.expr(e),
            other => Err(self.error(other.kind_name(), "not valid in a for-loop clause")),
        }
    }

    fn write_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Catch],
        finally: Option<&[Stmt]>,
    ) -> Emit {
        self.line("try {");
        self.write_block(body)?;
        let generic = |h: &Catch| h.exception.as_deref().is_none_or(|e| e == "Exception");
        match handlers {
            [] => {}
            [only] if generic(only) => {
                match &only.binding {
                    Some(b) => self.line(&format!("}} catch ({b}) {{")),
                    None => self.line("} catch {"),
                }
                self.write_handler(only.binding.as_deref(), &only.body)?;
            }
            _ => {
                // One catch clause dispatching on the error's class.
                let err = handlers
                    .iter()
                    .find_map(|h| h.binding.clone())
                    .unwrap_or_else(|| "e".to_string());
                self.line(&format!("}} catch ({err}) {{"));
                self.indent += 1;
                let mut opened = false;
                let mut fallback = false;
                for h in handlers {
                    let keyword = if opened { "} else " } else { "" };
                    if generic(h) {
                        if opened {
                            self.line("} else {");
                        } else {
                            self.line("{");
                        }
                        fallback = true;
                    } else {
                        let class = h
                            .exception
                            .as_deref()
                            .map(|e| idioms::native_exception(LANG, e))
                            .unwrap_or_default();
                        self.line(&format!("{keyword}if ({err} instanceof {class}) {{"));
                    }
                    opened = true;
                    self.env.push_scope();
                    if let Some(b) = &h.binding
                        && *b != err
                    {
                        self.indent += 1;
                        self.line(&format!("const {b} = {err};"));
                        self.indent -= 1;
                    }
                    self.write_handler(h.binding.as_deref(), &h.body)?;
                    self.env.pop_scope();
                    if fallback {
                        break;
                    }
                }
                if !fallback {
                    self.line("} else {");
                    self.indent += 1;
                    self.line(&format!("throw {err};"));
                    self.indent -= 1;
                }
                self.line("}");
                self.indent -= 1;
            }
        }
        match finally {
            Some(f) => {
                self.line("} finally {");
                self.write_block(f)?;
            }
            None if handlers.is_empty() => self.line("} finally {"),
            None => {}
        }
        self.line("}");
        Ok(())
    }

    fn write_handler(&mut self, binding: Option<&str>, body: &[Stmt]) -> Emit {
        self.env.push_scope();
        if let Some(b) = binding {
            self.env.declare(b, Type::named("Exception"));
        }
        let result = self.write_block(body);
        self.env.pop_scope();
        result
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
        Ok(match e {
            Expr::Literal(lit) => literal(lit),
            Expr::Ident(name) => name.clone(),
            Expr::This => "this".to_string(),
            Expr::Binary { left, op, right } => self.binary(left, *op, right)?,
            Expr::Unary { op, operand } => {
                let s = self.expr(operand)?;
                let needed = unary_strength(*op, GRAMMAR) + u8::from(*op != UnaryOp::Not);
                let s = wrap(operand, s, needed, GRAMMAR);
                match op {
                    UnaryOp::Neg => format!("-{s}"),
                    UnaryOp::Not => format!("!{s}"),
                    UnaryOp::BitNot => format!("~{s}"),
                }
            }
            Expr::Call { callee, args } => {
                let args = self.exprs(args)?;
                match callee.as_ref() {
                    Expr::Ident(name) if name == "super" => format!("super({args})"),
                    Expr::Lambda(_) => format!("({})({args})", self.expr(callee)?),
                    other => format!("{}({args})", self.atom(other)?),
                }
            }
            Expr::Operation { op, args } => self.operation(*op, args)?,
            Expr::Construct { class, args } => {
                let args = self.exprs(args)?;
                format!("new {}({args})", idioms::native_exception(LANG, class))
            }
            Expr::Member { object, property } => {
                format!("{}.{property}", self.atom(object)?)
            }
            Expr::Index { object, index } => match index.as_ref() {
                Expr::Literal(Literal::Int(n)) if *n < 0 => {
                    format!("{}.at({n})", self.atom(object)?)
                }
                _ => format!("{}[{}]", self.atom(object)?, self.expr(index)?),
            },
            Expr::Array(items) => format!("[{}]", self.exprs(items)?),
            Expr::Map(pairs) if pairs.is_empty() => "{}".to_string(),
            Expr::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = match k {
                        Expr::Literal(Literal::String(s)) if is_identifier(s) => s.clone(),
                        Expr::Literal(Literal::String(_) | Literal::Int(_)) => self.expr(k)?,
                        _ => format!("[{}]", self.expr(k)?),
                    };
                    out.push(format!("{key}: {}", self.expr(v)?));
                }
                format!("{{ {} }}", out.join(", "))
            }
            Expr::Ternary {
                test,
                then,
                otherwise,
            } => {
                let t = self.expr(test)?;
                let a = self.expr(then)?;
                let b = self.expr(otherwise)?;
                format!(
                    "{} ? {} : {}",
                    wrap(test, t, 1, GRAMMAR),
                    wrap(then, a, 1, GRAMMAR),
                    wrap(otherwise, b, 1, GRAMMAR)
                )
            }
            Expr::Lambda(lambda) => self.lambda(lambda)?,
            Expr::Comprehension(c) => self.comprehension(c)?,
            Expr::Await(inner) => format!("await {}", self.atom(inner)?),
            Expr::Format(parts) => {
                let mut out = String::from("`");
                for part in parts {
                    match part {
                        FormatPart::Text(t) => out.push_str(&template_escape(t)),
                        FormatPart::Expr(e) => {
                            out.push_str("${");
                            out.push_str(&self.expr(e)?);
                            out.push('}');
                        }
                    }
                }
                out.push('`');
                out
            }
        })
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Emit<String> {
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        if op == BinaryOp::FloorDiv {
            let (l, r) = binary_operands(BinaryOp::Div, (left, l), (right, r), GRAMMAR);
            return Ok(format!("Math.floor({l} / {r})"));
        }
        let (mut l, r) = binary_operands(op, (left, l), (right, r), GRAMMAR);
        // `-a ** b` is a syntax error.
        if op == BinaryOp::Pow && l.starts_with(['-', '!', '~']) {
            l = format!("({l})");
        }
        Ok(format!("{l} {} {r}", symbol(op)))
    }

    fn operation(&mut self, op: Op, args: &[Expr]) -> Emit<String> {
        let receiver = args
            .first()
            .map(|a| Receiver::of(&self.env.type_of(a)))
            .unwrap_or(Receiver::Any);
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push((a, self.expr(a)?));
        }
        render_op(op, LANG, receiver, &rendered, GRAMMAR, &mut self.imports).ok_or_else(|| {
            self.error(
                "operation",
                format!("no TypeScript form for {}", op.name()),
            )
        })
    }

    fn lambda(&mut self, lambda: &Lambda) -> Emit<String> {
        let params = self.params(&lambda.params)?;
        let prefix = if lambda.is_async { "async " } else { "" };
        self.env.push_scope();
        self.env.bind_params(&lambda.params);
        let body = match &lambda.body {
            LambdaBody::Expr(body) => self.expr(body).map(|b| match body.as_ref() {
                Expr::Map(_) => format!("({b})"),
                _ => b,
            }),
            LambdaBody::Block(stmts) => {
                let saved = self.take();
                let saved_reassigned =
                    std::mem::replace(&mut self.reassigned, assigned_later(stmts));
                self.indent += 1;
                let result = self.write_stmts(stmts);
                self.indent -= 1;
                self.reassigned = saved_reassigned;
                let inner = std::mem::replace(&mut self.output, saved);
                result.map(|()| format!("{{\n{inner}{}}}", self.pad()))
            }
        };
        self.env.pop_scope();
        Ok(format!("{prefix}({params}) => {}", body?))
    }

    fn comprehension(&mut self, c: &Comprehension) -> Emit<String> {
        let source = self.atom(&c.source)?;
        self.env.push_scope();
        let element = self.env.type_of(&c.source).element();
        self.env.declare(&c.var, element);
        let parts = self.comprehension_parts(c);
        self.env.pop_scope();
        let (key, transform, filter) = parts?;
        let var = &c.var;
        let mut chain = source;
        if let Some(f) = filter {
            chain.push_str(&format!(".filter(({var}) => {f})"));
        }
        Ok(match (c.kind, key) {
            (ComprehensionKind::Map, Some(key)) => {
                chain.push_str(&format!(".map(({var}) => [{key}, {transform}])"));
                format!("Object.fromEntries({chain})")
            }
            (kind, _) => {
                if !is_identity(c) {
                    chain.push_str(&format!(".map(({var}) => {transform})"));
                }
                if kind == ComprehensionKind::Set {
                    format!("new Set({chain})")
                } else {
                    chain
                }
            }
        })
    }

    fn comprehension_parts(
        &mut self,
        c: &Comprehension,
    ) -> Emit<(Option<String>, String, Option<String>)> {
        let key = match &c.key {
            Some(k) => Some(self.expr(k)?),
            None => None,
        };
        let transform = match &c.transform {
            t @ Expr::Map(_) => format!("({})", self.expr(t)?),
            t => self.expr(t)?,
        };
        let filter = match &c.filter {
            Some(f) => Some(self.expr(f)?),
            None => None,
        };
        Ok((key, transform, filter))
    }
}

/// Names assigned after their declaring assignment; they need `let`.
fn assigned_later(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    visit::walk_stmts(stmts, &mut |stmt| {
        if let Stmt::Assign {
            target: Expr::Ident(name),
            declare: false,
            ..
        } = stmt
        {
            out.insert(name.clone());
        }
    });
    out
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "===",
        BinaryOp::Ne => "!==",
        BinaryOp::Div | BinaryOp::FloorDiv => "/",
        other => other.c_symbol(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.is_nan() => "NaN".to_string(),
        Literal::Float(f) if f.is_infinite() => {
            if *f < 0.0 { "-Infinity" } else { "Infinity" }.to_string()
        }
        Literal::Float(f) => float_literal(*f),
        Literal::String(s) => format!("\"{}\"", escape_string(s, unicode_escape)),
    }
}

/// Escape text for a template literal.
fn template_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::infer::infer;

    fn emit_as(module: Module, typed: bool) -> String {
        let annotated = infer(module, &InferenceConfig::default());
        TypeScriptWriter::emit(&annotated, &TranslateConfig::default(), typed).unwrap()
    }

    fn emit(module: Module) -> String {
        emit_as(module, true)
    }

    fn script(stmts: Vec<Stmt>) -> Module {
        let mut module = Module::new("main");
        module.statements = stmts;
        module
    }

    fn add_function() -> Function {
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
        .unwrap()
    }

    #[test]
    fn test_function_typed() {
        let mut module = Module::new("main");
        module.functions.push(add_function());
        insta::assert_snapshot!(emit(module), @r"
        function add(a: number, b: number): number {
          return a + b;
        }
        ");
    }

    #[test]
    fn test_function_untyped() {
        let mut module = Module::new("main");
        module.functions.push(add_function());
        let output = emit_as(module, false);
        assert!(output.starts_with("function add(a, b) {"));
    }

    #[test]
    fn test_const_and_let() {
        let output = emit(script(vec![
            Stmt::declare("x", Expr::int(1)),
            Stmt::declare("y", Expr::int(2)),
            Stmt::assign(
                Expr::ident("y"),
                Expr::binary(Expr::ident("y"), BinaryOp::Mul, Expr::int(3)),
            ),
        ]));
        assert!(output.contains("const x = 1;"));
        assert!(output.contains("let y = 2;"));
        assert!(output.contains("y *= 3;"));
    }

    #[test]
    fn test_comprehension_becomes_chain() {
        let c = Comprehension::builder("x")
            .source(Expr::ident("xs"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .filter(Some(Expr::binary(Expr::ident("x"), BinaryOp::Gt, Expr::int(0))))
            .build()
            .unwrap();
        let output = emit(script(vec![Stmt::declare(
            "out",
            Expr::Comprehension(Box::new(c)),
        )]));
        assert!(output.contains("const out = xs.filter((x) => x > 0).map((x) => x * 2);"));
    }

    #[test]
    fn test_range_loop() {
        let output = emit(script(vec![Stmt::ForRange {
            var: "i".into(),
            start: Expr::int(0),
            end: Expr::int(10),
            step: None,
            body: vec![Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("i")]))],
        }]));
        insta::assert_snapshot!(output, @r"
        for (let i = 0; i < 10; i++) {
          console.log(i);
        }
        ");
    }

    #[test]
    fn test_floor_div_and_pow() {
        let output = emit(script(vec![
            Stmt::declare(
                "q",
                Expr::binary(Expr::ident("a"), BinaryOp::FloorDiv, Expr::ident("b")),
            ),
            Stmt::declare(
                "p",
                Expr::binary(
                    Expr::unary(UnaryOp::Neg, Expr::ident("a")),
                    BinaryOp::Pow,
                    Expr::int(2),
                ),
            ),
        ]));
        assert!(output.contains("const q = Math.floor(a / b);"));
        assert!(output.contains("const p = (-a) ** 2;"));
    }

    #[test]
    fn test_typed_catch_dispatch() {
        let output = emit(script(vec![Stmt::Try {
            body: vec![Stmt::expr(Expr::call(Expr::ident("run"), vec![]))],
            handlers: vec![Catch {
                exception: Some("TypeError".into()),
                binding: Some("err".into()),
                body: vec![Stmt::Throw(Expr::ident("err"))],
            }],
            finally: None,
        }]));
        insta::assert_snapshot!(output, @r"
        try {
          run();
        } catch (err) {
          if (err instanceof TypeError) {
            throw err;
          } else {
            throw err;
          }
        }
        ");
    }

    #[test]
    fn test_template_literal() {
        let output = emit(script(vec![Stmt::expr(Expr::op(
            Op::Print,
            vec![Expr::Format(vec![
                FormatPart::Text("`n` = ".into()),
                FormatPart::Expr(Expr::ident("n")),
            ])],
        ))]));
        assert_eq!(output.trim(), "console.log(`\\`n\\` = ${n}`);");
    }

    #[test]
    fn test_enum_in_javascript() {
        let mut module = Module::new("main");
        module.enums.push(Enum {
            name: "Color".into(),
            variants: vec![
                EnumVariant {
                    name: "Red".into(),
                    value: None,
                },
                EnumVariant {
                    name: "Green".into(),
                    value: Some(Literal::Int(5)),
                },
                EnumVariant {
                    name: "Blue".into(),
                    value: None,
                },
            ],
        });
        insta::assert_snapshot!(emit_as(module, false), @r"
        const Color = Object.freeze({
          Red: 0,
          Green: 5,
          Blue: 6,
        });
        ");
    }
}
