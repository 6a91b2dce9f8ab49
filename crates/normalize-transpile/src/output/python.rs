//! Python writer.
//!
//! Emits annotated IR as Python 3.10+ source. Comprehensions, f-strings and
//! `try`/`except` map one-to-one; three-clause loops become `while` loops.

use super::{
    Grammar, binary_operands, bind_stmt, classes_in_base_order, continues_loop, escape_string,
    float_literal, is_super_call, marker_lines, render_op, unary_strength, unicode_escape,
    unrenderable, wrap,
};
use crate::config::TranslateConfig;
use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::{AnnotatedModule, TypeEnv};
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Writer;

/// Static instance of the Python writer for registry.
pub static PYTHON_WRITER: PythonWriterImpl = PythonWriterImpl;

/// Python writer implementing the Writer trait.
pub struct PythonWriterImpl;

impl Writer for PythonWriterImpl {
    fn language(&self) -> Language {
        Language::Python
    }

    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError> {
        PythonWriter::emit(module, config)
    }
}

type Emit<T = ()> = Result<T, GenerationError>;

const GRAMMAR: Grammar = Grammar::Python;

/// Emits IR as Python source code.
pub struct PythonWriter<'m> {
    output: String,
    indent: usize,
    /// Non-comment lines written so far; an empty block needs `pass`.
    code_lines: usize,
    imports: ImportSet,
    env: TypeEnv<'m>,
    module: &'m Module,
    type_hints: bool,
    at: Span,
}

impl<'m> PythonWriter<'m> {
    /// Emit a module to Python source.
    pub fn emit(annotated: &'m AnnotatedModule, config: &TranslateConfig) -> Emit<String> {
        let mut writer = Self {
            output: String::new(),
            indent: 0,
            code_lines: 0,
            imports: ImportSet::new(),
            env: TypeEnv::with_signatures(&annotated.signatures),
            module: &annotated.module,
            type_hints: config.python.type_hints,
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
            self.write_type_def(def)?;
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
            self.write_function(func, false)?;
            sections.push(self.take());
        }
        if !module.statements.is_empty() {
            self.at = Span::default();
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
                out.push_str(&format!("import {module}\n"));
            } else {
                out.push_str(&format!("from {module} import {}\n", items.join(", ")));
            }
        }
        for section in sections {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&section);
        }
        out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(text);
        self.output.push('\n');
        if !text.starts_with('#') {
            self.code_lines += 1;
        }
    }

    fn error(&self, node: &str, message: impl Into<String>) -> GenerationError {
        unrenderable(node, self.at, message)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn write_variable(&mut self, var: &Variable) -> Emit {
        self.at = var.span;
        let value = match &var.value {
            Some(v) => self.expr(v)?,
            None => "None".to_string(),
        };
        let inferred = var
            .value
            .as_ref()
            .map(|v| self.env.type_of(v))
            .unwrap_or_else(Type::null);
        let hint = if var.ty != inferred && var.ty.is_resolved() {
            self.hint(&var.ty)
        } else {
            None
        };
        match hint {
            Some(t) => self.line(&format!("{}: {t} = {value}", var.name)),
            None => self.line(&format!("{} = {value}", var.name)),
        }
        Ok(())
    }

    fn write_type_def(&mut self, def: &TypeDef) -> Emit {
        match &def.kind {
            TypeDefKind::Alias(ty) => {
                let ty = self.type_name(ty);
                self.line(&format!("{} = {ty}", def.name));
            }
            TypeDefKind::Record(fields) => {
                self.imports.add("dataclasses:dataclass");
                self.line("@dataclass");
                self.line(&format!("class {}:", def.name));
                self.indent += 1;
                let start = self.code_lines;
                if let Some(doc) = &def.doc {
                    self.write_doc(doc);
                }
                for field in fields {
                    let ty = self.type_name(&field.ty);
                    let default = match &field.default {
                        Some(d @ (Expr::Array(_) | Expr::Map(_))) => {
                            self.imports.add("dataclasses:field");
                            format!(" = field(default_factory=lambda: {})", self.expr(d)?)
                        }
                        Some(d) => format!(" = {}", self.expr(d)?),
                        None => String::new(),
                    };
                    self.line(&format!("{}: {ty}{default}", field.name));
                }
                if self.code_lines == start {
                    self.line("pass");
                }
                self.indent -= 1;
            }
        }
        Ok(())
    }

    fn write_enum(&mut self, e: &Enum) {
        self.imports.add("enum:Enum");
        self.line(&format!("class {}(Enum):", e.name));
        self.indent += 1;
        if e.variants.is_empty() {
            self.line("pass");
        }
        for variant in &e.variants {
            let value = match &variant.value {
                Some(lit) => literal(lit),
                None => {
                    self.imports.add("enum:auto");
                    "auto()".to_string()
                }
            };
            self.line(&format!("{} = {value}", variant.name));
        }
        self.indent -= 1;
    }

    fn write_class(&mut self, class: &Class) -> Emit {
        self.at = class.span;
        let mut bases: Vec<String> = class
            .base
            .iter()
            .map(|b| idioms::native_exception(Language::Python, b))
            .collect();
        bases.extend(class.capabilities.iter().cloned());
        if bases.is_empty() {
            self.line(&format!("class {}:", class.name));
        } else {
            self.line(&format!("class {}({}):", class.name, bases.join(", ")));
        }
        self.indent += 1;
        self.env.set_class(Some(&class.name));
        let start = self.code_lines;
        if let Some(doc) = &class.doc {
            self.write_doc(doc);
        }

        // Members copied from a mixin stay with the mixin, which is a base here.
        let own = |p: &&Property| p.provenance.is_none();
        for prop in class.properties.iter().filter(own) {
            if prop.is_static {
                let value = match &prop.default {
                    Some(d) => self.expr(d)?,
                    None => "None".to_string(),
                };
                self.line(&format!("{} = {value}", prop.name));
            } else if self.type_hints {
                let ty = self.type_name(&prop.ty);
                self.line(&format!("{}: {ty}", prop.name));
            }
        }

        let mut first_member = self.code_lines == start;
        let mut separate = |w: &mut Self| {
            if !first_member {
                w.output.push('\n');
            }
            first_member = false;
        };

        let defaults: Vec<Stmt> = class
            .properties
            .iter()
            .filter(|p| !p.is_static && p.provenance.is_none())
            .filter_map(|p| {
                let value = p.default.clone()?;
                Some(Stmt::assign(Expr::member(Expr::This, p.name.clone()), value))
            })
            .collect();
        if class.constructor().is_some() || !defaults.is_empty() {
            let mut ctor = match class.constructor() {
                Some(c) => c.clone(),
                None => Function::new("constructor", Vec::new(), Type::void(), Vec::new())
                    .map_err(|e| self.error("constructor", e.to_string()))?,
            };
            let at = usize::from(ctor.body.first().is_some_and(is_super_call));
            ctor.body.splice(at..at, defaults);
            separate(self);
            self.write_function(&ctor, true)?;
        }
        for method in class.methods.iter().filter(|m| m.provenance.is_none()) {
            separate(self);
            self.write_function(method, true)?;
        }
        if self.code_lines == start {
            self.line("pass");
        }
        self.env.set_class(None);
        self.indent -= 1;
        Ok(())
    }

    fn write_function(&mut self, func: &Function, is_method: bool) -> Emit {
        self.at = func.span;
        let name = if is_method && func.name == "constructor" {
            "__init__"
        } else {
            func.name.as_str()
        };
        if is_method && func.is_static {
            self.line("@staticmethod");
        }
        let receiver = (is_method && !func.is_static).then_some("self");
        let ret = if name == "__init__" {
            None
        } else {
            Some(&func.ret)
        };
        self.write_def(
            name,
            receiver,
            &func.params,
            ret,
            func.is_async,
            func.doc.as_deref(),
            &func.body,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn write_def(
        &mut self,
        name: &str,
        receiver: Option<&str>,
        params: &[Param],
        ret: Option<&Type>,
        is_async: bool,
        doc: Option<&str>,
        body: &[Stmt],
    ) -> Emit {
        let mut rendered: Vec<String> = receiver.map(str::to_string).into_iter().collect();
        for p in params {
            rendered.push(self.param(p)?);
        }
        let ret = match ret {
            Some(t) if t.is_void() && self.type_hints => " -> None".to_string(),
            Some(t) => self.hint(t).map(|t| format!(" -> {t}")).unwrap_or_default(),
            None => String::new(),
        };
        let keyword = if is_async { "async def" } else { "def" };
        self.line(&format!("{keyword} {name}({}){ret}:", rendered.join(", ")));

        self.env.push_scope();
        self.env.bind_params(params);
        self.indent += 1;
        let start = self.code_lines;
        if let Some(doc) = doc {
            self.write_doc(doc);
        }
        let result = self.write_stmts(body);
        if self.code_lines == start {
            self.line("pass");
        }
        self.indent -= 1;
        self.env.pop_scope();
        result
    }

    fn param(&mut self, p: &Param) -> Emit<String> {
        let star = if p.variadic { "*" } else { "" };
        let mut out = format!("{star}{}", p.name);
        if let Some(t) = self.hint(&p.ty) {
            out.push_str(&format!(": {t}"));
        }
        if let Some(d) = &p.default {
            let d = self.expr(d)?;
            // PEP 8 spacing differs with and without an annotation.
            if out.contains(':') {
                out.push_str(&format!(" = {d}"));
            } else {
                out.push_str(&format!("={d}"));
            }
        }
        Ok(out)
    }

    fn write_doc(&mut self, doc: &str) {
        let doc = doc.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
        let mut lines = doc.lines();
        match (lines.next(), lines.next()) {
            (Some(only), None) => self.line(&format!("\"\"\"{only}\"\"\"")),
            (first, Some(second)) => {
                self.line(&format!("\"\"\"{}", first.unwrap_or_default()));
                self.line(second);
                for l in lines {
                    self.line(l);
                }
                self.line("\"\"\"");
            }
            (None, None) => {}
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Annotation text, or `None` when hints are off or nothing is known.
    fn hint(&mut self, ty: &Type) -> Option<String> {
        (self.type_hints && !ty.is_any()).then(|| self.type_name(ty))
    }

    fn type_name(&mut self, ty: &Type) -> String {
        let base = match &ty.kind {
            TypeKind::Any => {
                self.imports.add("typing:Any");
                "Any".to_string()
            }
            TypeKind::Void | TypeKind::Primitive(Primitive::Null) => "None".to_string(),
            TypeKind::Primitive(Primitive::Int) => "int".to_string(),
            TypeKind::Primitive(Primitive::Float) => "float".to_string(),
            TypeKind::Primitive(Primitive::String) => "str".to_string(),
            TypeKind::Primitive(Primitive::Bool) => "bool".to_string(),
            TypeKind::Named(name) => {
                let module = self.module;
                if module.is_class(name)
                    || module.type_defs.iter().any(|d| d.name == *name)
                    || module.enums.iter().any(|e| e.name == *name)
                {
                    self.imports.add("__future__:annotations");
                }
                idioms::native_exception(Language::Python, name)
            }
            TypeKind::Sequence(t) => format!("list[{}]", self.type_name(t)),
            TypeKind::Map(k, v) => format!("dict[{}, {}]", self.type_name(k), self.type_name(v)),
            TypeKind::Function { params, ret } => {
                self.imports.add("typing:Callable");
                let params: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                let ret = if ret.is_void() {
                    "None".to_string()
                } else {
                    self.type_name(ret)
                };
                format!("Callable[[{}], {ret}]", params.join(", "))
            }
            TypeKind::Union(members) => members
                .iter()
                .map(|m| self.type_name(m))
                .collect::<Vec<_>>()
                .join(" | "),
        };
        if ty.optional {
            format!("{base} | None")
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

    fn write_block(&mut self, body: &[Stmt]) -> Emit {
        self.indent += 1;
        let start = self.code_lines;
        let result = self.write_stmts(body);
        if self.code_lines == start {
            self.line("pass");
        }
        self.indent -= 1;
        result
    }

    fn write_stmt(&mut self, stmt: &Stmt) -> Emit {
        match stmt {
            Stmt::Assign { target, value, .. } => self.write_assign(target, value)?,
            Stmt::Declare { .. } => {}
            Stmt::Return(None) => self.line("return"),
            Stmt::Return(Some(e)) => {
                let e = self.expr(e)?;
                self.line(&format!("return {e}"));
            }
            Stmt::If {
                test,
                then_body,
                elifs,
                else_body,
            } => {
                let test = self.expr(test)?;
                self.line(&format!("if {test}:"));
                self.write_block(then_body)?;
                for elif in elifs {
                    let test = self.expr(&elif.test)?;
                    self.line(&format!("elif {test}:"));
                    self.write_block(&elif.body)?;
                }
                if let Some(else_body) = else_body {
                    self.line("else:");
                    self.write_block(else_body)?;
                }
            }
            Stmt::ForEach {
                mode,
                key,
                value,
                iterable,
                body,
            } => {
                let source = self.expr(iterable)?;
                let source = wrap(iterable, source, 1, GRAMMAR);
                let key = key.as_deref().unwrap_or("_");
                let header = match mode {
                    IterMode::Items => format!("for {value} in {source}:"),
                    IterMode::Indexed => format!("for {key}, {value} in enumerate({source}):"),
                    IterMode::Entries => {
                        let source = wrap(iterable, source, u8::MAX, GRAMMAR);
                        format!("for {key}, {value} in {source}.items():")
                    }
                };
                self.line(&header);
                self.env.bind_loop(stmt);
                self.write_block(body)?;
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                let end_s = self.expr(end)?;
                let args = match (start, step) {
                    (Expr::Literal(Literal::Int(0)), None) => end_s,
                    (_, None) => format!("{}, {end_s}", self.expr(start)?),
                    (_, Some(step)) => {
                        format!("{}, {end_s}, {}", self.expr(start)?, self.expr(step)?)
                    }
                };
                self.line(&format!("for {var} in range({args}):"));
                self.env.bind_loop(stmt);
                self.write_block(body)?;
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
                        "`continue` would skip the loop update in a Python while loop",
                    ));
                }
                if let Some(init) = init {
                    self.write_stmt(init)?;
                }
                let test = match test {
                    Some(t) => self.expr(t)?,
                    None => "True".to_string(),
                };
                self.line(&format!("while {test}:"));
                self.indent += 1;
                let start = self.code_lines;
                self.write_stmts(body)?;
                if let Some(update) = update {
                    self.write_stmt(update)?;
                }
                if self.code_lines == start {
                    self.line("pass");
                }
                self.indent -= 1;
            }
            Stmt::While { test, body } => {
                let test = self.expr(test)?;
                self.line(&format!("while {test}:"));
                self.write_block(body)?;
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                self.line("try:");
                self.write_block(body)?;
                for handler in handlers {
                    let name = handler
                        .exception
                        .as_deref()
                        .map(|e| idioms::native_exception(Language::Python, e))
                        .unwrap_or_else(|| "Exception".to_string());
                    match &handler.binding {
                        Some(b) => {
                            self.line(&format!("except {name} as {b}:"));
                            self.env.declare(b, Type::named(name));
                        }
                        None => self.line(&format!("except {name}:")),
                    }
                    self.write_block(&handler.body)?;
                }
                match finally {
                    Some(f) => {
                        self.line("finally:");
                        self.write_block(f)?;
                    }
                    None if handlers.is_empty() => {
                        self.line("finally:");
                        self.write_block(&[])?;
                    }
                    None => {}
                }
            }
            Stmt::Throw(e) => {
                let e = self.expr(e)?;
                self.line(&format!("raise {e}"));
            }
            Stmt::Expr(e) => {
                let e = self.expr(e)?;
                self.line(&e);
            }
            Stmt::Break => self.line("break"),
            Stmt::Continue => self.line("continue"),
            Stmt::Pass => self.line("pass"),
            Stmt::Unsupported(marker) => {
                for l in marker_lines(marker) {
                    self.line(&format!("# {l}"));
                }
            }
        }
        bind_stmt(&mut self.env, stmt);
        Ok(())
    }

    fn write_assign(&mut self, target: &Expr, value: &Expr) -> Emit {
        // A named statement-bodied lambda is a nested function.
        if let (Expr::Ident(name), Expr::Lambda(lambda)) = (target, value)
            && let LambdaBody::Block(body) = &lambda.body
        {
            return self.write_def(
                name,
                None,
                &lambda.params,
                None,
                lambda.is_async,
                None,
                body,
            );
        }
        let target_s = self.expr(target)?;
        if let Expr::Binary { left, op, right } = value
            && **left == *target
            && (op.is_arithmetic() || op.is_bitwise())
        {
            let right = self.expr(right)?;
            self.line(&format!("{target_s} {}= {right}", symbol(*op)));
            return Ok(());
        }
        let value = self.expr(value)?;
        self.line(&format!("{target_s} = {value}"));
        Ok(())
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

    /// Render `e` as an atom: parenthesized unless it already is one.
    fn atom(&mut self, e: &Expr) -> Emit<String> {
        let s = self.expr(e)?;
        Ok(wrap(e, s, u8::MAX, GRAMMAR))
    }

    fn expr(&mut self, e: &Expr) -> Emit<String> {
        Ok(match e {
            Expr::Literal(lit) => literal(lit),
            Expr::Ident(name) => name.clone(),
            Expr::This => "self".to_string(),
            Expr::Binary { left, op, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let (l, r) = binary_operands(*op, (left, l), (right, r), GRAMMAR);
                format!("{l} {} {r}", symbol(*op))
            }
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::Not
                    && let Expr::Operation {
                        op: Op::Contains,
                        args,
                    } = operand.as_ref()
                    && let [hay, needle] = &args[..]
                {
                    let h = self.expr(hay)?;
                    let n = self.expr(needle)?;
                    return Ok(format!(
                        "{} not in {}",
                        wrap(needle, n, 5, GRAMMAR),
                        wrap(hay, h, 5, GRAMMAR)
                    ));
                }
                let s = self.expr(operand)?;
                let s = wrap(operand, s, unary_strength(*op, GRAMMAR), GRAMMAR);
                match op {
                    UnaryOp::Neg => format!("-{s}"),
                    UnaryOp::Not => format!("not {s}"),
                    UnaryOp::BitNot => format!("~{s}"),
                }
            }
            Expr::Call { callee, args } => {
                let args = self.exprs(args)?;
                match callee.as_ref() {
                    Expr::Ident(name) if name == "super" => format!("super().__init__({args})"),
                    Expr::Lambda(_) => format!("({})({args})", self.expr(callee)?),
                    other => format!("{}({args})", self.atom(other)?),
                }
            }
            Expr::Operation { op, args } => self.operation(*op, args)?,
            Expr::Construct { class, args } => {
                let args = self.exprs(args)?;
                format!("{}({args})", idioms::native_exception(Language::Python, class))
            }
            Expr::Member { object, property } => match object.as_ref() {
                Expr::Ident(name) if name == "super" => format!("super().{property}"),
                _ => format!("{}.{property}", self.atom(object)?),
            },
            Expr::Index { object, index } => {
                format!("{}[{}]", self.atom(object)?, self.expr(index)?)
            }
            Expr::Array(items) => format!("[{}]", self.exprs(items)?),
            Expr::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push(format!("{}: {}", self.expr(k)?, self.expr(v)?));
                }
                format!("{{{}}}", out.join(", "))
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
                    "{} if {} else {b}",
                    wrap(then, a, 1, GRAMMAR),
                    wrap(test, t, 1, GRAMMAR)
                )
            }
            Expr::Lambda(lambda) => {
                let LambdaBody::Expr(body) = &lambda.body else {
                    return Err(self.error(
                        e.kind_name(),
                        "a Python lambda holds a single expression",
                    ));
                };
                let mut params = Vec::with_capacity(lambda.params.len());
                for p in &lambda.params {
                    let star = if p.variadic { "*" } else { "" };
                    params.push(match &p.default {
                        Some(d) => format!("{star}{}={}", p.name, self.expr(d)?),
                        None => format!("{star}{}", p.name),
                    });
                }
                self.env.push_scope();
                self.env.bind_params(&lambda.params);
                let body = self.expr(body);
                self.env.pop_scope();
                if params.is_empty() {
                    format!("lambda: {}", body?)
                } else {
                    format!("lambda {}: {}", params.join(", "), body?)
                }
            }
            Expr::Comprehension(c) => self.comprehension(c)?,
            Expr::Await(inner) => format!("await {}", self.atom(inner)?),
            Expr::Format(parts) => self.format(parts)?,
        })
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
        render_op(op, Language::Python, receiver, &rendered, GRAMMAR, &mut self.imports)
            .ok_or_else(|| self.error("operation", format!("no Python form for {}", op.name())))
    }

    fn comprehension(&mut self, c: &Comprehension) -> Emit<String> {
        let source = self.expr(&c.source)?;
        let source = wrap(&c.source, source, 1, GRAMMAR);
        self.env.push_scope();
        let element = self.env.type_of(&c.source).element();
        self.env.declare(&c.var, element);
        let parts = self.comprehension_parts(c);
        self.env.pop_scope();
        let (key, transform, filter) = parts?;
        let filter = filter.map(|f| format!(" if {f}")).unwrap_or_default();
        let body = format!("for {} in {source}{filter}", c.var);
        Ok(match (c.kind, key) {
            (ComprehensionKind::Map, Some(key)) => format!("{{{key}: {transform} {body}}}"),
            (ComprehensionKind::Set, _) => format!("{{{transform} {body}}}"),
            (ComprehensionKind::Generator, _) => format!("({transform} {body})"),
            _ => format!("[{transform} {body}]"),
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
        let transform = self.expr(&c.transform)?;
        let filter = match &c.filter {
            Some(f) => {
                let s = self.expr(f)?;
                Some(wrap(f, s, 1, GRAMMAR))
            }
            None => None,
        };
        Ok((key, transform, filter))
    }

    /// An f-string, or `str.format` when an embedded expression cannot sit
    /// inside f-string braces.
    fn format(&mut self, parts: &[FormatPart]) -> Emit<String> {
        let mut rendered = Vec::new();
        for part in parts {
            if let FormatPart::Expr(e) = part {
                rendered.push(self.expr(e)?);
            }
        }
        let fits = rendered
            .iter()
            .all(|r| !r.contains(['"', '\\', '\n', '#', '{', '}', ':', '!']));
        let mut text = String::new();
        let mut values = rendered.into_iter();
        for part in parts {
            match part {
                FormatPart::Text(t) => {
                    let escaped = escape_string(t, unicode_escape);
                    text.push_str(&escaped.replace('{', "{{").replace('}', "}}"));
                }
                FormatPart::Expr(_) if fits => {
                    text.push('{');
                    text.push_str(&values.next().unwrap_or_default());
                    text.push('}');
                }
                FormatPart::Expr(_) => text.push_str("{}"),
            }
        }
        if fits {
            Ok(format!("f\"{text}\""))
        } else {
            let args: Vec<String> = values.collect();
            Ok(format!("\"{text}\".format({})", args.join(", ")))
        }
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        other => other.c_symbol(),
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "None".to_string(),
        Literal::Bool(true) => "True".to_string(),
        Literal::Bool(false) => "False".to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.is_nan() => "float(\"nan\")".to_string(),
        Literal::Float(f) if f.is_infinite() => {
            let sign = if *f < 0.0 { "-" } else { "" };
            format!("float(\"{sign}inf\")")
        }
        Literal::Float(f) => float_literal(*f),
        Literal::String(s) => format!("\"{}\"", escape_string(s, unicode_escape)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::infer::infer;

    fn emit(module: Module) -> String {
        let annotated = infer(module, &InferenceConfig::default());
        PythonWriter::emit(&annotated, &TranslateConfig::default()).unwrap()
    }

    fn script(stmts: Vec<Stmt>) -> Module {
        let mut module = Module::new("main");
        module.statements = stmts;
        module
    }

    #[test]
    fn test_simple_assignment() {
        let output = emit(script(vec![Stmt::declare("x", Expr::int(42))]));
        assert_eq!(output.trim(), "x = 42");
    }

    #[test]
    fn test_function_gets_hints() {
        let mut module = Module::new("main");
        let add = Function::new(
            "add",
            vec![Param::new("a", Type::int()), Param::new("b", Type::int())],
            Type::int(),
            vec![Stmt::return_stmt(Some(Expr::binary(
                Expr::ident("a"),
                BinaryOp::Add,
                Expr::ident("b"),
            )))],
        )
        .unwrap();
        module.functions.push(add);
        insta::assert_snapshot!(emit(module), @r"
        def add(a: int, b: int) -> int:
            return a + b
        ");
    }

    #[test]
    fn test_comprehension_keeps_filter() {
        let c = Comprehension::builder("x")
            .source(Expr::ident("items"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .filter(Some(Expr::binary(Expr::ident("x"), BinaryOp::Gt, Expr::int(0))))
            .build()
            .unwrap();
        let output = emit(script(vec![
            Stmt::declare("items", Expr::Array(vec![Expr::int(1), Expr::int(-2)])),
            Stmt::declare("result", Expr::Comprehension(Box::new(c))),
        ]));
        assert!(output.contains("result = [x * 2 for x in items if x > 0]"));
    }

    #[test]
    fn test_string_escaping() {
        let output = emit(script(vec![Stmt::declare("s", Expr::string("\nHeader\n\"q\""))]));
        assert_eq!(output.trim(), r#"s = "\nHeader\n\"q\"""#);
    }

    #[test]
    fn test_classic_loop_becomes_while() {
        let output = emit(script(vec![Stmt::ForClassic {
            init: Some(Box::new(Stmt::declare("i", Expr::int(0)))),
            test: Some(Expr::binary(Expr::ident("i"), BinaryOp::Lt, Expr::int(10))),
            update: Some(Box::new(Stmt::assign(
                Expr::ident("i"),
                Expr::binary(Expr::ident("i"), BinaryOp::Add, Expr::int(2)),
            ))),
            body: vec![Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("i")]))],
        }]));
        insta::assert_snapshot!(output, @r"
        i = 0
        while i < 10:
            print(i)
            i += 2
        ");
    }

    #[test]
    fn test_continue_in_classic_loop_is_error() {
        let module = script(vec![Stmt::ForClassic {
            init: None,
            test: None,
            update: Some(Box::new(Stmt::expr(Expr::call(Expr::ident("step"), vec![])))),
            body: vec![Stmt::Continue],
        }]);
        let annotated = infer(module, &InferenceConfig::default());
        let err = PythonWriter::emit(&annotated, &TranslateConfig::default()).unwrap_err();
        assert_eq!(err.node, "for");
    }

    #[test]
    fn test_class_with_constructor() {
        let mut class = Class::new("Cache");
        class.properties.push(Property::new("count", Type::int()));
        let ctor = Function::new(
            "constructor",
            vec![],
            Type::void(),
            vec![Stmt::assign(Expr::member(Expr::This, "count"), Expr::int(0))],
        )
        .unwrap();
        class.set_constructor(ctor).unwrap();
        let mut module = Module::new("main");
        module.classes.push(class);
        insta::assert_snapshot!(emit(module), @r"
        class Cache:
            count: int

            def __init__(self):
                self.count = 0
        ");
    }

    #[test]
    fn test_not_in_and_try() {
        let output = emit(script(vec![Stmt::Try {
            body: vec![Stmt::if_stmt(
                Expr::unary(
                    UnaryOp::Not,
                    Expr::op(Op::Contains, vec![Expr::ident("d"), Expr::string("k")]),
                ),
                vec![Stmt::Throw(Expr::Construct {
                    class: "KeyError".into(),
                    args: vec![Expr::string("k")],
                })],
                None,
            )],
            handlers: vec![Catch {
                exception: None,
                binding: Some("e".into()),
                body: vec![Stmt::Pass],
            }],
            finally: None,
        }]));
        assert!(output.contains("if \"k\" not in d:"));
        assert!(output.contains("raise KeyError(\"k\")"));
        assert!(output.contains("except Exception as e:"));
    }

    #[test]
    fn test_format_string() {
        let output = emit(script(vec![Stmt::expr(Expr::op(
            Op::Print,
            vec![Expr::Format(vec![
                FormatPart::Text("n={".into()),
                FormatPart::Expr(Expr::ident("n")),
                FormatPart::Text("}".into()),
            ])],
        ))]));
        assert_eq!(output.trim(), "print(f\"n={{{n}}}\")");
    }

    #[test]
    fn test_unsupported_is_comment() {
        let output = emit(script(vec![Stmt::Unsupported(Unsupported {
            kind: "with".into(),
            text: "with open(p) as f:\n    pass".into(),
            span: Span::new(3, 1),
        })]));
        assert!(output.starts_with("# unsupported with (line 3):\n#   with open(p) as f:"));
    }
}
