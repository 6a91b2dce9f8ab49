//! Go writer.
//!
//! Classes become structs with pointer-receiver methods and a `NewT`
//! constructor; a base class and same-module capabilities are embedded.
//! Top-level statements form `func main`. Constructs Go lacks are lowered:
//! ternaries and comprehensions to immediately-invoked closures, `try` to a
//! closure with `defer`/`recover`, throws to `panic`.

use super::{
    Grammar, binary_operands, bind_stmt, binding_type, classes_in_base_order, escape_string, float_literal,
    is_super_call, map_key, marker_lines, pascal_case, render_op, unary_strength, unicode_escape,
    unrenderable, wrap,
};
use crate::config::TranslateConfig;
use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::{AnnotatedModule, TypeEnv};
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Writer;
use std::collections::HashMap;

/// Static instance of the Go writer for registry.
pub static GO_WRITER: GoWriterImpl = GoWriterImpl;

/// Go writer implementing the Writer trait.
pub struct GoWriterImpl;

impl Writer for GoWriterImpl {
    fn language(&self) -> Language {
        Language::Go
    }

    fn write(
        &self,
        module: &AnnotatedModule,
        config: &TranslateConfig,
    ) -> Result<String, GenerationError> {
        GoWriter::emit(module, config)
    }
}

type Emit<T = ()> = Result<T, GenerationError>;

const GRAMMAR: Grammar = Grammar::Go;

/// The method or constructor being written.
#[derive(Clone)]
struct MethodContext {
    name: String,
    class: String,
    /// Constructor bodies return the receiver on a bare `return`.
    in_constructor: bool,
}

/// Emits IR as Go source code.
pub struct GoWriter<'m> {
    output: String,
    indent: usize,
    imports: ImportSet,
    env: TypeEnv<'m>,
    module: &'m Module,
    package: String,
    receiver: Option<MethodContext>,
    /// Declared result of the function being written.
    ret: Option<Type>,
    /// Result types seen while writing a block-bodied closure.
    returns: Vec<Type>,
    /// Module functions renamed to avoid colliding with `main`.
    renames: HashMap<String, String>,
    at: Span,
}

impl<'m> GoWriter<'m> {
    /// Emit a module to Go source.
    pub fn emit(annotated: &'m AnnotatedModule, config: &TranslateConfig) -> Emit<String> {
        let module = &annotated.module;
        let package = match &config.go.package {
            Some(p) => p.clone(),
            None if !module.statements.is_empty() => "main".to_string(),
            None => package_name(&module.name),
        };
        let mut renames = HashMap::new();
        if !module.statements.is_empty() && module.function("main").is_some() {
            renames.insert("main".to_string(), "runMain".to_string());
        }
        let mut writer = Self {
            output: String::new(),
            indent: 0,
            imports: ImportSet::new(),
            env: TypeEnv::with_signatures(&annotated.signatures),
            module,
            package,
            receiver: None,
            ret: None,
            returns: Vec::new(),
            renames,
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
            let name = self.function_name(&func.name);
            self.write_func(&name, None, func)?;
            sections.push(self.take());
        }
        if !module.statements.is_empty() {
            self.at = Span::default();
            self.ret = None;
            self.line("func main() {");
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
        let mut out = format!("package {}\n", self.package);
        let imports: Vec<&str> = self.imports.iter().map(|(m, _)| m).collect();
        match imports.as_slice() {
            [] => {}
            [one] => out.push_str(&format!("\nimport \"{one}\"\n")),
            many => {
                out.push_str("\nimport (\n");
                for m in many {
                    out.push_str(&format!("\t\"{m}\"\n"));
                }
                out.push_str(")\n");
            }
        }
        for section in sections {
            out.push('\n');
            out.push_str(&section);
        }
        out
    }

    fn pad(&self) -> String {
        "\t".repeat(self.indent)
    }

    fn line(&mut self, text: &str) {
        let pad = self.pad();
        self.output.push_str(&pad);
        self.output.push_str(text);
        self.output.push('\n');
    }

    /// `base`, or `base2`, `base3`, ... when `base` is taken in scope.
    fn fresh_name(&self, base: &str) -> String {
        if !self.env.is_bound(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}{n}"))
            .find(|name| !self.env.is_bound(name))
            .unwrap_or_else(|| base.to_string())
    }

    fn error(&self, node: &str, message: impl Into<String>) -> GenerationError {
        unrenderable(node, self.at, message)
    }

    fn function_name(&self, name: &str) -> String {
        self.renames
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn is_enum(&self, name: &str) -> bool {
        self.module.enums.iter().any(|e| e.name == name)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn write_variable(&mut self, var: &Variable) -> Emit {
        self.at = var.span;
        match &var.value {
            Some(v @ Expr::Literal(lit)) if var.constant && !matches!(lit, Literal::Null) => {
                let value = self.expr(v)?;
                self.line(&format!("const {} = {value}", var.name));
            }
            Some(v) => {
                let value = self.expr_as(v, Some(&var.ty))?;
                self.line(&format!("var {} = {value}", var.name));
            }
            None => {
                let ty = self.type_name(&var.ty);
                self.line(&format!("var {} {ty}", var.name));
            }
        }
        Ok(())
    }

    fn write_type_def(&mut self, def: &TypeDef) {
        if let Some(doc) = &def.doc {
            self.write_doc(&def.name, doc);
        }
        match &def.kind {
            TypeDefKind::Alias(ty) => {
                let ty = self.type_name(ty);
                self.line(&format!("type {} {ty}", def.name));
            }
            // A record of function members is an interface.
            TypeDefKind::Record(fields)
                if !fields.is_empty()
                    && fields
                        .iter()
                        .all(|f| matches!(f.ty.kind, TypeKind::Function { .. })) =>
            {
                self.line(&format!("type {} interface {{", def.name));
                self.indent += 1;
                for f in fields {
                    if let TypeKind::Function { params, ret } = &f.ty.kind {
                        let params: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                        let ret = self.result_type(ret);
                        self.line(&format!("{}({}){ret}", f.name, params.join(", ")));
                    }
                }
                self.indent -= 1;
                self.line("}");
            }
            TypeDefKind::Record(fields) => {
                self.line(&format!("type {} struct {{", def.name));
                self.indent += 1;
                for f in fields {
                    let ty = self.type_name(&f.ty);
                    self.line(&format!("{} {ty}", f.name));
                }
                self.indent -= 1;
                self.line("}");
            }
        }
    }

    fn write_enum(&mut self, e: &Enum) {
        let backing = match e.variants.iter().find_map(|v| v.value.as_ref()) {
            Some(Literal::String(_)) => "string",
            Some(Literal::Float(_)) => "float64",
            _ => "int",
        };
        self.line(&format!("type {} {backing}", e.name));
        self.output.push('\n');
        self.line("const (");
        self.indent += 1;
        let implicit = e.variants.iter().all(|v| v.value.is_none());
        for (i, variant) in e.variants.iter().enumerate() {
            match &variant.value {
                _ if implicit && i == 0 => {
                    self.line(&format!("{} {} = iota", variant.name, e.name));
                }
                _ if implicit => self.line(&variant.name),
                Some(lit) => self.line(&format!("{} {} = {}", variant.name, e.name, literal(lit))),
                None => self.line(&format!("{} {} = {i}", variant.name, e.name)),
            }
        }
        self.indent -= 1;
        self.line(")");
    }

    fn write_doc(&mut self, name: &str, doc: &str) {
        let mut lines = doc.lines();
        if let Some(first) = lines.next() {
            self.line(&format!("// {name} {}", lower_first(first)));
        }
        for l in lines {
            if l.is_empty() {
                self.line("//");
            } else {
                self.line(&format!("// {l}"));
            }
        }
    }

    /// Embedded types: the base, then same-module capabilities.
    fn embedded(&self, class: &Class) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(base) = &class.base
            && !idioms::is_canonical_exception(base)
        {
            out.push(base.clone());
        }
        out.extend(
            class
                .capabilities
                .iter()
                .filter(|c| self.module.is_class(c))
                .cloned(),
        );
        out
    }

    fn write_class(&mut self, class: &Class) -> Emit {
        self.at = class.span;
        if let Some(doc) = &class.doc {
            self.write_doc(&class.name, doc);
        }
        self.line(&format!("type {} struct {{", class.name));
        self.indent += 1;
        for embed in self.embedded(class) {
            self.line(&embed);
        }
        let own = |p: &&Property| p.provenance.is_none();
        for prop in class.properties.iter().filter(own).filter(|p| !p.is_static) {
            let ty = self.type_name(&prop.ty);
            self.line(&format!("{} {ty}", prop.name));
        }
        self.indent -= 1;
        self.line("}");

        for prop in class.properties.iter().filter(own).filter(|p| p.is_static) {
            let name = format!("{}{}", class.name, pascal_case(&prop.name));
            self.output.push('\n');
            match &prop.default {
                Some(d) => {
                    let d = self.expr_as(d, Some(&prop.ty))?;
                    self.line(&format!("var {name} = {d}"));
                }
                None => {
                    let ty = self.type_name(&prop.ty);
                    self.line(&format!("var {name} {ty}"));
                }
            }
        }

        self.env.set_class(Some(&class.name));
        self.output.push('\n');
        self.write_constructor(class)?;
        for method in class.methods.iter().filter(|m| m.provenance.is_none()) {
            self.output.push('\n');
            if method.is_static {
                let name = format!("{}{}", class.name, pascal_case(&method.name));
                self.write_func(&name, None, method)?;
            } else {
                self.write_func(&method.name, Some(class), method)?;
            }
        }
        self.env.set_class(None);
        Ok(())
    }

    fn write_constructor(&mut self, class: &Class) -> Emit {
        let ctor = class.constructor();
        let (params, body): (&[Param], &[Stmt]) = match ctor {
            Some(c) => (&c.params, &c.body),
            None => (&[], &[]),
        };
        if let Some(c) = ctor {
            self.at = c.span;
        }
        let rendered = self.params(params)?;
        self.line(&format!(
            "func New{}({rendered}) *{} {{",
            class.name, class.name
        ));
        let recv = match ctor {
            Some(c) => receiver_name(&class.name, c),
            None => receiver_initial(&class.name),
        };
        self.receiver = Some(MethodContext {
            name: recv.clone(),
            class: class.name.clone(),
            in_constructor: true,
        });
        self.ret = Some(Type::named(class.name.clone()));
        self.env.push_scope();
        self.env.bind_params(params);
        self.indent += 1;

        let mut fields: Vec<(String, Expr)> = class
            .properties
            .iter()
            .filter(|p| !p.is_static && p.provenance.is_none())
            .filter_map(|p| Some((p.name.clone(), p.default.clone()?)))
            .collect();
        let result = match literal_constructor(body) {
            Some((prefix, assigned)) => {
                for (name, value) in assigned {
                    match fields.iter_mut().find(|(n, _)| *n == name) {
                        Some(slot) => slot.1 = value,
                        None => fields.push((name, value)),
                    }
                }
                self.write_stmts(prefix).and_then(|()| {
                    let literal = self.struct_literal(class, &fields)?;
                    self.line(&format!("return &{literal}"));
                    Ok(())
                })
            }
            None => self.struct_literal(class, &fields).and_then(|literal| {
                self.line(&format!("{recv} := &{literal}"));
                self.write_stmts(body)?;
                if !matches!(body.last(), Some(Stmt::Return(_))) {
                    self.line(&format!("return {recv}"));
                }
                Ok(())
            }),
        };

        self.indent -= 1;
        self.env.pop_scope();
        self.receiver = None;
        self.ret = None;
        result?;
        self.line("}");
        Ok(())
    }

    /// `T{field: value, ...}`, typing each value by its property.
    fn struct_literal(&mut self, class: &Class, fields: &[(String, Expr)]) -> Emit<String> {
        let mut parts = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let ty = class.property(name).map(|p| p.ty.clone());
            parts.push(format!("{name}: {}", self.expr_as(value, ty.as_ref())?));
        }
        Ok(format!("{}{{{}}}", class.name, parts.join(", ")))
    }

    fn write_func(&mut self, name: &str, class: Option<&Class>, func: &Function) -> Emit {
        self.at = func.span;
        if let Some(doc) = &func.doc {
            self.write_doc(name, doc);
        }
        let params = self.params(&func.params)?;
        let ret = self.result_type(&func.ret);
        match class {
            Some(class) => {
                let recv = receiver_name(&class.name, func);
                self.line(&format!(
                    "func ({recv} *{}) {name}({params}){ret} {{",
                    class.name
                ));
                self.receiver = Some(MethodContext {
                    name: recv,
                    class: class.name.clone(),
                    in_constructor: false,
                });
            }
            None => self.line(&format!("func {name}({params}){ret} {{")),
        }
        self.ret = Some(func.ret.clone());
        self.env.push_scope();
        self.env.bind_params(&func.params);
        self.indent += 1;
        let result = self.write_stmts(&func.body);
        self.indent -= 1;
        self.env.pop_scope();
        self.receiver = None;
        self.ret = None;
        result?;
        self.line("}");
        Ok(())
    }

    fn params(&mut self, params: &[Param]) -> Emit<String> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            let ty = self.type_name(&p.ty);
            if p.variadic {
                out.push(format!("{} ...{ty}", p.name));
            } else {
                out.push(format!("{} {ty}", p.name));
            }
        }
        Ok(out.join(", "))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// ` T` after a parameter list, or nothing for void.
    fn result_type(&self, ty: &Type) -> String {
        if ty.is_void() {
            String::new()
        } else {
            format!(" {}", self.type_name(ty))
        }
    }

    fn type_name(&self, ty: &Type) -> String {
        let scalar = matches!(ty.kind, TypeKind::Primitive(p) if p != Primitive::Null);
        if ty.optional && scalar {
            return "any".to_string();
        }
        match &ty.kind {
            TypeKind::Any | TypeKind::Void | TypeKind::Union(_) => "any".to_string(),
            TypeKind::Primitive(Primitive::Null) => "any".to_string(),
            TypeKind::Primitive(Primitive::Int) => "int".to_string(),
            TypeKind::Primitive(Primitive::Float) => "float64".to_string(),
            TypeKind::Primitive(Primitive::String) => "string".to_string(),
            TypeKind::Primitive(Primitive::Bool) => "bool".to_string(),
            TypeKind::Named(name) if self.module.is_class(name) => format!("*{name}"),
            TypeKind::Named(name) if idioms::is_canonical_exception(name) => "error".to_string(),
            TypeKind::Named(name) => name.clone(),
            TypeKind::Sequence(t) => format!("[]{}", self.type_name(t)),
            TypeKind::Map(k, v) => {
                format!("map[{}]{}", self.type_name(&map_key(k)), self.type_name(v))
            }
            TypeKind::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(|p| self.type_name(p)).collect();
                format!("func({}){}", params.join(", "), self.result_type(ret))
            }
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

    fn write_stmt(&mut self, stmt: &Stmt) -> Emit {
        match stmt {
            Stmt::Assign {
                target: Expr::Ident(name),
                value: Expr::Comprehension(c),
                ty,
                declare,
            } => {
                let value = Expr::Comprehension(c.clone());
                let ty = binding_type(&self.env, ty, Some(&value));
                self.write_hoisted(c, name, &ty, *declare)?;
            }
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
                let ty = self.type_name(ty);
                self.line(&format!("var {name} {ty}"));
            }
            Stmt::Return(None) => match &self.receiver {
                Some(r) if r.in_constructor => {
                    let name = r.name.clone();
                    self.line(&format!("return {name}"));
                }
                _ => self.line("return"),
            },
            Stmt::Return(Some(e @ Expr::Comprehension(c))) => {
                let ty = self.env.type_of(e);
                self.returns.push(ty.clone());
                let acc = self.fresh_name("out");
                self.write_hoisted(c, &acc, &ty, true)?;
                self.line(&format!("return {acc}"));
            }
            Stmt::Return(Some(e)) => {
                self.returns.push(self.env.type_of(e));
                let expected = self.ret.clone();
                let e = self.expr_as(e, expected.as_ref())?;
                self.line(&format!("return {e}"));
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
                let source = self.expr(iterable)?;
                let source_ty = self.env.type_of(iterable);
                let key = key.as_deref().unwrap_or("_");
                let header = match mode {
                    IterMode::Items if source_ty.is_map() => {
                        format!("for {value} := range {source} {{")
                    }
                    IterMode::Items if source_ty.is_string() => {
                        self.imports.add("strings");
                        format!("for _, {value} := range strings.Split({source}, \"\") {{")
                    }
                    IterMode::Items => format!("for _, {value} := range {source} {{"),
                    IterMode::Indexed | IterMode::Entries => {
                        format!("for {key}, {value} := range {source} {{")
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
                    "for {var} := {start}; {var} {cmp} {end}; {update} {{"
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
                let header = match (init_s.is_empty() && update.is_empty(), test.is_empty()) {
                    (true, true) => "for {".to_string(),
                    (true, false) => format!("for {test} {{"),
                    (false, _) => format!("for {init_s}; {test}; {update} {{"),
                };
                self.line(&header);
                self.write_block(body)?;
                self.env.pop_scope();
                self.line("}");
            }
            Stmt::While { test, body } => {
                match test {
                    Expr::Literal(Literal::Bool(true)) => self.line("for {"),
                    _ => {
                        let test = self.expr(test)?;
                        self.line(&format!("for {test} {{"));
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
                let e = self.panic_value(e)?;
                self.line(&format!("panic({e})"));
            }
            Stmt::Expr(e) if is_super_call(stmt) => self.write_super_call(e)?,
            Stmt::Expr(e) => {
                let e = self.expr(e)?;
                self.line(&e);
            }
            Stmt::Break => self.line("break"),
            Stmt::Continue => self.line("continue"),
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
        let target_s = self.expr(target)?;
        if declare {
            let needs_type = matches!(value, Expr::Literal(Literal::Null))
                || (ty.is_resolved() && self.env.type_of(value) != *ty && !ty.is_any());
            if needs_type {
                let go_ty = self.type_name(ty);
                let value = self.expr_as(value, Some(ty))?;
                return Ok(format!("var {target_s} {go_ty} = {value}"));
            }
            let value = self.expr_as(value, Some(ty))?;
            return Ok(format!("{target_s} := {value}"));
        }
        if let Expr::Binary { left, op, right } = value
            && **left == *target
            && matches!(
                op,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod
            )
            && self.env.type_of(left).is_numeric() == self.env.type_of(right).is_numeric()
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
            if !(*op == BinaryOp::Mod && self.env.type_of(left).is_float()) {
                let right = self.expr(right)?;
                return Ok(format!("{target_s} {}= {right}", op.c_symbol()));
            }
        }
        let expected = match target {
            Expr::Ident(name) => self.env.lookup(name).cloned(),
            _ => None,
        };
        let value = self.expr_as(value, expected.as_ref())?;
        Ok(format!("{target_s} = {value}"))
    }

    fn clause(&mut self, stmt: &Stmt) -> Emit<String> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                ty,
                declare,
            } => {
                let s = self.assignment(target, value, ty, *declare)?;
                if s.starts_with("var ") {
                    Err(self.error(stmt.kind_name(), "typed declaration in a loop header"))
                } else {
                    Ok(s)
                }
            }
            Stmt::Expr(e) => self.expr(e),
            other => Err(self.error(other.kind_name(), "not valid in a for-loop clause")),
        }
    }

    /// `super(args)` in a constructor re-initializes the embedded base.
    fn write_super_call(&mut self, call: &Expr) -> Emit {
        let Expr::Call { args, .. } = call else {
            return Ok(());
        };
        let base = self
            .receiver
            .as_ref()
            .and_then(|r| self.module.class(&r.class))
            .and_then(|c| c.base.clone());
        let recv = self.receiver.as_ref().map(|r| r.name.clone());
        match (base, recv) {
            (Some(base), Some(recv)) if self.module.is_class(&base) => {
                let module = self.module;
                let args = self.call_args(module.class(&base).and_then(Class::constructor), args)?;
                self.line(&format!("{recv}.{base} = *New{base}({args})"));
            }
            _ => {
                let args = self.exprs(args)?;
                self.line(&format!("// base constructor call dropped: super({args})"));
            }
        }
        Ok(())
    }

    /// Go has no exceptions: the body runs in a closure whose deferred
    /// `recover` runs the first handler.
    fn write_try(
        &mut self,
        stmt: &Stmt,
        body: &[Stmt],
        handlers: &[Catch],
        finally: Option<&[Stmt]>,
    ) -> Emit {
        let escapes = |stmts: &[Stmt]| {
            visit::any_stmt(stmts, |s| matches!(s, Stmt::Return(_)))
                || escapes_loop(stmts)
        };
        if escapes(body)
            || handlers.iter().any(|h| escapes(&h.body))
            || finally.is_some_and(escapes)
        {
            return Err(self.error(
                stmt.kind_name(),
                "control flow leaving a try block cannot cross the Go closure",
            ));
        }
        self.line("func() {");
        self.indent += 1;
        if let Some(f) = finally {
            self.line("defer func() {");
            self.write_block(f)?;
            self.line("}()");
        }
        if let Some(handler) = handlers.first() {
            self.line("defer func() {");
            self.indent += 1;
            let binding = handler.binding.as_deref().unwrap_or("_");
            if binding == "_" {
                self.line("if recover() != nil {");
            } else {
                self.line(&format!("if {binding} := recover(); {binding} != nil {{"));
            }
            self.env.push_scope();
            if let Some(b) = &handler.binding {
                self.env.declare(b, Type::any());
            }
            self.write_block(&handler.body)?;
            self.env.pop_scope();
            self.line("}");
            self.indent -= 1;
            self.line("}()");
        }
        self.env.push_scope();
        let result = self.write_stmts(body);
        self.env.pop_scope();
        result?;
        self.indent -= 1;
        self.line("}()");
        Ok(())
    }

    fn panic_value(&mut self, e: &Expr) -> Emit<String> {
        match e {
            Expr::Construct { class, args } if !self.module.is_class(class) => {
                self.error_value(args)
            }
            other => self.expr(other),
        }
    }

    /// An `error` built from exception constructor arguments.
    fn error_value(&mut self, args: &[Expr]) -> Emit<String> {
        match args {
            [] => {
                self.imports.add("errors");
                Ok("errors.New(\"error\")".to_string())
            }
            [Expr::Format(parts)] => {
                self.imports.add("fmt");
                let (format, values) = self.format_args(parts)?;
                Ok(format!("fmt.Errorf({format}{values})"))
            }
            [message] if self.env.type_of(message).is_string() => {
                self.imports.add("errors");
                Ok(format!("errors.New({})", self.expr(message)?))
            }
            _ => {
                self.imports.add("fmt");
                Ok(format!("fmt.Errorf(\"%v\", {})", self.exprs(args)?))
            }
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

    /// Call arguments, typed by the callee's parameters, with omitted
    /// trailing arguments filled from their defaults.
    fn call_args(&mut self, callee: Option<&Function>, args: &[Expr]) -> Emit<String> {
        let Some(func) = callee else {
            return self.exprs(args);
        };
        let mut out = Vec::with_capacity(func.params.len().max(args.len()));
        for (i, a) in args.iter().enumerate() {
            let ty = func.params.get(i).filter(|p| !p.variadic).map(|p| &p.ty);
            out.push(self.expr_as(a, ty)?);
        }
        for p in func.params.iter().skip(args.len()) {
            if let Some(d) = &p.default {
                out.push(self.expr_as(d, Some(&p.ty))?);
            }
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

    /// Render `e`, using `expected` to type empty or untyped literals.
    fn expr_as(&mut self, e: &Expr, expected: Option<&Type>) -> Emit<String> {
        let expected = expected.filter(|t| t.is_resolved() || t.is_sequence() || t.is_map());
        Ok(match e {
            Expr::Literal(Literal::Int(n)) if expected.is_some_and(Type::is_float) => {
                format!("{n}.0")
            }
            Expr::Literal(lit @ Literal::Float(f)) if !f.is_finite() => {
                self.imports.add("math");
                literal(lit)
            }
            Expr::Literal(lit) => literal(lit),
            Expr::Ident(name) => {
                if !self.env.is_bound(name) && self.module.function(name).is_some() {
                    self.function_name(name)
                } else {
                    name.clone()
                }
            }
            Expr::This => match &self.receiver {
                Some(r) => r.name.clone(),
                None => return Err(self.error(e.kind_name(), "receiver outside a method")),
            },
            Expr::Binary { left, op, right } => self.binary(left, *op, right)?,
            Expr::Unary { op, operand } => {
                let s = self.expr(operand)?;
                let s = wrap(operand, s, unary_strength(*op, GRAMMAR) + 1, GRAMMAR);
                match op {
                    UnaryOp::Neg if s.starts_with('-') => format!("-({s})"),
                    UnaryOp::Neg => format!("-{s}"),
                    UnaryOp::Not => format!("!{s}"),
                    UnaryOp::BitNot => format!("^{s}"),
                }
            }
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Operation { op, args } => self.operation(*op, args)?,
            Expr::Construct { class, args } if self.module.is_class(class) => {
                let module = self.module;
                let ctor = module.class(class).and_then(Class::constructor);
                let args = self.call_args(ctor, args)?;
                format!("New{class}({args})")
            }
            Expr::Construct { class, args } if idioms::is_canonical_exception(class) => {
                self.error_value(args)?
            }
            Expr::Construct { class, args } => format!("New{class}({})", self.exprs(args)?),
            Expr::Member { object, property } => self.member(object, property)?,
            Expr::Index { object, index } => {
                let obj = self.atom(object)?;
                match index.as_ref() {
                    Expr::Literal(Literal::Int(n)) if *n < 0 => {
                        format!("{obj}[len({obj}){n}]")
                    }
                    _ => format!("{obj}[{}]", self.expr(index)?),
                }
            }
            Expr::Array(items) => {
                let ty = match expected {
                    Some(t) if t.is_sequence() => t.clone(),
                    _ => self.env.type_of(e),
                };
                let elem = ty.element();
                let go_ty = self.type_name(&Type::seq(elem.clone()));
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.expr_as(item, Some(&elem))?);
                }
                format!("{go_ty}{{{}}}", out.join(", "))
            }
            Expr::Map(pairs) => {
                let ty = match expected {
                    Some(t) if t.is_map() => t.clone(),
                    _ => self.env.type_of(e),
                };
                let (k, v) = ty
                    .map_parts()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .unwrap_or_else(|| (Type::any(), Type::any()));
                let go_ty = self.type_name(&Type::map(k.clone(), v.clone()));
                let mut out = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    out.push(format!(
                        "{}: {}",
                        self.expr_as(key, Some(&k))?,
                        self.expr_as(value, Some(&v))?
                    ));
                }
                format!("{go_ty}{{{}}}", out.join(", "))
            }
            Expr::Ternary {
                test,
                then,
                otherwise,
            } => {
                let ty = match expected {
                    Some(t) => t.clone(),
                    None => self.env.type_of(e),
                };
                let go_ty = self.type_name(&ty);
                let t = self.expr(test)?;
                let a = self.expr_as(then, Some(&ty))?;
                let b = self.expr_as(otherwise, Some(&ty))?;
                format!("func() {go_ty} {{ if {t} {{ return {a} }}; return {b} }}()")
            }
            Expr::Lambda(lambda) => self.lambda(lambda)?,
            Expr::Comprehension(c) => self.comprehension(c)?,
            // Calls are synchronous in the output.
            Expr::Await(inner) => self.expr_as(inner, expected)?,
            Expr::Format(parts) => {
                self.imports.add("fmt");
                let (format, values) = self.format_args(parts)?;
                format!("fmt.Sprintf({format}{values})")
            }
        })
    }

    /// A printf format string and the `, arg, ...` tail.
    fn format_args(&mut self, parts: &[FormatPart]) -> Emit<(String, String)> {
        let mut format = String::new();
        let mut values = String::new();
        for part in parts {
            match part {
                FormatPart::Text(t) => format.push_str(&t.replace('%', "%%")),
                FormatPart::Expr(e) => {
                    format.push_str("%v");
                    values.push_str(", ");
                    values.push_str(&self.expr(e)?);
                }
            }
        }
        Ok((
            format!("\"{}\"", escape_string(&format, unicode_escape)),
            values,
        ))
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Emit<String> {
        let lt = self.env.type_of(left);
        let rt = self.env.type_of(right);
        let both_int = lt.is_int() && rt.is_int();
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        // Mixed int/float arithmetic needs an explicit conversion.
        let as_float = |e: &Expr, s: String, ty: &Type, other: &Type| {
            if ty.is_int() && other.is_float() && !matches!(e, Expr::Literal(_)) {
                format!("float64({s})")
            } else {
                s
            }
        };
        match op {
            BinaryOp::Pow => {
                self.imports.add("math");
                let call = format!("math.Pow(float64({l}), float64({r}))");
                return Ok(if both_int { format!("int({call})") } else { call });
            }
            BinaryOp::Div if both_int => {
                return Ok(format!("float64({l}) / float64({r})"));
            }
            BinaryOp::FloorDiv if !both_int => {
                self.imports.add("math");
                let l = as_float(left, l, &lt, &rt);
                let r = as_float(right, r, &rt, &lt);
                return Ok(format!("math.Floor({l} / {r})"));
            }
            BinaryOp::Mod if lt.is_float() || rt.is_float() => {
                self.imports.add("math");
                let l = as_float(left, l, &lt, &rt);
                let r = as_float(right, r, &rt, &lt);
                return Ok(format!("math.Mod({l}, {r})"));
            }
            BinaryOp::Mul if lt.is_string() && rt.is_int() => {
                self.imports.add("strings");
                return Ok(format!("strings.Repeat({l}, {r})"));
            }
            _ => {}
        }
        let l = as_float(left, l, &lt, &rt);
        let r = as_float(right, r, &rt, &lt);
        let (l, r) = binary_operands(op, (left, l), (right, r), GRAMMAR);
        let symbol = match op {
            BinaryOp::FloorDiv | BinaryOp::Div => "/",
            other => other.c_symbol(),
        };
        Ok(format!("{l} {symbol} {r}"))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Emit<String> {
        match callee {
            Expr::Ident(name) if !self.env.is_bound(name) && self.module.function(name).is_some() => {
                let module = self.module;
                let func = module.function(name);
                let args = self.call_args(func, args)?;
                Ok(format!("{}({args})", self.function_name(name)))
            }
            // super.method(..) calls the embedded base's method.
            Expr::Member { object, property } if object.as_ident() == Some("super") => {
                let recv = self.receiver.clone();
                let base = recv
                    .as_ref()
                    .and_then(|r| self.module.class(&r.class))
                    .and_then(|c| c.base.clone());
                match (recv, base) {
                    (Some(r), Some(base)) => {
                        let args = self.exprs(args)?;
                        Ok(format!("{}.{base}.{property}({args})", r.name))
                    }
                    _ => Err(self.error("call", "super call outside a subclass method")),
                }
            }
            // Static methods are package functions.
            Expr::Member { object, property }
                if object
                    .as_ident()
                    .is_some_and(|c| self.module.is_class(c) && !self.env.is_bound(c)) =>
            {
                let module = self.module;
                let class = object.as_ident().unwrap_or_default();
                let method = module.class(class).and_then(|c| c.method(property));
                let args = self.call_args(method, args)?;
                Ok(format!("{class}{}({args})", pascal_case(property)))
            }
            Expr::Member { object, property } => {
                let module = self.module;
                let owner = match self.env.type_of(object).kind {
                    TypeKind::Named(name) => module.class(&name),
                    _ => None,
                };
                let method = owner.and_then(|c| c.method(property));
                let obj = self.atom(object)?;
                let args = self.call_args(method, args)?;
                Ok(format!("{obj}.{property}({args})"))
            }
            Expr::Lambda(_) => {
                let f = self.expr(callee)?;
                Ok(format!("{f}({})", self.exprs(args)?))
            }
            other => {
                let f = self.atom(other)?;
                Ok(format!("{f}({})", self.exprs(args)?))
            }
        }
    }

    fn member(&mut self, object: &Expr, property: &str) -> Emit<String> {
        if let Some(owner) = object.as_ident()
            && !self.env.is_bound(owner)
        {
            if self.is_enum(owner) {
                return Ok(property.to_string());
            }
            if self
                .module
                .class(owner)
                .and_then(|c| c.property(property))
                .is_some_and(|p| p.is_static)
            {
                return Ok(format!("{owner}{}", pascal_case(property)));
            }
        }
        Ok(format!("{}.{property}", self.atom(object)?))
    }

    fn operation(&mut self, op: Op, args: &[Expr]) -> Emit<String> {
        let receiver = args
            .first()
            .map(|a| Receiver::of(&self.env.type_of(a)))
            .unwrap_or(Receiver::Any);
        if op == Op::Contains
            && receiver == Receiver::Map
            && let [map, key] = args
        {
            let map = self.atom(map)?;
            let key = self.expr(key)?;
            return Ok(format!("func() bool {{ _, ok := {map}[{key}]; return ok }}()"));
        }
        let mut rendered = Vec::with_capacity(args.len());
        for a in args {
            rendered.push((a, self.expr(a)?));
        }
        render_op(op, Language::Go, receiver, &rendered, GRAMMAR, &mut self.imports)
            .ok_or_else(|| self.error("operation", format!("no Go form for {}", op.name())))
    }

    fn lambda(&mut self, lambda: &Lambda) -> Emit<String> {
        let params = self.params(&lambda.params)?;
        self.env.push_scope();
        self.env.bind_params(&lambda.params);
        let saved_ret = self.ret.take();
        let result = match &lambda.body {
            LambdaBody::Expr(body) => {
                let ty = self.env.type_of(body);
                let ret = self.result_type(&ty);
                self.expr(body).map(|b| {
                    if ty.is_void() {
                        format!("func({params}) {{ {b} }}")
                    } else {
                        format!("func({params}){ret} {{ return {b} }}")
                    }
                })
            }
            LambdaBody::Block(stmts) => {
                let saved = self.take();
                let saved_returns = std::mem::take(&mut self.returns);
                self.indent += 1;
                let result = self.write_stmts(stmts);
                self.indent -= 1;
                let returns = std::mem::replace(&mut self.returns, saved_returns);
                let inner = std::mem::replace(&mut self.output, saved);
                result.map(|()| {
                    let ty = Type::join_all(returns.iter());
                    let ret = if returns.is_empty() {
                        String::new()
                    } else {
                        self.result_type(&ty)
                    };
                    format!("func({params}){ret} {{\n{inner}{}}}", self.pad())
                })
            }
        };
        self.ret = saved_ret;
        self.env.pop_scope();
        result
    }

    fn comprehension(&mut self, c: &Comprehension) -> Emit<String> {
        let result_ty = self.env.type_of(&Expr::Comprehension(Box::new(c.clone())));
        let go_ty = self.type_name(&result_ty);
        let (header, filter, add) = self.comprehension_loop(c, &result_ty, "out")?;
        let body = match filter {
            Some(f) => format!("if {f} {{ {add} }}"),
            None => add,
        };
        Ok(format!(
            "func() {go_ty} {{ out := {go_ty}{{}}; {header} {{ {body} }}; return out }}()"
        ))
    }

    /// A comprehension that is the whole value of an assignment or return
    /// becomes a plain loop accumulating into `acc`.
    fn write_hoisted(&mut self, c: &Comprehension, acc: &str, ty: &Type, declare: bool) -> Emit {
        let go_ty = self.type_name(ty);
        let (header, filter, add) = self.comprehension_loop(c, ty, acc)?;
        if declare {
            self.line(&format!("{acc} := {go_ty}{{}}"));
        } else {
            self.line(&format!("{acc} = {go_ty}{{}}"));
        }
        self.line(&format!("{header} {{"));
        self.indent += 1;
        match filter {
            Some(f) => {
                self.line(&format!("if {f} {{"));
                self.indent += 1;
                self.line(&add);
                self.indent -= 1;
                self.line("}");
            }
            None => self.line(&add),
        }
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    /// Loop header, rendered filter and accumulate statement.
    fn comprehension_loop(
        &mut self,
        c: &Comprehension,
        result_ty: &Type,
        acc: &str,
    ) -> Emit<(String, Option<String>, String)> {
        let source = self.expr(&c.source)?;
        let source_ty = self.env.type_of(&c.source);
        self.env.push_scope();
        let var_ty = if source_ty.is_map() {
            source_ty
                .map_parts()
                .map_or_else(Type::any, |(k, _)| k.clone())
        } else {
            source_ty.element()
        };
        self.env.declare(&c.var, var_ty);
        let parts = self.comprehension_body(c, result_ty, acc);
        self.env.pop_scope();
        let (filter, add) = parts?;
        let header = if source_ty.is_map() {
            format!("for {} := range {source}", c.var)
        } else if source_ty.is_string() {
            self.imports.add("strings");
            format!("for _, {} := range strings.Split({source}, \"\")", c.var)
        } else {
            format!("for _, {} := range {source}", c.var)
        };
        Ok((header, filter, add))
    }

    fn comprehension_body(
        &mut self,
        c: &Comprehension,
        result_ty: &Type,
        acc: &str,
    ) -> Emit<(Option<String>, String)> {
        let filter = match &c.filter {
            Some(f) => Some(self.expr(f)?),
            None => None,
        };
        let add = match (&c.key, result_ty.map_parts()) {
            (Some(key), Some((kt, vt))) => {
                let (kt, vt) = (kt.clone(), vt.clone());
                format!(
                    "{acc}[{}] = {}",
                    self.expr_as(key, Some(&kt))?,
                    self.expr_as(&c.transform, Some(&vt))?
                )
            }
            _ => {
                let elem = result_ty.element();
                let item = self.expr_as(&c.transform, Some(&elem))?;
                format!("{acc} = append({acc}, {item})")
            }
        };
        Ok((filter, add))
    }
}

/// Split a constructor body into leading statements that never touch the
/// receiver and trailing `this.field = value` assignments, when it has
/// that shape.
fn literal_constructor(body: &[Stmt]) -> Option<(&[Stmt], Vec<(String, Expr)>)> {
    let split = body
        .iter()
        .rposition(|s| field_assignment(s).is_none())
        .map_or(0, |i| i + 1);
    let (prefix, assigns) = body.split_at(split);
    if mentions_receiver(prefix)
        || visit::any_stmt(prefix, |s| matches!(s, Stmt::Return(_)))
    {
        return None;
    }
    let mut fields = Vec::with_capacity(assigns.len());
    for stmt in assigns {
        let (name, value) = field_assignment(stmt)?;
        if fields.iter().any(|(n, _)| n == name) {
            return None;
        }
        fields.push((name.to_string(), value.clone()));
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

fn mentions_receiver(stmts: &[Stmt]) -> bool {
    let mut found = false;
    visit::walk_all_exprs(stmts, &mut |e| {
        found |= matches!(e, Expr::This) || e.as_ident() == Some("super");
    });
    found
}

/// Whether `break`/`continue` in `stmts` targets a loop outside them.
fn escapes_loop(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::Break | Stmt::Continue => true,
        Stmt::ForEach { .. }
        | Stmt::ForRange { .. }
        | Stmt::ForClassic { .. }
        | Stmt::While { .. } => false,
        other => visit::child_bodies(other).into_iter().any(escapes_loop),
    })
}

fn receiver_initial(class: &str) -> String {
    match class.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase().to_string(),
        _ => "self".to_string(),
    }
}

/// Receiver name: the class initial, unless a parameter or local takes it.
fn receiver_name(class: &str, func: &Function) -> String {
    let initial = receiver_initial(class);
    let mut taken = func.params.iter().any(|p| p.name == initial);
    visit::walk_stmts(&func.body, &mut |s| match s {
        Stmt::Assign {
            target: Expr::Ident(n),
            ..
        }
        | Stmt::Declare { name: n, .. }
        | Stmt::ForEach { value: n, .. }
        | Stmt::ForRange { var: n, .. } => taken |= *n == initial,
        _ => {}
    });
    visit::walk_all_exprs(&func.body, &mut |e| {
        taken |= e.as_ident() == Some(initial.as_str());
    });
    if taken {
        "self".to_string()
    } else {
        initial
    }
}

fn package_name(module: &str) -> String {
    let name: String = module
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        "main".to_string()
    } else {
        name
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "nil".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.is_nan() => "math.NaN()".to_string(),
        Literal::Float(f) if f.is_infinite() => {
            let sign = if *f < 0.0 { -1 } else { 1 };
            format!("math.Inf({sign})")
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
        GoWriter::emit(&annotated, &TranslateConfig::default()).unwrap()
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
        assert_eq!(
            emit(module),
            "package calc\n\nfunc add(a int, b int) int {\n\treturn a + b\n}\n"
        );
    }

    #[test]
    fn test_statements_become_main() {
        let output = emit(script(vec![
            Stmt::declare("x", Expr::int(42)),
            Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("x")])),
        ]));
        assert_eq!(
            output,
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tx := 42\n\tfmt.Println(x)\n}\n"
        );
    }

    #[test]
    fn test_class_uses_literal_constructor() {
        let mut class = Class::new("Counter");
        class.properties.push(Property::new("count", Type::int()));
        let ctor = Function::new(
            "constructor",
            vec![Param::new("start", Type::int())],
            Type::void(),
            vec![Stmt::assign(
                Expr::member(Expr::This, "count"),
                Expr::ident("start"),
            )],
        )
        .unwrap();
        class.set_constructor(ctor).unwrap();
        let increment = Function::new(
            "increment",
            vec![],
            Type::void(),
            vec![Stmt::assign(
                Expr::member(Expr::This, "count"),
                Expr::binary(Expr::member(Expr::This, "count"), BinaryOp::Add, Expr::int(1)),
            )],
        )
        .unwrap();
        class.methods.push(increment);
        let mut module = Module::new("counter");
        module.classes.push(class);
        let output = emit(module);
        assert!(output.contains("type Counter struct {\n\tcount int\n}"));
        assert!(output.contains(
            "func NewCounter(start int) *Counter {\n\treturn &Counter{count: start}\n}"
        ));
        assert!(output.contains("func (c *Counter) increment() {\n\tc.count++\n}"));
    }

    #[test]
    fn test_int_division() {
        let output = emit(script(vec![
            Stmt::declare("a", Expr::int(7)),
            Stmt::declare("b", Expr::int(2)),
            Stmt::declare(
                "q",
                Expr::binary(Expr::ident("a"), BinaryOp::FloorDiv, Expr::ident("b")),
            ),
            Stmt::declare(
                "r",
                Expr::binary(Expr::ident("a"), BinaryOp::Div, Expr::ident("b")),
            ),
        ]));
        assert!(output.contains("q := a / b"));
        assert!(output.contains("r := float64(a) / float64(b)"));
    }

    #[test]
    fn test_throw_becomes_panic() {
        let output = emit(script(vec![Stmt::Throw(Expr::Construct {
            class: "ValueError".into(),
            args: vec![Expr::string("bad")],
        })]));
        assert!(output.contains("import \"errors\""));
        assert!(output.contains("panic(errors.New(\"bad\"))"));
    }

    #[test]
    fn test_comprehension_closure() {
        let c = Comprehension::builder("x")
            .source(Expr::ident("xs"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .build()
            .unwrap();
        let output = emit(script(vec![
            Stmt::declare("xs", Expr::Array(vec![Expr::int(1), Expr::int(2)])),
            Stmt::expr(Expr::op(Op::Print, vec![Expr::Comprehension(Box::new(c))])),
        ]));
        assert!(output.contains("xs := []int{1, 2}"));
        assert!(output.contains(
            "fmt.Println(func() []int { out := []int{}; for _, x := range xs { out = append(out, x * 2) }; return out }())"
        ));
    }

    #[test]
    fn test_comprehension_hoisted() {
        let c = Comprehension::builder("x")
            .source(Expr::ident("xs"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .filter(Some(Expr::binary(Expr::ident("x"), BinaryOp::Gt, Expr::int(0))))
            .build()
            .unwrap();
        let output = emit(script(vec![
            Stmt::declare("xs", Expr::Array(vec![Expr::int(1), Expr::int(2)])),
            Stmt::declare("ys", Expr::Comprehension(Box::new(c))),
        ]));
        assert!(output.contains(
            "\tys := []int{}\n\tfor _, x := range xs {\n\t\tif x > 0 {\n\t\t\tys = append(ys, x * 2)\n\t\t}\n\t}\n"
        ));
    }

    #[test]
    fn test_try_uses_recover() {
        let output = emit(script(vec![Stmt::Try {
            body: vec![Stmt::expr(Expr::call(Expr::ident("risky"), vec![]))],
            handlers: vec![Catch {
                exception: None,
                binding: Some("e".into()),
                body: vec![Stmt::expr(Expr::op(Op::Print, vec![Expr::ident("e")]))],
            }],
            finally: None,
        }]));
        assert!(output.contains("\tfunc() {\n\t\tdefer func() {\n\t\t\tif e := recover(); e != nil {"));
        assert!(output.contains("\t\trisky()\n\t}()"));
    }

    #[test]
    fn test_return_in_try_is_error() {
        let mut module = Module::new("main");
        module.functions.push(
            Function::new(
                "f",
                vec![],
                Type::int(),
                vec![Stmt::Try {
                    body: vec![Stmt::return_stmt(Some(Expr::int(1)))],
                    handlers: vec![],
                    finally: Some(vec![Stmt::Pass]),
                }],
            )
            .unwrap(),
        );
        let annotated = infer(module, &InferenceConfig::default());
        let err = GoWriter::emit(&annotated, &TranslateConfig::default()).unwrap_err();
        assert_eq!(err.node, "try");
    }

    #[test]
    fn test_iota_enum() {
        let mut module = Module::new("colors");
        module.enums.push(Enum {
            name: "Color".into(),
            variants: vec![
                EnumVariant {
                    name: "Red".into(),
                    value: None,
                },
                EnumVariant {
                    name: "Green".into(),
                    value: None,
                },
            ],
        });
        let output = emit(module);
        assert!(output.contains("type Color int\n\nconst (\n\tRed Color = iota\n\tGreen\n)"));
    }
}
