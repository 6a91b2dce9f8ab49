//! TypeScript and JavaScript reader.
//!
//! Both dialects parse with tree-sitter-typescript; plain JavaScript is a
//! syntactic subset for everything the IR models.

use super::ts::{self, field, named_children, span};
use super::{
    ReadFail, ReadResult, breaks_out, chain_comprehension, hoist_declarations, is_constant_expr,
    number_literal, range_bounds, recover, split_top_level, unescape, unsupported,
};
use crate::error::ParseError;
use crate::idioms::{self, Op};
use crate::infer::TypeEnv;
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Reader;
use std::collections::HashSet;
use tree_sitter::Node;

/// TypeScript/JavaScript reader; the dialect only changes the reported
/// language and extensions.
pub struct TypeScriptReader {
    dialect: Language,
}

/// Static instance of the TypeScript reader for registry.
pub static TYPESCRIPT_READER: TypeScriptReader = TypeScriptReader {
    dialect: Language::TypeScript,
};

/// Static instance of the JavaScript reader for registry.
pub static JAVASCRIPT_READER: TypeScriptReader = TypeScriptReader {
    dialect: Language::JavaScript,
};

impl Reader for TypeScriptReader {
    fn language(&self) -> Language {
        self.dialect
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self.dialect {
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            _ => &["ts", "tsx", "mts"],
        }
    }

    fn read(&self, source: &str) -> Result<Module, ParseError> {
        read_typescript(source)
    }
}

/// Parse TypeScript source into IR.
pub fn read_typescript(source: &str) -> Result<Module, ParseError> {
    let tree = ts::parse(arborium_typescript::language().into(), source)?;
    let mut ctx = ReadContext::new(source);
    ctx.read_module(tree.root_node())
}

/// Parse JavaScript source into IR.
pub fn read_javascript(source: &str) -> Result<Module, ParseError> {
    read_typescript(source)
}

struct ReadContext<'a> {
    source: &'a str,
    classes: HashSet<String>,
    functions: HashSet<String>,
    /// Block scopes of declared names.
    scopes: Vec<HashSet<String>>,
    env: TypeEnv<'static>,
    /// `this.x` assignments seen in the current method.
    this_props: Vec<(String, Type)>,
    /// Markers for class members with no place in the IR.
    stray: Vec<Stmt>,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            classes: HashSet::new(),
            functions: HashSet::new(),
            scopes: vec![HashSet::new()],
            env: TypeEnv::new(),
            this_props: Vec::new(),
            stray: Vec::new(),
        }
    }

    fn node_text(&self, node: Node) -> &'a str {
        ts::text(node, self.source)
    }

    fn parse_error(&self, node: Node, message: impl Into<String>) -> ReadFail {
        ReadFail::Parse(ParseError::new(
            span(node),
            self.node_text(node).lines().next().unwrap_or(""),
            message,
        ))
    }

    fn marker(&self, node: Node, kind: &str) -> Stmt {
        Stmt::Unsupported(Unsupported {
            kind: kind.to_string(),
            text: self.node_text(node).trim_end().to_string(),
            span: span(node),
        })
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
        self.env.push_scope();
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        self.env.pop_scope();
    }

    fn declare_name(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name)) || self.env.is_bound(name)
    }

    // ------------------------------------------------------------------
    // Module
    // ------------------------------------------------------------------

    fn read_module(&mut self, root: Node) -> Result<Module, ParseError> {
        let children = named_children(root);
        for child in &children {
            let decl = unwrap_export(*child);
            let Some(name) = decl.child_by_field_name("name") else {
                continue;
            };
            let name = self.node_text(name).to_string();
            match decl.kind() {
                "class_declaration" | "abstract_class_declaration" => {
                    self.classes.insert(name);
                }
                "function_declaration" => {
                    self.functions.insert(name);
                }
                _ => {}
            }
        }

        let mut module = Module::new("main");
        for child in children {
            let result = self.read_top_level(unwrap_export(child), &mut module);
            let stmts = recover(result, self.node_text(child), span(child))?;
            module.statements.extend(stmts);
            module.statements.append(&mut self.stray);
        }
        hoist_declarations(&mut module.statements);
        Ok(module)
    }

    fn read_top_level(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "import_statement" => {
                module.imports.push(self.read_import(node)?);
                Ok(vec![])
            }
            // `export { a, b }` and re-exports carry no behavior.
            "export_statement" => Ok(vec![]),
            "function_declaration" => {
                module.functions.push(self.read_function(node)?);
                Ok(vec![])
            }
            "class_declaration" | "abstract_class_declaration" => {
                module.classes.push(self.read_class(node)?);
                Ok(vec![])
            }
            "interface_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                let fields = self.read_object_type(field(node, "body")?)?;
                module.type_defs.push(TypeDef {
                    name,
                    kind: TypeDefKind::Record(fields),
                    doc: None,
                });
                Ok(vec![])
            }
            "type_alias_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                let value = field(node, "value")?;
                let kind = if value.kind() == "object_type" {
                    TypeDefKind::Record(self.read_object_type(value)?)
                } else {
                    TypeDefKind::Alias(parse_type(self.node_text(value)))
                };
                module.type_defs.push(TypeDef {
                    name,
                    kind,
                    doc: None,
                });
                Ok(vec![])
            }
            "enum_declaration" => {
                module.enums.push(self.read_enum(node)?);
                Ok(vec![])
            }
            "lexical_declaration" | "variable_declaration" => {
                self.read_top_declaration(node, module)
            }
            "ambient_declaration" => unsupported("ambient declaration"),
            _ => self.read_stmt(node),
        }
    }

    fn read_import(&self, node: Node) -> ReadResult<Import> {
        let source = field(node, "source")?;
        let mut import = Import::module(string_content(self.node_text(source)));
        let Some(clause) = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "import_clause")
        else {
            return Ok(import);
        };
        for part in named_children(clause) {
            match part.kind() {
                "identifier" => import.items.push(self.node_text(part).to_string()),
                "namespace_import" => {
                    import.alias = named_children(part)
                        .first()
                        .map(|n| self.node_text(*n).to_string());
                }
                "named_imports" => {
                    for spec in named_children(part) {
                        if let Some(name) = spec.child_by_field_name("name") {
                            import.items.push(self.node_text(name).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(import)
    }

    /// Top-level `const`/`let`: arrow functions become functions, constant
    /// first bindings become module variables.
    fn read_top_declaration(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        let constant = node
            .child_by_field_name("kind")
            .is_some_and(|k| self.node_text(k) == "const");
        let mut stmts = Vec::new();
        for decl in named_children(node) {
            if decl.kind() != "variable_declarator" {
                continue;
            }
            let name_node = field(decl, "name")?;
            let value = decl.child_by_field_name("value");
            if name_node.kind() == "identifier"
                && let Some(value) = value
                && matches!(value.kind(), "arrow_function" | "function_expression" | "function")
            {
                let name = self.node_text(name_node).to_string();
                self.functions.insert(name.clone());
                let mut func = self.read_callable(value, name)?;
                func.span = span(node);
                module.functions.push(func);
                continue;
            }
            if name_node.kind() == "identifier"
                && let Some(value_node) = value
                && !self.is_local(self.node_text(name_node))
            {
                let value = self.read_expr(value_node)?;
                if is_constant_expr(&value) {
                    let name = self.node_text(name_node).to_string();
                    let ty = match decl.child_by_field_name("type") {
                        Some(t) => self.read_type(t),
                        None => self.env.type_of(&value),
                    };
                    self.declare_name(&name);
                    self.env.declare(&name, ty.clone());
                    module.variables.push(Variable {
                        name,
                        ty,
                        value: Some(value),
                        constant,
                        span: span(node),
                    });
                    continue;
                }
            }
            stmts.push(self.read_declarator(decl)?);
        }
        Ok(stmts)
    }

    fn read_enum(&mut self, node: Node) -> ReadResult<Enum> {
        let name = self.node_text(field(node, "name")?).to_string();
        let mut variants = Vec::new();
        for member in named_children(field(node, "body")?) {
            let (name, value) = match member.kind() {
                "enum_assignment" => {
                    let value = match self.read_expr(field(member, "value")?)? {
                        Expr::Literal(lit) => Some(lit),
                        _ => return unsupported("computed enum member"),
                    };
                    (field(member, "name")?, value)
                }
                _ => (member, None),
            };
            variants.push(EnumVariant {
                name: string_content(self.node_text(name)),
                value,
            });
        }
        Ok(Enum { name, variants })
    }

    /// Property signatures of an interface body or object type literal.
    fn read_object_type(&mut self, node: Node) -> ReadResult<Vec<Property>> {
        let mut out = Vec::new();
        for member in named_children(node) {
            match member.kind() {
                "property_signature" => {
                    let name = string_content(self.node_text(field(member, "name")?));
                    let optional = ts::children(member).iter().any(|c| c.kind() == "?");
                    let ty = match member.child_by_field_name("type") {
                        Some(t) => self.read_type(t),
                        None => Type::any(),
                    };
                    out.push(Property::new(name, ty.with_optional(optional)));
                }
                "method_signature" => {
                    let name = string_content(self.node_text(field(member, "name")?));
                    let params = self.read_params(field(member, "parameters")?)?;
                    let ret = match member.child_by_field_name("return_type") {
                        Some(t) => self.read_type(t),
                        None => Type::any(),
                    };
                    let ty = Type::function(params.into_iter().map(|p| p.ty).collect(), ret);
                    out.push(Property::new(name, ty));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------

    fn read_function(&mut self, node: Node) -> ReadResult<Function> {
        if node.kind().starts_with("generator") {
            return unsupported("generator");
        }
        let name = self.node_text(field(node, "name")?).to_string();
        let mut func = self.read_callable(node, name)?;
        func.span = span(node);
        Ok(func)
    }

    /// Anything with parameters and a body: declarations, methods, arrows.
    fn read_callable(&mut self, node: Node, name: String) -> ReadResult<Function> {
        let is_async = ts::children(node).iter().any(|c| c.kind() == "async");
        let ret = match node.child_by_field_name("return_type") {
            // `Promise<T>` reads as `T`.
            Some(t) => self.read_type(t),
            None => Type::any(),
        };
        self.push_scope();
        let result = self.read_callable_body(node);
        self.pop_scope();
        let (params, mut body) = result?;
        hoist_declarations(&mut body);
        let mut func = Function::new(name, params, ret, body)
            .map_err(|e| self.parse_error(node, e.to_string()))?;
        func.is_async = is_async;
        Ok(func)
    }

    fn read_callable_body(&mut self, node: Node) -> ReadResult<(Vec<Param>, Vec<Stmt>)> {
        let params = match (
            node.child_by_field_name("parameters"),
            node.child_by_field_name("parameter"),
        ) {
            (Some(list), _) => self.read_params(list)?,
            (None, Some(single)) => vec![Param::new(self.node_text(single), Type::any())],
            (None, None) => Vec::new(),
        };
        for p in &params {
            self.declare_name(&p.name);
        }
        self.env.bind_params(&params);
        let body = field(node, "body")?;
        let stmts = if body.kind() == "statement_block" {
            self.read_block_items(body)?
        } else {
            vec![Stmt::Return(Some(self.read_expr(body)?))]
        };
        Ok((params, stmts))
    }

    fn read_params(&mut self, node: Node) -> ReadResult<Vec<Param>> {
        let mut params = Vec::new();
        for child in named_children(node) {
            let (pattern, optional) = match child.kind() {
                "required_parameter" => (field(child, "pattern")?, false),
                "optional_parameter" => (field(child, "pattern")?, true),
                "identifier" | "assignment_pattern" | "rest_pattern" => (child, false),
                other => return unsupported(format!("parameter {other}")),
            };
            let ty = match child.child_by_field_name("type") {
                Some(t) => self.read_type(t),
                None => Type::any(),
            };
            let mut param = match pattern.kind() {
                "identifier" => Param::new(self.node_text(pattern), ty),
                "this" => continue,
                "rest_pattern" => {
                    let inner = named_children(pattern)
                        .into_iter()
                        .next()
                        .ok_or_else(|| self.parse_error(pattern, "rest without name"))?;
                    // `...xs: T[]` carries the element type.
                    Param {
                        variadic: true,
                        ..Param::new(self.node_text(inner), ty.element())
                    }
                }
                "assignment_pattern" => {
                    let name = self.node_text(field(pattern, "left")?);
                    let default = self.read_expr(field(pattern, "right")?)?;
                    Param {
                        default: Some(default),
                        ..Param::new(name, ty)
                    }
                }
                _ => return unsupported("destructured parameter"),
            };
            if let Some(value) = child.child_by_field_name("value") {
                param.default = Some(self.read_expr(value)?);
            }
            if optional {
                param.ty = param.ty.with_optional(true);
                if param.default.is_none() {
                    param.default = Some(Expr::null());
                }
            }
            params.push(param);
        }
        Ok(params)
    }

    fn read_class(&mut self, node: Node) -> ReadResult<Class> {
        let name = self.node_text(field(node, "name")?).to_string();
        let mut class = Class::new(name.clone());
        class.span = span(node);
        for heritage in named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "class_heritage")
        {
            for clause in named_children(heritage) {
                if clause.kind() == "extends_clause"
                    && let Some(value) = clause.child_by_field_name("value")
                {
                    let base = self.node_text(value);
                    class.base = Some(idioms::canonical_exception(Language::TypeScript, base));
                }
            }
        }

        self.env.set_class(Some(name.as_str()));
        for member in named_children(field(node, "body")?) {
            match member.kind() {
                "public_field_definition" | "field_definition" => {
                    let prop = self.read_field(member)?;
                    class.ensure_property(prop);
                }
                "method_definition" => {
                    let kids = ts::children(member);
                    if kids.iter().any(|c| matches!(c.kind(), "get" | "set")) {
                        self.stray.push(self.marker(member, "accessor"));
                        continue;
                    }
                    let is_static = kids.iter().any(|c| c.kind() == "static");
                    let method_name =
                        string_content(self.node_text(field(member, "name")?)).replace('#', "");
                    let method = match self.read_callable(member, method_name.clone()) {
                        Ok(m) => m,
                        Err(ReadFail::Unsupported(kind)) => {
                            self.stray.push(self.marker(member, &kind));
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let mut method = Function {
                        is_static,
                        span: span(member),
                        ..method
                    };
                    for (prop, ty) in std::mem::take(&mut self.this_props) {
                        class.ensure_property(Property::new(prop, ty));
                    }
                    if method_name == "constructor" {
                        self.parameter_properties(member, &mut method, &mut class)?;
                        method.ret = Type::void();
                        class
                            .set_constructor(method)
                            .map_err(|e| self.parse_error(member, e.to_string()))?;
                    } else {
                        class.methods.push(method);
                    }
                }
                "method_signature" | "abstract_method_signature" | "index_signature" => {}
                "decorator" => self.stray.push(self.marker(member, "decorator")),
                other => self.stray.push(self.marker(member, &other.replace('_', " "))),
            }
        }
        self.env.set_class(None);
        Ok(class)
    }

    fn read_field(&mut self, node: Node) -> ReadResult<Property> {
        let name_node = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("property"))
            .ok_or_else(|| self.parse_error(node, "field without name"))?;
        let name = string_content(self.node_text(name_node)).replace('#', "");
        let default = match node.child_by_field_name("value") {
            Some(v) => Some(self.read_expr(v)?),
            None => None,
        };
        let ty = match node.child_by_field_name("type") {
            Some(t) => self.read_type(t),
            None => default
                .as_ref()
                .map(|d| self.env.type_of(d))
                .unwrap_or_default(),
        };
        Ok(Property {
            default,
            is_static: ts::children(node).iter().any(|c| c.kind() == "static"),
            ..Property::new(name, ty)
        })
    }

    /// `constructor(private name: string)` declares and assigns `name`.
    fn parameter_properties(
        &self,
        member: Node,
        ctor: &mut Function,
        class: &mut Class,
    ) -> ReadResult<()> {
        let params = field(member, "parameters")?;
        let mut assigns = Vec::new();
        for param in named_children(params) {
            let is_property = named_children(param)
                .iter()
                .any(|c| c.kind() == "accessibility_modifier")
                || ts::children(param).iter().any(|c| c.kind() == "readonly");
            if !is_property {
                continue;
            }
            let name = self.node_text(field(param, "pattern")?).to_string();
            let ty = ctor.param(&name).map(|p| p.ty.clone()).unwrap_or_default();
            class.ensure_property(Property::new(name.clone(), ty));
            assigns.push(Stmt::assign(
                Expr::member(Expr::This, name.clone()),
                Expr::ident(name),
            ));
        }
        // Parameter properties are assigned before the body runs, but after super().
        let at = ctor
            .body
            .iter()
            .position(|s| !is_super_call(s))
            .unwrap_or(ctor.body.len());
        ctor.body.splice(at..at, assigns);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Statements of a block, in a fresh scope.
    fn read_block(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        self.push_scope();
        let result = if node.kind() == "statement_block" {
            self.read_block_items(node)
        } else {
            recover(self.read_stmt(node), self.node_text(node), span(node))
        };
        self.pop_scope();
        result
    }

    fn read_block_items(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        for child in named_children(node) {
            stmts.extend(recover(self.read_stmt(child), self.node_text(child), span(child))?);
        }
        Ok(stmts)
    }

    fn read_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut stmts = Vec::new();
                for decl in named_children(node) {
                    if decl.kind() == "variable_declarator" {
                        stmts.push(self.read_declarator(decl)?);
                    }
                }
                Ok(stmts)
            }
            "expression_statement" => {
                let expr = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "empty expression statement"))?;
                if expr.kind() == "sequence_expression" {
                    return unsupported("comma expression");
                }
                Ok(vec![self.read_expr_stmt(expr)?])
            }
            "return_statement" => {
                let value = match named_children(node).into_iter().next() {
                    Some(v) => Some(self.read_expr(v)?),
                    None => None,
                };
                Ok(vec![Stmt::Return(value)])
            }
            "if_statement" => self.read_if(node).map(|s| vec![s]),
            "for_statement" => self.read_for(node).map(|s| vec![s]),
            "for_in_statement" => self.read_for_in(node).map(|s| vec![s]),
            "while_statement" => {
                let test = self.read_expr(field(node, "condition")?)?;
                let body = self.read_block(field(node, "body")?)?;
                Ok(vec![Stmt::While { test, body }])
            }
            "do_statement" => {
                // do { body } while (c)  ->  while (true) { body; if (!c) break; }
                let test = self.read_expr(field(node, "condition")?)?;
                let mut body = self.read_block(field(node, "body")?)?;
                if visit::any_stmt(&body, |s| matches!(s, Stmt::Continue)) {
                    return unsupported("continue in do-while");
                }
                body.push(Stmt::if_stmt(
                    Expr::unary(UnaryOp::Not, test),
                    vec![Stmt::Break],
                    None,
                ));
                Ok(vec![Stmt::While {
                    test: Expr::bool(true),
                    body,
                }])
            }
            "try_statement" => self.read_try(node).map(|s| vec![s]),
            "throw_statement" => {
                let value = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "throw without value"))?;
                Ok(vec![Stmt::Throw(self.read_expr(value)?)])
            }
            "switch_statement" => self.read_switch(node),
            "break_statement" => {
                if node.child_by_field_name("label").is_some() {
                    return unsupported("labeled break");
                }
                Ok(vec![Stmt::Break])
            }
            "continue_statement" => {
                if node.child_by_field_name("label").is_some() {
                    return unsupported("labeled continue");
                }
                Ok(vec![Stmt::Continue])
            }
            "empty_statement" | "comment" => Ok(vec![]),
            "statement_block" => Ok(self.read_block(node)?),
            "function_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                self.declare_name(&name);
                let func = self.read_function(node)?;
                Ok(vec![Stmt::Assign {
                    target: Expr::ident(name),
                    value: Expr::Lambda(Box::new(Lambda {
                        params: func.params,
                        body: LambdaBody::Block(func.body),
                        is_async: func.is_async,
                    })),
                    ty: Type::any(),
                    declare: true,
                }])
            }
            "class_declaration" => unsupported("local class"),
            "labeled_statement" => unsupported("labeled statement"),
            "generator_function_declaration" => unsupported("generator"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_declarator(&mut self, decl: Node) -> ReadResult<Stmt> {
        let name_node = field(decl, "name")?;
        if name_node.kind() != "identifier" {
            return unsupported("destructuring declaration");
        }
        let name = self.node_text(name_node).to_string();
        let declared = match decl.child_by_field_name("type") {
            Some(t) => self.read_type(t),
            None => Type::any(),
        };
        self.declare_name(&name);
        let Some(value) = decl.child_by_field_name("value") else {
            self.env.declare(&name, declared.clone());
            return Ok(Stmt::Declare { name, ty: declared });
        };
        let value = self.read_expr(value)?;
        let target = Expr::ident(name);
        self.env.bind_assignment(&target, &value, &declared, true);
        Ok(Stmt::Assign {
            target,
            value,
            ty: declared,
            declare: true,
        })
    }

    /// An expression in statement position.
    fn read_expr_stmt(&mut self, expr: Node) -> ReadResult<Stmt> {
        match expr.kind() {
            "assignment_expression" => {
                let target = self.read_target(field(expr, "left")?)?;
                let value = self.read_expr(field(expr, "right")?)?;
                Ok(self.assign(target, value))
            }
            "augmented_assignment_expression" => {
                let target = self.read_target(field(expr, "left")?)?;
                let op_text = self.node_text(field(expr, "operator")?);
                let value = self.read_expr(field(expr, "right")?)?;
                let value = match op_text.trim_end_matches('=') {
                    "??" => Expr::ternary(
                        Expr::binary(target.clone(), BinaryOp::Ne, Expr::null()),
                        target.clone(),
                        value,
                    ),
                    "&&" | "||" => return unsupported("logical assignment"),
                    op => {
                        let op = binary_op(op)
                            .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                        Expr::binary(target.clone(), op, value)
                    }
                };
                Ok(self.assign(target, value))
            }
            "update_expression" => {
                let target = self.read_target(field(expr, "argument")?)?;
                let op = if self.node_text(expr).contains("++") {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let value = Expr::binary(target.clone(), op, Expr::int(1));
                Ok(self.assign(target, value))
            }
            _ => Ok(Stmt::Expr(self.read_expr(expr)?)),
        }
    }

    fn read_target(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" | "member_expression" | "subscript_expression" => self.read_expr(node),
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_target(inner),
                None => unsupported("assignment target"),
            },
            _ => unsupported("destructuring assignment"),
        }
    }

    fn assign(&mut self, target: Expr, value: Expr) -> Stmt {
        match &target {
            Expr::Ident(_) => self.env.bind_assignment(&target, &value, &Type::any(), false),
            Expr::Member { object, property } if matches!(**object, Expr::This) => {
                let ty = self.env.type_of(&value);
                self.this_props.push((property.clone(), ty));
            }
            _ => {}
        }
        Stmt::assign(target, value)
    }

    fn read_if(&mut self, node: Node) -> ReadResult<Stmt> {
        let test = self.read_expr(field(node, "condition")?)?;
        let then_body = self.read_block(field(node, "consequence")?)?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        let mut alt = node.child_by_field_name("alternative");
        while let Some(clause) = alt {
            let Some(stmt) = named_children(clause).into_iter().next() else {
                break;
            };
            if stmt.kind() == "if_statement" {
                let test = self.read_expr(field(stmt, "condition")?)?;
                let body = self.read_block(field(stmt, "consequence")?)?;
                elifs.push(ElseIf { test, body });
                alt = stmt.child_by_field_name("alternative");
            } else {
                else_body = Some(self.read_block(stmt)?);
                alt = None;
            }
        }
        Ok(Stmt::If {
            test,
            then_body,
            elifs,
            else_body,
        })
    }

    fn read_for(&mut self, node: Node) -> ReadResult<Stmt> {
        self.push_scope();
        let result = self.read_for_inner(node);
        self.pop_scope();
        result
    }

    fn read_for_inner(&mut self, node: Node) -> ReadResult<Stmt> {
        let init = match node.child_by_field_name("initializer") {
            Some(n) if n.kind() == "empty_statement" => None,
            Some(n) if matches!(n.kind(), "lexical_declaration" | "variable_declaration") => {
                let mut stmts = self.read_stmt(n)?;
                if stmts.len() != 1 {
                    return unsupported("multi-variable loop initializer");
                }
                stmts.pop()
            }
            Some(n) => Some(self.read_expr_stmt(n)?),
            None => None,
        };
        let test = match node.child_by_field_name("condition") {
            Some(n) => match n.kind() {
                "empty_statement" => None,
                "expression_statement" => match named_children(n).into_iter().next() {
                    Some(e) => Some(self.read_expr(e)?),
                    None => None,
                },
                _ => Some(self.read_expr(n)?),
            },
            None => None,
        };
        let update = match node.child_by_field_name("increment") {
            Some(n) => Some(self.read_expr_stmt(n)?),
            None => None,
        };
        let body = self.read_block(field(node, "body")?)?;

        if let Some(Stmt::Assign {
            target: Expr::Ident(var),
            value: start,
            declare: true,
            ..
        }) = &init
            && let Some((end, step)) = range_bounds(var, test.as_ref(), update.as_ref())
            && !visit::any_stmt(&body, |s| {
                matches!(s, Stmt::Assign { target: Expr::Ident(n), .. } if n == var)
            })
        {
            return Ok(Stmt::ForRange {
                var: var.clone(),
                start: start.clone(),
                end,
                step,
                body,
            });
        }
        Ok(Stmt::ForClassic {
            init: init.map(Box::new),
            test,
            update: update.map(Box::new),
            body,
        })
    }

    fn read_for_in(&mut self, node: Node) -> ReadResult<Stmt> {
        let left = field(node, "left")?;
        let right = field(node, "right")?;
        let is_of = node
            .child_by_field_name("operator")
            .is_some_and(|op| self.node_text(op) == "of");
        let iterable = self.read_expr(right)?;
        let mut stmt = match left.kind() {
            "identifier" => Stmt::ForEach {
                mode: IterMode::Items,
                key: None,
                value: self.node_text(left).to_string(),
                // for-in walks the keys of an object.
                iterable,
                body: Vec::new(),
            },
            "array_pattern" if is_of => {
                let names = named_children(left);
                let &[k, v] = names.as_slice() else {
                    return unsupported("loop destructuring");
                };
                if k.kind() != "identifier" || v.kind() != "identifier" {
                    return unsupported("loop destructuring");
                }
                let (mode, iterable) = match iterable {
                    Expr::Call { callee, mut args }
                        if args.len() == 1
                            && matches!(&*callee, Expr::Member { object, property }
                                if property == "entries"
                                    && matches!(&**object, Expr::Ident(o) if o == "Object")) =>
                    {
                        (IterMode::Entries, args.remove(0))
                    }
                    Expr::Call { callee, args } if args.is_empty() => match *callee {
                        Expr::Member { object, property } if property == "entries" => {
                            let ty = self.env.type_of(&object);
                            let mode = if ty.is_map() {
                                IterMode::Entries
                            } else {
                                IterMode::Indexed
                            };
                            (mode, *object)
                        }
                        _ => return unsupported("loop destructuring"),
                    },
                    _ => return unsupported("loop destructuring"),
                };
                Stmt::ForEach {
                    mode,
                    key: Some(self.node_text(k).to_string()),
                    value: self.node_text(v).to_string(),
                    iterable,
                    body: Vec::new(),
                }
            }
            _ => return unsupported("loop destructuring"),
        };

        self.push_scope();
        self.env.bind_loop(&stmt);
        if let Stmt::ForEach { key, value, .. } = &stmt {
            let names: Vec<String> = key.iter().chain(Some(value)).cloned().collect();
            for n in names {
                self.declare_name(&n);
            }
        }
        let body = self.read_block(field(node, "body")?);
        self.pop_scope();
        if let Stmt::ForEach { body: b, .. } = &mut stmt {
            *b = body?;
        }
        Ok(stmt)
    }

    fn read_try(&mut self, node: Node) -> ReadResult<Stmt> {
        let body = self.read_block(field(node, "body")?)?;
        let mut handlers = Vec::new();
        if let Some(clause) = node.child_by_field_name("handler") {
            let binding = match clause.child_by_field_name("parameter") {
                Some(p) if p.kind() == "identifier" => Some(self.node_text(p).to_string()),
                Some(_) => return unsupported("destructured catch binding"),
                None => None,
            };
            self.push_scope();
            if let Some(b) = &binding {
                self.declare_name(b);
                self.env.declare(b, Type::named("Exception"));
            }
            let body = self.read_block(field(clause, "body")?);
            self.pop_scope();
            handlers.push(Catch {
                exception: None,
                binding,
                body: body?,
            });
        }
        let finally = match node.child_by_field_name("finalizer") {
            Some(f) => Some(self.read_block(field(f, "body")?)?),
            None => None,
        };
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    /// `switch` as an if/elif chain. Cases must end in `break`, `return`,
    /// `throw` or `continue`; fallthrough between non-empty cases is not
    /// modeled.
    fn read_switch(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let subject = self.read_expr(field(node, "value")?)?;
        let mut branches: Vec<(Option<Expr>, Vec<Stmt>)> = Vec::new();
        let mut pending: Vec<Expr> = Vec::new();
        let mut default_body = None;
        for case in named_children(field(node, "body")?) {
            let mut cursor = case.walk();
            let stmts: Vec<Node> = case.children_by_field_name("body", &mut cursor).collect();
            self.push_scope();
            let mut body = Vec::new();
            for s in stmts {
                match recover(self.read_stmt(s), self.node_text(s), span(s)) {
                    Ok(mut read) => body.append(&mut read),
                    Err(err) => {
                        self.pop_scope();
                        return Err(err.into());
                    }
                }
            }
            self.pop_scope();
            let is_default = case.kind() == "switch_default";
            let is_last = case.next_named_sibling().is_none();
            if !is_default {
                let value = self.read_expr(field(case, "value")?)?;
                pending.push(Expr::binary(subject.clone(), BinaryOp::Eq, value));
            }
            if body.is_empty() {
                continue;
            }
            match body.last() {
                Some(Stmt::Break) => {
                    body.pop();
                }
                Some(Stmt::Return(_) | Stmt::Throw(_) | Stmt::Continue) => {}
                _ if is_last => {}
                _ => return unsupported("switch fallthrough"),
            }
            if breaks_out(&body) {
                return unsupported("break inside switch case");
            }
            if is_default {
                if !pending.is_empty() {
                    return unsupported("default shared with case");
                }
                default_body = Some(body);
            } else {
                let test = pending
                    .drain(..)
                    .reduce(|a, b| Expr::binary(a, BinaryOp::Or, b));
                branches.push((test, body));
            }
        }
        let mut branches = branches.into_iter();
        let Some((Some(test), then_body)) = branches.next() else {
            // Only a default: its body runs unconditionally.
            return Ok(default_body.unwrap_or_default());
        };
        let elifs = branches
            .filter_map(|(test, body)| test.map(|test| ElseIf { test, body }))
            .collect();
        Ok(vec![Stmt::If {
            test,
            then_body,
            elifs,
            else_body: default_body,
        }])
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn read_expr(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" => match self.node_text(node) {
                "undefined" => Ok(Expr::null()),
                "NaN" | "Infinity" => unsupported("non-finite number"),
                name => Ok(Expr::ident(name)),
            },
            "this" => Ok(Expr::This),
            "super" => Ok(Expr::ident("super")),
            "number" => number_literal(self.node_text(node))
                .map(Expr::Literal)
                .ok_or_else(|| self.parse_error(node, "invalid number")),
            "string" => Ok(Expr::string(unescape(&string_content(self.node_text(node))))),
            "template_string" => self.read_template(node),
            "true" => Ok(Expr::bool(true)),
            "false" => Ok(Expr::bool(false)),
            "null" | "undefined" => Ok(Expr::null()),
            "binary_expression" => self.read_binary(node),
            "unary_expression" => {
                let arg = self.read_expr(field(node, "argument")?)?;
                match self.node_text(field(node, "operator")?) {
                    "!" => Ok(Expr::unary(UnaryOp::Not, arg)),
                    "-" => Ok(match arg {
                        Expr::Literal(Literal::Int(n)) => Expr::int(-n),
                        Expr::Literal(Literal::Float(n)) => Expr::float(-n),
                        other => Expr::unary(UnaryOp::Neg, other),
                    }),
                    "~" => Ok(Expr::unary(UnaryOp::BitNot, arg)),
                    "+" => Ok(Expr::op(Op::ToFloat, vec![arg])),
                    other => unsupported(format!("operator {other}")),
                }
            }
            "call_expression" => self.read_call(node),
            "new_expression" => self.read_new(node),
            "member_expression" => {
                let object = self.read_expr(field(node, "object")?)?;
                let property = self.node_text(field(node, "property")?).replace('#', "");
                if let Some(op) = idioms::recognize_property(Language::TypeScript, &property)
                    && !self.is_user_object(&object)
                {
                    let op = op.refine(&self.env.type_of(&object));
                    return Ok(Expr::op(op, vec![object]));
                }
                Ok(Expr::member(object, property))
            }
            "subscript_expression" => {
                let object = self.read_expr(field(node, "object")?)?;
                let index = self.read_expr(field(node, "index")?)?;
                Ok(Expr::index(object, index))
            }
            "array" => {
                let mut items = Vec::new();
                for item in named_children(node) {
                    if item.kind() == "spread_element" {
                        return unsupported("spread");
                    }
                    items.push(self.read_expr(item)?);
                }
                Ok(Expr::Array(items))
            }
            "object" => {
                let mut pairs = Vec::new();
                for member in named_children(node) {
                    match member.kind() {
                        "pair" => {
                            let key = field(member, "key")?;
                            let key = match key.kind() {
                                "property_identifier" => Expr::string(self.node_text(key)),
                                "computed_property_name" => {
                                    match named_children(key).into_iter().next() {
                                        Some(inner) => self.read_expr(inner)?,
                                        None => return unsupported("computed key"),
                                    }
                                }
                                _ => self.read_expr(key)?,
                            };
                            let value = self.read_expr(field(member, "value")?)?;
                            pairs.push((key, value));
                        }
                        "shorthand_property_identifier" => {
                            let name = self.node_text(member);
                            pairs.push((Expr::string(name), Expr::ident(name)));
                        }
                        _ => return unsupported("object member"),
                    }
                }
                Ok(Expr::Map(pairs))
            }
            "ternary_expression" => {
                let test = self.read_expr(field(node, "condition")?)?;
                let then = self.read_expr(field(node, "consequence")?)?;
                let otherwise = self.read_expr(field(node, "alternative")?)?;
                Ok(Expr::ternary(test, then, otherwise))
            }
            "arrow_function" | "function_expression" | "function" => self.read_lambda(node),
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_expr(inner),
                None => Err(self.parse_error(node, "empty parentheses")),
            },
            "await_expression" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "await without operand"))?;
                Ok(Expr::Await(Box::new(self.read_expr(inner)?)))
            }
            // Type-level wrappers carry no runtime meaning.
            "as_expression" | "satisfies_expression" | "non_null_expression" | "type_assertion" => {
                let inner = named_children(node)
                    .into_iter()
                    .find(|c| !c.kind().ends_with("type") && c.kind() != "type_arguments")
                    .ok_or_else(|| self.parse_error(node, "empty type assertion"))?;
                self.read_expr(inner)
            }
            "assignment_expression" | "augmented_assignment_expression" | "update_expression" => {
                unsupported("assignment in expression")
            }
            "regex" => unsupported("regular expression"),
            "spread_element" => unsupported("spread"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_binary(&mut self, node: Node) -> ReadResult<Expr> {
        let left = self.read_expr(field(node, "left")?)?;
        let right = self.read_expr(field(node, "right")?)?;
        let op_text = self.node_text(field(node, "operator")?);
        match op_text {
            "??" => Ok(Expr::ternary(
                Expr::binary(left.clone(), BinaryOp::Ne, Expr::null()),
                left,
                right,
            )),
            "in" => Ok(Expr::op(Op::Contains, vec![right, left])),
            "instanceof" => unsupported("instanceof"),
            _ => {
                let op = binary_op(op_text)
                    .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                Ok(Expr::binary(left, op, right))
            }
        }
    }

    fn read_args(&mut self, node: Option<Node>) -> ReadResult<Vec<Expr>> {
        let Some(node) = node else {
            return Ok(Vec::new());
        };
        let mut args = Vec::new();
        for arg in named_children(node) {
            if arg.kind() == "spread_element" {
                return unsupported("argument spread");
            }
            args.push(self.read_expr(arg)?);
        }
        Ok(args)
    }

    /// True when `object` is typed as a class defined in this module.
    fn is_user_object(&self, object: &Expr) -> bool {
        matches!(object, Expr::This)
            || matches!(
                &self.env.type_of(object).kind,
                TypeKind::Named(class) if self.classes.contains(class)
            )
    }

    fn read_call(&mut self, node: Node) -> ReadResult<Expr> {
        let func = field(node, "function")?;
        let args_node = node.child_by_field_name("arguments");
        if args_node.is_some_and(|a| a.kind() == "template_string") {
            return unsupported("tagged template");
        }
        let args = self.read_args(args_node)?;
        match func.kind() {
            "identifier" => {
                let name = self.node_text(func);
                if self.is_local(name) || self.functions.contains(name) {
                    return Ok(Expr::call(Expr::ident(name), args));
                }
                match idioms::recognize_call(Language::TypeScript, name, args) {
                    Ok((op, args)) => Ok(self.operation(op, args)),
                    Err(args) => Ok(Expr::call(Expr::ident(name), args)),
                }
            }
            "super" => Ok(Expr::call(Expr::ident("super"), args)),
            "member_expression" => {
                let obj_node = field(func, "object")?;
                let method = self.node_text(field(func, "property")?).replace('#', "");
                if obj_node.kind() == "identifier" && !self.is_local(self.node_text(obj_node)) {
                    let dotted = format!("{}.{method}", self.node_text(obj_node));
                    match idioms::recognize_call(Language::TypeScript, &dotted, args) {
                        Ok((op, args)) => return Ok(self.operation(op, args)),
                        Err(rest) => return self.method_call(obj_node, &method, rest),
                    }
                }
                self.method_call(obj_node, &method, args)
            }
            _ => {
                let callee = self.read_expr(func)?;
                Ok(Expr::call(callee, args))
            }
        }
    }

    fn method_call(&mut self, obj_node: Node, method: &str, args: Vec<Expr>) -> ReadResult<Expr> {
        let object = self.read_expr(obj_node)?;
        if self.is_user_object(&object) || matches!(&object, Expr::Ident(s) if s == "super") {
            return Ok(Expr::call(Expr::member(object, method), args));
        }
        if matches!(method, "filter" | "map")
            && let [callback] = &args[..]
            && let Some((var, body)) = self.callback_parts(callback)
        {
            return Ok(chain_comprehension(object, method, var, body));
        }
        match idioms::recognize_method(Language::TypeScript, object, method, args) {
            Ok((op, args)) => Ok(self.operation(op, args)),
            Err((object, args)) => Ok(Expr::call(Expr::member(object, method), args)),
        }
    }

    /// `x => expr`, `function (x) { return expr; }`, or a function name.
    fn callback_parts(&self, callback: &Expr) -> Option<(String, Expr)> {
        match callback {
            Expr::Lambda(lambda) if lambda.params.len() == 1 && !lambda.params[0].variadic => {
                let var = lambda.params[0].name.clone();
                let body = match &lambda.body {
                    LambdaBody::Expr(e) => (**e).clone(),
                    LambdaBody::Block(stmts) => match &stmts[..] {
                        [Stmt::Return(Some(e))] => e.clone(),
                        _ => return None,
                    },
                };
                Some((var, body))
            }
            Expr::Ident(f) if self.functions.contains(f) => Some((
                "item".to_string(),
                Expr::call(Expr::ident(f.clone()), vec![Expr::ident("item")]),
            )),
            _ => None,
        }
    }

    fn read_new(&mut self, node: Node) -> ReadResult<Expr> {
        let ctor = field(node, "constructor")?;
        let args = self.read_args(node.child_by_field_name("arguments"))?;
        if !matches!(ctor.kind(), "identifier" | "member_expression") {
            return unsupported("computed constructor");
        }
        let name = self.node_text(ctor);
        match (name, args.len()) {
            ("Map" | "Object", 0) => Ok(Expr::Map(vec![])),
            ("Array" | "Set", 0) => Ok(Expr::Array(vec![])),
            ("Set" | "Array", 1) if matches!(args[0], Expr::Array(_)) => Ok(args
                .into_iter()
                .next()
                .unwrap_or_else(|| Expr::Array(vec![]))),
            _ => Ok(Expr::Construct {
                class: idioms::canonical_exception(Language::TypeScript, name),
                args,
            }),
        }
    }

    fn operation(&self, op: Op, args: Vec<Expr>) -> Expr {
        let op = match args.first() {
            Some(first) => op.refine(&self.env.type_of(first)),
            None => op,
        };
        Expr::op(op, args)
    }

    fn read_lambda(&mut self, node: Node) -> ReadResult<Expr> {
        let is_async = ts::children(node).iter().any(|c| c.kind() == "async");
        self.push_scope();
        let result = self.read_callable_body(node);
        self.pop_scope();
        let (params, mut body) = result?;
        let concise = node
            .child_by_field_name("body")
            .is_some_and(|b| b.kind() != "statement_block");
        let body = match body.pop() {
            Some(Stmt::Return(Some(e))) if concise && body.is_empty() => {
                LambdaBody::Expr(Box::new(e))
            }
            last => {
                body.extend(last);
                LambdaBody::Block(body)
            }
        };
        Ok(Expr::Lambda(Box::new(Lambda {
            params,
            body,
            is_async,
        })))
    }

    fn read_template(&mut self, node: Node) -> ReadResult<Expr> {
        let start = node.start_byte() + 1;
        let end = node.end_byte().saturating_sub(1).max(start);
        let mut parts = Vec::new();
        let mut pos = start;
        for child in named_children(node) {
            if child.kind() != "template_substitution" {
                continue;
            }
            if child.start_byte() > pos {
                parts.push(FormatPart::Text(unescape(&self.source[pos..child.start_byte()])));
            }
            let inner = named_children(child)
                .into_iter()
                .next()
                .ok_or_else(|| self.parse_error(child, "empty substitution"))?;
            parts.push(FormatPart::Expr(self.read_expr(inner)?));
            pos = child.end_byte();
        }
        if end > pos {
            parts.push(FormatPart::Text(unescape(&self.source[pos..end])));
        }
        if parts.iter().all(|p| matches!(p, FormatPart::Text(_))) {
            let text: String = parts
                .into_iter()
                .filter_map(|p| match p {
                    FormatPart::Text(t) => Some(t),
                    FormatPart::Expr(_) => None,
                })
                .collect();
            return Ok(Expr::string(text));
        }
        Ok(Expr::Format(parts))
    }

    fn read_type(&self, node: Node) -> Type {
        parse_type(self.node_text(node).trim_start_matches(':'))
    }
}

fn unwrap_export(node: Node) -> Node {
    if node.kind() == "export_statement"
        && let Some(decl) = node.child_by_field_name("declaration")
    {
        return decl;
    }
    node
}

/// Text between the quotes of a string literal (or a bare identifier).
fn string_content(text: &str) -> String {
    let t = text.trim();
    for q in ['"', '\'', '`'] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return t[1..t.len() - 1].to_string();
        }
    }
    t.to_string()
}

fn is_super_call(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(Expr::Call { callee, .. }) if matches!(&**callee, Expr::Ident(n) if n == "super"))
}

fn binary_op(op: &str) -> Option<BinaryOp> {
    Some(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "**" => BinaryOp::Pow,
        "==" | "===" => BinaryOp::Eq,
        "!=" | "!==" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        "&" => BinaryOp::BitAnd,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        _ => return None,
    })
}

/// Parse a TypeScript type annotation.
pub(crate) fn parse_type(text: &str) -> Type {
    let t = text.trim().trim_start_matches('|').trim();
    let members = split_top_level(t, '|');
    if members.len() > 1 {
        return Type::union(members.into_iter().map(parse_type).collect());
    }
    if let Some(inner) = t.strip_suffix("[]") {
        return Type::seq(parse_type(inner));
    }
    if t.starts_with('(')
        && let Some(close) = matching_paren(t)
    {
        let rest = t[close + 1..].trim();
        if let Some(ret) = rest.strip_prefix("=>") {
            let params = split_top_level(&t[1..close], ',')
                .into_iter()
                .map(|p| match split_top_level(p, ':').get(1) {
                    Some(ty) => parse_type(ty),
                    None => Type::any(),
                })
                .collect();
            return Type::function(params, parse_type(ret));
        }
        if rest.is_empty() {
            return parse_type(&t[1..close]);
        }
    }
    if t.starts_with('{') {
        // { [key: string]: V }
        let inner = t.trim_start_matches('{').trim_end_matches('}').trim();
        if let Some(rest) = inner.strip_prefix('[')
            && let Some((key, value)) = rest.split_once("]:")
        {
            let key = key.split_once(':').map(|(_, k)| k).unwrap_or("string");
            return Type::map(parse_type(key), parse_type(value.trim_end_matches(';')));
        }
        return Type::any();
    }
    if t.starts_with('[') && t.ends_with(']') {
        let members: Vec<Type> = split_top_level(&t[1..t.len() - 1], ',')
            .into_iter()
            .map(parse_type)
            .collect();
        return Type::seq(Type::join_all(members.iter()));
    }
    if t.starts_with(['"', '\'']) {
        return Type::string();
    }
    if t.parse::<f64>().is_ok() {
        return Type::float();
    }
    let (name, args) = match t.find('<') {
        Some(i) if t.ends_with('>') => (&t[..i], split_top_level(&t[i + 1..t.len() - 1], ',')),
        _ => (t, Vec::new()),
    };
    let arg = |i: usize| args.get(i).map(|a| parse_type(a)).unwrap_or_default();
    match name.trim() {
        "number" => Type::float(),
        "bigint" => Type::int(),
        "string" => Type::string(),
        "boolean" | "true" | "false" => Type::bool(),
        "void" | "never" => Type::void(),
        "null" | "undefined" => Type::null(),
        "any" | "unknown" | "object" | "Object" | "" => Type::any(),
        "Array" | "ReadonlyArray" | "Set" | "ReadonlySet" | "Iterable" => Type::seq(arg(0)),
        "Map" | "ReadonlyMap" | "Record" => Type::map(arg(0), arg(1)),
        "Promise" | "Partial" | "Readonly" | "Required" => arg(0),
        other => Type::named(other.rsplit('.').next().unwrap_or(other)),
    }
}

/// Byte index of the `)` closing the `(` at the start of `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Module {
        read_typescript(src).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let module = read("function add(a: number, b: number): number {\n  return a + b;\n}\n");
        let f = module.function("add").unwrap();
        assert_eq!(f.params[0].ty, Type::float());
        assert_eq!(f.ret, Type::float());
        assert!(matches!(f.body[0], Stmt::Return(Some(Expr::Binary { .. }))));
    }

    #[test]
    fn test_arrow_const_becomes_function() {
        let module = read("const double = (x: number) => x * 2;\n");
        let f = module.function("double").unwrap();
        assert_eq!(f.params.len(), 1);
        assert!(module.variables.is_empty());
    }

    #[test]
    fn test_const_variable() {
        let module = read("const LIMIT = 10;\nlet name: string;\n");
        assert!(module.variables[0].constant);
        assert_eq!(module.variables[0].ty, Type::int());
        assert_eq!(
            module.statements[0],
            Stmt::Declare {
                name: "name".into(),
                ty: Type::string()
            }
        );
    }

    #[test]
    fn test_class_with_parameter_properties() {
        let src = r#"
class User {
  private visits = 0;
  constructor(public name: string, email: string) {
    this.email = email;
  }
  greet(): string {
    return `hi ${this.name}`;
  }
}
"#;
        let module = read(src);
        let class = module.class("User").unwrap();
        assert_eq!(class.property("visits").unwrap().ty, Type::int());
        assert_eq!(class.property("name").unwrap().ty, Type::string());
        assert!(class.property("email").is_some());
        let ctor = class.constructor().unwrap();
        assert_eq!(ctor.body.len(), 2);
        let greet = class.method("greet").unwrap();
        assert!(matches!(&greet.body[0], Stmt::Return(Some(Expr::Format(_)))));
    }

    #[test]
    fn test_filter_map_chain() {
        let module = read("const out = xs.filter(x => x > 0).map(y => y * 2);\n");
        let Stmt::Assign { value, .. } = &module.statements[0] else {
            panic!("expected assignment");
        };
        let Expr::Comprehension(c) = value else {
            panic!("expected comprehension, got {value:?}");
        };
        assert_eq!(c.var, "x");
        assert_eq!(
            c.transform,
            Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2))
        );
        assert!(c.filter.is_some());
    }

    #[test]
    fn test_counter_loop_becomes_range() {
        let module = read("for (let i = 0; i < 10; i++) {\n  console.log(i);\n}\n");
        assert!(matches!(
            &module.statements[0],
            Stmt::ForRange { var, step: None, .. } if var == "i"
        ));
    }

    #[test]
    fn test_irregular_loop_stays_classic() {
        let module = read("for (let i = 1; i < n; i *= 2) {\n  f(i);\n}\n");
        assert!(matches!(module.statements[0], Stmt::ForClassic { .. }));
    }

    #[test]
    fn test_switch_lowered() {
        let src = "switch (x) {\n  case 1:\n  case 2:\n    f();\n    break;\n  default:\n    g();\n}\n";
        let module = read(src);
        let Stmt::If {
            test, else_body, ..
        } = &module.statements[0]
        else {
            panic!("expected if");
        };
        assert!(matches!(
            test,
            Expr::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
        assert!(else_body.is_some());
    }

    #[test]
    fn test_nullish_and_length() {
        let module = read("function f(s: string, d) {\n  return s.length + (d ?? 0);\n}\n");
        let f = module.function("f").unwrap();
        let Stmt::Return(Some(Expr::Binary { left, right, .. })) = &f.body[0] else {
            panic!("expected binary");
        };
        assert!(matches!(**left, Expr::Operation { op: Op::StrLength, .. }));
        assert!(matches!(**right, Expr::Ternary { .. }));
    }

    #[test]
    fn test_interface_and_enum() {
        let src = "interface Point { x: number; y?: number }\nenum Color { Red, Green = 5 }\n";
        let module = read(src);
        let TypeDefKind::Record(fields) = &module.type_defs[0].kind else {
            panic!("expected record");
        };
        assert!(fields[1].ty.optional);
        assert_eq!(module.enums[0].variants[1].value, Some(Literal::Int(5)));
    }

    #[test]
    fn test_throw_canonicalizes() {
        let module = read("throw new RangeError(\"bad\");\n");
        assert!(matches!(
            &module.statements[0],
            Stmt::Throw(Expr::Construct { class, .. }) if class == "IndexError"
        ));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("number[]"), Type::seq(Type::float()));
        assert_eq!(
            parse_type("Map<string, boolean>"),
            Type::map(Type::string(), Type::bool())
        );
        assert_eq!(parse_type("string | null"), Type::optional_of(Type::string()));
        assert_eq!(
            parse_type("(a: number) => string"),
            Type::function(vec![Type::float()], Type::string())
        );
        assert_eq!(
            parse_type("{ [key: string]: number }"),
            Type::map(Type::string(), Type::float())
        );
    }

    #[test]
    fn test_unterminated_template_is_parse_error() {
        assert!(read_typescript("const s = `abc;\n").is_err());
    }
}
