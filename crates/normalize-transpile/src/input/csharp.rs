//! C# reader.
//!
//! A static class that holds `Main` (or only static members) is the module
//! itself: its fields become module variables, its methods module functions
//! and the body of `Main` the top-level statements. A static class of string
//! constants is a string-valued enum. Other classes map one to one, with
//! `: base(..)` becoming the leading `super(..)` call of the constructor.

use super::ts::{self, children, field, named_children, span};
use super::{
    ReadFail, ReadResult, chain_comprehension, hoist_declarations, number_literal, range_bounds,
    recover, split_top_level, unescape, unsupported,
};
use crate::error::ParseError;
use crate::idioms::{self, Op};
use crate::infer::TypeEnv;
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Reader;
use std::collections::HashSet;
use tree_sitter::Node;

/// C# reader.
pub struct CSharpReader;

/// Static instance of the C# reader for registry.
pub static CSHARP_READER: CSharpReader = CSharpReader;

impl Reader for CSharpReader {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cs"]
    }

    fn read(&self, source: &str) -> Result<Module, ParseError> {
        read_csharp(source)
    }
}

/// Parse C# source into IR.
pub fn read_csharp(source: &str) -> Result<Module, ParseError> {
    let tree = ts::parse(arborium_c_sharp::language().into(), source)?;
    let mut ctx = ReadContext::new(source);
    ctx.read_module(tree.root_node())
}

const LANG: Language = Language::CSharp;

struct ReadContext<'a> {
    source: &'a str,
    classes: HashSet<String>,
    interfaces: HashSet<String>,
    /// Static classes read as the module.
    holders: HashSet<String>,
    functions: HashSet<String>,
    env: TypeEnv<'static>,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            classes: HashSet::new(),
            interfaces: HashSet::new(),
            holders: HashSet::new(),
            functions: HashSet::new(),
            env: TypeEnv::new(),
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

    fn modifiers(&self, node: Node) -> Vec<&'a str> {
        children(node)
            .into_iter()
            .filter(|c| c.kind() == "modifier")
            .map(|c| self.node_text(c))
            .collect()
    }

    fn has_modifier(&self, node: Node, modifier: &str) -> bool {
        self.modifiers(node).iter().any(|m| *m == modifier)
    }

    /// `/// <summary>` comments above a member, without the XML tags.
    fn doc_comment(&self, node: Node) -> Option<String> {
        let mut lines = Vec::new();
        let mut prev = node.prev_sibling();
        while let Some(p) = prev {
            if p.kind() != "comment" {
                break;
            }
            match self.node_text(p).strip_prefix("///") {
                Some(line) => lines.push(line.trim()),
                None => break,
            }
            prev = p.prev_sibling();
        }
        lines.reverse();
        let text: Vec<&str> = lines
            .into_iter()
            .filter(|l| !matches!(*l, "<summary>" | "</summary>"))
            .collect();
        (!text.is_empty()).then(|| text.join("\n"))
    }

    // ------------------------------------------------------------------
    // Module
    // ------------------------------------------------------------------

    fn read_module(&mut self, root: Node) -> Result<Module, ParseError> {
        let items = self.flatten_namespaces(root);
        for item in &items {
            self.collect(*item);
        }
        let mut module = Module::new("main");
        for item in items {
            let result = self.read_top_level(item, &mut module);
            let stmts = recover(result, self.node_text(item), span(item))?;
            module.statements.extend(stmts);
        }
        hoist_declarations(&mut module.statements);
        Ok(module)
    }

    /// Declarations with namespace wrappers removed.
    fn flatten_namespaces<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "namespace_declaration" | "file_scoped_namespace_declaration" | "declaration_list" => {
                    let name = child.child_by_field_name("name").map(|n| n.id());
                    let inner: Vec<Node> = named_children(child)
                        .into_iter()
                        .filter(|c| Some(c.id()) != name)
                        .collect();
                    for c in inner {
                        if c.kind() == "declaration_list" {
                            out.extend(self.flatten_namespaces(c));
                        } else {
                            out.push(c);
                        }
                    }
                }
                _ => out.push(child),
            }
        }
        out
    }

    fn collect(&mut self, node: Node) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.node_text(name).to_string();
        match node.kind() {
            "class_declaration" if self.is_holder(node) => {
                if let Some(body) = node.child_by_field_name("body") {
                    for member in named_children(body) {
                        if member.kind() == "method_declaration"
                            && let Some(m) = member.child_by_field_name("name")
                        {
                            self.functions.insert(self.node_text(m).to_string());
                        }
                    }
                }
                self.holders.insert(name);
            }
            "class_declaration" | "struct_declaration" | "record_declaration" => {
                self.classes.insert(name);
            }
            "interface_declaration" => {
                self.interfaces.insert(name);
            }
            _ => {}
        }
    }

    /// A static class with methods, or one declaring `Main`.
    fn is_holder(&self, node: Node) -> bool {
        let Some(body) = node.child_by_field_name("body") else {
            return false;
        };
        let members = named_children(body);
        let declares_main = members.iter().any(|m| {
            m.kind() == "method_declaration"
                && m.child_by_field_name("name")
                    .is_some_and(|n| self.node_text(n) == "Main")
        });
        declares_main
            || (self.has_modifier(node, "static")
                && members.iter().any(|m| m.kind() == "method_declaration"))
    }

    fn read_top_level(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "using_directive" => {
                self.read_using(node, module)?;
                Ok(vec![])
            }
            "class_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                if self.holders.contains(&name) {
                    return self.read_holder(node, module);
                }
                if self.has_modifier(node, "static") {
                    module.enums.push(self.read_constant_class(node, name)?);
                    return Ok(vec![]);
                }
                let class = self.read_class(node, name)?;
                module.classes.push(class);
                Ok(vec![])
            }
            "struct_declaration" | "record_declaration" => unsupported(node.kind().replace('_', " ")),
            "interface_declaration" => {
                let def = self.read_interface(node)?;
                module.type_defs.push(def);
                Ok(vec![])
            }
            "enum_declaration" => {
                module.enums.push(self.read_enum(node)?);
                Ok(vec![])
            }
            "global_statement" => match named_children(node).into_iter().next() {
                Some(stmt) => self.read_stmt(stmt),
                None => Ok(vec![]),
            },
            "extern_alias_directive" | "attribute_list" => Ok(vec![]),
            other => unsupported(other.replace('_', " ")),
        }
    }

    /// `using System;` or `using Alias = Type;`.
    fn read_using(&self, node: Node, module: &mut Module) -> ReadResult<()> {
        let text = self
            .node_text(node)
            .trim()
            .trim_start_matches("global ")
            .trim_start_matches("using")
            .trim_end_matches(';')
            .trim();
        match text.split_once('=') {
            Some((alias, ty)) => module.type_defs.push(TypeDef {
                name: alias.trim().to_string(),
                kind: TypeDefKind::Alias(parse_type(ty)),
                doc: None,
            }),
            None => module.imports.push(Import::module(text.trim_start_matches("static "))),
        }
        Ok(())
    }

    /// Members of the static holder class as module-level code.
    fn read_holder(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        for member in named_children(field(node, "body")?) {
            let result = self.read_holder_member(member, module);
            stmts.extend(recover(result, self.node_text(member), span(member))?);
        }
        Ok(stmts)
    }

    fn read_holder_member(&mut self, member: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match member.kind() {
            "field_declaration" => {
                let constant = self.has_modifier(member, "const")
                    || self.has_modifier(member, "readonly");
                for (name, ty, value) in self.read_variables(field_declaration(member)?)? {
                    self.env.declare(&name, ty.clone());
                    module.variables.push(Variable {
                        name,
                        ty,
                        value,
                        constant,
                        span: span(member),
                    });
                }
                Ok(vec![])
            }
            "method_declaration" => {
                let name = self.node_text(field(member, "name")?).to_string();
                let func = self.read_method(member, name.clone())?;
                if name == "Main" {
                    return Ok(func.body);
                }
                module.functions.push(Function {
                    is_static: false,
                    ..func
                });
                Ok(vec![])
            }
            other => unsupported(other.replace('_', " ")),
        }
    }

    /// `public static class Color { public const string Red = "red"; }`
    fn read_constant_class(&self, node: Node, name: String) -> ReadResult<Enum> {
        let mut variants = Vec::new();
        for member in named_children(field(node, "body")?) {
            if member.kind() != "field_declaration" || !self.has_modifier(member, "const") {
                return unsupported("static class");
            }
            let decl = field_declaration(member)?;
            for declarator in named_children(decl).into_iter().filter(|c| c.kind() == "variable_declarator") {
                let name = self.node_text(declarator_name(declarator)?).to_string();
                let value = declarator_value(declarator)
                    .map(|v| self.constant_literal(v))
                    .transpose()?;
                variants.push(EnumVariant { name, value });
            }
        }
        Ok(Enum { name, variants })
    }

    fn constant_literal(&self, node: Node) -> ReadResult<Literal> {
        let text = self.node_text(node);
        match node.kind() {
            "string_literal" => Ok(Literal::String(unescape(&string_body(text)))),
            "integer_literal" => int_literal(text).ok_or_else(|| self.parse_error(node, "invalid number")),
            "real_literal" => number_literal(text.trim_end_matches(['d', 'D', 'f', 'F', 'm', 'M']))
                .map(|lit| match lit {
                    Literal::Int(n) => Literal::Float(n as f64),
                    other => other,
                })
                .ok_or_else(|| self.parse_error(node, "invalid number")),
            "boolean_literal" => Ok(Literal::Bool(text == "true")),
            "null_literal" => Ok(Literal::Null),
            "prefix_unary_expression" if text.starts_with('-') => int_literal(text)
                .ok_or_else(|| ReadFail::Unsupported("computed constant".into())),
            _ => unsupported("computed constant"),
        }
    }

    fn read_enum(&self, node: Node) -> ReadResult<Enum> {
        let name = self.node_text(field(node, "name")?).to_string();
        let mut variants = Vec::new();
        for member in named_children(field(node, "body")?) {
            if member.kind() != "enum_member_declaration" {
                continue;
            }
            let value = match member.child_by_field_name("value") {
                Some(v) => Some(self.constant_literal(v)?),
                None => None,
            };
            variants.push(EnumVariant {
                name: self.node_text(field(member, "name")?).to_string(),
                value,
            });
        }
        Ok(Enum { name, variants })
    }

    fn read_interface(&self, node: Node) -> ReadResult<TypeDef> {
        let name = self.node_text(field(node, "name")?).to_string();
        let mut props = Vec::new();
        for member in named_children(field(node, "body")?) {
            match member.kind() {
                "method_declaration" => {
                    let params = self.read_params(field(member, "parameters")?)?;
                    let ret = self.return_type(member);
                    let fty = Type::function(params.into_iter().map(|p| p.ty).collect(), ret);
                    props.push(Property::new(self.node_text(field(member, "name")?), fty));
                }
                "property_declaration" => {
                    let ty = parse_type(self.node_text(field(member, "type")?));
                    props.push(Property::new(self.node_text(field(member, "name")?), ty));
                }
                _ => return unsupported("interface member"),
            }
        }
        Ok(TypeDef {
            name,
            kind: TypeDefKind::Record(props),
            doc: self.doc_comment(node),
        })
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn read_class(&mut self, node: Node, name: String) -> ReadResult<Class> {
        let mut class = Class::new(name.clone());
        class.span = span(node);
        class.doc = self.doc_comment(node);
        if let Some(bases) = named_children(node).into_iter().find(|c| c.kind() == "base_list") {
            class.base = named_children(bases)
                .into_iter()
                .map(|b| self.node_text(b))
                .find(|b| !self.interfaces.contains(*b) && !is_interface_name(b))
                .map(|b| idioms::canonical_exception(LANG, b));
        }
        self.env.set_class(Some(name.as_str()));
        let result = self.read_members(node, &mut class);
        self.env.set_class(None);
        result?;
        Ok(class)
    }

    /// A member the IR cannot hold makes the whole class a marker.
    fn read_members(&mut self, node: Node, class: &mut Class) -> ReadResult<()> {
        for member in named_children(field(node, "body")?) {
            if let Err(ReadFail::Unsupported(kind)) = self.read_member(member, class) {
                return unsupported(format!("{kind} in class"));
            }
        }
        Ok(())
    }

    fn read_member(&mut self, member: Node, class: &mut Class) -> ReadResult<()> {
        match member.kind() {
            "field_declaration" => {
                let is_static = self.has_modifier(member, "static") || self.has_modifier(member, "const");
                for (name, ty, value) in self.read_variables(field_declaration(member)?)? {
                    let mut prop = Property::new(name, ty);
                    prop.default = value;
                    prop.is_static = is_static;
                    class.ensure_property(prop);
                }
            }
            "property_declaration" => {
                if member
                    .child_by_field_name("value")
                    .is_some_and(|v| v.kind() == "arrow_expression_clause")
                {
                    return unsupported("computed property");
                }
                let accessors = member.child_by_field_name("accessors");
                if accessors.is_some_and(|a| {
                    named_children(a)
                        .iter()
                        .any(|acc| acc.child_by_field_name("body").is_some())
                }) {
                    return unsupported("property accessor body");
                }
                let mut prop = Property::new(
                    self.node_text(field(member, "name")?),
                    parse_type(self.node_text(field(member, "type")?)),
                );
                prop.is_static = self.has_modifier(member, "static");
                prop.default = match member.child_by_field_name("value") {
                    Some(v) => Some(self.read_expr(v)?),
                    None => None,
                };
                class.ensure_property(prop);
            }
            "constructor_declaration" => {
                let ctor = self.read_constructor(member)?;
                class
                    .set_constructor(ctor)
                    .map_err(|e| self.parse_error(member, e.to_string()))?;
            }
            "method_declaration" => {
                let name = self.node_text(field(member, "name")?).to_string();
                let mut method = self.read_method(member, name)?;
                method.is_static = self.has_modifier(member, "static");
                class.methods.push(method);
            }
            other => return unsupported(other.replace('_', " ")),
        }
        Ok(())
    }

    fn read_constructor(&mut self, node: Node) -> ReadResult<Function> {
        self.env.push_scope();
        let result = self.read_constructor_inner(node);
        self.env.pop_scope();
        let (params, body) = result?;
        let mut ctor = Function::new("constructor", params, Type::void(), body)
            .map_err(|e| self.parse_error(node, e.to_string()))?;
        ctor.doc = self.doc_comment(node);
        ctor.span = span(node);
        Ok(ctor)
    }

    fn read_constructor_inner(&mut self, node: Node) -> ReadResult<(Vec<Param>, Vec<Stmt>)> {
        let params = self.read_params(field(node, "parameters")?)?;
        self.env.bind_params(&params);
        let mut body = Vec::new();
        if let Some(init) = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "constructor_initializer")
        {
            if self.node_text(init).trim_start_matches(':').trim_start().starts_with("this") {
                return unsupported("constructor chaining");
            }
            let args = match named_children(init).into_iter().find(|c| c.kind() == "argument_list") {
                Some(list) => self.read_arguments(list)?,
                None => Vec::new(),
            };
            body.push(Stmt::Expr(Expr::call(Expr::ident("super"), args)));
        }
        body.extend(self.read_block(field(node, "body")?)?);
        Ok((params, body))
    }

    fn read_method(&mut self, node: Node, name: String) -> ReadResult<Function> {
        self.env.push_scope();
        let result = self.read_method_inner(node);
        self.env.pop_scope();
        let (params, ret, body) = result?;
        let mut func =
            Function::new(name, params, ret, body).map_err(|e| self.parse_error(node, e.to_string()))?;
        func.is_async = self.has_modifier(node, "async");
        func.doc = self.doc_comment(node);
        func.span = span(node);
        Ok(func)
    }

    fn read_method_inner(&mut self, node: Node) -> ReadResult<(Vec<Param>, Type, Vec<Stmt>)> {
        let params = self.read_params(field(node, "parameters")?)?;
        let ret = self.return_type(node);
        self.env.bind_params(&params);
        let Some(body_node) = node.child_by_field_name("body") else {
            return unsupported("abstract method");
        };
        let mut body = match body_node.kind() {
            "arrow_expression_clause" => {
                let expr = named_children(body_node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(body_node, "empty expression body"))?;
                let value = self.read_expr(expr)?;
                if ret.is_void() {
                    vec![Stmt::Expr(value)]
                } else {
                    vec![Stmt::Return(Some(value))]
                }
            }
            _ => self.read_block(body_node)?,
        };
        hoist_declarations(&mut body);
        Ok((params, ret, body))
    }

    fn return_type(&self, node: Node) -> Type {
        let ty = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"));
        ty.map(|t| parse_type(self.node_text(t))).unwrap_or_else(Type::void)
    }

    fn read_params(&self, node: Node) -> ReadResult<Vec<Param>> {
        let mut params = Vec::new();
        for p in named_children(node) {
            if p.kind() != "parameter" {
                return unsupported(p.kind().replace('_', " "));
            }
            let modifiers = self.modifiers(p);
            if modifiers.iter().any(|m| matches!(*m, "ref" | "out" | "in" | "this")) {
                return unsupported("by-reference parameter");
            }
            let name_node = field(p, "name")?;
            let ty = p
                .child_by_field_name("type")
                .map(|t| parse_type(self.node_text(t)))
                .unwrap_or_else(Type::any);
            let mut param = Param::new(self.node_text(name_node), ty);
            param.variadic = self.node_text(p).trim_start().starts_with("params ");
            if param.variadic {
                param.ty = param.ty.element();
            }
            param.default = default_value(p, name_node)
                .map(|v| self.constant_literal(v).map(Expr::Literal))
                .transpose()?;
            params.push(param);
        }
        Ok(params)
    }

    /// `(name, declared type, initializer)` for each declarator.
    fn read_variables(&mut self, decl: Node) -> ReadResult<Vec<(String, Type, Option<Expr>)>> {
        let ty = parse_type(self.node_text(field(decl, "type")?));
        let mut out = Vec::new();
        for declarator in named_children(decl)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
        {
            let name_node = declarator_name(declarator)?;
            if name_node.kind() != "identifier" {
                return unsupported("destructuring");
            }
            let value = match declarator_value(declarator) {
                Some(v) => Some(self.read_expr_as(v, &ty)?),
                None => None,
            };
            out.push((self.node_text(name_node).to_string(), ty.clone(), value));
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn read_block(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        self.env.push_scope();
        let result = self.read_block_items(node);
        self.env.pop_scope();
        result
    }

    fn read_block_items(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        let items = match node.kind() {
            "block" => named_children(node),
            _ => vec![node],
        };
        let mut stmts = Vec::new();
        for child in items {
            let result = self.read_stmt(child);
            stmts.extend(recover(result, self.node_text(child), span(child))?);
        }
        Ok(stmts)
    }

    fn read_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "local_declaration_statement" => {
                let decl = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "variable_declaration")
                    .ok_or_else(|| self.parse_error(node, "missing declaration"))?;
                let mut stmts = Vec::new();
                for (name, ty, value) in self.read_variables(decl)? {
                    match value {
                        Some(value) => {
                            let target = Expr::ident(name);
                            self.env.bind_assignment(&target, &value, &ty, true);
                            stmts.push(Stmt::Assign {
                                target,
                                value,
                                ty,
                                declare: true,
                            });
                        }
                        None => {
                            self.env.declare(&name, ty.clone());
                            stmts.push(Stmt::Declare { name, ty });
                        }
                    }
                }
                Ok(stmts)
            }
            "expression_statement" => {
                let expr = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "empty statement"))?;
                self.read_expr_stmt(expr).map(|s| vec![s])
            }
            "if_statement" => self.read_if(node).map(|s| vec![s]),
            "while_statement" => {
                let test = self.read_expr(field(node, "condition")?)?;
                let body = self.read_block(field(node, "body")?)?;
                Ok(vec![Stmt::While { test, body }])
            }
            "do_statement" => {
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
            "for_statement" => {
                self.env.push_scope();
                let result = self.read_for(node);
                self.env.pop_scope();
                result.map(|s| vec![s])
            }
            "foreach_statement" => {
                self.env.push_scope();
                let result = self.read_foreach(node);
                self.env.pop_scope();
                result.map(|s| vec![s])
            }
            "return_statement" => match named_children(node).into_iter().next() {
                Some(value) => Ok(vec![Stmt::Return(Some(self.read_expr(value)?))]),
                None => Ok(vec![Stmt::Return(None)]),
            },
            "break_statement" => Ok(vec![Stmt::Break]),
            "continue_statement" => Ok(vec![Stmt::Continue]),
            "throw_statement" => match named_children(node).into_iter().next() {
                Some(value) => Ok(vec![Stmt::Throw(self.read_expr(value)?)]),
                None => unsupported("rethrow"),
            },
            "try_statement" => self.read_try(node).map(|s| vec![s]),
            "block" => Ok(self.read_block(node)?),
            "empty_statement" => Ok(vec![]),
            "switch_statement" => unsupported("switch"),
            "local_function_statement" => unsupported("local function"),
            "using_statement" => unsupported("using"),
            "lock_statement" => unsupported("lock"),
            "yield_statement" => unsupported("yield"),
            "goto_statement" | "labeled_statement" => unsupported("goto"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_expr_stmt(&mut self, node: Node) -> ReadResult<Stmt> {
        match node.kind() {
            "assignment_expression" => {
                let target = self.read_target(field(node, "left")?)?;
                let right = field(node, "right")?;
                let op_text = operator_text(node, self.source)
                    .ok_or_else(|| self.parse_error(node, "missing operator"))?;
                if op_text == "=" {
                    let value = self.read_expr(right)?;
                    if let Expr::Ident(_) = &target {
                        self.env.bind_assignment(&target, &value, &Type::any(), false);
                    }
                    return Ok(Stmt::assign(target, value));
                }
                let value = self.read_expr(right)?;
                let op = binary_op(op_text.trim_end_matches('='))
                    .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                let op = self.int_division(op, &target, &value);
                Ok(Stmt::assign(target.clone(), Expr::binary(target, op, value)))
            }
            "postfix_unary_expression" | "prefix_unary_expression" => {
                let text = self.node_text(node);
                let op = if text.contains("++") {
                    BinaryOp::Add
                } else if text.contains("--") {
                    BinaryOp::Sub
                } else {
                    return Ok(Stmt::Expr(self.read_expr(node)?));
                };
                let operand = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "missing operand"))?;
                let target = self.read_target(operand)?;
                Ok(Stmt::assign(target.clone(), Expr::binary(target, op, Expr::int(1))))
            }
            _ => Ok(Stmt::Expr(self.read_expr(node)?)),
        }
    }

    fn read_target(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" | "member_access_expression" | "element_access_expression" => {
                self.read_expr(node)
            }
            _ => unsupported("assignment target"),
        }
    }

    fn read_if(&mut self, node: Node) -> ReadResult<Stmt> {
        let test = self.read_expr(field(node, "condition")?)?;
        let then_body = self.read_block(field(node, "consequence")?)?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        let mut alt = node.child_by_field_name("alternative");
        while let Some(branch) = alt {
            if branch.kind() == "if_statement" {
                let test = self.read_expr(field(branch, "condition")?)?;
                let body = self.read_block(field(branch, "consequence")?)?;
                elifs.push(ElseIf { test, body });
                alt = branch.child_by_field_name("alternative");
            } else {
                else_body = Some(self.read_block(branch)?);
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
        let init = match node.child_by_field_name("initializer") {
            Some(n) if n.kind() == "variable_declaration" => {
                let mut vars = self.read_variables(n)?;
                let (Some((name, ty, Some(value))), true) = (vars.pop(), vars.is_empty()) else {
                    return unsupported("multi-variable loop initializer");
                };
                let target = Expr::ident(name);
                self.env.bind_assignment(&target, &value, &ty, true);
                Some(Stmt::Assign {
                    target,
                    value,
                    ty,
                    declare: true,
                })
            }
            Some(n) => Some(self.read_expr_stmt(n)?),
            None => None,
        };
        let test = match node.child_by_field_name("condition") {
            Some(n) => Some(self.read_expr(n)?),
            None => None,
        };
        let update = match node.child_by_field_name("update") {
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

    /// `foreach (var x in xs)`, `foreach (var (k, v) in map)` and the
    /// indexed `xs.Select((v, i) => (v, i))` form.
    fn read_foreach(&mut self, node: Node) -> ReadResult<Stmt> {
        let left = field(node, "left")?;
        let right = field(node, "right")?;
        let names: Vec<String> = match left.kind() {
            "identifier" => vec![self.node_text(left).to_string()],
            "tuple_pattern" | "parenthesized_variable_designation" => named_children(left)
                .into_iter()
                .map(|n| self.node_text(n).trim().to_string())
                .collect(),
            _ => return unsupported("loop destructuring"),
        };
        let mut stmt = match names.as_slice() {
            [value] => {
                let iterable = self.read_iterable(right)?;
                Stmt::ForEach {
                    mode: IterMode::Items,
                    key: None,
                    value: value.clone(),
                    iterable,
                    body: Vec::new(),
                }
            }
            [first, second] => match self.indexed_source(right)? {
                Some(iterable) => Stmt::ForEach {
                    mode: IterMode::Indexed,
                    key: Some(second.clone()),
                    value: first.clone(),
                    iterable,
                    body: Vec::new(),
                },
                None => {
                    let iterable = self.read_expr(right)?;
                    if !self.env.type_of(&iterable).is_map() && !matches!(iterable, Expr::Ident(_)) {
                        return unsupported("loop destructuring");
                    }
                    Stmt::ForEach {
                        mode: IterMode::Entries,
                        key: Some(first.clone()),
                        value: second.clone(),
                        iterable,
                        body: Vec::new(),
                    }
                }
            },
            _ => return unsupported("loop destructuring"),
        };
        self.env.bind_loop(&stmt);
        let body = self.read_block(field(node, "body")?)?;
        if let Stmt::ForEach { body: b, .. } = &mut stmt {
            *b = body;
        }
        Ok(stmt)
    }

    /// `m.Keys` and `s.Select(c => c.ToString())` walk the map or string
    /// itself.
    fn read_iterable(&mut self, node: Node) -> ReadResult<Expr> {
        let expr = self.read_expr(node)?;
        Ok(match expr {
            Expr::Operation { op: Op::Keys, mut args } if args.len() == 1 => args.remove(0),
            Expr::Comprehension(c)
                if c.filter.is_none()
                    && self.env.type_of(&c.source).is_string()
                    && matches!(&c.transform, Expr::Operation { op: Op::ToString, args }
                        if matches!(&args[..], [Expr::Ident(v)] if *v == c.var)) =>
            {
                c.source
            }
            other => other,
        })
    }

    /// The source of `xs.Select((v, i) => (v, i))`.
    fn indexed_source(&mut self, node: Node) -> ReadResult<Option<Expr>> {
        if node.kind() != "invocation_expression" {
            return Ok(None);
        }
        let func = field(node, "function")?;
        if func.kind() != "member_access_expression"
            || self.node_text(field(func, "name")?) != "Select"
        {
            return Ok(None);
        }
        let args = named_children(field(node, "arguments")?);
        let [arg] = args[..] else {
            return Ok(None);
        };
        let lambda_text: String = self.node_text(arg).split_whitespace().collect();
        if !lambda_text.contains("=>(") || !lambda_text.starts_with('(') {
            return Ok(None);
        }
        let source = self.read_expr(field(func, "expression")?)?;
        Ok(Some(source))
    }

    fn read_try(&mut self, node: Node) -> ReadResult<Stmt> {
        let body = self.read_block(field(node, "body")?)?;
        let mut handlers = Vec::new();
        let mut finally = None;
        for clause in named_children(node) {
            match clause.kind() {
                "catch_clause" => {
                    if named_children(clause).iter().any(|c| c.kind() == "catch_filter_clause") {
                        return unsupported("exception filter");
                    }
                    let decl = named_children(clause)
                        .into_iter()
                        .find(|c| c.kind() == "catch_declaration");
                    let (exception, binding) = match decl {
                        Some(d) => {
                            let ty = self.node_text(field(d, "type")?);
                            let binding = d.child_by_field_name("name").map(|n| self.node_text(n).to_string());
                            let exception = match ty {
                                "Exception" | "System.Exception" => None,
                                other => Some(idioms::canonical_exception(LANG, other)),
                            };
                            (exception, binding)
                        }
                        None => (None, None),
                    };
                    self.env.push_scope();
                    if let Some(b) = &binding {
                        let class = exception.clone().unwrap_or_else(|| "Exception".to_string());
                        self.env.declare(b, Type::named(class));
                    }
                    let body = self.read_block(field(clause, "body")?);
                    self.env.pop_scope();
                    handlers.push(Catch {
                        exception,
                        binding,
                        body: body?,
                    });
                }
                "finally_clause" => {
                    let block = named_children(clause)
                        .into_iter()
                        .find(|c| c.kind() == "block")
                        .ok_or_else(|| self.parse_error(clause, "finally without block"))?;
                    finally = Some(self.read_block(block)?);
                }
                _ => {}
            }
        }
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// An initializer read against its declared type: `{ 1, 2 }` array
    /// initializers need it.
    fn read_expr_as(&mut self, node: Node, ty: &Type) -> ReadResult<Expr> {
        match node.kind() {
            "initializer_expression" if ty.is_sequence() => self.read_items(node).map(Expr::Array),
            _ => self.read_expr(node),
        }
    }

    fn read_items(&mut self, node: Node) -> ReadResult<Vec<Expr>> {
        named_children(node)
            .into_iter()
            .map(|c| self.read_expr(c))
            .collect()
    }

    fn read_arguments(&mut self, list: Node) -> ReadResult<Vec<Expr>> {
        let mut args = Vec::new();
        for arg in named_children(list) {
            if arg.child_by_field_name("name").is_some()
                || named_children(arg).iter().any(|c| c.kind() == "name_colon")
            {
                return unsupported("named argument");
            }
            if children(arg).iter().any(|c| matches!(c.kind(), "ref" | "out" | "in")) {
                return unsupported("by-reference argument");
            }
            let value = match arg.kind() {
                "argument" => named_children(arg)
                    .into_iter()
                    .last()
                    .ok_or_else(|| self.parse_error(arg, "empty argument"))?,
                _ => arg,
            };
            args.push(self.read_expr(value)?);
        }
        Ok(args)
    }

    fn read_expr(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" => Ok(Expr::ident(self.node_text(node))),
            "this" | "this_expression" => Ok(Expr::This),
            "base" | "base_expression" => Ok(Expr::ident("super")),
            "integer_literal" => int_literal(self.node_text(node))
                .map(Expr::Literal)
                .ok_or_else(|| self.parse_error(node, "invalid number")),
            "real_literal" => {
                let text = self.node_text(node).trim_end_matches(['d', 'D', 'f', 'F', 'm', 'M']);
                match number_literal(text) {
                    Some(Literal::Int(n)) => Ok(Expr::float(n as f64)),
                    Some(lit) => Ok(Expr::Literal(lit)),
                    None => Err(self.parse_error(node, "invalid number")),
                }
            }
            "string_literal" => Ok(Expr::string(unescape(&string_body(self.node_text(node))))),
            "verbatim_string_literal" => {
                let text = self.node_text(node);
                let inner = text.get(2..text.len().saturating_sub(1)).unwrap_or("");
                Ok(Expr::string(inner.replace("\"\"", "\"")))
            }
            "raw_string_literal" => {
                let text = self.node_text(node);
                let quotes = text.len() - text.trim_start_matches('"').len();
                let inner = text.get(quotes..text.len().saturating_sub(quotes)).unwrap_or("");
                Ok(Expr::string(inner))
            }
            "character_literal" => {
                let text = self.node_text(node);
                let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or("");
                Ok(Expr::string(unescape(inner)))
            }
            "boolean_literal" => Ok(Expr::bool(self.node_text(node) == "true")),
            "null_literal" => Ok(Expr::null()),
            "interpolated_string_expression" => self.read_interpolated(node),
            "binary_expression" => self.read_binary(node),
            "prefix_unary_expression" => {
                let operand = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "missing operand"))?;
                let text = self.node_text(node);
                if text.starts_with("++") || text.starts_with("--") {
                    return unsupported("increment in expression");
                }
                let operand = self.read_expr(operand)?;
                match text.chars().next() {
                    Some('!') => Ok(Expr::unary(UnaryOp::Not, operand)),
                    Some('-') => Ok(match operand {
                        Expr::Literal(Literal::Int(n)) => Expr::int(-n),
                        Expr::Literal(Literal::Float(n)) => Expr::float(-n),
                        other => Expr::unary(UnaryOp::Neg, other),
                    }),
                    Some('~') => Ok(Expr::unary(UnaryOp::BitNot, operand)),
                    Some('+') => Ok(operand),
                    Some('^') => match operand {
                        Expr::Literal(Literal::Int(n)) => Ok(Expr::int(-n)),
                        _ => unsupported("index from end"),
                    },
                    _ => unsupported("unary operator"),
                }
            }
            "postfix_unary_expression" => {
                let text = self.node_text(node);
                if text.ends_with('!') {
                    let operand = named_children(node)
                        .into_iter()
                        .next()
                        .ok_or_else(|| self.parse_error(node, "missing operand"))?;
                    return self.read_expr(operand);
                }
                unsupported("increment in expression")
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_expr(inner),
                None => Err(self.parse_error(node, "empty parentheses")),
            },
            "invocation_expression" => self.read_invocation(node),
            "member_access_expression" => {
                let object_node = field(node, "expression")?;
                let name = self.node_text(field(node, "name")?);
                if self.holders.contains(self.node_text(object_node)) {
                    return Ok(Expr::ident(name));
                }
                let object = self.read_expr(object_node)?;
                if !self.is_user_object(&object)
                    && let Some(op) = idioms::recognize_property(LANG, name)
                {
                    return Ok(self.operation(op, vec![object]));
                }
                Ok(Expr::member(object, name))
            }
            "element_access_expression" => {
                let object = self.read_expr(field(node, "expression")?)?;
                let subscript = field(node, "subscript")?;
                let mut index = self.read_arguments(subscript)?;
                if index.len() != 1 {
                    return unsupported("multi-dimensional index");
                }
                Ok(Expr::index(object, index.remove(0)))
            }
            "object_creation_expression" => self.read_new(node),
            "array_creation_expression" | "implicit_array_creation_expression" => {
                if named_children(node)
                    .iter()
                    .any(|c| c.kind() == "array_type" && self.node_text(*c).contains(|ch: char| ch.is_ascii_digit()))
                {
                    return unsupported("sized array");
                }
                match named_children(node).into_iter().find(|c| c.kind() == "initializer_expression") {
                    Some(init) => self.read_items(init).map(Expr::Array),
                    None => unsupported("sized array"),
                }
            }
            "collection_expression" => {
                if named_children(node).iter().any(|c| c.kind() == "spread_element") {
                    return unsupported("spread");
                }
                self.read_items(node).map(Expr::Array)
            }
            "initializer_expression" => self.read_items(node).map(Expr::Array),
            "conditional_expression" => {
                let test = self.read_expr(field(node, "condition")?)?;
                let then = self.read_expr(field(node, "consequence")?)?;
                let otherwise = self.read_expr(field(node, "alternative")?)?;
                Ok(Expr::ternary(test, then, otherwise))
            }
            "lambda_expression" => self.read_lambda(node),
            "cast_expression" => {
                let ty = parse_type(self.node_text(field(node, "type")?));
                let value = self.read_expr(field(node, "value")?)?;
                let current = self.env.type_of(&value);
                if ty.is_int() && !current.is_int() {
                    Ok(self.operation(Op::ToInt, vec![value]))
                } else if ty.is_float() && !current.is_float() {
                    Ok(self.operation(Op::ToFloat, vec![value]))
                } else {
                    Ok(value)
                }
            }
            "await_expression" => match named_children(node).into_iter().next() {
                Some(inner) => Ok(Expr::Await(Box::new(self.read_expr(inner)?))),
                None => Err(self.parse_error(node, "await without operand")),
            },
            "assignment_expression" => unsupported("assignment in expression"),
            "is_expression" | "is_pattern_expression" | "as_expression" => unsupported("type test"),
            "switch_expression" => unsupported("switch expression"),
            "tuple_expression" => unsupported("tuple"),
            "typeof_expression" | "sizeof_expression" | "default_expression" => {
                unsupported(node.kind().replace('_', " "))
            }
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_binary(&mut self, node: Node) -> ReadResult<Expr> {
        let left = self.read_expr(field(node, "left")?)?;
        let right = self.read_expr(field(node, "right")?)?;
        let op_text = operator_text(node, self.source)
            .ok_or_else(|| self.parse_error(node, "missing operator"))?;
        if op_text == "??" {
            return Ok(Expr::ternary(
                Expr::binary(left.clone(), BinaryOp::Ne, Expr::null()),
                left,
                right,
            ));
        }
        let op = binary_op(op_text).ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
        let op = self.int_division(op, &left, &right);
        Ok(Expr::binary(left, op, right))
    }

    /// `/` between two ints truncates in C#.
    fn int_division(&self, op: BinaryOp, left: &Expr, right: &Expr) -> BinaryOp {
        if op == BinaryOp::Div
            && self.env.type_of(left).is_int()
            && self.env.type_of(right).is_int()
        {
            BinaryOp::FloorDiv
        } else {
            op
        }
    }

    /// True when `object` is typed as a class defined in this module.
    fn is_user_object(&self, object: &Expr) -> bool {
        matches!(object, Expr::This)
            || matches!(
                &self.env.type_of(object).kind,
                TypeKind::Named(class) if self.classes.contains(class)
            )
    }

    fn operation(&self, op: Op, args: Vec<Expr>) -> Expr {
        let op = match args.first() {
            Some(first) => op.refine(&self.env.type_of(first)),
            None => op,
        };
        Expr::op(op, args)
    }

    fn read_invocation(&mut self, node: Node) -> ReadResult<Expr> {
        let func = field(node, "function")?;
        let args = self.read_arguments(field(node, "arguments")?)?;
        match func.kind() {
            "identifier" | "generic_name" => {
                let name = base_name(self.node_text(func));
                if self.functions.contains(name) || self.env.is_bound(name) {
                    return Ok(Expr::call(Expr::ident(name), args));
                }
                match idioms::recognize_call(LANG, name, args) {
                    Ok((op, args)) => Ok(self.operation(op, args)),
                    Err(args) => Ok(Expr::call(Expr::ident(name), args)),
                }
            }
            "member_access_expression" => {
                let object_node = field(func, "expression")?;
                let method = base_name(self.node_text(field(func, "name")?));
                let object_text = self.node_text(object_node);
                if self.holders.contains(object_text) {
                    return Ok(Expr::call(Expr::ident(method), args));
                }
                // `Console.WriteLine`, `Math.Max`, `string.Join`
                if matches!(object_node.kind(), "identifier" | "predefined_type" | "member_access_expression")
                    && !self.env.is_bound(object_text.split('.').next().unwrap_or(""))
                    && !self.classes.contains(object_text)
                {
                    let dotted = format!("{object_text}.{method}");
                    match idioms::recognize_call(LANG, &dotted, args) {
                        Ok((op, args)) => return Ok(self.operation(op, args)),
                        Err(rest) => return self.method_call(object_node, method, rest),
                    }
                }
                self.method_call(object_node, method, args)
            }
            _ => {
                let callee = self.read_expr(func)?;
                Ok(Expr::call(callee, args))
            }
        }
    }

    fn method_call(&mut self, object_node: Node, method: &str, args: Vec<Expr>) -> ReadResult<Expr> {
        let object = match object_node.kind() {
            "predefined_type" => Expr::ident(self.node_text(object_node)),
            _ => self.read_expr(object_node)?,
        };
        if self.is_user_object(&object) || matches!(&object, Expr::Ident(s) if s == "super") {
            return Ok(Expr::call(Expr::member(object, method), args));
        }
        match (method, &args[..]) {
            ("ToList" | "ToArray", []) if matches!(object, Expr::Comprehension(_)) => return Ok(object),
            ("ToHashSet", []) => {
                if let Expr::Comprehension(mut c) = object {
                    c.kind = ComprehensionKind::Set;
                    return Ok(Expr::Comprehension(c));
                }
                return Ok(object);
            }
            ("Where" | "Select", [Expr::Lambda(lambda)])
                if lambda.params.len() == 1 && !lambda.is_async =>
            {
                let var = lambda.params[0].name.clone();
                let body = match &lambda.body {
                    LambdaBody::Expr(e) => Some((**e).clone()),
                    LambdaBody::Block(stmts) => match &stmts[..] {
                        [Stmt::Return(Some(e))] => Some(e.clone()),
                        _ => None,
                    },
                };
                if let Some(body) = body {
                    let kind = if method == "Where" { "filter" } else { "map" };
                    return Ok(chain_comprehension(object, kind, var, body));
                }
            }
            _ => {}
        }
        match idioms::recognize_method(LANG, object, method, args) {
            Ok((op, args)) => Ok(self.operation(op, args)),
            Err((object, args)) => Ok(Expr::call(Expr::member(object, method), args)),
        }
    }

    fn read_new(&mut self, node: Node) -> ReadResult<Expr> {
        let ty_text = self.node_text(field(node, "type")?);
        let args = match node.child_by_field_name("arguments") {
            Some(list) => self.read_arguments(list)?,
            None => Vec::new(),
        };
        let init = node.child_by_field_name("initializer");
        let ty = parse_type(ty_text);
        if ty.is_map() {
            if !args.is_empty() {
                return unsupported("dictionary capacity");
            }
            let mut pairs = Vec::new();
            if let Some(init) = init {
                for entry in named_children(init) {
                    pairs.push(self.read_map_entry(entry)?);
                }
            }
            return Ok(Expr::Map(pairs));
        }
        if ty.is_sequence() {
            let mut args = args;
            return match (init, args.pop()) {
                (Some(init), None) => self.read_items(init).map(Expr::Array),
                (None, None) => Ok(Expr::Array(vec![])),
                // `new List<int>(other)` copies.
                (None, Some(items @ Expr::Array(_))) if args.is_empty() => Ok(items),
                _ => unsupported("collection capacity"),
            };
        }
        if init.is_some() {
            return unsupported("object initializer");
        }
        Ok(Expr::Construct {
            class: idioms::canonical_exception(LANG, base_name(ty_text)),
            args,
        })
    }

    /// `["a"] = 1` or `{ "a", 1 }` inside a dictionary initializer.
    fn read_map_entry(&mut self, entry: Node) -> ReadResult<(Expr, Expr)> {
        match entry.kind() {
            "assignment_expression" => {
                let left = field(entry, "left")?;
                let list = match left.kind() {
                    "bracketed_argument_list" => Some(left),
                    _ => named_children(left).into_iter().next(),
                };
                let key = match list {
                    Some(list) if list.kind() == "bracketed_argument_list" => {
                        let mut keys = self.read_arguments(list)?;
                        if keys.len() != 1 {
                            return unsupported("dictionary initializer");
                        }
                        keys.remove(0)
                    }
                    _ => return unsupported("dictionary initializer"),
                };
                let value = self.read_expr(field(entry, "right")?)?;
                Ok((key, value))
            }
            "initializer_expression" => {
                let mut items = self.read_items(entry)?;
                if items.len() != 2 {
                    return unsupported("dictionary initializer");
                }
                let value = items.remove(1);
                Ok((items.remove(0), value))
            }
            _ => unsupported("dictionary initializer"),
        }
    }

    fn read_lambda(&mut self, node: Node) -> ReadResult<Expr> {
        let is_async = self.has_modifier(node, "async")
            || children(node).iter().any(|c| c.kind() == "async");
        let params_node = field(node, "parameters")?;
        let params = match params_node.kind() {
            "identifier" | "implicit_parameter" => {
                vec![Param::new(self.node_text(params_node), Type::any())]
            }
            _ => self.read_params(params_node)?,
        };
        let body_node = field(node, "body")?;
        self.env.push_scope();
        self.env.bind_params(&params);
        let body = match body_node.kind() {
            "block" => self.read_block(body_node).map(LambdaBody::Block).map_err(ReadFail::from),
            _ => self.read_expr(body_node).map(|e| LambdaBody::Expr(Box::new(e))),
        };
        self.env.pop_scope();
        Ok(Expr::Lambda(Box::new(Lambda {
            params,
            body: body?,
            is_async,
        })))
    }

    fn read_interpolated(&mut self, node: Node) -> ReadResult<Expr> {
        let text = self.node_text(node);
        let verbatim = text.starts_with("$@") || text.starts_with("@$");
        if text.starts_with("$$") || text.contains("\"\"\"") {
            return unsupported("raw interpolated string");
        }
        let open = text
            .find('"')
            .ok_or_else(|| self.parse_error(node, "malformed interpolated string"))?;
        let start = node.start_byte() + open + 1;
        let end = node.end_byte().saturating_sub(1).max(start);
        let decode = |raw: &str| {
            let raw = raw.replace("{{", "{").replace("}}", "}");
            if verbatim {
                raw.replace("\"\"", "\"")
            } else {
                unescape(&raw)
            }
        };
        let mut parts = Vec::new();
        let mut pos = start;
        for child in named_children(node) {
            if child.kind() != "interpolation" {
                continue;
            }
            if child.start_byte() > pos {
                parts.push(FormatPart::Text(decode(&self.source[pos..child.start_byte()])));
            }
            let inner = named_children(child)
                .into_iter()
                .find(|c| !c.kind().starts_with("interpolation_"))
                .ok_or_else(|| self.parse_error(child, "empty interpolation"))?;
            parts.push(FormatPart::Expr(self.read_expr(inner)?));
            pos = child.end_byte();
        }
        if end > pos {
            parts.push(FormatPart::Text(decode(&self.source[pos..end])));
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
}

/// The `variable_declaration` inside a field declaration.
fn field_declaration(member: Node) -> ReadResult<Node> {
    named_children(member)
        .into_iter()
        .find(|c| c.kind() == "variable_declaration")
        .ok_or_else(|| ReadFail::Unsupported("field declaration".into()))
}

fn declarator_name(declarator: Node) -> ReadResult<Node> {
    declarator
        .child_by_field_name("name")
        .or_else(|| declarator.named_child(0))
        .ok_or_else(|| ReadFail::Unsupported("declarator".into()))
}

/// The initializer of a declarator, with or without an
/// `equals_value_clause` wrapper.
fn declarator_value(declarator: Node) -> Option<Node> {
    let name = declarator_name(declarator).ok()?;
    let value = named_children(declarator)
        .into_iter()
        .find(|c| c.id() != name.id() && c.kind() != "bracketed_argument_list")?;
    match value.kind() {
        "equals_value_clause" => value.named_child(0),
        _ => Some(value),
    }
}

/// A parameter's default value.
fn default_value<'t>(param: Node<'t>, name: Node<'t>) -> Option<Node<'t>> {
    let ty = param.child_by_field_name("type").map(|t| t.id());
    let value = named_children(param)
        .into_iter()
        .filter(|c| c.id() != name.id() && Some(c.id()) != ty)
        .find(|c| !matches!(c.kind(), "modifier" | "attribute_list"))?;
    match value.kind() {
        "equals_value_clause" => value.named_child(0),
        _ => Some(value),
    }
}

/// The operator token of a binary or assignment node.
fn operator_text<'s>(node: Node, source: &'s str) -> Option<&'s str> {
    if let Some(op) = node.child_by_field_name("operator") {
        return Some(ts::text(op, source));
    }
    children(node)
        .into_iter()
        .find(|c| !c.is_named())
        .map(|c| ts::text(c, source))
}

fn string_body(text: &str) -> String {
    let t = text.trim();
    match t.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => t.to_string(),
    }
}

/// `42`, `42L`, `0xFFu`, `-3`
fn int_literal(text: &str) -> Option<Literal> {
    let t = text.trim().trim_end_matches(['u', 'U', 'l', 'L']);
    let digits = t.trim_start_matches('-');
    let radix = matches!(digits.get(..2), Some("0x" | "0X" | "0b" | "0B"));
    if !radix && digits.len() > 1 && digits.starts_with('0') {
        // C# has no octal literals.
        return t.parse::<i64>().ok().map(Literal::Int);
    }
    number_literal(t)
}

/// `IComparable`, `IEnumerable<T>`: the .NET interface naming convention.
fn is_interface_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Last segment of a dotted name without generic arguments.
fn base_name(text: &str) -> &str {
    let t = text.trim();
    let t = t.split('<').next().unwrap_or(t);
    t.rsplit('.').next().unwrap_or(t).trim()
}

fn binary_op(op: &str) -> Option<BinaryOp> {
    Some(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
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

/// Parse a C# type.
pub(crate) fn parse_type(text: &str) -> Type {
    let t = text.trim();
    if let Some(inner) = t.strip_suffix('?') {
        return Type::optional_of(parse_type(inner));
    }
    if let Some(inner) = t.strip_suffix("[]") {
        return Type::seq(parse_type(inner));
    }
    if let Some(open) = t.find('<')
        && let Some(inner) = t[open + 1..].strip_suffix('>')
    {
        let args: Vec<Type> = split_top_level(inner, ',').into_iter().map(parse_type).collect();
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        return match base_name(&t[..open]) {
            "List" | "IList" | "IEnumerable" | "ICollection" | "IReadOnlyList"
            | "IReadOnlyCollection" | "HashSet" | "ISet" | "SortedSet" | "Queue" | "Stack"
            | "LinkedList" => Type::seq(arg(0)),
            "Dictionary" | "IDictionary" | "IReadOnlyDictionary" | "SortedDictionary" => {
                Type::map(arg(0), arg(1))
            }
            "Nullable" => Type::optional_of(arg(0)),
            "Task" | "ValueTask" => arg(0),
            "Func" => match args.split_last() {
                Some((ret, params)) => Type::function(params.to_vec(), ret.clone()),
                None => Type::any(),
            },
            "Action" => Type::function(args.clone(), Type::void()),
            other => Type::named(other),
        };
    }
    match t {
        "int" | "long" | "short" | "byte" | "sbyte" | "uint" | "ulong" | "ushort" | "Int32"
        | "Int64" => Type::int(),
        "double" | "float" | "decimal" | "Double" | "Single" => Type::float(),
        "string" | "char" | "String" => Type::string(),
        "bool" | "Boolean" => Type::bool(),
        "void" | "Task" | "ValueTask" => Type::void(),
        "Action" => Type::function(vec![], Type::void()),
        "object" | "dynamic" | "var" | "Object" | "" => Type::any(),
        other => Type::named(base_name(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Module {
        read_csharp(src).unwrap()
    }

    #[test]
    fn test_program_class_is_the_module() {
        let src = r#"
using System;

public static class Program
{
    public const int Limit = 3;

    public static int add(int a, int b)
    {
        return a + b;
    }

    public static void Main()
    {
        var total = add(2, 3);
        Console.WriteLine(total);
    }
}
"#;
        let module = read(src);
        assert_eq!(module.imports[0].module, "System");
        assert_eq!(module.variables[0].name, "Limit");
        assert!(module.variables[0].constant);
        let add = module.function("add").unwrap();
        assert_eq!(add.params[0].ty, Type::int());
        assert_eq!(add.ret, Type::int());
        assert!(!add.is_static);
        assert!(module.classes.is_empty());
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Call { .. }, declare: true, .. }
        ));
        assert!(matches!(
            &module.statements[1],
            Stmt::Expr(Expr::Operation { op: Op::Print, .. })
        ));
    }

    #[test]
    fn test_file_scoped_namespace_and_class() {
        let src = r#"
namespace Acme.Shapes;

public class Shape
{
    public string name;

    public Shape(string name)
    {
        this.name = name;
    }
}

public class Circle : Shape
{
    public double radius = 1.0;

    public Circle(double radius) : base("circle")
    {
        this.radius = radius;
    }

    public double Area()
    {
        return 3.14 * radius * radius;
    }

    public static Circle Unit()
    {
        return new Circle(1.0);
    }
}
"#;
        let module = read(src);
        assert_eq!(module.classes.len(), 2);
        let circle = module.class("Circle").unwrap();
        assert_eq!(circle.base.as_deref(), Some("Shape"));
        assert_eq!(circle.property("radius").unwrap().default, Some(Expr::float(1.0)));
        let ctor = circle.constructor().unwrap();
        assert!(matches!(
            &ctor.body[0],
            Stmt::Expr(Expr::Call { callee, args }) if **callee == Expr::ident("super") && args.len() == 1
        ));
        assert!(!circle.method("Area").unwrap().is_static);
        assert!(circle.method("Unit").unwrap().is_static);
    }

    #[test]
    fn test_loops() {
        let src = r#"
public static class Program
{
    public static int Sum(List<int> xs, Dictionary<string, int> m)
    {
        var total = 0;
        for (var i = 0; i < xs.Count; i++)
        {
            total += xs[i];
        }
        foreach (var x in xs)
        {
            total += x;
        }
        foreach (var (k, v) in m)
        {
            total += v;
        }
        while (total > 100)
        {
            total /= 2;
        }
        return total;
    }
}
"#;
        let module = read(src);
        let body = &module.function("Sum").unwrap().body;
        assert!(matches!(
            &body[1],
            Stmt::ForRange { var, end: Expr::Operation { op: Op::SeqLength, .. }, step: None, .. } if var == "i"
        ));
        assert!(matches!(&body[2], Stmt::ForEach { mode: IterMode::Items, value, .. } if value == "x"));
        assert!(matches!(
            &body[3],
            Stmt::ForEach { mode: IterMode::Entries, key: Some(k), value, .. } if k == "k" && value == "v"
        ));
        let Stmt::While { body: inner, .. } = &body[4] else {
            panic!("expected while, got {:?}", body[4]);
        };
        assert!(matches!(
            &inner[0],
            Stmt::Assign { value: Expr::Binary { op: BinaryOp::FloorDiv, .. }, .. }
        ));
    }

    #[test]
    fn test_collections_and_linq() {
        let src = r#"
public static class Program
{
    public static void Main()
    {
        var xs = new List<int> { 1, -2, 3 };
        var m = new Dictionary<string, int> { ["a"] = 1 };
        var doubled = xs.Where(x => x > 0).Select(x => x * 2).ToList();
        xs.Add(4);
        var joined = string.Join(",", xs);
    }
}
"#;
        let module = read(src);
        let stmts = &module.statements;
        assert!(matches!(&stmts[0], Stmt::Assign { value: Expr::Array(items), .. } if items.len() == 3));
        assert!(matches!(&stmts[1], Stmt::Assign { value: Expr::Map(pairs), .. } if pairs.len() == 1));
        let Stmt::Assign { value: Expr::Comprehension(c), .. } = &stmts[2] else {
            panic!("expected comprehension, got {:?}", stmts[2]);
        };
        assert_eq!(c.var, "x");
        assert!(c.filter.is_some());
        assert!(matches!(&c.transform, Expr::Binary { op: BinaryOp::Mul, .. }));
        assert!(matches!(&stmts[3], Stmt::Expr(Expr::Operation { op: Op::Append, .. })));
        assert!(matches!(&stmts[4], Stmt::Assign { value: Expr::Operation { op: Op::Join, .. }, .. }));
    }

    #[test]
    fn test_try_catch_and_throw() {
        let src = r#"
public static class Program
{
    public static int Parse(string s)
    {
        try
        {
            if (s.Length == 0)
            {
                throw new ArgumentException("empty");
            }
            return int.Parse(s);
        }
        catch (ArgumentException e)
        {
            return -1;
        }
        finally
        {
            Console.WriteLine("done");
        }
    }
}
"#;
        let module = read(src);
        let Stmt::Try {
            body,
            handlers,
            finally,
        } = &module.function("Parse").unwrap().body[0]
        else {
            panic!("expected try");
        };
        let Stmt::If { test, then_body, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(matches!(test, Expr::Binary { left, .. }
            if matches!(&**left, Expr::Operation { op: Op::StrLength, .. })));
        assert!(matches!(&then_body[0], Stmt::Throw(Expr::Construct { class, .. }) if class == "ValueError"));
        assert!(matches!(&body[1], Stmt::Return(Some(Expr::Operation { op: Op::ToInt, .. }))));
        assert_eq!(handlers[0].exception.as_deref(), Some("ValueError"));
        assert_eq!(handlers[0].binding.as_deref(), Some("e"));
        assert!(finally.is_some());
    }

    #[test]
    fn test_interpolated_string() {
        let src = "public static class Program\n{\n    public static void Main()\n    {\n        var n = 2;\n        Console.WriteLine($\"n={n}!\");\n    }\n}\n";
        let module = read(src);
        let Stmt::Expr(Expr::Operation { args, .. }) = &module.statements[1] else {
            panic!("expected print");
        };
        assert_eq!(
            args[0],
            Expr::Format(vec![
                FormatPart::Text("n=".into()),
                FormatPart::Expr(Expr::ident("n")),
                FormatPart::Text("!".into()),
            ])
        );
    }

    #[test]
    fn test_enums() {
        let src = r#"
public enum Level
{
    Low,
    High = 5,
}

public static class Color
{
    public const string Red = "red";
}
"#;
        let module = read(src);
        assert_eq!(module.enums.len(), 2);
        assert_eq!(module.enums[0].variants[1].value, Some(Literal::Int(5)));
        assert_eq!(
            module.enums[1].variants[0].value,
            Some(Literal::String("red".into()))
        );
    }

    #[test]
    fn test_unsupported_statement_is_marker() {
        let src = "public static class Program\n{\n    public static void Main()\n    {\n        lock (this) { }\n        var x = 1;\n    }\n}\n";
        let module = read(src);
        assert!(matches!(&module.statements[0], Stmt::Unsupported(u) if u.kind == "lock"));
        assert!(matches!(&module.statements[1], Stmt::Assign { .. }));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("List<int>"), Type::seq(Type::int()));
        assert_eq!(
            parse_type("Dictionary<string, List<double>>"),
            Type::map(Type::string(), Type::seq(Type::float()))
        );
        assert_eq!(parse_type("int?"), Type::optional_of(Type::int()));
        assert_eq!(parse_type("string[]"), Type::seq(Type::string()));
        assert_eq!(
            parse_type("Func<int, bool>"),
            Type::function(vec![Type::int()], Type::bool())
        );
    }

    #[test]
    fn test_syntax_error() {
        let err = read_csharp("public class A {\n    int x = ;\n}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
