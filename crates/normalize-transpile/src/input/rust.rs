//! Rust reader.
//!
//! Structs become classes. Methods come from inherent and trait `impl`
//! blocks, and an associated `fn new(..) -> Self` that ends in a struct
//! literal becomes the constructor; a struct without one gets a constructor
//! taking every field in declaration order. The body of `fn main` becomes
//! the module's top-level statements.
//!
//! Macro arguments are token trees to tree-sitter. The arguments of the
//! macros the IR models (`println!`, `format!`, `vec!`, `panic!`, `assert!`)
//! are re-parsed as a call's argument list and read like any other call.

use super::ts::{self, children, field, named_children, span};
use super::{
    Fields, ReadFail, ReadResult, field_constructor, hoist_declarations, is_zero_value,
    number_literal, recover, split_top_level, unescape, unsupported, zero_value,
};
use crate::error::ParseError;
use crate::idioms::{self, Op};
use crate::infer::TypeEnv;
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Reader;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tree_sitter::Node;

/// Rust reader.
pub struct RustReader;

/// Static instance of the Rust reader for registry.
pub static RUST_READER: RustReader = RustReader;

impl Reader for RustReader {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn read(&self, source: &str) -> Result<Module, ParseError> {
        read_rust(source)
    }
}

/// Parse Rust source into IR.
pub fn read_rust(source: &str) -> Result<Module, ParseError> {
    let tree = ts::parse(arborium_rust::language().into(), source)?;
    let mut ctx = ReadContext::new(source);
    ctx.read_module(tree.root_node())
}

/// Names declared at module level, known before any body is read.
#[derive(Debug, Default)]
struct Items {
    structs: HashMap<String, Fields>,
    /// Structs whose `new` is read as the constructor.
    constructed: HashSet<String>,
    enums: HashSet<String>,
    functions: HashSet<String>,
}

/// What the last expression of a block means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Discard,
    Return,
}

const PRINT_MACROS: &[&str] = &["println", "print", "eprintln", "eprint"];
const PANIC_MACROS: &[&str] = &["panic", "unreachable", "todo", "unimplemented"];
const ASSERT_MACROS: &[&str] = &["assert", "assert_eq", "assert_ne", "debug_assert", "debug_assert_eq", "debug_assert_ne"];

struct ReadContext<'a> {
    source: &'a str,
    items: Rc<Items>,
    /// Type whose `impl` block is being read; `Self` names it.
    class: Option<String>,
    /// Reading a constructor: `this` is the struct under construction and
    /// its literal is not a call.
    building: bool,
    env: TypeEnv<'static>,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            items: Rc::default(),
            class: None,
            building: false,
            env: TypeEnv::new(),
        }
    }

    /// Context over re-parsed macro arguments, sharing this one's state.
    fn nested<'b>(&mut self, source: &'b str) -> ReadContext<'b> {
        ReadContext {
            source,
            items: Rc::clone(&self.items),
            class: self.class.clone(),
            building: self.building,
            env: std::mem::take(&mut self.env),
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

    /// A type as written, with `Self` resolved to the current impl type.
    fn read_type(&self, node: Node) -> Type {
        let text = self.node_text(node);
        match &self.class {
            Some(class) if text.contains("Self") => parse_type(&replace_word(text, "Self", class)),
            _ => parse_type(text),
        }
    }

    /// `Self` or a path to a type, as a bare type name.
    fn type_name(&self, text: &str) -> String {
        match (base_name(text), &self.class) {
            ("Self", Some(class)) => class.clone(),
            (name, _) => name.to_string(),
        }
    }

    /// `///` comments directly above an item.
    fn doc_comment(&self, node: Node) -> Option<String> {
        let mut lines = Vec::new();
        let mut prev = node.prev_sibling();
        while let Some(p) = prev {
            match p.kind() {
                "attribute_item" => {}
                "line_comment" => match self.node_text(p).strip_prefix("///") {
                    Some(line) => lines.push(line.strip_prefix(' ').unwrap_or(line).trim_end()),
                    None => break,
                },
                _ => break,
            }
            prev = p.prev_sibling();
        }
        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    // ------------------------------------------------------------------
    // Module
    // ------------------------------------------------------------------

    fn read_module(&mut self, root: Node) -> Result<Module, ParseError> {
        let children = named_children(root);
        let mut module = Module::new("main");
        let mut items = Items::default();
        for child in &children {
            self.collect(*child, &mut items);
        }
        self.items = Rc::new(items);
        // Types before functions, so impls and constructors find their struct.
        for child in &children {
            let markers = recover(
                self.read_type_item(*child, &mut module),
                self.node_text(*child),
                span(*child),
            )?;
            module.statements.extend(markers);
        }
        for child in children {
            let result = self.read_top_level(child, &mut module);
            let stmts = recover(result, self.node_text(child), span(child))?;
            module.statements.extend(stmts);
        }
        for class in &mut module.classes {
            if class.constructor().is_none() {
                let fields = self.items.structs.get(&class.name).cloned().unwrap_or_default();
                class.replace_constructor(field_constructor(&fields));
            }
        }
        hoist_declarations(&mut module.statements);
        Ok(module)
    }

    /// First pass: struct fields and the names of enums, functions and
    /// constructors.
    fn collect(&self, node: Node, items: &mut Items) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.node_text(n).to_string());
        match (node.kind(), name) {
            ("struct_item", Some(name)) => {
                let fields = match node.child_by_field_name("body") {
                    Some(body) if body.kind() == "field_declaration_list" => named_children(body)
                        .into_iter()
                        .filter(|f| f.kind() == "field_declaration")
                        .filter_map(|f| {
                            let field_name = self.node_text(f.child_by_field_name("name")?);
                            let ty = parse_type(self.node_text(f.child_by_field_name("type")?));
                            Some((field_name.to_string(), ty))
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                items.structs.insert(name, fields);
            }
            ("enum_item", Some(name)) => {
                items.enums.insert(name);
            }
            ("function_item", Some(name)) => {
                items.functions.insert(name);
            }
            ("impl_item", _) => {
                let Some(ty) = node.child_by_field_name("type") else {
                    return;
                };
                let class = base_name(self.node_text(ty)).to_string();
                let Some(body) = node.child_by_field_name("body") else {
                    return;
                };
                if named_children(body)
                    .into_iter()
                    .any(|item| self.is_constructor(item, &class))
                {
                    items.constructed.insert(class);
                }
            }
            _ => {}
        }
    }

    /// `fn new(..) -> Self` without a receiver.
    fn is_constructor(&self, item: Node, class: &str) -> bool {
        item.kind() == "function_item"
            && item
                .child_by_field_name("name")
                .is_some_and(|n| self.node_text(n) == "new")
            && !has_receiver(item)
            && item
                .child_by_field_name("return_type")
                .is_some_and(|r| matches!(self.node_text(r), "Self") || self.node_text(r) == class)
    }

    fn read_type_item(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "struct_item" => {
                let name = self.node_text(field(node, "name")?).to_string();
                if node
                    .child_by_field_name("body")
                    .is_some_and(|b| b.kind() == "ordered_field_declaration_list")
                {
                    return unsupported("tuple struct");
                }
                let mut class = Class::new(name.clone());
                class.span = span(node);
                class.doc = self.doc_comment(node);
                for (field_name, ty) in self.items.structs.get(&name).cloned().unwrap_or_default() {
                    class.properties.push(Property::new(field_name, ty));
                }
                module.classes.push(class);
            }
            "enum_item" => module.enums.push(self.read_enum(node)?),
            "type_item" => {
                let name = self.node_text(field(node, "name")?).to_string();
                module.type_defs.push(TypeDef {
                    name,
                    kind: TypeDefKind::Alias(parse_type(self.node_text(field(node, "type")?))),
                    doc: self.doc_comment(node),
                });
            }
            "trait_item" => {
                let name = self.node_text(field(node, "name")?).to_string();
                self.class = Some(name.clone());
                let props = self.trait_signatures(node);
                self.class = None;
                module.type_defs.push(TypeDef {
                    name,
                    kind: TypeDefKind::Record(props?),
                    doc: self.doc_comment(node),
                });
            }
            _ => {}
        }
        Ok(vec![])
    }

    fn read_enum(&self, node: Node) -> ReadResult<Enum> {
        let name = self.node_text(field(node, "name")?).to_string();
        let mut variants = Vec::new();
        for variant in named_children(field(node, "body")?) {
            if variant.kind() != "enum_variant" {
                continue;
            }
            if variant.child_by_field_name("body").is_some() {
                return unsupported("enum with data");
            }
            let value = match variant.child_by_field_name("value") {
                Some(v) => Some(
                    number_literal(self.node_text(v))
                        .ok_or_else(|| ReadFail::Unsupported("computed discriminant".into()))?,
                ),
                None => None,
            };
            variants.push(EnumVariant {
                name: self.node_text(field(variant, "name")?).to_string(),
                value,
            });
        }
        Ok(Enum { name, variants })
    }

    /// Trait methods as function-typed record fields.
    fn trait_signatures(&self, node: Node) -> ReadResult<Vec<Property>> {
        let mut props = Vec::new();
        for item in named_children(field(node, "body")?) {
            if !matches!(item.kind(), "function_signature_item" | "function_item") {
                continue;
            }
            let name = self.node_text(field(item, "name")?).to_string();
            let params = self.signature_params(field(item, "parameters")?)?;
            let ret = self.return_type(item);
            let fty = Type::function(params.into_iter().map(|p| p.ty).collect(), ret);
            props.push(Property::new(name, fty));
        }
        Ok(props)
    }

    fn read_top_level(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "struct_item" | "enum_item" | "type_item" | "trait_item" | "attribute_item"
            | "inner_attribute_item" | "extern_crate_declaration" => Ok(vec![]),
            "use_declaration" => {
                let path = self.node_text(field(node, "argument")?);
                module.imports.push(Import::module(path));
                Ok(vec![])
            }
            "function_item" => {
                let name = self.node_text(field(node, "name")?).to_string();
                if name == "main" && self.signature_params(field(node, "parameters")?)?.is_empty() {
                    return Ok(self.read_block(field(node, "body")?, Tail::Discard)?);
                }
                let mut func = self.read_function(node, name)?;
                func.doc = self.doc_comment(node);
                module.functions.push(func);
                Ok(vec![])
            }
            "impl_item" => self.read_impl(node, module),
            "const_item" | "static_item" => {
                let name = self.node_text(field(node, "name")?).to_string();
                let ty = parse_type(self.node_text(field(node, "type")?));
                let value = self.read_static_value(field(node, "value")?)?;
                self.env.declare(&name, ty.clone());
                module.variables.push(Variable {
                    name,
                    ty,
                    value: Some(value),
                    constant: node.kind() == "const_item",
                    span: span(node),
                });
                Ok(vec![])
            }
            "mod_item" if self.is_test_module(node) => Ok(vec![]),
            "mod_item" => unsupported("module"),
            "macro_definition" => unsupported("macro definition"),
            "macro_invocation" => unsupported("macro invocation"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    /// `#[cfg(test)] mod tests { .. }`
    fn is_test_module(&self, node: Node) -> bool {
        let mut prev = node.prev_named_sibling();
        while let Some(p) = prev {
            match p.kind() {
                "attribute_item" if self.node_text(p).contains("cfg(test)") => return true,
                "attribute_item" | "line_comment" | "block_comment" => prev = p.prev_named_sibling(),
                _ => return false,
            }
        }
        false
    }

    /// `LazyLock::new(|| value)` reads as `value`.
    fn read_static_value(&mut self, node: Node) -> ReadResult<Expr> {
        if node.kind() == "call_expression"
            && let Some(func) = node.child_by_field_name("function")
            && matches!(self.node_text(func).rsplit("::").nth(1), Some("LazyLock" | "Lazy"))
            && let [closure] = named_children(field(node, "arguments")?)[..]
            && closure.kind() == "closure_expression"
        {
            let body = field(closure, "body")?;
            return match body.kind() {
                "block" => match self.single_tail(body) {
                    Some(value) => self.read_expr(value),
                    None => unsupported("lazy initializer"),
                },
                _ => self.read_expr(body),
            };
        }
        self.read_expr(node)
    }

    fn read_impl(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        let class = base_name(self.node_text(field(node, "type")?)).to_string();
        let body = field(node, "body")?;
        if self.items.enums.contains(&class) {
            return self.read_enum_impl(&class, body, module);
        }
        if !self.items.structs.contains_key(&class) {
            return unsupported("impl on non-struct type");
        }
        self.class = Some(class.clone());
        self.env.set_class(Some(&class));
        let mut markers = Vec::new();
        let mut result = Ok(());
        for item in named_children(body) {
            let read = self.read_impl_item(item, &class, module);
            match recover(read, self.node_text(item), span(item)) {
                Ok(stmts) => markers.extend(stmts),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.env.set_class(None);
        self.class = None;
        result?;
        Ok(markers)
    }

    fn read_impl_item(&mut self, item: Node, class: &str, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match item.kind() {
            "function_item" => {}
            "attribute_item" => return Ok(vec![]),
            "const_item" => return unsupported("associated constant"),
            "type_item" => return unsupported("associated type"),
            other => return unsupported(other.replace('_', " ")),
        }
        let name = self.node_text(field(item, "name")?).to_string();
        let target = module
            .classes
            .iter()
            .position(|c| c.name == class)
            .ok_or_else(|| self.parse_error(item, "impl before its struct"))?;
        if self.items.constructed.contains(class) && self.is_constructor(item, class) {
            let mut ctor = self.read_constructor(item, class)?;
            ctor.doc = self.doc_comment(item);
            module.classes[target].replace_constructor(ctor);
            return Ok(vec![]);
        }
        let mut method = self.read_function(item, name)?;
        method.is_static = !has_receiver(item);
        method.doc = self.doc_comment(item);
        module.classes[target].methods.push(method);
        Ok(vec![])
    }

    /// `impl Color { fn value(self) -> &'static str { match self { .. } } }`
    /// carries string values for the variants; anything else is unsupported.
    fn read_enum_impl(&mut self, name: &str, body: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        let items = named_children(body);
        let [item] = items[..] else {
            return unsupported("impl on enum");
        };
        let is_value = item.kind() == "function_item"
            && item
                .child_by_field_name("name")
                .is_some_and(|n| self.node_text(n) == "value");
        let matched = item
            .child_by_field_name("body")
            .and_then(|b| self.single_tail(b))
            .filter(|m| m.kind() == "match_expression");
        let (true, Some(matched)) = (is_value, matched) else {
            return unsupported("impl on enum");
        };
        let mut values = Vec::new();
        for arm in named_children(field(matched, "body")?) {
            if arm.kind() != "match_arm" {
                continue;
            }
            let pattern = self.node_text(field(arm, "pattern")?).trim();
            let value = field(arm, "value")?;
            if pattern == "_" {
                continue;
            }
            let Expr::Literal(Literal::String(s)) = self.read_expr(value)? else {
                return unsupported("impl on enum");
            };
            values.push((pattern.rsplit("::").next().unwrap_or(pattern).to_string(), s));
        }
        let en = module
            .enums
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| ReadFail::Unsupported("impl on enum".into()))?;
        for (variant, value) in values {
            if let Some(v) = en.variants.iter_mut().find(|v| v.name == variant) {
                v.value = Some(Literal::String(value));
            }
        }
        Ok(vec![])
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn read_function(&mut self, node: Node, name: String) -> ReadResult<Function> {
        self.env.push_scope();
        let result = self.read_signature_and_body(node);
        self.env.pop_scope();
        let (params, ret, body) = result?;
        let mut func =
            Function::new(name, params, ret, body).map_err(|e| self.parse_error(node, e.to_string()))?;
        func.is_async = children(node)
            .iter()
            .any(|c| c.kind() == "function_modifiers" && self.node_text(*c).contains("async"));
        func.span = span(node);
        Ok(func)
    }

    fn read_signature_and_body(&mut self, node: Node) -> ReadResult<(Vec<Param>, Type, Vec<Stmt>)> {
        let params = self.signature_params(field(node, "parameters")?)?;
        let ret = self.return_type(node);
        self.env.bind_params(&params);
        let tail = if ret.is_void() { Tail::Discard } else { Tail::Return };
        let mut body = self.read_block(field(node, "body")?, tail)?;
        hoist_declarations(&mut body);
        Ok((params, ret, body))
    }

    fn signature_params(&self, node: Node) -> ReadResult<Vec<Param>> {
        let mut params = Vec::new();
        for p in named_children(node) {
            match p.kind() {
                "self_parameter" | "attribute_item" => {}
                "parameter" => {
                    let name = pattern_name(self.node_text(field(p, "pattern")?))
                        .ok_or_else(|| ReadFail::Unsupported("destructured parameter".into()))?;
                    params.push(Param::new(name, self.read_type(field(p, "type")?)));
                }
                "variadic_parameter" => return unsupported("variadic parameter"),
                other => return unsupported(other.replace('_', " ")),
            }
        }
        Ok(params)
    }

    fn return_type(&self, node: Node) -> Type {
        match node.child_by_field_name("return_type") {
            Some(r) => self.read_type(r),
            None => Type::void(),
        }
    }

    /// Body statements, then one `this.field = value` per literal field.
    fn read_constructor(&mut self, node: Node, class: &str) -> ReadResult<Function> {
        self.building = true;
        let result = self.read_function(node, "constructor".to_string());
        self.building = false;
        let mut ctor = result?;
        let fields = self.items.structs.get(class).cloned().unwrap_or_default();
        let mut body = Vec::new();
        let mut built = false;
        for stmt in std::mem::take(&mut ctor.body) {
            match stmt {
                Stmt::Return(Some(Expr::This)) => {}
                Stmt::Return(Some(Expr::Construct { class: c, args }))
                | Stmt::Assign {
                    target: Expr::This,
                    value: Expr::Construct { class: c, args },
                    ..
                } if c == class => {
                    built = true;
                    for ((name, _), value) in fields.iter().zip(args) {
                        if !is_zero_value(&value) {
                            body.push(Stmt::assign(Expr::member(Expr::This, name.clone()), value));
                        }
                    }
                }
                other => body.push(other),
            }
        }
        if !built {
            return unsupported("constructor without struct literal");
        }
        ctor.body = body;
        ctor.ret = Type::void();
        Ok(ctor)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn read_block(&mut self, node: Node, tail: Tail) -> Result<Vec<Stmt>, ParseError> {
        self.env.push_scope();
        let nodes = named_children(node);
        let last = nodes.len().saturating_sub(1);
        let mut stmts = Vec::new();
        let mut result = Ok(());
        for (i, child) in nodes.into_iter().enumerate() {
            let read = if i == last && tail == Tail::Return && self.is_tail(child) {
                self.read_tail(child)
            } else {
                self.read_stmt(child)
            };
            match recover(read, self.node_text(child), span(child)) {
                Ok(mut read) => stmts.append(&mut read),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.env.pop_scope();
        result.map(|()| stmts)
    }

    /// An expression ending a block without a semicolon.
    fn is_tail(&self, node: Node) -> bool {
        if !is_statement(node.kind()) {
            return true;
        }
        node.kind() == "expression_statement" && !self.node_text(node).trim_end().ends_with(';')
    }

    /// The only node of a block, when it is a tail expression.
    fn single_tail<'t>(&self, block: Node<'t>) -> Option<Node<'t>> {
        match named_children(block)[..] {
            [only] if self.is_tail(only) => Some(unwrap_statement(only)),
            _ => None,
        }
    }

    /// The value of a block: returned, or spread over branches.
    fn read_tail(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let expr = unwrap_statement(node);
        match expr.kind() {
            "if_expression" => self.read_if(expr, Tail::Return),
            "match_expression" => self.read_match(expr, Tail::Return),
            "block" => Ok(self.read_block(expr, Tail::Return)?),
            "return_expression" | "break_expression" | "continue_expression" | "loop_expression"
            | "while_expression" | "for_expression" | "assignment_expression"
            | "compound_assignment_expr" => self.read_expr_stmt(expr),
            "macro_invocation" if self.is_statement_macro(expr) => self.read_expr_stmt(expr),
            _ => Ok(vec![Stmt::Return(Some(self.read_expr(expr)?))]),
        }
    }

    fn read_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "let_declaration" => self.read_let(node),
            "expression_statement" => self.read_expr_stmt(unwrap_statement(node)),
            "empty_statement" | "attribute_item" => Ok(vec![]),
            "macro_definition" => unsupported("macro definition"),
            kind if kind.ends_with("_item") => unsupported("nested item"),
            _ => self.read_expr_stmt(node),
        }
    }

    fn read_let(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        if node.child_by_field_name("alternative").is_some() {
            return unsupported("let else");
        }
        let pattern = self.node_text(field(node, "pattern")?);
        let declared = match node.child_by_field_name("type") {
            Some(t) => self.read_type(t),
            None => Type::any(),
        };
        let value = match node.child_by_field_name("value") {
            Some(v) => Some(self.read_expr(v)?),
            None => None,
        };
        if pattern.trim() == "_" {
            return Ok(value.map(Stmt::Expr).into_iter().collect());
        }
        let name = pattern_name(pattern).ok_or_else(|| ReadFail::Unsupported("destructuring".into()))?;
        let Some(value) = value else {
            self.env.declare(&name, declared.clone());
            return Ok(vec![Stmt::Declare { name, ty: declared }]);
        };
        let target = if self.building && name == "this" {
            Expr::This
        } else {
            Expr::ident(name)
        };
        self.env.bind_assignment(&target, &value, &declared, true);
        Ok(vec![Stmt::Assign {
            target,
            value,
            ty: declared,
            declare: true,
        }])
    }

    fn read_expr_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "assignment_expression" => {
                let target = self.read_target(field(node, "left")?)?;
                let value = self.read_expr(field(node, "right")?)?;
                if let Expr::Ident(_) = &target {
                    self.env.bind_assignment(&target, &value, &Type::any(), false);
                }
                Ok(vec![Stmt::assign(target, value)])
            }
            "compound_assignment_expr" => {
                let target = self.read_target(field(node, "left")?)?;
                let value = self.read_expr(field(node, "right")?)?;
                let op_text = self.node_text(field(node, "operator")?);
                let op = binary_op(op_text.trim_end_matches('='))
                    .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                let op = self.int_division(op, &target, &value);
                Ok(vec![Stmt::assign(target.clone(), Expr::binary(target, op, value))])
            }
            "if_expression" => self.read_if(node, Tail::Discard),
            "match_expression" => self.read_match(node, Tail::Discard),
            "while_expression" => {
                let test = self.read_condition(field(node, "condition")?)?;
                let body = self.read_loop_body(node)?;
                Ok(vec![Stmt::While { test, body }])
            }
            "loop_expression" => Ok(vec![Stmt::While {
                test: Expr::bool(true),
                body: self.read_loop_body(node)?,
            }]),
            "for_expression" => {
                if node.child_by_field_name("label").is_some() || has_label(node) {
                    return unsupported("labeled loop");
                }
                self.env.push_scope();
                let result = self.read_for(node);
                self.env.pop_scope();
                Ok(vec![result?])
            }
            "return_expression" => match named_children(node).into_iter().next() {
                Some(value) => Ok(vec![Stmt::Return(Some(self.read_expr(value)?))]),
                None => Ok(vec![Stmt::Return(None)]),
            },
            "break_expression" => match named_children(node).is_empty() {
                true => Ok(vec![Stmt::Break]),
                false => unsupported("labeled break"),
            },
            "continue_expression" => match named_children(node).is_empty() {
                true => Ok(vec![Stmt::Continue]),
                false => unsupported("labeled continue"),
            },
            "block" => Ok(self.read_block(node, Tail::Discard)?),
            "unsafe_block" => unsupported("unsafe block"),
            "macro_invocation" => self.read_macro_stmt(node),
            "call_expression" => {
                if let Some(stmt) = self.read_map_insert(node)? {
                    return Ok(vec![stmt]);
                }
                Ok(vec![Stmt::Expr(self.read_expr(node)?)])
            }
            _ => Ok(vec![Stmt::Expr(self.read_expr(node)?)]),
        }
    }

    fn read_loop_body(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        if has_label(node) {
            return unsupported("labeled loop");
        }
        Ok(self.read_block(field(node, "body")?, Tail::Discard)?)
    }

    /// `m.insert(k, v)` on a map is an index assignment.
    fn read_map_insert(&mut self, node: Node) -> ReadResult<Option<Stmt>> {
        let func = field(node, "function")?;
        if func.kind() != "field_expression" || self.node_text(field(func, "field")?) != "insert" {
            return Ok(None);
        }
        let map = self.read_expr(field(func, "value")?)?;
        if !self.env.type_of(&map).is_map() {
            return Ok(None);
        }
        match <[Expr; 2]>::try_from(self.read_args(node)?) {
            Ok([key, value]) => Ok(Some(Stmt::assign(Expr::index(map, key), value))),
            Err(_) => Ok(None),
        }
    }

    fn read_target(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" | "field_expression" | "index_expression" | "self" => self.read_expr(node),
            // `*slot = v` assigns through the reference.
            "unary_expression" if self.node_text(node).starts_with('*') => {
                let operand = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "missing operand"))?;
                self.read_target(operand)
            }
            _ => unsupported("assignment target"),
        }
    }

    fn read_condition(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "let_condition" | "let_chain" => unsupported("if let"),
            _ => self.read_expr(node),
        }
    }

    fn read_if(&mut self, node: Node, tail: Tail) -> ReadResult<Vec<Stmt>> {
        let test = self.read_condition(field(node, "condition")?)?;
        let then_body = self.read_block(field(node, "consequence")?, tail)?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        let mut alt = node.child_by_field_name("alternative");
        while let Some(clause) = alt {
            let Some(next) = named_children(clause).into_iter().next() else {
                break;
            };
            if next.kind() == "if_expression" {
                let test = self.read_condition(field(next, "condition")?)?;
                let body = self.read_block(field(next, "consequence")?, tail)?;
                elifs.push(ElseIf { test, body });
                alt = next.child_by_field_name("alternative");
            } else {
                else_body = Some(self.read_block(next, tail)?);
                alt = None;
            }
        }
        Ok(vec![Stmt::If {
            test,
            then_body,
            elifs,
            else_body,
        }])
    }

    /// Matches on literal and enum-variant patterns lower to an if/elif
    /// chain; `_` is the else branch.
    fn read_match(&mut self, node: Node, tail: Tail) -> ReadResult<Vec<Stmt>> {
        let subject = self.read_expr(field(node, "value")?)?;
        let mut branches = Vec::new();
        let mut default_body = None;
        for arm in named_children(field(node, "body")?) {
            if arm.kind() != "match_arm" {
                continue;
            }
            let pattern = field(arm, "pattern")?;
            if pattern.child_by_field_name("condition").is_some() {
                return unsupported("match guard");
            }
            let value = field(arm, "value")?;
            let body = match (value.kind(), tail) {
                ("block", _) => self.read_block(value, tail)?,
                (_, Tail::Return) => self.read_tail(value)?,
                (_, Tail::Discard) => self.read_expr_stmt(value)?,
            };
            if self.node_text(pattern).trim() == "_" {
                default_body = Some(body);
                continue;
            }
            let Some(pat) = named_children(pattern).into_iter().next() else {
                return unsupported("match pattern");
            };
            let test = self
                .pattern_values(pat)?
                .into_iter()
                .map(|v| Expr::binary(subject.clone(), BinaryOp::Eq, v))
                .reduce(|a, b| Expr::binary(a, BinaryOp::Or, b))
                .ok_or_else(|| self.parse_error(arm, "empty pattern"))?;
            branches.push((test, body));
        }
        let mut branches = branches.into_iter();
        let Some((test, then_body)) = branches.next() else {
            return Ok(default_body.unwrap_or_default());
        };
        Ok(vec![Stmt::If {
            test,
            then_body,
            elifs: branches.map(|(test, body)| ElseIf { test, body }).collect(),
            else_body: default_body,
        }])
    }

    fn pattern_values(&mut self, pat: Node) -> ReadResult<Vec<Expr>> {
        match pat.kind() {
            "or_pattern" => {
                let mut out = Vec::new();
                for alt in named_children(pat) {
                    out.extend(self.pattern_values(alt)?);
                }
                Ok(out)
            }
            "integer_literal" | "float_literal" | "string_literal" | "raw_string_literal"
            | "char_literal" | "boolean_literal" | "scoped_identifier" => Ok(vec![self.read_expr(pat)?]),
            "negative_literal" => number_literal(self.node_text(pat))
                .map(|lit| vec![Expr::Literal(lit)])
                .ok_or_else(|| self.parse_error(pat, "invalid number")),
            "identifier" => unsupported("match binding"),
            _ => unsupported("match pattern"),
        }
    }

    fn read_for(&mut self, node: Node) -> ReadResult<Stmt> {
        let names = pattern_names(self.node_text(field(node, "pattern")?))
            .ok_or_else(|| ReadFail::Unsupported("destructuring".into()))?;
        let value = field(node, "value")?;
        let body_node = field(node, "body")?;
        if let Some((start, end, step)) = self.read_range(value)? {
            let [var] = <[String; 1]>::try_from(names)
                .map_err(|_| ReadFail::Unsupported("range pattern".into()))?;
            self.env.declare(&var, Type::int());
            let body = self.read_block(body_node, Tail::Discard)?;
            return Ok(Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            });
        }
        let (iterable, enumerate) = self.read_iterable(value)?;
        let ty = self.env.type_of(&iterable);
        let (mode, key, value) = match (names.as_slice(), enumerate) {
            ([index, item], true) => (IterMode::Indexed, Some(index.clone()), item.clone()),
            ([key, value], false) if ty.is_map() => (IterMode::Entries, Some(key.clone()), value.clone()),
            ([item], false) => (IterMode::Items, None, item.clone()),
            _ => return unsupported("for pattern"),
        };
        let mut stmt = Stmt::ForEach {
            mode,
            key,
            value,
            iterable,
            body: Vec::new(),
        };
        self.env.bind_loop(&stmt);
        let body = self.read_block(body_node, Tail::Discard)?;
        if let Stmt::ForEach { body: b, .. } = &mut stmt {
            *b = body;
        }
        Ok(stmt)
    }

    /// `a..b`, `a..=b`, `(a..b).step_by(n)` and `(a..b).rev()`.
    fn read_range(&mut self, node: Node) -> ReadResult<Option<(Expr, Expr, Option<Expr>)>> {
        match node.kind() {
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_range(inner),
                None => Ok(None),
            },
            "range_expression" => {
                let bounds = named_children(node);
                let [start, end] = bounds[..] else {
                    return unsupported("open range");
                };
                let start = self.read_expr(start)?;
                let end = self.read_expr(end)?;
                let inclusive = children(node).iter().any(|c| c.kind() == "..=");
                let end = if inclusive { offset(end, 1) } else { end };
                Ok(Some((start, end, None)))
            }
            "call_expression" => {
                let func = field(node, "function")?;
                if func.kind() != "field_expression" {
                    return Ok(None);
                }
                let method = self.node_text(field(func, "field")?);
                if !matches!(method, "step_by" | "rev") {
                    return Ok(None);
                }
                let Some((start, end, None)) = self.read_range(field(func, "value")?)? else {
                    return Ok(None);
                };
                if method == "rev" {
                    return Ok(Some((offset(end, -1), offset(start, -1), Some(Expr::int(-1)))));
                }
                let step = match <[Expr; 1]>::try_from(self.read_args(node)?) {
                    Ok([step]) => step,
                    Err(_) => return unsupported("step_by arity"),
                };
                Ok(Some((start, end, Some(step))))
            }
            _ => Ok(None),
        }
    }

    /// What a `for` loop walks, looking through iterator adapters; true when
    /// the walk is `.enumerate()`d.
    fn read_iterable(&mut self, node: Node) -> ReadResult<(Expr, bool)> {
        let (base, steps) = self.method_chain(node);
        let mut enumerate = false;
        let mut values = false;
        let mut consumed = 0;
        for (name, call) in &steps {
            let no_args = call
                .child_by_field_name("arguments")
                .is_some_and(|a| named_children(a).is_empty());
            match *name {
                "iter" | "into_iter" | "iter_mut" | "cloned" | "copied" | "chars" | "keys" if no_args => {}
                "values" if no_args => values = true,
                "enumerate" if no_args => enumerate = true,
                _ => break,
            }
            consumed += 1;
        }
        let iterable = if consumed == steps.len() {
            self.read_expr(base)?
        } else {
            values = false;
            enumerate = false;
            self.read_expr(node)?
        };
        if values {
            return Ok((self.operation(Op::Values, vec![iterable]), enumerate));
        }
        Ok((iterable, enumerate))
    }

    /// `recv.a(..).b(..)` as the innermost receiver plus each call in order.
    fn method_chain<'t>(&self, mut node: Node<'t>) -> (Node<'t>, Vec<(&'a str, Node<'t>)>) {
        let mut steps = Vec::new();
        loop {
            if node.kind() == "reference_expression"
                && let Some(inner) = node.child_by_field_name("value")
            {
                node = inner;
                continue;
            }
            if node.kind() != "call_expression" {
                break;
            }
            let Some(mut func) = node.child_by_field_name("function") else {
                break;
            };
            if func.kind() == "generic_function"
                && let Some(inner) = func.child_by_field_name("function")
            {
                func = inner;
            }
            let (Some(value), Some(name)) =
                (func.child_by_field_name("value"), func.child_by_field_name("field"))
            else {
                break;
            };
            if func.kind() != "field_expression" {
                break;
            }
            steps.push((self.node_text(name), node));
            node = value;
        }
        steps.reverse();
        (node, steps)
    }

    fn is_statement_macro(&self, node: Node) -> bool {
        let name = self.macro_name(node);
        PRINT_MACROS.contains(&name) || PANIC_MACROS.contains(&name) || ASSERT_MACROS.contains(&name)
    }

    fn read_macro_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let name = self.macro_name(node);
        if PANIC_MACROS.contains(&name) {
            let args = match self.macro_message(node, name)? {
                Some(message) => vec![message],
                None => Vec::new(),
            };
            return Ok(vec![Stmt::Throw(Expr::Construct {
                class: "Exception".to_string(),
                args,
            })]);
        }
        if ASSERT_MACROS.contains(&name) {
            return self.read_assert(node, name).map(|s| vec![s]);
        }
        Ok(vec![Stmt::Expr(self.read_macro_expr(node)?)])
    }

    /// `assert!(c)` throws when `c` is false; the `_eq`/`_ne` forms compare
    /// their first two arguments.
    fn read_assert(&mut self, node: Node, name: &str) -> ReadResult<Stmt> {
        let mut args = self.macro_args(node, name)?.into_iter();
        let failed = if name.ends_with("_eq") || name.ends_with("_ne") {
            let (Some(left), Some(right)) = (args.next(), args.next()) else {
                return unsupported(format!("{name}! arity"));
            };
            let op = if name.ends_with("_eq") {
                BinaryOp::Ne
            } else {
                BinaryOp::Eq
            };
            Expr::binary(left, op, right)
        } else {
            let Some(cond) = args.next() else {
                return unsupported(format!("{name}! arity"));
            };
            negate(cond)
        };
        let rest: Vec<Expr> = args.collect();
        let message = match rest.split_first() {
            Some((Expr::Literal(Literal::String(format)), values)) => simplify(
                format_parts(format, values.to_vec())
                    .ok_or_else(|| ReadFail::Unsupported(format!("{name}! format")))?,
            ),
            Some(_) => return unsupported(format!("{name}! with dynamic format")),
            None => Expr::string("assertion failed"),
        };
        Ok(Stmt::if_stmt(
            failed,
            vec![Stmt::Throw(Expr::Construct {
                class: "Exception".to_string(),
                args: vec![message],
            })],
            None,
        ))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn read_args(&mut self, call: Node) -> ReadResult<Vec<Expr>> {
        let args = field(call, "arguments")?;
        named_children(args)
            .into_iter()
            .filter(|a| a.kind() != "attribute_item")
            .map(|a| self.read_expr(a))
            .collect()
    }

    fn read_expr(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" => {
                let name = self.node_text(node);
                if self.building && name == "this" {
                    return Ok(Expr::This);
                }
                match name {
                    "None" => Ok(Expr::null()),
                    _ => Ok(Expr::ident(name)),
                }
            }
            "self" => Ok(Expr::This),
            "integer_literal" | "float_literal" => number_literal(strip_type_suffix(self.node_text(node)))
                .map(Expr::Literal)
                .ok_or_else(|| self.parse_error(node, "invalid number")),
            "string_literal" => {
                let text = self.node_text(node);
                if text.starts_with('b') {
                    return unsupported("byte string");
                }
                Ok(Expr::string(unescape(&quoted(text, '"'))))
            }
            "raw_string_literal" => {
                let text = self.node_text(node).trim_start_matches('r');
                let hashes = text.len() - text.trim_start_matches('#').len();
                let inner = &text[hashes..text.len() - hashes];
                Ok(Expr::string(quoted(inner, '"')))
            }
            "char_literal" => Ok(Expr::string(unescape(&quoted(self.node_text(node), '\'')))),
            "boolean_literal" => Ok(Expr::bool(self.node_text(node) == "true")),
            "binary_expression" => {
                let left = self.read_expr(field(node, "left")?)?;
                let right = self.read_expr(field(node, "right")?)?;
                let op_text = self.node_text(field(node, "operator")?);
                let op = binary_op(op_text)
                    .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                let op = self.int_division(op, &left, &right);
                Ok(Expr::binary(left, op, right))
            }
            "unary_expression" => {
                let operand_node = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "missing operand"))?;
                let operand = self.read_expr(operand_node)?;
                match self.node_text(node).chars().next() {
                    Some('-') => Ok(match operand {
                        Expr::Literal(Literal::Int(n)) => Expr::int(-n),
                        Expr::Literal(Literal::Float(n)) => Expr::float(-n),
                        other => Expr::unary(UnaryOp::Neg, other),
                    }),
                    Some('!') if self.env.type_of(&operand).is_int() => {
                        Ok(Expr::unary(UnaryOp::BitNot, operand))
                    }
                    Some('!') => Ok(Expr::unary(UnaryOp::Not, operand)),
                    // References are erased: `*r` reads as the value.
                    Some('*') => Ok(operand),
                    _ => unsupported("unary operator"),
                }
            }
            "reference_expression" => self.read_expr(field(node, "value")?),
            "type_cast_expression" => {
                let value = self.read_expr(field(node, "value")?)?;
                let ty = parse_type(self.node_text(field(node, "type")?));
                let current = self.env.type_of(&value);
                Ok(match () {
                    _ if ty.is_int() && current.is_int() => value,
                    _ if ty.is_int() => Expr::op(Op::ToInt, vec![value]),
                    _ if ty.is_float() && !current.is_float() => Expr::op(Op::ToFloat, vec![value]),
                    _ => value,
                })
            }
            "call_expression" => self.read_call(node),
            "field_expression" => {
                let field_node = field(node, "field")?;
                if field_node.kind() == "integer_literal" {
                    return unsupported("tuple field");
                }
                let object = self.read_expr(field(node, "value")?)?;
                Ok(Expr::member(object, self.node_text(field_node)))
            }
            "index_expression" => {
                let parts = named_children(node);
                let [object, index] = parts[..] else {
                    return Err(self.parse_error(node, "malformed index"));
                };
                if index.kind() == "range_expression" {
                    return unsupported("slice expression");
                }
                let object = self.read_expr(object)?;
                let index = self.read_expr(index)?;
                Ok(Expr::index(object, index))
            }
            "scoped_identifier" => {
                let path = node
                    .child_by_field_name("path")
                    .map(|p| self.type_name(self.node_text(p)))
                    .unwrap_or_default();
                let name = self.node_text(field(node, "name")?);
                Ok(Expr::member(Expr::ident(path), name))
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_expr(inner),
                None => Err(self.parse_error(node, "empty parentheses")),
            },
            "array_expression" => {
                if node.child_by_field_name("length").is_some() {
                    return unsupported("array repeat");
                }
                let items = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() != "attribute_item")
                    .map(|c| self.read_expr(c))
                    .collect::<ReadResult<Vec<_>>>()?;
                Ok(Expr::Array(items))
            }
            "struct_expression" => self.read_struct_literal(node),
            "closure_expression" => self.read_closure(node),
            "if_expression" => self.read_ternary(node),
            "macro_invocation" => self.read_macro_expr(node),
            "await_expression" => match named_children(node).into_iter().next() {
                Some(inner) => Ok(Expr::Await(Box::new(self.read_expr(inner)?))),
                None => Err(self.parse_error(node, "empty await")),
            },
            "try_expression" => unsupported("? operator"),
            "match_expression" => unsupported("match expression"),
            "tuple_expression" => unsupported("tuple"),
            "unit_expression" => unsupported("unit value"),
            "range_expression" => unsupported("range"),
            "block" => unsupported("block expression"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    /// `/` between two ints truncates in Rust.
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

    /// `if c { a } else { b }` as a value.
    fn read_ternary(&mut self, node: Node) -> ReadResult<Expr> {
        let test = self.read_condition(field(node, "condition")?)?;
        let then = self
            .single_tail(field(node, "consequence")?)
            .ok_or_else(|| ReadFail::Unsupported("if expression".into()))?;
        let otherwise = node
            .child_by_field_name("alternative")
            .and_then(|clause| named_children(clause).into_iter().next())
            .ok_or_else(|| ReadFail::Unsupported("if expression".into()))?;
        let otherwise = match otherwise.kind() {
            "block" => self
                .single_tail(otherwise)
                .ok_or_else(|| ReadFail::Unsupported("if expression".into()))?,
            _ => otherwise,
        };
        let then = self.read_expr(then)?;
        let otherwise = self.read_expr(otherwise)?;
        Ok(Expr::ternary(test, then, otherwise))
    }

    fn read_closure(&mut self, node: Node) -> ReadResult<Expr> {
        let params = closure_params(self.node_text(field(node, "parameters")?))
            .ok_or_else(|| ReadFail::Unsupported("closure pattern".into()))?;
        let is_async = children(node).iter().any(|c| c.kind() == "async");
        let body = field(node, "body")?;
        self.env.push_scope();
        self.env.bind_params(&params);
        let result = match body.kind() {
            "block" => self
                .read_block(body, Tail::Return)
                .map(LambdaBody::Block)
                .map_err(ReadFail::from),
            _ => self.read_expr(body).map(|e| LambdaBody::Expr(Box::new(e))),
        };
        self.env.pop_scope();
        Ok(Expr::Lambda(Box::new(Lambda {
            params,
            body: result?,
            is_async,
        })))
    }

    fn read_call(&mut self, node: Node) -> ReadResult<Expr> {
        let mut func = field(node, "function")?;
        let mut turbofish = None;
        if func.kind() == "generic_function" {
            turbofish = func
                .child_by_field_name("type_arguments")
                .map(|t| self.node_text(t));
            func = field(func, "function")?;
        }
        match func.kind() {
            "identifier" => {
                let name = self.node_text(func);
                let args = self.read_args(node)?;
                if matches!(name, "Some" | "Ok") && args.len() == 1 {
                    return Ok(args.into_iter().next().unwrap_or_else(Expr::null));
                }
                if self.items.functions.contains(name) || self.env.is_bound(name) {
                    return Ok(Expr::call(Expr::ident(name), args));
                }
                match idioms::recognize_call(Language::Rust, name, args) {
                    Ok((op, args)) => Ok(self.operation(op, args)),
                    Err(args) => Ok(Expr::call(Expr::ident(name), args)),
                }
            }
            "scoped_identifier" => self.read_path_call(node, func),
            "field_expression" => self.read_method_call(node, func, turbofish),
            _ => {
                let callee = self.read_expr(func)?;
                let args = self.read_args(node)?;
                Ok(Expr::call(callee, args))
            }
        }
    }

    /// `Type::function(..)` calls: constructors, std constructors and
    /// associated functions.
    fn read_path_call(&mut self, node: Node, func: Node) -> ReadResult<Expr> {
        let path_text = func
            .child_by_field_name("path")
            .map(|p| self.node_text(p))
            .unwrap_or("");
        let path = self.type_name(path_text);
        let name = self.node_text(field(func, "name")?);
        let args = self.read_args(node)?;
        let single = |args: Vec<Expr>| <[Expr; 1]>::try_from(args).ok().map(|[a]| a);
        match (path.as_str(), name) {
            ("String", "new") | ("Vec" | "VecDeque", "new" | "with_capacity") => {
                return Ok(if path == "String" {
                    Expr::string("")
                } else {
                    Expr::Array(vec![])
                });
            }
            ("HashMap" | "BTreeMap", "new" | "with_capacity") => return Ok(Expr::Map(vec![])),
            ("String", "from") => {
                if let Some(arg) = single(args) {
                    return Ok(match self.env.type_of(&arg).is_string() {
                        true => arg,
                        false => self.operation(Op::ToString, vec![arg]),
                    });
                }
                return unsupported("String::from arity");
            }
            ("Box" | "Rc" | "Arc" | "RefCell" | "Cell", "new") => {
                return single(args).ok_or_else(|| ReadFail::Unsupported(format!("{path}::new arity")));
            }
            ("i64" | "i32" | "usize" | "u64" | "u32", "from") => {
                return single(args)
                    .map(|a| Expr::op(Op::ToInt, vec![a]))
                    .ok_or_else(|| ReadFail::Unsupported("from arity".into()));
            }
            ("f64" | "f32", "from") => {
                return single(args)
                    .map(|a| Expr::op(Op::ToFloat, vec![a]))
                    .ok_or_else(|| ReadFail::Unsupported("from arity".into()));
            }
            _ => {}
        }
        if self.items.structs.contains_key(&path) {
            if name == "new" {
                return Ok(Expr::Construct { class: path, args });
            }
            return Ok(Expr::call(Expr::member(Expr::ident(path), name), args));
        }
        let full = format!("{path_text}::{name}");
        match idioms::recognize_call(Language::Rust, &full, args) {
            Ok((op, args)) => Ok(self.operation(op, args)),
            Err(args) => Ok(Expr::call(Expr::member(Expr::ident(path), name), args)),
        }
    }

    fn read_method_call(&mut self, node: Node, func: Node, turbofish: Option<&str>) -> ReadResult<Expr> {
        let name = self.node_text(field(func, "field")?);
        let receiver_node = field(func, "value")?;
        let no_args = named_children(field(node, "arguments")?).is_empty();
        match name {
            "collect" => return self.read_collect(receiver_node, turbofish),
            "clone" | "to_owned" | "as_str" | "as_slice" | "into" | "borrow" | "borrow_mut"
            | "as_ref" | "cloned" | "copied"
                if no_args =>
            {
                return self.read_expr(receiver_node);
            }
            "map" | "filter" | "filter_map" | "iter" | "into_iter" | "enumerate" => {
                return unsupported("iterator adapter");
            }
            _ => {}
        }
        let receiver = self.read_expr(receiver_node)?;
        let args = self.read_args(node)?;
        let ty = self.env.type_of(&receiver);
        match name {
            "to_string" if args.is_empty() && ty.is_string() => return Ok(receiver),
            "is_empty" if args.is_empty() => {
                let len = self.operation(Op::SeqLength, vec![receiver]);
                return Ok(Expr::binary(len, BinaryOp::Eq, Expr::int(0)));
            }
            "pow" | "powi" | "powf" if args.len() == 1 => {
                let exponent = args.into_iter().next().unwrap_or_else(Expr::null);
                return Ok(Expr::binary(receiver, BinaryOp::Pow, exponent));
            }
            _ => {}
        }
        match idioms::recognize_method(Language::Rust, receiver, name, args) {
            Ok((op, args)) => Ok(self.operation(op, args)),
            Err((receiver, args)) => Ok(Expr::call(Expr::member(receiver, name), args)),
        }
    }

    /// `src.iter().filter(|x| ..).map(|x| ..).collect()` and the
    /// `filter_map(|x| (cond).then(|| item))` form as a comprehension.
    fn read_collect(&mut self, receiver: Node, turbofish: Option<&str>) -> ReadResult<Expr> {
        let kind = match turbofish.map(|t| t.trim_start_matches("::").trim_start_matches('<')) {
            Some(t) if t.starts_with("HashSet") || t.starts_with("BTreeSet") => ComprehensionKind::Set,
            Some(t) if t.starts_with("HashMap") || t.starts_with("BTreeMap") => {
                return unsupported("map collect");
            }
            _ => ComprehensionKind::List,
        };
        let (base, steps) = self.method_chain(receiver);
        let mut steps = steps
            .into_iter()
            .filter(|(name, _)| !matches!(*name, "cloned" | "copied"))
            .peekable();
        if let Some(("split", split)) = steps.peek().copied() {
            steps.next();
            if !steps.all(|(name, call)| name == "map" && self.is_string_from(call)) {
                return unsupported("iterator chain");
            }
            let mut args = vec![self.read_expr(base)?];
            args.extend(self.read_args(split)?);
            return Ok(Expr::op(Op::Split, args));
        }
        match steps.next() {
            Some(("iter" | "into_iter" | "keys" | "chars", _)) => {}
            _ => return unsupported("iterator chain"),
        }
        let source = self.read_expr(base)?;
        let source_ty = self.env.type_of(&source);
        let element = match source_ty.map_parts() {
            Some((k, _)) => k.clone(),
            None => source_ty.element(),
        };
        let mut var: Option<String> = None;
        let mut filter = None;
        let mut transform = None;
        for (name, call) in steps {
            if name == "map" && self.is_string_from(call) {
                continue;
            }
            let (param, body) = self.chain_closure(call)?;
            if var.as_ref().is_some_and(|v| *v != param) {
                return unsupported("iterator chain");
            }
            self.env.push_scope();
            self.env.declare(&param, element.clone());
            let result = match name {
                "filter" if filter.is_none() && transform.is_none() => {
                    self.read_expr(body).map(|f| filter = Some(f))
                }
                "map" if transform.is_none() => self.read_expr(body).map(|t| transform = Some(t)),
                "filter_map" if filter.is_none() && transform.is_none() => {
                    self.read_then(body).map(|(f, t)| {
                        filter = Some(f);
                        transform = Some(t);
                    })
                }
                _ => unsupported("iterator chain"),
            };
            self.env.pop_scope();
            result?;
            var = Some(param);
        }
        let Some(var) = var else {
            return Ok(source);
        };
        let transform = transform.unwrap_or_else(|| Expr::ident(var.clone()));
        let comprehension = Comprehension::builder(var)
            .kind(kind)
            .source(source)
            .transform(transform)
            .filter(filter)
            .build()
            .map_err(|e| self.parse_error(receiver, e.to_string()))?;
        Ok(Expr::Comprehension(Box::new(comprehension)))
    }

    /// `.map(String::from)` and `.map(str::to_string)`.
    fn is_string_from(&self, call: Node) -> bool {
        call.child_by_field_name("arguments").is_some_and(|a| {
            matches!(
                &named_children(a)[..],
                [arg] if matches!(self.node_text(*arg), "String::from" | "str::to_string" | "ToString::to_string")
            )
        })
    }

    /// The single one-parameter closure passed to an adapter.
    fn chain_closure<'t>(&self, call: Node<'t>) -> ReadResult<(String, Node<'t>)> {
        let args = named_children(field(call, "arguments")?);
        let [closure] = args[..] else {
            return unsupported("iterator chain");
        };
        if closure.kind() != "closure_expression" {
            return unsupported("iterator chain");
        }
        let params = closure_params(self.node_text(field(closure, "parameters")?))
            .ok_or_else(|| ReadFail::Unsupported("closure pattern".into()))?;
        let [param] = &params[..] else {
            return unsupported("iterator chain");
        };
        let body = field(closure, "body")?;
        let body = match body.kind() {
            "block" => self
                .single_tail(body)
                .ok_or_else(|| ReadFail::Unsupported("iterator chain".into()))?,
            _ => body,
        };
        Ok((param.name.clone(), body))
    }

    /// `(cond).then(|| item)` or `(cond).then_some(item)`.
    fn read_then(&mut self, node: Node) -> ReadResult<(Expr, Expr)> {
        if node.kind() != "call_expression" {
            return unsupported("iterator chain");
        }
        let func = field(node, "function")?;
        if func.kind() != "field_expression" {
            return unsupported("iterator chain");
        }
        let method = self.node_text(field(func, "field")?);
        let cond = self.read_expr(field(func, "value")?)?;
        let args = named_children(field(node, "arguments")?);
        let [arg] = args[..] else {
            return unsupported("iterator chain");
        };
        let item = match method {
            "then_some" => self.read_expr(arg)?,
            "then" if arg.kind() == "closure_expression" => self.read_expr(field(arg, "body")?)?,
            _ => return unsupported("iterator chain"),
        };
        Ok((cond, item))
    }

    fn operation(&self, op: Op, args: Vec<Expr>) -> Expr {
        let op = match args.first() {
            Some(first) => op.refine(&self.env.type_of(first)),
            None => op,
        };
        Expr::op(op, args)
    }

    fn read_struct_literal(&mut self, node: Node) -> ReadResult<Expr> {
        let class = self.type_name(self.node_text(field(node, "name")?));
        let Some(fields) = self.items.structs.get(&class).cloned() else {
            return unsupported("struct literal");
        };
        if self.items.constructed.contains(&class) && !self.building {
            return unsupported("struct literal bypassing constructor");
        }
        let mut args: Vec<Expr> = fields.iter().map(|(_, ty)| zero_value(ty)).collect();
        for init in named_children(field(node, "body")?) {
            let (key, value) = match init.kind() {
                "field_initializer" => {
                    let key = self.node_text(field(init, "field")?);
                    (key, self.read_expr(field(init, "value")?)?)
                }
                "shorthand_field_initializer" => {
                    let key = self.node_text(init).trim();
                    (key, Expr::ident(key))
                }
                // `..Default::default()` keeps the zero values.
                "base_field_initializer" if self.node_text(init).contains("Default::default()") => {
                    continue;
                }
                _ => return unsupported("struct update"),
            };
            let slot = fields
                .iter()
                .position(|(name, _)| name == key)
                .ok_or_else(|| self.parse_error(init, format!("unknown field {key}")))?;
            args[slot] = value;
        }
        Ok(Expr::Construct { class, args })
    }

    // ------------------------------------------------------------------
    // Macros
    // ------------------------------------------------------------------

    fn macro_name(&self, node: Node) -> &'a str {
        node.child_by_field_name("macro")
            .map(|m| self.node_text(m))
            .unwrap_or("")
    }

    /// The macro's token tree read as a call's argument list.
    fn macro_args(&mut self, node: Node, name: &str) -> ReadResult<Vec<Expr>> {
        let Some(tree) = named_children(node).into_iter().find(|c| c.kind() == "token_tree") else {
            return Ok(Vec::new());
        };
        if children(tree).iter().any(|c| c.kind() == ";") {
            return unsupported(format!("{name}! repeat"));
        }
        let text = self.node_text(tree);
        let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or("").trim();
        if inner.is_empty() {
            return Ok(Vec::new());
        }
        let source = format!("fn __macro() {{ __args({inner}); }}");
        let parsed = ts::parse(arborium_rust::language().into(), &source)
            .map_err(|_| ReadFail::Unsupported(format!("{name}! arguments")))?;
        let call = parsed
            .root_node()
            .named_child(0)
            .and_then(|f| f.child_by_field_name("body"))
            .and_then(|b| named_children(b).into_iter().next())
            .map(unwrap_statement)
            .filter(|c| c.kind() == "call_expression")
            .ok_or_else(|| ReadFail::Unsupported(format!("{name}! arguments")))?;
        let mut nested = self.nested(&source);
        let result = nested.read_args(call);
        self.env = std::mem::take(&mut nested.env);
        result.map_err(|err| match err {
            ReadFail::Parse(_) => self.parse_error(node, format!("malformed {name}! arguments")),
            other => other,
        })
    }

    /// A format string and its arguments as one value; `None` without
    /// arguments.
    fn macro_message(&mut self, node: Node, name: &str) -> ReadResult<Option<Expr>> {
        let mut args = self.macro_args(node, name)?.into_iter();
        let Some(first) = args.next() else {
            return Ok(None);
        };
        let Expr::Literal(Literal::String(format)) = first else {
            return unsupported(format!("{name}! with dynamic format"));
        };
        let parts = format_parts(&format, args.collect())
            .ok_or_else(|| ReadFail::Unsupported(format!("{name}! format")))?;
        Ok(Some(simplify(parts)))
    }

    fn read_macro_expr(&mut self, node: Node) -> ReadResult<Expr> {
        let name = self.macro_name(node);
        match name {
            "vec" => Ok(Expr::Array(self.macro_args(node, name)?)),
            "format" => {
                let message = self.macro_message(node, name)?.unwrap_or_else(|| Expr::string(""));
                match message {
                    Expr::Literal(_) | Expr::Format(_) => Ok(message),
                    value if self.env.type_of(&value).is_string() => Ok(value),
                    value => Ok(self.operation(Op::ToString, vec![value])),
                }
            }
            _ if PRINT_MACROS.contains(&name) => {
                let message = self.macro_message(node, name)?.unwrap_or_else(|| Expr::string(""));
                Ok(Expr::op(Op::Print, vec![message]))
            }
            _ if PANIC_MACROS.contains(&name) => unsupported("panic expression"),
            _ => unsupported(format!("{name}! macro")),
        }
    }
}

/// Item, `let` and `expression_statement` nodes; anything else in a block
/// is an expression.
fn is_statement(kind: &str) -> bool {
    matches!(
        kind,
        "expression_statement" | "let_declaration" | "empty_statement" | "macro_definition"
            | "attribute_item"
    ) || kind.ends_with("_item")
}

/// The expression inside an `expression_statement`.
fn unwrap_statement(node: Node) -> Node {
    if node.kind() == "expression_statement"
        && let Some(inner) = named_children(node).into_iter().next()
    {
        return inner;
    }
    node
}

fn has_receiver(item: Node) -> bool {
    item.child_by_field_name("parameters")
        .is_some_and(|p| named_children(p).iter().any(|c| c.kind() == "self_parameter"))
}

fn has_label(node: Node) -> bool {
    named_children(node).iter().any(|c| c.kind() == "label")
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// The bound name of a simple pattern: `x`, `mut x`, `&x`, `&&x`.
fn pattern_name(text: &str) -> Option<String> {
    let name = text.trim().trim_start_matches('&').trim();
    let name = name.strip_prefix("mut ").unwrap_or(name).trim();
    is_ident(name).then(|| name.to_string())
}

/// Names bound by `x`, `(i, x)` or `&(k, v)`.
fn pattern_names(text: &str) -> Option<Vec<String>> {
    let t = text.trim().trim_start_matches('&');
    match t.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => split_top_level(inner, ',')
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(pattern_name)
            .collect(),
        None => pattern_name(t).map(|n| vec![n]),
    }
}

/// `|a, b: i64|` as parameters.
fn closure_params(text: &str) -> Option<Vec<Param>> {
    let inner = text.trim().strip_prefix('|')?.strip_suffix('|')?;
    split_top_level(inner, ',')
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (pattern, ty) = match p.split_once(':') {
                Some((pattern, ty)) => (pattern, parse_type(ty)),
                None => (p, Type::any()),
            };
            pattern_name(pattern).map(|name| Param::new(name, ty))
        })
        .collect()
}

/// Text between the first and last `quote`.
fn quoted(text: &str, quote: char) -> String {
    match (text.find(quote), text.rfind(quote)) {
        (Some(start), Some(end)) if end > start => text[start + 1..end].to_string(),
        _ => text.to_string(),
    }
}

/// `10i64`, `2.5f32`, `7_u8` without the type suffix.
fn strip_type_suffix(text: &str) -> &str {
    if text.starts_with("0x") || text.starts_with("0X") {
        return text;
    }
    for suffix in [
        "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32",
        "f64",
    ] {
        if let Some(rest) = text.strip_suffix(suffix) {
            return rest.trim_end_matches('_');
        }
    }
    text
}

/// `expr + delta`, folded when `expr` is an int literal.
fn offset(expr: Expr, delta: i64) -> Expr {
    match expr {
        Expr::Literal(Literal::Int(n)) => Expr::int(n + delta),
        other if delta < 0 => Expr::binary(other, BinaryOp::Sub, Expr::int(-delta)),
        other => Expr::binary(other, BinaryOp::Add, Expr::int(delta)),
    }
}

fn negate(cond: Expr) -> Expr {
    match cond {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => *operand,
        other => Expr::unary(UnaryOp::Not, other),
    }
}

/// One interpolated value stands for itself; text alone is a string.
fn simplify(parts: Vec<FormatPart>) -> Expr {
    match <[FormatPart; 1]>::try_from(parts) {
        Ok([FormatPart::Expr(e)]) => e,
        Ok([FormatPart::Text(t)]) => Expr::string(t),
        Err(parts) if parts.is_empty() => Expr::string(""),
        Err(parts) => Expr::Format(parts),
    }
}

/// Split a `format!` string into text and argument parts. `{}` takes the
/// next argument, `{0}` an argument by position and `{name}` a local;
/// format specs after `:` are dropped.
fn format_parts(format: &str, args: Vec<Expr>) -> Option<Vec<FormatPart>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut next = 0;
    let mut indexed = false;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.next_if_eq(&'{').is_some() => text.push('{'),
            '}' if chars.next_if_eq(&'}').is_some() => text.push('}'),
            '{' => {
                let spec: String = std::iter::from_fn(|| chars.next_if(|c| *c != '}')).collect();
                chars.next_if_eq(&'}')?;
                let name = spec.split(':').next().unwrap_or("").trim();
                let value = if name.is_empty() {
                    next += 1;
                    args.get(next - 1)?.clone()
                } else if let Ok(i) = name.parse::<usize>() {
                    indexed = true;
                    args.get(i)?.clone()
                } else {
                    Expr::ident(name)
                };
                if !text.is_empty() {
                    parts.push(FormatPart::Text(std::mem::take(&mut text)));
                }
                parts.push(FormatPart::Expr(value));
            }
            '}' => return None,
            c => text.push(c),
        }
    }
    if !indexed && next != args.len() {
        return None;
    }
    if !text.is_empty() {
        parts.push(FormatPart::Text(text));
    }
    Some(parts)
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

/// Last path segment without generic arguments: `std::collections::HashMap<K, V>` is `HashMap`.
fn base_name(text: &str) -> &str {
    let t = text.trim();
    let t = t.split('<').next().unwrap_or(t).trim_end_matches("::");
    t.rsplit("::").next().unwrap_or(t).trim()
}

/// Replace whole-word occurrences of `word`.
fn replace_word(text: &str, word: &str, with: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(word) {
        let before = rest[..pos].chars().next_back();
        let after = rest[pos + word.len()..].chars().next();
        let boundary = |c: Option<char>| !c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        out.push_str(&rest[..pos]);
        out.push_str(if boundary(before) && boundary(after) { with } else { word });
        rest = &rest[pos + word.len()..];
    }
    out.push_str(rest);
    out
}

/// Parse a Rust type. References, smart pointers, `Result` errors and
/// lifetimes are erased.
pub(crate) fn parse_type(text: &str) -> Type {
    let t = text.trim();
    if let Some(rest) = t.strip_prefix('&') {
        let rest = rest.trim_start();
        let rest = match rest.strip_prefix('\'') {
            Some(lifetime) => lifetime.split_once(' ').map_or("", |(_, r)| r),
            None => rest,
        };
        return parse_type(rest.trim_start().strip_prefix("mut ").unwrap_or(rest));
    }
    for prefix in ["impl ", "dyn "] {
        if let Some(rest) = t.strip_prefix(prefix) {
            return parse_type(rest);
        }
    }
    if let Some(inner) = t.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let elem = split_top_level(inner, ';').into_iter().next().unwrap_or(inner);
        return Type::seq(parse_type(elem));
    }
    if t == "()" {
        return Type::void();
    }
    if t.starts_with('(') {
        return Type::any();
    }
    for head in ["Fn(", "FnMut(", "FnOnce(", "fn("] {
        if let Some(sig) = t.strip_prefix(head) {
            let Some(close) = sig.find(')') else {
                return Type::any();
            };
            let params = split_top_level(&sig[..close], ',')
                .into_iter()
                .filter(|p| !p.is_empty())
                .map(parse_type)
                .collect();
            let ret = match sig[close + 1..].trim().strip_prefix("->") {
                Some(ret) => parse_type(ret),
                None => Type::void(),
            };
            return Type::function(params, ret);
        }
    }
    if let Some(open) = t.find('<')
        && let Some(inner) = t[open + 1..].strip_suffix('>')
    {
        let args: Vec<Type> = split_top_level(inner, ',').into_iter().map(parse_type).collect();
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        return match base_name(&t[..open]) {
            "Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" => Type::seq(arg(0)),
            "HashMap" | "BTreeMap" => Type::map(arg(0), arg(1)),
            "Option" => Type::optional_of(arg(0)),
            "Box" | "Rc" | "Arc" | "RefCell" | "Cell" | "LazyLock" | "Result" | "Cow" => arg(0),
            other => Type::named(other),
        };
    }
    match t {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "usize" => Type::int(),
        "f32" | "f64" => Type::float(),
        "String" | "str" | "char" => Type::string(),
        "bool" => Type::bool(),
        "serde_json::Value" | "Value" | "_" | "" => Type::any(),
        other => Type::named(base_name(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Module {
        read_rust(src).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let module = read("/// Sum of two.\nfn add(a: i64, b: i64) -> i64 {\n    a + b\n}\n");
        let f = module.function("add").unwrap();
        assert_eq!(f.params[0].ty, Type::int());
        assert_eq!(f.ret, Type::int());
        assert_eq!(f.doc.as_deref(), Some("Sum of two."));
        assert!(matches!(
            &f.body[0],
            Stmt::Return(Some(Expr::Binary { op: BinaryOp::Add, .. }))
        ));
    }

    #[test]
    fn test_main_body_and_print() {
        let module = read("fn main() {\n    let name = \"x\";\n    println!(\"hi {}\", name);\n}\n");
        assert!(module.functions.is_empty());
        assert!(matches!(&module.statements[0], Stmt::Assign { declare: true, .. }));
        let Stmt::Expr(Expr::Operation { op: Op::Print, args }) = &module.statements[1] else {
            panic!("expected print, got {:?}", module.statements[1]);
        };
        assert_eq!(
            args[0],
            Expr::Format(vec![
                FormatPart::Text("hi ".into()),
                FormatPart::Expr(Expr::ident("name"))
            ])
        );
    }

    #[test]
    fn test_struct_impl_and_constructor() {
        let src = r#"
pub struct Counter {
    pub count: i64,
    pub name: String,
}

impl Counter {
    pub fn new(name: String) -> Self {
        Self { count: 0, name }
    }

    pub fn incr(&mut self) {
        self.count += 1;
    }

    pub fn zero() -> i64 {
        0
    }
}

fn main() {
    let mut c = Counter::new("a".to_string());
    c.incr();
}
"#;
        let module = read(src);
        let class = module.class("Counter").unwrap();
        assert_eq!(class.properties.len(), 2);
        let ctor = class.constructor().unwrap();
        assert_eq!(ctor.params.len(), 1);
        assert_eq!(ctor.body.len(), 1);
        assert_eq!(ctor.ret, Type::void());
        let incr = class.method("incr").unwrap();
        assert!(!incr.is_static);
        assert!(matches!(
            &incr.body[0],
            Stmt::Assign { target: Expr::Member { object, .. }, .. } if **object == Expr::This
        ));
        assert!(class.method("zero").unwrap().is_static);
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Construct { class, args }, .. }
                if class == "Counter" && args[0] == Expr::string("a")
        ));
    }

    #[test]
    fn test_struct_without_new_gets_field_constructor() {
        let src = "struct Point {\n    x: f64,\n    y: f64,\n}\n\nfn main() {\n    let p = Point { y: 2.0, x: 1.0 };\n}\n";
        let module = read(src);
        let ctor = module.class("Point").unwrap().constructor().unwrap();
        assert_eq!(ctor.params.len(), 2);
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Construct { args, .. }, .. }
                if args[0] == Expr::float(1.0) && args[1] == Expr::float(2.0)
        ));
    }

    #[test]
    fn test_enum_and_match() {
        let src = r#"
enum Color {
    Red,
    Green = 5,
}

fn name(c: Color) -> String {
    match c {
        Color::Red => "red".to_string(),
        _ => "other".to_string(),
    }
}
"#;
        let module = read(src);
        assert_eq!(module.enums[0].variants.len(), 2);
        assert_eq!(module.enums[0].variants[1].value, Some(Literal::Int(5)));
        let f = module.function("name").unwrap();
        let Stmt::If {
            test,
            then_body,
            else_body,
            ..
        } = &f.body[0]
        else {
            panic!("expected if, got {:?}", f.body[0]);
        };
        assert!(matches!(test, Expr::Binary { op: BinaryOp::Eq, right, .. }
            if **right == Expr::member(Expr::ident("Color"), "Red")));
        assert_eq!(then_body[0], Stmt::Return(Some(Expr::string("red"))));
        assert_eq!(
            else_body.as_deref(),
            Some(&[Stmt::Return(Some(Expr::string("other")))][..])
        );
    }

    #[test]
    fn test_loops() {
        let src = r#"
fn total(xs: Vec<i64>) -> i64 {
    let mut sum = 0;
    for i in 0..=3 {
        sum += i;
    }
    for (i, x) in xs.iter().enumerate() {
        sum += x * i as i64;
    }
    while sum > 100 {
        sum /= 2;
    }
    sum
}
"#;
        let module = read(src);
        let f = module.function("total").unwrap();
        assert!(matches!(&f.body[1], Stmt::ForRange { end, .. } if *end == Expr::int(4)));
        assert!(matches!(
            &f.body[2],
            Stmt::ForEach { mode: IterMode::Indexed, key: Some(k), iterable, .. }
                if k == "i" && *iterable == Expr::ident("xs")
        ));
        let Stmt::While { body, .. } = &f.body[3] else {
            panic!("expected while");
        };
        assert!(matches!(
            &body[0],
            Stmt::Assign { value: Expr::Binary { op: BinaryOp::FloorDiv, .. }, .. }
        ));
        assert_eq!(f.body[4], Stmt::Return(Some(Expr::ident("sum"))));
    }

    #[test]
    fn test_iterator_chain_becomes_comprehension() {
        let src = "fn doubled(xs: Vec<i64>) -> Vec<i64> {\n    xs.iter().filter(|x| **x > 0).map(|x| x * 2).collect()\n}\n";
        let module = read(src);
        let Stmt::Return(Some(Expr::Comprehension(c))) = &module.function("doubled").unwrap().body[0]
        else {
            panic!("expected comprehension");
        };
        assert_eq!(c.var, "x");
        assert_eq!(c.source, Expr::ident("xs"));
        assert!(matches!(&c.filter, Some(Expr::Binary { op: BinaryOp::Gt, .. })));
        assert!(matches!(&c.transform, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_filter_map_then_form() {
        let src = "fn evens(xs: Vec<i64>) -> Vec<i64> {\n    xs.iter().cloned().filter_map(|x| (x % 2 == 0).then(|| x + 1)).collect::<Vec<_>>()\n}\n";
        let module = read(src);
        let Stmt::Return(Some(Expr::Comprehension(c))) = &module.function("evens").unwrap().body[0]
        else {
            panic!("expected comprehension");
        };
        assert!(c.filter.is_some());
        assert!(matches!(&c.transform, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_method_idioms() {
        let src = "fn shout(s: String, xs: Vec<String>) -> String {\n    let n = xs.len();\n    let joined = xs.join(\",\");\n    s.to_uppercase()\n}\n";
        let module = read(src);
        let body = &module.function("shout").unwrap().body;
        assert!(matches!(&body[0], Stmt::Assign { value: Expr::Operation { op: Op::SeqLength, .. }, .. }));
        assert!(matches!(&body[1], Stmt::Assign { value: Expr::Operation { op: Op::Join, args }, .. }
            if args[0] == Expr::string(",")));
        assert!(matches!(&body[2], Stmt::Return(Some(Expr::Operation { op: Op::Upper, .. }))));
    }

    #[test]
    fn test_module_constants_and_lazy_statics() {
        let src = "use std::sync::LazyLock;\n\nconst MAX: i64 = 3;\nstatic NAMES: LazyLock<Vec<String>> = LazyLock::new(|| vec![\"a\".to_string()]);\n";
        let module = read(src);
        assert_eq!(module.imports[0].module, "std::sync::LazyLock");
        assert_eq!(module.variables.len(), 2);
        assert!(module.variables[0].constant);
        assert_eq!(module.variables[1].ty, Type::seq(Type::string()));
        assert_eq!(
            module.variables[1].value,
            Some(Expr::Array(vec![Expr::string("a")]))
        );
    }

    #[test]
    fn test_panic_and_assert() {
        let src = "fn check(n: i64) {\n    assert!(n >= 0);\n    if n > 10 {\n        panic!(\"too big: {}\", n);\n    }\n}\n";
        let module = read(src);
        let body = &module.function("check").unwrap().body;
        let Stmt::If { test, then_body, .. } = &body[0] else {
            panic!("expected assert as if");
        };
        assert!(matches!(test, Expr::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(&then_body[0], Stmt::Throw(Expr::Construct { class, .. }) if class == "Exception"));
        let Stmt::If { then_body, .. } = &body[1] else {
            panic!("expected if");
        };
        assert!(matches!(
            &then_body[0],
            Stmt::Throw(Expr::Construct { args, .. }) if matches!(&args[0], Expr::Format(p) if p.len() == 2)
        ));
    }

    #[test]
    fn test_map_insert_is_index_assignment() {
        let src = "use std::collections::HashMap;\n\nfn main() {\n    let mut m: HashMap<String, i64> = HashMap::new();\n    m.insert(\"a\".to_string(), 1);\n}\n";
        let module = read(src);
        assert!(matches!(
            &module.statements[1],
            Stmt::Assign { target: Expr::Index { .. }, value, declare: false, .. } if *value == Expr::int(1)
        ));
    }

    #[test]
    fn test_unsupported_constructs_are_markers() {
        let src = "fn main() {\n    let (a, b) = pair();\n    if let Some(x) = a {\n        println!(\"{}\", x);\n    }\n}\n\nmacro_rules! nothing { () => {} }\n";
        let module = read(src);
        let kinds: Vec<&str> = module
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Unsupported(u) => Some(u.kind.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, ["destructuring", "if let", "macro definition"]);
    }

    #[test]
    fn test_test_module_is_skipped() {
        let module = read("fn one() -> i64 {\n    1\n}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn t() {}\n}\n");
        assert_eq!(module.functions.len(), 1);
        assert!(module.statements.is_empty());
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("&[String]"), Type::seq(Type::string()));
        assert_eq!(
            parse_type("HashMap<String, Vec<i64>>"),
            Type::map(Type::string(), Type::seq(Type::int()))
        );
        assert_eq!(parse_type("Option<Box<Node>>"), Type::optional_of(Type::named("Node")));
        assert_eq!(parse_type("&'a mut str"), Type::string());
        assert_eq!(
            parse_type("impl Fn(i64) -> bool"),
            Type::function(vec![Type::int()], Type::bool())
        );
    }

    #[test]
    fn test_format_parts() {
        let parts = format_parts("{} and {name:>4} {{x}}", vec![Expr::int(1)]).unwrap();
        assert_eq!(
            parts,
            vec![
                FormatPart::Expr(Expr::int(1)),
                FormatPart::Text(" and ".into()),
                FormatPart::Expr(Expr::ident("name")),
                FormatPart::Text(" {x}".into()),
            ]
        );
        assert!(format_parts("{}", vec![]).is_none());
    }

    #[test]
    fn test_syntax_error() {
        let err = read_rust("fn main() {\n    let x = ;\n}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
