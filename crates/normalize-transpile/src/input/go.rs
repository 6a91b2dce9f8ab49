//! Go reader.
//!
//! Structs become classes: methods attach to their receiver type, and a
//! `NewT` function returning a `T` literal becomes the constructor. A struct
//! without one gets a constructor taking every field in declaration order,
//! which is what keyed composite literals lower to. The body of `func main`
//! becomes the module's top-level statements.

use super::ts::{self, field, named_children, span};
use super::{
    Fields, ReadFail, ReadResult, breaks_out, field_constructor, hoist_declarations,
    is_constant_expr, is_zero_value, number_literal, recover, split_top_level, unescape,
    unsupported, zero_value,
};
use crate::error::ParseError;
use crate::idioms::{self, Op};
use crate::infer::TypeEnv;
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Reader;
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Go reader.
pub struct GoReader;

/// Static instance of the Go reader for registry.
pub static GO_READER: GoReader = GoReader;

impl Reader for GoReader {
    fn language(&self) -> Language {
        Language::Go
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn read(&self, source: &str) -> Result<Module, ParseError> {
        read_go(source)
    }
}

/// Parse Go source into IR.
pub fn read_go(source: &str) -> Result<Module, ParseError> {
    let tree = ts::parse(arborium_go::language().into(), source)?;
    let mut ctx = ReadContext::new(source);
    ctx.read_module(tree.root_node())
}

struct ReadContext<'a> {
    source: &'a str,
    /// Struct name -> fields.
    structs: HashMap<String, Fields>,
    /// `NewT` function name -> struct name.
    constructors: HashMap<String, String>,
    /// Enum member -> enum name.
    enum_members: HashMap<String, String>,
    functions: HashSet<String>,
    /// Import aliases (last path segment unless renamed).
    packages: HashSet<String>,
    /// Receiver name while reading a method body.
    receiver: Option<String>,
    /// Struct whose constructor is being read; its literal is not a call.
    building: Option<String>,
    env: TypeEnv<'static>,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            structs: HashMap::new(),
            constructors: HashMap::new(),
            enum_members: HashMap::new(),
            functions: HashSet::new(),
            packages: HashSet::new(),
            receiver: None,
            building: None,
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

    // ------------------------------------------------------------------
    // Module
    // ------------------------------------------------------------------

    fn read_module(&mut self, root: Node) -> Result<Module, ParseError> {
        let children = named_children(root);
        let mut module = Module::new("main");
        for child in &children {
            let markers = recover(
                self.collect(*child, &mut module),
                self.node_text(*child),
                span(*child),
            )?;
            module.statements.extend(markers);
        }
        for child in children.iter().filter(|c| c.kind() == "function_declaration") {
            if let Some(name) = child.child_by_field_name("name") {
                let name = self.node_text(name);
                if let Some(class) = self.constructor_target(*child, name) {
                    self.constructors.insert(name.to_string(), class);
                }
            }
        }
        // Types before functions, so constructors and methods find their struct.
        for child in children.iter().filter(|c| c.kind() == "type_declaration") {
            let markers = recover(
                self.read_type_declaration(*child, &mut module),
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
                let fields = self.structs.get(&class.name).cloned().unwrap_or_default();
                let ctor = field_constructor(&fields);
                class.replace_constructor(ctor);
            }
        }
        hoist_declarations(&mut module.statements);
        Ok(module)
    }

    /// First pass: package, imports, type names, constructors and enums.
    fn collect(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "package_clause" => {
                if let Some(name) = named_children(node).first() {
                    module.name = self.node_text(*name).to_string();
                }
            }
            "import_declaration" => {
                for spec in import_specs(node) {
                    let path = string_content(self.node_text(field(spec, "path")?));
                    let mut import = Import::module(path.clone());
                    let alias = match spec.child_by_field_name("name") {
                        Some(name) => {
                            let alias = self.node_text(name).to_string();
                            import.alias = Some(alias.clone());
                            alias
                        }
                        None => path.rsplit('/').next().unwrap_or(&path).to_string(),
                    };
                    self.packages.insert(alias);
                    module.imports.push(import);
                }
            }
            "type_declaration" => {
                for spec in named_children(node) {
                    if spec.kind() != "type_spec" {
                        continue;
                    }
                    let ty = field(spec, "type")?;
                    if ty.kind() == "struct_type" {
                        let name = self.node_text(field(spec, "name")?).to_string();
                        let fields = self.struct_fields(ty)?;
                        self.structs.insert(name, fields);
                    }
                }
            }
            "function_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                self.functions.insert(name);
            }
            "const_declaration" => {
                if let Some(en) = self.iota_enum(node)? {
                    for variant in &en.variants {
                        self.enum_members.insert(variant.name.clone(), en.name.clone());
                    }
                    module.enums.push(en);
                }
            }
            _ => {}
        }
        Ok(vec![])
    }

    fn read_top_level(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "package_clause" | "import_declaration" | "type_declaration" => Ok(vec![]),
            "function_declaration" => {
                let name = self.node_text(field(node, "name")?).to_string();
                if name == "main" && named_children(field(node, "parameters")?).is_empty() {
                    return Ok(self.read_block(field(node, "body")?)?);
                }
                if let Some(class) = self.constructors.get(&name).cloned() {
                    let ctor = self.read_constructor(node, &class)?;
                    let target = module
                        .classes
                        .iter_mut()
                        .find(|c| c.name == class)
                        .ok_or_else(|| self.parse_error(node, "constructor before its struct"))?;
                    target.replace_constructor(ctor);
                    return Ok(vec![]);
                }
                let func = self.read_function(node, name)?;
                module.functions.push(func);
                Ok(vec![])
            }
            "method_declaration" => {
                let (class_name, method) = self.read_method(node)?;
                let class = module
                    .classes
                    .iter_mut()
                    .find(|c| c.name == class_name)
                    .ok_or_else(|| ReadFail::Unsupported("method on non-struct type".into()))?;
                class.methods.push(method);
                Ok(vec![])
            }
            "const_declaration" => {
                if self.iota_enum(node)?.is_some() {
                    return Ok(vec![]);
                }
                self.read_module_vars(node, true, module)
            }
            "var_declaration" => self.read_module_vars(node, false, module),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_type_declaration(&mut self, node: Node, module: &mut Module) -> ReadResult<Vec<Stmt>> {
        for spec in named_children(node) {
            match spec.kind() {
                "type_spec" => self.read_type_spec(spec, module)?,
                "type_alias" => {
                    let name = self.node_text(field(spec, "name")?).to_string();
                    let ty = parse_type(self.node_text(field(spec, "type")?));
                    module.type_defs.push(TypeDef {
                        name,
                        kind: TypeDefKind::Alias(ty),
                        doc: None,
                    });
                }
                _ => {}
            }
        }
        Ok(vec![])
    }

    fn read_type_spec(&mut self, spec: Node, module: &mut Module) -> ReadResult<()> {
        let name = self.node_text(field(spec, "name")?).to_string();
        let ty = field(spec, "type")?;
        match ty.kind() {
            "struct_type" => {
                let mut class = Class::new(name.clone());
                class.span = span(spec);
                let mut embedded = Vec::new();
                for decl in field_declarations(ty) {
                    if decl.child_by_field_name("name").is_none() {
                        let base = self.node_text(field(decl, "type")?).trim_start_matches('*');
                        embedded.push(base.rsplit('.').next().unwrap_or(base).to_string());
                    }
                }
                let mut embedded = embedded.into_iter();
                class.base = embedded.next();
                class.capabilities = embedded.collect();
                for (field_name, field_ty) in self.structs.get(&name).cloned().unwrap_or_default() {
                    class.properties.push(Property::new(field_name, field_ty));
                }
                module.classes.push(class);
            }
            "interface_type" => {
                let mut props = Vec::new();
                for member in named_children(ty) {
                    if !matches!(member.kind(), "method_spec" | "method_elem") {
                        continue;
                    }
                    let method = self.node_text(field(member, "name")?).to_string();
                    let params = self.read_params(field(member, "parameters")?)?;
                    let ret = self.read_result(member)?;
                    let fty = Type::function(params.into_iter().map(|p| p.ty).collect(), ret);
                    props.push(Property::new(method, fty));
                }
                module.type_defs.push(TypeDef {
                    name,
                    kind: TypeDefKind::Record(props),
                    doc: None,
                });
            }
            // `type Color int` backing an iota enum.
            _ if module.enums.iter().any(|e| e.name == name) => {}
            _ => module.type_defs.push(TypeDef {
                name,
                kind: TypeDefKind::Alias(parse_type(self.node_text(ty))),
                doc: None,
            }),
        }
        Ok(())
    }

    fn struct_fields(&self, ty: Node) -> ReadResult<Fields> {
        let mut fields = Vec::new();
        for decl in field_declarations(ty) {
            let field_ty = parse_type(self.node_text(field(decl, "type")?));
            let mut cursor = decl.walk();
            for name in decl.children_by_field_name("name", &mut cursor) {
                fields.push((self.node_text(name).to_string(), field_ty.clone()));
            }
        }
        Ok(fields)
    }

    /// `const ( A T = iota; B; C )` as an enum named `T`.
    fn iota_enum(&self, node: Node) -> ReadResult<Option<Enum>> {
        let specs: Vec<Node> = named_children(node)
            .into_iter()
            .filter(|s| s.kind() == "const_spec")
            .collect();
        let Some(first) = specs.first() else {
            return Ok(None);
        };
        let is_iota = first
            .child_by_field_name("value")
            .is_some_and(|v| self.node_text(v).trim() == "iota");
        let Some(ty) = first.child_by_field_name("type") else {
            return Ok(None);
        };
        if !is_iota {
            return Ok(None);
        }
        let mut variants = Vec::new();
        for spec in &specs {
            if spec.child_by_field_name("value").is_some() && spec.id() != first.id() {
                return unsupported("enum with explicit values");
            }
            variants.push(EnumVariant {
                name: self.node_text(field(*spec, "name")?).to_string(),
                value: None,
            });
        }
        Ok(Some(Enum {
            name: self.node_text(ty).to_string(),
            variants,
        }))
    }

    fn read_module_vars(
        &mut self,
        node: Node,
        constant: bool,
        module: &mut Module,
    ) -> ReadResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        for spec in specs_of(node) {
            for stmt in self.read_spec(spec)? {
                match stmt {
                    Stmt::Assign {
                        target: Expr::Ident(name),
                        value,
                        ty,
                        declare: true,
                    } if is_constant_expr(&value) => module.variables.push(Variable {
                        name,
                        ty,
                        value: Some(value),
                        constant,
                        span: span(spec),
                    }),
                    Stmt::Declare { name, ty } => module.variables.push(Variable {
                        name,
                        ty,
                        value: None,
                        constant,
                        span: span(spec),
                    }),
                    other => stmts.push(other),
                }
            }
        }
        Ok(stmts)
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
        func.span = span(node);
        Ok(func)
    }

    fn read_signature_and_body(&mut self, node: Node) -> ReadResult<(Vec<Param>, Type, Vec<Stmt>)> {
        let params = self.read_params(field(node, "parameters")?)?;
        let ret = self.read_result(node)?;
        self.env.bind_params(&params);
        let mut body = self.read_block(field(node, "body")?)?;
        hoist_declarations(&mut body);
        Ok((params, ret, body))
    }

    fn read_method(&mut self, node: Node) -> ReadResult<(String, Function)> {
        let receiver = named_children(field(node, "receiver")?)
            .into_iter()
            .next()
            .ok_or_else(|| self.parse_error(node, "method without receiver"))?;
        let class = self
            .node_text(field(receiver, "type")?)
            .trim_start_matches('*')
            .to_string();
        let class = class.split('[').next().unwrap_or(&class).to_string();
        self.receiver = receiver
            .child_by_field_name("name")
            .map(|n| self.node_text(n).to_string());
        self.env.set_class(Some(class.as_str()));
        let name = self.node_text(field(node, "name")?).to_string();
        let result = self.read_function(node, name);
        self.env.set_class(None);
        self.receiver = None;
        Ok((class, result?))
    }

    /// `func NewT(..) *T { ...; return &T{..} }` names `T`.
    fn constructor_target(&self, node: Node, name: &str) -> Option<String> {
        let class = name
            .strip_prefix("New")
            .or_else(|| name.strip_prefix("new"))?;
        if !self.structs.contains_key(class) {
            return None;
        }
        let result = node.child_by_field_name("result")?;
        if self.node_text(result).trim_start_matches('*') != class {
            return None;
        }
        let last = block_statements(node.child_by_field_name("body")?).pop()?;
        let value = named_children(last).into_iter().next()?;
        let value = named_children(value).into_iter().next()?;
        let literal = match value.kind() {
            "unary_expression" => named_children(value).into_iter().next()?,
            _ => value,
        };
        (literal.kind() == "composite_literal"
            && self.node_text(literal.child_by_field_name("type")?) == class)
            .then(|| class.to_string())
    }

    /// Body statements, then one `this.field = value` per literal field.
    fn read_constructor(&mut self, node: Node, class: &str) -> ReadResult<Function> {
        self.building = Some(class.to_string());
        self.env.set_class(Some(class));
        let result = self.read_function(node, "constructor".to_string());
        self.env.set_class(None);
        self.building = None;
        let mut ctor = result?;
        let Some(Stmt::Return(Some(Expr::Construct { args, .. }))) = ctor.body.pop() else {
            return Err(self.parse_error(node, "constructor without struct literal"));
        };
        let fields = self.structs.get(class).cloned().unwrap_or_default();
        for ((name, _), value) in fields.into_iter().zip(args) {
            if is_zero_value(&value) {
                continue;
            }
            ctor.body
                .push(Stmt::assign(Expr::member(Expr::This, name), value));
        }
        ctor.ret = Type::void();
        Ok(ctor)
    }

    fn read_params(&mut self, node: Node) -> ReadResult<Vec<Param>> {
        let mut params = Vec::new();
        for decl in named_children(node) {
            let variadic = decl.kind() == "variadic_parameter_declaration";
            let ty = parse_type(self.node_text(field(decl, "type")?));
            let mut cursor = decl.walk();
            let names: Vec<Node> = decl.children_by_field_name("name", &mut cursor).collect();
            if names.is_empty() {
                return unsupported("unnamed parameter");
            }
            for name in names {
                params.push(Param {
                    variadic,
                    ..Param::new(self.node_text(name), ty.clone())
                });
            }
        }
        Ok(params)
    }

    fn read_result(&self, node: Node) -> ReadResult<Type> {
        let Some(result) = node.child_by_field_name("result") else {
            return Ok(Type::void());
        };
        if result.kind() == "parameter_list" {
            let decls = named_children(result);
            return match &decls[..] {
                [single] => Ok(parse_type(self.node_text(field(*single, "type")?))),
                _ => unsupported("multiple results"),
            };
        }
        Ok(parse_type(self.node_text(result)))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn read_block(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        self.env.push_scope();
        let mut stmts = Vec::new();
        let mut result = Ok(());
        for child in block_statements(node) {
            match recover(self.read_stmt(child), self.node_text(child), span(child)) {
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

    fn read_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "short_var_declaration" => self.read_short_var(node),
            "assignment_statement" => self.read_assignment(node).map(|s| vec![s]),
            "inc_statement" | "dec_statement" => self.read_inc(node).map(|s| vec![s]),
            "var_declaration" | "const_declaration" => {
                let mut stmts = Vec::new();
                for spec in specs_of(node) {
                    stmts.extend(self.read_spec(spec)?);
                }
                Ok(stmts)
            }
            "expression_statement" => {
                let expr = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "empty statement"))?;
                if let Some(panic) = self.read_panic(expr)? {
                    return Ok(vec![panic]);
                }
                Ok(vec![Stmt::Expr(self.read_expr(expr)?)])
            }
            "return_statement" => {
                let values = match named_children(node).into_iter().next() {
                    Some(list) => self.read_expr_list(list)?,
                    None => Vec::new(),
                };
                match <[Expr; 1]>::try_from(values) {
                    Ok([value]) => Ok(vec![Stmt::Return(Some(value))]),
                    Err(values) if values.is_empty() => Ok(vec![Stmt::Return(None)]),
                    Err(_) => unsupported("multiple return values"),
                }
            }
            "if_statement" => self.read_if(node),
            "for_statement" => self.read_for(node).map(|s| vec![s]),
            "expression_switch_statement" => self.read_switch(node),
            "break_statement" => match named_children(node).is_empty() {
                true => Ok(vec![Stmt::Break]),
                false => unsupported("labeled break"),
            },
            "continue_statement" => match named_children(node).is_empty() {
                true => Ok(vec![Stmt::Continue]),
                false => unsupported("labeled continue"),
            },
            "block" => Ok(self.read_block(node)?),
            "empty_statement" => Ok(vec![]),
            "go_statement" => unsupported("goroutine"),
            "defer_statement" => unsupported("defer"),
            "fallthrough_statement" => unsupported("fallthrough"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_short_var(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let left = named_children(field(node, "left")?);
        let right = self.read_expr_list(field(node, "right")?)?;
        if left.len() != right.len() {
            return unsupported("multi-value binding");
        }
        let mut stmts = Vec::new();
        for (name, value) in left.into_iter().zip(right) {
            let target = Expr::ident(self.node_text(name));
            self.env.bind_assignment(&target, &value, &Type::any(), true);
            stmts.push(Stmt::Assign {
                target,
                value,
                ty: Type::any(),
                declare: true,
            });
        }
        if stmts.len() > 1 && stmts.iter().any(|s| self.reads_sibling(s, &stmts)) {
            return unsupported("parallel binding");
        }
        Ok(stmts)
    }

    /// True when a value in a parallel binding reads one of the bound names.
    fn reads_sibling(&self, stmt: &Stmt, all: &[Stmt]) -> bool {
        let Stmt::Assign { value, .. } = stmt else {
            return false;
        };
        let mut hit = false;
        visit::walk_expr(value, &mut |e| {
            hit |= matches!(e, Expr::Ident(n)
                if all.iter().any(|s| matches!(s, Stmt::Assign { target: Expr::Ident(t), .. } if t == n)));
        });
        hit
    }

    /// `var x T`, `var x = v`, `const x = v` inside a body.
    fn read_spec(&mut self, spec: Node) -> ReadResult<Vec<Stmt>> {
        let mut cursor = spec.walk();
        let names: Vec<Node> = spec.children_by_field_name("name", &mut cursor).collect();
        let declared = match spec.child_by_field_name("type") {
            Some(t) => parse_type(self.node_text(t)),
            None => Type::any(),
        };
        let values = match spec.child_by_field_name("value") {
            Some(list) => self.read_expr_list(list)?,
            None => Vec::new(),
        };
        if values.is_empty() {
            return Ok(names
                .into_iter()
                .map(|n| {
                    let name = self.node_text(n).to_string();
                    self.env.declare(&name, declared.clone());
                    Stmt::Declare {
                        name,
                        ty: declared.clone(),
                    }
                })
                .collect());
        }
        if values.len() != names.len() {
            return unsupported("multi-value binding");
        }
        let mut stmts = Vec::new();
        for (name, value) in names.into_iter().zip(values) {
            let target = Expr::ident(self.node_text(name));
            self.env.bind_assignment(&target, &value, &declared, true);
            stmts.push(Stmt::Assign {
                target,
                value,
                ty: declared.clone(),
                declare: true,
            });
        }
        Ok(stmts)
    }

    fn read_assignment(&mut self, node: Node) -> ReadResult<Stmt> {
        let left = named_children(field(node, "left")?);
        let right = named_children(field(node, "right")?);
        let (&[left], &[right]) = (left.as_slice(), right.as_slice()) else {
            return unsupported("parallel assignment");
        };
        let target = self.read_target(left)?;
        let op_text = self.node_text(field(node, "operator")?);
        if op_text == "=" {
            // `xs = append(xs, v)`
            if let Some(item) = self.append_to(&target, right)? {
                return Ok(Stmt::Expr(Expr::op(Op::Append, vec![target, item])));
            }
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

    fn append_to(&mut self, target: &Expr, right: Node) -> ReadResult<Option<Expr>> {
        if right.kind() != "call_expression" {
            return Ok(None);
        }
        let func = field(right, "function")?;
        if self.node_text(func) != "append" {
            return Ok(None);
        }
        let args = self.read_args(right)?;
        match <[Expr; 2]>::try_from(args) {
            Ok([seq, item]) if seq == *target => Ok(Some(item)),
            _ => Ok(None),
        }
    }

    fn read_target(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" | "selector_expression" | "index_expression" => self.read_expr(node),
            "unary_expression" => unsupported("pointer assignment"),
            _ => unsupported("assignment target"),
        }
    }

    fn read_inc(&mut self, node: Node) -> ReadResult<Stmt> {
        let operand = named_children(node)
            .into_iter()
            .next()
            .ok_or_else(|| self.parse_error(node, "missing operand"))?;
        let target = self.read_target(operand)?;
        let op = if node.kind() == "inc_statement" {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        };
        Ok(Stmt::assign(
            target.clone(),
            Expr::binary(target, op, Expr::int(1)),
        ))
    }

    /// `panic(x)` as a throw of the canonical base exception.
    fn read_panic(&mut self, node: Node) -> ReadResult<Option<Stmt>> {
        if node.kind() != "call_expression" || self.node_text(field(node, "function")?) != "panic" {
            return Ok(None);
        }
        let arg = match <[Expr; 1]>::try_from(self.read_args(node)?) {
            Ok([arg]) => arg,
            Err(_) => return unsupported("panic arity"),
        };
        let value = match arg {
            construct @ Expr::Construct { .. } => construct,
            other => Expr::Construct {
                class: "Exception".to_string(),
                args: vec![other],
            },
        };
        Ok(Some(Stmt::Throw(value)))
    }

    fn read_if(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        if let Some(init) = node.child_by_field_name("initializer") {
            stmts.extend(self.read_stmt(init)?);
        }
        let test = self.read_expr(field(node, "condition")?)?;
        let then_body = self.read_block(field(node, "consequence")?)?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        let mut alt = node.child_by_field_name("alternative");
        while let Some(next) = alt {
            if next.kind() == "if_statement" {
                if next.child_by_field_name("initializer").is_some() {
                    else_body = Some(self.read_if(next)?);
                    break;
                }
                let test = self.read_expr(field(next, "condition")?)?;
                let body = self.read_block(field(next, "consequence")?)?;
                elifs.push(ElseIf { test, body });
                alt = next.child_by_field_name("alternative");
            } else {
                else_body = Some(self.read_block(next)?);
                alt = None;
            }
        }
        stmts.push(Stmt::If {
            test,
            then_body,
            elifs,
            else_body,
        });
        Ok(stmts)
    }

    fn read_for(&mut self, node: Node) -> ReadResult<Stmt> {
        self.env.push_scope();
        let result = self.read_for_inner(node);
        self.env.pop_scope();
        result
    }

    fn read_for_inner(&mut self, node: Node) -> ReadResult<Stmt> {
        let header = named_children(node)
            .into_iter()
            .find(|c| c.kind() != "block" && Some(c.id()) != node.child_by_field_name("body").map(|b| b.id()));
        let body_node = field(node, "body")?;
        let Some(header) = header else {
            return Ok(Stmt::While {
                test: Expr::bool(true),
                body: self.read_block(body_node)?,
            });
        };
        match header.kind() {
            "for_clause" => self.read_for_clause(header, body_node),
            "range_clause" => self.read_range(header, body_node),
            _ => {
                let test = self.read_expr(header)?;
                Ok(Stmt::While {
                    test,
                    body: self.read_block(body_node)?,
                })
            }
        }
    }

    fn read_for_clause(&mut self, clause: Node, body_node: Node) -> ReadResult<Stmt> {
        let init = match clause.child_by_field_name("initializer") {
            Some(n) => {
                let mut stmts = self.read_stmt(n)?;
                if stmts.len() != 1 {
                    return unsupported("multi-variable loop initializer");
                }
                stmts.pop()
            }
            None => None,
        };
        let test = match clause.child_by_field_name("condition") {
            Some(n) => Some(self.read_expr(n)?),
            None => None,
        };
        let update = match clause.child_by_field_name("update") {
            Some(n) => {
                let mut stmts = self.read_stmt(n)?;
                if stmts.len() != 1 {
                    return unsupported("loop update");
                }
                stmts.pop()
            }
            None => None,
        };
        let body = self.read_block(body_node)?;
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

    /// `for k, v := range x`: the shape depends on what `x` is.
    fn read_range(&mut self, clause: Node, body_node: Node) -> ReadResult<Stmt> {
        let iterable = self.read_expr(field(clause, "right")?)?;
        let ty = self.env.type_of(&iterable);
        let names: Vec<String> = match clause.child_by_field_name("left") {
            Some(left) => named_children(left)
                .into_iter()
                .map(|n| self.node_text(n).to_string())
                .collect(),
            None => Vec::new(),
        };
        let blank = |n: &String| n == "_";
        let mut stmt = match names.as_slice() {
            [] | [_] if ty.is_int() => Stmt::ForRange {
                var: names.first().cloned().unwrap_or_else(|| "_".to_string()),
                start: Expr::int(0),
                end: iterable,
                step: None,
                body: Vec::new(),
            },
            [index] if !ty.is_map() => Stmt::ForRange {
                var: index.clone(),
                start: Expr::int(0),
                end: Expr::op(Op::SeqLength.refine(&ty), vec![iterable]),
                step: None,
                body: Vec::new(),
            },
            [key] => Stmt::ForEach {
                mode: IterMode::Items,
                key: None,
                value: key.clone(),
                iterable,
                body: Vec::new(),
            },
            [key, value] if blank(key) => Stmt::ForEach {
                mode: IterMode::Items,
                key: None,
                value: value.clone(),
                iterable,
                body: Vec::new(),
            },
            [key, value] => Stmt::ForEach {
                mode: if ty.is_map() {
                    IterMode::Entries
                } else {
                    IterMode::Indexed
                },
                key: Some(key.clone()),
                value: value.clone(),
                iterable,
                body: Vec::new(),
            },
            _ => return unsupported("range clause"),
        };
        match &stmt {
            Stmt::ForRange { var, .. } => self.env.declare(var, Type::int()),
            other => self.env.bind_loop(other),
        }
        let body = self.read_block(body_node)?;
        match &mut stmt {
            Stmt::ForRange { body: b, .. } | Stmt::ForEach { body: b, .. } => *b = body,
            _ => {}
        }
        Ok(stmt)
    }

    /// Expression switches lower to an if/elif chain; Go cases never fall
    /// through, so a trailing `break` is dropped.
    fn read_switch(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        if let Some(init) = node.child_by_field_name("initializer") {
            stmts.extend(self.read_stmt(init)?);
        }
        let subject = match node.child_by_field_name("value") {
            Some(v) => Some(self.read_expr(v)?),
            None => None,
        };
        let mut branches = Vec::new();
        let mut default_body = None;
        for case in named_children(node) {
            if !matches!(case.kind(), "expression_case" | "default_case") {
                continue;
            }
            let body_nodes: Vec<Node> = named_children(case)
                .into_iter()
                .filter(|c| Some(c.id()) != case.child_by_field_name("value").map(|v| v.id()))
                .flat_map(|c| {
                    if c.kind() == "statement_list" {
                        named_children(c)
                    } else {
                        vec![c]
                    }
                })
                .collect();
            self.env.push_scope();
            let mut body = Vec::new();
            let mut failed = None;
            for s in body_nodes {
                match recover(self.read_stmt(s), self.node_text(s), span(s)) {
                    Ok(mut read) => body.append(&mut read),
                    Err(err) => {
                        failed = Some(err);
                        break;
                    }
                }
            }
            self.env.pop_scope();
            if let Some(err) = failed {
                return Err(err.into());
            }
            if matches!(body.last(), Some(Stmt::Break)) {
                body.pop();
            }
            if breaks_out(&body) {
                return unsupported("break inside switch case");
            }
            if case.kind() == "default_case" {
                default_body = Some(body);
                continue;
            }
            let values = self.read_expr_list(field(case, "value")?)?;
            let test = values
                .into_iter()
                .map(|v| match &subject {
                    Some(s) => Expr::binary(s.clone(), BinaryOp::Eq, v),
                    None => v,
                })
                .reduce(|a, b| Expr::binary(a, BinaryOp::Or, b))
                .ok_or_else(|| self.parse_error(case, "case without values"))?;
            branches.push((test, body));
        }
        let mut branches = branches.into_iter();
        let Some((test, then_body)) = branches.next() else {
            stmts.extend(default_body.unwrap_or_default());
            return Ok(stmts);
        };
        stmts.push(Stmt::If {
            test,
            then_body,
            elifs: branches.map(|(test, body)| ElseIf { test, body }).collect(),
            else_body: default_body,
        });
        Ok(stmts)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn read_expr_list(&mut self, node: Node) -> ReadResult<Vec<Expr>> {
        if node.kind() != "expression_list" {
            return Ok(vec![self.read_expr(node)?]);
        }
        named_children(node)
            .into_iter()
            .map(|n| self.read_expr(n))
            .collect()
    }

    fn read_args(&mut self, call: Node) -> ReadResult<Vec<Expr>> {
        let args = field(call, "arguments")?;
        let mut out = Vec::new();
        for arg in named_children(args) {
            if arg.kind() == "variadic_argument" {
                return unsupported("argument spread");
            }
            out.push(self.read_expr(arg)?);
        }
        Ok(out)
    }

    fn read_expr(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" => {
                let name = self.node_text(node);
                if self.receiver.as_deref() == Some(name) {
                    return Ok(Expr::This);
                }
                if let Some(en) = self.enum_members.get(name)
                    && !self.env.is_bound(name)
                {
                    return Ok(Expr::member(Expr::ident(en.clone()), name));
                }
                Ok(Expr::ident(name))
            }
            "int_literal" | "float_literal" => number_literal(self.node_text(node))
                .map(Expr::Literal)
                .ok_or_else(|| self.parse_error(node, "invalid number")),
            "interpreted_string_literal" => {
                Ok(Expr::string(unescape(&string_content(self.node_text(node)))))
            }
            "raw_string_literal" => Ok(Expr::string(string_content(self.node_text(node)))),
            "rune_literal" => {
                let text = self.node_text(node);
                Ok(Expr::string(unescape(&text[1..text.len().saturating_sub(1).max(1)])))
            }
            "true" => Ok(Expr::bool(true)),
            "false" => Ok(Expr::bool(false)),
            "nil" => Ok(Expr::null()),
            "iota" => unsupported("iota"),
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
                let operand = self.read_expr(field(node, "operand")?)?;
                match self.node_text(field(node, "operator")?) {
                    "-" => Ok(match operand {
                        Expr::Literal(Literal::Int(n)) => Expr::int(-n),
                        Expr::Literal(Literal::Float(n)) => Expr::float(-n),
                        other => Expr::unary(UnaryOp::Neg, other),
                    }),
                    "+" => Ok(operand),
                    "!" => Ok(Expr::unary(UnaryOp::Not, operand)),
                    "^" => Ok(Expr::unary(UnaryOp::BitNot, operand)),
                    // Pointers are erased: `&x` and `*p` read as the value.
                    "&" | "*" => Ok(operand),
                    other => unsupported(format!("operator {other}")),
                }
            }
            "call_expression" => self.read_call(node),
            "selector_expression" => {
                let operand = self.read_expr(field(node, "operand")?)?;
                let name = self.node_text(field(node, "field")?);
                Ok(Expr::member(operand, name))
            }
            "index_expression" => {
                let object = self.read_expr(field(node, "operand")?)?;
                let index = self.read_expr(field(node, "index")?)?;
                Ok(Expr::index(object, index))
            }
            "composite_literal" => self.read_composite(node),
            "func_literal" => {
                self.env.push_scope();
                let result = self.read_signature_and_body(node);
                self.env.pop_scope();
                let (params, _, body) = result?;
                Ok(Expr::Lambda(Box::new(Lambda {
                    params,
                    body: LambdaBody::Block(body),
                    is_async: false,
                })))
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_expr(inner),
                None => Err(self.parse_error(node, "empty parentheses")),
            },
            // `x.(T)`: assertions are erased.
            "type_assertion_expression" => self.read_expr(field(node, "operand")?),
            "type_conversion_expression" => {
                let ty = parse_type(self.node_text(field(node, "type")?));
                let operand = self.read_expr(field(node, "operand")?)?;
                Ok(conversion(&ty, operand))
            }
            "slice_expression" => unsupported("slice expression"),
            "imaginary_literal" => unsupported("complex number"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    /// `/` between two ints truncates in Go.
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

    fn read_call(&mut self, node: Node) -> ReadResult<Expr> {
        let func = field(node, "function")?;
        let func_text = self.node_text(func);
        match func_text {
            "append" => return unsupported("append result"),
            "make" => {
                let args = field(node, "arguments")?;
                let kids = named_children(args);
                return match kids.as_slice() {
                    [ty] if self.node_text(*ty).starts_with("map[") => Ok(Expr::Map(vec![])),
                    [ty] | [ty, _] if self.node_text(*ty).starts_with("[]") => {
                        if kids.len() == 2 && self.node_text(kids[1]) != "0" {
                            return unsupported("sized make");
                        }
                        Ok(Expr::Array(vec![]))
                    }
                    _ => unsupported("make"),
                };
            }
            "errors.New" | "fmt.Errorf" => {
                let message = self.read_call_args(node, func_text)?;
                return Ok(Expr::Construct {
                    class: "Exception".to_string(),
                    args: vec![message],
                });
            }
            "fmt.Sprintf" => return self.read_call_args(node, func_text),
            _ => {}
        }
        if let Some(class) = self.constructors.get(func_text).cloned() {
            let args = self.read_args(node)?;
            return Ok(Expr::Construct { class, args });
        }
        let args = self.read_args(node)?;
        match func.kind() {
            "identifier" => {
                if self.functions.contains(func_text) || self.env.is_bound(func_text) {
                    return Ok(Expr::call(Expr::ident(func_text), args));
                }
                match idioms::recognize_call(Language::Go, func_text, args) {
                    Ok((op, args)) => Ok(self.operation(op, args)),
                    Err(args) => match conversion_type(func_text) {
                        Some(ty) if args.len() == 1 => Ok(args
                            .into_iter()
                            .map(|a| conversion(&ty, a))
                            .next()
                            .unwrap_or_else(Expr::null)),
                        _ => Ok(Expr::call(Expr::ident(func_text), args)),
                    },
                }
            }
            "selector_expression" => {
                let operand = field(func, "operand")?;
                let method = self.node_text(field(func, "field")?);
                if operand.kind() == "identifier" && self.packages.contains(self.node_text(operand)) {
                    return match idioms::recognize_call(Language::Go, func_text, args) {
                        Ok((op, args)) => Ok(self.operation(op, args)),
                        Err(args) => Ok(Expr::call(
                            Expr::member(Expr::ident(self.node_text(operand)), method),
                            args,
                        )),
                    };
                }
                let object = self.read_expr(operand)?;
                Ok(Expr::call(Expr::member(object, method), args))
            }
            "parenthesized_type" | "slice_type" | "map_type" => unsupported("type conversion"),
            _ => {
                let callee = self.read_expr(func)?;
                Ok(Expr::call(callee, args))
            }
        }
    }

    /// `fmt.Sprintf`-style arguments as one formatted string.
    fn read_call_args(&mut self, node: Node, func: &str) -> ReadResult<Expr> {
        let mut args = self.read_args(node)?.into_iter();
        let Some(Expr::Literal(Literal::String(format))) = args.next() else {
            return unsupported(format!("{func} with dynamic format"));
        };
        let parts = format_parts(&format, args.collect())
            .ok_or_else(|| ReadFail::Unsupported(format!("{func} format")))?;
        if parts.iter().all(|p| matches!(p, FormatPart::Text(_))) {
            let text = parts
                .into_iter()
                .filter_map(|p| match p {
                    FormatPart::Text(t) => Some(t),
                    FormatPart::Expr(_) => None,
                })
                .collect::<String>();
            return Ok(Expr::string(text));
        }
        Ok(Expr::Format(parts))
    }

    fn operation(&self, op: Op, args: Vec<Expr>) -> Expr {
        let op = match args.first() {
            Some(first) => op.refine(&self.env.type_of(first)),
            None => op,
        };
        Expr::op(op, args)
    }

    fn read_composite(&mut self, node: Node) -> ReadResult<Expr> {
        let ty_node = field(node, "type")?;
        let ty_text = self.node_text(ty_node);
        let body = field(node, "body")?;
        let elements = named_children(body);
        if ty_text.starts_with("map[") {
            let mut pairs = Vec::new();
            for el in elements {
                let [k, v] = self.keyed_parts(el)?;
                pairs.push((self.read_expr(k)?, self.read_expr(v)?));
            }
            return Ok(Expr::Map(pairs));
        }
        if ty_text.starts_with('[') {
            let mut items = Vec::new();
            for el in elements {
                if el.kind() == "keyed_element" {
                    return unsupported("indexed array literal");
                }
                items.push(self.read_expr(element_value(el))?);
            }
            return Ok(Expr::Array(items));
        }
        let Some(fields) = self.structs.get(ty_text).cloned() else {
            return unsupported("composite literal");
        };
        if self.constructors.values().any(|c| c == ty_text) && self.building.as_deref() != Some(ty_text) {
            return unsupported("struct literal bypassing constructor");
        }
        let mut args: Vec<Expr> = fields.iter().map(|(_, ty)| zero_value(ty)).collect();
        for (i, el) in elements.into_iter().enumerate() {
            if el.kind() == "keyed_element" {
                let [k, v] = self.keyed_parts(el)?;
                let key = self.node_text(k);
                let slot = fields
                    .iter()
                    .position(|(name, _)| name == key)
                    .ok_or_else(|| self.parse_error(k, format!("unknown field {key}")))?;
                args[slot] = self.read_expr(v)?;
            } else if i < args.len() {
                args[i] = self.read_expr(element_value(el))?;
            }
        }
        Ok(Expr::Construct {
            class: ty_text.to_string(),
            args,
        })
    }

    fn keyed_parts<'t>(&self, el: Node<'t>) -> ReadResult<[Node<'t>; 2]> {
        if el.kind() != "keyed_element" {
            return Err(self.parse_error(el, "expected key: value"));
        }
        let parts: Vec<Node<'t>> = named_children(el).into_iter().map(element_value).collect();
        match <[Node<'t>; 2]>::try_from(parts) {
            Ok(pair) => Ok(pair),
            Err(_) => Err(self.parse_error(el, "malformed keyed element")),
        }
    }
}

fn import_specs(node: Node) -> Vec<Node> {
    named_children(node)
        .into_iter()
        .flat_map(|c| match c.kind() {
            "import_spec_list" => named_children(c),
            _ => vec![c],
        })
        .filter(|c| c.kind() == "import_spec")
        .collect()
}

fn specs_of(node: Node) -> Vec<Node> {
    named_children(node)
        .into_iter()
        .flat_map(|c| match c.kind() {
            "var_spec_list" | "const_spec_list" => named_children(c),
            _ => vec![c],
        })
        .filter(|c| matches!(c.kind(), "var_spec" | "const_spec"))
        .collect()
}

fn field_declarations(struct_type: Node) -> Vec<Node> {
    named_children(struct_type)
        .into_iter()
        .flat_map(named_children)
        .filter(|c| c.kind() == "field_declaration")
        .collect()
}

/// Statements of a block, looking through `statement_list`.
fn block_statements(block: Node) -> Vec<Node> {
    named_children(block)
        .into_iter()
        .flat_map(|c| match c.kind() {
            "statement_list" => named_children(c),
            _ => vec![c],
        })
        .collect()
}

/// Unwrap `literal_element` to the expression it holds.
fn element_value(el: Node) -> Node {
    if el.kind() == "literal_element"
        && let Some(inner) = named_children(el).into_iter().next()
    {
        return inner;
    }
    el
}

fn string_content(text: &str) -> String {
    let t = text.trim();
    if t.len() >= 2 && (t.starts_with('"') || t.starts_with('`')) {
        return t[1..t.len() - 1].to_string();
    }
    t.to_string()
}

fn conversion_type(name: &str) -> Option<Type> {
    match name {
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" => Some(Type::int()),
        "float32" | "float64" => Some(Type::float()),
        "string" => Some(Type::string()),
        _ => None,
    }
}

fn conversion(ty: &Type, operand: Expr) -> Expr {
    if ty.is_int() {
        Expr::op(Op::ToInt, vec![operand])
    } else if ty.is_float() {
        Expr::op(Op::ToFloat, vec![operand])
    } else if ty.is_string() {
        Expr::op(Op::ToString, vec![operand])
    } else {
        operand
    }
}

/// Split a printf format into text and argument parts. Flags, width and
/// precision are dropped; `%%` is a literal percent.
fn format_parts(format: &str, args: Vec<Expr>) -> Option<Vec<FormatPart>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut args = args.into_iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        while chars.next_if(|c| "+-# 0123456789.".contains(*c)).is_some() {}
        match chars.next()? {
            '%' => text.push('%'),
            'v' | 'd' | 's' | 'f' | 'g' | 't' | 'q' => {
                if !text.is_empty() {
                    parts.push(FormatPart::Text(std::mem::take(&mut text)));
                }
                parts.push(FormatPart::Expr(args.next()?));
            }
            _ => return None,
        }
    }
    if args.next().is_some() {
        return None;
    }
    if !text.is_empty() {
        parts.push(FormatPart::Text(text));
    }
    Some(parts)
}

/// End and step of `i < end; i++` style headers.
fn range_bounds(var: &str, test: Option<&Expr>, update: Option<&Stmt>) -> Option<(Expr, Option<Expr>)> {
    let Some(Expr::Binary { left, op, right }) = test else {
        return None;
    };
    let Some(Stmt::Assign {
        target: Expr::Ident(t),
        value: Expr::Binary {
            left: ul,
            op: uop,
            right: step,
        },
        ..
    }) = update
    else {
        return None;
    };
    let is_var = |e: &Expr| matches!(e, Expr::Ident(n) if n == var);
    if !is_var(left) || t != var || !is_var(ul) {
        return None;
    }
    let step = match (&**step, uop) {
        (Expr::Literal(Literal::Int(n)), BinaryOp::Add) if *n > 0 => *n,
        (Expr::Literal(Literal::Int(n)), BinaryOp::Sub) if *n > 0 => -n,
        _ => return None,
    };
    match (op, step > 0) {
        (BinaryOp::Lt, true) | (BinaryOp::Gt, false) => {}
        _ => return None,
    }
    Some(((**right).clone(), (step != 1).then(|| Expr::int(step))))
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

/// Parse a Go type expression. Pointers are erased.
pub(crate) fn parse_type(text: &str) -> Type {
    let t = text.trim().trim_start_matches('*');
    if let Some(elem) = t.strip_prefix("[]") {
        return Type::seq(parse_type(elem));
    }
    if let Some(rest) = t.strip_prefix("map[") {
        let mut depth = 1;
        for (i, c) in rest.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Type::map(parse_type(&rest[..i]), parse_type(&rest[i + 1..]));
                    }
                }
                _ => {}
            }
        }
        return Type::any();
    }
    if t.starts_with('[')
        && let Some(close) = t.find(']')
    {
        return Type::seq(parse_type(&t[close + 1..]));
    }
    if let Some(sig) = t.strip_prefix("func(") {
        let Some(close) = sig.rfind(')') else {
            return Type::any();
        };
        let params = split_top_level(&sig[..close], ',')
            .into_iter()
            .map(|p| parse_type(p.rsplit(' ').next().unwrap_or(p)))
            .collect();
        let ret = sig[close + 1..].trim();
        let ret = if ret.is_empty() {
            Type::void()
        } else {
            parse_type(ret)
        };
        return Type::function(params, ret);
    }
    match t {
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "byte" | "rune" | "uintptr" => Type::int(),
        "float32" | "float64" => Type::float(),
        "string" => Type::string(),
        "bool" => Type::bool(),
        "any" | "interface{}" | "error" | "" => Type::any(),
        other => {
            let name = other.split('[').next().unwrap_or(other);
            Type::named(name.rsplit('.').next().unwrap_or(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Module {
        read_go(src).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let module = read("package calc\n\nfunc Add(a int, b int) int {\n\treturn a + b\n}\n");
        assert_eq!(module.name, "calc");
        let f = module.function("Add").unwrap();
        assert_eq!(f.params[1].ty, Type::int());
        assert_eq!(f.ret, Type::int());
    }

    #[test]
    fn test_main_body_becomes_statements() {
        let module = read("package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n");
        assert!(module.functions.is_empty());
        assert!(matches!(
            &module.statements[0],
            Stmt::Expr(Expr::Operation { op: Op::Print, .. })
        ));
    }

    #[test]
    fn test_struct_with_new_constructor() {
        let src = r#"package main

type Counter struct {
	count int
	name  string
}

func NewCounter(name string) *Counter {
	return &Counter{name: name}
}

func (c *Counter) Increment() {
	c.count++
}

func main() {
	c := NewCounter("x")
	c.Increment()
}
"#;
        let module = read(src);
        let class = module.class("Counter").unwrap();
        assert_eq!(class.properties.len(), 2);
        let ctor = class.constructor().unwrap();
        assert_eq!(ctor.params.len(), 1);
        assert_eq!(ctor.body.len(), 1);
        let inc = class.method("Increment").unwrap();
        assert!(matches!(
            &inc.body[0],
            Stmt::Assign { target: Expr::Member { object, .. }, .. } if **object == Expr::This
        ));
        assert!(module.function("NewCounter").is_none());
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Construct { class, .. }, .. } if class == "Counter"
        ));
    }

    #[test]
    fn test_struct_literal_uses_field_constructor() {
        let src = "package main\n\ntype Point struct {\n\tX, Y int\n}\n\nvar origin = Point{Y: 2}\n";
        let module = read(src);
        assert_eq!(module.class("Point").unwrap().constructor().unwrap().params.len(), 2);
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Construct { args, .. }, .. } if args[0] == Expr::int(0) && args[1] == Expr::int(2)
        ));
    }

    #[test]
    fn test_iota_enum() {
        let src = "package main\n\ntype Color int\n\nconst (\n\tRed Color = iota\n\tGreen\n)\n\nvar c = Green\n";
        let module = read(src);
        assert_eq!(module.enums[0].name, "Color");
        assert_eq!(module.enums[0].variants.len(), 2);
        assert!(module.type_defs.is_empty());
        assert!(matches!(
            &module.statements[0],
            Stmt::Assign { value: Expr::Member { property, .. }, .. } if property == "Green"
        ));
    }

    #[test]
    fn test_append_and_range() {
        let src = "package main\n\nfunc evens(xs []int) []int {\n\tvar out []int\n\tfor _, x := range xs {\n\t\tif x%2 == 0 {\n\t\t\tout = append(out, x)\n\t\t}\n\t}\n\treturn out\n}\n";
        let module = read(src);
        let f = module.function("evens").unwrap();
        assert!(matches!(&f.body[0], Stmt::Declare { ty, .. } if *ty == Type::seq(Type::int())));
        let Stmt::ForEach { mode, body, .. } = &f.body[1] else {
            panic!("expected range loop");
        };
        assert_eq!(*mode, IterMode::Items);
        let Stmt::If { then_body, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(matches!(
            &then_body[0],
            Stmt::Expr(Expr::Operation { op: Op::Append, .. })
        ));
    }

    #[test]
    fn test_sprintf_becomes_format() {
        let src = "package main\n\nimport \"fmt\"\n\nfunc f(n int) string {\n\treturn fmt.Sprintf(\"n=%d (%.2f%%)\", n, 1.5)\n}\n";
        let module = read(src);
        let Stmt::Return(Some(Expr::Format(parts))) = &module.function("f").unwrap().body[0] else {
            panic!("expected format");
        };
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[4], FormatPart::Text("%)".into()));
    }

    #[test]
    fn test_panic_and_int_division() {
        let src = "package main\n\nfunc half(n int) int {\n\tif n < 0 {\n\t\tpanic(\"negative\")\n\t}\n\treturn n / 2\n}\n";
        let module = read(src);
        let f = module.function("half").unwrap();
        let Stmt::If { then_body, .. } = &f.body[0] else {
            panic!("expected if");
        };
        assert!(matches!(&then_body[0], Stmt::Throw(Expr::Construct { class, .. }) if class == "Exception"));
        assert!(matches!(
            &f.body[1],
            Stmt::Return(Some(Expr::Binary { op: BinaryOp::FloorDiv, .. }))
        ));
    }

    #[test]
    fn test_goroutine_is_marker() {
        let module = read("package main\n\nfunc main() {\n\tgo work()\n}\n");
        assert!(matches!(&module.statements[0], Stmt::Unsupported(u) if u.kind == "goroutine"));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("[]string"), Type::seq(Type::string()));
        assert_eq!(
            parse_type("map[string][]int"),
            Type::map(Type::string(), Type::seq(Type::int()))
        );
        assert_eq!(parse_type("*pkg.Node"), Type::named("Node"));
        assert_eq!(
            parse_type("func(int, string) bool"),
            Type::function(vec![Type::int(), Type::string()], Type::bool())
        );
    }

    #[test]
    fn test_syntax_error() {
        let err = read_go("package main\n\nfunc f( {\n").unwrap_err();
        assert!(err.line >= 3);
    }
}
