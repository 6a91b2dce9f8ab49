//! Python reader - parses Python source into IR.
//!
//! Uses tree-sitter-python to parse, then walks the CST to produce IR.
//! Python's function scoping is mapped onto declaring assignments: the first
//! binding of a name in a function declares it, and names first bound inside
//! a nested block are hoisted when used outside it.

use super::ts::{self, field, named_children, span};
use super::{
    ReadFail, ReadResult, hoist_declarations, is_constant_expr, number_literal, recover,
    split_top_level, unescape, unsupported,
};
use crate::error::ParseError;
use crate::idioms::{self, Op};
use crate::infer::TypeEnv;
use crate::ir::*;
use crate::lang::Language;
use crate::traits::Reader;
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Python reader.
pub struct PythonReader;

/// Static instance of the Python reader for registry.
pub static PYTHON_READER: PythonReader = PythonReader;

impl Reader for PythonReader {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn read(&self, source: &str) -> Result<Module, ParseError> {
        read_python(source)
    }
}

/// Parse Python source into IR.
pub fn read_python(source: &str) -> Result<Module, ParseError> {
    let tree = ts::parse(arborium_python::language().into(), source)?;
    let mut ctx = ReadContext::new(source);
    ctx.read_module(tree.root_node())
}

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "enum.Enum"];
const IGNORED_BASES: &[&str] = &["object", "ABC", "abc.ABC", "Protocol"];

/// How a `def` inside a class receives its first parameter.
#[derive(Clone)]
enum MethodKind {
    Instance,
    Static,
    /// `@classmethod`; the receiver names the class itself.
    Class(String),
}

enum ClassItem {
    Class(Class),
    Enum(Enum),
    Record(TypeDef),
}

struct ReadContext<'a> {
    source: &'a str,
    classes: HashSet<String>,
    functions: HashSet<String>,
    /// Classes defining a `get` method; `.get()` on those is not a dict lookup.
    get_methods: bool,
    /// Declared names, one set per function.
    scopes: Vec<HashSet<String>>,
    /// `x: T` annotations waiting for their first assignment.
    annotated: HashMap<String, Type>,
    env: TypeEnv<'static>,
    /// Receiver parameter (`self`, `cls`) of the current method and what it
    /// reads as.
    receiver: Option<(String, Expr)>,
    /// `self.x` assignments seen in the current method.
    self_props: Vec<(String, Type)>,
    /// Bindings of enclosing except clauses, innermost last.
    handlers: Vec<Option<String>>,
    /// Markers for class-level constructs with no place in the IR.
    stray: Vec<Stmt>,
}

impl<'a> ReadContext<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            classes: HashSet::new(),
            functions: HashSet::new(),
            get_methods: false,
            scopes: vec![HashSet::new()],
            annotated: HashMap::new(),
            env: TypeEnv::new(),
            receiver: None,
            self_props: Vec::new(),
            handlers: Vec::new(),
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

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn push_function_scope(&mut self) {
        self.scopes.push(HashSet::new());
        self.env.push_scope();
    }

    fn pop_function_scope(&mut self) {
        self.scopes.pop();
        self.env.pop_scope();
    }

    /// Mark `name` declared; true on its first binding in this function.
    fn declare_name(&mut self, name: &str) -> bool {
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.to_string()),
            None => false,
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
            let def = if child.kind() == "decorated_definition" {
                child.child_by_field_name("definition")
            } else {
                Some(*child)
            };
            let Some(def) = def else { continue };
            let Some(name) = def.child_by_field_name("name") else {
                continue;
            };
            let name = self.node_text(name).to_string();
            match def.kind() {
                "class_definition" => {
                    if let Some(body) = def.child_by_field_name("body") {
                        let defines_get = named_children(body).iter().any(|m| {
                            m.kind() == "function_definition"
                                && m.child_by_field_name("name")
                                    .is_some_and(|n| self.node_text(n) == "get")
                        });
                        self.get_methods |= defines_get;
                    }
                    self.classes.insert(name);
                }
                "function_definition" => {
                    self.functions.insert(name);
                }
                _ => {}
            }
        }

        let mut module = Module::new("main");
        for (i, child) in children.iter().enumerate() {
            let child = *child;
            let item = self.read_top_level(child, i == 0, &mut module);
            let stmts = recover(item, self.node_text(child), span(child))?;
            module.statements.extend(stmts);
            module.statements.append(&mut self.stray);
        }
        flatten_mixins(&mut module);
        hoist_declarations(&mut module.statements);
        Ok(module)
    }

    /// Read one top-level node into `module`; returns statements for the
    /// module body.
    fn read_top_level(
        &mut self,
        node: Node,
        first: bool,
        module: &mut Module,
    ) -> ReadResult<Vec<Stmt>> {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                module.imports.extend(self.read_import(node)?);
                Ok(vec![])
            }
            "function_definition" => {
                module.functions.push(self.read_function(node, None)?);
                Ok(vec![])
            }
            "class_definition" => {
                push_class_item(self.read_class(node, &[])?, module);
                Ok(vec![])
            }
            "decorated_definition" => {
                let def = field(node, "definition")?;
                let decorators = self.decorators(node);
                match def.kind() {
                    "class_definition" => {
                        let item = self.read_class(def, &decorators)?;
                        push_class_item(item, module);
                    }
                    _ => {
                        module.functions.push(self.read_function(def, None)?);
                        if !decorators.is_empty() {
                            self.stray.push(self.marker(node, "decorator"));
                        }
                    }
                }
                Ok(vec![])
            }
            _ if first && docstring(node).is_some() => Ok(vec![]),
            _ if statement_expr(node).is_some() => {
                if let Some(var) = self.module_variable(node)? {
                    module.variables.push(var);
                    return Ok(vec![]);
                }
                self.read_stmt(node)
            }
            "if_statement" if self.is_main_guard(node) => {
                let body = field(node, "consequence")?;
                Ok(self.read_block(body)?)
            }
            _ => self.read_stmt(node),
        }
    }

    /// `NAME = <constant>` at module level, on the name's first binding.
    fn module_variable(&mut self, node: Node) -> ReadResult<Option<Variable>> {
        let Some(assign) = statement_expr(node).filter(|a| a.kind() == "assignment") else {
            return Ok(None);
        };
        let left = field(assign, "left")?;
        let Some(right) = assign.child_by_field_name("right") else {
            return Ok(None);
        };
        if left.kind() != "identifier" || self.is_local(self.node_text(left)) {
            return Ok(None);
        }
        let value = self.read_expr(right)?;
        if !is_constant_expr(&value) {
            return Ok(None);
        }
        let name = self.node_text(left).to_string();
        let declared = match assign.child_by_field_name("type") {
            Some(t) => self.read_type(t),
            None => self.env.type_of(&value),
        };
        self.declare_name(&name);
        self.env.declare(&name, declared.clone());
        let constant = name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        Ok(Some(Variable {
            name,
            ty: declared,
            value: Some(value),
            constant,
            span: span(node),
        }))
    }

    fn is_main_guard(&self, node: Node) -> bool {
        let Some(cond) = node.child_by_field_name("condition") else {
            return false;
        };
        if node.child_by_field_name("alternative").is_some() {
            return false;
        }
        let compact: String = self
            .node_text(cond)
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '\'' { '"' } else { c })
            .collect();
        compact == "__name__==\"__main__\""
    }

    fn read_import(&self, node: Node) -> ReadResult<Vec<Import>> {
        let mut cursor = node.walk();
        match node.kind() {
            "import_statement" => Ok(node
                .children_by_field_name("name", &mut cursor)
                .map(|n| self.import_name(n))
                .collect()),
            "future_import_statement" => {
                let items = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| self.node_text(n).to_string())
                    .collect();
                Ok(vec![Import {
                    module: "__future__".to_string(),
                    items,
                    alias: None,
                }])
            }
            _ => {
                let module = self.node_text(field(node, "module_name")?).to_string();
                let mut items: Vec<String> = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| self.node_text(n).to_string())
                    .collect();
                if named_children(node).iter().any(|c| c.kind() == "wildcard_import") {
                    items.push("*".to_string());
                }
                Ok(vec![Import {
                    module,
                    items,
                    alias: None,
                }])
            }
        }
    }

    fn import_name(&self, node: Node) -> Import {
        if node.kind() == "aliased_import" {
            let module = node
                .child_by_field_name("name")
                .map(|n| self.node_text(n))
                .unwrap_or_default();
            let mut import = Import::module(module);
            import.alias = node
                .child_by_field_name("alias")
                .map(|n| self.node_text(n).to_string());
            import
        } else {
            Import::module(self.node_text(node))
        }
    }

    fn decorators(&self, node: Node) -> Vec<String> {
        named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "decorator")
            .map(|d| {
                let text = self.node_text(d).trim_start_matches('@').trim();
                let name = text.split('(').next().unwrap_or(text);
                name.rsplit('.').next().unwrap_or(name).to_string()
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------

    /// Read a `def`. Methods other than static ones take their receiver as
    /// the first parameter.
    fn read_function(&mut self, node: Node, method: Option<MethodKind>) -> ReadResult<Function> {
        let name = self.node_text(field(node, "name")?).to_string();
        let is_async = ts::children(node).iter().any(|c| c.kind() == "async");
        let ret = match node.child_by_field_name("return_type") {
            Some(t) => match self.read_type(t) {
                t if t.is_null() => Type::void(),
                t => t,
            },
            None => Type::any(),
        };

        let outer_receiver = self.receiver.take();
        let outer_annotated = std::mem::take(&mut self.annotated);
        self.push_function_scope();
        let skip_receiver = matches!(method, Some(MethodKind::Instance | MethodKind::Class(_)));
        let (params, receiver) = self.read_params(field(node, "parameters")?, skip_receiver)?;
        self.receiver = receiver.map(|name| match &method {
            Some(MethodKind::Class(class)) => (name, Expr::ident(class.clone())),
            _ => (name, Expr::This),
        });
        for p in &params {
            self.declare_name(&p.name);
        }
        self.env.bind_params(&params);
        let body = self.read_body(field(node, "body")?);
        self.pop_function_scope();
        self.receiver = outer_receiver;
        self.annotated = outer_annotated;
        let (doc, mut body) = body?;
        hoist_declarations(&mut body);

        let mut func = Function::new(name.clone(), params, ret, body)
            .map_err(|e| self.parse_error(node, e.to_string()))?;
        func.is_async = is_async;
        func.doc = doc;
        func.span = span(node);
        Ok(func)
    }

    fn read_params(
        &mut self,
        node: Node,
        skip_receiver: bool,
    ) -> ReadResult<(Vec<Param>, Option<String>)> {
        let mut params = Vec::new();
        let mut receiver = None;
        for child in named_children(node) {
            let param = match child.kind() {
                "identifier" => Param::new(self.node_text(child), Type::any()),
                "typed_parameter" => {
                    let ty = match child.child_by_field_name("type") {
                        Some(t) => self.read_type(t),
                        None => Type::any(),
                    };
                    let inner = named_children(child)
                        .into_iter()
                        .next()
                        .ok_or_else(|| self.parse_error(child, "parameter without name"))?;
                    match inner.kind() {
                        "list_splat_pattern" => Param {
                            variadic: true,
                            ..Param::new(self.splat_name(inner), ty)
                        },
                        "dictionary_splat_pattern" => {
                            Param::new(self.splat_name(inner), Type::map(Type::string(), ty))
                        }
                        _ => Param::new(self.node_text(inner), ty),
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = self.node_text(field(child, "name")?).to_string();
                    let ty = match child.child_by_field_name("type") {
                        Some(t) => self.read_type(t),
                        None => Type::any(),
                    };
                    let default = self.read_expr(field(child, "value")?)?;
                    Param {
                        default: Some(default),
                        ..Param::new(name, ty)
                    }
                }
                "list_splat_pattern" => Param {
                    variadic: true,
                    ..Param::new(self.splat_name(child), Type::any())
                },
                // Keyword arguments arrive as one string-keyed map.
                "dictionary_splat_pattern" => Param::new(
                    self.splat_name(child),
                    Type::map(Type::string(), Type::any()),
                ),
                "keyword_separator" | "positional_separator" => continue,
                other => return unsupported(format!("parameter {other}")),
            };
            if skip_receiver && receiver.is_none() && params.is_empty() {
                receiver = Some(param.name);
                continue;
            }
            params.push(param);
        }
        Ok((params, receiver))
    }

    fn splat_name(&self, node: Node) -> String {
        named_children(node)
            .first()
            .map(|n| self.node_text(*n).to_string())
            .unwrap_or_else(|| self.node_text(node).trim_start_matches('*').to_string())
    }

    /// Function body with its docstring split off.
    fn read_body(&mut self, block: Node) -> ReadResult<(Option<String>, Vec<Stmt>)> {
        let children = named_children(block);
        let mut doc = None;
        let mut rest = &children[..];
        if let Some(string) = children.first().and_then(|first| docstring(*first))
            && let Expr::Literal(Literal::String(s)) = self.read_expr(string)?
        {
            doc = Some(clean_docstring(&s));
            rest = &children[1..];
        }
        let mut body = Vec::new();
        for child in rest {
            body.extend(recover(self.read_stmt(*child), self.node_text(*child), span(*child))?);
        }
        Ok((doc, body))
    }

    fn read_class(&mut self, node: Node, decorators: &[String]) -> ReadResult<ClassItem> {
        let name = self.node_text(field(node, "name")?).to_string();
        let bases: Vec<String> = match node.child_by_field_name("superclasses") {
            Some(list) => named_children(list)
                .into_iter()
                .filter(|b| matches!(b.kind(), "identifier" | "attribute"))
                .map(|b| self.node_text(b).to_string())
                .collect(),
            None => Vec::new(),
        };
        let body = field(node, "body")?;

        if bases.iter().any(|b| ENUM_BASES.contains(&b.as_str())) {
            return self.read_enum(name, body).map(ClassItem::Enum);
        }
        if decorators.iter().any(|d| d == "dataclass")
            && named_children(body)
                .iter()
                .all(|c| c.kind() != "function_definition" && c.kind() != "decorated_definition")
        {
            let doc = self.class_doc(body)?;
            let fields = self.read_class_fields(body)?;
            return Ok(ClassItem::Record(TypeDef {
                name,
                kind: TypeDefKind::Record(fields),
                doc,
            }));
        }

        let mut class = Class::new(name.clone());
        class.span = span(node);
        let mut bases = bases
            .into_iter()
            .filter(|b| !IGNORED_BASES.contains(&b.as_str()) && !b.starts_with("Generic"));
        class.base = bases
            .next()
            .map(|b| idioms::canonical_exception(Language::Python, &b));
        class.capabilities = bases.collect();
        class.doc = self.class_doc(body)?;
        class.properties = self.read_class_fields(body)?;

        self.env.set_class(Some(name.as_str()));
        for child in named_children(body) {
            let (def, decorators) = match child.kind() {
                "function_definition" => (child, Vec::new()),
                "decorated_definition" => (field(child, "definition")?, self.decorators(child)),
                "class_definition" => {
                    self.stray.push(self.marker(child, "nested class"));
                    continue;
                }
                _ => continue,
            };
            if def.kind() != "function_definition" {
                self.stray.push(self.marker(child, "nested class"));
                continue;
            }
            let kind = if decorators.iter().any(|d| d == "staticmethod") {
                MethodKind::Static
            } else if decorators.iter().any(|d| d == "classmethod") {
                MethodKind::Class(name.clone())
            } else {
                MethodKind::Instance
            };
            let is_static = !matches!(kind, MethodKind::Instance);
            if decorators.iter().any(|d| {
                !matches!(
                    d.as_str(),
                    "staticmethod" | "classmethod" | "property" | "abstractmethod"
                )
            }) {
                self.stray.push(self.marker(child, "decorator"));
            }
            let method = self.read_function(def, Some(kind));
            let mut method = match method {
                Ok(m) => m,
                Err(ReadFail::Unsupported(kind)) => {
                    self.stray.push(self.marker(child, &kind));
                    continue;
                }
                Err(err) => return Err(err),
            };
            method.is_static = is_static;
            for (prop, ty) in std::mem::take(&mut self.self_props) {
                class.ensure_property(Property::new(prop, ty));
            }
            if method.name == "__init__" && !is_static {
                method.name = "constructor".to_string();
                method.ret = Type::void();
                class
                    .set_constructor(method)
                    .map_err(|e| self.parse_error(def, e.to_string()))?;
            } else {
                class.methods.push(method);
            }
        }
        self.env.set_class(None);
        Ok(ClassItem::Class(class))
    }

    fn class_doc(&mut self, body: Node) -> ReadResult<Option<String>> {
        let Some(first) = named_children(body).into_iter().next() else {
            return Ok(None);
        };
        if let Some(string) = docstring(first)
            && let Expr::Literal(Literal::String(s)) = self.read_expr(string)?
        {
            return Ok(Some(clean_docstring(&s)));
        }
        Ok(None)
    }

    /// Class-level `name: T = v` and `name = v` declarations.
    fn read_class_fields(&mut self, body: Node) -> ReadResult<Vec<Property>> {
        let mut out = Vec::new();
        for child in named_children(body) {
            let Some(assign) = statement_expr(child).filter(|a| a.kind() == "assignment") else {
                continue;
            };
            let left = field(assign, "left")?;
            if left.kind() != "identifier" {
                self.stray.push(self.marker(child, "class attribute"));
                continue;
            }
            let annotation = assign.child_by_field_name("type");
            let default = match assign.child_by_field_name("right") {
                Some(v) => Some(self.read_expr(v)?),
                None => None,
            };
            let ty = match annotation {
                Some(t) => self.read_type(t),
                None => default
                    .as_ref()
                    .map(|d| self.env.type_of(d))
                    .unwrap_or_default(),
            };
            out.push(Property {
                default,
                // Unannotated class attributes are shared by all instances.
                is_static: annotation.is_none(),
                ..Property::new(self.node_text(left), ty)
            });
        }
        Ok(out)
    }

    fn read_enum(&mut self, name: String, body: Node) -> ReadResult<Enum> {
        let mut variants = Vec::new();
        for child in named_children(body) {
            let Some(assign) = statement_expr(child).filter(|a| a.kind() == "assignment") else {
                continue;
            };
            let variant = self.node_text(field(assign, "left")?).to_string();
            let value = match assign.child_by_field_name("right") {
                Some(v) => match self.read_expr(v)? {
                    Expr::Literal(lit) => Some(lit),
                    Expr::Unary {
                        op: UnaryOp::Neg,
                        operand,
                    } => match *operand {
                        Expr::Literal(Literal::Int(n)) => Some(Literal::Int(-n)),
                        _ => None,
                    },
                    _ => None,
                },
                None => None,
            };
            variants.push(EnumVariant {
                name: variant,
                value,
            });
        }
        Ok(Enum { name, variants })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn read_block(&mut self, node: Node) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        for child in named_children(node) {
            stmts.extend(recover(self.read_stmt(child), self.node_text(child), span(child))?);
        }
        Ok(stmts)
    }

    fn read_stmt(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        if let Some(expr) = statement_expr(node) {
            return match expr.kind() {
                "assignment" => self.read_assignment(expr),
                "augmented_assignment" => self.read_augmented(expr).map(|s| vec![s]),
                // Docstrings and other bare strings do nothing.
                "string" => Ok(vec![]),
                _ => Ok(vec![Stmt::Expr(self.read_expr(expr)?)]),
            };
        }
        match node.kind() {
            "expression_statement" => unsupported("tuple expression"),
            "return_statement" => {
                let value = match named_children(node).into_iter().next() {
                    Some(v) => Some(self.read_expr(v)?),
                    None => None,
                };
                Ok(vec![Stmt::Return(value)])
            }
            "if_statement" => self.read_if(node).map(|s| vec![s]),
            "for_statement" => self.read_for(node).map(|s| vec![s]),
            "while_statement" => {
                if node.child_by_field_name("alternative").is_some() {
                    return unsupported("while-else");
                }
                let test = self.read_expr(field(node, "condition")?)?;
                let body = self.read_block(field(node, "body")?)?;
                Ok(vec![Stmt::While { test, body }])
            }
            "try_statement" => self.read_try(node).map(|s| vec![s]),
            "raise_statement" => self.read_raise(node).map(|s| vec![s]),
            "pass_statement" => Ok(vec![Stmt::Pass]),
            "break_statement" => Ok(vec![Stmt::Break]),
            "continue_statement" => Ok(vec![Stmt::Continue]),
            "function_definition" => {
                // Declared first so the body can recurse.
                let name = self.node_text(field(node, "name")?);
                self.declare_name(name);
                let func = self.read_function(node, None)?;
                let lambda = Expr::Lambda(Box::new(Lambda {
                    params: func.params,
                    body: LambdaBody::Block(func.body),
                    is_async: func.is_async,
                }));
                Ok(vec![Stmt::Assign {
                    target: Expr::ident(func.name),
                    value: lambda,
                    ty: Type::any(),
                    declare: true,
                }])
            }
            "global_statement" | "nonlocal_statement" => {
                for name in named_children(node) {
                    let name = self.node_text(name).to_string();
                    self.declare_name(&name);
                }
                Ok(vec![])
            }
            "comment" => Ok(vec![]),
            "decorated_definition" => unsupported("decorated local definition"),
            "class_definition" => unsupported("local class"),
            "import_statement" | "import_from_statement" => unsupported("local import"),
            "with_statement" => unsupported("with"),
            "assert_statement" => unsupported("assert"),
            "delete_statement" => unsupported("del"),
            "match_statement" => unsupported("match"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_assignment(&mut self, node: Node) -> ReadResult<Vec<Stmt>> {
        let left = field(node, "left")?;
        let declared = match node.child_by_field_name("type") {
            Some(t) => self.read_type(t),
            None => Type::any(),
        };
        let Some(right) = node.child_by_field_name("right") else {
            // `x: int` with no value: remember the type for the first binding.
            if left.kind() == "identifier" {
                let name = self.node_text(left).to_string();
                self.annotated.insert(name, declared);
                return Ok(vec![]);
            }
            return unsupported("bare annotation");
        };

        if right.kind() == "assignment" {
            // a = b = v  ->  b = v; a = b
            let mut stmts = self.read_assignment(right)?;
            let inner_target = self.read_expr(field(right, "left")?)?;
            stmts.push(self.assign(left, inner_target, declared)?);
            return Ok(stmts);
        }
        if matches!(left.kind(), "pattern_list" | "tuple_pattern" | "list_pattern") {
            let targets = named_children(left);
            let values = match right.kind() {
                "expression_list" | "tuple" | "list" => named_children(right),
                _ => return unsupported("destructuring assignment"),
            };
            if targets.len() != values.len() {
                return unsupported("destructuring assignment");
            }
            let target_names: HashSet<&str> =
                targets.iter().map(|t| self.node_text(*t)).collect();
            let mut exprs = Vec::with_capacity(values.len());
            for v in values {
                exprs.push(self.read_expr(v)?);
            }
            // Sequential assignment is only faithful when no value reads a target.
            let mut reads_target = false;
            for expr in &exprs {
                visit::walk_expr(expr, &mut |e| {
                    reads_target |= matches!(e, Expr::Ident(n) if target_names.contains(n.as_str()));
                });
            }
            if reads_target {
                return unsupported("tuple swap");
            }
            let mut stmts = Vec::new();
            for (t, value) in targets.into_iter().zip(exprs) {
                stmts.push(self.assign(t, value, Type::any())?);
            }
            return Ok(stmts);
        }

        let value = self.read_expr(right)?;
        Ok(vec![self.assign(left, value, declared)?])
    }

    fn assign(&mut self, left: Node, value: Expr, declared: Type) -> ReadResult<Stmt> {
        let target = self.read_expr(left)?;
        match &target {
            Expr::Ident(name) => {
                let declared = if declared.is_any() {
                    self.annotated.remove(name).unwrap_or(declared)
                } else {
                    declared
                };
                let declare = self.declare_name(name);
                self.env.bind_assignment(&target, &value, &declared, declare);
                Ok(Stmt::Assign {
                    target,
                    value,
                    ty: declared,
                    declare,
                })
            }
            Expr::Member { object, property } if matches!(**object, Expr::This) => {
                let ty = if declared.is_any() {
                    self.env.type_of(&value)
                } else {
                    declared.clone()
                };
                self.self_props.push((property.clone(), ty));
                Ok(Stmt::Assign {
                    target,
                    value,
                    ty: declared,
                    declare: false,
                })
            }
            Expr::Member { .. } | Expr::Index { .. } => Ok(Stmt::assign(target, value)),
            _ => unsupported("assignment target"),
        }
    }

    fn read_augmented(&mut self, node: Node) -> ReadResult<Stmt> {
        let target = self.read_expr(field(node, "left")?)?;
        let op_text = self.node_text(field(node, "operator")?);
        let op = binary_op(op_text.trim_end_matches('='))
            .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
        let right = self.read_expr(field(node, "right")?)?;
        let value = Expr::binary(target.clone(), op, right);
        if matches!(target, Expr::Ident(_)) {
            self.env.bind_assignment(&target, &value, &Type::any(), false);
        }
        Ok(Stmt::assign(target, value))
    }

    fn read_if(&mut self, node: Node) -> ReadResult<Stmt> {
        let test = self.read_expr(field(node, "condition")?)?;
        let then_body = self.read_block(field(node, "consequence")?)?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        let mut cursor = node.walk();
        let alternatives: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        for alt in alternatives {
            match alt.kind() {
                "elif_clause" => {
                    let test = self.read_expr(field(alt, "condition")?)?;
                    let body = self.read_block(field(alt, "consequence")?)?;
                    elifs.push(ElseIf { test, body });
                }
                "else_clause" => {
                    else_body = Some(self.read_block(field(alt, "body")?)?);
                }
                _ => {}
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
        if node.child_by_field_name("alternative").is_some() {
            return unsupported("for-else");
        }
        if ts::children(node).iter().any(|c| c.kind() == "async") {
            return unsupported("async for");
        }
        let left = field(node, "left")?;
        let right = field(node, "right")?;
        let body_node = field(node, "body")?;

        let (callee, call_args) = self.call_parts(right);
        let mut stmt = match left.kind() {
            "identifier" if callee == Some("range") => {
                let mut args = Vec::new();
                for a in call_args {
                    args.push(self.read_expr(a)?);
                }
                let (start, end, step) = match args.len() {
                    1 => (Expr::int(0), args.remove(0), None),
                    2 => {
                        let end = args.remove(1);
                        (args.remove(0), end, None)
                    }
                    3 => {
                        let step = args.remove(2);
                        let end = args.remove(1);
                        (args.remove(0), end, Some(step))
                    }
                    _ => return unsupported("range arguments"),
                };
                Stmt::ForRange {
                    var: self.node_text(left).to_string(),
                    start,
                    end,
                    step,
                    body: Vec::new(),
                }
            }
            "identifier" => Stmt::ForEach {
                mode: IterMode::Items,
                key: None,
                value: self.node_text(left).to_string(),
                iterable: self.read_expr(right)?,
                body: Vec::new(),
            },
            "pattern_list" | "tuple_pattern" => {
                let names = named_children(left);
                let [k, v] = names[..] else {
                    return unsupported("tuple loop target");
                };
                if k.kind() != "identifier" || v.kind() != "identifier" {
                    return unsupported("nested loop target");
                }
                let (mode, iterable) = match (callee, &call_args[..]) {
                    (Some("enumerate"), [xs]) => (IterMode::Indexed, self.read_expr(*xs)?),
                    _ if self.is_items_call(right) => {
                        let func = field(right, "function")?;
                        (IterMode::Entries, self.read_expr(field(func, "object")?)?)
                    }
                    _ => return unsupported("tuple loop target"),
                };
                Stmt::ForEach {
                    mode,
                    key: Some(self.node_text(k).to_string()),
                    value: self.node_text(v).to_string(),
                    iterable,
                    body: Vec::new(),
                }
            }
            _ => return unsupported("loop target"),
        };

        self.env.push_scope();
        self.env.bind_loop(&stmt);
        match &stmt {
            Stmt::ForEach { key, value, .. } => {
                if let Some(key) = key {
                    self.declare_name(key);
                }
                self.declare_name(value);
            }
            Stmt::ForRange { var, .. } => {
                self.declare_name(var);
            }
            _ => {}
        }
        let body = self.read_block(body_node);
        self.env.pop_scope();
        match &mut stmt {
            Stmt::ForEach { body: b, .. } | Stmt::ForRange { body: b, .. } => *b = body?,
            _ => {}
        }
        Ok(stmt)
    }

    /// Callee name and positional argument nodes of a plain call.
    fn call_parts<'t>(&self, node: Node<'t>) -> (Option<&'a str>, Vec<Node<'t>>) {
        if node.kind() != "call" {
            return (None, Vec::new());
        }
        let name = node
            .child_by_field_name("function")
            .filter(|f| f.kind() == "identifier")
            .map(|f| self.node_text(f));
        let args = node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();
        if args.iter().any(|a| a.kind() == "keyword_argument") {
            return (None, Vec::new());
        }
        (name, args)
    }

    fn is_items_call(&self, node: Node) -> bool {
        node.kind() == "call"
            && node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "attribute")
                .and_then(|f| f.child_by_field_name("attribute"))
                .is_some_and(|a| self.node_text(a) == "items")
            && node
                .child_by_field_name("arguments")
                .is_some_and(|a| named_children(a).is_empty())
    }

    fn read_try(&mut self, node: Node) -> ReadResult<Stmt> {
        let body = self.read_block(field(node, "body")?)?;
        let mut handlers = Vec::new();
        let mut finally = None;
        for clause in named_children(node) {
            match clause.kind() {
                "except_clause" => handlers.push(self.read_except(clause)?),
                "finally_clause" => {
                    let block = named_children(clause)
                        .into_iter()
                        .find(|c| c.kind() == "block")
                        .ok_or_else(|| self.parse_error(clause, "finally without body"))?;
                    finally = Some(self.read_block(block)?);
                }
                "else_clause" => return unsupported("try-else"),
                "except_group_clause" => return unsupported("exception group"),
                _ => {}
            }
        }
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    fn read_except(&mut self, clause: Node) -> ReadResult<Catch> {
        let kids = named_children(clause);
        let block = kids
            .iter()
            .find(|c| c.kind() == "block")
            .copied()
            .ok_or_else(|| self.parse_error(clause, "except without body"))?;
        let header: Vec<Node> = kids.into_iter().filter(|c| c.kind() != "block").collect();
        let (exc_node, binding) = match (
            clause.child_by_field_name("value"),
            clause.child_by_field_name("alias"),
        ) {
            (Some(v), alias) => (Some(v), alias.map(|a| self.node_text(a).to_string())),
            (None, _) => match &header[..] {
                [] => (None, None),
                [p] if p.kind() == "as_pattern" => {
                    let inner = named_children(*p);
                    let alias = p
                        .child_by_field_name("alias")
                        .or_else(|| inner.get(1).copied())
                        .map(|a| self.node_text(a).to_string());
                    (inner.first().copied(), alias)
                }
                [e] => (Some(*e), None),
                [e, b, ..] => (Some(*e), Some(self.node_text(*b).to_string())),
            },
        };
        let exception = match exc_node {
            Some(e) if matches!(e.kind(), "identifier" | "attribute") => {
                let name = self.node_text(e);
                let name = name.rsplit('.').next().unwrap_or(name);
                Some(idioms::canonical_exception(Language::Python, name))
            }
            Some(_) => return unsupported("multi-exception handler"),
            None => None,
        };

        self.env.push_scope();
        if let Some(b) = &binding {
            self.declare_name(b);
            let ty = exception.as_deref().map(Type::named).unwrap_or_default();
            self.env.declare(b, ty);
        }
        self.handlers.push(binding.clone());
        let body = self.read_block(block);
        self.handlers.pop();
        self.env.pop_scope();
        Ok(Catch {
            exception,
            binding,
            body: body?,
        })
    }

    fn read_raise(&mut self, node: Node) -> ReadResult<Stmt> {
        let Some(value) = node.named_child(0) else {
            return match self.handlers.last() {
                Some(Some(binding)) => Ok(Stmt::Throw(Expr::ident(binding.clone()))),
                _ => unsupported("re-raise"),
            };
        };
        if node.child_by_field_name("cause").is_some() {
            return unsupported("raise from");
        }
        let expr = match self.read_expr(value)? {
            Expr::Construct { class, args } => Expr::Construct {
                class: idioms::canonical_exception(Language::Python, &class),
                args,
            },
            Expr::Ident(name) if starts_upper(&name) && !self.is_local(&name) => Expr::Construct {
                class: idioms::canonical_exception(Language::Python, &name),
                args: Vec::new(),
            },
            other => other,
        };
        Ok(Stmt::Throw(expr))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn read_expr(&mut self, node: Node) -> ReadResult<Expr> {
        match node.kind() {
            "identifier" => {
                let name = self.node_text(node);
                match &self.receiver {
                    Some((receiver, expr)) if receiver == name => Ok(expr.clone()),
                    _ => Ok(Expr::ident(name)),
                }
            }
            "integer" | "float" => {
                let text = self.node_text(node);
                if text.ends_with(['j', 'J']) {
                    return unsupported("complex literal");
                }
                number_literal(text)
                    .map(Expr::Literal)
                    .ok_or_else(|| self.parse_error(node, "invalid number"))
            }
            "true" => Ok(Expr::bool(true)),
            "false" => Ok(Expr::bool(false)),
            "none" => Ok(Expr::null()),
            "string" => self.read_string(node),
            "concatenated_string" => {
                let mut parts = Vec::new();
                for s in named_children(node) {
                    match self.read_string(s)? {
                        Expr::Format(p) => parts.extend(p),
                        Expr::Literal(Literal::String(t)) => parts.push(FormatPart::Text(t)),
                        _ => {}
                    }
                }
                Ok(format_or_string(parts))
            }
            "binary_operator" => {
                let left = self.read_expr(field(node, "left")?)?;
                let right = self.read_expr(field(node, "right")?)?;
                let op_text = self.node_text(field(node, "operator")?);
                let op = binary_op(op_text)
                    .ok_or_else(|| ReadFail::Unsupported(format!("operator {op_text}")))?;
                Ok(Expr::binary(left, op, right))
            }
            "boolean_operator" => {
                let left = self.read_expr(field(node, "left")?)?;
                let right = self.read_expr(field(node, "right")?)?;
                let op = match self.node_text(field(node, "operator")?) {
                    "and" => BinaryOp::And,
                    _ => BinaryOp::Or,
                };
                Ok(Expr::binary(left, op, right))
            }
            "comparison_operator" => self.read_comparison(node),
            "not_operator" => {
                let arg = self.read_expr(field(node, "argument")?)?;
                Ok(Expr::unary(UnaryOp::Not, arg))
            }
            "unary_operator" => {
                let arg = self.read_expr(field(node, "argument")?)?;
                match self.node_text(field(node, "operator")?) {
                    "-" => Ok(match arg {
                        Expr::Literal(Literal::Int(n)) => Expr::int(-n),
                        Expr::Literal(Literal::Float(n)) => Expr::float(-n),
                        other => Expr::unary(UnaryOp::Neg, other),
                    }),
                    "~" => Ok(Expr::unary(UnaryOp::BitNot, arg)),
                    _ => Ok(arg),
                }
            }
            "call" => self.read_call(node),
            "attribute" => {
                let object = self.read_expr(field(node, "object")?)?;
                let attr = self.node_text(field(node, "attribute")?);
                Ok(Expr::member(object, attr))
            }
            "subscript" => {
                let object = self.read_expr(field(node, "value")?)?;
                let mut cursor = node.walk();
                let subs: Vec<Node> = node
                    .children_by_field_name("subscript", &mut cursor)
                    .collect();
                let [sub] = subs[..] else {
                    return unsupported("multi-dimensional subscript");
                };
                if sub.kind() == "slice" {
                    return unsupported("slice");
                }
                let index = self.read_expr(sub)?;
                Ok(Expr::index(object, index))
            }
            "list" | "tuple" | "set" | "expression_list" => {
                let mut items = Vec::new();
                for item in named_children(node) {
                    if item.kind() == "list_splat" {
                        return unsupported("splat");
                    }
                    items.push(self.read_expr(item)?);
                }
                Ok(Expr::Array(items))
            }
            "dictionary" => {
                let mut pairs = Vec::new();
                for pair in named_children(node) {
                    if pair.kind() != "pair" {
                        return unsupported("dictionary splat");
                    }
                    let k = self.read_expr(field(pair, "key")?)?;
                    let v = self.read_expr(field(pair, "value")?)?;
                    pairs.push((k, v));
                }
                Ok(Expr::Map(pairs))
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.read_expr(inner),
                None => Ok(Expr::Array(vec![])),
            },
            "conditional_expression" => {
                let parts = named_children(node);
                let [then, test, otherwise] = parts[..] else {
                    return Err(self.parse_error(node, "malformed conditional"));
                };
                let then = self.read_expr(then)?;
                let test = self.read_expr(test)?;
                let otherwise = self.read_expr(otherwise)?;
                Ok(Expr::ternary(test, then, otherwise))
            }
            "lambda" => {
                self.env.push_scope();
                let result = self.read_lambda(node);
                self.env.pop_scope();
                result
            }
            "list_comprehension" => self.read_comprehension(node, ComprehensionKind::List),
            "set_comprehension" => self.read_comprehension(node, ComprehensionKind::Set),
            "generator_expression" => self.read_comprehension(node, ComprehensionKind::Generator),
            "dictionary_comprehension" => self.read_comprehension(node, ComprehensionKind::Map),
            "await" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.parse_error(node, "await without operand"))?;
                Ok(Expr::Await(Box::new(self.read_expr(inner)?)))
            }
            "named_expression" => unsupported("assignment expression"),
            "ellipsis" => unsupported("ellipsis"),
            "yield" => unsupported("yield"),
            "list_splat" | "dictionary_splat" => unsupported("splat"),
            other => unsupported(other.replace('_', " ")),
        }
    }

    fn read_lambda(&mut self, node: Node) -> ReadResult<Expr> {
        let params = match node.child_by_field_name("parameters") {
            Some(p) => self.read_params(p, false)?.0,
            None => Vec::new(),
        };
        self.env.bind_params(&params);
        let body = self.read_expr(field(node, "body")?)?;
        Ok(Expr::lambda(params, body))
    }

    fn read_comparison(&mut self, node: Node) -> ReadResult<Expr> {
        let mut operands = Vec::new();
        let mut operators: Vec<String> = Vec::new();
        let mut pending = String::new();
        for child in ts::children(node) {
            if child.is_named() {
                if child.kind() == "comment" {
                    continue;
                }
                if !pending.is_empty() {
                    operators.push(std::mem::take(&mut pending));
                }
                operands.push(self.read_expr(child)?);
            } else {
                for word in self.node_text(child).split_whitespace() {
                    if !pending.is_empty() {
                        pending.push(' ');
                    }
                    pending.push_str(word);
                }
            }
        }
        if operands.len() != operators.len() + 1 {
            return Err(self.parse_error(node, "malformed comparison"));
        }
        // a < b < c  ->  a < b and b < c
        let mut result: Option<Expr> = None;
        for (i, op) in operators.iter().enumerate() {
            let cmp = compare(op, operands[i].clone(), operands[i + 1].clone())?;
            result = Some(match result {
                Some(acc) => Expr::binary(acc, BinaryOp::And, cmp),
                None => cmp,
            });
        }
        result.ok_or_else(|| self.parse_error(node, "empty comparison"))
    }

    fn read_call(&mut self, node: Node) -> ReadResult<Expr> {
        let func = field(node, "function")?;
        let args_node = field(node, "arguments")?;
        let mut positional = Vec::new();
        let mut keywords: Vec<(String, Expr)> = Vec::new();
        if args_node.kind() == "generator_expression" {
            positional.push(self.read_expr(args_node)?);
        } else {
            for arg in named_children(args_node) {
                match arg.kind() {
                    "keyword_argument" => {
                        let name = self.node_text(field(arg, "name")?).to_string();
                        let value = self.read_expr(field(arg, "value")?)?;
                        keywords.push((name, value));
                    }
                    "list_splat" | "dictionary_splat" => return unsupported("argument splat"),
                    _ => positional.push(self.read_expr(arg)?),
                }
            }
        }

        match func.kind() {
            "identifier" => {
                let name = self.node_text(func);
                if let Some((receiver, expr)) = &self.receiver
                    && receiver == name
                {
                    // cls(..) in a classmethod
                    return Ok(match expr {
                        Expr::Ident(class) => Expr::Construct {
                            class: class.clone(),
                            args: with_keywords(positional, keywords),
                        },
                        other => Expr::call(other.clone(), with_keywords(positional, keywords)),
                    });
                }
                self.read_named_call(name, positional, keywords)
            }
            "attribute" => {
                let obj_node = field(func, "object")?;
                let attr = self.node_text(field(func, "attribute")?);
                if attr == "format" && obj_node.kind() == "string" {
                    return self.read_format_call(obj_node, positional, keywords);
                }
                // super().method(..)
                if obj_node.kind() == "call"
                    && self.call_parts(obj_node).0 == Some("super")
                {
                    let args = with_keywords(positional, keywords);
                    return Ok(if attr == "__init__" {
                        Expr::call(Expr::ident("super"), args)
                    } else {
                        Expr::call(Expr::member(Expr::ident("super"), attr), args)
                    });
                }
                if keywords.is_empty()
                    && obj_node.kind() == "identifier"
                    && !self.is_local(self.node_text(obj_node))
                {
                    let dotted = format!("{}.{attr}", self.node_text(obj_node));
                    match idioms::recognize_call(Language::Python, &dotted, positional) {
                        Ok((op, args)) => return Ok(self.operation(op, args)),
                        Err(args) => positional = args,
                    }
                }
                let object = self.read_expr(obj_node)?;
                if attr == "get"
                    && !self.get_methods
                    && keywords.is_empty()
                    && !matches!(object, Expr::This)
                    && matches!(object, Expr::Ident(_) | Expr::Member { .. })
                    && (1..=2).contains(&positional.len())
                {
                    // d.get(k, default)  ->  d[k] if k in d else default
                    let mut args = positional.into_iter();
                    let key = args.next().unwrap_or_else(Expr::null);
                    let default = args.next().unwrap_or_else(Expr::null);
                    let test = Expr::op(Op::Contains, vec![object.clone(), key.clone()]);
                    return Ok(Expr::ternary(test, Expr::index(object, key), default));
                }
                let args = with_keywords(positional, keywords);
                // Methods of module classes are never library idioms.
                let user_class = matches!(
                    &self.env.type_of(&object).kind,
                    TypeKind::Named(class) if self.classes.contains(class)
                );
                if matches!(object, Expr::This) || user_class {
                    return Ok(Expr::call(Expr::member(object, attr), args));
                }
                match idioms::recognize_method(Language::Python, object, attr, args) {
                    Ok((op, args)) => Ok(self.operation(op, args)),
                    Err((object, args)) => Ok(Expr::call(Expr::member(object, attr), args)),
                }
            }
            _ => {
                let callee = self.read_expr(func)?;
                Ok(Expr::call(callee, with_keywords(positional, keywords)))
            }
        }
    }

    fn read_named_call(
        &mut self,
        name: &str,
        mut args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    ) -> ReadResult<Expr> {
        if self.is_local(name) || self.functions.contains(name) {
            return Ok(Expr::call(Expr::ident(name), with_keywords(args, keywords)));
        }
        if self.classes.contains(name) {
            return Ok(Expr::Construct {
                class: name.to_string(),
                args: with_keywords(args, keywords),
            });
        }
        if !keywords.is_empty() {
            if name == "print" {
                return unsupported("print keyword arguments");
            }
            return Ok(Expr::call(Expr::ident(name), with_keywords(args, keywords)));
        }
        match (name, args.len()) {
            ("list" | "tuple", 0) | ("set", 0) => return Ok(Expr::Array(vec![])),
            ("dict", 0) => return Ok(Expr::Map(vec![])),
            ("list" | "tuple" | "set", 1) => {
                let arg = args.remove(0);
                let kind = if name == "set" {
                    ComprehensionKind::Set
                } else {
                    ComprehensionKind::List
                };
                return Ok(match arg {
                    Expr::Operation {
                        op: Op::Keys | Op::Values,
                        ..
                    } if kind == ComprehensionKind::List => arg,
                    Expr::Comprehension(mut c) => {
                        if c.kind == ComprehensionKind::Generator {
                            c.kind = kind;
                        }
                        Expr::Comprehension(c)
                    }
                    other => {
                        let c = Comprehension::builder("item")
                            .kind(kind)
                            .source(other)
                            .transform(Expr::ident("item"))
                            .build()
                            .map_err(|e| ReadFail::Unsupported(e.to_string()))?;
                        Expr::Comprehension(Box::new(c))
                    }
                });
            }
            ("map" | "filter", 2) => return self.read_map_filter(name, args),
            ("range", _) => return unsupported("range outside a loop"),
            _ => {}
        }
        match idioms::recognize_call(Language::Python, name, args) {
            Ok((op, args)) => Ok(self.operation(op, args)),
            Err(args) if starts_upper(name) => Ok(Expr::Construct {
                class: name.to_string(),
                args,
            }),
            Err(args) => Ok(Expr::call(Expr::ident(name), args)),
        }
    }

    /// `map(f, xs)` / `filter(p, xs)` as comprehensions.
    fn read_map_filter(&mut self, name: &str, mut args: Vec<Expr>) -> ReadResult<Expr> {
        let source = args.remove(1);
        let func = args.remove(0);
        let (var, applied) = match func {
            Expr::Lambda(lambda)
                if lambda.params.len() == 1 && matches!(lambda.body, LambdaBody::Expr(_)) =>
            {
                let var = lambda.params[0].name.clone();
                let LambdaBody::Expr(body) = lambda.body else {
                    return unsupported("lambda body");
                };
                (var, *body)
            }
            Expr::Ident(f) => {
                let var = "item".to_string();
                let applied = self.read_named_call(&f, vec![Expr::ident(&var)], Vec::new())?;
                (var, applied)
            }
            _ => return unsupported(format!("{name} with a computed function")),
        };
        let builder = Comprehension::builder(var.clone()).source(source);
        let builder = if name == "map" {
            builder.transform(applied)
        } else {
            builder.transform(Expr::ident(var)).filter(Some(applied))
        };
        let c = builder
            .build()
            .map_err(|e| ReadFail::Unsupported(e.to_string()))?;
        Ok(Expr::Comprehension(Box::new(c)))
    }

    fn operation(&self, op: Op, args: Vec<Expr>) -> Expr {
        let op = match args.first() {
            Some(first) => op.refine(&self.env.type_of(first)),
            None => op,
        };
        Expr::op(op, args)
    }

    fn read_comprehension(&mut self, node: Node, kind: ComprehensionKind) -> ReadResult<Expr> {
        let body = field(node, "body")?;
        let clauses: Vec<Node> = named_children(node)
            .into_iter()
            .filter(|c| c.id() != body.id())
            .collect();
        let fors: Vec<Node> = clauses
            .iter()
            .copied()
            .filter(|c| c.kind() == "for_in_clause")
            .collect();
        let [for_clause] = fors[..] else {
            return unsupported("nested comprehension");
        };
        let left = field(for_clause, "left")?;
        if left.kind() != "identifier" {
            return unsupported("comprehension target");
        }
        let var = self.node_text(left).to_string();
        let source = self.read_expr(field(for_clause, "right")?)?;

        self.env.push_scope();
        self.env.declare(&var, self.env.type_of(&source).element());
        let result = self.read_comprehension_body(body, &clauses, kind);
        self.env.pop_scope();
        let (key, transform, filter) = result?;

        let mut builder = Comprehension::builder(var)
            .kind(kind)
            .source(source)
            .transform(transform)
            .filter(filter);
        if let Some(key) = key {
            builder = builder.key(key);
        }
        let c = builder
            .build()
            .map_err(|e| self.parse_error(node, e.to_string()))?;
        Ok(Expr::Comprehension(Box::new(c)))
    }

    /// Key, element transform and joined filter of a comprehension.
    fn read_comprehension_body(
        &mut self,
        body: Node,
        clauses: &[Node],
        kind: ComprehensionKind,
    ) -> ReadResult<(Option<Expr>, Expr, Option<Expr>)> {
        let (key, transform) = if kind == ComprehensionKind::Map {
            if body.kind() != "pair" {
                return unsupported("comprehension body");
            }
            (
                Some(self.read_expr(field(body, "key")?)?),
                self.read_expr(field(body, "value")?)?,
            )
        } else {
            (None, self.read_expr(body)?)
        };
        let mut filter: Option<Expr> = None;
        for clause in clauses.iter().filter(|c| c.kind() == "if_clause") {
            let Some(cond) = named_children(*clause).into_iter().next() else {
                continue;
            };
            let cond = self.read_expr(cond)?;
            filter = Some(match filter {
                Some(f) => Expr::binary(f, BinaryOp::And, cond),
                None => cond,
            });
        }
        Ok((key, transform, filter))
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    fn read_string(&mut self, node: Node) -> ReadResult<Expr> {
        let raw = self.node_text(node);
        let prefix_len = raw.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let prefix = raw[..prefix_len].to_ascii_lowercase();
        let quoted = &raw[prefix_len..];
        let quote = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
            3
        } else {
            1
        };
        if quoted.len() < quote * 2 {
            return Err(self.parse_error(node, "unterminated string"));
        }
        let is_raw = prefix.contains('r');
        let decode = |s: &str| if is_raw { s.to_string() } else { unescape(s) };
        let content_start = node.start_byte() + prefix_len + quote;
        let content_end = node.end_byte() - quote;

        if !prefix.contains('f') {
            return Ok(Expr::string(decode(&self.source[content_start..content_end])));
        }
        let mut parts = Vec::new();
        let mut pos = content_start;
        for child in ts::children(node) {
            if child.kind() != "interpolation" {
                continue;
            }
            if child.start_byte() > pos {
                let text = unbrace(&self.source[pos..child.start_byte()]);
                parts.push(FormatPart::Text(decode(&text)));
            }
            let inner = child
                .child_by_field_name("expression")
                .or_else(|| named_children(child).into_iter().next())
                .ok_or_else(|| self.parse_error(child, "empty interpolation"))?;
            parts.push(FormatPart::Expr(self.read_expr(inner)?));
            pos = child.end_byte();
        }
        if content_end > pos {
            let text = unbrace(&self.source[pos..content_end]);
            parts.push(FormatPart::Text(decode(&text)));
        }
        Ok(format_or_string(parts))
    }

    /// `"...{}...".format(args)`
    fn read_format_call(
        &mut self,
        template: Node,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    ) -> ReadResult<Expr> {
        let Expr::Literal(Literal::String(text)) = self.read_string(template)? else {
            return unsupported("format template");
        };
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut next = 0;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let spec: String = std::iter::from_fn(|| chars.next_if(|c| *c != '}')).collect();
                    chars.next();
                    let key = spec.split([':', '!']).next().unwrap_or("").trim();
                    let value = if key.is_empty() {
                        next += 1;
                        args.get(next - 1)
                    } else if let Ok(i) = key.parse::<usize>() {
                        args.get(i)
                    } else {
                        keywords.iter().find(|(k, _)| k == key).map(|(_, v)| v)
                    };
                    let Some(value) = value else {
                        return unsupported("format placeholder");
                    };
                    if !literal.is_empty() {
                        parts.push(FormatPart::Text(std::mem::take(&mut literal)));
                    }
                    parts.push(FormatPart::Expr(value.clone()));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(FormatPart::Text(literal));
        }
        Ok(format_or_string(parts))
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn read_type(&self, node: Node) -> Type {
        parse_type(self.node_text(node))
    }
}

fn push_class_item(item: ClassItem, module: &mut Module) {
    match item {
        ClassItem::Class(class) => module.classes.push(class),
        ClassItem::Enum(e) => module.enums.push(e),
        ClassItem::Record(def) => module.type_defs.push(def),
    }
}

/// Move members of secondary bases defined in this module into the class.
fn flatten_mixins(module: &mut Module) {
    let snapshot: Vec<Class> = module
        .classes
        .iter()
        .filter(|c| module.classes.iter().any(|o| o.capabilities.contains(&c.name)))
        .cloned()
        .collect();
    for class in &mut module.classes {
        for cap in class.capabilities.clone() {
            let Some(mixin) = snapshot.iter().find(|m| m.name == cap) else {
                continue;
            };
            let provenance = format!("mixin {cap}");
            for prop in &mixin.properties {
                if class.property(&prop.name).is_none() {
                    class.properties.push(Property {
                        provenance: Some(provenance.clone()),
                        ..prop.clone()
                    });
                }
            }
            for method in &mixin.methods {
                if class.method(&method.name).is_none() {
                    let mut method = method.clone();
                    method.provenance = Some(provenance.clone());
                    class.methods.push(method);
                }
            }
        }
    }
}

fn with_keywords(mut args: Vec<Expr>, keywords: Vec<(String, Expr)>) -> Vec<Expr> {
    args.extend(keywords.into_iter().map(|(_, v)| v));
    args
}

fn starts_upper(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn unbrace(s: &str) -> String {
    s.replace("{{", "{").replace("}}", "}")
}

fn format_or_string(parts: Vec<FormatPart>) -> Expr {
    let mut merged: Vec<FormatPart> = Vec::new();
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(FormatPart::Text(prev)), FormatPart::Text(t)) => prev.push_str(&t),
            (_, part) => merged.push(part),
        }
    }
    if merged.iter().all(|p| matches!(p, FormatPart::Text(_))) {
        let text: String = merged
            .into_iter()
            .filter_map(|p| match p {
                FormatPart::Text(t) => Some(t),
                FormatPart::Expr(_) => None,
            })
            .collect();
        return Expr::string(text);
    }
    Expr::Format(merged)
}

/// The expression a statement carries. Depending on the grammar build it is
/// either wrapped in an `expression_statement` or appears in the block bare.
fn statement_expr(node: Node) -> Option<Node> {
    match node.kind() {
        "expression_statement" => match named_children(node)[..] {
            [expr] => Some(expr),
            _ => None,
        },
        "function_definition" | "class_definition" | "decorated_definition" | "comment"
        | "block" | "ERROR" => None,
        kind if kind.ends_with("_statement") => None,
        _ => Some(node),
    }
}

fn docstring(node: Node) -> Option<Node> {
    statement_expr(node).filter(|s| s.kind() == "string")
}

fn clean_docstring(s: &str) -> String {
    let lines: Vec<&str> = s.lines().map(str::trim).collect();
    lines.join("\n").trim().to_string()
}

fn binary_op(op: &str) -> Option<BinaryOp> {
    Some(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "//" => BinaryOp::FloorDiv,
        "%" => BinaryOp::Mod,
        "**" => BinaryOp::Pow,
        "&" => BinaryOp::BitAnd,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        _ => return None,
    })
}

fn compare(op: &str, left: Expr, right: Expr) -> ReadResult<Expr> {
    let op = match op {
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "==" | "is" => BinaryOp::Eq,
        "!=" | "<>" | "is not" => BinaryOp::Ne,
        "in" => return Ok(Expr::op(Op::Contains, vec![right, left])),
        "not in" => {
            return Ok(Expr::unary(
                UnaryOp::Not,
                Expr::op(Op::Contains, vec![right, left]),
            ));
        }
        other => return unsupported(format!("operator {other}")),
    };
    Ok(Expr::binary(left, op, right))
}

/// Parse a Python annotation.
pub(crate) fn parse_type(text: &str) -> Type {
    let t = text.trim().trim_matches(|c| c == '"' || c == '\'');
    let members = split_top_level(t, '|');
    if members.len() > 1 {
        return Type::union(members.into_iter().map(parse_type).collect());
    }
    let (name, args) = match t.find('[') {
        Some(i) if t.ends_with(']') => (&t[..i], split_top_level(&t[i + 1..t.len() - 1], ',')),
        _ => (t, Vec::new()),
    };
    let name = name.trim();
    let name = name.strip_prefix("typing.").unwrap_or(name);
    let arg = |i: usize| args.get(i).map(|a| parse_type(a)).unwrap_or_default();
    match name {
        "int" => Type::int(),
        "float" => Type::float(),
        "str" | "bytes" => Type::string(),
        "bool" => Type::bool(),
        "None" => Type::null(),
        "Any" | "object" | "" => Type::any(),
        "list" | "List" | "Sequence" | "Iterable" | "Iterator" | "set" | "Set" | "frozenset"
        | "FrozenSet" => Type::seq(arg(0)),
        "tuple" | "Tuple" => Type::seq(Type::join_all(
            args.iter()
                .filter(|a| **a != "...")
                .map(|a| parse_type(a))
                .collect::<Vec<_>>()
                .iter(),
        )),
        "dict" | "Dict" | "Mapping" => Type::map(arg(0), arg(1)),
        "Optional" => Type::optional_of(arg(0)),
        "Union" => Type::union(args.iter().map(|a| parse_type(a)).collect()),
        "Callable" => {
            let params = args
                .first()
                .map(|p| p.trim().trim_start_matches('[').trim_end_matches(']'))
                .map(|p| split_top_level(p, ',').into_iter().map(parse_type).collect())
                .unwrap_or_default();
            Type::function(params, arg(1))
        }
        other => Type::named(other.rsplit('.').next().unwrap_or(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Module {
        read_python(src).unwrap()
    }

    #[test]
    fn test_parse_function() {
        let module = read("def add(a: int, b: int) -> int:\n    return a + b\n");
        let f = module.function("add").unwrap();
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].ty, Type::int());
        assert_eq!(f.ret, Type::int());
        assert!(matches!(
            f.body[0],
            Stmt::Return(Some(Expr::Binary {
                op: BinaryOp::Add,
                ..
            }))
        ));
    }

    #[test]
    fn test_plain_statements_carry_no_markers() {
        let src = r#""""Module doc."""

LIMIT = 3
names = load()
names.append("a")
total = len(names)
total += LIMIT


class Color(Enum):
    RED = 1
    GREEN = 2


class Box:
    """Holds a value."""

    size = 0

    def __init__(self, value):
        """Make a box."""
        self.value = value
"#;
        let module = read(src);
        assert!(crate::ir::visit::collect_unsupported(&module).is_empty());
        assert_eq!(module.variables[0].name, "LIMIT");
        assert!(matches!(
            module.statements[..],
            [
                Stmt::Assign { declare: true, .. },
                Stmt::Expr(Expr::Operation { op: Op::Append, .. }),
                Stmt::Assign { declare: true, .. },
                Stmt::Assign { declare: false, .. },
            ]
        ));
        assert_eq!(module.enums[0].variants.len(), 2);
        let class = module.class("Box").unwrap();
        assert_eq!(class.doc.as_deref(), Some("Holds a value."));
        assert!(class.property("size").unwrap().is_static);
        assert!(class.property("value").is_some());
        assert_eq!(class.constructor().unwrap().body.len(), 1);
    }

    #[test]
    fn test_first_assignment_declares() {
        let module = read("x = compute()\nx = x + 1\n");
        assert!(matches!(module.statements[0], Stmt::Assign { declare: true, .. }));
        assert!(matches!(module.statements[1], Stmt::Assign { declare: false, .. }));
    }

    #[test]
    fn test_constant_becomes_variable() {
        let module = read("MAX_SIZE = 10\nprint(MAX_SIZE)\n");
        assert_eq!(module.variables.len(), 1);
        assert!(module.variables[0].constant);
        assert_eq!(module.variables[0].ty, Type::int());
        assert_eq!(module.statements.len(), 1);
    }

    #[test]
    fn test_class_with_constructor_properties() {
        let src = r#"
class Counter:
    """Counts things."""

    def __init__(self, start: int):
        self.count = start
        self.cache = {}

    def incr(self):
        self.count += 1
        return self.count
"#;
        let module = read(src);
        let class = module.class("Counter").unwrap();
        assert_eq!(class.doc.as_deref(), Some("Counts things."));
        let ctor = class.constructor().unwrap();
        assert_eq!(ctor.params.len(), 1);
        assert_eq!(class.property("count").unwrap().ty, Type::int());
        assert!(class.property("cache").is_some());
        let incr = class.method("incr").unwrap();
        assert!(incr.params.is_empty());
        assert!(matches!(
            &incr.body[1],
            Stmt::Return(Some(Expr::Member { object, .. })) if **object == Expr::This
        ));
    }

    #[test]
    fn test_idioms_recognized() {
        let module = read("def f(s: str, xs):\n    print(len(s), len(xs))\n    xs.append(s.upper())\n");
        let f = module.function("f").unwrap();
        let Stmt::Expr(Expr::Operation { op: Op::Print, args }) = &f.body[0] else {
            panic!("expected print, got {:?}", f.body[0]);
        };
        assert!(matches!(args[0], Expr::Operation { op: Op::StrLength, .. }));
        assert!(matches!(args[1], Expr::Operation { op: Op::SeqLength, .. }));
        assert!(matches!(
            f.body[1],
            Stmt::Expr(Expr::Operation { op: Op::Append, .. })
        ));
    }

    #[test]
    fn test_membership_and_none() {
        let module = read("def f(k, d):\n    return k in d and k is not None\n");
        let f = module.function("f").unwrap();
        let Stmt::Return(Some(Expr::Binary { left, right, .. })) = &f.body[0] else {
            panic!("expected and");
        };
        assert!(matches!(**left, Expr::Operation { op: Op::Contains, .. }));
        assert!(matches!(
            **right,
            Expr::Binary {
                op: BinaryOp::Ne,
                ..
            }
        ));
    }

    #[test]
    fn test_loops() {
        let src = "for i in range(10):\n    pass\nfor i, x in enumerate(xs):\n    pass\nfor k, v in d.items():\n    pass\n";
        let module = read(src);
        assert!(matches!(module.statements[0], Stmt::ForRange { .. }));
        assert!(matches!(
            module.statements[1],
            Stmt::ForEach {
                mode: IterMode::Indexed,
                ..
            }
        ));
        assert!(matches!(
            module.statements[2],
            Stmt::ForEach {
                mode: IterMode::Entries,
                ..
            }
        ));
    }

    #[test]
    fn test_comprehension_and_map() {
        let module = read("a = [x * 2 for x in xs if x > 0]\nb = list(map(lambda y: y + 1, xs))\n");
        let Stmt::Assign { value, .. } = &module.statements[0] else {
            panic!("expected assignment");
        };
        let Expr::Comprehension(c) = value else {
            panic!("expected comprehension");
        };
        assert_eq!(c.var, "x");
        assert!(c.filter.is_some());
        let Stmt::Assign { value, .. } = &module.statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::Comprehension(c) if c.var == "y"));
    }

    #[test]
    fn test_fstring() {
        let module = read("name = input()\nmsg = f\"hi {name}!\"\n");
        let Stmt::Assign { value, .. } = &module.statements[1] else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            &Expr::Format(vec![
                FormatPart::Text("hi ".into()),
                FormatPart::Expr(Expr::ident("name")),
                FormatPart::Text("!".into()),
            ])
        );
    }

    #[test]
    fn test_escapes_decoded() {
        let module = read("s = compute(\"a\\tb\\n\")\n");
        let Stmt::Assign { value, .. } = &module.statements[0] else {
            panic!("expected assignment");
        };
        let Expr::Call { args, .. } = value else {
            panic!("expected call");
        };
        assert_eq!(args[0], Expr::string("a\tb\n"));
    }

    #[test]
    fn test_main_guard_spliced() {
        let module = read("def main():\n    pass\n\nif __name__ == \"__main__\":\n    main()\n");
        assert_eq!(module.statements.len(), 1);
        assert!(matches!(module.statements[0], Stmt::Expr(Expr::Call { .. })));
    }

    #[test]
    fn test_unsupported_kept_as_marker() {
        let module = read("with open(p) as f:\n    data = f.read()\nprint(1)\n");
        let Stmt::Unsupported(u) = &module.statements[0] else {
            panic!("expected marker");
        };
        assert_eq!(u.kind, "with");
        assert_eq!(u.span, Span::new(1, 1));
        assert_eq!(module.statements.len(), 2);
    }

    #[test]
    fn test_unterminated_string_is_parse_error() {
        let err = read_python("x = \"abc\ny = 2\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_try_except() {
        let src = "try:\n    risky()\nexcept ValueError as e:\n    raise\nfinally:\n    done()\n";
        let module = read(src);
        let Stmt::Try {
            handlers, finally, ..
        } = &module.statements[0]
        else {
            panic!("expected try");
        };
        assert_eq!(handlers[0].exception.as_deref(), Some("ValueError"));
        assert_eq!(handlers[0].binding.as_deref(), Some("e"));
        assert_eq!(handlers[0].body, vec![Stmt::Throw(Expr::ident("e"))]);
        assert!(finally.is_some());
    }

    #[test]
    fn test_branch_local_hoisted() {
        let src = "def sign(n):\n    if n > 0:\n        r = \"pos\"\n    else:\n        r = \"neg\"\n    return r\n";
        let module = read(src);
        let f = module.function("sign").unwrap();
        assert!(matches!(&f.body[0], Stmt::Declare { name, .. } if name == "r"));
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("list[int]"), Type::seq(Type::int()));
        assert_eq!(parse_type("Dict[str, float]"), Type::map(Type::string(), Type::float()));
        assert_eq!(parse_type("int | None"), Type::optional_of(Type::int()));
        assert_eq!(parse_type("Optional[User]"), Type::optional_of(Type::named("User")));
        assert_eq!(
            parse_type("Callable[[int, int], bool]"),
            Type::function(vec![Type::int(), Type::int()], Type::bool())
        );
    }

    #[test]
    fn test_enum_and_dataclass() {
        let src = "from enum import Enum\nfrom dataclasses import dataclass\n\nclass Color(Enum):\n    RED = 1\n    GREEN = 2\n\n@dataclass\nclass Point:\n    x: float\n    y: float = 0.0\n";
        let module = read(src);
        assert_eq!(module.enums[0].variants.len(), 2);
        let TypeDefKind::Record(fields) = &module.type_defs[0].kind else {
            panic!("expected record");
        };
        assert_eq!(fields.len(), 2);
        assert!(fields[1].default.is_some());
    }

    #[test]
    fn test_mixin_flattened() {
        let src = "class Loggable:\n    def log(self, m):\n        print(m)\n\nclass Base:\n    pass\n\nclass Service(Base, Loggable):\n    def run(self):\n        self.log(\"x\")\n";
        let module = read(src);
        let service = module.class("Service").unwrap();
        assert_eq!(service.base.as_deref(), Some("Base"));
        assert_eq!(service.capabilities, vec!["Loggable".to_string()]);
        let log = service.method("log").unwrap();
        assert_eq!(log.provenance.as_deref(), Some("mixin Loggable"));
    }
}
