//! Language-neutral intermediate representation.
//!
//! A [`Module`] owns its whole tree. Readers build it once, the inference
//! engine only replaces [`Type`] fields, and writers only read it.
//!
//! The shape is serialized with serde and is the contract with runtimes that
//! execute the IR directly, so fields are added, never repurposed.

mod types;
pub mod visit;

pub use types::{Primitive, Type, TypeKind};

use serde::{Deserialize, Serialize};

/// Rejected IR construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("duplicate parameter `{param}` in function `{function}`")]
    DuplicateParameter { function: String, param: String },

    #[error("class `{class}` already has a constructor")]
    DuplicateConstructor { class: String },

    #[error("comprehension is missing its source iterable")]
    MissingSource,

    #[error("comprehension is missing its element transform")]
    MissingTransform,

    #[error("comprehension is missing its iteration variable")]
    MissingVariable,
}

/// 1-based source position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// One translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub imports: Vec<Import>,
    pub variables: Vec<Variable>,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
    pub type_defs: Vec<TypeDef>,
    pub enums: Vec<Enum>,
    /// Top-level executable statements, in source order.
    pub statements: Vec<Stmt>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            imports: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            type_defs: Vec::new(),
            enums: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    /// Serialize to the JSON shape consumed by IR runtimes.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Descriptive import; never resolved against real files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Import {
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            items: Vec::new(),
            alias: None,
        }
    }
}

/// Module-level variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub value: Option<Expr>,
    pub constant: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expr>,
    pub variadic: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            variadic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// `Void` when the function returns nothing.
    pub ret: Type,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throws: Vec<String>,
    pub doc: Option<String>,
    /// Where a flattened member came from (e.g. `mixin Loggable`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    pub span: Span,
}

impl Function {
    /// Create a function, rejecting duplicate parameter names.
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        ret: Type,
        body: Vec<Stmt>,
    ) -> Result<Self, IrError> {
        let name = name.into();
        for (i, p) in params.iter().enumerate() {
            if params[..i].iter().any(|q| q.name == p.name) {
                return Err(IrError::DuplicateParameter {
                    function: name,
                    param: p.name.clone(),
                });
            }
        }
        Ok(Self {
            name,
            params,
            ret,
            body,
            is_async: false,
            is_static: false,
            throws: Vec::new(),
            doc: None,
            provenance: None,
            span: Span::default(),
        })
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expr>,
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            is_static: false,
            provenance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub base: Option<String>,
    /// Secondary bases flattened away; their members were copied in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    pub properties: Vec<Property>,
    constructor: Option<Function>,
    pub methods: Vec<Function>,
    pub doc: Option<String>,
    pub span: Span,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            capabilities: Vec::new(),
            properties: Vec::new(),
            constructor: None,
            methods: Vec::new(),
            doc: None,
            span: Span::default(),
        }
    }

    pub fn constructor(&self) -> Option<&Function> {
        self.constructor.as_ref()
    }

    pub fn constructor_mut(&mut self) -> Option<&mut Function> {
        self.constructor.as_mut()
    }

    /// Install the constructor. A class has at most one.
    pub fn set_constructor(&mut self, ctor: Function) -> Result<(), IrError> {
        if self.constructor.is_some() {
            return Err(IrError::DuplicateConstructor {
                class: self.name.clone(),
            });
        }
        self.constructor = Some(ctor);
        Ok(())
    }

    /// Replace any existing constructor, returning the old one.
    pub fn replace_constructor(&mut self, ctor: Function) -> Option<Function> {
        self.constructor.replace(ctor)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&Function> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Add a property unless one with the same name exists.
    pub fn ensure_property(&mut self, prop: Property) {
        if self.property(&prop.name).is_none() {
            self.properties.push(prop);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeDefKind,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDefKind {
    Alias(Type),
    Record(Vec<Property>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enum {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub value: Option<Literal>,
}

/// How a for-each loop binds its variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterMode {
    /// `value` takes each element (map keys when iterating a map).
    Items,
    /// `key` is the 0-based index, `value` the element.
    Indexed,
    /// `key`/`value` are map entries.
    Entries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIf {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catch {
    /// Canonical exception name; `None` catches everything.
    pub exception: Option<String>,
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

/// A construct the IR does not model, kept so the loss is visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsupported {
    pub kind: String,
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Assign {
        target: Expr,
        value: Expr,
        /// Declared or inferred type of the binding.
        ty: Type,
        /// First binding of a local name.
        declare: bool,
    },
    /// Local declared without a value; assigned later.
    Declare {
        name: String,
        ty: Type,
    },
    Return(Option<Expr>),
    If {
        test: Expr,
        then_body: Vec<Stmt>,
        elifs: Vec<ElseIf>,
        else_body: Option<Vec<Stmt>>,
    },
    ForEach {
        mode: IterMode,
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// Counter loop over `start..end` (end exclusive) by `step`.
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// Three-clause loop that did not fit [`Stmt::ForRange`].
    ForClassic {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Catch>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Expr(Expr),
    Break,
    Continue,
    Pass,
    Unsupported(Unsupported),
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign {
            target,
            value,
            ty: Type::any(),
            declare: false,
        }
    }

    pub fn declare(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: Expr::ident(name),
            value,
            ty: Type::any(),
            declare: true,
        }
    }

    pub fn return_stmt(expr: Option<Expr>) -> Self {
        Stmt::Return(expr)
    }

    pub fn if_stmt(test: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Self {
        Stmt::If {
            test,
            then_body,
            elifs: Vec::new(),
            else_body,
        }
    }

    pub fn for_each(value: impl Into<String>, iterable: Expr, body: Vec<Stmt>) -> Self {
        Stmt::ForEach {
            mode: IterMode::Items,
            key: None,
            value: value.into(),
            iterable,
            body,
        }
    }

    pub fn while_loop(test: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { test, body }
    }

    /// Short name used in errors and reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Assign { .. } => "assignment",
            Stmt::Declare { .. } => "declaration",
            Stmt::Return(_) => "return",
            Stmt::If { .. } => "if",
            Stmt::ForEach { .. } => "for-each",
            Stmt::ForRange { .. } => "for-range",
            Stmt::ForClassic { .. } => "for",
            Stmt::While { .. } => "while",
            Stmt::Try { .. } => "try",
            Stmt::Throw(_) => "throw",
            Stmt::Expr(_) => "expression statement",
            Stmt::Break => "break",
            Stmt::Continue => "continue",
            Stmt::Pass => "pass",
            Stmt::Unsupported(_) => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// True division: the result is a float even for integer operands.
    Div,
    /// Integer (floor) division.
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::FloorDiv
                | BinaryOp::Mod
                | BinaryOp::Pow
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    /// Operator spelling shared by the C-family targets. `Div`, `FloorDiv`
    /// and `Pow` are not uniform and are handled by each writer.
    pub fn c_symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div | BinaryOp::FloorDiv => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: LambdaBody,
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComprehensionKind {
    List,
    Set,
    /// Lazily evaluated; targets without laziness materialize a list.
    Generator,
    Map,
}

/// Filter-then-transform over a sequence, whatever the source syntax was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    pub var: String,
    pub source: Expr,
    pub transform: Expr,
    /// Key transform for map comprehensions.
    pub key: Option<Expr>,
    pub filter: Option<Expr>,
}

impl Comprehension {
    pub fn builder(var: impl Into<String>) -> ComprehensionBuilder {
        ComprehensionBuilder {
            kind: ComprehensionKind::List,
            var: var.into(),
            source: None,
            transform: None,
            key: None,
            filter: None,
        }
    }
}

/// Assembles a [`Comprehension`] from pieces found while parsing.
#[derive(Debug, Clone)]
pub struct ComprehensionBuilder {
    kind: ComprehensionKind,
    var: String,
    source: Option<Expr>,
    transform: Option<Expr>,
    key: Option<Expr>,
    filter: Option<Expr>,
}

impl ComprehensionBuilder {
    pub fn kind(mut self, kind: ComprehensionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn source(mut self, source: Expr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn transform(mut self, transform: Expr) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn key(mut self, key: Expr) -> Self {
        self.key = Some(key);
        self
    }

    pub fn filter(mut self, filter: Option<Expr>) -> Self {
        self.filter = filter;
        self
    }

    pub fn build(self) -> Result<Comprehension, IrError> {
        if self.var.is_empty() {
            return Err(IrError::MissingVariable);
        }
        let source = self.source.ok_or(IrError::MissingSource)?;
        let transform = self.transform.ok_or(IrError::MissingTransform)?;
        Ok(Comprehension {
            kind: self.kind,
            var: self.var,
            source,
            transform,
            key: self.key,
            filter: self.filter,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    /// The implicit receiver: `self`, `this`, a Go method receiver.
    This,
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// A universal operation from the idiom table.
    Operation {
        op: crate::idioms::Op,
        args: Vec<Expr>,
    },
    Construct {
        class: String,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Array(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Ternary {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Lambda(Box<Lambda>),
    Comprehension(Box<Comprehension>),
    Await(Box<Expr>),
    /// String with embedded expressions.
    Format(Vec<FormatPart>),
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Literal(Literal::Int(n))
    }

    pub fn float(n: f64) -> Self {
        Expr::Literal(Literal::Float(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn op(op: crate::idioms::Op, args: Vec<Expr>) -> Self {
        Expr::Operation { op, args }
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(object),
            property: property.into(),
        }
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    pub fn ternary(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Ternary {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn lambda(params: Vec<Param>, body: Expr) -> Self {
        Expr::Lambda(Box::new(Lambda {
            params,
            body: LambdaBody::Expr(Box::new(body)),
            is_async: false,
        }))
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(Literal::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::Ident(_) => "identifier",
            Expr::This => "this",
            Expr::Binary { .. } => "binary operation",
            Expr::Unary { .. } => "unary operation",
            Expr::Call { .. } => "call",
            Expr::Operation { .. } => "operation",
            Expr::Construct { .. } => "construction",
            Expr::Member { .. } => "property access",
            Expr::Index { .. } => "index access",
            Expr::Array(_) => "array literal",
            Expr::Map(_) => "map literal",
            Expr::Ternary { .. } => "ternary",
            Expr::Lambda(_) => "lambda",
            Expr::Comprehension(_) => "comprehension",
            Expr::Await(_) => "await",
            Expr::Format(_) => "format string",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_params_rejected() {
        let err = Function::new(
            "f",
            vec![Param::new("a", Type::any()), Param::new("a", Type::int())],
            Type::void(),
            vec![],
        )
        .unwrap_err();
        assert_eq!(
            err,
            IrError::DuplicateParameter {
                function: "f".into(),
                param: "a".into()
            }
        );
    }

    #[test]
    fn test_second_constructor_rejected() {
        let mut class = Class::new("Cache");
        let ctor = Function::new("constructor", vec![], Type::void(), vec![]).unwrap();
        class.set_constructor(ctor.clone()).unwrap();
        assert_eq!(
            class.set_constructor(ctor),
            Err(IrError::DuplicateConstructor {
                class: "Cache".into()
            })
        );
    }

    #[test]
    fn test_comprehension_requires_source() {
        let err = Comprehension::builder("x")
            .transform(Expr::ident("x"))
            .build()
            .unwrap_err();
        assert_eq!(err, IrError::MissingSource);

        let ok = Comprehension::builder("x")
            .source(Expr::ident("xs"))
            .transform(Expr::ident("x"))
            .build()
            .unwrap();
        assert!(ok.filter.is_none());
        assert_eq!(ok.kind, ComprehensionKind::List);
    }

    #[test]
    fn test_module_serializes_to_json() {
        let mut module = Module::new("demo");
        module.statements.push(Stmt::declare("x", Expr::int(1)));
        let json = module.to_json().unwrap();
        let back = Module::from_json(&json).unwrap();
        assert_eq!(back, module);
    }
}
