//! Scoped type environment and expression typing.
//!
//! Readers use a bare [`TypeEnv`] for shallow, single-function typing from
//! local evidence. The inference engine and the writers attach a
//! [`Signatures`] snapshot so calls, constructions and property reads resolve
//! against the rest of the module.

use crate::ir::{
    BinaryOp, ComprehensionKind, Expr, Function, IterMode, LambdaBody, Literal,
    Module, Param, Stmt, Type, TypeDefKind, UnaryOp,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Parameter and return types of one function.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FnSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl FnSig {
    pub fn of(func: &Function) -> Self {
        Self {
            params: func.params.iter().map(|p| p.ty.clone()).collect(),
            ret: func.ret.clone(),
        }
    }
}

/// Member types of one class.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClassSig {
    pub base: Option<String>,
    pub properties: BTreeMap<String, Type>,
    pub methods: BTreeMap<String, FnSig>,
    pub ctor: Option<FnSig>,
}

/// Type snapshot of every module-level declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Signatures {
    pub functions: BTreeMap<String, FnSig>,
    pub classes: BTreeMap<String, ClassSig>,
    pub variables: BTreeMap<String, Type>,
}

impl Signatures {
    pub fn from_module(module: &Module) -> Self {
        let mut sigs = Signatures::default();
        for func in &module.functions {
            sigs.functions.insert(func.name.clone(), FnSig::of(func));
        }
        for class in &module.classes {
            sigs.classes.insert(
                class.name.clone(),
                ClassSig {
                    base: class.base.clone(),
                    properties: class
                        .properties
                        .iter()
                        .map(|p| (p.name.clone(), p.ty.clone()))
                        .collect(),
                    methods: class
                        .methods
                        .iter()
                        .map(|m| (m.name.clone(), FnSig::of(m)))
                        .collect(),
                    ctor: class.constructor().map(FnSig::of),
                },
            );
        }
        for def in &module.type_defs {
            if let TypeDefKind::Record(fields) = &def.kind {
                sigs.classes.insert(
                    def.name.clone(),
                    ClassSig {
                        properties: fields
                            .iter()
                            .map(|p| (p.name.clone(), p.ty.clone()))
                            .collect(),
                        ..ClassSig::default()
                    },
                );
            }
        }
        for var in &module.variables {
            sigs.variables.insert(var.name.clone(), var.ty.clone());
        }
        sigs
    }

    /// Walk `class` and its bases looking for a member; returns the owner.
    fn find<'s, T>(
        &'s self,
        class: &str,
        pick: impl Fn(&'s ClassSig) -> Option<T>,
    ) -> Option<(&'s str, T)> {
        let mut current = Some(class);
        let mut depth = 0;
        while let Some(name) = current {
            let (owner, sig) = self.classes.get_key_value(name)?;
            if let Some(found) = pick(sig) {
                return Some((owner.as_str(), found));
            }
            current = sig.base.as_deref();
            depth += 1;
            if depth > self.classes.len() {
                return None;
            }
        }
        None
    }

    pub fn property(&self, class: &str, name: &str) -> Option<&Type> {
        self.find(class, |c| c.properties.get(name)).map(|(_, t)| t)
    }

    /// The method and the class that defines it.
    pub fn method(&self, class: &str, name: &str) -> Option<(&str, &FnSig)> {
        self.find(class, |c| c.methods.get(name))
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }
}

/// Lexically scoped name-to-type bindings plus expression typing.
#[derive(Debug, Clone)]
pub struct TypeEnv<'a> {
    sigs: Option<&'a Signatures>,
    scopes: Vec<HashMap<String, Type>>,
    class: Option<String>,
}

impl Default for TypeEnv<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TypeEnv<'a> {
    /// Environment for shallow typing: no module knowledge.
    pub fn new() -> Self {
        Self {
            sigs: None,
            scopes: vec![HashMap::new()],
            class: None,
        }
    }

    /// Environment that resolves against the module's declarations, with
    /// module variables bound in the outermost scope.
    pub fn with_signatures(sigs: &'a Signatures) -> Self {
        let mut env = Self {
            sigs: Some(sigs),
            scopes: vec![HashMap::new()],
            class: None,
        };
        for (name, ty) in &sigs.variables {
            env.declare(name, ty.clone());
        }
        env
    }

    pub fn signatures(&self) -> Option<&'a Signatures> {
        self.sigs
    }

    /// Set the class `This` refers to.
    pub fn set_class(&mut self, class: Option<&str>) {
        self.class = class.map(str::to_string);
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind `name` in the innermost scope, replacing any shadowed binding.
    pub fn declare(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    /// Record a new value for `name`: joins into the nearest existing
    /// binding, or declares it in the innermost scope.
    pub fn bind(&mut self, name: &str, ty: Type) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(existing) = scope.get_mut(name) {
                *existing = existing.join(&ty);
                return;
            }
        }
        self.declare(name, ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// True when `name` is bound in a scope nested inside the module scope,
    /// so it shadows any module variable of that name.
    pub fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().skip(1).any(|s| s.contains_key(name))
    }

    pub fn bind_params(&mut self, params: &[Param]) {
        for p in params {
            let ty = if p.variadic {
                Type::seq(p.ty.clone())
            } else {
                p.ty.clone()
            };
            self.declare(&p.name, ty);
        }
    }

    /// Bind the names an assignment introduces. Declared types win over
    /// the value's type.
    pub fn bind_assignment(&mut self, target: &Expr, value: &Expr, declared: &Type, declare: bool) {
        let Expr::Ident(name) = target else {
            return;
        };
        let ty = if declared.is_resolved() {
            declared.clone()
        } else {
            declared.join(&self.type_of(value))
        };
        if declare {
            self.declare(name, ty);
        } else {
            self.bind(name, ty);
        }
    }

    /// Bind loop variables of a for-each or for-range statement. Call after
    /// pushing the loop body scope.
    pub fn bind_loop(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::ForEach {
                mode,
                key,
                value,
                iterable,
                ..
            } => {
                let (key_ty, value_ty) = loop_types(*mode, &self.type_of(iterable));
                if let Some(key) = key {
                    self.declare(key, key_ty);
                }
                self.declare(value, value_ty);
            }
            Stmt::ForRange { var, .. } => self.declare(var, Type::int()),
            _ => {}
        }
    }

    pub fn type_of(&self, expr: &Expr) -> Type {
        let mut locals = Vec::new();
        self.type_with(expr, &mut locals)
    }

    fn local_or_bound(&self, name: &str, locals: &[(String, Type)]) -> Option<Type> {
        locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.clone())
            .or_else(|| self.lookup(name).cloned())
    }

    fn type_with(&self, expr: &Expr, locals: &mut Vec<(String, Type)>) -> Type {
        match expr {
            Expr::Literal(lit) => literal_type(lit),
            Expr::Ident(name) => self
                .local_or_bound(name, locals)
                .or_else(|| {
                    let sigs = self.sigs?;
                    sigs.functions
                        .get(name)
                        .map(|f| Type::function(f.params.clone(), f.ret.clone()))
                })
                .unwrap_or_default(),
            Expr::This => self.class.as_deref().map(Type::named).unwrap_or_default(),
            Expr::Binary { left, op, right } => {
                let l = self.type_with(left, locals);
                let r = self.type_with(right, locals);
                binary_type(*op, &l, &r)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => Type::bool(),
                UnaryOp::BitNot => Type::int(),
                UnaryOp::Neg => self.type_with(operand, locals),
            },
            Expr::Call { callee, .. } => self.call_type(callee, locals),
            Expr::Operation { op, args } => {
                let arg_types: Vec<Type> = args.iter().map(|a| self.type_with(a, locals)).collect();
                op.result_type(&arg_types)
            }
            Expr::Construct { class, .. } => Type::named(class.clone()),
            Expr::Member { object, property } => {
                let object_ty = self.type_with(object, locals);
                self.member_type(&object_ty, property)
            }
            Expr::Index { object, .. } => self.type_with(object, locals).indexed(),
            Expr::Array(items) => {
                let types: Vec<Type> = items.iter().map(|i| self.type_with(i, locals)).collect();
                Type::seq(Type::join_all(&types))
            }
            Expr::Map(pairs) => {
                let keys: Vec<Type> = pairs.iter().map(|(k, _)| self.type_with(k, locals)).collect();
                let values: Vec<Type> =
                    pairs.iter().map(|(_, v)| self.type_with(v, locals)).collect();
                Type::map(Type::join_all(&keys), Type::join_all(&values))
            }
            Expr::Ternary {
                then, otherwise, ..
            } => self
                .type_with(then, locals)
                .join(&self.type_with(otherwise, locals)),
            Expr::Lambda(lambda) => {
                let mark = locals.len();
                for p in &lambda.params {
                    locals.push((p.name.clone(), p.ty.clone()));
                }
                let ret = match &lambda.body {
                    LambdaBody::Expr(body) => self.type_with(body, locals),
                    LambdaBody::Block(_) => Type::any(),
                };
                locals.truncate(mark);
                Type::function(lambda.params.iter().map(|p| p.ty.clone()).collect(), ret)
            }
            Expr::Comprehension(c) => {
                let source = self.type_with(&c.source, locals);
                let mark = locals.len();
                locals.push((c.var.clone(), source.element()));
                let element = self.type_with(&c.transform, locals);
                let ty = match (c.kind, &c.key) {
                    (ComprehensionKind::Map, Some(key)) => {
                        Type::map(self.type_with(key, locals), element)
                    }
                    _ => Type::seq(element),
                };
                locals.truncate(mark);
                ty
            }
            Expr::Await(inner) => self.type_with(inner, locals),
            Expr::Format(_) => Type::string(),
        }
    }

    fn call_type(&self, callee: &Expr, locals: &mut Vec<(String, Type)>) -> Type {
        match callee {
            Expr::Ident(name) => {
                if let Some(t) = self.local_or_bound(name, locals) {
                    return match t.kind {
                        crate::ir::TypeKind::Function { ret, .. } => *ret,
                        _ => Type::any(),
                    };
                }
                let Some(sigs) = self.sigs else {
                    return Type::any();
                };
                if let Some(f) = sigs.functions.get(name) {
                    f.ret.clone()
                } else if sigs.is_class(name) {
                    Type::named(name.clone())
                } else {
                    Type::any()
                }
            }
            Expr::Member { object, property } => {
                let object_ty = self.type_with(object, locals);
                match (&object_ty.kind, self.sigs) {
                    (crate::ir::TypeKind::Named(class), Some(sigs)) => sigs
                        .method(class, property)
                        .map(|(_, m)| m.ret.clone())
                        .unwrap_or_default(),
                    _ => Type::any(),
                }
            }
            _ => Type::any(),
        }
    }

    fn member_type(&self, object: &Type, property: &str) -> Type {
        let (crate::ir::TypeKind::Named(class), Some(sigs)) = (&object.kind, self.sigs) else {
            return Type::any();
        };
        if let Some(t) = sigs.property(class, property) {
            return t.clone();
        }
        sigs.method(class, property)
            .map(|(_, m)| Type::function(m.params.clone(), m.ret.clone()))
            .unwrap_or_default()
    }
}

pub fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Null => Type::null(),
        Literal::Bool(_) => Type::bool(),
        Literal::Int(_) => Type::int(),
        Literal::Float(_) => Type::float(),
        Literal::String(_) => Type::string(),
    }
}

/// Key and value types bound by a for-each over `iterable`.
pub fn loop_types(mode: IterMode, iterable: &Type) -> (Type, Type) {
    match mode {
        IterMode::Items => (Type::any(), iterable.element()),
        IterMode::Indexed => (Type::int(), iterable.element()),
        IterMode::Entries => match iterable.map_parts() {
            Some((k, v)) => (k.clone(), v.clone()),
            None => (Type::any(), Type::any()),
        },
    }
}

/// Numeric result of an arithmetic operator; `Any` meets a number as that number.
fn numeric(l: &Type, r: &Type) -> Type {
    match (l.is_numeric(), r.is_numeric()) {
        (true, true) => l.join(r),
        (true, false) if r.is_any() => l.clone(),
        (false, true) if l.is_any() => r.clone(),
        _ => Type::any(),
    }
}

pub fn binary_type(op: BinaryOp, l: &Type, r: &Type) -> Type {
    match op {
        BinaryOp::Add => {
            if l.is_string() || r.is_string() {
                Type::string()
            } else if l.is_sequence() && r.is_sequence() {
                l.join(r)
            } else {
                numeric(l, r)
            }
        }
        BinaryOp::Mul => {
            if (l.is_string() && r.is_int()) || (l.is_int() && r.is_string()) {
                Type::string()
            } else {
                numeric(l, r)
            }
        }
        BinaryOp::Sub | BinaryOp::Mod | BinaryOp::Pow => numeric(l, r),
        BinaryOp::Div => Type::float(),
        BinaryOp::FloorDiv => {
            if l.is_float() || r.is_float() {
                Type::float()
            } else {
                Type::int()
            }
        }
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => Type::bool(),
        // Value-returning `and`/`or` keep the operand type only when both
        // sides agree on a non-bool type; otherwise the result is a bool.
        BinaryOp::And | BinaryOp::Or => {
            if l == r && !l.is_any() && !l.is_bool() {
                l.clone()
            } else {
                Type::bool()
            }
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
            Type::int()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idioms::Op;
    use crate::ir::{Class, Comprehension, Property};

    #[test]
    fn test_arithmetic_typing() {
        let mut env = TypeEnv::new();
        env.declare("n", Type::int());
        env.declare("x", Type::any());
        let e = Expr::binary(Expr::ident("n"), BinaryOp::Add, Expr::float(1.5));
        assert_eq!(env.type_of(&e), Type::float());
        let e = Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::ident("n"));
        assert_eq!(env.type_of(&e), Type::int());
        let e = Expr::binary(Expr::ident("n"), BinaryOp::Div, Expr::int(2));
        assert_eq!(env.type_of(&e), Type::float());
        let e = Expr::binary(Expr::string("a"), BinaryOp::Add, Expr::ident("x"));
        assert_eq!(env.type_of(&e), Type::string());
    }

    #[test]
    fn test_logical_typing() {
        let env = TypeEnv::new();
        let e = Expr::binary(Expr::string("a"), BinaryOp::Or, Expr::string("b"));
        assert_eq!(env.type_of(&e), Type::string());
        let e = Expr::binary(Expr::int(1), BinaryOp::And, Expr::string("b"));
        assert_eq!(env.type_of(&e), Type::bool());
    }

    #[test]
    fn test_container_literals() {
        let env = TypeEnv::new();
        let e = Expr::Array(vec![Expr::int(1), Expr::float(2.0)]);
        assert_eq!(env.type_of(&e), Type::seq(Type::float()));
        let e = Expr::Map(vec![(Expr::string("a"), Expr::int(1))]);
        assert_eq!(env.type_of(&e), Type::map(Type::string(), Type::int()));
        let e = Expr::Map(vec![]);
        assert_eq!(env.type_of(&e), Type::map(Type::any(), Type::any()));
    }

    #[test]
    fn test_comprehension_binds_variable() {
        let mut env = TypeEnv::new();
        env.declare("items", Type::seq(Type::int()));
        let c = Comprehension::builder("x")
            .source(Expr::ident("items"))
            .transform(Expr::binary(Expr::ident("x"), BinaryOp::Mul, Expr::int(2)))
            .build()
            .unwrap();
        assert_eq!(
            env.type_of(&Expr::Comprehension(Box::new(c))),
            Type::seq(Type::int())
        );
        assert!(!env.is_bound("x"));
    }

    #[test]
    fn test_signatures_resolve_members() {
        let mut module = Module::new("m");
        let mut base = Class::new("Base");
        base.properties.push(Property::new("id", Type::int()));
        let mut class = Class::new("User");
        class.base = Some("Base".into());
        class.properties.push(Property::new("name", Type::string()));
        class.methods.push(
            Function::new("greet", vec![], Type::string(), vec![]).unwrap(),
        );
        module.classes.push(base);
        module.classes.push(class);
        let sigs = Signatures::from_module(&module);

        let mut env = TypeEnv::with_signatures(&sigs);
        env.declare("u", Type::named("User"));
        let e = Expr::member(Expr::ident("u"), "id");
        assert_eq!(env.type_of(&e), Type::int());
        let e = Expr::call(Expr::member(Expr::ident("u"), "greet"), vec![]);
        assert_eq!(env.type_of(&e), Type::string());
        let e = Expr::call(Expr::ident("User"), vec![]);
        assert_eq!(env.type_of(&e), Type::named("User"));
    }

    #[test]
    fn test_operation_result() {
        let mut env = TypeEnv::new();
        env.declare("s", Type::string());
        let e = Expr::op(Op::Split, vec![Expr::ident("s"), Expr::string(",")]);
        assert_eq!(env.type_of(&e), Type::seq(Type::string()));
    }

    #[test]
    fn test_scopes_shadow_and_join() {
        let mut env = TypeEnv::new();
        env.declare("x", Type::int());
        env.push_scope();
        env.bind("x", Type::float());
        env.pop_scope();
        assert_eq!(env.lookup("x"), Some(&Type::float()));
    }
}
