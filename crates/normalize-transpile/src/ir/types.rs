//! Type values for the IR.
//!
//! Types are immutable value objects compared structurally. The inference
//! engine replaces whole `Type` fields rather than mutating them in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive scalar types shared by every supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Int,
    Float,
    String,
    Bool,
    Null,
}

/// The shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Dynamic type: nothing is known yet.
    Any,
    /// No value (function returns only).
    Void,
    Primitive(Primitive),
    /// A nominal type, usually a class or type definition in the module.
    Named(String),
    Sequence(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
    Union(Vec<Type>),
}

/// A type plus its nullability.
///
/// `optional` mirrors nullable-reference semantics uniformly: `int | None`,
/// `number | null` and `*int` all normalize to an optional `Int`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }

    pub fn any() -> Self {
        Self::new(TypeKind::Any)
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Void)
    }

    pub fn int() -> Self {
        Self::new(TypeKind::Primitive(Primitive::Int))
    }

    pub fn float() -> Self {
        Self::new(TypeKind::Primitive(Primitive::Float))
    }

    pub fn string() -> Self {
        Self::new(TypeKind::Primitive(Primitive::String))
    }

    pub fn bool() -> Self {
        Self::new(TypeKind::Primitive(Primitive::Bool))
    }

    pub fn null() -> Self {
        Self::new(TypeKind::Primitive(Primitive::Null))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(TypeKind::Named(name.into()))
    }

    pub fn seq(element: Type) -> Self {
        Self::new(TypeKind::Sequence(Box::new(element)))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Self::new(TypeKind::Map(Box::new(key), Box::new(value)))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Self::new(TypeKind::Function {
            params,
            ret: Box::new(ret),
        })
    }

    /// Optional-of-T. There is no separate generic node for it.
    pub fn optional_of(inner: Type) -> Self {
        inner.with_optional(true)
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        // An optional dynamic value is still just dynamic.
        self.optional = optional && !self.is_any();
        self
    }

    /// Build a union, flattening nested unions, removing duplicates, and
    /// folding `Null` members into the optional flag.
    pub fn union(members: Vec<Type>) -> Self {
        let mut flat: Vec<Type> = Vec::new();
        let mut optional = false;
        let mut stack = members;
        stack.reverse();
        while let Some(member) = stack.pop() {
            optional |= member.optional;
            match member.kind {
                TypeKind::Union(inner) => {
                    for t in inner.into_iter().rev() {
                        stack.push(t);
                    }
                }
                TypeKind::Primitive(Primitive::Null) => optional = true,
                TypeKind::Any => return Type::any(),
                kind => {
                    let t = Type::new(kind);
                    if !flat.contains(&t) {
                        flat.push(t);
                    }
                }
            }
        }
        let ty = match flat.len() {
            0 => Type::null(),
            1 => flat.remove(0),
            _ => Type::new(TypeKind::Union(flat)),
        };
        if ty.is_null() {
            ty
        } else {
            ty.with_optional(optional)
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(Primitive::Null))
    }

    pub fn is_primitive(&self, p: Primitive) -> bool {
        self.kind == TypeKind::Primitive(p)
    }

    pub fn is_int(&self) -> bool {
        self.is_primitive(Primitive::Int)
    }

    pub fn is_float(&self) -> bool {
        self.is_primitive(Primitive::Float)
    }

    pub fn is_string(&self) -> bool {
        self.is_primitive(Primitive::String)
    }

    pub fn is_bool(&self) -> bool {
        self.is_primitive(Primitive::Bool)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, TypeKind::Sequence(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, TypeKind::Map(_, _))
    }

    /// Element type when iterating: sequence elements, map keys, string characters.
    pub fn element(&self) -> Type {
        match &self.kind {
            TypeKind::Sequence(elem) => (**elem).clone(),
            TypeKind::Map(key, _) => (**key).clone(),
            TypeKind::Primitive(Primitive::String) => Type::string(),
            _ => Type::any(),
        }
    }

    /// Result of indexing: sequence element, map value, string character.
    pub fn indexed(&self) -> Type {
        match &self.kind {
            TypeKind::Map(_, value) => (**value).clone(),
            _ => self.element(),
        }
    }

    pub fn map_parts(&self) -> Option<(&Type, &Type)> {
        match &self.kind {
            TypeKind::Map(k, v) => Some((k, v)),
            _ => None,
        }
    }

    /// True when no `Any` remains anywhere inside this type.
    pub fn is_resolved(&self) -> bool {
        match &self.kind {
            TypeKind::Any => false,
            TypeKind::Void | TypeKind::Primitive(_) | TypeKind::Named(_) => true,
            TypeKind::Sequence(t) => t.is_resolved(),
            TypeKind::Map(k, v) => k.is_resolved() && v.is_resolved(),
            TypeKind::Function { params, ret } => {
                params.iter().all(Type::is_resolved) && ret.is_resolved()
            }
            TypeKind::Union(members) => members.iter().all(Type::is_resolved),
        }
    }

    /// Least upper bound used by inference.
    ///
    /// `Any` is treated as "no evidence yet", so joining it with anything
    /// yields the other side. Int widens to Float. Everything else that
    /// disagrees becomes a union.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        let optional = self.optional || other.optional;
        match (&self.kind, &other.kind) {
            (TypeKind::Any, _) => other.clone(),
            (_, TypeKind::Any) => self.clone(),
            (TypeKind::Primitive(Primitive::Null), _) => other.clone().with_optional(true),
            (_, TypeKind::Primitive(Primitive::Null)) => self.clone().with_optional(true),
            (TypeKind::Primitive(a), TypeKind::Primitive(b))
                if matches!(
                    (a, b),
                    (Primitive::Int, Primitive::Float) | (Primitive::Float, Primitive::Int)
                ) =>
            {
                Type::float().with_optional(optional)
            }
            (TypeKind::Sequence(a), TypeKind::Sequence(b)) => {
                Type::seq(a.join(b)).with_optional(optional)
            }
            (TypeKind::Map(k1, v1), TypeKind::Map(k2, v2)) => {
                Type::map(k1.join(k2), v1.join(v2)).with_optional(optional)
            }
            (
                TypeKind::Function {
                    params: p1,
                    ret: r1,
                },
                TypeKind::Function {
                    params: p2,
                    ret: r2,
                },
            ) if p1.len() == p2.len() => Type::function(
                p1.iter().zip(p2).map(|(a, b)| a.join(b)).collect(),
                r1.join(r2),
            )
            .with_optional(optional),
            _ if self.kind == other.kind => self.clone().with_optional(optional),
            _ => Type::union(vec![self.clone(), other.clone()]),
        }
    }

    /// Join over an iterator; `Any` when empty.
    pub fn join_all<'a>(types: impl IntoIterator<Item = &'a Type>) -> Type {
        types
            .into_iter()
            .fold(Type::any(), |acc, t| acc.join(t))
    }

    /// Count type slots and the dynamic ones among them, recursively.
    pub fn count_slots(&self) -> (usize, usize) {
        match &self.kind {
            TypeKind::Any => (1, 1),
            TypeKind::Void | TypeKind::Primitive(_) | TypeKind::Named(_) => (1, 0),
            TypeKind::Sequence(t) => {
                let (n, d) = t.count_slots();
                (n + 1, d)
            }
            TypeKind::Map(k, v) => {
                let (kn, kd) = k.count_slots();
                let (vn, vd) = v.count_slots();
                (kn + vn + 1, kd + vd)
            }
            TypeKind::Function { params, ret } => {
                let (mut n, mut d) = ret.count_slots();
                for p in params {
                    let (pn, pd) = p.count_slots();
                    n += pn;
                    d += pd;
                }
                (n + 1, d)
            }
            TypeKind::Union(members) => members.iter().fold((1, 0), |(n, d), m| {
                let (mn, md) = m.count_slots();
                (n + mn, d + md)
            }),
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::any()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Any => write!(f, "any")?,
            TypeKind::Void => write!(f, "void")?,
            TypeKind::Primitive(p) => {
                let name = match p {
                    Primitive::Int => "int",
                    Primitive::Float => "float",
                    Primitive::String => "string",
                    Primitive::Bool => "bool",
                    Primitive::Null => "null",
                };
                write!(f, "{name}")?
            }
            TypeKind::Named(name) => write!(f, "{name}")?,
            TypeKind::Sequence(t) => write!(f, "seq<{t}>")?,
            TypeKind::Map(k, v) => write!(f, "map<{k}, {v}>")?,
            TypeKind::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")?
            }
            TypeKind::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{m}")?;
                }
            }
        }
        if self.optional {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_any_is_identity() {
        assert_eq!(Type::any().join(&Type::int()), Type::int());
        assert_eq!(Type::string().join(&Type::any()), Type::string());
    }

    #[test]
    fn test_join_widens_numeric() {
        assert_eq!(Type::int().join(&Type::float()), Type::float());
        assert_eq!(
            Type::seq(Type::int()).join(&Type::seq(Type::float())),
            Type::seq(Type::float())
        );
    }

    #[test]
    fn test_join_null_sets_optional() {
        let t = Type::string().join(&Type::null());
        assert!(t.is_string());
        assert!(t.optional);
    }

    #[test]
    fn test_union_normalizes() {
        let t = Type::union(vec![
            Type::int(),
            Type::union(vec![Type::string(), Type::int()]),
            Type::null(),
        ]);
        assert_eq!(
            t,
            Type::new(TypeKind::Union(vec![Type::int(), Type::string()])).with_optional(true)
        );
        assert_eq!(Type::union(vec![Type::int()]), Type::int());
    }

    #[test]
    fn test_resolved_and_slots() {
        let t = Type::map(Type::string(), Type::any());
        assert!(!t.is_resolved());
        assert_eq!(t.count_slots(), (3, 1));
        assert!(Type::seq(Type::int()).is_resolved());
    }

    #[test]
    fn test_display() {
        let t = Type::function(vec![Type::int()], Type::optional_of(Type::string()));
        assert_eq!(t.to_string(), "fn(int) -> string?");
    }
}
