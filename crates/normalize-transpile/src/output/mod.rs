//! Output writers - emit annotated IR as source code.
//!
//! Each writer is one pass over the module: statements go straight into the
//! output buffer, expressions are rendered to strings so that the caller can
//! decide on parentheses, and required imports are collected in an
//! [`ImportSet`](crate::idioms::ImportSet) and prepended at the end.
//!
//! Top-level layout is the same for every target: imports, module
//! variables, type definitions, enums, classes, functions, then the
//! top-level statements.

pub mod csharp;
pub mod go;
pub mod python;
pub mod rust;
pub mod typescript;

pub use csharp::{CSHARP_WRITER, CSharpWriter, CSharpWriterImpl};
pub use go::{GO_WRITER, GoWriter, GoWriterImpl};
pub use python::{PYTHON_WRITER, PythonWriter, PythonWriterImpl};
pub use rust::{RUST_WRITER, RustWriter, RustWriterImpl};
pub use typescript::{
    JAVASCRIPT_WRITER, TYPESCRIPT_WRITER, TypeScriptWriter, TypeScriptWriterImpl,
};

use crate::error::GenerationError;
use crate::idioms::{self, ImportSet, Op, Receiver};
use crate::infer::TypeEnv;
use crate::ir::{
    BinaryOp, Class, Comprehension, Expr, Literal, Module, Span, Stmt, Type, UnaryOp, Unsupported,
};
use crate::lang::Language;

pub(crate) fn unrenderable(node: &str, at: Span, message: impl Into<String>) -> GenerationError {
    GenerationError::new(node, at, message)
}

/// Escape a string for a double-quoted literal. `unicode` formats any other
/// control character as a code point escape.
pub(crate) fn escape_string(s: &str, unicode: fn(u32) -> String) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&unicode(c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `\u00XX` as understood by Python, TypeScript, Go and C#.
pub(crate) fn unicode_escape(code: u32) -> String {
    format!("\\u{code:04x}")
}

/// A float literal that still reads as a float.
pub(crate) fn float_literal(f: f64) -> String {
    let s = format!("{f:?}");
    if s.contains(['.', 'e', 'E']) || !f.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

/// Comment lines carrying an unsupported construct's original text.
pub(crate) fn marker_lines(marker: &Unsupported) -> Vec<String> {
    let mut lines = vec![format!(
        "unsupported {} (line {}):",
        marker.kind, marker.span.line
    )];
    lines.extend(marker.text.lines().map(|l| format!("  {}", l.trim_end())));
    lines
}

/// Operator grouping of a target's grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grammar {
    Python,
    /// TypeScript, JavaScript and C#.
    CLike,
    Go,
    Rust,
}

/// Binding strength of a binary operator; higher binds tighter.
pub(crate) fn precedence(op: BinaryOp, grammar: Grammar) -> u8 {
    use BinaryOp::*;
    match grammar {
        Grammar::Python => match op {
            Or => 1,
            And => 2,
            Eq | Ne | Lt | Le | Gt | Ge => 4,
            BitOr => 5,
            BitXor => 6,
            BitAnd => 7,
            Shl | Shr => 8,
            Add | Sub => 9,
            Mul | Div | FloorDiv | Mod => 10,
            Pow => 12,
        },
        Grammar::CLike => match op {
            Or => 1,
            And => 2,
            BitOr => 3,
            BitXor => 4,
            BitAnd => 5,
            Eq | Ne => 6,
            Lt | Le | Gt | Ge => 7,
            Shl | Shr => 8,
            Add | Sub => 9,
            Mul | Div | FloorDiv | Mod => 10,
            Pow => 11,
        },
        Grammar::Go => match op {
            Or => 1,
            And => 2,
            Eq | Ne | Lt | Le | Gt | Ge => 3,
            Add | Sub | BitOr | BitXor => 4,
            Mul | Div | FloorDiv | Mod | Shl | Shr | BitAnd | Pow => 5,
        },
        Grammar::Rust => match op {
            Or => 1,
            And => 2,
            Eq | Ne | Lt | Le | Gt | Ge => 3,
            BitOr => 4,
            BitXor => 5,
            BitAnd => 6,
            Shl | Shr => 7,
            Add | Sub => 8,
            Mul | Div | FloorDiv | Mod | Pow => 9,
        },
    }
}

/// Binding strength of a prefix operator. Python's `not` sits below the
/// comparisons and its `-` below `**`.
pub(crate) fn unary_strength(op: UnaryOp, grammar: Grammar) -> u8 {
    match (grammar, op) {
        (Grammar::Python, UnaryOp::Not) => 3,
        (Grammar::Python, _) => 11,
        _ => 13,
    }
}

/// Strength of an already-rendered operand: binary expressions by their
/// operator, anything with a loose top-level space (ternaries, lambdas,
/// `x in xs`) as the weakest, everything else as an atom.
pub(crate) fn operand_strength(expr: &Expr, rendered: &str, grammar: Grammar) -> u8 {
    match expr {
        Expr::Binary { op, .. } => precedence(*op, grammar),
        Expr::Unary { op, .. } => unary_strength(*op, grammar),
        Expr::Literal(Literal::Int(n)) if *n < 0 => unary_strength(UnaryOp::Neg, grammar),
        Expr::Literal(Literal::Float(f)) if f.is_sign_negative() => {
            unary_strength(UnaryOp::Neg, grammar)
        }
        _ if has_loose_space(rendered) => 0,
        _ => u8::MAX,
    }
}

/// Wrap `rendered` in parentheses when it binds looser than `needed`.
pub(crate) fn wrap(expr: &Expr, rendered: String, needed: u8, grammar: Grammar) -> String {
    if operand_strength(expr, &rendered, grammar) < needed {
        format!("({rendered})")
    } else {
        rendered
    }
}

/// Whether `s` has whitespace outside brackets and quotes.
fn has_loose_space(s: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in s.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Operands of a binary expression, wrapped as the operator requires.
/// `Pow` groups to the right, everything else to the left.
pub(crate) fn binary_operands(
    op: BinaryOp,
    left: (&Expr, String),
    right: (&Expr, String),
    grammar: Grammar,
) -> (String, String) {
    let p = precedence(op, grammar);
    let (left_needed, right_needed) = if op == BinaryOp::Pow {
        (p + 1, p)
    } else {
        (p, p + 1)
    };
    // Rust rejects chained comparisons and Python reads them as `and`.
    let (left_needed, right_needed) =
        if matches!(grammar, Grammar::Rust | Grammar::Python) && op.is_comparison() {
            (p + 1, p + 1)
        } else {
            (left_needed, right_needed)
        };
    (
        wrap(left.0, left.1, left_needed, grammar),
        wrap(right.0, right.1, right_needed, grammar),
    )
}

/// Render a universal operation from the idiom table. Arguments that sit
/// next to an operator or a method call in the template are parenthesized
/// unless they are atoms.
pub(crate) fn render_op(
    op: Op,
    lang: Language,
    receiver: Receiver,
    args: &[(&Expr, String)],
    grammar: Grammar,
    imports: &mut ImportSet,
) -> Option<String> {
    let idiom = idioms::lookup(op, lang, receiver)?;
    for import in idiom.imports {
        imports.add(import);
    }
    let filled: Vec<String> = args
        .iter()
        .enumerate()
        .map(|(i, (expr, text))| {
            if slot_is_delimited(idiom.template, i) {
                text.clone()
            } else {
                wrap(expr, text.clone(), u8::MAX, grammar)
            }
        })
        .collect();
    Some(idioms::fill_template(idiom.template, &filled))
}

/// Whether every occurrence of `$slot` in `template` is a whole call argument.
fn slot_is_delimited(template: &str, slot: usize) -> bool {
    let needle = format!("${slot}");
    for (pos, _) in template.match_indices(&needle) {
        let after = &template[pos + needle.len()..];
        if after.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let open = template[..pos].trim_end_matches(' ').ends_with(['(', ',']);
        let close = after.trim_start_matches(' ').starts_with([')', ',']);
        if !(open && close) {
            return false;
        }
    }
    true
}

/// Classes ordered so that in-module bases precede their subclasses;
/// otherwise source order. Cycles fall back to source order.
pub(crate) fn classes_in_base_order(module: &Module) -> Vec<&Class> {
    let mut ordered: Vec<&Class> = Vec::with_capacity(module.classes.len());
    let mut pending: Vec<&Class> = module.classes.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|class| {
            let ready = class
                .base
                .iter()
                .chain(&class.capabilities)
                .all(|b| *b == class.name || !module.is_class(b) || ordered.iter().any(|o| o.name == *b));
            if ready {
                ordered.push(class);
            }
            !ready
        });
        if pending.len() == before {
            ordered.append(&mut pending);
        }
    }
    ordered
}

/// Whether `stmts` hold a `continue` aimed at the loop that owns them.
pub(crate) fn continues_loop(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::Continue => true,
        Stmt::If {
            then_body,
            elifs,
            else_body,
            ..
        } => {
            continues_loop(then_body)
                || elifs.iter().any(|e| continues_loop(&e.body))
                || else_body.as_deref().is_some_and(continues_loop)
        }
        Stmt::Try {
            body,
            handlers,
            finally,
        } => {
            continues_loop(body)
                || handlers.iter().any(|h| continues_loop(&h.body))
                || finally.as_deref().is_some_and(continues_loop)
        }
        _ => false,
    })
}

/// `super(args)`: a call of the base constructor.
pub(crate) fn is_super_call(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(Expr::Call { callee, .. }) if callee.as_ident() == Some("super"))
}

/// A comprehension that keeps every element unchanged.
pub(crate) fn is_identity(c: &Comprehension) -> bool {
    matches!(&c.transform, Expr::Ident(v) if *v == c.var)
}

/// Bind what a statement introduces into the writer's type environment.
/// Loop variables are bound by the caller inside the loop scope.
pub(crate) fn bind_stmt(env: &mut TypeEnv<'_>, stmt: &Stmt) {
    match stmt {
        Stmt::Assign {
            target,
            value,
            ty,
            declare,
        } => env.bind_assignment(target, value, ty, *declare),
        Stmt::Declare { name, ty } => env.declare(name, ty.clone()),
        _ => {}
    }
}

/// Type of a binding: the annotation when resolved, else the value's type.
pub(crate) fn binding_type(env: &TypeEnv<'_>, declared: &Type, value: Option<&Expr>) -> Type {
    if declared.is_resolved() {
        declared.clone()
    } else {
        value.map_or_else(Type::any, |v| env.type_of(v))
    }
}

/// Key type for a map in a statically typed target. Keys with no evidence
/// are strings, the same as a TypeScript `Record<string, _>`.
pub(crate) fn map_key(key: &Type) -> Type {
    if key.is_resolved() {
        key.clone()
    } else {
        Type::string()
    }
}

/// `snake_case` to `PascalCase`; other names get their first letter raised.
pub(crate) fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// `camelCase` or `PascalCase` to `snake_case`. Names already in
/// `SCREAMING_CASE` only change case.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Span};

    #[test]
    fn test_escape_string() {
        assert_eq!(
            escape_string("a\"b\\c\nd\u{1}", unicode_escape),
            "a\\\"b\\\\c\\nd\\u0001"
        );
        assert_eq!(escape_string("a\0b", unicode_escape), "a\\u0000b");
    }

    #[test]
    fn test_binding_type_prefers_annotation() {
        let env = TypeEnv::new();
        let value = Expr::int(1);
        assert_eq!(binding_type(&env, &Type::float(), Some(&value)), Type::float());
        assert_eq!(binding_type(&env, &Type::any(), Some(&value)), Type::int());
        assert!(binding_type(&env, &Type::any(), None).is_any());
    }

    #[test]
    fn test_float_literal_keeps_point() {
        assert_eq!(float_literal(2.0), "2.0");
        assert_eq!(float_literal(0.5), "0.5");
    }

    #[test]
    fn test_binary_operands_parenthesize() {
        let sum = Expr::binary(Expr::ident("a"), BinaryOp::Add, Expr::ident("b"));
        let (l, r) = binary_operands(
            BinaryOp::Mul,
            (&sum, "a + b".into()),
            (&Expr::ident("c"), "c".into()),
            Grammar::CLike,
        );
        assert_eq!((l.as_str(), r.as_str()), ("(a + b)", "c"));

        let diff = Expr::binary(Expr::ident("b"), BinaryOp::Sub, Expr::ident("c"));
        let (_, r) = binary_operands(
            BinaryOp::Sub,
            (&Expr::ident("a"), "a".into()),
            (&diff, "b - c".into()),
            Grammar::Python,
        );
        assert_eq!(r, "(b - c)");
    }

    #[test]
    fn test_loose_operation_is_wrapped() {
        let op = Expr::op(crate::idioms::Op::Contains, vec![]);
        assert_eq!(wrap(&op, "x in xs".into(), 3, Grammar::Python), "(x in xs)");
        assert_eq!(wrap(&op, "len(\"a b\")".into(), 3, Grammar::Python), "len(\"a b\")");
    }

    #[test]
    fn test_render_op_wraps_receivers_only() {
        let mut imports = ImportSet::new();
        let sum = Expr::binary(Expr::ident("a"), BinaryOp::Add, Expr::ident("b"));
        let out = render_op(
            Op::ToInt,
            Language::Rust,
            Receiver::Any,
            &[(&sum, "a + b".into())],
            Grammar::Rust,
            &mut imports,
        );
        assert_eq!(out.as_deref(), Some("((a + b) as i64)"));
        let out = render_op(
            Op::Abs,
            Language::Python,
            Receiver::Any,
            &[(&sum, "a + b".into())],
            Grammar::Python,
            &mut imports,
        );
        assert_eq!(out.as_deref(), Some("abs(a + b)"));
        let out = render_op(
            Op::Sqrt,
            Language::Python,
            Receiver::Any,
            &[(&Expr::ident("x"), "x".into())],
            Grammar::Python,
            &mut imports,
        );
        assert_eq!(out.as_deref(), Some("math.sqrt(x)"));
        assert_eq!(imports.iter().next().map(|(m, _)| m), Some("math"));
    }

    #[test]
    fn test_python_unary_strength() {
        let neg = Expr::unary(UnaryOp::Neg, Expr::ident("x"));
        let (l, _) = binary_operands(
            BinaryOp::Pow,
            (&neg, "-x".into()),
            (&Expr::int(2), "2".into()),
            Grammar::Python,
        );
        assert_eq!(l, "(-x)");
    }

    #[test]
    fn test_classes_in_base_order() {
        let mut module = Module::new("m");
        let mut child = Class::new("Child");
        child.base = Some("Parent".into());
        module.classes.push(child);
        module.classes.push(Class::new("Parent"));
        let names: Vec<&str> = classes_in_base_order(&module)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Parent", "Child"]);
    }

    #[test]
    fn test_marker_lines() {
        let marker = Unsupported {
            kind: "goroutine".into(),
            text: "go work()".into(),
            span: Span::new(4, 2),
        };
        assert_eq!(
            marker_lines(&marker),
            vec!["unsupported goroutine (line 4):", "  go work()"]
        );
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(pascal_case("add_item"), "AddItem");
        assert_eq!(pascal_case("add"), "Add");
        assert_eq!(snake_case("maxSize"), "max_size");
        assert_eq!(snake_case("MAX_SIZE"), "max_size");
    }
}
