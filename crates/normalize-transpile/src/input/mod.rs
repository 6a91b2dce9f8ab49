//! Input readers - parse source code into IR.
//!
//! Every reader follows the same contract: a syntax error anywhere is a
//! [`ParseError`] pointing at the first offending token; a valid construct the
//! IR does not model becomes a [`Stmt::Unsupported`] marker at the nearest
//! statement, and reading continues.

#[cfg(feature = "read-python")]
pub mod python;

#[cfg(feature = "read-python")]
pub use python::{PYTHON_READER, PythonReader, read_python};

#[cfg(feature = "read-typescript")]
pub mod typescript;

#[cfg(feature = "read-typescript")]
pub use typescript::{
    JAVASCRIPT_READER, TYPESCRIPT_READER, TypeScriptReader, read_javascript, read_typescript,
};

#[cfg(feature = "read-go")]
pub mod go;

#[cfg(feature = "read-go")]
pub use go::{GO_READER, GoReader, read_go};

#[cfg(feature = "read-rust")]
pub mod rust;

#[cfg(feature = "read-rust")]
pub use rust::{RUST_READER, RustReader, read_rust};

#[cfg(feature = "read-csharp")]
pub mod csharp;

#[cfg(feature = "read-csharp")]
pub use csharp::{CSHARP_READER, CSharpReader, read_csharp};

use crate::error::ParseError;
use crate::ir::visit::{self, child_bodies, child_bodies_mut, walk_all_exprs};
use crate::ir::{
    BinaryOp, Comprehension, ComprehensionKind, Expr, Function, Literal, Param, Primitive, Span,
    Stmt, Type, TypeKind, Unsupported,
};

/// Why a node could not be read.
#[derive(Debug)]
pub(crate) enum ReadFail {
    /// The grammar accepted it, the IR cannot express it.
    Unsupported(String),
    Parse(ParseError),
}

impl From<ParseError> for ReadFail {
    fn from(err: ParseError) -> Self {
        ReadFail::Parse(err)
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadFail>;

pub(crate) fn unsupported<T>(kind: impl Into<String>) -> ReadResult<T> {
    Err(ReadFail::Unsupported(kind.into()))
}

/// Statement-level recovery: unsupported constructs become markers, parse
/// errors propagate.
pub(crate) fn recover(
    result: ReadResult<Vec<Stmt>>,
    text: &str,
    span: Span,
) -> Result<Vec<Stmt>, ParseError> {
    match result {
        Ok(stmts) => Ok(stmts),
        Err(ReadFail::Unsupported(kind)) => {
            tracing::debug!(
                kind = %kind,
                line = span.line,
                column = span.column,
                "unsupported construct kept as marker"
            );
            Ok(vec![Stmt::Unsupported(Unsupported {
                kind,
                text: text.trim_end().to_string(),
                span,
            })])
        }
        Err(ReadFail::Parse(err)) => Err(err),
    }
}

/// True for expressions with no side effects and no dependence on runtime
/// state; module-level bindings of these become module variables.
pub(crate) fn is_constant_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) => true,
        Expr::Unary { operand, .. } => is_constant_expr(operand),
        Expr::Binary { left, right, .. } => is_constant_expr(left) && is_constant_expr(right),
        Expr::Array(items) => items.iter().all(is_constant_expr),
        Expr::Map(pairs) => pairs
            .iter()
            .all(|(k, v)| is_constant_expr(k) && is_constant_expr(v)),
        _ => false,
    }
}

/// A `break` that would leave the enclosing switch rather than a loop.
pub(crate) fn breaks_out(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::Break => true,
        Stmt::If {
            then_body,
            elifs,
            else_body,
            ..
        } => {
            breaks_out(then_body)
                || elifs.iter().any(|e| breaks_out(&e.body))
                || else_body.as_deref().is_some_and(breaks_out)
        }
        Stmt::Try {
            body,
            handlers,
            finally,
        } => {
            breaks_out(body)
                || handlers.iter().any(|h| breaks_out(&h.body))
                || finally.as_deref().is_some_and(breaks_out)
        }
        _ => false,
    })
}

/// Split `s` on `sep` where no bracket is open.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut prev = ' ';
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            // `=>` and `->` are arrows, not closing brackets.
            '>' if prev == '=' || prev == '-' => {}
            ')' | ']' | '}' | '>' => depth -= 1,
            c if c == sep && depth == 0 => {
                out.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
        prev = c;
    }
    let last = s[start..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

/// Lift the declaration of a name first bound inside a nested block when
/// the name is used after that block or rebound in a sibling block, so that
/// block-scoped targets see one declaration in the enclosing body.
pub(crate) fn hoist_declarations(body: &mut Vec<Stmt>) {
    for stmt in body.iter_mut() {
        for child in child_bodies_mut(stmt) {
            hoist_declarations(child);
        }
    }
    let mut i = 0;
    while i < body.len() {
        let mut nested = Vec::new();
        for child in declaring_bodies(&body[i]) {
            nested_declarations(child, &mut nested);
        }
        let mut hoisted: Vec<(String, Type)> = Vec::new();
        for (name, ty) in nested {
            if hoisted.iter().any(|(n, _)| *n == name) {
                continue;
            }
            let used_later = mentions(&body[i + 1..], &name);
            let rebound = rebinds(std::slice::from_ref(&body[i]), &name);
            if used_later || rebound {
                hoisted.push((name, ty));
            }
        }
        if hoisted.is_empty() {
            i += 1;
            continue;
        }
        for (name, _) in &hoisted {
            for child in child_bodies_mut(&mut body[i]) {
                undeclare(child, name);
            }
        }
        let count = hoisted.len();
        for (k, (name, ty)) in hoisted.into_iter().enumerate() {
            body.insert(i + k, Stmt::Declare { name, ty });
        }
        i += count + 1;
    }
}

fn nested_declarations(stmts: &[Stmt], out: &mut Vec<(String, Type)>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign {
                target: Expr::Ident(name),
                ty,
                declare: true,
                ..
            }
            | Stmt::Declare { name, ty } => out.push((name.clone(), ty.clone())),
            _ => {}
        }
        for child in declaring_bodies(stmt) {
            nested_declarations(child, out);
        }
    }
}

/// Child bodies whose declarations can reach the enclosing block. The
/// init binding of a classic `for` belongs to the loop header.
fn declaring_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::ForClassic { body, .. } => vec![body],
        _ => child_bodies(stmt),
    }
}

fn mentions(stmts: &[Stmt], name: &str) -> bool {
    let mut found = false;
    walk_all_exprs(stmts, &mut |e| {
        found |= matches!(e, Expr::Ident(n) if n == name);
    });
    found
}

fn rebinds(stmts: &[Stmt], name: &str) -> bool {
    visit::any_stmt(stmts, |s| {
        matches!(s, Stmt::Assign { target: Expr::Ident(n), declare: false, .. } if n == name)
    })
}

fn undeclare(stmts: &mut Vec<Stmt>, name: &str) {
    stmts.retain(|s| !matches!(s, Stmt::Declare { name: n, .. } if n == name));
    for stmt in stmts.iter_mut() {
        if let Stmt::Assign {
            target: Expr::Ident(n),
            declare,
            ..
        } = stmt
            && n == name
        {
            *declare = false;
        }
        for child in child_bodies_mut(stmt) {
            undeclare(child, name);
        }
    }
}

/// Struct field list, in declaration order.
pub(crate) type Fields = Vec<(String, Type)>;

/// Constructor taking every field in declaration order.
pub(crate) fn field_constructor(fields: &Fields) -> Function {
    let params = fields
        .iter()
        .map(|(name, ty)| Param::new(name.clone(), ty.clone()))
        .collect();
    let body = fields
        .iter()
        .map(|(name, _)| Stmt::assign(Expr::member(Expr::This, name.clone()), Expr::ident(name.clone())))
        .collect();
    Function {
        name: "constructor".to_string(),
        params,
        ret: Type::void(),
        body,
        is_async: false,
        is_static: false,
        throws: Vec::new(),
        doc: None,
        provenance: None,
        span: Span::default(),
    }
}

pub(crate) fn zero_value(ty: &Type) -> Expr {
    if ty.optional {
        return Expr::null();
    }
    match &ty.kind {
        TypeKind::Primitive(Primitive::Int) => Expr::int(0),
        TypeKind::Primitive(Primitive::Float) => Expr::float(0.0),
        TypeKind::Primitive(Primitive::String) => Expr::string(""),
        TypeKind::Primitive(Primitive::Bool) => Expr::bool(false),
        TypeKind::Sequence(_) => Expr::Array(vec![]),
        TypeKind::Map(..) => Expr::Map(vec![]),
        _ => Expr::null(),
    }
}

pub(crate) fn is_zero_value(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Literal::Int(0) | Literal::Bool(false) | Literal::Null) => true,
        Expr::Literal(Literal::Float(f)) => *f == 0.0,
        Expr::Literal(Literal::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// End and step of `var < end; var++` style headers.
pub(crate) fn range_bounds(var: &str, test: Option<&Expr>, update: Option<&Stmt>) -> Option<(Expr, Option<Expr>)> {
    let Some(Expr::Binary { left, op, right }) = test else {
        return None;
    };
    if !matches!(&**left, Expr::Ident(n) if n == var) {
        return None;
    }
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
    if t != var || !matches!(&**ul, Expr::Ident(n) if n == var) {
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
    let step = (step != 1).then(|| Expr::int(step));
    Some(((**right).clone(), step))
}

/// Fold `.filter(..)` / `.map(..)` onto a comprehension, merging with the
/// receiver when it is itself an untransformed filter.
pub(crate) fn chain_comprehension(object: Expr, method: &str, var: String, body: Expr) -> Expr {
    if method == "map"
        && let Expr::Comprehension(c) = &object
        && c.key.is_none()
        && c.kind == ComprehensionKind::List
        && matches!(&c.transform, Expr::Ident(v) if *v == c.var)
    {
        let mut c = c.clone();
        let mut body = body;
        visit::rename_ident(&mut body, &var, &c.var);
        c.transform = body;
        return Expr::Comprehension(c);
    }
    let (transform, filter) = if method == "map" {
        (body, None)
    } else {
        (Expr::ident(var.clone()), Some(body))
    };
    Expr::Comprehension(Box::new(Comprehension {
        kind: ComprehensionKind::List,
        var,
        source: object,
        transform,
        key: None,
        filter,
    }))
}

/// Decode backslash escapes shared by the C-family and Python string syntaxes.
/// Unknown escapes are kept verbatim.
pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '`' => out.push('`'),
            '$' => out.push('$'),
            '\n' => {}
            'x' => {
                let hex: String = (0..2).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect();
                push_code_point(&mut out, &hex, "\\x");
            }
            'u' => {
                let hex: String = if chars.next_if_eq(&'{').is_some() {
                    let h: String = std::iter::from_fn(|| chars.next_if(|c| *c != '}')).collect();
                    chars.next_if_eq(&'}');
                    h
                } else {
                    (0..4).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect()
                };
                push_code_point(&mut out, &hex, "\\u");
            }
            'U' => {
                let hex: String = (0..8).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect();
                push_code_point(&mut out, &hex, "\\U");
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn push_code_point(out: &mut String, hex: &str, prefix: &str) {
    match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
        Some(c) => out.push(c),
        None => {
            out.push_str(prefix);
            out.push_str(hex);
        }
    }
}

/// Parse a numeric literal, ignoring `_` separators and radix prefixes.
pub(crate) fn number_literal(text: &str) -> Option<Literal> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let lower = clean.to_ascii_lowercase();
    let lower = lower.trim_end_matches(['n', 'l', 'j']);
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return i64::from_str_radix(digits, radix).ok().map(Literal::Int);
        }
    }
    if lower.len() > 1 && lower.starts_with('0') && lower.chars().all(|c| c.is_ascii_digit()) {
        // Go's legacy octal form.
        return i64::from_str_radix(&lower[1..], 8).ok().map(Literal::Int);
    }
    if let Ok(n) = lower.parse::<i64>() {
        return Some(Literal::Int(n));
    }
    lower.parse::<f64>().ok().map(Literal::Float)
}

#[cfg(any(
    feature = "read-python",
    feature = "read-typescript",
    feature = "read-go",
    feature = "read-rust",
    feature = "read-csharp"
))]
pub(crate) mod ts {
    //! tree-sitter plumbing shared by the readers.

    use super::{ReadFail, ReadResult};
    use crate::error::ParseError;
    use crate::ir::Span;
    use tree_sitter::{Language, Node, Parser, Tree};

    pub fn parse(language: Language, source: &str) -> Result<Tree, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|err| ParseError::new(Span::new(1, 1), "", err.to_string()))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::new(Span::new(1, 1), "", "failed to parse"))?;
        if tree.root_node().has_error() {
            return Err(syntax_error(tree.root_node(), source));
        }
        Ok(tree)
    }

    pub fn span(node: Node) -> Span {
        let pos = node.start_position();
        Span::new(pos.row + 1, pos.column + 1)
    }

    /// First ERROR or MISSING node in document order.
    fn first_error(root: Node) -> Option<Node> {
        let mut cursor = root.walk();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                return Some(node);
            }
            if !node.has_error() {
                continue;
            }
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        None
    }

    pub fn syntax_error(root: Node, source: &str) -> ParseError {
        let Some(node) = first_error(root) else {
            return ParseError::new(span(root), "", "syntax error");
        };
        if node.is_missing() {
            return ParseError::new(span(node), node.kind(), format!("missing `{}`", node.kind()));
        }
        let text = node.utf8_text(source.as_bytes()).unwrap_or("");
        let token: String = text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(24)
            .collect();
        // Point at the first token inside the error node when there is one.
        let at = node.child(0).filter(|c| !c.is_error()).unwrap_or(node);
        ParseError::new(span(at), token.clone(), format!("unexpected `{token}`"))
    }

    pub fn text<'s>(node: Node, source: &'s str) -> &'s str {
        node.utf8_text(source.as_bytes()).unwrap_or("")
    }

    pub fn field<'t>(node: Node<'t>, name: &str) -> ReadResult<Node<'t>> {
        node.child_by_field_name(name).ok_or_else(|| {
            ReadFail::Parse(ParseError::new(
                span(node),
                node.kind(),
                format!("{} missing {name}", node.kind()),
            ))
        })
    }

    pub fn named_children(node: Node) -> Vec<Node> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| !matches!(c.kind(), "comment" | "line_comment" | "block_comment"))
            .collect()
    }

    pub fn children(node: Node) -> Vec<Node> {
        let mut cursor = node.walk();
        node.children(&mut cursor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\nb\t\"c\"\\"#), "a\nb\t\"c\"\\");
        assert_eq!(unescape(r"\x41é\u{1F600}"), "A\u{e9}\u{1F600}");
        assert_eq!(unescape(r"\d"), "\\d");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_number_literal() {
        assert_eq!(number_literal("1_000"), Some(Literal::Int(1000)));
        assert_eq!(number_literal("0xff"), Some(Literal::Int(255)));
        assert_eq!(number_literal("2.5"), Some(Literal::Float(2.5)));
        assert_eq!(number_literal("1e3"), Some(Literal::Float(1000.0)));
        assert_eq!(number_literal("0"), Some(Literal::Int(0)));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("dict[str, int], bool", ','), vec!["dict[str, int]", "bool"]);
        assert_eq!(split_top_level("int | None", '|'), vec!["int", "None"]);
        assert!(split_top_level("", ',').is_empty());
    }

    #[test]
    fn test_hoist_branch_locals() {
        // if c: r = 1 else: r = 2; return r
        let mut body = vec![
            Stmt::if_stmt(
                Expr::ident("c"),
                vec![Stmt::declare("r", Expr::int(1))],
                Some(vec![Stmt::assign(Expr::ident("r"), Expr::int(2))]),
            ),
            Stmt::Return(Some(Expr::ident("r"))),
        ];
        hoist_declarations(&mut body);
        assert_eq!(
            body[0],
            Stmt::Declare {
                name: "r".into(),
                ty: Type::any()
            }
        );
        let Stmt::If { then_body, .. } = &body[1] else {
            panic!("expected if");
        };
        assert!(matches!(then_body[0], Stmt::Assign { declare: false, .. }));
    }

    #[test]
    fn test_block_local_stays() {
        let mut body = vec![Stmt::while_loop(
            Expr::bool(true),
            vec![Stmt::declare("tmp", Expr::int(1)), Stmt::Break],
        )];
        hoist_declarations(&mut body);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_loop_counter_stays_in_header() {
        // for (let i = 1; i < n; i *= 2) { f(i); }
        let mut body = vec![Stmt::ForClassic {
            init: Some(Box::new(Stmt::declare("i", Expr::int(1)))),
            test: Some(Expr::binary(Expr::ident("i"), BinaryOp::Lt, Expr::ident("n"))),
            update: Some(Box::new(Stmt::assign(
                Expr::ident("i"),
                Expr::binary(Expr::ident("i"), BinaryOp::Mul, Expr::int(2)),
            ))),
            body: vec![Stmt::expr(Expr::call(Expr::ident("f"), vec![Expr::ident("i")]))],
        }];
        hoist_declarations(&mut body);
        assert_eq!(body.len(), 1);
        let Stmt::ForClassic { init: Some(init), .. } = &body[0] else {
            panic!("expected classic for, got {:?}", body[0]);
        };
        assert!(matches!(**init, Stmt::Assign { declare: true, .. }));
    }

    #[test]
    fn test_constant_expr() {
        assert!(is_constant_expr(&Expr::Array(vec![Expr::int(1), Expr::int(2)])));
        assert!(!is_constant_expr(&Expr::call(Expr::ident("f"), vec![])));
    }
}
