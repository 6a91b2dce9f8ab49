//! Tree walks.

use super::*;
use std::collections::BTreeSet;

/// Visit every statement in `stmts`, depth first, including nested bodies.
/// Lambda block bodies are included.
pub fn walk_stmts<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Stmt)) {
    for stmt in stmts {
        f(stmt);
        for body in child_bodies(stmt) {
            walk_stmts(body, f);
        }
        for_each_stmt_expr(stmt, &mut |expr| walk_lambda_bodies(expr, f));
    }
}

fn walk_lambda_bodies<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Stmt)) {
    walk_expr(expr, &mut |e| {
        if let Expr::Lambda(lambda) = e
            && let LambdaBody::Block(body) = &lambda.body
        {
            walk_stmts(body, f);
        }
    });
}

/// Nested statement lists owned directly by `stmt`.
pub fn child_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::If {
            then_body,
            elifs,
            else_body,
            ..
        } => {
            let mut out: Vec<&[Stmt]> = vec![then_body];
            out.extend(elifs.iter().map(|e| e.body.as_slice()));
            if let Some(body) = else_body {
                out.push(body);
            }
            out
        }
        Stmt::ForEach { body, .. } | Stmt::ForRange { body, .. } | Stmt::While { body, .. } => {
            vec![body]
        }
        Stmt::ForClassic {
            init, update, body, ..
        } => {
            let mut out: Vec<&[Stmt]> = Vec::new();
            if let Some(init) = init {
                out.push(std::slice::from_ref(init.as_ref()));
            }
            out.push(body);
            if let Some(update) = update {
                out.push(std::slice::from_ref(update.as_ref()));
            }
            out
        }
        Stmt::Try {
            body,
            handlers,
            finally,
        } => {
            let mut out: Vec<&[Stmt]> = vec![body];
            out.extend(handlers.iter().map(|h| h.body.as_slice()));
            if let Some(fin) = finally {
                out.push(fin);
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Mutable counterpart of [`child_bodies`], without the classic-for clauses.
pub fn child_bodies_mut(stmt: &mut Stmt) -> Vec<&mut Vec<Stmt>> {
    match stmt {
        Stmt::If {
            then_body,
            elifs,
            else_body,
            ..
        } => {
            let mut out = vec![then_body];
            out.extend(elifs.iter_mut().map(|e| &mut e.body));
            out.extend(else_body.as_mut());
            out
        }
        Stmt::ForEach { body, .. }
        | Stmt::ForRange { body, .. }
        | Stmt::ForClassic { body, .. }
        | Stmt::While { body, .. } => vec![body],
        Stmt::Try {
            body,
            handlers,
            finally,
        } => {
            let mut out = vec![body];
            out.extend(handlers.iter_mut().map(|h| &mut h.body));
            out.extend(finally.as_mut());
            out
        }
        _ => Vec::new(),
    }
}

/// Call `f` on the top-level expressions of a single statement (not nested
/// bodies).
pub fn for_each_stmt_expr<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Expr)) {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            f(target);
            f(value);
        }
        Stmt::Return(Some(e)) | Stmt::Throw(e) | Stmt::Expr(e) => f(e),
        Stmt::If { test, elifs, .. } => {
            f(test);
            for elif in elifs {
                f(&elif.test);
            }
        }
        Stmt::ForEach { iterable, .. } => f(iterable),
        Stmt::ForRange {
            start, end, step, ..
        } => {
            f(start);
            f(end);
            if let Some(step) = step {
                f(step);
            }
        }
        Stmt::ForClassic { test, .. } => {
            if let Some(test) = test {
                f(test);
            }
        }
        Stmt::While { test, .. } => f(test),
        Stmt::Return(None)
        | Stmt::Declare { .. }
        | Stmt::Try { .. }
        | Stmt::Break
        | Stmt::Continue
        | Stmt::Pass
        | Stmt::Unsupported(_) => {}
    }
}

/// Visit `expr` and every sub-expression, pre-order. Does not descend into
/// lambda block bodies (those are statements).
pub fn walk_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match expr {
        Expr::Literal(_) | Expr::Ident(_) | Expr::This => {}
        Expr::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, f),
        Expr::Call { callee, args } => {
            walk_expr(callee, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        Expr::Operation { args, .. } | Expr::Construct { args, .. } | Expr::Array(args) => {
            for a in args {
                walk_expr(a, f);
            }
        }
        Expr::Member { object, .. } => walk_expr(object, f),
        Expr::Index { object, index } => {
            walk_expr(object, f);
            walk_expr(index, f);
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                walk_expr(k, f);
                walk_expr(v, f);
            }
        }
        Expr::Ternary {
            test,
            then,
            otherwise,
        } => {
            walk_expr(test, f);
            walk_expr(then, f);
            walk_expr(otherwise, f);
        }
        Expr::Lambda(lambda) => {
            if let LambdaBody::Expr(body) = &lambda.body {
                walk_expr(body, f);
            }
        }
        Expr::Comprehension(c) => {
            walk_expr(&c.source, f);
            if let Some(key) = &c.key {
                walk_expr(key, f);
            }
            walk_expr(&c.transform, f);
            if let Some(filter) = &c.filter {
                walk_expr(filter, f);
            }
        }
        Expr::Await(inner) => walk_expr(inner, f),
        Expr::Format(parts) => {
            for part in parts {
                if let FormatPart::Expr(e) = part {
                    walk_expr(e, f);
                }
            }
        }
    }
}

/// Mutable counterpart of [`walk_expr`]; `f` sees a node before its children.
pub fn walk_expr_mut(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    f(expr);
    match expr {
        Expr::Literal(_) | Expr::Ident(_) | Expr::This => {}
        Expr::Binary { left, right, .. } => {
            walk_expr_mut(left, f);
            walk_expr_mut(right, f);
        }
        Expr::Unary { operand, .. } => walk_expr_mut(operand, f),
        Expr::Call { callee, args } => {
            walk_expr_mut(callee, f);
            for a in args {
                walk_expr_mut(a, f);
            }
        }
        Expr::Operation { args, .. } | Expr::Construct { args, .. } | Expr::Array(args) => {
            for a in args {
                walk_expr_mut(a, f);
            }
        }
        Expr::Member { object, .. } => walk_expr_mut(object, f),
        Expr::Index { object, index } => {
            walk_expr_mut(object, f);
            walk_expr_mut(index, f);
        }
        Expr::Map(pairs) => {
            for (k, v) in pairs {
                walk_expr_mut(k, f);
                walk_expr_mut(v, f);
            }
        }
        Expr::Ternary {
            test,
            then,
            otherwise,
        } => {
            walk_expr_mut(test, f);
            walk_expr_mut(then, f);
            walk_expr_mut(otherwise, f);
        }
        Expr::Lambda(lambda) => {
            if let LambdaBody::Expr(body) = &mut lambda.body {
                walk_expr_mut(body, f);
            }
        }
        Expr::Comprehension(c) => {
            walk_expr_mut(&mut c.source, f);
            if let Some(key) = &mut c.key {
                walk_expr_mut(key, f);
            }
            walk_expr_mut(&mut c.transform, f);
            if let Some(filter) = &mut c.filter {
                walk_expr_mut(filter, f);
            }
        }
        Expr::Await(inner) => walk_expr_mut(inner, f),
        Expr::Format(parts) => {
            for part in parts {
                if let FormatPart::Expr(e) = part {
                    walk_expr_mut(e, f);
                }
            }
        }
    }
}

/// Rename free uses of identifier `from` inside `expr`.
pub fn rename_ident(expr: &mut Expr, from: &str, to: &str) {
    walk_expr_mut(expr, &mut |e| {
        if let Expr::Ident(name) = e
            && *name == from
        {
            *name = to.to_string();
        }
    });
}

/// Every expression reachable from `stmts`, including nested bodies.
pub fn walk_all_exprs<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Expr)) {
    walk_stmts(stmts, &mut |stmt| {
        for_each_stmt_expr(stmt, &mut |e| walk_expr(e, f));
    });
}

/// Names assigned again after their declaring assignment.
pub fn reassigned_names(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk_stmts(stmts, &mut |stmt| match stmt {
        Stmt::Assign {
            target: Expr::Ident(name),
            declare: false,
            ..
        } => {
            out.insert(name.clone());
        }
        Stmt::Expr(Expr::Operation {
            op: crate::idioms::Op::Append,
            args,
        }) => {
            if let Some(Expr::Ident(name)) = args.first() {
                out.insert(name.clone());
            }
        }
        _ => {}
    });
    // Mutating method calls (`xs.push(..)`, `m[k] = v`) also need a mutable binding.
    walk_stmts(stmts, &mut |stmt| {
        if let Stmt::Assign {
            target: Expr::Index { object, .. } | Expr::Member { object, .. },
            ..
        } = stmt
            && let Expr::Ident(name) = object.as_ref()
        {
            out.insert(name.clone());
        }
    });
    out
}

/// Every function body in the module: free functions, constructors, methods.
pub fn module_functions(module: &Module) -> Vec<&Function> {
    let mut out: Vec<&Function> = module.functions.iter().collect();
    for class in &module.classes {
        if let Some(ctor) = class.constructor() {
            out.push(ctor);
        }
        out.extend(class.methods.iter());
    }
    out
}

/// All unsupported passthrough nodes in the module, in source order.
pub fn collect_unsupported(module: &Module) -> Vec<Unsupported> {
    let mut out = Vec::new();
    let mut collect = |stmts: &[Stmt]| {
        walk_stmts(stmts, &mut |stmt| {
            if let Stmt::Unsupported(u) = stmt {
                out.push(u.clone());
            }
        });
    };
    collect(&module.statements);
    for func in module_functions(module) {
        collect(&func.body);
    }
    out.sort_by_key(|u| (u.span.line, u.span.column));
    out
}

/// True when any statement in `stmts` (at any depth) satisfies `pred`.
pub fn any_stmt(stmts: &[Stmt], pred: impl Fn(&Stmt) -> bool) -> bool {
    let mut found = false;
    walk_stmts(stmts, &mut |s| found |= pred(s));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassigned_names() {
        let body = vec![
            Stmt::declare("a", Expr::int(1)),
            Stmt::declare("b", Expr::int(2)),
            Stmt::while_loop(
                Expr::bool(true),
                vec![Stmt::assign(Expr::ident("a"), Expr::int(3))],
            ),
        ];
        let names = reassigned_names(&body);
        assert!(names.contains("a"));
        assert!(!names.contains("b"));
    }

    #[test]
    fn test_walk_reaches_lambda_blocks() {
        let lambda = Expr::Lambda(Box::new(Lambda {
            params: vec![],
            body: LambdaBody::Block(vec![Stmt::Unsupported(Unsupported {
                kind: "with".into(),
                text: "with x: pass".into(),
                span: Span::new(2, 5),
            })]),
            is_async: false,
        }));
        let body = vec![Stmt::declare("f", lambda)];
        assert!(any_stmt(&body, |s| matches!(s, Stmt::Unsupported(_))));
    }
}
