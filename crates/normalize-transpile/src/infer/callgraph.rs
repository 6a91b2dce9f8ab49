//! Call graph over module functions.

use super::env::{FnSig, Signatures, TypeEnv};
use crate::ir::{Expr, TypeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable address of a function body: `name`, `Class.method`,
/// `Class.constructor`, or the module's top-level code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId {
    pub class: Option<String>,
    pub name: String,
}

const MODULE_BODY: &str = "<module>";
const CONSTRUCTOR: &str = "constructor";

impl FunctionId {
    pub fn free(name: impl Into<String>) -> Self {
        Self {
            class: None,
            name: name.into(),
        }
    }

    pub fn method(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            name: name.into(),
        }
    }

    pub fn constructor(class: impl Into<String>) -> Self {
        Self::method(class, CONSTRUCTOR)
    }

    pub fn module_body() -> Self {
        Self::free(MODULE_BODY)
    }

    pub fn is_module_body(&self) -> bool {
        self.class.is_none() && self.name == MODULE_BODY
    }

    pub fn is_constructor(&self) -> bool {
        self.class.is_some() && self.name == CONSTRUCTOR
    }

    /// Current signature of the addressed function.
    pub fn sig<'s>(&self, sigs: &'s Signatures) -> Option<&'s FnSig> {
        match &self.class {
            None => sigs.functions.get(&self.name),
            Some(class) if self.name == CONSTRUCTOR => sigs.classes.get(class)?.ctor.as_ref(),
            Some(class) => sigs.classes.get(class)?.methods.get(&self.name),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{class}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Resolved call edges plus the calls that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallGraph {
    pub edges: BTreeMap<FunctionId, BTreeSet<FunctionId>>,
    pub unresolved: BTreeMap<FunctionId, BTreeSet<String>>,
}

impl CallGraph {
    pub fn add_edge(&mut self, caller: &FunctionId, callee: FunctionId) {
        self.edges.entry(caller.clone()).or_default().insert(callee);
    }

    pub fn add_unresolved(&mut self, caller: &FunctionId, name: String) {
        self.unresolved
            .entry(caller.clone())
            .or_default()
            .insert(name);
    }

    pub fn callees(&self, id: &FunctionId) -> impl Iterator<Item = &FunctionId> {
        self.edges.get(id).into_iter().flatten()
    }

    pub fn callers(&self, id: &FunctionId) -> Vec<&FunctionId> {
        self.edges
            .iter()
            .filter(|(_, callees)| callees.contains(id))
            .map(|(caller, _)| caller)
            .collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.values().map(BTreeSet::len).sum()
    }

    /// Order `ids` so callers come before their callees where the graph
    /// allows it. Roots (nothing calls them) start the walk in their given
    /// order; anything left inside a cycle follows in its given order.
    pub fn caller_first(&self, ids: &[FunctionId]) -> Vec<FunctionId> {
        let mut called: BTreeSet<&FunctionId> = BTreeSet::new();
        for (caller, callees) in &self.edges {
            for callee in callees {
                if callee != caller {
                    called.insert(callee);
                }
            }
        }
        let mut visited: BTreeSet<FunctionId> = BTreeSet::new();
        let mut out = Vec::with_capacity(ids.len());
        let roots = ids.iter().filter(|id| !called.contains(id));
        let rest = ids.iter().filter(|id| called.contains(id));
        for start in roots.chain(rest) {
            let mut stack = vec![start.clone()];
            while let Some(id) = stack.pop() {
                if !ids.contains(&id) || !visited.insert(id.clone()) {
                    continue;
                }
                // Push in reverse so the first callee is visited first.
                let callees: Vec<&FunctionId> = self.callees(&id).collect();
                for callee in callees.into_iter().rev() {
                    if !visited.contains(callee) {
                        stack.push(callee.clone());
                    }
                }
                out.push(id);
            }
        }
        out
    }
}

/// Resolve the target of a call expression against the module.
pub fn resolve_call(callee: &Expr, env: &TypeEnv<'_>) -> Option<FunctionId> {
    let sigs = env.signatures()?;
    match callee {
        // Locals (lambdas, callbacks) shadow module functions.
        Expr::Ident(name) if env.is_bound(name) => None,
        Expr::Ident(name) => {
            if sigs.functions.contains_key(name) {
                Some(FunctionId::free(name.clone()))
            } else if sigs.is_class(name) {
                resolve_construct(name, sigs)
            } else {
                None
            }
        }
        Expr::Member { object, property } => {
            let TypeKind::Named(class) = env.type_of(object).kind else {
                return None;
            };
            sigs.method(&class, property)
                .map(|(owner, _)| FunctionId::method(owner, property.clone()))
        }
        _ => None,
    }
}

/// The constructor run by `new class(..)`, inherited if need be.
pub fn resolve_construct(class: &str, sigs: &Signatures) -> Option<FunctionId> {
    let mut current = Some(class);
    let mut depth = 0;
    while let Some(name) = current {
        let sig = sigs.classes.get(name)?;
        if sig.ctor.is_some() {
            return Some(FunctionId::constructor(name));
        }
        current = sig.base.as_deref();
        depth += 1;
        if depth > sigs.classes.len() {
            break;
        }
    }
    None
}

/// Human-readable callee text for unresolved calls.
pub fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member { object, property } => format!("{}.{property}", callee_name(object)),
        other => format!("<{}>", other.kind_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> FunctionId {
        FunctionId::free(name)
    }

    #[test]
    fn test_caller_first_order() {
        let mut graph = CallGraph::default();
        graph.add_edge(&id("main"), id("helper"));
        graph.add_edge(&id("helper"), id("leaf"));
        let order = graph.caller_first(&[id("leaf"), id("helper"), id("main")]);
        assert_eq!(order, vec![id("main"), id("helper"), id("leaf")]);
    }

    #[test]
    fn test_caller_first_handles_cycles() {
        let mut graph = CallGraph::default();
        graph.add_edge(&id("even"), id("odd"));
        graph.add_edge(&id("odd"), id("even"));
        let order = graph.caller_first(&[id("even"), id("odd")]);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(FunctionId::method("Cache", "get").to_string(), "Cache.get");
        assert_eq!(FunctionId::constructor("Cache").to_string(), "Cache.constructor");
        assert!(FunctionId::module_body().is_module_body());
    }

    #[test]
    fn test_callee_name() {
        let callee = Expr::member(Expr::ident("os"), "getcwd");
        assert_eq!(callee_name(&callee), "os.getcwd");
    }
}
