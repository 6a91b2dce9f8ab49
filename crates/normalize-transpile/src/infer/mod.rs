//! Cross-function type and context inference.
//!
//! Runs after a reader and before a writer. Each pass walks every function
//! body (callers before callees), collecting evidence:
//!
//! - call-site argument types for callee parameters,
//! - return expression types,
//! - writes to properties and module variables,
//! - usage facts for variables that are still dynamic.
//!
//! Evidence only ever joins, and slots that were resolved before inference
//! (declared types) are never touched. Passes repeat until one changes no
//! type, bounded by [`InferenceConfig::max_passes`]. Whatever stays `Any` is
//! counted in [`InferenceStats`]; the engine never rejects a module.

pub mod callgraph;
pub mod env;
pub mod usage;

pub use callgraph::{CallGraph, FunctionId};
pub use env::{ClassSig, FnSig, Signatures, TypeEnv};
pub use usage::UsageFacts;

use crate::config::InferenceConfig;
use crate::idioms::Op;
use crate::ir::visit::walk_expr;
use crate::ir::{BinaryOp, Expr, Function, Module, Stmt, Type};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Derived facts about one function body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionFacts {
    /// Final joined type of every local binding.
    pub locals: BTreeMap<String, Type>,
    pub usage: BTreeMap<String, UsageFacts>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceStats {
    pub passes: usize,
    /// False when the pass cap was hit before a quiet pass.
    pub converged: bool,
    pub typed_slots: usize,
    pub dynamic_slots: usize,
    pub unresolved_calls: usize,
}

impl InferenceStats {
    /// Share of type slots that fell back to the dynamic type.
    pub fn fallback_ratio(&self) -> f64 {
        let total = self.typed_slots + self.dynamic_slots;
        if total == 0 {
            0.0
        } else {
            self.dynamic_slots as f64 / total as f64
        }
    }
}

/// A module plus everything inference learned about it.
#[derive(Debug, Clone)]
pub struct AnnotatedModule {
    pub module: Module,
    pub facts: BTreeMap<FunctionId, FunctionFacts>,
    pub call_graph: CallGraph,
    pub signatures: Signatures,
    pub stats: InferenceStats,
}

impl AnnotatedModule {
    pub fn facts_for(&self, id: &FunctionId) -> Option<&FunctionFacts> {
        self.facts.get(id)
    }

    /// Final type of a local in a function body.
    pub fn local_type(&self, id: &FunctionId, name: &str) -> Option<&Type> {
        self.facts.get(id)?.locals.get(name)
    }
}

/// Where a function body lives inside the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Module,
    Free(usize),
    Ctor(usize),
    Method(usize, usize),
}

#[derive(Debug, Clone)]
struct Unit {
    id: FunctionId,
    slot: Slot,
    class: Option<String>,
}

fn units(module: &Module) -> Vec<Unit> {
    let mut out = vec![Unit {
        id: FunctionId::module_body(),
        slot: Slot::Module,
        class: None,
    }];
    for (i, f) in module.functions.iter().enumerate() {
        out.push(Unit {
            id: FunctionId::free(f.name.clone()),
            slot: Slot::Free(i),
            class: None,
        });
    }
    for (c, class) in module.classes.iter().enumerate() {
        if class.constructor().is_some() {
            out.push(Unit {
                id: FunctionId::constructor(class.name.clone()),
                slot: Slot::Ctor(c),
                class: Some(class.name.clone()),
            });
        }
        for (m, method) in class.methods.iter().enumerate() {
            out.push(Unit {
                id: FunctionId::method(class.name.clone(), method.name.clone()),
                slot: Slot::Method(c, m),
                class: Some(class.name.clone()),
            });
        }
    }
    out
}

fn function_at(module: &Module, slot: Slot) -> Option<&Function> {
    match slot {
        Slot::Module => None,
        Slot::Free(i) => module.functions.get(i),
        Slot::Ctor(c) => module.classes.get(c)?.constructor(),
        Slot::Method(c, m) => module.classes.get(c)?.methods.get(m),
    }
}

fn function_at_mut(module: &mut Module, slot: Slot) -> Option<&mut Function> {
    match slot {
        Slot::Module => None,
        Slot::Free(i) => module.functions.get_mut(i),
        Slot::Ctor(c) => module.classes.get_mut(c)?.constructor_mut(),
        Slot::Method(c, m) => module.classes.get_mut(c)?.methods.get_mut(m),
    }
}

/// Types as they were before inference. Resolved ones are declared.
#[derive(Debug, Default)]
struct Initial {
    params: HashMap<(FunctionId, usize), Type>,
    defaults: HashMap<(FunctionId, usize), Type>,
    returns: HashMap<FunctionId, Type>,
    properties: HashMap<(String, String), Type>,
    variables: HashMap<String, Type>,
}

impl Initial {
    fn capture(module: &Module, units: &[Unit]) -> Self {
        let mut initial = Initial::default();
        let shallow = TypeEnv::new();
        for unit in units {
            let Some(func) = function_at(module, unit.slot) else {
                continue;
            };
            for (i, p) in func.params.iter().enumerate() {
                initial
                    .params
                    .insert((unit.id.clone(), i), p.ty.clone());
                if let Some(default) = &p.default {
                    initial
                        .defaults
                        .insert((unit.id.clone(), i), shallow.type_of(default));
                }
            }
            initial.returns.insert(unit.id.clone(), func.ret.clone());
        }
        for class in &module.classes {
            for p in &class.properties {
                initial
                    .properties
                    .insert((class.name.clone(), p.name.clone()), p.ty.clone());
            }
        }
        for var in &module.variables {
            initial.variables.insert(var.name.clone(), var.ty.clone());
        }
        initial
    }
}

/// Evidence accumulated across all passes. Every entry only ever joins.
#[derive(Debug, Default)]
struct Evidence {
    args: HashMap<FunctionId, Vec<Type>>,
    returns: HashMap<FunctionId, Type>,
    value_returns: BTreeSet<FunctionId>,
    properties: BTreeMap<(String, String), Type>,
    variables: BTreeMap<String, Type>,
    locals: BTreeMap<FunctionId, BTreeMap<String, Type>>,
    usage: BTreeMap<FunctionId, BTreeMap<String, UsageFacts>>,
    graph: CallGraph,
}

fn join_into<K: Ord>(map: &mut BTreeMap<K, Type>, key: K, ty: &Type) {
    let slot = map.entry(key).or_default();
    *slot = slot.join(ty);
}

/// Annotate `module` with inferred types.
pub fn infer(mut module: Module, config: &InferenceConfig) -> AnnotatedModule {
    let units = units(&module);
    let initial = Initial::capture(&module, &units);
    let mut evidence = Evidence::default();
    let mut sigs = Signatures::from_module(&module);
    let ids: Vec<FunctionId> = units.iter().map(|u| u.id.clone()).collect();
    let index: HashMap<FunctionId, usize> =
        ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
    let mut order: Vec<usize> = (0..units.len()).collect();
    let max_passes = config.max_passes.max(1);
    let mut passes = 0;
    let mut converged = false;

    while passes < max_passes {
        passes += 1;
        evidence.graph = CallGraph::default();
        let mut changed = false;
        for &u in &order {
            let unit = &units[u];
            if apply_params(&mut module, unit, &initial, &evidence, &sigs, config) {
                changed = true;
                sigs = Signatures::from_module(&module);
            }
            collect(&module, unit, &sigs, &mut evidence);
            // Usage gathered just now can type parameters nothing else did.
            if apply_params(&mut module, unit, &initial, &evidence, &sigs, config) {
                changed = true;
                sigs = Signatures::from_module(&module);
            }
            if apply_results(&mut module, unit, &initial, &evidence) {
                changed = true;
                sigs = Signatures::from_module(&module);
            }
        }
        tracing::trace!(pass = passes, changed, "inference pass");
        if !changed {
            converged = true;
            break;
        }
        order = evidence
            .graph
            .caller_first(&ids)
            .iter()
            .filter_map(|id| index.get(id).copied())
            .collect();
    }

    annotate_locals(&mut module, &units, &evidence);
    let stats = InferenceStats {
        passes,
        converged,
        unresolved_calls: evidence.graph.unresolved_count(),
        ..count_slots(&module)
    };
    if !converged {
        tracing::debug!(
            module = %module.name,
            passes,
            "inference stopped at the pass cap"
        );
    }
    tracing::debug!(
        module = %module.name,
        passes,
        typed = stats.typed_slots,
        dynamic = stats.dynamic_slots,
        unresolved_calls = stats.unresolved_calls,
        "inference finished"
    );

    let mut facts: BTreeMap<FunctionId, FunctionFacts> = BTreeMap::new();
    for unit in &units {
        facts.insert(
            unit.id.clone(),
            FunctionFacts {
                locals: evidence.locals.remove(&unit.id).unwrap_or_default(),
                usage: evidence.usage.remove(&unit.id).unwrap_or_default(),
            },
        );
    }

    AnnotatedModule {
        signatures: Signatures::from_module(&module),
        module,
        facts,
        call_graph: evidence.graph,
        stats,
    }
}

/// Refine still-dynamic parameters of `unit` from call sites, defaults and
/// usage. Returns true when a type changed.
fn apply_params(
    module: &mut Module,
    unit: &Unit,
    initial: &Initial,
    evidence: &Evidence,
    sigs: &Signatures,
    config: &InferenceConfig,
) -> bool {
    let Some(func) = function_at(module, unit.slot) else {
        return false;
    };
    let args = evidence.args.get(&unit.id);
    let usage = evidence.usage.get(&unit.id);
    let mut updates = Vec::new();
    for (i, param) in func.params.iter().enumerate() {
        let key = (unit.id.clone(), i);
        let declared = initial.params.get(&key).cloned().unwrap_or_default();
        if declared.is_resolved() {
            continue;
        }
        let mut ty = declared;
        if let Some(default) = initial.defaults.get(&key) {
            ty = ty.join(default);
        }
        if let Some(args) = args {
            let seen: Vec<&Type> = if param.variadic {
                args.iter().skip(i).collect()
            } else {
                args.get(i).into_iter().collect()
            };
            for t in seen {
                ty = ty.join(t);
            }
        }
        if ty.is_any()
            && let Some(facts) = usage.and_then(|u| u.get(&param.name))
        {
            ty = facts.suggest(sigs, config.structural_matching);
        }
        if ty != param.ty {
            updates.push((i, ty));
        }
    }
    if updates.is_empty() {
        return false;
    }
    if let Some(func) = function_at_mut(module, unit.slot) {
        for (i, ty) in updates {
            tracing::trace!(function = %unit.id, param = %func.params[i].name, ty = %ty, "parameter refined");
            func.params[i].ty = ty;
        }
    }
    true
}

/// Apply return, property and module-variable evidence. Returns true when
/// a type changed.
fn apply_results(
    module: &mut Module,
    unit: &Unit,
    initial: &Initial,
    evidence: &Evidence,
) -> bool {
    let mut changed = false;
    if let Some(func) = function_at_mut(module, unit.slot) {
        let declared = initial.returns.get(&unit.id).cloned().unwrap_or_default();
        if !declared.is_resolved() {
            let ty = if evidence.value_returns.contains(&unit.id) {
                declared.join(evidence.returns.get(&unit.id).unwrap_or(&Type::any()))
            } else {
                Type::void()
            };
            if ty != func.ret {
                func.ret = ty;
                changed = true;
            }
        }
    }
    for ((class, prop), ty) in &evidence.properties {
        let declared = initial
            .properties
            .get(&(class.clone(), prop.clone()))
            .cloned()
            .unwrap_or_default();
        if declared.is_resolved() && !widens(&declared, ty) {
            continue;
        }
        let Some(class) = module.classes.iter_mut().find(|c| &c.name == class) else {
            continue;
        };
        if let Some(p) = class.properties.iter_mut().find(|p| &p.name == prop) {
            let joined = declared.join(ty);
            if joined != p.ty {
                p.ty = joined;
                changed = true;
            }
        }
    }
    for (name, ty) in &evidence.variables {
        let declared = initial.variables.get(name).cloned().unwrap_or_default();
        if declared.is_resolved() && !widens(&declared, ty) {
            continue;
        }
        if let Some(var) = module.variables.iter_mut().find(|v| &v.name == name) {
            let joined = declared.join(ty);
            if joined != var.ty {
                var.ty = joined;
                changed = true;
            }
        }
    }
    changed
}

/// An int slot that is also written floats holds floats. This is the one
/// way evidence overrides a resolved type.
fn widens(declared: &Type, written: &Type) -> bool {
    declared.is_int() && written.is_float()
}

fn collect(module: &Module, unit: &Unit, sigs: &Signatures, evidence: &mut Evidence) {
    let mut env = TypeEnv::with_signatures(sigs);
    env.set_class(unit.class.as_deref());
    let mut collector = Collector {
        id: &unit.id,
        env,
        evidence,
        module_vars: module.variables.iter().map(|v| v.name.as_str()).collect(),
    };
    match function_at(module, unit.slot) {
        Some(func) => {
            collector.env.bind_params(&func.params);
            for p in &func.params {
                if let Some(default) = &p.default {
                    collector.visit_expr(default);
                }
            }
            collector.stmts(&func.body);
        }
        None => {
            for var in &module.variables {
                if let Some(value) = &var.value {
                    collector.visit_expr(value);
                    let ty = collector.env.type_of(value);
                    join_into(&mut collector.evidence.variables, var.name.clone(), &ty);
                }
            }
            collector.stmts(&module.statements);
        }
    }
}

struct Collector<'a, 's> {
    id: &'a FunctionId,
    env: TypeEnv<'s>,
    evidence: &'a mut Evidence,
    module_vars: BTreeSet<&'a str>,
}

impl Collector<'_, '_> {
    fn usage(&mut self, name: &str) -> Option<&mut UsageFacts> {
        // Only names bound in this body carry usage worth recording.
        if !self.env.is_bound(name) {
            return None;
        }
        Some(
            self.evidence
                .usage
                .entry(self.id.clone())
                .or_default()
                .entry(name.to_string())
                .or_default(),
        )
    }

    fn record_local(&mut self, name: &str) {
        if let Some(ty) = self.env.lookup(name).cloned() {
            let locals = self.evidence.locals.entry(self.id.clone()).or_default();
            join_into(locals, name.to_string(), &ty);
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign {
                target,
                value,
                ty,
                declare,
            } => {
                self.visit_expr(value);
                self.visit_expr(target);
                self.assignment(target, value, ty, *declare);
            }
            Stmt::Declare { name, ty } => {
                self.env.declare(name, ty.clone());
                self.record_local(name);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                    let ty = self.env.type_of(value);
                    let slot = self.evidence.returns.entry(self.id.clone()).or_default();
                    *slot = slot.join(&ty);
                    self.evidence.value_returns.insert(self.id.clone());
                }
            }
            Stmt::If {
                test,
                then_body,
                elifs,
                else_body,
            } => {
                self.visit_expr(test);
                self.stmts(then_body);
                for elif in elifs {
                    self.visit_expr(&elif.test);
                    self.stmts(&elif.body);
                }
                if let Some(body) = else_body {
                    self.stmts(body);
                }
            }
            Stmt::ForEach {
                key,
                value,
                iterable,
                body,
                ..
            } => {
                self.visit_expr(iterable);
                if let Expr::Ident(name) = iterable
                    && let Some(facts) = self.usage(name)
                {
                    facts.iterated = true;
                }
                self.env.bind_loop(stmt);
                if let Some(key) = key {
                    self.record_local(key);
                }
                self.record_local(value);
                self.stmts(body);
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                self.visit_expr(start);
                self.visit_expr(end);
                for bound in [start, end] {
                    if let Expr::Ident(name) = bound
                        && let Some(facts) = self.usage(name)
                    {
                        facts.arithmetic = true;
                        facts.numeric_partner = facts.numeric_partner.join(&Type::int());
                    }
                }
                if let Some(step) = step {
                    self.visit_expr(step);
                }
                self.env.bind_loop(stmt);
                self.record_local(var);
                self.stmts(body);
            }
            Stmt::ForClassic {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(test) = test {
                    self.visit_expr(test);
                }
                self.stmts(body);
                if let Some(update) = update {
                    self.stmt(update);
                }
            }
            Stmt::While { test, body } => {
                self.visit_expr(test);
                self.stmts(body);
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                self.stmts(body);
                for handler in handlers {
                    if let Some(binding) = &handler.binding {
                        let ty = handler
                            .exception
                            .as_deref()
                            .map(Type::named)
                            .unwrap_or_default();
                        self.env.declare(binding, ty);
                    }
                    self.stmts(&handler.body);
                }
                if let Some(body) = finally {
                    self.stmts(body);
                }
            }
            Stmt::Throw(e) | Stmt::Expr(e) => self.visit_expr(e),
            Stmt::Break | Stmt::Continue | Stmt::Pass | Stmt::Unsupported(_) => {}
        }
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, declared: &Type, declare: bool) {
        let value_ty = self.env.type_of(value);
        match target {
            Expr::Ident(name) => {
                let is_module_var = self.id.is_module_body() && self.module_vars.contains(name.as_str());
                self.env.bind_assignment(target, value, declared, declare);
                if is_module_var {
                    join_into(&mut self.evidence.variables, name.clone(), &value_ty);
                } else {
                    self.record_local(name);
                }
            }
            Expr::Member { object, property } => {
                if let Some(class) = self.class_of(object) {
                    join_into(&mut self.evidence.properties, (class, property.clone()), &value_ty);
                }
            }
            Expr::Index { object, index } => {
                let container = self.env.type_of(object);
                let written = if container.is_sequence() {
                    Type::seq(value_ty)
                } else {
                    Type::map(self.env.type_of(index), value_ty)
                };
                self.container_write(object, &written);
            }
            _ => {}
        }
    }

    /// Evidence that `object` holds a container of type `written`.
    fn container_write(&mut self, object: &Expr, written: &Type) {
        match object {
            Expr::Ident(name) => {
                if let Some(facts) = self.usage(name) {
                    facts.hint = facts.hint.join(written);
                }
                let current = self.env.lookup(name).cloned().unwrap_or_default();
                if !current.is_resolved() {
                    self.env.bind(name, written.clone());
                    self.record_local(name);
                }
            }
            Expr::Member { object, property } => {
                if let Some(class) = self.class_of(object) {
                    join_into(&mut self.evidence.properties, (class, property.clone()), written);
                }
            }
            _ => {}
        }
    }

    fn class_of(&self, object: &Expr) -> Option<String> {
        match self.env.type_of(object).kind {
            crate::ir::TypeKind::Named(class) => Some(class),
            _ => None,
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        let mut seen: Vec<&Expr> = Vec::new();
        walk_expr(expr, &mut |e| seen.push(e));
        for e in seen {
            self.visit_one(e);
        }
    }

    fn visit_one(&mut self, expr: &Expr) {
        match expr {
            Expr::Call { callee, args } => {
                match callgraph::resolve_call(callee, &self.env) {
                    Some(target) => self.call_site(target, args),
                    None => {
                        if !matches!(callee.as_ref(), Expr::Ident(n) if self.env.is_bound(n)) {
                            self.evidence
                                .graph
                                .add_unresolved(self.id, callgraph::callee_name(callee));
                        }
                    }
                }
                if let Expr::Member { object, property } = callee.as_ref()
                    && let Expr::Ident(name) = object.as_ref()
                    && let Some(facts) = self.usage(name)
                {
                    facts.properties.insert(property.clone());
                }
            }
            Expr::Construct { class, args } => {
                if let Some(sigs) = self.env.signatures()
                    && let Some(target) = callgraph::resolve_construct(class, sigs)
                {
                    self.call_site(target, args);
                }
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right),
            Expr::Member { object, property } => {
                if let Expr::Ident(name) = object.as_ref()
                    && let Some(facts) = self.usage(name)
                {
                    facts.properties.insert(property.clone());
                }
            }
            Expr::Index { object, .. } => {
                if let Expr::Ident(name) = object.as_ref()
                    && let Some(facts) = self.usage(name)
                {
                    facts.indexed = true;
                }
            }
            Expr::Operation { op, args } => self.operation(*op, args),
            _ => {}
        }
    }

    fn call_site(&mut self, target: FunctionId, args: &[Expr]) {
        let types: Vec<Type> = args.iter().map(|a| self.env.type_of(a)).collect();
        let slots = self.evidence.args.entry(target.clone()).or_default();
        if slots.len() < types.len() {
            slots.resize(types.len(), Type::any());
        }
        for (slot, ty) in slots.iter_mut().zip(&types) {
            *slot = slot.join(ty);
        }
        for (i, arg) in args.iter().enumerate() {
            if let Expr::Ident(name) = arg
                && let Some(facts) = self.usage(name)
            {
                facts.call_positions.insert((target.clone(), i));
            }
        }
        self.evidence.graph.add_edge(self.id, target);
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) {
        let numeric_use = op.is_arithmetic()
            || matches!(op, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge);
        if !numeric_use {
            return;
        }
        for (operand, partner) in [(left, right), (right, left)] {
            let Expr::Ident(name) = operand else {
                continue;
            };
            let partner_ty = self.env.type_of(partner);
            if let Some(facts) = self.usage(name) {
                if op == BinaryOp::Add && partner_ty.is_string() {
                    facts.string_partner = true;
                } else {
                    facts.arithmetic = true;
                    if partner_ty.is_numeric() {
                        facts.numeric_partner = facts.numeric_partner.join(&partner_ty);
                    }
                }
            }
        }
    }

    fn operation(&mut self, op: Op, args: &[Expr]) {
        let Some(first) = args.first() else {
            return;
        };
        let mut hint = op.first_arg_hint();
        if op == Op::Append
            && let Some(item) = args.get(1)
        {
            hint = Some(Type::seq(self.env.type_of(item)));
        }
        let Some(hint) = hint else {
            return;
        };
        match first {
            Expr::Ident(name) => {
                if let Some(facts) = self.usage(name) {
                    facts.hint = facts.hint.join(&hint);
                }
                if op == Op::Append {
                    self.container_write(first, &hint);
                }
            }
            Expr::Member { .. } if op == Op::Append => self.container_write(first, &hint),
            _ => {}
        }
    }
}

/// Write final local types into declaring assignments.
fn annotate_locals(module: &mut Module, units: &[Unit], evidence: &Evidence) {
    for unit in units {
        let Some(locals) = evidence.locals.get(&unit.id) else {
            continue;
        };
        if unit.slot == Slot::Module {
            annotate_stmts(&mut module.statements, locals);
        } else if let Some(func) = function_at_mut(module, unit.slot) {
            annotate_stmts(&mut func.body, locals);
        }
    }
}

fn annotate_stmts(stmts: &mut [Stmt], locals: &BTreeMap<String, Type>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign {
                target: Expr::Ident(name),
                ty,
                declare: true,
                ..
            } => {
                if !ty.is_resolved()
                    && let Some(local) = locals.get(name.as_str())
                {
                    *ty = ty.join(local);
                }
            }
            Stmt::Declare { name, ty } => {
                if !ty.is_resolved()
                    && let Some(local) = locals.get(name.as_str())
                {
                    *ty = ty.join(local);
                }
            }
            Stmt::If {
                then_body,
                elifs,
                else_body,
                ..
            } => {
                annotate_stmts(then_body, locals);
                for elif in elifs {
                    annotate_stmts(&mut elif.body, locals);
                }
                if let Some(body) = else_body {
                    annotate_stmts(body, locals);
                }
            }
            Stmt::ForEach { body, .. } | Stmt::ForRange { body, .. } | Stmt::While { body, .. } => {
                annotate_stmts(body, locals)
            }
            Stmt::ForClassic {
                init, update, body, ..
            } => {
                if let Some(init) = init {
                    annotate_stmts(std::slice::from_mut(init.as_mut()), locals);
                }
                annotate_stmts(body, locals);
                if let Some(update) = update {
                    annotate_stmts(std::slice::from_mut(update.as_mut()), locals);
                }
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                annotate_stmts(body, locals);
                for handler in handlers {
                    annotate_stmts(&mut handler.body, locals);
                }
                if let Some(body) = finally {
                    annotate_stmts(body, locals);
                }
            }
            _ => {}
        }
    }
}

fn count_slots(module: &Module) -> InferenceStats {
    let mut stats = InferenceStats::default();
    let mut add = |ty: &Type| {
        let (total, dynamic) = ty.count_slots();
        stats.typed_slots += total - dynamic;
        stats.dynamic_slots += dynamic;
    };
    for func in crate::ir::visit::module_functions(module) {
        for p in &func.params {
            add(&p.ty);
        }
        if !func.ret.is_void() {
            add(&func.ret);
        }
    }
    for class in &module.classes {
        for p in &class.properties {
            add(&p.ty);
        }
    }
    for var in &module.variables {
        add(&var.ty);
    }
    let mut bodies: Vec<&[Stmt]> = vec![&module.statements];
    bodies.extend(
        crate::ir::visit::module_functions(module)
            .into_iter()
            .map(|f| f.body.as_slice()),
    );
    for body in bodies {
        crate::ir::visit::walk_stmts(body, &mut |stmt| {
            if let Stmt::Assign {
                target: Expr::Ident(_),
                ty,
                declare: true,
                ..
            } = stmt
            {
                add(ty);
            } else if let Stmt::Declare { ty, .. } = stmt {
                add(ty);
            }
        });
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Class, Param, Property};

    fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> Function {
        Function::new(
            name,
            params.iter().map(|p| Param::new(*p, Type::any())).collect(),
            Type::any(),
            body,
        )
        .unwrap()
    }

    fn add_module() -> Module {
        let mut module = Module::new("m");
        module.functions.push(func(
            "add",
            &["a", "b"],
            vec![Stmt::Return(Some(Expr::binary(
                Expr::ident("a"),
                BinaryOp::Add,
                Expr::ident("b"),
            )))],
        ));
        module.statements.push(Stmt::declare(
            "total",
            Expr::call(Expr::ident("add"), vec![Expr::int(2), Expr::int(3)]),
        ));
        module
    }

    #[test]
    fn test_call_site_types_flow_into_params_and_back() {
        let annotated = infer(add_module(), &InferenceConfig::default());
        let add = annotated.module.function("add").unwrap();
        assert_eq!(add.params[0].ty, Type::int());
        assert_eq!(add.params[1].ty, Type::int());
        assert_eq!(add.ret, Type::int());
        match &annotated.module.statements[0] {
            Stmt::Assign { ty, .. } => assert_eq!(ty, &Type::int()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(annotated.stats.converged);
        assert_eq!(annotated.stats.dynamic_slots, 0);
    }

    #[test]
    fn test_arithmetic_usage_without_call_sites() {
        let mut module = add_module();
        module.statements.clear();
        let annotated = infer(module, &InferenceConfig::default());
        let add = annotated.module.function("add").unwrap();
        assert!(add.params[0].ty.is_numeric());
        assert!(add.ret.is_numeric());
    }

    #[test]
    fn test_declared_types_are_kept() {
        let mut module = add_module();
        module.functions[0].params[0].ty = Type::float();
        let annotated = infer(module, &InferenceConfig::default());
        let add = annotated.module.function("add").unwrap();
        assert_eq!(add.params[0].ty, Type::float());
        assert_eq!(add.params[1].ty, Type::int());
    }

    #[test]
    fn test_constructor_properties() {
        let mut class = Class::new("Store");
        class.properties.push(Property::new(
            "cache",
            Type::map(Type::any(), Type::any()),
        ));
        class.properties.push(Property::new("count", Type::int()));
        let ctor = Function::new(
            "constructor",
            vec![],
            Type::void(),
            vec![
                Stmt::assign(Expr::member(Expr::This, "cache"), Expr::Map(vec![])),
                Stmt::assign(Expr::member(Expr::This, "count"), Expr::int(0)),
            ],
        )
        .unwrap();
        class.set_constructor(ctor).unwrap();
        class.methods.push(
            Function::new(
                "put",
                vec![Param::new("key", Type::string())],
                Type::void(),
                vec![Stmt::assign(
                    Expr::index(Expr::member(Expr::This, "cache"), Expr::ident("key")),
                    Expr::int(1),
                )],
            )
            .unwrap(),
        );
        let mut module = Module::new("m");
        module.classes.push(class);
        let annotated = infer(module, &InferenceConfig::default());
        let class = annotated.module.class("Store").unwrap();
        assert_eq!(
            class.property("cache").unwrap().ty,
            Type::map(Type::string(), Type::int())
        );
        assert_eq!(class.property("count").unwrap().ty, Type::int());
    }

    #[test]
    fn test_int_property_widens_to_float() {
        // constructor() { this.count = 0 }  add(by: number) { this.count += by }
        let mut class = Class::new("Counter");
        class.properties.push(Property::new("count", Type::int()));
        let ctor = Function::new(
            "constructor",
            vec![],
            Type::void(),
            vec![Stmt::assign(Expr::member(Expr::This, "count"), Expr::int(0))],
        )
        .unwrap();
        class.set_constructor(ctor).unwrap();
        let count = Expr::member(Expr::This, "count");
        class.methods.push(
            Function::new(
                "add",
                vec![Param::new("by", Type::float())],
                Type::void(),
                vec![Stmt::assign(
                    count.clone(),
                    Expr::binary(count, BinaryOp::Add, Expr::ident("by")),
                )],
            )
            .unwrap(),
        );
        let mut module = Module::new("m");
        module.classes.push(class);
        let annotated = infer(module, &InferenceConfig::default());
        assert!(annotated.stats.converged);
        let class = annotated.module.class("Counter").unwrap();
        assert_eq!(class.property("count").unwrap().ty, Type::float());
    }

    #[test]
    fn test_structural_matching_types_parameter() {
        let mut module = Module::new("m");
        let mut point = Class::new("Point");
        point.properties.push(Property::new("x", Type::float()));
        point.properties.push(Property::new("y", Type::float()));
        module.classes.push(point);
        module.functions.push(func(
            "norm",
            &["p"],
            vec![Stmt::Return(Some(Expr::binary(
                Expr::member(Expr::ident("p"), "x"),
                BinaryOp::Add,
                Expr::member(Expr::ident("p"), "y"),
            )))],
        ));
        let annotated = infer(module.clone(), &InferenceConfig::default());
        let norm = annotated.module.function("norm").unwrap();
        assert_eq!(norm.params[0].ty, Type::named("Point"));
        assert_eq!(norm.ret, Type::float());

        let config = InferenceConfig {
            structural_matching: false,
            ..InferenceConfig::default()
        };
        let annotated = infer(module, &config);
        assert!(annotated.module.function("norm").unwrap().params[0].ty.is_any());
        assert!(annotated.stats.fallback_ratio() > 0.0);
    }

    #[test]
    fn test_unresolved_calls_are_recorded_not_fatal() {
        let mut module = Module::new("m");
        module.statements.push(Stmt::expr(Expr::call(
            Expr::member(Expr::ident("os"), "getcwd"),
            vec![],
        )));
        let annotated = infer(module, &InferenceConfig::default());
        assert_eq!(annotated.stats.unresolved_calls, 1);
    }

    #[test]
    fn test_pass_cap_is_respected() {
        let config = InferenceConfig {
            max_passes: 1,
            ..InferenceConfig::default()
        };
        let annotated = infer(add_module(), &config);
        assert_eq!(annotated.stats.passes, 1);
    }

    #[test]
    fn test_call_graph_edges() {
        let annotated = infer(add_module(), &InferenceConfig::default());
        let callees: Vec<&FunctionId> = annotated
            .call_graph
            .callees(&FunctionId::module_body())
            .collect();
        assert_eq!(callees, vec![&FunctionId::free("add")]);
        assert_eq!(
            annotated.call_graph.callers(&FunctionId::free("add")),
            vec![&FunctionId::module_body()]
        );
    }
}
