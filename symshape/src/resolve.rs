// resolve.rs — Name resolution: .sym AST to a dataflow `Program`
//
// Walks the parsed AST, resolves value names within each graph and callee
// names across the file, lowers type expressions to `AbstractType`, and
// builds the `Program` the symbol engine runs on.
//
// Preconditions: `program` is a well-formed AST from the parser.
// Postconditions: returns the built program plus all accumulated diagnostics.
//   Each graph of the file with a unique name appears in the program, in
//   source order. Nodes carry their source name and span.
// Failure modes: unknown or duplicate names, call arity mismatches, calls
//   through values that are not closures, malformed switches and unknown
//   dtypes produce `Diagnostic` entries. Resolution continues past
//   errors; callers must not build a program that resolved with errors.
// Side effects: none.

use std::collections::HashMap;

use crate::abstract_type::{AbstractType, Attr, Attrs, ConstValue, DType, UNKNOWN_DIM};
use crate::ast::{self, AttrValue, Expr, GraphDef, Literal, Span, TypeExpr};
use crate::diag::{codes, Diagnostic};
use crate::id::{GraphId, NodeId};
use crate::program::{NodeKind, Program};

// ── Public types ────────────────────────────────────────────────────────────

/// Result of name resolution.
#[derive(Debug)]
pub struct ResolveResult {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolveResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Resolve all names in a parsed .sym file.
pub fn resolve(program: &ast::Program) -> ResolveResult {
    let mut ctx = ResolveCtx::new();

    // Pass 1: declare graphs so calls may refer forward
    let graphs = ctx.collect_graphs(program);

    // Pass 2: resolve graph bodies
    for (def, id) in graphs {
        ctx.resolve_graph(def, id);
    }

    ResolveResult {
        program: ctx.program,
        diagnostics: ctx.diagnostics,
    }
}

/// Pick the entry graph: `name` if given, else `main`, else the last graph.
pub fn entry_graph(program: &Program, name: Option<&str>) -> Result<GraphId, Diagnostic> {
    let found = match name {
        Some(name) => program.graph_by_name(name),
        None => program
            .graph_by_name("main")
            .or_else(|| program.graphs().last().map(|g| g.id)),
    };
    found.ok_or_else(|| {
        let message = match name {
            Some(name) => format!("entry graph '{name}' not found"),
            None => "no graph to build".to_string(),
        };
        Diagnostic::error(None, message).with_code(codes::E0106)
    })
}

// ── Internal context ────────────────────────────────────────────────────────

struct GraphEntry {
    id: GraphId,
    name_span: Span,
    arity: usize,
}

struct ResolveCtx {
    program: Program,
    diagnostics: Vec<Diagnostic>,
    graphs: HashMap<String, GraphEntry>,
    /// Closure values: parameters still open on each `partial` node.
    open_params: HashMap<NodeId, usize>,
}

impl ResolveCtx {
    fn new() -> Self {
        ResolveCtx {
            program: Program::new(),
            diagnostics: Vec::new(),
            graphs: HashMap::new(),
            open_params: HashMap::new(),
        }
    }

    fn error(&mut self, span: Span, code: crate::diag::DiagCode, message: String) {
        self.diagnostics
            .push(Diagnostic::error(Some(span), message).with_code(code));
    }

    // ── Pass 1: graphs ──────────────────────────────────────────────────

    fn collect_graphs<'p>(&mut self, program: &'p ast::Program) -> Vec<(&'p GraphDef, GraphId)> {
        let mut out = Vec::new();
        for def in &program.graphs {
            let name = &def.name.name;
            if let Some(existing) = self.graphs.get(name) {
                let first = existing.name_span;
                self.diagnostics.push(
                    Diagnostic::error(Some(def.name.span), format!("duplicate graph '{name}'"))
                        .with_code(codes::E0100)
                        .with_related(first, "first defined here"),
                );
                continue;
            }
            let id = self.program.add_graph(name);
            self.program.set_graph_span(id, def.span);
            self.graphs.insert(
                name.clone(),
                GraphEntry {
                    id,
                    name_span: def.name.span,
                    arity: def.params.len(),
                },
            );
            out.push((def, id));
        }
        out
    }

    // ── Pass 2: bodies ──────────────────────────────────────────────────

    fn resolve_graph(&mut self, def: &GraphDef, graph: GraphId) {
        let mut scope: HashMap<String, NodeId> = HashMap::new();

        for param in &def.params {
            let ty = self.lower_type(&param.ty);
            let id = self.program.add_parameter(graph, ty);
            self.program.set_node_name(id, &param.name.name);
            self.program.set_node_span(id, param.span);
            self.define(&mut scope, &param.name, id);
        }

        for stmt in &def.body {
            let ty = match &stmt.ty {
                Some(ty) => self.lower_type(ty),
                None => AbstractType::Opaque,
            };
            let id = match &stmt.expr {
                Expr::Op { op, args, attrs } => {
                    let inputs = self.lookup_args(&scope, args);
                    let attrs = lower_attrs(attrs);
                    self.program
                        .add_op_with_attrs(graph, &op.name, inputs, attrs, ty)
                }
                Expr::Call { callee, args } => match scope.get(&callee.name) {
                    Some(&closure) => {
                        let inputs = self.lookup_args(&scope, args);
                        self.check_closure(callee, closure, args.len());
                        self.program.add_apply(graph, closure, inputs, ty)
                    }
                    None => {
                        let inputs = self.lookup_args(&scope, args);
                        let target = self.lookup_graph(callee, args.len(), true);
                        self.program.add_call(graph, target, inputs, ty)
                    }
                },
                Expr::Partial { callee, args } => {
                    let inputs = self.lookup_args(&scope, args);
                    let target = self.lookup_graph(callee, args.len(), false);
                    let id = self.program.add_partial(graph, target, inputs);
                    if let Some(arity) = target.and_then(|t| self.arity_of(t)) {
                        self.open_params.insert(id, arity.saturating_sub(args.len()));
                    }
                    id
                }
                Expr::Switch { branches, args } => {
                    if branches.len() != 3 {
                        self.error(
                            stmt.span,
                            codes::E0108,
                            format!(
                                "switch takes a condition and two branches, {} given",
                                branches.len()
                            ),
                        );
                        continue;
                    }
                    let head = self.lookup_args(&scope, branches);
                    let inputs = self.lookup_args(&scope, args);
                    // Undefined operands were reported by the lookup.
                    let &[cond, then, other] = head.as_slice() else {
                        continue;
                    };
                    self.check_closure(&branches[1], then, args.len());
                    self.check_closure(&branches[2], other, args.len());
                    self.program
                        .add_switch(graph, cond, [then, other], inputs, ty)
                }
                Expr::Const(lit) => self.program.add_constant(graph, lower_literal(lit)),
            };
            self.program.set_node_name(id, &stmt.name.name);
            self.program.set_node_span(id, stmt.span);
            self.define(&mut scope, &stmt.name, id);
        }

        if let Some(ret) = &def.ret {
            match scope.get(&ret.name) {
                Some(&out) => self.program.set_output(graph, out),
                None => self.error(
                    ret.span,
                    codes::E0102,
                    format!("undefined value '{}' in graph '{}'", ret.name, def.name.name),
                ),
            }
        }
    }

    fn define(&mut self, scope: &mut HashMap<String, NodeId>, name: &ast::Ident, id: NodeId) {
        if scope.insert(name.name.clone(), id).is_some() {
            self.error(
                name.span,
                codes::E0101,
                format!("duplicate value '{}'", name.name),
            );
        }
    }

    /// Resolve argument names; undefined names are reported and dropped.
    fn lookup_args(&mut self, scope: &HashMap<String, NodeId>, args: &[ast::Ident]) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match scope.get(&arg.name) {
                Some(&id) => out.push(id),
                None => self.error(
                    arg.span,
                    codes::E0102,
                    format!("undefined value '{}'", arg.name),
                ),
            }
        }
        out
    }

    /// Resolve a graph name. `exact` requires `given` to match the graph's
    /// arity; otherwise `given` may bind a prefix of its parameters.
    fn lookup_graph(&mut self, callee: &ast::Ident, given: usize, exact: bool) -> Option<GraphId> {
        let Some(entry) = self.graphs.get(&callee.name) else {
            self.error(
                callee.span,
                codes::E0103,
                format!("call to unknown graph '{}'", callee.name),
            );
            return None;
        };
        let (id, expected, decl) = (entry.id, entry.arity, entry.name_span);
        let fits = if exact { given == expected } else { given <= expected };
        if !fits {
            self.diagnostics.push(
                Diagnostic::error(
                    Some(callee.span),
                    format!(
                        "graph '{}' takes {} argument(s), {} given",
                        callee.name, expected, given
                    ),
                )
                .with_code(codes::E0104)
                .with_related(decl, "graph declared here"),
            );
        }
        Some(id)
    }

    fn arity_of(&self, graph: GraphId) -> Option<usize> {
        self.graphs.values().find(|e| e.id == graph).map(|e| e.arity)
    }

    /// Check that `value` is a closure taking `given` more arguments.
    fn check_closure(&mut self, name: &ast::Ident, value: NodeId, given: usize) {
        let is_partial = self
            .program
            .node(value)
            .is_some_and(|n| matches!(n.kind, NodeKind::Partial { .. }));
        if !is_partial {
            self.diagnostics.push(
                Diagnostic::error(
                    Some(name.span),
                    format!("value '{}' is not a partial application", name.name),
                )
                .with_code(codes::E0107)
                .with_hint("create one with `partial <graph>(<leading args>)`"),
            );
            return;
        }
        // Unresolved callees were reported when the closure was created.
        let Some(&open) = self.open_params.get(&value) else {
            return;
        };
        if open != given {
            self.error(
                name.span,
                codes::E0104,
                format!(
                    "closure '{}' takes {} more argument(s), {} given",
                    name.name, open, given
                ),
            );
        }
    }

    // ── Types ───────────────────────────────────────────────────────────

    fn lower_type(&mut self, ty: &TypeExpr) -> AbstractType {
        match ty {
            TypeExpr::Tensor { dtype, dims, .. } => {
                let Some(dt) = self.lower_dtype(dtype) else {
                    return AbstractType::Opaque;
                };
                AbstractType::Tensor {
                    dtype: dt,
                    shape: dims.as_ref().map(|dims| {
                        dims.iter()
                            .map(|&d| if d < 0 { UNKNOWN_DIM } else { d })
                            .collect()
                    }),
                }
            }
            TypeExpr::Named(id) if id.name == "any" => AbstractType::Opaque,
            TypeExpr::Named(id) => self
                .lower_dtype(id)
                .map_or(AbstractType::Opaque, AbstractType::Scalar),
            TypeExpr::Tuple(elems, _) => {
                AbstractType::Tuple(elems.iter().map(|e| self.lower_type(e)).collect())
            }
        }
    }

    fn lower_dtype(&mut self, name: &ast::Ident) -> Option<DType> {
        let dt = DType::from_name(&name.name);
        if dt.is_none() {
            self.diagnostics.push(
                Diagnostic::error(Some(name.span), format!("unknown dtype '{}'", name.name))
                    .with_code(codes::E0105)
                    .with_hint("expected one of f16, f32, f64, i32, i64, bool, any"),
            );
        }
        dt
    }
}

fn lower_literal(lit: &Literal) -> ConstValue {
    match lit {
        Literal::Int(v, _) => ConstValue::Int(*v),
        Literal::Float(v, _) => ConstValue::Float(*v),
        Literal::Bool(v, _) => ConstValue::Bool(*v),
        Literal::Tuple(items, _) => ConstValue::Tuple(items.iter().map(lower_literal).collect()),
    }
}

fn lower_attrs(attrs: &[ast::AttrDef]) -> Attrs {
    attrs
        .iter()
        .map(|a| {
            let value = match &a.value {
                AttrValue::Int(v) => Attr::Int(*v),
                AttrValue::Bool(v) => Attr::Bool(*v),
                AttrValue::Ints(vs) => Attr::Ints(vs.clone()),
            };
            (a.name.name.clone(), value)
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
