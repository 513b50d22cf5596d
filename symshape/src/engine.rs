// engine.rs — Symbol engine: demand pass, symbol pass and build entry points
//
// A `SymbolEngine` is attached to each graph a build visits. Building runs
// two walks per graph: PreBuild goes backward from the output recording
// which facets (shape, value) each node must supply; BuildImpl goes forward
// in dependency order and asks each demanded node's `OperationRule` for its
// symbols. Call nodes are handed to the call handler (`call.rs`), which
// enters the callee with the same builder, so symbols stay correlated across
// call boundaries. Closure calls and switches (`switch.rs`) enter their
// callees the same way.
//
// Preconditions: the entry graph is structurally valid (checked here via
//   `Program::topo_order`, per graph, before any symbol work).
// Postconditions: on `Ok`, every demanded node of the entry graph and of all
//   transitively called graphs carries its symbols, and every visited graph
//   has an engine in state `Built`.
// Failure modes: structural problems and recursive calls → `BuildError`;
//   engines attached by the failed build are detached again.
// Side effects: mutates node symbol slots and graph engine attachments.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::abstract_type::AbstractType;
use crate::diag::{codes, Diagnostic};
use crate::id::{GraphId, NodeId};
use crate::program::{NodeKind, Program};
use crate::rule::{DependStatus, RuleContext, RuleInput, RuleRegistry};
use crate::symbol::{ListSymbol, Symbol};

// ── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    PreBuilding,
    PreBuilt,
    Building,
    Built,
}

/// Work counters, per engine and summed per build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Calls into `OperationRule` shape/value builders.
    pub rule_invocations: usize,
    /// Demanded nodes visited by the forward pass.
    pub nodes_built: usize,
    /// Callee parameters seeded from call-site arguments.
    pub params_seeded: usize,
    /// Callee graphs entered for the first time.
    pub subgraphs_entered: usize,
}

impl BuildStats {
    fn add(&mut self, other: &BuildStats) {
        self.rule_invocations += other.rule_invocations;
        self.nodes_built += other.nodes_built;
        self.params_seeded += other.params_seeded;
        self.subgraphs_entered += other.subgraphs_entered;
    }
}

/// Per-graph engine state. Owned by the graph it is attached to.
#[derive(Debug)]
pub struct SymbolEngine {
    graph: GraphId,
    /// Graph whose build first entered this one; `None` for an entry graph.
    parent: Option<GraphId>,
    state: EngineState,
    depend: HashMap<NodeId, DependStatus>,
    order: Vec<NodeId>,
    stats: BuildStats,
}

impl SymbolEngine {
    fn new(graph: GraphId, parent: Option<GraphId>, order: Vec<NodeId>) -> Self {
        Self {
            graph,
            parent,
            state: EngineState::PreBuilding,
            depend: HashMap::new(),
            order,
            stats: BuildStats::default(),
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Nodes reachable from the graph output, inputs first.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut BuildStats {
        &mut self.stats
    }

    pub fn depend_status(&self, node: NodeId) -> DependStatus {
        self.depend.get(&node).copied().unwrap_or_default()
    }

    pub fn is_depend_shape(&self, node: NodeId) -> bool {
        self.depend_status(node).shape
    }

    pub fn is_depend_value(&self, node: NodeId) -> bool {
        self.depend_status(node).value
    }
}

// ── Errors and report ───────────────────────────────────────────────────────

/// Fatal build errors. Each one means the caller handed over a malformed
/// program; none is recoverable within the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    UnknownGraph(GraphId),
    UnknownNode(NodeId),
    DanglingInput {
        node: NodeId,
        input: NodeId,
    },
    MissingCallee {
        node: NodeId,
    },
    UnknownCallee {
        node: NodeId,
        callee: GraphId,
    },
    ArityMismatch {
        node: NodeId,
        graph: String,
        expected: usize,
        found: usize,
    },
    MissingOutput {
        graph: String,
    },
    CyclicGraph {
        graph: String,
        node: NodeId,
    },
    RecursiveCall {
        graph: String,
        node: NodeId,
    },
    NotACall {
        node: NodeId,
    },
    NotAPartial {
        node: NodeId,
        input: NodeId,
    },
    MissingOperands {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    DetachedEngine(GraphId),
}

impl BuildError {
    /// Node the error points at, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            BuildError::UnknownNode(node)
            | BuildError::DanglingInput { node, .. }
            | BuildError::MissingCallee { node }
            | BuildError::UnknownCallee { node, .. }
            | BuildError::ArityMismatch { node, .. }
            | BuildError::CyclicGraph { node, .. }
            | BuildError::RecursiveCall { node, .. }
            | BuildError::NotACall { node }
            | BuildError::NotAPartial { node, .. }
            | BuildError::MissingOperands { node, .. } => Some(*node),
            BuildError::UnknownGraph(_)
            | BuildError::MissingOutput { .. }
            | BuildError::DetachedEngine(_) => None,
        }
    }

    pub fn to_diagnostic(&self, program: &Program) -> Diagnostic {
        let span = self
            .node()
            .and_then(|n| program.node(n))
            .and_then(|n| n.span);
        let diag = Diagnostic::error(span, self.to_string()).with_code(codes::E0200);
        match self {
            BuildError::RecursiveCall { .. } => {
                diag.with_hint("recursive graph calls are not supported by symbol inference")
            }
            _ => diag,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnknownGraph(g) => write!(f, "unknown graph {}", g),
            BuildError::UnknownNode(n) => write!(f, "unknown node {}", n),
            BuildError::DanglingInput { node, input } => write!(
                f,
                "node {} uses {}, which is not a node of the same graph",
                node, input
            ),
            BuildError::MissingCallee { node } => {
                write!(f, "call node {} has no callee", node)
            }
            BuildError::UnknownCallee { node, callee } => {
                write!(f, "call node {} targets unknown graph {}", node, callee)
            }
            BuildError::ArityMismatch {
                node,
                graph,
                expected,
                found,
            } => write!(
                f,
                "call node {} passes {} argument(s) to '{}', which takes {}",
                node, found, graph, expected
            ),
            BuildError::MissingOutput { graph } => {
                write!(f, "graph '{}' has no output", graph)
            }
            BuildError::CyclicGraph { graph, node } => {
                write!(f, "graph '{}' contains a cycle through {}", graph, node)
            }
            BuildError::RecursiveCall { graph, node } => {
                write!(f, "recursive call into graph '{}' at node {}", graph, node)
            }
            BuildError::NotACall { node } => write!(f, "node {} is not a call", node),
            BuildError::NotAPartial { node, input } => write!(
                f,
                "node {} calls through {}, which is not a partial application",
                node, input
            ),
            BuildError::MissingOperands {
                node,
                expected,
                found,
            } => write!(
                f,
                "node {} needs at least {} operand(s), found {}",
                node, expected, found
            ),
            BuildError::DetachedEngine(g) => {
                write!(f, "no symbol engine attached to graph {}", g)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Outcome of a successful build.
#[derive(Debug)]
pub struct BuildReport {
    pub entry: GraphId,
    /// Graphs that received an engine, in attachment order.
    pub graphs: Vec<GraphId>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: BuildStats,
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Build symbols for `graph` and everything it calls, demanding both shape
/// and value of its output.
pub fn build(
    program: &mut Program,
    graph: GraphId,
    rules: &RuleRegistry,
) -> Result<BuildReport, BuildError> {
    build_with_demand(program, graph, DependStatus::ALL, rules)
}

/// Like `build`, with an explicit demand on the graph output.
pub fn build_with_demand(
    program: &mut Program,
    graph: GraphId,
    demand: DependStatus,
    rules: &RuleRegistry,
) -> Result<BuildReport, BuildError> {
    program.graph(graph).ok_or(BuildError::UnknownGraph(graph))?;
    clean_symbols(program, graph);
    let mut builder = Builder::new(program, rules);
    let result = builder
        .pre_build(graph, None, demand)
        .and_then(|()| builder.build_impl(graph, None));
    builder.finish(graph, result)
}

/// Build a standalone engine for the callee of `call`, as when the callee is
/// reached with no enclosing build. `call` is a direct call or a call through
/// a partial application. Parameters are seeded from whatever symbols the
/// arguments already carry; the call node then aliases the callee output.
pub fn build_sub_engine(
    program: &mut Program,
    call: NodeId,
    rules: &RuleRegistry,
) -> Result<BuildReport, BuildError> {
    let node = program.node(call).ok_or(BuildError::UnknownNode(call))?;
    if !matches!(node.kind, NodeKind::Call { .. } | NodeKind::Apply) {
        return Err(BuildError::NotACall { node: call });
    }
    let app = program
        .applications(call)?
        .into_iter()
        .next()
        .ok_or(BuildError::NotACall { node: call })?;
    let callee = app.callee;
    let target = program
        .graph(callee)
        .ok_or(BuildError::UnknownCallee { node: call, callee })?;
    if target.params.len() != app.args.len() {
        return Err(BuildError::ArityMismatch {
            node: call,
            graph: target.name.clone(),
            expected: target.params.len(),
            found: app.args.len(),
        });
    }
    let demand = program
        .engine(node.graph)
        .map(|e| e.depend_status(call))
        .filter(|d| !d.is_none())
        .unwrap_or(DependStatus::ALL);

    clean_symbols(program, callee);
    let mut builder = Builder::new(program, rules);
    let result = builder
        .pre_build(callee, None, demand)
        .and_then(|()| builder.seed_params(call, &app))
        .and_then(|()| builder.build_impl(callee, Some(call)))
        .and_then(|()| builder.alias_output(call, callee, demand));
    builder.finish(callee, result)
}

/// Clear symbols and detach engines across `entry` and every graph it can
/// reach, keeping only the entry graph's parameter symbols.
pub fn clean_symbols(program: &mut Program, entry: GraphId) {
    let keep: HashSet<NodeId> = program
        .graph(entry)
        .map(|g| g.params.iter().copied().collect())
        .unwrap_or_default();
    for g in program.reachable_graphs(entry) {
        let nodes = program.graph(g).map(|g| g.nodes.clone()).unwrap_or_default();
        for id in nodes {
            if keep.contains(&id) {
                continue;
            }
            if let Some(node) = program.node_mut(id) {
                node.clear_symbols();
            }
        }
        if let Some(graph) = program.graph_mut(g) {
            graph.engine = None;
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// State of one build invocation, shared by every graph it enters.
pub(crate) struct Builder<'a> {
    pub(crate) program: &'a mut Program,
    pub(crate) rules: &'a RuleRegistry,
    pub(crate) diagnostics: Vec<Diagnostic>,
    attached: Vec<GraphId>,
}

impl<'a> Builder<'a> {
    fn new(program: &'a mut Program, rules: &'a RuleRegistry) -> Self {
        Self {
            program,
            rules,
            diagnostics: Vec::new(),
            attached: Vec::new(),
        }
    }

    fn finish(
        self,
        entry: GraphId,
        result: Result<(), BuildError>,
    ) -> Result<BuildReport, BuildError> {
        if let Err(err) = result {
            tracing::debug!(error = %err, "build failed; detaching engines");
            for g in &self.attached {
                if let Some(graph) = self.program.graph_mut(*g) {
                    graph.engine = None;
                }
            }
            return Err(err);
        }
        let mut stats = BuildStats::default();
        for g in &self.attached {
            if let Some(engine) = self.program.engine(*g) {
                stats.add(engine.stats());
            }
        }
        Ok(BuildReport {
            entry,
            graphs: self.attached,
            diagnostics: self.diagnostics,
            stats,
        })
    }

    // ── Engine access ──

    pub(crate) fn engine_mut(&mut self, graph: GraphId) -> Result<&mut SymbolEngine, BuildError> {
        self.program
            .graph_mut(graph)
            .and_then(|g| g.engine.as_mut())
            .ok_or(BuildError::DetachedEngine(graph))
    }

    pub(crate) fn engine_state(&self, graph: GraphId) -> Option<EngineState> {
        self.program.engine(graph).map(SymbolEngine::state)
    }

    pub(crate) fn depend_of(&self, graph: GraphId, node: NodeId) -> DependStatus {
        self.program
            .engine(graph)
            .map(|e| e.depend_status(node))
            .unwrap_or_default()
    }

    /// OR `status` into the demand recorded for `node`.
    pub(crate) fn demand(
        &mut self,
        graph: GraphId,
        node: NodeId,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        if status.is_none() {
            return Ok(());
        }
        self.engine_mut(graph)?
            .depend
            .entry(node)
            .or_default()
            .merge(status);
        Ok(())
    }

    pub(crate) fn graph_name(&self, graph: GraphId) -> String {
        self.program
            .graph(graph)
            .map_or_else(|| graph.to_string(), |g| g.name.clone())
    }

    // ── PreBuild ──

    /// Attach an engine to `graph` and propagate `output_demand` backward.
    pub(crate) fn pre_build(
        &mut self,
        graph: GraphId,
        parent: Option<GraphId>,
        output_demand: DependStatus,
    ) -> Result<(), BuildError> {
        let order = self.program.topo_order(graph)?;
        let output = self
            .program
            .graph(graph)
            .and_then(|g| g.output)
            .ok_or_else(|| BuildError::MissingOutput {
                graph: self.graph_name(graph),
            })?;
        let g = self
            .program
            .graph_mut(graph)
            .ok_or(BuildError::UnknownGraph(graph))?;
        g.engine = Some(SymbolEngine::new(graph, parent, order.clone()));
        self.attached.push(graph);
        tracing::debug!(graph = %self.graph_name(graph), parent = ?parent, "pre-build");

        self.demand(graph, output, output_demand)?;
        let rules = self.rules;
        for &id in order.iter().rev() {
            let status = self.depend_of(graph, id);
            tracing::trace!(node = %id, demand = %status, "depend status");
            if status.is_none() {
                continue;
            }
            let node = self.program.node(id).ok_or(BuildError::UnknownNode(id))?;
            let inputs = node.inputs.clone();
            let static_shape = node.abstract_type.is_static_shape();
            match node.kind.clone() {
                // A closure is only entered through the call or switch using it.
                NodeKind::Parameter { .. } | NodeKind::Constant(_) | NodeKind::Partial { .. } => {}
                NodeKind::Op { op, .. } => {
                    let Some(rule) = rules.get(&op) else {
                        continue;
                    };
                    // A facet with no builder, or a shape already fixed by the
                    // declared type, never reads its inputs.
                    let wants_shape =
                        status.shape && !static_shape && rule.shape_builder().is_some();
                    let wants_value = status.value && rule.value_builder().is_some();
                    for (for_value, wanted) in [(false, wants_shape), (true, wants_value)] {
                        if !wanted {
                            continue;
                        }
                        let depends = rule.input_depends(for_value, inputs.len());
                        for (&input, on) in inputs.iter().zip(depends) {
                            let mut need = DependStatus::NONE;
                            need.require(on);
                            self.demand(graph, input, need)?;
                        }
                    }
                }
                NodeKind::Call { .. } | NodeKind::Apply => {
                    for app in self.program.applications(id)? {
                        self.pre_build_call(graph, id, &app, status)?;
                    }
                }
                NodeKind::Switch => self.pre_build_switch(graph, id, status)?,
            }
        }
        self.engine_mut(graph)?.state = EngineState::PreBuilt;
        Ok(())
    }

    // ── BuildImpl ──

    /// Forward pass over `graph`; the engine must be pre-built. `caller` is
    /// the node entering `graph`, `None` for the graph a build starts from.
    pub(crate) fn build_impl(
        &mut self,
        graph: GraphId,
        caller: Option<NodeId>,
    ) -> Result<(), BuildError> {
        let name = self.graph_name(graph);
        let engine = self.engine_mut(graph)?;
        match (engine.state, caller) {
            (EngineState::PreBuilt, _) => {}
            (EngineState::Built, _) => return Ok(()),
            (EngineState::PreBuilding | EngineState::Building, Some(node)) => {
                return Err(BuildError::RecursiveCall { graph: name, node });
            }
            (EngineState::PreBuilding | EngineState::Building, None) => {
                return Err(BuildError::DetachedEngine(graph));
            }
        }
        engine.state = EngineState::Building;
        let order = engine.order.clone();
        tracing::debug!(graph = %name, nodes = order.len(), "build");

        for id in order {
            let status = self.depend_of(graph, id);
            if status.is_none() {
                continue;
            }
            let kind = self
                .program
                .node(id)
                .map(|n| n.kind.clone())
                .ok_or(BuildError::UnknownNode(id))?;
            match kind {
                NodeKind::Parameter { .. } => self.build_parameter(id, status),
                NodeKind::Constant(_) => self.build_constant(id, status),
                NodeKind::Partial { .. } => {}
                NodeKind::Op { .. } => self.build_op(graph, id, status)?,
                NodeKind::Call { .. } | NodeKind::Apply => {
                    for app in self.program.applications(id)? {
                        self.build_call(id, &app, status)?;
                    }
                }
                NodeKind::Switch => self.build_switch(id, status)?,
            }
            self.engine_mut(graph)?.stats.nodes_built += 1;
        }
        self.engine_mut(graph)?.state = EngineState::Built;
        Ok(())
    }

    /// Parameters not seeded by a caller (entry graphs) fall back to their
    /// declared type. Pre-assigned symbols are kept.
    fn build_parameter(&mut self, id: NodeId, status: DependStatus) {
        let Some(node) = self.program.node_mut(id) else {
            return;
        };
        if status.shape && node.symbolic_shape.is_none() {
            node.symbolic_shape = node.abstract_type.default_shape();
        }
        if status.value && node.symbolic_value.is_none() {
            node.symbolic_value = node.abstract_type.default_value();
        }
    }

    fn build_constant(&mut self, id: NodeId, status: DependStatus) {
        let Some(node) = self.program.node_mut(id) else {
            return;
        };
        let NodeKind::Constant(value) = &node.kind else {
            return;
        };
        if status.value {
            node.symbolic_value = value.to_symbol();
        }
        if status.shape {
            node.symbolic_shape = node.abstract_type.default_shape();
        }
    }

    fn build_op(
        &mut self,
        graph: GraphId,
        id: NodeId,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        let rules = self.rules;
        let program = &*self.program;
        let node = program.node(id).ok_or(BuildError::UnknownNode(id))?;
        let NodeKind::Op { op, attrs } = &node.kind else {
            return Ok(());
        };
        let Some(rule) = rules.get(op) else {
            tracing::trace!(node = %node.label(), op = %op, "no rule registered");
            return Ok(());
        };

        let inputs = node
            .inputs
            .iter()
            .map(|&i| {
                let input = program.node(i).ok_or(BuildError::DanglingInput { node: id, input: i })?;
                Ok(RuleInput {
                    shape: input.symbolic_shape.clone(),
                    value: input.symbolic_value.clone(),
                    abstract_type: input.abstract_type.clone(),
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        let ctx = RuleContext {
            op,
            inputs,
            attrs,
            abstract_type: &node.abstract_type,
        };

        let mut invocations = 0;
        let mut declined = Vec::new();
        let shape: Option<ListSymbol> = if !status.shape {
            None
        } else if node.abstract_type.is_static_shape() {
            node.abstract_type.default_shape()
        } else if let Some(build_shape) = rule.shape_builder() {
            invocations += 1;
            build_shape(&ctx).or_else(|| {
                declined.push("shape");
                node.abstract_type.default_shape()
            })
        } else {
            node.abstract_type.default_shape()
        };
        let value: Option<Symbol> = if !status.value {
            None
        } else if let Some(build_value) = rule.value_builder() {
            invocations += 1;
            build_value(&ctx).or_else(|| {
                // Declining is only a loss when the declared type has a value form.
                let fallback = node.abstract_type.default_value();
                if fallback.is_some() {
                    declined.push("value");
                }
                fallback
            })
        } else {
            node.abstract_type.default_value()
        };

        let warnings: Vec<Diagnostic> = declined
            .iter()
            .map(|facet| rule_declined(op, &node.label(), facet, &node.abstract_type, node.span))
            .collect();
        let label = node.label();

        for w in &warnings {
            tracing::warn!("{}", w.message);
        }
        self.diagnostics.extend(warnings);
        self.engine_mut(graph)?.stats.rule_invocations += invocations;

        if let Some(s) = &shape {
            tracing::debug!(node = %label, shape = %s, "set shape");
        }
        if let Some(v) = &value {
            tracing::debug!(node = %label, value = %v, "set value");
        }
        let node = self.program.node_mut(id).ok_or(BuildError::UnknownNode(id))?;
        if status.shape {
            node.symbolic_shape = shape;
        }
        if status.value {
            node.symbolic_value = value;
        }
        Ok(())
    }
}

fn rule_declined(
    op: &str,
    label: &str,
    facet: &str,
    declared: &AbstractType,
    span: Option<crate::ast::Span>,
) -> Diagnostic {
    Diagnostic::warning(
        span,
        format!("rule for `{op}` could not build the {facet} of `{label}`; using declared type `{declared}`"),
    )
    .with_code(codes::W0103)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_type::{ConstValue, DType, UNKNOWN_DIM};
    use crate::rule::{global, DependOn, OperationRule};
    use crate::symbol::IntSymbol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn f32_tensor(shape: &[i64]) -> AbstractType {
        AbstractType::tensor(DType::F32, shape)
    }

    #[test]
    fn entry_parameters_use_declared_types() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM, 4]));
        let y = p.add_op(g, "Relu", vec![x], f32_tensor(&[UNKNOWN_DIM, 4]));
        p.set_output(g, y);
        let report = build(&mut p, g, global()).unwrap();
        assert!(report.diagnostics.is_empty());
        let xs = p.symbolic_shape(x).unwrap();
        let ys = p.symbolic_shape(y).unwrap();
        assert!(xs.equals_to(ys));
        assert_eq!(xs.dims().unwrap()[1].value(), Some(4));
        assert_eq!(p.engine(g).unwrap().state(), EngineState::Built);
    }

    #[test]
    fn missing_rule_leaves_node_unannotated() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[2]));
        let y = p.add_op(g, "Mystery", vec![x], f32_tensor(&[2]));
        p.set_output(g, y);
        let report = build(&mut p, g, global()).unwrap();
        assert!(report.diagnostics.is_empty());
        assert!(p.symbolic_shape(y).is_none());
        // An opaque op demands nothing from its inputs.
        assert!(!p.engine(g).unwrap().is_depend_shape(x));
    }

    #[test]
    fn declined_rule_falls_back_with_warning() {
        let mut rules = RuleRegistry::new();
        rules.register(
            "Never",
            OperationRule::new()
                .shape_depends(&[DependOn::Shape])
                .with_shape(|_| None),
        );
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM]));
        let y = p.add_op(g, "Never", vec![x], f32_tensor(&[UNKNOWN_DIM, 3]));
        p.set_output(g, y);
        let report = build(&mut p, g, &rules).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, Some(codes::W0103));
        let ys = p.symbolic_shape(y).unwrap();
        assert_eq!(ys.len(), Some(2));
        assert_eq!(ys.dims().unwrap()[1].value(), Some(3));
    }

    #[test]
    fn static_declared_shape_skips_rule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut rules = RuleRegistry::new();
        rules.register(
            "Counted",
            OperationRule::new().with_shape(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.input_shape(0).cloned()
            }),
        );
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[2, 3]));
        let y = p.add_op(g, "Counted", vec![x], f32_tensor(&[2, 3]));
        p.set_output(g, y);
        let report = build(&mut p, g, &rules).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.stats.rule_invocations, 0);
        assert_eq!(p.symbolic_shape(y).unwrap().to_shape(), Some(vec![2, 3]));
    }

    #[test]
    fn shape_only_demand_skips_values() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let a = p.add_constant(g, ConstValue::Int(3));
        let b = p.add_constant(g, ConstValue::Int(4));
        let s = p.add_op(g, "ScalarAdd", vec![a, b], AbstractType::Scalar(DType::I64));
        p.set_output(g, s);
        build_with_demand(&mut p, g, DependStatus::SHAPE, global()).unwrap();
        assert!(p.symbolic_value(s).is_none());
        assert!(p.symbolic_shape(s).unwrap().is_empty());

        build(&mut p, g, global()).unwrap();
        let v = p.symbolic_value(s).unwrap();
        assert_eq!(v.as_int().unwrap().value(), Some(7));
    }

    #[test]
    fn value_demand_reaches_shape_of_shape_input() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM, 8]));
        let sh = p.add_op(
            g,
            "Shape",
            vec![x],
            AbstractType::Tuple(vec![AbstractType::Scalar(DType::I64); 2]),
        );
        let y = p.add_parameter(g, AbstractType::tensor_dyn_rank(DType::F32));
        let r = p.add_op(g, "Reshape", vec![y, sh], AbstractType::tensor_dyn_rank(DType::F32));
        p.set_output(g, r);
        build(&mut p, g, global()).unwrap();
        let engine = p.engine(g).unwrap();
        assert!(engine.is_depend_value(sh));
        assert!(!engine.is_depend_shape(sh));
        assert!(engine.is_depend_shape(x));
        let rs = p.symbolic_shape(r).unwrap();
        assert!(rs.equals_to(p.symbolic_shape(x).unwrap()));
    }

    #[test]
    fn rebuild_keeps_entry_parameter_symbols() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM]));
        let y = p.add_op(g, "Exp", vec![x], f32_tensor(&[UNKNOWN_DIM]));
        p.set_output(g, y);
        build(&mut p, g, global()).unwrap();
        let first = p.symbolic_shape(y).unwrap().clone();
        build(&mut p, g, global()).unwrap();
        let second = p.symbolic_shape(y).unwrap();
        assert!(first.equals_to(second));
    }

    #[test]
    fn preassigned_entry_parameter_is_respected() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM]));
        p.set_output(g, x);
        let n = IntSymbol::unknown();
        p.set_symbolic_shape(x, ListSymbol::from_dims(vec![n.clone()]));
        build(&mut p, g, global()).unwrap();
        assert!(p.symbolic_shape(x).unwrap().dims().unwrap()[0].is_same_instance(&n));
    }

    #[test]
    fn build_of_unknown_graph_fails() {
        let mut p = Program::new();
        assert_eq!(
            build(&mut p, GraphId(3), global()).unwrap_err(),
            BuildError::UnknownGraph(GraphId(3))
        );
    }

    #[test]
    fn reentered_engine_names_the_entering_node() {
        let mut p = Program::new();
        let g = p.add_graph("g");
        let x = p.add_parameter(g, f32_tensor(&[2]));
        p.set_output(g, x);
        let rules = RuleRegistry::new();
        let mut builder = Builder::new(&mut p, &rules);
        builder.pre_build(g, None, DependStatus::ALL).unwrap();
        builder.engine_mut(g).unwrap().state = EngineState::Building;

        let caller = NodeId(7);
        assert_eq!(
            builder.build_impl(g, Some(caller)),
            Err(BuildError::RecursiveCall {
                graph: "g".into(),
                node: caller
            })
        );
        assert_eq!(builder.build_impl(g, None), Err(BuildError::DetachedEngine(g)));
    }

    #[test]
    fn error_display() {
        let e = BuildError::ArityMismatch {
            node: NodeId(4),
            graph: "g".into(),
            expected: 1,
            found: 2,
        };
        assert_eq!(
            e.to_string(),
            "call node %4 passes 2 argument(s) to 'g', which takes 1"
        );
        assert_eq!(e.node(), Some(NodeId(4)));
    }
}
