// program.rs — Dataflow program: graphs, nodes and their symbol slots
//
// A `Program` is an arena of graphs. Each graph has an ordered formal
// parameter list, a single output node and at most one attached
// `SymbolEngine`. Nodes live in one program-wide table indexed by `NodeId`,
// so per-node state (demand, symbols) can be keyed by ID alone.
//
// Preconditions: none for construction; `topo_order` is the structural
//   validator run by the engine before any symbol work.
// Postconditions: `topo_order` returns the nodes reachable from a graph's
//   output in dependency order (inputs before users).
// Failure modes: malformed structure (missing output, dangling input,
//   unresolved callee, arity mismatch, a closure call or switch branch that
//   is not a partial application, cycle) → `BuildError`.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::abstract_type::{AbstractType, Attrs, ConstValue};
use crate::ast::Span;
use crate::engine::{BuildError, SymbolEngine};
use crate::id::{GraphId, IdAllocator, NodeId};
use crate::symbol::{ListSymbol, Symbol};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Formal parameter at position `index` of its graph.
    Parameter { index: usize },
    Constant(ConstValue),
    /// Primitive operation; its symbols come from the `OperationRule` for `op`.
    Op { op: String, attrs: Attrs },
    /// Call into another graph; `inputs` are the actual arguments.
    Call { callee: Option<GraphId> },
    /// Partial application of another graph: `inputs` bind its leading
    /// parameters. The node is a closure and carries no symbols.
    Partial { callee: Option<GraphId> },
    /// Call through a closure: `inputs[0]` is a `Partial` node, the rest fill
    /// the callee parameters after the ones it binds.
    Apply,
    /// Conditional join: `inputs` are `[cond, then, else, args..]`. Both
    /// branches are `Partial` nodes completed by `args`.
    Switch,
}

/// One entry into a callee, with the argument for every parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub callee: GraphId,
    pub args: Vec<NodeId>,
    /// Leading arguments bound by a partial application; call-site operands
    /// start at this parameter index.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub graph: GraphId,
    pub name: Option<String>,
    pub kind: NodeKind,
    pub inputs: Vec<NodeId>,
    pub abstract_type: AbstractType,
    pub span: Option<Span>,
    pub symbolic_shape: Option<ListSymbol>,
    pub symbolic_value: Option<Symbol>,
}

impl Node {
    /// Whether building this node enters another graph.
    pub fn is_call(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Call { .. } | NodeKind::Apply | NodeKind::Switch
        )
    }

    /// Display label: the source name if any, else the node ID.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn clear_symbols(&mut self) {
        self.symbolic_shape = None;
        self.symbolic_value = None;
    }
}

#[derive(Debug)]
pub struct Graph {
    pub id: GraphId,
    pub name: String,
    pub params: Vec<NodeId>,
    /// All nodes of the graph in creation order.
    pub nodes: Vec<NodeId>,
    pub output: Option<NodeId>,
    pub span: Option<Span>,
    pub(crate) engine: Option<SymbolEngine>,
}

impl Graph {
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&SymbolEngine> {
        self.engine.as_ref()
    }
}

/// A collection of graphs that may call one another.
#[derive(Debug, Default)]
pub struct Program {
    graphs: Vec<Graph>,
    nodes: Vec<Node>,
    names: HashMap<String, GraphId>,
    ids: IdAllocator,
}

// ── Construction ────────────────────────────────────────────────────────────

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty graph. A later graph with the same name shadows the
    /// earlier one in `graph_by_name`.
    pub fn add_graph(&mut self, name: &str) -> GraphId {
        let id = self.ids.alloc_graph();
        self.graphs.push(Graph {
            id,
            name: name.to_string(),
            params: Vec::new(),
            nodes: Vec::new(),
            output: None,
            span: None,
            engine: None,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    pub fn add_parameter(&mut self, graph: GraphId, ty: AbstractType) -> NodeId {
        let index = self.graphs[graph.0 as usize].params.len();
        let id = self.push_node(graph, NodeKind::Parameter { index }, Vec::new(), ty);
        self.graphs[graph.0 as usize].params.push(id);
        id
    }

    pub fn add_constant(&mut self, graph: GraphId, value: ConstValue) -> NodeId {
        let ty = value.abstract_type();
        self.push_node(graph, NodeKind::Constant(value), Vec::new(), ty)
    }

    pub fn add_op(
        &mut self,
        graph: GraphId,
        op: &str,
        inputs: Vec<NodeId>,
        ty: AbstractType,
    ) -> NodeId {
        self.add_op_with_attrs(graph, op, inputs, Attrs::new(), ty)
    }

    pub fn add_op_with_attrs(
        &mut self,
        graph: GraphId,
        op: &str,
        inputs: Vec<NodeId>,
        attrs: Attrs,
        ty: AbstractType,
    ) -> NodeId {
        let kind = NodeKind::Op {
            op: op.to_string(),
            attrs,
        };
        self.push_node(graph, kind, inputs, ty)
    }

    /// Add a call node. `callee == None` models an unresolved call target,
    /// which `topo_order` rejects.
    pub fn add_call(
        &mut self,
        graph: GraphId,
        callee: Option<GraphId>,
        args: Vec<NodeId>,
        ty: AbstractType,
    ) -> NodeId {
        self.push_node(graph, NodeKind::Call { callee }, args, ty)
    }

    /// Add a partial application of `callee` binding `bound` to its leading
    /// parameters.
    pub fn add_partial(
        &mut self,
        graph: GraphId,
        callee: Option<GraphId>,
        bound: Vec<NodeId>,
    ) -> NodeId {
        self.push_node(graph, NodeKind::Partial { callee }, bound, AbstractType::Opaque)
    }

    /// Add a call through the closure `partial` with the remaining `args`.
    pub fn add_apply(
        &mut self,
        graph: GraphId,
        partial: NodeId,
        args: Vec<NodeId>,
        ty: AbstractType,
    ) -> NodeId {
        let mut inputs = vec![partial];
        inputs.extend(args);
        self.push_node(graph, NodeKind::Apply, inputs, ty)
    }

    /// Add a switch choosing between two closures on `cond`, both applied to
    /// `args`.
    pub fn add_switch(
        &mut self,
        graph: GraphId,
        cond: NodeId,
        branches: [NodeId; 2],
        args: Vec<NodeId>,
        ty: AbstractType,
    ) -> NodeId {
        let mut inputs = vec![cond, branches[0], branches[1]];
        inputs.extend(args);
        self.push_node(graph, NodeKind::Switch, inputs, ty)
    }

    pub fn set_output(&mut self, graph: GraphId, node: NodeId) {
        self.graphs[graph.0 as usize].output = Some(node);
    }

    pub fn set_node_name(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.name = Some(name.to_string());
        }
    }

    pub fn set_node_span(&mut self, node: NodeId, span: Span) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.span = Some(span);
        }
    }

    pub fn set_graph_span(&mut self, graph: GraphId, span: Span) {
        if let Some(g) = self.graphs.get_mut(graph.0 as usize) {
            g.span = Some(span);
        }
    }

    fn push_node(
        &mut self,
        graph: GraphId,
        kind: NodeKind,
        inputs: Vec<NodeId>,
        abstract_type: AbstractType,
    ) -> NodeId {
        let id = self.ids.alloc_node();
        self.nodes.push(Node {
            id,
            graph,
            name: None,
            kind,
            inputs,
            abstract_type,
            span: None,
            symbolic_shape: None,
            symbolic_value: None,
        });
        self.graphs[graph.0 as usize].nodes.push(id);
        id
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

impl Program {
    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id.0 as usize)
    }

    pub(crate) fn graph_mut(&mut self, id: GraphId) -> Option<&mut Graph> {
        self.graphs.get_mut(id.0 as usize)
    }

    pub fn graph_by_name(&self, name: &str) -> Option<GraphId> {
        self.names.get(name).copied()
    }

    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.iter()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn has_engine(&self, graph: GraphId) -> bool {
        self.graph(graph).is_some_and(Graph::has_engine)
    }

    pub fn engine(&self, graph: GraphId) -> Option<&SymbolEngine> {
        self.graph(graph).and_then(Graph::engine)
    }

    pub fn symbolic_shape(&self, node: NodeId) -> Option<&ListSymbol> {
        self.node(node).and_then(|n| n.symbolic_shape.as_ref())
    }

    pub fn symbolic_value(&self, node: NodeId) -> Option<&Symbol> {
        self.node(node).and_then(|n| n.symbolic_value.as_ref())
    }

    /// Pre-assign a shape, e.g. to correlate entry parameters of separate
    /// builds. Entry parameter symbols survive rebuilds.
    pub fn set_symbolic_shape(&mut self, node: NodeId, shape: ListSymbol) {
        if let Some(n) = self.node_mut(node) {
            n.symbolic_shape = Some(shape);
        }
    }

    pub fn set_symbolic_value(&mut self, node: NodeId, value: Symbol) {
        if let Some(n) = self.node_mut(node) {
            n.symbolic_value = Some(value);
        }
    }

    /// Graphs called directly from `graph` (resolved callees only, deduplicated,
    /// in first-call order).
    pub fn callees(&self, graph: GraphId) -> Vec<GraphId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let Some(g) = self.graph(graph) else {
            return out;
        };
        for &id in &g.nodes {
            let callee = match self.node(id).map(|n| &n.kind) {
                Some(NodeKind::Call { callee: Some(c) } | NodeKind::Partial { callee: Some(c) }) => *c,
                _ => continue,
            };
            if seen.insert(callee) {
                out.push(callee);
            }
        }
        out
    }

    /// The callee entries building `id` makes: one for a call or closure
    /// call, one per branch for a switch, none for any other node.
    pub fn applications(&self, id: NodeId) -> Result<Vec<Application>, BuildError> {
        let node = self.node(id).ok_or(BuildError::UnknownNode(id))?;
        match &node.kind {
            NodeKind::Call { callee } => {
                let callee = callee.ok_or(BuildError::MissingCallee { node: id })?;
                Ok(vec![Application {
                    callee,
                    args: node.inputs.clone(),
                    offset: 0,
                }])
            }
            NodeKind::Apply => {
                let Some((&closure, rest)) = node.inputs.split_first() else {
                    return Err(BuildError::MissingOperands {
                        node: id,
                        expected: 1,
                        found: 0,
                    });
                };
                Ok(vec![self.complete_partial(id, closure, rest)?])
            }
            NodeKind::Switch => {
                let [_, then, other, rest @ ..] = node.inputs.as_slice() else {
                    return Err(BuildError::MissingOperands {
                        node: id,
                        expected: 3,
                        found: node.inputs.len(),
                    });
                };
                Ok(vec![
                    self.complete_partial(id, *then, rest)?,
                    self.complete_partial(id, *other, rest)?,
                ])
            }
            NodeKind::Parameter { .. }
            | NodeKind::Constant(_)
            | NodeKind::Op { .. }
            | NodeKind::Partial { .. } => Ok(Vec::new()),
        }
    }

    fn complete_partial(
        &self,
        user: NodeId,
        closure: NodeId,
        rest: &[NodeId],
    ) -> Result<Application, BuildError> {
        let node = self.node(closure).ok_or(BuildError::DanglingInput {
            node: user,
            input: closure,
        })?;
        let NodeKind::Partial { callee } = node.kind else {
            return Err(BuildError::NotAPartial {
                node: user,
                input: closure,
            });
        };
        let callee = callee.ok_or(BuildError::MissingCallee { node: closure })?;
        let mut args = node.inputs.clone();
        args.extend_from_slice(rest);
        Ok(Application {
            callee,
            args,
            offset: node.inputs.len(),
        })
    }

    /// `graph` followed by every graph transitively callable from it.
    pub fn reachable_graphs(&self, graph: GraphId) -> Vec<GraphId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![graph];
        while let Some(g) = stack.pop() {
            if self.graph(g).is_none() || !seen.insert(g) {
                continue;
            }
            out.push(g);
            let mut next = self.callees(g);
            next.reverse();
            stack.extend(next);
        }
        out
    }
}

// ── Structural validation / ordering ────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl Program {
    /// Nodes reachable from `graph`'s output, inputs before users.
    ///
    /// Validates every visited node: inputs exist and belong to `graph`, call
    /// nodes name an existing callee with matching arity (bound plus
    /// call-site arguments for closures), partial applications bind no more
    /// than their callee takes, and there is no cycle.
    pub fn topo_order(&self, graph: GraphId) -> Result<Vec<NodeId>, BuildError> {
        let g = self.graph(graph).ok_or(BuildError::UnknownGraph(graph))?;
        let output = g.output.ok_or_else(|| BuildError::MissingOutput {
            graph: g.name.clone(),
        })?;
        self.check_node(graph, None, output)?;

        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut order = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(output, 0)];
        marks.insert(output, Mark::InProgress);

        while let Some((node, next)) = stack.last().copied() {
            let inputs = &self.nodes[node.0 as usize].inputs;
            if next < inputs.len() {
                let input = inputs[next];
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks.get(&input) {
                    None => {
                        self.check_node(graph, Some(node), input)?;
                        marks.insert(input, Mark::InProgress);
                        stack.push((input, 0));
                    }
                    Some(Mark::InProgress) => {
                        return Err(BuildError::CyclicGraph {
                            graph: g.name.clone(),
                            node: input,
                        });
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                marks.insert(node, Mark::Done);
                order.push(node);
                stack.pop();
            }
        }
        Ok(order)
    }

    fn check_node(
        &self,
        graph: GraphId,
        user: Option<NodeId>,
        id: NodeId,
    ) -> Result<(), BuildError> {
        let dangling = || match user {
            Some(user) => BuildError::DanglingInput {
                node: user,
                input: id,
            },
            None => BuildError::UnknownNode(id),
        };
        let node = self.node(id).ok_or_else(dangling)?;
        if node.graph != graph {
            return Err(dangling());
        }
        if let NodeKind::Partial { callee } = &node.kind {
            let callee = callee.ok_or(BuildError::MissingCallee { node: id })?;
            let target = self
                .graph(callee)
                .ok_or(BuildError::UnknownCallee { node: id, callee })?;
            if node.inputs.len() > target.params.len() {
                return Err(BuildError::ArityMismatch {
                    node: id,
                    graph: target.name.clone(),
                    expected: target.params.len(),
                    found: node.inputs.len(),
                });
            }
        }
        for app in self.applications(id)? {
            let target = self.graph(app.callee).ok_or(BuildError::UnknownCallee {
                node: id,
                callee: app.callee,
            })?;
            if target.params.len() != app.args.len() {
                return Err(BuildError::ArityMismatch {
                    node: id,
                    graph: target.name.clone(),
                    expected: target.params.len(),
                    found: app.args.len(),
                });
            }
        }
        Ok(())
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl Program {
    pub(crate) fn node_ref_label(&self, id: NodeId) -> String {
        self.node(id).map_or_else(|| id.to_string(), Node::label)
    }

    pub(crate) fn node_head(&self, node: &Node) -> String {
        let args = node
            .inputs
            .iter()
            .map(|&i| self.node_ref_label(i))
            .collect::<Vec<_>>()
            .join(", ");
        match &node.kind {
            NodeKind::Parameter { index } => format!("param #{index}"),
            NodeKind::Constant(v) => format!("const {v}"),
            NodeKind::Op { op, attrs } => {
                let mut s = format!("{op}({args})");
                if !attrs.is_empty() {
                    let list = attrs
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    s.push_str(&format!(" {{{list}}}"));
                }
                s
            }
            NodeKind::Call { callee } => format!("call {}({args})", self.callee_name(*callee)),
            NodeKind::Partial { callee } => {
                format!("partial {}({args})", self.callee_name(*callee))
            }
            NodeKind::Apply => {
                let (closure, rest) = split_operands(&node.inputs, 1);
                format!("call {}({})", self.labels(closure), self.labels(rest))
            }
            NodeKind::Switch => {
                let (head, rest) = split_operands(&node.inputs, 3);
                if rest.is_empty() {
                    format!("switch({})", self.labels(head))
                } else {
                    format!("switch({})({})", self.labels(head), self.labels(rest))
                }
            }
        }
    }

    pub(crate) fn callee_name(&self, callee: Option<GraphId>) -> String {
        callee
            .and_then(|c| self.graph(c))
            .map_or_else(|| "<unresolved>".to_string(), |g| g.name.clone())
    }

    fn labels(&self, ids: &[NodeId]) -> String {
        ids.iter()
            .map(|&i| self.node_ref_label(i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn split_operands(inputs: &[NodeId], head: usize) -> (&[NodeId], &[NodeId]) {
    inputs.split_at(head.min(inputs.len()))
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.graphs {
            let params = g
                .params
                .iter()
                .filter_map(|&p| self.node(p))
                .map(|p| format!("{}: {}", p.label(), p.abstract_type))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "graph {}({}) {{", g.name, params)?;
            for &id in &g.nodes {
                let Some(node) = self.node(id) else { continue };
                if matches!(node.kind, NodeKind::Parameter { .. }) {
                    continue;
                }
                writeln!(
                    f,
                    "  {} = {} : {}",
                    node.label(),
                    self.node_head(node),
                    node.abstract_type
                )?;
            }
            match g.output {
                Some(out) => writeln!(f, "  return {}", self.node_ref_label(out))?,
                None => writeln!(f, "  <no return>")?,
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_type::DType;

    fn f32_tensor(shape: &[i64]) -> AbstractType {
        AbstractType::tensor(DType::F32, shape)
    }

    #[test]
    fn topo_order_puts_inputs_first() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[2, 3]));
        let a = p.add_op(g, "Relu", vec![x], f32_tensor(&[2, 3]));
        let b = p.add_op(g, "Add", vec![a, x], f32_tensor(&[2, 3]));
        p.set_output(g, b);
        assert_eq!(p.topo_order(g).unwrap(), vec![x, a, b]);
    }

    #[test]
    fn unreachable_nodes_are_not_ordered() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[2]));
        let _dead = p.add_op(g, "Exp", vec![x], f32_tensor(&[2]));
        p.set_output(g, x);
        assert_eq!(p.topo_order(g).unwrap(), vec![x]);
    }

    #[test]
    fn missing_output_is_rejected() {
        let mut p = Program::new();
        let g = p.add_graph("empty");
        assert!(matches!(
            p.topo_order(g),
            Err(BuildError::MissingOutput { .. })
        ));
    }

    #[test]
    fn cross_graph_input_is_dangling() {
        let mut p = Program::new();
        let g = p.add_graph("a");
        let h = p.add_graph("b");
        let x = p.add_parameter(g, f32_tensor(&[2]));
        let y = p.add_op(h, "Relu", vec![x], f32_tensor(&[2]));
        p.set_output(h, y);
        assert!(matches!(
            p.topo_order(h),
            Err(BuildError::DanglingInput { node, input }) if node == y && input == x
        ));
    }

    #[test]
    fn unresolved_call_is_rejected() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[2]));
        let c = p.add_call(g, None, vec![x], f32_tensor(&[2]));
        p.set_output(g, c);
        assert!(matches!(
            p.topo_order(g),
            Err(BuildError::MissingCallee { node }) if node == c
        ));
    }

    #[test]
    fn call_arity_is_checked() {
        let mut p = Program::new();
        let callee = p.add_graph("g");
        let q = p.add_parameter(callee, f32_tensor(&[2]));
        p.set_output(callee, q);
        let main = p.add_graph("main");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        let c = p.add_call(main, Some(callee), vec![x, x], f32_tensor(&[2]));
        p.set_output(main, c);
        assert!(matches!(
            p.topo_order(main),
            Err(BuildError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn closure_call_counts_bound_arguments() {
        let mut p = Program::new();
        let callee = p.add_graph("pair");
        p.add_parameter(callee, f32_tensor(&[2]));
        let b = p.add_parameter(callee, f32_tensor(&[2]));
        p.set_output(callee, b);
        let main = p.add_graph("main");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        let y = p.add_parameter(main, f32_tensor(&[2]));
        let part = p.add_partial(main, Some(callee), vec![x]);
        let ok = p.add_apply(main, part, vec![y], f32_tensor(&[2]));
        p.set_output(main, ok);
        assert_eq!(p.topo_order(main).unwrap(), vec![x, part, y, ok]);
        assert_eq!(
            p.applications(ok).unwrap(),
            vec![Application {
                callee,
                args: vec![x, y],
                offset: 1
            }]
        );

        let short = p.add_apply(main, part, vec![], f32_tensor(&[2]));
        p.set_output(main, short);
        assert!(matches!(
            p.topo_order(main),
            Err(BuildError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn partial_binding_too_many_is_rejected() {
        let mut p = Program::new();
        let callee = p.add_graph("one");
        let q = p.add_parameter(callee, f32_tensor(&[2]));
        p.set_output(callee, q);
        let main = p.add_graph("main");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        let part = p.add_partial(main, Some(callee), vec![x, x]);
        p.set_output(main, part);
        assert!(matches!(
            p.topo_order(main),
            Err(BuildError::ArityMismatch { node, expected: 1, found: 2, .. }) if node == part
        ));
    }

    #[test]
    fn closure_call_through_non_partial_is_rejected() {
        let mut p = Program::new();
        let main = p.add_graph("main");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        let c = p.add_apply(main, x, vec![], f32_tensor(&[2]));
        p.set_output(main, c);
        assert!(matches!(
            p.topo_order(main),
            Err(BuildError::NotAPartial { node, input }) if node == c && input == x
        ));
    }

    #[test]
    fn switch_needs_condition_and_two_branches() {
        let mut p = Program::new();
        let main = p.add_graph("main");
        let c = p.add_parameter(main, AbstractType::Scalar(DType::Bool));
        let s = p.push_node(main, NodeKind::Switch, vec![c], f32_tensor(&[2]));
        p.set_output(main, s);
        assert!(matches!(
            p.topo_order(main),
            Err(BuildError::MissingOperands {
                expected: 3,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let mut p = Program::new();
        let g = p.add_graph("loop");
        let a = p.add_op(g, "Relu", vec![], f32_tensor(&[2]));
        let b = p.add_op(g, "Relu", vec![a], f32_tensor(&[2]));
        p.nodes[a.0 as usize].inputs.push(b);
        p.set_output(g, b);
        assert!(matches!(
            p.topo_order(g),
            Err(BuildError::CyclicGraph { .. })
        ));
    }

    #[test]
    fn reachable_graphs_follow_calls() {
        let mut p = Program::new();
        let leaf = p.add_graph("leaf");
        let q = p.add_parameter(leaf, f32_tensor(&[2]));
        p.set_output(leaf, q);
        let mid = p.add_graph("mid");
        let r = p.add_parameter(mid, f32_tensor(&[2]));
        let c = p.add_call(mid, Some(leaf), vec![r], f32_tensor(&[2]));
        p.set_output(mid, c);
        let main = p.add_graph("main");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        let c1 = p.add_call(main, Some(mid), vec![x], f32_tensor(&[2]));
        let c2 = p.add_call(main, Some(leaf), vec![c1], f32_tensor(&[2]));
        p.set_output(main, c2);
        assert_eq!(p.reachable_graphs(main), vec![main, mid, leaf]);
        assert_eq!(p.callees(main), vec![mid, leaf]);
    }

    #[test]
    fn display_lists_graph_body() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.add_parameter(g, f32_tensor(&[-1, 4]));
        p.set_node_name(x, "x");
        let y = p.add_op(g, "Relu", vec![x], f32_tensor(&[-1, 4]));
        p.set_node_name(y, "y");
        p.set_output(g, y);
        let text = p.to_string();
        assert!(text.contains("graph main(x: f32[?, 4]) {"));
        assert!(text.contains("  y = Relu(x) : f32[?, 4]"));
        assert!(text.contains("  return y"));
    }

    #[test]
    fn display_prints_closures_and_switches() {
        let mut p = Program::new();
        let g = p.add_graph("g");
        let q = p.add_parameter(g, f32_tensor(&[2]));
        p.set_output(g, q);
        let main = p.add_graph("main");
        let c = p.add_parameter(main, AbstractType::Scalar(DType::Bool));
        p.set_node_name(c, "c");
        let x = p.add_parameter(main, f32_tensor(&[2]));
        p.set_node_name(x, "x");
        let k = p.add_partial(main, Some(g), vec![]);
        p.set_node_name(k, "k");
        let y = p.add_apply(main, k, vec![x], f32_tensor(&[2]));
        p.set_node_name(y, "y");
        let s = p.add_switch(main, c, [k, k], vec![y], f32_tensor(&[2]));
        p.set_node_name(s, "s");
        p.set_output(main, s);
        let text = p.to_string();
        assert!(text.contains("  k = partial g() : any\n"));
        assert!(text.contains("  y = call k(x) : f32[2]\n"));
        assert!(text.contains("  s = switch(c, k, k)(y) : f32[2]\n"));
    }
}
