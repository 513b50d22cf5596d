// redundancy.rs — Read-only consumers of built symbols
//
// Queries a later optimizer would ask once symbols exist: which shape
// manipulations provably do nothing, which `Shape` nodes recompute a value
// an earlier one already produced, which computed values are compile-time
// constants, and which `Reshape` targets are fully known. All only report;
// nothing is rewritten.
//
// Preconditions: the graph was built; nodes without symbols are never
//   reported.
// Postconditions: every reported pair is backed by `equals_to`, so no
//   false positives.
// Failure modes: none.
// Side effects: none.

use serde::Serialize;

use crate::id::{GraphId, NodeId};
use crate::program::{NodeKind, Program};

/// Operations that are a no-op whenever output shape equals input shape.
const SHAPE_PRESERVING_NOOPS: &[&str] = &[
    "Reshape",
    "ReduceSum",
    "ReduceMax",
    "Transpose",
    "Cast",
    "Identity",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoEffectNode {
    pub node: NodeId,
    pub op: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateShape {
    pub node: NodeId,
    /// Earlier `Shape` node with an `equals_to` value.
    pub same_as: NodeId,
}

/// A computed node whose symbolic value is fully known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoldableValue {
    pub node: NodeId,
    pub value: String,
}

/// A `Reshape` whose computed target shape could be a constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticReshape {
    pub node: NodeId,
    /// Known target, with at most one `-1`.
    pub shape: Vec<i64>,
}

/// Nodes of `graph` whose op leaves the shape unchanged here: the first
/// input's shape `equals_to` the node's own shape.
///
/// `Cast` changes the element type, so it only counts when input and output
/// declare the same type.
pub fn no_effect_nodes(program: &Program, graph: GraphId) -> Vec<NoEffectNode> {
    let Some(g) = program.graph(graph) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for &id in &g.nodes {
        let Some(node) = program.node(id) else {
            continue;
        };
        let NodeKind::Op { op, .. } = &node.kind else {
            continue;
        };
        if !SHAPE_PRESERVING_NOOPS.contains(&op.as_str()) {
            continue;
        }
        let Some(input) = node.inputs.first().and_then(|&i| program.node(i)) else {
            continue;
        };
        if op == "Cast" && input.abstract_type != node.abstract_type {
            continue;
        }
        let (Some(before), Some(after)) = (&input.symbolic_shape, &node.symbolic_shape) else {
            continue;
        };
        if before.equals_to(after) {
            tracing::debug!(node = %node.label(), op = %op, "no-effect node");
            out.push(NoEffectNode {
                node: id,
                op: op.clone(),
            });
        }
    }
    out
}

/// `Shape` nodes of `graph` whose value `equals_to` that of an earlier
/// `Shape` node in the same graph.
pub fn duplicate_shapes(program: &Program, graph: GraphId) -> Vec<DuplicateShape> {
    let Some(g) = program.graph(graph) else {
        return Vec::new();
    };
    let mut seen: Vec<(NodeId, &crate::symbol::Symbol)> = Vec::new();
    let mut out = Vec::new();
    for &id in &g.nodes {
        let Some(node) = program.node(id) else {
            continue;
        };
        if !matches!(&node.kind, NodeKind::Op { op, .. } if op == "Shape") {
            continue;
        }
        let Some(value) = &node.symbolic_value else {
            continue;
        };
        match seen.iter().find(|(_, v)| v.equals_to(value)) {
            Some(&(first, _)) => out.push(DuplicateShape {
                node: id,
                same_as: first,
            }),
            None => seen.push((id, value)),
        }
    }
    out
}

/// Computed nodes of `graph` (ops, calls, switches) whose symbolic value
/// has data, so a constant could replace them. `Constant` nodes and
/// closures are skipped.
pub fn foldable_values(program: &Program, graph: GraphId) -> Vec<FoldableValue> {
    let Some(g) = program.graph(graph) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for &id in &g.nodes {
        let Some(node) = program.node(id) else {
            continue;
        };
        if !matches!(node.kind, NodeKind::Op { .. }) && !node.is_call() {
            continue;
        }
        let Some(value) = node.symbolic_value.as_ref().filter(|v| v.has_data()) else {
            continue;
        };
        out.push(FoldableValue {
            node: id,
            value: value.to_string(),
        });
    }
    out
}

/// `Reshape` nodes of `graph` whose target operand is computed, not a
/// `Constant`, yet its value is known with at most one `-1` dimension.
pub fn static_reshapes(program: &Program, graph: GraphId) -> Vec<StaticReshape> {
    let Some(g) = program.graph(graph) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for &id in &g.nodes {
        let Some(node) = program.node(id) else {
            continue;
        };
        if !matches!(&node.kind, NodeKind::Op { op, .. } if op == "Reshape") {
            continue;
        }
        let Some(target) = node.inputs.get(1).and_then(|&i| program.node(i)) else {
            continue;
        };
        if matches!(target.kind, NodeKind::Constant(_)) {
            continue;
        }
        let Some(shape) = target
            .symbolic_value
            .as_ref()
            .and_then(|v| v.as_list())
            .and_then(|l| l.to_shape())
        else {
            continue;
        };
        if shape.iter().filter(|&&d| d == -1).count() > 1 {
            continue;
        }
        tracing::debug!(node = %node.label(), shape = ?shape, "static reshape");
        out.push(StaticReshape { node: id, shape });
    }
    out
}

/// All queries over every graph reachable from `entry`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Findings {
    pub no_effect: Vec<NoEffectNode>,
    pub duplicate_shapes: Vec<DuplicateShape>,
    pub foldable: Vec<FoldableValue>,
    pub static_reshapes: Vec<StaticReshape>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.no_effect.is_empty()
            && self.duplicate_shapes.is_empty()
            && self.foldable.is_empty()
            && self.static_reshapes.is_empty()
    }

    /// One line per finding, node labels resolved against `program`.
    pub fn render(&self, program: &Program) -> String {
        let label = |id: NodeId| program.node(id).map_or_else(|| id.to_string(), |n| n.label());
        let mut out = String::new();
        for n in &self.no_effect {
            out.push_str(&format!("no-effect {} ({})\n", label(n.node), n.op));
        }
        for d in &self.duplicate_shapes {
            out.push_str(&format!(
                "duplicate-shape {} same as {}\n",
                label(d.node),
                label(d.same_as)
            ));
        }
        for v in &self.foldable {
            out.push_str(&format!("foldable {} = {}\n", label(v.node), v.value));
        }
        for r in &self.static_reshapes {
            out.push_str(&format!("static-reshape {} to {:?}\n", label(r.node), r.shape));
        }
        out
    }
}

pub fn analyze(program: &Program, entry: GraphId) -> Findings {
    let mut findings = Findings::default();
    for g in program.reachable_graphs(entry) {
        findings.no_effect.extend(no_effect_nodes(program, g));
        findings.duplicate_shapes.extend(duplicate_shapes(program, g));
        findings.foldable.extend(foldable_values(program, g));
        findings.static_reshapes.extend(static_reshapes(program, g));
    }
    findings
}
