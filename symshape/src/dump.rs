// dump.rs — Deterministic views of a built program's symbols
//
// Symbol IDs come from a process-wide counter, so they differ between runs
// and between rebuilds. Every view here renames unknown symbols canonically
// (`s0`, `s1`, ... in first-appearance order) so two builds that assign
// `equals_to`-compatible symbols produce identical text. A symbol bound to
// another (a seeded parameter dimension) prints under the name of the
// quantity it is bound to.
//
// Preconditions: none; unbuilt nodes print as `-`.
// Postconditions: output depends only on program structure and symbol
//   identity, never on raw symbol IDs.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::engine::{BuildReport, BuildStats, EngineState};
use crate::id::{GraphId, NodeId, SymbolId};
use crate::program::{NodeKind, Program};
use crate::rule::DependStatus;
use crate::symbol::{BoolDef, BoolSymbol, IntDef, IntSymbol, ListSymbol, Symbol};

// ── Canonical naming ────────────────────────────────────────────────────────

/// Assigns `sN` names to unknown and expression symbols.
#[derive(Debug, Default)]
pub struct SymbolNamer {
    names: HashMap<SymbolId, String>,
    /// Expression symbols in naming order, for the expression table.
    exprs: Vec<IntSymbol>,
}

impl SymbolNamer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self, id: SymbolId) -> String {
        let name = format!("s{}", self.names.len());
        self.names.insert(id, name.clone());
        name
    }

    pub fn int(&mut self, sym: &IntSymbol) -> String {
        let canon = sym.canonical();
        match canon.def() {
            IntDef::Const(v) => v.to_string(),
            IntDef::Expr { .. } => match self.names.get(&canon.id()) {
                Some(name) => name.clone(),
                None => {
                    self.exprs.push(canon.clone());
                    self.fresh(canon.id())
                }
            },
            IntDef::Unknown | IntDef::Bound(_) => match self.names.get(&canon.id()) {
                Some(name) => name.clone(),
                None => self.fresh(canon.id()),
            },
        }
    }

    pub fn bool(&mut self, sym: &BoolSymbol) -> String {
        let canon = sym.canonical();
        match canon.def() {
            BoolDef::Const(v) => v.to_string(),
            BoolDef::Unknown | BoolDef::Bound(_) => match self.names.get(&canon.id()) {
                Some(name) => name.clone(),
                None => self.fresh(canon.id()),
            },
        }
    }

    pub fn list(&mut self, sym: &ListSymbol) -> String {
        match sym.items() {
            None => "[..]".to_string(),
            Some(items) => {
                let parts: Vec<String> = items.iter().map(|s| self.symbol(s)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    pub fn symbol(&mut self, sym: &Symbol) -> String {
        match sym {
            Symbol::Int(s) => self.int(s),
            Symbol::Bool(s) => self.bool(s),
            Symbol::List(s) => self.list(s),
        }
    }

    /// Expression table entries (`s3 = Mul(s1, 128)`), naming operands as
    /// they are reached.
    pub fn expressions(&mut self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.exprs.len() {
            let expr = self.exprs[i].clone();
            i += 1;
            let IntDef::Expr { op, lhs, rhs } = expr.def() else {
                continue;
            };
            let name = self.int(&expr);
            let lhs = self.int(lhs);
            let rhs = self.int(rhs);
            out.push((name, format!("{}({}, {})", op.name(), lhs, rhs)));
        }
        out
    }
}

// ── Text dump ───────────────────────────────────────────────────────────────

fn kind_label(program: &Program, kind: &NodeKind) -> String {
    match kind {
        NodeKind::Parameter { index } => format!("param#{index}"),
        NodeKind::Constant(v) => format!("const {v}"),
        NodeKind::Op { op, .. } => op.clone(),
        NodeKind::Call { callee } => format!("call {}", program.callee_name(*callee)),
        NodeKind::Partial { callee } => format!("partial {}", program.callee_name(*callee)),
        NodeKind::Apply => "call".to_string(),
        NodeKind::Switch => "switch".to_string(),
    }
}

/// Text dump of the symbols of `entry` and every graph it can reach.
///
/// ```text
/// graph main
///   x: param#0  shape=[s0, 128]  value=-
///   y: call id  shape=[s0, 128]  value=-
/// ```
pub fn dump(program: &Program, entry: GraphId) -> String {
    let mut namer = SymbolNamer::new();
    let mut out = String::new();
    for g in program.reachable_graphs(entry) {
        let Some(graph) = program.graph(g) else {
            continue;
        };
        let _ = writeln!(out, "graph {}", graph.name);
        for &id in &graph.nodes {
            let Some(node) = program.node(id) else {
                continue;
            };
            let shape = node
                .symbolic_shape
                .as_ref()
                .map_or_else(|| "-".to_string(), |s| namer.list(s));
            let value = node
                .symbolic_value
                .as_ref()
                .map_or_else(|| "-".to_string(), |v| namer.symbol(v));
            let _ = writeln!(
                out,
                "  {}: {}  shape={}  value={}",
                node.label(),
                kind_label(program, &node.kind),
                shape,
                value
            );
        }
    }
    let exprs = namer.expressions();
    if !exprs.is_empty() {
        let _ = writeln!(out, "exprs");
        for (name, expr) in exprs {
            let _ = writeln!(out, "  {name} = {expr}");
        }
    }
    out
}

/// Only the expression table of `dump`.
pub fn dump_exprs(program: &Program, entry: GraphId) -> String {
    let text = dump(program, entry);
    match text.split_once("exprs\n") {
        Some((_, table)) => table.to_string(),
        None => String::new(),
    }
}

// ── Fingerprint ─────────────────────────────────────────────────────────────

/// SHA-256 of the canonical dump, as 64 hex characters.
pub fn fingerprint(program: &Program, entry: GraphId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dump(program, entry).as_bytes());
    bytes_to_hex(&hasher.finalize())
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── JSON report ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub name: String,
    pub kind: String,
    pub depend: DependStatus,
    pub shape: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphReport {
    pub name: String,
    pub state: Option<EngineState>,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Serialize)]
pub struct ExprReport {
    pub name: String,
    pub expr: String,
}

#[derive(Debug, Serialize)]
pub struct SymbolReport {
    pub entry: String,
    pub fingerprint: String,
    pub graphs: Vec<GraphReport>,
    pub expressions: Vec<ExprReport>,
    pub stats: Option<BuildStats>,
    pub diagnostics: Vec<String>,
}

/// Structured report of a build, serializable with serde.
pub fn report(program: &Program, entry: GraphId, build: Option<&BuildReport>) -> SymbolReport {
    let mut namer = SymbolNamer::new();
    let mut graphs = Vec::new();
    for g in program.reachable_graphs(entry) {
        let Some(graph) = program.graph(g) else {
            continue;
        };
        let engine = graph.engine();
        let nodes = graph
            .nodes
            .iter()
            .filter_map(|&id| program.node(id))
            .map(|node| NodeReport {
                id: node.id,
                name: node.label(),
                kind: kind_label(program, &node.kind),
                depend: engine.map(|e| e.depend_status(node.id)).unwrap_or_default(),
                shape: node.symbolic_shape.as_ref().map(|s| namer.list(s)),
                value: node.symbolic_value.as_ref().map(|v| namer.symbol(v)),
            })
            .collect();
        graphs.push(GraphReport {
            name: graph.name.clone(),
            state: engine.map(|e| e.state()),
            nodes,
        });
    }
    let expressions = namer
        .expressions()
        .into_iter()
        .map(|(name, expr)| ExprReport { name, expr })
        .collect();
    SymbolReport {
        entry: program
            .graph(entry)
            .map_or_else(|| entry.to_string(), |g| g.name.clone()),
        fingerprint: fingerprint(program, entry),
        graphs,
        expressions,
        stats: build.map(|b| b.stats),
        diagnostics: build
            .map(|b| b.diagnostics.iter().map(ToString::to_string).collect())
            .unwrap_or_default(),
    }
}

/// `report` rendered as pretty JSON.
pub fn report_json(program: &Program, entry: GraphId, build: Option<&BuildReport>) -> String {
    serde_json::to_string_pretty(&report(program, entry, build))
        .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
