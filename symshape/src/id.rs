// id.rs — Stable identifiers for graphs, nodes and symbols
//
// Graph and node IDs are allocated in construction order by the owning
// `Program`, so a NodeId is unique across every graph of that program and
// per-node tables can be keyed by NodeId alone. Symbol IDs come from a
// process-wide counter: two symbols built anywhere never share an ID.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Index of a graph inside its `Program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphId(pub u32);

/// Identifier of a node, unique across all graphs of a `Program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Identity of a symbol instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub u64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// Monotonic, never reused.
static SYMBOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_symbol_id() -> SymbolId {
    SymbolId(SYMBOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Allocator for graph and node IDs. Produces monotonically increasing IDs
/// in allocation order, ensuring deterministic assignment.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_graph: u32,
    next_node: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_graph(&mut self) -> GraphId {
        let id = GraphId(self.next_graph);
        self.next_graph += 1;
        id
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }
}
