// infer.rs — Concrete shapes from built symbols and actual input shapes
//
// After a build, every dimension is a constant, an unknown, or an expression
// over unknowns. Given the concrete shapes of the entry graph's parameters,
// `infer` binds the unknowns those parameters carry and evaluates the shape
// of every annotated node in every reachable graph, without rebuilding.
// Callee parameter dimensions are bound to their call-site arguments, so one
// binding at the entry serves all graphs.
//
// Preconditions: the entry graph was built (its engine is `Built`).
// Postconditions: every annotated node whose shape involves only bound
//   unknowns gets a concrete shape; annotated nodes that still depend on an
//   unbound unknown, or have dynamic rank, are listed as unresolved.
// Failure modes: wrong input count, rank mismatch, a size that contradicts a
//   constant or derived dimension, or one unknown given two sizes →
//   `InferError`.
// Side effects: none; symbols are read, never written.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::engine::EngineState;
use crate::id::{GraphId, NodeId};
use crate::program::Program;
use crate::symbol::{IntDef, IntSymbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferError {
    NotBuilt { graph: String },
    InputCount { expected: usize, found: usize },
    RankMismatch { param: String, expected: usize, found: usize },
    DimMismatch { param: String, axis: usize, expected: i64, found: i64 },
    Conflict { param: String, axis: usize, bound: i64, found: i64 },
    NegativeDim { param: String, axis: usize, found: i64 },
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferError::NotBuilt { graph } => {
                write!(f, "graph '{graph}' has no built symbols")
            }
            InferError::InputCount { expected, found } => {
                write!(f, "expected {expected} input shape(s), found {found}")
            }
            InferError::RankMismatch {
                param,
                expected,
                found,
            } => write!(f, "input '{param}' has rank {expected}, given rank {found}"),
            InferError::DimMismatch {
                param,
                axis,
                expected,
                found,
            } => write!(
                f,
                "input '{param}' axis {axis} must be {expected}, given {found}"
            ),
            InferError::Conflict {
                param,
                axis,
                bound,
                found,
            } => write!(
                f,
                "input '{param}' axis {axis} is the same dimension as one already given {bound}, given {found}"
            ),
            InferError::NegativeDim { param, axis, found } => {
                write!(f, "input '{param}' axis {axis} has negative size {found}")
            }
        }
    }
}

impl std::error::Error for InferError {}

/// Concrete shapes for one set of entry inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inference {
    pub shapes: BTreeMap<NodeId, Vec<i64>>,
    /// Annotated nodes whose shape could not be made concrete.
    pub unresolved: Vec<NodeId>,
}

impl Inference {
    pub fn shape(&self, node: NodeId) -> Option<&[i64]> {
        self.shapes.get(&node).map(Vec::as_slice)
    }

    /// One block per reachable graph, entry first; `?` marks unresolved nodes.
    pub fn render(&self, program: &Program, entry: GraphId) -> String {
        let mut out = String::new();
        for g in program.reachable_graphs(entry) {
            let Some(graph) = program.graph(g) else {
                continue;
            };
            out.push_str(&format!("graph {}\n", graph.name));
            for &id in &graph.nodes {
                let Some(node) = program.node(id) else {
                    continue;
                };
                if let Some(shape) = self.shapes.get(&id) {
                    out.push_str(&format!("  {}: {:?}\n", node.label(), shape));
                } else if self.unresolved.contains(&id) {
                    out.push_str(&format!("  {}: ?\n", node.label()));
                }
            }
        }
        out
    }
}

pub fn infer(
    program: &Program,
    entry: GraphId,
    inputs: &[Vec<i64>],
) -> Result<Inference, InferError> {
    let graph = program.graph(entry).ok_or_else(|| InferError::NotBuilt {
        graph: entry.to_string(),
    })?;
    if program.engine(entry).map(|e| e.state()) != Some(EngineState::Built) {
        return Err(InferError::NotBuilt {
            graph: graph.name.clone(),
        });
    }
    if graph.params.len() != inputs.len() {
        return Err(InferError::InputCount {
            expected: graph.params.len(),
            found: inputs.len(),
        });
    }

    let mut env = HashMap::new();
    // Derived dims can only be checked once every unknown is bound.
    let mut derived: Vec<(String, usize, IntSymbol, i64)> = Vec::new();
    for (&param, sizes) in graph.params.iter().zip(inputs) {
        let Some(node) = program.node(param) else {
            continue;
        };
        // Unannotated or dynamic-rank parameters bind nothing.
        let Some(dims) = node.symbolic_shape.as_ref().and_then(|s| s.dims()) else {
            continue;
        };
        let name = node.label();
        if dims.len() != sizes.len() {
            return Err(InferError::RankMismatch {
                param: name,
                expected: dims.len(),
                found: sizes.len(),
            });
        }
        for (axis, (dim, &size)) in dims.iter().zip(sizes).enumerate() {
            if size < 0 {
                return Err(InferError::NegativeDim {
                    param: name,
                    axis,
                    found: size,
                });
            }
            let canon = dim.canonical();
            match canon.def() {
                IntDef::Const(v) if *v != size => {
                    return Err(InferError::DimMismatch {
                        param: name,
                        axis,
                        expected: *v,
                        found: size,
                    });
                }
                IntDef::Const(_) => {}
                IntDef::Unknown | IntDef::Bound(_) => {
                    if let Some(bound) = env.insert(canon.id(), size) {
                        if bound != size {
                            return Err(InferError::Conflict {
                                param: name,
                                axis,
                                bound,
                                found: size,
                            });
                        }
                    }
                }
                IntDef::Expr { .. } => derived.push((name.clone(), axis, canon.clone(), size)),
            }
        }
    }
    for (param, axis, dim, size) in derived {
        match dim.evaluate(&env) {
            Some(expected) if expected != size => {
                return Err(InferError::DimMismatch {
                    param,
                    axis,
                    expected,
                    found: size,
                });
            }
            _ => {}
        }
    }

    let mut inference = Inference::default();
    for g in program.reachable_graphs(entry) {
        let Some(graph) = program.graph(g) else {
            continue;
        };
        for &id in &graph.nodes {
            let Some(shape) = program.symbolic_shape(id) else {
                continue;
            };
            // Tuple shapes hold lists, not dims; their elements are nodes of
            // their own.
            if shape.dims().is_none() && shape.items().is_some() {
                continue;
            }
            match shape.evaluate(&env) {
                Some(concrete) => {
                    inference.shapes.insert(id, concrete);
                }
                None => inference.unresolved.push(id),
            }
        }
    }
    tracing::debug!(
        graph = %graph.name,
        bound = env.len(),
        resolved = inference.shapes.len(),
        unresolved = inference.unresolved.len(),
        "inferred concrete shapes"
    );
    Ok(inference)
}
