// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the three passes that run after parsing (parse is outside the
// runner), their dependency edges, and the artifacts they produce. The
// pipeline runner uses this to compute the minimal pass subset for each
// --emit target.
//
// Preconditions: none (static tables).
// Postconditions: `required_passes` returns passes in execution order.
// Failure modes: none.
// Side effects: none.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each pass (parse excluded, handled before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Resolve,
    Build,
    Redundancy,
}

/// Machine-readable artifact identifiers. Each maps to a field of
/// `CompilationState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Program,  // program::Program
    Entry,    // GraphId
    Symbols,  // BuildReport + symbols stored on nodes
    Findings, // redundancy::Findings
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name used in verbose output.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[],
            outputs: &[ArtifactId::Program, ArtifactId::Entry],
        },
        PassId::Build => PassDescriptor {
            name: "build",
            inputs: &[PassId::Resolve],
            outputs: &[ArtifactId::Symbols],
        },
        PassId::Redundancy => PassDescriptor {
            name: "redundancy",
            inputs: &[PassId::Build],
            outputs: &[ArtifactId::Findings],
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 3] = [PassId::Resolve, PassId::Build, PassId::Redundancy];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
