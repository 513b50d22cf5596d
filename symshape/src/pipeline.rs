// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact for one .sym source and runs the minimal set of
// passes for a given terminal PassId.
//
// Preconditions: the AST must be set (via `CompilationState::new`) before
//   calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or
//   has_error is set.
// Failure modes: any pass emitting error-level diagnostics; a structural
//   build error is converted to an E0200 diagnostic.
// Side effects: calls on_pass_complete after each pass for immediate display;
//   prints pass timings to stderr when verbose.

use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ast;
use crate::diag::{codes, Diagnostic};
use crate::dump::bytes_to_hex;
use crate::engine::BuildReport;
use crate::id::GraphId;
use crate::pass::{descriptor, required_passes, PassId};
use crate::program::Program;
use crate::redundancy::Findings;
use crate::rule::RuleRegistry;

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for `--emit build-info`.
///
/// `source_hash`: SHA-256 of the raw `.sym` source text.
/// `rules_fingerprint`: SHA-256 of the sorted, newline-joined op names the
/// rule registry covers.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub rules_fingerprint: [u8; 32],
    pub rule_count: usize,
    pub engine_version: &'static str,
}

#[derive(Serialize)]
struct ProvenanceJson<'a> {
    source_hash: String,
    rules_fingerprint: String,
    rule_count: usize,
    engine_version: &'a str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the rules fingerprint (64 characters).
    pub fn rules_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.rules_fingerprint)
    }

    pub fn to_json(&self) -> String {
        let json = ProvenanceJson {
            source_hash: self.source_hash_hex(),
            rules_fingerprint: self.rules_fingerprint_hex(),
            rule_count: self.rule_count,
            engine_version: self.engine_version,
        };
        let mut s = serde_json::to_string_pretty(&json).unwrap_or_default();
        s.push('\n');
        s
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Compute provenance from source text and the rule registry in use.
pub fn compute_provenance(source: &str, rules: &RuleRegistry) -> Provenance {
    let canonical = rules.op_names().join("\n");
    Provenance {
        source_hash: sha256(source.as_bytes()),
        rules_fingerprint: sha256(canonical.as_bytes()),
        rule_count: rules.len(),
        engine_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Parsing ────────────────────────────────────────────────────────────────

/// Parse `source`, converting lexer and parser errors to E0001 diagnostics.
pub fn parse_source(source: &str) -> Result<ast::Program, Vec<Diagnostic>> {
    let result = crate::parser::parse(source);
    if !result.errors.is_empty() {
        return Err(result
            .errors
            .iter()
            .map(|e| Diagnostic::error(Some(*e.span()), e.to_string()).with_code(codes::E0001))
            .collect());
    }
    result
        .program
        .ok_or_else(|| vec![Diagnostic::error(None, "parse failed with no output").with_code(codes::E0001)])
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Knobs shared by every pass.
pub struct PipelineOptions<'a> {
    /// Entry graph name; `None` picks `main`, else the last graph.
    pub entry: Option<&'a str>,
    pub rules: &'a RuleRegistry,
    pub verbose: bool,
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub ast: ast::Program,
    pub program: Option<Program>,
    pub entry: Option<GraphId>,
    pub build: Option<BuildReport>,
    pub findings: Option<Findings>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(ast: ast::Program) -> Self {
        Self {
            ast,
            program: None,
            entry: None,
            build: None,
            findings: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
}

// ── Per-pass bookkeeping ───────────────────────────────────────────────────

/// Callback, accumulate, verbose, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = diags.iter().any(Diagnostic::is_error);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "symc: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Preconditions: `state.ast` is set.
/// Postconditions: artifacts for all passes in `required_passes(terminal)`
///   are populated, or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics.
/// Side effects: calls `on_pass_complete` after each pass.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions<'_>,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = match pass_id {
            PassId::Resolve => run_resolve(state, options.entry),
            PassId::Build => run_build(state, options.rules),
            PassId::Redundancy => run_redundancy(state),
        };
        finish_pass(
            state,
            pass_id,
            diags,
            t.elapsed(),
            options.verbose,
            &mut on_pass_complete,
        )?;
    }
    Ok(())
}

fn run_resolve(state: &mut CompilationState, entry: Option<&str>) -> Vec<Diagnostic> {
    let result = crate::resolve::resolve(&state.ast);
    let mut diags = result.diagnostics;
    if !diags.iter().any(Diagnostic::is_error) {
        match crate::resolve::entry_graph(&result.program, entry) {
            Ok(id) => state.entry = Some(id),
            Err(d) => diags.push(d),
        }
    }
    state.program = Some(result.program);
    diags
}

fn run_build(state: &mut CompilationState, rules: &RuleRegistry) -> Vec<Diagnostic> {
    let (Some(program), Some(entry)) = (state.program.as_mut(), state.entry) else {
        return vec![Diagnostic::error(None, "build requested before resolve").with_code(codes::E0200)];
    };
    match crate::engine::build(program, entry, rules) {
        Ok(report) => {
            let diags = report.diagnostics.clone();
            state.build = Some(report);
            diags
        }
        Err(e) => vec![e.to_diagnostic(program)],
    }
}

fn run_redundancy(state: &mut CompilationState) -> Vec<Diagnostic> {
    if let (Some(program), Some(entry)) = (state.program.as_ref(), state.entry) {
        state.findings = Some(crate::redundancy::analyze(program, entry));
    }
    Vec::new()
}
