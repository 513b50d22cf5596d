// call.rs — Subgraph calls: demand across the boundary, parameter seeding
//
// A call node is not handled by an `OperationRule`. During PreBuild the
// builder enters the callee with the call's own demand seeded on the callee
// output, then merges each parameter's resulting demand into the matching
// argument. During BuildImpl it seeds the callee's parameters from the
// arguments' symbols, builds the callee, and makes the call node an alias of
// the callee output.
//
// A call through a partial application works the same way on the completed
// argument list: the closure's bound arguments fill the leading parameters
// and the call-site operands fill the rest, starting at the closure's offset.
//
// Seeding goes through a per-call `InputParamMap` so that two parameters
// whose arguments carry the same unknown quantity receive the same symbol
// inside the callee. Every seeded unknown is bound to the argument symbol it
// came from, so it stays `equals_to` that symbol across the boundary.
//
// Preconditions: the caller graph is pre-built; call arity (bound plus
//   call-site arguments) was validated by `Program::topo_order`.
// Postconditions: a callee is built at most once per build. Later call sites
//   reuse its engine and alias its output (first caller wins).
// Failure modes: re-entering a graph whose engine is still in progress →
//   `BuildError::RecursiveCall`. Kind mismatches between argument and
//   parameter are warnings; the parameter falls back to its declared type.
// Side effects: attaches engines to callees; writes parameter and call node
//   symbols; pushes W0101/W0102 diagnostics.

use crate::abstract_type::AbstractType;
use crate::diag::{codes, Diagnostic};
use crate::engine::{BuildError, Builder, EngineState};
use crate::id::{GraphId, NodeId};
use crate::program::Application;
use crate::rule::DependStatus;
use crate::symbol::{BoolSymbol, IntSymbol, ListSymbol, Symbol};

// ── InputParamMap ───────────────────────────────────────────────────────────

/// Correlation table for one call: argument-side symbol → parameter-side
/// symbol. Built fresh per call and dropped afterwards.
#[derive(Debug, Default)]
pub struct InputParamMap {
    pairs: Vec<(Symbol, Symbol)>,
}

impl InputParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter-side symbol recorded for an argument symbol `equals_to` `outer`.
    pub fn lookup(&self, outer: &Symbol) -> Option<&Symbol> {
        self.pairs
            .iter()
            .find(|(arg, _)| arg.equals_to(outer))
            .map(|(_, param)| param)
    }

    /// Symbol to use inside the callee for the argument symbol `outer`.
    ///
    /// Concrete symbols pass through unchanged. An unknown already seen in
    /// this call reuses its parameter symbol; a new one gets a fresh symbol
    /// bound to `outer`, which is recorded.
    pub fn seed_symbol(&mut self, outer: &Symbol) -> Symbol {
        if let Symbol::List(list) = outer {
            return self.seed_list(list).into();
        }
        if outer.has_data() {
            return outer.clone();
        }
        if let Some(found) = self.lookup(outer) {
            return found.clone();
        }
        let fresh: Symbol = match outer {
            Symbol::Int(s) => IntSymbol::bound_to(s).into(),
            Symbol::Bool(s) => BoolSymbol::bound_to(s).into(),
            Symbol::List(s) => self.seed_list(s).into(),
        };
        self.pairs.push((outer.clone(), fresh.clone()));
        fresh
    }

    /// Seed every item of `outer`. A dynamic-length list yields a fresh
    /// dynamic list; a list whose items all pass through unchanged is
    /// reused as is.
    pub fn seed_list(&mut self, outer: &ListSymbol) -> ListSymbol {
        let Some(items) = outer.items() else {
            return ListSymbol::dynamic();
        };
        let seeded: Vec<Symbol> = items.iter().map(|s| self.seed_symbol(s)).collect();
        if seeded.iter().zip(items).all(|(a, b)| a.is_same_instance(b)) {
            return outer.clone();
        }
        ListSymbol::new(seeded)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Whether a shape symbol fits the shape form a declared type expects.
fn shape_kind_matches(ty: &AbstractType, shape: &ListSymbol) -> bool {
    let Some(items) = shape.items() else {
        return !matches!(ty, AbstractType::Scalar(_));
    };
    match ty {
        AbstractType::Tensor { shape: declared, .. } => {
            items.iter().all(|s| s.as_int().is_some())
                && declared.as_ref().map_or(true, |d| d.len() == items.len())
        }
        AbstractType::Scalar(_) => items.is_empty(),
        AbstractType::Tuple(elems) => {
            elems.len() == items.len() && items.iter().all(|s| s.as_list().is_some())
        }
        AbstractType::Opaque => false,
    }
}

// ── Call handling ───────────────────────────────────────────────────────────

impl Builder<'_> {
    /// PreBuild side of a call: enter the callee (or reuse its engine) and
    /// push its parameters' demand onto the application's arguments.
    pub(crate) fn pre_build_call(
        &mut self,
        graph: GraphId,
        call: NodeId,
        app: &Application,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        let callee = app.callee;
        match self.engine_state(callee) {
            Some(EngineState::PreBuilding | EngineState::Building) => {
                return Err(BuildError::RecursiveCall {
                    graph: self.graph_name(callee),
                    node: call,
                });
            }
            Some(_) => {
                tracing::trace!(callee = %self.graph_name(callee), call = %call, "reusing callee engine");
            }
            None => {
                self.engine_mut(graph)?.stats_mut().subgraphs_entered += 1;
                self.pre_build(callee, Some(graph), status)?;
            }
        }

        let params = self
            .program
            .graph(callee)
            .map(|g| g.params.clone())
            .ok_or(BuildError::UnknownGraph(callee))?;
        for (&arg, param) in app.args.iter().zip(params) {
            let need = self.depend_of(callee, param);
            self.demand(graph, arg, need)?;
        }
        Ok(())
    }

    /// BuildImpl side of a call.
    pub(crate) fn build_call(
        &mut self,
        call: NodeId,
        app: &Application,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        self.enter_callee(call, app)?;
        self.alias_output(call, app.callee, status)
    }

    /// Seed and build the callee of `app` unless an earlier caller did.
    pub(crate) fn enter_callee(&mut self, call: NodeId, app: &Application) -> Result<(), BuildError> {
        match self.engine_state(app.callee) {
            None => Err(BuildError::DetachedEngine(app.callee)),
            Some(EngineState::PreBuilt) => {
                self.seed_params(call, app)?;
                self.build_impl(app.callee, Some(call))
            }
            Some(EngineState::Built) => Ok(()),
            Some(EngineState::PreBuilding | EngineState::Building) => {
                Err(BuildError::RecursiveCall {
                    graph: self.graph_name(app.callee),
                    node: call,
                })
            }
        }
    }

    /// Seed every demanded parameter of the callee from the arguments of `app`.
    pub(crate) fn seed_params(&mut self, call: NodeId, app: &Application) -> Result<(), BuildError> {
        let callee = app.callee;
        let params = self
            .program
            .graph(callee)
            .map(|g| g.params.clone())
            .ok_or(BuildError::UnknownGraph(callee))?;

        let mut map = InputParamMap::new();
        let mut warnings = Vec::new();
        let mut seeded = 0;
        for (&arg, param) in app.args.iter().zip(params) {
            let need = self.depend_of(callee, param);
            if need.is_none() {
                continue;
            }
            let arg_node = self.program.node(arg).ok_or(BuildError::UnknownNode(arg))?;
            let param_node = self.program.node(param).ok_or(BuildError::UnknownNode(param))?;
            let ty = &param_node.abstract_type;
            let label = param_node.label();
            let span = param_node.span;

            let shape = if !need.shape {
                None
            } else if !ty.has_shape_form() {
                warnings.push(
                    Diagnostic::warning(
                        span,
                        format!("parameter `{label}` of type `{ty}` has no symbolic shape"),
                    )
                    .with_code(codes::W0102),
                );
                ty.default_shape()
            } else {
                match &arg_node.symbolic_shape {
                    None => ty.default_shape(),
                    Some(s) if !shape_kind_matches(ty, s) => {
                        warnings.push(kind_mismatch(&label, ty, "shape", &s.to_string(), span));
                        ty.default_shape()
                    }
                    Some(s) if s.is_dyn_len() => Some(ListSymbol::dynamic()),
                    Some(s) => Some(map.seed_list(s)),
                }
            };

            let value = if !need.value {
                None
            } else {
                match &arg_node.symbolic_value {
                    None => ty.default_value(),
                    Some(v) if ty.value_kind() != Some(v.kind()) => {
                        warnings.push(kind_mismatch(&label, ty, "value", &v.to_string(), span));
                        ty.default_value()
                    }
                    Some(v) => Some(map.seed_symbol(v)),
                }
            };

            let param_node = self.program.node_mut(param).ok_or(BuildError::UnknownNode(param))?;
            if need.shape {
                param_node.symbolic_shape = shape;
            }
            if need.value {
                param_node.symbolic_value = value;
            }
            seeded += 1;
        }
        tracing::debug!(
            callee = %self.graph_name(callee),
            call = %call,
            offset = app.offset,
            params = seeded,
            correlated = map.len(),
            "seeded parameters"
        );
        for w in &warnings {
            tracing::warn!("{}", w.message);
        }
        self.diagnostics.extend(warnings);
        self.engine_mut(callee)?.stats_mut().params_seeded += seeded;
        Ok(())
    }

    /// Make `call` carry exactly the callee output's symbols.
    pub(crate) fn alias_output(
        &mut self,
        call: NodeId,
        callee: GraphId,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        let output = self
            .program
            .graph(callee)
            .and_then(|g| g.output)
            .ok_or_else(|| BuildError::MissingOutput {
                graph: self.graph_name(callee),
            })?;
        let out = self.program.node(output).ok_or(BuildError::UnknownNode(output))?;
        let shape = out.symbolic_shape.clone();
        let value = out.symbolic_value.clone();
        let node = self.program.node_mut(call).ok_or(BuildError::UnknownNode(call))?;
        if status.shape {
            node.symbolic_shape = shape;
        }
        if status.value {
            node.symbolic_value = value;
        }
        Ok(())
    }
}

fn kind_mismatch(
    label: &str,
    ty: &AbstractType,
    facet: &str,
    found: &str,
    span: Option<crate::ast::Span>,
) -> Diagnostic {
    Diagnostic::warning(
        span,
        format!("argument {facet} `{found}` does not fit parameter `{label}: {ty}`"),
    )
    .with_code(codes::W0101)
    .with_hint("the parameter falls back to its declared type")
}
