// switch.rs — Conditional join: both branches built, outputs merged
//
// A switch node picks one of two closures on a condition and applies it to
// its remaining operands. Symbol inference cannot know which branch runs, so
// PreBuild demands the condition's value and enters both branch callees with
// the switch's own demand; BuildImpl builds both through the same builder
// and joins their outputs.
//
// Join: a condition with a known value selects its branch outright.
// Otherwise a facet both branches agree on (`equals_to`) is kept as is.
// Shapes of equal rank keep the dimensions that agree and get a fresh
// unknown where they differ; shapes of different rank join to a dynamic
// list. Values that differ join to a fresh unknown of the same kind.
//
// Preconditions: as for calls; `Program::topo_order` checked that both
//   branches are partial applications completed by the switch operands.
// Postconditions: both branch callees are built; the switch node holds the
//   joined symbols for each demanded facet.
// Failure modes: a branch re-entering an in-progress graph →
//   `BuildError::RecursiveCall`.
// Side effects: as for calls.

use crate::engine::{BuildError, Builder};
use crate::id::{GraphId, NodeId};
use crate::rule::DependStatus;
use crate::symbol::{BoolSymbol, IntSymbol, ListSymbol, Symbol};

// ── Join ────────────────────────────────────────────────────────────────────

/// Join of two symbols, or `None` when their kinds differ.
pub fn join_symbol(a: &Symbol, b: &Symbol) -> Option<Symbol> {
    if a.equals_to(b) {
        return Some(a.clone());
    }
    match (a, b) {
        (Symbol::Int(_), Symbol::Int(_)) => Some(IntSymbol::unknown().into()),
        (Symbol::Bool(_), Symbol::Bool(_)) => Some(BoolSymbol::unknown().into()),
        (Symbol::List(x), Symbol::List(y)) => Some(join_list(x, y).into()),
        _ => None,
    }
}

/// Join of two lists, item by item when their lengths agree.
pub fn join_list(a: &ListSymbol, b: &ListSymbol) -> ListSymbol {
    if a.equals_to(b) {
        return a.clone();
    }
    let (Some(xs), Some(ys)) = (a.items(), b.items()) else {
        return ListSymbol::dynamic();
    };
    if xs.len() != ys.len() {
        return ListSymbol::dynamic();
    }
    xs.iter()
        .zip(ys)
        .map(|(x, y)| join_symbol(x, y))
        .collect::<Option<Vec<_>>>()
        .map_or_else(ListSymbol::dynamic, ListSymbol::new)
}

/// Truth value of a condition symbol, if known. Integers count as true when
/// nonzero.
fn condition_value(cond: &Symbol) -> Option<bool> {
    match cond {
        Symbol::Bool(b) => b.value(),
        Symbol::Int(i) => i.value().map(|v| v != 0),
        Symbol::List(_) => None,
    }
}

// ── Switch handling ─────────────────────────────────────────────────────────

impl Builder<'_> {
    /// PreBuild side of a switch: value demand on the condition, then both
    /// branch callees entered as calls.
    pub(crate) fn pre_build_switch(
        &mut self,
        graph: GraphId,
        switch: NodeId,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        let cond = self.switch_condition(switch)?;
        self.demand(graph, cond, DependStatus::VALUE)?;
        for app in self.program.applications(switch)? {
            self.pre_build_call(graph, switch, &app, status)?;
        }
        Ok(())
    }

    /// BuildImpl side of a switch.
    pub(crate) fn build_switch(
        &mut self,
        switch: NodeId,
        status: DependStatus,
    ) -> Result<(), BuildError> {
        let apps = self.program.applications(switch)?;
        let mut outputs = Vec::with_capacity(apps.len());
        for app in &apps {
            self.enter_callee(switch, app)?;
            outputs.push(self.output_symbols(app.callee)?);
        }
        let [(then_shape, then_value), (else_shape, else_value)] = <[_; 2]>::try_from(outputs)
            .map_err(|found: Vec<_>| BuildError::MissingOperands {
                node: switch,
                expected: 3,
                found: found.len() + 1,
            })?;

        let cond = self.switch_condition(switch)?;
        let taken = self
            .program
            .symbolic_value(cond)
            .and_then(condition_value);
        let node = self
            .program
            .node(switch)
            .ok_or(BuildError::UnknownNode(switch))?;
        let ty = node.abstract_type.clone();
        let label = node.label();

        let (shape, value) = match taken {
            Some(true) => (then_shape, then_value),
            Some(false) => (else_shape, else_value),
            None => {
                let shape = match (&then_shape, &else_shape) {
                    (Some(a), Some(b)) => Some(join_list(a, b)),
                    _ => ty.default_shape(),
                };
                let value = match (&then_value, &else_value) {
                    (Some(a), Some(b)) => join_symbol(a, b).or_else(|| ty.default_value()),
                    _ => ty.default_value(),
                };
                (shape, value)
            }
        };
        tracing::debug!(node = %label, taken = ?taken, "joined switch branches");

        let node = self
            .program
            .node_mut(switch)
            .ok_or(BuildError::UnknownNode(switch))?;
        if status.shape {
            node.symbolic_shape = shape;
        }
        if status.value {
            node.symbolic_value = value;
        }
        Ok(())
    }

    fn switch_condition(&self, switch: NodeId) -> Result<NodeId, BuildError> {
        let node = self
            .program
            .node(switch)
            .ok_or(BuildError::UnknownNode(switch))?;
        node.inputs
            .first()
            .copied()
            .ok_or(BuildError::MissingOperands {
                node: switch,
                expected: 3,
                found: 0,
            })
    }

    fn output_symbols(
        &self,
        graph: GraphId,
    ) -> Result<(Option<ListSymbol>, Option<Symbol>), BuildError> {
        let output = self
            .program
            .graph(graph)
            .and_then(|g| g.output)
            .ok_or_else(|| BuildError::MissingOutput {
                graph: self.graph_name(graph),
            })?;
        let out = self
            .program
            .node(output)
            .ok_or(BuildError::UnknownNode(output))?;
        Ok((out.symbolic_shape.clone(), out.symbolic_value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_type::{AbstractType, ConstValue, DType, UNKNOWN_DIM};
    use crate::engine::build;
    use crate::program::Program;
    use crate::rule::global;

    fn f32_tensor(shape: &[i64]) -> AbstractType {
        AbstractType::tensor(DType::F32, shape)
    }

    #[test]
    fn join_keeps_agreeing_dims() {
        let n = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(4)]);
        let b = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(8)]);
        let j = join_list(&a, &b);
        let dims = j.dims().unwrap();
        assert!(dims[0].equals_to(&n));
        assert!(!dims[1].has_data());
        assert!(join_list(&a, &a).is_same_instance(&a));
    }

    #[test]
    fn join_of_different_ranks_is_dynamic() {
        let a = ListSymbol::from_shape(&[2, 3]);
        let b = ListSymbol::from_shape(&[6]);
        assert!(join_list(&a, &b).is_dyn_len());
        assert!(join_list(&a, &ListSymbol::dynamic()).is_dyn_len());
    }

    #[test]
    fn join_of_mismatched_kinds_is_none() {
        let i: Symbol = IntSymbol::constant(1).into();
        let b: Symbol = BoolSymbol::constant(true).into();
        assert!(join_symbol(&i, &b).is_none());
        let c: Symbol = IntSymbol::constant(2).into();
        let j = join_symbol(&i, &c).unwrap();
        assert!(j.as_int().is_some_and(|s| !s.has_data()));
    }

    /// `main(c, x) = switch(c, partial a(), partial b())(x)`, where `a` keeps
    /// the shape of its parameter and `b` transposes it.
    fn branchy(cond: Option<bool>) -> (Program, GraphId, NodeId, NodeId, NodeId, NodeId) {
        let mut p = Program::new();
        let a = p.add_graph("a");
        let qa = p.add_parameter(a, f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]));
        let ra = p.add_op(a, "Relu", vec![qa], f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]));
        p.set_output(a, ra);
        let b = p.add_graph("b");
        let qb = p.add_parameter(b, f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]));
        let mut attrs = crate::abstract_type::Attrs::new();
        attrs.insert("perm".into(), crate::abstract_type::Attr::Ints(vec![1, 0]));
        let rb = p.add_op_with_attrs(
            b,
            "Transpose",
            vec![qb],
            attrs,
            f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]),
        );
        p.set_output(b, rb);

        let main = p.add_graph("main");
        let c = match cond {
            Some(v) => p.add_constant(main, ConstValue::Bool(v)),
            None => p.add_parameter(main, AbstractType::Scalar(DType::Bool)),
        };
        let x = p.add_parameter(main, f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]));
        let ka = p.add_partial(main, Some(a), vec![]);
        let kb = p.add_partial(main, Some(b), vec![]);
        let s = p.add_switch(main, c, [ka, kb], vec![x], f32_tensor(&[UNKNOWN_DIM, UNKNOWN_DIM]));
        p.set_output(main, s);
        (p, main, c, x, s, ra)
    }

    #[test]
    fn unknown_condition_builds_both_branches_and_joins() {
        let (mut p, main, c, x, s, _) = branchy(None);
        let report = build(&mut p, main, global()).unwrap();
        assert_eq!(report.graphs.len(), 3);
        assert_eq!(report.stats.subgraphs_entered, 2);
        assert!(p.engine(main).unwrap().is_depend_value(c));
        let xs = p.symbolic_shape(x).unwrap().dims().unwrap();
        let ss = p.symbolic_shape(s).unwrap().dims().unwrap();
        // [n, m] against [m, n]: only the rank survives.
        assert_eq!(ss.len(), 2);
        assert!(!ss[0].equals_to(&xs[0]) && !ss[0].equals_to(&xs[1]));
    }

    #[test]
    fn known_condition_selects_its_branch() {
        let (mut p, main, _c, x, s, ra) = branchy(Some(true));
        build(&mut p, main, global()).unwrap();
        assert!(p.symbolic_shape(s).unwrap().is_same_instance(p.symbolic_shape(ra).unwrap()));
        assert!(p.symbolic_shape(s).unwrap().equals_to(p.symbolic_shape(x).unwrap()));

        let (mut p, main, _c, x, s, _) = branchy(Some(false));
        build(&mut p, main, global()).unwrap();
        let xs = p.symbolic_shape(x).unwrap().dims().unwrap();
        let ss = p.symbolic_shape(s).unwrap().dims().unwrap();
        assert!(ss[0].equals_to(&xs[1]) && ss[1].equals_to(&xs[0]));
    }

    #[test]
    fn same_callee_in_both_branches_keeps_shape() {
        let mut p = Program::new();
        let g = p.add_graph("g");
        let q = p.add_parameter(g, f32_tensor(&[UNKNOWN_DIM, 16]));
        p.set_output(g, q);
        let main = p.add_graph("main");
        let c = p.add_parameter(main, AbstractType::Scalar(DType::Bool));
        let x = p.add_parameter(main, f32_tensor(&[UNKNOWN_DIM, 16]));
        let y = p.add_parameter(main, f32_tensor(&[UNKNOWN_DIM, 16]));
        let kx = p.add_partial(main, Some(g), vec![x]);
        let ky = p.add_partial(main, Some(g), vec![y]);
        let s = p.add_switch(main, c, [kx, ky], vec![], f32_tensor(&[UNKNOWN_DIM, 16]));
        p.set_output(main, s);
        build(&mut p, main, global()).unwrap();
        // First caller wins: both branches alias the callee built from `x`.
        assert!(p.symbolic_shape(s).unwrap().equals_to(p.symbolic_shape(x).unwrap()));
        assert_eq!(p.engine(g).unwrap().stats().params_seeded, 1);
    }

    #[test]
    fn recursive_branch_is_fatal() {
        let mut p = Program::new();
        let g = p.add_graph("loop");
        let c = p.add_parameter(g, AbstractType::Scalar(DType::Bool));
        let k = p.add_partial(g, Some(g), vec![c]);
        let s = p.add_switch(g, c, [k, k], vec![], AbstractType::Scalar(DType::Bool));
        p.set_output(g, s);
        let err = build(&mut p, g, global()).unwrap_err();
        assert!(matches!(err, BuildError::RecursiveCall { node, .. } if node == s));
        assert!(!p.has_engine(g));
    }
}
