// builtin_rules.rs — Built-in operation rule catalog
//
// Shape and value rules for the operations the `.sym` front end and the
// demos use. Each rule reads only the facets its depend lists request;
// anything it cannot decide yields `None`, which the engine turns into the
// node's declared-type fallback.
//
// Preconditions: called once while constructing a `RuleRegistry`.
// Postconditions: every operation listed here is registered.
// Failure modes: none.
// Side effects: none.

use crate::rule::{DependOn, OperationRule, RuleContext, RuleRegistry};
use crate::symbol::{IntOp, IntSymbol, ListSymbol, Symbol};

const UNARY_OPS: &[&str] = &["Abs", "Neg", "Relu", "Exp", "Sqrt"];

const BROADCAST_OPS: &[(&str, IntOp)] = &[
    ("Add", IntOp::Add),
    ("Sub", IntOp::Sub),
    ("Mul", IntOp::Mul),
    ("Div", IntOp::FloorDiv),
    ("Maximum", IntOp::Max),
];

const SCALAR_OPS: &[(&str, IntOp)] = &[
    ("ScalarAdd", IntOp::Add),
    ("ScalarSub", IntOp::Sub),
    ("ScalarMul", IntOp::Mul),
    ("ScalarFloorDiv", IntOp::FloorDiv),
    ("ScalarMax", IntOp::Max),
];

/// Register every built-in rule into `registry`.
pub fn register_all(registry: &mut RuleRegistry) {
    for op in UNARY_OPS {
        registry.register(op, same_shape_rule());
    }
    // Identity and Cast also carry integer values through unchanged.
    for op in ["Identity", "Cast"] {
        registry.register(
            op,
            same_shape_rule()
                .value_depends(&[DependOn::Value])
                .with_value(|ctx| ctx.input_value(0).cloned()),
        );
    }
    for &(op, int_op) in BROADCAST_OPS {
        registry.register(op, broadcast_rule(int_op));
    }
    for &(op, int_op) in SCALAR_OPS {
        registry.register(op, scalar_rule(int_op));
    }
    registry.register("MatMul", matmul_rule());
    registry.register("Shape", shape_rule());
    registry.register("Reshape", reshape_rule());
    registry.register("MakeTuple", make_tuple_rule());
    registry.register("TupleGetItem", tuple_get_item_rule());
    registry.register("ReduceSum", reduce_rule());
    registry.register("ReduceMax", reduce_rule());
    registry.register("Transpose", transpose_rule());
    registry.register("Concat", concat_rule());
}

// ── Elementwise ─────────────────────────────────────────────────────────────

fn same_shape_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape])
        .with_shape(|ctx| ctx.input_shape(0).cloned())
}

fn broadcast_rule(int_op: IntOp) -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape, DependOn::Shape])
        .value_depends(&[DependOn::Value, DependOn::Value])
        .with_shape(|ctx| {
            let lhs = ctx.input_shape(0)?;
            let rhs = ctx.input_shape(1)?;
            broadcast_shapes(lhs, rhs)
        })
        .with_value(move |ctx| int_binary(ctx, int_op))
}

/// Numpy-style broadcast of two shapes. Unknown rank on either side gives
/// an unknown-rank result; two different constants other than 1 fail.
pub fn broadcast_shapes(lhs: &ListSymbol, rhs: &ListSymbol) -> Option<ListSymbol> {
    if lhs.equals_to(rhs) {
        return Some(lhs.clone());
    }
    let (Some(a), Some(b)) = (lhs.dims(), rhs.dims()) else {
        return Some(ListSymbol::dynamic());
    };
    Some(ListSymbol::from_dims(broadcast_dims(&a, &b)?))
}

fn broadcast_dims(a: &[IntSymbol], b: &[IntSymbol]) -> Option<Vec<IntSymbol>> {
    let rank = a.len().max(b.len());
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let da = (i + a.len()).checked_sub(rank).and_then(|j| a.get(j));
        let db = (i + b.len()).checked_sub(rank).and_then(|j| b.get(j));
        let dim = match (da, db) {
            (Some(x), None) | (None, Some(x)) => x.clone(),
            (Some(x), Some(y)) => broadcast_dim(x, y)?,
            (None, None) => return None,
        };
        out.push(dim);
    }
    Some(out)
}

fn broadcast_dim(x: &IntSymbol, y: &IntSymbol) -> Option<IntSymbol> {
    if x.equals_to(y) {
        return Some(x.clone());
    }
    match (x.value(), y.value()) {
        (Some(1), _) => Some(y.clone()),
        (_, Some(1)) => Some(x.clone()),
        (Some(_), Some(_)) => None,
        // A valid broadcast forces the unknown side to be 1 or the constant.
        (Some(_), None) => Some(x.clone()),
        (None, Some(_)) => Some(y.clone()),
        (None, None) => Some(x.max(y)),
    }
}

fn int_binary(ctx: &RuleContext<'_>, op: IntOp) -> Option<Symbol> {
    let lhs = ctx.input_int(0)?;
    let rhs = ctx.input_int(1)?;
    Some(IntSymbol::binary(op, lhs, rhs).into())
}

fn scalar_rule(int_op: IntOp) -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::None])
        .value_depends(&[DependOn::Value, DependOn::Value])
        .with_shape(|_| Some(ListSymbol::new(Vec::new())))
        .with_value(move |ctx| int_binary(ctx, int_op))
}

// ── Linear algebra ──────────────────────────────────────────────────────────

fn matmul_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape, DependOn::Shape])
        .with_shape(|ctx| {
            let (Some(a), Some(b)) = (ctx.input_dims(0), ctx.input_dims(1)) else {
                return Some(ListSymbol::dynamic());
            };
            if a.len() < 2 || b.len() < 2 {
                return None;
            }
            let (a_batch, a_mat) = a.split_at(a.len() - 2);
            let (b_batch, b_mat) = b.split_at(b.len() - 2);
            let m = if ctx.attr_bool("transpose_a") {
                &a_mat[1]
            } else {
                &a_mat[0]
            };
            let n = if ctx.attr_bool("transpose_b") {
                &b_mat[0]
            } else {
                &b_mat[1]
            };
            let mut dims = broadcast_dims(a_batch, b_batch)?;
            dims.push(m.clone());
            dims.push(n.clone());
            Some(ListSymbol::from_dims(dims))
        })
}

// ── Shape manipulation ──────────────────────────────────────────────────────

fn shape_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape])
        .value_depends(&[DependOn::Shape])
        .with_shape(|ctx| {
            let rank = match ctx.input_shape(0)?.len() {
                Some(n) => IntSymbol::constant(n as i64),
                None => IntSymbol::unknown(),
            };
            Some(ListSymbol::from_dims(vec![rank]))
        })
        .with_value(|ctx| ctx.input_shape(0).cloned().map(Symbol::List))
}

fn reshape_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape, DependOn::Value])
        .with_shape(|ctx| {
            let target = match ctx.input_value(1) {
                Some(v) => v.as_list()?.clone(),
                None => {
                    let dims = ctx.attr_ints("shape")?;
                    ListSymbol::from_shape(dims)
                }
            };
            let Some(items) = target.dims() else {
                return Some(ListSymbol::dynamic());
            };
            let infer_at: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, d)| d.value() == Some(-1))
                .map(|(i, _)| i)
                .collect();
            match infer_at.as_slice() {
                [] => Some(target),
                [pos] => {
                    let total = match ctx.input_dims(0) {
                        Some(dims) => product(&dims),
                        None => IntSymbol::unknown(),
                    };
                    let known = items
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| i != pos)
                        .fold(IntSymbol::constant(1), |acc, (_, d)| acc.mul(d));
                    let mut dims = items;
                    dims[*pos] = total.floor_div(&known);
                    Some(ListSymbol::from_dims(dims))
                }
                _ => None,
            }
        })
}

fn product(dims: &[IntSymbol]) -> IntSymbol {
    dims.iter()
        .fold(IntSymbol::constant(1), |acc, d| acc.mul(d))
}

fn make_tuple_rule() -> OperationRule {
    OperationRule::new()
        .with_shape(|ctx| {
            let items = ctx
                .inputs
                .iter()
                .map(|i| Symbol::List(i.shape.clone().unwrap_or_else(ListSymbol::dynamic)))
                .collect();
            Some(ListSymbol::new(items))
        })
        .with_value(|ctx| {
            let items = ctx
                .inputs
                .iter()
                .map(|i| i.value.clone())
                .collect::<Option<Vec<_>>>()?;
            Some(ListSymbol::new(items).into())
        })
}

fn tuple_get_item_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape])
        .value_depends(&[DependOn::Value])
        .with_shape(|ctx| {
            let index = usize::try_from(ctx.attr_int("index")?).ok()?;
            ctx.input_shape(0)?.item(index)?.as_list().cloned()
        })
        .with_value(|ctx| {
            let index = usize::try_from(ctx.attr_int("index")?).ok()?;
            ctx.input_value(0)?.as_list()?.item(index).cloned()
        })
}

/// Normalize a possibly negative axis against `rank`.
fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let a = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&a).then_some(a as usize)
}

fn reduce_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape])
        .with_shape(|ctx| {
            let keep_dims = ctx.attr_bool("keep_dims");
            let axes: Option<Vec<i64>> = match (ctx.attr_int("axis"), ctx.attr_ints("axis")) {
                (Some(a), _) => Some(vec![a]),
                (None, Some(list)) => Some(list.to_vec()),
                (None, None) => None,
            };
            let Some(dims) = ctx.input_dims(0) else {
                // Reducing everything without keep_dims is a scalar whatever
                // the input rank.
                if axes.is_none() && !keep_dims {
                    return Some(ListSymbol::new(Vec::new()));
                }
                return Some(ListSymbol::dynamic());
            };
            let reduced: Vec<usize> = match axes {
                Some(list) => list
                    .iter()
                    .map(|&a| normalize_axis(a, dims.len()))
                    .collect::<Option<Vec<_>>>()?,
                None => (0..dims.len()).collect(),
            };
            let out = dims
                .into_iter()
                .enumerate()
                .filter_map(|(i, d)| match (reduced.contains(&i), keep_dims) {
                    (false, _) => Some(d),
                    (true, true) => Some(IntSymbol::constant(1)),
                    (true, false) => None,
                })
                .collect();
            Some(ListSymbol::from_dims(out))
        })
}

fn transpose_rule() -> OperationRule {
    OperationRule::new()
        .shape_depends(&[DependOn::Shape])
        .with_shape(|ctx| {
            let perm = ctx.attr_ints("perm")?;
            let Some(dims) = ctx.input_dims(0) else {
                return Some(ListSymbol::dynamic());
            };
            if perm.len() != dims.len() {
                return None;
            }
            let out = perm
                .iter()
                .map(|&p| normalize_axis(p, dims.len()).map(|i| dims[i].clone()))
                .collect::<Option<Vec<_>>>()?;
            Some(ListSymbol::from_dims(out))
        })
}

fn concat_rule() -> OperationRule {
    OperationRule::new().with_shape(|ctx| {
        let shapes = ctx
            .inputs
            .iter()
            .map(|i| i.shape.as_ref().and_then(ListSymbol::dims))
            .collect::<Option<Vec<_>>>();
        let Some(shapes) = shapes else {
            return Some(ListSymbol::dynamic());
        };
        let first = shapes.first()?;
        let axis = normalize_axis(ctx.attr_int("axis").unwrap_or(0), first.len())?;
        if shapes.iter().any(|s| s.len() != first.len()) {
            return None;
        }
        let mut out = Vec::with_capacity(first.len());
        for i in 0..first.len() {
            if i == axis {
                let sum = shapes
                    .iter()
                    .skip(1)
                    .fold(first[i].clone(), |acc, s| acc.add(&s[i]));
                out.push(sum);
            } else {
                // Prefer a known constant among the inputs.
                let dim = shapes
                    .iter()
                    .map(|s| &s[i])
                    .find(|d| d.has_data())
                    .unwrap_or(&first[i]);
                out.push(dim.clone());
            }
        }
        Some(ListSymbol::from_dims(out))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_type::{AbstractType, Attr, Attrs, DType};
    use crate::rule::RuleInput;

    fn input(shape: Option<ListSymbol>, value: Option<Symbol>) -> RuleInput {
        RuleInput {
            shape,
            value,
            abstract_type: AbstractType::Opaque,
        }
    }

    fn run_shape(op: &str, inputs: Vec<RuleInput>, attrs: &Attrs) -> Option<ListSymbol> {
        let registry = RuleRegistry::with_builtins();
        let ty = AbstractType::tensor_dyn_rank(DType::F32);
        let ctx = RuleContext {
            op,
            inputs,
            attrs,
            abstract_type: &ty,
        };
        let rule = registry.get(op).unwrap();
        (rule.shape_builder().unwrap())(&ctx)
    }

    fn run_value(op: &str, inputs: Vec<RuleInput>) -> Option<Symbol> {
        let registry = RuleRegistry::with_builtins();
        let ty = AbstractType::Scalar(DType::I64);
        let attrs = Attrs::new();
        let ctx = RuleContext {
            op,
            inputs,
            attrs: &attrs,
            abstract_type: &ty,
        };
        let rule = registry.get(op).unwrap();
        (rule.value_builder().unwrap())(&ctx)
    }

    #[test]
    fn unary_reuses_input_shape() {
        let s = ListSymbol::from_dims(vec![IntSymbol::unknown(), IntSymbol::constant(4)]);
        let out = run_shape("Relu", vec![input(Some(s.clone()), None)], &Attrs::new()).unwrap();
        assert!(out.is_same_instance(&s));
    }

    #[test]
    fn broadcast_with_one_and_unknowns() {
        let n = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(1)]);
        let b = ListSymbol::from_dims(vec![IntSymbol::constant(8)]);
        let out = broadcast_shapes(&a, &b).unwrap();
        let dims = out.dims().unwrap();
        assert!(dims[0].equals_to(&n));
        assert_eq!(dims[1].value(), Some(8));

        let m = IntSymbol::unknown();
        let c = ListSymbol::from_dims(vec![m.clone()]);
        let d = ListSymbol::from_dims(vec![n.clone()]);
        let out = broadcast_shapes(&c, &d).unwrap();
        assert!(out.dims().unwrap()[0].equals_to(&m.max(&n)));
    }

    #[test]
    fn broadcast_unknown_against_constant_keeps_constant() {
        let n = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![n.clone()]);
        let b = ListSymbol::from_shape(&[5]);
        assert_eq!(broadcast_shapes(&a, &b).unwrap().to_shape(), Some(vec![5]));
        assert_eq!(broadcast_shapes(&b, &a).unwrap().to_shape(), Some(vec![5]));

        let c = ListSymbol::from_dims(vec![IntSymbol::constant(3), n]);
        let d = ListSymbol::from_shape(&[1, 7]);
        assert_eq!(broadcast_shapes(&c, &d).unwrap().to_shape(), Some(vec![3, 7]));
    }

    #[test]
    fn broadcast_rejects_mismatched_constants() {
        let a = ListSymbol::from_shape(&[2, 3]);
        let b = ListSymbol::from_shape(&[2, 4]);
        assert!(broadcast_shapes(&a, &b).is_none());
    }

    #[test]
    fn broadcast_with_dynamic_rank_is_dynamic() {
        let a = ListSymbol::dynamic();
        let b = ListSymbol::from_shape(&[3]);
        assert!(broadcast_shapes(&a, &b).unwrap().is_dyn_len());
    }

    #[test]
    fn scalar_arithmetic_folds() {
        let v = run_value(
            "ScalarMul",
            vec![
                input(None, Some(IntSymbol::constant(6).into())),
                input(None, Some(IntSymbol::constant(7).into())),
            ],
        )
        .unwrap();
        assert_eq!(v.as_int().unwrap().value(), Some(42));
    }

    #[test]
    fn matmul_with_transpose() {
        let m = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![IntSymbol::constant(64), m.clone()]);
        let b = ListSymbol::from_shape(&[32, 64]);
        let mut attrs = Attrs::new();
        attrs.insert("transpose_a".into(), Attr::Bool(true));
        attrs.insert("transpose_b".into(), Attr::Bool(true));
        let out = run_shape(
            "MatMul",
            vec![input(Some(a), None), input(Some(b), None)],
            &attrs,
        )
        .unwrap();
        let dims = out.dims().unwrap();
        assert!(dims[0].equals_to(&m));
        assert_eq!(dims[1].value(), Some(32));
    }

    #[test]
    fn shape_value_is_input_shape() {
        let registry = RuleRegistry::with_builtins();
        let s = ListSymbol::from_dims(vec![IntSymbol::unknown(), IntSymbol::constant(3)]);
        let ty = AbstractType::Tuple(vec![]);
        let attrs = Attrs::new();
        let ctx = RuleContext {
            op: "Shape",
            inputs: vec![input(Some(s.clone()), None)],
            attrs: &attrs,
            abstract_type: &ty,
        };
        let rule = registry.get("Shape").unwrap();
        let v = (rule.value_builder().unwrap())(&ctx).unwrap();
        assert!(v.as_list().unwrap().is_same_instance(&s));
        let shape = (rule.shape_builder().unwrap())(&ctx).unwrap();
        assert_eq!(shape.to_shape(), Some(vec![2]));
    }

    #[test]
    fn reshape_infers_minus_one() {
        let n = IntSymbol::unknown();
        let x = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(32)]);
        let target = ListSymbol::from_shape(&[-1, 32]);
        let out = run_shape(
            "Reshape",
            vec![input(Some(x), None), input(None, Some(target.into()))],
            &Attrs::new(),
        )
        .unwrap();
        let dims = out.dims().unwrap();
        assert!(dims[0].equals_to(&n), "(n * 32) // 32 simplifies to n");
        assert_eq!(dims[1].value(), Some(32));
    }

    #[test]
    fn reshape_static_product_folds() {
        let x = ListSymbol::from_shape(&[2, 3, 4]);
        let mut attrs = Attrs::new();
        attrs.insert("shape".into(), Attr::Ints(vec![6, -1]));
        let out = run_shape("Reshape", vec![input(Some(x), None)], &attrs).unwrap();
        assert_eq!(out.to_shape(), Some(vec![6, 4]));
    }

    #[test]
    fn reshape_rejects_two_inferred_dims() {
        let x = ListSymbol::from_shape(&[2, 3]);
        let mut attrs = Attrs::new();
        attrs.insert("shape".into(), Attr::Ints(vec![-1, -1]));
        assert!(run_shape("Reshape", vec![input(Some(x), None)], &attrs).is_none());
    }

    #[test]
    fn reduce_and_transpose() {
        let n = IntSymbol::unknown();
        let x = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(3), IntSymbol::constant(5)]);
        let mut attrs = Attrs::new();
        attrs.insert("axis".into(), Attr::Int(-1));
        attrs.insert("keep_dims".into(), Attr::Bool(true));
        let out = run_shape("ReduceSum", vec![input(Some(x.clone()), None)], &attrs).unwrap();
        assert_eq!(out.dims().unwrap()[2].value(), Some(1));
        assert!(out.dims().unwrap()[0].equals_to(&n));

        let mut attrs = Attrs::new();
        attrs.insert("perm".into(), Attr::Ints(vec![2, 0, 1]));
        let out = run_shape("Transpose", vec![input(Some(x), None)], &attrs).unwrap();
        let dims = out.dims().unwrap();
        assert_eq!(dims[0].value(), Some(5));
        assert!(dims[1].equals_to(&n));
    }

    #[test]
    fn concat_sums_axis() {
        let n = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(3)]);
        let b = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(5)]);
        let mut attrs = Attrs::new();
        attrs.insert("axis".into(), Attr::Int(1));
        let out = run_shape("Concat", vec![input(Some(a), None), input(Some(b), None)], &attrs)
            .unwrap();
        let dims = out.dims().unwrap();
        assert!(dims[0].equals_to(&n));
        assert_eq!(dims[1].value(), Some(8));
    }

    #[test]
    fn tuple_round_trip_through_get_item() {
        let s = ListSymbol::from_shape(&[7]);
        let t = run_shape(
            "MakeTuple",
            vec![input(Some(s.clone()), None), input(None, None)],
            &Attrs::new(),
        )
        .unwrap();
        assert_eq!(t.len(), Some(2));
        let mut attrs = Attrs::new();
        attrs.insert("index".into(), Attr::Int(0));
        let out = run_shape("TupleGetItem", vec![input(Some(t), None)], &attrs).unwrap();
        assert!(out.is_same_instance(&s));
    }
}
