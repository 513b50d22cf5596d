// symbol.rs — Symbolic dimensions, shapes and values
//
// A symbol is an immutable, reference-counted handle that either carries
// concrete data or stands for an unknown quantity. Symbols are compared with
// `equals_to`, which answers "provably the same quantity": it may return
// false for two quantities that happen to be equal at runtime, but never
// true for two that differ.
//
// Preconditions: none.
// Postconditions: constructed symbols never change; every constructor
//   allocates a fresh SymbolId.
// Failure modes: none (arithmetic overflow during folding leaves the
//   expression symbolic).
// Side effects: bumps the process-wide symbol ID counter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::id::{next_symbol_id, SymbolId};

// ── Integer expressions ─────────────────────────────────────────────────────

/// Binary operation carried by an expression `IntSymbol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Max,
}

impl IntOp {
    pub fn name(self) -> &'static str {
        match self {
            IntOp::Add => "Add",
            IntOp::Sub => "Sub",
            IntOp::Mul => "Mul",
            IntOp::FloorDiv => "FloorDiv",
            IntOp::Max => "Max",
        }
    }

    fn is_commutative(self) -> bool {
        matches!(self, IntOp::Add | IntOp::Mul | IntOp::Max)
    }

    fn fold(self, a: i64, b: i64) -> Option<i64> {
        match self {
            IntOp::Add => a.checked_add(b),
            IntOp::Sub => a.checked_sub(b),
            IntOp::Mul => a.checked_mul(b),
            IntOp::FloorDiv => {
                if b == 0 {
                    return None;
                }
                let q = a.checked_div(b)?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Some(q - 1)
                } else {
                    Some(q)
                }
            }
            IntOp::Max => Some(a.max(b)),
        }
    }
}

// ── IntSymbol ───────────────────────────────────────────────────────────────

/// How an `IntSymbol` is defined.
#[derive(Debug, Clone)]
pub enum IntDef {
    Const(i64),
    Unknown,
    /// A distinct instance standing for the same quantity as an outer symbol
    /// (a callee parameter dimension seeded from its call-site argument).
    Bound(IntSymbol),
    Expr {
        op: IntOp,
        lhs: IntSymbol,
        rhs: IntSymbol,
    },
}

#[derive(Debug)]
struct IntData {
    id: SymbolId,
    def: IntDef,
}

/// Scalar integer symbol: a dimension or an integer runtime value.
#[derive(Debug, Clone)]
pub struct IntSymbol(Arc<IntData>);

impl IntSymbol {
    fn make(def: IntDef) -> Self {
        IntSymbol(Arc::new(IntData {
            id: next_symbol_id(),
            def,
        }))
    }

    pub fn constant(value: i64) -> Self {
        Self::make(IntDef::Const(value))
    }

    pub fn unknown() -> Self {
        Self::make(IntDef::Unknown)
    }

    /// A fresh instance denoting the same quantity as `outer`.
    ///
    /// Constants are returned as-is: they need no fresh symbol.
    pub fn bound_to(outer: &IntSymbol) -> Self {
        if outer.has_data() {
            return outer.clone();
        }
        Self::make(IntDef::Bound(outer.clone()))
    }

    /// Build `lhs <op> rhs`, folding constants and trivial identities.
    pub fn binary(op: IntOp, lhs: &IntSymbol, rhs: &IntSymbol) -> Self {
        if let (Some(a), Some(b)) = (lhs.value(), rhs.value()) {
            if let Some(v) = op.fold(a, b) {
                return Self::constant(v);
            }
        }
        match (op, lhs.value(), rhs.value()) {
            (IntOp::Add, Some(0), _) | (IntOp::Mul, Some(1), _) => return rhs.clone(),
            (IntOp::Add | IntOp::Sub, _, Some(0))
            | (IntOp::Mul | IntOp::FloorDiv, _, Some(1)) => return lhs.clone(),
            (IntOp::Mul, Some(0), _) | (IntOp::Mul, _, Some(0)) => return Self::constant(0),
            _ => {}
        }
        if op == IntOp::Max && lhs.equals_to(rhs) {
            return lhs.clone();
        }
        // (a * b) // b == a
        if op == IntOp::FloorDiv {
            if let IntDef::Expr {
                op: IntOp::Mul,
                lhs: a,
                rhs: b,
            } = lhs.canonical().def()
            {
                if b.equals_to(rhs) {
                    return a.clone();
                }
                if a.equals_to(rhs) {
                    return b.clone();
                }
            }
        }
        Self::make(IntDef::Expr {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn add(&self, other: &IntSymbol) -> Self {
        Self::binary(IntOp::Add, self, other)
    }

    pub fn sub(&self, other: &IntSymbol) -> Self {
        Self::binary(IntOp::Sub, self, other)
    }

    pub fn mul(&self, other: &IntSymbol) -> Self {
        Self::binary(IntOp::Mul, self, other)
    }

    pub fn floor_div(&self, other: &IntSymbol) -> Self {
        Self::binary(IntOp::FloorDiv, self, other)
    }

    pub fn max(&self, other: &IntSymbol) -> Self {
        Self::binary(IntOp::Max, self, other)
    }

    pub fn id(&self) -> SymbolId {
        self.0.id
    }

    pub fn def(&self) -> &IntDef {
        &self.0.def
    }

    /// Follow `Bound` links to the symbol that actually defines the quantity.
    pub fn canonical(&self) -> &IntSymbol {
        let mut cur = self;
        while let IntDef::Bound(outer) = &cur.0.def {
            cur = outer;
        }
        cur
    }

    pub fn value(&self) -> Option<i64> {
        match self.canonical().def() {
            IntDef::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.value().is_some()
    }

    /// Concrete value with each unknown replaced by its entry in `env`,
    /// keyed by canonical symbol ID. `None` if an unknown is unbound or the
    /// arithmetic overflows.
    pub fn evaluate(&self, env: &HashMap<SymbolId, i64>) -> Option<i64> {
        let sym = self.canonical();
        match sym.def() {
            IntDef::Const(v) => Some(*v),
            IntDef::Unknown | IntDef::Bound(_) => env.get(&sym.id()).copied(),
            IntDef::Expr { op, lhs, rhs } => op.fold(lhs.evaluate(env)?, rhs.evaluate(env)?),
        }
    }

    pub fn is_same_instance(&self, other: &IntSymbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn equals_to(&self, other: &IntSymbol) -> bool {
        let a = self.canonical();
        let b = other.canonical();
        if a.is_same_instance(b) {
            return true;
        }
        match (a.def(), b.def()) {
            (IntDef::Const(x), IntDef::Const(y)) => x == y,
            (
                IntDef::Expr {
                    op: op_a,
                    lhs: lhs_a,
                    rhs: rhs_a,
                },
                IntDef::Expr {
                    op: op_b,
                    lhs: lhs_b,
                    rhs: rhs_b,
                },
            ) => {
                op_a == op_b
                    && ((lhs_a.equals_to(lhs_b) && rhs_a.equals_to(rhs_b))
                        || (op_a.is_commutative()
                            && lhs_a.equals_to(rhs_b)
                            && rhs_a.equals_to(lhs_b)))
            }
            _ => false,
        }
    }
}

impl fmt::Display for IntSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.def() {
            IntDef::Const(v) => write!(f, "{v}"),
            _ => write!(f, "{}", self.id()),
        }
    }
}

// ── BoolSymbol ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum BoolDef {
    Const(bool),
    Unknown,
    Bound(BoolSymbol),
}

#[derive(Debug)]
struct BoolData {
    id: SymbolId,
    def: BoolDef,
}

/// Scalar boolean symbol.
#[derive(Debug, Clone)]
pub struct BoolSymbol(Arc<BoolData>);

impl BoolSymbol {
    fn make(def: BoolDef) -> Self {
        BoolSymbol(Arc::new(BoolData {
            id: next_symbol_id(),
            def,
        }))
    }

    pub fn constant(value: bool) -> Self {
        Self::make(BoolDef::Const(value))
    }

    pub fn unknown() -> Self {
        Self::make(BoolDef::Unknown)
    }

    pub fn bound_to(outer: &BoolSymbol) -> Self {
        if outer.has_data() {
            return outer.clone();
        }
        Self::make(BoolDef::Bound(outer.clone()))
    }

    pub fn id(&self) -> SymbolId {
        self.0.id
    }

    pub fn def(&self) -> &BoolDef {
        &self.0.def
    }

    pub fn canonical(&self) -> &BoolSymbol {
        let mut cur = self;
        while let BoolDef::Bound(outer) = &cur.0.def {
            cur = outer;
        }
        cur
    }

    pub fn value(&self) -> Option<bool> {
        match self.canonical().def() {
            BoolDef::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.value().is_some()
    }

    pub fn equals_to(&self, other: &BoolSymbol) -> bool {
        let a = self.canonical();
        let b = other.canonical();
        if Arc::ptr_eq(&a.0, &b.0) {
            return true;
        }
        matches!((a.value(), b.value()), (Some(x), Some(y)) if x == y)
    }
}

impl fmt::Display for BoolSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.def() {
            BoolDef::Const(v) => write!(f, "{v}"),
            _ => write!(f, "{}", self.id()),
        }
    }
}

// ── ListSymbol ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ListData {
    id: SymbolId,
    /// `None` when the length itself is unknown.
    items: Option<Vec<Symbol>>,
}

/// Ordered sequence of symbols: a shape, or a tuple value.
#[derive(Debug, Clone)]
pub struct ListSymbol(Arc<ListData>);

impl ListSymbol {
    pub fn new(items: Vec<Symbol>) -> Self {
        ListSymbol(Arc::new(ListData {
            id: next_symbol_id(),
            items: Some(items),
        }))
    }

    /// A list whose length (rank) is unknown.
    pub fn dynamic() -> Self {
        ListSymbol(Arc::new(ListData {
            id: next_symbol_id(),
            items: None,
        }))
    }

    pub fn from_dims(dims: Vec<IntSymbol>) -> Self {
        Self::new(dims.into_iter().map(Symbol::Int).collect())
    }

    /// A fully concrete shape.
    pub fn from_shape(shape: &[i64]) -> Self {
        Self::from_dims(shape.iter().map(|&d| IntSymbol::constant(d)).collect())
    }

    pub fn id(&self) -> SymbolId {
        self.0.id
    }

    pub fn is_dyn_len(&self) -> bool {
        self.0.items.is_none()
    }

    pub fn items(&self) -> Option<&[Symbol]> {
        self.0.items.as_deref()
    }

    pub fn len(&self) -> Option<usize> {
        self.0.items.as_ref().map(Vec::len)
    }

    /// True only for a list of known length zero.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn item(&self, index: usize) -> Option<&Symbol> {
        self.items().and_then(|items| items.get(index))
    }

    /// The items as integer dimensions; `None` if the length is unknown or
    /// any item is not an integer.
    pub fn dims(&self) -> Option<Vec<IntSymbol>> {
        self.items()?
            .iter()
            .map(|s| s.as_int().cloned())
            .collect()
    }

    pub fn has_data(&self) -> bool {
        self.items()
            .is_some_and(|items| items.iter().all(Symbol::has_data))
    }

    /// Concrete shape, if every dimension is known.
    pub fn to_shape(&self) -> Option<Vec<i64>> {
        self.dims()?.iter().map(IntSymbol::value).collect()
    }

    /// Concrete shape under `env`; see `IntSymbol::evaluate`.
    pub fn evaluate(&self, env: &HashMap<SymbolId, i64>) -> Option<Vec<i64>> {
        self.dims()?.iter().map(|d| d.evaluate(env)).collect()
    }

    pub fn is_same_instance(&self, other: &ListSymbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn equals_to(&self, other: &ListSymbol) -> bool {
        if self.is_same_instance(other) {
            return true;
        }
        match (self.items(), other.items()) {
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals_to(y))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ListSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.items() {
            None => write!(f, "[..]"),
            Some(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Symbol ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Int,
    Bool,
    List,
}

/// A symbolic dimension, shape or runtime value.
#[derive(Debug, Clone)]
pub enum Symbol {
    Int(IntSymbol),
    Bool(BoolSymbol),
    List(ListSymbol),
}

impl Symbol {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Int(_) => SymbolKind::Int,
            Symbol::Bool(_) => SymbolKind::Bool,
            Symbol::List(_) => SymbolKind::List,
        }
    }

    pub fn id(&self) -> SymbolId {
        match self {
            Symbol::Int(s) => s.id(),
            Symbol::Bool(s) => s.id(),
            Symbol::List(s) => s.id(),
        }
    }

    /// Symbols of different kinds are never equal.
    pub fn equals_to(&self, other: &Symbol) -> bool {
        match (self, other) {
            (Symbol::Int(a), Symbol::Int(b)) => a.equals_to(b),
            (Symbol::Bool(a), Symbol::Bool(b)) => a.equals_to(b),
            (Symbol::List(a), Symbol::List(b)) => a.equals_to(b),
            _ => false,
        }
    }

    pub fn has_data(&self) -> bool {
        match self {
            Symbol::Int(s) => s.has_data(),
            Symbol::Bool(s) => s.has_data(),
            Symbol::List(s) => s.has_data(),
        }
    }

    pub fn is_dyn_len(&self) -> bool {
        matches!(self, Symbol::List(l) if l.is_dyn_len())
    }

    pub fn is_same_instance(&self, other: &Symbol) -> bool {
        match (self, other) {
            (Symbol::Int(a), Symbol::Int(b)) => a.is_same_instance(b),
            (Symbol::Bool(a), Symbol::Bool(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Symbol::List(a), Symbol::List(b)) => a.is_same_instance(b),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<&IntSymbol> {
        match self {
            Symbol::Int(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&BoolSymbol> {
        match self {
            Symbol::Bool(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListSymbol> {
        match self {
            Symbol::List(s) => Some(s),
            _ => None,
        }
    }
}

impl From<IntSymbol> for Symbol {
    fn from(s: IntSymbol) -> Self {
        Symbol::Int(s)
    }
}

impl From<BoolSymbol> for Symbol {
    fn from(s: BoolSymbol) -> Self {
        Symbol::Bool(s)
    }
}

impl From<ListSymbol> for Symbol {
    fn from(s: ListSymbol) -> Self {
        Symbol::List(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Int(s) => write!(f, "{s}"),
            Symbol::Bool(s) => write!(f, "{s}"),
            Symbol::List(s) => write!(f, "{s}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknowns_are_reflexive_but_distinct() {
        let n = IntSymbol::unknown();
        let m = IntSymbol::unknown();
        assert!(n.equals_to(&n));
        assert!(n.equals_to(&n.clone()));
        assert!(!n.equals_to(&m));
        assert!(!n.has_data());
    }

    #[test]
    fn constants_compare_by_value() {
        assert!(IntSymbol::constant(4).equals_to(&IntSymbol::constant(4)));
        assert!(!IntSymbol::constant(4).equals_to(&IntSymbol::constant(5)));
        assert!(!IntSymbol::constant(4).equals_to(&IntSymbol::unknown()));
    }

    #[test]
    fn bound_symbol_is_new_instance_with_same_quantity() {
        let n = IntSymbol::unknown();
        let p = IntSymbol::bound_to(&n);
        assert_ne!(p.id(), n.id());
        assert!(p.equals_to(&n));
        assert!(n.equals_to(&p));
        // Binding through two call levels still resolves to the origin.
        let q = IntSymbol::bound_to(&p);
        assert!(q.equals_to(&n));
        assert!(!q.equals_to(&IntSymbol::unknown()));
    }

    #[test]
    fn bound_to_constant_reuses_constant() {
        let c = IntSymbol::constant(128);
        let p = IntSymbol::bound_to(&c);
        assert!(p.is_same_instance(&c));
    }

    #[test]
    fn folding_and_identities() {
        let n = IntSymbol::unknown();
        assert_eq!(
            IntSymbol::constant(6)
                .floor_div(&IntSymbol::constant(4))
                .value(),
            Some(1)
        );
        assert_eq!(
            IntSymbol::constant(-7)
                .floor_div(&IntSymbol::constant(2))
                .value(),
            Some(-4)
        );
        assert!(n.mul(&IntSymbol::constant(1)).is_same_instance(&n));
        assert!(IntSymbol::constant(0).add(&n).is_same_instance(&n));
        assert_eq!(n.mul(&IntSymbol::constant(0)).value(), Some(0));
        assert!(n.max(&n).is_same_instance(&n));
    }

    #[test]
    fn floor_div_cancels_multiplication() {
        let n = IntSymbol::unknown();
        let c = IntSymbol::constant(32);
        assert!(n.mul(&c).floor_div(&c).is_same_instance(&n));
        let m = IntSymbol::unknown();
        assert!(n.mul(&m).floor_div(&n).is_same_instance(&m));
    }

    #[test]
    fn division_by_zero_stays_symbolic() {
        let e = IntSymbol::constant(3).floor_div(&IntSymbol::constant(0));
        assert!(!e.has_data());
    }

    #[test]
    fn expressions_compare_structurally() {
        let n = IntSymbol::unknown();
        let c = IntSymbol::constant(128);
        let a = n.mul(&c);
        let b = c.mul(&n);
        assert!(a.equals_to(&b), "Mul is commutative");
        let x = n.sub(&c);
        let y = c.sub(&n);
        assert!(!x.equals_to(&y), "Sub is not commutative");
        let bound = IntSymbol::bound_to(&n);
        assert!(bound.mul(&c).equals_to(&a));
    }

    #[test]
    fn list_equality_is_elementwise() {
        let n = IntSymbol::unknown();
        let a = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(128)]);
        let b = ListSymbol::from_dims(vec![n.clone(), IntSymbol::constant(128)]);
        assert!(!a.is_same_instance(&b));
        assert!(a.equals_to(&b));
        let c = ListSymbol::from_dims(vec![n, IntSymbol::constant(64)]);
        assert!(!a.equals_to(&c));
    }

    #[test]
    fn concrete_shapes_with_different_dims_differ() {
        let a = ListSymbol::from_shape(&[2, 3]);
        let b = ListSymbol::from_shape(&[2, 4]);
        assert!(!a.equals_to(&b));
        assert!(a.has_data());
        assert_eq!(a.to_shape(), Some(vec![2, 3]));
    }

    #[test]
    fn dynamic_lists_only_equal_themselves() {
        let a = ListSymbol::dynamic();
        let b = ListSymbol::dynamic();
        assert!(a.is_dyn_len());
        assert!(a.equals_to(&a));
        assert!(!a.equals_to(&b));
        assert!(!a.has_data());
        assert_eq!(a.len(), None);
        assert!(!a.is_empty());
    }

    #[test]
    fn downcasts_are_type_checked() {
        let s = Symbol::from(IntSymbol::constant(1));
        assert!(s.as_int().is_some());
        assert!(s.as_list().is_none());
        assert!(s.as_bool().is_none());
        assert_eq!(s.kind(), SymbolKind::Int);
        let l = Symbol::from(ListSymbol::dynamic());
        assert!(l.is_dyn_len());
        assert!(!s.equals_to(&l));
    }

    #[test]
    fn bool_symbols() {
        let t = BoolSymbol::constant(true);
        assert!(t.equals_to(&BoolSymbol::constant(true)));
        assert!(!t.equals_to(&BoolSymbol::constant(false)));
        let u = BoolSymbol::unknown();
        assert!(BoolSymbol::bound_to(&u).equals_to(&u));
    }

    #[test]
    fn display_forms() {
        let l = ListSymbol::from_shape(&[2, 3]);
        assert_eq!(format!("{l}"), "[2, 3]");
        assert_eq!(format!("{}", ListSymbol::dynamic()), "[..]");
    }

    #[test]
    fn evaluate_substitutes_bound_unknowns() {
        let n = IntSymbol::unknown();
        let inner = IntSymbol::bound_to(&n);
        let flat = inner.mul(&IntSymbol::constant(4));
        let mut env = HashMap::new();
        assert_eq!(flat.evaluate(&env), None);
        env.insert(n.id(), 3);
        assert_eq!(flat.evaluate(&env), Some(12));
        let shape = ListSymbol::from_dims(vec![inner, flat]);
        assert_eq!(shape.evaluate(&env), Some(vec![3, 12]));
        assert_eq!(ListSymbol::dynamic().evaluate(&env), None);
    }
}
