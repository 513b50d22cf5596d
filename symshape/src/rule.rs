// rule.rs — Per-operation shape/value rules and the rule registry
//
// An `OperationRule` tells the engine two things about an operation kind:
// which facet (shape or value) it needs from each input, separately for
// building the output shape and the output value, and how to build those
// output symbols from the inputs' symbols.
//
// Preconditions: rules are registered before any build reads the registry.
// Postconditions: the process-wide registry (`global()`) is built once and
//   never mutated afterwards.
// Failure modes: none. A missing rule is not an error: the node gets no
//   symbol.
// Side effects: `global()` initializes a `OnceLock` on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::abstract_type::{AbstractType, Attr, Attrs};
use crate::symbol::{IntSymbol, ListSymbol, Symbol};

// ── Demand ──────────────────────────────────────────────────────────────────

/// Facet an operation needs from one of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependOn {
    None,
    Shape,
    Value,
}

/// Which facets of a node are required downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DependStatus {
    pub shape: bool,
    pub value: bool,
}

impl DependStatus {
    pub const NONE: DependStatus = DependStatus {
        shape: false,
        value: false,
    };
    pub const ALL: DependStatus = DependStatus {
        shape: true,
        value: true,
    };
    pub const SHAPE: DependStatus = DependStatus {
        shape: true,
        value: false,
    };
    pub const VALUE: DependStatus = DependStatus {
        shape: false,
        value: true,
    };

    pub fn is_none(self) -> bool {
        !self.shape && !self.value
    }

    /// OR `other` into `self`; demand is only ever added, never removed.
    pub fn merge(&mut self, other: DependStatus) {
        self.shape |= other.shape;
        self.value |= other.value;
    }

    pub fn require(&mut self, on: DependOn) {
        match on {
            DependOn::Shape => self.shape = true,
            DependOn::Value => self.value = true,
            DependOn::None => {}
        }
    }
}

impl fmt::Display for DependStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.shape, self.value) {
            (false, false) => write!(f, "-"),
            (true, false) => write!(f, "shape"),
            (false, true) => write!(f, "value"),
            (true, true) => write!(f, "shape+value"),
        }
    }
}

// ── Rule context ────────────────────────────────────────────────────────────

/// Symbols and declared type of one input, as seen by a rule.
#[derive(Debug, Clone)]
pub struct RuleInput {
    pub shape: Option<ListSymbol>,
    pub value: Option<Symbol>,
    pub abstract_type: AbstractType,
}

/// Everything a rule may read while building one node's symbols.
#[derive(Debug)]
pub struct RuleContext<'a> {
    pub op: &'a str,
    pub inputs: Vec<RuleInput>,
    pub attrs: &'a Attrs,
    /// Declared type of the node being built.
    pub abstract_type: &'a AbstractType,
}

impl RuleContext<'_> {
    pub fn input(&self, index: usize) -> Option<&RuleInput> {
        self.inputs.get(index)
    }

    pub fn input_shape(&self, index: usize) -> Option<&ListSymbol> {
        self.input(index).and_then(|i| i.shape.as_ref())
    }

    /// Input shape as integer dimensions; `None` for unknown rank.
    pub fn input_dims(&self, index: usize) -> Option<Vec<IntSymbol>> {
        self.input_shape(index).and_then(ListSymbol::dims)
    }

    pub fn input_value(&self, index: usize) -> Option<&Symbol> {
        self.input(index).and_then(|i| i.value.as_ref())
    }

    pub fn input_int(&self, index: usize) -> Option<&IntSymbol> {
        self.input_value(index).and_then(Symbol::as_int)
    }

    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name) {
            Some(Attr::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attrs.get(name) {
            Some(Attr::Ints(v)) => Some(v.as_slice()),
            Some(Attr::Int(_)) | Some(Attr::Bool(_)) | None => None,
        }
    }

    pub fn attr_bool(&self, name: &str) -> bool {
        matches!(self.attrs.get(name), Some(Attr::Bool(true)))
    }
}

// ── OperationRule ───────────────────────────────────────────────────────────

pub type ShapeFn = dyn Fn(&RuleContext<'_>) -> Option<ListSymbol> + Send + Sync;
pub type ValueFn = dyn Fn(&RuleContext<'_>) -> Option<Symbol> + Send + Sync;

/// How one operation kind derives its output symbols.
///
/// Depend lists follow a compact convention: an empty list forwards the
/// facet being built to every input; a list shorter than the input count
/// leaves the remaining inputs undemanded.
#[derive(Default)]
pub struct OperationRule {
    shape_depends: Vec<DependOn>,
    value_depends: Vec<DependOn>,
    build_shape: Option<Box<ShapeFn>>,
    build_value: Option<Box<ValueFn>>,
}

impl OperationRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape_depends(mut self, depends: &[DependOn]) -> Self {
        self.shape_depends = depends.to_vec();
        self
    }

    pub fn value_depends(mut self, depends: &[DependOn]) -> Self {
        self.value_depends = depends.to_vec();
        self
    }

    pub fn with_shape<F>(mut self, f: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> Option<ListSymbol> + Send + Sync + 'static,
    {
        self.build_shape = Some(Box::new(f));
        self
    }

    pub fn with_value<F>(mut self, f: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> Option<Symbol> + Send + Sync + 'static,
    {
        self.build_value = Some(Box::new(f));
        self
    }

    pub fn shape_builder(&self) -> Option<&ShapeFn> {
        self.build_shape.as_deref()
    }

    pub fn value_builder(&self) -> Option<&ValueFn> {
        self.build_value.as_deref()
    }

    /// Demand placed on each of `arity` inputs when building the output's
    /// value (`for_value`) or shape.
    pub fn input_depends(&self, for_value: bool, arity: usize) -> Vec<DependOn> {
        let (configured, forward) = if for_value {
            (&self.value_depends, DependOn::Value)
        } else {
            (&self.shape_depends, DependOn::Shape)
        };
        if configured.is_empty() {
            return vec![forward; arity];
        }
        (0..arity)
            .map(|i| configured.get(i).copied().unwrap_or(DependOn::None))
            .collect()
    }
}

impl fmt::Debug for OperationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRule")
            .field("shape_depends", &self.shape_depends)
            .field("value_depends", &self.value_depends)
            .field("build_shape", &self.build_shape.is_some())
            .field("build_value", &self.build_value.is_some())
            .finish()
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Table from operation kind to its rule.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, OperationRule>,
}

impl RuleRegistry {
    /// An empty registry: every operation is opaque.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in rule catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin_rules::register_all(&mut registry);
        registry
    }

    /// Register `rule` for `op`, returning the rule it replaces.
    pub fn register(&mut self, op: &str, rule: OperationRule) -> Option<OperationRule> {
        self.rules.insert(op.to_string(), rule)
    }

    pub fn get(&self, op: &str) -> Option<&OperationRule> {
        self.rules.get(op)
    }

    pub fn contains(&self, op: &str) -> bool {
        self.rules.contains_key(op)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered operation names, sorted.
    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

static GLOBAL: OnceLock<RuleRegistry> = OnceLock::new();

/// Process-wide registry with the built-in catalog. Read-only once built.
pub fn global() -> &'static RuleRegistry {
    GLOBAL.get_or_init(RuleRegistry::with_builtins)
}
