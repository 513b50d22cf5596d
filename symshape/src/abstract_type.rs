// abstract_type.rs — Declared node types and their default symbolic form
//
// Every node carries the type its producer declared. When no rule can
// produce a symbol (or a rule declines), the engine falls back to the
// default builders here, which encode exactly what the declaration knows:
// static dims become constants, unknown dims become fresh unknowns, an
// unknown rank becomes a dynamic-length list.
//
// Preconditions: none.
// Postconditions: default builders always return fresh symbols (except the
//   shared constants handed out by `IntSymbol::bound_to`).
// Failure modes: none.
// Side effects: allocates symbol IDs.

use std::collections::BTreeMap;
use std::fmt;

use crate::symbol::{BoolSymbol, IntSymbol, ListSymbol, Symbol, SymbolKind};

/// Element type of a tensor or scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl DType {
    pub fn from_name(name: &str) -> Option<DType> {
        match name {
            "f16" => Some(DType::F16),
            "f32" => Some(DType::F32),
            "f64" => Some(DType::F64),
            "i32" => Some(DType::I32),
            "i64" => Some(DType::I64),
            "bool" => Some(DType::Bool),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::Bool => "bool",
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, DType::I32 | DType::I64)
    }
}

/// Marker for an unknown dimension inside `AbstractType::Tensor::shape`.
pub const UNKNOWN_DIM: i64 = -1;

/// Declared (abstract) type of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum AbstractType {
    /// `shape == None` means the rank itself is unknown.
    Tensor {
        dtype: DType,
        shape: Option<Vec<i64>>,
    },
    Scalar(DType),
    Tuple(Vec<AbstractType>),
    /// No symbolic representation (handles, strings, ...).
    Opaque,
}

impl AbstractType {
    pub fn tensor(dtype: DType, shape: &[i64]) -> Self {
        AbstractType::Tensor {
            dtype,
            shape: Some(shape.to_vec()),
        }
    }

    pub fn tensor_dyn_rank(dtype: DType) -> Self {
        AbstractType::Tensor { dtype, shape: None }
    }

    /// Kind of symbol a value facet of this type holds, if any.
    pub fn value_kind(&self) -> Option<SymbolKind> {
        match self {
            AbstractType::Scalar(DType::Bool) => Some(SymbolKind::Bool),
            AbstractType::Scalar(dt) if dt.is_int() => Some(SymbolKind::Int),
            AbstractType::Tuple(_) => Some(SymbolKind::List),
            _ => None,
        }
    }

    pub fn has_shape_form(&self) -> bool {
        !matches!(self, AbstractType::Opaque)
    }

    /// Every dimension is declared, so the shape needs no inference.
    pub fn is_static_shape(&self) -> bool {
        match self {
            AbstractType::Tensor {
                shape: Some(dims), ..
            } => dims.iter().all(|&d| d >= 0),
            AbstractType::Scalar(_) => true,
            _ => false,
        }
    }

    // ── Default builders ──

    /// Shape symbol derived from the declaration alone.
    pub fn default_shape(&self) -> Option<ListSymbol> {
        match self {
            AbstractType::Tensor { shape: None, .. } => Some(ListSymbol::dynamic()),
            AbstractType::Tensor {
                shape: Some(dims), ..
            } => Some(ListSymbol::from_dims(
                dims.iter()
                    .map(|&d| {
                        if d < 0 {
                            IntSymbol::unknown()
                        } else {
                            IntSymbol::constant(d)
                        }
                    })
                    .collect(),
            )),
            AbstractType::Scalar(_) => Some(ListSymbol::new(Vec::new())),
            AbstractType::Tuple(elems) => Some(ListSymbol::new(
                elems
                    .iter()
                    .map(|e| {
                        Symbol::List(e.default_shape().unwrap_or_else(ListSymbol::dynamic))
                    })
                    .collect(),
            )),
            AbstractType::Opaque => None,
        }
    }

    /// Value symbol derived from the declaration alone. Only integer and
    /// boolean scalars (and tuples of them) have one.
    pub fn default_value(&self) -> Option<Symbol> {
        match self {
            AbstractType::Scalar(DType::Bool) => Some(BoolSymbol::unknown().into()),
            AbstractType::Scalar(dt) if dt.is_int() => Some(IntSymbol::unknown().into()),
            AbstractType::Tuple(elems) => elems
                .iter()
                .map(AbstractType::default_value)
                .collect::<Option<Vec<_>>>()
                .map(|items| ListSymbol::new(items).into()),
            _ => None,
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractType::Tensor { dtype, shape: None } => write!(f, "{}[..]", dtype.name()),
            AbstractType::Tensor {
                dtype,
                shape: Some(dims),
            } => {
                write!(f, "{}[", dtype.name())?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *d < 0 {
                        write!(f, "?")?;
                    } else {
                        write!(f, "{d}")?;
                    }
                }
                write!(f, "]")
            }
            AbstractType::Scalar(dt) => write!(f, "{}", dt.name()),
            AbstractType::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            AbstractType::Opaque => write!(f, "any"),
        }
    }
}

// ── Attributes ──────────────────────────────────────────────────────────────

/// Static operator attribute (`axis`, `perm`, `transpose_a`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    Int(i64),
    Ints(Vec<i64>),
    Bool(bool),
}

/// Attributes of an op node, ordered by name so dumps are deterministic.
pub type Attrs = BTreeMap<String, Attr>;

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Int(v) => write!(f, "{v}"),
            Attr::Bool(v) => write!(f, "{v}"),
            Attr::Ints(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Constants ───────────────────────────────────────────────────────────────

/// Literal payload of a constant node.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Float(f64),
    Tuple(Vec<ConstValue>),
}

impl ConstValue {
    pub fn abstract_type(&self) -> AbstractType {
        match self {
            ConstValue::Int(_) => AbstractType::Scalar(DType::I64),
            ConstValue::Bool(_) => AbstractType::Scalar(DType::Bool),
            ConstValue::Float(_) => AbstractType::Scalar(DType::F32),
            ConstValue::Tuple(items) => {
                AbstractType::Tuple(items.iter().map(ConstValue::abstract_type).collect())
            }
        }
    }

    /// Concrete value symbol; floats have none.
    pub fn to_symbol(&self) -> Option<Symbol> {
        match self {
            ConstValue::Int(v) => Some(IntSymbol::constant(*v).into()),
            ConstValue::Bool(v) => Some(BoolSymbol::constant(*v).into()),
            ConstValue::Float(_) => None,
            ConstValue::Tuple(items) => items
                .iter()
                .map(ConstValue::to_symbol)
                .collect::<Option<Vec<_>>>()
                .map(|items| ListSymbol::new(items).into()),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_shape_is_all_constants() {
        let t = AbstractType::tensor(DType::F32, &[2, 3]);
        let s = t.default_shape().unwrap();
        assert_eq!(s.to_shape(), Some(vec![2, 3]));
    }

    #[test]
    fn unknown_dims_are_fresh_each_time() {
        let t = AbstractType::tensor(DType::F32, &[UNKNOWN_DIM, 4]);
        let a = t.default_shape().unwrap();
        let b = t.default_shape().unwrap();
        assert!(!a.equals_to(&b), "two builds must not invent equality");
        assert_eq!(a.dims().unwrap()[1].value(), Some(4));
    }

    #[test]
    fn unknown_rank_is_dynamic_list() {
        let t = AbstractType::tensor_dyn_rank(DType::F32);
        assert!(t.default_shape().unwrap().is_dyn_len());
    }

    #[test]
    fn scalar_shape_is_empty_and_int_value_is_unknown() {
        let t = AbstractType::Scalar(DType::I64);
        assert!(t.default_shape().unwrap().is_empty());
        let v = t.default_value().unwrap();
        assert_eq!(v.kind(), SymbolKind::Int);
        assert!(!v.has_data());
    }

    #[test]
    fn opaque_has_no_symbolic_form() {
        assert!(AbstractType::Opaque.default_shape().is_none());
        assert!(AbstractType::Opaque.default_value().is_none());
        assert!(AbstractType::Scalar(DType::F32).default_value().is_none());
    }

    #[test]
    fn const_tuple_value() {
        let c = ConstValue::Tuple(vec![ConstValue::Int(2), ConstValue::Int(-1)]);
        let sym = c.to_symbol().unwrap();
        let list = sym.as_list().unwrap();
        assert_eq!(list.to_shape(), Some(vec![2, -1]));
        assert_eq!(c.to_string(), "(2, -1)");
    }

    #[test]
    fn display_matches_source_syntax() {
        assert_eq!(
            AbstractType::tensor(DType::F32, &[UNKNOWN_DIM, 128]).to_string(),
            "f32[?, 128]"
        );
        assert_eq!(AbstractType::tensor_dyn_rank(DType::I32).to_string(), "i32[..]");
        assert_eq!(
            AbstractType::Tuple(vec![AbstractType::Scalar(DType::I64), AbstractType::Opaque])
                .to_string(),
            "(i64, any)"
        );
    }
}
