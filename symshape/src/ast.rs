// AST node types for .sym graph files.
//
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete .sym file: a sequence of graph definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub graphs: Vec<GraphDef>,
    pub span: Span,
}

// ── graph_def: 'graph' IDENT '(' params? ')' '{' stmt* return? '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct GraphDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Vec<Statement>,
    pub ret: Option<Ident>,
    pub span: Span,
}

/// `name: type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

// ── stmt: IDENT '=' expr (':' type)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub name: Ident,
    pub expr: Expr,
    /// Declared type; `None` declares an opaque value.
    pub ty: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `Op(a, b) {attr = v, ...}`
    Op {
        op: Ident,
        args: Vec<Ident>,
        attrs: Vec<AttrDef>,
    },
    /// `call g(a, b)`; `g` names a graph, or a closure value in scope.
    Call { callee: Ident, args: Vec<Ident> },
    /// `partial g(a)`: binds the leading parameters of graph `g`.
    Partial { callee: Ident, args: Vec<Ident> },
    /// `switch(c, p, q)(a, b)`: `branches` are the condition and two
    /// closures, `args` complete whichever closure is taken.
    Switch { branches: Vec<Ident>, args: Vec<Ident> },
    /// `const literal`
    Const(Literal),
}

// ── Attributes ──

#[derive(Debug, Clone, PartialEq)]
pub struct AttrDef {
    pub name: Ident,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Bool(bool),
    /// `[1, 0, 2]`
    Ints(Vec<i64>),
}

// ── Literals ──

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    /// `(2, -1)`
    Tuple(Vec<Literal>, Span),
}

// ── Types ──

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `f32[2, ?]`; `dims == None` for `f32[..]`. Unknown dims are `-1`.
    Tensor {
        dtype: Ident,
        dims: Option<Vec<i64>>,
        span: Span,
    },
    /// Bare dtype (`i64`, `bool`) or `any`.
    Named(Ident),
    /// `(T, T)`
    Tuple(Vec<TypeExpr>, Span),
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Tensor { span, .. } | TypeExpr::Tuple(_, span) => *span,
            TypeExpr::Named(id) => id.span,
        }
    }
}

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
