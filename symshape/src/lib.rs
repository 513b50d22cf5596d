// symshape — Symbolic shape/value propagation for dataflow graphs
//
// Library root. The engine (`engine`, `call`, `switch`) annotates graph
// nodes with symbolic shapes and values using per-operation rules (`rule`,
// `builtin_rules`). The .sym front end (`lexer`, `parser`, `resolve`) and
// the `pipeline` feed it from text; `dump`, `redundancy` and `infer`
// consume its output.

pub mod abstract_type;
pub mod ast;
pub mod builtin_rules;
pub mod call;
pub mod diag;
pub mod dump;
pub mod engine;
pub mod id;
pub mod infer;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod program;
pub mod redundancy;
pub mod resolve;
pub mod rule;
pub mod switch;
pub mod symbol;

pub use abstract_type::{AbstractType, Attr, ConstValue, DType, UNKNOWN_DIM};
pub use engine::{build, build_sub_engine, build_with_demand, BuildError, BuildReport};
pub use id::{GraphId, NodeId};
pub use program::{Application, NodeKind, Program};
pub use rule::{DependOn, DependStatus, OperationRule, RuleRegistry};
pub use symbol::{BoolSymbol, IntSymbol, ListSymbol, Symbol};
