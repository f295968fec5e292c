//! Syntax extraction: source text in, fact set out.
//!
//! The extractor parses Python with tree-sitter and derives a [`FactSet`] in
//! a single traversal pass. Tensor-call recognition is name matching against
//! the configurable [`NamePolicy`] allow-lists; no type information is used.

mod facts;
mod policy;
mod python;

pub use facts::{
    ArgExpr, CallFact, ClassFact, FactSet, FunctionFact, ImportFact, LoopFact, LoopKind,
    MutationFact, MutationKind, Span, TensorCallFact, TensorCallKind,
};
pub use policy::NamePolicy;
pub use python::extract;
