//! Fact structures derived from a parsed source file.
//!
//! A [`FactSet`] is the closed, tagged summary of one file that rules are
//! evaluated against. Rules only ever see facts, never tree nodes, which
//! bounds the surface they can depend on. A fact set is owned by the source
//! unit that produced it and never mutated after construction.

use std::fmt;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }

    /// Whether `other` starts inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        other.start_byte >= self.start_byte && other.start_byte < self.end_byte
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A function or method definition.
#[derive(Debug, Clone)]
pub struct FunctionFact {
    /// Index into `FactSet::functions`; call/loop/mutation facts refer to it.
    pub id: usize,
    pub name: String,
    pub params: Vec<String>,
    pub span: Span,
    /// Span of the body block.
    pub body: Span,
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassFact {
    pub name: String,
    pub span: Span,
}

/// An import statement.
#[derive(Debug, Clone)]
pub struct ImportFact {
    /// The imported module path (e.g. "torch", "torch.nn").
    pub module: String,
    pub alias: Option<String>,
    pub span: Span,
}

/// One argument expression at a call site.
#[derive(Debug, Clone)]
pub struct ArgExpr {
    /// Raw expression text.
    pub text: String,
    /// Keyword name for keyword arguments (`requires_grad=True` -> "requires_grad").
    pub keyword: Option<String>,
    /// Free identifiers appearing anywhere in the expression.
    pub identifiers: Vec<String>,
}

/// Whether a tensor call constructs a tensor or operates on existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorCallKind {
    Constructor,
    Operation,
}

/// A call site whose target matched the tensor-library allow-list.
///
/// Matching is exact on the last dotted segment of the target name; this is
/// a syntactic heuristic, not a type check.
#[derive(Debug, Clone)]
pub struct TensorCallFact {
    /// Dotted call target as written (e.g. "torch.zeros", "x.add_").
    pub target: String,
    pub kind: TensorCallKind,
    pub args: Vec<ArgExpr>,
    /// Enclosing function id, or None at module top level.
    pub enclosing_function: Option<usize>,
    /// Innermost enclosing loop id, if any.
    pub enclosing_loop: Option<usize>,
    pub line: usize,
    pub column: usize,
}

/// Any call site, recorded for mode tracking (eval markers, no-grad
/// contexts, forward-style invocations).
#[derive(Debug, Clone)]
pub struct CallFact {
    pub target: String,
    pub enclosing_function: Option<usize>,
    pub line: usize,
    pub column: usize,
    /// Target matched the eval-mode marker set (e.g. `model.eval()`).
    pub is_eval_marker: bool,
    /// Call site is lexically inside a no-grad `with` context.
    pub in_no_grad: bool,
    /// Target matched the forward/inference name heuristic.
    pub matches_forward: bool,
}

/// Kind of loop construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::For => write!(f, "for"),
            LoopKind::While => write!(f, "while"),
        }
    }
}

/// A for/while loop with its textual body span.
#[derive(Debug, Clone)]
pub struct LoopFact {
    /// Index into `FactSet::loops`.
    pub id: usize,
    pub kind: LoopKind,
    /// Body span; "call site falls within this loop" is span containment.
    pub body: Span,
    /// Induction variables bound by a for-loop target (empty for while).
    pub induction_vars: Vec<String>,
    pub enclosing_function: Option<usize>,
}

/// Kind of assignment or mutation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// `x = expr`
    Assign,
    /// `x += expr` and friends
    AugAssign,
    /// `x.method(...)` where the method name has the in-place suffix
    InPlaceCall,
}

/// An assignment or in-place mutation of a named variable.
#[derive(Debug, Clone)]
pub struct MutationFact {
    /// The mutated variable name.
    pub target: String,
    pub kind: MutationKind,
    /// RHS call target for assignments, method name for in-place calls.
    pub call_target: Option<String>,
    /// Free identifiers on the right-hand side (assignments only).
    pub rhs_identifiers: Vec<String>,
    /// RHS is a call matching the tensor allow-list, or carries
    /// `requires_grad=True`.
    pub produces_tensor: bool,
    /// RHS is a detach-style call that severs gradient tracking.
    pub breaks_tracking: bool,
    pub line: usize,
    pub column: usize,
    pub span: Span,
    pub enclosing_function: Option<usize>,
}

/// All facts extracted from a single file, in source order per category.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    pub functions: Vec<FunctionFact>,
    pub classes: Vec<ClassFact>,
    pub imports: Vec<ImportFact>,
    pub tensor_calls: Vec<TensorCallFact>,
    pub calls: Vec<CallFact>,
    pub loops: Vec<LoopFact>,
    pub mutations: Vec<MutationFact>,
    /// Number of lines in the source, for violation location validation.
    pub source_lines: usize,
}

impl FactSet {
    /// Look up a loop by id.
    pub fn loop_by_id(&self, id: usize) -> Option<&LoopFact> {
        self.loops.get(id)
    }

    /// Names assigned or mutated anywhere within `span`.
    ///
    /// Single linear scan over mutation facts filtered by span containment;
    /// this is the whole of the "assigned within loop body" analysis.
    pub fn names_mutated_within(&self, span: &Span) -> Vec<&str> {
        self.mutations
            .iter()
            .filter(|m| span.contains(&m.span))
            .map(|m| m.target.as_str())
            .collect()
    }

    /// Mutations in one scope (function body or module top level), in
    /// source order.
    pub fn mutations_in_scope(&self, scope: Option<usize>) -> Vec<&MutationFact> {
        self.mutations
            .iter()
            .filter(|m| m.enclosing_function == scope)
            .collect()
    }

    /// Calls in one scope, in source order.
    pub fn calls_in_scope(&self, scope: Option<usize>) -> Vec<&CallFact> {
        self.calls
            .iter()
            .filter(|c| c.enclosing_function == scope)
            .collect()
    }

    /// All scopes that contain at least one call: each function id plus the
    /// module top level (None) when it has calls.
    pub fn call_scopes(&self) -> Vec<Option<usize>> {
        let mut scopes: Vec<Option<usize>> = Vec::new();
        for call in &self.calls {
            if !scopes.contains(&call.enclosing_function) {
                scopes.push(call.enclosing_function);
            }
        }
        scopes
    }
}
