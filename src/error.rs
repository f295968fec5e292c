//! Error taxonomy for the analysis engine.
//!
//! Three failure classes cross module boundaries:
//!
//! - [`ParseErrorKind`]: malformed source, local to one file; reported
//!   alongside successful files in the same batch result.
//! - [`ConfigurationError`]: invalid rule configuration; blocks the whole
//!   run before any file is analyzed.
//! - [`DuplicateRuleError`]: registration-time programming error, fatal at
//!   startup.
//!
//! Rule predicates that fail at evaluation time are not represented here:
//! they are converted into a single synthetic warning violation so one
//! broken rule never aborts the rest (see `engine::evaluate`).

use thiserror::Error;

/// Why a source file could not be turned into a fact set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// The text is not syntactically valid Python. Line/column point at the
    /// first error node the parser reported, or line 0 when it reported none.
    #[error("syntax error at {line}:{column}")]
    Syntax { line: usize, column: usize },

    /// The tree-sitter parser could not be constructed or produced no tree.
    #[error("parser failure: {0}")]
    Parser(String),
}

impl ParseErrorKind {
    /// Location of the failure, when the parser reported one.
    pub fn location(&self) -> (usize, usize) {
        match self {
            ParseErrorKind::Syntax { line, column } => (*line, *column),
            _ => (0, 0),
        }
    }
}

/// Attempt to register a rule under an id that is already taken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule {id:?} is already registered")]
pub struct DuplicateRuleError {
    pub id: String,
}

/// An invalid `RuleConfig`. The run refuses to start on any of these, since
/// an inconsistent rule set would silently produce wrong severities for
/// every file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A name in enabled_rules, disabled_rules or severity_overrides does
    /// not exist in the registry.
    #[error("unknown rule id {0:?}")]
    UnknownRule(String),

    /// The same id appears in both enabled_rules and disabled_rules.
    #[error("rule {0:?} is listed as both enabled and disabled")]
    EnableDisableConflict(String),

    /// A custom rule references a predicate name nobody registered.
    #[error("custom rule {id:?} references unknown predicate {predicate:?}")]
    UnknownPredicate { id: String, predicate: String },

    /// A custom rule id collides with an already registered rule. Treated as
    /// an error rather than a silent override.
    #[error("custom rule id {0:?} collides with a registered rule")]
    CustomIdCollision(String),
}
