//! Tensorlint - structural anti-pattern detection for tensor code.
//!
//! Tensorlint analyzes Python source that uses tensor-computation libraries
//! and flags inefficient or incorrect use of training/inference constructs:
//! tensors rebuilt inside loops, inference passes without eval mode, in-place
//! mutation of gradient-tracked values.
//!
//! # Architecture
//!
//! Text flows through a fixed pipeline:
//!
//! - `source`: immutable source units with content fingerprints
//! - `extract`: tree-sitter parsing into a per-file fact set
//! - `rules`: the rule registry, configuration and rule set builder
//! - `engine`: rule evaluation, result caching and the parallel batch driver
//! - `config`/`report`/`cli`: configuration files, output and the command
//!   surface
//!
//! Rules are pure predicates over the fact set; they never see tree nodes
//! and never observe each other's output. All detection is name-based and
//! single-scope: a syntactic heuristic that may under-report, documented as
//! such.
//!
//! # Adding a Rule
//!
//! Build a [`rules::Rule`] and pass it to [`rules::register`], or register a
//! named predicate with [`rules::register_predicate`] and reference it from
//! a configuration file's `custom_rules`. All registration must complete
//! before evaluation starts.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod report;
pub mod rules;
pub mod source;

pub use config::AnalysisConfig;
pub use engine::{evaluate, BatchDriver, BatchResult, FileOutcome, ResultCache, Violation};
pub use error::{ConfigurationError, DuplicateRuleError, ParseErrorKind};
pub use extract::{extract, FactSet, NamePolicy};
pub use rules::{RuleConfig, RuleSet, Severity};
pub use source::SourceUnit;

/// Initialize all subsystems.
///
/// Seeds the rule registry with the built-in rules. Call this once at
/// startup; it is idempotent.
pub fn init() {
    rules::register_builtins();
}
