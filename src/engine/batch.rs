//! Batch driver: fan source units across workers, aggregate in input order.
//!
//! Analysis of distinct files is embarrassingly parallel; workers share only
//! the immutable rule set and the result cache. A per-file timeout cancels
//! only that file's remaining rules, never its siblings, and a parse failure
//! never fails the batch.

use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::engine::{evaluate_until, ResultCache, Violation};
use crate::error::ParseErrorKind;
use crate::extract::{self, NamePolicy};
use crate::rules::RuleSet;
use crate::source::SourceUnit;

/// A file whose evaluation hit the per-file timeout: the violations from the
/// rules that did complete, plus how many completed.
#[derive(Debug, Clone)]
pub struct PartialResult {
    pub completed_rules: usize,
    pub violations: Vec<Violation>,
}

/// Per-file analysis outcome.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Completed(Vec<Violation>),
    Partial(PartialResult),
    ParseFailed(ParseErrorKind),
}

impl FileOutcome {
    /// Violations available from this outcome, whatever its completeness.
    pub fn violations(&self) -> &[Violation] {
        match self {
            FileOutcome::Completed(v) => v,
            FileOutcome::Partial(p) => &p.violations,
            FileOutcome::ParseFailed(_) => &[],
        }
    }
}

/// Aggregated batch output, in the same order as the input units.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub files: Vec<(String, FileOutcome)>,
}

impl BatchResult {
    pub fn scanned(&self) -> usize {
        self.files.len()
    }

    pub fn total_violations(&self) -> usize {
        self.files.iter().map(|(_, o)| o.violations().len()).sum()
    }

    pub fn outcome_for(&self, path: &str) -> Option<&FileOutcome> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, o)| o)
    }
}

/// Drives extraction + evaluation over a set of source units.
pub struct BatchDriver {
    policy: NamePolicy,
    per_file_timeout: Option<Duration>,
}

impl BatchDriver {
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            policy,
            per_file_timeout: None,
        }
    }

    /// Set the per-file deadline. Checked cooperatively between rules.
    pub fn per_file_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.per_file_timeout = timeout;
        self
    }

    /// Analyze every unit; results come back in input order regardless of
    /// completion order. Cached results are reused and fresh complete
    /// results are written back.
    pub fn analyze_all(
        &self,
        units: &[SourceUnit],
        rule_set: &RuleSet,
        cache: &ResultCache,
    ) -> BatchResult {
        let files: Vec<(String, FileOutcome)> = units
            .par_iter()
            .map(|unit| {
                let outcome = self.analyze_one(unit, rule_set, cache);
                (unit.path().to_string(), outcome)
            })
            .collect();

        BatchResult { files }
    }

    fn analyze_one(
        &self,
        unit: &SourceUnit,
        rule_set: &RuleSet,
        cache: &ResultCache,
    ) -> FileOutcome {
        if let Some(violations) =
            cache.get(unit.path(), unit.fingerprint(), rule_set.fingerprint())
        {
            return FileOutcome::Completed(violations);
        }

        let deadline = self.per_file_timeout.map(|t| Instant::now() + t);

        let facts = match extract::extract(unit.text(), &self.policy) {
            Ok(facts) => facts,
            Err(kind) => return FileOutcome::ParseFailed(kind),
        };

        let evaluation = evaluate_until(&facts, rule_set, deadline);
        if evaluation.timed_out {
            // Partial results are never cached; a rerun should retry.
            return FileOutcome::Partial(PartialResult {
                completed_rules: evaluation.completed_rules,
                violations: evaluation.violations,
            });
        }

        cache.put(
            unit.path(),
            unit.fingerprint(),
            rule_set.fingerprint(),
            evaluation.violations.clone(),
        );
        FileOutcome::Completed(evaluation.violations)
    }
}
