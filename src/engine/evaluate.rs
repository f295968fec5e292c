//! Rule evaluation over a fact set.
//!
//! Every rule in the set runs against the same facts; rules never observe
//! each other's output. A predicate that fails - by error or by panic - is
//! converted into a single synthetic warning violation and the remaining
//! rules still run. The final ordering by `(line, column, rule_id)` is a
//! contract: downstream consumers diff violation lists across runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::extract::FactSet;
use crate::rules::{RuleSet, Severity};

/// One reported anti-pattern instance. A value object: never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Unit-less relative performance estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_impact: Option<f64>,
}

/// Outcome of evaluating a rule set, including how far it got before an
/// optional deadline.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub violations: Vec<Violation>,
    /// Number of rules that ran to completion.
    pub completed_rules: usize,
    /// Whether the deadline cut evaluation short.
    pub timed_out: bool,
}

/// Evaluate every rule in the set. Deterministic: repeated calls on the same
/// inputs yield byte-identical ordered violation lists.
pub fn evaluate(facts: &FactSet, rule_set: &RuleSet) -> Vec<Violation> {
    evaluate_until(facts, rule_set, None).violations
}

/// Evaluate with a cooperative deadline, checked between rules. A rule that
/// has started always finishes; the deadline only stops further rules.
pub fn evaluate_until(
    facts: &FactSet,
    rule_set: &RuleSet,
    deadline: Option<Instant>,
) -> Evaluation {
    let mut violations = Vec::new();
    let mut completed = 0;
    let mut timed_out = false;

    for (rule, severity) in rule_set.rules() {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| (rule.predicate)(facts)));
        match outcome {
            Ok(Ok(findings)) => {
                for finding in findings {
                    violations.push(Violation {
                        rule_id: rule.id.clone(),
                        severity: *severity,
                        line: finding.line.min(facts.source_lines),
                        column: finding.column,
                        message: finding.message,
                        suggestion: finding.suggestion,
                        performance_impact: finding.performance_impact,
                    });
                }
            }
            Ok(Err(err)) => violations.push(internal_failure(&rule.id, &err.to_string())),
            Err(_) => violations.push(internal_failure(&rule.id, "predicate panicked")),
        }
        completed += 1;
    }

    violations.sort_by(|a, b| {
        (a.line, a.column, a.rule_id.as_str()).cmp(&(b.line, b.column, b.rule_id.as_str()))
    });

    Evaluation {
        violations,
        completed_rules: completed,
        timed_out,
    }
}

/// Synthetic violation for an isolated predicate failure.
fn internal_failure(rule_id: &str, detail: &str) -> Violation {
    Violation {
        rule_id: rule_id.to_string(),
        severity: Severity::Warning,
        line: 0,
        column: 0,
        message: format!("internal rule failure in {}: {}", rule_id, detail),
        suggestion: None,
        performance_impact: None,
    }
}
