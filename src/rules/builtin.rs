//! Built-in detection rules.
//!
//! All three detectors work on local, single-scope analysis: loop-invariance
//! is a free-variable scan against names bound inside the loop body, mode
//! tracking is textual ordering within one scope, and gradient tracking is a
//! forward pass over a scope's assignments in source order. Cross-function
//! effects are invisible to them; they under-report by design.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::extract::{FactSet, MutationKind, TensorCallKind};
use crate::rules::{self, Finding, Rule, RuleCategory, Severity};

static BUILTINS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Seed the registry with the built-in rules and their named predicates.
///
/// Idempotent; must complete before any concurrent evaluation starts.
pub fn register_builtins() {
    if BUILTINS_REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }

    let loop_pred: rules::RulePredicate = Arc::new(|facts| Ok(tensor_construction_in_loop(facts)));
    let eval_pred: rules::RulePredicate = Arc::new(|facts| Ok(missing_inference_mode(facts)));
    let grad_pred: rules::RulePredicate = Arc::new(|facts| Ok(inplace_on_tracked(facts)));

    rules::register_predicate("tensor_construction_in_loop", loop_pred.clone());
    rules::register_predicate("missing_inference_mode", eval_pred.clone());
    rules::register_predicate("inplace_on_tracked", grad_pred.clone());

    let builtins = [
        Rule {
            id: "NT001".to_string(),
            category: RuleCategory::Performance,
            default_severity: Severity::Warning,
            default_enabled: true,
            predicate: loop_pred,
            explanation: "tensor constructed inside a loop from loop-invariant arguments; \
                          every iteration pays the allocation for the same value"
                .to_string(),
        },
        Rule {
            id: "NT014".to_string(),
            category: RuleCategory::Correctness,
            default_severity: Severity::Error,
            default_enabled: true,
            predicate: eval_pred,
            explanation: "inference-style call without eval() or a no-grad context; \
                          dropout/batch-norm stay in training mode and autograd records \
                          the pass"
                .to_string(),
        },
        Rule {
            id: "NT027".to_string(),
            category: RuleCategory::Correctness,
            default_severity: Severity::Error,
            default_enabled: true,
            predicate: grad_pred,
            explanation: "in-place mutation of a gradient-tracked tensor; autograd may \
                          fail or silently compute wrong gradients on backward()"
                .to_string(),
        },
    ];

    for rule in builtins {
        // The atomic guard above makes this path run once per process.
        rules::register(rule).expect("built-in rule registered twice");
    }
}

/// NT001: tensor construction inside a loop body with all-loop-invariant
/// arguments.
///
/// An argument is loop-invariant when it references neither the loop's
/// induction variables nor any name assigned within the loop body span. The
/// bound-name set comes from one linear scan of the mutation facts.
fn tensor_construction_in_loop(facts: &FactSet) -> Vec<Finding> {
    let mut findings = Vec::new();

    for call in &facts.tensor_calls {
        if call.kind != TensorCallKind::Constructor {
            continue;
        }
        let loop_fact = match call.enclosing_loop.and_then(|id| facts.loop_by_id(id)) {
            Some(l) => l,
            None => continue,
        };

        let mut bound: Vec<&str> = loop_fact.induction_vars.iter().map(|s| s.as_str()).collect();
        bound.extend(facts.names_mutated_within(&loop_fact.body));

        let invariant = call.args.iter().all(|arg| {
            arg.identifiers.iter().all(|id| !bound.contains(&id.as_str()))
        });

        if invariant {
            findings.push(Finding {
                line: call.line,
                column: call.column,
                message: format!(
                    "`{}` is constructed on every iteration of the enclosing {} loop \
                     from loop-invariant arguments",
                    call.target, loop_fact.kind
                ),
                suggestion: Some(format!(
                    "hoist the `{}` call above the loop and reuse the tensor",
                    call.target
                )),
                performance_impact: Some(loop_allocation_impact(call.args.len())),
            });
        }
    }

    findings
}

/// Relative cost estimate for a repeated in-loop allocation. Unit-less;
/// wider constructor signatures tend to mean bigger tensors.
fn loop_allocation_impact(arg_count: usize) -> f64 {
    1.0 + arg_count as f64 * 0.5
}

/// NT014: forward/inference-style call with no preceding eval-mode marker
/// and no no-grad context.
///
/// "Preceding" is textual order within the same scope only; a marker set in
/// a caller is invisible here. Module top level counts as a scope.
fn missing_inference_mode(facts: &FactSet) -> Vec<Finding> {
    let mut findings = Vec::new();

    for scope in facts.call_scopes() {
        let calls = facts.calls_in_scope(scope);

        for (idx, call) in calls.iter().enumerate() {
            if !call.matches_forward || call.in_no_grad {
                continue;
            }
            let guarded = calls[..idx]
                .iter()
                .any(|earlier| earlier.is_eval_marker);
            if guarded {
                continue;
            }
            findings.push(Finding {
                line: call.line,
                column: call.column,
                message: format!(
                    "`{}` looks like an inference call but no eval() precedes it and it \
                     is not wrapped in a no-grad context",
                    call.target
                ),
                suggestion: Some(
                    "call model.eval() first, or wrap the call in `with torch.no_grad():`"
                        .to_string(),
                ),
                performance_impact: Some(1.5),
            });
        }
    }

    findings
}

/// NT027: in-place mutation of a gradient-tracked variable.
///
/// Forward pass over a scope's mutations in source order, maintaining a
/// name -> tracked flag. Assignment from a tensor-producing call (or from an
/// already tracked name) sets the flag; assignment from an untracked source
/// or a detach-style call clears it; an in-place call on a tracked name is a
/// violation.
fn inplace_on_tracked(facts: &FactSet) -> Vec<Finding> {
    use std::collections::HashMap;

    let mut findings = Vec::new();
    let mut scopes: Vec<Option<usize>> = Vec::new();
    for m in &facts.mutations {
        if !scopes.contains(&m.enclosing_function) {
            scopes.push(m.enclosing_function);
        }
    }

    for scope in scopes {
        let mut ordered = facts.mutations_in_scope(scope);
        ordered.sort_by_key(|m| (m.line, m.column));

        let mut tracked: HashMap<&str, bool> = HashMap::new();

        for m in ordered {
            match m.kind {
                MutationKind::Assign => {
                    let from_tracked_name = m
                        .rhs_identifiers
                        .iter()
                        .any(|id| tracked.get(id.as_str()).copied().unwrap_or(false));
                    let now_tracked =
                        !m.breaks_tracking && (m.produces_tensor || from_tracked_name);
                    tracked.insert(m.target.as_str(), now_tracked);
                }
                MutationKind::AugAssign => {
                    // `x += 1` keeps x's tracking state as-is.
                }
                MutationKind::InPlaceCall => {
                    if tracked.get(m.target.as_str()).copied().unwrap_or(false) {
                        let call = m.call_target.as_deref().unwrap_or(&m.target);
                        findings.push(Finding {
                            line: m.line,
                            column: m.column,
                            message: format!(
                                "in-place `{}` mutates `{}`, which was produced by a \
                                 gradient-tracked tensor operation",
                                call, m.target
                            ),
                            suggestion: Some(format!(
                                "use the out-of-place form (`{}` without the trailing \
                                 underscore) or detach `{}` first",
                                call, m.target
                            )),
                            performance_impact: None,
                        });
                    }
                }
            }
        }
    }

    findings
}
