//! Rule model and the process-wide rule registry.
//!
//! The registry is append-only and keyed by rule id. It is seeded with the
//! built-in rules at startup and may be extended by further registrations
//! (the plugin path), but all registration must complete before concurrent
//! evaluation begins; evaluation only reads. Downstream stages never hold
//! the registry itself - they take an immutable [`RuleSet`](config::RuleSet)
//! snapshot built from it.

mod builtin;
mod config;

pub use builtin::register_builtins;
pub use config::{CustomRuleSpec, RuleConfig, RuleSet};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::DuplicateRuleError;
use crate::extract::FactSet;

/// Severity levels, ordered: Info < Warning < Error < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Broad grouping of rules for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Performance,
    Correctness,
    Custom,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Performance => write!(f, "performance"),
            RuleCategory::Correctness => write!(f, "correctness"),
            RuleCategory::Custom => write!(f, "custom"),
        }
    }
}

/// A candidate finding produced by a rule predicate; the evaluator attaches
/// the rule id and effective severity to turn it into a violation.
#[derive(Debug, Clone)]
pub struct Finding {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub suggestion: Option<String>,
    /// Unit-less relative performance estimate.
    pub performance_impact: Option<f64>,
}

/// Pure predicate: fact set in, candidate findings out.
pub type RulePredicate = Arc<dyn Fn(&FactSet) -> anyhow::Result<Vec<Finding>> + Send + Sync>;

/// A detection rule. Immutable after registration.
#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub category: RuleCategory,
    pub default_severity: Severity,
    /// Rules registered with `default_enabled = false` only run when the
    /// configuration names them in `enabled_rules`.
    pub default_enabled: bool,
    pub predicate: RulePredicate,
    /// One-line rationale shown with each violation of this rule.
    pub explanation: String,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("default_severity", &self.default_severity)
            .field("default_enabled", &self.default_enabled)
            .finish()
    }
}

/// Registry storage: registration order preserved, id lookup via index map.
#[derive(Default)]
struct RegistryInner {
    order: Vec<Rule>,
    index: HashMap<String, usize>,
    predicates: HashMap<String, RulePredicate>,
}

lazy_static::lazy_static! {
    static ref REGISTRY: RwLock<RegistryInner> = RwLock::new(RegistryInner::default());
}

/// Register a rule. Fails if the id is already taken; this is a programming
/// error and should surface at startup.
pub fn register(rule: Rule) -> Result<(), DuplicateRuleError> {
    let mut registry = REGISTRY.write().unwrap();
    if registry.index.contains_key(&rule.id) {
        return Err(DuplicateRuleError { id: rule.id });
    }
    let idx = registry.order.len();
    registry.index.insert(rule.id.clone(), idx);
    registry.order.push(rule);
    Ok(())
}

/// Look up a rule by id.
pub fn get(id: &str) -> Option<Rule> {
    let registry = REGISTRY.read().unwrap();
    registry.index.get(id).map(|&idx| registry.order[idx].clone())
}

/// All registered rules, in registration order.
pub fn all() -> Vec<Rule> {
    let registry = REGISTRY.read().unwrap();
    registry.order.clone()
}

/// Register a named predicate that custom rules can reference from
/// configuration. Re-registering a name replaces the previous predicate.
pub fn register_predicate(name: &str, predicate: RulePredicate) {
    let mut registry = REGISTRY.write().unwrap();
    registry.predicates.insert(name.to_string(), predicate);
}

/// Look up a named predicate.
pub fn get_predicate(name: &str) -> Option<RulePredicate> {
    let registry = REGISTRY.read().unwrap();
    registry.predicates.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_rule(id: &str) -> Rule {
        Rule {
            id: id.to_string(),
            category: RuleCategory::Custom,
            default_severity: Severity::Info,
            default_enabled: true,
            predicate: Arc::new(|_| Ok(Vec::new())),
            explanation: "test rule".to_string(),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        register(noop_rule("TEST900")).unwrap();
        let err = register(noop_rule("TEST900")).unwrap_err();
        assert_eq!(err.id, "TEST900");
    }

    #[test]
    fn test_lookup_and_order() {
        register(noop_rule("TEST901")).unwrap();
        register(noop_rule("TEST902")).unwrap();

        assert!(get("TEST901").is_some());
        assert!(get("TEST-missing").is_none());

        let ids: Vec<String> = all().into_iter().map(|r| r.id).collect();
        let a = ids.iter().position(|i| i == "TEST901").unwrap();
        let b = ids.iter().position(|i| i == "TEST902").unwrap();
        assert!(a < b, "registration order must be preserved");
    }

    #[test]
    fn test_named_predicates() {
        register_predicate("test_empty", Arc::new(|_| Ok(Vec::new())));
        assert!(get_predicate("test_empty").is_some());
        assert!(get_predicate("test_absent").is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
    }
}
