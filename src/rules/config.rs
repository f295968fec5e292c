//! Rule configuration and the rule set builder.
//!
//! `RuleSet::build` resolves a validated [`RuleConfig`] against the registry
//! into an immutable snapshot. Resolution order: start from all registered
//! default-enabled rules, remove `disabled_rules`, force-include
//! `enabled_rules`, append custom rules, then apply `severity_overrides`
//! (which replace severity but never remove a rule). Any inconsistency is a
//! [`ConfigurationError`] and blocks the run before a single file is
//! analyzed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::rules::{self, Rule, RuleCategory, Severity};

/// A custom rule declared in configuration, backed by a registered named
/// predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRuleSpec {
    /// Rule id; must not collide with any registered rule.
    pub id: String,
    /// Name of a predicate registered via `rules::register_predicate`.
    pub predicate: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// The validated in-memory rule configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub enabled_rules: BTreeSet<String>,
    pub disabled_rules: BTreeSet<String>,
    pub custom_rules: Vec<CustomRuleSpec>,
    pub severity_overrides: BTreeMap<String, Severity>,
}

/// Immutable resolved rule set: `(rule, effective severity)` pairs in
/// registration order, no duplicate ids, plus a stable fingerprint used for
/// cache keying.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<(Rule, Severity)>,
    fingerprint: String,
}

impl RuleSet {
    /// Resolve a configuration against the process-wide registry.
    pub fn build(config: &RuleConfig) -> Result<Self, ConfigurationError> {
        // Library users who skip init() still get the built-in seeding.
        rules::register_builtins();

        let registered = rules::all();

        if let Some(id) = config
            .enabled_rules
            .intersection(&config.disabled_rules)
            .next()
        {
            return Err(ConfigurationError::EnableDisableConflict(id.clone()));
        }

        let known = |id: &str| registered.iter().any(|r| r.id == id);
        for id in config.enabled_rules.iter().chain(&config.disabled_rules) {
            if !known(id) {
                return Err(ConfigurationError::UnknownRule(id.clone()));
            }
        }
        for id in config.severity_overrides.keys() {
            if !known(id) && !config.custom_rules.iter().any(|c| &c.id == id) {
                return Err(ConfigurationError::UnknownRule(id.clone()));
            }
        }

        let mut resolved: Vec<(Rule, Severity)> = Vec::new();
        for rule in &registered {
            let enabled = if config.disabled_rules.contains(&rule.id) {
                false
            } else {
                rule.default_enabled || config.enabled_rules.contains(&rule.id)
            };
            if enabled {
                let severity = rule.default_severity;
                resolved.push((rule.clone(), severity));
            }
        }

        for spec in &config.custom_rules {
            if known(&spec.id) || resolved.iter().any(|(r, _)| r.id == spec.id) {
                return Err(ConfigurationError::CustomIdCollision(spec.id.clone()));
            }
            let predicate = rules::get_predicate(&spec.predicate).ok_or_else(|| {
                ConfigurationError::UnknownPredicate {
                    id: spec.id.clone(),
                    predicate: spec.predicate.clone(),
                }
            })?;
            let severity = spec.severity.unwrap_or(Severity::Warning);
            let rule = Rule {
                id: spec.id.clone(),
                category: RuleCategory::Custom,
                default_severity: severity,
                default_enabled: true,
                predicate,
                explanation: spec
                    .explanation
                    .clone()
                    .unwrap_or_else(|| format!("custom rule {}", spec.id)),
            };
            resolved.push((rule, severity));
        }

        for (rule, severity) in &mut resolved {
            if let Some(over) = config.severity_overrides.get(&rule.id) {
                *severity = *over;
            }
        }

        let fingerprint = fingerprint_of(&resolved);
        Ok(Self {
            rules: resolved,
            fingerprint,
        })
    }

    /// Resolved rules in deterministic iteration order.
    pub fn rules(&self) -> &[(Rule, Severity)] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Stable hash over sorted `(id, severity)` pairs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.iter().any(|(r, _)| r.id == id)
    }
}

fn fingerprint_of(rules: &[(Rule, Severity)]) -> String {
    let mut pairs: Vec<(String, &'static str)> = rules
        .iter()
        .map(|(r, s)| (r.id.clone(), s.as_str()))
        .collect();
    pairs.sort();

    let mut hasher = blake3::Hasher::new();
    for (id, severity) in pairs {
        hasher.update(id.as_bytes());
        hasher.update(b"=");
        hasher.update(severity.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_config_builds_builtins() {
        let set = RuleSet::build(&RuleConfig::default()).unwrap();
        assert!(set.contains("NT001"));
        assert!(set.contains("NT014"));
        assert!(set.contains("NT027"));
    }

    #[test]
    fn test_disable_removes_rule() {
        let config = RuleConfig {
            disabled_rules: ["NT001".to_string()].into(),
            ..Default::default()
        };
        let set = RuleSet::build(&config).unwrap();
        assert!(!set.contains("NT001"));
        assert!(set.contains("NT014"));
    }

    #[test]
    fn test_enable_disable_conflict() {
        let config = RuleConfig {
            enabled_rules: ["NT001".to_string()].into(),
            disabled_rules: ["NT001".to_string()].into(),
            ..Default::default()
        };
        let err = RuleSet::build(&config).unwrap_err();
        assert!(matches!(err, ConfigurationError::EnableDisableConflict(_)));
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let config = RuleConfig {
            disabled_rules: ["NT999".to_string()].into(),
            ..Default::default()
        };
        assert!(matches!(
            RuleSet::build(&config).unwrap_err(),
            ConfigurationError::UnknownRule(_)
        ));

        let config = RuleConfig {
            severity_overrides: [("NT998".to_string(), Severity::Error)].into(),
            ..Default::default()
        };
        assert!(matches!(
            RuleSet::build(&config).unwrap_err(),
            ConfigurationError::UnknownRule(_)
        ));
    }

    #[test]
    fn test_severity_override() {
        let config = RuleConfig {
            severity_overrides: [("NT001".to_string(), Severity::Critical)].into(),
            ..Default::default()
        };
        let set = RuleSet::build(&config).unwrap();
        let (_, severity) = set
            .rules()
            .iter()
            .find(|(r, _)| r.id == "NT001")
            .unwrap();
        assert_eq!(*severity, Severity::Critical);
    }

    #[test]
    fn test_custom_rule_unknown_predicate() {
        let config = RuleConfig {
            custom_rules: vec![CustomRuleSpec {
                id: "CUST001".to_string(),
                predicate: "nobody_registered_this".to_string(),
                severity: None,
                explanation: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            RuleSet::build(&config).unwrap_err(),
            ConfigurationError::UnknownPredicate { .. }
        ));
    }

    #[test]
    fn test_custom_rule_id_collision() {
        rules::register_predicate("cfg_test_empty", Arc::new(|_| Ok(Vec::new())));
        let config = RuleConfig {
            custom_rules: vec![CustomRuleSpec {
                id: "NT001".to_string(),
                predicate: "cfg_test_empty".to_string(),
                severity: None,
                explanation: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            RuleSet::build(&config).unwrap_err(),
            ConfigurationError::CustomIdCollision(_)
        ));
    }

    #[test]
    fn test_rule_set_debug_names_rules() {
        // `unwrap_err` on build results needs this to format.
        let set = RuleSet::build(&RuleConfig::default()).unwrap();
        let rendered = format!("{:?}", set);
        assert!(rendered.contains("NT001"));
    }

    #[test]
    fn test_fingerprint_tracks_severity() {
        let base = RuleSet::build(&RuleConfig::default()).unwrap();
        let same = RuleSet::build(&RuleConfig::default()).unwrap();
        assert_eq!(base.fingerprint(), same.fingerprint());

        let config = RuleConfig {
            severity_overrides: [("NT001".to_string(), Severity::Critical)].into(),
            ..Default::default()
        };
        let changed = RuleSet::build(&config).unwrap();
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }
}
