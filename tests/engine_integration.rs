//! End-to-end tests for the extraction + evaluation pipeline.

use std::sync::Arc;
use std::time::Duration;

use tensorlint::engine::{evaluate, BatchDriver, FileOutcome, ResultCache};
use tensorlint::extract::{extract, NamePolicy};
use tensorlint::rules::{self, CustomRuleSpec, RuleConfig, RuleSet};
use tensorlint::{ConfigurationError, Severity, SourceUnit};

fn default_set() -> RuleSet {
    tensorlint::init();
    RuleSet::build(&RuleConfig::default()).unwrap()
}

fn violations_for(source: &str) -> Vec<tensorlint::Violation> {
    let facts = extract(source, &NamePolicy::default()).unwrap();
    evaluate(&facts, &default_set())
}

#[test]
fn nt001_loop_invariant_construction_flagged_once() {
    let violations = violations_for("for i in range(n):\n    t = lib.zeros(10, 10)\n");
    let nt001: Vec<_> = violations.iter().filter(|v| v.rule_id == "NT001").collect();
    assert_eq!(nt001.len(), 1);
    assert_eq!(nt001[0].line, 2);
}

#[test]
fn nt001_induction_dependent_argument_not_flagged() {
    let violations = violations_for("for i in range(n):\n    t = lib.zeros(i, 10)\n");
    assert!(violations.iter().all(|v| v.rule_id != "NT001"));
}

#[test]
fn nt027_inplace_after_tracked_constructor() {
    let violations = violations_for("x = lib.tensor(data)\nx.add_(1)\nloss.backward()\n");
    let nt027: Vec<_> = violations.iter().filter(|v| v.rule_id == "NT027").collect();
    assert_eq!(nt027.len(), 1);
    assert_eq!(nt027[0].line, 2);
}

#[test]
fn nt027_untracked_value_not_flagged() {
    let violations = violations_for("x = 5\nx += 1\n");
    assert!(violations.iter().all(|v| v.rule_id != "NT027"));
}

#[test]
fn determinism_repeated_evaluation_is_identical() {
    let source = std::fs::read_to_string("testdata/train_loop.py").unwrap();
    let facts = extract(&source, &NamePolicy::default()).unwrap();
    let set = default_set();

    let first = evaluate(&facts, &set);
    assert!(!first.is_empty());
    for _ in 0..10 {
        assert_eq!(evaluate(&facts, &set), first);
    }
}

#[test]
fn ordering_invariant_holds() {
    let source = std::fs::read_to_string("testdata/train_loop.py").unwrap();
    let violations = violations_for(&source);
    let keys: Vec<_> = violations
        .iter()
        .map(|v| (v.line, v.column, v.rule_id.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn rule_toggling_removes_exactly_one_rule() {
    let source = std::fs::read_to_string("testdata/train_loop.py").unwrap();
    let all = violations_for(&source);
    assert!(all.iter().any(|v| v.rule_id == "NT001"));
    assert!(all.iter().any(|v| v.rule_id == "NT027"));

    let facts = extract(&source, &NamePolicy::default()).unwrap();
    let config = RuleConfig {
        disabled_rules: ["NT001".to_string()].into(),
        ..Default::default()
    };
    let without = evaluate(&facts, &RuleSet::build(&config).unwrap());

    assert!(without.iter().all(|v| v.rule_id != "NT001"));
    let expected: Vec<_> = all.iter().filter(|v| v.rule_id != "NT001").cloned().collect();
    assert_eq!(without, expected);

    // Re-enabling restores exactly the original output.
    let restored = evaluate(&facts, &default_set());
    assert_eq!(restored, all);
}

#[test]
fn nt014_flags_unguarded_inference_only() {
    let source = std::fs::read_to_string("testdata/inference.py").unwrap();
    let violations = violations_for(&source);
    let nt014: Vec<_> = violations.iter().filter(|v| v.rule_id == "NT014").collect();
    assert_eq!(nt014.len(), 1);
    assert_eq!(nt014[0].line, 5);
}

#[test]
fn clean_file_produces_no_violations() {
    let source = std::fs::read_to_string("testdata/clean.py").unwrap();
    assert!(violations_for(&source).is_empty());
}

#[test]
fn cache_equivalence_with_direct_evaluation() {
    let source = std::fs::read_to_string("testdata/train_loop.py").unwrap();
    let unit = SourceUnit::new("train_loop.py", source.clone());
    let set = default_set();
    let cache = ResultCache::new();

    let result = BatchDriver::new(NamePolicy::default()).analyze_all(
        std::slice::from_ref(&unit),
        &set,
        &cache,
    );

    let facts = extract(&source, &NamePolicy::default()).unwrap();
    let direct = evaluate(&facts, &set);
    assert_eq!(result.files[0].1.violations(), direct.as_slice());

    // The cached entry matches too.
    let cached = cache
        .get("train_loop.py", unit.fingerprint(), set.fingerprint())
        .unwrap();
    assert_eq!(cached, direct);

    // A mismatched fingerprint is never served.
    assert!(cache
        .get("train_loop.py", "stale-fingerprint", set.fingerprint())
        .is_none());
}

#[test]
fn cache_invalidated_by_ruleset_change() {
    let unit = SourceUnit::new("a.py", "for i in range(3):\n    t = torch.zeros(4)\n");
    let cache = ResultCache::new();
    let driver = BatchDriver::new(NamePolicy::default());

    let base_set = default_set();
    driver.analyze_all(std::slice::from_ref(&unit), &base_set, &cache);
    assert!(cache
        .get("a.py", unit.fingerprint(), base_set.fingerprint())
        .is_some());

    let config = RuleConfig {
        severity_overrides: [("NT001".to_string(), Severity::Critical)].into(),
        ..Default::default()
    };
    let changed_set = RuleSet::build(&config).unwrap();
    assert!(cache
        .get("a.py", unit.fingerprint(), changed_set.fingerprint())
        .is_none());

    let result = driver.analyze_all(std::slice::from_ref(&unit), &changed_set, &cache);
    let violations = result.files[0].1.violations();
    assert_eq!(violations[0].severity, Severity::Critical);
}

#[test]
fn panicking_predicate_is_isolated() {
    tensorlint::init();
    rules::register_predicate(
        "integration_always_panics",
        Arc::new(|_| panic!("predicate exploded")),
    );

    let config = RuleConfig {
        custom_rules: vec![CustomRuleSpec {
            id: "XP001".to_string(),
            predicate: "integration_always_panics".to_string(),
            severity: None,
            explanation: None,
        }],
        ..Default::default()
    };
    let set = RuleSet::build(&config).unwrap();

    let facts = extract(
        "for i in range(n):\n    t = lib.zeros(10, 10)\n",
        &NamePolicy::default(),
    )
    .unwrap();
    let violations = evaluate(&facts, &set);

    let synthetic: Vec<_> = violations.iter().filter(|v| v.rule_id == "XP001").collect();
    assert_eq!(synthetic.len(), 1);
    assert_eq!(synthetic[0].severity, Severity::Warning);
    assert!(synthetic[0].message.contains("internal rule failure"));

    // The broken rule did not suppress anyone else's findings.
    assert!(violations.iter().any(|v| v.rule_id == "NT001"));
}

#[test]
fn erroring_predicate_is_isolated() {
    tensorlint::init();
    rules::register_predicate(
        "integration_always_errors",
        Arc::new(|_| anyhow::bail!("lookup failed")),
    );

    let config = RuleConfig {
        custom_rules: vec![CustomRuleSpec {
            id: "XP002".to_string(),
            predicate: "integration_always_errors".to_string(),
            severity: None,
            explanation: None,
        }],
        ..Default::default()
    };
    let set = RuleSet::build(&config).unwrap();
    let facts = extract("x = 1\n", &NamePolicy::default()).unwrap();
    let violations = evaluate(&facts, &set);

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "XP002");
    assert!(violations[0].message.contains("lookup failed"));
}

#[test]
fn invalid_configuration_blocks_the_run() {
    tensorlint::init();
    let config = RuleConfig {
        enabled_rules: ["NT000-no-such-rule".to_string()].into(),
        ..Default::default()
    };
    assert!(matches!(
        RuleSet::build(&config).unwrap_err(),
        ConfigurationError::UnknownRule(_)
    ));
}

#[test]
fn batch_over_testdata_is_ordered_and_isolated() {
    let units = vec![
        SourceUnit::from_file("testdata/train_loop.py").unwrap(),
        SourceUnit::new("broken.py", "def broken(:\n"),
        SourceUnit::from_file("testdata/clean.py").unwrap(),
    ];
    let cache = ResultCache::new();
    let result = BatchDriver::new(NamePolicy::default())
        .per_file_timeout(Some(Duration::from_secs(30)))
        .analyze_all(&units, &default_set(), &cache);

    assert_eq!(result.scanned(), 3);
    let paths: Vec<&str> = result.files.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths[1], "broken.py");
    assert!(matches!(result.files[1].1, FileOutcome::ParseFailed(_)));
    assert!(!result.files[0].1.violations().is_empty());
    assert!(result.files[2].1.violations().is_empty());
}
