//! Result cache keyed by (path, content fingerprint, ruleset fingerprint).
//!
//! Unbounded, in-memory, lives for the process. Safe for concurrent access
//! from batch workers; last-write-wins on `put` is fine because identical
//! inputs always yield identical outputs, so concurrent writes for the same
//! key are idempotent.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::engine::Violation;

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    ruleset_fingerprint: String,
    violations: Vec<Violation>,
}

/// Shared violation cache. One entry per path; replaced atomically whenever
/// either fingerprint changes.
#[derive(Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached violations, only on an exact fingerprint-pair match. A stale
    /// entry (either fingerprint differs) is never returned.
    pub fn get(
        &self,
        path: &str,
        fingerprint: &str,
        ruleset_fingerprint: &str,
    ) -> Option<Vec<Violation>> {
        let entries = self.entries.read().unwrap();
        entries.get(path).and_then(|entry| {
            if entry.fingerprint == fingerprint && entry.ruleset_fingerprint == ruleset_fingerprint
            {
                Some(entry.violations.clone())
            } else {
                None
            }
        })
    }

    /// Store a result, replacing any prior entry for the path.
    pub fn put(
        &self,
        path: &str,
        fingerprint: &str,
        ruleset_fingerprint: &str,
        violations: Vec<Violation>,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            path.to_string(),
            CacheEntry {
                fingerprint: fingerprint.to_string(),
                ruleset_fingerprint: ruleset_fingerprint.to_string(),
                violations,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;

    fn violation(rule_id: &str) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            severity: Severity::Warning,
            line: 1,
            column: 1,
            message: "test".to_string(),
            suggestion: None,
            performance_impact: None,
        }
    }

    #[test]
    fn test_hit_requires_both_fingerprints() {
        let cache = ResultCache::new();
        cache.put("a.py", "content-1", "rules-1", vec![violation("NT001")]);

        assert!(cache.get("a.py", "content-1", "rules-1").is_some());
        assert!(cache.get("a.py", "content-2", "rules-1").is_none());
        assert!(cache.get("a.py", "content-1", "rules-2").is_none());
        assert!(cache.get("b.py", "content-1", "rules-1").is_none());
    }

    #[test]
    fn test_put_replaces_entry() {
        let cache = ResultCache::new();
        cache.put("a.py", "content-1", "rules-1", vec![violation("NT001")]);
        cache.put("a.py", "content-2", "rules-1", vec![]);

        // Old entry is gone entirely, not partially updated.
        assert!(cache.get("a.py", "content-1", "rules-1").is_none());
        assert_eq!(cache.get("a.py", "content-2", "rules-1").unwrap().len(), 0);
        assert_eq!(cache.len(), 1);
    }
}
