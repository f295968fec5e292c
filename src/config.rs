//! Analysis configuration file schema.
//!
//! The YAML file is the CLI's concern; the engine only ever sees the
//! validated in-memory `RuleConfig` and `NamePolicy` this module produces.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extract::NamePolicy;
use crate::rules::RuleConfig;

/// Top-level analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub version: String,
    /// Rule enablement, custom rules and severity overrides.
    pub rules: RuleConfig,
    /// Overrides for the name allow-lists; unset lists keep their defaults.
    pub policy: Option<PolicyOverrides>,
    /// Glob patterns for paths to exclude from scanning.
    pub excluded_paths: Vec<String>,
}

/// Partial override of [`NamePolicy`]: only the lists present in the file
/// replace the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub tensor_constructors: Option<Vec<String>>,
    pub tensor_ops: Option<Vec<String>>,
    pub eval_markers: Option<Vec<String>>,
    pub no_grad_markers: Option<Vec<String>>,
    pub forward_patterns: Option<Vec<String>>,
    pub detach_markers: Option<Vec<String>>,
    pub inplace_suffix: Option<String>,
}

impl AnalysisConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Materialize the effective name policy.
    pub fn name_policy(&self) -> NamePolicy {
        let mut policy = NamePolicy::default();
        if let Some(over) = &self.policy {
            if let Some(v) = &over.tensor_constructors {
                policy.tensor_constructors = v.clone();
            }
            if let Some(v) = &over.tensor_ops {
                policy.tensor_ops = v.clone();
            }
            if let Some(v) = &over.eval_markers {
                policy.eval_markers = v.clone();
            }
            if let Some(v) = &over.no_grad_markers {
                policy.no_grad_markers = v.clone();
            }
            if let Some(v) = &over.forward_patterns {
                policy.forward_patterns = v.clone();
            }
            if let Some(v) = &over.detach_markers {
                policy.detach_markers = v.clone();
            }
            if let Some(v) = &over.inplace_suffix {
                policy.inplace_suffix = v.clone();
            }
        }
        policy
    }

    /// Check if a path matches any exclusion pattern. Uses globset so `**`
    /// matches across directories.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();
        for pattern in &self.excluded_paths {
            if let Ok(glob) = globset::Glob::new(pattern) {
                if glob.compile_matcher().is_match(&*path_str) {
                    return true;
                }
            }
        }
        false
    }
}
