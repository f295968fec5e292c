//! Output formatting for analysis results.
//!
//! Two formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};

use crate::engine::{BatchResult, FileOutcome, Violation};
use crate::rules::Severity;

/// JSON report structure.
#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub files_scanned: usize,
    pub violations: Vec<JsonViolation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_failures: Vec<JsonParseFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_out: Vec<JsonTimeout>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonViolation {
    pub rule_id: String,
    pub severity: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_impact: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonParseFailure {
    pub file: String,
    pub error: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Serialize, Deserialize)]
pub struct JsonTimeout {
    pub file: String,
    pub completed_rules: usize,
}

fn violation_to_json(file: &str, v: &Violation) -> JsonViolation {
    JsonViolation {
        rule_id: v.rule_id.clone(),
        severity: v.severity.to_string(),
        file: file.to_string(),
        line: v.line,
        column: v.column,
        message: v.message.clone(),
        suggestion: v.suggestion.clone(),
        performance_impact: v.performance_impact,
    }
}

/// Write results as JSON to stdout.
pub fn write_json(path: &str, result: &BatchResult) -> anyhow::Result<()> {
    let mut violations = Vec::new();
    let mut parse_failures = Vec::new();
    let mut timed_out = Vec::new();

    for (file, outcome) in &result.files {
        for v in outcome.violations() {
            violations.push(violation_to_json(file, v));
        }
        match outcome {
            FileOutcome::ParseFailed(kind) => {
                let (line, column) = kind.location();
                parse_failures.push(JsonParseFailure {
                    file: file.clone(),
                    error: kind.to_string(),
                    line,
                    column,
                });
            }
            FileOutcome::Partial(partial) => timed_out.push(JsonTimeout {
                file: file.clone(),
                completed_rules: partial.completed_rules,
            }),
            FileOutcome::Completed(_) => {}
        }
    }

    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        files_scanned: result.scanned(),
        violations,
        parse_failures,
        timed_out,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn severity_colored(severity: Severity) -> ColoredString {
    match severity {
        Severity::Info => severity.as_str().cyan(),
        Severity::Warning => severity.as_str().yellow(),
        Severity::Error => severity.as_str().red(),
        Severity::Critical => severity.as_str().red().bold(),
    }
}

/// Write colored human-readable output to stdout.
pub fn write_pretty(path: &str, result: &BatchResult) {
    println!("{} {}", "Analyzing".bold(), path);
    println!();

    let mut total = 0;
    for (file, outcome) in &result.files {
        match outcome {
            FileOutcome::ParseFailed(kind) => {
                println!("{} {}: {}", "parse error".red().bold(), file, kind);
                continue;
            }
            FileOutcome::Partial(partial) => {
                println!(
                    "{} {}: timed out after {} rule(s); results are partial",
                    "timeout".yellow().bold(),
                    file,
                    partial.completed_rules
                );
            }
            FileOutcome::Completed(_) => {}
        }

        for v in outcome.violations() {
            total += 1;
            println!(
                "{}:{}:{} {} [{}] {}",
                file,
                v.line,
                v.column,
                severity_colored(v.severity),
                v.rule_id,
                v.message
            );
            if let Some(suggestion) = &v.suggestion {
                println!("    {} {}", "suggestion:".dimmed(), suggestion);
            }
        }
    }

    println!();
    if total == 0 {
        println!(
            "{} {} file(s) scanned, no violations",
            "OK".green().bold(),
            result.scanned()
        );
    } else {
        println!(
            "{} {} violation(s) across {} file(s)",
            "FOUND".red().bold(),
            total,
            result.scanned()
        );
    }
}
