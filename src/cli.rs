//! Command-line interface for tensorlint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use crate::config::AnalysisConfig;
use crate::engine::{BatchDriver, FileOutcome, ResultCache};
use crate::report;
use crate::rules::{self, RuleSet, Severity};
use crate::source::SourceUnit;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default configuration file names to search for.
const DEFAULT_CONFIG_NAMES: &[&str] = &["tensorlint.yaml", ".tensorlint.yaml"];

/// Static analyzer for tensor-computation Python code.
///
/// Tensorlint parses Python source, derives a structural fact set and
/// evaluates a configurable rule set against it, flagging anti-patterns in
/// training and inference code: tensors rebuilt inside loops, inference
/// without eval mode, in-place mutation of gradient-tracked values.
#[derive(Parser)]
#[command(name = "tensorlint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or directory
    #[command(visible_alias = "lint")]
    Check(CheckArgs),
    /// Create a starter configuration file
    Init(InitArgs),
    /// List registered rules
    Rules,
}

/// Arguments for the check command.
#[derive(Parser)]
pub struct CheckArgs {
    /// Path to analyze (file or directory)
    pub path: PathBuf,

    /// Path to configuration YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Per-file timeout in milliseconds (0 disables the deadline)
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,

    /// Exit non-zero when a violation at or above this severity exists
    #[arg(long, default_value = "warning")]
    pub fail_on: Severity,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "tensorlint.yaml")]
    pub output: PathBuf,
}

const DEFAULT_TEMPLATE: &str = include_str!("templates/default.yaml");

/// Discover a configuration file in the current directory.
fn discover_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Collect Python files under a root, honoring the exclusion patterns.
fn collect_files(root: &Path, config: &AnalysisConfig) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // The root itself is always kept, whatever its name.
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories and common vendored trees
            if e.file_type().is_dir()
                && (name.starts_with('.') || name == "__pycache__" || name == "node_modules")
            {
                return false;
            }
            true
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext == "py" && !config.is_path_excluded(path) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Run the check command.
pub fn run_check(args: &CheckArgs) -> anyhow::Result<i32> {
    crate::init();

    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let config = match args.config.clone().or_else(discover_config) {
        Some(path) => match AnalysisConfig::parse_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error parsing configuration: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
        None => AnalysisConfig::default(),
    };

    // An invalid rule configuration blocks the whole run: no file is
    // analyzed with an inconsistent rule set.
    let rule_set = match RuleSet::build(&config.rules) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error: invalid rule configuration: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    let files = if metadata.is_dir() {
        collect_files(&args.path, &config)?
    } else {
        vec![args.path.clone()]
    };

    if files.is_empty() {
        eprintln!("Warning: no Python files to analyze");
        return Ok(EXIT_SUCCESS);
    }

    let mut units = Vec::new();
    for file in &files {
        match SourceUnit::from_file(file) {
            Ok(unit) => units.push(unit),
            Err(e) => eprintln!("Warning: skipping {}: {}", file.display(), e),
        }
    }

    let timeout = if args.timeout_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(args.timeout_ms))
    };

    let cache = ResultCache::new();
    let driver = BatchDriver::new(config.name_policy()).per_file_timeout(timeout);
    let result = driver.analyze_all(&units, &rule_set, &cache);

    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&path_str, &result)?,
        _ => report::write_pretty(&path_str, &result),
    }

    let failed = result.files.iter().any(|(_, outcome)| {
        matches!(outcome, FileOutcome::ParseFailed(_))
            || outcome.violations().iter().any(|v| v.severity >= args.fail_on)
    });

    if failed {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        return Ok(EXIT_ERROR);
    }

    if let Err(e) = std::fs::write(&args.output, DEFAULT_TEMPLATE) {
        eprintln!("Error: failed to write configuration: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to customize rules", args.output.display());
    println!("  2. Run: tensorlint check . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

/// Run the rules command: list everything in the registry.
pub fn run_rules() -> anyhow::Result<i32> {
    crate::init();

    println!("Registered rules:");
    println!();
    for rule in rules::all() {
        println!(
            "  {:<8} {:<12} {:<9} {}",
            rule.id,
            rule.category.to_string(),
            rule.default_severity.to_string(),
            rule.explanation
        );
    }

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_filters_python() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("train.py"), "x = 1\n").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "hi\n").unwrap();
        std::fs::create_dir(temp.path().join("__pycache__")).unwrap();
        std::fs::write(temp.path().join("__pycache__/train.py"), "x = 1\n").unwrap();

        let files = collect_files(temp.path(), &AnalysisConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("train.py"));
    }

    #[test]
    fn test_collect_files_hidden_root_is_scanned() {
        // `tensorlint check .` and dot-named roots must not be pruned by the
        // hidden-directory filter; only descendants are.
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join(".workspace");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("model.py"), "x = 1\n").unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/hook.py"), "x = 1\n").unwrap();

        let files = collect_files(&root, &AnalysisConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("model.py"));
    }

    #[test]
    fn test_default_template_parses() {
        let config: AnalysisConfig = serde_yaml::from_str(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(config.version, "1");
        assert!(!config.excluded_paths.is_empty());
    }
}
