//! Architectural Enforcement
//!
//! Source scanning shared by the enforcement tests under `tests/`. The relay
//! runs every session on the tokio runtime, so a single blocking call in a
//! production path stalls every stream sharing that worker.
//!
//! Scanning is line based:
//! - Comments (`//`, `///`, `//!`) are ignored
//! - Everything from the first `#[cfg(test)]` onward is test code
//! - A rule may apply everywhere, or only inside `async fn` bodies

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Crate source trees that ship in the daemon binary
pub const PRODUCTION_SOURCE_DIRS: &[&str] = &["relay/core/src", "relay/daemon/src"];

/// Where a rule applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Any non-test production line
    Everywhere,
    /// Only lines whose enclosing function is `async fn`
    AsyncOnly,
}

/// A forbidden pattern
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Substring that triggers the rule
    pub pattern: &'static str,
    /// Where the rule applies
    pub scope: Scope,
    /// What to use instead
    pub hint: &'static str,
}

/// Blocking calls that must never run on a runtime worker
pub const BLOCKING_RULES: &[Rule] = &[
    Rule {
        pattern: "std::thread::sleep",
        scope: Scope::Everywhere,
        hint: "use tokio::time::sleep",
    },
    Rule {
        pattern: "reqwest::blocking",
        scope: Scope::Everywhere,
        hint: "use the async reqwest::Client",
    },
    Rule {
        pattern: "block_on(",
        scope: Scope::Everywhere,
        hint: "await the future instead",
    },
    Rule {
        pattern: "std::fs::",
        scope: Scope::AsyncOnly,
        hint: "use tokio::fs or move the read into a sync fn",
    },
    Rule {
        pattern: "std::net::TcpStream",
        scope: Scope::AsyncOnly,
        hint: "use tokio::net::TcpStream",
    },
];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Pattern that matched
    pub pattern: &'static str,
    /// Suggested replacement
    pub hint: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: `{}` ({})\n    {}",
            self.path.display(),
            self.line,
            self.pattern,
            self.hint,
            self.text
        )
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files below `dir`, sorted
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "rs"))
        .collect();
    files.sort();
    files
}

/// Scan one file's contents against `rules`
#[must_use]
pub fn scan_source(path: &Path, content: &str, rules: &[Rule]) -> Vec<Violation> {
    let lines: Vec<&str> = content.lines().collect();
    let mut violations = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }

        let code = strip_comment(trimmed);
        if code.is_empty() {
            continue;
        }

        for rule in rules {
            if !code.contains(rule.pattern) {
                continue;
            }
            if rule.scope == Scope::AsyncOnly && !is_in_async_function(&lines, idx) {
                continue;
            }
            violations.push(Violation {
                path: path.to_path_buf(),
                line: idx + 1,
                pattern: rule.pattern,
                hint: rule.hint,
                text: trimmed.to_string(),
            });
        }
    }

    violations
}

/// Scan every production source file
///
/// # Panics
///
/// Panics if a source file cannot be read.
#[must_use]
pub fn scan_production_sources(rules: &[Rule]) -> Vec<Violation> {
    let root = workspace_root();
    PRODUCTION_SOURCE_DIRS
        .iter()
        .flat_map(|dir| rust_sources(&root.join(dir)))
        .flat_map(|path| {
            let content = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
            scan_source(&path, &content, rules)
        })
        .collect()
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

/// Whether the nearest enclosing function header is `async fn`
fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for line in lines[..=current_idx].iter().rev() {
        let code = strip_comment(line.trim());
        if code.contains("async fn ") {
            return true;
        }
        if code.contains("fn ") {
            return false;
        }
        if code.starts_with("mod ") || code.starts_with("impl ") {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(content: &str) -> Vec<Violation> {
        scan_source(Path::new("sample.rs"), content, BLOCKING_RULES)
    }

    #[test]
    fn test_sleep_is_flagged_everywhere() {
        let found = scan("fn wait() {\n    std::thread::sleep(d);\n}\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].pattern, "std::thread::sleep");
    }

    #[test]
    fn test_fs_only_flagged_in_async_fn() {
        let sync = "pub fn load() {\n    let s = std::fs::read_to_string(p);\n}\n";
        assert!(scan(sync).is_empty());

        let async_fn = "pub async fn load() {\n    let s = std::fs::read_to_string(p);\n}\n";
        assert_eq!(scan(async_fn).len(), 1);
    }

    #[test]
    fn test_comments_and_test_module_are_ignored() {
        let content = "\
/// Never call std::thread::sleep here
fn ok() {} // reqwest::blocking is banned

#[cfg(test)]
mod tests {
    fn helper() { std::thread::sleep(d); }
}
";
        assert!(scan(content).is_empty());
    }

    #[test]
    fn test_workspace_root_contains_relay() {
        assert!(workspace_root().join("relay/core/src/lib.rs").is_file());
    }
}
