//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. They enforce
//! the layering of the workspace:
//!
//! - `mark-core` stays headless (no terminal crates, no printing)
//! - no thread-blocking sleeps in async code
//! - no blocking HTTP client

use std::fs;
use std::path::{Path, PathBuf};

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, resolved from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("rs"))
        .collect();
    files.sort();
    files
}

/// Lines of `content` before its test module, with comments removed
///
/// Everything from the first `#[cfg(test)]` on is treated as test code.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or("").trim();
            (!code.is_empty()).then(|| (idx + 1, code.to_string()))
        })
        .collect()
}

/// Production lines under `dir` containing any of `patterns`
#[must_use]
pub fn find_violations(dir: &Path, patterns: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for path in rust_sources(dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for (line, code) in production_lines(&content) {
            if patterns.iter().any(|p| code.contains(p)) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: code,
                });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// note\nlet x = 1; // trailing\n#[cfg(test)]\nmod tests {}\n";
        assert_eq!(
            production_lines(source),
            vec![(1, "fn a() {}".to_string()), (3, "let x = 1;".to_string())]
        );
    }
}
