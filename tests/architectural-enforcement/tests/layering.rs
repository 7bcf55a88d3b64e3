//! Layering rules for the workspace
//!
//! `mark-core` is a library with no terminal: output goes through
//! `DisplaySink` and input through `UserPrompter`. Only the `mark` binary may
//! touch the terminal.

use std::fs;

use architectural_enforcement::{find_violations, workspace_root, Violation};

fn report(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for v in violations {
        eprintln!("  ❌ {v}");
    }
    panic!("Found {} violation(s): {rule}", violations.len());
}

#[test]
fn test_core_manifest_has_no_terminal_crates() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/core/Cargo.toml"))
        .expect("core manifest should be readable");
    for line in manifest.lines() {
        let name = line.split('=').next().unwrap_or("").trim();
        assert!(
            !matches!(name, "crossterm" | "ratatui" | "termion"),
            "mark-core must not depend on {name}"
        );
    }
}

#[test]
fn test_core_never_touches_the_terminal() {
    let src = workspace_root().join("conductor/core/src");
    assert!(src.exists(), "core sources not found at {}", src.display());
    report(
        "mark-core must render through DisplaySink",
        &find_violations(
            &src,
            &["crossterm", "ratatui", "println!", "eprintln!", "print!(", "std::io::stdin"],
        ),
    );
}

#[test]
fn test_no_thread_sleep_in_production_code() {
    let root = workspace_root();
    let mut violations = find_violations(&root.join("conductor/core/src"), &["thread::sleep"]);
    violations.extend(find_violations(&root.join("cli/src"), &["thread::sleep"]));
    report("use tokio::time::sleep in async code", &violations);
}

#[test]
fn test_no_blocking_http_client() {
    let root = workspace_root();
    let mut violations = find_violations(&root.join("conductor/core/src"), &["reqwest::blocking"]);
    violations.extend(find_violations(&root.join("cli/src"), &["reqwest::blocking"]));
    report("HTTP calls must be async", &violations);
}
