//! Blocking Call Prohibition
//!
//! Fails the build if production relay code calls blocking APIs where a
//! tokio worker could run them. Test code is exempt.

use architectural_enforcement::{
    rust_sources, scan_production_sources, workspace_root, BLOCKING_RULES,
    PRODUCTION_SOURCE_DIRS,
};

#[test]
fn test_production_sources_are_scanned() {
    let root = workspace_root();
    for dir in PRODUCTION_SOURCE_DIRS {
        assert!(
            !rust_sources(&root.join(dir)).is_empty(),
            "no sources found under {dir}"
        );
    }
}

#[test]
fn test_no_blocking_calls_in_production_code() {
    let violations = scan_production_sources(BLOCKING_RULES);

    if !violations.is_empty() {
        eprintln!("\nBlocking calls found in async code paths:\n");
        for violation in &violations {
            eprintln!("{violation}\n");
        }
        panic!(
            "{} blocking call(s) in production code; see list above",
            violations.len()
        );
    }
}
