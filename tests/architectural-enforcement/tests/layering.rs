//! Integration Test: Session Core Layering
//!
//! **Policy**: `realtime-core` is headless. It propagates errors instead of
//! panicking and knows nothing about terminals, argument parsing or global
//! log subscribers; those belong to surfaces such as `realtime-cli`.

use std::fs;

use architectural_enforcement::{find_violations, workspace_root};

#[test]
fn test_no_panicking_unwraps_in_core() {
    let violations = find_violations(&["realtime/core/src"], &[".unwrap()", ".expect("]);

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in session core production code\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n  ✅ Return a Result and use `?`, or handle the None/Err case");
        panic!("\nFound {} violation(s).", violations.len());
    }
}

#[test]
fn test_core_does_not_install_subscribers() {
    let violations = find_violations(
        &["realtime/core/src"],
        &["tracing_subscriber", "println!", "eprintln!"],
    );

    assert!(
        violations.is_empty(),
        "Session core must log through `tracing` only:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_manifest_has_no_surface_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("realtime/core/Cargo.toml"))
        .expect("core manifest readable");

    let dependencies = manifest
        .split("[dev-dependencies]")
        .next()
        .unwrap_or_default();

    for forbidden in ["clap", "anyhow", "tracing-subscriber", "ratatui", "crossterm"] {
        let declared = dependencies
            .lines()
            .any(|line| line.trim_start().starts_with(&format!("{forbidden} ")));
        assert!(
            !declared,
            "realtime-core must not depend on surface crate `{forbidden}`"
        );
    }
}
