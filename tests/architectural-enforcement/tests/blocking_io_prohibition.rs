//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: The session core runs on the tokio runtime. Production code
//! MUST NOT park runtime threads.
//! **Required**: `tokio::time::sleep`, `tokio::net`, async channels.
//!
//! Blocking config reads (`std::fs` in sync functions, before any connection
//! is opened) are acceptable and not checked here.

use architectural_enforcement::find_violations;

const PRODUCTION_DIRS: &[&str] = &["realtime/core/src", "realtime/cli/src"];

fn report(title: &str, violations: &[String], help: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in help {
        eprintln!("  ✅ {line}");
    }

    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations = find_violations(PRODUCTION_DIRS, &["std::thread::sleep", "thread::sleep("]);

    report(
        "Thread sleeps found in production code",
        &violations,
        &[
            "tokio::time::sleep(d).await",
            "tokio::time::interval for periodic work",
        ],
    );
}

#[test]
fn test_no_blocking_network_io() {
    let violations = find_violations(
        &["realtime/core/src"],
        &["std::net::", "use std::net", "tungstenite::connect("],
    );

    report(
        "Blocking network I/O found in the session core",
        &violations,
        &[
            "tokio_tungstenite::connect_async(url).await",
            "tokio::net for raw sockets",
        ],
    );
}

#[test]
fn test_no_nested_runtimes() {
    let violations = find_violations(
        PRODUCTION_DIRS,
        &["block_on(", "Runtime::new(", "blocking_recv(", "blocking_send("],
    );

    report(
        "Runtime blocking calls found in production code",
        &violations,
        &["Await the future from the surrounding async context"],
    );
}
