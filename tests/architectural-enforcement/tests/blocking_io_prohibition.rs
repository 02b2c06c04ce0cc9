//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in ragchat MUST NOT block the runtime.
//! **Required**: `tokio::net`, `tokio::io` and async reqwest inside `async fn`.
//!
//! Blocking file reads stay acceptable in plain functions that run before
//! any request is made (configuration loading).

use architectural_enforcement::{
    is_in_async_function, production_sources, report, scan_file, Violation,
};

#[test]
fn test_no_blocking_io_in_production_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for path in production_sources() {
        scan_file(&path, &mut violations, |lines, idx, code| {
            if code.contains("reqwest::blocking") {
                return Some("Blocking HTTP client");
            }
            if code.contains("std::net::") || code.contains("use std::net") {
                return Some("Blocking network I/O");
            }
            if !is_in_async_function(lines, idx) {
                return None;
            }
            if code.contains("std::fs::") {
                return Some("Blocking file I/O in async fn");
            }
            if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
                return Some("Blocking stdin/stdout in async fn");
            }
            if code.contains("std::process::Command") {
                return Some("Blocking process I/O in async fn");
            }
            None
        });
    }

    report(
        &violations,
        "Blocking I/O found in production code:",
        "Use tokio::io::stdin/stdout, tokio::net and async reqwest instead.",
    );
}
