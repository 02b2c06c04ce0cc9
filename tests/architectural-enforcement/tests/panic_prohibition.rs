//! Integration Test: Panic-free Production Code
//!
//! **Policy**: Library and binary code propagate errors with `?`. Panicking
//! shortcuts are only allowed in test modules.

use architectural_enforcement::{production_sources, report, scan_file, Violation};

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for path in production_sources() {
        scan_file(&path, &mut violations, |_, _, code| {
            if code.contains(".unwrap()") {
                Some("unwrap()")
            } else if code.contains(".expect(") {
                Some("expect()")
            } else {
                None
            }
        });
    }

    report(
        &violations,
        "Panicking calls found in production code:",
        "Return a Result and propagate with `?`, or handle the None/Err case.",
    );
}
