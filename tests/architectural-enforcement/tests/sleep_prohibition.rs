//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code waits on I/O, never on a timer. Streams end
//! when the server says so; there is no polling loop to pace.

use architectural_enforcement::{production_sources, report, scan_file, Violation};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for path in production_sources() {
        scan_file(&path, &mut violations, |_, _, code| {
            if code.contains("thread::sleep") {
                Some("Thread sleep")
            } else if code.contains("time::sleep") {
                Some("Async sleep")
            } else {
                None
            }
        });
    }

    report(
        &violations,
        "Sleep calls found in production code:",
        "Await the channel or the response body instead of sleeping.",
    );
}
