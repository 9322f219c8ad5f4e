//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the assistant crates MUST NOT call sleep methods.
//! Waiting happens on I/O, watch channels or timeouts, never on a clock.
//!
//! Test code is exempt.

use architectural_enforcement::{code_part, production_files, SourceFile};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let files = production_files();
    assert!(!files.is_empty(), "no production sources found");

    let violations: Vec<String> = files.iter().flat_map(find_violations).collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE waiting:");
        eprintln!("  - watch::Receiver::changed() / wait_for()");
        eprintln!("  - tokio::time::timeout() around real I/O");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_violations(file: &SourceFile) -> Vec<String> {
    file.lines
        .iter()
        .enumerate()
        .take_while(|(idx, _)| !file.is_test_line(*idx))
        .filter(|(_, line)| {
            let code = code_part(line);
            code.contains("::sleep(") || code.contains(".sleep(")
        })
        .map(|(idx, _)| file.violation(idx, "Sleep call"))
        .collect()
}

#[test]
fn test_detector_ignores_test_module() {
    let file = SourceFile::parse(
        "ok.rs".into(),
        "fn run() {}\n\n#[cfg(test)]\nmod tests {\n    async fn t() { tokio::time::sleep(d).await; }\n}\n",
    );
    assert!(find_violations(&file).is_empty());
}

#[test]
fn test_detector_flags_sleep() {
    let file = SourceFile::parse(
        "bad.rs".into(),
        "async fn poll() {\n    tokio::time::sleep(d).await;\n}\n",
    );
    assert_eq!(find_violations(&file).len(), 1);
}
