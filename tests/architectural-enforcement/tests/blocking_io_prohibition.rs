//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the assistant crates MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::net`, `tokio::process`, not `std::fs`, `std::net`, `std::process`
//!
//! Blocking calls are fine in plain functions that run before the runtime
//! starts, such as configuration loading, and in test code.

use architectural_enforcement::{code_part, enclosing_fn, production_files, FnKind, SourceFile};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let files = production_files();
    assert!(!files.is_empty(), "no production sources found");

    let violations: Vec<String> = files.iter().flat_map(find_violations).collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async functions:");
        eprintln!("  - std::fs::read_to_string(), std::fs::File, Path::exists()");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await, tokio::fs::metadata().await");
        eprintln!("  - tokio::process::Command::output().await");
        eprintln!("  - tokio::io::stdout() with AsyncWriteExt");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_violations(file: &SourceFile) -> Vec<String> {
    let mut violations = Vec::new();

    for (idx, line) in file.lines.iter().enumerate() {
        if file.is_test_line(idx) {
            break;
        }
        let code = code_part(line);

        // Never acceptable, whatever the context
        if code.contains("reqwest::blocking") {
            violations.push(file.violation(idx, "Blocking HTTP client"));
        }
        if code.contains("std::process::Command") {
            violations.push(file.violation(idx, "Blocking process I/O"));
        }
        if code.contains("std::net::") || code.trim_start().starts_with("use std::net") {
            violations.push(file.violation(idx, "Blocking network I/O"));
        }

        if enclosing_fn(&file.lines, idx) != Some(FnKind::Async) {
            continue;
        }

        if code.contains("std::fs::") {
            violations.push(file.violation(idx, "Blocking file I/O in async"));
        }
        if !code.contains("tokio::fs")
            && (code.contains(".exists()") || code.contains(".is_file()") || code.contains(".is_dir()"))
        {
            violations.push(file.violation(idx, "Blocking metadata lookup in async"));
        }
        if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            violations.push(file.violation(idx, "Blocking stdin/stdout in async"));
        }
    }

    violations
}

#[test]
fn test_detector_flags_blocking_read_in_async() {
    let file = SourceFile::parse(
        "bad.rs".into(),
        "pub async fn load() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
    );
    assert_eq!(find_violations(&file).len(), 1);
}

#[test]
fn test_detector_allows_blocking_read_before_runtime() {
    let file = SourceFile::parse(
        "ok.rs".into(),
        "pub fn load() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
    );
    assert!(find_violations(&file).is_empty());
}

#[test]
fn test_detector_allows_tokio_metadata() {
    let file = SourceFile::parse(
        "ok.rs".into(),
        "async fn scan() {\n    let ok = tokio::fs::metadata(&p).await.is_ok_and(|m| m.is_file());\n}\n",
    );
    assert!(find_violations(&file).is_empty());
}
