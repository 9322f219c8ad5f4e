//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the assistant crates:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! The helpers here are a line-based scanner, not a parser. They assume the
//! workspace convention that unit tests live in a `#[cfg(test)]` module at the
//! bottom of each file.

use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["assistant/core/src", "assistant/cli/src"];

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A Rust source file split into lines
#[derive(Debug)]
pub struct SourceFile {
    /// Path of the file
    pub path: PathBuf,
    /// Raw lines
    pub lines: Vec<String>,
    /// Index of the first line of the test module, if any
    pub test_start: Option<usize>,
}

impl SourceFile {
    /// Split source text into lines
    #[must_use]
    pub fn parse(path: PathBuf, content: &str) -> Self {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let test_start = lines.iter().position(|l| l.trim() == "#[cfg(test)]");
        Self {
            path,
            lines,
            test_start,
        }
    }

    /// Whether a line belongs to the test module
    #[must_use]
    pub fn is_test_line(&self, idx: usize) -> bool {
        self.test_start.is_some_and(|start| idx >= start)
    }

    /// Format a violation for the report
    #[must_use]
    pub fn violation(&self, idx: usize, kind: &str) -> String {
        format!(
            "{}:{} - {kind}: {}",
            self.path.display(),
            idx + 1,
            self.lines[idx].trim()
        )
    }
}

/// Every `.rs` file below the production trees
#[must_use]
pub fn production_files() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(path) {
                files.push(SourceFile::parse(path.to_path_buf(), &content));
            }
        }
    }
    files
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a header line declares
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// Plain `fn`
    Sync,
}

/// Recognize a function header, ignoring visibility and qualifiers
#[must_use]
pub fn fn_header(line: &str) -> Option<FnKind> {
    let mut rest = line.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Kind of the closest function header at or above `idx`
#[must_use]
pub fn enclosing_fn(lines: &[String], idx: usize) -> Option<FnKind> {
    lines[..=idx].iter().rev().find_map(|line| fn_header(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_fn_header_detection() {
        assert_eq!(fn_header("    pub async fn load(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_header("pub(crate) fn now_ms() -> u64 {"), Some(FnKind::Sync));
        assert_eq!(fn_header("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_header("let f = async move {"), None);
    }

    #[test]
    fn test_enclosing_async_function() {
        let code = lines(&[
            "pub async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ]);
        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Async));
    }

    #[test]
    fn test_enclosing_sync_function() {
        let code = lines(&[
            "pub fn load_config() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ]);
        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Sync));
    }

    #[test]
    fn test_test_module_detection() {
        let file = SourceFile::parse(
            PathBuf::from("lib.rs"),
            "fn real() {}\n\n#[cfg(test)]\nmod tests {\n    fn helper() {}\n}\n",
        );
        assert!(!file.is_test_line(0));
        assert!(file.is_test_line(4));
    }

    #[test]
    fn test_production_trees_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).is_dir(), "{dir} is missing");
        }
    }
}
