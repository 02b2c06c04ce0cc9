//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep production code honest:
//! - No blocking I/O inside async code
//! - No sleeping in production code
//! - No `unwrap()`/`expect()` outside tests
//!
//! The scans are line based. Everything from the first `#[cfg(test)]` line
//! of a file onwards is treated as test code, which matches how unit tests
//! are laid out in this workspace.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["ragchat/core/src", "ragchat/cli/src"];

/// A rule broken at a specific line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// What was found
    pub kind: &'static str,
    /// The offending line, trimmed
    pub line: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line_number,
            self.kind,
            self.line
        )
    }
}

/// Workspace root, independent of the directory tests are run from
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files under the production directories
#[must_use]
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "missing source directory {}", path.display());
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    files
}

/// Lines of a file that precede its test module
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| line.trim() != "#[cfg(test)]")
        .collect()
}

/// Code portion of a line, without trailing `//` comments
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a line opens a function, and if so whether it is async
#[must_use]
pub fn fn_signature(line: &str) -> Option<bool> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    if rest.starts_with("async fn ") {
        Some(true)
    } else if rest.starts_with("fn ") || rest.starts_with("const fn ") {
        Some(false)
    } else {
        None
    }
}

/// Whether the line at `idx` sits in the body of an `async fn`
#[must_use]
pub fn is_in_async_function(lines: &[&str], idx: usize) -> bool {
    for i in (0..=idx).rev() {
        if let Some(is_async) = fn_signature(lines[i]) {
            return is_async;
        }
        let line = lines[i].trim();
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Read a file and check each production line with `check`
pub fn scan_file<F>(path: &Path, violations: &mut Vec<Violation>, mut check: F)
where
    F: FnMut(&[&str], usize, &str) -> Option<&'static str>,
{
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines = production_lines(&content);
    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if code.trim().is_empty() {
            continue;
        }
        if let Some(kind) = check(&lines, idx, code) {
            violations.push(Violation {
                path: path.to_path_buf(),
                line_number: idx + 1,
                kind,
                line: line.trim().to_string(),
            });
        }
    }
}

/// Print violations and fail the calling test
pub fn report(violations: &[Violation], rule: &str, remedy: &str) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{rule}\n");
    for violation in violations {
        eprintln!("  {violation}");
    }
    eprintln!("\n{remedy}");
    panic!(
        "\nFound {} violation(s) in production code.",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature_detection() {
        assert_eq!(fn_signature("    pub async fn submit(&mut self) {"), Some(true));
        assert_eq!(fn_signature("async fn helper() {"), Some(true));
        assert_eq!(fn_signature("pub(crate) fn build() {"), Some(false));
        assert_eq!(fn_signature("    fn finalize(&mut self) {"), Some(false));
        assert_eq!(fn_signature("let f = async move {"), None);
    }

    #[test]
    fn test_async_scope_detection() {
        let code = vec![
            "pub async fn load() {",
            "    let text = std::fs::read_to_string(\"f\");",
            "}",
            "pub fn load_sync() {",
            "    let text = std::fs::read_to_string(\"f\");",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_test_module_is_excluded() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}"]);
    }

    #[test]
    fn test_comments_are_ignored() {
        assert_eq!(code_part("let x = 1; // then .unwrap()"), "let x = 1; ");
        assert_eq!(code_part("/// docs .unwrap()"), "");
    }

    #[test]
    fn test_workspace_root_has_production_dirs() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "{dir} not found under {}", root.display());
        }
    }
}
