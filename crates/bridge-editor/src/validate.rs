//! `validate(doc)`: basic safety checks plus markdown structural checks
//! (spec §4.2).

use std::path::Path;

use anyhow::{Context, Result};
use bridge_lock::BridgePaths;

use crate::markdown::all_headers;

pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }
}

pub fn validate(project_root: &Path, doc_path: &Path) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    let paths = BridgePaths::new(project_root);
    if let Err(e) = paths.ensure_within_root(doc_path) {
        report.push(format!("path escapes project root: {e}"));
        return Ok(report);
    }

    let bytes = std::fs::read(doc_path)
        .with_context(|| format!("reading {}", doc_path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", doc_path.display()))?;

    report.issues.extend(validate_text(&text).issues);
    Ok(report)
}

/// The structural half of `validate`: size, null bytes, fence balance,
/// frontmatter closure, duplicate headers. Takes a candidate document body
/// directly so the editor's mutation path can run it on content that has
/// not been written to disk yet (spec §4.2 invariant 2: on validation
/// failure the original document is untouched).
pub fn validate_text(text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    if text.len() as u64 > MAX_DOCUMENT_BYTES {
        report.push(format!(
            "document is {} bytes, exceeds the {MAX_DOCUMENT_BYTES} byte limit",
            text.len()
        ));
    }
    if text.as_bytes().contains(&0u8) {
        report.push("document contains a null byte".to_string());
    }

    check_code_fences(text, &mut report);
    check_frontmatter(text, &mut report);
    check_duplicate_headers(text, &mut report);

    report
}

fn is_fence_delimiter(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn check_code_fences(text: &str, report: &mut ValidationReport) {
    let open = text.lines().filter(|l| is_fence_delimiter(l)).count();
    if open % 2 != 0 {
        report.push("unbalanced code fence (odd number of ``` / ~~~ delimiters)".to_string());
    }
}

fn check_frontmatter(text: &str, report: &mut ValidationReport) {
    let mut lines = text.lines();
    let Some(first) = lines.next() else { return };
    if first.trim_end() != "---" {
        return;
    }
    if !lines.any(|l| l.trim_end() == "---") {
        report.push("frontmatter opened with '---' but never closed".to_string());
    }
}

fn check_duplicate_headers(text: &str, report: &mut ValidationReport) {
    let lines: Vec<&str> = text.lines().collect();
    let headers = all_headers(&lines);
    let mut seen = std::collections::HashSet::new();
    for (level, title) in headers {
        if !seen.insert((level, title.clone())) {
            report.push(format!("duplicate header: level {level} '{title}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn clean_document_validates() {
        let td = tempdir().unwrap();
        let path = write(td.path(), "doc.md", "# Title\n\n## A\nbody\n");
        let report = validate(td.path(), &path).unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn rejects_path_outside_root() {
        let td = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let path = write(outside.path(), "doc.md", "# Title\n");
        let report = validate(td.path(), &path).unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn detects_unbalanced_code_fence() {
        let td = tempdir().unwrap();
        let path = write(td.path(), "doc.md", "# Title\n```rust\nfn x() {}\n");
        let report = validate(td.path(), &path).unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn detects_unclosed_frontmatter() {
        let td = tempdir().unwrap();
        let path = write(td.path(), "doc.md", "---\ntitle: x\n\n# Body\n");
        let report = validate(td.path(), &path).unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn detects_duplicate_headers() {
        let td = tempdir().unwrap();
        let path = write(td.path(), "doc.md", "## A\nbody\n## A\nbody two\n");
        let report = validate(td.path(), &path).unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn rejects_document_with_null_byte() {
        let td = tempdir().unwrap();
        let path = td.path().join("doc.md");
        std::fs::write(&path, b"# Title\n\0binary").unwrap();
        let report = validate(td.path(), &path).unwrap();
        assert!(!report.is_valid());
    }
}
