//! Pure, line-oriented markdown mutation. No parser dependency: sections are
//! located the way the spec describes them — by header text and nesting
//! level — rather than through a full AST.

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub header_line: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub level: usize,
}

fn header_level(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].trim_start();
    if rest.is_empty() && trimmed.len() == hashes {
        return None; // bare "#" with nothing after is not a header we track
    }
    Some((hashes, rest))
}

/// Find the section whose header text matches `title` exactly. Returns the
/// header line index, the body range `[body_start, body_end)`, and the
/// header's nesting level.
pub fn find_section(lines: &[&str], title: &str) -> Option<Section> {
    let (header_line, level) = lines.iter().enumerate().find_map(|(i, l)| {
        let (level, text) = header_level(l)?;
        (text == title).then_some((i, level))
    })?;
    let body_start = header_line + 1;
    let body_end = lines[body_start..]
        .iter()
        .position(|l| header_level(l).is_some_and(|(lvl, _)| lvl <= level))
        .map(|offset| body_start + offset)
        .unwrap_or(lines.len());
    Some(Section {
        header_line,
        body_start,
        body_end,
        level,
    })
}

pub fn all_headers(lines: &[&str]) -> Vec<(usize, String)> {
    lines
        .iter()
        .filter_map(|l| header_level(l).map(|(lvl, text)| (lvl, text.to_string())))
        .collect()
}

/// First non-blank line of `text`, used by the idempotency check.
pub fn first_nonblank_line(text: &str) -> Option<&str> {
    text.lines().find(|l| !l.trim().is_empty())
}

pub fn doc_contains_line(doc: &str, needle: &str) -> bool {
    let needle = needle.trim();
    doc.lines().any(|l| l.trim() == needle)
}

/// `append_section`: if `section_title` is empty, append to the end of the
/// document. Otherwise locate the section and insert before its end
/// boundary, or create a new `##`-level section at the end if absent.
pub fn append_section(doc: &str, section_title: &str, content: &str) -> String {
    if section_title.is_empty() {
        return append_to_end(doc, content);
    }
    let lines: Vec<&str> = doc.lines().collect();
    match find_section(&lines, section_title) {
        Some(section) => {
            let mut out: Vec<String> = lines[..section.body_end].iter().map(|s| s.to_string()).collect();
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            out.push(content.trim_end().to_string());
            out.extend(lines[section.body_end..].iter().map(|s| s.to_string()));
            out.join("\n") + "\n"
        }
        None => {
            let header = format!("## {section_title}");
            append_to_end(doc, &format!("{header}\n\n{content}"))
        }
    }
}

fn append_to_end(doc: &str, content: &str) -> String {
    if doc.trim().is_empty() {
        return format!("{}\n", content.trim_end());
    }
    let mut out = doc.trim_end().to_string();
    out.push_str("\n\n");
    out.push_str(content.trim_end());
    out.push('\n');
    out
}

/// `update_section`: replace the body of `section_title` entirely. Errors if
/// the section does not exist.
pub fn update_section(doc: &str, section_title: &str, content: &str) -> Result<String> {
    let lines: Vec<&str> = doc.lines().collect();
    let Some(section) = find_section(&lines, section_title) else {
        bail!("section '{section_title}' not found");
    };
    let mut out: Vec<String> = lines[..=section.header_line].iter().map(|s| s.to_string()).collect();
    out.push(String::new());
    out.push(content.trim_end().to_string());
    if section.body_end < lines.len() {
        out.push(String::new());
    }
    out.extend(lines[section.body_end..].iter().map(|s| s.to_string()));
    Ok(out.join("\n") + "\n")
}

/// `insert_after`: locate the first literal occurrence of `marker_line` and
/// insert `content` immediately after it. Returns whether the marker was
/// found; when it isn't, the content is appended to the end instead.
pub fn insert_after(doc: &str, marker_line: &str, content: &str) -> (String, bool) {
    let lines: Vec<&str> = doc.lines().collect();
    let marker = marker_line.trim_end();
    match lines.iter().position(|l| l.trim_end() == marker) {
        Some(idx) => {
            let mut out: Vec<String> = lines[..=idx].iter().map(|s| s.to_string()).collect();
            out.push(content.trim_end().to_string());
            out.extend(lines[idx + 1..].iter().map(|s| s.to_string()));
            (out.join("\n") + "\n", true)
        }
        None => (append_to_end(doc, content), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_section_bounded_by_same_level_header() {
        let doc = "# Title\n\n## A\nbody a\n\n## B\nbody b\n";
        let lines: Vec<&str> = doc.lines().collect();
        let section = find_section(&lines, "A").unwrap();
        assert_eq!(section.level, 2);
        assert_eq!(&lines[section.body_start..section.body_end], &["body a", ""]);
    }

    #[test]
    fn nested_subsection_does_not_end_parent_section() {
        let doc = "## A\nintro\n### Sub\nsub body\n## B\n";
        let lines: Vec<&str> = doc.lines().collect();
        let section = find_section(&lines, "A").unwrap();
        assert_eq!(section.body_end, 4); // stops at "## B", not "### Sub"
    }

    #[test]
    fn append_section_inserts_before_next_header() {
        let doc = "## A\nfirst\n## B\nsecond\n";
        let out = append_section(doc, "A", "new line");
        assert!(out.contains("first"));
        assert!(out.contains("new line"));
        let a_idx = out.find("first").unwrap();
        let b_idx = out.find("## B").unwrap();
        let new_idx = out.find("new line").unwrap();
        assert!(a_idx < new_idx && new_idx < b_idx);
    }

    #[test]
    fn append_section_creates_missing_section() {
        let out = append_section("# Title\n", "Notes", "hello");
        assert!(out.contains("## Notes"));
        assert!(out.contains("hello"));
    }

    #[test]
    fn append_section_empty_title_appends_to_end() {
        let out = append_section("line one\n", "", "line two");
        assert_eq!(out, "line one\n\nline two\n");
    }

    #[test]
    fn update_section_replaces_body() {
        let doc = "## A\nold\n## B\nkeep\n";
        let out = update_section(doc, "A", "new").unwrap();
        assert!(out.contains("new"));
        assert!(!out.contains("old"));
        assert!(out.contains("keep"));
    }

    #[test]
    fn update_section_fails_when_absent() {
        assert!(update_section("## A\nbody\n", "Missing", "x").is_err());
    }

    #[test]
    fn insert_after_finds_marker_and_inserts_next_line() {
        let doc = "one\nMARKER\nthree\n";
        let (out, found) = insert_after(doc, "MARKER", "two");
        assert!(found);
        assert_eq!(out, "one\nMARKER\ntwo\nthree\n");
    }

    #[test]
    fn insert_after_missing_marker_appends_to_end() {
        let (out, found) = insert_after("one\n", "NOPE", "two");
        assert!(!found);
        assert!(out.ends_with("two\n"));
    }

    #[test]
    fn duplicate_content_detection_matches_trimmed_line() {
        let doc = "## A\nalready here\n";
        assert!(doc_contains_line(doc, "already here"));
        assert!(!doc_contains_line(doc, "not present"));
    }
}
