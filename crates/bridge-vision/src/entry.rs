//! Entry file format (spec §4.3, "stable, testable"): a safe templating path
//! that writes finding text as literal content, never interpolated into a
//! shell or a real template engine.

use anyhow::{Context, Result, bail};
use bridge_types::{VisionEntry, VisionId, VisionStatus};
use chrono::{DateTime, Utc};

fn status_from_str(raw: &str) -> Result<VisionStatus> {
    VisionStatus::ALL
        .into_iter()
        .find(|s| s.as_str() == raw)
        .ok_or_else(|| anyhow::anyhow!("unknown vision status {raw:?}"))
}

pub fn render(entry: &VisionEntry) -> String {
    let tags = entry
        .tags
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let pr = entry
        .pr_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "—".to_string());
    format!(
        "# Vision: {title}\n\n\
         **ID**: {id}\n\
         **Source**: {source}\n\
         **PR**: {pr}\n\
         **Date**: {date}\n\
         **Status**: {status}\n\
         **Tags**: {tags}\n\n\
         ## Insight\n\n{insight}\n\n\
         ## Potential\n\n{potential}\n\n\
         ## Connection Points\n\n- {source}\n",
        title = entry.title,
        id = entry.id,
        source = entry.source,
        date = entry.date.to_rfc3339(),
        status = entry.status.as_str(),
        insight = entry.insight,
        potential = entry.potential,
    )
}

/// Parse an entry file back into a `VisionEntry`. Used by `update_status` to
/// recover the current record before applying a transition.
pub fn parse(text: &str) -> Result<VisionEntry> {
    let mut title = None;
    let mut id = None;
    let mut source = None;
    let mut pr_number = None;
    let mut date = None;
    let mut status = None;
    let mut tags = std::collections::BTreeSet::new();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("# Vision: ") {
            title = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("**ID**: ") {
            id = Some(VisionId::parse(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("**Source**: ") {
            source = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("**PR**: ") {
            let rest = rest.trim();
            pr_number = if rest == "—" { None } else { Some(rest.parse().context("parsing PR number")?) };
        } else if let Some(rest) = line.strip_prefix("**Date**: ") {
            date = Some(DateTime::parse_from_rfc3339(rest.trim())
                .context("parsing entry date")?
                .with_timezone(&Utc));
        } else if let Some(rest) = line.strip_prefix("**Status**: ") {
            status = Some(status_from_str(rest.trim())?);
        } else if let Some(rest) = line.strip_prefix("**Tags**: ") {
            for tag in rest.split(',') {
                let tag = tag.trim();
                if !tag.is_empty() {
                    tags.insert(tag.to_string());
                }
            }
        }
    }

    let insight = extract_section(text, "## Insight", "## Potential");
    let potential = extract_section(text, "## Potential", "## Connection Points");

    let mut entry = VisionEntry::new(
        id.ok_or_else(|| anyhow::anyhow!("entry missing **ID**"))?,
        title.ok_or_else(|| anyhow::anyhow!("entry missing title"))?,
        source.ok_or_else(|| anyhow::anyhow!("entry missing **Source**"))?,
        date.ok_or_else(|| anyhow::anyhow!("entry missing **Date**"))?,
        insight,
        potential,
    );
    entry.pr_number = pr_number;
    entry.status = status.ok_or_else(|| anyhow::anyhow!("entry missing **Status**"))?;
    entry.tags = tags;
    Ok(entry)
}

fn extract_section(text: &str, header: &str, next_header: &str) -> String {
    let Some(start) = text.find(header) else { return String::new() };
    let after = &text[start + header.len()..];
    let end = after.find(next_header).unwrap_or(after.len());
    after[..end].trim().to_string()
}

/// Append a bridge identifier to the `## Connection Points` section
/// (spec §4.3 entry format: "finding ID and bridge identifiers"). Called
/// once per `record_reference`, so a vision referenced by three different
/// bridges carries all three in its entry file.
pub fn append_connection_point(text: &str, bridge_id: &str) -> String {
    let mut out = text.trim_end().to_string();
    out.push('\n');
    out.push_str(&format!("- referenced by {bridge_id}\n"));
    out
}

/// Rewrite just the `**Status**:` line in place, leaving the rest of the
/// file untouched. Fails if the file has no status line to rewrite.
pub fn rewrite_status(text: &str, new_status: VisionStatus) -> Result<String> {
    let mut found = false;
    let rewritten: Vec<String> = text
        .lines()
        .map(|line| {
            if line.starts_with("**Status**: ") {
                found = true;
                format!("**Status**: {}", new_status.as_str())
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        bail!("entry file has no **Status** line to rewrite");
    }
    Ok(rewritten.join("\n") + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VisionEntry {
        let mut entry = VisionEntry::new(
            VisionId::from_sequence(7).unwrap(),
            "Typed error channel",
            "bridge-20260728-abc123",
            Utc::now(),
            "Errors should carry a typed kind.",
            "Introduce a BridgeError enum.",
        );
        entry.tags.insert("architecture".to_string());
        entry.tags.insert("testing".to_string());
        entry
    }

    #[test]
    fn render_then_parse_round_trips() {
        let entry = sample();
        let rendered = render(&entry);
        let parsed = parse(&rendered).unwrap();
        assert_eq!(parsed.id, entry.id);
        assert_eq!(parsed.title, entry.title);
        assert_eq!(parsed.status, entry.status);
        assert_eq!(parsed.tags, entry.tags);
        assert_eq!(parsed.insight, entry.insight);
        assert_eq!(parsed.potential, entry.potential);
    }

    #[test]
    fn rewrite_status_changes_only_the_status_line() {
        let entry = sample();
        let rendered = render(&entry);
        let rewritten = rewrite_status(&rendered, VisionStatus::Exploring).unwrap();
        let parsed = parse(&rewritten).unwrap();
        assert_eq!(parsed.status, VisionStatus::Exploring);
        assert_eq!(parsed.title, entry.title);
    }

    #[test]
    fn append_connection_point_adds_a_bullet_and_keeps_other_fields_intact() {
        let entry = sample();
        let rendered = render(&entry);
        let rewritten = append_connection_point(&rendered, "bridge-20260731-xyz");
        assert!(rewritten.contains("- referenced by bridge-20260731-xyz"));
        let parsed = parse(&rewritten).unwrap();
        assert_eq!(parsed.title, entry.title);
        assert_eq!(parsed.status, entry.status);
    }

    #[test]
    fn finding_text_never_interpolates_as_template_markers() {
        let mut entry = sample();
        entry.insight = "{{7*7}} ${evil} {% raw %}".to_string();
        let rendered = render(&entry);
        assert!(rendered.contains("{{7*7}} ${evil} {% raw %}"));
        let parsed = parse(&rendered).unwrap();
        assert_eq!(parsed.insight, "{{7*7}} ${evil} {% raw %}");
    }
}
