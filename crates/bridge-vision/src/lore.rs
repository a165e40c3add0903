//! Lore-elevation synthesis (spec §4.3): once a vision's reference count
//! strictly exceeds the configured threshold, synthesize a lore entry and
//! append it idempotently to the lore file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bridge_types::VisionId;
use chrono::{DateTime, Utc};

pub fn elevated_id(vid: &VisionId) -> String {
    format!("vision-elevated-{}", vid.as_str())
}

fn render_entry(vid: &VisionId, title: &str, insight: &str, now: DateTime<Utc>) -> String {
    format!(
        "- id: \"{}\"\n  vision_id: \"{}\"\n  title: \"{}\"\n  insight: \"{}\"\n  elevated_at: \"{}\"\n",
        elevated_id(vid),
        vid.as_str(),
        escape_yaml_string(title),
        escape_yaml_string(insight),
        now.to_rfc3339(),
    )
}

fn escape_yaml_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', " ")
}

fn marker(vid: &VisionId) -> String {
    format!("vision_id: \"{}\"", vid.as_str())
}

/// Append a synthesized lore entry for `vid` unless one is already present.
/// Returns whether a write happened.
pub fn append_idempotent(lore_file: &Path, vid: &VisionId, title: &str, insight: &str, now: DateTime<Utc>) -> Result<bool> {
    let existing = if lore_file.exists() {
        fs::read_to_string(lore_file).with_context(|| format!("reading {}", lore_file.display()))?
    } else {
        String::new()
    };
    if existing.contains(&marker(vid)) {
        return Ok(false);
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&render_entry(vid, title, insight, now));

    if let Some(parent) = lore_file.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = lore_file.with_extension("yaml.tmp");
    fs::write(&tmp, &updated).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, lore_file)
        .with_context(|| format!("renaming {} to {}", tmp.display(), lore_file.display()))?;
    Ok(true)
}
