//! Vision Registry (spec §4.3): append-only capture of VISION/SPECULATION
//! findings into per-vision markdown entries plus an index document, with a
//! status lifecycle DAG, reference-counted lore elevation, and a tag-overlap
//! relevance query. Every mutation runs under the Document lock so the index
//! and its backing entry files never drift out of sync.

mod entry;
mod ids;
mod index;
mod lore;
mod sanitize;
mod tags;

pub use index::{IndexRow, IndexTable};
pub use sanitize::{extract_insight, sanitize, sanitize_entry_insight};
pub use tags::{VOCABULARY, tags_for_path, tags_for_paths};

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bridge_lock::{LockConfig, LockType, with_lock};
use bridge_types::{Finding, VisionEntry, VisionId, VisionStatus};
use chrono::{DateTime, Utc};

/// A Finding captured into the registry, paired with the file paths its
/// change touched (used for tag derivation and, later, relevance queries).
pub struct CaptureInput<'a> {
    pub finding: &'a Finding,
    pub source: &'a str,
    pub now: DateTime<Utc>,
    pub paths: &'a [String],
}

/// Outcome of a capture call: the allocated ID and whether an index write
/// actually happened (always true for capture, since each call allocates a
/// fresh ID, but kept symmetric with the editor's `EditOutcome` vocabulary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub id: VisionId,
}

pub struct Registry {
    vision_dir: PathBuf,
    index_path: PathBuf,
    lore_file: PathBuf,
    lock_dir: PathBuf,
    lock_config: LockConfig,
    /// Strict reference-count threshold above which a vision is elevated to
    /// lore (spec §4.3: "once referenced more than N times"). Caller-
    /// supplied rather than read from config here, since this crate doesn't
    /// depend on `bridge-config`.
    pub lore_elevation_threshold: u64,
}

impl Registry {
    pub fn new(
        vision_dir: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        lore_file: impl Into<PathBuf>,
        lock_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vision_dir: vision_dir.into(),
            index_path: index_path.into(),
            lore_file: lore_file.into(),
            lock_dir: lock_dir.into(),
            lock_config: LockConfig::default(),
            lore_elevation_threshold: 3,
        }
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    pub fn with_lore_elevation_threshold(mut self, threshold: u64) -> Self {
        self.lore_elevation_threshold = threshold;
        self
    }

    fn load_index(&self) -> Result<IndexTable> {
        if !self.index_path.exists() {
            return Ok(IndexTable::default());
        }
        let text = fs::read_to_string(&self.index_path)
            .with_context(|| format!("reading {}", self.index_path.display()))?;
        IndexTable::parse(&text)
    }

    fn write_index(&self, table: &IndexTable) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.index_path.with_extension("md.tmp");
        fs::write(&tmp, table.render_document())
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.index_path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), self.index_path.display()))?;
        Ok(())
    }

    fn entry_path(&self, id: &VisionId) -> PathBuf {
        self.vision_dir.join(ids::entry_file_name(id))
    }

    fn write_entry(&self, entry: &VisionEntry) -> Result<()> {
        fs::create_dir_all(&self.vision_dir)
            .with_context(|| format!("creating {}", self.vision_dir.display()))?;
        let path = self.entry_path(&entry.id);
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, entry::render(entry)).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn read_entry(&self, id: &VisionId) -> Result<VisionEntry> {
        let path = self.entry_path(id);
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        entry::parse(&text)
    }

    /// Capture a VISION/SPECULATION finding: allocate the next dense ID,
    /// render an entry file, derive tags from the touched paths, upsert the
    /// index row, and regenerate the statistics block. Only findings whose
    /// severity routes to the registry (spec §3) should be passed here;
    /// callers that pass anything else get a bare error rather than a
    /// silently-ignored capture.
    pub fn capture(&self, input: CaptureInput<'_>) -> Result<CaptureResult> {
        if !input.finding.severity.routes_to_vision_registry() {
            bail!(
                "finding {} has severity {:?} which does not route to the vision registry",
                input.finding.id,
                input.finding.severity
            );
        }
        with_lock(
            &self.lock_dir,
            "vision-index",
            LockType::Document,
            "bridge-vision",
            &self.lock_config,
            || {
                let id = ids::next_id(&self.vision_dir)?;
                let insight = input.finding.description.clone();
                let potential = input
                    .finding
                    .potential
                    .clone()
                    .unwrap_or_else(|| "Not yet explored.".to_string());
                let mut entry = VisionEntry::new(
                    id.clone(),
                    input.finding.title.clone(),
                    input.source,
                    input.now,
                    insight,
                    potential,
                );
                entry.tags = tags_for_paths(input.paths.iter().map(String::as_str))
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                self.write_entry(&entry)?;

                let mut table = self.load_index()?;
                table.upsert(IndexRow::from_entry(&entry, table.has_refs_column));
                self.write_index(&table)?;

                Ok(CaptureResult { id })
            },
        )
    }

    /// Advance a vision's status, validating the transition against the
    /// DAG (spec §4.3). Updates both the entry file's `**Status**:` line and
    /// the index row, then regenerates statistics, all under one lock.
    pub fn update_status(&self, id: &VisionId, next: VisionStatus) -> Result<()> {
        with_lock(
            &self.lock_dir,
            "vision-index",
            LockType::Document,
            "bridge-vision",
            &self.lock_config,
            || {
                let current = self.read_entry(id)?;
                if !current.status.can_transition_to(next) {
                    bail!(
                        "vision {} cannot transition from {:?} to {:?}",
                        id,
                        current.status,
                        next
                    );
                }
                let path = self.entry_path(id);
                let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                let rewritten = entry::rewrite_status(&text, next)?;
                let tmp = path.with_extension("md.tmp");
                fs::write(&tmp, &rewritten).with_context(|| format!("writing {}", tmp.display()))?;
                fs::rename(&tmp, &path)
                    .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

                let mut table = self.load_index()?;
                if !table.set_status(id, next) {
                    bail!("vision {} has no index row to update", id);
                }
                self.write_index(&table)?;
                Ok(())
            },
        )
    }

    /// Record that `bridge_id` referenced vision `id`: bump the index row's
    /// ref count, append `bridge_id` to the entry's `## Connection Points`
    /// section (spec §4.3 entry format names "finding ID and bridge
    /// identifiers" there), and if the count now strictly exceeds the
    /// elevation threshold, synthesize an idempotent lore entry. Returns
    /// whether a lore entry was written on this call (always `false` on
    /// repeat references to an already-elevated vision).
    pub fn record_reference(&self, id: &VisionId, bridge_id: &str, now: DateTime<Utc>) -> Result<bool> {
        with_lock(
            &self.lock_dir,
            "vision-index",
            LockType::Document,
            "bridge-vision",
            &self.lock_config,
            || {
                let mut table = self.load_index()?;
                let refs = table
                    .bump_refs(id)
                    .ok_or_else(|| anyhow::anyhow!("vision {} has no index row to reference", id))?;
                self.write_index(&table)?;

                let path = self.entry_path(id);
                let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                let rewritten = entry::append_connection_point(&text, bridge_id);
                let tmp = path.with_extension("md.tmp");
                fs::write(&tmp, &rewritten).with_context(|| format!("writing {}", tmp.display()))?;
                fs::rename(&tmp, &path)
                    .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

                if refs <= self.lore_elevation_threshold {
                    return Ok(false);
                }
                let entry = self.read_entry(id)?;
                lore::append_idempotent(&self.lore_file, id, &entry.title, &entry.insight, now)
            },
        )
    }

    /// Active visions (Captured/Exploring) whose tags overlap a work
    /// context by at least `min_overlap` tags (spec §4.3 relevance query).
    pub fn relevant_to(
        &self,
        context_paths: &[String],
        min_overlap: usize,
    ) -> Result<Vec<VisionEntry>> {
        let context_tags = tags_for_paths(context_paths.iter().map(String::as_str));
        let table = self.load_index()?;
        let mut out = Vec::new();
        for row in &table.rows {
            let id = VisionId::parse(row.id.clone())?;
            let entry = self.read_entry(&id)?;
            if !entry.status.is_active() {
                continue;
            }
            let overlap = entry
                .tags
                .iter()
                .filter(|t| context_tags.contains(t.as_str()))
                .count();
            if overlap >= min_overlap {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{Finding, FindingLocation, Severity};
    use tempfile::tempdir;

    fn registry(root: &std::path::Path) -> Registry {
        Registry::new(
            root.join("grimoires/visions"),
            root.join("grimoires/visions/index.md"),
            root.join("grimoires/lore.yaml"),
            root.join(".bridge/locks"),
        )
    }

    fn vision_finding(title: &str) -> Finding {
        Finding {
            severity: Severity::Vision,
            id: "f-1".to_string(),
            title: title.to_string(),
            description: "an insight worth keeping".to_string(),
            location: Some(FindingLocation { file: "crates/bridge-guard/src/auth.rs".to_string(), line: 10 }),
            potential: Some("could generalize".to_string()),
        }
    }

    #[test]
    fn capture_allocates_id_and_writes_entry_and_index() {
        let td = tempdir().unwrap();
        let reg = registry(td.path());
        let finding = vision_finding("Typed auth errors");
        let result = reg
            .capture(CaptureInput {
                finding: &finding,
                source: "bridge-20260728-abc123",
                now: Utc::now(),
                paths: &["crates/bridge-guard/src/auth.rs".to_string()],
            })
            .unwrap();
        assert_eq!(result.id.as_str(), "vision-001");
        let index = fs::read_to_string(td.path().join("grimoires/visions/index.md")).unwrap();
        assert!(index.contains("vision-001"));
        assert!(index.contains("security"));
    }

    #[test]
    fn capture_rejects_non_routing_severity() {
        let td = tempdir().unwrap();
        let reg = registry(td.path());
        let mut finding = vision_finding("Not a vision");
        finding.severity = Severity::Blocker;
        let result = reg.capture(CaptureInput {
            finding: &finding,
            source: "bridge-20260728-abc123",
            now: Utc::now(),
            paths: &[],
        });
        assert!(result.is_err());
    }

    #[test]
    fn update_status_follows_dag_and_rejects_illegal_jump() {
        let td = tempdir().unwrap();
        let reg = registry(td.path());
        let finding = vision_finding("X");
        let result = reg
            .capture(CaptureInput { finding: &finding, source: "s", now: Utc::now(), paths: &[] })
            .unwrap();

        reg.update_status(&result.id, VisionStatus::Exploring).unwrap();
        let entry = reg.read_entry(&result.id).unwrap();
        assert_eq!(entry.status, VisionStatus::Exploring);

        let illegal = reg.update_status(&result.id, VisionStatus::Implemented);
        assert!(illegal.is_err());
    }

    #[test]
    fn record_reference_elevates_to_lore_past_threshold() {
        let td = tempdir().unwrap();
        let reg = registry(td.path()).with_lore_elevation_threshold(2);
        let finding = vision_finding("Worth repeating");
        let result = reg
            .capture(CaptureInput { finding: &finding, source: "s", now: Utc::now(), paths: &[] })
            .unwrap();

        assert!(!reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());
        assert!(!reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());
        assert!(reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());

        let lore = fs::read_to_string(td.path().join("grimoires/lore.yaml")).unwrap();
        assert!(lore.contains(&result.id.as_str().to_string()));
    }

    #[test]
    fn record_reference_lore_append_is_idempotent_after_elevation() {
        let td = tempdir().unwrap();
        let reg = registry(td.path()).with_lore_elevation_threshold(1);
        let finding = vision_finding("Repeat me");
        let result = reg
            .capture(CaptureInput { finding: &finding, source: "s", now: Utc::now(), paths: &[] })
            .unwrap();

        assert!(!reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());
        assert!(reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());
        assert!(!reg.record_reference(&result.id, "bridge-test", Utc::now()).unwrap());
    }

    #[test]
    fn relevant_to_filters_by_active_status_and_tag_overlap() {
        let td = tempdir().unwrap();
        let reg = registry(td.path());
        let f1 = vision_finding("Auth insight");
        let r1 = reg
            .capture(CaptureInput {
                finding: &f1,
                source: "s",
                now: Utc::now(),
                paths: &["crates/bridge-guard/src/auth.rs".to_string()],
            })
            .unwrap();
        let f2 = vision_finding("Config insight");
        reg.capture(CaptureInput {
            finding: &f2,
            source: "s",
            now: Utc::now(),
            paths: &["crates/bridge-config/src/lib.rs".to_string()],
        })
        .unwrap();

        let relevant = reg
            .relevant_to(&["crates/bridge-guard/src/secret.rs".to_string()], 1)
            .unwrap();
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].id, r1.id);
    }

    #[test]
    fn relevant_to_excludes_non_active_statuses() {
        let td = tempdir().unwrap();
        let reg = registry(td.path());
        let f1 = vision_finding("Auth insight");
        let r1 = reg
            .capture(CaptureInput {
                finding: &f1,
                source: "s",
                now: Utc::now(),
                paths: &["crates/bridge-guard/src/auth.rs".to_string()],
            })
            .unwrap();
        reg.update_status(&r1.id, VisionStatus::Exploring).unwrap();
        reg.update_status(&r1.id, VisionStatus::Proposed).unwrap();
        reg.update_status(&r1.id, VisionStatus::Implemented).unwrap();

        let relevant = reg
            .relevant_to(&["crates/bridge-guard/src/secret.rs".to_string()], 1)
            .unwrap();
        assert!(relevant.is_empty());
    }
}
