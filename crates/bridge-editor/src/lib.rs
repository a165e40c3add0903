//! Atomic Document Editor (spec §4.2): section-aware, idempotent,
//! flock-guarded mutation of generated markdown documents (sprint plans,
//! the vision index, `AGENTS.md`, lore files).

mod markdown;
mod validate;

pub use validate::{MAX_DOCUMENT_BYTES, ValidationReport, validate};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bridge_lock::{BridgePaths, LockConfig, LockType, with_lock};

/// Outcome of a mutating operation. Callers must distinguish "nothing
/// happened because it was already there" from an ordinary write, since
/// neither is an error (spec §4.2 invariant 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Written,
    /// The first non-blank line of the new content already appears verbatim
    /// in the document; no write occurred.
    DuplicateContent,
    /// The write happened, but `insert_after`'s marker line was not found so
    /// the content was appended to the end instead.
    MarkerNotFound,
}

pub struct DocumentEditor {
    project_root: PathBuf,
    lock_dir: PathBuf,
    lock_config: LockConfig,
}

impl DocumentEditor {
    pub fn new(project_root: impl Into<PathBuf>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            lock_dir: lock_dir.into(),
            lock_config: LockConfig::default(),
        }
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    fn guarded_path(&self, doc_path: &Path) -> Result<PathBuf> {
        BridgePaths::new(&self.project_root).ensure_within_root(doc_path)
    }

    fn read_existing(path: &Path) -> Result<String> {
        if path.exists() {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        } else {
            Ok(String::new())
        }
    }

    /// Reject a candidate document before it ever reaches `write_atomic`.
    /// This is what makes editor atomicity hold (spec §4.2 invariant 2,
    /// Testable Property 2): the original file is never touched unless the
    /// rewritten content passes the same structural checks `validate`
    /// performs standalone.
    fn reject_if_invalid(candidate: &str) -> Result<()> {
        let report = validate::validate_text(candidate);
        if !report.is_valid() {
            bail!("edited document fails validation, original left untouched: {}", report.issues.join("; "));
        }
        Ok(())
    }

    fn write_atomic(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension("md.tmp");
        {
            let mut f = File::create(&tmp)
                .with_context(|| format!("creating tmp file {}", tmp.display()))?;
            f.write_all(content.as_bytes())
                .with_context(|| format!("writing tmp file {}", tmp.display()))?;
            f.sync_all().ok();
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn lock_resource(path: &Path) -> String {
        path.to_string_lossy()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    pub fn append_section(&self, doc_path: &Path, section_title: &str, content: &str) -> Result<EditOutcome> {
        let path = self.guarded_path(doc_path)?;
        with_lock(
            &self.lock_dir,
            &Self::lock_resource(&path),
            LockType::Document,
            "bridge-editor",
            &self.lock_config,
            || {
                let existing = Self::read_existing(&path)?;
                if let Some(first) = markdown::first_nonblank_line(content) {
                    if markdown::doc_contains_line(&existing, first) {
                        return Ok(EditOutcome::DuplicateContent);
                    }
                }
                let updated = markdown::append_section(&existing, section_title, content);
                Self::reject_if_invalid(&updated)?;
                Self::write_atomic(&path, &updated)?;
                Ok(EditOutcome::Written)
            },
        )
    }

    pub fn update_section(&self, doc_path: &Path, section_title: &str, content: &str) -> Result<EditOutcome> {
        let path = self.guarded_path(doc_path)?;
        with_lock(
            &self.lock_dir,
            &Self::lock_resource(&path),
            LockType::Document,
            "bridge-editor",
            &self.lock_config,
            || {
                let existing = Self::read_existing(&path)?;
                let updated = markdown::update_section(&existing, section_title, content)?;
                if updated == existing {
                    return Ok(EditOutcome::DuplicateContent);
                }
                Self::reject_if_invalid(&updated)?;
                Self::write_atomic(&path, &updated)?;
                Ok(EditOutcome::Written)
            },
        )
    }

    pub fn insert_after(&self, doc_path: &Path, marker_line: &str, content: &str) -> Result<EditOutcome> {
        let path = self.guarded_path(doc_path)?;
        with_lock(
            &self.lock_dir,
            &Self::lock_resource(&path),
            LockType::Document,
            "bridge-editor",
            &self.lock_config,
            || {
                let existing = Self::read_existing(&path)?;
                if let Some(first) = markdown::first_nonblank_line(content) {
                    if markdown::doc_contains_line(&existing, first) {
                        return Ok(EditOutcome::DuplicateContent);
                    }
                }
                let (updated, found) = markdown::insert_after(&existing, marker_line, content);
                Self::reject_if_invalid(&updated)?;
                Self::write_atomic(&path, &updated)?;
                Ok(if found { EditOutcome::Written } else { EditOutcome::MarkerNotFound })
            },
        )
    }

    pub fn validate(&self, doc_path: &Path) -> Result<ValidationReport> {
        validate::validate(&self.project_root, doc_path)
    }
}
