//! Store for the primary Bridge State document (spec §4.8, §3 "Bridge State").

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bridge_encrypt::StateEncryption;
use bridge_types::{ArtifactRecord, BridgeStateDoc, BridgeStatus, CURRENT_BRIDGE_SCHEMA_VERSION};
use chrono::Utc;
use serde_json::Value;

use crate::artifact::ArtifactValidation;
use crate::atomic::{atomic_write_json_encrypted, backup_path, read_raw_encrypted};
use crate::checksum::sha256_file;
use crate::dotpath;

pub const BRIDGE_STATE_FILE: &str = "bridge-state.json";

/// Outcome of a schema-version check against the document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Current,
    /// Document predates the binary and was migrated in memory; the caller
    /// should `save` to persist the upgraded schema.
    Migrated { from: u32, to: u32 },
    /// Document is newer than this binary understands; refuse to touch it.
    Unsupported { found: u32, max_supported: u32 },
}

pub struct BridgeStateStore {
    path: PathBuf,
    project_root: PathBuf,
    encryption: Option<StateEncryption>,
}

impl BridgeStateStore {
    pub fn new(state_dir: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            path: state_dir.into().join(BRIDGE_STATE_FILE),
            project_root: project_root.into(),
            encryption: None,
        }
    }

    /// Enable transparent state-at-rest encryption (spec §10). A disabled
    /// `encryption` (no passphrase available) behaves exactly like `new`.
    pub fn with_encryption(mut self, encryption: StateEncryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a brand-new document. Fails if one already exists; callers
    /// that want to overwrite must `cleanup` first.
    pub fn init(&self, doc: &BridgeStateDoc) -> Result<()> {
        if self.path.exists() {
            bail!(
                "bridge state already exists at {}; refusing to overwrite",
                self.path.display()
            );
        }
        atomic_write_json_encrypted(&self.path, doc, self.encryption.as_ref())
    }

    pub fn load(&self) -> Result<Option<BridgeStateDoc>> {
        let Some(raw) = read_raw_encrypted(&self.path, self.encryption.as_ref())? else {
            return Ok(None);
        };
        Ok(Some(migrate(raw)?))
    }

    pub fn save(&self, doc: &mut BridgeStateDoc) -> Result<()> {
        doc.timestamps.last_activity = Utc::now();
        atomic_write_json_encrypted(&self.path, doc, self.encryption.as_ref())
    }

    /// Read the raw JSON tree underneath a dot-path, e.g. `"metrics.files_changed"`.
    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        let Some(raw) = read_raw_encrypted(&self.path, self.encryption.as_ref())? else {
            return Ok(None);
        };
        Ok(dotpath::get(&raw, field).cloned())
    }

    /// Overwrite a field addressed by dot-path. `raw_value` is parsed with
    /// type preservation (bool/int/float/null before falling back to string).
    pub fn set(&self, field: &str, raw_value: &str) -> Result<()> {
        let mut raw = read_raw_encrypted(&self.path, self.encryption.as_ref())?
            .ok_or_else(|| anyhow::anyhow!("no bridge state at {}", self.path.display()))?;
        dotpath::set(&mut raw, field, dotpath::parse_scalar(raw_value))?;
        atomic_write_json_encrypted(&self.path, &raw, self.encryption.as_ref())
    }

    pub fn update_phase(&self, next: BridgeStatus) -> Result<()> {
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no bridge state at {}", self.path.display()))?;
        doc.state = next;
        self.save(&mut doc)
    }

    /// Hash `relative_path` (resolved under the project root) and record it
    /// under `name`.
    pub fn add_artifact(&self, name: &str, relative_path: &Path) -> Result<()> {
        let absolute = self.project_root.join(relative_path);
        let digest = sha256_file(&absolute)
            .with_context(|| format!("hashing artifact '{name}' at {}", absolute.display()))?;
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no bridge state at {}", self.path.display()))?;
        doc.artifacts.insert(
            name.to_string(),
            ArtifactRecord::new(relative_path.to_string_lossy(), digest, Utc::now()),
        );
        self.save(&mut doc)
    }

    /// Re-hash every recorded artifact and report drift since it was recorded.
    pub fn validate_artifacts(&self) -> Result<ArtifactValidation> {
        let doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no bridge state at {}", self.path.display()))?;
        let mut result = ArtifactValidation::default();
        for (name, record) in &doc.artifacts {
            let absolute = self.project_root.join(&record.relative_path);
            if !absolute.exists() {
                result.missing.push(name.clone());
                continue;
            }
            match sha256_file(&absolute) {
                Ok(digest) if digest == record.sha256 => result.ok.push(name.clone()),
                _ => result.modified.push(name.clone()),
            }
        }
        Ok(result)
    }

    /// Record an interrupt: mark the document halted and timestamp it, so a
    /// later `--resume` can tell a clean stop from a crash.
    pub fn save_interrupt(&self) -> Result<()> {
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no bridge state at {}", self.path.display()))?;
        if !doc.state.is_terminal() {
            doc.state = BridgeStatus::Halted;
        }
        doc.timestamps.interrupted = Some(Utc::now());
        self.save(&mut doc)
    }

    /// Remove the state file and its backup. Used when a bridge run fully
    /// completes (JACKED_OUT) or a user explicitly discards a run.
    pub fn cleanup(&self) -> Result<()> {
        for candidate in [self.path.clone(), backup_path(&self.path)] {
            if candidate.exists() {
                std::fs::remove_file(&candidate)
                    .with_context(|| format!("removing {}", candidate.display()))?;
            }
        }
        Ok(())
    }

    pub fn check_version(&self) -> Result<VersionCheck> {
        let Some(raw) = read_raw_encrypted(&self.path, self.encryption.as_ref())? else {
            return Ok(VersionCheck::Current);
        };
        let found = raw
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        classify_version(found)
    }
}

fn classify_version(found: u32) -> Result<VersionCheck> {
    match found.cmp(&CURRENT_BRIDGE_SCHEMA_VERSION) {
        std::cmp::Ordering::Equal => Ok(VersionCheck::Current),
        std::cmp::Ordering::Less => Ok(VersionCheck::Migrated {
            from: found,
            to: CURRENT_BRIDGE_SCHEMA_VERSION,
        }),
        std::cmp::Ordering::Greater => Ok(VersionCheck::Unsupported {
            found,
            max_supported: CURRENT_BRIDGE_SCHEMA_VERSION,
        }),
    }
}

/// Upgrade a raw document to the current schema. There is only one schema
/// version today, so this is an identity transform guarded against documents
/// from a newer binary.
fn migrate(mut raw: Value) -> Result<BridgeStateDoc> {
    let found = raw
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    match classify_version(found)? {
        VersionCheck::Unsupported { found, max_supported } => bail!(
            "bridge state schema v{found} is newer than this binary supports (max v{max_supported})"
        ),
        _ => {
            if let Some(obj) = raw.as_object_mut() {
                obj.insert(
                    "schema_version".to_string(),
                    Value::from(CURRENT_BRIDGE_SCHEMA_VERSION),
                );
            }
        }
    }
    serde_json::from_value(raw).context("deserializing bridge state document")
}
