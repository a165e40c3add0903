//! Store for the Post-PR State document (spec §4.8, §3 "Post-PR State").

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bridge_encrypt::StateEncryption;
use bridge_types::{CURRENT_POST_PR_SCHEMA_VERSION, PostPrStateDoc, PostPrStatus};
use chrono::Utc;
use serde_json::Value;

use crate::atomic::{atomic_write_json_encrypted, backup_path, read_raw_encrypted};
use crate::bridge::VersionCheck;
use crate::dotpath;

pub const POST_PR_STATE_FILE: &str = "post-pr-state.json";

pub struct PostPrStateStore {
    path: PathBuf,
    encryption: Option<StateEncryption>,
}

impl PostPrStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: state_dir.into().join(POST_PR_STATE_FILE),
            encryption: None,
        }
    }

    pub fn with_encryption(mut self, encryption: StateEncryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self, doc: &PostPrStateDoc) -> Result<()> {
        if self.path.exists() {
            bail!(
                "post-pr state already exists at {}; refusing to overwrite",
                self.path.display()
            );
        }
        atomic_write_json_encrypted(&self.path, doc, self.encryption.as_ref())
    }

    pub fn load(&self) -> Result<Option<PostPrStateDoc>> {
        let Some(raw) = read_raw_encrypted(&self.path, self.encryption.as_ref())? else {
            return Ok(None);
        };
        Ok(Some(migrate(raw)?))
    }

    pub fn save(&self, doc: &mut PostPrStateDoc) -> Result<()> {
        doc.timestamps.last_activity = Utc::now();
        if let Some(existing) = backup_path(&self.path).to_str() {
            doc.backup_trail.push(existing.to_string());
        }
        atomic_write_json_encrypted(&self.path, doc, self.encryption.as_ref())
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        let Some(raw) = read_raw_encrypted(&self.path, self.encryption.as_ref())? else {
            return Ok(None);
        };
        Ok(dotpath::get(&raw, field).cloned())
    }

    pub fn set(&self, field: &str, raw_value: &str) -> Result<()> {
        let mut raw = read_raw_encrypted(&self.path, self.encryption.as_ref())?
            .ok_or_else(|| anyhow::anyhow!("no post-pr state at {}", self.path.display()))?;
        dotpath::set(&mut raw, field, dotpath::parse_scalar(raw_value))?;
        atomic_write_json_encrypted(&self.path, &raw, self.encryption.as_ref())
    }

    pub fn update_phase(&self, next: PostPrStatus) -> Result<()> {
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no post-pr state at {}", self.path.display()))?;
        doc.state = next;
        self.save(&mut doc)
    }

    pub fn add_marker(&self, marker: &str) -> Result<()> {
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no post-pr state at {}", self.path.display()))?;
        doc.markers.insert(marker.to_string());
        self.save(&mut doc)
    }

    pub fn save_interrupt(&self) -> Result<()> {
        let mut doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("no post-pr state at {}", self.path.display()))?;
        doc.state = PostPrStatus::Halted;
        doc.timestamps.interrupted = Some(Utc::now());
        self.save(&mut doc)
    }

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
    match found.cmp(&CURRENT_POST_PR_SCHEMA_VERSION) {
        std::cmp::Ordering::Equal => Ok(VersionCheck::Current),
        std::cmp::Ordering::Less => Ok(VersionCheck::Migrated {
            from: found,
            to: CURRENT_POST_PR_SCHEMA_VERSION,
        }),
        std::cmp::Ordering::Greater => Ok(VersionCheck::Unsupported {
            found,
            max_supported: CURRENT_POST_PR_SCHEMA_VERSION,
        }),
    }
}

fn migrate(mut raw: Value) -> Result<PostPrStateDoc> {
    let found = raw
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    match classify_version(found)? {
        VersionCheck::Unsupported { found, max_supported } => bail!(
            "post-pr state schema v{found} is newer than this binary supports (max v{max_supported})"
        ),
        _ => {
            if let Some(obj) = raw.as_object_mut() {
                obj.insert(
                    "schema_version".to_string(),
                    Value::from(CURRENT_POST_PR_SCHEMA_VERSION),
                );
            }
        }
    }
    serde_json::from_value(raw).context("deserializing post-pr state document")
}
