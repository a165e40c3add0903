//! Validated identifier newtypes.
//!
//! Both IDs are plain `String` wrappers at rest (so they serialize as bare
//! strings in JSON/markdown) but only construct through a regex-validated
//! parser, so a `BridgeId`/`VisionId` in hand is known-good everywhere else
//! in the workspace.

use std::fmt;

use anyhow::{Result, bail};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static BRIDGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bridge-\d{8}-[a-z0-9]{6}$").expect("valid regex"));

static VISION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^vision-\d{3}$").expect("valid regex"));

/// `bridge-<YYYYMMDD>-<6 alphanumeric>`, e.g. `bridge-20260728-a3f9c1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeId(String);

impl BridgeId {
    /// Generate a fresh ID from the current date and a random alphanumeric suffix.
    pub fn generate(now: chrono::DateTime<chrono::Utc>) -> Self {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::rng();
        let suffix: String = (0..6)
            .map(|_| {
                let idx = rng.random_range(0..ALPHABET.len());
                ALPHABET[idx] as char
            })
            .collect();
        let id = format!("bridge-{}-{}", now.format("%Y%m%d"), suffix);
        Self(id)
    }

    /// Validate and wrap an existing ID (e.g. read back from a state file).
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !BRIDGE_ID_RE.is_match(&raw) {
            bail!("invalid bridge_id {raw:?}: must match {}", BRIDGE_ID_RE.as_str());
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `vision-<NNN>`, zero-padded three-digit sequence, e.g. `vision-007`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisionId(String);

impl VisionId {
    pub fn from_sequence(seq: u32) -> Result<Self> {
        if seq == 0 || seq > 999 {
            bail!("vision sequence {seq} out of range 1..=999");
        }
        Ok(Self(format!("vision-{seq:03}")))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !VISION_ID_RE.is_match(&raw) {
            bail!("invalid vision_id {raw:?}: must match {}", VISION_ID_RE.as_str());
        }
        Ok(Self(raw))
    }

    /// Numeric sequence this ID encodes.
    pub fn sequence(&self) -> u32 {
        self.0
            .strip_prefix("vision-")
            .and_then(|s| s.parse().ok())
            .expect("constructed only through validated parsers")
    }

    pub fn next(&self) -> Result<Self> {
        Self::from_sequence(self.sequence() + 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
