//! Recorded build/output artifacts tracked by the State Store (spec §4.8,
//! "artifact checksums").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub relative_path: String,
    pub sha256: String,
    pub recorded_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(relative_path: impl Into<String>, sha256: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            relative_path: relative_path.into(),
            sha256: sha256.into(),
            recorded_at: now,
        }
    }
}
