//! Artifact tracking and drift detection (spec §4.8, `validate_artifacts`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactValidation {
    /// Names of artifacts whose recorded checksum still matches the file on disk.
    pub ok: Vec<String>,
    /// Names of artifacts whose file is gone.
    pub missing: Vec<String>,
    /// Names of artifacts whose file changed since it was recorded.
    pub modified: Vec<String>,
}

impl ArtifactValidation {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.modified.is_empty()
    }
}
