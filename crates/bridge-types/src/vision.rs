//! Vision Entry: a typed "vision" finding with lifecycle, tags, and
//! reference counting (spec data model §3, "Vision Entry"; component §4.3).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ids::VisionId;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid regex"));

/// Validate a tag against spec §4.3's input-validation rule.
pub fn validate_tag(tag: &str) -> Result<()> {
    if !TAG_RE.is_match(tag) {
        bail!("invalid tag {tag:?}: must match {}", TAG_RE.as_str());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VisionStatus {
    Captured,
    Exploring,
    Proposed,
    Implemented,
    Deferred,
}

impl VisionStatus {
    /// All statuses, in the order used to render the statistics block
    /// (spec §4.3, §6: Captured/Exploring/Proposed/Implemented/Deferred).
    pub const ALL: [VisionStatus; 5] = [
        VisionStatus::Captured,
        VisionStatus::Exploring,
        VisionStatus::Proposed,
        VisionStatus::Implemented,
        VisionStatus::Deferred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisionStatus::Captured => "Captured",
            VisionStatus::Exploring => "Exploring",
            VisionStatus::Proposed => "Proposed",
            VisionStatus::Implemented => "Implemented",
            VisionStatus::Deferred => "Deferred",
        }
    }

    /// The status-transition DAG: Captured -> Exploring -> Proposed ->
    /// {Implemented, Deferred}. Returns whether `self -> next` is permitted.
    pub fn can_transition_to(self, next: VisionStatus) -> bool {
        matches!(
            (self, next),
            (VisionStatus::Captured, VisionStatus::Exploring)
                | (VisionStatus::Exploring, VisionStatus::Proposed)
                | (VisionStatus::Proposed, VisionStatus::Implemented)
                | (VisionStatus::Proposed, VisionStatus::Deferred)
        )
    }

    /// Active statuses considered for relevance queries (spec §4.3).
    pub fn is_active(self) -> bool {
        matches!(self, VisionStatus::Captured | VisionStatus::Exploring)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionEntry {
    pub id: VisionId,
    pub title: String,
    pub source: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    pub status: VisionStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub refs: u64,
    pub insight: String,
    pub potential: String,
}

impl VisionEntry {
    pub fn new(
        id: VisionId,
        title: impl Into<String>,
        source: impl Into<String>,
        date: DateTime<Utc>,
        insight: impl Into<String>,
        potential: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            source: source.into(),
            date,
            pr_number: None,
            status: VisionStatus::Captured,
            tags: BTreeSet::new(),
            refs: 0,
            insight: insight.into(),
            potential: potential.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_permits_forward_only() {
        assert!(VisionStatus::Captured.can_transition_to(VisionStatus::Exploring));
        assert!(VisionStatus::Exploring.can_transition_to(VisionStatus::Proposed));
        assert!(VisionStatus::Proposed.can_transition_to(VisionStatus::Implemented));
        assert!(VisionStatus::Proposed.can_transition_to(VisionStatus::Deferred));

        assert!(!VisionStatus::Captured.can_transition_to(VisionStatus::Implemented));
        assert!(!VisionStatus::Implemented.can_transition_to(VisionStatus::Captured));
        assert!(!VisionStatus::Deferred.can_transition_to(VisionStatus::Implemented));
    }

    #[test]
    fn active_statuses() {
        assert!(VisionStatus::Captured.is_active());
        assert!(VisionStatus::Exploring.is_active());
        assert!(!VisionStatus::Proposed.is_active());
        assert!(!VisionStatus::Implemented.is_active());
        assert!(!VisionStatus::Deferred.is_active());
    }

    #[test]
    fn tag_validation() {
        assert!(validate_tag("architecture").is_ok());
        assert!(validate_tag("multi-model").is_ok());
        assert!(validate_tag("Architecture").is_err());
        assert!(validate_tag("-architecture").is_err());
        assert!(validate_tag("").is_err());
    }
}
