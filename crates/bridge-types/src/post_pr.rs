//! Post-PR State: the second state machine covering post-merge validation
//! (spec data model §3, "Post-PR State").

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bridge_state::Timestamps;
use crate::ids::BridgeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostPrStatus {
    PrCreated,
    PostPrAudit,
    ContextClear,
    E2eTesting,
    FlatlinePr,
    ReadyForHitl,
    Halted,
}

pub const CURRENT_POST_PR_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPrStateDoc {
    pub schema_version: u32,
    pub bridge_id: BridgeId,
    pub state: PostPrStatus,
    pub pr_number: u64,
    /// Named checkpoints reached so far (e.g. "context_cleared", "e2e_pass_1").
    #[serde(default)]
    pub markers: BTreeSet<String>,
    /// Relative paths of state-file backups retained for this PR's run.
    #[serde(default)]
    pub backup_trail: Vec<String>,
    pub timestamps: Timestamps,
}

impl PostPrStateDoc {
    pub fn new(bridge_id: BridgeId, pr_number: u64, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: CURRENT_POST_PR_SCHEMA_VERSION,
            bridge_id,
            state: PostPrStatus::PrCreated,
            pr_number,
            markers: BTreeSet::new(),
            backup_trail: Vec::new(),
            timestamps: Timestamps::new(now),
        }
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&PostPrStatus::ReadyForHitl).unwrap();
        assert_eq!(json, "\"READY_FOR_HITL\"");
    }

    #[test]
    fn marker_lookup() {
        let mut doc = PostPrStateDoc::new(BridgeId::generate(Utc::now()), 42, Utc::now());
        assert!(!doc.has_marker("context_cleared"));
        doc.markers.insert("context_cleared".to_string());
        assert!(doc.has_marker("context_cleared"));
    }
}
