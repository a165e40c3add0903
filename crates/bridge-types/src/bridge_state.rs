//! Bridge State: the primary state-machine document for one active bridge
//! instance per working tree (spec data model §3, "Bridge State").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRecord;
use crate::ids::BridgeId;

/// Upper bound on `iterations` kept in a single state document. Older
/// iterations beyond this are summarized into `metrics` and dropped from
/// the list rather than growing the file unboundedly.
pub const MAX_TRACKED_ITERATIONS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeStatus {
    JackIn,
    Iterating,
    Researching,
    Exploring,
    Finalizing,
    Halted,
    JackedOut,
}

impl BridgeStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, BridgeStatus::Halted | BridgeStatus::JackedOut)
    }

    /// States `--resume` may continue from (spec §4.7 Resume).
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            BridgeStatus::Iterating | BridgeStatus::Halted | BridgeStatus::Exploring
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationSource {
    /// Iteration executed the already-planned sprint plan.
    Existing,
    /// Iteration was generated from the prior iteration's findings.
    Findings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub sequence: u32,
    pub status: IterationStatus,
    pub source: IterationSource,
    /// Severity-weighted finding count for this iteration; feeds the
    /// flatline trajectory (spec §4.7 Convergence predicate). `None` for
    /// research iterations (SPECULATION-only), which are excluded from the
    /// trajectory per spec.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub weighted_findings: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeMetrics {
    pub sprints_executed: u64,
    pub files_changed: u64,
    pub findings_addressed: u64,
    pub visions_captured: u64,
    pub cross_repo_matches: u64,
    pub research_iterations_completed: u64,
    pub inquiry_findings: u64,
    pub visions_referenced: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizationRecord {
    #[serde(default)]
    pub butterfreezone_generated: bool,
    #[serde(default)]
    pub rtfm_passed: bool,
    #[serde(default)]
    pub vision_sprint: bool,
    #[serde(default)]
    pub vision_sprint_timeout: bool,
    #[serde(default)]
    pub lore_discovery: bool,
    /// Recorded when a resume skipped a phase (e.g. EXPLORING -> FINALIZING).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub started: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            started: now,
            last_activity: now,
            interrupted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStateDoc {
    pub schema_version: u32,
    pub bridge_id: BridgeId,
    pub state: BridgeStatus,
    pub depth: u8,
    pub per_sprint: u32,
    pub flatline_threshold: f64,
    pub branch: String,
    #[serde(default)]
    pub iterations: Vec<Iteration>,
    #[serde(default)]
    pub metrics: BridgeMetrics,
    #[serde(default)]
    pub finalization: FinalizationRecord,
    pub timestamps: Timestamps,
    /// Checksummed outputs recorded via `bridge-state`'s `add_artifact`,
    /// keyed by artifact name.
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactRecord>,
}

/// Current schema version written by this crate. `bridge-state` migrates
/// any document whose `schema_version` is older.
pub const CURRENT_BRIDGE_SCHEMA_VERSION: u32 = 1;

impl BridgeStateDoc {
    pub fn new(
        bridge_id: BridgeId,
        depth: u8,
        per_sprint: u32,
        flatline_threshold: f64,
        branch: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: CURRENT_BRIDGE_SCHEMA_VERSION,
            bridge_id,
            state: BridgeStatus::JackIn,
            depth,
            per_sprint,
            flatline_threshold,
            branch: branch.into(),
            iterations: Vec::new(),
            metrics: BridgeMetrics::default(),
            finalization: FinalizationRecord::default(),
            timestamps: Timestamps::new(now),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn last_completed_sequence(&self) -> Option<u32> {
        self.iterations
            .iter()
            .filter(|it| it.status == IterationStatus::Completed)
            .map(|it| it.sequence)
            .max()
    }

    /// The trajectory of severity-weighted finding counts, excluding
    /// research iterations, in sequence order (spec §4.7).
    pub fn flatline_trajectory(&self) -> Vec<f64> {
        let mut sorted: Vec<&Iteration> = self
            .iterations
            .iter()
            .filter(|it| it.status == IterationStatus::Completed)
            .filter_map(|it| it.weighted_findings.map(|_| it))
            .collect();
        sorted.sort_by_key(|it| it.sequence);
        sorted
            .into_iter()
            .map(|it| it.weighted_findings.unwrap_or(0.0))
            .collect()
    }
}
