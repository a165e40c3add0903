//! The dispatcher contract: the engine's one escape hatch to whatever
//! actually does model-driven work it doesn't implement itself (spec
//! §4.7, "Signal interface" — "the engine itself does not invoke models").
//!
//! A handful of phases the engine DOES implement in-process, because this
//! workspace already ships the facility that does the real work: Multi-
//! Model Review (`bridge-reviewer`), Vision Capture (`bridge-vision`), and
//! the Convergence Check (`convergence`). Every other phase that requires
//! an actual coding agent — running a sprint, querying another repo,
//! regenerating documentation — is delegated to a `Dispatcher`
//! implementation, the in-process analogue of "an outer process reading
//! these SIGNAL lines off stdout." A real deployment's dispatcher tails
//! stdout and acts; this trait lets the same phase graph run under test
//! with a fixture dispatcher, the same way `Reporter` lets tests capture
//! log output instead of writing to stderr.

use anyhow::Result;
use bridge_types::Finding;

/// Outcome of running one sprint: the findings its review step produced,
/// and how many files it touched (fed into the Multi-Pass Reviewer's
/// deterministic classification).
#[derive(Debug, Clone, Default)]
pub struct SprintOutcome {
    pub files_changed: Vec<String>,
    pub lines_added: u64,
    pub lines_removed: u64,
}

pub trait Dispatcher {
    /// `GENERATE_SPRINT_FROM_FINDINGS`: turn the previous iteration's
    /// findings into the next iteration's sprint plan.
    fn generate_sprint_from_findings(&mut self, findings: &[Finding]) -> Result<()>;

    /// `RUN_SPRINT_PLAN` / `RUN_PER_SPRINT`: execute one iteration's work
    /// against the already-planned sprint.
    fn run_sprint(&mut self, iteration: u32) -> Result<SprintOutcome>;

    /// `CROSS_REPO_QUERY`: optional bounded probe of related repositories.
    fn cross_repo_query(&mut self, iteration: u32) -> Result<Vec<Finding>>;

    /// `LORE_REFERENCE_SCAN`: optional scan of the current diff against
    /// elevated lore entries.
    fn lore_reference_scan(&mut self, iteration: u32) -> Result<()>;

    /// `GITHUB_TRAIL`: optional audit trail write-back (PR comments,
    /// status checks). Best-effort; failures here never block iteration.
    fn github_trail(&mut self, iteration: u32) -> Result<()>;

    /// `RESEARCH_ITERATION`: one divergent exploration pass. Its output is
    /// SPECULATION-only by construction and excluded from the flatline
    /// trajectory.
    fn research_iteration(&mut self) -> Result<Vec<Finding>>;

    /// `INQUIRY_MODE`: optional clarifying-question pass, folded into
    /// `metrics.inquiry_findings` rather than the trajectory.
    fn inquiry_mode(&mut self) -> Result<Vec<Finding>>;

    /// `GROUND_TRUTH_UPDATE`: finalization step updating the PRD/SDD
    /// against what was actually built.
    fn ground_truth_update(&mut self) -> Result<()>;

    /// `BUTTERFREEZONE_GEN`: agent-grounded README regeneration.
    /// Non-blocking: a failure here is recorded but never aborts
    /// finalization (spec §4.7).
    fn butterfreezone_gen(&mut self) -> Result<()>;

    /// `LORE_DISCOVERY`: optional end-of-run sweep for new lore
    /// candidates.
    fn lore_discovery(&mut self) -> Result<()>;

    /// `RTFM_PASS` / `RTFM_CHECK_RESULT`: one documentation-fix attempt.
    /// Returns whether the check passed.
    fn rtfm_pass(&mut self) -> Result<bool>;

    /// `FINAL_PR_UPDATE`: closing PR description/status update.
    fn final_pr_update(&mut self) -> Result<()>;
}

/// A dispatcher that does nothing and reports empty results everywhere.
/// Useful as a base for tests that only care about a handful of phases —
/// wrap it and override the methods under test.
#[derive(Debug, Default)]
pub struct NullDispatcher;

impl Dispatcher for NullDispatcher {
    fn generate_sprint_from_findings(&mut self, _findings: &[Finding]) -> Result<()> {
        Ok(())
    }

    fn run_sprint(&mut self, _iteration: u32) -> Result<SprintOutcome> {
        Ok(SprintOutcome::default())
    }

    fn cross_repo_query(&mut self, _iteration: u32) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    fn lore_reference_scan(&mut self, _iteration: u32) -> Result<()> {
        Ok(())
    }

    fn github_trail(&mut self, _iteration: u32) -> Result<()> {
        Ok(())
    }

    fn research_iteration(&mut self) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    fn inquiry_mode(&mut self) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    fn ground_truth_update(&mut self) -> Result<()> {
        Ok(())
    }

    fn butterfreezone_gen(&mut self) -> Result<()> {
        Ok(())
    }

    fn lore_discovery(&mut self) -> Result<()> {
        Ok(())
    }

    fn rtfm_pass(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn final_pr_update(&mut self) -> Result<()> {
        Ok(())
    }
}
