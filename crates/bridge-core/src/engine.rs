//! Bridge Iteration Engine (spec §4.7): the outer orchestrator that walks
//! the phase graph `JACK_IN -> ITERATING -> (RESEARCHING) -> (EXPLORING)
//! -> FINALIZING -> JACKED_OUT`, calling into the facilities this
//! workspace already ships (Vision Registry, Multi-Pass Reviewer, State
//! Store, Event Sink) and delegating everything else to an injected
//! [`Dispatcher`].

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use bridge_adapter::ModelAdapter;
use bridge_config::{BridgeConfig, ReviewerBudgets};
use bridge_events::EventSink;
use bridge_git::{self, DiffStat};
use bridge_guard::RedactionPatterns;
use bridge_lock::BridgePaths;
use bridge_reviewer::{ReviewOutput, ReviewRequest, Verdict, review as run_review};
use bridge_state::BridgeStateStore;
use bridge_types::{
    BridgeId, BridgeStateDoc, BridgeStatus, EventRecord, Finding, Iteration, IterationSource,
    IterationStatus,
};
use bridge_vision::{CaptureInput, Registry as VisionRegistry};
use chrono::Utc;

use crate::convergence::{is_flatlined, weighted_finding_count};
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::signal::{self, Signal};

/// Build the state store, wiring in state-at-rest encryption when
/// `config.encryption` has a reachable passphrase (spec §10). A disabled or
/// passphrase-less config behaves exactly like `BridgeStateStore::new`.
fn state_store(paths: &BridgePaths, config: &BridgeConfig, project_root: &Path) -> BridgeStateStore {
    let store = BridgeStateStore::new(paths.state_dir(), project_root);
    match bridge_encrypt::StateEncryption::new(config.encryption.clone()) {
        Ok(enc) => store.with_encryption(enc),
        Err(_) => store,
    }
}

/// Mirrors the teacher's `Reporter` contract: info/warn/error, injected so
/// the engine never hard-codes a logging backend. The CLI implements this
/// with `eprintln!`; tests implement it by collecting into a `Vec<String>`.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// Per-run tunables that aren't workspace-wide configuration (those live in
/// [`BridgeConfig`]) — the things a specific invocation supplies: which
/// branch, which model, what the review prompts say, which optional
/// phases are switched on.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub depth: u8,
    pub per_sprint: u32,
    pub model: String,
    pub review_system_prompt: String,
    pub review_user_prompt: String,
    pub review_type: String,
    pub per_pass_timeout: Duration,
    /// Ref the engine diffs every iteration's accumulated changes against.
    pub base_ref: String,
    pub job_id: Option<String>,
    pub cross_repo_enabled: bool,
    pub lore_scan_enabled: bool,
    pub github_trail_enabled: bool,
    pub vision_sprint_enabled: bool,
    pub research_enabled: bool,
    pub inquiry_enabled: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            depth: 3,
            per_sprint: 1,
            model: "default".to_string(),
            review_system_prompt: String::new(),
            review_user_prompt: String::new(),
            review_type: "iteration".to_string(),
            per_pass_timeout: Duration::from_secs(300),
            base_ref: "HEAD".to_string(),
            job_id: None,
            cross_repo_enabled: false,
            lore_scan_enabled: false,
            github_trail_enabled: false,
            vision_sprint_enabled: false,
            research_enabled: false,
            inquiry_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub branch: Option<String>,
    pub protected_branch: bool,
    pub sprint_plan_exists: bool,
    pub depth_valid: bool,
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub fn is_clear(&self) -> bool {
        !self.protected_branch && self.sprint_plan_exists && self.depth_valid
    }
}

/// Run every preflight check (spec §4.7, "Preflight"). Optional-tool and
/// beads health is always a warning, never a blocker: a missing `gh` or
/// `beads` binary surfaces in `warnings` but never fails the call.
pub fn run_preflight(
    paths: &BridgePaths,
    opts: &RuntimeOptions,
    reporter: &mut dyn Reporter,
) -> Result<PreflightReport, BridgeError> {
    let branch = bridge_git::current_branch(paths.project_root())
        .map_err(|e| BridgeError::Config(format!("unable to determine current branch: {e}")))?;
    let protected_branch = branch.as_deref().is_some_and(bridge_git::is_protected_branch);
    let sprint_plan_exists = paths.sprint_plan().exists();
    let depth_valid = (1..=5).contains(&opts.depth);

    let doctor_report = bridge_doctor::run(paths);
    let mut warnings = Vec::new();
    if doctor_report.warnings > 0 {
        for rec in &doctor_report.recommendations {
            warnings.push(rec.clone());
            reporter.warn(rec);
        }
    }

    if protected_branch {
        reporter.error(&format!(
            "refusing to run on protected branch {:?}",
            branch.as_deref().unwrap_or("<detached>")
        ));
    }
    if !sprint_plan_exists {
        reporter.error(&format!("sprint plan not found at {}", paths.sprint_plan().display()));
    }
    if !depth_valid {
        reporter.error(&format!("depth {} is out of range [1,5]", opts.depth));
    }

    Ok(PreflightReport { branch, protected_branch, sprint_plan_exists, depth_valid, warnings })
}

/// Poll for a sentinel file the dispatcher must touch when an out-of-band
/// wait completes (spec §4.7, "Exploration (vision-sprint)"). Returns
/// `true` if the sentinel appeared before `timeout`, `false` on timeout —
/// timing out here is explicitly non-fatal.
pub fn wait_for_sentinel(sentinel_path: &Path, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if sentinel_path.exists() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
}

struct RunContext<'a> {
    paths: &'a BridgePaths,
    store: &'a BridgeStateStore,
    sink: &'a mut EventSink,
    vision: &'a VisionRegistry,
    adapter: &'a dyn ModelAdapter,
    dispatcher: &'a mut dyn Dispatcher,
    reporter: &'a mut dyn Reporter,
    opts: &'a RuntimeOptions,
    config: &'a BridgeConfig,
    redaction: &'a RedactionPatterns,
}

/// Start a brand-new bridge: preflight, `init`, then run every phase
/// through to `JACKED_OUT` (or `HALTED` on a timeout or interrupt).
#[allow(clippy::too_many_arguments)]
pub fn run(
    paths: &BridgePaths,
    opts: &RuntimeOptions,
    config: &BridgeConfig,
    adapter: &dyn ModelAdapter,
    dispatcher: &mut dyn Dispatcher,
    reporter: &mut dyn Reporter,
) -> Result<BridgeStateDoc, BridgeError> {
    let preflight = run_preflight(paths, opts, reporter)?;
    if !preflight.is_clear() {
        return Err(BridgeError::Config(format!(
            "preflight failed: protected_branch={} sprint_plan_exists={} depth_valid={}",
            preflight.protected_branch, preflight.sprint_plan_exists, preflight.depth_valid
        )));
    }

    let now = Utc::now();
    let bridge_id = BridgeId::generate(now);
    let branch = preflight.branch.clone().unwrap_or_else(|| "HEAD".to_string());
    let mut doc = BridgeStateDoc::new(
        bridge_id,
        opts.depth,
        opts.per_sprint,
        config.flatline.threshold,
        branch,
        now,
    );

    let store = state_store(paths, config, paths.project_root());
    store
        .init(&doc)
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to initialize bridge state: {e}")))?;

    let mut sink = EventSink::new(paths.event_dir());
    let vision = VisionRegistry::new(paths.vision_dir(), paths.vision_index(), paths.lore_file(), paths.lock_dir())
        .with_lore_elevation_threshold(config.vision.lore_elevation_refs);
    let redaction = RedactionPatterns::builtin_only();

    let mut ctx = RunContext {
        paths,
        store: &store,
        sink: &mut sink,
        vision: &vision,
        adapter,
        dispatcher,
        reporter,
        opts,
        config,
        redaction: &redaction,
    };

    advance(&mut ctx, &mut doc, BridgeStatus::Iterating, 1)
}

/// Resume a halted/in-progress/exploring bridge (spec §4.7, "Resume").
#[allow(clippy::too_many_arguments)]
pub fn run_resume(
    paths: &BridgePaths,
    opts: &RuntimeOptions,
    config: &BridgeConfig,
    adapter: &dyn ModelAdapter,
    dispatcher: &mut dyn Dispatcher,
    reporter: &mut dyn Reporter,
) -> Result<BridgeStateDoc, BridgeError> {
    let store = state_store(paths, config, paths.project_root());
    let mut doc = store
        .load()
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to load bridge state: {e}")))?
        .ok_or_else(|| BridgeError::Config("no bridge state to resume".to_string()))?;

    if !doc.state.is_resumable() {
        return Err(BridgeError::Config(format!(
            "bridge state {:?} is not resumable",
            doc.state
        )));
    }

    let mut sink = EventSink::new(paths.event_dir());
    let vision = VisionRegistry::new(paths.vision_dir(), paths.vision_index(), paths.lore_file(), paths.lock_dir())
        .with_lore_elevation_threshold(config.vision.lore_elevation_refs);
    let redaction = RedactionPatterns::builtin_only();

    let (next_state, next_iteration) = match doc.state {
        BridgeStatus::Halted | BridgeStatus::Iterating => {
            let next_seq = doc.last_completed_sequence().map(|s| s + 1).unwrap_or(1);
            (BridgeStatus::Iterating, next_seq)
        }
        BridgeStatus::Exploring => {
            doc.finalization.skip_reason =
                Some("resumed from EXPLORING; vision sprint skipped".to_string());
            (BridgeStatus::Finalizing, 0)
        }
        other => return Err(BridgeError::Config(format!("{other:?} is not resumable"))),
    };

    let mut ctx = RunContext {
        paths,
        store: &store,
        sink: &mut sink,
        vision: &vision,
        adapter,
        dispatcher,
        reporter,
        opts,
        config,
        redaction: &redaction,
    };

    advance(&mut ctx, &mut doc, next_state, next_iteration)
}

/// Drive the phase graph forward from `entry_state`. `start_iteration` is
/// only meaningful when `entry_state` is `Iterating` (the next sequence
/// number to execute); it is ignored otherwise.
fn advance(
    ctx: &mut RunContext<'_>,
    doc: &mut BridgeStateDoc,
    entry_state: BridgeStatus,
    start_iteration: u32,
) -> Result<BridgeStateDoc, BridgeError> {
    let mut state = entry_state;

    if state == BridgeStatus::Iterating {
        update_phase(ctx, doc, BridgeStatus::Iterating)?;
        // `run_iterations` only returns once it has either flatlined or
        // exhausted `depth` — there is no third way out of that loop — so
        // the next phase is always RESEARCHING here. Whether RESEARCHING
        // and EXPLORING actually do anything is decided downstream by
        // `ctx.opts.research_enabled` / `ctx.opts.vision_sprint_enabled`.
        run_iterations(ctx, doc, start_iteration)?;
        state = BridgeStatus::Researching;
    }

    if state == BridgeStatus::Researching {
        if ctx.opts.research_enabled {
            update_phase(ctx, doc, BridgeStatus::Researching)?;
            run_research(ctx, doc)?;
        }
        state = BridgeStatus::Exploring;
    }

    if state == BridgeStatus::Exploring {
        if ctx.opts.vision_sprint_enabled {
            update_phase(ctx, doc, BridgeStatus::Exploring)?;
            run_exploration(ctx, doc)?;
        }
        state = BridgeStatus::Finalizing;
    }

    update_phase(ctx, doc, BridgeStatus::Finalizing)?;
    run_finalization(ctx, doc)?;

    update_phase(ctx, doc, BridgeStatus::JackedOut)?;
    ctx.reporter.info(&format!("bridge {} jacked out", doc.bridge_id));
    Ok(doc.clone())
}

fn update_phase(ctx: &mut RunContext<'_>, doc: &mut BridgeStateDoc, next: BridgeStatus) -> Result<(), BridgeError> {
    doc.state = next;
    ctx.store
        .save(doc)
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to persist phase transition: {e}")))?;
    emit_event(ctx, "phase", &format!("{next:?}"), serde_json::json!({ "state": format!("{next:?}") }));
    Ok(())
}

fn emit_event(ctx: &mut RunContext<'_>, kind: &str, event: &str, data: serde_json::Value) {
    let _ = ctx.sink.emit("bridge-core", EventRecord::new(kind, event, data));
}

/// The ITERATING loop (spec §4.7 phase graph): up to `depth` iterations,
/// each running Sprint Execution -> (Cross-Repo Query) -> Vision Relevance
/// Check -> Context Load -> Multi-Model Review -> (Lore Reference Scan) ->
/// Vision Capture -> Convergence Check. Returns whether the trajectory
/// flatlined before `depth` was exhausted.
fn run_iterations(ctx: &mut RunContext<'_>, doc: &mut BridgeStateDoc, start_iteration: u32) -> Result<bool, BridgeError> {
    let depth = doc.depth as u32;
    let mut flatlined = false;

    for iteration in start_iteration..=depth {
        doc.iterations.push(Iteration {
            sequence: iteration,
            status: IterationStatus::InProgress,
            source: IterationSource::Existing,
            weighted_findings: None,
        });
        ctx.store
            .save(doc)
            .map_err(|e| BridgeError::InvariantViolation(format!("failed to record in-progress iteration: {e}")))?;

        signal::emit(Signal::RunSprintPlan, iteration);
        let sprint = ctx
            .dispatcher
            .run_sprint(iteration)
            .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;

        if ctx.opts.cross_repo_enabled {
            signal::emit(Signal::CrossRepoQuery, iteration);
            let cross_repo_findings = ctx
                .dispatcher
                .cross_repo_query(iteration)
                .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;
            doc.metrics.cross_repo_matches += cross_repo_findings.len() as u64;
        }

        signal::emit(Signal::VisionCheck, iteration);
        let relevant = ctx
            .vision
            .relevant_to(&sprint.files_changed, ctx.config.vision.relevance_min_overlap)
            .map_err(|e| BridgeError::InvariantViolation(format!("vision relevance query failed: {e}")))?;
        if !relevant.is_empty() {
            ctx.reporter
                .info(&format!("{} active vision(s) relevant to this iteration's scope", relevant.len()));
        }

        let diff_stat = diff_stat_for(ctx, &sprint);

        let review_output = run_multi_model_review(ctx, doc, iteration, &diff_stat)?;

        if ctx.opts.lore_scan_enabled {
            signal::emit(Signal::LoreReferenceScan, iteration);
            ctx.dispatcher
                .lore_reference_scan(iteration)
                .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;
        }

        capture_visions(ctx, doc, iteration, &review_output.findings)?;

        if ctx.opts.github_trail_enabled {
            signal::emit(Signal::GithubTrail, iteration);
            ctx.dispatcher
                .github_trail(iteration)
                .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;
        }

        let weighted = weighted_finding_count(&review_output.findings, &ctx.config.flatline);
        doc.metrics.sprints_executed += 1;
        doc.metrics.files_changed += diff_stat.files_changed();
        doc.metrics.findings_addressed += review_output.findings.len() as u64;
        if let Some(last) = doc.iterations.last_mut() {
            last.status = IterationStatus::Completed;
            last.weighted_findings = Some(weighted);
        }
        ctx.store
            .save(doc)
            .map_err(|e| BridgeError::InvariantViolation(format!("failed to record completed iteration: {e}")))?;

        signal::emit(Signal::FlatlineCheck, iteration);
        let trajectory = doc.flatline_trajectory();
        if is_flatlined(&trajectory, &ctx.config.flatline) {
            flatlined = true;
            ctx.reporter.info(&format!("flatlined at iteration {iteration}"));
            break;
        }
    }

    Ok(flatlined)
}

fn diff_stat_for(ctx: &RunContext<'_>, sprint: &crate::dispatcher::SprintOutcome) -> DiffStat {
    bridge_git::diff_stat(ctx.paths.project_root(), &ctx.opts.base_ref, "HEAD").unwrap_or_else(|_| DiffStat {
        files: sprint.files_changed.clone(),
        lines_added: sprint.lines_added,
        lines_removed: sprint.lines_removed,
    })
}

fn run_multi_model_review(
    ctx: &mut RunContext<'_>,
    doc: &BridgeStateDoc,
    iteration: u32,
    diff_stat: &DiffStat,
) -> Result<ReviewOutput, BridgeError> {
    signal::emit(Signal::BridgebuilderReview, iteration);

    let diff_text = bridge_git::diff_text(ctx.paths.project_root(), &ctx.opts.base_ref, "HEAD").unwrap_or_default();
    let user_prompt = if diff_text.is_empty() {
        ctx.opts.review_user_prompt.clone()
    } else {
        format!("{}\n\n---\n{diff_text}", ctx.opts.review_user_prompt)
    };

    let request = ReviewRequest {
        system_prompt: ctx.opts.review_system_prompt.clone(),
        user_prompt,
        model: ctx.opts.model.clone(),
        workspace: ctx.paths.project_root().to_path_buf(),
        per_pass_timeout: ctx.opts.per_pass_timeout,
        output_file: ctx.paths.cache_dir().join(format!("{}-iter{iteration}-review.json", doc.bridge_id)),
        review_type: ctx.opts.review_type.clone(),
        diff_stat: diff_stat.clone(),
        job_id: ctx.opts.job_id.clone(),
    };

    let budgets: &ReviewerBudgets = &ctx.config.reviewer;
    let output = run_review(ctx.adapter, &request, budgets, ctx.redaction)
        .map_err(|e| BridgeError::Model(format!("multi-pass review failed: {e}")))?;

    if output.verdict == Verdict::DecisionNeeded {
        ctx.reporter.warn(&format!(
            "iteration {iteration} review verdict is DECISION_NEEDED ({} findings)",
            output.findings.len()
        ));
    }

    Ok(output)
}

fn capture_visions(
    ctx: &mut RunContext<'_>,
    doc: &mut BridgeStateDoc,
    iteration: u32,
    findings: &[Finding],
) -> Result<(), BridgeError> {
    signal::emit(Signal::VisionCapture, iteration);
    let now = Utc::now();
    let source = doc.bridge_id.to_string();
    for finding in findings {
        if !finding.severity.routes_to_vision_registry() {
            continue;
        }
        let paths: Vec<String> = finding
            .location
            .as_ref()
            .map(|loc| vec![loc.file.clone()])
            .unwrap_or_default();
        let result = ctx
            .vision
            .capture(CaptureInput { finding, source: &source, now, paths: &paths })
            .map_err(|e| BridgeError::InvariantViolation(format!("vision capture failed: {e}")))?;
        ctx.reporter.info(&format!("captured {} from iteration {iteration}", result.id));
        doc.metrics.visions_captured += 1;
    }
    Ok(())
}

/// One divergent exploration pass (spec §4.7, "RESEARCHING"). Its findings
/// are SPECULATION-only by contract and recorded with no
/// `weighted_findings`, so [`BridgeStateDoc::flatline_trajectory`] skips
/// them automatically.
fn run_research(ctx: &mut RunContext<'_>, doc: &mut BridgeStateDoc) -> Result<(), BridgeError> {
    signal::emit(Signal::ResearchIteration, 0);
    let findings = ctx
        .dispatcher
        .research_iteration()
        .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;

    if ctx.opts.inquiry_enabled {
        signal::emit(Signal::InquiryMode, 0);
        let inquiry_findings = ctx
            .dispatcher
            .inquiry_mode()
            .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;
        doc.metrics.inquiry_findings += inquiry_findings.len() as u64;
    }

    let next_seq = doc.iterations.last().map(|it| it.sequence + 1).unwrap_or(1);
    doc.iterations.push(Iteration {
        sequence: next_seq,
        status: IterationStatus::Completed,
        source: IterationSource::Findings,
        weighted_findings: None,
    });
    doc.metrics.research_iterations_completed += 1;
    doc.metrics.findings_addressed += findings.len() as u64;
    ctx.store
        .save(doc)
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to record research iteration: {e}")))
}

/// Vision-sprint exploration: emit, block on the sentinel the dispatcher
/// touches, record whether it timed out (spec §4.7, "Exploration
/// (vision-sprint)"). A timeout is non-fatal.
fn run_exploration(ctx: &mut RunContext<'_>, doc: &mut BridgeStateDoc) -> Result<(), BridgeError> {
    signal::emit(Signal::VisionSprint, 0);
    let sentinel = ctx.paths.cache_dir().join(format!("{}-vision-sprint.sentinel", doc.bridge_id));
    signal::emit(Signal::VisionSprintSentinel, 0);

    let completed = wait_for_sentinel(
        &sentinel,
        Duration::from_secs(ctx.config.timeouts.vision_sprint_secs),
        Duration::from_millis(500),
    );

    doc.finalization.vision_sprint = completed;
    if !completed {
        signal::emit(Signal::VisionSprintTimeout, 0);
        doc.finalization.vision_sprint_timeout = true;
        ctx.reporter.warn("vision sprint timed out; continuing to finalization");
    }
    ctx.store
        .save(doc)
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to record exploration outcome: {e}")))
}

/// FINALIZING phase (spec §4.7): Ground Truth Update (blocking), README
/// regeneration and Lore Discovery (both non-blocking), then an RTFM gate
/// with a retry budget of one attempt before degrading to a warning.
fn run_finalization(ctx: &mut RunContext<'_>, doc: &mut BridgeStateDoc) -> Result<(), BridgeError> {
    signal::emit(Signal::GroundTruthUpdate, 0);
    ctx.dispatcher
        .ground_truth_update()
        .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;

    signal::emit(Signal::ButterfreezoneGen, 0);
    match ctx.dispatcher.butterfreezone_gen() {
        Ok(()) => doc.finalization.butterfreezone_generated = true,
        Err(e) => {
            ctx.reporter.error(&format!("README regeneration failed (non-blocking): {e}"));
            doc.finalization.butterfreezone_generated = false;
        }
    }

    signal::emit(Signal::LoreDiscovery, 0);
    match ctx.dispatcher.lore_discovery() {
        Ok(()) => doc.finalization.lore_discovery = true,
        Err(e) => {
            ctx.reporter.warn(&format!("lore discovery failed (non-blocking): {e}"));
            doc.finalization.lore_discovery = false;
        }
    }

    signal::emit(Signal::RtfmPass, 0);
    let mut passed = ctx
        .dispatcher
        .rtfm_pass()
        .map_err(|e| BridgeError::TransientInfra { attempts: 1, source: e })?;
    if !passed {
        signal::emit(Signal::RtfmPass, 0); // retry (budget 1)
        passed = ctx
            .dispatcher
            .rtfm_pass()
            .map_err(|e| BridgeError::TransientInfra { attempts: 2, source: e })?;
    }
    signal::emit(Signal::RtfmCheckResult, 0);
    doc.finalization.rtfm_passed = passed;
    if !passed {
        ctx.reporter.warn("RTFM documentation gate failed twice; degrading to warning");
    }

    if ctx.opts.github_trail_enabled {
        signal::emit(Signal::FinalPrUpdate, 0);
        if let Err(e) = ctx.dispatcher.final_pr_update() {
            ctx.reporter.warn(&format!("final PR update failed (non-blocking): {e}"));
        }
    }

    ctx.store
        .save(doc)
        .map_err(|e| BridgeError::InvariantViolation(format!("failed to persist finalization record: {e}")))
}

/// Record an interrupt and transition to HALTED so a later `--resume` can
/// distinguish a clean stop from a crash (spec §7, `UserInterrupt`).
pub fn interrupt(paths: &BridgePaths, config: &BridgeConfig) -> Result<(), BridgeError> {
    let store = state_store(paths, config, paths.project_root());
    store
        .save_interrupt()
        .with_context(|| "saving interrupt state")
        .map_err(|e| BridgeError::InvariantViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_adapter::MockModelAdapter;
    use tempfile::tempdir;

    struct CollectingReporter {
        infos: Vec<String>,
        warns: Vec<String>,
        errors: Vec<String>,
    }

    impl CollectingReporter {
        fn new() -> Self {
            Self { infos: Vec::new(), warns: Vec::new(), errors: Vec::new() }
        }
    }

    impl Reporter for CollectingReporter {
        fn info(&mut self, msg: &str) {
            self.infos.push(msg.to_string());
        }
        fn warn(&mut self, msg: &str) {
            self.warns.push(msg.to_string());
        }
        fn error(&mut self, msg: &str) {
            self.errors.push(msg.to_string());
        }
    }

    fn init_repo_with_sprint_plan(root: &Path) -> BridgePaths {
        std::process::Command::new("git").args(["init", "-q", "-b", "feature/x"]).current_dir(root).output().unwrap();
        std::process::Command::new("git")
            .args(["config", "user.email", "t@example.com"])
            .current_dir(root)
            .output()
            .unwrap();
        std::process::Command::new("git").args(["config", "user.name", "Test"]).current_dir(root).output().unwrap();
        let paths = BridgePaths::new(root);
        std::fs::create_dir_all(paths.grimoire_dir()).unwrap();
        std::fs::write(paths.sprint_plan(), "# Sprint Plan\n").unwrap();
        std::fs::write(root.join("README.md"), "placeholder\n").unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(root).output().unwrap();
        std::process::Command::new("git").args(["commit", "-q", "-m", "init"]).current_dir(root).output().unwrap();
        paths
    }

    #[test]
    fn preflight_refuses_protected_branch() {
        let td = tempdir().unwrap();
        std::process::Command::new("git").args(["init", "-q", "-b", "main"]).current_dir(td.path()).output().unwrap();
        let paths = BridgePaths::new(td.path());
        let opts = RuntimeOptions { depth: 3, ..RuntimeOptions::default() };
        let mut reporter = CollectingReporter::new();
        let report = run_preflight(&paths, &opts, &mut reporter).unwrap();
        assert!(report.protected_branch);
        assert!(!report.is_clear());
        assert!(!reporter.errors.is_empty());
    }

    #[test]
    fn preflight_rejects_out_of_range_depth() {
        let td = tempdir().unwrap();
        let paths = init_repo_with_sprint_plan(td.path());
        let opts = RuntimeOptions { depth: 9, ..RuntimeOptions::default() };
        let mut reporter = CollectingReporter::new();
        let report = run_preflight(&paths, &opts, &mut reporter).unwrap();
        assert!(!report.depth_valid);
        assert!(!report.is_clear());
    }

    #[test]
    fn preflight_passes_on_clean_feature_branch() {
        let td = tempdir().unwrap();
        let paths = init_repo_with_sprint_plan(td.path());
        let opts = RuntimeOptions { depth: 2, ..RuntimeOptions::default() };
        let mut reporter = CollectingReporter::new();
        let report = run_preflight(&paths, &opts, &mut reporter).unwrap();
        assert!(report.is_clear());
    }

    #[test]
    fn single_iteration_converges_when_reviewer_returns_no_findings() {
        let td = tempdir().unwrap();
        let paths = init_repo_with_sprint_plan(td.path());
        let opts = RuntimeOptions {
            depth: 3,
            research_enabled: false,
            vision_sprint_enabled: false,
            ..RuntimeOptions::default()
        };
        let config = BridgeConfig { flatline: bridge_config::FlatlineConfig { consecutive: 1, ..Default::default() }, ..BridgeConfig::default() };

        let mut adapter = MockModelAdapter::default();
        adapter.with_response(
            bridge_adapter::AdapterRole::Evaluator,
            bridge_adapter::AdapterOutput {
                tokens_used: 10,
                verdict: Some("APPROVED".to_string()),
                findings: Vec::new(),
                raw: serde_json::json!({ "risk_areas": [] }),
            },
        );

        let mut dispatcher = crate::dispatcher::NullDispatcher;
        let mut reporter = CollectingReporter::new();

        let doc = run(&paths, &opts, &config, &adapter, &mut dispatcher, &mut reporter).unwrap();
        assert_eq!(doc.state, BridgeStatus::JackedOut);
        assert_eq!(doc.metrics.sprints_executed, 1);
    }

    #[test]
    fn run_creates_no_state_file_when_branch_is_protected() {
        let td = tempdir().unwrap();
        std::process::Command::new("git").args(["init", "-q", "-b", "main"]).current_dir(td.path()).output().unwrap();
        let paths = BridgePaths::new(td.path());
        let opts = RuntimeOptions::default();
        let config = BridgeConfig::default();
        let adapter = MockModelAdapter::default();
        let mut dispatcher = crate::dispatcher::NullDispatcher;
        let mut reporter = CollectingReporter::new();

        let result = run(&paths, &opts, &config, &adapter, &mut dispatcher, &mut reporter);
        assert!(result.is_err());
        assert!(!paths.state_dir().join(bridge_state::BRIDGE_STATE_FILE).exists());
    }

    #[test]
    fn resume_from_halted_continues_at_next_iteration() {
        let td = tempdir().unwrap();
        let paths = init_repo_with_sprint_plan(td.path());
        let store = BridgeStateStore::new(paths.state_dir(), paths.project_root());
        let mut doc = BridgeStateDoc::new(
            BridgeId::generate(Utc::now()),
            3,
            1,
            0.05,
            "feature/x",
            Utc::now(),
        );
        doc.iterations.push(Iteration {
            sequence: 1,
            status: IterationStatus::Completed,
            source: IterationSource::Existing,
            weighted_findings: Some(10.0),
        });
        doc.state = BridgeStatus::Halted;
        store.init(&doc).unwrap();

        let opts = RuntimeOptions { depth: 3, ..RuntimeOptions::default() };
        let config = BridgeConfig { flatline: bridge_config::FlatlineConfig { consecutive: 1, ..Default::default() }, ..BridgeConfig::default() };
        let mut adapter = MockModelAdapter::default();
        adapter.with_response(
            bridge_adapter::AdapterRole::Evaluator,
            bridge_adapter::AdapterOutput {
                tokens_used: 10,
                verdict: Some("APPROVED".to_string()),
                findings: Vec::new(),
                raw: serde_json::json!({}),
            },
        );
        let mut dispatcher = crate::dispatcher::NullDispatcher;
        let mut reporter = CollectingReporter::new();

        let resumed = run_resume(&paths, &opts, &config, &adapter, &mut dispatcher, &mut reporter).unwrap();
        assert_eq!(resumed.state, BridgeStatus::JackedOut);
        assert!(resumed.iterations.iter().any(|it| it.sequence == 2));
    }

    #[test]
    fn resume_from_exploring_skips_straight_to_finalizing() {
        let td = tempdir().unwrap();
        let paths = init_repo_with_sprint_plan(td.path());
        let store = BridgeStateStore::new(paths.state_dir(), paths.project_root());
        let mut doc = BridgeStateDoc::new(BridgeId::generate(Utc::now()), 1, 1, 0.05, "feature/x", Utc::now());
        doc.state = BridgeStatus::Exploring;
        store.init(&doc).unwrap();

        let opts = RuntimeOptions::default();
        let config = BridgeConfig::default();
        let adapter = MockModelAdapter::default();
        let mut dispatcher = crate::dispatcher::NullDispatcher;
        let mut reporter = CollectingReporter::new();

        let resumed = run_resume(&paths, &opts, &config, &adapter, &mut dispatcher, &mut reporter).unwrap();
        assert_eq!(resumed.state, BridgeStatus::JackedOut);
        assert_eq!(
            resumed.finalization.skip_reason.as_deref(),
            Some("resumed from EXPLORING; vision sprint skipped")
        );
    }
}
