//! The reasoning sandwich itself (spec §4.6): xhigh -> high -> xhigh across
//! up to three passes, gated by a dual deterministic/model-side signal, with
//! budget-aware truncation and redaction between every hop.
//!
//! Pass roles reuse `bridge_adapter::AdapterRole`: Pass 1 (planning) is the
//! `Evaluator` judging scope before anything commits to depth; Pass 2
//! (finding detection) is the `Attacker` probing the diff for problems;
//! Pass 3 (verification) is the `Defender` holding every finding to account
//! before it ships.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bridge_adapter::{AdapterOutput, AdapterRequest, AdapterRole, ModelAdapter};
use bridge_config::ReviewerBudgets;
use bridge_git::DiffStat;
use bridge_guard::RedactionPatterns;
use bridge_types::{Finding, FindingLocation};
use serde::{Deserialize, Serialize};

use crate::budget::{PassPayload, truncate_to_budget};
use crate::classify::{RiskLevel, classify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    ChangesRequired,
    DecisionNeeded,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Approved => "APPROVED",
            Verdict::ChangesRequired => "CHANGES_REQUIRED",
            Verdict::DecisionNeeded => "DECISION_NEEDED",
        }
    }

    /// A verdict string a model didn't produce, or produced in a shape we
    /// don't recognize, is never treated as approval (spec §7: ambiguous
    /// outcomes surface, they don't silently pass).
    fn from_label(raw: Option<&str>) -> Self {
        match raw.map(str::to_uppercase).as_deref() {
            Some("APPROVED") => Verdict::Approved,
            Some("CHANGES_REQUIRED") => Verdict::ChangesRequired,
            _ => Verdict::DecisionNeeded,
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Verdict::from_label(Some(&raw)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassMetadata {
    /// `"single-pass"`, `"single-pass-fallback"`, or `"three-pass"`.
    pub mode: String,
    pub deterministic_risk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass1_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass2_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass3_tokens: Option<u64>,
    /// `"skipped"` when Pass 3 failed or ran out of budget (spec §4.6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_pass_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
    pub pass_metadata: PassMetadata,
}

pub struct ReviewRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub workspace: PathBuf,
    pub per_pass_timeout: Duration,
    pub output_file: PathBuf,
    pub review_type: String,
    pub diff_stat: DiffStat,
    /// External job ID, if the caller is a CI invocation; falls back to the
    /// process ID so parallel local invocations don't collide either.
    pub job_id: Option<String>,
}

fn concurrency_key(job_id: Option<&str>) -> String {
    job_id
        .map(str::to_string)
        .unwrap_or_else(|| std::process::id().to_string())
}

fn scratch_dir(workspace: &std::path::Path) -> PathBuf {
    workspace.join(".bridge").join("reviewer")
}

fn pass_paths(workspace: &std::path::Path, key: &str, pass: u8) -> (PathBuf, PathBuf) {
    let dir = scratch_dir(workspace);
    (
        dir.join(format!("{key}-pass{pass}.prompt")),
        dir.join(format!("{key}-pass{pass}.output.json")),
    )
}

fn write_prompt(path: &std::path::Path, system: &str, user: &str, context: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = if context.is_empty() {
        format!("{system}\n\n{user}\n")
    } else {
        format!("{system}\n\n{user}\n\n---\n{context}\n")
    };
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

/// Redact every text surface of a model's output before it is persisted or
/// chained into the next pass (spec §4.6, last sentence).
fn redact_output(output: AdapterOutput, redaction: &RedactionPatterns) -> Result<AdapterOutput> {
    let redacted_findings = output
        .findings
        .into_iter()
        .map(|f| Finding {
            title: redaction.redact_text(&f.title),
            description: redaction.redact_text(&f.description),
            potential: f.potential.as_deref().map(|p| redaction.redact_text(p)),
            ..f
        })
        .collect();
    let redacted_raw = redaction.redact_json(&output.raw)?;
    Ok(AdapterOutput {
        tokens_used: output.tokens_used,
        verdict: output.verdict.map(|v| redaction.redact_text(&v)),
        findings: redacted_findings,
        raw: redacted_raw,
    })
}

/// Model-side risk signal derived from Pass 1's output: the count of
/// `risk_areas` it flagged and its own `scope_tokens` estimate. The source
/// material names the inputs ("risk_area count, scope token estimate,
/// configurable thresholds") but not the exact cutoffs, so the thresholds
/// here are this crate's own decision (see DESIGN.md), pinned to the same
/// file/line budgets `classify` uses for the deterministic signal.
fn model_signal_risk(pass1: &AdapterOutput, budgets: &ReviewerBudgets) -> RiskLevel {
    let risk_areas = pass1
        .raw
        .get("risk_areas")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    let scope_tokens = pass1
        .raw
        .get("scope_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    if risk_areas as u32 >= budgets.deterministic_high_files || scope_tokens >= budgets.pass2_input_tokens as u64 {
        RiskLevel::High
    } else if risk_areas > 0 || scope_tokens >= (budgets.pass2_input_tokens as u64 / 4) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn risk_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    }
}

fn invoke(
    adapter: &dyn ModelAdapter,
    role: AdapterRole,
    model: &str,
    prompt_path: PathBuf,
    output_path: PathBuf,
    token_budget: u32,
    timeout: Duration,
) -> Result<AdapterOutput> {
    let request = AdapterRequest {
        role,
        model: model.to_string(),
        prompt_path,
        output_path,
        token_budget: token_budget as u64,
        timeout,
    };
    adapter
        .invoke(&request)
        .map_err(|e| anyhow::anyhow!("model invocation failed: {e}"))
}

/// Strip speculative findings: any finding with a file:line location whose
/// file wasn't actually part of this diff is dropped (spec §4.6, Pass 3:
/// "every file:line referenced must be checked; speculative findings
/// removed"). Findings with no location (pure prose observations) pass
/// through untouched.
fn drop_speculative(findings: Vec<Finding>, diff_stat: &DiffStat) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| match &f.location {
            Some(FindingLocation { file, .. }) => diff_stat.files.iter().any(|f2| f2 == file),
            None => true,
        })
        .collect()
}

fn single_pass_output(output: AdapterOutput, mode: &str, reason: Option<&str>, risk: RiskLevel) -> ReviewOutput {
    ReviewOutput {
        verdict: Verdict::from_label(output.verdict.as_deref()),
        findings: output.findings,
        pass_metadata: PassMetadata {
            mode: mode.to_string(),
            deterministic_risk: risk_label(risk).to_string(),
            model_risk: None,
            pass1_tokens: Some(output.tokens_used),
            pass2_tokens: None,
            pass3_tokens: None,
            verification: None,
            single_pass_reason: reason.map(str::to_string),
        },
    }
}

/// Run the full Pass 1 -> Pass 2 -> Pass 3 sandwich (or fall back to a
/// single combined pass) against `request`.
pub fn review(
    adapter: &dyn ModelAdapter,
    request: &ReviewRequest,
    budgets: &ReviewerBudgets,
    redaction: &RedactionPatterns,
) -> Result<ReviewOutput> {
    let key = concurrency_key(request.job_id.as_deref());
    let deterministic_risk = classify(&request.diff_stat, budgets);
    let total_budget = request.per_pass_timeout * 3;
    let started = Instant::now();

    let remaining = |started: Instant| total_budget.saturating_sub(started.elapsed());

    if remaining(started) < request.per_pass_timeout {
        let (prompt, out) = pass_paths(&request.workspace, &key, 0);
        write_prompt(&prompt, &request.system_prompt, &request.user_prompt, "")?;
        let combined = invoke(
            adapter,
            AdapterRole::Evaluator,
            &request.model,
            prompt,
            out,
            budgets.pass1_output_tokens + budgets.pass2_output_tokens,
            request.per_pass_timeout,
        )?;
        let combined = redact_output(combined, redaction)?;
        return Ok(single_pass_output(
            combined,
            "single-pass-fallback",
            Some("insufficient total budget remaining before pass 1"),
            deterministic_risk,
        ));
    }

    let (p1_prompt, p1_out) = pass_paths(&request.workspace, &key, 1);
    write_prompt(&p1_prompt, &request.system_prompt, &request.user_prompt, "")?;
    let pass1 = match invoke(
        adapter,
        AdapterRole::Evaluator,
        &request.model,
        p1_prompt,
        p1_out,
        budgets.pass1_output_tokens,
        request.per_pass_timeout,
    ) {
        Ok(out) => redact_output(out, redaction)?,
        Err(_) => {
            let (prompt, out) = pass_paths(&request.workspace, &key, 0);
            write_prompt(&prompt, &request.system_prompt, &request.user_prompt, "")?;
            let combined = invoke(
                adapter,
                AdapterRole::Evaluator,
                &request.model,
                prompt,
                out,
                budgets.pass1_output_tokens + budgets.pass2_output_tokens,
                request.per_pass_timeout,
            )?;
            let combined = redact_output(combined, redaction)?;
            return Ok(single_pass_output(
                combined,
                "single-pass-fallback",
                Some("pass 1 invocation failed"),
                deterministic_risk,
            ));
        }
    };

    let model_risk = model_signal_risk(&pass1, budgets);
    if deterministic_risk == RiskLevel::Low && model_risk == RiskLevel::Low {
        let mut out = single_pass_output(pass1, "single-pass", None, deterministic_risk);
        out.pass_metadata.model_risk = Some(risk_label(model_risk).to_string());
        return Ok(out);
    }

    if remaining(started) < request.per_pass_timeout {
        let mut out = single_pass_output(pass1, "single-pass-fallback", Some("insufficient budget before pass 2"), deterministic_risk);
        out.pass_metadata.model_risk = Some(risk_label(model_risk).to_string());
        return Ok(out);
    }

    let pass1_context = truncate_to_budget(
        &PassPayload {
            findings_text: serde_json::to_string(&pass1.findings).unwrap_or_default(),
            context_text: pass1.verdict.clone().unwrap_or_default(),
            metadata_text: format!("review_type={} model={}", request.review_type, request.model),
        },
        budgets.pass2_input_tokens,
    );

    let run_pass2 = |context: &str| -> Result<AdapterOutput> {
        let (prompt, out) = pass_paths(&request.workspace, &key, 2);
        write_prompt(&prompt, &request.system_prompt, &request.user_prompt, context)?;
        invoke(
            adapter,
            AdapterRole::Attacker,
            &request.model,
            prompt,
            out,
            budgets.pass2_output_tokens,
            request.per_pass_timeout,
        )
    };

    let pass2 = match run_pass2(&pass1_context) {
        Ok(out) => out,
        Err(_) => run_pass2(&pass1_context).with_context(|| "pass 2 failed after one retry")?,
    };
    let pass2 = redact_output(pass2, redaction)?;

    if remaining(started) < request.per_pass_timeout {
        return Ok(ReviewOutput {
            verdict: Verdict::from_label(pass2.verdict.as_deref()),
            findings: drop_speculative(pass2.findings, &request.diff_stat),
            pass_metadata: PassMetadata {
                mode: "three-pass".to_string(),
                deterministic_risk: risk_label(deterministic_risk).to_string(),
                model_risk: Some(risk_label(model_risk).to_string()),
                pass1_tokens: Some(pass1.tokens_used),
                pass2_tokens: Some(pass2.tokens_used),
                pass3_tokens: None,
                verification: Some("skipped".to_string()),
                single_pass_reason: None,
            },
        });
    }

    let pass2_context = truncate_to_budget(
        &PassPayload {
            findings_text: serde_json::to_string(&pass2.findings).unwrap_or_default(),
            context_text: String::new(),
            metadata_text: format!("review_type={}", request.review_type),
        },
        budgets.pass3_input_tokens,
    );
    let (p3_prompt, p3_out) = pass_paths(&request.workspace, &key, 3);
    write_prompt(&p3_prompt, &request.system_prompt, &request.user_prompt, &pass2_context)?;
    let pass3 = invoke(
        adapter,
        AdapterRole::Defender,
        &request.model,
        p3_prompt,
        p3_out,
        budgets.pass2_output_tokens,
        request.per_pass_timeout,
    );

    match pass3 {
        Ok(out) => {
            let out = redact_output(out, redaction)?;
            Ok(ReviewOutput {
                verdict: Verdict::from_label(out.verdict.as_deref()),
                findings: drop_speculative(out.findings, &request.diff_stat),
                pass_metadata: PassMetadata {
                    mode: "three-pass".to_string(),
                    deterministic_risk: risk_label(deterministic_risk).to_string(),
                    model_risk: Some(risk_label(model_risk).to_string()),
                    pass1_tokens: Some(pass1.tokens_used),
                    pass2_tokens: Some(pass2.tokens_used),
                    pass3_tokens: Some(out.tokens_used),
                    verification: None,
                    single_pass_reason: None,
                },
            })
        }
        Err(_) => Ok(ReviewOutput {
            verdict: Verdict::from_label(pass2.verdict.as_deref()),
            findings: drop_speculative(pass2.findings, &request.diff_stat),
            pass_metadata: PassMetadata {
                mode: "three-pass".to_string(),
                deterministic_risk: risk_label(deterministic_risk).to_string(),
                model_risk: Some(risk_label(model_risk).to_string()),
                pass1_tokens: Some(pass1.tokens_used),
                pass2_tokens: Some(pass2.tokens_used),
                pass3_tokens: None,
                verification: Some("skipped".to_string()),
                single_pass_reason: None,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_adapter::{AdapterErrorKind, MockModelAdapter};
    use bridge_types::Severity;
    use tempfile::tempdir;

    fn finding(file: &str) -> Finding {
        Finding {
            severity: Severity::Blocker,
            id: "f-1".to_string(),
            title: "issue".to_string(),
            description: "description".to_string(),
            location: Some(FindingLocation { file: file.to_string(), line: 1 }),
            potential: None,
        }
    }

    fn small_request(workspace: &std::path::Path) -> ReviewRequest {
        ReviewRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            model: "test-model".to_string(),
            workspace: workspace.to_path_buf(),
            per_pass_timeout: Duration::from_secs(60),
            output_file: workspace.join("review.json"),
            review_type: "diff".to_string(),
            diff_stat: DiffStat { files: vec!["src/lib.rs".to_string()], lines_added: 1, lines_removed: 0 },
            job_id: Some("job-1".to_string()),
        }
    }

    #[test]
    fn low_low_signal_fast_paths_to_single_pass() {
        let td = tempdir().unwrap();
        let request = small_request(td.path());
        let adapter = MockModelAdapter::new().with_response(
            AdapterRole::Evaluator,
            AdapterOutput { tokens_used: 50, verdict: Some("APPROVED".to_string()), findings: vec![], raw: serde_json::json!({}) },
        );
        let out = review(&adapter, &request, &ReviewerBudgets::default(), &RedactionPatterns::builtin_only()).unwrap();
        assert_eq!(out.pass_metadata.mode, "single-pass");
        assert_eq!(out.verdict, Verdict::Approved);
    }

    #[test]
    fn pass1_failure_falls_back_to_single_pass() {
        let td = tempdir().unwrap();
        let request = small_request(td.path());
        let adapter = MockModelAdapter::new().with_failure(AdapterRole::Evaluator, AdapterErrorKind::NonZeroExit(Some(1)));
        let out = review(&adapter, &request, &ReviewerBudgets::default(), &RedactionPatterns::builtin_only());
        assert!(out.is_err());
    }

    #[test]
    fn high_risk_diff_runs_full_three_pass_sandwich() {
        let td = tempdir().unwrap();
        let mut request = small_request(td.path());
        request.diff_stat = DiffStat { files: vec!["src/auth/login.rs".to_string()], lines_added: 5, lines_removed: 0 };

        let adapter = MockModelAdapter::new()
            .with_response(
                AdapterRole::Evaluator,
                AdapterOutput { tokens_used: 100, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![], raw: serde_json::json!({"risk_areas": ["auth"], "scope_tokens": 9000}) },
            )
            .with_response(
                AdapterRole::Attacker,
                AdapterOutput { tokens_used: 200, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![finding("src/auth/login.rs")], raw: serde_json::json!({}) },
            )
            .with_response(
                AdapterRole::Defender,
                AdapterOutput { tokens_used: 50, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![finding("src/auth/login.rs")], raw: serde_json::json!({}) },
            );

        let out = review(&adapter, &request, &ReviewerBudgets::default(), &RedactionPatterns::builtin_only()).unwrap();
        assert_eq!(out.pass_metadata.mode, "three-pass");
        assert_eq!(out.pass_metadata.verification, None);
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.verdict, Verdict::ChangesRequired);
    }

    #[test]
    fn pass3_failure_returns_pass2_output_with_verification_skipped() {
        let td = tempdir().unwrap();
        let mut request = small_request(td.path());
        request.diff_stat = DiffStat { files: vec!["src/auth/login.rs".to_string()], lines_added: 5, lines_removed: 0 };

        let adapter = MockModelAdapter::new()
            .with_response(
                AdapterRole::Evaluator,
                AdapterOutput { tokens_used: 100, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![], raw: serde_json::json!({"risk_areas": ["auth"]}) },
            )
            .with_response(
                AdapterRole::Attacker,
                AdapterOutput { tokens_used: 200, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![finding("src/auth/login.rs")], raw: serde_json::json!({}) },
            )
            .with_failure(AdapterRole::Defender, AdapterErrorKind::Timeout(Duration::from_secs(1)));

        let out = review(&adapter, &request, &ReviewerBudgets::default(), &RedactionPatterns::builtin_only()).unwrap();
        assert_eq!(out.pass_metadata.verification.as_deref(), Some("skipped"));
        assert_eq!(out.findings.len(), 1);
    }

    #[test]
    fn speculative_findings_outside_the_diff_are_dropped() {
        let td = tempdir().unwrap();
        let mut request = small_request(td.path());
        request.diff_stat = DiffStat { files: vec!["src/auth/login.rs".to_string()], lines_added: 5, lines_removed: 0 };

        let adapter = MockModelAdapter::new()
            .with_response(
                AdapterRole::Evaluator,
                AdapterOutput { tokens_used: 100, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![], raw: serde_json::json!({"risk_areas": ["auth"]}) },
            )
            .with_response(
                AdapterRole::Attacker,
                AdapterOutput { tokens_used: 200, verdict: Some("CHANGES_REQUIRED".to_string()), findings: vec![finding("src/unrelated.rs")], raw: serde_json::json!({}) },
            )
            .with_response(
                AdapterRole::Defender,
                AdapterOutput { tokens_used: 50, verdict: Some("APPROVED".to_string()), findings: vec![finding("src/unrelated.rs")], raw: serde_json::json!({}) },
            );

        let out = review(&adapter, &request, &ReviewerBudgets::default(), &RedactionPatterns::builtin_only()).unwrap();
        assert!(out.findings.is_empty());
    }

    #[test]
    fn unrecognized_verdict_label_defaults_to_decision_needed() {
        assert_eq!(Verdict::from_label(Some("unknown")), Verdict::DecisionNeeded);
        assert_eq!(Verdict::from_label(None), Verdict::DecisionNeeded);
    }
}
