//! Health & Doctor Reporter (spec §4.9): a read-only sweep across the
//! dependencies, optional tools, project state, and event bus the engine
//! relies on. Never mutates anything — every check is a query.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use bridge_lock::BridgePaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Info,
    Warning,
    Issue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CheckResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Ok, detail: detail.into(), version: None }
    }

    pub fn ok_versioned(detail: impl Into<String>, version: impl Into<String>) -> Self {
        Self { status: CheckStatus::Ok, detail: detail.into(), version: Some(version.into()) }
    }

    pub fn info(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Info, detail: detail.into(), version: None }
    }

    pub fn warning(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Warning, detail: detail.into(), version: None }
    }

    pub fn issue(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Issue, detail: detail.into(), version: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub status: AggregateStatus,
    pub exit_code: i32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, BTreeMap<String, CheckResult>>,
    pub recommendations: Vec<String>,
    pub issues: u32,
    pub warnings: u32,
}

impl DoctorReport {
    pub fn human_readable(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("bridge doctor — {:?} (v{})\n", self.status, self.version));
        for (category, checks) in &self.checks {
            out.push_str(&format!("\n[{category}]\n"));
            for (name, result) in checks {
                let marker = match result.status {
                    CheckStatus::Ok => "ok",
                    CheckStatus::Info => "info",
                    CheckStatus::Warning => "warn",
                    CheckStatus::Issue => "FAIL",
                };
                out.push_str(&format!("  {marker:>4}  {name}: {}\n", result.detail));
            }
        }
        if !self.recommendations.is_empty() {
            out.push_str("\nrecommendations:\n");
            for r in &self.recommendations {
                out.push_str(&format!("  - {r}\n"));
            }
        }
        out
    }
}

fn tool_version(program: &str, arg: &str) -> Option<String> {
    let output = Command::new(program).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

fn check_required_dependency(program: &str, version_flag: &str) -> CheckResult {
    if which::which(program).is_err() {
        return CheckResult::issue(format!("required tool `{program}` not found on PATH"));
    }
    match tool_version(program, version_flag) {
        Some(v) => CheckResult::ok_versioned(format!("`{program}` available"), v),
        None => CheckResult::warning(format!("`{program}` found but `--version` did not parse")),
    }
}

fn check_optional_tool(program: &str, version_flag: &str) -> CheckResult {
    if which::which(program).is_err() {
        return CheckResult::warning(format!("optional tool `{program}` not found on PATH"));
    }
    match tool_version(program, version_flag) {
        Some(v) => CheckResult::ok_versioned(format!("`{program}` available"), v),
        None => CheckResult::info(format!("`{program}` found, version unknown")),
    }
}

fn dependencies_checks() -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    m.insert("git".to_string(), check_required_dependency("git", "--version"));
    m.insert("cargo".to_string(), check_required_dependency("cargo", "--version"));
    m.insert("rustc".to_string(), check_required_dependency("rustc", "--version"));
    m
}

fn optional_tools_checks() -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    m.insert("gh".to_string(), check_optional_tool("gh", "--version"));
    m.insert("beads".to_string(), check_optional_tool("beads", "--version"));
    m
}

fn framework_checks() -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    m.insert(
        "os".to_string(),
        CheckResult::info(format!("{} / {}", std::env::consts::OS, std::env::consts::ARCH)),
    );
    m.insert(
        "rust_edition".to_string(),
        CheckResult::ok(format!("bridge built with edition {}", env!("CARGO_PKG_VERSION"))),
    );
    m
}

fn project_state_checks(paths: &BridgePaths) -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    m.insert(
        "sprint_plan".to_string(),
        if paths.sprint_plan().exists() {
            CheckResult::ok("sprint-plan.md present")
        } else {
            CheckResult::warning("sprint-plan.md missing; preflight will refuse to start an iteration")
        },
    );
    m.insert(
        "state_dir".to_string(),
        if paths.state_dir().exists() {
            CheckResult::ok("state directory present")
        } else {
            CheckResult::info("state directory does not exist yet (no prior run)")
        },
    );
    m.insert(
        "vision_index".to_string(),
        if paths.vision_index().exists() {
            CheckResult::ok("vision index present")
        } else {
            CheckResult::info("vision index does not exist yet")
        },
    );
    m
}

fn event_bus_checks(paths: &BridgePaths) -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    let event_dir = paths.event_dir();
    if !event_dir.exists() {
        m.insert("dead_letter_queue".to_string(), CheckResult::info("event directory does not exist yet"));
        return m;
    }
    let sink = bridge_events::EventSink::new(event_dir);
    let depth = sink.dlq_depth();
    let result = if depth == 0 {
        CheckResult::ok("dead-letter queue is empty")
    } else {
        CheckResult::warning(format!("{depth} record(s) sitting in the dead-letter queue"))
    };
    m.insert("dead_letter_queue".to_string(), result);
    m
}

fn beads_checks(project_root: &Path) -> BTreeMap<String, CheckResult> {
    let mut m = BTreeMap::new();
    let beads_dir = project_root.join(".beads");
    m.insert(
        "issue_tracker".to_string(),
        if beads_dir.exists() {
            CheckResult::ok("beads issue tracker directory present")
        } else {
            CheckResult::info("no beads issue tracker directory found (optional)")
        },
    );
    m
}

/// Run every check category and aggregate into a single report. Never
/// writes anything; every sub-check is read-only.
pub fn run(paths: &BridgePaths) -> DoctorReport {
    let mut checks = BTreeMap::new();
    checks.insert("dependencies".to_string(), dependencies_checks());
    checks.insert("optional_tools".to_string(), optional_tools_checks());
    checks.insert("framework".to_string(), framework_checks());
    checks.insert("project_state".to_string(), project_state_checks(paths));
    checks.insert("event_bus".to_string(), event_bus_checks(paths));
    checks.insert("beads".to_string(), beads_checks(paths.project_root()));

    let mut issues = 0u32;
    let mut warnings = 0u32;
    let mut recommendations = Vec::new();
    for category in checks.values() {
        for (name, result) in category {
            match result.status {
                CheckStatus::Issue => {
                    issues += 1;
                    recommendations.push(format!("fix `{name}`: {}", result.detail));
                }
                CheckStatus::Warning => {
                    warnings += 1;
                    recommendations.push(format!("review `{name}`: {}", result.detail));
                }
                _ => {}
            }
        }
    }

    let (status, exit_code) = if issues > 0 {
        (AggregateStatus::Unhealthy, 1)
    } else if warnings > 0 {
        (AggregateStatus::Degraded, 2)
    } else {
        (AggregateStatus::Healthy, 0)
    };

    DoctorReport {
        status,
        exit_code,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        checks,
        recommendations,
        issues,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn healthy_when_no_issues_or_warnings_present() {
        let mut checks = BTreeMap::new();
        let mut cat = BTreeMap::new();
        cat.insert("x".to_string(), CheckResult::ok("fine"));
        checks.insert("dependencies".to_string(), cat);
        let report = DoctorReport {
            status: AggregateStatus::Healthy,
            exit_code: 0,
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
            checks,
            recommendations: vec![],
            issues: 0,
            warnings: 0,
        };
        assert_eq!(report.exit_code, 0);
    }

    #[test]
    fn run_reports_missing_sprint_plan_as_warning() {
        let td = tempdir().unwrap();
        let paths = BridgePaths::new(td.path());
        let report = run(&paths);
        let project_state = &report.checks["project_state"];
        assert_eq!(project_state["sprint_plan"].status, CheckStatus::Warning);
    }

    #[test]
    fn run_does_not_create_any_files() {
        let td = tempdir().unwrap();
        let paths = BridgePaths::new(td.path());
        let _ = run(&paths);
        let mut entries = std::fs::read_dir(td.path()).unwrap();
        assert!(entries.next().is_none(), "doctor run must not create files");
    }

    #[test]
    fn dlq_with_entries_reports_warning() {
        let td = tempdir().unwrap();
        let paths = BridgePaths::new(td.path());
        std::fs::create_dir_all(paths.event_dir()).unwrap();
        std::fs::write(
            paths.event_dir().join(bridge_events::DLQ_FILE),
            "{\"kind\":\"x\",\"event\":\"y\",\"timestamp\":\"2026-01-01T00:00:00Z\",\"data\":{}}\n",
        )
        .unwrap();
        let report = run(&paths);
        assert_eq!(report.checks["event_bus"]["dead_letter_queue"].status, CheckStatus::Warning);
        assert!(report.warnings >= 1);
    }

    #[test]
    fn aggregate_status_escalates_to_unhealthy_on_issue() {
        let mut checks = BTreeMap::new();
        let mut cat = BTreeMap::new();
        cat.insert("missing".to_string(), CheckResult::issue("not found"));
        checks.insert("dependencies".to_string(), cat);
        let issues = 1;
        let (status, exit_code) = if issues > 0 {
            (AggregateStatus::Unhealthy, 1)
        } else {
            (AggregateStatus::Healthy, 0)
        };
        assert_eq!(status, AggregateStatus::Unhealthy);
        assert_eq!(exit_code, 1);
    }
}
