//! Deterministic adaptive classification: before any model is invoked,
//! decide how aggressively a diff needs reviewing from file/line counts
//! and a small denylist of paths that always warrant full scrutiny
//! (secrets-adjacent config, CI pipelines, auth code).

use bridge_config::ReviewerBudgets;
use bridge_git::DiffStat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Path fragments that always force at least `Medium`, regardless of size,
/// since a one-line change to auth code or a CI pipeline can matter more
/// than its diff size suggests.
pub const ALWAYS_MEDIUM_PATH_FRAGMENTS: &[&str] = &[
    ".github/workflows/",
    "auth",
    "secret",
    "credential",
    "Dockerfile",
    ".env",
];

pub fn classify(stat: &DiffStat, budgets: &ReviewerBudgets) -> RiskLevel {
    let touches_sensitive_path = stat
        .files
        .iter()
        .any(|f| ALWAYS_MEDIUM_PATH_FRAGMENTS.iter().any(|frag| f.contains(frag)));

    let files = stat.files_changed();
    let lines = stat.lines_changed();

    if files as usize >= budgets.deterministic_high_files as usize
        || lines >= budgets.deterministic_high_lines
    {
        return RiskLevel::High;
    }
    if touches_sensitive_path
        || files as usize >= budgets.deterministic_medium_files as usize
        || lines >= budgets.deterministic_medium_lines
    {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}
