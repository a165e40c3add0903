//! Convergence predicate ("flatline", spec §4.7): the engine stops
//! iterating once the trajectory of per-iteration severity-weighted
//! finding counts has settled.

use bridge_config::FlatlineConfig;
use bridge_types::{Finding, Severity};

/// Sum of per-finding severity weights for one iteration's review output
/// (spec §9, Open Question 1: weights are configuration, not a fixed
/// formula). VISION and SPECULATION findings are weighted as `weight_other`
/// since neither is named explicitly in the source material's candidate
/// formula.
pub fn weighted_finding_count(findings: &[Finding], config: &FlatlineConfig) -> f64 {
    findings
        .iter()
        .map(|f| match &f.severity {
            Severity::Blocker => config.weight_blocker,
            Severity::Disputed => config.weight_disputed,
            Severity::Info => config.weight_info,
            _ => config.weight_other,
        })
        .sum()
}

/// True iff the last `config.consecutive` normalized deltas in `trajectory`
/// are each below `config.threshold`. Fewer than `consecutive + 1` points
/// never flatlines: there aren't enough deltas yet to judge.
pub fn is_flatlined(trajectory: &[f64], config: &FlatlineConfig) -> bool {
    let k = config.consecutive as usize;
    if k == 0 || trajectory.len() < k + 1 {
        return false;
    }
    let deltas: Vec<f64> = trajectory
        .windows(2)
        .map(|w| (w[1] - w[0]).abs() / w[0].max(1.0))
        .collect();
    deltas[deltas.len() - k..].iter().all(|d| *d < config.threshold)
}
