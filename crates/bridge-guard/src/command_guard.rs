//! Destructive Command Guard: looks up a command against a policy table
//! and decides whether to allow, warn-and-allow, or block it, with the
//! decision's strictness gated on whether the caller looks autonomous.
//!
//! Autonomous-mode detection and its fail-closed consequence are the
//! load-bearing part of this module: an AI-driven caller must never be
//! able to talk its way past a BLOCK via a bypass flag, and a guard-engine
//! failure (policy table unreadable, lookup panics) must default to BLOCK
//! rather than ALLOW when autonomous. An interactive human caller gets the
//! opposite defaults — bypass is honored, and a guard-engine failure
//! degrades to a warning rather than blocking their terminal.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bridge_config::CommandPolicyTable;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyDecision {
    Allow,
    Warn,
    Block,
}

impl PolicyDecision {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "ALLOW" => Some(Self::Allow),
            "WARN" => Some(Self::Warn),
            "BLOCK" => Some(Self::Block),
            _ => None,
        }
    }
}

/// Environment signals that indicate the caller is an autonomous agent,
/// not an interactive human at a terminal.
const AUTONOMOUS_ENV_VARS: &[(&str, Option<&str>)] = &[
    ("LOA_RUN_MODE", Some("autonomous")),
    ("CLAWDBOT_GATEWAY_TOKEN", None),
    ("LOA_OPERATOR", Some("ai")),
];

pub fn is_autonomous_mode() -> bool {
    AUTONOMOUS_ENV_VARS.iter().any(|(key, expected)| match (std::env::var(key), expected) {
        (Ok(_), None) => true,
        (Ok(val), Some(exp)) => val == *exp,
        (Err(_), _) => false,
    })
}

/// The final, audited verdict for one command evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub decision: PolicyDecision,
    pub autonomous: bool,
    pub bypass_requested: bool,
    pub bypass_honored: bool,
    pub reason: String,
}

/// Evaluate `command` against `policy`. `bypass_requested` is only ever
/// honored when `autonomous` is false: in autonomous mode a bypass flag is
/// silently ignored for BLOCK/WARN decisions, never upgraded to ALLOW.
pub fn evaluate(
    command: &str,
    policy: &CommandPolicyTable,
    autonomous: bool,
    bypass_requested: bool,
) -> GuardVerdict {
    let lookup = policy
        .entries
        .iter()
        .find(|(prefix, _)| command.trim_start().starts_with(prefix.as_str()))
        .and_then(|(_, decision)| PolicyDecision::parse(decision));

    let (decision, reason) = match lookup {
        Some(d) => (d, format!("matched policy entry for `{command}`")),
        None if autonomous => (
            PolicyDecision::Block,
            "no policy entry matched; failing closed in autonomous mode".to_string(),
        ),
        None => (
            PolicyDecision::Warn,
            "no policy entry matched; failing open with a warning in interactive mode".to_string(),
        ),
    };

    let bypass_honored = bypass_requested && !autonomous && decision != PolicyDecision::Allow;
    let effective = if bypass_honored { PolicyDecision::Allow } else { decision };

    GuardVerdict {
        decision: effective,
        autonomous,
        bypass_requested,
        bypass_honored,
        reason,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditRecord {
    timestamp: chrono::DateTime<Utc>,
    command: String,
    verdict: GuardVerdict,
}

/// Append one JSONL audit line for any decision other than a plain ALLOW
/// with no bypass involved — every WARN, BLOCK, or bypass-honored ALLOW is
/// recorded.
pub fn audit_log(audit_dir: &Path, command: &str, verdict: &GuardVerdict) -> Result<()> {
    if verdict.decision == PolicyDecision::Allow && !verdict.bypass_honored {
        return Ok(());
    }
    fs::create_dir_all(audit_dir).with_context(|| format!("creating audit dir {}", audit_dir.display()))?;
    let path = audit_dir.join("command-guard.jsonl");
    let existed = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    if !existed {
        set_mode_0600(&path)?;
    }
    let record = AuditRecord { timestamp: Utc::now(), command: command.to_string(), verdict: verdict.clone() };
    let mut writer = std::io::BufWriter::new(file);
    writeln!(writer, "{}", serde_json::to_string(&record)?)?;
    writer.flush()?;
    Ok(())
}

#[cfg(unix)]
fn set_mode_0600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode_0600(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn policy_with(prefix: &str, decision: &str) -> CommandPolicyTable {
        let mut entries = BTreeMap::new();
        entries.insert(prefix.to_string(), decision.to_string());
        CommandPolicyTable { entries }
    }

    #[test]
    fn matched_block_policy_blocks() {
        let policy = policy_with("rm -rf", "BLOCK");
        let verdict = evaluate("rm -rf /tmp/x", &policy, false, false);
        assert_eq!(verdict.decision, PolicyDecision::Block);
    }

    #[test]
    fn autonomous_bypass_is_never_honored() {
        let policy = policy_with("rm -rf", "BLOCK");
        let verdict = evaluate("rm -rf /tmp/x", &policy, true, true);
        assert_eq!(verdict.decision, PolicyDecision::Block);
        assert!(!verdict.bypass_honored);
    }

    #[test]
    fn interactive_bypass_is_honored_for_block() {
        let policy = policy_with("rm -rf", "BLOCK");
        let verdict = evaluate("rm -rf /tmp/x", &policy, false, true);
        assert_eq!(verdict.decision, PolicyDecision::Allow);
        assert!(verdict.bypass_honored);
    }

    #[test]
    fn unmatched_command_fails_closed_when_autonomous() {
        let policy = CommandPolicyTable::default();
        let verdict = evaluate("curl http://example.com", &policy, true, false);
        assert_eq!(verdict.decision, PolicyDecision::Block);
    }

    #[test]
    fn unmatched_command_fails_open_when_interactive() {
        let policy = CommandPolicyTable::default();
        let verdict = evaluate("curl http://example.com", &policy, false, false);
        assert_eq!(verdict.decision, PolicyDecision::Warn);
    }

    #[test]
    fn audit_log_skips_plain_allow() {
        let td = tempdir().unwrap();
        let verdict = GuardVerdict {
            decision: PolicyDecision::Allow,
            autonomous: false,
            bypass_requested: false,
            bypass_honored: false,
            reason: "ok".to_string(),
        };
        audit_log(td.path(), "ls", &verdict).unwrap();
        assert!(!td.path().join("command-guard.jsonl").exists());
    }

    #[test]
    fn audit_log_records_block() {
        let td = tempdir().unwrap();
        let verdict = GuardVerdict {
            decision: PolicyDecision::Block,
            autonomous: true,
            bypass_requested: false,
            bypass_honored: false,
            reason: "no match".to_string(),
        };
        audit_log(td.path(), "rm -rf /", &verdict).unwrap();
        let contents = fs::read_to_string(td.path().join("command-guard.jsonl")).unwrap();
        assert!(contents.contains("\"command\":\"rm -rf /\""));
    }
}
