//! Model Adapter contract: the boundary between the engine and whatever
//! process actually does planning/review/defense reasoning. The engine and
//! the Multi-Pass Reviewer never shell out directly — they go through a
//! `ModelAdapter` implementation, so the real subprocess path
//! (`ProcessModelAdapter`) and a fixture-driven path (`MockModelAdapter`)
//! are interchangeable in tests.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use bridge_types::Finding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The reasoning role a model invocation is playing. Named after the
/// reasoning-sandwich roles the Multi-Pass Reviewer assigns to passes, but
/// reused by any engine phase that needs to name what a model call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterRole {
    Attacker,
    Evaluator,
    Defender,
}

impl AdapterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterRole::Attacker => "attacker",
            AdapterRole::Evaluator => "evaluator",
            AdapterRole::Defender => "defender",
        }
    }
}

/// One model invocation request. `token_budget == 0` means unlimited.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub role: AdapterRole,
    pub model: String,
    pub prompt_path: PathBuf,
    pub output_path: PathBuf,
    pub token_budget: u64,
    pub timeout: Duration,
}

/// The parsed contents of the model's output file plus invocation
/// bookkeeping. `findings` is populated only when the underlying JSON
/// carries a `findings` array; adapters used for planning-only passes may
/// leave it empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOutput {
    pub tokens_used: u64,
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Exit-code semantics an adapter invocation returns (spec §6: 0=success,
/// 1=timeout-or-invocation-failure, 2=budget-exceeded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterExit {
    Success,
    Failed,
    BudgetExceeded,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to spawn model process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("model invocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("model invocation exceeded its token budget ({used} > {budget})")]
    BudgetExceeded { used: u64, budget: u64 },
    #[error("model invocation failed with exit code {0:?}")]
    NonZeroExit(Option<i32>),
    #[error("failed to read or parse model output at {path}: {source}")]
    OutputUnreadable {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// What the engine and reviewer actually depend on. `ProcessModelAdapter`
/// is the production implementation; `MockModelAdapter` is a fixture-driven
/// stand-in so that core logic never depends on a live model being
/// reachable.
pub trait ModelAdapter {
    fn invoke(&self, request: &AdapterRequest) -> Result<AdapterOutput, AdapterError>;
}

/// Invokes `<program> --model <model> --prompt <prompt_path> --output
/// <output_path>` as a subprocess, enforcing `timeout` and then parsing
/// `output_path` as JSON.
pub struct ProcessModelAdapter {
    program: String,
}

impl ProcessModelAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn args_for(request: &AdapterRequest) -> Vec<String> {
        vec![
            "--role".to_string(),
            request.role.as_str().to_string(),
            "--model".to_string(),
            request.model.clone(),
            "--prompt".to_string(),
            request.prompt_path.display().to_string(),
            "--output".to_string(),
            request.output_path.display().to_string(),
        ]
    }
}

impl ModelAdapter for ProcessModelAdapter {
    fn invoke(&self, request: &AdapterRequest) -> Result<AdapterOutput, AdapterError> {
        let args = Self::args_for(request);
        let start = Instant::now();

        let mut command = Command::new(&self.program);
        command.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| AdapterError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let deadline = Instant::now() + request.timeout;
        let status = loop {
            match child.try_wait().map_err(|source| AdapterError::Spawn {
                program: self.program.clone(),
                source,
            })? {
                Some(status) => break status,
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(AdapterError::Timeout(request.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        };
        let _elapsed = start.elapsed();
        drain_pipe(child.stdout.take());
        drain_pipe(child.stderr.take());

        if !status.success() {
            return Err(AdapterError::NonZeroExit(status.code()));
        }

        let output = parse_output_file(&request.output_path)?;
        if request.token_budget > 0 && output.tokens_used > request.token_budget {
            return Err(AdapterError::BudgetExceeded {
                used: output.tokens_used,
                budget: request.token_budget,
            });
        }
        Ok(output)
    }
}

fn drain_pipe<R: Read>(stream: Option<R>) {
    if let Some(mut s) = stream {
        let mut buf = Vec::new();
        let _ = s.read_to_end(&mut buf);
    }
}

fn parse_output_file(path: &Path) -> Result<AdapterOutput, AdapterError> {
    let contents = std::fs::read_to_string(path).map_err(|e| AdapterError::OutputUnreadable {
        path: path.to_path_buf(),
        source: anyhow::Error::new(e),
    })?;
    serde_json::from_str(&contents).map_err(|e| AdapterError::OutputUnreadable {
        path: path.to_path_buf(),
        source: anyhow::Error::new(e),
    })
}

pub fn command_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Fixture-driven adapter for tests: returns a canned `AdapterOutput` (or
/// error) per role, never touches the filesystem or spawns a process.
pub struct MockModelAdapter {
    responses: std::collections::HashMap<String, Result<AdapterOutput, AdapterErrorKind>>,
}

/// Cloneable stand-in for `AdapterError`, since the real error type wraps
/// non-`Clone` I/O errors and fixtures need to be constructed once and
/// reused across assertions.
#[derive(Debug, Clone)]
pub enum AdapterErrorKind {
    Timeout(Duration),
    BudgetExceeded { used: u64, budget: u64 },
    NonZeroExit(Option<i32>),
    Unreadable,
}

impl From<AdapterErrorKind> for AdapterError {
    fn from(kind: AdapterErrorKind) -> Self {
        match kind {
            AdapterErrorKind::Timeout(d) => AdapterError::Timeout(d),
            AdapterErrorKind::BudgetExceeded { used, budget } => {
                AdapterError::BudgetExceeded { used, budget }
            }
            AdapterErrorKind::NonZeroExit(c) => AdapterError::NonZeroExit(c),
            AdapterErrorKind::Unreadable => AdapterError::OutputUnreadable {
                path: PathBuf::new(),
                source: anyhow::anyhow!("mock adapter: unreadable output"),
            },
        }
    }
}

impl MockModelAdapter {
    pub fn new() -> Self {
        Self { responses: std::collections::HashMap::new() }
    }

    pub fn with_response(mut self, role: AdapterRole, output: AdapterOutput) -> Self {
        self.responses.insert(role.as_str().to_string(), Ok(output));
        self
    }

    pub fn with_failure(mut self, role: AdapterRole, err: AdapterErrorKind) -> Self {
        self.responses.insert(role.as_str().to_string(), Err(err));
        self
    }
}

impl Default for MockModelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelAdapter for MockModelAdapter {
    fn invoke(&self, request: &AdapterRequest) -> Result<AdapterOutput, AdapterError> {
        match self.responses.get(request.role.as_str()) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(kind)) => Err(kind.clone().into()),
            None => Ok(AdapterOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{Finding, Severity};
    use std::io::Write;
    use tempfile::tempdir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake_model.sh");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = std::fs::metadata(&path).unwrap().permissions();
            perm.set_mode(0o755);
            std::fs::set_permissions(&path, perm).unwrap();
        }
        path
    }

    fn request(dir: &Path, timeout: Duration, budget: u64) -> AdapterRequest {
        AdapterRequest {
            role: AdapterRole::Evaluator,
            model: "test-model".to_string(),
            prompt_path: dir.join("prompt.txt"),
            output_path: dir.join("output.json"),
            token_budget: budget,
            timeout,
        }
    }

    #[test]
    #[cfg(unix)]
    fn process_adapter_parses_successful_output() {
        let td = tempdir().unwrap();
        let output_path = td.path().join("output.json");
        std::fs::write(&output_path, r#"{"tokens_used": 10, "verdict": "pass"}"#).unwrap();
        let program = script(td.path(), "exit 0");

        let adapter = ProcessModelAdapter::new(program.display().to_string());
        let req = request(td.path(), Duration::from_secs(5), 0);
        let out = adapter.invoke(&req).unwrap();
        assert_eq!(out.tokens_used, 10);
        assert_eq!(out.verdict.as_deref(), Some("pass"));
    }

    #[test]
    #[cfg(unix)]
    fn process_adapter_times_out_and_kills_child() {
        let td = tempdir().unwrap();
        let program = script(td.path(), "sleep 5");

        let adapter = ProcessModelAdapter::new(program.display().to_string());
        let req = request(td.path(), Duration::from_millis(200), 0);
        let err = adapter.invoke(&req).unwrap_err();
        assert!(matches!(err, AdapterError::Timeout(_)));
    }

    #[test]
    #[cfg(unix)]
    fn process_adapter_rejects_non_zero_exit() {
        let td = tempdir().unwrap();
        let program = script(td.path(), "exit 3");

        let adapter = ProcessModelAdapter::new(program.display().to_string());
        let req = request(td.path(), Duration::from_secs(5), 0);
        let err = adapter.invoke(&req).unwrap_err();
        assert!(matches!(err, AdapterError::NonZeroExit(Some(3))));
    }

    #[test]
    #[cfg(unix)]
    fn process_adapter_enforces_token_budget() {
        let td = tempdir().unwrap();
        let output_path = td.path().join("output.json");
        std::fs::write(&output_path, r#"{"tokens_used": 9000}"#).unwrap();
        let program = script(td.path(), "exit 0");

        let adapter = ProcessModelAdapter::new(program.display().to_string());
        let req = request(td.path(), Duration::from_secs(5), 100);
        let err = adapter.invoke(&req).unwrap_err();
        assert!(matches!(err, AdapterError::BudgetExceeded { used: 9000, budget: 100 }));
    }

    #[test]
    fn mock_adapter_returns_configured_findings() {
        let finding = Finding {
            severity: Severity::Blocker,
            id: "f-1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            location: None,
            potential: None,
        };
        let mock = MockModelAdapter::new().with_response(
            AdapterRole::Evaluator,
            AdapterOutput {
                tokens_used: 42,
                verdict: None,
                findings: vec![finding.clone()],
                raw: serde_json::Value::Null,
            },
        );
        let td = tempdir().unwrap();
        let req = request(td.path(), Duration::from_secs(5), 0);
        let out = mock.invoke(&req).unwrap();
        assert_eq!(out.tokens_used, 42);
        assert_eq!(out.findings, vec![finding]);
    }

    #[test]
    fn mock_adapter_defaults_to_empty_output_for_unconfigured_role() {
        let mock = MockModelAdapter::new();
        let td = tempdir().unwrap();
        let req = request(td.path(), Duration::from_secs(5), 0);
        let out = mock.invoke(&req).unwrap();
        assert_eq!(out.tokens_used, 0);
        assert!(out.findings.is_empty());
    }
}
