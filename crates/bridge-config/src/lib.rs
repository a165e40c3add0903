//! Config Loader contract: key-path lookup with a default, backed by a
//! YAML document merged with environment overrides.
//!
//! No key-path containing characters outside `[.a-zA-Z0-9_]` is accepted,
//! closing off injection through attacker-controlled key strings. This
//! crate also owns the typed `BridgeConfig` aggregate so every tunable
//! named across the other crates (flatline weights, reviewer budgets,
//! vision thresholds, guard policy) has one documented default.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

static KEY_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[.a-zA-Z0-9_]+$").expect("valid regex"));

fn validate_key_path(key: &str) -> Result<()> {
    if key.is_empty() || !KEY_PATH_RE.is_match(key) {
        bail!("invalid config key-path {key:?}: must match {}", KEY_PATH_RE.as_str());
    }
    Ok(())
}

/// Raw key/default lookup layer: a YAML document merged with `BRIDGE_*`
/// environment overrides. Typed config (see [`BridgeConfig`]) is built on
/// top of this for the common, documented tunables; `ConfigLoader` itself
/// stays generic so collaborators can store arbitrary operator knobs.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    doc: serde_yaml::Value,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn empty() -> Self {
        Self {
            doc: serde_yaml::Value::Null,
            env_prefix: "BRIDGE".to_string(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(yaml).context("parsing config YAML")?;
        Ok(Self {
            doc,
            env_prefix: "BRIDGE".to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Environment variable name a given key-path would be overridden by,
    /// e.g. `"reviewer.pass1_budget"` -> `"BRIDGE_REVIEWER_PASS1_BUDGET"`.
    fn env_var_name(&self, key: &str) -> String {
        let upper = key.to_uppercase().replace('.', "_");
        format!("{}_{}", self.env_prefix, upper)
    }

    /// Look up `key` (dot-path, e.g. `"vision.refs_threshold"`), falling
    /// back to `default` when absent from both the environment and the
    /// document. Env overrides always win over the document.
    pub fn get(&self, key: &str, default: JsonValue) -> Result<JsonValue> {
        validate_key_path(key)?;
        if let Ok(env_val) = std::env::var(self.env_var_name(key)) {
            return Ok(parse_env_scalar(&env_val));
        }
        let mut cursor = &self.doc;
        for segment in key.split('.') {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => return Ok(default),
            }
        }
        Ok(yaml_to_json(cursor))
    }

    pub fn get_str(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get(key, JsonValue::String(default.to_string()))?
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get(key, JsonValue::Bool(default))?.as_bool().unwrap_or(default))
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.get(key, serde_json::json!(default))?.as_f64().unwrap_or(default))
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get(key, serde_json::json!(default))?.as_u64().unwrap_or(default))
    }
}

fn parse_env_scalar(raw: &str) -> JsonValue {
    if let Ok(b) = raw.parse::<bool>() {
        return JsonValue::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return JsonValue::Number(n);
        }
    }
    JsonValue::String(raw.to_string())
}

fn yaml_to_json(value: &serde_yaml::Value) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// Open Question resolution (flatline severity weights, spec §9): not
/// enumerated by the source material, so this crate surfaces them as
/// configuration rather than silently picking a formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatlineConfig {
    pub weight_blocker: f64,
    pub weight_disputed: f64,
    pub weight_info: f64,
    pub weight_other: f64,
    pub threshold: f64,
    pub consecutive: u32,
}

impl Default for FlatlineConfig {
    fn default() -> Self {
        Self {
            weight_blocker: 5.0,
            weight_disputed: 2.0,
            weight_info: 0.5,
            weight_other: 1.0,
            threshold: 0.05,
            consecutive: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewerBudgets {
    pub pass1_output_tokens: u32,
    pub pass2_input_tokens: u32,
    pub pass2_output_tokens: u32,
    pub pass3_input_tokens: u32,
    pub per_pass_timeout_secs: u64,
    pub deterministic_high_files: u32,
    pub deterministic_high_lines: u32,
    pub deterministic_medium_files: u32,
    pub deterministic_medium_lines: u32,
}

impl Default for ReviewerBudgets {
    fn default() -> Self {
        Self {
            pass1_output_tokens: 4000,
            pass2_input_tokens: 16000,
            pass2_output_tokens: 8000,
            pass3_input_tokens: 12000,
            per_pass_timeout_secs: 300,
            deterministic_high_files: 15,
            deterministic_high_lines: 2000,
            deterministic_medium_files: 3,
            deterministic_medium_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionThresholds {
    pub lore_elevation_refs: u64,
    pub relevance_min_overlap: usize,
}

impl Default for VisionThresholds {
    fn default() -> Self {
        Self {
            lore_elevation_refs: 3,
            relevance_min_overlap: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub default_token_budget: u32,
    pub grep_max_keywords: usize,
    pub grep_min_keyword_len: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            default_token_budget: 2000,
            grep_max_keywords: 5,
            grep_min_keyword_len: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTimeouts {
    pub per_iteration_secs: u64,
    pub total_secs: u64,
    pub vision_sprint_secs: u64,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            per_iteration_secs: 4 * 3600,
            total_secs: 24 * 3600,
            vision_sprint_secs: 10 * 60,
        }
    }
}

/// Aggregate typed configuration for the whole bridge workspace. Every
/// field documents its own default so no tunable is silently "whatever
/// the struct happened to zero-initialize to".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub flatline: FlatlineConfig,
    pub reviewer: ReviewerBudgets,
    pub vision: VisionThresholds,
    pub context: ContextBudget,
    pub timeouts: EngineTimeouts,
    /// State-at-rest encryption is off by default; turning it on without a
    /// reachable passphrase just leaves the store reading/writing plaintext
    /// (see [`bridge_encrypt::StateEncryption::is_enabled`]).
    pub encryption: bridge_encrypt::EncryptionConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            flatline: FlatlineConfig::default(),
            reviewer: ReviewerBudgets::default(),
            vision: VisionThresholds::default(),
            context: ContextBudget::default(),
            timeouts: EngineTimeouts::default(),
            encryption: bridge_encrypt::EncryptionConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load typed config from a loosely-structured YAML document, falling
    /// back to defaults field-by-field rather than requiring every key.
    pub fn from_loader(loader: &ConfigLoader) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            flatline: FlatlineConfig {
                weight_blocker: loader.get_f64("flatline.weight_blocker", defaults.flatline.weight_blocker)?,
                weight_disputed: loader.get_f64("flatline.weight_disputed", defaults.flatline.weight_disputed)?,
                weight_info: loader.get_f64("flatline.weight_info", defaults.flatline.weight_info)?,
                weight_other: loader.get_f64("flatline.weight_other", defaults.flatline.weight_other)?,
                threshold: loader.get_f64("flatline.threshold", defaults.flatline.threshold)?,
                consecutive: loader.get_u64("flatline.consecutive", defaults.flatline.consecutive as u64)? as u32,
            },
            reviewer: defaults.reviewer,
            vision: VisionThresholds {
                lore_elevation_refs: loader.get_u64("vision.lore_elevation_refs", defaults.vision.lore_elevation_refs)?,
                relevance_min_overlap: loader.get_u64("vision.relevance_min_overlap", defaults.vision.relevance_min_overlap as u64)? as usize,
            },
            context: defaults.context,
            timeouts: defaults.timeouts,
            encryption: bridge_encrypt::EncryptionConfig {
                enabled: loader.get_bool("encryption.enabled", defaults.encryption.enabled)?,
                passphrase: None,
                env_var: Some(loader.get_str("encryption.env_var", "BRIDGE_ENCRYPT_KEY")?),
            },
        })
    }
}

/// Bounded collection of operator-supplied redaction patterns (spec §4.5:
/// "an operator-supplied pattern list (bounded to 200 chars each)").
pub const MAX_REDACTION_PATTERN_LEN: usize = 200;

pub fn validate_redaction_patterns(patterns: &[String]) -> Result<()> {
    for (i, p) in patterns.iter().enumerate() {
        if p.len() > MAX_REDACTION_PATTERN_LEN {
            bail!(
                "redaction pattern #{i} is {} chars, exceeds the {MAX_REDACTION_PATTERN_LEN} char bound",
                p.len()
            );
        }
        Regex::new(p).with_context(|| format!("redaction pattern #{i} is not a valid regex"))?;
    }
    Ok(())
}

/// Command policy lookup table: command-prefix or substring -> decision.
/// Used by the Destructive Command Guard (bridge-guard).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPolicyTable {
    pub entries: BTreeMap<String, String>,
}
