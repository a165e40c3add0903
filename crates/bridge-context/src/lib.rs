//! Context Query Facade: a natural-language query against a scoped slice
//! of the project tree, answered by whichever retrieval tier is actually
//! available. Three tiers, tried in order, each one a trait so the engine
//! never has to know which is in effect:
//!
//! 1. `SemanticIndex` — an external embedding-backed index. No in-tree
//!    implementation ships; callers that have one wire it in via
//!    `QueryFacade::with_semantic`.
//! 2. `HybridIndex` — a local lexical index (e.g. a sparse/BM25 store).
//!    Same story: optional, wired in by the caller.
//! 3. Literal grep over the allowed scope. Always available, never
//!    requires configuration, and is what every query falls back to.
//!
//! Disabling the facility entirely, or overriding its token budget per
//! caller, goes through `bridge_config::ContextBudget`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bridge_config::ContextBudget;
use bridge_lock::BridgePaths;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// One retrieved snippet, with the tier that produced it so the caller can
/// report provenance if it wants to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHit {
    pub source: String,
    pub score: f64,
    pub content: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Semantic,
    Hybrid,
    Grep,
}

/// The set of paths (relative to the project root) a query is allowed to
/// touch. An empty scope means "the whole tree".
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    pub allowed_paths: Vec<PathBuf>,
}

impl QueryScope {
    pub fn whole_tree() -> Self {
        Self::default()
    }

    pub fn restricted_to(paths: Vec<PathBuf>) -> Self {
        Self { allowed_paths: paths }
    }

    fn is_unrestricted(&self) -> bool {
        self.allowed_paths.is_empty()
    }
}

pub trait SemanticIndex {
    fn query(&self, text: &str, scope: &QueryScope) -> Result<Vec<ContextHit>>;
}

pub trait HybridIndex {
    fn query(&self, text: &str, scope: &QueryScope) -> Result<Vec<ContextHit>>;
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "does", "what", "where", "when",
    "which", "have", "has", "are", "was", "were",
];

/// Extract up to `max` lowercase alphanumeric keywords of at least
/// `min_len` characters, stopwords removed, in order of first appearance.
fn extract_keywords(query: &str, max: usize, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for word in query.split(|c: char| !c.is_alphanumeric()) {
        let lower = word.to_lowercase();
        if lower.len() < min_len || STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower.clone()) {
            out.push(lower);
            if out.len() >= max {
                break;
            }
        }
    }
    out
}

/// Estimate token count from a snippet using the words * 1.3 heuristic,
/// the same fallback formula the Multi-Pass Reviewer's budget estimator
/// uses for text with no tokenizer available.
fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    ((words as f64) * 1.3).ceil() as u32
}

/// Literal grep over files under `paths.project_root()`, restricted to
/// `scope`, producing one snippet (the matching line plus its immediate
/// neighbors) per hit.
pub struct GrepTier<'a> {
    paths: &'a BridgePaths,
    budget: &'a ContextBudget,
}

impl<'a> GrepTier<'a> {
    pub fn new(paths: &'a BridgePaths, budget: &'a ContextBudget) -> Self {
        Self { paths, budget }
    }

    pub fn query(&self, text: &str, scope: &QueryScope) -> Result<Vec<ContextHit>> {
        let keywords = extract_keywords(text, self.budget.grep_max_keywords, self.budget.grep_min_keyword_len);
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
        let re = RegexBuilder::new(&pattern).case_insensitive(true).build()?;

        let files = self.candidate_files(scope)?;
        let mut hits = Vec::new();
        for file in files {
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                let matches = re.find_iter(line).count();
                if matches == 0 {
                    continue;
                }
                let start = i.saturating_sub(1);
                let end = (i + 2).min(lines.len());
                let snippet = lines[start..end].join("\n");
                let rel = file
                    .strip_prefix(self.paths.project_root())
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .replace('\\', "/");
                hits.push(ContextHit {
                    source: rel,
                    score: matches as f64,
                    content: snippet,
                    tier: Tier::Grep,
                });
            }
        }
        Ok(hits)
    }

    fn candidate_files(&self, scope: &QueryScope) -> Result<Vec<PathBuf>> {
        let root = self.paths.project_root();
        let mut out = Vec::new();
        if scope.is_unrestricted() {
            walk(root, &mut out);
        } else {
            for rel in &scope.allowed_paths {
                let candidate = self
                    .paths
                    .ensure_within_root(rel)
                    .with_context(|| format!("context scope path {} escapes project root", rel.display()))?;
                if candidate.is_dir() {
                    walk(&candidate, &mut out);
                } else if candidate.is_file() {
                    out.push(candidate);
                }
            }
        }
        // Defense in depth: even unrestricted walks are re-checked per
        // file, since scope can name a path that does not exist yet and
        // `walk` only ever descends into real directories under root.
        let mut verified = Vec::new();
        for file in out {
            if self.paths.ensure_within_root(&file).is_ok() {
                verified.push(file);
            }
        }
        Ok(verified)
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            walk(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// The facade itself: tries semantic, then hybrid, then grep, and always
/// enforces the token budget before returning.
pub struct QueryFacade<'a> {
    paths: &'a BridgePaths,
    budget: ContextBudget,
    enabled: bool,
    semantic: Option<Box<dyn SemanticIndex + 'a>>,
    hybrid: Option<Box<dyn HybridIndex + 'a>>,
}

impl<'a> QueryFacade<'a> {
    pub fn new(paths: &'a BridgePaths, budget: ContextBudget, enabled: bool) -> Self {
        Self { paths, budget, enabled, semantic: None, hybrid: None }
    }

    pub fn with_semantic(mut self, index: Box<dyn SemanticIndex + 'a>) -> Self {
        self.semantic = Some(index);
        self
    }

    pub fn with_hybrid(mut self, index: Box<dyn HybridIndex + 'a>) -> Self {
        self.hybrid = Some(index);
        self
    }

    pub fn query(
        &self,
        nl_query: &str,
        scope: &QueryScope,
        token_budget_override: Option<u32>,
    ) -> Result<Vec<ContextHit>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let budget_tokens = token_budget_override.unwrap_or(self.budget.default_token_budget);

        let raw = if let Some(semantic) = &self.semantic {
            semantic.query(nl_query, scope)?
        } else if let Some(hybrid) = &self.hybrid {
            hybrid.query(nl_query, scope)?
        } else {
            GrepTier::new(self.paths, &self.budget).query(nl_query, scope)?
        };

        Ok(enforce_budget(raw, budget_tokens))
    }
}

/// Sort by descending score, then greedily accept hits until the token
/// budget (estimated via `words * 1.3`) would be exceeded.
fn enforce_budget(mut hits: Vec<ContextHit>, budget_tokens: u32) -> Vec<ContextHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut used = 0u32;
    let mut out = Vec::new();
    for hit in hits {
        let cost = estimate_tokens(&hit.content);
        if used + cost > budget_tokens && !out.is_empty() {
            break;
        }
        used += cost;
        out.push(hit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn budget() -> ContextBudget {
        ContextBudget::default()
    }

    #[test]
    fn keyword_extraction_drops_stopwords_and_short_words() {
        let kws = extract_keywords("what is the flatline convergence threshold for the engine", 5, 4);
        assert!(kws.contains(&"flatline".to_string()));
        assert!(kws.contains(&"convergence".to_string()));
        assert!(!kws.contains(&"what".to_string()));
        assert!(!kws.contains(&"for".to_string()));
    }

    #[test]
    fn keyword_extraction_caps_at_max() {
        let kws = extract_keywords("alpha bravo charlie delta echo foxtrot golf", 3, 4);
        assert_eq!(kws.len(), 3);
    }

    #[test]
    fn grep_tier_finds_matching_lines() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("notes.md"), "line one\nflatline weight config\nline three\n").unwrap();
        let paths = BridgePaths::new(td.path());
        let b = budget();
        let tier = GrepTier::new(&paths, &b);
        let hits = tier.query("flatline weight", &QueryScope::whole_tree()).unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("flatline"));
    }

    #[test]
    fn grep_tier_rejects_scope_paths_outside_root() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("notes.md"), "flatline config\n").unwrap();
        let paths = BridgePaths::new(td.path());
        let b = budget();
        let tier = GrepTier::new(&paths, &b);
        let scope = QueryScope::restricted_to(vec![PathBuf::from("../escape")]);
        let result = tier.query("flatline", &scope);
        assert!(result.is_err());
    }

    #[test]
    fn facade_disabled_returns_no_hits() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("notes.md"), "flatline config\n").unwrap();
        let paths = BridgePaths::new(td.path());
        let facade = QueryFacade::new(&paths, budget(), false);
        let hits = facade.query("flatline", &QueryScope::whole_tree(), None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn facade_falls_back_to_grep_when_no_index_wired() {
        let td = tempdir().unwrap();
        std::fs::write(td.path().join("notes.md"), "flatline weight config\n").unwrap();
        let paths = BridgePaths::new(td.path());
        let facade = QueryFacade::new(&paths, budget(), true);
        let hits = facade.query("flatline weight", &QueryScope::whole_tree(), None).unwrap();
        assert!(hits.iter().all(|h| h.tier == Tier::Grep));
    }

    #[test]
    fn budget_enforcement_always_admits_at_least_one_hit() {
        let hits = vec![ContextHit {
            source: "a.rs".to_string(),
            score: 1.0,
            content: "word ".repeat(1000),
            tier: Tier::Grep,
        }];
        let out = enforce_budget(hits, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn budget_enforcement_sorts_by_descending_score() {
        let hits = vec![
            ContextHit { source: "a".to_string(), score: 1.0, content: "x".to_string(), tier: Tier::Grep },
            ContextHit { source: "b".to_string(), score: 5.0, content: "y".to_string(), tier: Tier::Grep },
        ];
        let out = enforce_budget(hits, 1000);
        assert_eq!(out[0].source, "b");
    }
}
