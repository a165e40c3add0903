//! Work-context tag derivation (spec §4.3, "mapping file paths to a fixed
//! tag vocabulary"). The source spec names the vocabulary but not the exact
//! path patterns; this mapping is this crate's own decision (see DESIGN.md).

pub const VOCABULARY: [&str; 9] = [
    "architecture",
    "security",
    "constraints",
    "multi-model",
    "testing",
    "philosophy",
    "orchestration",
    "configuration",
    "eventing",
];

const RULES: &[(&str, &[&str])] = &[
    ("architecture", &["/architecture", "design", "/schema", "/types"]),
    ("security", &["/auth", "/security", "/crypto", "secret", "/guard"]),
    ("constraints", &["constraint", "invariant", "/policy"]),
    ("multi-model", &["review", "/model", "/adapter"]),
    ("testing", &["/tests", "_test", "/spec", "proptest"]),
    ("philosophy", &["philosophy", "principle", "/lore"]),
    ("orchestration", &["orchestrat", "/engine", "workflow", "bridge-core"]),
    ("configuration", &["config", ".toml", ".yaml", ".yml"]),
    ("eventing", &["event", "jsonl", "trajectory", "/lock"]),
];

/// Map a single file path to every vocabulary tag it matches.
pub fn tags_for_path(path: &str) -> Vec<&'static str> {
    let lower = path.to_lowercase();
    RULES
        .iter()
        .filter(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Union of tags across every path in a change set, the "work context" used
/// by the relevance query.
pub fn tags_for_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> std::collections::BTreeSet<&'static str> {
    paths.into_iter().flat_map(tags_for_path).collect()
}
