//! Budget truncation: when a pass's serialized payload would exceed its
//! token budget, drop content in reverse structural priority — metadata
//! first, then context, findings last — rather than truncating blindly
//! from the end of the buffer.

use crate::tokens::estimate_tokens;

#[derive(Debug, Clone, Default)]
pub struct PassPayload {
    pub findings_text: String,
    pub context_text: String,
    pub metadata_text: String,
}

pub fn sentinel(budget_tokens: u32) -> String {
    format!("[TRUNCATED: exceeded {budget_tokens} token budget]")
}

/// Returns the payload re-assembled to fit under `budget_tokens`, dropping
/// whole sections (metadata, then context) before ever touching findings.
/// If findings alone exceed the budget they are kept whole and the
/// sentinel is appended rather than cutting a finding mid-sentence.
pub fn truncate_to_budget(payload: &PassPayload, budget_tokens: u32) -> String {
    let full = assemble(payload);
    if estimate_tokens(&full, None) <= budget_tokens {
        return full;
    }

    let without_metadata = assemble(&PassPayload {
        findings_text: payload.findings_text.clone(),
        context_text: payload.context_text.clone(),
        metadata_text: String::new(),
    });
    if estimate_tokens(&without_metadata, None) <= budget_tokens {
        return format!("{without_metadata}\n{}", sentinel(budget_tokens));
    }

    let findings_only = assemble(&PassPayload {
        findings_text: payload.findings_text.clone(),
        context_text: String::new(),
        metadata_text: String::new(),
    });
    if estimate_tokens(&findings_only, None) <= budget_tokens {
        return format!("{findings_only}\n{}", sentinel(budget_tokens));
    }

    format!("{}\n{}", payload.findings_text, sentinel(budget_tokens))
}

fn assemble(payload: &PassPayload) -> String {
    let mut parts = Vec::new();
    if !payload.metadata_text.is_empty() {
        parts.push(payload.metadata_text.clone());
    }
    if !payload.context_text.is_empty() {
        parts.push(payload.context_text.clone());
    }
    if !payload.findings_text.is_empty() {
        parts.push(payload.findings_text.clone());
    }
    parts.join("\n\n")
}
