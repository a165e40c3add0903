//! Multi-Pass Reviewer (spec §4.6): an adaptive 1-3 pass reasoning sandwich
//! over a diff, gated by a dual deterministic/model-side risk signal, with
//! per-pass token budgets, truncation, and redaction between every hop.

mod budget;
mod classify;
mod sandwich;
mod tokens;

pub use budget::{PassPayload, sentinel, truncate_to_budget};
pub use classify::{ALWAYS_MEDIUM_PATH_FRAGMENTS, RiskLevel, classify};
pub use sandwich::{PassMetadata, ReviewOutput, ReviewRequest, Verdict, review};
pub use tokens::{ExternalTokenizer, estimate_tokens};
