//! Secret & Command Guards (spec §4.5): redaction of secrets from any
//! text or JSON that might get persisted or fed back into a model prompt,
//! safe construction of curl auth-header config files, and a
//! destructive-command policy guard with an audited, fail-closed-when-
//! autonomous decision path.

pub mod command_guard;
pub mod curl_auth;
pub mod redact;

pub use command_guard::{GuardVerdict, PolicyDecision, audit_log, evaluate, is_autonomous_mode};
pub use curl_auth::write_curl_auth_config;
pub use redact::RedactionPatterns;
