//! State Store (spec §4.8): atomic, versioned persistence for the Bridge
//! State and Post-PR State documents, plus artifact checksum tracking.
//!
//! Every mutation goes through tmp-file-plus-rename with a rolling `.bak`
//! backup of whatever was there before (see [`atomic`]), so a crash mid-write
//! never leaves a torn document on disk.

mod artifact;
mod atomic;
mod bridge;
mod checksum;
mod dotpath;
mod post_pr;

pub use artifact::ArtifactValidation;
pub use atomic::backup_path;
pub use bridge::{BRIDGE_STATE_FILE, BridgeStateStore, VersionCheck};
pub use checksum::sha256_file;
pub use post_pr::{POST_PR_STATE_FILE, PostPrStateStore};
