//! Stdlib-only build metadata: emit the git SHA, build profile, and rustc
//! version as `rustc-env` values for `--version --verbose`. No vergen, to
//! keep the supply chain as tight as the rest of this workspace.

use std::process::Command;

fn main() {
    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=BRIDGE_GIT_SHA={sha}");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BRIDGE_BUILD_PROFILE={profile}");

    let rustc_version = Command::new(std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string()))
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=BRIDGE_RUSTC_VERSION={}", rustc_version.trim());

    println!("cargo:rerun-if-changed=.git/HEAD");
}
