//! Writes a `curl --config`-style auth fragment to a mode-0600 file, so a
//! credential never has to appear on a command line (and therefore never
//! in a process list or shell history).

use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use regex::Regex;

fn header_name_re() -> Regex {
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").expect("static regex")
}

/// `value` is rejected if it contains CR, LF, NUL, or a backslash — any of
/// which could let the header value escape its quoted context in the
/// generated `curl --config` fragment.
fn value_is_safe(value: &str) -> bool {
    !value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) && !value.contains('\\')
}

/// Write `.bridge/curl-auth/<name-lowered>.conf` containing
/// `header = "Name: Value"`, mode 0600. Returns the written path.
pub fn write_curl_auth_config(dir: &Path, name: &str, value: &str) -> Result<std::path::PathBuf> {
    if !header_name_re().is_match(name) {
        bail!("header name `{name}` is not a valid HTTP header token");
    }
    if !value_is_safe(value) {
        bail!("header value for `{name}` contains a disallowed control character or backslash");
    }

    fs::create_dir_all(dir)?;
    let file_name = format!("{}.conf", name.to_lowercase());
    let path = dir.join(file_name);
    let contents = format!("header = \"{name}: {value}\"\n");
    fs::write(&path, &contents)?;
    set_mode_0600(&path)?;
    Ok(path)
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
