//! Path & Lock Facility (spec §4.1): canonical path resolution plus
//! advisory file locking with stale-lock recovery.
//!
//! Lock ordering is fixed workspace-wide to eliminate deadlock: `Run` ->
//! `Manifest` -> `Document` (spec §4.1, §5). Callers are responsible for
//! acquiring locks in that order; this crate does not enforce it across
//! calls because locks of different types are typically held by different
//! subsystems that never nest.

mod paths;
mod process;

pub use bridge_types::{LockInfo, LockType};
pub use paths::BridgePaths;
pub use process::is_process_alive;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use fs2::FileExt;
use rand::Rng;

/// Tuning knobs for acquisition; every value here is configurable per
/// spec §4.1 ("Acquisition... bounded wait", "exponential backoff (base
/// 1s, cap 30s) plus random jitter (0-1000ms) up to a configured retry
/// count").
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// A held lock whose info file is older than this (or whose holder PID
    /// is dead) is reclaimed rather than respected.
    pub stale_ttl: Duration,
    /// Total time to keep retrying acquisition before giving up.
    pub timeout: Duration,
    /// Use atomic-mkdir + backoff instead of advisory `flock` when the
    /// underlying filesystem doesn't support advisory locks (e.g. NFS).
    pub nfs_fallback: bool,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_ttl: Duration::from_secs(30 * 60),
            timeout: Duration::from_secs(30),
            nfs_fallback: false,
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

enum Backend {
    Flock(File),
    Mkdir(PathBuf),
}

/// A held lock. Releases automatically on drop (best-effort); callers that
/// need to observe release failures should call [`LockHandle::release`]
/// explicitly.
pub struct LockHandle {
    resource: String,
    lock_type: LockType,
    lock_path: PathBuf,
    info_path: PathBuf,
    backend: Option<Backend>,
    released: bool,
}

fn ensure_dir_0700(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating lock dir {}", dir.display()))?;
    set_mode(dir, 0o700)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perms)
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn read_info(info_path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(info_path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_info(info_path: &Path, info: &LockInfo) -> Result<()> {
    let tmp = info_path.with_extension("tmp");
    let json = serde_json::to_string_pretty(info)?;
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    set_mode(&tmp, 0o600)?;
    fs::rename(&tmp, info_path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), info_path.display()))?;
    Ok(())
}

fn is_stale(info: &LockInfo, ttl: Duration) -> bool {
    let age = Utc::now() - info.timestamp;
    let too_old = age.num_seconds().unsigned_abs() > ttl.as_secs();
    too_old || !is_process_alive(info.pid)
}

/// Forcibly remove a lock and its companion info file. Only called after
/// [`is_stale`] has confirmed the holder is gone or the TTL has elapsed —
/// never a blind removal (spec §5).
fn reclaim_stale(lock_path: &Path, info_path: &Path) {
    let _ = fs::remove_file(lock_path);
    let _ = fs::remove_dir(lock_path); // mkdir-fallback locks are directories
    let _ = fs::remove_file(info_path);
}

impl LockHandle {
    pub fn acquire(
        lock_dir: &Path,
        resource: &str,
        lock_type: LockType,
        caller: &str,
        config: &LockConfig,
    ) -> Result<Self> {
        ensure_dir_0700(lock_dir)?;
        let lock_path = lock_dir.join(format!("{resource}.lock"));
        let info_path = lock_dir.join(format!("{resource}.lock.info"));

        if let Some(info) = read_info(&info_path) {
            if is_stale(&info, config.stale_ttl) {
                reclaim_stale(&lock_path, &info_path);
            }
        }

        let backend = if config.nfs_fallback {
            acquire_mkdir(&lock_path, config)?
        } else {
            acquire_flock(&lock_path, &info_path, config)?
        };

        let pid = std::process::id();
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let method = match &backend {
            Backend::Flock(_) => "flock",
            Backend::Mkdir(_) => "mkdir",
        };
        let info = LockInfo {
            resource: resource.to_string(),
            lock_type,
            pid,
            timestamp: Utc::now(),
            caller: caller.to_string(),
            hostname,
            method: method.to_string(),
        };
        write_info(&info_path, &info)?;

        Ok(Self {
            resource: resource.to_string(),
            lock_type,
            lock_path,
            info_path,
            backend: Some(backend),
            released: false,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Release the lock. Ownership is verified by PID match; release
    /// proceeds anyway if the recorded owner process is dead (spec §4.1).
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if let Some(info) = read_info(&self.info_path) {
            let owned_by_us = info.pid == std::process::id();
            if !owned_by_us && is_process_alive(info.pid) {
                bail!(
                    "refusing to release lock {} held by live pid {}",
                    self.resource,
                    info.pid
                );
            }
        }
        match self.backend.take() {
            Some(Backend::Flock(file)) => {
                let _ = file.unlock();
                let _ = fs::remove_file(&self.lock_path);
            }
            Some(Backend::Mkdir(dir)) => {
                let _ = fs::remove_dir(&dir);
            }
            None => {}
        }
        let _ = fs::remove_file(&self.info_path);
        self.released = true;
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn acquire_flock(lock_path: &Path, info_path: &Path, config: &LockConfig) -> Result<Backend> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("opening lock file {}", lock_path.display()))?;

    let deadline = Instant::now() + config.timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(Backend::Flock(file)),
            Err(e) if is_would_block(&e) => {
                if Instant::now() >= deadline {
                    // One last staleness check before giving up: the
                    // holder recorded in the info file may have died
                    // between our first read and now.
                    if let Some(info) = read_info(info_path) {
                        if is_stale(&info, config.stale_ttl) {
                            reclaim_stale(lock_path, info_path);
                            continue;
                        }
                    }
                    bail!("timed out waiting for lock on {}", lock_path.display());
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(e).context("acquiring advisory lock"),
        }
    }
}

fn is_would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

fn acquire_mkdir(lock_path: &Path, config: &LockConfig) -> Result<Backend> {
    let mut attempt: u32 = 0;
    loop {
        match fs::create_dir(lock_path) {
            Ok(()) => return Ok(Backend::Mkdir(lock_path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                attempt += 1;
                if attempt > config.max_retries {
                    bail!(
                        "exhausted {} retries acquiring mkdir lock {}",
                        config.max_retries,
                        lock_path.display()
                    );
                }
                let backoff = config
                    .retry_base
                    .saturating_mul(1 << attempt.min(20))
                    .min(config.retry_cap);
                let jitter_ms = rand::rng().random_range(0..1000);
                thread::sleep(backoff + Duration::from_millis(jitter_ms));
            }
            Err(e) => return Err(e).context("creating mkdir lock"),
        }
    }
}

/// Acquire `resource`, run `f`, and release the lock on every exit path
/// (spec §4.1, `with_lock`). The lock is released even if `f` panics,
/// because [`LockHandle`]'s `Drop` impl runs during unwinding.
pub fn with_lock<T>(
    lock_dir: &Path,
    resource: &str,
    lock_type: LockType,
    caller: &str,
    config: &LockConfig,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let mut guard = LockHandle::acquire(lock_dir, resource, lock_type, caller, config)?;
    let result = f();
    guard.release()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_removes_lock_files() {
        let td = tempdir().unwrap();
        let mut h = LockHandle::acquire(
            td.path(),
            "state",
            LockType::Document,
            "test",
            &LockConfig::default(),
        )
        .unwrap();
        assert!(td.path().join("state.lock").exists());
        h.release().unwrap();
        assert!(!td.path().join("state.lock").exists());
        assert!(!td.path().join("state.lock.info").exists());
    }

    #[test]
    fn second_acquire_blocks_until_timeout() {
        let td = tempdir().unwrap();
        let _first = LockHandle::acquire(
            td.path(),
            "state",
            LockType::Document,
            "test",
            &LockConfig::default(),
        )
        .unwrap();

        let fast_timeout = LockConfig {
            timeout: Duration::from_millis(150),
            ..LockConfig::default()
        };
        let second = LockHandle::acquire(
            td.path(),
            "state",
            LockType::Document,
            "test",
            &fast_timeout,
        );
        assert!(second.is_err());
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let td = tempdir().unwrap();
        ensure_dir_0700(td.path()).unwrap();
        let info_path = td.path().join("state.lock.info");
        let lock_path = td.path().join("state.lock");
        fs::write(&lock_path, b"").unwrap();
        write_info(
            &info_path,
            &LockInfo {
                resource: "state".to_string(),
                lock_type: LockType::Document,
                pid: 999_999, // implausible, not alive
                timestamp: Utc::now() - chrono::Duration::hours(5),
                caller: "ghost".to_string(),
                hostname: "host".to_string(),
                method: "flock".to_string(),
            },
        )
        .unwrap();

        let handle = LockHandle::acquire(
            td.path(),
            "state",
            LockType::Document,
            "test",
            &LockConfig::default(),
        );
        assert!(handle.is_ok());
    }

    #[test]
    fn with_lock_releases_after_closure_runs() {
        let td = tempdir().unwrap();
        let result = with_lock(
            td.path(),
            "manifest",
            LockType::Manifest,
            "test",
            &LockConfig::default(),
            || Ok(42),
        )
        .unwrap();
        assert_eq!(result, 42);
        assert!(!td.path().join("manifest.lock").exists());
    }

    #[test]
    fn release_proceeds_when_info_pid_matches_current_process() {
        let td = tempdir().unwrap();
        ensure_dir_0700(td.path()).unwrap();
        let info_path = td.path().join("state.lock.info");
        let lock_path = td.path().join("state.lock");
        fs::write(&lock_path, b"").unwrap();
        write_info(
            &info_path,
            &LockInfo {
                resource: "state".to_string(),
                lock_type: LockType::Document,
                pid: std::process::id(),
                timestamp: Utc::now(),
                caller: "other".to_string(),
                hostname: "host".to_string(),
                method: "flock".to_string(),
            },
        )
        .unwrap();

        let mut handle = LockHandle {
            resource: "state".to_string(),
            lock_type: LockType::Document,
            lock_path,
            info_path,
            backend: None,
            released: false,
        };
        assert!(handle.release().is_ok());
    }
}
