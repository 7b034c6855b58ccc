//! Advisory file locking using the `flock(2)` syscall directly, plus atomic
//! whole-file replacement. Independent crate with no internal qos
//! dependencies.
//!
//! Uses raw `libc::flock` so the guard only has to own the `File` (which
//! owns the fd). `Drop` calls `flock(fd, LOCK_UN)` to release.
//!
//! Locks are taken on a sidecar `<name>.lock` file, never on the data file
//! itself: the data file is replaced by `rename(2)`, which would silently
//! detach a lock held on the old inode.

pub mod atomic;

pub use atomic::write_atomic;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Diagnostic information written to lock files.
#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    purpose: String,
    acquired_at: DateTime<Utc>,
}

/// Exclusive advisory lock guard backed by `flock(2)`.
pub struct FileLock {
    /// The open lock file. Closing it also releases flock, but we call
    /// `LOCK_UN` explicitly in `Drop` for deterministic release timing.
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // `LOCK_UN` releases the advisory lock. If the call fails the lock
        // is still released when the fd is closed moments later.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl FileLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn record_holder(&mut self, purpose: &str) {
        let diagnostic = LockDiagnostic {
            pid: std::process::id(),
            purpose: purpose.to_string(),
            acquired_at: Utc::now(),
        };
        if let Ok(json) = serde_json::to_string(&diagnostic) {
            let _ = self.file.set_len(0);
            let _ = self.file.write_all(json.as_bytes());
            let _ = self.file.flush();
        }
    }
}

/// `<dir>/<file name>.lock` for a data file.
pub fn sidecar_lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
}

/// Block until an exclusive lock on `lock_path` is held.
///
/// Intended for short read-modify-write transactions; callers hold the
/// guard only for the duration of one file rewrite.
pub fn lock_exclusive(lock_path: &Path, purpose: &str) -> Result<FileLock> {
    let file = open_lock_file(lock_path)?;
    let fd = file.as_raw_fd();
    loop {
        // SAFETY: `fd` is a valid file descriptor from the `File` we just
        // opened. `LOCK_EX` requests an exclusive blocking lock.
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if ret == 0 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err)
                .with_context(|| format!("Failed to acquire lock: {}", lock_path.display()));
        }
    }
    let mut lock = FileLock {
        file,
        lock_path: lock_path.to_path_buf(),
    };
    lock.record_holder(purpose);
    Ok(lock)
}

/// Try to take an exclusive lock without waiting.
///
/// Returns `Ok(None)` when another open file description holds it.
pub fn try_lock_exclusive(lock_path: &Path, purpose: &str) -> Result<Option<FileLock>> {
    let file = open_lock_file(lock_path)?;
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is a valid file descriptor from the `File` we just opened.
    // `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Ok(None);
        }
        return Err(err).with_context(|| format!("Failed to probe lock: {}", lock_path.display()));
    }
    let mut lock = FileLock {
        file,
        lock_path: lock_path.to_path_buf(),
    };
    lock.record_holder(purpose);
    Ok(Some(lock))
}

/// Human-readable description of the current (or last) lock holder.
pub fn describe_holder(lock_path: &Path) -> Option<String> {
    let mut contents = String::new();
    File::open(lock_path)
        .ok()?
        .read_to_string(&mut contents)
        .ok()?;
    let diagnostic: LockDiagnostic = serde_json::from_str(&contents).ok()?;
    Some(format!(
        "PID {} ({}, since {})",
        diagnostic.pid, diagnostic.purpose, diagnostic.acquired_at
    ))
}
