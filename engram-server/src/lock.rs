//! Cross-process web lock.
//!
//! A JSON file at a well-known path registers the live processes bound
//! to the admin port and elects exactly one of them as the background
//! maintenance owner. Dead PIDs are reaped best-effort with a signal-0
//! probe on every acquire.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use engram_core::errors::LockError;

/// On-disk shape of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockFileData {
    pids: Vec<i32>,
    port: u16,
    host: String,
    started_at: i64,
}

/// A held (or joined) web lock.
#[derive(Debug)]
pub struct WebLock {
    path: PathBuf,
    port: u16,
    host: String,
    pid: i32,
    /// Whether this process was elected the background owner.
    owner: bool,
    released: bool,
}

impl WebLock {
    /// Acquire the lock for `(host, port)`.
    ///
    /// The first live process wins ownership; later processes on the
    /// same binding join. A live registration on a different binding is
    /// a `PortConflict`. All-dead registrations are overwritten.
    pub fn acquire(path: &Path, host: &str, port: u16) -> Result<Self, LockError> {
        let pid = std::process::id() as i32;
        Self::acquire_as(path, host, port, pid)
    }

    /// `acquire` with an explicit PID (exercised directly by tests).
    pub fn acquire_as(path: &Path, host: &str, port: u16, pid: i32) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existing = read_lock_file(path)?;
        let (data, owner) = match existing {
            None => (
                LockFileData {
                    pids: vec![pid],
                    port,
                    host: host.to_string(),
                    started_at: engram_core::now_millis(),
                },
                true,
            ),
            Some(mut data) => {
                data.pids.retain(|p| is_pid_alive(*p));
                if data.pids.is_empty() {
                    // Every registered process is gone; take over.
                    (
                        LockFileData {
                            pids: vec![pid],
                            port,
                            host: host.to_string(),
                            started_at: engram_core::now_millis(),
                        },
                        true,
                    )
                } else if data.port == port && data.host == host {
                    if !data.pids.contains(&pid) {
                        data.pids.push(pid);
                    }
                    (data, false)
                } else {
                    return Err(LockError::PortConflict {
                        host: data.host,
                        port: data.port,
                    });
                }
            }
        };

        write_lock_file(path, &data)?;
        debug!(path = %path.display(), pid, owner, "web lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            port,
            host: host.to_string(),
            pid,
            owner,
            released: false,
        })
    }

    /// Whether this process runs the background jobs.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remove this process from the registry; unlink the file when it
    /// was the last one. Safe to call more than once.
    pub fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some(mut data) = read_lock_file(&self.path)? else {
            return Ok(());
        };
        data.pids.retain(|p| *p != self.pid);
        if data.pids.is_empty() {
            std::fs::remove_file(&self.path)?;
        } else {
            write_lock_file(&self.path, &data)?;
        }
        debug!(path = %self.path.display(), pid = self.pid, "web lock released");
        Ok(())
    }
}

impl Drop for WebLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "web lock release failed on drop");
        }
    }
}

/// Parse the lock file; a corrupt file counts as stale and is ignored.
fn read_lock_file(path: &Path) -> Result<Option<LockFileData>, LockError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stale lock file ignored");
            Ok(None)
        }
    }
}

fn write_lock_file(path: &Path, data: &LockFileData) -> Result<(), LockError> {
    let json = serde_json::to_string_pretty(data).map_err(|e| LockError::Stale {
        details: format!("lock serialization failed: {e}"),
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Signal-0 probe. EPERM still means the process exists.
fn is_pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Far above any realistic pid_max, so the probe reports it dead.
    const DEAD_PID: i32 = 999_999_999;

    fn lock_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("webserver.lock")
    }

    #[test]
    fn first_acquire_becomes_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let lock = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        assert!(lock.is_owner());
        assert!(path.exists());
    }

    #[test]
    fn second_process_on_same_binding_joins() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let _owner = WebLock::acquire_as(&path, "127.0.0.1", 7437, std::process::id() as i32)
            .unwrap();
        // A second live process (same real PID namespace trick: our own
        // PID already registered, join with a synthetic second one that
        // maps to a live process — use our own PID's parent, PID 1 is
        // always alive).
        let joiner = WebLock::acquire_as(&path, "127.0.0.1", 7437, 1).unwrap();
        assert!(!joiner.is_owner());
    }

    #[test]
    fn different_binding_with_live_holder_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let _owner = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        let result = WebLock::acquire_as(&path, "127.0.0.1", 9999, 1);
        assert!(matches!(
            result,
            Err(LockError::PortConflict { port: 7437, .. })
        ));
    }

    #[test]
    fn dead_owner_is_reaped_on_next_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        {
            let mut stale = WebLock::acquire_as(&path, "127.0.0.1", 7437, DEAD_PID).unwrap();
            // Keep the file on disk, simulating a crashed owner.
            stale.released = true;
        }
        assert!(path.exists());

        let lock = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        assert!(lock.is_owner(), "dead registration must be taken over");
    }

    #[test]
    fn non_owner_release_keeps_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let _owner = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        let mut joiner = WebLock::acquire_as(&path, "127.0.0.1", 7437, 1).unwrap();

        joiner.release().unwrap();
        assert!(path.exists(), "file must survive a non-owner release");

        let data = read_lock_file(&path).unwrap().unwrap();
        assert_eq!(data.pids, vec![std::process::id() as i32]);
    }

    #[test]
    fn last_release_unlinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let mut lock = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_lock_file_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        std::fs::write(&path, "not json at all").unwrap();
        let lock = WebLock::acquire(&path, "127.0.0.1", 7437).unwrap();
        assert!(lock.is_owner());
    }
}
