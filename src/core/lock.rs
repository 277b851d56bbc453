//! Advisory file lock guarding the repository's transactional scope.
//!
//! Every write-shaped verb (spec §4.11) acquires `<repo>/.egg.lock` before
//! touching the manifest or module graph, and releases it on the way out
//! regardless of success. Single-winner semantics come from
//! `OpenOptions::create_new`, the same trick used for leader election
//! elsewhere in this codebase's lineage — no byte range locking, no flock,
//! just "does the file already exist".

use crate::core::error::EggError;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_FILE_NAME: &str = ".egg.lock";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// RAII guard over the repository's advisory lock. Dropping it removes the
/// lock file, so the lock is always released even on an early `?` return.
pub struct RepoLock {
    path: PathBuf,
    _file: fs::File,
}

impl RepoLock {
    /// Attempts to acquire the lock at `<repo_root>/.egg.lock`, retrying for
    /// up to 5 seconds (spec §4.11, §5) before failing with `Busy`.
    pub fn acquire(repo_root: &Path) -> Result<Self, EggError> {
        let path = repo_root.join(LOCK_FILE_NAME);
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;

        loop {
            match try_create(&path) {
                Ok(file) => return Ok(RepoLock { path, _file: file }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(EggError::Busy(format!(
                            "{} is held by another invocation",
                            path.display()
                        )));
                    }
                    thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(EggError::Io(err)),
            }
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new().create_new(true).write(true).open(path)
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = RepoLock::acquire(dir.path()).unwrap();
            assert!(dir.path().join(LOCK_FILE_NAME).exists());
        }
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
        let _lock2 = RepoLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn concurrent_acquire_fails_busy() {
        let dir = tempfile::tempdir().unwrap();
        let _held = RepoLock::acquire(dir.path()).unwrap();
        let attempt = RepoLock::acquire(dir.path());
        assert!(matches!(attempt, Err(EggError::Busy(_))));
    }
}
