//! Advisory file locks with bounded, backing-off acquisition
//!
//! Locks are `flock(2)` exclusive locks on small files under `<home>/locks/`.
//! The kernel drops the lock when the holding file descriptor closes, so a
//! crashed holder can never leave a lock stuck. Lock files are never unlinked:
//! removing a file other processes may be waiting on would let two holders
//! lock two different inodes.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Bounds for lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Give up after this long
    pub timeout: Duration,
    /// First wait between attempts
    pub initial_backoff: Duration,
    /// Ceiling for the doubling backoff
    pub max_backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl LockPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

/// Diagnostic content written into a held lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at_ms: u64,
}

/// An exclusive advisory lock, released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Try once without waiting; `Ok(None)` when another holder has it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let mut file = open_lock_file(path)?;
        if !try_flock_exclusive(&file)? {
            return Ok(None);
        }
        write_holder(&mut file)?;
        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
        }))
    }

    /// Block the current thread, retrying with backoff until `policy.timeout`
    pub fn acquire(path: &Path, policy: &LockPolicy) -> Result<Self> {
        let started = Instant::now();
        let mut backoff = policy.initial_backoff;

        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }

            let waited = started.elapsed();
            if waited >= policy.timeout {
                return Err(timeout_error(path, waited));
            }
            std::thread::sleep(backoff.min(policy.timeout - waited));
            backoff = policy.next_backoff(backoff);
        }
    }

    /// Async variant of [`FileLock::acquire`]; waits without blocking the runtime
    pub async fn acquire_async(path: &Path, policy: &LockPolicy) -> Result<Self> {
        let started = Instant::now();
        let mut backoff = policy.initial_backoff;

        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }

            let waited = started.elapsed();
            if waited >= policy.timeout {
                return Err(timeout_error(path, waited));
            }
            tokio::time::sleep(backoff.min(policy.timeout - waited)).await;
            backoff = policy.next_backoff(backoff);
        }
    }

    /// Check if a lock is currently held by someone else
    pub fn is_held(path: &Path) -> bool {
        if !path.exists() {
            return false;
        }

        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => match try_flock_exclusive(&file) {
                // If we acquired it, closing `file` releases it again
                Ok(acquired) => !acquired,
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    /// Last holder recorded in the lock file, if readable
    pub fn holder(path: &Path) -> Option<LockHolder> {
        let mut file = File::open(path).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?)
}

fn write_holder(file: &mut File) -> Result<()> {
    let content = LockHolder {
        pid: std::process::id(),
        acquired_at_ms: current_timestamp_ms(),
    };
    let serialized = serde_json::to_string(&content)?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    Ok(())
}

fn timeout_error(path: &Path, waited: Duration) -> CheckpointError {
    tracing::warn!("Lock wait on {} gave up after {:?}", path.display(), waited);
    CheckpointError::LockTimeout {
        path: path.to_path_buf(),
        waited,
    }
}

/// Try to acquire exclusive file lock (non-blocking)
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(std::io::Error::from(e).into()),
    }
}

fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
