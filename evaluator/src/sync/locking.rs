use nix::{
    errno::Errno,
    fcntl::{flock, FlockArg},
};
use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// process wide default for lock acquisition, in milliseconds
static DEFAULT_TIMEOUT_MS: AtomicU64 = AtomicU64::new(10_000);

/// pause between two non-blocking attempts while waiting for a lock
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn set_default_timeout(timeout: Duration) {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    DEFAULT_TIMEOUT_MS.store(millis, Ordering::SeqCst);
}

pub fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS.load(Ordering::SeqCst))
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to lock {path:?}")]
    Lock {
        path: PathBuf,
        #[source]
        source: Errno,
    },
}

/// A file that is transparently locked (advisory, `flock(2)`) while it is open.
///
/// Shared locks are taken for reading, exclusive ones for writing. The lock only binds
/// cooperating processes that go through this type (or `flock` itself).
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<File>,
    exclusive: bool,
}

impl FileLock {
    /// associate the lock with a single path for its lifetime
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            exclusive: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// handle of the opened file, `None` while closed
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// Open and lock the file, creating it when missing.
    ///
    /// Exclusive opens the file read-write with an exclusive lock, otherwise it is read-only with a
    /// shared lock. `timeout` bounds the wait, zero makes a single non-blocking attempt and `None`
    /// uses [`default_timeout`]. Returns `Ok(false)` if the lock was not acquired in time, the file
    /// is closed again in that case.
    pub fn open(&mut self, exclusive: bool, timeout: Option<Duration>) -> Result<bool, LockError> {
        if self.file.is_some() {
            self.close();
        }

        let timeout = timeout.unwrap_or_else(default_timeout);
        let existed = self.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(exclusive || !existed)
            .create(!existed)
            .open(&self.path)
            .map_err(|source| LockError::Open {
                path: self.path.clone(),
                source,
            })?;

        let attempt = if exclusive {
            FlockArg::LockExclusiveNonblock
        } else {
            FlockArg::LockSharedNonblock
        };
        // `None` when the deadline is beyond what an instant can hold, the wait is unbounded then
        let deadline = Instant::now().checked_add(timeout);

        loop {
            match flock(file.as_raw_fd(), attempt) {
                Ok(()) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) if errno == Errno::EWOULDBLOCK => {
                    let now = Instant::now();
                    let pause = match deadline {
                        Some(deadline) if now >= deadline => {
                            debug!(path = ?self.path, exclusive, "Lock was not acquired in time");
                            // dropping the handle closes the file
                            return Ok(false);
                        }
                        Some(deadline) => POLL_INTERVAL.min(deadline - now),
                        None => POLL_INTERVAL,
                    };

                    trace!(path = ?self.path, "Waiting for lock");
                    thread::sleep(pause);
                }
                Err(source) => {
                    return Err(LockError::Lock {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }

        debug!(path = ?self.path, exclusive, "Lock acquired");
        self.file = Some(file);
        self.exclusive = exclusive;

        Ok(true)
    }

    /// Unlock and close the file, returns `false` if it was not open
    pub fn close(&mut self) -> bool {
        let Some(file) = self.file.take() else {
            return false;
        };

        if let Err(error) = flock(file.as_raw_fd(), FlockArg::Unlock) {
            // closing the descriptor releases the lock anyway
            warn!(path = ?self.path, error = ?error, "Failed to unlock file");
        }
        debug!(path = ?self.path, "Lock released");

        true
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.close();
    }
}
