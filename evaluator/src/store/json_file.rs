use super::{codec, datum::Serializable, PersistenceError};
use crate::sync::locking::FileLock;
use serde_json::Value as JsonValue;
use std::{
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

/// JSON data file guarded by an advisory lock.
///
/// Reading takes a shared lock, writing an exclusive one. To update a record store without
/// another process interleaving, load it exclusively with `keep_open` and save through the
/// same handle.
#[derive(Debug)]
pub struct JsonFile {
    lock: FileLock,
    // `None` falls back to the process wide default
    timeout: Option<Duration>,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            lock: FileLock::new(path),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    pub fn exists(&self) -> bool {
        self.lock.exists()
    }

    pub fn is_open(&self) -> bool {
        self.lock.is_open()
    }

    pub fn is_exclusive(&self) -> bool {
        self.lock.is_open() && self.lock.is_exclusive()
    }

    /// Open and lock the file, failing if the lock is not acquired in time.
    /// A hold that already satisfies the request is kept.
    pub fn open(&mut self, exclusive: bool) -> Result<(), PersistenceError> {
        if self.try_open(exclusive)? {
            Ok(())
        } else {
            Err(PersistenceError::LockTimeout(self.path().to_path_buf()))
        }
    }

    /// same as [`JsonFile::open`] but a lock timeout is reported as `Ok(false)`
    pub fn try_open(&mut self, exclusive: bool) -> Result<bool, PersistenceError> {
        if self.lock.is_open() && (self.lock.is_exclusive() || !exclusive) {
            return Ok(true);
        }

        Ok(self.lock.open(exclusive, self.timeout)?)
    }

    /// Release the lock, `false` if the file was not open
    pub fn close(&mut self) -> bool {
        self.lock.close()
    }

    /// Deserialize the file content into `object`. An empty file leaves `object` untouched.
    ///
    /// With `keep_open` the lock is held after loading, `exclusive` makes it a write lock so the
    /// object can be saved later. The lock is always released when loading fails.
    pub fn load(
        &mut self,
        object: &mut dyn Serializable,
        exclusive: bool,
        keep_open: bool,
    ) -> Result<(), PersistenceError> {
        self.open(exclusive)?;

        let result = self.read_into(object);
        if !keep_open || result.is_err() {
            self.close();
        }

        result
    }

    /// Serialize `object` and replace the file content with it, taking an exclusive lock if it is
    /// not held yet. The lock is always released when saving fails.
    pub fn save(&mut self, object: &dyn Serializable, keep_open: bool) -> Result<(), PersistenceError> {
        self.open(true)?;

        let result = self.write_from(object);
        if !keep_open || result.is_err() {
            self.close();
        }

        result
    }

    fn read_into(&mut self, object: &mut dyn Serializable) -> Result<(), PersistenceError> {
        let file = self.lock.file_mut().ok_or(PersistenceError::NoFile)?;
        let mut content = String::new();

        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut content)?;

        if content.trim().is_empty() {
            debug!(path = ?self.lock.path(), "Data file is empty, nothing to load");
            return Ok(());
        }

        let tree: JsonValue = serde_json::from_str(&content)?;
        codec::deserialize(object, &tree)?;

        debug!(path = ?self.lock.path(), "Loaded data file");

        Ok(())
    }

    fn write_from(&mut self, object: &dyn Serializable) -> Result<(), PersistenceError> {
        // serialize first, a failure must not leave a truncated file behind
        let tree = codec::serialize(object)?;
        let file = self.lock.file_mut().ok_or(PersistenceError::NoFile)?;

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        serde_json::to_writer(&mut *file, &tree)?;
        file.flush()?;
        file.sync_data()?;

        debug!(path = ?self.lock.path(), "Saved data file");

        Ok(())
    }
}
