use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, PROGRESS_FILESIZE, ProgressRecord, Result};

/// File name of the progress record inside the configured directory.
pub const PROGRESS_FILENAME: &str = "txnid.dat";

const TEMP_SUFFIX: &str = "tmp";

/// Reads and writes the [`ProgressRecord`] of one generator.
///
/// The store is pure I/O: it knows the record format but nothing about when
/// records should be written. Every write replaces the whole record through
/// a temporary sibling file and a rename, so a crash mid-write leaves either
/// the old record or the new one, never a truncated file. The temporary
/// file is synced before the rename so that the rename cannot land ahead of
/// the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A store for `<dir>/txnid.dat`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(PROGRESS_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(TEMP_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Loads the record, creating an empty file if none exists.
    ///
    /// Returns `Ok(None)` for an empty (or freshly created) file, in which
    /// case the caller should start from configured defaults. Creating the
    /// file up front surfaces permission problems at startup rather than at
    /// the first rollover.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be opened or read.
    /// - [`Error::RecordTooLarge`] if the file holds more than
    ///   [`PROGRESS_FILESIZE`] bytes.
    /// - [`Error::Malformed`] / [`Error::InvalidField`] if the content is
    ///   not a valid record. Callers must treat these as fatal: guessing a
    ///   resume point risks reissuing IDs.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = %self.path.display())))]
    pub fn load(&self) -> Result<Option<ProgressRecord>> {
        let file = open_options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;

        let mut buf = Vec::with_capacity(PROGRESS_FILESIZE + 1);
        file.take(PROGRESS_FILESIZE as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(&self.path, e))?;

        if buf.is_empty() {
            return Ok(None);
        }
        if buf.len() > PROGRESS_FILESIZE {
            return Err(Error::RecordTooLarge {
                max: PROGRESS_FILESIZE,
            });
        }

        let raw = core::str::from_utf8(&buf).map_err(|_| Error::Malformed {
            raw: String::from_utf8_lossy(&buf).into_owned(),
        })?;
        raw.parse().map(Some)
    }

    /// Persists only `seed`, leaving counter and increment to configuration.
    ///
    /// This is the write performed from the rollover hook, inside the
    /// generator's critical section. It syncs the record itself but not the
    /// directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the record cannot be replaced.
    pub fn write_partial(&self, seed: u64) -> Result<()> {
        self.write(&ProgressRecord::partial(seed), false)
    }

    /// Persists an exact resume point and syncs both the record and its
    /// directory to disk.
    ///
    /// Only call this once generation has been stopped, otherwise the record
    /// is stale the moment it is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the record cannot be replaced.
    pub fn write_full(&self, record: &ProgressRecord) -> Result<()> {
        self.write(record, true)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = %self.path.display())))]
    fn write(&self, record: &ProgressRecord, sync_dir: bool) -> Result<()> {
        let encoded = format!("{record}\n");
        debug_assert!(encoded.len() <= PROGRESS_FILESIZE);

        let temp = self.temp_path();
        let mut file: File = open_options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| Error::io(&temp, e))?;
        file.write_all(encoded.as_bytes())
            .map_err(|e| Error::io(&temp, e))?;
        file.sync_all().map_err(|e| Error::io(&temp, e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| Error::io(&self.path, e))?;
        if sync_dir {
            self.sync_parent()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| Error::io(parent, e))
    }

    // Directories cannot be opened for syncing here.
    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn sync_parent(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn open_options() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = OpenOptions::new();
    options.mode(0o600);
    options
}

#[cfg(not(unix))]
fn open_options() -> OpenOptions {
    OpenOptions::new()
}
