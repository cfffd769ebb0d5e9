//! Filesystem abstraction for logrot.
//!
//! Every side effect the sink and the sweeper perform goes through the
//! [`Filesystem`] trait, so both can run against the real disk or against the
//! in-memory [`MockFilesystem`] with failure injection.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use logrot_clock::{Clock, MockClock};
use thiserror::Error;

/// Permission bits for newly created files (rw-r--r--).
pub const FILE_MODE: u32 = 0o644;

/// Permission bits for newly created directories, before umask.
pub const DIR_MODE: u32 = 0o777;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(String),

    #[error("path error: {0}")]
    Path(String),
}

/// Trait for filesystem operations.
/// Abstracted for testing with mock implementations.
pub trait Filesystem: Send + Sync {
    /// Live append handle returned by [`Filesystem::open_append`].
    type Handle: Write + Send;

    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Open a file for appending, creating it if it doesn't exist.
    fn open_append(&self, path: &Path) -> Result<Self::Handle, FsError>;

    /// Flush and release a handle, reporting any error the release surfaced.
    fn close(&self, handle: Self::Handle) -> Result<(), FsError>;

    /// Expand a glob pattern to the regular files it matches.
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, FsError>;

    /// Last modification time of a file.
    fn modified(&self, path: &Path) -> Result<DateTime<Utc>, FsError>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Read a whole file.
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    type Handle = File;

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(path)?;
        Ok(())
    }

    fn open_append(&self, path: &Path) -> Result<File, FsError> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        Ok(options.open(path)?)
    }

    fn close(&self, mut handle: File) -> Result<(), FsError> {
        handle.flush()?;
        // Surfaces deferred write errors that a plain drop would swallow.
        handle.sync_data()?;
        Ok(())
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, FsError> {
        let entries = glob::glob(pattern).map_err(|e| FsError::Pattern(format!("{pattern}: {e}")))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(path) => {
                    tracing::debug!(path = %path.display(), "skipping non-file glob match");
                }
                Err(e) => {
                    tracing::debug!(path = %e.path().display(), error = %e.error(), "skipping unreadable glob entry");
                }
            }
        }

        Ok(files)
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>, FsError> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        Ok(fs::read(path)?)
    }
}

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, MockFile>,
    dirs: BTreeSet<PathBuf>,
    open_handles: usize,
    max_open_handles: usize,
    opened: usize,
    closed: usize,
    fail_open: HashSet<PathBuf>,
    fail_stat: HashSet<PathBuf>,
    fail_remove: HashSet<PathBuf>,
    fail_create_dir: bool,
    fail_close: bool,
    fail_write: bool,
}

impl MockState {
    fn release_handle(&mut self) {
        self.open_handles = self.open_handles.saturating_sub(1);
        self.closed += 1;
    }
}

fn injected(what: &str, path: &Path) -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("injected {what} failure: {}", path.display()),
    ))
}

/// Mock filesystem for testing.
/// Cloning creates a new handle to the same underlying data.
///
/// Tracks how many append handles are open at once and lets tests inject
/// failures per path (open, stat, remove) or globally (directory creation,
/// close, write).
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    state: Arc<Mutex<MockState>>,
    clock: Option<MockClock>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp created and appended files with `clock`'s time instead of the epoch.
    pub fn with_clock(mut self, clock: MockClock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock
            .as_ref()
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |clock| clock.now())
    }

    /// Get all file paths in the mock filesystem, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state().files.keys().cloned().collect()
    }

    /// Get content of a specific file.
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.state().files.get(path).map(|f| f.data.clone())
    }

    /// Add a file directly (for test setup).
    pub fn add_file(&self, path: PathBuf, data: Vec<u8>) {
        let modified = self.now();
        self.add_file_with_mtime(path, data, modified);
    }

    /// Add a file with an explicit modification time.
    pub fn add_file_with_mtime(&self, path: PathBuf, data: Vec<u8>, modified: DateTime<Utc>) {
        self.state().files.insert(path, MockFile { data, modified });
    }

    /// Directories created so far.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.state().dirs.iter().cloned().collect()
    }

    /// Number of append handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    /// Highest number of append handles ever open at the same time.
    pub fn max_open_handles(&self) -> usize {
        self.state().max_open_handles
    }

    /// Number of handles opened so far.
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    /// Number of handles released so far (closed or dropped).
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    pub fn fail_open(&self, path: impl Into<PathBuf>) {
        self.state().fail_open.insert(path.into());
    }

    pub fn fail_stat(&self, path: impl Into<PathBuf>) {
        self.state().fail_stat.insert(path.into());
    }

    pub fn fail_remove(&self, path: impl Into<PathBuf>) {
        self.state().fail_remove.insert(path.into());
    }

    pub fn set_fail_create_dir(&self, fail: bool) {
        self.state().fail_create_dir = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state().fail_close = fail;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state().fail_write = fail;
    }

    /// Drop every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_open.clear();
        state.fail_stat.clear();
        state.fail_remove.clear();
        state.fail_create_dir = false;
        state.fail_close = false;
        state.fail_write = false;
    }
}

/// Append handle into a [`MockFilesystem`] file.
///
/// Writes after the file was removed are discarded, as they would land in an
/// unlinked inode on a real filesystem.
#[derive(Debug)]
pub struct MockHandle {
    fs: MockFilesystem,
    path: PathBuf,
    released: bool,
}

impl Write for MockHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = self.fs.now();
        let mut state = self.fs.state();
        if state.fail_write {
            return Err(io::Error::other(format!(
                "injected write failure: {}",
                self.path.display()
            )));
        }
        if let Some(file) = state.files.get_mut(&self.path) {
            file.data.extend_from_slice(buf);
            file.modified = now;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if !self.released {
            self.fs.state().release_handle();
        }
    }
}

impl Filesystem for MockFilesystem {
    type Handle = MockHandle;

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let mut state = self.state();
        if state.fail_create_dir {
            return Err(injected("create_dir", path));
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn open_append(&self, path: &Path) -> Result<MockHandle, FsError> {
        let now = self.now();
        let mut state = self.state();
        if state.fail_open.contains(path) {
            return Err(injected("open", path));
        }

        state
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| MockFile { data: Vec::new(), modified: now });
        state.opened += 1;
        state.open_handles += 1;
        state.max_open_handles = state.max_open_handles.max(state.open_handles);

        Ok(MockHandle {
            fs: self.clone(),
            path: path.to_path_buf(),
            released: false,
        })
    }

    fn close(&self, mut handle: MockHandle) -> Result<(), FsError> {
        handle.released = true;
        let mut state = self.state();
        state.release_handle();
        if state.fail_close {
            return Err(injected("close", &handle.path));
        }
        Ok(())
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, FsError> {
        let pattern =
            glob::Pattern::new(pattern).map_err(|e| FsError::Pattern(format!("{pattern}: {e}")))?;
        // Same separator rule as a directory walk: `*` never crosses `/`.
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };
        Ok(self
            .state()
            .files
            .keys()
            .filter(|path| pattern.matches_path_with(path, options))
            .cloned()
            .collect())
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>, FsError> {
        let state = self.state();
        if state.fail_stat.contains(path) {
            return Err(injected("stat", path));
        }
        state.files.get(path).map(|f| f.modified).ok_or_else(|| {
            FsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            ))
        })
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        let mut state = self.state();
        if state.fail_remove.contains(path) {
            return Err(injected("remove", path));
        }
        state.files.remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.get_file(path).ok_or_else(|| {
            FsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            ))
        })
    }
}
