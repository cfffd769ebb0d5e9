//! Time-bucketed rotating append sink.
//!
//! Every write maps "now" to a bucket of fixed length, aligned to local
//! time, and appends to the file the [`PathNamer`] assigns to that bucket.
//! Crossing a bucket edge opens the next file and releases the previous one.
//!
//! # Locking
//!
//! A single mutex guards the open handle and is held for the whole of each
//! `write`, `flush` and `close`. Writes never interleave, and a writer sees
//! either the file before a rotation or the file after it, never a half
//! swapped state. At most one file stays open between calls; during a
//! rotation the next file is opened before the previous one is released.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use logrot_clock::{from_unix_nanos, unix_nanos, Clock, SystemClock};

use crate::config::{OffsetPolicy, SinkConfig};
use crate::error::{Error, Result};
use crate::namer::PathNamer;
use crate::writer::{Filesystem, RealFilesystem};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Start of the bucket containing `now`, in nanoseconds since the epoch.
///
/// `now - ((now + offset) mod bucket)`: stable for every instant of a bucket,
/// advancing by exactly `bucket` at each edge, with edges on local (not UTC)
/// multiples of the bucket length.
pub fn bucket_start(now_nanos: i64, offset: FixedOffset, bucket_nanos: i64) -> i64 {
    let offset_nanos = i128::from(offset.local_minus_utc()) * i128::from(NANOS_PER_SEC);
    let now = i128::from(now_nanos);
    let into_bucket = (now + offset_nanos).rem_euclid(i128::from(bucket_nanos));
    i64::try_from(now - into_bucket).unwrap_or(i64::MIN)
}

#[derive(Debug, Clone, Copy)]
enum Offset {
    Fixed(FixedOffset),
    Track,
}

/// The open file. Path and handle travel together, so a handle can never
/// refer to anything but `path`.
struct ActiveFile<H> {
    path: PathBuf,
    handle: H,
    bucket_start: i64,
}

impl<H> ActiveFile<H> {
    fn covers(&self, now_nanos: i64, bucket_nanos: i64) -> bool {
        now_nanos.saturating_sub(self.bucket_start) < bucket_nanos
    }
}

struct SinkState<H> {
    active: Option<ActiveFile<H>>,
    /// Last directory created, to skip redundant `create_dir_all` calls.
    dir: Option<PathBuf>,
}

/// Append-only writer that rotates files on time-bucket boundaries.
pub struct RotatingSink<F: Filesystem = RealFilesystem, C: Clock = SystemClock> {
    fs: F,
    clock: C,
    namer: PathNamer,
    bucket: Duration,
    bucket_nanos: i64,
    offset: Offset,
    state: Mutex<SinkState<F::Handle>>,
}

impl RotatingSink {
    /// Create a sink on the real filesystem and system clock.
    pub fn new(pattern: &str, bucket_duration: Duration) -> Result<Self> {
        Self::from_config(&SinkConfig::new(pattern).with_bucket_duration(bucket_duration))
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        Self::with_parts(config, RealFilesystem, SystemClock)
    }
}

impl<F: Filesystem, C: Clock> RotatingSink<F, C> {
    /// Create a sink over an explicit filesystem and clock.
    ///
    /// Fails with [`Error::InvalidPattern`] before touching any file if the
    /// pattern does not compile, and with [`Error::InvalidConfig`] for a zero
    /// or oversized bucket duration or an out-of-range fixed offset.
    pub fn with_parts(config: &SinkConfig, fs: F, clock: C) -> Result<Self> {
        let namer = PathNamer::new(config.pattern.as_str())?;

        let bucket_nanos = i64::try_from(config.bucket_duration.as_nanos())
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "bucket duration must be between 1ns and {}s, got {:?}",
                    i64::MAX / NANOS_PER_SEC,
                    config.bucket_duration
                ))
            })?;

        let offset = match config.offset {
            OffsetPolicy::CapturedLocal => Offset::Fixed(clock.local_offset(clock.now())),
            OffsetPolicy::TrackLocal => Offset::Track,
            OffsetPolicy::Fixed(secs) => Offset::Fixed(FixedOffset::east_opt(secs).ok_or_else(
                || Error::InvalidConfig(format!("UTC offset out of range: {secs}s")),
            )?),
        };

        tracing::debug!(
            pattern = namer.pattern(),
            bucket = ?config.bucket_duration,
            offset = ?offset,
            "rotating sink created"
        );

        Ok(Self {
            fs,
            clock,
            namer,
            bucket: config.bucket_duration,
            bucket_nanos,
            offset,
            state: Mutex::new(SinkState {
                active: None,
                dir: None,
            }),
        })
    }

    pub fn pattern(&self) -> &str {
        self.namer.pattern()
    }

    pub fn bucket_duration(&self) -> Duration {
        self.bucket
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().active.as_ref().map(|a| a.path.clone())
    }

    /// Append `buf` to the file for the current bucket, rotating first if the
    /// bucket changed.
    ///
    /// The whole buffer is appended or an error is returned. On
    /// [`Error::OpenFailed`] nothing is written and the previous file stays
    /// current. Append errors are returned as [`Error::Io`], unchanged.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        let now = self.clock.now();
        let active = self.current_file(&mut state, now)?;
        active.handle.write_all(buf)?;
        Ok(buf.len())
    }

    /// Flush the open file, if any.
    pub fn flush(&self) -> Result<()> {
        if let Some(active) = self.lock().active.as_mut() {
            active.handle.flush()?;
        }
        Ok(())
    }

    /// Release the open file and return to the unopened state.
    ///
    /// Idempotent: closing an unopened or already closed sink is a no-op.
    /// A later `write` opens a file again as if freshly constructed.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.dir = None;
        match state.active.take() {
            Some(active) => {
                tracing::debug!(path = %active.path.display(), "closing rotating sink");
                self.fs
                    .close(active.handle)
                    .map_err(|source| Error::CloseFailed {
                        path: active.path,
                        source,
                    })
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState<F::Handle>> {
        // State is consistent between statements, so a panicking writer
        // leaves nothing half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset_at(&self, now: DateTime<Utc>) -> FixedOffset {
        match self.offset {
            Offset::Fixed(offset) => offset,
            Offset::Track => self.clock.local_offset(now),
        }
    }

    fn current_file<'s>(
        &self,
        state: &'s mut SinkState<F::Handle>,
        now: DateTime<Utc>,
    ) -> Result<&'s mut ActiveFile<F::Handle>> {
        let now_nanos = unix_nanos(now);
        let active = match state.active.take() {
            Some(active) if active.covers(now_nanos, self.bucket_nanos) => active,
            previous => self.rotate(state, previous, now)?,
        };
        Ok(state.active.insert(active))
    }

    /// Resolve the file for `now`'s bucket. On error `previous` is put back.
    fn rotate(
        &self,
        state: &mut SinkState<F::Handle>,
        previous: Option<ActiveFile<F::Handle>>,
        now: DateTime<Utc>,
    ) -> Result<ActiveFile<F::Handle>> {
        let offset = self.offset_at(now);
        let start = bucket_start(unix_nanos(now), offset, self.bucket_nanos);

        let path = match self.namer.format(from_unix_nanos(start), offset) {
            Ok(path) => PathBuf::from(path),
            Err(e) => {
                state.active = previous;
                return Err(e);
            }
        };

        match previous {
            // Pattern coarser than the bucket: same file, just a new window.
            Some(mut active) if active.path == path => {
                active.bucket_start = start;
                Ok(active)
            }
            previous => match self.open_append(&mut state.dir, &path) {
                Ok(handle) => {
                    if let Some(old) = previous {
                        tracing::info!(
                            from = %old.path.display(),
                            to = %path.display(),
                            "rotating file"
                        );
                        self.release(old);
                    } else {
                        tracing::debug!(path = %path.display(), "opened file");
                    }
                    Ok(ActiveFile {
                        path,
                        handle,
                        bucket_start: start,
                    })
                }
                Err(e) => {
                    state.active = previous;
                    Err(e)
                }
            },
        }
    }

    fn open_append(&self, dir_cache: &mut Option<PathBuf>, path: &Path) -> Result<F::Handle> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if dir_cache.as_deref() != Some(dir) {
                self.fs
                    .create_dir_all(dir)
                    .map_err(|source| Error::OpenFailed {
                        path: path.to_path_buf(),
                        source,
                    })?;
                tracing::debug!(dir = %dir.display(), "ensured log directory");
                *dir_cache = Some(dir.to_path_buf());
            }
        }

        self.fs.open_append(path).map_err(|source| {
            // The directory may have been removed underneath us.
            *dir_cache = None;
            Error::OpenFailed {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Best-effort release of a rotated-out file. Failure is logged, never
    /// returned: the write that triggered the rotation must still succeed.
    fn release(&self, old: ActiveFile<F::Handle>) {
        if let Err(e) = self.fs.close(old.handle) {
            tracing::warn!(path = %old.path.display(), error = %e, "failed to close previous file");
        }
    }
}

impl<F: Filesystem, C: Clock> Write for &RotatingSink<F, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingSink::<F, C>::write(*self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingSink::<F, C>::flush(*self)?)
    }
}

impl<F: Filesystem, C: Clock> Write for RotatingSink<F, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RotatingSink::<F, C>::write(&*self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingSink::<F, C>::flush(&*self)?)
    }
}

impl<F: Filesystem, C: Clock> Drop for RotatingSink<F, C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = state.active.take() {
            if let Err(e) = self.fs.close(active.handle) {
                tracing::warn!(path = %active.path.display(), error = %e, "failed to close file on drop");
            }
        }
    }
}
