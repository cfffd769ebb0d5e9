//! Age-based retention for rotated files.
//!
//! A [`RetentionSweeper`] expands a glob and deletes every match whose
//! modification time is older than `now - max_age`. Sweeps are triggered by
//! the caller (e.g. on a timer) and are independent of any sink writing into
//! the same tree.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use logrot_clock::{Clock, SystemClock};

use crate::config::RetentionConfig;
use crate::error::{Error, Result};
use crate::writer::{Filesystem, RealFilesystem};

/// Deletes files matching a glob once they are older than a retention window.
pub struct RetentionSweeper<F: Filesystem = RealFilesystem, C: Clock = SystemClock> {
    fs: F,
    clock: C,
    pattern: String,
    max_age: TimeDelta,
    /// Serializes sweeps against each other only.
    sweep: Mutex<()>,
}

impl<F: Filesystem, C: Clock> fmt::Debug for RetentionSweeper<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionSweeper")
            .field("pattern", &self.pattern)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl RetentionSweeper {
    /// Create a sweeper on the real filesystem and system clock.
    pub fn new(pattern: impl Into<String>, max_age: TimeDelta) -> Result<Self> {
        Self::with_parts(pattern, max_age, RealFilesystem, SystemClock)
    }

    pub fn from_config(config: &RetentionConfig) -> Result<Self> {
        let max_age = TimeDelta::from_std(config.max_age).map_err(|_| {
            Error::InvalidConfig(format!("max age too large: {:?}", config.max_age))
        })?;
        Self::new(config.pattern.as_str(), max_age)
    }
}

impl<F: Filesystem, C: Clock> RetentionSweeper<F, C> {
    /// Create a sweeper over an explicit filesystem and clock.
    ///
    /// Fails with [`Error::InvalidConfig`] if `max_age` is negative or the
    /// glob does not parse.
    pub fn with_parts(pattern: impl Into<String>, max_age: TimeDelta, fs: F, clock: C) -> Result<Self> {
        let pattern = pattern.into();

        if max_age < TimeDelta::zero() {
            return Err(Error::InvalidConfig(format!(
                "max age must not be negative, got {max_age}"
            )));
        }

        glob::Pattern::new(&pattern).map_err(|e| {
            Error::InvalidConfig(format!("invalid glob pattern {pattern:?}: {e}"))
        })?;

        Ok(Self {
            fs,
            clock,
            pattern,
            max_age,
            sweep: Mutex::new(()),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    /// Files modified strictly before this instant are expired.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one retention pass and return the deleted paths, in glob order.
    ///
    /// Stops at the first stat or delete failure with
    /// [`Error::SweepAborted`], which carries the paths already deleted.
    /// Nothing is retried and remaining candidates are left alone.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let _guard = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);

        let candidates = self.fs.glob(&self.pattern).map_err(|source| Error::SweepAborted {
            path: PathBuf::from(&self.pattern),
            deleted: Vec::new(),
            source,
        })?;

        let cutoff = self.cutoff();
        let mut deleted = Vec::new();

        for path in candidates {
            let modified = match self.fs.modified(&path) {
                Ok(modified) => modified,
                Err(source) => return Err(Error::SweepAborted { path, deleted, source }),
            };

            if modified >= cutoff {
                continue;
            }

            if let Err(source) = self.fs.remove(&path) {
                return Err(Error::SweepAborted { path, deleted, source });
            }

            tracing::info!(path = %path.display(), modified = %modified, "removed expired file");
            deleted.push(path);
        }

        tracing::debug!(pattern = %self.pattern, removed = deleted.len(), "retention sweep finished");
        Ok(deleted)
    }
}
