//! Time-windowed rotating file sink for logrot.
//!
//! This crate provides:
//! - `RotatingSink`, an append-only writer that switches files on time-bucket
//!   boundaries, keeping exactly one file open
//! - `PathNamer`, strftime-based `time -> path` resolution
//! - `RetentionSweeper`, age-based deletion of rotated files
//! - `Filesystem` trait with real and mock implementations

pub mod config;
pub mod error;
pub mod namer;
pub mod retention;
pub mod sink;
pub mod writer;

pub use config::{
    OffsetPolicy, RetentionConfig, SinkConfig, DEFAULT_BUCKET_DURATION, DEFAULT_MAX_AGE,
};
pub use error::{Error, Result};
pub use namer::PathNamer;
pub use retention::RetentionSweeper;
pub use sink::{bucket_start, RotatingSink};
pub use writer::{
    Filesystem, FsError, MockFilesystem, MockHandle, RealFilesystem, DIR_MODE, FILE_MODE,
};
