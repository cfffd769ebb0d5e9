//! Sink and retention configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default rotation granularity: one day.
pub const DEFAULT_BUCKET_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default retention window: one week.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn default_bucket_duration() -> Duration {
    DEFAULT_BUCKET_DURATION
}

fn default_max_age() -> Duration {
    DEFAULT_MAX_AGE
}

/// How the sink aligns bucket edges with local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetPolicy {
    /// Read the local offset once, at construction. Daylight-saving changes
    /// after that are not picked up.
    #[default]
    CapturedLocal,
    /// Re-read the local offset on every write.
    TrackLocal,
    /// Use a fixed offset, in seconds east of UTC.
    Fixed(i32),
}

/// Rotating sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// strftime path pattern, e.g. `logs/%Y-%m-%d.log`.
    pub pattern: String,

    /// Rotation granularity.
    #[serde(with = "humantime_serde", default = "default_bucket_duration")]
    pub bucket_duration: Duration,

    #[serde(default)]
    pub offset: OffsetPolicy,
}

impl SinkConfig {
    /// Create a new config with defaults and the required pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            bucket_duration: DEFAULT_BUCKET_DURATION,
            offset: OffsetPolicy::default(),
        }
    }

    /// Builder: set bucket_duration.
    pub fn with_bucket_duration(mut self, bucket_duration: Duration) -> Self {
        self.bucket_duration = bucket_duration;
        self
    }

    /// Builder: set offset policy.
    pub fn with_offset(mut self, offset: OffsetPolicy) -> Self {
        self.offset = offset;
        self
    }
}

/// Retention sweeper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Glob describing candidate files, e.g. `logs/*.log`.
    pub pattern: String,

    /// Files last modified longer ago than this are removed.
    #[serde(with = "humantime_serde", default = "default_max_age")]
    pub max_age: Duration,
}

impl RetentionConfig {
    /// Create a new config with the default max age.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Builder: set max_age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}
