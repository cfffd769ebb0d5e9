//! Shared helpers for logrot-fs integration tests.

use chrono::{DateTime, TimeZone, Utc};

/// Initialize test logging (call once per test binary; repeats are ignored).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("logrot_fs=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}
