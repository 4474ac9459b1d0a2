//! Wall-clock helpers. Everything here is wall time (`SystemTime`), never
//! `Instant`, because `expire_at` must survive a process restart.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds-resolution wall-clock time since the Unix epoch.
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    now().as_millis() as i64
}
