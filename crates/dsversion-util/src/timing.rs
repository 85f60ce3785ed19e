//! Drop guards that log how long versioning actions and table access take.
//!
//! ```rust,ignore
//! use dsversion_util::timing::TimingGuard;
//!
//! async fn restore(dataset: &str) {
//!     let _timing = TimingGuard::action("version_restore");
//!     // logged when _timing goes out of scope
//! }
//! ```

use std::time::Instant;
use tracing::{debug, info, warn};

/// Durations at or above this are logged at info level.
const INFO_THRESHOLD_MS: u128 = 250;
/// Durations at or above this are logged as slow.
const WARN_THRESHOLD_MS: u128 = 2000;

/// Logs the time between its creation and its drop.
pub struct TimingGuard {
    /// "action" or "store".
    kind: &'static str,
    name: String,
    start: Instant,
}

impl TimingGuard {
    fn new(kind: &'static str, name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(kind, name = %name, "Starting operation");
        Self {
            kind,
            name,
            start: Instant::now(),
        }
    }

    /// Time a versioning action such as `version_create`.
    pub fn action(name: impl Into<String>) -> Self {
        Self::new("action", name)
    }

    /// Time a read or transaction against the version table.
    pub fn store(name: impl Into<String>) -> Self {
        Self::new("store", name)
    }
}

/// `850ms`, `1.25s` or `2m 3.0s`.
fn format_duration(ms: u128) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {:.1}s", ms / 60_000, (ms % 60_000) as f64 / 1000.0)
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let ms = self.start.elapsed().as_millis();
        let duration = format_duration(ms);

        if ms >= WARN_THRESHOLD_MS {
            warn!(
                kind = self.kind,
                name = %self.name,
                duration_ms = ms as u64,
                duration = %duration,
                "Slow operation completed"
            );
        } else if ms >= INFO_THRESHOLD_MS {
            info!(
                kind = self.kind,
                name = %self.name,
                duration_ms = ms as u64,
                duration = %duration,
                "Operation completed"
            );
        } else {
            debug!(
                kind = self.kind,
                name = %self.name,
                duration_ms = ms as u64,
                duration = %duration,
                "Operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_kinds() {
        let action = TimingGuard::action("version_list");
        assert_eq!(action.kind, "action");
        assert_eq!(action.name, "version_list");

        let store = TimingGuard::store("transaction");
        assert_eq!(store.kind, "store");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(1250), "1.25s");
        assert_eq!(format_duration(123_000), "2m 3.0s");
    }
}
