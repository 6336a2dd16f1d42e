use seqidx_engine::Clock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock-backed [`Clock`] for interactive use; tests use their own
/// manually-advanced clock instead.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
