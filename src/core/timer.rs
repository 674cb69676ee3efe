//! Countdown timers
//!
//! The global conversation timer is anchored on the server (start time and
//! duration) and ticked locally from the wall clock. Its activation
//! parameters are mirrored into storage so a suspended client can recompute
//! the countdown instead of restarting it. The round pace timer is local
//! only and never drives phase changes.

use tracing::debug;

use super::constants::{
    KEY_TIMER_DURATION, KEY_TIMER_RESTORED, KEY_TIMER_START, ROUND_PACE_SECS,
};
use super::io_traits::KeyValueStore;

// =============================================================================
// GLOBAL TIMER
// =============================================================================

/// Server-anchored countdown shared by every participant in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalTimer {
    /// Start time, milliseconds since the Unix epoch
    pub start_ms: i64,
    pub duration_secs: u32,
}

impl GlobalTimer {
    pub fn new(start_ms: i64, duration_secs: u32) -> Self {
        Self {
            start_ms,
            duration_secs,
        }
    }

    /// `max(0, duration - floor((now - start) / 1000))`
    ///
    /// A start time in the future (clock skew) yields the full duration.
    pub fn remaining(&self, now_ms: i64) -> u32 {
        let elapsed_secs = (now_ms - self.start_ms).max(0) / 1000;
        let remaining = i64::from(self.duration_secs) - elapsed_secs;
        remaining.max(0) as u32
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.remaining(now_ms) == 0
    }

    pub fn snapshot(&self, now_ms: i64) -> TimerSnapshot {
        TimerSnapshot {
            active: true,
            start_ms: Some(self.start_ms),
            duration_secs: self.duration_secs,
            remaining: self.remaining(now_ms),
        }
    }
}

/// Timer state as derived on the last tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub active: bool,
    pub start_ms: Option<i64>,
    pub duration_secs: u32,
    pub remaining: u32,
}

// =============================================================================
// STORAGE BACKUP
// =============================================================================

/// Write the timer parameters to storage as soon as they are learned
pub fn save_backup<S: KeyValueStore>(store: &S, timer: &GlobalTimer) {
    store.set(KEY_TIMER_START, &timer.start_ms.to_string());
    store.set(KEY_TIMER_DURATION, &timer.duration_secs.to_string());
}

pub fn clear_backup<S: KeyValueStore>(store: &S) {
    store.remove(KEY_TIMER_START);
    store.remove(KEY_TIMER_DURATION);
    store.remove(KEY_TIMER_RESTORED);
}

/// Recover a timer from storage.
///
/// Returns the timer only if it still has time left; an expired or
/// malformed backup is cleared and nothing is restored.
pub fn restore_backup<S: KeyValueStore>(store: &S, now_ms: i64) -> Option<GlobalTimer> {
    let start = store.get_parsed::<i64>(KEY_TIMER_START);
    let duration = store.get_parsed::<u32>(KEY_TIMER_DURATION);

    let timer = match (start, duration) {
        (Some(start), Some(duration)) => GlobalTimer::new(start, duration),
        (None, None) => return None,
        _ => {
            debug!("[TIMER] Incomplete backup, clearing");
            clear_backup(store);
            return None;
        }
    };

    if timer.is_expired(now_ms) {
        debug!(start_ms = timer.start_ms, "[TIMER] Stale backup, clearing");
        clear_backup(store);
        return None;
    }

    store.set(KEY_TIMER_RESTORED, "true");
    debug!(
        remaining = timer.remaining(now_ms),
        "[TIMER] Restored from backup"
    );
    Some(timer)
}

// =============================================================================
// ROUND PACE TIMER
// =============================================================================

/// Local "recommended pace" countdown for round 1 (display only)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundPaceTimer {
    started_ms: Option<i64>,
}

impl RoundPaceTimer {
    /// Start counting if not already running
    pub fn start(&mut self, now_ms: i64) {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_ms);
        }
    }

    pub fn reset(&mut self) {
        self.started_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_ms.is_some()
    }

    /// Seconds left, `None` when not running
    pub fn remaining(&self, now_ms: i64) -> Option<u32> {
        self.started_ms
            .map(|start| GlobalTimer::new(start, ROUND_PACE_SECS).remaining(now_ms))
    }
}
