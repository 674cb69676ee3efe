//! Client-side token attempt limiting
//!
//! After [`MAX_FAILED_TOKEN_ATTEMPTS`] consecutive failures the client refuses
//! further submissions for a growing window. State lives in the client store,
//! so this only deters casual guessing; rate limiting proper belongs on the
//! server.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::constants::{KEY_TOKEN_LOCKOUT, LOCKOUT_SCHEDULE_SECS, MAX_FAILED_TOKEN_ATTEMPTS};
use super::io_traits::KeyValueStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLockout {
    /// Failures since the last lockout or success
    failed_attempts: u32,
    /// Lockout windows applied so far (indexes the schedule)
    lockouts: u32,
    locked_until_ms: Option<i64>,
}

impl TokenLockout {
    /// Load from storage; a missing or corrupt entry starts fresh
    pub fn load<S: KeyValueStore>(store: &S) -> Self {
        store
            .get(KEY_TOKEN_LOCKOUT)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(lockout) => Some(lockout),
                Err(e) => {
                    warn!(error = %e, "[LOCKOUT] Corrupt lockout state, resetting");
                    None
                }
            })
            .unwrap_or_default()
    }

    pub fn save<S: KeyValueStore>(&self, store: &S) {
        if *self == Self::default() {
            store.remove(KEY_TOKEN_LOCKOUT);
            return;
        }
        match serde_json::to_string(self) {
            Ok(json) => store.set(KEY_TOKEN_LOCKOUT, &json),
            Err(e) => warn!(error = %e, "[LOCKOUT] Failed to serialize lockout state"),
        }
    }

    /// `Err(seconds to wait)` while a lockout window is open
    pub fn check(&self, now_ms: i64) -> Result<(), u64> {
        match self.locked_until_ms {
            Some(until) if now_ms < until => {
                let wait_ms = (until - now_ms) as u64;
                Err(wait_ms.div_ceil(1000))
            }
            _ => Ok(()),
        }
    }

    /// Count a failed attempt; returns the window in seconds if one was opened
    pub fn record_failure(&mut self, now_ms: i64) -> Option<u64> {
        self.failed_attempts += 1;
        debug!(
            failed = self.failed_attempts,
            "[LOCKOUT] Failed token attempt"
        );
        if self.failed_attempts < MAX_FAILED_TOKEN_ATTEMPTS {
            return None;
        }

        let idx = (self.lockouts as usize).min(LOCKOUT_SCHEDULE_SECS.len() - 1);
        let window = LOCKOUT_SCHEDULE_SECS[idx];
        self.locked_until_ms = Some(now_ms + (window as i64) * 1000);
        self.lockouts += 1;
        self.failed_attempts = 0;
        warn!(window_secs = window, "[LOCKOUT] Token attempts locked");
        Some(window)
    }

    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }
}
