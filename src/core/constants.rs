//! Client constants - intervals, storage keys, lockout schedule

use std::time::Duration;

// =============================================================================
// INTERVALS
// =============================================================================

/// Event state poll interval
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Countdown recompute interval
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Length of the local "recommended pace" countdown in round 1
pub const ROUND_PACE_SECS: u32 = 45 * 60;

// =============================================================================
// SURVEY
// =============================================================================

/// Answered fields needed before survey data counts as filled
pub const SUBSTANTIAL_SURVEY_ANSWERS: usize = 3;

// =============================================================================
// TOKEN LOCKOUT
// =============================================================================

/// Failed token submissions allowed before a lockout window
pub const MAX_FAILED_TOKEN_ATTEMPTS: u32 = 3;

/// Successive lockout windows in seconds (last one repeats)
pub const LOCKOUT_SCHEDULE_SECS: [u64; 6] = [30, 120, 300, 900, 1800, 3600];

// =============================================================================
// STORAGE KEYS
// =============================================================================

pub const KEY_RESULT_TOKEN: &str = "blindmatch_result_token";
pub const KEY_RETURNING_TOKEN: &str = "blindmatch_returning_token";
pub const KEY_PARTICIPANT_NAME: &str = "blindmatch_participant_name";
pub const KEY_PARTICIPANT_NUMBER: &str = "blindmatch_participant_number";
pub const KEY_TOKEN_LOCKOUT: &str = "blindmatch_token_lockout";

pub const KEY_TIMER_RESTORED: &str = "timerRestored";
pub const KEY_TIMER_START: &str = "timerStartTime";
pub const KEY_TIMER_DURATION: &str = "timerDuration";

/// Session-scoped: set right after a token was created in this process
pub const KEY_JUST_CREATED_TOKEN: &str = "justCreatedToken";
pub const KEY_JUST_CREATED_TOKEN_VALUE: &str = "justCreatedTokenValue";

/// Keys holding participant identity, wiped on an invalid token
pub const IDENTITY_KEYS: [&str; 4] = [
    KEY_RESULT_TOKEN,
    KEY_RETURNING_TOKEN,
    KEY_PARTICIPANT_NAME,
    KEY_PARTICIPANT_NUMBER,
];
