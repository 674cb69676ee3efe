//! I/O traits for session operations
//!
//! These traits abstract the backend, storage, time and the event-state
//! feed, enabling session tests with mock implementations and no network.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use super::error::ApiError;
use super::protocol::{
    CreateTokenResponse, EventState, FeedbackAnswers, FeedbackStatusResponse, MatchResultEntry,
    MatchesRequest, ParticipantAction, ResolveTokenResponse,
};

// =============================================================================
// BACKEND
// =============================================================================

/// Blocking calls to the event backend
pub trait ParticipantApi {
    /// Exchange a secure token for identity and survey status
    fn resolve_token(&self, token: &str) -> Result<ResolveTokenResponse, ApiError>;

    /// Mint a new secure token and participant number
    fn create_token(&self) -> Result<CreateTokenResponse, ApiError>;

    /// Store registration details and survey answers
    fn save_participant(
        &self,
        token: &str,
        name: &str,
        phone_number: Option<&str>,
        survey_data: &Value,
    ) -> Result<(), ApiError>;

    /// Fetch the shared event state (`get-event-state`)
    fn fetch_event_state(&self) -> Result<EventState, ApiError>;

    /// Fetch this participant's match results
    fn fetch_matches(&self, request: &MatchesRequest) -> Result<Vec<MatchResultEntry>, ApiError>;

    /// Whether feedback for a round was already sent, and whether the event is over
    fn check_feedback_submitted(
        &self,
        token: &str,
        round: u32,
        event_id: u32,
    ) -> Result<FeedbackStatusResponse, ApiError>;

    /// Send feedback answers for a round
    fn submit_feedback(
        &self,
        token: &str,
        assigned_number: u32,
        round: u32,
        event_id: u32,
        answers: &FeedbackAnswers,
    ) -> Result<(), ApiError>;

    /// Any other `/api/participant` action, raw JSON answer
    fn participant_action(&self, action: &ParticipantAction) -> Result<Value, ApiError>;
}

// =============================================================================
// STORAGE
// =============================================================================

/// String key-value store (browser local/session storage equivalent)
///
/// Methods take `&self`; implementations use interior mutability.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    /// Read and parse a value, `None` when absent or malformed
    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T>
    where
        Self: Sized,
    {
        self.get(key).and_then(|v| v.parse().ok())
    }
}

/// In-memory store, used for session-scoped keys and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Wall-clock source
pub trait Clock {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// =============================================================================
// EVENT FEED
// =============================================================================

/// Feed connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Connecting,
    Live,
    Reconnecting,
    Stopped,
}

/// Events produced by an event-state feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Fresh event state from the server
    EventState(EventState),
    /// A fetch failed; the next cycle retries
    Failed(String),
    StatusChanged(FeedStatus),
}

/// Non-blocking source of event-state updates (poller or push)
pub trait EventFeed {
    /// Next pending event, `None` when nothing is queued
    fn poll_event(&mut self) -> Option<FeedEvent>;

    /// Ask for an immediate refresh (page visibility regained)
    fn request_refresh(&self);

    /// The participant's token changed; feeds that subscribe per
    /// participant re-subscribe with it
    fn set_token(&mut self, _token: Option<String>) {}

    fn status(&self) -> FeedStatus;
}

// =============================================================================
// MOCK IMPLEMENTATIONS FOR TESTING
// =============================================================================


// =============================================================================
// TESTS
// =============================================================================
