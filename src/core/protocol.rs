//! Event API protocol types
//!
//! This module contains the JSON request and response types exchanged with
//! the BlindMatch backend (`/api/participant`, `/api/admin`,
//! `/api/get-my-matches`) and the WebSocket push feed. These types are
//! platform-independent and can be tested without a server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use super::breakdown::CompatibilityBreakdown;

// =============================================================================
// EVENT STATE
// =============================================================================

/// Server-authoritative stage of the live event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Registration,
    Form,
    Waiting,
    #[serde(rename = "round_1")]
    Round1,
    /// Any phase this client does not drive (multi-round, group phases)
    #[serde(other)]
    Unknown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Registration => "registration",
            Phase::Form => "form",
            Phase::Waiting => "waiting",
            Phase::Round1 => "round_1",
            Phase::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin announcement broadcast to every participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub time: Option<String>,
}

/// Shared event state returned by `get-event-state`
///
/// Owned by the backend; the client treats it as read-only ground truth.
/// Missing or null fields decode to their defaults so one sparse row does
/// not stall every poll; a missing phase is `Unknown` (screen kept).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventState {
    #[serde(default = "unknown_phase", deserialize_with = "phase_or_unknown")]
    pub phase: Phase,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_round: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_rounds: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_event_id: u32,
    #[serde(default)]
    pub announcement: Option<Announcement>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emergency_paused: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_timer_active: bool,
    #[serde(default)]
    pub global_timer_start_time: Option<DateTime<Utc>>,
    /// Timer duration in seconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_timer_duration: u32,
}

fn unknown_phase() -> Phase {
    Phase::Unknown
}

fn phase_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Phase, D::Error> {
    let phase = Option::<Phase>::deserialize(deserializer)?;
    Ok(phase.unwrap_or(Phase::Unknown))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value = Option::<T>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

impl EventState {
    /// Timer start as milliseconds since the Unix epoch
    pub fn timer_start_ms(&self) -> Option<i64> {
        self.global_timer_start_time.map(|t| t.timestamp_millis())
    }
}

// =============================================================================
// MATCH RESULTS
// =============================================================================

/// The other side of a match: a participant number or a free-text label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchPartner {
    Number(u32),
    Label(String),
}

impl fmt::Display for MatchPartner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPartner::Number(n) => write!(f, "#{}", n),
            MatchPartner::Label(s) => f.write_str(s),
        }
    }
}

/// One round's pairing for this participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultEntry {
    pub with: MatchPartner,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
    pub round: u32,
    #[serde(default)]
    pub table_number: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_repeat_match: bool,
    #[serde(default)]
    pub mutual_match: bool,
    #[serde(default)]
    pub humor_early_openness_bonus: Option<String>,
    /// Structured breakdown (newer backends); legacy ones only send `reason`
    #[serde(default)]
    pub breakdown: Option<CompatibilityBreakdown>,
}

// =============================================================================
// REQUESTS (client → server)
// =============================================================================

/// Feedback answers for one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAnswers {
    /// Compatibility rating, 1..=5
    pub compatibility_rate: Option<u8>,
    /// Required in round 1
    pub want_to_meet_again: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Actions of `POST /api/participant`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ParticipantAction {
    ResolveToken {
        secure_token: String,
    },
    CreateToken,
    SaveParticipant {
        secure_token: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone_number: Option<String>,
        survey_data: Value,
    },
    PhoneLookupData {
        phone_number: String,
    },
    PhoneLookupSignup {
        phone_number: String,
    },
    CheckNextEventSignup {
        secure_token: String,
    },
    AutoSignupNextEvent {
        secure_token: String,
    },
    EnableAutoSignup {
        secure_token: String,
    },
    DisableAutoSignup {
        secure_token: String,
    },
    UnregisterNextEvent {
        secure_token: String,
    },
    MatchPreference {
        secure_token: String,
        assigned_number: u32,
        event_id: u32,
        wants_match: bool,
    },
    GenerateVibeAnalysis {
        secure_token: String,
    },
    UpdateVibeQuestions {
        secure_token: String,
        answers: Value,
    },
    CheckFeedbackSubmitted {
        secure_token: String,
        round: u32,
        event_id: u32,
    },
    SubmitFeedback {
        secure_token: String,
        assigned_number: u32,
        round: u32,
        event_id: u32,
        feedback: FeedbackAnswers,
    },
}

impl ParticipantAction {
    /// Wire name of the action (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            ParticipantAction::ResolveToken { .. } => "resolve-token",
            ParticipantAction::CreateToken => "create-token",
            ParticipantAction::SaveParticipant { .. } => "save-participant",
            ParticipantAction::PhoneLookupData { .. } => "phone-lookup-data",
            ParticipantAction::PhoneLookupSignup { .. } => "phone-lookup-signup",
            ParticipantAction::CheckNextEventSignup { .. } => "check-next-event-signup",
            ParticipantAction::AutoSignupNextEvent { .. } => "auto-signup-next-event",
            ParticipantAction::EnableAutoSignup { .. } => "enable-auto-signup",
            ParticipantAction::DisableAutoSignup { .. } => "disable-auto-signup",
            ParticipantAction::UnregisterNextEvent { .. } => "unregister-next-event",
            ParticipantAction::MatchPreference { .. } => "match-preference",
            ParticipantAction::GenerateVibeAnalysis { .. } => "generate-vibe-analysis",
            ParticipantAction::UpdateVibeQuestions { .. } => "update-vibe-questions",
            ParticipantAction::CheckFeedbackSubmitted { .. } => "check-feedback-submitted",
            ParticipantAction::SubmitFeedback { .. } => "submit-feedback",
        }
    }
}

/// Actions of `POST /api/admin` that participants may call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AdminAction {
    GetEventState,
}

/// Body of `POST /api/get-my-matches`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchesRequest {
    pub assigned_number: u32,
    pub secure_token: String,
    pub event_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

// =============================================================================
// RESPONSES (server → client)
// =============================================================================

/// Result of `resolve-token`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveTokenResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub assigned_number: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub survey_data: Option<Value>,
    #[serde(default)]
    pub survey_completed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of `create-token`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateTokenResponse {
    pub secure_token: String,
    pub assigned_number: u32,
}

/// Result of `check-feedback-submitted`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FeedbackStatusResponse {
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub event_finished: bool,
}

/// Result of `get-my-matches`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MatchesResponse {
    #[serde(default)]
    pub matches: Vec<MatchResultEntry>,
}

/// Result of `submit-feedback`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FeedbackResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// PUSH FEED FRAMES
// =============================================================================

/// Frames of the WebSocket event-state feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Client subscription request
    Subscribe {
        #[serde(skip_serializing_if = "Option::is_none")]
        secure_token: Option<String>,
    },
    /// Full event state pushed by the server
    EventState(EventState),
    Ping,
    Pong,
    Error {
        message: String,
    },
}

// =============================================================================
// TESTS
// =============================================================================
