//! Core types - platform-independent client state
//!
//! These types represent what the participant currently sees and who they
//! are, and are used throughout the session.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::SUBSTANTIAL_SURVEY_ANSWERS;
use super::protocol::FeedbackAnswers;

// =============================================================================
// SCREENS
// =============================================================================

/// Screen currently shown to the participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i8)]
pub enum Step {
    /// Invalid or expired token (dead end)
    TokenError = -2,
    /// Before any token was resolved
    Landing = -1,
    Registration = 0,
    /// Intro shown right after registering
    Welcome = 1,
    Survey = 2,
    /// Waiting for the matching to run
    Analysis = 3,
    Round = 4,
    /// Revealed compatibility for the finished round
    Results = 5,
    EventFinished = 6,
    /// Logged out or unregistered
    Goodbye = 7,
}

impl Step {
    pub fn code(self) -> i8 {
        self.into()
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::TokenError => "Invalid link",
            Step::Landing => "Welcome to BlindMatch",
            Step::Registration => "Registration",
            Step::Welcome => "You're in",
            Step::Survey => "Compatibility survey",
            Step::Analysis => "Analyzing matches",
            Step::Round => "Conversation round",
            Step::Results => "Your results",
            Step::EventFinished => "Event finished",
            Step::Goodbye => "See you next time",
        }
    }
}

/// Modal layered over the round screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModalStep {
    #[default]
    None,
    Feedback,
    Result,
}

// =============================================================================
// PARTICIPANT SESSION
// =============================================================================

/// Identity resolved from the secure token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSession {
    pub assigned_number: u32,
    pub participant_name: Option<String>,
    pub secure_token: String,
    #[serde(default)]
    pub survey_data: Option<Value>,
    #[serde(default)]
    pub has_substantial_survey_data: bool,
}

impl ParticipantSession {
    pub fn new(
        assigned_number: u32,
        participant_name: Option<String>,
        secure_token: String,
        survey_data: Option<Value>,
    ) -> Self {
        let has_substantial_survey_data = survey_data
            .as_ref()
            .map(is_substantial_survey)
            .unwrap_or(false);
        Self {
            assigned_number,
            participant_name,
            secure_token,
            survey_data,
            has_substantial_survey_data,
        }
    }

    /// Name to greet the participant with
    pub fn display_name(&self) -> String {
        match &self.participant_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Participant #{}", self.assigned_number),
        }
    }
}

/// Whether survey data carries enough answered fields to count as filled
pub fn is_substantial_survey(data: &Value) -> bool {
    let Some(obj) = data.as_object() else {
        return false;
    };
    let answered = obj
        .values()
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        })
        .count();
    answered >= SUBSTANTIAL_SURVEY_ANSWERS
}

// =============================================================================
// UI FLAGS
// =============================================================================

/// Ephemeral UI state reset on phase transitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiFlags {
    pub modal: ModalStep,
    pub feedback_answers: FeedbackAnswers,
    pub typewriter_done: bool,
    pub already_filled_prompt: bool,
    /// Guard: finished-event results are on screen
    pub showing_finished_results: bool,
    /// Guard: feedback form or its result is on screen
    pub showing_feedback: bool,
}

impl UiFlags {
    /// True when a visible result must not be clobbered by a reset
    pub fn is_guarded(&self) -> bool {
        self.showing_finished_results || self.showing_feedback
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
