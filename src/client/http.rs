//! HTTP client for the event backend
//!
//! Every backend call is a JSON `POST`. Participant operations share
//! `/api/participant` and select the sub-operation with an `action` field.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::ServerSettings;
use crate::core::error::ApiError;
use crate::core::io_traits::ParticipantApi;
use crate::core::protocol::{
    AdminAction, CreateTokenResponse, EventState, FeedbackAnswers, FeedbackResponse,
    FeedbackStatusResponse, MatchResultEntry, MatchesRequest, MatchesResponse, ParticipantAction,
    ResolveTokenResponse,
};

const PARTICIPANT_PATH: &str = "/api/participant";
const ADMIN_PATH: &str = "/api/admin";
const MATCHES_PATH: &str = "/api/get-my-matches";

// =============================================================================
// HTTP API
// =============================================================================

/// Blocking backend client
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(settings: &ServerSettings) -> Result<Self, ApiError> {
        // reqwest's blocking client defaults to 30s; keep it unbounded unless configured
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and decode the answer
    fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        debug!(path, status, "[HTTP] Response");
        decode_response(status, &text)
    }

    fn action<R: DeserializeOwned>(&self, action: &ParticipantAction) -> Result<R, ApiError> {
        debug!(action = action.name(), "[HTTP] Participant action");
        self.post(PARTICIPANT_PATH, action)
    }
}

/// Map a status and body to a typed answer
///
/// A well-formed body with `success: false` is a rejection even on 2xx.
pub fn decode_response<R: DeserializeOwned>(status: u16, body: &str) -> Result<R, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Http {
            status,
            body: error_message(body).unwrap_or_else(|| body.to_string()),
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Rejected(
            error_message(body).unwrap_or_else(|| "Request failed".to_string()),
        ));
    }
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `error` or `message` field of a JSON error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Unknown or expired tokens come back as 400/401/403/404 or success=false.
/// Anything else (408, 429, 5xx, network) stays retryable.
pub fn token_error(error: ApiError) -> ApiError {
    match error {
        ApiError::Http { status, body } if matches!(status, 400 | 401 | 403 | 404) => {
            ApiError::InvalidToken(body)
        }
        ApiError::Rejected(message) => ApiError::InvalidToken(message),
        other => other,
    }
}

impl ParticipantApi for HttpApi {
    fn resolve_token(&self, token: &str) -> Result<ResolveTokenResponse, ApiError> {
        let action = ParticipantAction::ResolveToken {
            secure_token: token.to_string(),
        };
        self.action::<ResolveTokenResponse>(&action)
            .map_err(token_error)
    }

    fn create_token(&self) -> Result<CreateTokenResponse, ApiError> {
        let created: CreateTokenResponse = self.action(&ParticipantAction::CreateToken)?;
        info!(number = created.assigned_number, "[HTTP] Token created");
        Ok(created)
    }

    fn save_participant(
        &self,
        token: &str,
        name: &str,
        phone_number: Option<&str>,
        survey_data: &Value,
    ) -> Result<(), ApiError> {
        let action = ParticipantAction::SaveParticipant {
            secure_token: token.to_string(),
            name: name.to_string(),
            phone_number: phone_number.map(str::to_string),
            survey_data: survey_data.clone(),
        };
        self.action::<Value>(&action).map(|_| ())
    }

    fn fetch_event_state(&self) -> Result<EventState, ApiError> {
        self.post(ADMIN_PATH, &AdminAction::GetEventState)
    }

    fn fetch_matches(&self, request: &MatchesRequest) -> Result<Vec<MatchResultEntry>, ApiError> {
        let response: MatchesResponse = self.post(MATCHES_PATH, request)?;
        Ok(response.matches)
    }

    fn check_feedback_submitted(
        &self,
        token: &str,
        round: u32,
        event_id: u32,
    ) -> Result<FeedbackStatusResponse, ApiError> {
        self.action(&ParticipantAction::CheckFeedbackSubmitted {
            secure_token: token.to_string(),
            round,
            event_id,
        })
    }

    fn submit_feedback(
        &self,
        token: &str,
        assigned_number: u32,
        round: u32,
        event_id: u32,
        answers: &FeedbackAnswers,
    ) -> Result<(), ApiError> {
        let response: FeedbackResponse = self.action(&ParticipantAction::SubmitFeedback {
            secure_token: token.to_string(),
            assigned_number,
            round,
            event_id,
            feedback: answers.clone(),
        })?;
        if let Some(message) = response.message {
            debug!(message = %message, "[HTTP] Feedback acknowledged");
        }
        Ok(())
    }

    fn participant_action(&self, action: &ParticipantAction) -> Result<Value, ApiError> {
        self.action(action)
    }
}

// =============================================================================
// CONTACT FORM
// =============================================================================

/// Message relayed through the Formspree contact form
#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Post the contact form to the configured relay
pub fn send_contact(formspree_url: &str, message: &ContactMessage) -> Result<(), ApiError> {
    if formspree_url.trim().is_empty() {
        return Err(ApiError::Rejected("No contact form configured".to_string()));
    }
    let response = Client::new()
        .post(formspree_url)
        .header("Accept", "application/json")
        .json(message)
        .send()
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        warn!(status = status.as_u16(), "[HTTP] Contact form rejected");
        return Err(ApiError::Http {
            status: status.as_u16(),
            body,
        });
    }
    info!("[HTTP] Contact form sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::Phase;

    #[test]
    fn test_decode_event_state() {
        let body = r#"{"phase":"form","current_round":0,"total_rounds":1,"current_event_id":2,
            "emergency_paused":false,"global_timer_active":false,"global_timer_duration":0}"#;
        let state: EventState = decode_response(200, body).unwrap();
        assert_eq!(state.phase, Phase::Form);
        assert_eq!(state.current_event_id, 2);
    }

    #[test]
    fn test_decode_success_false_is_rejected() {
        let body = r#"{"success":false,"error":"Token not found"}"#;
        let err = decode_response::<Value>(200, body).unwrap_err();
        assert_eq!(err, ApiError::Rejected("Token not found".to_string()));
    }

    #[test]
    fn test_decode_http_error_uses_message() {
        let err = decode_response::<Value>(404, r#"{"error":"Invalid token"}"#).unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 404,
                body: "Invalid token".to_string()
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_decode_server_error_is_transient() {
        let err = decode_response::<Value>(502, "Bad Gateway").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_token_error_only_for_client_rejections() {
        for status in [400, 401, 403, 404] {
            let decoded = decode_response::<Value>(status, r#"{"error":"Invalid token"}"#);
            let err = token_error(decoded.unwrap_err());
            assert_eq!(err, ApiError::InvalidToken("Invalid token".to_string()));
        }
        for status in [408, 429, 503] {
            let err = token_error(decode_response::<Value>(status, "slow down").unwrap_err());
            assert!(matches!(err, ApiError::Http { .. }), "{} -> {:?}", status, err);
            assert!(err.is_transient());
        }
        assert_eq!(
            token_error(ApiError::Rejected("Token not found".to_string())),
            ApiError::InvalidToken("Token not found".to_string())
        );
        assert!(token_error(ApiError::Network("down".to_string())).is_transient());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_response::<Value>(200, "<html>"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let settings = ServerSettings {
            url: "https://blindmatch.example/".to_string(),
            ..Default::default()
        };
        let api = HttpApi::new(&settings).unwrap();
        assert_eq!(
            api.endpoint(PARTICIPANT_PATH),
            "https://blindmatch.example/api/participant"
        );
    }

    #[test]
    fn test_contact_requires_url() {
        let message = ContactMessage {
            name: "Sara".to_string(),
            email: "sara@example.com".to_string(),
            message: "Hi".to_string(),
        };
        assert!(matches!(send_contact("", &message), Err(ApiError::Rejected(_))));
    }
}
