//! Participant session - the client state machine
//!
//! ClientSession owns everything the participant sees: identity, current
//! screen, the last observed event state, the conversation timer, feedback
//! and accumulated results. Token resolution, event-state reconciliation,
//! countdown ticks and feedback submission all go through it, and each
//! operation reports what changed as a list of [`SessionEvent`]s.
//!
//! The session is platform-independent and can be tested with mocks.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::breakdown::{breakdown_for, CompatibilityBreakdown};
use crate::core::constants::{
    IDENTITY_KEYS, KEY_JUST_CREATED_TOKEN, KEY_JUST_CREATED_TOKEN_VALUE, KEY_PARTICIPANT_NAME,
    KEY_PARTICIPANT_NUMBER, KEY_RESULT_TOKEN, KEY_RETURNING_TOKEN,
};
use crate::core::error::{ApiError, SessionError};
use crate::core::history::MatchHistory;
use crate::core::io_traits::{Clock, EventFeed, KeyValueStore, MemoryStore, ParticipantApi};
use crate::core::launch::LaunchParams;
use crate::core::lockout::TokenLockout;
use crate::core::protocol::{
    Announcement, EventState, FeedbackAnswers, MatchResultEntry, MatchesRequest,
    ParticipantAction, Phase,
};
use crate::core::routing::route_for;
use crate::core::timer::{
    clear_backup, restore_backup, save_backup, GlobalTimer, RoundPaceTimer, TimerSnapshot,
};
use crate::core::types::{is_substantial_survey, ModalStep, ParticipantSession, Step, UiFlags};

// =============================================================================
// SESSION EVENTS
// =============================================================================

/// Why a conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Local countdown reached zero
    TimerExpired,
    /// Server stopped the global timer
    AdminEnded,
}

/// Score and breakdown revealed after feedback
#[derive(Debug, Clone, PartialEq)]
pub struct RevealedResult {
    pub entry: MatchResultEntry,
    pub breakdown: CompatibilityBreakdown,
}

/// Events emitted by ClientSession for UI updates and logging
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StepChanged { from: Step, to: Step },
    PhaseChanged { from: Option<Phase>, to: Phase },
    RoundChanged { current: u32, total: u32 },
    AnnouncementChanged(Option<Announcement>),
    EmergencyPauseChanged(bool),
    TokenResolved { assigned_number: u32 },
    /// Invalid or expired token; persisted identity was wiped
    TokenRejected { message: String },
    /// One-time notice showing a freshly created token
    TokenCreatedNotice { token: String },
    TimerStarted(TimerSnapshot),
    TimerRestored(TimerSnapshot),
    ConversationEnded(EndReason),
    MatchLoaded(MatchResultEntry),
    FeedbackSubmitted { round: u32 },
    ResultRevealed(RevealedResult),
    PaceTimerStarted,
    PaceTimerReset,
    /// A backend call failed; state was left as is
    FetchFailed(String),
    SessionCleared,
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Everything the participant currently sees
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub step: Step,
    pub participant: Option<ParticipantSession>,
    pub survey_completed: bool,
    pub current_round: u32,
    pub total_rounds: u32,
    pub event_id: u32,
    pub announcement: Option<Announcement>,
    pub emergency_paused: bool,
    /// Parameters of the last server timer seen active
    pub timer: Option<GlobalTimer>,
    pub timer_snapshot: TimerSnapshot,
    pub conversation_started: bool,
    /// Set once per conversation so expiry and admin stop end it only once
    pub timer_ended: bool,
    /// Parameters of the conversation that last ended; never restarted
    pub last_ended_timer: Option<GlobalTimer>,
    pub ui: UiFlags,
    pub current_match: Option<MatchResultEntry>,
    pub revealed: Option<RevealedResult>,
    pub history: MatchHistory,
    pub pace: RoundPaceTimer,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            step: Step::Landing,
            participant: None,
            survey_completed: false,
            current_round: 0,
            total_rounds: 0,
            event_id: 0,
            announcement: None,
            emergency_paused: false,
            timer: None,
            timer_snapshot: TimerSnapshot::default(),
            conversation_started: false,
            timer_ended: false,
            last_ended_timer: None,
            ui: UiFlags::default(),
            current_match: None,
            revealed: None,
            history: MatchHistory::new(),
            pace: RoundPaceTimer::default(),
        }
    }
}

/// Account operations that act on the current participant's token
#[derive(Debug, Clone, PartialEq)]
pub enum AccountAction {
    CheckNextEventSignup,
    AutoSignupNextEvent,
    EnableAutoSignup,
    DisableAutoSignup,
    UnregisterNextEvent,
    MatchPreference { wants_match: bool },
    GenerateVibeAnalysis,
    UpdateVibeQuestions { answers: Value },
}

// =============================================================================
// CLIENT SESSION
// =============================================================================

/// ClientSession drives the participant journey against the backend
///
/// - `api`: backend calls
/// - `store`: persistent storage (survives restarts)
/// - `clock`: wall clock for the countdown
///
/// Session-scoped keys live in an in-memory store owned by the session.
pub struct ClientSession<A, S, C> {
    api: A,
    store: S,
    session_store: MemoryStore,
    clock: C,
    state: SessionState,
    /// Phase last acted upon (None until the first event state)
    prev_phase: Option<Phase>,
    /// Last event state applied, for the no-op check
    last_event: Option<EventState>,
    lockout: TokenLockout,
    /// Startup token whose resolution hit a backend failure; retried later
    pending_token: Option<String>,
}

impl<A, S, C> ClientSession<A, S, C>
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
{
    pub fn new(api: A, store: S, clock: C) -> Self {
        let lockout = TokenLockout::load(&store);
        Self {
            api,
            store,
            session_store: MemoryStore::new(),
            clock,
            state: SessionState::default(),
            prev_phase: None,
            last_event: None,
            lockout,
            pending_token: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn step(&self) -> Step {
        self.state.step
    }

    pub fn participant(&self) -> Option<&ParticipantSession> {
        self.state.participant.as_ref()
    }

    pub fn history(&self) -> &MatchHistory {
        &self.state.history
    }

    pub fn ui(&self) -> &UiFlags {
        &self.state.ui
    }

    pub fn phase(&self) -> Option<Phase> {
        self.prev_phase
    }

    pub fn timer_snapshot(&self) -> TimerSnapshot {
        self.state.timer_snapshot
    }

    /// Seconds left on the round pace banner, `None` outside round 1
    pub fn pace_remaining(&self) -> Option<u32> {
        self.state.pace.remaining(self.clock.now_ms())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session_store(&self) -> &MemoryStore {
        &self.session_store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// True while a startup token still waits for the backend
    pub fn has_pending_token(&self) -> bool {
        self.pending_token.is_some()
    }

    // -------------------------------------------------------------------------
    // Startup and token resolution
    // -------------------------------------------------------------------------

    /// Restore persisted state and resolve the launch or stored token
    ///
    /// An unreachable backend does not fail startup: the token is kept and
    /// [`retry_pending_token`](Self::retry_pending_token) resolves it later.
    pub fn bootstrap(&mut self, launch: &LaunchParams) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now = self.clock.now_ms();

        if let Some(timer) = restore_backup(&self.store, now) {
            let snapshot = timer.snapshot(now);
            self.state.timer = Some(timer);
            self.state.timer_snapshot = snapshot;
            self.state.conversation_started = true;
            self.state.timer_ended = false;
            events.push(SessionEvent::TimerRestored(snapshot));
        }

        if launch.show_token {
            if let Some(token) = self.take_created_token_notice() {
                events.push(SessionEvent::TokenCreatedNotice { token });
            }
        }

        let token = launch
            .token
            .clone()
            .or_else(|| self.store.get(KEY_RESULT_TOKEN))
            .or_else(|| self.store.get(KEY_RETURNING_TOKEN));

        match token {
            Some(token) => match self.resolve(&token, false) {
                Ok(resolved) => events.extend(resolved),
                Err(e) => {
                    warn!(error = %e, "[SESSION] Token resolution deferred");
                    self.pending_token = Some(token);
                    events.push(SessionEvent::FetchFailed(e.to_string()));
                }
            },
            None => debug!("[SESSION] No token, staying on landing"),
        }
        events
    }

    /// Try again to resolve a startup token deferred by a backend failure
    pub fn retry_pending_token(&mut self) -> Vec<SessionEvent> {
        let Some(token) = self.pending_token.take() else {
            return Vec::new();
        };
        match self.resolve(&token, false) {
            Ok(events) => events,
            Err(e) => {
                debug!(error = %e, "[SESSION] Token still unresolved");
                self.pending_token = Some(token);
                Vec::new()
            }
        }
    }

    /// Resolve a token typed in by the participant
    ///
    /// Subject to the attempt lockout: while locked, fails before any
    /// network call.
    pub fn submit_token(&mut self, token: &str) -> Result<Vec<SessionEvent>, SessionError> {
        self.resolve(token.trim(), true)
    }

    fn resolve(&mut self, token: &str, counted: bool) -> Result<Vec<SessionEvent>, SessionError> {
        if counted {
            if let Err(retry_after_secs) = self.lockout.check(self.clock.now_ms()) {
                return Err(SessionError::Locked { retry_after_secs });
            }
        }

        let rejected = match self.api.resolve_token(token) {
            Ok(resp) if resp.success => match resp.assigned_number {
                Some(number) => {
                    let participant = ParticipantSession::new(
                        number,
                        resp.name,
                        token.to_string(),
                        resp.survey_data,
                    );
                    let survey_completed =
                        resp.survey_completed || participant.has_substantial_survey_data;
                    return Ok(self.on_token_resolved(participant, survey_completed));
                }
                None => "Token resolved without a participant number".to_string(),
            },
            Ok(resp) => resp.error.unwrap_or_else(|| "Token not recognized".to_string()),
            Err(ApiError::InvalidToken(message)) => message,
            Err(e) => {
                warn!(error = %e, "[SESSION] Token resolution failed");
                return Err(e.into());
            }
        };

        if counted {
            self.lockout.record_failure(self.clock.now_ms());
            self.lockout.save(&self.store);
        }
        Ok(self.on_token_rejected(rejected))
    }

    fn on_token_resolved(
        &mut self,
        participant: ParticipantSession,
        survey_completed: bool,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.pending_token = None;
        self.lockout.record_success();
        self.lockout.save(&self.store);

        info!(
            number = participant.assigned_number,
            survey_completed, "[SESSION] Token resolved"
        );
        self.persist_identity(&participant);
        events.push(SessionEvent::TokenResolved {
            assigned_number: participant.assigned_number,
        });
        self.state.participant = Some(participant);
        self.state.survey_completed = survey_completed;

        // Route from a fresh snapshot; force the transition even if the
        // phase was already observed before the token was known.
        self.prev_phase = None;
        self.last_event = None;
        match self.api.fetch_event_state() {
            Ok(event) => events.extend(self.apply_event_state(event)),
            Err(e) => {
                warn!(error = %e, "[SESSION] Initial event state unavailable");
                events.push(SessionEvent::FetchFailed(e.to_string()));
            }
        }
        events
    }

    fn on_token_rejected(&mut self, message: String) -> Vec<SessionEvent> {
        warn!(message = %message, "[SESSION] Token rejected");
        let mut events = vec![SessionEvent::TokenRejected {
            message: message.clone(),
        }];
        self.clear_identity();
        events.extend(self.set_step(Step::TokenError));
        events
    }

    fn persist_identity(&self, participant: &ParticipantSession) {
        self.store.set(KEY_RESULT_TOKEN, &participant.secure_token);
        self.store
            .set(KEY_RETURNING_TOKEN, &participant.secure_token);
        self.store.set(
            KEY_PARTICIPANT_NUMBER,
            &participant.assigned_number.to_string(),
        );
        match &participant.participant_name {
            Some(name) => self.store.set(KEY_PARTICIPANT_NAME, name),
            None => self.store.remove(KEY_PARTICIPANT_NAME),
        }
    }

    /// Wipe identity and the timer backup; the lockout survives
    fn clear_identity(&mut self) {
        for key in IDENTITY_KEYS {
            self.store.remove(key);
        }
        clear_backup(&self.store);
        let step = self.state.step;
        self.state = SessionState {
            step,
            ..SessionState::default()
        };
        self.prev_phase = None;
        self.last_event = None;
        self.pending_token = None;
    }

    fn take_created_token_notice(&self) -> Option<String> {
        let flagged = self.session_store.get(KEY_JUST_CREATED_TOKEN).as_deref() == Some("true");
        let token = self.session_store.get(KEY_JUST_CREATED_TOKEN_VALUE);
        self.session_store.remove(KEY_JUST_CREATED_TOKEN);
        self.session_store.remove(KEY_JUST_CREATED_TOKEN_VALUE);
        if flagged {
            token
        } else {
            None
        }
    }

    // -------------------------------------------------------------------------
    // Registration and account
    // -------------------------------------------------------------------------

    /// Create a token and save registration details
    pub fn register(
        &mut self,
        name: &str,
        phone_number: Option<&str>,
        survey_data: Value,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation("Please enter your name".to_string()));
        }

        let created = self.api.create_token()?;
        self.api
            .save_participant(&created.secure_token, name, phone_number, &survey_data)?;

        self.session_store.set(KEY_JUST_CREATED_TOKEN, "true");
        self.session_store
            .set(KEY_JUST_CREATED_TOKEN_VALUE, &created.secure_token);

        let participant = ParticipantSession::new(
            created.assigned_number,
            Some(name.to_string()),
            created.secure_token.clone(),
            Some(survey_data.clone()),
        );
        info!(number = participant.assigned_number, "[SESSION] Registered");
        self.persist_identity(&participant);
        self.state.survey_completed = is_substantial_survey(&survey_data);
        self.state.participant = Some(participant);

        let mut events = vec![SessionEvent::TokenCreatedNotice {
            token: created.secure_token,
        }];
        events.extend(self.set_step(Step::Welcome));
        Ok(events)
    }

    /// Run a token-scoped account operation, returning the raw answer
    pub fn account_action(&self, action: AccountAction) -> Result<Value, SessionError> {
        let participant = self.state.participant.as_ref().ok_or(SessionError::NoSession)?;
        let secure_token = participant.secure_token.clone();
        let request = match action {
            AccountAction::CheckNextEventSignup => {
                ParticipantAction::CheckNextEventSignup { secure_token }
            }
            AccountAction::AutoSignupNextEvent => {
                ParticipantAction::AutoSignupNextEvent { secure_token }
            }
            AccountAction::EnableAutoSignup => ParticipantAction::EnableAutoSignup { secure_token },
            AccountAction::DisableAutoSignup => {
                ParticipantAction::DisableAutoSignup { secure_token }
            }
            AccountAction::UnregisterNextEvent => {
                ParticipantAction::UnregisterNextEvent { secure_token }
            }
            AccountAction::MatchPreference { wants_match } => ParticipantAction::MatchPreference {
                secure_token,
                assigned_number: participant.assigned_number,
                event_id: self.state.event_id,
                wants_match,
            },
            AccountAction::GenerateVibeAnalysis => {
                ParticipantAction::GenerateVibeAnalysis { secure_token }
            }
            AccountAction::UpdateVibeQuestions { answers } => {
                ParticipantAction::UpdateVibeQuestions {
                    secure_token,
                    answers,
                }
            }
        };
        debug!(action = request.name(), "[SESSION] Account action");
        Ok(self.api.participant_action(&request)?)
    }

    /// Forget the participant on this device
    pub fn logout(&mut self) -> Vec<SessionEvent> {
        info!("[SESSION] Logging out");
        self.clear_identity();
        let mut events = vec![SessionEvent::SessionCleared];
        events.extend(self.set_step(Step::Goodbye));
        events
    }

    // -------------------------------------------------------------------------
    // Event state reconciliation
    // -------------------------------------------------------------------------

    /// Fetch the event state once and apply it
    pub fn refresh_event_state(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let event = self.api.fetch_event_state()?;
        Ok(self.apply_event_state(event))
    }

    /// Reconcile local state with a freshly fetched event state
    ///
    /// Fields are only written when they differ from the last observed
    /// value; applying the same state twice is a no-op. Server timer state
    /// always wins over the local countdown.
    pub fn apply_event_state(&mut self, event: EventState) -> Vec<SessionEvent> {
        if self.last_event.as_ref() == Some(&event) {
            return Vec::new();
        }
        let mut events = Vec::new();

        if event.current_event_id != self.state.event_id {
            self.state.event_id = event.current_event_id;
        }
        if event.current_round != self.state.current_round
            || event.total_rounds != self.state.total_rounds
        {
            self.state.current_round = event.current_round;
            self.state.total_rounds = event.total_rounds;
            events.push(SessionEvent::RoundChanged {
                current: event.current_round,
                total: event.total_rounds,
            });
        }
        if event.announcement != self.state.announcement {
            self.state.announcement = event.announcement.clone();
            events.push(SessionEvent::AnnouncementChanged(event.announcement.clone()));
        }
        if event.emergency_paused != self.state.emergency_paused {
            self.state.emergency_paused = event.emergency_paused;
            warn!(paused = event.emergency_paused, "[SESSION] Emergency pause changed");
            events.push(SessionEvent::EmergencyPauseChanged(event.emergency_paused));
        }

        if self.prev_phase != Some(event.phase) {
            let from = self.prev_phase.replace(event.phase);
            info!(from = ?from, to = %event.phase, "[SESSION] Phase changed");
            events.push(SessionEvent::PhaseChanged {
                from,
                to: event.phase,
            });
            if self.state.participant.is_some() {
                events.extend(self.transition_to(event.phase));
            }
        }

        if self.state.participant.is_some() {
            events.extend(self.reconcile_timer(&event));
        }

        self.last_event = Some(event);
        events
    }

    fn transition_to(&mut self, phase: Phase) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(route) = route_for(phase, self.state.survey_completed) else {
            warn!(phase = %phase, "[SESSION] Unhandled phase, keeping current screen");
            return events;
        };

        if phase != Phase::Round1 && self.state.pace.is_running() {
            self.state.pace.reset();
            events.push(SessionEvent::PaceTimerReset);
        }

        if self.state.ui.is_guarded() {
            debug!(phase = %phase, "[SESSION] Result on screen, deferring transition");
            return events;
        }
        self.state.ui.reset();
        self.state.ui.already_filled_prompt = route.already_filled;

        if route.fetch_match {
            events.extend(self.enter_round());
        } else {
            events.extend(self.set_step(route.step));
        }
        events
    }

    /// Load the participant's match and decide between round UI and results
    fn enter_round(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(participant) = self.state.participant.clone() else {
            return events;
        };
        let round = self.state.current_round.max(1);

        let request = MatchesRequest {
            assigned_number: participant.assigned_number,
            secure_token: participant.secure_token.clone(),
            event_id: self.state.event_id,
            round: Some(round),
        };
        match self.api.fetch_matches(&request) {
            Ok(matches) => {
                self.state.history.extend(matches);
                if let Some(entry) = self.state.history.for_round(round).cloned() {
                    info!(
                        with = %entry.with,
                        table = ?entry.table_number,
                        "[SESSION] Match loaded"
                    );
                    self.state.current_match = Some(entry.clone());
                    events.push(SessionEvent::MatchLoaded(entry));
                }
            }
            Err(e) => {
                warn!(error = %e, "[SESSION] Match fetch failed");
                events.push(SessionEvent::FetchFailed(e.to_string()));
            }
        }

        match self
            .api
            .check_feedback_submitted(&participant.secure_token, round, self.state.event_id)
        {
            Ok(status) if status.submitted => {
                debug!(event_finished = status.event_finished, "[SESSION] Feedback already sent");
                if let Some(entry) = self.state.history.for_round(round).cloned() {
                    self.reveal(entry, &mut events);
                }
                self.state.ui.showing_finished_results = status.event_finished;
                let step = if status.event_finished {
                    Step::EventFinished
                } else {
                    Step::Results
                };
                events.extend(self.set_step(step));
                return events;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "[SESSION] Feedback status check failed");
                events.push(SessionEvent::FetchFailed(e.to_string()));
            }
        }

        events.extend(self.set_step(Step::Round));
        if !self.state.pace.is_running() {
            self.state.pace.start(self.clock.now_ms());
            events.push(SessionEvent::PaceTimerStarted);
        }
        events
    }

    fn reconcile_timer(&mut self, event: &EventState) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now = self.clock.now_ms();

        if event.global_timer_active {
            let Some(start_ms) = event.timer_start_ms() else {
                debug!("[TIMER] Active without a start time, ignoring");
                return events;
            };
            let timer = GlobalTimer::new(start_ms, event.global_timer_duration);
            if self.state.timer != Some(timer) {
                self.state.timer = Some(timer);
                if self.state.last_ended_timer == Some(timer) {
                    debug!("[TIMER] Server reports the timer that already ended, ignoring");
                    return events;
                }
                self.state.conversation_started = true;
                self.state.timer_ended = false;
                save_backup(&self.store, &timer);
                let snapshot = timer.snapshot(now);
                self.state.timer_snapshot = snapshot;
                info!(remaining = snapshot.remaining, "[TIMER] Conversation timer started");
                events.push(SessionEvent::TimerStarted(snapshot));
            }
        } else {
            if self.state.conversation_started && !self.state.timer_ended {
                info!("[TIMER] Server stopped the timer");
                events.extend(self.end_conversation(EndReason::AdminEnded));
            } else if self.state.timer.is_some() {
                clear_backup(&self.store);
            }
            self.state.timer = None;
        }
        events
    }

    // -------------------------------------------------------------------------
    // Countdown
    // -------------------------------------------------------------------------

    /// Recompute the countdown; ends the conversation at zero
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        if !self.state.conversation_started || self.state.timer_ended {
            return Vec::new();
        }
        let Some(timer) = self.state.timer else {
            return Vec::new();
        };
        let snapshot = timer.snapshot(self.clock.now_ms());
        self.state.timer_snapshot = snapshot;
        if snapshot.remaining == 0 {
            return self.end_conversation(EndReason::TimerExpired);
        }
        Vec::new()
    }

    /// Tab/terminal came back to the foreground: correct drift right away
    pub fn visibility_regained<F: EventFeed + ?Sized>(&mut self, feed: &F) -> Vec<SessionEvent> {
        debug!("[SESSION] Visibility regained, refreshing");
        let mut events = self.retry_pending_token();
        feed.request_refresh();
        events.extend(self.tick());
        events
    }

    fn end_conversation(&mut self, reason: EndReason) -> Vec<SessionEvent> {
        if self.state.timer_ended {
            return Vec::new();
        }
        info!(reason = ?reason, "[SESSION] Conversation ended, collecting feedback");
        self.state.timer_ended = true;
        self.state.last_ended_timer = self.state.timer;
        self.state.conversation_started = false;
        self.state.timer_snapshot = TimerSnapshot::default();
        clear_backup(&self.store);

        self.state.ui.modal = ModalStep::Feedback;
        self.state.ui.showing_feedback = true;
        self.state.ui.feedback_answers = FeedbackAnswers::default();

        let mut events = vec![SessionEvent::ConversationEnded(reason)];
        if self.state.pace.is_running() {
            self.state.pace.reset();
            events.push(SessionEvent::PaceTimerReset);
        }
        events
    }

    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------

    /// Validate and send feedback, then reveal the round's result
    ///
    /// Only accepted once the conversation has ended (feedback form open)
    /// or while that round's result is shown, for resubmits.
    pub fn submit_feedback(
        &mut self,
        answers: FeedbackAnswers,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let participant = self
            .state
            .participant
            .clone()
            .ok_or(SessionError::NoSession)?;
        if !matches!(self.state.ui.modal, ModalStep::Feedback | ModalStep::Result) {
            return Err(SessionError::Validation(
                "Feedback opens once your conversation has ended".to_string(),
            ));
        }
        let round = self.state.current_round.max(1);
        validate_feedback(&answers, round)?;

        self.api.submit_feedback(
            &participant.secure_token,
            participant.assigned_number,
            round,
            self.state.event_id,
            &answers,
        )?;
        info!(round, "[SESSION] Feedback submitted");

        let mut events = vec![SessionEvent::FeedbackSubmitted { round }];
        self.state.ui.feedback_answers = answers;

        let request = MatchesRequest {
            assigned_number: participant.assigned_number,
            secure_token: participant.secure_token,
            event_id: self.state.event_id,
            round: Some(round),
        };
        match self.api.fetch_matches(&request) {
            Ok(matches) => {
                self.state.history.extend(matches);
            }
            Err(e) => {
                warn!(error = %e, "[SESSION] Result fetch failed");
                events.push(SessionEvent::FetchFailed(e.to_string()));
                if let Some(entry) = self.state.current_match.clone() {
                    self.state.history.insert(entry);
                }
            }
        }

        if let Some(entry) = self.state.history.for_round(round).cloned() {
            self.reveal(entry, &mut events);
        }
        self.state.ui.modal = ModalStep::Result;
        self.state.ui.showing_feedback = true;
        events.extend(self.set_step(Step::Results));
        Ok(events)
    }

    /// Close the result view and follow the current phase again
    pub fn dismiss_result(&mut self) -> Vec<SessionEvent> {
        self.state.ui.modal = ModalStep::None;
        self.state.ui.showing_feedback = false;
        self.state.ui.showing_finished_results = false;
        match self.prev_phase {
            Some(phase) if self.state.participant.is_some() => self.transition_to(phase),
            _ => Vec::new(),
        }
    }

    fn reveal(&mut self, entry: MatchResultEntry, events: &mut Vec<SessionEvent>) {
        let revealed = RevealedResult {
            breakdown: breakdown_for(&entry),
            entry,
        };
        self.state.revealed = Some(revealed.clone());
        events.push(SessionEvent::ResultRevealed(revealed));
    }

    fn set_step(&mut self, to: Step) -> Vec<SessionEvent> {
        let from = self.state.step;
        if from == to {
            return Vec::new();
        }
        info!(from = from.code(), to = to.code(), "[SESSION] Step {:?} -> {:?}", from, to);
        self.state.step = to;
        vec![SessionEvent::StepChanged { from, to }]
    }
}

/// Required answers: a 1-5 rating, and the meet-again choice in round 1
pub fn validate_feedback(answers: &FeedbackAnswers, round: u32) -> Result<(), SessionError> {
    match answers.compatibility_rate {
        Some(1..=5) => {}
        Some(_) => {
            return Err(SessionError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ))
        }
        None => {
            return Err(SessionError::Validation(
                "Please rate your compatibility".to_string(),
            ))
        }
    }
    if round == 1 && answers.want_to_meet_again.is_none() {
        return Err(SessionError::Validation(
            "Please say whether you would like to meet again".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{KEY_TIMER_DURATION, KEY_TIMER_START, KEY_TOKEN_LOCKOUT};
    use crate::core::io_traits::mocks::{MockApi, MockClock, MockFeed};
    use crate::core::protocol::{MatchPartner, ResolveTokenResponse};
    use chrono::{TimeZone, Utc};

    const T0: i64 = 1_792_436_400_000;

    type TestSession = ClientSession<MockApi, MemoryStore, MockClock>;

    fn session_with(api: MockApi) -> TestSession {
        ClientSession::new(api, MemoryStore::new(), MockClock::at(T0))
    }

    fn state(phase: Phase) -> EventState {
        EventState {
            phase,
            current_round: if phase == Phase::Round1 { 1 } else { 0 },
            total_rounds: 1,
            current_event_id: 3,
            ..Default::default()
        }
    }

    fn round_with_timer(start_ms: i64, duration: u32) -> EventState {
        EventState {
            global_timer_active: true,
            global_timer_start_time: Utc.timestamp_millis_opt(start_ms).single(),
            global_timer_duration: duration,
            ..state(Phase::Round1)
        }
    }

    fn match_entry(with: u32, round: u32) -> MatchResultEntry {
        MatchResultEntry {
            with: MatchPartner::Number(with),
            kind: "romantic".to_string(),
            reason: "Compatibility: 72% (Values: 30%, Humor: 12%)".to_string(),
            round,
            table_number: Some(4),
            score: Some(72.0),
            is_repeat_match: false,
            mutual_match: false,
            humor_early_openness_bonus: None,
            breakdown: None,
        }
    }

    /// Session resolved with token "tok" in the given phase
    fn resolved(phase: Phase, survey_completed: bool) -> TestSession {
        let api = MockApi::new().with_participant("tok", 5, "Sara", survey_completed);
        api.set_event_state(state(phase));
        api.set_matches(vec![match_entry(12, 1)]);
        let mut session = session_with(api);
        session.submit_token("tok").unwrap();
        session
    }

    /// Round 1 conversation stopped by the organisers, feedback form open
    fn ended_round() -> TestSession {
        let mut session = resolved(Phase::Round1, false);
        session.apply_event_state(round_with_timer(T0, 600));
        session.apply_event_state(state(Phase::Round1));
        assert_eq!(session.ui().modal, ModalStep::Feedback);
        session
    }

    fn has_event(events: &[SessionEvent], pred: impl Fn(&SessionEvent) -> bool) -> bool {
        events.iter().any(pred)
    }

    fn valid_answers() -> FeedbackAnswers {
        FeedbackAnswers {
            compatibility_rate: Some(4),
            want_to_meet_again: Some(true),
            ..Default::default()
        }
    }

    // -------------------------------------------------------------------------
    // Token resolution
    // -------------------------------------------------------------------------

    #[test]
    fn test_initial_state() {
        let session = session_with(MockApi::new());
        assert_eq!(session.step(), Step::Landing);
        assert!(session.participant().is_none());
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_form_phase_survey_incomplete_shows_survey() {
        let session = resolved(Phase::Form, false);
        assert_eq!(session.step(), Step::Survey);
        assert_eq!(session.step().code(), 2);
        assert!(!session.ui().already_filled_prompt);
    }

    #[test]
    fn test_form_phase_survey_complete_shows_prompt() {
        let session = resolved(Phase::Form, true);
        assert_eq!(session.step(), Step::Survey);
        assert!(session.ui().already_filled_prompt);
    }

    #[test]
    fn test_registration_and_waiting_routes() {
        assert_eq!(resolved(Phase::Registration, false).step(), Step::Registration);
        assert_eq!(resolved(Phase::Waiting, true).step(), Step::Analysis);
    }

    #[test]
    fn test_round_phase_fetches_match() {
        let session = resolved(Phase::Round1, true);
        assert_eq!(session.step(), Step::Round);
        assert_eq!(session.api().call_count("get-my-matches"), 1);
        assert_eq!(session.api().call_count("check-feedback-submitted"), 1);
        assert_eq!(
            session.state().current_match.as_ref().unwrap().with,
            MatchPartner::Number(12)
        );
        assert!(session.pace_remaining().is_some());
    }

    #[test]
    fn test_resolution_persists_identity() {
        let session = resolved(Phase::Form, false);
        let store = session.store();
        assert_eq!(store.get(KEY_RESULT_TOKEN), Some("tok".to_string()));
        assert_eq!(store.get(KEY_RETURNING_TOKEN), Some("tok".to_string()));
        assert_eq!(store.get(KEY_PARTICIPANT_NAME), Some("Sara".to_string()));
        assert_eq!(store.get(KEY_PARTICIPANT_NUMBER), Some("5".to_string()));
    }

    #[test]
    fn test_invalid_token_clears_everything() {
        let mut session = resolved(Phase::Form, false);
        session.store().set(KEY_TIMER_START, &T0.to_string());
        session.store().set(KEY_TIMER_DURATION, "600");

        let events = session.submit_token("expired").unwrap();
        assert!(has_event(&events, |e| matches!(e, SessionEvent::TokenRejected { .. })));
        assert_eq!(session.step(), Step::TokenError);
        assert!(session.participant().is_none());
        for key in IDENTITY_KEYS {
            assert!(session.store().get(key).is_none(), "{key} should be cleared");
        }
        assert!(session.store().get(KEY_TIMER_START).is_none());
    }

    #[test]
    fn test_token_error_is_a_dead_end() {
        let mut session = session_with(MockApi::new());
        session.submit_token("bad").unwrap();
        let events = session.apply_event_state(state(Phase::Form));
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::StepChanged { .. })));
        assert_eq!(session.step(), Step::TokenError);
    }

    #[test]
    fn test_network_failure_keeps_state() {
        let api = MockApi::new();
        api.tokens
            .borrow_mut()
            .insert("tok".to_string(), Err(ApiError::Network("down".to_string())));
        let mut session = session_with(api);
        let err = session.submit_token("tok").unwrap_err();
        assert!(matches!(err, SessionError::Api(ApiError::Network(_))));
        assert_eq!(session.step(), Step::Landing);
        assert!(session.store().get(KEY_TOKEN_LOCKOUT).is_none());
    }

    #[test]
    fn test_lockout_after_three_invalid_tokens() {
        let mut session = session_with(MockApi::new());
        for _ in 0..3 {
            session.submit_token("guess").unwrap();
        }
        assert!(session.store().get(KEY_TOKEN_LOCKOUT).is_some());

        let err = session.submit_token("guess").unwrap_err();
        assert!(matches!(err, SessionError::Locked { retry_after_secs: 30 }));
        // rejected before reaching the backend
        assert_eq!(session.api().call_count("resolve-token"), 3);
    }

    #[test]
    fn test_lockout_expires() {
        let mut session = session_with(MockApi::new().with_participant("tok", 5, "Sara", false));
        for _ in 0..3 {
            session.submit_token("guess").unwrap();
        }
        session.clock.advance_secs(31);
        assert!(session.submit_token("tok").is_ok());
        assert!(session.store().get(KEY_TOKEN_LOCKOUT).is_none());
    }

    #[test]
    fn test_bootstrap_uses_stored_token() {
        let api = MockApi::new().with_participant("tok", 5, "Sara", false);
        api.set_event_state(state(Phase::Waiting));
        let store = MemoryStore::new();
        store.set(KEY_RESULT_TOKEN, "tok");
        let mut session = ClientSession::new(api, store, MockClock::at(T0));

        session.bootstrap(&LaunchParams::default());
        assert_eq!(session.step(), Step::Analysis);
    }

    #[test]
    fn test_bootstrap_launch_token_wins() {
        let api = MockApi::new()
            .with_participant("old", 1, "Old", false)
            .with_participant("new", 2, "New", false);
        let store = MemoryStore::new();
        store.set(KEY_RESULT_TOKEN, "old");
        let mut session = ClientSession::new(api, store, MockClock::at(T0));

        session
            .bootstrap(&LaunchParams::new(Some("new".to_string()), false));
        assert_eq!(session.participant().unwrap().assigned_number, 2);
    }

    #[test]
    fn test_bootstrap_survives_unreachable_backend() {
        let api = MockApi::new();
        api.tokens
            .borrow_mut()
            .insert("tok".to_string(), Err(ApiError::Network("down".to_string())));
        api.set_event_state(state(Phase::Waiting));
        let store = MemoryStore::new();
        store.set(KEY_RESULT_TOKEN, "tok");
        let mut session = ClientSession::new(api, store, MockClock::at(T0));

        let events = session.bootstrap(&LaunchParams::default());
        assert!(has_event(&events, |e| matches!(e, SessionEvent::FetchFailed(_))));
        assert_eq!(session.step(), Step::Landing);
        assert!(session.has_pending_token());
        // identity is kept for the retry
        assert_eq!(session.store().get(KEY_RESULT_TOKEN), Some("tok".to_string()));

        // still down: nothing changes
        assert!(session.retry_pending_token().is_empty());
        assert!(session.has_pending_token());

        // backend is back; a refresh resolves the token
        let back_online = ResolveTokenResponse {
            success: true,
            assigned_number: Some(5),
            name: Some("Sara".to_string()),
            ..Default::default()
        };
        session
            .api()
            .tokens
            .borrow_mut()
            .insert("tok".to_string(), Ok(back_online));
        let feed = MockFeed::new();
        let events = session.visibility_regained(&feed);
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::TokenResolved { assigned_number: 5 }
        )));
        assert!(!session.has_pending_token());
        assert_eq!(session.step(), Step::Analysis);
        assert_eq!(feed.refresh_requests.get(), 1);
    }

    #[test]
    fn test_bootstrap_without_token_stays_on_landing() {
        let mut session = session_with(MockApi::new());
        let events = session.bootstrap(&LaunchParams::default());
        assert!(events.is_empty());
        assert_eq!(session.step(), Step::Landing);
        assert_eq!(session.api().call_count("resolve-token"), 0);
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    #[test]
    fn test_same_state_twice_is_noop() {
        let mut session = resolved(Phase::Round1, false);
        let event = round_with_timer(T0, 600);
        session.apply_event_state(event.clone());
        let before = session.state().clone();
        let calls = session.api().calls.borrow().len();

        let events = session.apply_event_state(event);
        assert!(events.is_empty());
        assert_eq!(session.state(), &before);
        assert_eq!(session.api().calls.borrow().len(), calls);
    }

    #[test]
    fn test_phase_transition_routes() {
        let mut session = resolved(Phase::Registration, false);
        let events = session.apply_event_state(state(Phase::Form));
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::PhaseChanged {
                from: Some(Phase::Registration),
                to: Phase::Form
            }
        )));
        assert_eq!(session.step(), Step::Survey);

        session.apply_event_state(state(Phase::Waiting));
        assert_eq!(session.step(), Step::Analysis);
    }

    #[test]
    fn test_unknown_phase_keeps_screen() {
        let mut session = resolved(Phase::Waiting, false);
        session.apply_event_state(state(Phase::Unknown));
        assert_eq!(session.step(), Step::Analysis);
    }

    #[test]
    fn test_field_changes_without_phase_change() {
        let mut session = resolved(Phase::Waiting, false);
        let mut event = state(Phase::Waiting);
        event.announcement = Some(Announcement {
            message: "Drinks at the bar".to_string(),
            kind: "info".to_string(),
            time: None,
        });
        event.emergency_paused = true;

        let events = session.apply_event_state(event);
        assert!(has_event(&events, |e| matches!(e, SessionEvent::AnnouncementChanged(Some(_)))));
        assert!(has_event(&events, |e| matches!(e, SessionEvent::EmergencyPauseChanged(true))));
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::PhaseChanged { .. })));
        assert_eq!(session.step(), Step::Analysis);
    }

    #[test]
    fn test_transition_resets_ui() {
        let mut session = resolved(Phase::Form, true);
        assert!(session.ui().already_filled_prompt);
        session.state.ui.typewriter_done = true;
        session.apply_event_state(state(Phase::Waiting));
        assert!(!session.ui().already_filled_prompt);
        assert!(!session.ui().typewriter_done);
    }

    #[test]
    fn test_visible_result_is_not_clobbered() {
        let mut session = ended_round();
        session.submit_feedback(valid_answers()).unwrap();
        assert_eq!(session.step(), Step::Results);

        session.apply_event_state(state(Phase::Waiting));
        assert_eq!(session.step(), Step::Results);
        assert_eq!(session.ui().modal, ModalStep::Result);

        session.dismiss_result();
        assert_eq!(session.step(), Step::Analysis);
    }

    #[test]
    fn test_round_with_feedback_already_sent_shows_results() {
        let api = MockApi::new().with_participant("tok", 5, "Sara", true);
        api.set_event_state(state(Phase::Round1));
        api.set_matches(vec![match_entry(12, 1)]);
        api.set_feedback_status(true, false);
        let mut session = session_with(api);
        let events = session.submit_token("tok").unwrap();

        assert_eq!(session.step(), Step::Results);
        assert!(has_event(&events, |e| matches!(e, SessionEvent::ResultRevealed(_))));
    }

    #[test]
    fn test_round_with_event_finished() {
        let api = MockApi::new().with_participant("tok", 5, "Sara", true);
        api.set_event_state(state(Phase::Round1));
        api.set_matches(vec![match_entry(12, 1)]);
        api.set_feedback_status(true, true);
        let mut session = session_with(api);
        session.submit_token("tok").unwrap();

        assert_eq!(session.step(), Step::EventFinished);
        assert!(session.ui().showing_finished_results);
        // guarded: a later phase change does not clobber the results
        session.apply_event_state(state(Phase::Registration));
        assert_eq!(session.step(), Step::EventFinished);
    }

    #[test]
    fn test_leaving_round_resets_pace_timer() {
        let mut session = resolved(Phase::Round1, false);
        assert!(session.pace_remaining().is_some());
        let events = session.apply_event_state(state(Phase::Waiting));
        assert!(has_event(&events, |e| matches!(e, SessionEvent::PaceTimerReset)));
        assert!(session.pace_remaining().is_none());
    }

    // -------------------------------------------------------------------------
    // Timer
    // -------------------------------------------------------------------------

    #[test]
    fn test_timer_activation_mirrors_backup() {
        let mut session = resolved(Phase::Round1, false);
        let events = session.apply_event_state(round_with_timer(T0 - 60_000, 600));
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::TimerStarted(s) if s.remaining == 540
        )));
        assert!(session.state().conversation_started);
        assert_eq!(session.store().get(KEY_TIMER_START), Some((T0 - 60_000).to_string()));
        assert_eq!(session.store().get(KEY_TIMER_DURATION), Some("600".to_string()));
    }

    #[test]
    fn test_admin_stop_forces_feedback() {
        let mut session = resolved(Phase::Round1, false);
        session.apply_event_state(round_with_timer(T0, 600));
        assert!(session.state().conversation_started);

        let events = session.apply_event_state(state(Phase::Round1));
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::ConversationEnded(EndReason::AdminEnded)
        )));
        assert_eq!(session.ui().modal, ModalStep::Feedback);
        assert!(session.state().timer_ended);
        assert!(session.store().get(KEY_TIMER_START).is_none());
    }

    #[test]
    fn test_tick_expiry_ends_once() {
        let mut session = resolved(Phase::Round1, false);
        let active = round_with_timer(T0, 10);
        session.apply_event_state(active.clone());

        session.clock.advance_secs(5);
        assert!(session.tick().is_empty());
        assert_eq!(session.timer_snapshot().remaining, 5);

        session.clock.advance_secs(5);
        let events = session.tick();
        assert_eq!(
            events.first(),
            Some(&SessionEvent::ConversationEnded(EndReason::TimerExpired))
        );
        assert!(session.state().timer_ended);

        // further ticks and the server still reporting the same timer change nothing
        assert!(session.tick().is_empty());
        let mut still_active = active;
        still_active.announcement = Some(Announcement {
            message: "Time!".to_string(),
            kind: "info".to_string(),
            time: None,
        });
        let events = session.apply_event_state(still_active);
        assert!(!has_event(&events, |e| matches!(
            e,
            SessionEvent::ConversationEnded(_) | SessionEvent::TimerStarted(_)
        )));

        // nor does the server stopping it afterwards
        let events = session.apply_event_state(state(Phase::Round1));
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::ConversationEnded(_))));
    }

    #[test]
    fn test_new_timer_after_end_restarts_conversation() {
        let mut session = resolved(Phase::Round1, false);
        session.apply_event_state(round_with_timer(T0, 10));
        session.apply_event_state(state(Phase::Round1));
        assert!(session.state().timer_ended);

        let events = session.apply_event_state(round_with_timer(T0 + 60_000, 300));
        assert!(has_event(&events, |e| matches!(e, SessionEvent::TimerStarted(_))));
        assert!(!session.state().timer_ended);
    }

    #[test]
    fn test_same_timer_after_admin_end_does_not_restart() {
        let mut session = resolved(Phase::Round1, false);
        let active = round_with_timer(T0, 10);
        session.apply_event_state(active.clone());
        session.apply_event_state(state(Phase::Round1));
        assert!(session.state().timer_ended);

        // server flips back to the same timer, with some other field changed
        let mut same_timer = active;
        same_timer.announcement = Some(Announcement {
            message: "Please head to your table".to_string(),
            kind: "info".to_string(),
            time: None,
        });
        let events = session.apply_event_state(same_timer);
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::TimerStarted(_))));
        assert!(session.state().timer_ended);
        assert!(!session.state().conversation_started);
        assert_eq!(session.ui().modal, ModalStep::Feedback);
        assert!(session.store().get(KEY_TIMER_START).is_none());

        session.clock.advance_secs(11);
        assert!(session.tick().is_empty());
    }

    #[test]
    fn test_same_timer_after_expiry_and_stop_does_not_restart() {
        let mut session = resolved(Phase::Round1, false);
        let active = round_with_timer(T0, 10);
        session.apply_event_state(active.clone());
        session.clock.advance_secs(10);
        session.tick();
        session.apply_event_state(state(Phase::Round1));

        let events = session.apply_event_state(active);
        assert!(!has_event(&events, |e| matches!(
            e,
            SessionEvent::TimerStarted(_) | SessionEvent::ConversationEnded(_)
        )));
        assert!(session.tick().is_empty());
    }

    #[test]
    fn test_restore_live_backup_on_bootstrap() {
        let store = MemoryStore::new();
        store.set(KEY_TIMER_START, &(T0 - 100_000).to_string());
        store.set(KEY_TIMER_DURATION, "600");
        let mut session = ClientSession::new(MockApi::new(), store, MockClock::at(T0));

        let events = session.bootstrap(&LaunchParams::default());
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::TimerRestored(s) if s.remaining == 500
        )));
        assert!(session.state().conversation_started);
    }

    #[test]
    fn test_stale_backup_not_restored() {
        let store = MemoryStore::new();
        store.set(KEY_TIMER_START, &(T0 - 700_000).to_string());
        store.set(KEY_TIMER_DURATION, "600");
        let mut session = ClientSession::new(MockApi::new(), store, MockClock::at(T0));

        let events = session.bootstrap(&LaunchParams::default());
        assert!(events.is_empty());
        assert!(!session.state().conversation_started);
        assert!(session.store().get(KEY_TIMER_START).is_none());
        assert!(session.store().get(KEY_TIMER_DURATION).is_none());
    }

    #[test]
    fn test_visibility_regained_refreshes_and_ticks() {
        let mut session = resolved(Phase::Round1, false);
        session.apply_event_state(round_with_timer(T0, 30));
        session.clock.advance_secs(45);

        let feed = MockFeed::new();
        let events = session.visibility_regained(&feed);
        assert_eq!(feed.refresh_requests.get(), 1);
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::ConversationEnded(EndReason::TimerExpired)
        )));
    }

    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------

    #[test]
    fn test_feedback_requires_meet_again_in_round_one() {
        let mut session = ended_round();
        let before = session.state().clone();
        let err = session
            .submit_feedback(FeedbackAnswers {
                compatibility_rate: Some(4),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(session.state(), &before);
        assert_eq!(session.api().call_count("submit-feedback"), 0);
    }

    #[test]
    fn test_feedback_requires_rating() {
        let answers = FeedbackAnswers {
            want_to_meet_again: Some(false),
            ..Default::default()
        };
        assert!(validate_feedback(&answers, 1).is_err());
        let answers = FeedbackAnswers {
            compatibility_rate: Some(9),
            want_to_meet_again: Some(false),
            ..Default::default()
        };
        assert!(validate_feedback(&answers, 1).is_err());
    }

    #[test]
    fn test_feedback_reveals_breakdown() {
        let mut session = ended_round();
        let events = session.submit_feedback(valid_answers()).unwrap();

        assert!(has_event(&events, |e| matches!(e, SessionEvent::FeedbackSubmitted { round: 1 })));
        let revealed = session.state().revealed.clone().unwrap();
        assert_eq!(revealed.breakdown.total, Some(72.0));
        assert_eq!(revealed.breakdown.component("Values"), Some(30.0));
        assert_eq!(session.ui().modal, ModalStep::Result);
        assert_eq!(session.step(), Step::Results);
    }

    #[test]
    fn test_feedback_twice_does_not_duplicate_history() {
        let mut session = ended_round();
        session.submit_feedback(valid_answers()).unwrap();
        session.submit_feedback(valid_answers()).unwrap();
        let same_pair: Vec<_> = session
            .history()
            .entries()
            .iter()
            .filter(|e| e.with == MatchPartner::Number(12) && e.round == 1)
            .collect();
        assert_eq!(same_pair.len(), 1);
    }

    #[test]
    fn test_feedback_before_round_ends_is_rejected() {
        let mut session = resolved(Phase::Registration, false);
        let err = session.submit_feedback(valid_answers()).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(session.step(), Step::Registration);
        assert_eq!(session.api().call_count("submit-feedback"), 0);

        // a running round is not over yet either
        let mut session = resolved(Phase::Round1, false);
        session.apply_event_state(round_with_timer(T0, 600));
        assert!(session.submit_feedback(valid_answers()).is_err());
        assert_eq!(session.step(), Step::Round);
    }

    #[test]
    fn test_feedback_without_session() {
        let mut session = session_with(MockApi::new());
        assert_eq!(
            session.submit_feedback(valid_answers()).unwrap_err(),
            SessionError::NoSession
        );
    }

    // -------------------------------------------------------------------------
    // Registration and account
    // -------------------------------------------------------------------------

    #[test]
    fn test_register_sets_created_token_notice() {
        let api = MockApi::new();
        *api.created_token.borrow_mut() = Some(crate::core::protocol::CreateTokenResponse {
            secure_token: "fresh".to_string(),
            assigned_number: 9,
        });
        let mut session = session_with(api);
        let events = session
            .register("Omar", None, serde_json::json!({"a": 1, "b": 2, "c": 3}))
            .unwrap();

        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::TokenCreatedNotice { token } if token == "fresh"
        )));
        assert_eq!(session.step(), Step::Welcome);
        assert!(session.state().survey_completed);
        assert_eq!(session.store().get(KEY_RESULT_TOKEN), Some("fresh".to_string()));
        assert_eq!(
            session.session_store().get(KEY_JUST_CREATED_TOKEN),
            Some("true".to_string())
        );
    }

    #[test]
    fn test_show_token_notice_is_one_time() {
        let mut session = session_with(MockApi::new());
        session.session_store().set(KEY_JUST_CREATED_TOKEN, "true");
        session.session_store().set(KEY_JUST_CREATED_TOKEN_VALUE, "fresh");

        let launch = LaunchParams::new(None, true);
        let events = session.bootstrap(&launch);
        assert_eq!(
            events,
            vec![SessionEvent::TokenCreatedNotice {
                token: "fresh".to_string()
            }]
        );
        assert!(session.bootstrap(&launch).is_empty());
    }

    #[test]
    fn test_register_requires_name() {
        let mut session = session_with(MockApi::new());
        let err = session.register("  ", None, Value::Null).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(session.api().call_count("create-token"), 0);
    }

    #[test]
    fn test_account_action_needs_session() {
        let session = session_with(MockApi::new());
        assert_eq!(
            session.account_action(AccountAction::EnableAutoSignup),
            Err(SessionError::NoSession)
        );

        let session = resolved(Phase::Waiting, false);
        session
            .account_action(AccountAction::MatchPreference { wants_match: true })
            .unwrap();
        assert_eq!(session.api().call_count("match-preference"), 1);
    }

    #[test]
    fn test_logout_clears_identity() {
        let mut session = resolved(Phase::Waiting, false);
        let events = session.logout();
        assert!(has_event(&events, |e| matches!(e, SessionEvent::SessionCleared)));
        assert_eq!(session.step(), Step::Goodbye);
        assert!(session.store().get(KEY_RESULT_TOKEN).is_none());
    }
}
