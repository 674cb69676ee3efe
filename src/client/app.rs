//! Interactive participant client
//!
//! Drives a [`ClientSession`] from an event feed, a local countdown tick and
//! line commands typed on stdin, and prints the current screen as text
//! whenever something changes.

use std::fmt::Write as _;
use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::core::error::SessionError;
use crate::core::format::format_countdown;
use crate::core::io_traits::{Clock, EventFeed, FeedEvent, KeyValueStore, ParticipantApi};
use crate::core::protocol::FeedbackAnswers;
use crate::core::session::{ClientSession, EndReason, SessionEvent};
use crate::core::types::{ModalStep, Step};

// =============================================================================
// COMMANDS
// =============================================================================

/// Line commands typed by the participant
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Token(String),
    Feedback(FeedbackAnswers),
    /// Back to the foreground: refresh now and recompute the countdown
    Refresh,
    History,
    Dismiss,
    Logout,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  token <TOKEN>                          enter your secure token
  feedback <1-5> [yes|no] [comments...]  rate your conversation
  refresh                                fetch the event state now
  history                                list your matches so far
  dismiss                                close the result view
  logout                                 forget this device
  quit";

/// Parse one input line
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("Empty command".to_string());
    };
    match head.to_ascii_lowercase().as_str() {
        "token" => parts
            .next()
            .map(|t| Command::Token(t.to_string()))
            .ok_or_else(|| "Usage: token <TOKEN>".to_string()),
        "feedback" => {
            let rate = parts
                .next()
                .ok_or_else(|| "Usage: feedback <1-5> [yes|no] [comments...]".to_string())?;
            let compatibility_rate = Some(
                rate.parse::<u8>()
                    .map_err(|_| format!("Not a rating: {}", rate))?,
            );
            let rest: Vec<&str> = parts.collect();
            let (want_to_meet_again, comment_words) = match rest.split_first() {
                Some((first, tail)) => match parse_yes_no(first) {
                    Some(answer) => (Some(answer), tail),
                    None => (None, &rest[..]),
                },
                None => (None, &rest[..]),
            };
            let comments = (!comment_words.is_empty()).then(|| comment_words.join(" "));
            Ok(Command::Feedback(FeedbackAnswers {
                compatibility_rate,
                want_to_meet_again,
                comments,
                ..Default::default()
            }))
        }
        "refresh" => Ok(Command::Refresh),
        "history" => Ok(Command::History),
        "dismiss" | "close" => Ok(Command::Dismiss),
        "logout" => Ok(Command::Logout),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: {} (try help)", other)),
    }
}

fn parse_yes_no(word: &str) -> Option<bool> {
    match word.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

/// Result of one command
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub events: Vec<SessionEvent>,
    /// Text to show the participant directly
    pub message: Option<String>,
    pub quit: bool,
}

impl CommandOutcome {
    fn events(events: Vec<SessionEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Apply a command to the session
///
/// Validation and lockout errors become messages; backend failures are
/// returned so the caller can log them.
pub fn handle_command<A, S, C, F>(
    session: &mut ClientSession<A, S, C>,
    feed: &F,
    command: Command,
) -> Result<CommandOutcome, SessionError>
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
    F: EventFeed + ?Sized,
{
    let result = match command {
        Command::Token(token) => session.submit_token(&token).map(CommandOutcome::events),
        Command::Feedback(answers) => session.submit_feedback(answers).map(CommandOutcome::events),
        Command::Refresh => Ok(CommandOutcome::events(session.visibility_regained(feed))),
        Command::History => Ok(CommandOutcome::message(render_history(session))),
        Command::Dismiss => Ok(CommandOutcome::events(session.dismiss_result())),
        Command::Logout => Ok(CommandOutcome::events(session.logout())),
        Command::Help => Ok(CommandOutcome::message(HELP)),
        Command::Quit => Ok(CommandOutcome {
            quit: true,
            ..Default::default()
        }),
    };
    match result {
        Err(SessionError::Locked { retry_after_secs }) => Ok(CommandOutcome::message(format!(
            "Too many attempts. Try again in {}.",
            format_countdown(retry_after_secs.min(u64::from(u32::MAX)) as u32)
        ))),
        Err(SessionError::Validation(message)) => Ok(CommandOutcome::message(message)),
        Err(SessionError::NoSession) => Ok(CommandOutcome::message(
            "Enter your token first: token <TOKEN>",
        )),
        other => other,
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// Text rendering of the current screen
pub fn render_screen<A, S, C>(session: &ClientSession<A, S, C>) -> String
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
{
    let state = session.state();
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", state.step.title());

    if let Some(participant) = &state.participant {
        let _ = writeln!(
            out,
            "{} (#{})",
            participant.display_name(),
            participant.assigned_number
        );
    }
    if state.total_rounds > 0 {
        let _ = writeln!(out, "Round {}/{}", state.current_round, state.total_rounds);
    }
    if let Some(announcement) = &state.announcement {
        let _ = writeln!(out, "[{}] {}", announcement.kind, announcement.message);
    }
    if state.emergency_paused {
        let _ = writeln!(out, "!! Event paused by the organizers !!");
    }

    match state.step {
        Step::Landing => {
            let _ = writeln!(out, "Enter your token: token <TOKEN>");
        }
        Step::TokenError => {
            let _ = writeln!(
                out,
                "This link is invalid or expired. Ask the organizers for a new one."
            );
        }
        Step::Survey if state.ui.already_filled_prompt => {
            let _ = writeln!(out, "Your survey is already filled in. Sit tight.");
        }
        Step::Survey => {
            let _ = writeln!(out, "Please complete the compatibility survey.");
        }
        Step::Analysis => {
            let _ = writeln!(out, "We are finding your match...");
        }
        Step::Round => {
            if let Some(entry) = &state.current_match {
                let table = entry
                    .table_number
                    .map(|t| format!("table {}", t))
                    .unwrap_or_else(|| "your table".to_string());
                let _ = writeln!(out, "Meet {} at {}", entry.with, table);
            }
        }
        _ => {}
    }

    if state.timer_snapshot.active && !state.timer_ended {
        let _ = writeln!(out, "Time left: {}", format_countdown(state.timer_snapshot.remaining));
    }
    if let Some(pace) = session.pace_remaining() {
        let _ = writeln!(out, "Recommended pace: {}", format_countdown(pace));
    }

    match state.ui.modal {
        ModalStep::Feedback => {
            let _ = writeln!(
                out,
                "Time's up! Rate your conversation: feedback <1-5> <yes|no> [comments]"
            );
        }
        ModalStep::Result => {
            if let Some(revealed) = &state.revealed {
                let total = revealed
                    .breakdown
                    .total
                    .map(|t| format!("{:.0}%", t))
                    .unwrap_or_else(|| "n/a".to_string());
                let _ = writeln!(out, "Compatibility with {}: {}", revealed.entry.with, total);
                for component in &revealed.breakdown.components {
                    let _ = writeln!(out, "  {}: {:.0}%", component.name, component.percent);
                }
            }
            let _ = writeln!(out, "(dismiss to close)");
        }
        ModalStep::None => {}
    }
    out
}

fn render_history<A, S, C>(session: &ClientSession<A, S, C>) -> String
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
{
    let history = session.history();
    if history.is_empty() {
        return "No matches yet.".to_string();
    }
    let mut out = String::new();
    for entry in history.entries() {
        let score = entry
            .score
            .map(|s| format!("{:.0}%", s))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "Round {}: {} ({}) {}", entry.round, entry.with, entry.kind, score);
    }
    out
}

/// One-line notice for events worth telling the participant about
pub fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::TokenCreatedNotice { token } => Some(format!(
            "Your personal token is {}. Keep it to come back later.",
            token
        )),
        SessionEvent::TokenRejected { message } => Some(format!("Token rejected: {}", message)),
        SessionEvent::ConversationEnded(EndReason::AdminEnded) => {
            Some("The organizers ended this round.".to_string())
        }
        SessionEvent::ConversationEnded(EndReason::TimerExpired) => {
            Some("Time is up!".to_string())
        }
        SessionEvent::TimerRestored(snapshot) => Some(format!(
            "Resuming your conversation, {} left.",
            format_countdown(snapshot.remaining)
        )),
        SessionEvent::FeedbackSubmitted { .. } => Some("Thanks for your feedback!".to_string()),
        _ => None,
    }
}

// =============================================================================
// MAIN LOOP
// =============================================================================

/// Hand the participant's token to the feed whenever it changes
///
/// Returns true when the feed was updated.
pub fn sync_feed_token<A, S, C, F>(
    session: &ClientSession<A, S, C>,
    feed: &mut F,
    feed_token: &mut Option<String>,
) -> bool
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
    F: EventFeed + ?Sized,
{
    let current = session.participant().map(|p| p.secure_token.clone());
    if current == *feed_token {
        return false;
    }
    debug!(authenticated = current.is_some(), "[APP] Updating feed token");
    feed.set_token(current.clone());
    *feed_token = current;
    true
}

/// Spawn the stdin reader; the channel closes at end of input
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run the interactive loop until `quit` or end of input
pub fn run<A, S, C, F>(
    session: &mut ClientSession<A, S, C>,
    feed: &mut F,
    tick_interval: Duration,
) where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
    F: EventFeed + ?Sized,
{
    let lines = spawn_stdin_reader();
    let mut last_tick = Instant::now();
    let mut last_screen = String::new();
    let mut last_remaining = None;
    let mut feed_token = session.participant().map(|p| p.secure_token.clone());

    print_screen(session, &mut last_screen);

    loop {
        let mut events = Vec::new();

        while let Some(event) = feed.poll_event() {
            match event {
                FeedEvent::EventState(state) => {
                    events.extend(session.retry_pending_token());
                    events.extend(session.apply_event_state(state));
                }
                FeedEvent::Failed(message) => debug!(message = %message, "[POLL] Feed error"),
                FeedEvent::StatusChanged(status) => info!(status = ?status, "[POLL] Feed status"),
            }
        }

        if last_tick.elapsed() >= tick_interval {
            last_tick = Instant::now();
            events.extend(session.tick());
        }

        match lines.recv_timeout(Duration::from_millis(50)) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match parse_command(&line) {
                Ok(command) => match handle_command(session, &*feed, command) {
                    Ok(outcome) => {
                        if let Some(message) = outcome.message {
                            println!("{}", message);
                        }
                        events.extend(outcome.events);
                        if outcome.quit {
                            break;
                        }
                    }
                    Err(SessionError::Api(e)) if e.is_transient() => {
                        warn!(error = %e, "[APP] Command failed");
                        println!("Connection problem, please try again in a moment.");
                    }
                    Err(e) => {
                        warn!(error = %e, "[APP] Command failed");
                        println!("Something went wrong: {}", e);
                    }
                },
                Err(message) => println!("{}", message),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("[APP] Input closed, exiting");
                break;
            }
        }

        sync_feed_token(session, feed, &mut feed_token);

        for event in &events {
            debug!(event = ?event, "[APP] Session event");
            if let Some(notice) = describe_event(event) {
                println!("{}", notice);
            }
        }

        // Redraw on changes and once per countdown second
        let remaining = session.state().timer_snapshot.remaining;
        if !events.is_empty() || last_remaining != Some(remaining) {
            last_remaining = Some(remaining);
            print_screen(session, &mut last_screen);
        }
    }
}

fn print_screen<A, S, C>(session: &ClientSession<A, S, C>, last_screen: &mut String)
where
    A: ParticipantApi,
    S: KeyValueStore,
    C: Clock,
{
    let screen = render_screen(session);
    if screen != *last_screen {
        println!("{}", screen);
        *last_screen = screen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io_traits::mocks::{MockApi, MockClock, MockFeed};
    use crate::core::io_traits::MemoryStore;
    use crate::core::protocol::{EventState, Phase};

    const T0: i64 = 1_792_436_400_000;

    fn session() -> ClientSession<MockApi, MemoryStore, MockClock> {
        let api = MockApi::new().with_participant("tok", 5, "Sara", false);
        api.set_event_state(EventState {
            phase: Phase::Form,
            total_rounds: 1,
            ..Default::default()
        });
        ClientSession::new(api, MemoryStore::new(), MockClock::at(T0))
    }

    // -------------------------------------------------------------------------
    // Parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_command("token abc"), Ok(Command::Token("abc".to_string())));
        assert!(parse_command("token").is_err());
    }

    #[test]
    fn test_parse_feedback_full() {
        let cmd = parse_command("feedback 4 yes great chat").unwrap();
        assert_eq!(
            cmd,
            Command::Feedback(FeedbackAnswers {
                compatibility_rate: Some(4),
                want_to_meet_again: Some(true),
                comments: Some("great chat".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_parse_feedback_without_choice() {
        let Command::Feedback(answers) = parse_command("feedback 3 lovely").unwrap() else {
            panic!("expected feedback");
        };
        assert_eq!(answers.want_to_meet_again, None);
        assert_eq!(answers.comments.as_deref(), Some("lovely"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("feedback many").is_err());
        assert!(parse_command("dance").is_err());
        assert_eq!(parse_command("QUIT"), Ok(Command::Quit));
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    #[test]
    fn test_token_command_routes() {
        let mut session = session();
        let feed = MockFeed::new();
        let outcome = handle_command(&mut session, &feed, Command::Token("tok".into())).unwrap();
        assert!(!outcome.events.is_empty());
        assert_eq!(session.step(), Step::Survey);
        assert!(render_screen(&session).contains("compatibility survey"));
    }

    #[test]
    fn test_feedback_validation_becomes_message() {
        let mut session = session();
        let feed = MockFeed::new();
        handle_command(&mut session, &feed, Command::Token("tok".into())).unwrap();
        let outcome = handle_command(
            &mut session,
            &feed,
            Command::Feedback(FeedbackAnswers::default()),
        )
        .unwrap();
        assert!(outcome.message.is_some());
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_lockout_becomes_message() {
        let mut session = session();
        let feed = MockFeed::new();
        for _ in 0..3 {
            handle_command(&mut session, &feed, Command::Token("nope".into())).unwrap();
        }
        let outcome = handle_command(&mut session, &feed, Command::Token("tok".into())).unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Too many attempts. Try again in 00:30.")
        );
    }

    #[test]
    fn test_refresh_requests_feed() {
        let mut session = session();
        let feed = MockFeed::new();
        handle_command(&mut session, &feed, Command::Refresh).unwrap();
        assert_eq!(feed.refresh_requests.get(), 1);
    }

    #[test]
    fn test_feed_follows_token_changes() {
        let mut session = session();
        let mut feed = MockFeed::new();
        let mut feed_token = None;
        assert!(!sync_feed_token(&session, &mut feed, &mut feed_token));

        handle_command(&mut session, &feed, Command::Token("tok".into())).unwrap();
        assert!(sync_feed_token(&session, &mut feed, &mut feed_token));
        assert!(!sync_feed_token(&session, &mut feed, &mut feed_token));

        handle_command(&mut session, &feed, Command::Logout).unwrap();
        assert!(sync_feed_token(&session, &mut feed, &mut feed_token));
        assert_eq!(*feed.tokens.borrow(), vec![Some("tok".to_string()), None]);
    }

    #[test]
    fn test_history_and_quit() {
        let mut session = session();
        let feed = MockFeed::new();
        let outcome = handle_command(&mut session, &feed, Command::History).unwrap();
        assert_eq!(outcome.message.as_deref(), Some("No matches yet."));
        assert!(handle_command(&mut session, &feed, Command::Quit).unwrap().quit);
    }

    #[test]
    fn test_landing_screen() {
        let session = session();
        let screen = render_screen(&session);
        assert!(screen.starts_with("== Welcome to BlindMatch =="));
        assert!(screen.contains("token <TOKEN>"));
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(
            describe_event(&SessionEvent::ConversationEnded(EndReason::AdminEnded)).as_deref(),
            Some("The organizers ended this round.")
        );
        assert!(describe_event(&SessionEvent::PaceTimerStarted).is_none());
    }
}
