//! Core module - platform-independent types and the session state machine

pub mod breakdown;
pub mod constants;
pub mod error;
pub mod format;
pub mod history;
pub mod io_traits;
pub mod launch;
pub mod lockout;
pub mod protocol;
pub mod routing;
pub mod session;
pub mod timer;
pub mod types;

pub use error::{ApiError, SessionError};
pub use format::format_countdown;
pub use io_traits::{Clock, EventFeed, FeedEvent, FeedStatus, KeyValueStore, ParticipantApi};
pub use launch::LaunchParams;
pub use protocol::{EventState, FeedbackAnswers, MatchResultEntry, Phase};
pub use session::{AccountAction, ClientSession, EndReason, SessionEvent};
pub use types::{ModalStep, Step};
