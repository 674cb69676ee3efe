//! Phase to screen mapping
//!
//! Shared by token resolution and the event-state reconciler so both land
//! on the same screen for the same `(phase, survey completed)` pair.

use super::protocol::Phase;
use super::types::Step;

/// Where a phase sends the participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub step: Step,
    /// Survey already filled: show the prompt instead of the form
    pub already_filled: bool,
    /// Round screen needs the participant's match fetched first
    pub fetch_match: bool,
}

impl Route {
    fn to(step: Step) -> Self {
        Self {
            step,
            already_filled: false,
            fetch_match: false,
        }
    }
}

/// Deterministic phase table; `None` for phases this client does not drive
pub fn route_for(phase: Phase, survey_completed: bool) -> Option<Route> {
    let route = match phase {
        Phase::Registration => Route::to(Step::Registration),
        Phase::Form => Route {
            already_filled: survey_completed,
            ..Route::to(Step::Survey)
        },
        Phase::Waiting => Route::to(Step::Analysis),
        Phase::Round1 => Route {
            fetch_match: true,
            ..Route::to(Step::Round)
        },
        Phase::Unknown => return None,
    };
    Some(route)
}
