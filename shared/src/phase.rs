//! The round state machine shared by host and clients.
//!
//! The host is the only side that drives room-phase transitions; clients
//! mirror the room phase and additionally use [`Phase::Waiting`] as a
//! per-participant display state between their own submission and the next
//! global phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One state of the round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Players are joining; nothing has started yet.
    Lobby,
    /// Everyone writes a prompt and sends it to the generation service.
    WritingPrompts,
    /// Non-authors write plausible lies for the current generation.
    CreatingLies,
    /// Non-authors pick which caption they believe is the true prompt.
    Voting,
    /// Point deltas from the closed vote set are on display.
    Scoring,
    /// Terminal state, final scoreboard.
    Finished,
    /// Per-participant only: submitted, waiting on the rest of the room.
    /// Never a legal room phase.
    Waiting,
}

impl Phase {
    /// Whether the host may move the room from `self` to `next`.
    ///
    /// Encodes the only legal order:
    /// `Lobby -> WritingPrompts -> CreatingLies -> Voting -> Scoring`,
    /// then from `Scoring` either back to `CreatingLies` (next generation),
    /// back to `WritingPrompts` (next round) or on to `Finished`.
    pub fn can_advance(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Lobby, Phase::WritingPrompts)
                | (Phase::WritingPrompts, Phase::CreatingLies)
                | (Phase::CreatingLies, Phase::Voting)
                | (Phase::Voting, Phase::Scoring)
                | (Phase::Scoring, Phase::CreatingLies)
                | (Phase::Scoring, Phase::WritingPrompts)
                | (Phase::Scoring, Phase::Finished)
        )
    }

    /// True for states the room itself can be in (everything but `Waiting`).
    pub fn is_room_phase(self) -> bool {
        !matches!(self, Phase::Waiting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished)
    }

    /// Phases that run against a deadline when the timer is enabled.
    pub fn is_timed(self) -> bool {
        matches!(
            self,
            Phase::WritingPrompts | Phase::CreatingLies | Phase::Voting
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Lobby => "Lobby",
            Phase::WritingPrompts => "WritingPrompts",
            Phase::CreatingLies => "CreatingLies",
            Phase::Voting => "Voting",
            Phase::Scoring => "Scoring",
            Phase::Finished => "Finished",
            Phase::Waiting => "Waiting",
        };
        write!(f, "{}", label)
    }
}
