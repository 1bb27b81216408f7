//! The authoritative game-state snapshot broadcast from host to clients.
//!
//! The host always pushes the whole snapshot, never a diff, stamped with a
//! monotonic sequence number. Clients overwrite their local copy wholesale
//! and use the sequence number for idempotence.

use crate::message::Generation;
use crate::phase::Phase;
use crate::timer::TimerState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// A lie (or the inserted truth) shown during voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub author: Uuid,
    pub text: String,
}

/// One participant's accusation for the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: Uuid,
    pub accused: Uuid,
}

/// Per-participant points plus the counters used for end-of-game badges.
///
/// `previous` is snapshotted from `current` right before a scoring pass so
/// the presentation layer can render deltas; logic never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub current: i64,
    pub previous: i64,
    pub my_lies_voted: u32,
    pub my_truths_voted: u32,
    pub i_vote_lies: u32,
    pub i_vote_truth: u32,
}

/// The complete shared game state.
///
/// `generations` is a queue: the front element is always the one currently
/// being captioned or voted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic, stamped by the host on every broadcast.
    pub seq: u64,
    pub phase: Phase,
    pub round: u32,
    pub generations: VecDeque<Generation>,
    pub captions: Vec<Caption>,
    pub votes: Vec<Vote>,
    pub scores: HashMap<Uuid, Score>,
    pub timer: TimerState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            seq: 0,
            phase: Phase::Lobby,
            round: 1,
            generations: VecDeque::new(),
            captions: Vec::new(),
            votes: Vec::new(),
            scores: HashMap::new(),
            timer: TimerState::disabled(),
        }
    }

    /// The generation currently being captioned or voted on.
    pub fn current_generation(&self) -> Option<&Generation> {
        self.generations.front()
    }

    pub fn score(&self, id: Uuid) -> Option<&Score> {
        self.scores.get(&id)
    }
}
