//! Pure host reducers.
//!
//! Each reducer maps the current snapshot plus one input (a client message,
//! a timer expiry, or a host action) to a fresh snapshot and an outcome; the
//! engine performs the side effects (broadcast, timer arming) afterwards.
//! Reducers never touch the channel.
//!
//! Quorum conditions count distinct senders, which is what makes the
//! pipeline safe under the transport's at-least-once delivery: a duplicate
//! of an already-applied submission reduces to [`Outcome::Ignored`].

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::{Caption, ClientMessage, Envelope, Generation, Phase, Roster, Snapshot, Vote};

use crate::scoring::score_votes;

/// What a reduction did, so the engine knows which side effects to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped without effect: duplicate, wrong phase, or illegal input.
    Ignored,
    /// Accepted; quorum not yet met. Broadcast the updated snapshot.
    Accumulated,
    /// Accepted and the room moved to a new phase.
    Transitioned(Phase),
    /// A timed phase expired with nothing to advance; the deadline is
    /// pushed out instead. Broadcast so clients see the fresh timer.
    PhaseExtended,
}

/// A reduced snapshot plus its outcome.
#[derive(Debug)]
pub struct Reduction {
    pub snapshot: Snapshot,
    pub outcome: Outcome,
}

impl Reduction {
    fn ignored(snapshot: &Snapshot) -> Self {
        Self {
            snapshot: snapshot.clone(),
            outcome: Outcome::Ignored,
        }
    }
}

/// Moves the snapshot to `next` if the state machine allows it.
fn transition(snapshot: &mut Snapshot, next: Phase) -> bool {
    if snapshot.phase.can_advance(next) {
        snapshot.phase = next;
        true
    } else {
        warn!(
            "refusing illegal phase transition {} -> {}",
            snapshot.phase, next
        );
        false
    }
}

/// `WritingPrompts -> CreatingLies`: shuffle the queue so submission order
/// cannot leak authorship, and clear any leftovers from the previous round.
fn finish_writing(snapshot: &mut Snapshot, rng: &mut StdRng) -> bool {
    let mut queue: Vec<Generation> = snapshot.generations.drain(..).collect();
    queue.shuffle(rng);
    snapshot.generations = queue.into();
    snapshot.captions.clear();
    snapshot.votes.clear();
    transition(snapshot, Phase::CreatingLies)
}

/// `CreatingLies -> Voting`: insert the true prompt among the lies and
/// shuffle the whole set so voters cannot pick it out by position.
fn finish_lies(snapshot: &mut Snapshot, rng: &mut StdRng) -> bool {
    let truth = match snapshot.current_generation() {
        Some(generation) => Caption {
            author: generation.author,
            text: generation.prompt.clone(),
        },
        None => {
            warn!("no current generation to close captions for");
            return false;
        }
    };
    snapshot.captions.push(truth);
    snapshot.captions.shuffle(rng);
    transition(snapshot, Phase::Voting)
}

/// `Voting -> Scoring`: the scoring mutation runs atomically with the
/// transition, on whatever votes are in (quorum or timeout-partial).
fn finish_voting(snapshot: &mut Snapshot) -> bool {
    let author = match snapshot.current_generation() {
        Some(generation) => generation.author,
        None => {
            warn!("no current generation to score");
            return false;
        }
    };
    score_votes(&mut snapshot.scores, &snapshot.votes, author);
    transition(snapshot, Phase::Scoring)
}

/// Applies one decoded client message.
pub fn apply_message(
    snapshot: &Snapshot,
    roster: &Roster,
    envelope: &Envelope,
    rng: &mut StdRng,
) -> Reduction {
    if !roster.contains(envelope.sender) {
        // Accepted anyway; the quorum count may come out short or long.
        warn!(
            "{} message from participant {} not on the roster",
            envelope.body.kind(),
            envelope.sender
        );
    }

    let mut next = snapshot.clone();
    let outcome = match &envelope.body {
        ClientMessage::Generation(generation) => {
            reduce_generation(&mut next, roster, generation, rng)
        }
        ClientMessage::Caption { text } => reduce_caption(&mut next, roster, envelope, text, rng),
        ClientMessage::Vote { accused } => reduce_vote(&mut next, roster, envelope, *accused),
    };

    Reduction {
        snapshot: next,
        outcome,
    }
}

fn reduce_generation(
    snapshot: &mut Snapshot,
    roster: &Roster,
    generation: &Generation,
    rng: &mut StdRng,
) -> Outcome {
    if snapshot.phase != Phase::WritingPrompts {
        debug!("dropping generation outside WritingPrompts");
        return Outcome::Ignored;
    }
    if snapshot
        .generations
        .iter()
        .any(|g| g.author == generation.author)
    {
        debug!("dropping duplicate generation from {}", generation.author);
        return Outcome::Ignored;
    }

    snapshot.generations.push_back(generation.clone());
    if !roster.is_empty() && snapshot.generations.len() >= roster.len() {
        if finish_writing(snapshot, rng) {
            return Outcome::Transitioned(Phase::CreatingLies);
        }
    }
    Outcome::Accumulated
}

fn reduce_caption(
    snapshot: &mut Snapshot,
    roster: &Roster,
    envelope: &Envelope,
    text: &str,
    rng: &mut StdRng,
) -> Outcome {
    if snapshot.phase != Phase::CreatingLies {
        debug!("dropping caption outside CreatingLies");
        return Outcome::Ignored;
    }
    if snapshot.captions.iter().any(|c| c.author == envelope.sender) {
        debug!("dropping duplicate caption from {}", envelope.sender);
        return Outcome::Ignored;
    }

    snapshot.captions.push(Caption {
        author: envelope.sender,
        text: text.to_string(),
    });
    // One caption per participant minus the generation's author.
    if roster.len() > 1 && snapshot.captions.len() >= roster.len() - 1 {
        if finish_lies(snapshot, rng) {
            return Outcome::Transitioned(Phase::Voting);
        }
    }
    Outcome::Accumulated
}

fn reduce_vote(
    snapshot: &mut Snapshot,
    roster: &Roster,
    envelope: &Envelope,
    accused: uuid::Uuid,
) -> Outcome {
    if snapshot.phase != Phase::Voting {
        debug!("dropping vote outside Voting");
        return Outcome::Ignored;
    }
    if snapshot.votes.iter().any(|v| v.voter == envelope.sender) {
        debug!("dropping duplicate vote from {}", envelope.sender);
        return Outcome::Ignored;
    }

    snapshot.votes.push(Vote {
        voter: envelope.sender,
        accused,
    });
    if roster.len() > 1 && snapshot.votes.len() >= roster.len() - 1 {
        if finish_voting(snapshot) {
            return Outcome::Transitioned(Phase::Scoring);
        }
    }
    Outcome::Accumulated
}

/// Applies a phase-timer expiry. `fired` is the phase the timer was armed
/// for; a mismatch with the current phase means quorum already advanced the
/// room and the fire is stale, which keeps the quorum/timeout race
/// idempotent.
pub fn apply_timeout(
    snapshot: &Snapshot,
    _roster: &Roster,
    fired: Phase,
    rng: &mut StdRng,
) -> Reduction {
    if snapshot.phase != fired {
        debug!(
            "stale timer fire for {} while in {}",
            fired, snapshot.phase
        );
        return Reduction::ignored(snapshot);
    }

    let mut next = snapshot.clone();
    let outcome = match fired {
        Phase::WritingPrompts => {
            if next.generations.is_empty() {
                // Nothing came in at all; there is no generation to caption,
                // so the only sane move is a fresh deadline.
                warn!("writing phase timed out with no generations; extending");
                Outcome::PhaseExtended
            } else if finish_writing(&mut next, rng) {
                Outcome::Transitioned(Phase::CreatingLies)
            } else {
                Outcome::Ignored
            }
        }
        Phase::CreatingLies => {
            if finish_lies(&mut next, rng) {
                Outcome::Transitioned(Phase::Voting)
            } else {
                Outcome::Ignored
            }
        }
        Phase::Voting => {
            if finish_voting(&mut next) {
                Outcome::Transitioned(Phase::Scoring)
            } else {
                Outcome::Ignored
            }
        }
        _ => Outcome::Ignored,
    };

    Reduction {
        snapshot: next,
        outcome,
    }
}

/// The host starts the game: one zeroed score per known participant, then
/// into the first writing phase.
pub fn apply_start(snapshot: &Snapshot, roster: &Roster) -> Reduction {
    if snapshot.phase != Phase::Lobby {
        debug!("ignoring start outside Lobby");
        return Reduction::ignored(snapshot);
    }

    let mut next = snapshot.clone();
    next.scores = roster.ids().map(|id| (id, Default::default())).collect();
    if transition(&mut next, Phase::WritingPrompts) {
        Reduction {
            snapshot: next,
            outcome: Outcome::Transitioned(Phase::WritingPrompts),
        }
    } else {
        Reduction::ignored(snapshot)
    }
}

/// The continuation after a scoring display: next generation in the queue,
/// next round, or the end of the game.
pub fn apply_continue(snapshot: &Snapshot, rounds: u32) -> Reduction {
    if snapshot.phase != Phase::Scoring {
        debug!("ignoring continue outside Scoring");
        return Reduction::ignored(snapshot);
    }

    let mut next = snapshot.clone();
    next.generations.pop_front();
    next.captions.clear();
    next.votes.clear();

    let target = if next.generations.is_empty() {
        if next.round < rounds {
            next.round += 1;
            next.generations.clear();
            Phase::WritingPrompts
        } else {
            Phase::Finished
        }
    } else {
        Phase::CreatingLies
    };

    if transition(&mut next, target) {
        Reduction {
            snapshot: next,
            outcome: Outcome::Transitioned(target),
        }
    } else {
        Reduction::ignored(snapshot)
    }
}
