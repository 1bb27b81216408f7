//! The scoring engine.
//!
//! Runs exactly once per generation, at the `Voting -> Scoring` transition,
//! over the closed vote set for the generation at the front of the queue.

use log::warn;
use shared::{Score, Vote};
use std::collections::HashMap;
use uuid::Uuid;

/// Points for finding (or authoring) the true prompt.
pub const TRUTH_POINTS: i64 = 1000;
/// Points for a lie that fooled somebody.
pub const LIE_POINTS: i64 = 500;

/// Applies the vote set for a generation authored by `true_author`.
///
/// Every existing `previous` is first snapshotted from `current` so the
/// presentation layer can render deltas; nothing else ever reads it. Then,
/// per vote: a correct accusation pays the voter and the author 1000 each;
/// a wrong accusation pays the accused caption-author 500 for the successful
/// deception and only bumps the voter's counter.
///
/// A voter or accused absent from the score table (a participant who joined
/// mid-round) gets a zeroed record on the fly rather than being dropped.
pub fn score_votes(scores: &mut HashMap<Uuid, Score>, votes: &[Vote], true_author: Uuid) {
    for score in scores.values_mut() {
        score.previous = score.current;
    }

    for vote in votes {
        if vote.voter == true_author {
            // Author votes on their own generation are a client bug; count
            // them like any other so the totals stay explainable.
            warn!("vote from the current generation's author {}", vote.voter);
        }
        if vote.accused == true_author {
            let voter = scores.entry(vote.voter).or_default();
            voter.current += TRUTH_POINTS;
            voter.i_vote_truth += 1;

            let author = scores.entry(true_author).or_default();
            author.current += TRUTH_POINTS;
            author.my_truths_voted += 1;
        } else {
            scores.entry(vote.voter).or_default().i_vote_lies += 1;

            let liar = scores.entry(vote.accused).or_default();
            liar.current += LIE_POINTS;
            liar.my_lies_voted += 1;
        }
    }
}
