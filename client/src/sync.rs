//! Snapshot reconciliation.
//!
//! Both the one-time catch-up fetch and the live subscription funnel through
//! [`ClientSync::apply`], so a client that fetched and then receives the
//! logically-identical broadcast ends in exactly the same state as one that
//! only ever saw the broadcast. Deduplication compares the host's monotonic
//! sequence number, never wall-clock time.

use shared::{Phase, Snapshot};

/// What applying an incoming snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Same or older sequence number than the last applied one; discarded
    /// without any observable state change.
    Stale,
    /// The local snapshot was overwritten wholesale. `phase_change` carries
    /// the new room phase when it differs from the previous snapshot's.
    Updated { phase_change: Option<Phase> },
}

/// The client's local copy of the shared state.
#[derive(Debug, Default)]
pub struct ClientSync {
    last_seq: Option<u64>,
    snapshot: Snapshot,
}

impl ClientSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Reconciles one incoming snapshot, from either delivery path.
    ///
    /// Last-writer-wins: no field-level merge, the local copy is replaced
    /// as a whole. Clients never write the shared record themselves, so
    /// nothing local can be lost by the overwrite.
    pub fn apply(&mut self, incoming: Snapshot) -> Applied {
        if let Some(last) = self.last_seq {
            if incoming.seq <= last {
                return Applied::Stale;
            }
        }

        let phase_change = if incoming.phase != self.snapshot.phase {
            Some(incoming.phase)
        } else {
            None
        };

        self.last_seq = Some(incoming.seq);
        self.snapshot = incoming;
        Applied::Updated { phase_change }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(seq: u64, phase: Phase) -> Snapshot {
        let mut snap = Snapshot::new();
        snap.seq = seq;
        snap.phase = phase;
        snap
    }

    #[test]
    fn test_first_snapshot_is_applied() {
        let mut sync = ClientSync::new();
        let applied = sync.apply(snapshot(1, Phase::Lobby));
        assert_eq!(
            applied,
            Applied::Updated { phase_change: None }
        );
        assert_eq!(sync.last_seq(), Some(1));
    }

    #[test]
    fn test_same_seq_twice_is_a_noop() {
        let mut sync = ClientSync::new();
        sync.apply(snapshot(3, Phase::WritingPrompts));
        let before = sync.snapshot().clone();

        // Catch-up fetch delivering what the live broadcast already did.
        assert_eq!(sync.apply(snapshot(3, Phase::WritingPrompts)), Applied::Stale);
        assert_eq!(sync.snapshot(), &before);
        assert_eq!(sync.last_seq(), Some(3));
    }

    #[test]
    fn test_older_seq_is_discarded() {
        let mut sync = ClientSync::new();
        sync.apply(snapshot(5, Phase::Voting));
        assert_eq!(sync.apply(snapshot(4, Phase::WritingPrompts)), Applied::Stale);
        assert_eq!(sync.snapshot().phase, Phase::Voting);
    }

    #[test]
    fn test_phase_change_is_reported() {
        let mut sync = ClientSync::new();
        sync.apply(snapshot(1, Phase::Lobby));

        let applied = sync.apply(snapshot(2, Phase::WritingPrompts));
        assert_eq!(
            applied,
            Applied::Updated {
                phase_change: Some(Phase::WritingPrompts)
            }
        );

        // Same phase again: an update, but no phase change.
        let applied = sync.apply(snapshot(3, Phase::WritingPrompts));
        assert_eq!(applied, Applied::Updated { phase_change: None });
    }

    #[test]
    fn test_overwrite_is_wholesale() {
        let mut sync = ClientSync::new();
        let mut first = snapshot(1, Phase::Voting);
        first.round = 2;
        sync.apply(first);

        // The next snapshot carries no round-2 marker; nothing may survive
        // from the previous copy.
        let applied = sync.apply(snapshot(2, Phase::Voting));
        assert_eq!(applied, Applied::Updated { phase_change: None });
        assert_eq!(sync.snapshot().round, 1);
    }

    #[test]
    fn test_rejoin_fetch_then_live_matches_live_only() {
        // One client fetches then receives the same broadcast live...
        let mut rejoiner = ClientSync::new();
        rejoiner.apply(snapshot(7, Phase::CreatingLies));
        rejoiner.apply(snapshot(7, Phase::CreatingLies));

        // ...another only ever saw the live broadcast.
        let mut live_only = ClientSync::new();
        live_only.apply(snapshot(7, Phase::CreatingLies));

        assert_eq!(rejoiner.snapshot(), live_only.snapshot());
        assert_eq!(rejoiner.last_seq(), live_only.last_seq());
    }
}
