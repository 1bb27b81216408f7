//! The message-channel capability: an append-only, host-visible message log,
//! a single host-written snapshot record, and a roster record set.
//!
//! The engine treats transport as external; these traits are the whole
//! surface it relies on. Subscriptions hand back plain mpsc receivers so
//! engines can fold them into their `tokio::select!` loops. Sends are
//! fire-and-forget from the engine's point of view: a failed send is logged
//! by the caller, never retried, and never surfaced to game logic.
//!
//! [`InMemoryChannel`] implements both role traits for the demo binary and
//! the tests. Messages cross it encoded, so the host side exercises the same
//! fallible decode it would against a real transport.

use crate::message::{EncodeError, Envelope};
use crate::participant::{Participant, ParticipantPatch, Roster};
use crate::snapshot::Snapshot;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel store is unavailable")]
    Unavailable,
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// A live roster change, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    Joined(Participant),
    Updated(Participant),
}

impl RosterEvent {
    pub fn participant(&self) -> &Participant {
        match self {
            RosterEvent::Joined(p) | RosterEvent::Updated(p) => p,
        }
    }
}

/// What a non-host device may do with the channel.
pub trait ClientChannel {
    /// Appends a message to the log; visible only to the host subscription.
    fn append_message(&self, envelope: &Envelope) -> Result<(), ChannelError>;

    /// Live snapshot broadcasts, in publish order.
    fn subscribe_snapshot(&self) -> mpsc::UnboundedReceiver<Snapshot>;

    /// One-time catch-up read of the current snapshot (mid-game join/rejoin).
    fn fetch_snapshot(&self) -> Result<Option<Snapshot>, ChannelError>;

    /// Merges a partial update into the caller's own roster record.
    fn update_participant(&self, id: Uuid, patch: &ParticipantPatch) -> Result<(), ChannelError>;

    fn subscribe_roster(&self) -> mpsc::UnboundedReceiver<RosterEvent>;

    fn fetch_roster(&self) -> Result<Vec<Participant>, ChannelError>;

    /// The host-phase label on the session record, for observability.
    fn fetch_host_phase(&self) -> Result<Option<String>, ChannelError>;
}

/// The host-only capabilities: the message subscription and the snapshot
/// write. Holding a value of this type is what makes a device the host.
pub trait HostChannel {
    /// Encoded envelopes, in arrival order. Host-only.
    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Vec<u8>>;

    /// Replaces the shared snapshot record and fans it to subscribers.
    /// Host-only write; `host_phase` is the label stored alongside.
    fn publish_snapshot(&self, snapshot: &Snapshot, host_phase: &str)
        -> Result<(), ChannelError>;

    fn update_participant(&self, id: Uuid, patch: &ParticipantPatch) -> Result<(), ChannelError>;

    fn subscribe_roster(&self) -> mpsc::UnboundedReceiver<RosterEvent>;

    fn fetch_roster(&self) -> Result<Vec<Participant>, ChannelError>;
}

struct ChannelCore {
    message_log: Vec<Vec<u8>>,
    message_subs: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    snapshot: Option<Snapshot>,
    host_phase: Option<String>,
    snapshot_subs: Vec<mpsc::UnboundedSender<Snapshot>>,
    roster: Roster,
    roster_subs: Vec<mpsc::UnboundedSender<RosterEvent>>,
}

/// In-process channel store backing one session.
///
/// Clones share the same store; hand one clone to the host engine (as the
/// `HostChannel` value) and one to each client.
#[derive(Clone)]
pub struct InMemoryChannel {
    core: Arc<Mutex<ChannelCore>>,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Mutex::new(ChannelCore {
                message_log: Vec::new(),
                message_subs: Vec::new(),
                snapshot: None,
                host_phase: None,
                snapshot_subs: Vec::new(),
                roster: Roster::new(),
                roster_subs: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChannelCore>, ChannelError> {
        self.core.lock().map_err(|_| ChannelError::Unavailable)
    }

    /// Appends raw bytes to the message log, bypassing encoding. This is the
    /// wire-level entry a real transport would use; tests feed it garbage to
    /// exercise the host's fallible decode.
    pub fn append_raw(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        let mut core = self.lock()?;
        core.message_log.push(bytes.clone());
        core.message_subs.retain(|tx| tx.send(bytes.clone()).is_ok());
        Ok(())
    }

    /// Number of messages ever appended; for diagnostics and tests.
    pub fn message_count(&self) -> usize {
        self.lock().map(|core| core.message_log.len()).unwrap_or(0)
    }
}

impl ClientChannel for InMemoryChannel {
    fn append_message(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let bytes = envelope.encode()?;
        self.append_raw(bytes)
    }

    fn subscribe_snapshot(&self) -> mpsc::UnboundedReceiver<Snapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut core) = self.lock() {
            core.snapshot_subs.push(tx);
        }
        rx
    }

    fn fetch_snapshot(&self) -> Result<Option<Snapshot>, ChannelError> {
        Ok(self.lock()?.snapshot.clone())
    }

    fn update_participant(&self, id: Uuid, patch: &ParticipantPatch) -> Result<(), ChannelError> {
        update_participant_impl(self, id, patch)
    }

    fn subscribe_roster(&self) -> mpsc::UnboundedReceiver<RosterEvent> {
        subscribe_roster_impl(self)
    }

    fn fetch_roster(&self) -> Result<Vec<Participant>, ChannelError> {
        fetch_roster_impl(self)
    }

    fn fetch_host_phase(&self) -> Result<Option<String>, ChannelError> {
        Ok(self.lock()?.host_phase.clone())
    }
}

impl HostChannel for InMemoryChannel {
    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut core) = self.lock() {
            core.message_subs.push(tx);
        }
        rx
    }

    fn publish_snapshot(
        &self,
        snapshot: &Snapshot,
        host_phase: &str,
    ) -> Result<(), ChannelError> {
        let mut core = self.lock()?;
        core.snapshot = Some(snapshot.clone());
        core.host_phase = Some(host_phase.to_string());
        core.snapshot_subs
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
        Ok(())
    }

    fn update_participant(&self, id: Uuid, patch: &ParticipantPatch) -> Result<(), ChannelError> {
        update_participant_impl(self, id, patch)
    }

    fn subscribe_roster(&self) -> mpsc::UnboundedReceiver<RosterEvent> {
        subscribe_roster_impl(self)
    }

    fn fetch_roster(&self) -> Result<Vec<Participant>, ChannelError> {
        fetch_roster_impl(self)
    }
}

fn update_participant_impl(
    channel: &InMemoryChannel,
    id: Uuid,
    patch: &ParticipantPatch,
) -> Result<(), ChannelError> {
    let mut core = channel.lock()?;
    let joined = !core.roster.contains(id);
    let merged = core.roster.upsert(id, patch).clone();
    let event = if joined {
        RosterEvent::Joined(merged)
    } else {
        RosterEvent::Updated(merged)
    };
    core.roster_subs.retain(|tx| tx.send(event.clone()).is_ok());
    Ok(())
}

fn subscribe_roster_impl(channel: &InMemoryChannel) -> mpsc::UnboundedReceiver<RosterEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Ok(mut core) = channel.lock() {
        core.roster_subs.push(tx);
    }
    rx
}

fn fetch_roster_impl(channel: &InMemoryChannel) -> Result<Vec<Participant>, ChannelError> {
    Ok(channel.lock()?.roster.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ClientMessage;
    use crate::phase::Phase;

    #[tokio::test]
    async fn test_messages_fan_to_host_subscription() {
        let channel = InMemoryChannel::new();
        let mut rx = HostChannel::subscribe_messages(&channel);

        let envelope = Envelope::new(
            Uuid::new_v4(),
            ClientMessage::Caption {
                text: "a likely story".to_string(),
            },
        );
        channel.append_message(&envelope).unwrap();

        let bytes = rx.recv().await.unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
        assert_eq!(channel.message_count(), 1);
    }

    #[tokio::test]
    async fn test_raw_garbage_reaches_host_but_fails_decode() {
        let channel = InMemoryChannel::new();
        let mut rx = HostChannel::subscribe_messages(&channel);

        channel.append_raw(vec![0xde, 0xad, 0xbe, 0xef]).unwrap();
        let bytes = rx.recv().await.unwrap();
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_publish_updates_record_and_subscribers() {
        let channel = InMemoryChannel::new();
        let mut rx = channel.subscribe_snapshot();

        assert_eq!(channel.fetch_snapshot().unwrap(), None);

        let mut snapshot = Snapshot::new();
        snapshot.seq = 3;
        snapshot.phase = Phase::WritingPrompts;
        channel.publish_snapshot(&snapshot, "WritingPrompts").unwrap();

        assert_eq!(rx.recv().await.unwrap().seq, 3);
        assert_eq!(channel.fetch_snapshot().unwrap().unwrap().seq, 3);
        assert_eq!(
            channel.fetch_host_phase().unwrap().as_deref(),
            Some("WritingPrompts")
        );
    }

    #[tokio::test]
    async fn test_roster_events_distinguish_join_from_update() {
        let channel = InMemoryChannel::new();
        let mut rx = ClientChannel::subscribe_roster(&channel);
        let id = Uuid::new_v4();

        ClientChannel::update_participant(&channel, id, &ParticipantPatch::handle("ada")).unwrap();
        ClientChannel::update_participant(&channel, id, &ParticipantPatch::phase(Phase::Waiting))
            .unwrap();

        match rx.recv().await.unwrap() {
            RosterEvent::Joined(p) => assert_eq!(p.handle.as_deref(), Some("ada")),
            other => panic!("expected join, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RosterEvent::Updated(p) => {
                // The merged record carries both the old handle and new phase.
                assert_eq!(p.handle.as_deref(), Some("ada"));
                assert_eq!(p.phase, Phase::Waiting);
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_roster_returns_merged_records() {
        let channel = InMemoryChannel::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        ClientChannel::update_participant(&channel, a, &ParticipantPatch::handle("ada")).unwrap();
        ClientChannel::update_participant(&channel, b, &ParticipantPatch::handle("bob")).unwrap();
        ClientChannel::update_participant(&channel, a, &ParticipantPatch::avatar("crab")).unwrap();

        let roster = ClientChannel::fetch_roster(&channel).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].handle.as_deref(), Some("ada"));
        assert_eq!(roster[0].avatar.as_deref(), Some("crab"));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let channel = InMemoryChannel::new();
        let rx = channel.subscribe_snapshot();
        drop(rx);

        // Publishing after the subscriber went away must not error.
        channel.publish_snapshot(&Snapshot::new(), "Lobby").unwrap();
        channel.publish_snapshot(&Snapshot::new(), "Lobby").unwrap();
    }
}
