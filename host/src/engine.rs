//! The host engine: the one writer of the authoritative snapshot.
//!
//! The engine owns the in-memory snapshot and the host-side channel
//! capability, applies the pure reducers to every input, then performs the
//! side effects: stamping a fresh sequence number, arming the phase timer,
//! and pushing the entire snapshot (never a diff) back through the channel.
//! Each accepted input causes at most one broadcast.
//!
//! Everything runs on a single `tokio::select!` loop, so reducer
//! applications are serialized and the snapshot can never see a
//! read-modify-write race on this device.

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    now_ms, Envelope, HostChannel, ParticipantPatch, Phase, Roster, RosterEvent, Snapshot,
    TimerHandle, TimerState,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::reducer::{self, Outcome, Reduction};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host is no longer running")]
    Stopped,
}

/// Deadlines for the timed phases, plus the offsets every deadline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub enabled: bool,
    pub writing: Duration,
    pub lies: Duration,
    pub voting: Duration,
    /// Small lead before a phase's countdown starts.
    pub start_delay: Duration,
    /// Subtracted from the serialized deadline to absorb store-propagation
    /// latency.
    pub grace: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            writing: Duration::from_secs(45),
            lies: Duration::from_secs(45),
            voting: Duration::from_secs(30),
            start_delay: Duration::from_millis(500),
            grace: Duration::from_secs(3),
        }
    }
}

impl TimerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn duration_for(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::WritingPrompts => Some(self.writing),
            Phase::CreatingLies => Some(self.lies),
            Phase::Voting => Some(self.voting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub rounds: u32,
    pub timer: TimerConfig,
    /// `Some(delay)` continues past the scoring display automatically;
    /// `None` waits for an explicit [`HostHandle::continue_round`].
    pub auto_continue: Option<Duration>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            timer: TimerConfig::default(),
            auto_continue: None,
        }
    }
}

/// Host actions issued by the owning device's presentation layer.
#[derive(Debug)]
pub enum HostCommand {
    /// Start the game; `host_handle` joins the host as a player too.
    StartGame { host_handle: Option<String> },
    /// Advance past the scoring display.
    Continue,
    Shutdown,
}

/// The sending side of the host's command channel.
#[derive(Debug, Clone)]
pub struct HostHandle {
    cmd_tx: mpsc::UnboundedSender<HostCommand>,
}

impl HostHandle {
    pub fn start_game(&self, host_handle: Option<String>) -> Result<(), HostError> {
        self.send(HostCommand::StartGame { host_handle })
    }

    pub fn continue_round(&self) -> Result<(), HostError> {
        self.send(HostCommand::Continue)
    }

    pub fn shutdown(&self) -> Result<(), HostError> {
        self.send(HostCommand::Shutdown)
    }

    fn send(&self, cmd: HostCommand) -> Result<(), HostError> {
        self.cmd_tx.send(cmd).map_err(|_| HostError::Stopped)
    }
}

/// The authoritative engine for one session.
///
/// Constructed once at session creation; taking the `HostChannel` value by
/// ownership is what makes the write capability exclusive. There is no way
/// to hand host authority to another device.
pub struct HostEngine<C: HostChannel> {
    session: Session,
    config: HostConfig,
    channel: C,
    snapshot: Snapshot,
    roster: Roster,
    rng: StdRng,

    msg_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    roster_rx: mpsc::UnboundedReceiver<RosterEvent>,
    timer: TimerHandle,
    timer_rx: mpsc::UnboundedReceiver<Phase>,
    cmd_tx: mpsc::UnboundedSender<HostCommand>,
    cmd_rx: mpsc::UnboundedReceiver<HostCommand>,
}

impl<C: HostChannel> HostEngine<C> {
    pub fn new(session: Session, channel: C, config: HostConfig) -> (Self, HostHandle) {
        Self::with_rng(session, channel, config, StdRng::from_entropy())
    }

    pub fn with_rng(
        session: Session,
        channel: C,
        config: HostConfig,
        rng: StdRng,
    ) -> (Self, HostHandle) {
        let msg_rx = channel.subscribe_messages();
        let roster_rx = channel.subscribe_roster();
        let (timer, timer_rx) = TimerHandle::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = HostHandle {
            cmd_tx: cmd_tx.clone(),
        };

        let engine = Self {
            session,
            config,
            channel,
            snapshot: Snapshot::new(),
            roster: Roster::new(),
            rng,
            msg_rx,
            roster_rx,
            timer,
            timer_rx,
            cmd_tx,
            cmd_rx,
        };
        (engine, handle)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Runs until the terminal phase or a shutdown command; returns the
    /// final snapshot.
    pub async fn run(mut self) -> Snapshot {
        info!(
            "hosting session {} (code {})",
            self.session.id, self.session.join_code
        );

        // One-time roster read, in case anyone joined between session
        // creation and this loop starting.
        match self.channel.fetch_roster() {
            Ok(records) => {
                for record in records {
                    self.roster
                        .upsert(record.id, &ParticipantPatch::from_record(&record));
                }
            }
            Err(e) => warn!("could not fetch the initial roster: {}", e),
        }

        // Seed the shared record so a client fetching right after joining
        // sees the lobby instead of nothing.
        self.publish();

        loop {
            tokio::select! {
                maybe_bytes = self.msg_rx.recv() => match maybe_bytes {
                    Some(bytes) => self.handle_message_bytes(&bytes),
                    None => {
                        warn!("message subscription closed; stopping host");
                        break;
                    }
                },
                Some(event) = self.roster_rx.recv() => self.handle_roster_event(event),
                Some(fired) = self.timer_rx.recv() => self.handle_timer_fired(fired),
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(HostCommand::Shutdown) | None => {
                        info!("session {} shutting down", self.session.join_code);
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                else => break,
            }

            if self.snapshot.phase.is_terminal() {
                info!("session {} finished", self.session.join_code);
                break;
            }
        }

        self.snapshot
    }

    fn handle_message_bytes(&mut self, bytes: &[u8]) {
        match Envelope::decode(bytes) {
            Ok(envelope) => {
                debug!(
                    "applying {} from {}",
                    envelope.body.kind(),
                    envelope.sender
                );
                let reduction =
                    reducer::apply_message(&self.snapshot, &self.roster, &envelope, &mut self.rng);
                self.commit(reduction);
            }
            Err(e) => warn!("rejecting undecodable message: {}", e),
        }
    }

    fn handle_roster_event(&mut self, event: RosterEvent) {
        let record = event.participant();
        if let RosterEvent::Joined(p) = &event {
            info!(
                "participant {} joined session {}",
                p.display_name(),
                self.session.join_code
            );
        }
        self.roster
            .upsert(record.id, &ParticipantPatch::from_record(record));
    }

    fn handle_timer_fired(&mut self, fired: Phase) {
        debug!("phase timer fired for {}", fired);
        let reduction = reducer::apply_timeout(&self.snapshot, &self.roster, fired, &mut self.rng);
        self.commit(reduction);
    }

    fn handle_command(&mut self, cmd: HostCommand) {
        match cmd {
            HostCommand::StartGame { host_handle } => {
                if let Some(handle) = host_handle {
                    // The host plays too: merge locally first (optimistic),
                    // then through the store like any other join.
                    let patch = ParticipantPatch::handle(handle);
                    self.roster.upsert(self.session.owner, &patch);
                    if let Err(e) = self.channel.update_participant(self.session.owner, &patch) {
                        error!("could not publish host player record: {}", e);
                    }
                }
                let reduction = reducer::apply_start(&self.snapshot, &self.roster);
                self.commit(reduction);
            }
            HostCommand::Continue => {
                let reduction = reducer::apply_continue(&self.snapshot, self.config.rounds);
                self.commit(reduction);
            }
            // Shutdown is intercepted by the run loop before it gets here.
            HostCommand::Shutdown => {}
        }
    }

    /// Applies a reduction's side effects: timer arming, sequence stamping,
    /// and the snapshot broadcast.
    fn commit(&mut self, reduction: Reduction) {
        match reduction.outcome {
            Outcome::Ignored => return,
            Outcome::Accumulated => {
                self.snapshot = reduction.snapshot;
            }
            Outcome::Transitioned(next) => {
                self.snapshot = reduction.snapshot;
                info!(
                    "session {}: phase -> {}",
                    self.session.join_code, self.snapshot.phase
                );
                self.arm_phase_timer();
                if next == Phase::Scoring {
                    self.schedule_auto_continue();
                }
            }
            Outcome::PhaseExtended => {
                self.snapshot = reduction.snapshot;
                self.arm_phase_timer();
            }
        }
        self.publish();
    }

    fn arm_phase_timer(&mut self) {
        let phase = self.snapshot.phase;
        let state = match self.config.timer.duration_for(phase) {
            Some(duration) if self.config.timer.enabled => TimerState::armed(
                now_ms(),
                duration,
                self.config.timer.start_delay,
                self.config.timer.grace,
            ),
            _ => TimerState::disabled(),
        };
        self.snapshot.timer = state;
        self.timer.arm(&state, phase);
    }

    fn schedule_auto_continue(&self) {
        if let Some(delay) = self.config.auto_continue {
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // The engine may already be gone; nothing to do then.
                let _ = cmd_tx.send(HostCommand::Continue);
            });
        }
    }

    fn publish(&mut self) {
        self.snapshot.seq += 1;
        self.session.host_phase = self.snapshot.phase.to_string();
        if let Err(e) = self
            .channel
            .publish_snapshot(&self.snapshot, &self.session.host_phase)
        {
            // Logged, not retried: a missed broadcast degrades to "this
            // phase times out eventually", never to a crash.
            error!("could not publish snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        ClientChannel, ClientMessage, Generation, InMemoryChannel, VariantKind,
    };
    use uuid::Uuid;

    fn test_session(rng: &mut StdRng) -> Session {
        Session::new(Uuid::new_v4(), VariantKind::Text, rng)
    }

    fn generation_from(author: Uuid) -> Generation {
        Generation {
            author,
            kind: VariantKind::Text,
            prompt: format!("prompt-{}", author),
            text: Some("something".to_string()),
            url: None,
            list_prefix: None,
        }
    }

    fn join(channel: &InMemoryChannel, handle: &str) -> Uuid {
        let id = Uuid::new_v4();
        ClientChannel::update_participant(channel, id, &ParticipantPatch::handle(handle)).unwrap();
        id
    }

    async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("snapshot stream closed")
    }

    /// Waits for the first broadcast whose room phase is `phase`.
    async fn wait_for_phase(rx: &mut mpsc::UnboundedReceiver<Snapshot>, phase: Phase) -> Snapshot {
        loop {
            let snapshot = next_snapshot(rx).await;
            if snapshot.phase == phase {
                return snapshot;
            }
        }
    }

    fn engine_config() -> HostConfig {
        HostConfig {
            rounds: 1,
            timer: TimerConfig::disabled(),
            auto_continue: None,
        }
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase_per_broadcast() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(5);
        let session = test_session(&mut rng);
        let (engine, handle) =
            HostEngine::with_rng(session, channel.clone(), engine_config(), rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let first = next_snapshot(&mut snaps).await;
        assert_eq!(first.seq, 1);

        join(&channel, "ada");
        join(&channel, "bob");
        handle.start_game(None).unwrap();

        let started = wait_for_phase(&mut snaps, Phase::WritingPrompts).await;
        assert!(started.seq > first.seq);

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_start_seeds_scores_from_roster() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(6);
        let session = test_session(&mut rng);
        let (engine, handle) =
            HostEngine::with_rng(session, channel.clone(), engine_config(), rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let a = join(&channel, "ada");
        let b = join(&channel, "bob");
        let c = join(&channel, "cleo");
        // Let the joins land before starting.
        let _ = next_snapshot(&mut snaps).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start_game(None).unwrap();

        let started = wait_for_phase(&mut snaps, Phase::WritingPrompts).await;
        assert_eq!(started.scores.len(), 3);
        for id in [a, b, c] {
            assert_eq!(started.scores[&id].current, 0);
        }

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_host_can_play_with_a_handle() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(7);
        let session = test_session(&mut rng);
        let owner = session.owner;
        let (engine, handle) =
            HostEngine::with_rng(session, channel.clone(), engine_config(), rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        join(&channel, "ada");
        let _ = next_snapshot(&mut snaps).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start_game(Some("grace".to_string())).unwrap();

        let started = wait_for_phase(&mut snaps, Phase::WritingPrompts).await;
        assert!(started.scores.contains_key(&owner));

        let roster = ClientChannel::fetch_roster(&channel).unwrap();
        assert!(roster
            .iter()
            .any(|p| p.id == owner && p.handle.as_deref() == Some("grace")));

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dropped_without_broadcast() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(8);
        let session = test_session(&mut rng);
        let (engine, handle) =
            HostEngine::with_rng(session, channel.clone(), engine_config(), rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let _ = next_snapshot(&mut snaps).await;
        channel.append_raw(vec![1, 2, 3]).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(snaps.try_recv().is_err());

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_generation_quorum_reaches_creating_lies() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(9);
        let session = test_session(&mut rng);
        let (engine, handle) =
            HostEngine::with_rng(session, channel.clone(), engine_config(), rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let ids = [
            join(&channel, "ada"),
            join(&channel, "bob"),
            join(&channel, "cleo"),
        ];
        let _ = next_snapshot(&mut snaps).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start_game(None).unwrap();
        wait_for_phase(&mut snaps, Phase::WritingPrompts).await;

        for id in ids {
            let envelope = Envelope::new(id, ClientMessage::Generation(generation_from(id)));
            channel.append_message(&envelope).unwrap();
        }

        let lies = wait_for_phase(&mut snaps, Phase::CreatingLies).await;
        assert_eq!(lies.generations.len(), 3);

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_phase_timeout_drives_transition() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(10);
        let session = test_session(&mut rng);
        let config = HostConfig {
            rounds: 1,
            timer: TimerConfig {
                enabled: true,
                writing: Duration::from_millis(200),
                lies: Duration::from_millis(200),
                voting: Duration::from_millis(200),
                start_delay: Duration::ZERO,
                grace: Duration::ZERO,
            },
            auto_continue: None,
        };
        let (engine, handle) = HostEngine::with_rng(session, channel.clone(), config, rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let ids = [join(&channel, "ada"), join(&channel, "bob")];
        let _ = next_snapshot(&mut snaps).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start_game(None).unwrap();
        let started = wait_for_phase(&mut snaps, Phase::WritingPrompts).await;
        assert!(started.timer.enabled);

        // Only one of two players submits; the timer must force the phase.
        let envelope = Envelope::new(
            ids[0],
            ClientMessage::Generation(generation_from(ids[0])),
        );
        channel.append_message(&envelope).unwrap();

        let lies = wait_for_phase(&mut snaps, Phase::CreatingLies).await;
        assert_eq!(lies.generations.len(), 1);

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_continue_advances_past_scoring() {
        let channel = InMemoryChannel::new();
        let mut rng = StdRng::seed_from_u64(11);
        let session = test_session(&mut rng);
        let config = HostConfig {
            rounds: 1,
            timer: TimerConfig::disabled(),
            auto_continue: Some(Duration::from_millis(50)),
        };
        let (engine, handle) = HostEngine::with_rng(session, channel.clone(), config, rng);
        let mut snaps = channel.subscribe_snapshot();
        let task = tokio::spawn(engine.run());

        let ids = [
            join(&channel, "ada"),
            join(&channel, "bob"),
            join(&channel, "cleo"),
        ];
        let _ = next_snapshot(&mut snaps).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.start_game(None).unwrap();
        wait_for_phase(&mut snaps, Phase::WritingPrompts).await;

        for id in ids {
            let envelope = Envelope::new(id, ClientMessage::Generation(generation_from(id)));
            channel.append_message(&envelope).unwrap();
        }

        // Play every generation in the queue; the scoring displays advance
        // on their own, without any explicit continue command.
        for _ in 0..ids.len() {
            let lies = wait_for_phase(&mut snaps, Phase::CreatingLies).await;
            let author = lies.current_generation().unwrap().author;
            let others: Vec<Uuid> = ids.iter().copied().filter(|id| *id != author).collect();

            for other in &others {
                let envelope = Envelope::new(
                    *other,
                    ClientMessage::Caption {
                        text: format!("lie-{}", other),
                    },
                );
                channel.append_message(&envelope).unwrap();
            }
            wait_for_phase(&mut snaps, Phase::Voting).await;

            for other in &others {
                let envelope = Envelope::new(*other, ClientMessage::Vote { accused: author });
                channel.append_message(&envelope).unwrap();
            }
            wait_for_phase(&mut snaps, Phase::Scoring).await;
        }

        let finished = wait_for_phase(&mut snaps, Phase::Finished).await;
        assert_eq!(finished.phase, Phase::Finished);

        let final_snapshot = task.await.unwrap();
        assert_eq!(final_snapshot.phase, Phase::Finished);
        drop(handle);
    }
}
