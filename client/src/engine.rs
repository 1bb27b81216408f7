//! The client engine: user intents in, reconciled snapshots out.
//!
//! A client never mutates the shared snapshot; everything it wants to say
//! goes through the message log or its own roster record, and everything it
//! learns arrives as a host broadcast. The engine folds both subscriptions
//! and the local phase timer into one event stream for the presentation
//! layer.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    choose_list_prefix, variant_spec, ChannelError, ClientChannel, ClientMessage, Envelope,
    GenerationError, GenerationService, Participant, ParticipantPatch, Phase, Roster, RosterEvent,
    Snapshot, TimerHandle, VariantKind, VariantSpec,
};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// What the presentation layer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The room moved to a new phase.
    PhaseEntered(Phase),
    /// New snapshot, same phase (someone submitted, scores moved, ...).
    SnapshotUpdated,
    /// A participant joined or changed (handle, avatar, done/working state).
    RosterChanged,
    /// The local countdown for this phase ran out. Display only; the host
    /// drives the actual transition.
    TimerElapsed(Phase),
}

/// One non-host device in a session.
pub struct ClientEngine<C: ClientChannel, G: GenerationService> {
    id: Uuid,
    channel: C,
    generator: G,
    sync: crate::sync::ClientSync,
    roster: Roster,
    local_phase: Phase,
    variant: &'static VariantSpec,
    list_prefix: &'static str,
    last_error: Option<String>,
    rng: StdRng,

    snapshot_rx: mpsc::UnboundedReceiver<Snapshot>,
    roster_rx: mpsc::UnboundedReceiver<RosterEvent>,
    timer: TimerHandle,
    timer_rx: mpsc::UnboundedReceiver<Phase>,
}

impl<C: ClientChannel, G: GenerationService> ClientEngine<C, G> {
    /// Joins a session: subscribes to broadcasts, announces this player's
    /// record, then performs the one-time catch-up reads that make mid-game
    /// join and rejoin work.
    pub fn join(
        channel: C,
        generator: G,
        variant: VariantKind,
        handle: &str,
        avatar: Option<&str>,
    ) -> Result<Self, ClientError> {
        Self::join_with_id(Uuid::new_v4(), channel, generator, variant, handle, avatar)
    }

    pub fn join_with_id(
        id: Uuid,
        channel: C,
        generator: G,
        variant: VariantKind,
        handle: &str,
        avatar: Option<&str>,
    ) -> Result<Self, ClientError> {
        // Subscribe before announcing ourselves so no event can fall into
        // the gap between the catch-up read and the live stream.
        let snapshot_rx = channel.subscribe_snapshot();
        let roster_rx = channel.subscribe_roster();
        let (timer, timer_rx) = TimerHandle::new();
        let mut rng = StdRng::from_entropy();

        let mut engine = Self {
            id,
            channel,
            generator,
            sync: crate::sync::ClientSync::new(),
            roster: Roster::new(),
            local_phase: Phase::Lobby,
            variant: variant_spec(variant),
            list_prefix: choose_list_prefix(&mut rng),
            last_error: None,
            rng,
            snapshot_rx,
            roster_rx,
            timer,
            timer_rx,
        };

        let mut patch = ParticipantPatch::handle(handle);
        patch.avatar = avatar.map(str::to_string);
        patch.phase = Some(Phase::Lobby);
        engine.roster.upsert(id, &patch);
        engine.channel.update_participant(id, &patch)?;
        info!("joined as {} ({})", handle, id);

        // Catch-up reads; both funnel through the same reconciliation the
        // live subscriptions use.
        for record in engine.channel.fetch_roster()? {
            engine
                .roster
                .upsert(record.id, &ParticipantPatch::from_record(&record));
        }
        if let Some(snapshot) = engine.channel.fetch_snapshot()? {
            engine.reconcile(snapshot);
        }

        Ok(engine)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The reconciled shared state.
    pub fn snapshot(&self) -> &Snapshot {
        self.sync.snapshot()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// This player's own phase (`Waiting` after a submission).
    pub fn phase(&self) -> Phase {
        self.local_phase
    }

    pub fn variant(&self) -> &'static VariantSpec {
        self.variant
    }

    /// The list-prompt stem for this writing phase, if the variant has one.
    pub fn list_prefix(&self) -> Option<&'static str> {
        (self.variant.kind == VariantKind::List).then_some(self.list_prefix)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether this player authored the generation on display. The
    /// presentation layer uses this to keep the author from captioning or
    /// voting on their own work.
    pub fn is_current_author(&self) -> bool {
        self.snapshot()
            .current_generation()
            .map(|g| g.author == self.id)
            .unwrap_or(false)
    }

    /// Text form of the generation on display.
    pub fn render_current_generation(&self) -> Option<String> {
        self.snapshot()
            .current_generation()
            .map(|g| self.variant.render_generation(g))
    }

    /// Waits for the next event worth showing. Returns `None` once the
    /// session's broadcasts are gone.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            tokio::select! {
                maybe_snapshot = self.snapshot_rx.recv() => match maybe_snapshot {
                    Some(snapshot) => {
                        if let Some(event) = self.reconcile(snapshot) {
                            return Some(event);
                        }
                        // Stale duplicate; keep waiting.
                    }
                    None => return None,
                },
                Some(event) = self.roster_rx.recv() => {
                    let record = event.participant();
                    self.roster
                        .upsert(record.id, &ParticipantPatch::from_record(record));
                    return Some(ClientEvent::RosterChanged);
                },
                Some(phase) = self.timer_rx.recv() => {
                    debug!("local countdown for {} elapsed", phase);
                    return Some(ClientEvent::TimerElapsed(phase));
                },
                else => return None,
            }
        }
    }

    /// The shared reconciliation routine; the order matters:
    /// sequence-dedup, then phase bookkeeping, then wholesale overwrite,
    /// then timer re-arm.
    fn reconcile(&mut self, incoming: Snapshot) -> Option<ClientEvent> {
        match self.sync.apply(incoming) {
            crate::sync::Applied::Stale => None,
            crate::sync::Applied::Updated { phase_change } => {
                if let Some(phase) = phase_change {
                    self.set_own_phase(phase);
                }
                let snapshot = self.sync.snapshot();
                self.timer.arm(&snapshot.timer, snapshot.phase);
                Some(match phase_change {
                    Some(phase) => ClientEvent::PhaseEntered(phase),
                    None => ClientEvent::SnapshotUpdated,
                })
            }
        }
    }

    /// Hands the prompt to the generation service. On failure the player
    /// drops back into the writing phase with a user-visible message; the
    /// host never hears about it.
    pub fn submit_generation(&mut self, prompt: &str) -> Result<(), ClientError> {
        self.last_error = None;
        self.set_own_phase(Phase::Waiting);

        let request = self.variant.build_request(prompt, self.list_prefix());
        match self.generator.request(self.id, &request) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_own_phase(Phase::WritingPrompts);
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Appends a lie for the generation on display.
    pub fn submit_caption(&mut self, text: &str) -> Result<(), ClientError> {
        self.set_own_phase(Phase::Waiting);
        self.append(ClientMessage::Caption {
            text: text.to_string(),
        })
    }

    /// Accuses `accused` of having authored the true prompt.
    pub fn submit_vote(&mut self, accused: Uuid) -> Result<(), ClientError> {
        self.set_own_phase(Phase::Waiting);
        self.append(ClientMessage::Vote { accused })
    }

    fn append(&mut self, body: ClientMessage) -> Result<(), ClientError> {
        let envelope = Envelope::new(self.id, body);
        if let Err(e) = self.channel.append_message(&envelope) {
            // Not retried; the quorum simply stays short until the phase
            // timer forces progress.
            warn!("message send failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Updates this player's own phase, locally and on their roster record.
    fn set_own_phase(&mut self, phase: Phase) {
        if self.local_phase == phase {
            return;
        }
        self.local_phase = phase;
        if phase == Phase::WritingPrompts && self.variant.kind == VariantKind::List {
            self.list_prefix = choose_list_prefix(&mut self.rng);
        }
        let patch = ParticipantPatch::phase(phase);
        self.roster.upsert(self.id, &patch);
        if let Err(e) = self.channel.update_participant(self.id, &patch) {
            warn!("could not publish own phase: {}", e);
        }
    }

    /// The participants still working on the current phase, for the
    /// "done / still working" display.
    pub fn still_working(&self) -> Vec<&Participant> {
        self.roster
            .iter()
            .filter(|p| p.phase != Phase::Waiting)
            .collect()
    }
}
