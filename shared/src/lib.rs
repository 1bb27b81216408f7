//! Types and logic shared by the host and client sides of a session.
//!
//! A session is coordinated by one authoritative host device talking to any
//! number of client devices through a message channel: clients append
//! messages to a host-visible log, the host folds them into the canonical
//! game-state snapshot and broadcasts the whole snapshot back. This crate
//! holds everything both sides must agree on:
//!
//! - [`phase`] — the round state machine and its legal transitions
//! - [`participant`] — player records and the merged roster
//! - [`message`] — the closed message union and its wire envelope
//! - [`snapshot`] — the broadcast game state, scores included
//! - [`timer`] — the serializable phase deadline and one-shot arming
//! - [`variant`] — the per-game-variant capability registry
//! - [`channel`] — the transport capability traits and an in-memory store
//! - [`generate`] — the generation-service seam

pub mod channel;
pub mod generate;
pub mod message;
pub mod participant;
pub mod phase;
pub mod snapshot;
pub mod timer;
pub mod variant;

pub use channel::{ChannelError, ClientChannel, HostChannel, InMemoryChannel, RosterEvent};
pub use generate::{EchoGenerator, GenerationError, GenerationService};
pub use message::{ClientMessage, DecodeError, Envelope, Generation};
pub use participant::{Participant, ParticipantPatch, Roster};
pub use phase::Phase;
pub use snapshot::{Caption, Score, Snapshot, Vote};
pub use timer::{now_ms, TimerHandle, TimerState};
pub use variant::{
    choose_list_prefix, variant_spec, GenerationRequest, VariantKind, VariantSpec, LIST_PREFIXES,
};
