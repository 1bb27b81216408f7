//! The authoritative host side of a session.
//!
//! One device owns a session's canonical state. Incoming client messages are
//! folded into the snapshot by pure reducers ([`reducer`]), quorum and timer
//! expiry drive the round state machine forward, the scoring engine
//! ([`scoring`]) settles each generation's vote set, and the engine
//! ([`engine`]) broadcasts the whole snapshot after every accepted input.
//!
//! Host authority is a capability, not a flag: the engine takes ownership of
//! the channel's host half at session creation and nothing else can write
//! the shared snapshot.

pub mod engine;
pub mod reducer;
pub mod scoring;
pub mod session;

pub use engine::{HostConfig, HostEngine, HostError, HostHandle, TimerConfig};
pub use reducer::{Outcome, Reduction};
pub use scoring::{score_votes, LIE_POINTS, TRUTH_POINTS};
pub use session::{make_join_code, Session};
