//! The non-authoritative client side of a session.
//!
//! A client device subscribes to the host's snapshot broadcasts, reconciles
//! them into a local copy ([`sync`]), and turns user intents into messages
//! on the session log ([`engine`]). It never writes the shared snapshot;
//! that separation is what keeps the host authoritative.
//!
//! Reconciliation is deliberately dumb: discard anything whose sequence
//! number is not newer than the last applied one, then overwrite the local
//! copy wholesale. A phone that slept through half a round catches up with
//! one fetch plus whatever broadcasts follow.

pub mod engine;
pub mod sync;

pub use engine::{ClientEngine, ClientError, ClientEvent};
pub use sync::{Applied, ClientSync};
