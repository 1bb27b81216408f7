//! The closed message union and its wire envelope.
//!
//! Everything a client can say to the host is one of these variants; the
//! envelope is decoded at the channel boundary with a fallible step so that
//! unknown shapes are rejected instead of applied blindly.

use crate::variant::VariantKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One piece of user-seeded content produced during `WritingPrompts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub author: Uuid,
    pub kind: VariantKind,
    /// The true prompt; later inserted among the lies for voting.
    pub prompt: String,
    pub text: Option<String>,
    pub url: Option<String>,
    pub list_prefix: Option<String>,
}

/// Everything a client may append to the message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// A completed generation, enqueued by the generation service.
    Generation(Generation),
    /// A lie written for the current generation.
    Caption { text: String },
    /// An accusation that `accused` authored the true prompt.
    Vote { accused: Uuid },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Generation(_) => "Generation",
            ClientMessage::Caption { .. } => "Caption",
            ClientMessage::Vote { .. } => "Vote",
        }
    }
}

/// What actually crosses the message log: sender plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: Uuid,
    pub body: ClientMessage,
}

#[derive(Debug, Error)]
#[error("could not decode message envelope: {0}")]
pub struct DecodeError(#[from] bincode::Error);

#[derive(Debug, Error)]
#[error("could not encode message envelope: {0}")]
pub struct EncodeError(#[from] bincode::Error);

impl Envelope {
    pub fn new(sender: Uuid, body: ClientMessage) -> Self {
        Self { sender, body }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(bincode::serialize(self)?)
    }

    /// Fallible decode at the channel boundary; unknown shapes are errors,
    /// never silently-accepted payloads.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
