//! Participant records and the merged roster.
//!
//! Player records arrive from three sources: a local optimistic update, a
//! one-time roster fetch, and live roster change events. All three funnel
//! through [`Roster::upsert`], which merges field-by-field so that
//! concurrently-arriving partial updates ("set handle" vs "set avatar")
//! never clobber each other. Records are never hard-deleted during a
//! session.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A joined player and their merged metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub handle: Option<String>,
    pub avatar: Option<String>,
    /// Mirrors the round state machine; used to show "done / still working".
    pub phase: Phase,
}

impl Participant {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            handle: None,
            avatar: None,
            phase: Phase::Lobby,
        }
    }

    /// Handle if one was ever set, otherwise a short form of the id.
    pub fn display_name(&self) -> String {
        match &self.handle {
            Some(h) => h.clone(),
            None => {
                let id = self.id.simple().to_string();
                format!("anon-{}", &id[..6])
            }
        }
    }

    fn merge(&mut self, patch: &ParticipantPatch) {
        if let Some(handle) = &patch.handle {
            self.handle = Some(handle.clone());
        }
        if let Some(avatar) = &patch.avatar {
            self.avatar = Some(avatar.clone());
        }
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
    }
}

/// A partial participant update; unset fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantPatch {
    pub handle: Option<String>,
    pub avatar: Option<String>,
    pub phase: Option<Phase>,
}

impl ParticipantPatch {
    /// A patch carrying every field of an already-merged record; used to
    /// mirror a store record into a local directory.
    pub fn from_record(record: &Participant) -> Self {
        Self {
            handle: record.handle.clone(),
            avatar: record.avatar.clone(),
            phase: Some(record.phase),
        }
    }

    pub fn handle(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            ..Self::default()
        }
    }

    pub fn avatar(avatar: impl Into<String>) -> Self {
        Self {
            avatar: Some(avatar.into()),
            ..Self::default()
        }
    }

    pub fn phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }
}

/// The merged player list, kept in join order so quorum counting and
/// display stay deterministic across devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    players: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Participant> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.players.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.players.iter().map(|p| p.id)
    }

    /// Merges a partial update into the record for `id`, inserting a fresh
    /// record on first sight. Returns the merged record.
    ///
    /// Inserting rather than replacing is what makes the directory safe
    /// against the same logical join arriving from more than one source.
    pub fn upsert(&mut self, id: Uuid, patch: &ParticipantPatch) -> &Participant {
        let idx = match self.players.iter().position(|p| p.id == id) {
            Some(idx) => idx,
            None => {
                self.players.push(Participant::new(id));
                self.players.len() - 1
            }
        };
        self.players[idx].merge(patch);
        &self.players[idx]
    }
}
