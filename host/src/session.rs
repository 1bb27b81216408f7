//! Session records and join codes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{Phase, VariantKind};
use uuid::Uuid;

/// Length of the human-readable join code shown in the lobby.
const JOIN_CODE_LEN: usize = 4;

/// Generates a join code of uppercase ASCII letters.
pub fn make_join_code<R: Rng>(rng: &mut R) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| (b'A' + rng.gen_range(0..26)) as char)
        .collect()
}

/// The session (room) record: who owns it, which variant it plays, and the
/// host-phase label kept current for external observability and filtering.
///
/// Created once when a host starts a session; mutated only by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub join_code: String,
    pub owner: Uuid,
    pub variant: VariantKind,
    pub host_phase: String,
}

impl Session {
    pub fn new<R: Rng>(owner: Uuid, variant: VariantKind, rng: &mut R) -> Self {
        Self {
            id: Uuid::new_v4(),
            join_code: make_join_code(rng),
            owner,
            variant,
            host_phase: Phase::Lobby.to_string(),
        }
    }
}
