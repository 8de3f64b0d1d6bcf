//! Replication
//!
//! The authority publishes full `Patch` snapshots; read-only `MatchReplica`s
//! apply them in sequence order. Each patch carries a SHA-256 over its
//! contents so a replica can tell whether it converged.

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::game::board::TileId;
use crate::game::state::{MatchPhase, PlayerId, PlayerState, TurnPhase};
use crate::game::turn::TurnCursor;

/// Replicated view of one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// Owning player
    pub owner: PlayerId,
    /// Current tile
    pub tile: TileId,
    /// Essence pool
    pub essence: i32,
    /// Mid-movement
    pub moving: bool,
}

impl TokenSnapshot {
    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(&self.owner.0);
        hasher.update_u32(self.tile.0);
        hasher.update_i32(self.essence);
        hasher.update_bool(self.moving);
    }
}

/// Full snapshot of replicated match state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Monotonic patch number
    pub sequence: u64,
    /// Coordinator tick the patch was taken on
    pub tick: u64,
    /// Turn cursor
    pub cursor: TurnCursor,
    /// Turn phase
    pub turn_phase: TurnPhase,
    /// Match phase
    pub phase: MatchPhase,
    /// Players in turn order
    pub players: Vec<PlayerState>,
    /// Tokens in turn order
    pub tokens: Vec<TokenSnapshot>,
    /// Hash over everything above except `tick`
    pub state_hash: StateHash,
}

impl Patch {
    /// Build a patch and stamp its hash.
    pub fn new(
        sequence: u64,
        tick: u64,
        cursor: TurnCursor,
        turn_phase: TurnPhase,
        phase: MatchPhase,
        players: Vec<PlayerState>,
        tokens: Vec<TokenSnapshot>,
    ) -> Self {
        let mut patch = Self {
            sequence,
            tick,
            cursor,
            turn_phase,
            phase,
            players,
            tokens,
            state_hash: [0; 32],
        };
        patch.state_hash = patch.compute_hash();
        patch
    }

    /// Hash of the patch contents.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.sequence, |h| {
            h.update_u64(self.cursor.index as u64);
            h.update_bool(self.cursor.repeat);
            h.update_bool(self.cursor.has_rolled);
            h.update_u32(self.cursor.cards_played);
            h.update_u32(self.cursor.turn_number);
            h.update_bool(self.cursor.ended);

            h.update_u8(self.turn_phase as u8);
            match self.phase {
                MatchPhase::Playing => h.update_u8(0),
                MatchPhase::Ended { winner } => {
                    h.update_u8(1);
                    h.update_uuid(&winner.unwrap_or_default().0);
                }
            }

            h.update_u32(self.players.len() as u32);
            for player in &self.players {
                player.hash_into(h);
            }
            h.update_u32(self.tokens.len() as u32);
            for token in &self.tokens {
                token.hash_into(h);
            }
        })
    }

    /// Stored hash matches contents.
    pub fn verify(&self) -> bool {
        self.state_hash == self.compute_hash()
    }

    /// Serialize to bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from bincode.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Hash as hex, for logs and the wire.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.state_hash)
    }
}

/// Replica failures.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// Patch contents do not match its hash.
    #[error("Patch {sequence} failed hash verification")]
    HashMismatch {
        /// Offending patch
        sequence: u64,
    },

    /// Binary patch could not be decoded.
    #[error("Patch decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Read-only observer state.
#[derive(Clone, Debug, Default)]
pub struct MatchReplica {
    latest: Option<Patch>,
}

impl MatchReplica {
    /// Replica that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a patch. Returns `Ok(false)` for a stale or duplicate sequence,
    /// which is ignored.
    pub fn apply(&mut self, patch: Patch) -> Result<bool, ReplicaError> {
        if let Some(current) = &self.latest {
            if patch.sequence <= current.sequence {
                debug!("Ignoring stale patch {} (have {})", patch.sequence, current.sequence);
                return Ok(false);
            }
        }

        if !patch.verify() {
            warn!("Rejecting patch {}: hash mismatch", patch.sequence);
            return Err(ReplicaError::HashMismatch { sequence: patch.sequence });
        }

        self.latest = Some(patch);
        Ok(true)
    }

    /// Decode and apply a bincode patch.
    pub fn apply_bytes(&mut self, data: &[u8]) -> Result<bool, ReplicaError> {
        let patch = Patch::from_bytes(data)?;
        self.apply(patch)
    }

    /// Last applied sequence.
    pub fn sequence(&self) -> Option<u64> {
        self.latest.as_ref().map(|p| p.sequence)
    }

    /// Last applied hash.
    pub fn state_hash(&self) -> Option<StateHash> {
        self.latest.as_ref().map(|p| p.state_hash)
    }

    /// Last applied snapshot.
    pub fn snapshot(&self) -> Option<&Patch> {
        self.latest.as_ref()
    }

    /// Players as last replicated.
    pub fn players(&self) -> &[PlayerState] {
        self.latest.as_ref().map(|p| p.players.as_slice()).unwrap_or(&[])
    }

    /// Token of a player as last replicated.
    pub fn token(&self, player: &PlayerId) -> Option<&TokenSnapshot> {
        self.latest.as_ref()?.tokens.iter().find(|t| t.owner == *player)
    }

    /// Player whose turn it is, as last replicated.
    pub fn current_player(&self) -> Option<PlayerId> {
        let patch = self.latest.as_ref()?;
        patch.players.get(patch.cursor.index).map(|p| p.id)
    }

    /// Match is over, as last replicated.
    pub fn is_ended(&self) -> bool {
        matches!(
            self.latest.as_ref().map(|p| p.phase),
            Some(MatchPhase::Ended { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::RosterEntry;

    fn patch(sequence: u64, essence: i32) -> Patch {
        let id = PlayerId::new([1; 16]);
        let player = PlayerState::new(RosterEntry::new(id, "A"), 5);
        let token = TokenSnapshot { owner: id, tile: TileId(2), essence, moving: false };
        Patch::new(
            sequence,
            sequence * 10,
            TurnCursor::default(),
            TurnPhase::AwaitingAction,
            MatchPhase::Playing,
            vec![player],
            vec![token],
        )
    }

    #[test]
    fn test_apply_in_order() {
        let mut replica = MatchReplica::new();
        assert!(replica.apply(patch(1, 10)).unwrap());
        assert!(replica.apply(patch(2, 8)).unwrap());

        assert_eq!(replica.sequence(), Some(2));
        assert_eq!(replica.token(&PlayerId::new([1; 16])).unwrap().essence, 8);
        assert_eq!(replica.current_player(), Some(PlayerId::new([1; 16])));
    }

    #[test]
    fn test_stale_patch_ignored() {
        let mut replica = MatchReplica::new();
        replica.apply(patch(5, 3)).unwrap();

        assert!(!replica.apply(patch(4, 9)).unwrap());
        assert!(!replica.apply(patch(5, 9)).unwrap());
        assert_eq!(replica.token(&PlayerId::new([1; 16])).unwrap().essence, 3);
    }

    #[test]
    fn test_tampered_patch_rejected() {
        let mut replica = MatchReplica::new();
        let mut bad = patch(1, 10);
        bad.tokens[0].essence = 99;

        assert!(matches!(replica.apply(bad), Err(ReplicaError::HashMismatch { sequence: 1 })));
        assert_eq!(replica.sequence(), None);
    }

    #[test]
    fn test_hash_ignores_tick() {
        let a = patch(1, 10);
        let mut b = a.clone();
        b.tick = 999;
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_bincode_patch() {
        let sent = patch(3, 7);
        let bytes = sent.to_bytes().unwrap();

        let mut replica = MatchReplica::new();
        assert!(replica.apply_bytes(&bytes).unwrap());
        assert_eq!(replica.snapshot(), Some(&sent));
        assert!(matches!(replica.apply_bytes(&[0xff]), Err(ReplicaError::Decode(_))));
    }
}
