//! Match State Definitions
//!
//! Ordered roster, per-player counters, the turn cursor and the match phase.
//! Roster order is turn order and never changes after the match starts.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use crate::error::{MatchError, NotFoundKind, SetupError};
use crate::game::cards::Hand;
use crate::game::turn::TurnCursor;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First four bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// One roster entry handed over by the lobby.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Stable identity.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

impl RosterEntry {
    /// Create a roster entry.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player in the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Unique player ID
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Turns completed
    pub turns_taken: u32,

    /// Bonus tiles landed on
    pub buffs_hit: u32,

    /// Penalty tiles landed on
    pub fails_hit: u32,

    /// Out of the match (essence exhausted)
    pub eliminated: bool,

    /// Cards held
    pub hand: Hand,
}

impl PlayerState {
    /// Create a new player with an empty hand.
    pub fn new(entry: RosterEntry, hand_limit: usize) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            turns_taken: 0,
            buffs_hit: 0,
            fails_hit: 0,
            eliminated: false,
            hand: Hand::new(hand_limit),
        }
    }

    /// Hash this player's replicated fields.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(&self.id.0);
        hasher.update_str(&self.name);
        hasher.update_u32(self.turns_taken);
        hasher.update_u32(self.buffs_hit);
        hasher.update_u32(self.fails_hit);
        hasher.update_bool(self.eliminated);
        hasher.update_u32(self.hand.len() as u32);
        for card in self.hand.cards() {
            hasher.update_u32(card.0);
        }
    }
}

// =============================================================================
// PHASES
// =============================================================================

/// What the active turn is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum TurnPhase {
    /// Waiting for the turn-holder to act
    #[default]
    AwaitingAction,
    /// Dice are settling
    Rolling,
    /// Active token is moving
    Moving,
    /// No more turns
    Finished,
}

/// Current phase of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum MatchPhase {
    /// Turns are being played
    #[default]
    Playing,
    /// Match is over
    Ended {
        /// Survivor, if any
        winner: Option<PlayerId>,
    },
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Authoritative match state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchState {
    /// Match identifier
    pub match_id: [u8; 16],

    /// Players in turn order
    pub players: Vec<PlayerState>,

    /// Whose turn it is
    pub cursor: TurnCursor,

    /// What the current turn waits on
    pub turn_phase: TurnPhase,

    /// Match phase
    pub phase: MatchPhase,
}

impl MatchState {
    /// Create state from the lobby roster.
    ///
    /// Fails on an empty roster or a duplicated player id.
    pub fn new(
        match_id: [u8; 16],
        roster: Vec<RosterEntry>,
        hand_limit: usize,
    ) -> Result<Self, SetupError> {
        if roster.is_empty() {
            return Err(SetupError::EmptyRoster);
        }

        let mut players: Vec<PlayerState> = Vec::with_capacity(roster.len());
        for entry in roster {
            if players.iter().any(|p| p.id == entry.id) {
                return Err(SetupError::DuplicatePlayer(entry.id.to_uuid_string()));
            }
            players.push(PlayerState::new(entry, hand_limit));
        }

        Ok(Self {
            match_id,
            players,
            cursor: TurnCursor::default(),
            turn_phase: TurnPhase::AwaitingAction,
            phase: MatchPhase::Playing,
        })
    }

    /// Index of a player in turn order.
    pub fn index_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *id)
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == *id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    /// Like `get_player`, but a miss is a `NotFound` error.
    pub fn require_player(&self, id: &PlayerId) -> Result<&PlayerState, MatchError> {
        self.get_player(id)
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Player, id.to_uuid_string()))
    }

    /// Player at the cursor.
    pub fn current_player(&self) -> Option<&PlayerState> {
        self.players.get(self.cursor.index)
    }

    /// Id of the player at the cursor.
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.current_player().map(|p| p.id)
    }

    /// Players still in the match.
    pub fn active_player_count(&self) -> usize {
        self.players.iter().filter(|p| !p.eliminated).count()
    }

    /// Check if match has ended.
    pub fn is_ended(&self) -> bool {
        matches!(self.phase, MatchPhase::Ended { .. })
    }

    /// Winner once ended.
    pub fn winner(&self) -> Option<PlayerId> {
        match self.phase {
            MatchPhase::Ended { winner } => winner,
            MatchPhase::Playing => None,
        }
    }

    /// Standings: surviving players first, then by turns taken, then roster
    /// order.
    pub fn standings(&self) -> Vec<(PlayerId, u8)> {
        let mut order: Vec<(usize, &PlayerState)> = self.players.iter().enumerate().collect();
        order.sort_by_key(|(idx, p)| (p.eliminated, std::cmp::Reverse(p.turns_taken), *idx));
        order
            .into_iter()
            .enumerate()
            .map(|(place, (_, p))| (p.id, (place + 1) as u8))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: u8) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry::new(PlayerId::new([i; 16]), format!("P{}", i)))
            .collect()
    }

    #[test]
    fn test_empty_roster_rejected() {
        let result = MatchState::new([0; 16], Vec::new(), 5);
        assert!(matches!(result, Err(SetupError::EmptyRoster)));
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let mut entries = roster(2);
        entries.push(RosterEntry::new(PlayerId::new([1; 16]), "Again"));

        let result = MatchState::new([0; 16], entries, 5);
        assert!(matches!(result, Err(SetupError::DuplicatePlayer(_))));
    }

    #[test]
    fn test_roster_order_is_turn_order() {
        let state = MatchState::new([0; 16], roster(3), 5).unwrap();

        assert_eq!(state.cursor.index, 0);
        assert_eq!(state.current_player().unwrap().name, "P0");
        assert_eq!(state.index_of(&PlayerId::new([2; 16])), Some(2));
        assert_eq!(state.active_player_count(), 3);
    }

    #[test]
    fn test_require_player_miss() {
        let state = MatchState::new([0; 16], roster(2), 5).unwrap();
        let err = state.require_player(&PlayerId::new([9; 16])).unwrap_err();
        assert!(matches!(err, MatchError::NotFound { kind: NotFoundKind::Player, .. }));
    }

    #[test]
    fn test_standings_put_survivors_first() {
        let mut state = MatchState::new([0; 16], roster(3), 5).unwrap();
        state.players[0].eliminated = true;
        state.players[2].turns_taken = 4;
        state.players[1].turns_taken = 2;

        let standings = state.standings();
        assert_eq!(standings[0], (PlayerId::new([2; 16]), 1));
        assert_eq!(standings[1], (PlayerId::new([1; 16]), 2));
        assert_eq!(standings[2], (PlayerId::new([0; 16]), 3));
    }

    #[test]
    fn test_player_id_uuid_roundtrip() {
        let id = PlayerId::random();
        let parsed = PlayerId::from_uuid_str(&id.to_uuid_string());
        assert_eq!(parsed, Some(id));
        assert_eq!(id.short().len(), 8);
    }
}
