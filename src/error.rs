//! Match error taxonomy.
//!
//! Every failure the coordinator reports is local and recoverable by the
//! caller: a rejected action, a missed lookup, or the terminal state.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;

/// Why an action was refused by the action gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Requester is not the player at the cursor.
    NotYourTurn,
    /// Dice were already rolled this turn.
    AlreadyRolled,
    /// Card budget for this turn is spent.
    CardBudgetExhausted,
    /// A token is moving or dice are still settling.
    MidMovement,
    /// The match is over.
    MatchEnded,
    /// The card needs a target and none (or an invalid one) was given.
    MissingTarget,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::NotYourTurn => "not your turn",
            RejectReason::AlreadyRolled => "already rolled this turn",
            RejectReason::CardBudgetExhausted => "card budget exhausted for this turn",
            RejectReason::MidMovement => "token is mid-movement",
            RejectReason::MatchEnded => "match has ended",
            RejectReason::MissingTarget => "card requires a valid target",
        };
        f.write_str(text)
    }
}

/// Kind of entity a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundKind {
    /// Card id unknown to the registry.
    Card,
    /// Card id not held in the requester's hand.
    CardInHand,
    /// Tile id not on the board.
    Tile,
    /// Player id not in the roster.
    Player,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NotFoundKind::Card => "card",
            NotFoundKind::CardInHand => "card in hand",
            NotFoundKind::Tile => "tile",
            NotFoundKind::Player => "player",
        };
        f.write_str(text)
    }
}

/// Failures while assembling a match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// Roster has no players.
    #[error("Roster is empty")]
    EmptyRoster,

    /// Same player listed twice.
    #[error("Player {0} appears twice in the roster")]
    DuplicatePlayer(String),

    /// Board has no tiles.
    #[error("Board has no tiles")]
    EmptyBoard,

    /// No tile is flagged as the start tile.
    #[error("Board has no start tile")]
    MissingStartTile,

    /// A next/previous link points outside the board.
    #[error("Tile {tile} links to unknown tile {target}")]
    DanglingLink {
        /// Tile holding the link.
        tile: u32,
        /// Missing target.
        target: u32,
    },

    /// Tile ids must match their position in the layout.
    #[error("Tile at position {position} has id {id}")]
    TileIdMismatch {
        /// Position in the layout.
        position: u32,
        /// Id found there.
        id: u32,
    },

    /// A tile effect moves further than `MAX_EFFECT_STEPS`.
    #[error("Tile {tile} effect moves {steps} steps")]
    TooManySteps {
        /// Offending tile.
        tile: u32,
        /// Step count found.
        steps: u32,
    },

    /// Dice count must be at least one.
    #[error("Dice count must be at least one")]
    NoDice,

    /// Starting essence must be positive.
    #[error("Starting essence must be positive")]
    NoEssence,
}

/// Errors reported by the match coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Action refused by the gate.
    #[error("Action rejected: {reason}")]
    Rejected {
        /// Why the action was refused.
        reason: RejectReason,
    },

    /// Lookup miss.
    #[error("{kind} {id} not found")]
    NotFound {
        /// What was looked up.
        kind: NotFoundKind,
        /// Identifier that missed.
        id: String,
    },

    /// Match is over.
    #[error("Match ended{}", winner_suffix(.winner))]
    Terminal {
        /// Winner, if any player survived.
        winner: Option<PlayerId>,
    },

    /// Match could not be assembled.
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupError),
}

fn winner_suffix(winner: &Option<PlayerId>) -> String {
    match winner {
        Some(id) => format!(", winner {}", id.short()),
        None => String::from(" with no winner"),
    }
}

impl MatchError {
    /// Shorthand for a gate rejection.
    pub fn rejected(reason: RejectReason) -> Self {
        MatchError::Rejected { reason }
    }

    /// Shorthand for a lookup miss.
    pub fn not_found(kind: NotFoundKind, id: impl ToString) -> Self {
        MatchError::NotFound { kind, id: id.to_string() }
    }

    /// Gate reason, if this is a rejection.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            MatchError::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}
