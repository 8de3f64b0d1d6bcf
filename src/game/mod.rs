//! Game Logic Module
//!
//! Everything that decides the outcome of a match. Deterministic given the
//! seed and the order of actions.
//!
//! ## Module Structure
//!
//! - `state`: Match state, player state, phases
//! - `turn`: Turn cursor and rotation
//! - `board`: Tiles, effects, traversal
//! - `cards`: Card catalog, effects, hands
//! - `token`: Player tokens and hop-by-hop movement
//! - `dice`: Dice tray with timed settling
//! - `gate`: Who may act and when
//! - `resolver`: Tile effects on landing
//! - `events`: Outbound events and the broadcast sink
//! - `replica`: Patches and read-only replicas
//! - `coordinator`: The authoritative match loop

pub mod state;
pub mod turn;
pub mod board;
pub mod cards;
pub mod token;
pub mod dice;
pub mod gate;
pub mod resolver;
pub mod events;
pub mod replica;
pub mod coordinator;

// Re-export key types
pub use state::{MatchState, PlayerState, PlayerId, RosterEntry, MatchPhase, TurnPhase};
pub use board::{Board, BoardLayout, TileId, TileEffect, Direction};
pub use cards::{CardCatalog, CardDefinition, CardId, CardRegistry, EffectKind, Hand};
pub use coordinator::{MatchConfig, MatchCoordinator, TickResult, CardPlay};
pub use events::{BroadcastSink, MatchEvent, MatchEventData, TracingSink, NullSink};
pub use replica::{MatchReplica, Patch};
