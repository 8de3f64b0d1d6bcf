//! # Essence Board
//!
//! Authoritative match coordinator for a turn-based board and card game.
//! Players roll dice to move tokens around a tile route, trigger tile
//! effects, and play cards to shift or drain each other's essence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ESSENCE BOARD                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/              - Deterministic primitives               │
//! │  ├── rng.rs         - Seeded Xoroshiro128+ PRNG             │
//! │  └── hash.rs        - SHA-256 state hashing                  │
//! │                                                              │
//! │  game/              - Match logic (deterministic)            │
//! │  ├── state.rs       - Match and player state                 │
//! │  ├── turn.rs        - Turn cursor                            │
//! │  ├── board.rs       - Tiles and traversal                    │
//! │  ├── cards.rs       - Catalog, effects, hands                │
//! │  ├── token.rs       - Tokens and hop movement                │
//! │  ├── dice.rs        - Dice tray                              │
//! │  ├── gate.rs        - Action gating                          │
//! │  ├── resolver.rs    - Tile effect resolution                 │
//! │  ├── events.rs      - Events and broadcast sink              │
//! │  ├── replica.rs     - Patches and replicas                   │
//! │  └── coordinator.rs - Authoritative match loop               │
//! │                                                              │
//! │  network/           - Networking (non-deterministic)         │
//! │  ├── protocol.rs    - JSON message types                     │
//! │  ├── chat.rs        - Chat log and host commands             │
//! │  ├── session.rs     - Lobby and match hosting                │
//! │  └── server.rs      - WebSocket host                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given the same board, catalog, config, seed and sequence of actions at
//! the same ticks, a `MatchCoordinator` emits the same events and patches
//! with the same state hashes. Time only enters through `tick(dt_ms)`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use error::{MatchError, RejectReason};
pub use game::coordinator::{MatchConfig, MatchCoordinator};
pub use game::state::{MatchState, PlayerState, PlayerId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default host tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 20;
