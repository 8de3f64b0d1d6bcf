//! Network Layer
//!
//! WebSocket host for lobby, match and chat traffic.
//! This layer is **non-deterministic** - all match logic runs through `game/`.

pub mod chat;
pub mod protocol;
pub mod session;
pub mod server;

pub use chat::{ChatLog, ChatMessage};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode, JoinRequest, MatchEndInfo};
pub use session::{MatchSession, PlayerAction, SessionConfig, SessionError, SessionId, SessionState};
pub use server::{GameServer, ServerConfig, GameServerError};
