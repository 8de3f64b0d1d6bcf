//! Protocol Messages
//!
//! Wire format for client-host communication over WebSocket.
//! All messages are JSON text frames tagged by `type`. Patches also have a
//! bincode encoding (`Patch::to_bytes`) for observers that want it.

use serde::{Serialize, Deserialize};

use crate::error::{MatchError, NotFoundKind, RejectReason};
use crate::game::board::BoardLayout;
use crate::game::cards::CardId;
use crate::game::coordinator::MatchConfig;
use crate::game::events::MatchEvent;
use crate::game::replica::Patch;
use crate::game::state::PlayerId;
use crate::network::chat::ChatMessage;

// =============================================================================
// CLIENT -> HOST MESSAGES
// =============================================================================

/// Messages sent from client to host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the lobby.
    Join(JoinRequest),

    /// Ready to start match.
    Ready,

    /// Throw the dice.
    RollDice,

    /// Play a card from hand.
    PlayCard {
        /// Card to play.
        card_id: CardId,
        /// Target player (UUID string) for cards that need one.
        #[serde(default)]
        target: Option<String>,
    },

    /// Hand the turn over.
    EndTurn,

    /// Request a full patch (after reconnecting or lagging).
    SyncRequest,

    /// Ping for latency measurement.
    Ping {
        /// Client clock (ms), echoed back
        timestamp: u64,
    },

    /// Say something, or run a host command (`/move`, `/sendcard`).
    Chat {
        /// Line as typed
        text: String,
    },

    /// Player is leaving.
    Leave,
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Player's unique identifier (UUID string).
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

impl JoinRequest {
    /// Parse the player id.
    pub fn parsed_id(&self) -> Option<PlayerId> {
        PlayerId::from_uuid_str(&self.player_id)
    }
}

// =============================================================================
// HOST -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from host to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Joined(JoinedInfo),

    /// Lobby roster changed.
    Lobby(LobbyInfo),

    /// Match is starting.
    MatchStart(MatchStartInfo),

    /// Match event.
    Event(MatchEvent),

    /// Replicated state snapshot.
    Patch(Patch),

    /// Action refused by the match.
    Rejected {
        /// Action that was refused.
        action: String,
        /// Why.
        reason: RejectReason,
    },

    /// Error message.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Echo of the ping timestamp
        timestamp: u64,
        /// Host wall clock (ms since epoch)
        server_time: u64,
    },

    /// Match ended.
    MatchEnd(MatchEndInfo),

    /// New chat line.
    Chat(ChatMessage),

    /// Recent chat, sent on join.
    ChatHistory {
        /// Oldest first
        messages: Vec<ChatMessage>,
    },

    /// Host is shutting down.
    Shutdown {
        /// Why
        reason: String,
    },
}

/// Join result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedInfo {
    /// Player id as accepted.
    pub player_id: String,
    /// Host version.
    pub server_version: String,
    /// Board the match will be played on.
    pub board: BoardLayout,
}

/// One lobby entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    /// Player id (UUID string).
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Ready flag.
    pub ready: bool,
}

/// Lobby roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyInfo {
    /// Players in join order (which is turn order).
    pub players: Vec<LobbyPlayer>,
    /// Players needed to start.
    pub min_players: usize,
    /// Lobby capacity.
    pub max_players: usize,
}

/// Information when match starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStartInfo {
    /// Match identifier (hex).
    pub match_id: String,
    /// RNG seed.
    pub rng_seed: u64,
    /// Players in turn order.
    pub players: Vec<LobbyPlayer>,
    /// Rules in force.
    pub config: MatchConfig,
}

/// Match end information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEndInfo {
    /// Match identifier (hex).
    pub match_id: String,
    /// Final coordinator tick.
    pub end_tick: u64,
    /// Winner player ID (None if nobody survived).
    pub winner_id: Option<String>,
    /// Final placements.
    pub placements: Vec<PlayerPlacement>,
    /// Hash of the final patch (hex).
    pub final_state_hash: String,
}

/// Player placement at match end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPlacement {
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Final place (1-based).
    pub place: u8,
    /// Turns completed.
    pub turns_taken: u32,
    /// Essence left.
    pub essence: i32,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Must join first.
    NotJoined,
    /// Already joined.
    AlreadyJoined,
    /// Lobby is full.
    LobbyFull,
    /// Match already running.
    MatchInProgress,
    /// No match running.
    NotInMatch,
    /// Card, tile or player not found.
    NotFound,
    /// Match is over.
    MatchEnded,
    /// Version mismatch.
    VersionMismatch,
    /// Chat line or host command refused.
    ChatRefused,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error message shorthand.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }

    /// Reply for a failed match action.
    pub fn from_match_error(action: &str, err: &MatchError) -> Self {
        match err {
            MatchError::Rejected { reason } => ServerMessage::Rejected {
                action: action.to_string(),
                reason: *reason,
            },
            MatchError::NotFound { kind: NotFoundKind::Player, .. } => {
                ServerMessage::error(ErrorCode::NotJoined, err.to_string())
            }
            MatchError::NotFound { .. } => ServerMessage::error(ErrorCode::NotFound, err.to_string()),
            MatchError::Terminal { .. } => ServerMessage::error(ErrorCode::MatchEnded, err.to_string()),
            MatchError::Setup(_) => ServerMessage::error(ErrorCode::InternalError, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::MatchEventData;

    #[test]
    fn test_client_messages_parse() {
        let join = ClientMessage::from_json(
            r#"{"type":"join","player_id":"6f9619ff-8b86-d011-b42d-00cf4fc964ff","name":"Ana"}"#,
        )
        .unwrap();
        match join {
            ClientMessage::Join(req) => {
                assert_eq!(req.name, "Ana");
                assert!(req.parsed_id().is_some());
                assert!(req.client_version.is_empty());
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        let play = ClientMessage::from_json(r#"{"type":"play_card","card_id":5}"#).unwrap();
        assert!(matches!(play, ClientMessage::PlayCard { card_id: CardId(5), target: None }));

        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"roll_dice"}"#).unwrap(),
            ClientMessage::RollDice
        ));
        assert!(ClientMessage::from_json(r#"{"type":"fly"}"#).is_err());
    }

    #[test]
    fn test_server_event_json() {
        let msg = ServerMessage::Event(MatchEvent::new(
            3,
            MatchEventData::Status { text: "Ana is stopped".into() },
        ));

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""kind":"status""#));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event(event) => assert_eq!(event.tick, 3),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_match_error_mapping() {
        let msg = ServerMessage::from_match_error(
            "roll_dice",
            &MatchError::rejected(RejectReason::NotYourTurn),
        );
        let json = msg.to_json().unwrap();
        assert!(json.contains("not_your_turn"));
        assert!(json.contains("roll_dice"));

        let msg = ServerMessage::from_match_error(
            "play_card",
            &MatchError::not_found(NotFoundKind::CardInHand, 9),
        );
        assert!(matches!(
            msg,
            ServerMessage::Error(ServerError { code: ErrorCode::NotFound, .. })
        ));

        let msg = ServerMessage::from_match_error("end_turn", &MatchError::Terminal { winner: None });
        assert!(matches!(
            msg,
            ServerMessage::Error(ServerError { code: ErrorCode::MatchEnded, .. })
        ));
    }

    #[test]
    fn test_chat_messages_json() {
        let chat = ClientMessage::from_json(r#"{"type":"chat","text":"/move 2"}"#).unwrap();
        assert!(matches!(chat, ClientMessage::Chat { text } if text == "/move 2"));

        let json = ServerMessage::Chat(ChatMessage::system("Ana joined")).to_json().unwrap();
        assert!(json.contains(r#""type":"chat""#));
        assert!(json.contains(r#""sender":"[Game]""#));
        assert!(json.contains(r#""system":true"#));
    }

    #[test]
    fn test_error_codes() {
        let json = ServerMessage::error(ErrorCode::LobbyFull, "Lobby is full").to_json().unwrap();
        assert!(json.contains("lobby_full"));
    }
}
