//! Lobby and Match Chat
//!
//! Players talk through the host; the host adds system lines (joins, leaves,
//! forfeits, command results). Text starting with `/` is a host command:
//!
//! - `/move <n>`: move the turn-holder's token `n` tiles (negative goes back)
//! - `/sendcard <seat> <card>`: put a card in the hand of the player in
//!   1-based seat `seat`
//!
//! Commands only run when the session enables them.

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};

use crate::game::cards::CardId;

/// Messages kept for late joiners.
pub const CHAT_LOG_CAPACITY: usize = 50;

/// Longest accepted chat line, in characters.
pub const MAX_CHAT_LEN: usize = 256;

/// Sender name shown for host lines.
pub const SYSTEM_NAME: &str = "[Game]";

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sender, `[Game]` for host lines.
    pub sender: String,
    /// Line text.
    pub text: String,
    /// Written by the host.
    pub system: bool,
}

impl ChatMessage {
    /// A line from a player.
    pub fn player(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self { sender: sender.into(), text: text.into(), system: false }
    }

    /// A line from the host.
    pub fn system(text: impl Into<String>) -> Self {
        Self { sender: SYSTEM_NAME.to_string(), text: text.into(), system: true }
    }
}

/// Most recent chat lines, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
}

impl ChatLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, dropping the oldest past capacity.
    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.len() == CHAT_LOG_CAPACITY {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Lines in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// No lines yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Host command typed into chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    /// Move the turn-holder.
    Move {
        /// Tiles to move; negative goes backwards
        steps: i32,
    },
    /// Hand a card to a player.
    SendCard {
        /// 1-based seat in turn order
        seat: usize,
        /// Card to give
        card_id: CardId,
    },
}

/// What a chat line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Plain text for everyone.
    Say(String),
    /// Host command.
    Command(ChatCommand),
}

/// Why a chat line was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Nothing to say.
    #[error("Empty chat message")]
    Empty,

    /// Over `MAX_CHAT_LEN`.
    #[error("Chat message longer than {} characters", MAX_CHAT_LEN)]
    TooLong,

    /// Known command, bad arguments.
    #[error("Usage: {0}")]
    Usage(&'static str),

    /// Not a command the host knows.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Host commands are switched off.
    #[error("Commands are disabled on this host")]
    CommandsDisabled,
}

/// Parse a line typed by a player.
pub fn parse_chat(text: &str) -> Result<ChatInput, ChatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::Empty);
    }
    if text.chars().count() > MAX_CHAT_LEN {
        return Err(ChatError::TooLong);
    }
    if !text.starts_with('/') {
        return Ok(ChatInput::Say(text.to_string()));
    }

    let mut parts = text.split_whitespace();
    let cmd = parts.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match cmd.as_str() {
        "/move" => match args.as_slice() {
            [n] => ChatCommand::Move {
                steps: n.parse().map_err(|_| ChatError::Usage("/move 3"))?,
            },
            _ => return Err(ChatError::Usage("/move 3")),
        },
        "/sendcard" => match args.as_slice() {
            [seat, card] => {
                let seat = seat.parse().map_err(|_| ChatError::Usage("/sendcard 1 101"))?;
                let card = card.parse().map_err(|_| ChatError::Usage("/sendcard 1 101"))?;
                ChatCommand::SendCard { seat, card_id: CardId(card) }
            }
            _ => return Err(ChatError::Usage("/sendcard 1 101")),
        },
        _ => return Err(ChatError::UnknownCommand(cmd)),
    };
    Ok(ChatInput::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_latest_fifty() {
        let mut log = ChatLog::new();
        for i in 0..60 {
            log.push(ChatMessage::player("Ana", format!("line {}", i)));
        }

        let messages = log.messages();
        assert_eq!(messages.len(), CHAT_LOG_CAPACITY);
        assert_eq!(messages[0].text, "line 10");
        assert_eq!(messages[49].text, "line 59");
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_chat("  hello there "), Ok(ChatInput::Say("hello there".into())));
        assert_eq!(parse_chat("   "), Err(ChatError::Empty));
        assert_eq!(parse_chat(&"x".repeat(MAX_CHAT_LEN + 1)), Err(ChatError::TooLong));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_chat("/move 3"),
            Ok(ChatInput::Command(ChatCommand::Move { steps: 3 }))
        );
        assert_eq!(
            parse_chat("/MOVE -2"),
            Ok(ChatInput::Command(ChatCommand::Move { steps: -2 }))
        );
        assert_eq!(
            parse_chat("/sendcard 2 5"),
            Ok(ChatInput::Command(ChatCommand::SendCard { seat: 2, card_id: CardId(5) }))
        );

        assert_eq!(parse_chat("/move"), Err(ChatError::Usage("/move 3")));
        assert_eq!(parse_chat("/move far"), Err(ChatError::Usage("/move 3")));
        assert_eq!(parse_chat("/sendcard 1"), Err(ChatError::Usage("/sendcard 1 101")));
        assert_eq!(parse_chat("/fly"), Err(ChatError::UnknownCommand("/fly".into())));
    }

    #[test]
    fn test_system_sender() {
        let msg = ChatMessage::system("Ana joined");
        assert!(msg.system);
        assert_eq!(msg.sender, SYSTEM_NAME);
    }
}
