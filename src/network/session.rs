//! Match Session Management
//!
//! A session collects a lobby roster, then hosts one `MatchCoordinator` for
//! it. Join order becomes turn order. Players who drop during a match keep
//! their seat; while they are away their turns are skipped, and once they
//! have been gone longer than the reconnect timeout they forfeit.

use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::core::rng::derive_match_seed;
use crate::error::MatchError;
use crate::game::board::Board;
use crate::game::cards::{CardId, CardRegistry};
use crate::game::coordinator::{MatchConfig, MatchCoordinator, TickResult};
use crate::game::events::BroadcastSink;
use crate::game::replica::Patch;
use crate::game::state::{PlayerId, RosterEntry, TurnPhase};
use crate::network::chat::{parse_chat, ChatCommand, ChatError, ChatInput, ChatLog, ChatMessage};
use crate::network::protocol::{
    LobbyInfo, LobbyPlayer, MatchEndInfo, MatchStartInfo, PlayerPlacement, ServerMessage,
};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Collecting players.
    Lobby,
    /// Match in progress.
    Playing,
    /// Match ended, results not yet sent.
    Ended,
    /// Results sent.
    Closed,
}

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Player is connected.
    Connected,
    /// Player disconnected, waiting for reconnect.
    Disconnected {
        /// Match tick at which the socket closed.
        since_tick: u64,
    },
}

/// Configuration for a match session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum players to start.
    pub min_players: usize,
    /// Maximum players in match.
    pub max_players: usize,
    /// Rules for the match.
    pub match_config: MatchConfig,
    /// Ticks a dropped player may stay away before forfeiting
    /// (60 seconds at 20Hz).
    pub reconnect_timeout_ticks: u64,
    /// Accept `/move` and `/sendcard` in chat.
    pub dev_commands: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 4,
            match_config: MatchConfig::default(),
            reconnect_timeout_ticks: 1200,
            dev_commands: false,
        }
    }
}

/// A player in a session.
#[derive(Debug)]
pub struct SessionPlayer {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Is player ready to start.
    pub ready: bool,
    /// Socket state.
    pub connection: ConnectionState,
    /// Message channel to this player.
    pub sender: mpsc::Sender<ServerMessage>,
}

impl SessionPlayer {
    /// Socket still open.
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Queue a message without waiting. A full queue drops the message;
    /// the client recovers with a sync request.
    fn deliver(&self, message: ServerMessage) {
        if !self.is_connected() {
            return;
        }
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, message dropped", self.player_id.short());
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue closed for {}", self.player_id.short());
            }
        }
    }

    fn lobby_entry(&self) -> LobbyPlayer {
        LobbyPlayer {
            player_id: self.player_id.to_uuid_string(),
            name: self.name.clone(),
            ready: self.ready,
        }
    }
}

/// Something a player asks the match to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    /// Throw the dice.
    Roll,
    /// Play a card.
    PlayCard {
        /// Card to play.
        card_id: CardId,
        /// Target player, if any.
        target: Option<PlayerId>,
    },
    /// Hand the turn over.
    EndTurn,
}

impl PlayerAction {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerAction::Roll => "roll_dice",
            PlayerAction::PlayCard { .. } => "play_card",
            PlayerAction::EndTurn => "end_turn",
        }
    }
}

/// A match session.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Current state.
    pub state: SessionState,
    /// Session configuration.
    pub config: SessionConfig,
    /// Players in join order.
    players: Vec<SessionPlayer>,
    /// Board for the match.
    board: Board,
    /// Card lookup for the match.
    registry: Arc<dyn CardRegistry>,
    /// Where the coordinator reports text events.
    sink: Arc<dyn BroadcastSink>,
    /// The match (when playing).
    coordinator: Option<MatchCoordinator>,
    /// Recent chat.
    chat: ChatLog,
}

impl MatchSession {
    /// Create a new session.
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        board: Board,
        registry: Arc<dyn CardRegistry>,
        sink: Arc<dyn BroadcastSink>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Lobby,
            config,
            players: Vec::new(),
            board,
            registry,
            sink,
            coordinator: None,
            chat: ChatLog::new(),
        }
    }

    /// Add a player to the lobby.
    pub fn add_player(
        &mut self,
        player_id: PlayerId,
        name: impl Into<String>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::MatchInProgress);
        }

        if self.players.iter().any(|p| p.player_id == player_id) {
            return Err(SessionError::AlreadyInSession);
        }

        if self.players.len() >= self.config.max_players {
            return Err(SessionError::SessionFull);
        }

        self.players.push(SessionPlayer {
            player_id,
            name: name.into(),
            ready: false,
            connection: ConnectionState::Connected,
            sender,
        });

        Ok(())
    }

    /// Remove a player. In the lobby the seat is freed; during a match the
    /// player is only marked disconnected.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.player_id == *player_id) else {
            return false;
        };

        if self.state == SessionState::Lobby {
            self.players.remove(idx);
        } else if self.players[idx].is_connected() {
            let since_tick = self.current_tick();
            self.players[idx].connection = ConnectionState::Disconnected { since_tick };
            debug!("Player {} disconnected mid-match at tick {}", player_id.short(), since_tick);
        }
        true
    }

    /// Re-attach a player who dropped during the match. Refused once the
    /// reconnect timeout has passed.
    pub fn reconnect_player(&mut self, player_id: &PlayerId, sender: mpsc::Sender<ServerMessage>) -> bool {
        if self.state == SessionState::Lobby || !self.can_reconnect(player_id) {
            return false;
        }
        match self.players.iter_mut().find(|p| p.player_id == *player_id) {
            Some(player) => {
                player.connection = ConnectionState::Connected;
                player.sender = sender;
                true
            }
            None => false,
        }
    }

    /// Player dropped and has not yet timed out.
    pub fn can_reconnect(&self, player_id: &PlayerId) -> bool {
        let Some(player) = self.players.iter().find(|p| p.player_id == *player_id) else {
            return false;
        };
        let ConnectionState::Disconnected { since_tick } = player.connection else {
            return false;
        };
        self.current_tick().saturating_sub(since_tick) <= self.config.reconnect_timeout_ticks
    }

    /// Forfeit players who have been disconnected too long. Returns the
    /// players knocked out this call.
    pub fn check_reconnect_timeouts(&mut self) -> Vec<PlayerId> {
        let current_tick = self.current_tick();
        let timeout = self.config.reconnect_timeout_ticks;
        let Some(coordinator) = self.coordinator.as_mut() else {
            return Vec::new();
        };

        let mut overdue: Vec<(u64, usize, PlayerId)> = self
            .players
            .iter()
            .enumerate()
            .filter_map(|(seat, p)| match p.connection {
                ConnectionState::Disconnected { since_tick }
                    if current_tick.saturating_sub(since_tick) > timeout =>
                {
                    Some((since_tick, seat, p.player_id))
                }
                _ => None,
            })
            .collect();
        // Longest gone forfeits first, ties in seat order
        overdue.sort();

        let mut timed_out = Vec::new();
        for (_, _, player_id) in overdue {
            if coordinator.is_ended() {
                break;
            }
            let already_out = coordinator.state().get_player(&player_id).is_some_and(|p| p.eliminated);
            if already_out {
                continue;
            }
            match coordinator.forfeit(&player_id) {
                Ok(()) => {
                    info!("Player {} timed out and forfeits", player_id.short());
                    timed_out.push(player_id);
                }
                Err(e) => debug!("Forfeit of {} deferred: {}", player_id.short(), e),
            }
        }
        timed_out
    }

    fn current_tick(&self) -> u64 {
        self.coordinator.as_ref().map(|c| c.tick_count()).unwrap_or(0)
    }

    /// Player has a seat in this session.
    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.iter().any(|p| p.player_id == *player_id)
    }

    /// Mark a player as ready.
    pub fn set_player_ready(&mut self, player_id: &PlayerId, ready: bool) -> bool {
        match self.players.iter_mut().find(|p| p.player_id == *player_id) {
            Some(player) => {
                player.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Check if all players are ready.
    pub fn all_players_ready(&self) -> bool {
        self.players.len() >= self.config.min_players
            && self.players.iter().all(|p| p.ready && p.is_connected())
    }

    /// Get player count.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Lobby roster for clients.
    pub fn lobby_info(&self) -> LobbyInfo {
        LobbyInfo {
            players: self.players.iter().map(SessionPlayer::lobby_entry).collect(),
            min_players: self.config.min_players,
            max_players: self.config.max_players,
        }
    }

    /// Board for the match.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Start the match. `nonce` is mixed into the seed so rematches with the
    /// same roster play out differently.
    pub fn start_match(&mut self, nonce: u64) -> Result<MatchStartInfo, SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::MatchInProgress);
        }

        if !self.all_players_ready() {
            return Err(SessionError::PlayersNotReady);
        }

        let player_ids: Vec<[u8; 16]> = self.players.iter().map(|p| *p.player_id.as_bytes()).collect();
        let rng_seed = derive_match_seed(&self.id, &player_ids, nonce);

        let roster = self
            .players
            .iter()
            .map(|p| RosterEntry::new(p.player_id, p.name.clone()))
            .collect();

        let coordinator = MatchCoordinator::new(
            self.id,
            roster,
            self.board.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            self.config.match_config.clone(),
            rng_seed,
        )?;

        self.coordinator = Some(coordinator);
        self.state = SessionState::Playing;

        info!("Session {} playing with {} players", hex::encode(&self.id[..4]), self.players.len());

        Ok(MatchStartInfo {
            match_id: hex::encode(self.id),
            rng_seed,
            players: self.players.iter().map(SessionPlayer::lobby_entry).collect(),
            config: self.config.match_config.clone(),
        })
    }

    /// Route a player action to the match.
    pub fn handle_action(&mut self, player_id: &PlayerId, action: PlayerAction) -> Result<(), SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::MatchNotInProgress);
        }
        let coordinator = self.coordinator.as_mut().ok_or(SessionError::MatchNotInProgress)?;

        match action {
            PlayerAction::Roll => {
                coordinator.request_roll(player_id)?;
            }
            PlayerAction::PlayCard { card_id, target } => {
                coordinator.play_card(player_id, card_id, target)?;
            }
            PlayerAction::EndTurn => coordinator.end_turn(player_id)?,
        }

        Ok(())
    }

    /// Run a single match tick.
    pub fn run_tick(&mut self, dt_ms: u32) -> Option<TickResult> {
        if self.state != SessionState::Playing {
            return None;
        }

        for player_id in self.check_reconnect_timeouts() {
            let name = self.player_name(&player_id).unwrap_or_default();
            self.system_message(format!("{} did not come back and forfeits", name));
        }
        let coordinator = self.coordinator.as_mut()?;

        // Skip the turn of a player who is not there to take it
        if !coordinator.is_ended() && coordinator.state().turn_phase == TurnPhase::AwaitingAction {
            if let Some(current) = coordinator.current_player() {
                let away = self.players.iter().any(|p| p.player_id == current && !p.is_connected());
                if away {
                    debug!("Skipping turn of disconnected player {}", current.short());
                    if let Err(e) = coordinator.end_turn(&current) {
                        warn!("Could not skip turn: {}", e);
                    }
                }
            }
        }

        let result = coordinator.tick(dt_ms);

        if result.match_ended {
            self.state = SessionState::Ended;
        }

        Some(result)
    }

    /// Relay a chat line from a player, or run it as a host command.
    pub fn chat(&mut self, player_id: &PlayerId, text: &str) -> Result<(), SessionError> {
        let name = self.player_name(player_id).ok_or(SessionError::NotInSession)?;

        match parse_chat(text)? {
            ChatInput::Say(line) => self.post(ChatMessage::player(name, line)),
            ChatInput::Command(command) => {
                if !self.config.dev_commands {
                    return Err(ChatError::CommandsDisabled.into());
                }
                let line = self.run_command(command)?;
                info!("{} ran a host command: {}", name, line);
                self.system_message(line);
            }
        }
        Ok(())
    }

    /// Post a host line to everyone.
    pub fn system_message(&mut self, text: impl Into<String>) {
        self.post(ChatMessage::system(text));
    }

    /// Chat so far, oldest first.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.chat.messages()
    }

    fn post(&mut self, message: ChatMessage) {
        self.chat.push(message.clone());
        self.broadcast(ServerMessage::Chat(message));
    }

    fn run_command(&mut self, command: ChatCommand) -> Result<String, SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::MatchNotInProgress);
        }
        let coordinator = self.coordinator.as_mut().ok_or(SessionError::MatchNotInProgress)?;

        match command {
            ChatCommand::Move { steps } => {
                let name = coordinator
                    .current_player()
                    .and_then(|id| coordinator.state().get_player(&id))
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                let path = coordinator.nudge_current(steps)?;
                Ok(format!("{} was moved {} tiles", name, path.len()))
            }
            ChatCommand::SendCard { seat, card_id } => {
                let player = seat
                    .checked_sub(1)
                    .and_then(|i| self.players.get(i))
                    .ok_or(SessionError::NoSuchSeat(seat))?;
                let (player_id, name) = (player.player_id, player.name.clone());

                if coordinator.grant_card(&player_id, card_id)? {
                    Ok(format!("Card {} sent to {}", card_id, name))
                } else {
                    Ok(format!("{}'s hand is full, card {} was discarded", name, card_id))
                }
            }
        }
    }

    fn player_name(&self, player_id: &PlayerId) -> Option<String> {
        self.players.iter().find(|p| p.player_id == *player_id).map(|p| p.name.clone())
    }

    /// Full snapshot for a resyncing client.
    pub fn sync_patch(&mut self) -> Option<Patch> {
        self.coordinator.as_mut().map(|c| c.patch())
    }

    /// The running match.
    pub fn coordinator(&self) -> Option<&MatchCoordinator> {
        self.coordinator.as_ref()
    }

    /// Finalize match and get results.
    pub fn finalize(&mut self) -> Option<MatchEndInfo> {
        if self.state != SessionState::Ended {
            return None;
        }

        let coordinator = self.coordinator.as_mut()?;
        let final_patch = coordinator.patch();
        let state = coordinator.state();

        let placements = state
            .standings()
            .into_iter()
            .filter_map(|(id, place)| {
                let player = state.get_player(&id)?;
                let essence = coordinator.token(&id).map(|t| t.essence()).unwrap_or(0);
                Some(PlayerPlacement {
                    player_id: id.to_uuid_string(),
                    name: player.name.clone(),
                    place,
                    turns_taken: player.turns_taken,
                    essence,
                })
            })
            .collect();

        let info = MatchEndInfo {
            match_id: hex::encode(self.id),
            end_tick: coordinator.tick_count(),
            winner_id: coordinator.winner().map(|id| id.to_uuid_string()),
            placements,
            final_state_hash: final_patch.hash_hex(),
        };

        self.state = SessionState::Closed;
        Some(info)
    }

    /// Broadcast a message to all connected players. Never waits on a slow
    /// client.
    pub fn broadcast(&self, message: ServerMessage) {
        for player in &self.players {
            player.deliver(message.clone());
        }
    }

    /// Get session state.
    pub fn get_state(&self) -> SessionState {
        self.state
    }
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Session is full.
    #[error("Session is full")]
    SessionFull,

    /// Player already in session.
    #[error("Already in session")]
    AlreadyInSession,

    /// Match is in progress.
    #[error("Match in progress")]
    MatchInProgress,

    /// Match not in progress.
    #[error("Match not in progress")]
    MatchNotInProgress,

    /// Players not ready.
    #[error("Players not ready")]
    PlayersNotReady,

    /// Player has no seat here.
    #[error("Not in session")]
    NotInSession,

    /// Command named a seat nobody sits in.
    #[error("No player in seat {0}")]
    NoSuchSeat(usize),

    /// Chat line refused.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Match refused the action or could not be built.
    #[error(transparent)]
    Match(#[from] MatchError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::game::board::TileEffect;
    use crate::game::cards::CardCatalog;
    use crate::game::events::NullSink;
    use crate::network::chat::ChatError;

    fn create_test_session() -> MatchSession {
        let config = SessionConfig {
            match_config: MatchConfig {
                dice_count: 1,
                hop_ms: 10,
                die_settle_ms: 10,
                ..MatchConfig::default()
            },
            ..SessionConfig::default()
        };
        MatchSession::new(
            [3; 16],
            config,
            Board::ring(vec![TileEffect::None; 10]).unwrap(),
            Arc::new(CardCatalog::starter()),
            Arc::new(NullSink),
        )
    }

    fn join(session: &mut MatchSession, i: u8) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(64);
        session.add_player(PlayerId::new([i; 16]), format!("P{}", i), tx).unwrap();
        rx
    }

    fn start(session: &mut MatchSession, n: u8) -> Vec<mpsc::Receiver<ServerMessage>> {
        let receivers = (1..=n).map(|i| join(session, i)).collect();
        for i in 1..=n {
            session.set_player_ready(&PlayerId::new([i; 16]), true);
        }
        session.start_match(0).unwrap();
        receivers
    }

    #[tokio::test]
    async fn test_add_remove_player() {
        let mut session = create_test_session();
        let _rx = join(&mut session, 1);
        assert_eq!(session.player_count(), 1);

        let (tx, _rx2) = mpsc::channel(1);
        assert!(matches!(
            session.add_player(PlayerId::new([1; 16]), "again", tx),
            Err(SessionError::AlreadyInSession)
        ));

        assert!(session.remove_player(&PlayerId::new([1; 16])));
        assert_eq!(session.player_count(), 0);
        assert!(!session.remove_player(&PlayerId::new([1; 16])));
    }

    #[tokio::test]
    async fn test_session_full() {
        let mut session = create_test_session();
        let _rxs: Vec<_> = (1..=4).map(|i| join(&mut session, i)).collect();

        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            session.add_player(PlayerId::new([9; 16]), "late", tx),
            Err(SessionError::SessionFull)
        ));
    }

    #[tokio::test]
    async fn test_cannot_start_without_ready() {
        let mut session = create_test_session();
        let _a = join(&mut session, 1);
        let _b = join(&mut session, 2);
        session.set_player_ready(&PlayerId::new([1; 16]), true);

        assert!(!session.all_players_ready());
        assert!(matches!(session.start_match(0), Err(SessionError::PlayersNotReady)));
    }

    #[tokio::test]
    async fn test_start_match_uses_join_order() {
        let mut session = create_test_session();
        let _rxs = start(&mut session, 3);

        assert_eq!(session.get_state(), SessionState::Playing);
        let coordinator = session.coordinator().unwrap();
        assert_eq!(coordinator.current_player(), Some(PlayerId::new([1; 16])));

        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            session.add_player(PlayerId::new([9; 16]), "late", tx),
            Err(SessionError::MatchInProgress)
        ));
    }

    #[tokio::test]
    async fn test_actions_reach_the_match() {
        let mut session = create_test_session();
        let _rxs = start(&mut session, 2);

        let err = session.handle_action(&PlayerId::new([2; 16]), PlayerAction::Roll).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Match(MatchError::Rejected { reason: RejectReason::NotYourTurn })
        ));

        session.handle_action(&PlayerId::new([1; 16]), PlayerAction::Roll).unwrap();
        for _ in 0..100 {
            session.run_tick(10);
        }

        let coordinator = session.coordinator().unwrap();
        assert_eq!(coordinator.current_player(), Some(PlayerId::new([2; 16])));
    }

    #[tokio::test]
    async fn test_disconnected_player_turn_skipped() {
        let mut session = create_test_session();
        let _rxs = start(&mut session, 3);

        assert!(session.remove_player(&PlayerId::new([1; 16])));
        assert_eq!(session.player_count(), 3);

        session.run_tick(10);
        let coordinator = session.coordinator().unwrap();
        assert_eq!(coordinator.current_player(), Some(PlayerId::new([2; 16])));

        let (tx, _rx) = mpsc::channel(1);
        assert!(session.reconnect_player(&PlayerId::new([1; 16]), tx));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_connected_players() {
        let mut session = create_test_session();
        let mut a = join(&mut session, 1);
        let mut b = join(&mut session, 2);

        session.broadcast(ServerMessage::Lobby(session.lobby_info()));

        assert!(matches!(a.recv().await, Some(ServerMessage::Lobby(_))));
        assert!(matches!(b.recv().await, Some(ServerMessage::Lobby(_))));
    }

    #[tokio::test]
    async fn test_broadcast_skips_full_queue() {
        let mut session = create_test_session();
        let (tx, mut slow) = mpsc::channel(1);
        session.add_player(PlayerId::new([1; 16]), "slow", tx).unwrap();
        let mut fast = join(&mut session, 2);

        // Would block forever if broadcast waited on the slow client
        for _ in 0..3 {
            session.broadcast(ServerMessage::Lobby(session.lobby_info()));
        }

        assert!(matches!(slow.recv().await, Some(ServerMessage::Lobby(_))));
        assert!(slow.try_recv().is_err());
        for _ in 0..3 {
            assert!(matches!(fast.recv().await, Some(ServerMessage::Lobby(_))));
        }
    }

    #[tokio::test]
    async fn test_everyone_gone_ends_match() {
        let mut session = create_test_session();
        session.config.reconnect_timeout_ticks = 5;
        let _rxs = start(&mut session, 2);

        session.remove_player(&PlayerId::new([1; 16]));
        session.remove_player(&PlayerId::new([2; 16]));

        for _ in 0..20 {
            session.run_tick(10);
            if session.get_state() == SessionState::Ended {
                break;
            }
        }

        assert_eq!(session.get_state(), SessionState::Ended);
        let info = session.finalize().unwrap();
        assert_eq!(info.winner_id, Some(PlayerId::new([2; 16]).to_uuid_string()));
    }

    #[tokio::test]
    async fn test_absent_player_forfeits() {
        let mut session = create_test_session();
        session.config.reconnect_timeout_ticks = 5;
        let mut rxs = start(&mut session, 2);

        session.remove_player(&PlayerId::new([2; 16]));
        let (tx, _rx) = mpsc::channel(1);
        assert!(session.can_reconnect(&PlayerId::new([2; 16])));

        let mut forfeited = false;
        for _ in 0..10 {
            let result = session.run_tick(10).unwrap();
            if result.match_ended {
                forfeited = true;
                break;
            }
        }

        assert!(forfeited);
        let coordinator = session.coordinator().unwrap();
        assert_eq!(coordinator.winner(), Some(PlayerId::new([1; 16])));
        assert!(!session.reconnect_player(&PlayerId::new([2; 16]), tx));

        let mut notices = Vec::new();
        while let Ok(msg) = rxs[0].try_recv() {
            if let ServerMessage::Chat(chat) = msg {
                notices.push(chat.text);
            }
        }
        assert_eq!(notices, vec!["P2 did not come back and forfeits".to_string()]);
    }

    #[tokio::test]
    async fn test_reconnect_within_timeout_keeps_seat() {
        let mut session = create_test_session();
        session.config.reconnect_timeout_ticks = 5;
        let _rxs = start(&mut session, 2);

        session.remove_player(&PlayerId::new([2; 16]));
        session.run_tick(10);
        let (tx, _rx) = mpsc::channel(8);
        assert!(session.reconnect_player(&PlayerId::new([2; 16]), tx));

        for _ in 0..20 {
            session.run_tick(10);
        }
        assert_eq!(session.get_state(), SessionState::Playing);
        assert!(session.check_reconnect_timeouts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_relay_and_history() {
        let mut session = create_test_session();
        let mut a = join(&mut session, 1);
        let mut b = join(&mut session, 2);

        session.chat(&PlayerId::new([1; 16]), " hi all ").unwrap();
        session.system_message("P3 joined");

        for rx in [&mut a, &mut b] {
            match rx.recv().await {
                Some(ServerMessage::Chat(msg)) => {
                    assert_eq!(msg, ChatMessage::player("P1", "hi all"));
                }
                other => panic!("Wrong message: {:?}", other),
            }
        }
        let history = session.chat_history();
        assert_eq!(history.len(), 2);
        assert!(history[1].system);

        assert!(matches!(
            session.chat(&PlayerId::new([9; 16]), "hello"),
            Err(SessionError::NotInSession)
        ));
        assert!(matches!(
            session.chat(&PlayerId::new([1; 16]), ""),
            Err(SessionError::Chat(ChatError::Empty))
        ));
    }

    #[tokio::test]
    async fn test_commands_need_dev_flag() {
        let mut session = create_test_session();
        session.config.dev_commands = true;
        let _lobby = join(&mut session, 7);
        assert!(matches!(
            session.chat(&PlayerId::new([7; 16]), "/move 1"),
            Err(SessionError::MatchNotInProgress)
        ));
        session.remove_player(&PlayerId::new([7; 16]));

        session.config.dev_commands = false;
        let _rxs = start(&mut session, 2);

        assert!(matches!(
            session.chat(&PlayerId::new([1; 16]), "/move 2"),
            Err(SessionError::Chat(ChatError::CommandsDisabled))
        ));
        assert!(session.chat_history().is_empty());
    }

    #[tokio::test]
    async fn test_move_and_sendcard_commands() {
        let mut session = create_test_session();
        session.config.dev_commands = true;
        let _rxs = start(&mut session, 2);

        session.chat(&PlayerId::new([2; 16]), "/move 2").unwrap();
        for _ in 0..10 {
            session.run_tick(10);
        }
        let coordinator = session.coordinator().unwrap();
        assert_eq!(coordinator.token(&PlayerId::new([1; 16])).unwrap().tile().0, 2);
        assert_eq!(coordinator.current_player(), Some(PlayerId::new([1; 16])));

        session.chat(&PlayerId::new([1; 16]), "/sendcard 2 5").unwrap();
        let coordinator = session.coordinator().unwrap();
        assert!(coordinator.state().players[1].hand.contains(CardId(5)));

        assert!(matches!(
            session.chat(&PlayerId::new([1; 16]), "/sendcard 3 5"),
            Err(SessionError::NoSuchSeat(3))
        ));
        assert!(matches!(
            session.chat(&PlayerId::new([1; 16]), "/teleport"),
            Err(SessionError::Chat(ChatError::UnknownCommand(_)))
        ));
        let texts: Vec<String> = session.chat_history().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["P1 was moved 2 tiles".to_string(), "Card 5 sent to P2".to_string()]);
    }

    #[tokio::test]
    async fn test_finalize_reports_winner() {
        let mut session = create_test_session();
        session.config.match_config.starting_hand = vec![CardId(5)];
        session.config.match_config.starting_essence = 5;
        let _rxs = start(&mut session, 2);

        assert!(session.finalize().is_none());

        session
            .handle_action(
                &PlayerId::new([1; 16]),
                PlayerAction::PlayCard { card_id: CardId(5), target: Some(PlayerId::new([2; 16])) },
            )
            .unwrap();
        let result = session.run_tick(10).unwrap();
        assert!(result.match_ended);
        assert_eq!(session.get_state(), SessionState::Ended);

        let info = session.finalize().unwrap();
        assert_eq!(info.winner_id, Some(PlayerId::new([1; 16]).to_uuid_string()));
        assert_eq!(info.placements[0].place, 1);
        assert_eq!(info.placements[1].essence, 0);
        assert_eq!(session.get_state(), SessionState::Closed);
    }
}
