//! WebSocket Game Host
//!
//! Async WebSocket server hosting one lobby at a time. Once everybody in the
//! lobby is ready the match starts and a game loop ticks it, broadcasting
//! events and patches. When the match ends the connected players are moved
//! into a fresh lobby for a rematch.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde::{Serialize, Deserialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::board::Board;
use crate::game::cards::CardRegistry;
use crate::game::events::TracingSink;
use crate::game::state::PlayerId;
use crate::network::protocol::{ClientMessage, ErrorCode, JoinRequest, JoinedInfo, ServerMessage};
use crate::network::session::{
    MatchSession, PlayerAction, SessionConfig, SessionError, SessionId, SessionState,
};

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Match tick rate (Hz).
    pub tick_rate: u32,
    /// Host version string.
    pub version: String,
    /// Lobby and match rules.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 64,
            tick_rate: crate::DEFAULT_TICK_RATE,
            version: crate::VERSION.to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GameServerError> {
        let config: Self = serde_json::from_str(json)?;
        if config.tick_rate == 0 {
            return Err(GameServerError::InvalidConfig("tick_rate must be positive".into()));
        }
        if config.session.min_players == 0 || config.session.min_players > config.session.max_players {
            return Err(GameServerError::InvalidConfig(format!(
                "player range {}..={} is empty",
                config.session.min_players, config.session.max_players
            )));
        }
        Ok(config)
    }

    fn tick_ms(&self) -> u32 {
        (1000 / self.tick_rate.max(1)).max(1)
    }
}

/// Game host errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Config could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Config parsed but makes no sense.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after join).
    player_id: Option<PlayerId>,
    /// Display name given at join.
    name: String,
    /// Message sender for this client.
    sender: mpsc::Sender<ServerMessage>,
}

/// State shared by the accept loop, connection tasks and the game loop.
struct HostContext {
    config: ServerConfig,
    board: Board,
    registry: Arc<dyn CardRegistry>,
    session: RwLock<MatchSession>,
    clients: RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
    matches_played: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl HostContext {
    fn new_session(&self) -> MatchSession {
        let id: SessionId = uuid::Uuid::new_v4().into_bytes();
        MatchSession::new(
            id,
            self.config.session.clone(),
            self.board.clone(),
            Arc::clone(&self.registry),
            Arc::new(TracingSink),
        )
    }
}

/// The game host.
pub struct GameServer {
    ctx: Arc<HostContext>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Queue a direct reply without waiting on the client.
fn reply(sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if let Err(TrySendError::Full(_)) = sender.try_send(message) {
        warn!("Outbound queue full, reply dropped");
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

impl GameServer {
    /// Create a new host for `board`, resolving cards through `registry`.
    pub fn new(config: ServerConfig, board: Board, registry: Arc<dyn CardRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let session = MatchSession::new(
            uuid::Uuid::new_v4().into_bytes(),
            config.session.clone(),
            board.clone(),
            Arc::clone(&registry),
            Arc::new(TracingSink),
        );

        Self {
            ctx: Arc::new(HostContext {
                config,
                board,
                registry,
                session: RwLock::new(session),
                clients: RwLock::new(BTreeMap::new()),
                matches_played: AtomicU64::new(0),
                shutdown_tx,
            }),
        }
    }

    /// Run the host until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        info!("Game host listening on {}", self.ctx.config.bind_addr);

        let mut shutdown_rx = self.ctx.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.ctx.clients.read().await.len();
                            if clients_count >= self.ctx.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(Self::refuse_connection(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            tokio::spawn(Self::handle_connection(Arc::clone(&self.ctx), stream, addr));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Tell an over-limit client why it is being dropped.
    async fn refuse_connection(stream: TcpStream, addr: SocketAddr) {
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        let refusal = ServerMessage::error(
            ErrorCode::ServerOverloaded,
            GameServerError::ConnectionLimitReached.to_string(),
        );
        if let Ok(text) = refusal.to_json() {
            let _ = ws.send(Message::Text(text)).await;
        }
        let _ = ws.close(None).await;
        debug!("Refused {}", addr);
    }

    /// Serve one WebSocket connection until it closes.
    async fn handle_connection(ctx: Arc<HostContext>, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
        let mut shutdown_rx = ctx.shutdown_tx.subscribe();

        ctx.clients.write().await.insert(addr, ConnectedClient {
            player_id: None,
            name: String::new(),
            sender: msg_tx.clone(),
        });

        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match ClientMessage::from_json(&text) {
                                Ok(client_msg) => {
                                    Self::handle_client_message(&ctx, addr, client_msg, &msg_tx).await;
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::error(
                                        ErrorCode::InvalidMessage,
                                        "Invalid message format",
                                    )).await;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Host shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        Self::handle_leave(&ctx, addr).await;
        ctx.clients.write().await.remove(&addr);
        // Let queued messages (such as the shutdown notice) drain
        drop(msg_tx);
        let _ = tokio::time::timeout(Duration::from_millis(250), sender_task).await;

        info!("Client {} cleaned up", addr);
    }

    /// Handle a client message.
    async fn handle_client_message(
        ctx: &Arc<HostContext>,
        addr: SocketAddr,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Join(req) => Self::handle_join(ctx, addr, req, sender).await,
            ClientMessage::Ready => Self::handle_ready(ctx, addr, sender).await,
            ClientMessage::RollDice => {
                Self::handle_action(ctx, addr, PlayerAction::Roll, sender).await;
            }
            ClientMessage::PlayCard { card_id, target } => {
                let target = target.as_deref().and_then(PlayerId::from_uuid_str);
                Self::handle_action(ctx, addr, PlayerAction::PlayCard { card_id, target }, sender).await;
            }
            ClientMessage::EndTurn => {
                Self::handle_action(ctx, addr, PlayerAction::EndTurn, sender).await;
            }
            ClientMessage::SyncRequest => {
                let patch = ctx.session.write().await.sync_patch();
                match patch {
                    Some(patch) => {
                        reply(sender, ServerMessage::Patch(patch));
                    }
                    None => {
                        reply(sender, ServerMessage::error(ErrorCode::NotInMatch, "No match running"));
                    }
                }
            }
            ClientMessage::Ping { timestamp } => {
                reply(sender, ServerMessage::Pong { timestamp, server_time: now_millis() });
            }
            ClientMessage::Chat { text } => {
                Self::handle_chat(ctx, addr, &text, sender).await;
            }
            ClientMessage::Leave => {
                Self::handle_leave(ctx, addr).await;
            }
        }
    }

    async fn client_player(ctx: &HostContext, addr: SocketAddr) -> Option<PlayerId> {
        ctx.clients.read().await.get(&addr).and_then(|c| c.player_id)
    }

    /// Handle a join request.
    async fn handle_join(
        ctx: &Arc<HostContext>,
        addr: SocketAddr,
        req: JoinRequest,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if Self::client_player(ctx, addr).await.is_some() {
            reply(sender, ServerMessage::error(ErrorCode::AlreadyJoined, "Already joined"));
            return;
        }

        if !req.client_version.is_empty()
            && major_version(&req.client_version) != major_version(&ctx.config.version)
        {
            reply(sender, ServerMessage::error(
                ErrorCode::VersionMismatch,
                format!("Host runs {}, client {}", ctx.config.version, req.client_version),
            ));
            return;
        }

        let Some(player_id) = req.parsed_id() else {
            reply(sender, ServerMessage::error(ErrorCode::InvalidMessage, "player_id is not a UUID"));
            return;
        };

        let mut session = ctx.session.write().await;

        let rejoined = session.get_state() != SessionState::Lobby
            && session.reconnect_player(&player_id, sender.clone());

        if !rejoined {
            if let Err(e) = session.add_player(player_id, req.name.clone(), sender.clone()) {
                let code = match e {
                    SessionError::SessionFull => ErrorCode::LobbyFull,
                    SessionError::AlreadyInSession => ErrorCode::AlreadyJoined,
                    SessionError::MatchInProgress => ErrorCode::MatchInProgress,
                    _ => ErrorCode::InternalError,
                };
                reply(sender, ServerMessage::error(code, e.to_string()));
                return;
            }
        }

        if let Some(client) = ctx.clients.write().await.get_mut(&addr) {
            client.player_id = Some(player_id);
            client.name = req.name.clone();
        }

        reply(sender, ServerMessage::Joined(JoinedInfo {
            player_id: player_id.to_uuid_string(),
            server_version: ctx.config.version.clone(),
            board: session.board().layout(),
        }));

        reply(sender, ServerMessage::ChatHistory { messages: session.chat_history() });

        if rejoined {
            info!("Player {} ({}) rejoined the match", req.name, player_id.short());
            if let Some(patch) = session.sync_patch() {
                reply(sender, ServerMessage::Patch(patch));
            }
            session.system_message(format!("{} is back", req.name));
        } else {
            info!("Player {} ({}) joined the lobby", req.name, player_id.short());
            session.broadcast(ServerMessage::Lobby(session.lobby_info()));
            session.system_message(format!("{} joined", req.name));
        }
    }

    /// Handle a ready flag; start the match once everybody is ready.
    async fn handle_ready(ctx: &Arc<HostContext>, addr: SocketAddr, sender: &mpsc::Sender<ServerMessage>) {
        let Some(player_id) = Self::client_player(ctx, addr).await else {
            reply(sender, ServerMessage::error(ErrorCode::NotJoined, "Must join first"));
            return;
        };

        let mut session = ctx.session.write().await;
        if session.get_state() != SessionState::Lobby {
            reply(sender, ServerMessage::error(ErrorCode::MatchInProgress, "Match in progress"));
            return;
        }

        session.set_player_ready(&player_id, true);
        debug!("Player {} marked ready", player_id.short());
        session.broadcast(ServerMessage::Lobby(session.lobby_info()));

        if !session.all_players_ready() {
            return;
        }

        let nonce = ctx.matches_played.fetch_add(1, Ordering::Relaxed);
        match session.start_match(nonce) {
            Ok(start) => {
                session.broadcast(ServerMessage::MatchStart(start));
                if let Some(patch) = session.sync_patch() {
                    session.broadcast(ServerMessage::Patch(patch));
                }
                session.system_message("Match started");
                drop(session);

                let loop_ctx = Arc::clone(ctx);
                tokio::spawn(async move {
                    Self::run_game_loop(loop_ctx).await;
                });
            }
            Err(e) => {
                error!("Failed to start match: {}", e);
                reply(sender, ServerMessage::error(
                    ErrorCode::InternalError,
                    format!("Failed to start match: {}", e),
                ));
            }
        }
    }

    /// Route a match action and report a refusal back to its sender.
    async fn handle_action(
        ctx: &Arc<HostContext>,
        addr: SocketAddr,
        action: PlayerAction,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(player_id) = Self::client_player(ctx, addr).await else {
            reply(sender, ServerMessage::error(ErrorCode::NotJoined, "Must join first"));
            return;
        };

        let result = ctx.session.write().await.handle_action(&player_id, action);

        let message = match result {
            Ok(()) => return,
            Err(SessionError::Match(e)) => ServerMessage::from_match_error(action.name(), &e),
            Err(e) => ServerMessage::error(ErrorCode::NotInMatch, e.to_string()),
        };
        reply(sender, message);
    }

    /// Relay a chat line; a refused line or command goes back to its sender.
    async fn handle_chat(
        ctx: &Arc<HostContext>,
        addr: SocketAddr,
        text: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(player_id) = Self::client_player(ctx, addr).await else {
            reply(sender, ServerMessage::error(ErrorCode::NotJoined, "Must join first"));
            return;
        };

        let result = ctx.session.write().await.chat(&player_id, text);

        let message = match result {
            Ok(()) => return,
            Err(SessionError::Match(e)) => ServerMessage::from_match_error("chat", &e),
            Err(e @ SessionError::MatchNotInProgress) => ServerMessage::error(ErrorCode::NotInMatch, e.to_string()),
            Err(e) => ServerMessage::error(ErrorCode::ChatRefused, e.to_string()),
        };
        reply(sender, message);
    }

    /// Handle a player leaving (explicitly or by disconnecting).
    async fn handle_leave(ctx: &Arc<HostContext>, addr: SocketAddr) {
        let seat = {
            let mut clients = ctx.clients.write().await;
            match clients.get_mut(&addr) {
                Some(client) => client.player_id.take().map(|id| (id, client.name.clone())),
                None => None,
            }
        };

        let Some((player_id, name)) = seat else {
            return;
        };

        let mut session = ctx.session.write().await;
        if session.remove_player(&player_id) {
            if session.get_state() == SessionState::Lobby {
                session.broadcast(ServerMessage::Lobby(session.lobby_info()));
                session.system_message(format!("{} left", name));
            } else {
                session.system_message(format!("{} disconnected", name));
            }
        }
        debug!("Player {} left", player_id.short());
    }

    /// Tick the running match, then publish results and open a new lobby.
    async fn run_game_loop(ctx: Arc<HostContext>) {
        let tick_ms = ctx.config.tick_ms();
        let mut tick_interval = interval(Duration::from_millis(tick_ms as u64));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown_rx = ctx.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {}
                _ = shutdown_rx.recv() => return,
            }

            let mut session = ctx.session.write().await;

            let Some(result) = session.run_tick(tick_ms) else {
                break;
            };

            for event in result.events {
                session.broadcast(ServerMessage::Event(event));
            }
            if let Some(patch) = result.patch {
                session.broadcast(ServerMessage::Patch(patch));
            }

            if result.match_ended {
                break;
            }
        }

        {
            let mut session = ctx.session.write().await;
            if let Some(end_info) = session.finalize() {
                info!(
                    "Match {} ended, winner {:?}",
                    end_info.match_id,
                    end_info.winner_id
                );
                session.broadcast(ServerMessage::MatchEnd(end_info));
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        Self::open_next_lobby(&ctx).await;
    }

    /// Replace the finished session with a new lobby holding everyone still
    /// connected.
    async fn open_next_lobby(ctx: &Arc<HostContext>) {
        let mut next = ctx.new_session();

        {
            let mut clients = ctx.clients.write().await;
            for (addr, client) in clients.iter_mut() {
                let Some(player_id) = client.player_id else {
                    continue;
                };
                if let Err(e) = next.add_player(player_id, client.name.clone(), client.sender.clone()) {
                    warn!("Could not carry {} into the next lobby: {}", addr, e);
                    client.player_id = None;
                }
            }
        }

        let mut session = ctx.session.write().await;
        *session = next;
        session.broadcast(ServerMessage::Lobby(session.lobby_info()));
        info!("New lobby open with {} players", session.player_count());
    }

    /// Shutdown the host.
    pub fn shutdown(&self) {
        let _ = self.ctx.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.ctx.clients.read().await.len()
    }

    /// Players seated in the current session.
    pub async fn player_count(&self) -> usize {
        self.ctx.session.read().await.player_count()
    }

    /// State of the current session.
    pub async fn session_state(&self) -> SessionState {
        self.ctx.session.read().await.get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::TileEffect;
    use crate::game::cards::CardCatalog;

    fn create_test_server() -> GameServer {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        };
        GameServer::new(
            config,
            Board::ring(vec![TileEffect::None; 8]).unwrap(),
            Arc::new(CardCatalog::starter()),
        )
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, crate::DEFAULT_TICK_RATE);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.session.min_players, 2);
        assert_eq!(config.tick_ms(), 1000 / crate::DEFAULT_TICK_RATE);
    }

    #[test]
    fn test_server_config_from_json() {
        let config = ServerConfig::from_json(
            r#"{"bind_addr":"127.0.0.1:9000","tick_rate":10,"session":{"max_players":6}}"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.tick_ms(), 100);
        assert_eq!(config.session.max_players, 6);
        assert_eq!(config.session.min_players, 2);

        assert!(matches!(
            ServerConfig::from_json(r#"{"tick_rate":0}"#),
            Err(GameServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerConfig::from_json(r#"{"session":{"min_players":5,"max_players":4}}"#),
            Err(GameServerError::InvalidConfig(_))
        ));
        assert!(matches!(ServerConfig::from_json("{"), Err(GameServerError::Config(_))));
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("1.4.2"), "1");
        assert_eq!(major_version("0"), "0");
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = create_test_server();

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.player_count().await, 0);
        assert_eq!(server.session_state().await, SessionState::Lobby);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = create_test_server();
        server.shutdown();
        // Should not panic
    }
}
