//! Match Coordinator
//!
//! Single writer for one match. Player actions come in through
//! `request_roll`, `play_card` and `end_turn`; everything time-based (dice
//! settling, token hops, landing resolution, turn hand-over) happens inside
//! `tick`. Events raised along the way are queued and drained once per tick.
//!
//! Turn flow:
//!
//! ```text
//! AwaitingAction --roll--> Rolling --settle--> Moving --arrive--> resolve
//!       ^                                                            |
//!       +------------------- next turn (or repeat) <-----------------+
//! ```
//!
//! Card moves go `AwaitingAction -> Moving -> AwaitingAction` without
//! resolving the tile or ending the turn.

use std::future::Future;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::error::{MatchError, NotFoundKind, RejectReason, SetupError};
use crate::game::board::{Board, Direction, TileEffect, TileId, MAX_EFFECT_STEPS};
use crate::game::cards::{CardId, CardRegistry, EffectContext, EffectKind, Reach};
use crate::game::dice::{DiceOutcome, DiceRoll, DiceTray};
use crate::game::events::{BroadcastSink, EventQueue, MatchEvent, MatchEventData};
use crate::game::gate::ActionGate;
use crate::game::replica::{Patch, TokenSnapshot};
use crate::game::resolver::{TileResolver, TurnOutcome};
use crate::game::state::{MatchPhase, MatchState, PlayerId, RosterEntry, TurnPhase};
use crate::game::token::Token;
use crate::game::turn::Advance;

// =============================================================================
// CONFIG
// =============================================================================

/// Rules and timings for one match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Dice thrown per roll
    pub dice_count: u32,
    /// Time per tile hop
    pub hop_ms: u32,
    /// Time for a die to settle
    pub die_settle_ms: u32,
    /// Card plays allowed per turn
    pub max_cards_per_turn: u32,
    /// Hand size cap
    pub hand_limit: usize,
    /// Essence each token starts with
    pub starting_essence: i32,
    /// Damage dealt by a damage tile to each other token on it
    pub co_located_damage: i32,
    /// Cards dealt to every player at match start
    pub starting_hand: Vec<CardId>,
    /// End the match when one player remains
    pub last_player_standing: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            dice_count: 2,
            hop_ms: 500,
            die_settle_ms: 1500,
            max_cards_per_turn: 1,
            hand_limit: 5,
            starting_essence: 20,
            co_located_damage: 2,
            starting_hand: Vec::new(),
            last_player_standing: true,
        }
    }
}

impl MatchConfig {
    /// Reject configurations no match can be played with.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.dice_count == 0 {
            return Err(SetupError::NoDice);
        }
        if self.starting_essence <= 0 {
            return Err(SetupError::NoEssence);
        }
        Ok(())
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick number
    pub tick: u64,
    /// Events raised since the previous tick
    pub events: Vec<MatchEvent>,
    /// Snapshot, if anything replicated changed
    pub patch: Option<Patch>,
    /// Match ended since the previous tick
    pub match_ended: bool,
    /// Winner (if match ended with winner)
    pub winner: Option<PlayerId>,
}

/// What a card play did.
#[derive(Clone, Debug)]
pub struct CardPlay {
    /// Card played
    pub card_id: CardId,
    /// Its effect
    pub effect: EffectKind,
    /// Path of the move it started (empty if none)
    pub path: Vec<TileId>,
    /// Tokens whose essence changed, with the new value
    pub affected: Vec<(PlayerId, i32)>,
}

/// What to do when the active token stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AfterMove {
    /// Dice move: resolve the landed tile
    ResolveTile,
    /// Follow-up move from a tile effect: hand the turn over
    FinishTurn { repeat: bool },
    /// Card move: back to waiting for the same player
    Resume,
}

/// Status line announcing the tile a dice move stopped on.
fn landing_status(name: &str, effect: &TileEffect) -> String {
    match effect {
        TileEffect::None => format!("{} is in a normal tile, nothing happens", name),
        TileEffect::Penalty(n) => format!("{} is in a fail tile, move back {} tiles", name, n),
        TileEffect::Bonus(n) => format!("{} is in a buff tile, move forward {} tiles", name, n),
        TileEffect::ExtraTurn => format!("{} is in a one turn tile, they can throw the dice again", name),
        TileEffect::CardDraw { .. } => format!("{} is in a card tile, drawing a card", name),
        TileEffect::Damage => format!("{} is in a damage tile, tokens here lose essence", name),
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Authoritative coordinator for one match.
pub struct MatchCoordinator {
    state: MatchState,
    board: Board,
    tokens: Vec<Token>,
    dice: DiceTray,
    rng: DeterministicRng,
    registry: Arc<dyn CardRegistry>,
    sink: Arc<dyn BroadcastSink>,
    config: MatchConfig,
    gate: ActionGate,
    events: EventQueue,
    after_move: Option<AfterMove>,
    tick: u64,
    patch_sequence: u64,
    dirty: bool,
    ended_unreported: bool,
}

impl MatchCoordinator {
    /// Assemble a match. Every token starts on the board's start tile and
    /// every player is dealt `config.starting_hand`. The first roster entry
    /// takes the first turn.
    pub fn new(
        match_id: [u8; 16],
        roster: Vec<RosterEntry>,
        board: Board,
        registry: Arc<dyn CardRegistry>,
        sink: Arc<dyn BroadcastSink>,
        config: MatchConfig,
        seed: u64,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let mut state = MatchState::new(match_id, roster, config.hand_limit)?;

        let tokens = state
            .players
            .iter()
            .map(|p| Token::new(p.id, board.start(), config.starting_essence))
            .collect();

        for card in &config.starting_hand {
            if registry.card(*card).is_none() {
                warn!("Starting card {} not in registry, skipping", card);
                continue;
            }
            for player in &mut state.players {
                if !player.hand.add(*card) {
                    debug!("Hand of {} full, starting card {} dropped", player.id.short(), card);
                }
            }
        }

        info!(
            "Match {} created: {} players, {} tiles, seed {}",
            hex::encode(&match_id[..4]),
            state.players.len(),
            board.len(),
            seed
        );

        let mut coordinator = Self {
            dice: DiceTray::new(config.die_settle_ms),
            rng: DeterministicRng::new(seed),
            gate: ActionGate::new(config.max_cards_per_turn),
            state,
            board,
            tokens,
            registry,
            sink,
            config,
            events: EventQueue::new(),
            after_move: None,
            tick: 0,
            patch_sequence: 0,
            dirty: true,
            ended_unreported: false,
        };
        coordinator.announce_turn();

        Ok(coordinator)
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Throw the dice for the turn-holder. The returned roll resolves once
    /// the dice settle; the token then moves on its own as ticks elapse.
    pub fn request_roll(&mut self, player: &PlayerId) -> Result<DiceRoll, MatchError> {
        if let Err(e) = self.gate.can_roll(&self.state, player) {
            debug!("Roll from {} rejected: {}", player.short(), e);
            return Err(e);
        }

        let roll = self
            .dice
            .throw(self.config.dice_count, &mut self.rng)
            .map_err(|_| MatchError::rejected(RejectReason::MidMovement))?;

        self.state.cursor.has_rolled = true;
        self.state.turn_phase = TurnPhase::Rolling;
        self.dirty = true;

        let name = self.name_at(self.state.cursor.index);
        self.events.status(format!("{} throws the dice...", name));

        Ok(roll)
    }

    /// Play a card from the turn-holder's hand.
    ///
    /// `target` is required by cards that hit a chosen player; it must be
    /// another player still in the match.
    pub fn play_card(
        &mut self,
        player: &PlayerId,
        card_id: CardId,
        target: Option<PlayerId>,
    ) -> Result<CardPlay, MatchError> {
        self.gate.can_play_card(&self.state, player)?;
        let idx = self.state.cursor.index;

        if !self.state.players[idx].hand.contains(card_id) {
            return Err(MatchError::not_found(NotFoundKind::CardInHand, card_id));
        }

        let registry = Arc::clone(&self.registry);
        let card = registry
            .card(card_id)
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Card, card_id))?;
        let effect = card.effect;

        let target_idx = if effect.needs_target() {
            Some(self.validate_target(idx, target)?)
        } else {
            None
        };

        self.state.players[idx].hand.remove(card_id);
        self.state.cursor.cards_played += 1;
        self.dirty = true;

        let name = self.name_at(idx);
        info!("{} plays {} ({})", name, card.name, card_id);
        self.events.push(MatchEventData::CardPlayed {
            player_id: *player,
            card_id,
            target: target_idx.map(|t| self.state.players[t].id),
        });
        self.events.status(format!("{} played {}", name, card.name));

        let mut play = CardPlay { card_id, effect, path: Vec::new(), affected: Vec::new() };

        match effect {
            EffectKind::Move { steps, direction } => {
                let path = self.board.walk(self.tokens[idx].tile(), steps, direction);
                if !path.is_empty() {
                    self.events.status(format!("{} is moving {} tiles", name, path.len()));
                }
                play.path = path.clone();
                self.start_move(idx, path, AfterMove::Resume);
            }
            EffectKind::Damage { amount, reach } => {
                let tiles = self.reach_tiles(self.tokens[idx].tile(), reach);
                for other in 0..self.tokens.len() {
                    if other == idx
                        || self.state.players[other].eliminated
                        || !tiles.contains(&self.tokens[other].tile())
                    {
                        continue;
                    }
                    play.affected.push(self.change_essence(other, -amount));
                }
            }
            EffectKind::DirectAttack { amount } => {
                if let Some(t) = target_idx {
                    play.affected.push(self.change_essence(t, -amount));
                }
            }
            EffectKind::Heal { amount } => {
                play.affected.push(self.change_essence(idx, amount));
            }
            EffectKind::Custom(apply) => {
                let before = self.tokens[idx].essence();
                let mut lines = Vec::new();
                apply(&mut EffectContext {
                    owner_essence: self.tokens[idx].essence_mut(),
                    status: &mut lines,
                });
                for line in lines {
                    self.events.status(line);
                }
                let essence = self.tokens[idx].essence();
                if essence != before {
                    self.events.push(MatchEventData::EssenceChanged { player_id: *player, essence });
                    play.affected.push((*player, essence));
                }
            }
        }

        self.check_eliminations();
        if !self.state.is_ended() && self.state.players[idx].eliminated {
            // Knocked themselves out; the turn moves on
            self.after_move = None;
            self.pass_turn(false);
        }

        Ok(play)
    }

    /// Hand the turn over without rolling.
    pub fn end_turn(&mut self, player: &PlayerId) -> Result<(), MatchError> {
        self.gate.can_end_turn(&self.state, player)?;

        let name = self.name_at(self.state.cursor.index);
        self.events.status(format!("{} ends the turn", name));
        self.finish_turn(false);

        Ok(())
    }

    /// Knock a player out of the match, e.g. after they stayed away too
    /// long. The turn-holder can only forfeit between actions; the turn then
    /// passes on.
    pub fn forfeit(&mut self, player: &PlayerId) -> Result<(), MatchError> {
        self.outcome()?;
        let idx = self
            .state
            .index_of(player)
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Player, player.to_uuid_string()))?;
        if self.state.players[idx].eliminated {
            return Ok(());
        }

        let holds_turn = idx == self.state.cursor.index;
        if holds_turn && self.state.turn_phase != TurnPhase::AwaitingAction {
            return Err(MatchError::rejected(RejectReason::MidMovement));
        }

        let name = self.name_at(idx);
        info!("{} forfeits", name);
        self.events.status(format!("{} has forfeited", name));

        let essence = self.tokens[idx].essence();
        if essence > 0 {
            let essence = self.tokens[idx].modify_essence(-essence);
            self.events.push(MatchEventData::EssenceChanged { player_id: *player, essence });
        }
        self.dirty = true;

        self.check_eliminations();
        if holds_turn && !self.state.is_ended() {
            self.pass_turn(false);
        }
        Ok(())
    }

    /// Host command: move the turn-holder `steps` tiles (negative goes
    /// back) without resolving the destination or ending the turn.
    pub fn nudge_current(&mut self, steps: i32) -> Result<Vec<TileId>, MatchError> {
        self.outcome()?;
        if self.state.turn_phase != TurnPhase::AwaitingAction {
            return Err(MatchError::rejected(RejectReason::MidMovement));
        }

        let idx = self.state.cursor.index;
        let direction = if steps < 0 { Direction::Backward } else { Direction::Forward };
        let count = steps.unsigned_abs().min(MAX_EFFECT_STEPS);
        let path = self.board.walk(self.tokens[idx].tile(), count, direction);

        let name = self.name_at(idx);
        self.events.status(format!("{} was moved {} tiles", name, path.len()));
        self.start_move(idx, path.clone(), AfterMove::Resume);
        Ok(path)
    }

    /// Host command: put a card in a player's hand. Returns whether it fit.
    pub fn grant_card(&mut self, player: &PlayerId, card_id: CardId) -> Result<bool, MatchError> {
        self.outcome()?;
        if self.registry.card(card_id).is_none() {
            return Err(MatchError::not_found(NotFoundKind::Card, card_id));
        }
        let idx = self
            .state
            .index_of(player)
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Player, player.to_uuid_string()))?;

        let kept = self.state.players[idx].hand.add(card_id);
        self.events.push(MatchEventData::CardDrawn { player_id: *player, card_id, kept });
        self.dirty = true;
        Ok(kept)
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance the match by `dt_ms`.
    ///
    /// Token hops run before dice settle, so a move started this tick takes
    /// its first hop on the next one.
    pub fn tick(&mut self, dt_ms: u32) -> TickResult {
        self.tick += 1;
        self.events.set_tick(self.tick);

        if !self.state.is_ended() {
            self.advance_tokens(dt_ms);
            if let Some(outcome) = self.dice.tick(dt_ms) {
                self.on_dice_settled(outcome);
            }
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            tick = self.tick,
            phase = ?self.state.turn_phase,
            cursor = self.state.cursor.index,
            "Match tick"
        );

        let events = self.flush_events();
        let patch = if self.dirty { Some(self.patch()) } else { None };

        TickResult {
            tick: self.tick,
            events,
            patch,
            match_ended: std::mem::take(&mut self.ended_unreported),
            winner: self.state.winner(),
        }
    }

    fn advance_tokens(&mut self, dt_ms: u32) {
        let hop_ms = self.config.hop_ms;
        let mut arrived = Vec::new();

        for (idx, token) in self.tokens.iter_mut().enumerate() {
            if !token.is_moving() {
                continue;
            }
            if !token.tick(dt_ms, hop_ms).is_empty() {
                self.dirty = true;
            }
            if !token.is_moving() {
                arrived.push(idx);
            }
        }

        for idx in arrived {
            self.on_arrival(idx);
        }
    }

    fn on_dice_settled(&mut self, outcome: DiceOutcome) {
        let idx = self.state.cursor.index;
        let Some(player) = self.state.players.get(idx) else {
            return;
        };
        let (player_id, name) = (player.id, player.name.clone());

        debug!("Dice settled for {}: {:?}", player_id.short(), outcome.faces);
        self.events.push(MatchEventData::DiceResult {
            player_id,
            text: format!("{} rolled {}", name, outcome.describe()),
            faces: outcome.faces,
            total: outcome.total,
        });
        self.events.status(format!("{} is moving {} tiles", name, outcome.total));

        let path = self.board.walk(self.tokens[idx].tile(), outcome.total, Direction::Forward);
        self.start_move(idx, path, AfterMove::ResolveTile);
    }

    fn start_move(&mut self, idx: usize, path: Vec<TileId>, after: AfterMove) {
        self.dirty = true;
        self.after_move = Some(after);
        self.state.turn_phase = TurnPhase::Moving;

        if path.is_empty() || !self.tokens[idx].begin_move(path) {
            // Nowhere to go; arrive where we stand
            self.on_arrival(idx);
        }
    }

    fn on_arrival(&mut self, idx: usize) {
        if idx != self.state.cursor.index || self.state.turn_phase != TurnPhase::Moving {
            return;
        }
        let Some(after) = self.after_move.take() else {
            return;
        };

        let player_id = self.tokens[idx].owner();
        let tile = self.tokens[idx].tile();
        let name = self.name_at(idx);
        self.events.push(MatchEventData::TokenMoved { player_id, tile });
        self.events.status(format!("{} is stopped", name));

        match after {
            AfterMove::ResolveTile => self.resolve_landing(idx),
            AfterMove::FinishTurn { repeat } => self.finish_turn(repeat),
            AfterMove::Resume => self.state.turn_phase = TurnPhase::AwaitingAction,
        }
    }

    fn resolve_landing(&mut self, idx: usize) {
        if let Some(tile) = self.board.tile(self.tokens[idx].tile()) {
            let line = landing_status(&self.name_at(idx), &tile.effect);
            self.events.status(line);
        }

        let resolver = TileResolver::new(&self.board, self.config.co_located_damage);
        let outcome = resolver.resolve(
            idx,
            &mut self.state.players[idx],
            &mut self.tokens,
            &mut self.rng,
        );
        self.report_outcome(idx, &outcome);

        if outcome.has_follow_up() {
            let name = self.name_at(idx);
            self.events.status(format!("{} is moving {} tiles", name, outcome.follow_up.len()));
            self.after_move = Some(AfterMove::FinishTurn { repeat: outcome.repeat });
        } else {
            self.finish_turn(outcome.repeat);
        }
    }

    fn report_outcome(&mut self, idx: usize, outcome: &TurnOutcome) {
        let name = self.name_at(idx);
        let player_id = self.state.players[idx].id;

        if let Some(card_id) = outcome.drawn {
            let card_name = self
                .registry
                .card(card_id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| card_id.to_string());
            self.events.push(MatchEventData::CardDrawn {
                player_id,
                card_id,
                kept: !outcome.discarded,
            });
            if outcome.discarded {
                self.events.status(format!("{}'s hand is full, {} was discarded", name, card_name));
            } else {
                self.events.status(format!("{} drew {}", name, card_name));
            }
        }

        for (victim, essence) in &outcome.damaged {
            self.events.push(MatchEventData::EssenceChanged { player_id: *victim, essence: *essence });
        }
    }

    // =========================================================================
    // TURN HAND-OVER
    // =========================================================================

    fn finish_turn(&mut self, repeat: bool) {
        let idx = self.state.cursor.index;
        if let Some(player) = self.state.players.get_mut(idx) {
            player.turns_taken += 1;
        }
        self.dirty = true;

        self.check_eliminations();
        if self.state.is_ended() {
            return;
        }
        self.pass_turn(repeat);
    }

    fn pass_turn(&mut self, repeat: bool) {
        match self.state.cursor.advance(&self.state.players, repeat) {
            Advance::Repeat { .. } | Advance::Next { .. } => {
                self.state.turn_phase = TurnPhase::AwaitingAction;
                self.dirty = true;
                self.announce_turn();
            }
            Advance::Ended | Advance::AlreadyEnded => self.end_match(None),
        }
    }

    fn announce_turn(&mut self) {
        let Some(player) = self.state.current_player() else {
            return;
        };
        let player_id = player.id;
        let text = format!("Player {}'s turn", player.name);

        info!("{}", text);
        self.events.push(MatchEventData::TurnChanged { player_id, text });
    }

    fn check_eliminations(&mut self) {
        for idx in 0..self.state.players.len() {
            let essence = self.tokens[idx].essence();
            let player = &mut self.state.players[idx];
            if player.eliminated || essence > 0 {
                continue;
            }

            player.eliminated = true;
            let (player_id, name) = (player.id, player.name.clone());
            let placement = (self.state.active_player_count() + 1) as u8;

            info!("{} eliminated (placement {})", name, placement);
            self.events.push(MatchEventData::PlayerEliminated { player_id, placement });
            self.events.status(format!("{} has been eliminated", name));
            self.dirty = true;
        }

        let active = self.state.active_player_count();
        if active == 0 {
            self.end_match(None);
        } else if self.config.last_player_standing && self.state.players.len() > 1 && active == 1 {
            let winner = self.state.players.iter().find(|p| !p.eliminated).map(|p| p.id);
            self.end_match(winner);
        }
    }

    fn end_match(&mut self, winner: Option<PlayerId>) {
        if self.state.is_ended() {
            return;
        }

        self.state.phase = MatchPhase::Ended { winner };
        self.state.turn_phase = TurnPhase::Finished;
        self.state.cursor.ended = true;
        self.after_move = None;
        self.dirty = true;
        self.ended_unreported = true;

        let turns = self.state.cursor.turn_number;
        self.events.push(MatchEventData::MatchEnded { winner_id: winner, turns });

        let text = match winner.and_then(|id| self.state.get_player(&id)) {
            Some(p) => format!("{} wins the match", p.name),
            None => String::from("Match over, no survivors"),
        };
        info!("{}", text);
        self.events.status(text);
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn validate_target(&self, idx: usize, target: Option<PlayerId>) -> Result<usize, MatchError> {
        let target = target.ok_or(MatchError::rejected(RejectReason::MissingTarget))?;
        let t = self
            .state
            .index_of(&target)
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Player, target.to_uuid_string()))?;

        if t == idx || self.state.players[t].eliminated {
            return Err(MatchError::rejected(RejectReason::MissingTarget));
        }
        Ok(t)
    }

    fn reach_tiles(&self, here: TileId, reach: Reach) -> Vec<TileId> {
        let front = self.board.neighbour(here, Direction::Forward);
        let back = self.board.neighbour(here, Direction::Backward);
        match reach {
            Reach::SameTile => vec![here],
            Reach::FrontTile => front.into_iter().collect(),
            Reach::BackTile => back.into_iter().collect(),
            Reach::FrontAndBack => front.into_iter().chain(back).collect(),
        }
    }

    fn change_essence(&mut self, idx: usize, delta: i32) -> (PlayerId, i32) {
        let essence = self.tokens[idx].modify_essence(delta);
        let player_id = self.tokens[idx].owner();
        let name = self.name_at(idx);

        if delta < 0 {
            self.events.status(format!("{} loses {} essence", name, -delta));
        } else {
            self.events.status(format!("{} gains {} essence", name, delta));
        }
        self.events.push(MatchEventData::EssenceChanged { player_id, essence });
        self.dirty = true;

        (player_id, essence)
    }

    fn name_at(&self, idx: usize) -> String {
        self.state.players.get(idx).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn flush_events(&mut self) -> Vec<MatchEvent> {
        let events = self.events.drain();
        for event in &events {
            event.deliver(self.sink.as_ref());
        }
        events
    }

    fn token_snapshots(&self) -> Vec<TokenSnapshot> {
        self.tokens
            .iter()
            .map(|t| TokenSnapshot {
                owner: t.owner(),
                tile: t.tile(),
                essence: t.essence(),
                moving: t.is_moving(),
            })
            .collect()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Take a full snapshot. Each call gets the next sequence number.
    pub fn patch(&mut self) -> Patch {
        self.patch_sequence += 1;
        self.dirty = false;

        Patch::new(
            self.patch_sequence,
            self.tick,
            self.state.cursor,
            self.state.turn_phase,
            self.state.phase,
            self.state.players.clone(),
            self.token_snapshots(),
        )
    }

    /// Match state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Rules in force.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Token of a player.
    pub fn token(&self, player: &PlayerId) -> Option<&Token> {
        self.state.index_of(player).and_then(|idx| self.tokens.get(idx))
    }

    /// All tokens, in turn order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Future resolving once `player`'s token stops moving.
    pub fn wait_idle(
        &self,
        player: &PlayerId,
    ) -> Result<impl Future<Output = ()> + Send + 'static, MatchError> {
        self.token(player)
            .map(|t| t.wait_idle())
            .ok_or_else(|| MatchError::not_found(NotFoundKind::Player, player.to_uuid_string()))
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Player whose turn it is.
    pub fn current_player(&self) -> Option<PlayerId> {
        self.state.current_player_id()
    }

    /// Match is over.
    pub fn is_ended(&self) -> bool {
        self.state.is_ended()
    }

    /// Winner once ended.
    pub fn winner(&self) -> Option<PlayerId> {
        self.state.winner()
    }

    /// `Err(Terminal)` once the match is over.
    pub fn outcome(&self) -> Result<(), MatchError> {
        match self.state.phase {
            MatchPhase::Ended { winner } => Err(MatchError::Terminal { winner }),
            MatchPhase::Playing => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
