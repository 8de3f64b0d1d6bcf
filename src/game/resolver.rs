//! Tile Resolver
//!
//! Runs once when a dice move ends, dispatching on the landed tile's effect.
//! Follow-up moves (penalty / bonus) are started on the token here; the
//! coordinator waits for the token to go idle before it advances the turn.

use tracing::debug;

use crate::core::rng::DeterministicRng;
use crate::game::board::{Board, Direction, TileEffect, TileId};
use crate::game::cards::CardId;
use crate::game::state::{PlayerId, PlayerState};
use crate::game::token::Token;

/// What the landing did, and how the turn should end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Same player goes again
    pub repeat: bool,
    /// Follow-up move started on the token (empty if none)
    pub follow_up: Vec<TileId>,
    /// Card drawn from the tile's pool
    pub drawn: Option<CardId>,
    /// Drawn card was dropped because the hand is full
    pub discarded: bool,
    /// Tokens hit by tile damage, with their essence afterwards
    pub damaged: Vec<(PlayerId, i32)>,
}

impl TurnOutcome {
    /// A follow-up move is under way.
    pub fn has_follow_up(&self) -> bool {
        !self.follow_up.is_empty()
    }
}

/// Landing rules bound to a board.
#[derive(Clone, Copy, Debug)]
pub struct TileResolver<'a> {
    board: &'a Board,
    co_located_damage: i32,
}

impl<'a> TileResolver<'a> {
    /// Resolver for `board`. `co_located_damage` is what a `Damage` tile
    /// deals to every other token standing on it.
    pub fn new(board: &'a Board, co_located_damage: i32) -> Self {
        Self { board, co_located_damage }
    }

    /// Apply the effect of the tile under `tokens[mover]`.
    ///
    /// `player` is the mover's state; `tokens` holds every token in roster
    /// order. An unknown tile resolves as `None`.
    pub fn resolve(
        &self,
        mover: usize,
        player: &mut PlayerState,
        tokens: &mut [Token],
        rng: &mut DeterministicRng,
    ) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let Some(token) = tokens.get(mover) else {
            return outcome;
        };
        let here = token.tile();

        let effect = self
            .board
            .tile(here)
            .map(|t| t.effect.clone())
            .unwrap_or_default();

        debug!("Resolving tile {} ({:?}) for {}", here, effect, player.id.short());

        match effect {
            TileEffect::None => {}
            TileEffect::Penalty(steps) => {
                player.fails_hit += 1;
                outcome.follow_up = self.start_move(&mut tokens[mover], steps, Direction::Backward);
            }
            TileEffect::Bonus(steps) => {
                player.buffs_hit += 1;
                outcome.follow_up = self.start_move(&mut tokens[mover], steps, Direction::Forward);
            }
            TileEffect::ExtraTurn => {
                outcome.repeat = true;
            }
            TileEffect::CardDraw { pool } => {
                if let Some(card) = rng.choose(&pool).copied() {
                    outcome.drawn = Some(card);
                    outcome.discarded = !player.hand.add(card);
                }
            }
            TileEffect::Damage => {
                for (idx, other) in tokens.iter_mut().enumerate() {
                    if idx == mover || other.tile() != here || !other.is_alive() {
                        continue;
                    }
                    let essence = other.modify_essence(-self.co_located_damage);
                    outcome.damaged.push((other.owner(), essence));
                }
            }
        }

        outcome
    }

    fn start_move(&self, token: &mut Token, steps: u32, direction: Direction) -> Vec<TileId> {
        let path = self.board.walk(token.tile(), steps, direction);
        if token.begin_move(path.clone()) {
            path
        } else {
            Vec::new()
        }
    }
}
