//! Tokens
//!
//! A token is a player's piece on the board. Movement is an explicit state
//! machine advanced by `tick`: `Idle -> Moving -> Idle`, one hop per
//! `hop_ms`. Completion is published on a `watch` channel so other tasks can
//! await it without holding the coordinator.

use std::future::Future;

use tokio::sync::watch;
use tracing::debug;

use crate::game::board::TileId;
use crate::game::state::PlayerId;

/// Movement state of a token.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum MovementState {
    /// Standing on its tile
    #[default]
    Idle,
    /// Hopping along a path
    Moving {
        /// Tiles still to visit, in order
        path: Vec<TileId>,
        /// Index of the next hop in `path`
        step: usize,
        /// Time spent on the current hop
        progress_ms: u32,
    },
}

/// A player's piece.
#[derive(Debug)]
pub struct Token {
    owner: PlayerId,
    tile: TileId,
    essence: i32,
    movement: MovementState,
    moving_tx: watch::Sender<bool>,
}

impl Token {
    /// Token standing on `start` with a full essence pool.
    pub fn new(owner: PlayerId, start: TileId, essence: i32) -> Self {
        let (moving_tx, _) = watch::channel(false);
        Self {
            owner,
            tile: start,
            essence,
            movement: MovementState::Idle,
            moving_tx,
        }
    }

    /// Owning player.
    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Tile the token stands on (last completed hop while moving).
    pub fn tile(&self) -> TileId {
        self.tile
    }

    /// Current essence.
    pub fn essence(&self) -> i32 {
        self.essence
    }

    /// Essence above zero.
    pub fn is_alive(&self) -> bool {
        self.essence > 0
    }

    /// Add (or with a negative amount, remove) essence. Returns the new value.
    pub fn modify_essence(&mut self, amount: i32) -> i32 {
        self.essence = self.essence.saturating_add(amount);
        self.essence
    }

    /// Mutable handle on the essence pool.
    pub fn essence_mut(&mut self) -> &mut i32 {
        &mut self.essence
    }

    /// Movement state.
    pub fn movement(&self) -> &MovementState {
        &self.movement
    }

    /// Mid-movement.
    pub fn is_moving(&self) -> bool {
        matches!(self.movement, MovementState::Moving { .. })
    }

    /// Where the current movement ends.
    pub fn destination(&self) -> Option<TileId> {
        match &self.movement {
            MovementState::Moving { path, .. } => path.last().copied(),
            MovementState::Idle => None,
        }
    }

    /// Start hopping along `path`. Returns false if already moving. An empty
    /// path leaves the token idle.
    pub fn begin_move(&mut self, path: Vec<TileId>) -> bool {
        if self.is_moving() {
            return false;
        }
        if path.is_empty() {
            return true;
        }

        debug!("Token {} moving {} tiles", self.owner.short(), path.len());
        self.movement = MovementState::Moving { path, step: 0, progress_ms: 0 };
        self.moving_tx.send_replace(true);
        true
    }

    /// Put the token on a tile directly. Ignored while moving.
    pub fn place(&mut self, tile: TileId) {
        if !self.is_moving() {
            self.tile = tile;
        }
    }

    /// Advance movement by `dt_ms`. Returns the tiles reached during this
    /// call. Leftover time carries into the next hop.
    pub fn tick(&mut self, dt_ms: u32, hop_ms: u32) -> Vec<TileId> {
        let mut reached = Vec::new();
        let hop_ms = hop_ms.max(1);

        let finished = match &mut self.movement {
            MovementState::Idle => return reached,
            MovementState::Moving { path, step, progress_ms } => {
                *progress_ms = progress_ms.saturating_add(dt_ms);
                while *progress_ms >= hop_ms && *step < path.len() {
                    *progress_ms -= hop_ms;
                    self.tile = path[*step];
                    reached.push(path[*step]);
                    *step += 1;
                }
                *step >= path.len()
            }
        };

        if finished {
            self.movement = MovementState::Idle;
            self.moving_tx.send_replace(false);
        }

        reached
    }

    /// Future that resolves once the token is idle. Resolves immediately if
    /// it already is, or if the token is dropped.
    pub fn wait_idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.moving_tx.subscribe();
        async move {
            let _ = rx.wait_for(|moving| !*moving).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        Token::new(PlayerId::new([1; 16]), TileId(0), 10)
    }

    #[test]
    fn test_hops_take_hop_time() {
        let mut token = token();
        assert!(token.begin_move(vec![TileId(1), TileId(2)]));
        assert_eq!(token.destination(), Some(TileId(2)));

        assert!(token.tick(499, 500).is_empty());
        assert_eq!(token.tick(1, 500), vec![TileId(1)]);
        assert!(token.is_moving());

        assert_eq!(token.tick(500, 500), vec![TileId(2)]);
        assert!(!token.is_moving());
        assert_eq!(token.tile(), TileId(2));
    }

    #[test]
    fn test_large_tick_covers_several_hops() {
        let mut token = token();
        token.begin_move(vec![TileId(1), TileId(2), TileId(3)]);

        let reached = token.tick(5000, 500);
        assert_eq!(reached, vec![TileId(1), TileId(2), TileId(3)]);
        assert_eq!(token.movement(), &MovementState::Idle);
    }

    #[test]
    fn test_cannot_start_second_move() {
        let mut token = token();
        assert!(token.begin_move(vec![TileId(1)]));
        assert!(!token.begin_move(vec![TileId(5)]));
        assert_eq!(token.destination(), Some(TileId(1)));
    }

    #[test]
    fn test_empty_path_stays_idle() {
        let mut token = token();
        assert!(token.begin_move(Vec::new()));
        assert!(!token.is_moving());
    }

    #[test]
    fn test_essence() {
        let mut token = token();
        assert_eq!(token.modify_essence(-4), 6);
        assert!(token.is_alive());
        assert_eq!(token.modify_essence(-6), 0);
        assert!(!token.is_alive());
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_after_tick() {
        let mut token = token();
        token.begin_move(vec![TileId(1)]);

        let idle = tokio::spawn(token.wait_idle());
        tokio::task::yield_now().await;
        assert!(!idle.is_finished());

        token.tick(500, 500);
        idle.await.unwrap();
        assert_eq!(token.tile(), TileId(1));
    }

    #[tokio::test]
    async fn test_wait_idle_when_already_idle() {
        let token = token();
        token.wait_idle().await;
    }
}
