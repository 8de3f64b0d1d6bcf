//! Board Route
//!
//! Tiles form a route through `next` / `previous` links, usually closed into
//! a ring. Each tile binds at most one landing effect. The layout is fixed
//! once the match starts.

use serde::{Serialize, Deserialize};

use crate::error::{MatchError, NotFoundKind, SetupError};
use crate::game::cards::CardId;

/// Largest step count a tile or card effect may carry.
pub const MAX_EFFECT_STEPS: u32 = 64;

/// Tile identifier; equal to the tile's position in the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId(pub u32);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction along the route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow `next` links
    Forward,
    /// Follow `previous` links
    Backward,
}

/// Board region. Cosmetic only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileRegion {
    /// No region
    #[default]
    Neutral,
    /// Ice fields
    Frozen,
    /// Grassland
    Plains,
    /// Player-versus-player arena
    Pvp,
    /// Lava fields
    Volcanic,
    /// Deep water
    Abyssal,
}

/// Effect bound to a tile, applied when a dice move ends on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileEffect {
    /// Nothing happens
    #[default]
    None,
    /// Move back n tiles
    Penalty(u32),
    /// Move forward n tiles
    Bonus(u32),
    /// Same player goes again
    ExtraTurn,
    /// Draw one card at random from the pool
    CardDraw {
        /// Candidate cards
        pool: Vec<CardId>,
    },
    /// Damage every other token on this tile
    Damage,
}

/// One node of the route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tile {
    /// Tile id (position in the layout)
    pub id: TileId,
    /// Next tile along the route
    #[serde(default)]
    pub next: Option<TileId>,
    /// Previous tile along the route
    #[serde(default)]
    pub previous: Option<TileId>,
    /// Tokens spawn here
    #[serde(default)]
    pub is_start: bool,
    /// Cosmetic region
    #[serde(default)]
    pub region: TileRegion,
    /// Landing effect
    #[serde(default)]
    pub effect: TileEffect,
}

impl Tile {
    /// Unlinked tile with an effect.
    pub fn new(id: u32, effect: TileEffect) -> Self {
        Self {
            id: TileId(id),
            next: None,
            previous: None,
            is_start: false,
            region: TileRegion::Neutral,
            effect,
        }
    }
}

/// Serializable board description.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoardLayout {
    /// Tiles in id order
    pub tiles: Vec<Tile>,
}

/// Validated board.
#[derive(Clone, Debug)]
pub struct Board {
    tiles: Vec<Tile>,
    start: TileId,
}

impl Board {
    /// Validate a layout: non-empty, ids match positions, links resolve,
    /// effect step counts within `MAX_EFFECT_STEPS`, one start tile (the
    /// first flagged one wins).
    pub fn from_layout(layout: BoardLayout) -> Result<Self, SetupError> {
        let tiles = layout.tiles;
        if tiles.is_empty() {
            return Err(SetupError::EmptyBoard);
        }

        let count = tiles.len() as u32;
        for (position, tile) in tiles.iter().enumerate() {
            if tile.id.0 != position as u32 {
                return Err(SetupError::TileIdMismatch { position: position as u32, id: tile.id.0 });
            }
            for link in [tile.next, tile.previous].into_iter().flatten() {
                if link.0 >= count {
                    return Err(SetupError::DanglingLink { tile: tile.id.0, target: link.0 });
                }
            }
            if let TileEffect::Penalty(steps) | TileEffect::Bonus(steps) = tile.effect {
                if steps > MAX_EFFECT_STEPS {
                    return Err(SetupError::TooManySteps { tile: tile.id.0, steps });
                }
            }
        }

        let start = tiles
            .iter()
            .find(|t| t.is_start)
            .map(|t| t.id)
            .ok_or(SetupError::MissingStartTile)?;

        Ok(Self { tiles, start })
    }

    /// Parse and validate a JSON layout.
    pub fn from_json(json: &str) -> Result<Self, BoardLoadError> {
        let layout: BoardLayout = serde_json::from_str(json)?;
        Ok(Self::from_layout(layout)?)
    }

    /// Closed ring, one tile per effect, tile 0 as start.
    pub fn ring(effects: Vec<TileEffect>) -> Result<Self, SetupError> {
        let count = effects.len() as u32;
        let tiles = effects
            .into_iter()
            .enumerate()
            .map(|(i, effect)| {
                let i = i as u32;
                let mut tile = Tile::new(i, effect);
                tile.next = Some(TileId((i + 1) % count));
                tile.previous = Some(TileId((i + count - 1) % count));
                tile.is_start = i == 0;
                tile
            })
            .collect();

        Self::from_layout(BoardLayout { tiles })
    }

    /// Start tile.
    pub fn start(&self) -> TileId {
        self.start
    }

    /// Tile count.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Boards always have tiles once validated.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile by id.
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.0 as usize)
    }

    /// Tile by id; a miss is a `NotFound` error.
    pub fn require_tile(&self, id: TileId) -> Result<&Tile, MatchError> {
        self.tile(id).ok_or_else(|| MatchError::not_found(NotFoundKind::Tile, id))
    }

    /// All tiles in id order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Neighbour in a direction.
    pub fn neighbour(&self, id: TileId, direction: Direction) -> Option<TileId> {
        let tile = self.tile(id)?;
        match direction {
            Direction::Forward => tile.next,
            Direction::Backward => tile.previous,
        }
    }

    /// Tiles visited by walking `steps` hops from `from`. Stops early at a
    /// dead end, so the path may be shorter than `steps`.
    pub fn walk(&self, from: TileId, steps: u32, direction: Direction) -> Vec<TileId> {
        let mut path = Vec::with_capacity(steps.min(MAX_EFFECT_STEPS) as usize);
        let mut current = from;
        for _ in 0..steps {
            match self.neighbour(current, direction) {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => break,
            }
        }
        path
    }

    /// Serializable copy of the layout.
    pub fn layout(&self) -> BoardLayout {
        BoardLayout { tiles: self.tiles.clone() }
    }
}

/// Failure loading a board document.
#[derive(Debug, thiserror::Error)]
pub enum BoardLoadError {
    /// Malformed JSON.
    #[error("Invalid board JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Layout failed validation.
    #[error("Invalid board layout: {0}")]
    Layout(#[from] SetupError),
}
