//! Cards
//!
//! Card definitions carry a tagged `EffectKind` with its payload. The
//! coordinator looks cards up through the `CardRegistry` trait so the catalog
//! can live anywhere.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::board::{Direction, MAX_EFFECT_STEPS};

/// Card identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardId(pub u32);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card rarity. Cosmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    /// Tier 1
    #[default]
    Common,
    /// Tier 2
    Uncommon,
    /// Tier 3
    Rare,
    /// Tier 4
    Epic,
    /// Tier 5
    Legendary,
}

/// Which tiles an area attack reaches, relative to the attacker's tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reach {
    /// Attacker's own tile
    SameTile,
    /// The next tile
    FrontTile,
    /// The previous tile
    BackTile,
    /// Both neighbours
    FrontAndBack,
}

/// What a custom effect can touch.
pub struct EffectContext<'a> {
    /// Essence of the card owner's token
    pub owner_essence: &'a mut i32,
    /// Status lines to broadcast
    pub status: &'a mut Vec<String>,
}

/// Hook for effects the built-in kinds do not cover.
pub type CustomEffect = fn(&mut EffectContext<'_>);

/// Card effect.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Move the owner's token
    Move {
        /// Tiles to move
        steps: u32,
        /// Which way
        direction: Direction,
    },
    /// Damage every other token in reach
    Damage {
        /// Essence removed per token
        amount: i32,
        /// Tiles affected
        reach: Reach,
    },
    /// Damage a chosen player's token
    DirectAttack {
        /// Essence removed
        amount: i32,
    },
    /// Restore essence to the owner's token
    Heal {
        /// Essence added
        amount: i32,
    },
    /// Code-defined effect; not loadable from data files
    #[serde(skip)]
    Custom(CustomEffect),
}

impl EffectKind {
    /// Effect needs a target player.
    pub fn needs_target(&self) -> bool {
        matches!(self, EffectKind::DirectAttack { .. })
    }
}

/// Static card data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardDefinition {
    /// Card id
    pub id: CardId,
    /// Display name
    pub name: String,
    /// Flavour / rules text
    #[serde(default)]
    pub description: String,
    /// Essence cost (informational)
    #[serde(default)]
    pub essence_cost: i32,
    /// Rarity tier
    #[serde(default)]
    pub rarity: Rarity,
    /// What playing it does
    pub effect: EffectKind,
}

/// Card lookup.
pub trait CardRegistry: Send + Sync {
    /// Card by id.
    fn card(&self, id: CardId) -> Option<&CardDefinition>;
}

/// In-memory card catalog.
#[derive(Clone, Debug, Default)]
pub struct CardCatalog {
    cards: BTreeMap<CardId, CardDefinition>,
}

impl CardCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a card.
    pub fn insert(&mut self, card: CardDefinition) {
        self.cards.insert(card.id, card);
    }

    /// Builder-style insert.
    pub fn with(mut self, card: CardDefinition) -> Self {
        self.insert(card);
        self
    }

    /// Parse a JSON array of card definitions. Move cards longer than
    /// `MAX_EFFECT_STEPS` are refused.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let cards: Vec<CardDefinition> = serde_json::from_str(json)?;
        if let Some(card) = cards
            .iter()
            .find(|c| matches!(c.effect, EffectKind::Move { steps, .. } if steps > MAX_EFFECT_STEPS))
        {
            return Err(serde::de::Error::custom(format!(
                "card {} moves more than {} steps",
                card.id, MAX_EFFECT_STEPS
            )));
        }
        Ok(cards.into_iter().fold(Self::new(), |catalog, card| catalog.with(card)))
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Catalog has no cards.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Starter set used by the demo host.
    pub fn starter() -> Self {
        let card = |id: u32, name: &str, description: &str, rarity: Rarity, effect: EffectKind| {
            CardDefinition {
                id: CardId(id),
                name: name.to_string(),
                description: description.to_string(),
                essence_cost: 0,
                rarity,
                effect,
            }
        };

        Self::new()
            .with(card(1, "Gust", "Move forward 3 tiles.", Rarity::Common,
                EffectKind::Move { steps: 3, direction: Direction::Forward }))
            .with(card(2, "Undertow", "Move back 2 tiles.", Rarity::Common,
                EffectKind::Move { steps: 2, direction: Direction::Backward }))
            .with(card(3, "Ember Burst", "Deal 5 to every Essent on your tile.", Rarity::Uncommon,
                EffectKind::Damage { amount: 5, reach: Reach::SameTile }))
            .with(card(4, "Pincer", "Deal 3 to Essents in front and behind.", Rarity::Rare,
                EffectKind::Damage { amount: 3, reach: Reach::FrontAndBack }))
            .with(card(5, "Lance", "Deal 5 to a chosen Essent.", Rarity::Epic,
                EffectKind::DirectAttack { amount: 5 }))
            .with(card(6, "Spring", "Gain 5 essence.", Rarity::Common,
                EffectKind::Heal { amount: 5 }))
    }
}

impl CardRegistry for CardCatalog {
    fn card(&self, id: CardId) -> Option<&CardDefinition> {
        self.cards.get(&id)
    }
}

// =============================================================================
// HAND
// =============================================================================

/// Cards held by one player, in draw order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    cards: Vec<CardId>,
    limit: usize,
}

impl Hand {
    /// Empty hand with a size cap.
    pub fn new(limit: usize) -> Self {
        Self { cards: Vec::new(), limit }
    }

    /// Add a card. Returns false (and drops the card) when the hand is full.
    pub fn add(&mut self, card: CardId) -> bool {
        if self.cards.len() >= self.limit {
            return false;
        }
        self.cards.push(card);
        true
    }

    /// Remove one copy of a card. Returns false if not held.
    pub fn remove(&mut self, card: CardId) -> bool {
        match self.cards.iter().position(|c| *c == card) {
            Some(idx) => {
                self.cards.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Card is held.
    pub fn contains(&self, card: CardId) -> bool {
        self.cards.contains(&card)
    }

    /// Held cards.
    pub fn cards(&self) -> &[CardId] {
        &self.cards
    }

    /// Number of held cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// No cards held.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Size cap.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_limit() {
        let mut hand = Hand::new(2);
        assert!(hand.add(CardId(1)));
        assert!(hand.add(CardId(1)));
        assert!(!hand.add(CardId(2)));
        assert_eq!(hand.len(), 2);
    }

    #[test]
    fn test_hand_remove_one_copy() {
        let mut hand = Hand::new(5);
        hand.add(CardId(1));
        hand.add(CardId(1));

        assert!(hand.remove(CardId(1)));
        assert!(hand.contains(CardId(1)));
        assert!(hand.remove(CardId(1)));
        assert!(!hand.remove(CardId(1)));
        assert!(hand.is_empty());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"[
            { "id": 10, "name": "Leap",
              "effect": { "move": { "steps": 4, "direction": "forward" } } },
            { "id": 11, "name": "Mend", "rarity": "rare",
              "effect": { "heal": { "amount": 3 } } }
        ]"#;

        let catalog = CardCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);

        let leap = catalog.card(CardId(10)).unwrap();
        assert!(matches!(
            leap.effect,
            EffectKind::Move { steps: 4, direction: Direction::Forward }
        ));
        assert_eq!(catalog.card(CardId(11)).unwrap().rarity, Rarity::Rare);
        assert!(catalog.card(CardId(12)).is_none());
    }

    #[test]
    fn test_catalog_rejects_huge_move() {
        let json = r#"[
            { "id": 10, "name": "Warp",
              "effect": { "move": { "steps": 4294967295, "direction": "backward" } } }
        ]"#;
        let err = CardCatalog::from_json(json).unwrap_err();
        assert!(err.to_string().contains("card 10"));
    }

    #[test]
    fn test_custom_effect_not_loadable() {
        let json = r#"[{ "id": 1, "name": "X", "effect": "custom" }]"#;
        assert!(CardCatalog::from_json(json).is_err());
    }

    #[test]
    fn test_needs_target() {
        assert!(EffectKind::DirectAttack { amount: 1 }.needs_target());
        assert!(!EffectKind::Heal { amount: 1 }.needs_target());
    }

    #[test]
    fn test_starter_catalog() {
        let catalog = CardCatalog::starter();
        assert_eq!(catalog.len(), 6);
        assert!(catalog.card(CardId(5)).unwrap().effect.needs_target());
    }
}
