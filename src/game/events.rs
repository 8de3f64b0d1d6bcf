//! Match Events
//!
//! Everything observers need to hear about is queued here during a tick and
//! drained once at the end of it. Text-bearing events are also forwarded to a
//! one-way `BroadcastSink`.

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::game::cards::CardId;
use crate::game::board::TileId;
use crate::game::state::PlayerId;

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchEventData {
    /// A new turn started
    TurnChanged {
        /// New turn-holder
        player_id: PlayerId,
        /// Announcement line
        text: String,
    },

    /// Free-form status line
    Status {
        /// The line
        text: String,
    },

    /// Dice settled
    DiceResult {
        /// Who rolled
        player_id: PlayerId,
        /// Face of each die
        faces: Vec<u8>,
        /// Sum of faces
        total: u32,
        /// Result line
        text: String,
    },

    /// Token finished a move
    TokenMoved {
        /// Token owner
        player_id: PlayerId,
        /// Tile it stopped on
        tile: TileId,
    },

    /// Card drawn from a tile pool
    CardDrawn {
        /// Who drew
        player_id: PlayerId,
        /// Card drawn
        card_id: CardId,
        /// False when the hand was full and the card was discarded
        kept: bool,
    },

    /// Card played from hand
    CardPlayed {
        /// Who played
        player_id: PlayerId,
        /// Card played
        card_id: CardId,
        /// Chosen target, for targeted cards
        target: Option<PlayerId>,
    },

    /// Token essence changed
    EssenceChanged {
        /// Token owner
        player_id: PlayerId,
        /// New essence
        essence: i32,
    },

    /// Player knocked out
    PlayerEliminated {
        /// Who is out
        player_id: PlayerId,
        /// Final place (1-based)
        placement: u8,
    },

    /// Match over
    MatchEnded {
        /// Last survivor, if any
        winner_id: Option<PlayerId>,
        /// Turns started over the match
        turns: u32,
    },
}

/// A queued event, stamped with the tick it was raised on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Coordinator tick
    pub tick: u64,

    /// Event data
    pub data: MatchEventData,
}

impl MatchEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: MatchEventData) -> Self {
        Self { tick, data }
    }

    /// Player the event is about, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match &self.data {
            MatchEventData::TurnChanged { player_id, .. }
            | MatchEventData::DiceResult { player_id, .. }
            | MatchEventData::TokenMoved { player_id, .. }
            | MatchEventData::CardDrawn { player_id, .. }
            | MatchEventData::CardPlayed { player_id, .. }
            | MatchEventData::EssenceChanged { player_id, .. }
            | MatchEventData::PlayerEliminated { player_id, .. } => Some(*player_id),
            MatchEventData::MatchEnded { winner_id, .. } => *winner_id,
            MatchEventData::Status { .. } => None,
        }
    }

    /// Forward to a sink. Only text-bearing events reach it.
    pub fn deliver(&self, sink: &dyn BroadcastSink) {
        match &self.data {
            MatchEventData::TurnChanged { text, .. } => sink.notify_turn_changed(text),
            MatchEventData::Status { text } => sink.notify_status(text),
            MatchEventData::DiceResult { text, .. } => sink.notify_dice_result(text),
            _ => {}
        }
    }
}

/// Outbound event queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    tick: u64,
    pending: Vec<MatchEvent>,
}

impl EventQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick stamped on events pushed from now on.
    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Queue an event.
    pub fn push(&mut self, data: MatchEventData) {
        self.pending.push(MatchEvent::new(self.tick, data));
    }

    /// Queue a status line.
    pub fn status(&mut self, text: impl Into<String>) {
        self.push(MatchEventData::Status { text: text.into() });
    }

    /// Nothing queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything queued, in push order.
    pub fn drain(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// One-way notification target for observers.
pub trait BroadcastSink: Send + Sync {
    /// A new turn started.
    fn notify_turn_changed(&self, text: &str);

    /// Status line.
    fn notify_status(&self, text: &str);

    /// Dice result line.
    fn notify_dice_result(&self, text: &str);
}

/// Sink that writes to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl BroadcastSink for TracingSink {
    fn notify_turn_changed(&self, text: &str) {
        info!(target: "essence_board::broadcast", "[turn] {}", text);
    }

    fn notify_status(&self, text: &str) {
        info!(target: "essence_board::broadcast", "[status] {}", text);
    }

    fn notify_dice_result(&self, text: &str) {
        info!(target: "essence_board::broadcast", "[dice] {}", text);
    }
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl BroadcastSink for NullSink {
    fn notify_turn_changed(&self, _text: &str) {}
    fn notify_status(&self, _text: &str) {}
    fn notify_dice_result(&self, _text: &str) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every line, tagged by channel.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingSink {
        pub(crate) fn lines(&self) -> Vec<(&'static str, String)> {
            self.lines.lock().map(|l| l.clone()).unwrap_or_default()
        }
    }

    impl BroadcastSink for RecordingSink {
        fn notify_turn_changed(&self, text: &str) {
            self.lines.lock().unwrap().push(("turn", text.to_string()));
        }

        fn notify_status(&self, text: &str) {
            self.lines.lock().unwrap().push(("status", text.to_string()));
        }

        fn notify_dice_result(&self, text: &str) {
            self.lines.lock().unwrap().push(("dice", text.to_string()));
        }
    }

    #[test]
    fn test_queue_drains_in_order() {
        let mut queue = EventQueue::new();
        queue.set_tick(4);
        queue.status("a");
        queue.status("b");

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].tick, 4);
        assert_eq!(drained[1].data, MatchEventData::Status { text: "b".into() });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_deliver_routes_text_events() {
        let sink = RecordingSink::default();
        let id = PlayerId::new([1; 16]);

        MatchEvent::new(0, MatchEventData::TurnChanged { player_id: id, text: "Player A's turn".into() })
            .deliver(&sink);
        MatchEvent::new(0, MatchEventData::DiceResult {
            player_id: id,
            faces: vec![4],
            total: 4,
            text: "4".into(),
        })
        .deliver(&sink);
        MatchEvent::new(0, MatchEventData::EssenceChanged { player_id: id, essence: 3 })
            .deliver(&sink);

        assert_eq!(
            sink.lines(),
            vec![("turn", "Player A's turn".to_string()), ("dice", "4".to_string())]
        );
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = MatchEvent::new(1, MatchEventData::Status { text: "hi".into() });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"status""#));
    }
}
