//! Turn Sequencer
//!
//! The cursor walks the roster circularly in index order, skipping eliminated
//! players. A lap that finds nobody eligible ends the match; after that the
//! cursor is frozen.

use serde::{Serialize, Deserialize};

use crate::game::state::PlayerState;

/// Turn cursor plus per-turn budgets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCursor {
    /// Index of the turn-holder in the roster
    pub index: usize,
    /// The current turn was granted by a repeat
    pub repeat: bool,
    /// Dice rolled this turn
    pub has_rolled: bool,
    /// Cards played this turn
    pub cards_played: u32,
    /// Turns started so far (the opening turn is 0)
    pub turn_number: u32,
    /// Walk found nobody eligible
    pub ended: bool,
}

/// Result of one `advance` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Same player goes again.
    Repeat {
        /// Cursor index (unchanged)
        index: usize,
    },
    /// Turn passed to another (or, with one survivor, the same) player.
    Next {
        /// Previous cursor
        from: usize,
        /// New cursor
        to: usize,
    },
    /// This call ended the match.
    Ended,
    /// The match had already ended; nothing changed.
    AlreadyEnded,
}

impl TurnCursor {
    /// Cursor starting at the first roster entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance using the players' elimination flags.
    pub fn advance(&mut self, players: &[PlayerState], repeat: bool) -> Advance {
        self.advance_by(players.len(), repeat, |idx| players[idx].eliminated)
    }

    /// Advance over `len` seats where `is_eliminated(i)` reports seat status.
    ///
    /// A repeat is honoured only while the current seat is still in play;
    /// otherwise the walk proceeds as for a normal advance.
    pub fn advance_by<F>(&mut self, len: usize, repeat: bool, is_eliminated: F) -> Advance
    where
        F: Fn(usize) -> bool,
    {
        if self.ended {
            return Advance::AlreadyEnded;
        }

        if len == 0 {
            self.ended = true;
            return Advance::Ended;
        }

        if repeat && self.index < len && !is_eliminated(self.index) {
            self.start_turn(true);
            return Advance::Repeat { index: self.index };
        }

        let from = self.index;
        for step in 1..=len {
            let candidate = (from + step) % len;
            if !is_eliminated(candidate) {
                self.index = candidate;
                self.start_turn(false);
                return Advance::Next { from, to: candidate };
            }
        }

        self.ended = true;
        Advance::Ended
    }

    /// Reset per-turn budgets.
    fn start_turn(&mut self, repeat: bool) {
        self.repeat = repeat;
        self.has_rolled = false;
        self.cards_played = 0;
        self.turn_number += 1;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_skips_eliminated_player() {
        // 3 players, cursor 0, index 1 eliminated -> goes to 2
        let eliminated = [false, true, false];
        let mut cursor = TurnCursor::new();

        let result = cursor.advance_by(3, false, |i| eliminated[i]);

        assert_eq!(result, Advance::Next { from: 0, to: 2 });
        assert_eq!(cursor.index, 2);
    }

    #[test]
    fn test_wraps_around() {
        let mut cursor = TurnCursor { index: 2, ..TurnCursor::default() };
        let result = cursor.advance_by(3, false, |_| false);
        assert_eq!(result, Advance::Next { from: 2, to: 0 });
    }

    #[test]
    fn test_repeat_keeps_cursor_and_resets_budgets() {
        let mut cursor = TurnCursor {
            index: 1,
            has_rolled: true,
            cards_played: 1,
            ..TurnCursor::default()
        };

        let result = cursor.advance_by(3, true, |_| false);

        assert_eq!(result, Advance::Repeat { index: 1 });
        assert_eq!(cursor.index, 1);
        assert!(cursor.repeat);
        assert!(!cursor.has_rolled);
        assert_eq!(cursor.cards_played, 0);
    }

    #[test]
    fn test_repeat_for_eliminated_seat_walks_on() {
        let eliminated = [false, true, false];
        let mut cursor = TurnCursor { index: 1, ..TurnCursor::default() };

        let result = cursor.advance_by(3, true, |i| eliminated[i]);
        assert_eq!(result, Advance::Next { from: 1, to: 2 });
    }

    #[test]
    fn test_single_survivor_keeps_turn() {
        let eliminated = [true, false, true];
        let mut cursor = TurnCursor { index: 1, ..TurnCursor::default() };

        let result = cursor.advance_by(3, false, |i| eliminated[i]);
        assert_eq!(result, Advance::Next { from: 1, to: 1 });
        assert!(!cursor.ended);
    }

    #[test]
    fn test_all_eliminated_ends_once() {
        let mut cursor = TurnCursor::new();

        assert_eq!(cursor.advance_by(4, false, |_| true), Advance::Ended);
        assert!(cursor.ended);

        let frozen = cursor;
        assert_eq!(cursor.advance_by(4, false, |_| true), Advance::AlreadyEnded);
        assert_eq!(cursor.advance_by(4, true, |_| false), Advance::AlreadyEnded);
        assert_eq!(cursor, frozen);
    }

    #[test]
    fn test_empty_roster_ends() {
        let mut cursor = TurnCursor::new();
        assert_eq!(cursor.advance_by(0, false, |_| false), Advance::Ended);
        assert_eq!(cursor.advance_by(0, false, |_| false), Advance::AlreadyEnded);
    }

    proptest! {
        #[test]
        fn prop_full_cycle_returns_to_start(n in 2usize..12, start in 0usize..12) {
            let start = start % n;
            let mut cursor = TurnCursor { index: start, ..TurnCursor::default() };

            for _ in 0..n {
                cursor.advance_by(n, false, |_| false);
            }

            prop_assert_eq!(cursor.index, start);
        }

        #[test]
        fn prop_cursor_never_lands_on_eliminated(
            flags in proptest::collection::vec(any::<bool>(), 1..10),
            steps in 1usize..30,
        ) {
            let mut cursor = TurnCursor::new();
            let mut transitions = 0;

            for _ in 0..steps {
                match cursor.advance_by(flags.len(), false, |i| flags[i]) {
                    Advance::Next { to, .. } => prop_assert!(!flags[to]),
                    Advance::Ended => transitions += 1,
                    Advance::AlreadyEnded => {}
                    Advance::Repeat { .. } => prop_assert!(false, "no repeat requested"),
                }
            }

            let all_out = flags.iter().all(|f| *f);
            prop_assert_eq!(transitions, if all_out { 1 } else { 0 });
            prop_assert_eq!(cursor.ended, all_out);
        }
    }
}
