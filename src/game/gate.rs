//! Action Gate
//!
//! Every player action passes through here before it touches state. Checks
//! run in a fixed order so the reported reason is stable: match over, wrong
//! player, something in flight, budget spent.

use crate::error::{MatchError, RejectReason};
use crate::game::state::{MatchState, PlayerId, TurnPhase};

/// Per-turn action limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionGate {
    max_cards_per_turn: u32,
}

impl Default for ActionGate {
    fn default() -> Self {
        Self { max_cards_per_turn: 1 }
    }
}

impl ActionGate {
    /// Gate allowing `max_cards_per_turn` card plays per turn.
    pub fn new(max_cards_per_turn: u32) -> Self {
        Self { max_cards_per_turn }
    }

    /// Card budget.
    pub fn max_cards_per_turn(&self) -> u32 {
        self.max_cards_per_turn
    }

    /// May `requester` roll the dice now?
    pub fn can_roll(&self, state: &MatchState, requester: &PlayerId) -> Result<(), MatchError> {
        self.check_turn(state, requester)?;
        if state.cursor.has_rolled {
            return Err(MatchError::rejected(RejectReason::AlreadyRolled));
        }
        Ok(())
    }

    /// May `requester` play a card now?
    pub fn can_play_card(&self, state: &MatchState, requester: &PlayerId) -> Result<(), MatchError> {
        self.check_turn(state, requester)?;
        if state.cursor.cards_played >= self.max_cards_per_turn {
            return Err(MatchError::rejected(RejectReason::CardBudgetExhausted));
        }
        Ok(())
    }

    /// May `requester` end the turn now?
    pub fn can_end_turn(&self, state: &MatchState, requester: &PlayerId) -> Result<(), MatchError> {
        self.check_turn(state, requester)
    }

    fn check_turn(&self, state: &MatchState, requester: &PlayerId) -> Result<(), MatchError> {
        if state.is_ended() || state.turn_phase == TurnPhase::Finished {
            return Err(MatchError::rejected(RejectReason::MatchEnded));
        }
        if state.current_player_id() != Some(*requester) {
            return Err(MatchError::rejected(RejectReason::NotYourTurn));
        }
        if state.turn_phase != TurnPhase::AwaitingAction {
            return Err(MatchError::rejected(RejectReason::MidMovement));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{MatchPhase, RosterEntry};

    fn state() -> MatchState {
        let roster = (0..3)
            .map(|i| RosterEntry::new(PlayerId::new([i; 16]), format!("P{}", i)))
            .collect();
        MatchState::new([0; 16], roster, 5).unwrap()
    }

    fn reason(result: Result<(), MatchError>) -> Option<RejectReason> {
        result.err().and_then(|e| e.reject_reason())
    }

    #[test]
    fn test_rejects_roll_from_other_players() {
        let gate = ActionGate::default();
        let state = state();

        assert!(gate.can_roll(&state, &PlayerId::new([0; 16])).is_ok());
        for i in 1..3 {
            let other = PlayerId::new([i; 16]);
            assert_eq!(reason(gate.can_roll(&state, &other)), Some(RejectReason::NotYourTurn));
        }
        assert_eq!(
            reason(gate.can_roll(&state, &PlayerId::new([42; 16]))),
            Some(RejectReason::NotYourTurn)
        );
    }

    #[test]
    fn test_one_roll_per_turn() {
        let gate = ActionGate::default();
        let mut state = state();
        state.cursor.has_rolled = true;

        assert_eq!(
            reason(gate.can_roll(&state, &PlayerId::new([0; 16]))),
            Some(RejectReason::AlreadyRolled)
        );
        // Cards may still be played after rolling
        assert!(gate.can_play_card(&state, &PlayerId::new([0; 16])).is_ok());
    }

    #[test]
    fn test_card_budget() {
        let gate = ActionGate::new(2);
        let mut state = state();
        let me = PlayerId::new([0; 16]);

        state.cursor.cards_played = 1;
        assert!(gate.can_play_card(&state, &me).is_ok());

        state.cursor.cards_played = 2;
        assert_eq!(reason(gate.can_play_card(&state, &me)), Some(RejectReason::CardBudgetExhausted));
    }

    #[test]
    fn test_rejects_while_in_flight() {
        let gate = ActionGate::default();
        let mut state = state();
        let me = PlayerId::new([0; 16]);

        for phase in [TurnPhase::Rolling, TurnPhase::Moving] {
            state.turn_phase = phase;
            assert_eq!(reason(gate.can_roll(&state, &me)), Some(RejectReason::MidMovement));
            assert_eq!(reason(gate.can_play_card(&state, &me)), Some(RejectReason::MidMovement));
            assert_eq!(reason(gate.can_end_turn(&state, &me)), Some(RejectReason::MidMovement));
        }
    }

    #[test]
    fn test_match_ended_wins_over_other_reasons() {
        let gate = ActionGate::default();
        let mut state = state();
        state.phase = MatchPhase::Ended { winner: None };

        assert_eq!(
            reason(gate.can_roll(&state, &PlayerId::new([1; 16]))),
            Some(RejectReason::MatchEnded)
        );
    }
}
