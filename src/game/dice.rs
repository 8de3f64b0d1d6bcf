//! Dice
//!
//! Faces are drawn from the seeded RNG at throw time; each die then settles
//! after its own settle time as ticks elapse. The roll is awaitable through
//! `DiceRoll::total`.

use tokio::sync::watch;
use tracing::debug;

use crate::core::rng::DeterministicRng;

/// Summed result of a settled throw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiceOutcome {
    /// Face of each die, in throw order
    pub faces: Vec<u8>,
    /// Sum of faces
    pub total: u32,
}

impl DiceOutcome {
    /// Build from faces.
    pub fn from_faces(faces: Vec<u8>) -> Self {
        let total = faces.iter().map(|f| *f as u32).sum();
        Self { faces, total }
    }

    /// Text shown to observers, e.g. `"3 + 5 = 8"`.
    pub fn describe(&self) -> String {
        if self.faces.len() == 1 {
            return self.total.to_string();
        }
        let faces: Vec<String> = self.faces.iter().map(|f| f.to_string()).collect();
        format!("{} = {}", faces.join(" + "), self.total)
    }
}

/// Status published to awaiting tasks. Every throw is numbered so a handle
/// can tell its own throw from a later one.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum RollStatus {
    /// Nothing thrown
    #[default]
    Idle,
    /// Dice still settling
    Rolling {
        /// Throw number
        throw: u64,
    },
    /// All dice settled
    Settled {
        /// Throw number
        throw: u64,
        /// What they show
        outcome: DiceOutcome,
    },
}

impl RollStatus {
    fn throw(&self) -> Option<u64> {
        match self {
            RollStatus::Idle => None,
            RollStatus::Rolling { throw } | RollStatus::Settled { throw, .. } => Some(*throw),
        }
    }
}

/// Roll failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    /// Zero dice requested.
    #[error("Cannot roll zero dice")]
    NoDice,

    /// Tray already has dice in the air.
    #[error("Dice are already rolling")]
    AlreadyRolling,

    /// Tray was dropped, or thrown again before this roll was awaited.
    #[error("Roll abandoned before dice settled")]
    Abandoned,
}

#[derive(Clone, Debug)]
struct Die {
    face: u8,
    remaining_ms: u32,
}

/// The dice in play.
#[derive(Debug)]
pub struct DiceTray {
    dice: Vec<Die>,
    settle_ms: u32,
    throws: u64,
    status_tx: watch::Sender<RollStatus>,
}

impl DiceTray {
    /// Tray whose dice settle after roughly `settle_ms`.
    pub fn new(settle_ms: u32) -> Self {
        let (status_tx, _) = watch::channel(RollStatus::Idle);
        Self { dice: Vec::new(), settle_ms, throws: 0, status_tx }
    }

    /// Dice in the air.
    pub fn is_rolling(&self) -> bool {
        !self.dice.is_empty()
    }

    /// Throw `count` dice. Each face is uniform in [1, 6]; settle times are
    /// staggered so dice land one after another.
    pub fn throw(&mut self, count: u32, rng: &mut DeterministicRng) -> Result<DiceRoll, DiceError> {
        if count == 0 {
            return Err(DiceError::NoDice);
        }
        if self.is_rolling() {
            return Err(DiceError::AlreadyRolling);
        }

        let stagger = self.settle_ms / 4;
        self.dice = (0..count)
            .map(|i| Die {
                face: rng.roll_die(),
                remaining_ms: self.settle_ms + stagger * i,
            })
            .collect();

        self.throws += 1;
        let throw = self.throws;

        // Subscribe before publishing so the roll never misses the status
        let rx = self.status_tx.subscribe();
        self.status_tx.send_replace(RollStatus::Rolling { throw });
        debug!("Throw {}: {} dice", throw, count);

        Ok(DiceRoll { rx, throw })
    }

    /// Advance settling. Returns the outcome on the tick the last die lands.
    pub fn tick(&mut self, dt_ms: u32) -> Option<DiceOutcome> {
        if self.dice.is_empty() {
            return None;
        }

        for die in &mut self.dice {
            die.remaining_ms = die.remaining_ms.saturating_sub(dt_ms);
        }

        if self.dice.iter().any(|d| d.remaining_ms > 0) {
            return None;
        }

        let faces = self.dice.drain(..).map(|d| d.face).collect();
        let outcome = DiceOutcome::from_faces(faces);
        self.status_tx.send_replace(RollStatus::Settled {
            throw: self.throws,
            outcome: outcome.clone(),
        });
        Some(outcome)
    }
}

/// Handle on one throw.
#[derive(Debug, Clone)]
pub struct DiceRoll {
    rx: watch::Receiver<RollStatus>,
    throw: u64,
}

impl DiceRoll {
    /// Throw number this handle waits on.
    pub fn throw(&self) -> u64 {
        self.throw
    }

    /// Wait for every die to settle and return the outcome. Fails with
    /// `Abandoned` once the tray has moved on to a later throw.
    pub async fn outcome(mut self) -> Result<DiceOutcome, DiceError> {
        let throw = self.throw;
        let status = self
            .rx
            .wait_for(|s| {
                matches!(s, RollStatus::Settled { throw: t, .. } if *t == throw)
                    || s.throw().is_some_and(|t| t > throw)
            })
            .await
            .map_err(|_| DiceError::Abandoned)?;

        match &*status {
            RollStatus::Settled { throw: t, outcome } if *t == throw => Ok(outcome.clone()),
            _ => Err(DiceError::Abandoned),
        }
    }

    /// Wait for every die to settle and return the sum.
    pub async fn total(self) -> Result<u32, DiceError> {
        self.outcome().await.map(|o| o.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dice_rejected() {
        let mut tray = DiceTray::new(100);
        let mut rng = DeterministicRng::new(1);
        assert!(matches!(tray.throw(0, &mut rng), Err(DiceError::NoDice)));
    }

    #[test]
    fn test_cannot_throw_while_rolling() {
        let mut tray = DiceTray::new(100);
        let mut rng = DeterministicRng::new(1);
        tray.throw(2, &mut rng).unwrap();
        assert!(matches!(tray.throw(1, &mut rng), Err(DiceError::AlreadyRolling)));
    }

    #[test]
    fn test_settles_after_last_die() {
        let mut tray = DiceTray::new(100);
        let mut rng = DeterministicRng::new(3);
        tray.throw(2, &mut rng).unwrap();

        // First die lands at 100ms, second at 125ms
        assert!(tray.tick(100).is_none());
        let outcome = tray.tick(25).unwrap();

        assert_eq!(outcome.faces.len(), 2);
        assert!(outcome.faces.iter().all(|f| (1..=6).contains(f)));
        assert!((2..=12).contains(&outcome.total));
        assert!(!tray.is_rolling());
    }

    #[test]
    fn test_same_seed_same_faces() {
        let mut a = DiceTray::new(10);
        let mut b = DiceTray::new(10);
        let mut rng_a = DeterministicRng::new(99);
        let mut rng_b = DeterministicRng::new(99);

        a.throw(3, &mut rng_a).unwrap();
        b.throw(3, &mut rng_b).unwrap();

        assert_eq!(a.tick(1000), b.tick(1000));
    }

    #[test]
    fn test_describe() {
        assert_eq!(DiceOutcome::from_faces(vec![4]).describe(), "4");
        assert_eq!(DiceOutcome::from_faces(vec![3, 5]).describe(), "3 + 5 = 8");
    }

    #[tokio::test]
    async fn test_roll_total_resolves() {
        let mut tray = DiceTray::new(50);
        let mut rng = DeterministicRng::new(8);
        let roll = tray.throw(1, &mut rng).unwrap();

        let settled = tray.tick(50).unwrap();
        assert_eq!(roll.total().await.unwrap(), settled.total);
    }

    #[tokio::test]
    async fn test_stale_roll_does_not_see_later_throw() {
        let mut tray = DiceTray::new(50);
        let mut rng = DeterministicRng::new(8);

        let first = tray.throw(1, &mut rng).unwrap();
        tray.tick(50).unwrap();
        let second = tray.throw(1, &mut rng).unwrap();
        assert_eq!(second.throw(), first.throw() + 1);

        assert_eq!(first.total().await, Err(DiceError::Abandoned));

        let settled = tray.tick(50).unwrap();
        assert_eq!(second.total().await.unwrap(), settled.total);
    }

    #[tokio::test]
    async fn test_roll_abandoned_when_tray_dropped() {
        let mut tray = DiceTray::new(50);
        let mut rng = DeterministicRng::new(8);
        let roll = tray.throw(1, &mut rng).unwrap();

        drop(tray);
        assert_eq!(roll.total().await, Err(DiceError::Abandoned));
    }
}
