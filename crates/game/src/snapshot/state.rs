use glam::{Quat, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

use crate::table::{BallId, BallKind};

/// Kinematic state of one active ball.
#[derive(
    Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct BallState {
    pub number: u8,
    pub position: [f32; 3],
    pub linvel: [f32; 3],
    pub angvel: [f32; 3],
    pub orientation: [f32; 4],
}

impl BallState {
    pub fn at_rest(id: BallId, position: Vec3) -> Self {
        Self {
            number: id.number(),
            position: position.to_array(),
            linvel: [0.0; 3],
            angvel: [0.0; 3],
            orientation: Quat::IDENTITY.to_array(),
        }
    }

    pub fn id(&self) -> BallId {
        BallId(self.number)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn linvel(&self) -> Vec3 {
        Vec3::from_array(self.linvel)
    }

    pub fn angvel(&self) -> Vec3 {
        Vec3::from_array(self.angvel)
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_array(self.orientation)
    }

    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(&self.linvel)
            .chain(&self.angvel)
            .chain(&self.orientation)
            .all(|v| v.is_finite())
    }
}

/// Why a snapshot from the peer cannot be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("ball number {0} is not part of the rack")]
    UnknownBall(u8),
    #[error("ball {0} appears more than once")]
    DuplicateBall(BallId),
    #[error("ball {0} is on the table and pocketed")]
    PocketedOnTable(BallId),
    #[error("ball {0} has non-finite kinematics")]
    NonFinite(BallId),
    #[error("the cue ball is missing")]
    MissingCueBall,
    #[error("pocketed lists are malformed")]
    MalformedPocketed,
}

/// Append-only record of what has left the table. Lists are kept sorted.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct PocketedState {
    pub solids: Vec<u8>,
    pub stripes: Vec<u8>,
    pub eight: bool,
}

impl PocketedState {
    /// Records a pocketed object ball. Returns false for the cue ball or a repeat.
    pub fn record(&mut self, id: BallId) -> bool {
        let list = match id.kind() {
            BallKind::Cue => return false,
            BallKind::Eight => {
                let fresh = !self.eight;
                self.eight = true;
                return fresh;
            }
            BallKind::Solid => &mut self.solids,
            BallKind::Stripe => &mut self.stripes,
        };
        match list.binary_search(&id.number()) {
            Ok(_) => false,
            Err(index) => {
                list.insert(index, id.number());
                true
            }
        }
    }

    pub fn contains(&self, id: BallId) -> bool {
        match id.kind() {
            BallKind::Cue => false,
            BallKind::Eight => self.eight,
            BallKind::Solid => self.solids.binary_search(&id.number()).is_ok(),
            BallKind::Stripe => self.stripes.binary_search(&id.number()).is_ok(),
        }
    }

    pub fn merge(&mut self, other: &PocketedState) {
        for &n in other.solids.iter().chain(other.stripes.iter()) {
            self.record(BallId(n));
        }
        self.eight |= other.eight;
    }

    pub fn count(&self) -> usize {
        self.solids.len() + self.stripes.len() + usize::from(self.eight)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Lists must be strictly ascending and hold only numbers of their group.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let well_formed = |list: &[u8], kind: BallKind| {
            list.windows(2).all(|w| w[0] < w[1])
                && list.iter().all(|&n| BallId::new(n).is_some_and(|id| id.kind() == kind))
        };
        if well_formed(self.solids.as_slice(), BallKind::Solid)
            && well_formed(self.stripes.as_slice(), BallKind::Stripe) {
            Ok(())
        } else {
            Err(SnapshotError::MalformedPocketed)
        }
    }
}

/// Canonical state captured once a shot has settled.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct GameStateSnapshot {
    pub balls: Vec<BallState>,
    pub pocketed: PocketedState,
}

impl GameStateSnapshot {
    /// Sorts balls by number; the hash depends on this order.
    pub fn new(mut balls: Vec<BallState>, pocketed: PocketedState) -> Self {
        balls.sort_by_key(|b| b.number);
        Self { balls, pocketed }
    }

    /// Checks the identity invariants a rebuilt world relies on: every number
    /// at most once, nothing both active and pocketed, and a cue ball present.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        self.pocketed.validate()?;
        let mut seen = 0u16;
        for ball in &self.balls {
            let id = BallId::new(ball.number).ok_or(SnapshotError::UnknownBall(ball.number))?;
            let bit = 1u16 << ball.number;
            if seen & bit != 0 {
                return Err(SnapshotError::DuplicateBall(id));
            }
            seen |= bit;
            if self.pocketed.contains(id) {
                return Err(SnapshotError::PocketedOnTable(id));
            }
            if !ball.is_finite() {
                return Err(SnapshotError::NonFinite(id));
            }
        }
        if seen & 1 == 0 {
            return Err(SnapshotError::MissingCueBall);
        }
        Ok(())
    }

    pub fn ball(&self, id: BallId) -> Option<&BallState> {
        self.balls.iter().find(|b| b.number == id.number())
    }

    pub fn max_divergence(&self, other: &GameStateSnapshot) -> Option<f32> {
        if self.balls.len() != other.balls.len() {
            return None;
        }
        let mut max = 0.0f32;
        for (a, b) in self.balls.iter().zip(&other.balls) {
            if a.number != b.number {
                return None;
            }
            max = max
                .max(a.position().distance(b.position()))
                .max(a.linvel().distance(b.linvel()))
                .max(a.angvel().distance(b.angvel()));
        }
        Some(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CUE_BALL, EIGHT_BALL};

    #[test]
    fn pocketed_lists_stay_sorted_and_unique() {
        let mut pocketed = PocketedState::default();
        assert!(pocketed.record(BallId(5)));
        assert!(pocketed.record(BallId(2)));
        assert!(!pocketed.record(BallId(5)));
        assert!(pocketed.record(BallId(14)));
        assert!(!pocketed.record(CUE_BALL));
        assert_eq!(pocketed.solids, vec![2, 5]);
        assert_eq!(pocketed.stripes, vec![14]);
        assert!(!pocketed.eight);
        assert!(pocketed.record(EIGHT_BALL));
        assert!(pocketed.eight);
        assert_eq!(pocketed.count(), 4);
    }

    #[test]
    fn snapshot_orders_balls_by_number() {
        let balls = vec![
            BallState::at_rest(BallId(9), Vec3::X),
            BallState::at_rest(BallId(0), Vec3::ZERO),
            BallState::at_rest(BallId(3), Vec3::Z),
        ];
        let snapshot = GameStateSnapshot::new(balls, PocketedState::default());
        let numbers: Vec<u8> = snapshot.balls.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![0, 3, 9]);
    }

    fn racked() -> GameStateSnapshot {
        let balls = BallId::all()
            .map(|id| BallState::at_rest(id, Vec3::new(id.number() as f32 * 0.1, 0.0, 0.0)))
            .collect();
        GameStateSnapshot::new(balls, PocketedState::default())
    }

    #[test]
    fn full_rack_is_valid() {
        assert_eq!(racked().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_broken_identity() {
        let mut unknown = racked();
        unknown.balls.push(BallState::at_rest(BallId(200), Vec3::ZERO));
        assert_eq!(unknown.validate(), Err(SnapshotError::UnknownBall(200)));

        let mut duplicate = racked();
        duplicate.balls.push(BallState::at_rest(BallId(4), Vec3::ZERO));
        assert_eq!(duplicate.validate(), Err(SnapshotError::DuplicateBall(BallId(4))));

        let mut revived = racked();
        revived.pocketed.record(BallId(3));
        assert_eq!(revived.validate(), Err(SnapshotError::PocketedOnTable(BallId(3))));

        let mut no_cue = racked();
        no_cue.balls.retain(|b| b.number != 0);
        assert_eq!(no_cue.validate(), Err(SnapshotError::MissingCueBall));

        let mut nan = racked();
        nan.balls[2].linvel[0] = f32::NAN;
        assert_eq!(nan.validate(), Err(SnapshotError::NonFinite(BallId(2))));
    }

    #[test]
    fn validate_rejects_malformed_pocketed_lists() {
        let mut snapshot = racked();
        snapshot.balls.retain(|b| b.number != 3 && b.number != 5);
        snapshot.pocketed.solids = vec![5, 3];
        assert_eq!(snapshot.validate(), Err(SnapshotError::MalformedPocketed));
        snapshot.pocketed.solids = vec![3, 5];
        assert_eq!(snapshot.validate(), Ok(()));
        snapshot.pocketed.stripes = vec![3];
        assert_eq!(snapshot.validate(), Err(SnapshotError::MalformedPocketed));
    }
}
