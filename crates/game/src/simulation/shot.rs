use glam::Vec3;
use rkyv::{Archive, Deserialize, Serialize};

use crate::physics::{BallTable, PocketEvent, post_step};
use crate::rules::ShotTally;
use crate::snapshot::{GameStateSnapshot, StateHash};
use crate::table::{BallKind, TableConfig};

use super::SimConfig;

/// English on the cue ball, each component in `[-1, 1]`. Positive `top` is follow,
/// negative is draw; positive `side` spins counter-clockwise seen from above.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct Spin {
    pub top: f32,
    pub side: f32,
}

impl Spin {
    /// Older clients send a single factor, which only ever meant follow/draw.
    pub fn from_legacy(factor: f32) -> Self {
        Self {
            top: factor,
            side: 0.0,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct ShotInput {
    /// Direction in radians, measured from +X toward +Z.
    pub angle: f32,
    /// Fraction of the maximum impulse, `[0, 1]`.
    pub power: f32,
    pub spin: Spin,
}

fn sanitize(value: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}

impl ShotInput {
    pub fn new(angle: f32, power: f32) -> Self {
        Self {
            angle,
            power,
            spin: Spin::default(),
        }
    }

    pub fn with_spin(mut self, top: f32, side: f32) -> Self {
        self.spin = Spin { top, side };
        self
    }

    /// Clamps every field into range; non-finite values become zero.
    pub fn clamped(&self) -> Self {
        Self {
            angle: if self.angle.is_finite() { self.angle } else { 0.0 },
            power: sanitize(self.power, 0.0, 1.0),
            spin: Spin {
                top: sanitize(self.spin.top, -1.0, 1.0),
                side: sanitize(self.spin.side, -1.0, 1.0),
            },
        }
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::new(self.angle.cos(), 0.0, self.angle.sin())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimError {
    #[error("a shot is already in progress")]
    ShotInProgress,
}

#[derive(Debug, Clone)]
pub struct ShotOutcome {
    pub snapshot: GameStateSnapshot,
    pub hash: StateHash,
    pub pocket_events: Vec<PocketEvent>,
    pub tally: ShotTally,
    pub steps: u32,
    /// The safety cap stopped the shot before the balls came to rest.
    pub forced: bool,
}

#[derive(Debug, Clone)]
pub enum StepResult {
    Idle,
    Running { steps: u32 },
    Settled(ShotOutcome),
}

#[derive(Debug, Default)]
struct ActiveShot {
    steps: u32,
    quiet_checks: u32,
    tally: ShotTally,
    events: Vec<PocketEvent>,
}

/// Owns the ball table and drives one shot at a time from impulse to rest.
pub struct ShotSimulator {
    config: SimConfig,
    table: BallTable,
    active: Option<ActiveShot>,
}

impl ShotSimulator {
    pub fn new(table_config: TableConfig, config: SimConfig) -> Self {
        let table = BallTable::new(table_config, config.dt());
        Self {
            config,
            table,
            active: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn table(&self) -> &BallTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut BallTable {
        &mut self.table
    }

    pub fn is_in_progress(&self) -> bool {
        self.active.is_some()
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        self.table.capture()
    }

    /// Replaces the whole world with one rebuilt from `snapshot`. Any shot in
    /// flight is dropped.
    pub fn restore(&mut self, snapshot: &GameStateSnapshot) {
        if self.active.take().is_some() {
            log::warn!("Restoring state while a shot was in progress");
        }
        self.table = BallTable::from_snapshot(self.table.config().clone(), self.config.dt(), snapshot);
    }

    pub fn begin(&mut self, input: &ShotInput) -> Result<(), SimError> {
        if self.active.is_some() {
            return Err(SimError::ShotInProgress);
        }
        let input = input.clamped();
        let direction = input.direction();
        let impulse = direction * input.power * self.config.max_shot_impulse;

        let follow_axis = Vec3::new(direction.z, 0.0, -direction.x);
        let spin_scale = self.config.spin_torque_scale * input.power;
        let torque =
            follow_axis * input.spin.top * spin_scale + Vec3::Y * input.spin.side * spin_scale;

        log::debug!(
            "Shot angle={:.4} power={:.3} spin=({:.2}, {:.2})",
            input.angle,
            input.power,
            input.spin.top,
            input.spin.side
        );

        self.table.apply_cue_impulse(impulse, torque);
        self.active = Some(ActiveShot::default());
        Ok(())
    }

    /// Advances the shot in flight by one fixed step.
    pub fn step(&mut self) -> StepResult {
        if self.active.is_none() {
            return StepResult::Idle;
        }

        self.table.step();
        let events = post_step(&mut self.table, &self.config.post_step);
        let quiet = self.is_quiet();

        let Some(active) = self.active.as_mut() else {
            return StepResult::Idle;
        };
        active.steps += 1;

        for event in events {
            match event.ball.kind() {
                BallKind::Cue => active.tally.scratch = true,
                _ => {
                    active.tally.pocketed.record(event.ball);
                }
            }
            active.events.push(event);
        }

        if quiet {
            active.quiet_checks += 1;
        } else {
            active.quiet_checks = 0;
        }

        let settled = active.quiet_checks >= self.config.settle_checks;
        let forced = !settled && active.steps >= self.config.max_steps;
        if !settled && !forced {
            return StepResult::Running {
                steps: active.steps,
            };
        }

        if forced {
            log::warn!(
                "Shot did not settle within {} steps, forcing rest",
                self.config.max_steps
            );
            self.freeze();
        }

        let Some(active) = self.active.take() else {
            return StepResult::Idle;
        };
        let snapshot = self.table.capture();
        let hash = snapshot.hash();
        StepResult::Settled(ShotOutcome {
            snapshot,
            hash,
            pocket_events: active.events,
            tally: active.tally,
            steps: active.steps,
            forced,
        })
    }

    /// Steps until the shot settles. Returns `None` when no shot is in flight.
    pub fn run_to_settle(&mut self) -> Option<ShotOutcome> {
        loop {
            match self.step() {
                StepResult::Idle => return None,
                StepResult::Running { .. } => continue,
                StepResult::Settled(outcome) => return Some(outcome),
            }
        }
    }

    pub fn simulate(&mut self, input: &ShotInput) -> Result<ShotOutcome, SimError> {
        self.begin(input)?;
        self.run_to_settle().ok_or(SimError::ShotInProgress)
    }

    /// Drops the shot in flight without settling it.
    pub fn abandon(&mut self) {
        if self.active.take().is_some() {
            log::debug!("Abandoned shot in progress");
        }
    }

    fn is_quiet(&self) -> bool {
        let thresholds = &self.config.post_step;
        self.table.active_balls().all(|id| {
            self.table.kinematics(id).is_none_or(|k| {
                k.linvel.length() < thresholds.stop_linear
                    && k.angvel.length() < thresholds.stop_angular
            })
        })
    }

    fn freeze(&mut self) {
        let ids: Vec<_> = self.table.active_balls().collect();
        for id in ids {
            self.table.set_velocity(id, Vec3::ZERO, Vec3::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{BallId, CUE_BALL};

    fn simulator() -> ShotSimulator {
        ShotSimulator::new(TableConfig::default(), SimConfig::default())
    }

    #[test]
    fn clamped_input_sanitizes_fields() {
        let input = ShotInput::new(f32::NAN, 3.0).with_spin(-4.0, f32::INFINITY);
        let clamped = input.clamped();
        assert_eq!(clamped.angle, 0.0);
        assert_eq!(clamped.power, 1.0);
        assert_eq!(clamped.spin.top, -1.0);
        assert_eq!(clamped.spin.side, 0.0);
    }

    #[test]
    fn legacy_spin_maps_to_follow() {
        let spin = Spin::from_legacy(0.5);
        assert_eq!(spin, Spin { top: 0.5, side: 0.0 });
    }

    #[test]
    fn zero_power_settles_immediately() {
        let mut sim = simulator();
        let before = sim.snapshot().hash();
        let outcome = sim.simulate(&ShotInput::new(0.0, 0.0)).unwrap();
        assert_eq!(outcome.steps, sim.config().settle_checks);
        assert!(!outcome.forced);
        assert_eq!(outcome.hash, before);
    }

    #[test]
    fn second_begin_is_rejected() {
        let mut sim = simulator();
        sim.begin(&ShotInput::new(0.0, 0.5)).unwrap();
        assert_eq!(
            sim.begin(&ShotInput::new(0.0, 0.5)),
            Err(SimError::ShotInProgress)
        );
        assert!(sim.is_in_progress());
        sim.abandon();
        assert!(!sim.is_in_progress());
    }

    #[test]
    fn safety_cap_forces_settle() {
        let config = SimConfig {
            max_steps: 10,
            ..SimConfig::default()
        };
        let mut sim = ShotSimulator::new(TableConfig::default(), config);
        let outcome = sim.simulate(&ShotInput::new(0.0, 1.0)).unwrap();
        assert!(outcome.forced);
        assert_eq!(outcome.steps, 10);
        assert!(outcome.snapshot.balls.iter().all(|b| b.linvel == [0.0; 3]));
    }

    #[test]
    fn straight_shot_moves_the_cue_ball() {
        let mut sim = simulator();
        let start = sim.table().kinematics(CUE_BALL).unwrap().position;
        let outcome = sim
            .simulate(&ShotInput::new(std::f32::consts::FRAC_PI_2, 0.05))
            .unwrap();
        assert!(!outcome.forced);
        let end = outcome.snapshot.ball(BallId(0)).unwrap().position();
        assert!(end.z > start.z);
        assert_eq!(end.y, 0.0);
    }
}
