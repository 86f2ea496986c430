use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};
use rapier3d::dynamics::RigidBodyHandle;

use crate::snapshot::{BallState, GameStateSnapshot, PocketedState};
use crate::table::{BallId, CUE_BALL, TableConfig};

use super::{BodyKinematics, PhysicsWorld};

/// The billiards world: cushions plus an arena of ball bodies keyed by ball
/// identity. Handles stay private so bodies can be destroyed and recreated freely.
pub struct BallTable {
    config: TableConfig,
    physics: PhysicsWorld,
    balls: BTreeMap<BallId, RigidBodyHandle>,
    pocketed: PocketedState,
}

impl BallTable {
    /// A freshly racked table with the cue ball on the head spot.
    pub fn new(config: TableConfig, dt: f32) -> Self {
        let mut table = Self::bare(config, dt);
        let head = table.config.head_spot();
        table.spawn_ball(CUE_BALL, Vec3::new(head.x, 0.0, head.y));
        for (number, position) in table.config.rack() {
            table.spawn_ball(BallId(number), Vec3::new(position.x, 0.0, position.y));
        }
        table
    }

    /// Rebuilds a world from a snapshot. Bodies are inserted in ball order, so two
    /// peers rebuilding from the same snapshot end up with identical worlds.
    pub fn from_snapshot(config: TableConfig, dt: f32, snapshot: &GameStateSnapshot) -> Self {
        let mut table = Self::bare(config, dt);
        table.pocketed = snapshot.pocketed.clone();
        for ball in &snapshot.balls {
            if !table.set_ball_state(ball) {
                log::warn!("Skipping ball {} from snapshot", ball.number);
            }
        }
        if !table.balls.contains_key(&CUE_BALL) {
            log::warn!("Snapshot without a cue ball, respawning on the head spot");
            table.respawn_cue_ball();
        }
        table
    }

    fn bare(config: TableConfig, dt: f32) -> Self {
        let mut physics = PhysicsWorld::new(dt);
        for (center, half_extents) in config.cushions() {
            physics.add_static_box(
                center,
                half_extents,
                config.cushion_restitution,
                config.cushion_friction,
            );
        }
        Self {
            config,
            physics,
            balls: BTreeMap::new(),
            pocketed: PocketedState::default(),
        }
    }

    fn spawn_ball(&mut self, id: BallId, position: Vec3) {
        let handle = self.physics.add_dynamic_sphere(
            position,
            self.config.ball_radius,
            self.config.ball_mass,
            self.config.ball_restitution,
            self.config.ball_friction,
        );
        if let Some(old) = self.balls.insert(id, handle) {
            self.physics.remove_body(old);
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn dt(&self) -> f32 {
        self.physics.dt()
    }

    pub fn step(&mut self) {
        self.physics.step();
    }

    pub fn active_balls(&self) -> impl Iterator<Item = BallId> + '_ {
        self.balls.keys().copied()
    }

    pub fn active_count(&self) -> usize {
        self.balls.len()
    }

    pub fn is_active(&self, id: BallId) -> bool {
        self.balls.contains_key(&id)
    }

    pub fn pocketed(&self) -> &PocketedState {
        &self.pocketed
    }

    pub(crate) fn pocketed_mut(&mut self) -> &mut PocketedState {
        &mut self.pocketed
    }

    pub fn kinematics(&self, id: BallId) -> Option<BodyKinematics> {
        self.balls
            .get(&id)
            .and_then(|&handle| self.physics.kinematics(handle))
    }

    pub fn ball_state(&self, id: BallId) -> Option<BallState> {
        self.kinematics(id).map(|k| BallState {
            number: id.number(),
            position: k.position.to_array(),
            linvel: k.linvel.to_array(),
            angvel: k.angvel.to_array(),
            orientation: k.rotation.to_array(),
        })
    }

    /// Overwrites one ball's kinematics, recreating the body if it is not on the
    /// table. Numbers outside the rack and pocketed balls are refused.
    pub fn set_ball_state(&mut self, state: &BallState) -> bool {
        let Some(id) = BallId::new(state.number) else {
            return false;
        };
        if self.pocketed.contains(id) {
            return false;
        }
        if !self.balls.contains_key(&id) {
            self.spawn_ball(id, state.position());
        }
        if let Some(&handle) = self.balls.get(&id) {
            self.physics.set_kinematics(
                handle,
                &BodyKinematics {
                    position: state.position(),
                    rotation: state.orientation(),
                    linvel: state.linvel(),
                    angvel: state.angvel(),
                },
            );
        }
        true
    }

    pub(crate) fn set_velocity(&mut self, id: BallId, linvel: Vec3, angvel: Vec3) {
        if let Some(&handle) = self.balls.get(&id) {
            self.physics.set_body_velocity(handle, linvel, angvel);
        }
    }

    pub(crate) fn set_position(&mut self, id: BallId, position: Vec3) {
        if let Some(&handle) = self.balls.get(&id) {
            self.physics.set_body_position(handle, position);
        }
    }

    pub fn capture(&self) -> GameStateSnapshot {
        let balls = self
            .active_balls()
            .filter_map(|id| self.ball_state(id))
            .collect();
        GameStateSnapshot::new(balls, self.pocketed.clone())
    }

    pub(crate) fn remove_ball(&mut self, id: BallId) {
        if let Some(handle) = self.balls.remove(&id) {
            self.physics.remove_body(handle);
        }
    }

    /// Replaces the cue ball with a new body at rest on the head spot.
    pub(crate) fn respawn_cue_ball(&mut self) {
        self.remove_ball(CUE_BALL);
        let head = self.config.head_spot();
        self.spawn_ball(CUE_BALL, Vec3::new(head.x, 0.0, head.y));
    }

    pub fn apply_cue_impulse(&mut self, impulse: Vec3, torque: Vec3) {
        if let Some(&handle) = self.balls.get(&CUE_BALL) {
            self.physics.apply_impulse(handle, impulse);
            self.physics.apply_torque_impulse(handle, torque);
        }
    }

    /// Whether the cue ball could be placed at `spot` without leaving the cloth or
    /// touching another ball.
    pub fn is_spot_free(&self, spot: Vec2) -> bool {
        if !self.config.is_on_cloth(spot) {
            return false;
        }
        let min_dist = self.config.ball_radius * 2.0;
        self.active_balls()
            .filter(|id| !id.is_cue())
            .filter_map(|id| self.kinematics(id))
            .all(|k| Vec2::new(k.position.x, k.position.z).distance(spot) >= min_dist)
    }

    pub fn place_cue_ball(&mut self, spot: Vec2) -> bool {
        if !self.is_spot_free(spot) {
            return false;
        }
        if !self.is_active(CUE_BALL) {
            self.respawn_cue_ball();
        }
        self.set_ball_state(&BallState {
            number: CUE_BALL.number(),
            position: [spot.x, 0.0, spot.y],
            linvel: [0.0; 3],
            angvel: [0.0; 3],
            orientation: Quat::IDENTITY.to_array(),
        })
    }

    #[cfg(test)]
    pub(crate) fn body_count(&self) -> usize {
        self.physics.body_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BallTable {
        BallTable::new(TableConfig::default(), PhysicsWorld::DEFAULT_DT)
    }

    #[test]
    fn rack_has_sixteen_balls() {
        let table = table();
        assert_eq!(table.active_count(), 16);
        assert_eq!(table.body_count(), 16);
        let snapshot = table.capture();
        assert_eq!(snapshot.balls.len(), 16);
        assert_eq!(snapshot.balls[0].number, 0);
        assert_eq!(snapshot.balls[15].number, 15);
    }

    #[test]
    fn cue_respawn_keeps_single_cue_ball() {
        let mut table = table();
        table.set_position(CUE_BALL, Vec3::new(0.3, 0.0, 0.2));
        table.respawn_cue_ball();
        assert_eq!(table.active_count(), 16);
        assert_eq!(table.body_count(), 16);
        let cue = table.kinematics(CUE_BALL).unwrap();
        let head = table.config().head_spot();
        assert!((cue.position.x - head.x).abs() < 1e-6);
        assert_eq!(cue.linvel, Vec3::ZERO);
    }

    #[test]
    fn snapshot_rebuild_round_trips() {
        let mut table = table();
        table.set_velocity(BallId(5), Vec3::new(0.4, 0.0, -0.2), Vec3::new(1.0, 0.5, 2.0));
        table.remove_ball(BallId(12));
        table.pocketed_mut().record(BallId(12));

        let first = table.capture();
        let rebuilt = BallTable::from_snapshot(TableConfig::default(), table.dt(), &first);
        let second = rebuilt.capture();

        assert_eq!(second.balls.len(), 15);
        assert_eq!(second.pocketed, first.pocketed);
        assert!(first.max_divergence(&second).unwrap() < 1e-5);
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn cue_placement_rejects_overlap() {
        let mut table = table();
        let foot = table.config().foot_spot();
        assert!(!table.place_cue_ball(foot));
        assert!(!table.place_cue_ball(Vec2::new(10.0, 0.0)));
        assert!(table.place_cue_ball(Vec2::new(-0.9, 0.3)));
        let cue = table.kinematics(CUE_BALL).unwrap();
        assert!((cue.position.z - 0.3).abs() < 1e-6);
    }

    #[test]
    fn pocketed_and_unknown_balls_never_return() {
        let mut table = table();
        table.remove_ball(BallId(3));
        table.pocketed_mut().record(BallId(3));

        assert!(!table.set_ball_state(&BallState::at_rest(BallId(3), Vec3::ZERO)));
        assert!(!table.set_ball_state(&BallState::at_rest(BallId(200), Vec3::ZERO)));
        assert!(!table.is_active(BallId(3)));
        assert_eq!(table.active_count(), 15);
        assert_eq!(table.body_count(), 15);

        assert!(table.set_ball_state(&BallState::at_rest(BallId(4), Vec3::new(0.2, 0.0, 0.1))));
        assert_eq!(table.active_count(), 15);
    }
}
