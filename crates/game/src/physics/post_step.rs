use glam::{Quat, Vec2, Vec3};

use crate::table::{BallId, BallKind, Pocket};

use super::BallTable;

#[derive(Debug, Clone)]
pub struct PostStepConfig {
    /// Coulomb rolling resistance, applied as `mu * g` deceleration.
    pub rolling_friction: f32,
    pub gravity: f32,
    /// Fraction of the gap to pure rolling closed per step.
    pub roll_blend: f32,
    /// Fraction of the gap between spin-driven surface speed and linear speed
    /// closed per step. Gives draw and follow their effect.
    pub spin_transfer: f32,
    /// Per-step retention of spin about the table normal.
    pub vertical_spin_retention: f32,
    pub stop_linear: f32,
    pub stop_angular: f32,
}

impl Default for PostStepConfig {
    fn default() -> Self {
        Self {
            rolling_friction: 0.08,
            gravity: 9.81,
            roll_blend: 0.15,
            spin_transfer: 0.02,
            vertical_spin_retention: 0.96,
            stop_linear: 0.005,
            stop_angular: 0.2,
        }
    }
}

/// A ball leaving the table, with what the animation layer needs to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct PocketEvent {
    pub ball: BallId,
    pub start_position: Vec3,
    pub pocket: Pocket,
    pub orientation: Quat,
    pub out_of_bounds: bool,
}

/// Runs after every physics step: pocket capture, then rolling friction and the
/// table-plane clamp. Returns the balls pocketed during this step.
pub fn post_step(table: &mut BallTable, config: &PostStepConfig) -> Vec<PocketEvent> {
    let events = detect_pockets(table);
    for event in &events {
        apply_pocketing(table, event);
    }
    apply_rolling_friction(table, config);
    events
}

fn detect_pockets(table: &BallTable) -> Vec<PocketEvent> {
    let pockets = table.config().pockets();
    let mut events = Vec::new();

    for id in table.active_balls() {
        let Some(k) = table.kinematics(id) else {
            continue;
        };
        let planar = Vec2::new(k.position.x, k.position.z);

        let captured = pockets
            .iter()
            .find(|p| p.center.distance(planar) <= p.capture_radius)
            .copied();

        let (pocket, out_of_bounds) = match captured {
            Some(pocket) => (pocket, false),
            None if table.config().is_out_of_bounds(planar) => {
                (table.config().nearest_pocket(planar), true)
            }
            None => continue,
        };

        events.push(PocketEvent {
            ball: id,
            start_position: k.position,
            pocket,
            orientation: k.rotation,
            out_of_bounds,
        });
    }

    events
}

fn apply_pocketing(table: &mut BallTable, event: &PocketEvent) {
    if event.out_of_bounds {
        log::debug!(
            "Ball {} left the table, attributed to pocket {}",
            event.ball,
            event.pocket.index
        );
    }

    match event.ball.kind() {
        BallKind::Cue => table.respawn_cue_ball(),
        BallKind::Solid | BallKind::Stripe | BallKind::Eight => {
            table.remove_ball(event.ball);
            table.pocketed_mut().record(event.ball);
        }
    }
}

/// Surface velocity a ball's spin would drive it at if the contact did not slip.
#[inline]
fn spin_surface_velocity(angvel: Vec3, radius: f32) -> Vec3 {
    Vec3::new(-angvel.z, 0.0, angvel.x) * radius
}

/// Angular velocity of a ball rolling without slip at `linvel`.
#[inline]
fn rolling_angvel(linvel: Vec3, radius: f32) -> Vec3 {
    Vec3::new(linvel.z, 0.0, -linvel.x) / radius
}

fn apply_rolling_friction(table: &mut BallTable, config: &PostStepConfig) {
    let radius = table.config().ball_radius;
    let decel = config.rolling_friction * config.gravity * table.dt();
    let ids: Vec<BallId> = table.active_balls().collect();

    for id in ids {
        let Some(k) = table.kinematics(id) else {
            continue;
        };

        if k.position.y != 0.0 || k.linvel.y != 0.0 {
            table.set_position(id, Vec3::new(k.position.x, 0.0, k.position.z));
        }

        if k.linvel == Vec3::ZERO && k.angvel == Vec3::ZERO {
            continue;
        }
        let mut linvel = Vec3::new(k.linvel.x, 0.0, k.linvel.z);
        let mut angvel = k.angvel;

        let speed = linvel.length();
        if speed > 0.0 {
            if speed <= decel || speed < config.stop_linear {
                linvel = Vec3::ZERO;
            } else {
                linvel *= (speed - decel) / speed;
            }
        }

        let surface = spin_surface_velocity(angvel, radius);
        linvel += (surface - linvel) * config.spin_transfer;

        let roll = rolling_angvel(linvel, radius);
        angvel.x += (roll.x - angvel.x) * config.roll_blend;
        angvel.z += (roll.z - angvel.z) * config.roll_blend;
        angvel.y *= config.vertical_spin_retention;

        if linvel.length() < config.stop_linear {
            linvel = Vec3::ZERO;
        }
        if linvel == Vec3::ZERO && angvel.length() < config.stop_angular {
            angvel = Vec3::ZERO;
        }

        table.set_velocity(id, linvel, angvel);
    }
}
