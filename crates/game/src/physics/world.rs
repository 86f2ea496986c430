use glam::{Quat, Vec3};
use rapier3d::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyKinematics {
    pub position: Vec3,
    pub rotation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
}

/// Gravity-free rapier world stepped at a fixed rate. Bodies are only created and
/// stepped in deterministic order; two worlds fed the same calls stay bit-identical.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DT)
    }
}

impl PhysicsWorld {
    pub const DEFAULT_DT: Real = 1.0 / 120.0;

    pub fn new(dt: Real) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = dt;
        integration_parameters.min_ccd_dt = dt / 100.0;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(0.0, 0.0, 0.0),
        }
    }

    pub fn dt(&self) -> Real {
        self.integration_parameters.dt
    }

    pub fn step(&mut self) {
        self.pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn add_static_box(
        &mut self,
        position: Vec3,
        half_extents: Vec3,
        restitution: Real,
        friction: Real,
    ) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .translation(Vector::new(position.x, position.y, position.z))
            .restitution(restitution)
            .friction(friction)
            .build();
        self.colliders.insert(collider)
    }

    pub fn add_dynamic_sphere(
        &mut self,
        position: Vec3,
        radius: Real,
        mass: Real,
        restitution: Real,
        friction: Real,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(Vector::new(position.x, position.y, position.z))
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(radius)
            .mass(mass)
            .friction(friction)
            .restitution(restitution)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn kinematics(&self, handle: RigidBodyHandle) -> Option<BodyKinematics> {
        self.bodies.get(handle).map(|b| {
            let t = b.translation();
            let r = b.rotation();
            let v = b.linvel();
            let w = b.angvel();
            BodyKinematics {
                position: Vec3::new(t.x, t.y, t.z),
                rotation: Quat::from_xyzw(r.x, r.y, r.z, r.w),
                linvel: Vec3::new(v.x, v.y, v.z),
                angvel: Vec3::new(w.x, w.y, w.z),
            }
        })
    }

    pub fn set_kinematics(&mut self, handle: RigidBodyHandle, state: &BodyKinematics) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let q = state.rotation;
            let rot = Rotation::from_xyzw(q.x, q.y, q.z, q.w).normalize();
            let p = state.position;
            body.set_position(Pose::from_parts(Vector::new(p.x, p.y, p.z), rot), true);
            body.set_linvel(Vector::new(state.linvel.x, state.linvel.y, state.linvel.z), true);
            body.set_angvel(Vector::new(state.angvel.x, state.angvel.y, state.angvel.z), true);
        }
    }

    pub fn set_body_position(&mut self, handle: RigidBodyHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let current_rot = *body.rotation();
            let new_pose =
                Pose::from_parts(Vector::new(position.x, position.y, position.z), current_rot);
            body.set_position(new_pose, true);
        }
    }

    pub fn set_body_velocity(&mut self, handle: RigidBodyHandle, linvel: Vec3, angvel: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(Vector::new(linvel.x, linvel.y, linvel.z), true);
            body.set_angvel(Vector::new(angvel.x, angvel.y, angvel.z), true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(Vector::new(impulse.x, impulse.y, impulse.z), true);
        }
    }

    pub fn apply_torque_impulse(&mut self, handle: RigidBodyHandle, torque: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_torque_impulse(Vector::new(torque.x, torque.y, torque.z), true);
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
