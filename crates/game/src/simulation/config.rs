use crate::physics::PostStepConfig;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_rate: u32,
    /// Consecutive quiet steps required before a shot counts as settled.
    pub settle_checks: u32,
    /// Hard cap on steps per shot, after which the shot is forced to settle.
    pub max_steps: u32,
    /// Linear impulse (N*s) delivered at full power.
    pub max_shot_impulse: f32,
    /// Torque impulse (N*m*s) per unit of spin at full power.
    pub spin_torque_scale: f32,
    pub post_step: PostStepConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 120,
            settle_checks: 8,
            max_steps: 120 * 30,
            max_shot_impulse: 1.7,
            spin_torque_scale: 0.02,
            post_step: PostStepConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}
