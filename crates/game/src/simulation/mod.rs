mod config;
mod shot;
mod tick;

pub use config::SimConfig;
pub use shot::{ShotInput, ShotOutcome, ShotSimulator, SimError, Spin, StepResult};
pub use tick::FixedTimestep;
