mod post_step;
mod table;
mod world;

pub use post_step::{PocketEvent, PostStepConfig, post_step};
pub use table::BallTable;
pub use world::{BodyKinematics, PhysicsWorld};
