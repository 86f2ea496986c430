mod ball;
mod layout;

pub use ball::{BallId, BallKind, CUE_BALL, EIGHT_BALL, Group, RACK_ORDER};
pub use layout::{Pocket, PocketKind, TableConfig};
