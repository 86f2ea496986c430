mod hash;
mod reconcile;
mod state;

pub use hash::{HASH_DECIMALS, StateHash, canonical_string};
pub use reconcile::{HashCheck, Reconciler};
pub use state::{BallState, GameStateSnapshot, PocketedState, SnapshotError};
