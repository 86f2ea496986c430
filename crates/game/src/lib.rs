pub mod net;
pub mod physics;
pub mod rules;
pub mod session;
pub mod simulation;
pub mod snapshot;
pub mod table;

pub use net::{
    ConnectionConfig, ConnectionEvent, ConnectionState, PeerConnection, PeerEnvelope, PeerMessage,
};
pub use physics::{BallTable, PhysicsWorld, PocketEvent};
pub use rules::{GameOver, Player, ShotTally, TurnState, WinReason};
pub use session::{Session, SessionError, SessionEvent, ShotRejected};
pub use simulation::{FixedTimestep, ShotInput, ShotOutcome, ShotSimulator, SimConfig, Spin};
pub use snapshot::{BallState, GameStateSnapshot, PocketedState, SnapshotError, StateHash};
pub use table::{BallId, BallKind, Group, TableConfig};
