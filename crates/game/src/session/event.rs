use crate::net::ShotSummary;
use crate::physics::PocketEvent;
use crate::rules::{GameOver, Player};
use crate::snapshot::{SnapshotError, StateHash};
use crate::table::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShotRejected {
    #[error("the game is over")]
    GameOver,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("balls are still moving")]
    BallsMoving,
    #[error("the cue ball has to be placed first")]
    BallInHand,
    #[error("waiting for authoritative state")]
    AwaitingSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Shot(#[from] ShotRejected),
    #[error("no ball in hand to place")]
    NoBallInHand,
    #[error("the cue ball cannot be placed there")]
    InvalidPlacement,
}

/// Peer state that was not installed. Non-fatal; the session keeps its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateRejected {
    #[error("full state is only accepted from the host")]
    NotAuthority,
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("the eight ball is down but no verdict was sent")]
    MissingVerdict,
    #[error("a verdict was sent with the eight ball on the table")]
    UnexpectedVerdict,
    #[error("a state delta may only carry the cue ball")]
    NotCuePlacement,
    #[error("the peer has no ball in hand")]
    NoBallInHand,
    #[error("the cue ball cannot be placed there")]
    InvalidPlacement,
    #[error("balls are still moving")]
    BallsMoving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncCause {
    Hash { local: StateHash, remote: StateHash },
    Turn { local: Player, remote: Player },
    RejectedShot,
    RejectedDelta,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    TurnText(String),
    ShotStarted {
        shot_id: u32,
        shooter: Player,
    },
    ShotSettled {
        shot_id: u32,
        shooter: Player,
        hash: StateHash,
        steps: u32,
        forced: bool,
    },
    Pocketed(PocketEvent),
    GroupAssigned {
        player: Player,
        group: Group,
    },
    GameOver(GameOver),
    Desync {
        shot_id: u32,
        cause: DesyncCause,
    },
    Resynced {
        shot_id: u32,
        hash: StateHash,
    },
    RemoteShotRejected {
        shot_id: u32,
        reason: ShotRejected,
    },
    CueBallPlaced {
        player: Player,
    },
    StateRejected {
        kind: &'static str,
        reason: StateRejected,
    },
    PeerReport(ShotSummary),
}
