use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::rules::{GameOver, Player, ShotTally, TurnState};
use crate::simulation::ShotInput;
use crate::snapshot::{BallState, GameStateSnapshot, StateHash};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Post-shot summary sent by the shooter for display on the other side.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ShotSummary {
    pub shot_id: u32,
    pub shooter: Player,
    pub tally: ShotTally,
    pub steps: u32,
    pub winner: Option<Player>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PeerMessage {
    Shot {
        shot_id: u32,
        input: ShotInput,
    },
    /// Authoritative state from the host. Carries the verdict when the eight
    /// ball is down.
    StateFull {
        shot_id: u32,
        snapshot: GameStateSnapshot,
        turn: TurnState,
        game_over: Option<GameOver>,
    },
    /// Ball kinematics only; pocketed state and turn are untouched.
    StateDelta {
        balls: Vec<BallState>,
    },
    StateHash {
        shot_id: u32,
        hash: StateHash,
    },
    SyncRequest {
        shot_id: u32,
    },
    TurnChange {
        shot_id: u32,
        current: Player,
    },
    GameEvent(ShotSummary),
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
}

impl PeerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shot { .. } => "shot",
            Self::StateFull { .. } => "state-full",
            Self::StateDelta { .. } => "state-delta",
            Self::StateHash { .. } => "state-hash",
            Self::SyncRequest { .. } => "sync-request",
            Self::TurnChange { .. } => "turn-change",
            Self::GameEvent(_) => "game-event",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Wire wrapper. Sequence and timestamp are advisory: used for latency and
/// ordering diagnostics, never for delivery guarantees.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PeerEnvelope {
    pub version: u32,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub message: PeerMessage,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("message of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("unsupported protocol version {0}")]
    Version(u32),
}

impl PeerEnvelope {
    pub fn new(sequence: u32, timestamp_ms: u64, message: PeerMessage) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            timestamp_ms,
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(CodecError::Serialize)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::TooLarge(data.len()));
        }
        let envelope =
            rkyv::from_bytes::<Self, rancor::Error>(data).map_err(CodecError::Deserialize)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(CodecError::Version(envelope.version));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::snapshot::PocketedState;
    use crate::table::BallId;

    #[test]
    fn shot_message_survives_the_wire() {
        let message = PeerMessage::Shot {
            shot_id: 4,
            input: ShotInput::new(0.5, 0.8).with_spin(-0.3, 0.1),
        };
        let envelope = PeerEnvelope::new(17, 1234, message.clone());
        let bytes = envelope.encode().unwrap();
        let decoded = PeerEnvelope::decode(&bytes).unwrap();
        assert_eq!(decoded.sequence, 17);
        assert_eq!(decoded.timestamp_ms, 1234);
        assert_eq!(decoded.message, message);
    }

    #[test]
    fn full_state_fits_in_one_message() {
        let balls = BallId::all()
            .map(|id| BallState::at_rest(id, Vec3::new(id.number() as f32 * 0.1, 0.0, 0.0)))
            .collect();
        let message = PeerMessage::StateFull {
            shot_id: 9,
            snapshot: GameStateSnapshot::new(balls, PocketedState::default()),
            turn: TurnState::new(),
            game_over: None,
        };
        let bytes = PeerEnvelope::new(1, 0, message.clone()).encode().unwrap();
        assert!(bytes.len() < MAX_MESSAGE_SIZE);
        assert_eq!(PeerEnvelope::decode(&bytes).unwrap().message, message);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PeerEnvelope::decode(&[0xde, 0xad, 0xbe, 0xef]).is_err());
        assert!(PeerEnvelope::decode(&vec![0u8; MAX_MESSAGE_SIZE + 1]).is_err());
    }

    #[test]
    fn message_kinds_use_wire_names() {
        assert_eq!(PeerMessage::Ping { timestamp: 0 }.kind(), "ping");
        assert_eq!(PeerMessage::SyncRequest { shot_id: 0 }.kind(), "sync-request");
    }
}
