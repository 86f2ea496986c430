mod connection;
pub mod loopback;
mod protocol;
mod retry;
mod signaling;
mod stats;
mod transport;

pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState, DisconnectReason,
    PeerConnection, Transition, next_state,
};
pub use protocol::{
    CodecError, MAX_MESSAGE_SIZE, PROTOCOL_VERSION, PeerEnvelope, PeerMessage, ShotSummary,
};
pub use retry::{Backoff, ScheduledRetry};
pub use signaling::{ClientSignal, ServerSignal, SignalingError, is_valid_room_code};
pub use stats::NetworkStats;
pub use transport::{DataChannel, SignalingTransport, TransportError};
