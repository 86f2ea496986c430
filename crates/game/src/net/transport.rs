use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("remote signal rejected: {0}")]
    Rejected(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Text socket to the signaling relay. Completion (open, inbound text, close) is
/// reported back to the connection through its `on_signaling_*` methods.
pub trait SignalingTransport {
    fn open(&mut self) -> Result<(), TransportError>;
    fn send(&mut self, text: &str) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// Peer-to-peer data channel. Negotiation payloads it produces are handed to the
/// connection via `on_local_signal` and relayed through signaling.
pub trait DataChannel {
    /// Starts negotiation as the initiating side.
    fn initiate(&mut self) -> Result<(), TransportError>;
    fn apply_remote_signal(&mut self, data: &Value) -> Result<(), TransportError>;
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn close(&mut self);
}
