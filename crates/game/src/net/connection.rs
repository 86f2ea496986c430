use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::protocol::{CodecError, PeerEnvelope, PeerMessage};
use super::retry::{Backoff, ScheduledRetry};
use super::signaling::{ClientSignal, ServerSignal};
use super::stats::NetworkStats;
use super::transport::{DataChannel, SignalingTransport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Opening the relay socket.
    Connecting,
    /// Relay socket open; joining the room or negotiating the data channel.
    Signaling,
    /// Room joined, peer absent.
    Waiting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Signaling => "signaling",
            Self::Waiting => "waiting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    SocketOpened,
    JoinedAlone,
    PeerArrived,
    PeerDeparted,
    ChannelOpened,
    Lost,
    RetryDue,
    Failed,
    Leave,
}

/// The full transition table. `None` means the transition is ignored in that state.
pub fn next_state(state: ConnectionState, transition: Transition) -> Option<ConnectionState> {
    use ConnectionState::*;
    use Transition::*;

    match (state, transition) {
        (Disconnected, Connect) => Some(Connecting),
        (Reconnecting, RetryDue) => Some(Connecting),
        (Connecting, SocketOpened) => Some(Signaling),
        (Signaling, JoinedAlone) => Some(Waiting),
        (Waiting, PeerArrived) => Some(Signaling),
        (Signaling, PeerDeparted) => Some(Waiting),
        (Signaling | Waiting, ChannelOpened) => Some(Connected),
        (Connecting | Signaling | Waiting | Connected, Lost) => Some(Reconnecting),
        (Disconnected, Failed | Leave) => None,
        (_, Failed | Leave) => Some(Disconnected),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Left,
    SignalingUnavailable,
    SignalingClosed,
    ChannelClosed,
    LivenessTimeout,
    RoomFull,
    RetriesExhausted,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left the room",
            Self::SignalingUnavailable => "signaling relay unavailable",
            Self::SignalingClosed => "signaling connection closed",
            Self::ChannelClosed => "data channel closed",
            Self::LivenessTimeout => "peer stopped responding",
            Self::RoomFull => "room is full",
            Self::RetriesExhausted => "reconnect attempts exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    RoomJoined {
        room: String,
        is_host: bool,
        peer_count: u32,
    },
    PeerJoined {
        peer_count: u32,
    },
    PeerLeft {
        peer_count: u32,
    },
    Connected,
    Disconnected {
        reason: DisconnectReason,
    },
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    Message(PeerMessage),
    Latency {
        rtt_ms: f32,
    },
    RoomFull,
    ProtocolError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub room: String,
    pub ping_interval: Duration,
    pub liveness_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            room: String::new(),
            ping_interval: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(10),
            reconnect_base: Duration::from_millis(500),
            reconnect_cap: Duration::from_secs(8),
            max_reconnect_attempts: 5,
        }
    }
}

impl ConnectionConfig {
    pub fn for_room(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.reconnect_base,
            cap: self.reconnect_cap,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Owns the lifecycle of one peer link: relay socket, room membership, data
/// channel negotiation, liveness and reconnection.
///
/// Transports report completions through the `on_*` methods; time is always
/// supplied by the caller so the machine stays deterministic under test.
pub struct PeerConnection<S, D> {
    config: ConnectionConfig,
    state: ConnectionState,
    signaling: S,
    channel: D,
    socket_open: bool,
    is_host: bool,
    ever_connected: bool,
    retry: ScheduledRetry,
    epoch: Instant,
    next_ping: Option<Instant>,
    last_received: Option<Instant>,
    send_sequence: u32,
    last_remote_sequence: Option<u32>,
    stats: NetworkStats,
    events: VecDeque<ConnectionEvent>,
}

impl<S: SignalingTransport, D: DataChannel> PeerConnection<S, D> {
    pub fn new(config: ConnectionConfig, signaling: S, channel: D, now: Instant) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            signaling,
            channel,
            socket_open: false,
            is_host: false,
            ever_connected: false,
            retry: ScheduledRetry::new(),
            epoch: now,
            next_ping: None,
            last_received: None,
            send_sequence: 0,
            last_remote_sequence: None,
            stats: NetworkStats::default(),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn signaling(&self) -> &S {
        &self.signaling
    }

    pub fn channel(&self) -> &D {
        &self.channel
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        self.events.drain(..).collect()
    }

    pub fn connect(&mut self, now: Instant) {
        if !self.transition(Transition::Connect) {
            return;
        }
        log::info!("Connecting to room {}", self.config.room);
        self.ever_connected = false;
        self.retry.reset();
        self.open_signaling(now);
    }

    pub fn leave(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if self.socket_open {
            self.send_signal(&ClientSignal::Leave);
        }
        self.close_transports();
        self.retry.cancel();
        self.transition(Transition::Leave);
        self.events.push_back(ConnectionEvent::Disconnected {
            reason: DisconnectReason::Left,
        });
    }

    pub fn on_signaling_open(&mut self, now: Instant) {
        if !self.transition(Transition::SocketOpened) {
            return;
        }
        self.socket_open = true;
        let join = ClientSignal::Join {
            room: self.config.room.clone(),
        };
        if !self.send_signal(&join) {
            self.connection_lost(DisconnectReason::SignalingClosed, now);
        }
    }

    pub fn on_signaling_message(&mut self, text: &str, now: Instant) {
        let signal = match ServerSignal::parse(text) {
            Ok(signal) => signal,
            Err(e) => {
                self.protocol_error(e.to_string());
                return;
            }
        };

        match signal {
            ServerSignal::RoomJoined {
                room,
                is_host,
                peer_count,
            } => {
                log::info!(
                    "Joined room {} as {} ({} present)",
                    room,
                    if is_host { "host" } else { "guest" },
                    peer_count
                );
                self.is_host = is_host;
                if peer_count < 2 {
                    self.transition(Transition::JoinedAlone);
                }
                self.events.push_back(ConnectionEvent::RoomJoined {
                    room,
                    is_host,
                    peer_count,
                });
                if is_host && peer_count >= 2 {
                    self.initiate_channel(now);
                }
            }
            ServerSignal::PeerJoined { peer_count } => {
                self.events
                    .push_back(ConnectionEvent::PeerJoined { peer_count });
                self.transition(Transition::PeerArrived);
                if self.is_host && self.state == ConnectionState::Signaling {
                    self.initiate_channel(now);
                }
            }
            ServerSignal::PeerLeft { peer_count } => {
                self.events.push_back(ConnectionEvent::PeerLeft { peer_count });
                if peer_count <= 1 {
                    // Sole remaining member initiates with whoever joins next.
                    self.is_host = true;
                }
                if self.state == ConnectionState::Signaling {
                    self.channel.close();
                    self.transition(Transition::PeerDeparted);
                }
            }
            ServerSignal::Signal { data } => {
                if let Err(e) = self.channel.apply_remote_signal(&data) {
                    self.protocol_error(format!("remote signal rejected: {e}"));
                }
            }
            ServerSignal::RoomFull => {
                log::warn!("Room {} is full", self.config.room);
                self.events.push_back(ConnectionEvent::RoomFull);
                self.close_transports();
                self.retry.cancel();
                self.fail(DisconnectReason::RoomFull);
            }
            ServerSignal::Error { message } => {
                self.protocol_error(format!("relay error: {message}"));
            }
        }
    }

    pub fn on_signaling_closed(&mut self, now: Instant) {
        if !self.socket_open {
            return;
        }
        self.socket_open = false;
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Signaling
            | ConnectionState::Waiting => {
                self.connection_lost(DisconnectReason::SignalingClosed, now);
            }
            // The data channel does not depend on the relay once open.
            _ => log::info!("Signaling socket closed"),
        }
    }

    /// Negotiation payload produced by the local data channel.
    pub fn on_local_signal(&mut self, data: Value) {
        if !self.socket_open {
            log::debug!("Dropping local signal, relay socket closed");
            return;
        }
        let signal = ClientSignal::Signal {
            room: self.config.room.clone(),
            data,
        };
        self.send_signal(&signal);
    }

    pub fn on_channel_open(&mut self, now: Instant) {
        if !self.transition(Transition::ChannelOpened) {
            return;
        }
        log::info!("Peer data channel open");
        self.ever_connected = true;
        self.retry.reset();
        self.last_received = Some(now);
        self.last_remote_sequence = None;
        self.next_ping = Some(now);
        self.events.push_back(ConnectionEvent::Connected);
    }

    pub fn on_channel_message(&mut self, bytes: &[u8], now: Instant) {
        self.stats.messages_received += 1;
        self.stats.bytes_received += bytes.len() as u64;

        let envelope = match PeerEnvelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.protocol_error(e.to_string());
                return;
            }
        };
        self.last_received = Some(now);

        if let Some(last) = self.last_remote_sequence
            && envelope.sequence <= last
        {
            log::debug!(
                "Out-of-order message {} after {}",
                envelope.sequence,
                last
            );
        }
        self.last_remote_sequence = Some(envelope.sequence);

        match envelope.message {
            PeerMessage::Ping { timestamp } => {
                if let Err(e) = self.send(PeerMessage::Pong { timestamp }, now) {
                    log::warn!("Failed to answer ping: {}", e);
                }
            }
            PeerMessage::Pong { timestamp } => {
                let rtt = self.millis(now).saturating_sub(timestamp) as f32;
                self.stats.record_rtt(rtt);
                log::debug!("Ping RTT: {} ms", rtt);
                self.events.push_back(ConnectionEvent::Latency { rtt_ms: rtt });
            }
            message => self.events.push_back(ConnectionEvent::Message(message)),
        }
    }

    pub fn on_channel_closed(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Signaling => {
                log::warn!("Peer data channel closed");
                self.connection_lost(DisconnectReason::ChannelClosed, now);
            }
            _ => {}
        }
    }

    pub fn send(&mut self, message: PeerMessage, now: Instant) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotOpen.into());
        }
        self.send_sequence = self.send_sequence.wrapping_add(1);
        let envelope = PeerEnvelope::new(self.send_sequence, self.millis(now), message);
        let bytes = envelope.encode()?;
        self.channel.send(&bytes)?;
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    /// Drives timers: reconnect attempts, liveness probes and the liveness timeout.
    pub fn poll(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Reconnecting => {
                if self.retry.poll(now) && self.transition(Transition::RetryDue) {
                    log::info!("Reconnect attempt {}", self.retry.attempts());
                    self.open_signaling(now);
                }
            }
            ConnectionState::Connected => {
                if let Some(last) = self.last_received
                    && now.saturating_duration_since(last) > self.config.liveness_timeout
                {
                    log::warn!("Peer timed out");
                    self.connection_lost(DisconnectReason::LivenessTimeout, now);
                    return;
                }
                if self.next_ping.is_some_and(|due| now >= due) {
                    let ping = PeerMessage::Ping {
                        timestamp: self.millis(now),
                    };
                    if let Err(e) = self.send(ping, now) {
                        log::warn!("Failed to send ping: {}", e);
                    }
                    self.next_ping = Some(now + self.config.ping_interval);
                }
            }
            _ => {}
        }
    }

    fn transition(&mut self, transition: Transition) -> bool {
        let Some(next) = next_state(self.state, transition) else {
            log::debug!("Ignoring {:?} while {}", transition, self.state.as_str());
            return false;
        };
        if next != self.state {
            log::info!("Connection {} -> {}", self.state.as_str(), next.as_str());
            self.events.push_back(ConnectionEvent::StateChanged {
                from: self.state,
                to: next,
            });
            self.state = next;
        }
        true
    }

    fn open_signaling(&mut self, now: Instant) {
        if let Err(e) = self.signaling.open() {
            log::warn!("Signaling relay unreachable: {}", e);
            self.connection_lost(DisconnectReason::SignalingUnavailable, now);
        }
    }

    fn initiate_channel(&mut self, now: Instant) {
        log::debug!("Initiating data channel");
        if let Err(e) = self.channel.initiate() {
            log::warn!("Data channel negotiation failed: {}", e);
            self.connection_lost(DisconnectReason::ChannelClosed, now);
        }
    }

    fn send_signal(&mut self, signal: &ClientSignal) -> bool {
        let text = match signal.to_json() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to encode signal: {}", e);
                return false;
            }
        };
        match self.signaling.send(&text) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Signaling send failed: {}", e);
                false
            }
        }
    }

    fn close_transports(&mut self) {
        self.channel.close();
        self.signaling.close();
        self.socket_open = false;
        self.next_ping = None;
        self.last_received = None;
    }

    /// Reconnects only links that were established at least once.
    fn connection_lost(&mut self, reason: DisconnectReason, now: Instant) {
        self.close_transports();
        if !self.ever_connected {
            self.fail(reason);
            return;
        }

        let backoff = self.config.backoff();
        match self.retry.schedule(now, &backoff) {
            Some(delay) => {
                self.events
                    .push_back(ConnectionEvent::Disconnected { reason });
                self.transition(Transition::Lost);
                let attempt = self.retry.attempts();
                log::info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.events
                    .push_back(ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            None => self.fail(DisconnectReason::RetriesExhausted),
        }
    }

    fn fail(&mut self, reason: DisconnectReason) {
        log::warn!("Disconnected: {}", reason.as_str());
        self.transition(Transition::Failed);
        self.events
            .push_back(ConnectionEvent::Disconnected { reason });
    }

    fn protocol_error(&mut self, message: String) {
        log::warn!("Dropping malformed message: {}", message);
        self.stats.protocol_errors += 1;
        self.events
            .push_back(ConnectionEvent::ProtocolError(message));
    }

    fn millis(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }
}
