//! In-memory signaling relay and data channel pair.
//!
//! The relay keeps the same room bookkeeping as the production one (join, leave,
//! host designation, two members per room) and routes opaque `signal` payloads.
//! Nothing is delivered synchronously: every completion lands in the receiving
//! endpoint's inbox and is dispatched by [`pump`].

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use serde_json::{Value, json};

use super::connection::PeerConnection;
use super::signaling::{ClientSignal, ServerSignal};
use super::transport::{DataChannel, SignalingTransport, TransportError};

pub const MAX_ROOM_MEMBERS: usize = 2;

type ClientId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalingInbound {
    Opened,
    Text(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelInbound {
    LocalSignal(Value),
    Open,
    Message(Vec<u8>),
    Closed,
}

#[derive(Debug, Default)]
struct Client {
    socket_open: bool,
    room: Option<String>,
    link: Option<ClientId>,
    signaling_inbox: VecDeque<SignalingInbound>,
    channel_inbox: VecDeque<ChannelInbound>,
}

#[derive(Debug)]
struct Hub {
    clients: Vec<Client>,
    rooms: BTreeMap<String, Vec<ClientId>>,
    relay_up: bool,
}

impl Hub {
    fn push_server(&mut self, id: ClientId, signal: &ServerSignal) {
        match signal.to_json() {
            Ok(text) => self.clients[id]
                .signaling_inbox
                .push_back(SignalingInbound::Text(text)),
            Err(e) => log::warn!("Relay failed to encode signal: {}", e),
        }
    }

    fn join(&mut self, id: ClientId, room: String) {
        if self.clients[id].room.is_some() {
            self.leave(id);
        }
        let members = self.rooms.entry(room.clone()).or_default();
        if members.len() >= MAX_ROOM_MEMBERS {
            self.push_server(id, &ServerSignal::RoomFull);
            return;
        }
        members.push(id);
        let is_host = members[0] == id;
        let others: Vec<ClientId> = members.iter().copied().filter(|&m| m != id).collect();
        let peer_count = (others.len() + 1) as u32;

        self.clients[id].room = Some(room.clone());
        self.push_server(
            id,
            &ServerSignal::RoomJoined {
                room,
                is_host,
                peer_count,
            },
        );
        for other in others {
            self.push_server(other, &ServerSignal::PeerJoined { peer_count });
        }
    }

    fn leave(&mut self, id: ClientId) {
        let Some(room) = self.clients[id].room.take() else {
            return;
        };
        let Some(members) = self.rooms.get_mut(&room) else {
            return;
        };
        members.retain(|&m| m != id);
        let remaining = members.clone();
        if remaining.is_empty() {
            self.rooms.remove(&room);
        }
        let peer_count = remaining.len() as u32;
        for other in remaining {
            self.push_server(other, &ServerSignal::PeerLeft { peer_count });
        }
    }

    fn relay(&mut self, id: ClientId, room: &str, data: Value) {
        if self.clients[id].room.as_deref() != Some(room) {
            let message = format!("not a member of room {room}");
            self.push_server(id, &ServerSignal::Error { message });
            return;
        }
        let others: Vec<ClientId> = self
            .rooms
            .get(room)
            .map(|members| members.iter().copied().filter(|&m| m != id).collect())
            .unwrap_or_default();
        for other in others {
            self.push_server(other, &ServerSignal::Signal { data: data.clone() });
        }
    }

    fn room_peer(&self, id: ClientId) -> Option<ClientId> {
        let room = self.clients[id].room.as_ref()?;
        self.rooms.get(room)?.iter().copied().find(|&m| m != id)
    }

    fn unlink(&mut self, id: ClientId) {
        if let Some(peer) = self.clients[id].link.take() {
            self.clients[peer].link = None;
            self.clients[peer]
                .channel_inbox
                .push_back(ChannelInbound::Closed);
        }
    }
}

/// Shared in-memory network. Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            hub: Rc::new(RefCell::new(Hub {
                clients: Vec::new(),
                rooms: BTreeMap::new(),
                relay_up: true,
            })),
        }
    }

    /// Registers a new client and returns its relay socket and data channel.
    pub fn endpoint(&self) -> (LoopbackSignaling, LoopbackChannel) {
        let mut hub = self.hub.borrow_mut();
        let id = hub.clients.len();
        hub.clients.push(Client::default());
        (
            LoopbackSignaling {
                hub: Rc::clone(&self.hub),
                id,
            },
            LoopbackChannel {
                hub: Rc::clone(&self.hub),
                id,
            },
        )
    }

    /// While down, opening a relay socket fails. Open sockets are unaffected.
    pub fn set_relay_up(&self, up: bool) {
        self.hub.borrow_mut().relay_up = up;
    }

    /// Simulates a network drop for one client: its channel and relay socket
    /// close on both ends.
    pub fn drop_client(&self, id: usize) {
        let mut hub = self.hub.borrow_mut();
        if id >= hub.clients.len() {
            return;
        }
        if hub.clients[id].link.is_some() {
            hub.unlink(id);
            hub.clients[id]
                .channel_inbox
                .push_back(ChannelInbound::Closed);
        }
        hub.leave(id);
        if hub.clients[id].socket_open {
            hub.clients[id].socket_open = false;
            hub.clients[id]
                .signaling_inbox
                .push_back(SignalingInbound::Closed);
        }
    }

    pub fn room_members(&self, room: &str) -> usize {
        self.hub.borrow().rooms.get(room).map_or(0, Vec::len)
    }
}

pub struct LoopbackSignaling {
    hub: Rc<RefCell<Hub>>,
    id: ClientId,
}

impl LoopbackSignaling {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn drain(&self) -> Vec<SignalingInbound> {
        self.hub.borrow_mut().clients[self.id]
            .signaling_inbox
            .drain(..)
            .collect()
    }
}

impl SignalingTransport for LoopbackSignaling {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut hub = self.hub.borrow_mut();
        if !hub.relay_up {
            return Err(TransportError::Unreachable("relay is down".into()));
        }
        let client = &mut hub.clients[self.id];
        client.socket_open = true;
        client.signaling_inbox.push_back(SignalingInbound::Opened);
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let mut hub = self.hub.borrow_mut();
        if !hub.clients[self.id].socket_open {
            return Err(TransportError::NotOpen);
        }
        match ClientSignal::parse(text) {
            Ok(ClientSignal::Join { room }) => hub.join(self.id, room),
            Ok(ClientSignal::Leave) => hub.leave(self.id),
            Ok(ClientSignal::Signal { room, data }) => hub.relay(self.id, &room, data),
            Err(e) => {
                let message = e.to_string();
                hub.push_server(self.id, &ServerSignal::Error { message });
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut hub = self.hub.borrow_mut();
        hub.leave(self.id);
        hub.clients[self.id].socket_open = false;
    }
}

pub struct LoopbackChannel {
    hub: Rc<RefCell<Hub>>,
    id: ClientId,
}

impl LoopbackChannel {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn drain(&self) -> Vec<ChannelInbound> {
        self.hub.borrow_mut().clients[self.id]
            .channel_inbox
            .drain(..)
            .collect()
    }

    /// Writes raw bytes to the linked peer, bypassing the envelope codec.
    pub fn inject_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut hub = self.hub.borrow_mut();
        let peer = hub.clients[self.id].link.ok_or(TransportError::NotOpen)?;
        hub.clients[peer]
            .channel_inbox
            .push_back(ChannelInbound::Message(bytes.to_vec()));
        Ok(())
    }
}

impl DataChannel for LoopbackChannel {
    fn initiate(&mut self) -> Result<(), TransportError> {
        let mut hub = self.hub.borrow_mut();
        if hub.room_peer(self.id).is_none() {
            return Err(TransportError::Unreachable("no peer in room".into()));
        }
        let offer = json!({ "kind": "offer", "from": self.id });
        hub.clients[self.id]
            .channel_inbox
            .push_back(ChannelInbound::LocalSignal(offer));
        Ok(())
    }

    fn apply_remote_signal(&mut self, data: &Value) -> Result<(), TransportError> {
        let kind = data.get("kind").and_then(Value::as_str);
        let from = data
            .get("from")
            .and_then(Value::as_u64)
            .map(|from| from as ClientId);
        let mut hub = self.hub.borrow_mut();
        let peer = match from {
            Some(peer) if peer < hub.clients.len() && peer != self.id => peer,
            _ => return Err(TransportError::Rejected(data.to_string())),
        };

        match kind {
            Some("offer") => {
                let answer = json!({ "kind": "answer", "from": self.id });
                hub.clients[self.id]
                    .channel_inbox
                    .push_back(ChannelInbound::LocalSignal(answer));
                Ok(())
            }
            Some("answer") => {
                hub.unlink(self.id);
                hub.unlink(peer);
                hub.clients[self.id].link = Some(peer);
                hub.clients[peer].link = Some(self.id);
                hub.clients[self.id]
                    .channel_inbox
                    .push_back(ChannelInbound::Open);
                hub.clients[peer]
                    .channel_inbox
                    .push_back(ChannelInbound::Open);
                Ok(())
            }
            _ => Err(TransportError::Rejected(data.to_string())),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inject_raw(bytes)
    }

    fn close(&mut self) {
        self.hub.borrow_mut().unlink(self.id);
    }
}

pub type LoopbackConnection = PeerConnection<LoopbackSignaling, LoopbackChannel>;

/// Dispatches everything queued for `conn`. Returns the number of deliveries.
pub fn pump(conn: &mut LoopbackConnection, now: Instant) -> usize {
    let mut delivered = 0;
    loop {
        let signaling = conn.signaling().drain();
        let channel = conn.channel().drain();
        if signaling.is_empty() && channel.is_empty() {
            return delivered;
        }
        delivered += signaling.len() + channel.len();

        for inbound in signaling {
            match inbound {
                SignalingInbound::Opened => conn.on_signaling_open(now),
                SignalingInbound::Text(text) => conn.on_signaling_message(&text, now),
                SignalingInbound::Closed => conn.on_signaling_closed(now),
            }
        }
        for inbound in channel {
            match inbound {
                ChannelInbound::LocalSignal(data) => conn.on_local_signal(data),
                ChannelInbound::Open => conn.on_channel_open(now),
                ChannelInbound::Message(bytes) => conn.on_channel_message(&bytes, now),
                ChannelInbound::Closed => conn.on_channel_closed(now),
            }
        }
    }
}

/// Pumps both sides until neither has anything queued.
pub fn settle(a: &mut LoopbackConnection, b: &mut LoopbackConnection, now: Instant) {
    const MAX_ROUNDS: usize = 64;

    for _ in 0..MAX_ROUNDS {
        if pump(a, now) + pump(b, now) == 0 {
            return;
        }
    }
    log::warn!("Loopback still busy after {} rounds", MAX_ROUNDS);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(signaling: &LoopbackSignaling) -> Vec<ServerSignal> {
        signaling
            .drain()
            .into_iter()
            .filter_map(|inbound| match inbound {
                SignalingInbound::Text(text) => ServerSignal::parse(&text).ok(),
                _ => None,
            })
            .collect()
    }

    fn join(signaling: &mut LoopbackSignaling, room: &str) {
        let text = ClientSignal::Join { room: room.into() }.to_json().unwrap();
        signaling.send(&text).unwrap();
    }

    #[test]
    fn first_member_is_host_and_third_is_turned_away() {
        let net = LoopbackNetwork::new();
        let (mut a, _) = net.endpoint();
        let (mut b, _) = net.endpoint();
        let (mut c, _) = net.endpoint();
        for s in [&mut a, &mut b, &mut c] {
            s.open().unwrap();
            s.drain();
        }

        join(&mut a, "ROOM1");
        join(&mut b, "ROOM1");
        join(&mut c, "ROOM1");

        assert_eq!(
            texts(&a),
            vec![
                ServerSignal::RoomJoined {
                    room: "ROOM1".into(),
                    is_host: true,
                    peer_count: 1
                },
                ServerSignal::PeerJoined { peer_count: 2 },
            ]
        );
        assert!(matches!(
            texts(&b).as_slice(),
            [ServerSignal::RoomJoined { is_host: false, peer_count: 2, .. }]
        ));
        assert_eq!(texts(&c), vec![ServerSignal::RoomFull]);
        assert_eq!(net.room_members("ROOM1"), 2);
    }

    #[test]
    fn leave_notifies_remaining_member() {
        let net = LoopbackNetwork::new();
        let (mut a, _) = net.endpoint();
        let (mut b, _) = net.endpoint();
        a.open().unwrap();
        b.open().unwrap();
        join(&mut a, "ROOM2");
        join(&mut b, "ROOM2");
        a.drain();

        b.close();
        assert_eq!(texts(&a), vec![ServerSignal::PeerLeft { peer_count: 1 }]);
        assert_eq!(net.room_members("ROOM2"), 1);
    }

    #[test]
    fn relay_down_refuses_sockets() {
        let net = LoopbackNetwork::new();
        net.set_relay_up(false);
        let (mut a, _) = net.endpoint();
        assert!(matches!(a.open(), Err(TransportError::Unreachable(_))));
        assert!(matches!(a.send("{}"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn unlinked_channel_cannot_send() {
        let net = LoopbackNetwork::new();
        let (_, mut channel) = net.endpoint();
        assert_eq!(channel.send(b"hi"), Err(TransportError::NotOpen));
        assert!(channel.initiate().is_err());
    }
}
