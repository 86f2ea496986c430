use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use glam::Vec2;

use cuesync::net::loopback::{LoopbackConnection, LoopbackNetwork, settle};
use cuesync::net::{ConnectionConfig, ConnectionEvent};
use cuesync::session::SessionEvent;
use cuesync::{GameStateSnapshot, PeerConnection, Player, Session, ShotInput, StateHash};

const GOLDEN_ANGLE: f32 = 2.399_963;
const MAX_ROUTE_ROUNDS: usize = 16;

pub struct MatchOptions {
    pub shots: u32,
    pub power: f32,
    pub frame: Duration,
    pub fast: bool,
    pub perturb_at: Option<u32>,
    pub room: String,
    pub max_frames: u64,
}

pub struct ShotRecord {
    pub shot_id: u32,
    pub shooter: Player,
    pub steps: u32,
    pub host_hash: StateHash,
    pub guest_hash: StateHash,
    pub resynced: bool,
}

pub struct MatchReport {
    pub shots: Vec<ShotRecord>,
    pub resyncs: u32,
    pub final_hash: StateHash,
    pub rtt_ms: f32,
    pub verdict: Option<String>,
    pub snapshot: GameStateSnapshot,
}

struct Peer {
    name: &'static str,
    session: Session,
    conn: LoopbackConnection,
}

impl Peer {
    fn new(name: &'static str, session: Session, net: &LoopbackNetwork, room: &str) -> Self {
        let (signaling, channel) = net.endpoint();
        let conn = PeerConnection::new(
            ConnectionConfig::for_room(room),
            signaling,
            channel,
            Instant::now(),
        );
        Self {
            name,
            session,
            conn,
        }
    }

    /// Feeds connection events into the session and the session's outbox into
    /// the connection. Returns how many items moved.
    fn dispatch(&mut self, now: Instant) -> usize {
        let events = self.conn.drain_events();
        let mut moved = events.len();
        for event in events {
            match event {
                ConnectionEvent::Message(message) => self.session.handle_message(message),
                ConnectionEvent::Connected => log::info!("{}: peer connected", self.name),
                ConnectionEvent::Disconnected { reason } => {
                    log::warn!("{}: disconnected ({})", self.name, reason.as_str())
                }
                ConnectionEvent::ProtocolError(message) => {
                    log::warn!("{}: protocol error: {}", self.name, message)
                }
                ConnectionEvent::Latency { rtt_ms } => {
                    log::debug!("{}: rtt {:.1} ms", self.name, rtt_ms)
                }
                _ => {}
            }
        }

        let outbox = self.session.drain_outbox();
        moved += outbox.len();
        for message in outbox {
            let kind = message.kind();
            if let Err(e) = self.conn.send(message, now) {
                log::warn!("{}: failed to send {}: {}", self.name, kind, e);
            }
        }
        moved
    }
}

struct PendingShot {
    shot_id: u32,
    shooter: Player,
    steps: Option<u32>,
    resynced: bool,
}

pub struct Match {
    options: MatchOptions,
    host: Peer,
    guest: Peer,
    fired: u32,
    pending: Option<PendingShot>,
    records: Vec<ShotRecord>,
    resyncs: u32,
    verdict: Option<String>,
}

impl Match {
    pub fn new(options: MatchOptions) -> Self {
        let net = LoopbackNetwork::new();
        let host = Peer::new("host", Session::host(), &net, &options.room);
        let guest = Peer::new("guest", Session::guest(), &net, &options.room);
        Self {
            options,
            host,
            guest,
            fired: 0,
            pending: None,
            records: Vec::new(),
            resyncs: 0,
            verdict: None,
        }
    }

    pub async fn run(&mut self) -> Result<MatchReport> {
        let frame_dt = self.options.frame.as_secs_f32();
        let mut interval = tokio::time::interval(self.options.frame);

        let now = Instant::now();
        self.host.conn.connect(now);
        self.guest.conn.connect(now);

        let mut finished = false;
        for _ in 0..self.options.max_frames {
            if self.options.fast {
                tokio::task::yield_now().await;
            } else {
                interval.tick().await;
            }
            let now = Instant::now();

            self.host.conn.poll(now);
            self.guest.conn.poll(now);
            self.route(now);
            self.host.session.update(frame_dt);
            self.guest.session.update(frame_dt);
            self.route(now);
            self.collect_events();

            if !self.is_idle() {
                continue;
            }
            self.finish_pending();
            if self.is_done() {
                finished = true;
                break;
            }
            self.take_turn()?;
            self.route(now);
        }

        if !finished {
            bail!(
                "match did not finish within {} frames",
                self.options.max_frames
            );
        }

        let rtt_ms = self.host.conn.stats().rtt_ms;
        self.host.conn.leave();
        self.guest.conn.leave();
        settle(&mut self.host.conn, &mut self.guest.conn, Instant::now());

        Ok(MatchReport {
            shots: std::mem::take(&mut self.records),
            resyncs: self.resyncs,
            final_hash: self.host.session.snapshot_hash(),
            rtt_ms,
            verdict: self.verdict.take(),
            snapshot: self.host.session.snapshot(),
        })
    }

    fn route(&mut self, now: Instant) {
        for _ in 0..MAX_ROUTE_ROUNDS {
            settle(&mut self.host.conn, &mut self.guest.conn, now);
            let moved = self.host.dispatch(now) + self.guest.dispatch(now);
            if moved == 0 {
                return;
            }
        }
    }

    fn collect_events(&mut self) {
        for peer in [&mut self.host, &mut self.guest] {
            for event in peer.session.drain_events() {
                match event {
                    SessionEvent::ShotSettled {
                        shot_id,
                        shooter,
                        steps,
                        forced,
                        ..
                    } => {
                        if forced {
                            log::warn!("{}: shot {} hit the step cap", peer.name, shot_id);
                        }
                        if let Some(pending) = self.pending.as_mut()
                            && pending.shot_id == shot_id
                            && shooter == peer.session.local_player()
                        {
                            pending.steps = Some(steps);
                        }
                    }
                    SessionEvent::Resynced { shot_id, hash } => {
                        log::info!("{}: resynced after shot {} ({})", peer.name, shot_id, hash);
                        self.resyncs += 1;
                        if let Some(pending) = self.pending.as_mut() {
                            pending.resynced = true;
                        }
                    }
                    SessionEvent::Desync { shot_id, cause } => {
                        log::warn!("{}: desync after shot {}: {:?}", peer.name, shot_id, cause);
                    }
                    SessionEvent::GameOver(game_over) => {
                        self.verdict = Some(format!(
                            "{} wins: {}",
                            game_over.winner,
                            game_over.reason.as_str()
                        ));
                    }
                    SessionEvent::StateRejected { kind, reason } => {
                        log::warn!("{}: refused {} from peer: {}", peer.name, kind, reason);
                    }
                    SessionEvent::TurnText(text) => log::debug!("{}: {}", peer.name, text),
                    _ => {}
                }
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.host.conn.is_connected()
            && self.guest.conn.is_connected()
            && !self.host.session.is_shot_in_progress()
            && !self.guest.session.is_shot_in_progress()
    }

    fn is_done(&self) -> bool {
        self.fired >= self.options.shots || self.host.session.game_over().is_some()
    }

    fn finish_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.records.push(ShotRecord {
            shot_id: pending.shot_id,
            shooter: pending.shooter,
            steps: pending.steps.unwrap_or_default(),
            host_hash: self.host.session.snapshot_hash(),
            guest_hash: self.guest.session.snapshot_hash(),
            resynced: pending.resynced,
        });
    }

    fn take_turn(&mut self) -> Result<()> {
        let index = self.fired;
        if self.options.perturb_at == Some(index + 1) {
            perturb(&mut self.guest.session);
        }

        let shooter = if self.host.session.is_my_turn() {
            &mut self.host
        } else {
            &mut self.guest
        };
        if shooter.session.turn().ball_in_hand {
            place_cue_ball(&mut shooter.session)?;
        }

        let angle = if index == 0 {
            0.0
        } else {
            (index as f32 * GOLDEN_ANGLE) % TAU
        };
        let input = ShotInput::new(angle, self.options.power);
        match shooter.session.shoot(input) {
            Ok(shot_id) => {
                log::info!(
                    "{} shoots #{} angle {:.3} power {:.2}",
                    shooter.name,
                    shot_id,
                    angle,
                    self.options.power
                );
                self.pending = Some(PendingShot {
                    shot_id,
                    shooter: shooter.session.local_player(),
                    steps: None,
                    resynced: false,
                });
                self.fired += 1;
            }
            Err(e) => log::debug!("{} cannot shoot yet: {}", shooter.name, e),
        }
        Ok(())
    }
}

fn perturb(session: &mut Session) {
    let table = session.simulator().table();
    let Some(mut state) = table
        .active_balls()
        .find(|id| !id.is_cue())
        .and_then(|id| table.ball_state(id))
    else {
        return;
    };
    log::warn!("Perturbing ball {} on the guest", state.id());
    state.position[2] += 0.03;
    session.simulator_mut().table_mut().set_ball_state(&state);
}

/// Tries spots along the head string, moving outward from the head spot.
fn place_cue_ball(session: &mut Session) -> Result<()> {
    let config = session.simulator().table().config().clone();
    let head = config.head_spot();
    let step = config.ball_radius * 3.0;
    for i in 0..32 {
        let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
        let spot = head + Vec2::new(0.0, ((i + 1) / 2) as f32 * step * sign);
        if session.place_cue_ball(spot).is_ok() {
            log::info!("Cue ball placed at ({:.3}, {:.3})", spot.x, spot.y);
            return Ok(());
        }
    }
    bail!("no free spot for the cue ball on the head string")
}
