use std::collections::VecDeque;

use glam::Vec2;

use crate::net::{PeerMessage, ShotSummary};
use crate::rules::{GameOver, Player, TurnState};
use crate::simulation::{FixedTimestep, ShotInput, ShotOutcome, ShotSimulator, SimConfig, StepResult};
use crate::snapshot::{BallState, GameStateSnapshot, HashCheck, Reconciler, StateHash};
use crate::table::{CUE_BALL, TableConfig};

use super::{DesyncCause, SessionError, SessionEvent, ShotRejected, StateRejected};

/// One peer's view of a match: its own simulation, the turn rules, and the
/// hash-verified lockstep protocol. Transport-agnostic; outgoing messages are
/// queued and drained by the caller.
///
/// The host (player one) is the authority that provides full state when the
/// peers diverge.
pub struct Session {
    local: Player,
    simulator: ShotSimulator,
    turn: TurnState,
    timestep: FixedTimestep,
    last_shot_id: u32,
    local_shot: Option<u32>,
    game_over: Option<GameOver>,
    reconciler: Reconciler,
    needs_resync: bool,
    awaiting_sync: bool,
    outbox: VecDeque<PeerMessage>,
    events: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(local: Player, table: TableConfig, sim: SimConfig) -> Self {
        let timestep = FixedTimestep::new(sim.tick_rate);
        let mut session = Self {
            local,
            simulator: ShotSimulator::new(table, sim),
            turn: TurnState::new(),
            timestep,
            last_shot_id: 0,
            local_shot: None,
            game_over: None,
            reconciler: Reconciler::new(),
            needs_resync: false,
            awaiting_sync: false,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
        };
        session.push_turn_text();
        session
    }

    pub fn host() -> Self {
        Self::new(Player::One, TableConfig::default(), SimConfig::default())
    }

    pub fn guest() -> Self {
        Self::new(Player::Two, TableConfig::default(), SimConfig::default())
    }

    pub fn local_player(&self) -> Player {
        self.local
    }

    pub fn is_host(&self) -> bool {
        self.local == Player::One
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn game_over(&self) -> Option<GameOver> {
        self.game_over
    }

    pub fn is_my_turn(&self) -> bool {
        self.turn.current == self.local
    }

    pub fn is_shot_in_progress(&self) -> bool {
        self.local_shot.is_some()
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn last_shot_id(&self) -> u32 {
        self.last_shot_id
    }

    pub fn mismatch_count(&self) -> u32 {
        self.reconciler.mismatch_count()
    }

    pub fn simulator(&self) -> &ShotSimulator {
        &self.simulator
    }

    pub fn simulator_mut(&mut self) -> &mut ShotSimulator {
        &mut self.simulator
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        self.simulator.snapshot()
    }

    pub fn snapshot_hash(&self) -> StateHash {
        self.simulator.snapshot().hash()
    }

    pub fn drain_outbox(&mut self) -> Vec<PeerMessage> {
        self.outbox.drain(..).collect()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// The rack ends when the eight ball goes down, verdict or not.
    fn is_rack_over(&self) -> bool {
        self.game_over.is_some() || self.turn.pocketed.eight
    }

    fn check_can_act(&self) -> Result<(), ShotRejected> {
        if self.is_rack_over() {
            return Err(ShotRejected::GameOver);
        }
        if !self.is_my_turn() {
            return Err(ShotRejected::NotYourTurn);
        }
        if self.local_shot.is_some() || self.simulator.is_in_progress() {
            return Err(ShotRejected::BallsMoving);
        }
        if self.awaiting_sync {
            return Err(ShotRejected::AwaitingSync);
        }
        Ok(())
    }

    /// Starts a local shot and queues it for the peer. The shot is animated by
    /// [`Session::update`].
    pub fn shoot(&mut self, input: ShotInput) -> Result<u32, ShotRejected> {
        self.check_can_act()?;
        if self.turn.ball_in_hand {
            return Err(ShotRejected::BallInHand);
        }
        let input = input.clamped();
        self.simulator
            .begin(&input)
            .map_err(|_| ShotRejected::BallsMoving)?;

        self.last_shot_id += 1;
        let shot_id = self.last_shot_id;
        self.local_shot = Some(shot_id);
        self.timestep.reset();
        self.outbox.push_back(PeerMessage::Shot { shot_id, input });
        self.events.push_back(SessionEvent::ShotStarted {
            shot_id,
            shooter: self.local,
        });
        Ok(shot_id)
    }

    /// Resolves ball-in-hand by putting the cue ball at `spot` (table plane).
    pub fn place_cue_ball(&mut self, spot: Vec2) -> Result<(), SessionError> {
        self.check_can_act()?;
        if !self.turn.ball_in_hand {
            return Err(SessionError::NoBallInHand);
        }
        if !self.simulator.table_mut().place_cue_ball(spot) {
            return Err(SessionError::InvalidPlacement);
        }
        self.turn.ball_in_hand = false;

        if let Some(cue) = self.simulator.table().ball_state(CUE_BALL) {
            self.outbox
                .push_back(PeerMessage::StateDelta { balls: vec![cue] });
        }
        self.events
            .push_back(SessionEvent::CueBallPlaced { player: self.local });
        self.push_turn_text();
        Ok(())
    }

    /// Advances the local shot by wall-clock `delta` seconds. Returns the number
    /// of fixed steps run.
    pub fn update(&mut self, delta: f32) -> u32 {
        let Some(shot_id) = self.local_shot else {
            return 0;
        };
        self.timestep.accumulate(delta);

        let mut ticks_run = 0;
        while self.timestep.consume_tick() {
            ticks_run += 1;
            match self.simulator.step() {
                StepResult::Running { .. } => {}
                StepResult::Settled(outcome) => {
                    self.local_shot = None;
                    self.timestep.reset();
                    self.finish_shot(shot_id, self.local, outcome);
                    break;
                }
                StepResult::Idle => {
                    log::warn!("Shot {} vanished mid-flight", shot_id);
                    self.local_shot = None;
                    break;
                }
            }
        }
        ticks_run
    }

    /// Drops a local shot that is still rolling, e.g. on teardown.
    pub fn abandon_shot(&mut self) {
        self.simulator.abandon();
        self.local_shot = None;
    }

    pub fn handle_message(&mut self, message: PeerMessage) {
        match message {
            PeerMessage::Shot { shot_id, input } => self.on_remote_shot(shot_id, input),
            PeerMessage::StateFull {
                shot_id,
                snapshot,
                turn,
                game_over,
            } => self.apply_full_state(shot_id, &snapshot, turn, game_over),
            PeerMessage::StateDelta { balls } => self.apply_delta(&balls),
            PeerMessage::StateHash { shot_id, hash } => {
                let check = self.reconciler.record_remote(shot_id, hash);
                self.on_hash_check(check);
            }
            PeerMessage::SyncRequest { shot_id } => self.on_sync_request(shot_id),
            PeerMessage::TurnChange { shot_id, current } => self.verify_turn(shot_id, current),
            PeerMessage::GameEvent(summary) => {
                if let (Some(remote), Some(local)) = (summary.winner, self.game_over)
                    && remote != local.winner
                {
                    log::warn!(
                        "Peer reports {} as winner of shot {}, local verdict is {}",
                        remote,
                        summary.shot_id,
                        local.winner
                    );
                }
                self.events.push_back(SessionEvent::PeerReport(summary));
            }
            PeerMessage::Ping { .. } | PeerMessage::Pong { .. } => {}
        }
    }

    fn on_remote_shot(&mut self, shot_id: u32, input: ShotInput) {
        let remote = self.local.opponent();
        let rejection = if self.local_shot.is_some() || self.simulator.is_in_progress() {
            Some(ShotRejected::BallsMoving)
        } else if self.is_rack_over() {
            Some(ShotRejected::GameOver)
        } else if self.turn.current != remote {
            Some(ShotRejected::NotYourTurn)
        } else {
            None
        };

        if let Some(reason) = rejection {
            log::warn!("Rejected remote shot {}: {}", shot_id, reason);
            self.events
                .push_back(SessionEvent::RemoteShotRejected { shot_id, reason });
            self.last_shot_id = self.last_shot_id.max(shot_id);
            if reason != ShotRejected::GameOver {
                self.desync(shot_id, DesyncCause::RejectedShot);
            }
            return;
        }

        if shot_id <= self.last_shot_id {
            log::warn!("Ignoring replayed shot {}", shot_id);
            return;
        }
        self.last_shot_id = shot_id;
        // The peer already placed the cue ball if it had ball in hand.
        self.turn.ball_in_hand = false;

        self.events.push_back(SessionEvent::ShotStarted {
            shot_id,
            shooter: remote,
        });
        let outcome = match self.simulator.simulate(&input) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Remote shot {} could not start: {}", shot_id, e);
                return;
            }
        };
        self.finish_shot(shot_id, remote, outcome);
    }

    fn finish_shot(&mut self, shot_id: u32, shooter: Player, outcome: ShotOutcome) {
        let ShotOutcome {
            snapshot: _,
            hash,
            pocket_events,
            tally,
            steps,
            forced,
        } = outcome;
        log::info!(
            "Shot {} by {} settled after {} steps, hash {}",
            shot_id,
            shooter,
            steps,
            hash
        );

        for event in pocket_events {
            self.events.push_back(SessionEvent::Pocketed(event));
        }
        self.events.push_back(SessionEvent::ShotSettled {
            shot_id,
            shooter,
            hash,
            steps,
            forced,
        });

        let resolution = self.turn.resolve(&tally);
        self.turn = resolution.next;
        if let Some((player, group)) = resolution.assigned {
            self.events
                .push_back(SessionEvent::GroupAssigned { player, group });
        }
        if let Some(game_over) = resolution.game_over {
            log::info!(
                "Game over: {} wins ({})",
                game_over.winner,
                game_over.reason.as_str()
            );
            self.game_over = Some(game_over);
            self.events.push_back(SessionEvent::GameOver(game_over));
        }
        self.push_turn_text();

        if shooter == self.local {
            self.outbox
                .push_back(PeerMessage::StateHash { shot_id, hash });
            self.outbox.push_back(PeerMessage::TurnChange {
                shot_id,
                current: self.turn.current,
            });
            self.outbox.push_back(PeerMessage::GameEvent(ShotSummary {
                shot_id,
                shooter,
                tally,
                steps,
                winner: self.game_over.map(|g| g.winner),
            }));
        }

        let check = self.reconciler.record_local(shot_id, hash);
        self.on_hash_check(check);

        if self.needs_resync {
            self.request_resync(shot_id);
        }
    }

    fn on_hash_check(&mut self, check: HashCheck) {
        match check {
            HashCheck::Waiting => {}
            HashCheck::Match { shot_id } => log::debug!("Shot {} hashes agree", shot_id),
            HashCheck::Mismatch {
                shot_id,
                local,
                remote,
            } => {
                log::warn!(
                    "Hash mismatch after shot {}: local {} remote {}",
                    shot_id,
                    local,
                    remote
                );
                self.desync(shot_id, DesyncCause::Hash { local, remote });
            }
            HashCheck::Stale => log::debug!("Ignoring stale peer hash"),
        }
    }

    fn verify_turn(&mut self, shot_id: u32, current: Player) {
        if shot_id != self.last_shot_id || self.local_shot.is_some() {
            log::debug!("Ignoring turn change for shot {}", shot_id);
            return;
        }
        if current != self.turn.current {
            log::warn!(
                "Turn disagreement after shot {}: local {} remote {}",
                shot_id,
                self.turn.current,
                current
            );
            self.desync(
                shot_id,
                DesyncCause::Turn {
                    local: self.turn.current,
                    remote: current,
                },
            );
        }
    }

    fn desync(&mut self, shot_id: u32, cause: DesyncCause) {
        self.events
            .push_back(SessionEvent::Desync { shot_id, cause });
        self.needs_resync = true;
        if self.local_shot.is_none() {
            self.request_resync(shot_id);
        }
    }

    /// Host pushes its state; guest asks for it.
    fn request_resync(&mut self, shot_id: u32) {
        if self.is_host() {
            self.push_full_state();
        } else if !self.awaiting_sync {
            log::info!("Requesting authoritative state after shot {}", shot_id);
            self.awaiting_sync = true;
            self.outbox.push_back(PeerMessage::SyncRequest { shot_id });
        }
        self.needs_resync = false;
    }

    fn on_sync_request(&mut self, shot_id: u32) {
        if !self.is_host() {
            log::warn!("Ignoring sync request for shot {} on guest", shot_id);
            return;
        }
        if self.local_shot.is_some() {
            self.needs_resync = true;
            return;
        }
        self.push_full_state();
    }

    fn push_full_state(&mut self) {
        let snapshot = self.simulator.snapshot();
        // Rebuild locally too so both worlds start the next shot identically.
        self.simulator.restore(&snapshot);
        self.reconciler.reset();
        self.needs_resync = false;
        log::info!(
            "Sending full state for shot {} (hash {})",
            self.last_shot_id,
            snapshot.hash()
        );
        self.outbox.push_back(PeerMessage::StateFull {
            shot_id: self.last_shot_id,
            snapshot,
            turn: self.turn.clone(),
            game_over: self.game_over,
        });
    }

    fn check_full_state(
        &self,
        snapshot: &GameStateSnapshot,
        turn: &TurnState,
        game_over: Option<GameOver>,
    ) -> Result<(), StateRejected> {
        if self.is_host() {
            return Err(StateRejected::NotAuthority);
        }
        snapshot.validate()?;
        turn.pocketed.validate()?;
        let eight_down = turn.pocketed.eight || snapshot.pocketed.eight;
        match (eight_down, game_over) {
            (true, None) => Err(StateRejected::MissingVerdict),
            (false, Some(_)) => Err(StateRejected::UnexpectedVerdict),
            _ => Ok(()),
        }
    }

    fn apply_full_state(
        &mut self,
        shot_id: u32,
        snapshot: &GameStateSnapshot,
        turn: TurnState,
        game_over: Option<GameOver>,
    ) {
        if let Err(reason) = self.check_full_state(snapshot, &turn, game_over) {
            self.reject_state("state-full", reason);
            return;
        }
        if self.local_shot.take().is_some() {
            log::warn!("Full state arrived mid-shot, dropping local shot");
        }
        self.simulator.restore(snapshot);
        self.turn = turn;
        self.last_shot_id = self.last_shot_id.max(shot_id);
        self.reconciler.reset();
        self.needs_resync = false;
        self.awaiting_sync = false;

        let hash = self.snapshot_hash();
        log::info!("Applied full state for shot {} (hash {})", shot_id, hash);
        self.events
            .push_back(SessionEvent::Resynced { shot_id, hash });
        if let Some(verdict) = game_over
            && self.game_over != game_over
        {
            log::info!(
                "Game over after resync: {} wins ({})",
                verdict.winner,
                verdict.reason.as_str()
            );
            self.events.push_back(SessionEvent::GameOver(verdict));
        }
        self.game_over = game_over;
        self.push_turn_text();
    }

    /// Only the cue ball placement of a peer holding ball in hand travels as a delta.
    fn check_delta(&self, balls: &[BallState]) -> Result<Vec2, StateRejected> {
        if self.local_shot.is_some() || self.simulator.is_in_progress() {
            return Err(StateRejected::BallsMoving);
        }
        let [cue] = balls else {
            return Err(StateRejected::NotCuePlacement);
        };
        if !cue.id().is_cue() {
            return Err(StateRejected::NotCuePlacement);
        }
        if self.is_rack_over() || !self.turn.ball_in_hand || self.turn.current == self.local {
            return Err(StateRejected::NoBallInHand);
        }
        let spot = Vec2::new(cue.position[0], cue.position[2]);
        if !cue.is_finite() || !self.simulator.table().is_spot_free(spot) {
            return Err(StateRejected::InvalidPlacement);
        }
        Ok(spot)
    }

    fn apply_delta(&mut self, balls: &[BallState]) {
        let placed = self
            .check_delta(balls)
            .and_then(|spot| {
                self.simulator
                    .table_mut()
                    .place_cue_ball(spot)
                    .then_some(())
                    .ok_or(StateRejected::InvalidPlacement)
            });
        if let Err(reason) = placed {
            self.reject_state("state-delta", reason);
            self.desync(self.last_shot_id, DesyncCause::RejectedDelta);
            return;
        }

        let remote = self.local.opponent();
        self.turn.ball_in_hand = false;
        self.events
            .push_back(SessionEvent::CueBallPlaced { player: remote });
        self.push_turn_text();
    }

    fn reject_state(&mut self, kind: &'static str, reason: StateRejected) {
        log::warn!("Rejected {} from peer: {}", kind, reason);
        self.events
            .push_back(SessionEvent::StateRejected { kind, reason });
    }

    fn push_turn_text(&mut self) {
        let text = match self.game_over {
            Some(game_over) if game_over.winner == self.local => {
                format!("You win - {}", game_over.reason.as_str())
            }
            Some(game_over) => format!("You lose - {}", game_over.reason.as_str()),
            None => self.turn.turn_text(self.local),
        };
        self.events.push_back(SessionEvent::TurnText(text));
    }
}
