// One match between two players
//
// Owns the match state, the table and both controllers. Networked sessions
// also hold the peer link: inbound chat goes through `on_chat`, and everything
// the peer must hear is queued in the outbox for the game loop to send.

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::controller::{Controller, PlayerAction};
use crate::game::events::{EventBus, GameEvent};
use crate::game::physics::BodyFactory;
use crate::game::puck::{Puck, PuckColor, PuckState};
use crate::game::scoring::RoundScore;
use crate::game::state::{Match, MatchError, MatchState, ScoringAuthority, TurnOutcome};
use crate::game::table::{PuckSnapshot, RestOutcome, SyncTarget, Table};
use crate::network::chat::ChatMessage;
use crate::network::handshake::Role;
use crate::network::protocol::{ChatCommand, ProtocolError};
use crate::network::sync::{validate, Freshness, SyncLimits};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{0} already has a controller")]
    SeatTaken(PuckColor),

    #[error("only the host can {0}")]
    NotHost(&'static str),

    #[error("{0} from the peer outside its turn")]
    NotPeersTurn(&'static str),

    #[error("match abandoned")]
    Abandoned,
}

/// The paired peer of a networked session
#[derive(Debug, Clone)]
pub struct PeerLink {
    pub role: Role,
    pub peer: String,
    login_timestamp_ms: u64,
    heartbeat_seq: u32,
    since_heartbeat: f32,
    since_peer: f32,
    since_sync: f32,
}

impl PeerLink {
    pub fn new(role: Role, peer: &str, login_timestamp_ms: u64) -> Self {
        Self {
            role,
            peer: peer.to_string(),
            login_timestamp_ms,
            heartbeat_seq: 0,
            since_heartbeat: 0.0,
            since_peer: 0.0,
            since_sync: 0.0,
        }
    }
}

pub struct Session {
    config: Config,
    game: Match,
    table: Table,
    controllers: [Option<Box<dyn Controller>>; 2],
    bus: EventBus,
    link: Option<PeerLink>,
    limits: SyncLimits,
    outbox: Vec<ChatCommand>,
    abandoned: bool,
}

impl Session {
    /// Both players on this machine; scores are computed here
    pub fn local(config: &Config, factory: Box<dyn BodyFactory>) -> Self {
        Self::build(config, factory, None)
    }

    pub fn networked(config: &Config, factory: Box<dyn BodyFactory>, link: PeerLink) -> Self {
        Self::build(config, factory, Some(link))
    }

    fn build(config: &Config, factory: Box<dyn BodyFactory>, link: Option<PeerLink>) -> Self {
        let bus = EventBus::new();
        let authority = match link.as_ref().map(|l| l.role) {
            Some(Role::Invitee) => ScoringAuthority::Remote,
            _ => ScoringAuthority::Local,
        };

        let mut table = Table::new(config, factory, bus.clone());
        table.set_kills_on_rest(authority == ScoringAuthority::Local);

        Self {
            config: config.clone(),
            game: Match::new(&config.rules, authority, bus.clone()),
            table,
            controllers: [None, None],
            bus,
            link,
            limits: SyncLimits::from_physics(&config.physics),
            outbox: Vec::new(),
            abandoned: false,
        }
    }

    /// Put a controller in charge of `color`; the first seated color is player 1
    pub fn seat(&mut self, color: PuckColor, controller: Box<dyn Controller>) -> Result<(), SessionError> {
        if self.controllers[color.index()].is_some() {
            return Err(SessionError::SeatTaken(color));
        }
        self.game.register_player(color)?;
        info!("{} plays {}", controller.name(), color);
        self.controllers[color.index()] = Some(controller);
        Ok(())
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn link(&self) -> Option<&PeerLink> {
        self.link.as_ref()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Commands queued for the peer since the last call
    pub fn drain_outbox(&mut self) -> Vec<ChatCommand> {
        std::mem::take(&mut self.outbox)
    }

    fn is_authoritative(&self) -> bool {
        self.link.as_ref().map_or(true, |l| l.role == Role::Host)
    }

    fn is_host(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.role == Role::Host)
    }

    fn send(&mut self, command: ChatCommand) {
        if self.link.is_some() {
            debug!("Queueing {}", command);
            self.outbox.push(command);
        }
    }

    /// Hand out the first throw of the match
    pub fn start(&mut self) -> Result<(), SessionError> {
        if !self.is_authoritative() {
            return Err(SessionError::NotHost("start the match"));
        }
        self.continue_round()
    }

    /// Start the next round once the previous one has been scored
    pub fn continue_round(&mut self) -> Result<(), SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        if !self.is_authoritative() {
            return Err(SessionError::NotHost("start a round"));
        }
        let turn = self.game.turn_counter();
        self.advance(turn, self.is_host())
    }

    /// Replace the table with the bowling setup
    pub fn start_bowling(&mut self) -> Result<usize, SessionError> {
        if !self.is_authoritative() {
            return Err(SessionError::NotHost("set up bowling"));
        }
        let pins = self.table.setup_bowling();
        self.send(ChatCommand::Bowl);
        Ok(pins)
    }

    /// Advance past `turn`, telling the peer first when `announce` is set
    fn advance(&mut self, turn: u32, announce: bool) -> Result<(), SessionError> {
        if announce {
            self.send(ChatCommand::Turn { turn });
        }
        match self.game.request_next_turn(turn, &mut self.table)? {
            Some(outcome) => self.on_outcome(outcome),
            None => debug!("Turn {} already advanced", turn),
        }
        Ok(())
    }

    fn on_outcome(&mut self, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::NewThrow { color, turn_id } => {
                self.table.spawn_puck(color, turn_id);
                if let Some(link) = self.link.as_mut() {
                    link.since_sync = 0.0;
                }
                match self.controllers[color.index()].as_mut() {
                    Some(controller) => controller.handle_new_throw(turn_id),
                    None => error!("No controller for {}", color),
                }
            }
            TurnOutcome::RoundScored { score, state } => {
                debug!("Round scored {:?}, now {:?}", score, state);
                if self.is_host() {
                    let turn = self.game.turn_counter();
                    let pucks = self.table.snapshot(SyncTarget::All);
                    self.send(ChatCommand::Sync { turn, pucks });
                    self.send(ChatCommand::ScoreSync { score });
                }
            }
            TurnOutcome::AwaitingPeerScore => debug!("Waiting for the host's round score"),
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.abandoned {
            return;
        }

        self.tick_link(dt);
        if self.abandoned {
            return;
        }

        if let Some(color) = self.game.active_color() {
            loop {
                let action = match self.controllers[color.index()].as_mut() {
                    Some(controller) => controller.next_action(dt),
                    None => None,
                };
                let Some(action) = action else {
                    break;
                };
                self.apply_action(color, action);
                if self.game.active_color() != Some(color) {
                    break;
                }
            }
        }

        for outcome in self.table.tick(dt) {
            self.on_rest(outcome);
        }

        if self.is_host() && self.table.any_moving() {
            let interval = self.config.network.sync_interval_secs;
            let due = self.link.as_mut().is_some_and(|link| {
                link.since_sync += dt;
                link.since_sync >= interval
            });
            if due {
                if let Some(link) = self.link.as_mut() {
                    link.since_sync = 0.0;
                }
                let turn = self.game.turn_counter();
                let pucks = self.table.snapshot(SyncTarget::All);
                self.send(ChatCommand::Sync { turn, pucks });
            }
        }
    }

    fn tick_link(&mut self, dt: f32) {
        let heartbeat_secs = self.config.network.heartbeat_interval_ms as f32 / 1000.0;
        let timeout_secs = self.config.network.peer_timeout_secs as f32;

        let Some(link) = self.link.as_mut() else {
            return;
        };

        link.since_peer += dt;
        if link.since_peer > timeout_secs {
            let reason = format!("no word from {} for {}s", link.peer, timeout_secs);
            self.abandon(&reason);
            return;
        }

        link.since_heartbeat += dt;
        if link.since_heartbeat >= heartbeat_secs {
            link.since_heartbeat = 0.0;
            link.heartbeat_seq = link.heartbeat_seq.wrapping_add(1);
            let seq = link.heartbeat_seq;
            self.send(ChatCommand::Heartbeat { seq });
        }
    }

    fn apply_action(&mut self, color: PuckColor, action: PlayerAction) {
        let turn = self.game.turn_counter();
        let broadcasts = self.controllers[color.index()]
            .as_ref()
            .is_some_and(|c| c.broadcasts());

        let Some(puck) = self.table.puck_mut(turn).filter(|p| p.color == color) else {
            error!("No active puck for {} on turn {}", color, turn);
            return;
        };

        let outgoing = match perform(puck, action, &self.limits) {
            Some(PlayerAction::Move(position)) => ChatCommand::Move { turn, position },
            Some(PlayerAction::Throw(force)) => {
                debug!("{} throws {:?} on turn {}", color, force, turn);
                ChatCommand::Throw { turn, force }
            }
            Some(PlayerAction::Spin { angle, velocity }) => ChatCommand::Spin { turn, angle, velocity },
            Some(PlayerAction::RequestNewThrow) => {
                if let Err(e) = self.advance(turn, broadcasts) {
                    error!("Cannot move on to a new throw: {}", e);
                }
                return;
            }
            None => return,
        };

        if broadcasts {
            self.send(outgoing);
        }
    }

    fn on_rest(&mut self, outcome: RestOutcome) {
        let rest = outcome.rest;
        if let Some(controller) = self.controllers[rest.color.index()].as_mut() {
            controller.on_puck_resting(&rest);
        }

        if rest.turn_id != self.game.turn_counter() || self.game.active_color().is_none() {
            debug!("Rest of puck {} needs no turn change", rest.turn_id);
            return;
        }
        if !self.is_authoritative() {
            return;
        }

        if self.is_host() {
            // Rest position even for a destroyed puck, so the invitee removes it too
            self.send(ChatCommand::Sync {
                turn: rest.turn_id,
                pucks: vec![PuckSnapshot {
                    turn_id: rest.turn_id,
                    position: rest.position,
                }],
            });
        }
        if let Err(e) = self.advance(rest.turn_id, self.is_host()) {
            error!("Turn did not advance after rest: {}", e);
        }
    }

    /// Handle one inbound chat message from the transport
    pub fn on_chat(&mut self, message: &ChatMessage) -> Result<(), SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        if message.from != link.peer {
            warn!("Dropping message from {}, playing against {}", message.from, link.peer);
            return Ok(());
        }
        if message.timestamp_ms < link.login_timestamp_ms {
            debug!("Dropping message sent before login: {}", message.body);
            return Ok(());
        }
        link.since_peer = 0.0;

        let command = ChatCommand::parse(&message.body).map_err(|e| {
            warn!("Protocol violation from {}: {}", message.from, e);
            e
        })?;
        self.on_command(command)
    }

    fn on_command(&mut self, command: ChatCommand) -> Result<(), SessionError> {
        if command.is_handshake() {
            debug!("Late handshake message {} ignored", command);
            return Ok(());
        }
        if let ChatCommand::Heartbeat { seq } = command {
            debug!("Heartbeat {} from peer", seq);
            return Ok(());
        }

        if self.is_host() && matches!(command, ChatCommand::Sync { .. } | ChatCommand::ScoreSync { .. } | ChatCommand::Bowl) {
            let error = ProtocolError::NotAuthoritative(command.name());
            warn!("Protocol violation: {}", error);
            return Err(error.into());
        }

        let counter = self.game.turn_counter();
        if validate(&command, counter, &self.limits)? == Freshness::Stale {
            return Ok(());
        }

        match command {
            ChatCommand::Turn { turn } => {
                if self.game.state() == MatchState::WaitingForPeerSync {
                    warn!("Turn {} arrived before the round score", turn);
                    return Err(MatchError::AwaitingPeerScore.into());
                }
                self.advance(turn, false)
            }
            ChatCommand::Move { position, .. } => self.deliver_remote("move", PlayerAction::Move(position)),
            ChatCommand::Throw { force, .. } => self.deliver_remote("throw", PlayerAction::Throw(force)),
            ChatCommand::Spin { angle, velocity, .. } => {
                self.deliver_remote("spin", PlayerAction::Spin { angle, velocity })
            }
            ChatCommand::Sync { pucks, .. } => {
                let applied = self.table.apply_sync(&pucks);
                debug!("Synced {} of {} pucks", applied, pucks.len());
                Ok(())
            }
            ChatCommand::ScoreSync { score } => self.apply_score(score),
            ChatCommand::Bowl => {
                self.table.setup_bowling();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn deliver_remote(&mut self, name: &'static str, action: PlayerAction) -> Result<(), SessionError> {
        let accepted = self
            .game
            .active_color()
            .and_then(|color| self.controllers[color.index()].as_mut())
            .is_some_and(|controller| controller.accept_remote(action));

        if accepted {
            Ok(())
        } else {
            warn!("Protocol violation: {} outside the peer's turn", name);
            Err(SessionError::NotPeersTurn(name))
        }
    }

    fn apply_score(&mut self, score: RoundScore) -> Result<(), SessionError> {
        let max = self.table.max_round_points(self.config.rules.pucks_per_player);
        if score.points > max {
            let error = ProtocolError::ScoreOutOfRange {
                command: "score-sync",
                points: score.points,
                max,
            };
            warn!("Protocol violation: {}", error);
            return Err(error.into());
        }
        self.game.apply_peer_score(score)?;
        Ok(())
    }

    /// Presence change reported by the transport
    pub fn on_presence(&mut self, user: &str, online: bool) {
        let is_peer = self.link.as_ref().is_some_and(|l| l.peer == user);
        if is_peer && !online {
            self.abandon(&format!("{} went offline", user));
        }
    }

    /// Our own transport connection is gone
    pub fn on_transport_lost(&mut self) {
        if self.link.is_some() {
            self.abandon("lost connection to the chat service");
        }
    }

    fn abandon(&mut self, reason: &str) {
        if self.abandoned {
            return;
        }
        warn!("Match abandoned: {}", reason);
        self.abandoned = true;
        self.bus.publish(GameEvent::MatchAbandoned {
            reason: reason.to_string(),
        });
    }
}

/// Apply `action` to the active puck.
///
/// Returns the action as it took effect (forces clamped to the limits), or
/// `None` when it does not fit the puck's lifecycle. A new throw is only
/// granted once the puck has left the start line.
pub fn perform(puck: &mut Puck, action: PlayerAction, limits: &SyncLimits) -> Option<PlayerAction> {
    match action {
        PlayerAction::Move(position) => {
            if puck.state() != PuckState::Setup {
                debug!("Ignoring move of a released puck");
                return None;
            }
            if !position.is_finite() || position.abs().max_element() > limits.max_position {
                warn!("Refusing to move puck to {}", position);
                return None;
            }
            puck.move_to(position);
            Some(action)
        }
        PlayerAction::Throw(force) => {
            if puck.state() != PuckState::Setup {
                debug!("Puck of turn {} already thrown", puck.turn_id);
                return None;
            }
            if !force.is_finite() {
                warn!("Refusing throw with force {}", force);
                return None;
            }
            let force = force.clamp_length_max(limits.throw_force_max);
            puck.apply_throw(force);
            Some(PlayerAction::Throw(force))
        }
        PlayerAction::Spin { angle, velocity } => {
            if !angle.is_finite() || !velocity.is_finite() {
                return None;
            }
            let velocity = velocity.clamp(-limits.throw_force_max, limits.throw_force_max);
            if !puck.apply_spin(angle, velocity) {
                debug!("Spin ignored, puck of turn {} is not traveling", puck.turn_id);
                return None;
            }
            Some(PlayerAction::Spin { angle, velocity })
        }
        PlayerAction::RequestNewThrow => (puck.state() != PuckState::Setup).then_some(action),
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;
    use crate::controller::{AiController, Difficulty, NetworkHost, NetworkSpectator};
    use crate::game::physics::SlidingWorld;
    use crate::network::chat::{ChatEvent, ChatTransport};
    use crate::network::memory::{Faults, MemoryChat, MemoryHub};

    const DT: f32 = 1.0 / 60.0;

    fn config() -> Config {
        let mut config = Config::default();
        config.ai.think_delay_ms = 50;
        config.ai.spin_chance = 0.0;
        config
    }

    fn world(config: &Config) -> Box<SlidingWorld> {
        Box::new(SlidingWorld::new(&config.physics))
    }

    fn ai(config: &Config, seed: u64) -> Box<dyn Controller> {
        Box::new(AiController::with_seed(Difficulty::Medium, config, seed))
    }

    struct Peer {
        session: Session,
        chat: MemoryChat,
    }

    fn pair(config: &Config) -> (Peer, Peer, MemoryHub) {
        pair_on(MemoryHub::new(), config)
    }

    /// Host plays Red, invitee plays Blue
    fn pair_on(hub: MemoryHub, config: &Config) -> (Peer, Peer, MemoryHub) {
        let host_chat = hub.login("alice").unwrap();
        let invitee_chat = hub.login("bob").unwrap();

        let mut host = Session::networked(
            config,
            world(config),
            PeerLink::new(Role::Host, "bob", host_chat.login_timestamp_ms()),
        );
        host.seat(PuckColor::Red, Box::new(NetworkHost::new(ai(config, 1)))).unwrap();
        host.seat(PuckColor::Blue, Box::new(NetworkSpectator::new("bob"))).unwrap();

        let mut invitee = Session::networked(
            config,
            world(config),
            PeerLink::new(Role::Invitee, "alice", invitee_chat.login_timestamp_ms()),
        );
        invitee.seat(PuckColor::Red, Box::new(NetworkSpectator::new("alice"))).unwrap();
        invitee.seat(PuckColor::Blue, Box::new(NetworkHost::new(ai(config, 2)))).unwrap();

        (
            Peer { session: host, chat: host_chat },
            Peer { session: invitee, chat: invitee_chat },
            hub,
        )
    }

    fn flush(from: &mut Peer, to: &str) {
        for command in from.session.drain_outbox() {
            from.chat.send_chat(to, &command.to_string()).unwrap();
        }
    }

    fn receive(peer: &mut Peer) {
        while let Some(event) = peer.chat.try_recv() {
            match event {
                ChatEvent::Message(msg) => {
                    let _ = peer.session.on_chat(&msg);
                }
                ChatEvent::Presence { user, online } => peer.session.on_presence(&user, online),
                ChatEvent::Disconnected => peer.session.on_transport_lost(),
                ChatEvent::Error(_) => {}
            }
        }
    }

    fn step(host: &mut Peer, invitee: &mut Peer) {
        host.session.tick(DT);
        invitee.session.tick(DT);
        flush(host, "bob");
        flush(invitee, "alice");
        receive(host);
        receive(invitee);
    }

    fn message(from: &str, body: &str) -> ChatMessage {
        ChatMessage {
            from: from.to_string(),
            body: body.to_string(),
            timestamp_ms: u64::MAX,
        }
    }

    #[test]
    fn test_perform_follows_puck_lifecycle() {
        let config = config();
        let mut table = Table::new(&config, world(&config), EventBus::new());
        let limits = SyncLimits::from_physics(&config.physics);
        let puck = table.spawn_puck(PuckColor::Red, 1);
        let spin = PlayerAction::Spin {
            angle: 0.2,
            velocity: 3.0,
        };

        assert_eq!(perform(puck, PlayerAction::RequestNewThrow, &limits), None);
        assert_eq!(perform(puck, spin, &limits), None);
        assert_eq!(perform(puck, PlayerAction::Move(Vec3::new(0.0, 2000.0, 0.0)), &limits), None);

        let Some(PlayerAction::Throw(force)) = perform(puck, PlayerAction::Throw(Vec2::new(500.0, 0.0)), &limits) else {
            panic!("throw from the start line must apply");
        };
        assert!((force.length() - config.physics.throw_force_max).abs() < 1e-3);

        assert_eq!(perform(puck, PlayerAction::Move(Vec3::ZERO), &limits), None);
        assert_eq!(perform(puck, spin, &limits), Some(spin));
        assert_eq!(
            perform(puck, PlayerAction::RequestNewThrow, &limits),
            Some(PlayerAction::RequestNewThrow)
        );
    }

    #[test]
    fn test_local_ai_round() {
        let config = config();
        let mut session = Session::local(&config, world(&config));
        session.seat(PuckColor::Red, ai(&config, 5)).unwrap();
        session.seat(PuckColor::Blue, ai(&config, 6)).unwrap();
        session.start().unwrap();

        for _ in 0..60 * 120 {
            session.tick(DT);
            if session.game().state().is_between_rounds() {
                break;
            }
        }

        assert!(session.game().state().is_between_rounds());
        assert_eq!(session.game().turn_counter(), 9);
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_heavy_pucks_still_finish_the_round() {
        let mut config = config();
        // Best zone is out of reach at this mass
        config.physics.puck_mass = 2.0;
        let mut session = Session::local(&config, world(&config));
        session.seat(PuckColor::Red, ai(&config, 5)).unwrap();
        session.seat(PuckColor::Blue, ai(&config, 6)).unwrap();
        session.start().unwrap();

        for _ in 0..60 * 120 {
            session.tick(DT);
            if session.game().state().is_between_rounds() {
                break;
            }
        }

        assert!(session.game().state().is_between_rounds());
        assert_eq!(session.game().turn_counter(), 9);
    }

    fn play_round(host: &mut Peer, invitee: &mut Peer) {
        host.session.start().unwrap();
        for _ in 0..60 * 180 {
            step(host, invitee);
            if host.session.game().state().is_between_rounds()
                && invitee.session.game().state().is_between_rounds()
            {
                break;
            }
        }
    }

    fn assert_in_step(host: &Peer, invitee: &Peer) {
        let (h, i) = (host.session.game(), invitee.session.game());
        assert!(h.state().is_between_rounds());
        assert_eq!(h.state(), i.state());
        assert_eq!(h.turn_counter(), i.turn_counter());
        assert_eq!(h.score(PuckColor::Red), i.score(PuckColor::Red));
        assert_eq!(h.score(PuckColor::Blue), i.score(PuckColor::Blue));

        // Same pucks in the same places
        let mut host_pucks = host.session.table().snapshot(SyncTarget::All);
        let mut invitee_pucks = invitee.session.table().snapshot(SyncTarget::All);
        host_pucks.sort_by_key(|p| p.turn_id);
        invitee_pucks.sort_by_key(|p| p.turn_id);
        assert_eq!(host_pucks, invitee_pucks);
    }

    #[test]
    fn test_networked_round_stays_in_step() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        play_round(&mut host, &mut invitee);
        assert_in_step(&host, &invitee);
    }

    #[test]
    fn test_duplicated_messages_are_harmless() {
        let config = config();
        let faults = Faults {
            drop_chance: 0.0,
            duplicate_chance: 0.5,
        };
        let (mut host, mut invitee, _hub) = pair_on(MemoryHub::with_faults(faults, 3), &config);
        play_round(&mut host, &mut invitee);
        assert_in_step(&host, &invitee);
    }

    #[test]
    fn test_spin_stays_in_step() {
        let mut config = config();
        config.ai.spin_chance = 1.0;
        let (mut host, mut invitee, _hub) = pair(&config);
        play_round(&mut host, &mut invitee);
        assert_in_step(&host, &invitee);
    }

    #[test]
    fn test_invitee_cannot_start() {
        let config = config();
        let (_host, mut invitee, _hub) = pair(&config);
        assert!(matches!(invitee.session.start(), Err(SessionError::NotHost(_))));
        assert!(matches!(invitee.session.start_bowling(), Err(SessionError::NotHost(_))));
    }

    #[test]
    fn test_stale_commands_change_nothing() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        host.session.start().unwrap();

        // Play until turn 3 is under way on both sides
        for _ in 0..60 * 60 {
            step(&mut host, &mut invitee);
            if invitee.session.game().turn_counter() >= 3 {
                break;
            }
        }
        let counter = invitee.session.game().turn_counter();
        assert!(counter >= 3);

        let before = invitee.session.table().snapshot(SyncTarget::All);
        let state = invitee.session.game().state();

        let stale = [
            ChatCommand::Throw {
                turn: 1,
                force: Vec2::new(100.0, 0.0),
            },
            ChatCommand::Move {
                turn: 1,
                position: Vec3::new(0.0, 9.0, 0.0),
            },
            ChatCommand::Sync {
                turn: 1,
                pucks: before
                    .iter()
                    .map(|p| PuckSnapshot {
                        turn_id: p.turn_id,
                        position: p.position + Vec3::Y,
                    })
                    .collect(),
            },
            ChatCommand::Turn { turn: 1 },
        ];
        for command in stale {
            invitee
                .session
                .on_chat(&message("alice", &command.to_string()))
                .unwrap();
        }

        assert_eq!(invitee.session.table().snapshot(SyncTarget::All), before);
        assert_eq!(invitee.session.game().turn_counter(), counter);
        assert_eq!(invitee.session.game().state(), state);
    }

    #[test]
    fn test_duplicate_turn_advances_once() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        host.session.start().unwrap();
        let turn = host.session.drain_outbox();
        assert_eq!(turn, vec![ChatCommand::Turn { turn: 0 }]);

        let body = ChatCommand::Turn { turn: 0 }.to_string();
        invitee.session.on_chat(&message("alice", &body)).unwrap();
        invitee.session.on_chat(&message("alice", &body)).unwrap();
        assert_eq!(invitee.session.game().turn_counter(), 1);
        assert_eq!(invitee.session.game().active_color(), Some(PuckColor::Red));
    }

    #[test]
    fn test_protocol_violations_rejected() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        host.session.start().unwrap();
        invitee
            .session
            .on_chat(&message("alice", "turn 0"))
            .unwrap();

        // Ahead of the counter
        assert!(invitee.session.on_chat(&message("alice", "turn 7")).is_err());
        // Force too large
        let throw = ChatCommand::Throw {
            turn: 1,
            force: Vec2::new(400.0, 0.0),
        };
        assert!(invitee.session.on_chat(&message("alice", &throw.to_string())).is_err());
        // Garbage
        assert!(invitee.session.on_chat(&message("alice", "throw 1 x y")).is_err());
        // Host does not take orders on authority
        assert!(matches!(
            host.session.on_chat(&message("bob", "score-sync red 3")),
            Err(SessionError::Protocol(ProtocolError::NotAuthoritative("score-sync")))
        ));
        // Acting for the wrong player: it is Red's turn, Blue is local at the invitee
        let blue_throw = ChatCommand::Throw {
            turn: 1,
            force: Vec2::new(50.0, 0.0),
        };
        assert!(host.session.on_chat(&message("bob", &blue_throw.to_string())).is_err());

        // Strangers and old messages are dropped quietly
        let before = invitee.session.game().turn_counter();
        invitee.session.on_chat(&message("mallory", "turn 1")).unwrap();
        let old = ChatMessage {
            from: "alice".into(),
            body: "turn 1".into(),
            timestamp_ms: 0,
        };
        invitee.session.on_chat(&old).unwrap();
        assert_eq!(invitee.session.game().turn_counter(), before);
    }

    #[test]
    fn test_score_sync_bounds() {
        let mut config = config();
        config.rules.pucks_per_player = 1;
        let (mut host, mut invitee, _hub) = pair(&config);
        host.session.start().unwrap();

        // Both pucks thrown; the invitee reaches the end of the round
        for turn in 0..3 {
            let body = ChatCommand::Turn { turn }.to_string();
            invitee.session.on_chat(&message("alice", &body)).unwrap();
        }
        assert_eq!(invitee.session.game().state(), MatchState::WaitingForPeerSync);

        // A turn now would skip the score
        assert!(invitee.session.on_chat(&message("alice", "turn 3")).is_err());
        // 1 puck x 3 points at most
        assert!(invitee.session.on_chat(&message("alice", "score-sync red 4")).is_err());

        invitee.session.on_chat(&message("alice", "score-sync red 3")).unwrap();
        assert_eq!(invitee.session.game().state(), MatchState::RoundEnd);
        assert_eq!(invitee.session.game().score(PuckColor::Red), 3);
    }

    #[test]
    fn test_heartbeat_and_timeout() {
        let mut config = config();
        config.network.heartbeat_interval_ms = 500;
        config.network.peer_timeout_secs = 2;
        let (mut host, _invitee, _hub) = pair(&config);
        let events = host.session.bus().subscribe();

        for _ in 0..60 {
            host.session.tick(DT);
        }
        let outbox = host.session.drain_outbox();
        assert!(outbox.contains(&ChatCommand::Heartbeat { seq: 1 }));

        // Peer traffic resets the silence timer
        host.session.on_chat(&message("bob", "heartbeat 1")).unwrap();
        for _ in 0..100 {
            host.session.tick(DT);
        }
        assert!(!host.session.is_abandoned());

        for _ in 0..60 {
            host.session.tick(DT);
        }
        assert!(host.session.is_abandoned());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, GameEvent::MatchAbandoned { .. })));
        assert!(matches!(
            host.session.on_chat(&message("bob", "heartbeat 2")),
            Err(SessionError::Abandoned)
        ));
    }

    #[test]
    fn test_peer_logout_abandons() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        invitee.chat.logout().unwrap();
        receive(&mut host);
        assert!(host.session.is_abandoned());
    }

    #[test]
    fn test_bowling_reaches_invitee() {
        let config = config();
        let (mut host, mut invitee, _hub) = pair(&config);
        assert_eq!(host.session.start_bowling().unwrap(), 10);
        flush(&mut host, "bob");
        receive(&mut invitee);
        assert_eq!(invitee.session.table().pins().len(), 10);
    }
}
