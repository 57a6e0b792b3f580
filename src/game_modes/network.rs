use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::{Controller, NetworkHost, NetworkSpectator};
use crate::game::{MatchState, PuckColor, SlidingWorld};
use crate::network::{ChatCommand, ChatEvent, ChatTransport, Handshake, Role};
use crate::session::{PeerLink, Session};

use super::common::{announce, limit_frame_rate, MatchSummary, Pace};

// Poll interval while waiting on the handshake
const HANDSHAKE_POLL: Duration = Duration::from_millis(10);

/// Who starts the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invitation {
    /// Send `travel-syn` to the peer and host the match
    Invite(String),
    /// Wait for the peer's `travel-syn` and join as invitee
    Accept(String),
}

impl Invitation {
    pub fn peer(&self) -> &str {
        match self {
            Invitation::Invite(peer) | Invitation::Accept(peer) => peer,
        }
    }
}

/// Pair with the peer over `transport`; returns the role this side plays
///
/// Reads one event at a time so that game traffic following the final
/// handshake message stays queued for the session.
pub fn run_handshake<T: ChatTransport>(
    transport: &mut T,
    invitation: &Invitation,
    timeout: Duration,
) -> anyhow::Result<Role> {
    let peer = invitation.peer();
    let mut rng = StdRng::from_entropy();
    let mut handshake = Handshake::new();
    let deadline = Instant::now() + timeout;

    if let Invitation::Invite(_) = invitation {
        let syn = handshake.initiate(&mut rng);
        transport.send_chat(peer, &syn.to_string())?;
        info!("Invited {}", peer);
    } else {
        info!("Waiting for an invitation from {}", peer);
    }

    loop {
        if let Some(role) = handshake.role() {
            return Ok(role);
        }
        if Instant::now() > deadline {
            bail!("no answer from {} within {}s", peer, timeout.as_secs());
        }

        let Some(event) = transport.try_recv() else {
            std::thread::sleep(HANDSHAKE_POLL);
            continue;
        };

        let message = match event {
            ChatEvent::Message(message) => message,
            ChatEvent::Presence { user, online } => {
                debug!("{} is {}", user, if online { "online" } else { "offline" });
                continue;
            }
            ChatEvent::Disconnected => bail!("chat connection lost during the handshake"),
            ChatEvent::Error(e) => {
                warn!("Chat error: {}", e);
                continue;
            }
        };

        if message.from != peer || message.timestamp_ms < transport.login_timestamp_ms() {
            debug!("Ignoring '{}' from {}", message.body, message.from);
            continue;
        }

        let command = match ChatCommand::parse(&message.body) {
            Ok(command) if command.is_handshake() => command,
            Ok(other) => {
                debug!("{} before the handshake finished", other.name());
                continue;
            }
            Err(e) => {
                warn!("Protocol violation from {}: {}", peer, e);
                continue;
            }
        };

        let reply = handshake
            .handle(&command, &mut rng)
            .with_context(|| format!("handshake with {} failed", peer))?;
        if let Some(reply) = reply {
            transport.send_chat(peer, &reply.to_string())?;
        }
    }
}

/// Handshake with the peer, then play a match until it is won or abandoned
///
/// `local_color` defaults to Red for the host and Blue for the invitee.
pub fn run_game_network<T: ChatTransport>(
    config: &Config,
    transport: &mut T,
    invitation: &Invitation,
    local_color: Option<PuckColor>,
    local: Box<dyn Controller>,
    pace: Pace,
) -> anyhow::Result<MatchSummary> {
    let peer = invitation.peer().to_string();
    let timeout = Duration::from_secs(config.network.handshake_timeout_secs);
    let role = run_handshake(transport, invitation, timeout)?;

    let local_color = local_color.unwrap_or(match role {
        Role::Host => PuckColor::Red,
        Role::Invitee => PuckColor::Blue,
    });
    info!("Playing {} as {:?} against {}", local_color, role, peer);

    let link = PeerLink::new(role, &peer, transport.login_timestamp_ms());
    let mut session = Session::networked(config, Box::new(SlidingWorld::new(&config.physics)), link);
    let events = session.bus().subscribe();

    // Both sides seat Red first so they agree on who opens the match
    let mut local = Some(local);
    for color in [PuckColor::Red, PuckColor::Blue] {
        let controller: Box<dyn Controller> = match local.take() {
            Some(controller) if color == local_color => Box::new(NetworkHost::new(controller)),
            other => {
                local = other;
                Box::new(NetworkSpectator::new(&peer))
            }
        };
        session.seat(color, controller)?;
    }

    if role == Role::Host {
        session.start()?;
    }

    loop {
        let frame_start = Instant::now();

        while let Some(event) = transport.try_recv() {
            match event {
                ChatEvent::Message(message) => {
                    if let Err(e) = session.on_chat(&message) {
                        debug!("Dropped '{}': {}", message.body, e);
                    }
                }
                ChatEvent::Presence { user, online } => session.on_presence(&user, online),
                ChatEvent::Disconnected => session.on_transport_lost(),
                ChatEvent::Error(e) => warn!("Chat error: {}", e),
            }
        }

        session.tick(pace.dt);
        flush(&mut session, transport, &peer);

        for event in events.try_iter() {
            announce(&event);
        }

        match session.game().state() {
            MatchState::WinnerDeclared => break,
            MatchState::RoundEnd if role == Role::Host => {
                session.continue_round()?;
                flush(&mut session, transport, &peer);
            }
            _ if session.is_abandoned() => break,
            _ => {}
        }

        limit_frame_rate(frame_start, &pace);
    }

    let summary = MatchSummary::from_match(session.game(), session.is_abandoned());
    if let Err(e) = transport.logout() {
        warn!("Logout failed: {}", e);
    }
    Ok(summary)
}

fn flush<T: ChatTransport>(session: &mut Session, transport: &mut T, peer: &str) {
    for command in session.drain_outbox() {
        if let Err(e) = transport.send_chat(peer, &command.to_string()) {
            warn!("Could not send {}: {}", command.name(), e);
            session.on_transport_lost();
            return;
        }
    }
}
