// Controllers for networked play
// The local player is wrapped so the session knows to broadcast its actions;
// the remote player is a queue of actions that arrived over chat.

use std::collections::VecDeque;

use super::{Controller, ControllerKind, PlayerAction};
use crate::game::puck::PuckRest;

pub struct NetworkHost {
    name: String,
    inner: Box<dyn Controller>,
}

impl NetworkHost {
    pub fn new(inner: Box<dyn Controller>) -> Self {
        Self {
            name: format!("{} (broadcast)", inner.name()),
            inner,
        }
    }
}

impl Controller for NetworkHost {
    fn kind(&self) -> ControllerKind {
        ControllerKind::NetworkHost
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_new_throw(&mut self, turn_id: u32) {
        self.inner.handle_new_throw(turn_id);
    }

    fn request_new_throw(&mut self) {
        self.inner.request_new_throw();
    }

    fn on_puck_resting(&mut self, rest: &PuckRest) {
        self.inner.on_puck_resting(rest);
    }

    fn next_action(&mut self, dt: f32) -> Option<PlayerAction> {
        self.inner.next_action(dt)
    }
}

pub struct NetworkSpectator {
    name: String,
    inbox: VecDeque<PlayerAction>,
}

impl NetworkSpectator {
    pub fn new(peer: &str) -> Self {
        Self {
            name: peer.to_string(),
            inbox: VecDeque::new(),
        }
    }
}

impl Controller for NetworkSpectator {
    fn kind(&self) -> ControllerKind {
        ControllerKind::NetworkSpectator
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_new_throw(&mut self, _turn_id: u32) {
        // Anything left over belongs to a previous turn
        self.inbox.clear();
    }

    /// No-op; a remote rethrow arrives as `turn T` and advances the match directly
    fn request_new_throw(&mut self) {}

    fn on_puck_resting(&mut self, _rest: &PuckRest) {}

    fn next_action(&mut self, _dt: f32) -> Option<PlayerAction> {
        self.inbox.pop_front()
    }

    fn accept_remote(&mut self, action: PlayerAction) -> bool {
        self.inbox.push_back(action);
        true
    }
}
