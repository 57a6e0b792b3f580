// Player controllers
// Whoever throws a puck (a person, the AI or the remote peer) sits behind the same trait

mod ai;
mod aim;
mod human;
mod network;

pub use ai::{AiController, Difficulty, UnknownDifficulty};
pub use aim::{plan_throw, straight_throw, AimError, ThrowPlan};
pub use human::{decide_release, GestureSettings, HumanController, HumanInput};
pub use network::{NetworkHost, NetworkSpectator};

use glam::{Vec2, Vec3};

use crate::config::Config;
use crate::game::puck::PuckRest;

/// Something a player does to the active puck
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerAction {
    /// Reposition before release
    Move(Vec3),
    Throw(Vec2),
    Spin { angle: f32, velocity: f32 },
    /// Give up on the current throw and move on
    RequestNewThrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Human,
    Ai,
    /// Local player whose actions are broadcast to the peer
    NetworkHost,
    /// Stand-in for the remote player
    NetworkSpectator,
}

/// Trait for everything that can play a turn
///
/// The session calls `handle_new_throw` when the match hands this player a
/// puck, then polls `next_action` every tick until the turn moves on.
pub trait Controller {
    fn kind(&self) -> ControllerKind;

    /// Name for logs
    fn name(&self) -> &str;

    /// A puck for `turn_id` is waiting at the start position
    fn handle_new_throw(&mut self, turn_id: u32);

    /// Player asked to skip the rest of the current throw
    fn request_new_throw(&mut self);

    fn on_puck_resting(&mut self, rest: &PuckRest);

    fn next_action(&mut self, dt: f32) -> Option<PlayerAction>;

    /// Deliver an action that arrived from the peer; only spectators take them
    fn accept_remote(&mut self, _action: PlayerAction) -> bool {
        false
    }

    /// Actions from this controller are sent to the peer
    fn broadcasts(&self) -> bool {
        self.kind() == ControllerKind::NetworkHost
    }
}

/// Controller selection for a local player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerKind {
    Human,
    Ai(Difficulty),
}

impl PlayerKind {
    pub fn display_name(&self) -> &str {
        match self {
            PlayerKind::Human => "Human",
            PlayerKind::Ai(difficulty) => difficulty.display_name(),
        }
    }
}

/// Create a controller; humans also get the handle the presentation layer feeds
pub fn create_controller(kind: PlayerKind, config: &Config) -> (Box<dyn Controller>, Option<HumanInput>) {
    match kind {
        PlayerKind::Human => {
            let (controller, input) = HumanController::new(GestureSettings::from_config(config));
            (Box::new(controller), Some(input))
        }
        PlayerKind::Ai(difficulty) => (Box::new(AiController::new(difficulty, config)), None),
    }
}
