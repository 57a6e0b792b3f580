// Human player - turns touch gestures into puck actions
//
// Dragging slides the puck along the start line. Releasing faster than the
// escape velocity throws it; the flick's speed sets the force.

use std::collections::VecDeque;
use std::sync::mpsc;

use glam::{Vec2, Vec3};
use tracing::debug;

use super::{Controller, ControllerKind, PlayerAction};
use crate::config::Config;
use crate::game::puck::PuckRest;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSettings {
    /// Gestures slower than this (px/s) are drags
    pub escape_velocity: f32,
    pub throw_force_scaling: f32,
    pub throw_force_max: f32,
    pub start_position: Vec3,
    /// Screen point that maps onto the start position
    pub screen_origin: Vec2,
    /// Table units per screen pixel when dragging
    pub units_per_pixel: f32,
}

impl GestureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            escape_velocity: config.physics.escape_velocity,
            throw_force_scaling: config.physics.throw_force_scaling,
            throw_force_max: config.physics.throw_force_max,
            start_position: config.table.start_position,
            screen_origin: Vec2::ZERO,
            units_per_pixel: 0.1,
        }
    }

    fn drag_position(&self, screen: Vec2) -> Vec3 {
        let lateral = (screen.x - self.screen_origin.x) * self.units_per_pixel;
        self.start_position + Vec3::new(0.0, lateral, 0.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum InputEvent {
    TouchStart { at: Vec2, time_ms: u64 },
    TouchRepeat { at: Vec2 },
    TouchEnd { at: Vec2, time_ms: u64 },
    Spin { angle: f32, velocity: f32 },
    Rethrow,
}

/// Handle the presentation layer uses to feed touches to a human controller
#[derive(Debug, Clone)]
pub struct HumanInput {
    tx: mpsc::Sender<InputEvent>,
}

impl HumanInput {
    pub fn touch_start(&self, x: f32, y: f32, time_ms: u64) {
        self.send(InputEvent::TouchStart {
            at: Vec2::new(x, y),
            time_ms,
        });
    }

    pub fn touch_repeat(&self, x: f32, y: f32) {
        self.send(InputEvent::TouchRepeat { at: Vec2::new(x, y) });
    }

    pub fn touch_end(&self, x: f32, y: f32, time_ms: u64) {
        self.send(InputEvent::TouchEnd {
            at: Vec2::new(x, y),
            time_ms,
        });
    }

    pub fn spin(&self, angle: f32, velocity: f32) {
        self.send(InputEvent::Spin { angle, velocity });
    }

    pub fn rethrow(&self) {
        self.send(InputEvent::Rethrow);
    }

    fn send(&self, event: InputEvent) {
        // Controller gone means the match is over; nothing to deliver to
        let _ = self.tx.send(event);
    }
}

/// Throw force for a gesture released at `end`, or `None` if it was only a drag.
///
/// Screen up is table forward, screen right is table left-to-right.
pub fn decide_release(
    start: Vec2,
    start_ms: u64,
    end: Vec2,
    end_ms: u64,
    settings: &GestureSettings,
) -> Option<Vec2> {
    let elapsed = end_ms.saturating_sub(start_ms).max(1) as f32 / 1000.0;
    let gesture = end - start;
    let speed = gesture.length() / elapsed;

    if speed <= settings.escape_velocity {
        return None;
    }

    let direction = Vec2::new(-gesture.y, gesture.x).normalize_or_zero();
    if direction.x <= 0.0 {
        // Flicked backwards or sideways
        return None;
    }

    let force = (speed / settings.throw_force_scaling).min(settings.throw_force_max);
    Some(direction * force)
}

struct Gesture {
    start: Vec2,
    start_ms: u64,
}

pub struct HumanController {
    name: String,
    settings: GestureSettings,
    rx: mpsc::Receiver<InputEvent>,
    gesture: Option<Gesture>,
    turn: Option<u32>,
    thrown: bool,
    pending: VecDeque<PlayerAction>,
}

impl HumanController {
    pub fn new(settings: GestureSettings) -> (Self, HumanInput) {
        let (tx, rx) = mpsc::channel();
        let controller = Self {
            name: "Human".to_string(),
            settings,
            rx,
            gesture: None,
            turn: None,
            thrown: false,
            pending: VecDeque::new(),
        };
        (controller, HumanInput { tx })
    }

    fn handle_input(&mut self, event: InputEvent) {
        // Touches only matter while this player holds a puck
        if self.turn.is_none() {
            return;
        }

        match event {
            InputEvent::TouchStart { at, time_ms } if !self.thrown => {
                self.gesture = Some(Gesture { start: at, start_ms: time_ms });
            }
            InputEvent::TouchRepeat { at } if !self.thrown && self.gesture.is_some() => {
                self.pending
                    .push_back(PlayerAction::Move(self.settings.drag_position(at)));
            }
            InputEvent::TouchEnd { at, time_ms } if !self.thrown => {
                let Some(gesture) = self.gesture.take() else {
                    return;
                };
                match decide_release(gesture.start, gesture.start_ms, at, time_ms, &self.settings) {
                    Some(force) => {
                        debug!("Flick released with force {:?}", force);
                        self.thrown = true;
                        self.pending.push_back(PlayerAction::Throw(force));
                    }
                    None => self
                        .pending
                        .push_back(PlayerAction::Move(self.settings.drag_position(at))),
                }
            }
            InputEvent::Spin { angle, velocity } if self.thrown => {
                self.pending.push_back(PlayerAction::Spin { angle, velocity });
            }
            InputEvent::Rethrow => self.request_new_throw(),
            _ => {}
        }
    }
}

impl Controller for HumanController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Human
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_new_throw(&mut self, turn_id: u32) {
        self.turn = Some(turn_id);
        self.thrown = false;
        self.gesture = None;
        self.pending.clear();
    }

    fn request_new_throw(&mut self) {
        // Only after letting go; a puck still in hand can just be dragged again
        if self.thrown {
            self.pending.push_back(PlayerAction::RequestNewThrow);
            self.turn = None;
        }
    }

    fn on_puck_resting(&mut self, rest: &PuckRest) {
        if self.turn == Some(rest.turn_id) {
            self.turn = None;
        }
    }

    fn next_action(&mut self, _dt: f32) -> Option<PlayerAction> {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_input(event);
        }
        self.pending.pop_front()
    }
}
