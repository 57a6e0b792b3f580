use std::fmt;
use std::str::FromStr;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::bounds::Aabb;
use super::physics::PuckBody;
use crate::config::PhysicsConfig;

/// Player identity; each player throws pucks of one color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PuckColor {
    Red,
    Blue,
}

impl PuckColor {
    pub fn opposite(self) -> Self {
        match self {
            PuckColor::Red => PuckColor::Blue,
            PuckColor::Blue => PuckColor::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PuckColor::Red => "Red",
            PuckColor::Blue => "Blue",
        }
    }

    pub fn index(self) -> usize {
        match self {
            PuckColor::Red => 0,
            PuckColor::Blue => 1,
        }
    }
}

impl fmt::Display for PuckColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown puck color '{0}'")]
pub struct UnknownColor(pub String);

impl FromStr for PuckColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(PuckColor::Red),
            "blue" => Ok(PuckColor::Blue),
            _ => Err(UnknownColor(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuckState {
    /// Placed, awaiting release
    Setup,
    Traveling,
    /// Spin impulses still being layered onto the throw
    TravelingWithSpin,
    Resting,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spin {
    pub angle: f32,
    pub velocity: f32,
}

/// A puck that just came to rest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuckRest {
    pub turn_id: u32,
    pub color: PuckColor,
    pub position: Vec3,
    pub bounds: Aabb,
}

pub struct Puck {
    pub color: PuckColor,
    /// Global turn counter when the puck was created
    pub turn_id: u32,
    pub impulse: Vec2,
    pub spin: Spin,
    state: PuckState,
    radius: f32,
    spin_accumulator: f32,
    still_time: f32,
    body: Box<dyn PuckBody>,
}

impl fmt::Debug for Puck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Puck")
            .field("color", &self.color)
            .field("turn_id", &self.turn_id)
            .field("state", &self.state)
            .field("position", &self.body.position())
            .finish()
    }
}

impl Puck {
    pub fn new(color: PuckColor, turn_id: u32, radius: f32, body: Box<dyn PuckBody>) -> Self {
        Self {
            color,
            turn_id,
            impulse: Vec2::ZERO,
            spin: Spin::default(),
            state: PuckState::Setup,
            radius,
            spin_accumulator: 0.0,
            still_time: 0.0,
            body,
        }
    }

    pub fn state(&self) -> PuckState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.body.position()
    }

    pub fn bounding_box(&self) -> Aabb {
        self.body.bounding_box()
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.state, PuckState::Traveling | PuckState::TravelingWithSpin)
    }

    pub fn apply_throw(&mut self, force: Vec2) {
        self.impulse = force;
        self.body.apply_throw(force);
        self.still_time = 0.0;
        self.state = PuckState::Traveling;
    }

    pub fn move_to(&mut self, position: Vec3) {
        self.body.move_to(position);
        self.state = PuckState::Setup;
    }

    /// Spin only layers onto a throw that is already traveling
    pub fn apply_spin(&mut self, angle: f32, velocity: f32) -> bool {
        if self.state != PuckState::Traveling {
            return false;
        }
        self.spin = Spin { angle, velocity };
        self.spin_accumulator = 0.0;
        self.body.apply_spin(angle, velocity);
        self.state = PuckState::TravelingWithSpin;
        true
    }

    /// Reposition from an authoritative snapshot without touching the lifecycle
    pub fn correct_position(&mut self, position: Vec3) {
        if self.is_moving() {
            self.body.teleport(position);
        } else {
            self.body.move_to(position);
        }
    }

    /// Advance the puck; returns the rest report exactly once, on entering `Resting`
    pub fn tick(&mut self, dt: f32, physics: &PhysicsConfig) -> Option<PuckRest> {
        if matches!(self.state, PuckState::Setup | PuckState::Resting) {
            return None;
        }

        if self.state == PuckState::TravelingWithSpin {
            let budget = (self.spin.angle * self.radius).abs();
            if self.spin_accumulator <= budget {
                let s = self.spin.velocity.abs() * dt;
                self.spin_accumulator += s;
                let side = if self.spin.angle >= 0.0 { 1.0 } else { -1.0 };
                self.body.add_impulse(Vec3::new(0.0, s * side, 0.0));
            } else {
                self.state = PuckState::Traveling;
            }
        }

        self.body.step(dt);

        let epsilon = physics.rest_speed_epsilon;
        if self.body.velocity().length_squared() < epsilon * epsilon {
            self.still_time += dt;
        } else {
            self.still_time = 0.0;
        }

        if self.still_time > physics.settle_duration_secs {
            self.state = PuckState::Resting;
            return Some(PuckRest {
                turn_id: self.turn_id,
                color: self.color,
                position: self.body.position(),
                bounds: self.body.bounding_box(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::SlidingBody;

    const DT: f32 = 1.0 / 60.0;

    fn puck() -> Puck {
        let body = SlidingBody::new(Vec3::ZERO, 2.5, 1.0, 20.0);
        Puck::new(PuckColor::Red, 1, 2.5, Box::new(body))
    }

    fn run(puck: &mut Puck, physics: &PhysicsConfig) -> Option<(PuckRest, u32)> {
        for step in 0..10_000 {
            if let Some(rest) = puck.tick(DT, physics) {
                return Some((rest, step));
            }
        }
        None
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("red".parse::<PuckColor>(), Ok(PuckColor::Red));
        assert_eq!("Blue".parse::<PuckColor>(), Ok(PuckColor::Blue));
        let err = "green".parse::<PuckColor>().unwrap_err();
        assert_eq!(err.to_string(), "unknown puck color 'green'");
        assert_eq!(PuckColor::Red.opposite(), PuckColor::Blue);
    }

    #[test]
    fn test_setup_puck_never_rests() {
        let mut p = puck();
        let physics = PhysicsConfig::default();
        assert!(run(&mut p, &physics).is_none());
        assert_eq!(p.state(), PuckState::Setup);
    }

    #[test]
    fn test_throw_travels_then_rests_once() {
        let mut p = puck();
        let physics = PhysicsConfig::default();
        p.apply_throw(Vec2::new(60.0, 0.0));
        assert_eq!(p.state(), PuckState::Traveling);

        let (rest, _) = run(&mut p, &physics).expect("puck should come to rest");
        assert_eq!(p.state(), PuckState::Resting);
        assert_eq!(rest.turn_id, 1);
        assert!(rest.position.x > 80.0);

        // Already resting: no second report
        assert!(p.tick(DT, &physics).is_none());
    }

    #[test]
    fn test_rest_waits_for_settle_duration() {
        let mut p = puck();
        let physics = PhysicsConfig {
            settle_duration_secs: 0.5,
            ..PhysicsConfig::default()
        };
        // Barely moving: stops almost immediately, then settles
        p.apply_throw(Vec2::new(0.001, 0.0));
        let (_, steps) = run(&mut p, &physics).unwrap();
        // 0.5s at 60 ticks per second
        assert!(steps >= 29, "rested after {} ticks", steps);
    }

    #[test]
    fn test_spin_requires_traveling() {
        let mut p = puck();
        assert!(!p.apply_spin(0.5, 10.0));
        p.apply_throw(Vec2::new(80.0, 0.0));
        assert!(p.apply_spin(0.5, 10.0));
        assert_eq!(p.state(), PuckState::TravelingWithSpin);
    }

    #[test]
    fn test_spin_drifts_sideways_and_exhausts() {
        let mut straight = puck();
        let mut spun = puck();
        let physics = PhysicsConfig::default();

        straight.apply_throw(Vec2::new(80.0, 0.0));
        spun.apply_throw(Vec2::new(80.0, 0.0));
        spun.apply_spin(-0.4, 6.0);

        // Budget is |angle * radius| = 1.0 at 6.0 per second
        for _ in 0..30 {
            spun.tick(DT, &physics);
        }
        assert_eq!(spun.state(), PuckState::Traveling);

        let (straight_rest, _) = run(&mut straight, &physics).unwrap();
        let (spun_rest, _) = run(&mut spun, &physics).unwrap();
        assert_eq!(straight_rest.position.y, 0.0);
        assert!(spun_rest.position.y < 0.0);
    }

    #[test]
    fn test_move_resets_to_setup() {
        let mut p = puck();
        p.apply_throw(Vec2::new(80.0, 0.0));
        p.move_to(Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(p.state(), PuckState::Setup);
        assert_eq!(p.position(), Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_correct_position_keeps_velocity() {
        let mut p = puck();
        p.apply_throw(Vec2::new(80.0, 0.0));
        p.correct_position(Vec3::new(3.0, 0.0, 0.0));

        assert!(p.is_moving());
        assert_eq!(p.position(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_correction_of_heavy_puck_keeps_speed() {
        let body = SlidingBody::new(Vec3::ZERO, 2.5, 2.0, 20.0);
        let mut p = Puck::new(PuckColor::Blue, 1, 2.5, Box::new(body));
        p.apply_throw(Vec2::new(100.0, 0.0));
        p.apply_spin(0.2, 4.0);
        let before = p.body.velocity();
        assert_eq!(before, Vec3::new(50.0, 0.0, 0.0));

        p.correct_position(Vec3::new(3.0, 0.0, 0.0));
        p.correct_position(Vec3::new(4.0, 0.0, 0.0));

        assert_eq!(p.body.velocity(), before);
        assert_eq!(p.position(), Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(p.state(), PuckState::TravelingWithSpin);
    }
}
