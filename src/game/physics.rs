use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use super::bounds::Aabb;
use crate::config::PhysicsConfig;

// Puck thickness relative to its radius, for bounding boxes
const PUCK_HALF_HEIGHT_RATIO: f32 = 0.4;

/// Physics body of a single puck
///
/// This is the seam to the host engine: an engine-backed body forwards these
/// calls to its rigid body and may implement `step` as a no-op when the
/// engine integrates on its own. [`SlidingBody`] is the built-in headless body.
pub trait PuckBody {
    /// Linear impulse on the table plane
    fn apply_throw(&mut self, force: Vec2);

    /// Teleport, clearing any motion
    fn move_to(&mut self, position: Vec3);

    /// Teleport, keeping linear and angular motion as they are
    fn teleport(&mut self, position: Vec3);

    /// Angular impulse for a spin of `angle` radians at `velocity`
    fn apply_spin(&mut self, angle: f32, velocity: f32);

    fn add_impulse(&mut self, impulse: Vec3);

    fn bounding_box(&self) -> Aabb;

    fn position(&self) -> Vec3;

    fn velocity(&self) -> Vec3;

    fn step(&mut self, dt: f32);
}

/// Creates bodies for newly spawned pucks
pub trait BodyFactory {
    fn spawn(&mut self, position: Vec3, radius: f32) -> Box<dyn PuckBody>;
}

/// Puck sliding on a flat table with constant friction deceleration
#[derive(Debug, Clone)]
pub struct SlidingBody {
    pub position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: f32,
    pub radius: f32,
    pub mass: f32,
    pub friction: f32,
}

impl SlidingBody {
    pub fn new(position: Vec3, radius: f32, mass: f32, friction: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            angular_velocity: 0.0,
            radius,
            mass,
            friction,
        }
    }
}

impl PuckBody for SlidingBody {
    fn apply_throw(&mut self, force: Vec2) {
        self.velocity += force.extend(0.0) / self.mass;
    }

    fn move_to(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.angular_velocity = 0.0;
    }

    fn teleport(&mut self, position: Vec3) {
        self.position = position;
    }

    fn apply_spin(&mut self, angle: f32, _velocity: f32) {
        // Sideways drift comes from add_impulse during the spin phase
        self.angular_velocity += PI * self.radius * 2.0 * angle / self.mass;
    }

    fn add_impulse(&mut self, impulse: Vec3) {
        self.velocity += impulse / self.mass;
    }

    fn bounding_box(&self) -> Aabb {
        Aabb::from_center(
            self.position,
            Vec3::new(self.radius, self.radius, self.radius * PUCK_HALF_HEIGHT_RATIO),
        )
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn step(&mut self, dt: f32) {
        let decel = self.friction * dt;

        let speed = self.velocity.length();
        if speed > 0.0 {
            let new_speed = (speed - decel).max(0.0);
            self.velocity *= new_speed / speed;
        }

        if self.angular_velocity != 0.0 {
            let spin = self.angular_velocity.abs();
            self.angular_velocity = self.angular_velocity.signum() * (spin - decel).max(0.0);
        }

        self.position += self.velocity * dt;
    }
}

/// Spawns [`SlidingBody`] pucks from the physics configuration
#[derive(Debug, Clone)]
pub struct SlidingWorld {
    mass: f32,
    friction: f32,
}

impl SlidingWorld {
    pub fn new(physics: &PhysicsConfig) -> Self {
        Self {
            mass: physics.puck_mass,
            friction: physics.friction_deceleration,
        }
    }
}

impl BodyFactory for SlidingWorld {
    fn spawn(&mut self, position: Vec3, radius: f32) -> Box<dyn PuckBody> {
        Box::new(SlidingBody::new(position, radius, self.mass, self.friction))
    }
}

/// Distance a puck slides after an impulse of `force` under constant friction
pub fn slide_distance(force: f32, mass: f32, friction: f32) -> f32 {
    let v0 = force / mass;
    v0 * v0 / (2.0 * friction)
}

/// Impulse needed to slide `distance` before stopping
pub fn force_for_distance(distance: f32, mass: f32, friction: f32) -> f32 {
    (2.0 * friction * distance.max(0.0)).sqrt() * mass
}
