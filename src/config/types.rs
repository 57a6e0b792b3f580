// p2shuffle configuration types
// All settings with defaults for a regulation table

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::bounds::Aabb;
use crate::game::scoring::ScoringZone;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub ai: AIConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesConfig {
    // Cumulative score that ends the match
    pub winning_score: u32,

    // Pucks each player throws per round
    pub pucks_per_player: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            winning_score: 21,
            pucks_per_player: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhysicsConfig {
    // Puck radius in table units (cm)
    pub puck_radius: f32,

    pub puck_mass: f32,

    // Sliding friction, units per second squared
    pub friction_deceleration: f32,

    // Speed under which a puck counts as still
    pub rest_speed_epsilon: f32,

    // How long a puck must stay still before it is resting
    pub settle_duration_secs: f32,

    // Largest impulse component accepted from a throw (local or remote)
    pub throw_force_max: f32,

    // Gesture speed (px/s) divided by this gives the throw force
    pub throw_force_scaling: f32,

    // Gestures slower than this (px/s) are drags, not flicks
    pub escape_velocity: f32,

    // Largest coordinate accepted for a remote position
    pub max_position: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            puck_radius: 2.5,
            puck_mass: 1.0,
            friction_deceleration: 20.0,
            rest_speed_epsilon: 0.01,
            settle_duration_secs: 1.0,
            throw_force_max: 150.0,
            throw_force_scaling: 25.0,
            escape_velocity: 100.0,
            max_position: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TableConfig {
    // Where every new puck is placed
    pub start_position: Vec3,

    // Direction pucks travel; distance along it orders pucks for scoring
    pub scoring_axis: Vec3,

    // Innermost zone first
    pub zones: Vec<ScoringZone>,

    // Pucks whose bounds touch this on rest are removed
    pub killing_volume: Aabb,

    pub bowling_center: Vec3,
    pub bowling_pin_spacing: f32,
    pub bowling_pin_radius: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        let zone = |near: f32, far: f32, points: u32| ScoringZone {
            bounds: Aabb::new(Vec3::new(near, -25.0, -5.0), Vec3::new(far, 25.0, 5.0)),
            points,
        };

        Self {
            start_position: Vec3::ZERO,
            scoring_axis: Vec3::X,
            zones: vec![zone(230.0, 250.0, 3), zone(210.0, 230.0, 2), zone(190.0, 210.0, 1)],
            killing_volume: Aabb::new(Vec3::new(250.0, -200.0, -50.0), Vec3::new(600.0, 200.0, 50.0)),
            bowling_center: Vec3::new(220.0, 0.0, 0.0),
            bowling_pin_spacing: 12.0,
            bowling_pin_radius: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AIConfig {
    // AI difficulty: "easy", "medium", "hard"
    pub difficulty: String,

    // Delay before the AI places and throws its puck
    pub think_delay_ms: u64,

    // Probability of adding spin to a throw (0.0 - 1.0)
    pub spin_chance: f32,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            difficulty: "medium".to_string(),
            think_delay_ms: 400,
            spin_chance: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // Chat relay WebSocket URL
    pub relay_server: String,

    // Seconds between full position syncs while pucks are moving
    pub sync_interval_secs: f32,

    pub heartbeat_interval_ms: u64,

    // Peer silence after which the match is abandoned
    pub peer_timeout_secs: u64,

    // How long to wait for the handshake before giving up
    pub handshake_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relay_server: "ws://127.0.0.1:8080".to_string(),
            sync_interval_secs: 0.5,
            heartbeat_interval_ms: 2000,
            peer_timeout_secs: 30,
            handshake_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    // Target ticks per second of the game loop
    pub target_fps: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { target_fps: 60 }
    }
}
