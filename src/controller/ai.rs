// AI player with imperfect aim

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use super::aim::{plan_throw, straight_throw};
use super::{Controller, ControllerKind, PlayerAction};
use crate::config::{Config, PhysicsConfig, TableConfig};
use crate::game::puck::{PuckRest, Spin};

// Pause between placing, throwing and spinning
const ACTION_GAP_SECS: f32 = 0.1;

// Share of the last miss corrected on the next throw
const BIAS_LEARNING_RATE: f32 = 0.5;
const MAX_BIAS: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// Large errors, frequent overthrows
    Easy,
    Medium,
    /// Small errors, rarely misses
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AiProfile {
    distance_stddev: f32,
    lateral_stddev: f32,
    // Probability of a badly judged throw
    blunder_rate: f64,
    blunder_distance: f32,
}

impl Difficulty {
    pub fn display_name(&self) -> &str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn all() -> Vec<Difficulty> {
        vec![Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }

    fn profile(self) -> AiProfile {
        match self {
            Difficulty::Easy => AiProfile {
                distance_stddev: 18.0,
                lateral_stddev: 8.0,
                blunder_rate: 0.12,
                blunder_distance: 60.0,
            },
            Difficulty::Medium => AiProfile {
                distance_stddev: 9.0,
                lateral_stddev: 4.0,
                blunder_rate: 0.05,
                blunder_distance: 40.0,
            },
            Difficulty::Hard => AiProfile {
                distance_stddev: 3.0,
                lateral_stddev: 1.5,
                blunder_rate: 0.02,
                blunder_distance: 25.0,
            },
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty '{0}'")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(UnknownDifficulty(s.to_string())),
        }
    }
}

pub struct AiController {
    name: String,
    profile: AiProfile,
    table: TableConfig,
    physics: PhysicsConfig,
    think_delay: f32,
    spin_chance: f64,

    plan: VecDeque<PlayerAction>,
    wait: f32,
    turn: Option<u32>,
    target_distance: f32,

    // Learned correction along the scoring axis
    distance_bias: f32,

    rng: StdRng,
}

impl AiController {
    pub fn new(difficulty: Difficulty, config: &Config) -> Self {
        Self::with_rng(difficulty, config, StdRng::from_entropy())
    }

    pub fn with_seed(difficulty: Difficulty, config: &Config, seed: u64) -> Self {
        Self::with_rng(difficulty, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(difficulty: Difficulty, config: &Config, rng: StdRng) -> Self {
        Self {
            name: format!("AI ({})", difficulty),
            profile: difficulty.profile(),
            table: config.table.clone(),
            physics: config.physics.clone(),
            think_delay: config.ai.think_delay_ms as f32 / 1000.0,
            spin_chance: f64::from(config.ai.spin_chance.clamp(0.0, 1.0)),
            plan: VecDeque::new(),
            wait: 0.0,
            turn: None,
            target_distance: 0.0,
            distance_bias: 0.0,
            rng,
        }
    }

    fn sample(&mut self, stddev: f32) -> f32 {
        Normal::new(0.0, stddev)
            .map(|normal| normal.sample(&mut self.rng))
            .unwrap_or(0.0)
    }

    fn prepare_throw(&mut self) {
        let mut distance_error = self.sample(self.profile.distance_stddev) + self.distance_bias;
        if self.rng.gen_bool(self.profile.blunder_rate) {
            distance_error += self.profile.blunder_distance;
            debug!("{} misjudges this one", self.name);
        }
        let lateral_error = self.sample(self.profile.lateral_stddev);

        let mut plan = match plan_throw(&self.table, &self.physics, distance_error, lateral_error) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("{} has nothing to aim at ({}), throwing straight", self.name, e);
                straight_throw(&self.table, &self.physics)
            }
        };
        if plan.clamped {
            debug!("{} cannot reach the target, throwing as hard as allowed", self.name);
        }

        if self.rng.gen_bool(self.spin_chance) {
            plan.spin = Some(Spin {
                angle: self.rng.gen_range(-0.3..0.3),
                velocity: self.rng.gen_range(2.0..6.0),
            });
        }

        // Clamped plans carry no aim error
        self.target_distance = if plan.clamped {
            plan.distance
        } else {
            plan.distance - distance_error
        };
        self.plan.push_back(PlayerAction::Move(plan.position));
        self.plan.push_back(PlayerAction::Throw(plan.force));
        if let Some(spin) = plan.spin {
            self.plan.push_back(PlayerAction::Spin {
                angle: spin.angle,
                velocity: spin.velocity,
            });
        }
    }
}

impl Controller for AiController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Ai
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn handle_new_throw(&mut self, turn_id: u32) {
        self.turn = Some(turn_id);
        self.plan.clear();
        self.wait = self.think_delay;
        self.prepare_throw();
    }

    fn request_new_throw(&mut self) {
        // The AI always lets its puck come to rest
    }

    fn on_puck_resting(&mut self, rest: &PuckRest) {
        if self.turn != Some(rest.turn_id) {
            return;
        }
        self.turn = None;

        let forward = self.table.scoring_axis.normalize_or_zero();
        let travelled = (rest.position - self.table.start_position).dot(forward);
        let miss = self.target_distance - travelled;
        self.distance_bias =
            (self.distance_bias + miss * BIAS_LEARNING_RATE).clamp(-MAX_BIAS, MAX_BIAS);
        debug!("{} missed by {:.1}, bias now {:.1}", self.name, miss, self.distance_bias);
    }

    fn next_action(&mut self, dt: f32) -> Option<PlayerAction> {
        if self.plan.is_empty() {
            return None;
        }
        self.wait -= dt;
        if self.wait > 0.0 {
            return None;
        }
        self.wait = ACTION_GAP_SECS;
        self.plan.pop_front()
    }
}
