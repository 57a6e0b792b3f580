use glam::{Vec2, Vec3};
use tracing::{debug, info};

use super::events::{EventBus, GameEvent};
use super::physics::BodyFactory;
use super::puck::{Puck, PuckColor, PuckRest, PuckState};
use super::scoring::{calculate_round_score, RoundScore, ScoredPuck};
use crate::config::{Config, PhysicsConfig, TableConfig};

// Rows of the bowling triangle, front pin first
const BOWLING_ROWS: usize = 4;

/// Position of one puck, as carried by a sync message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuckSnapshot {
    pub turn_id: u32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    Puck(u32),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestOutcome {
    pub rest: PuckRest,
    /// Removed by the killing volume
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pin {
    pub position: Vec3,
    pub standing: bool,
}

/// The playing surface: live pucks, scoring geometry and the killing volume
pub struct Table {
    pucks: Vec<Puck>,
    pins: Vec<Pin>,
    config: TableConfig,
    physics: PhysicsConfig,
    factory: Box<dyn BodyFactory>,
    bus: EventBus,
    kills_on_rest: bool,
}

impl Table {
    pub fn new(config: &Config, factory: Box<dyn BodyFactory>, bus: EventBus) -> Self {
        Self {
            pucks: Vec::new(),
            pins: Vec::new(),
            config: config.table.clone(),
            physics: config.physics.clone(),
            factory,
            bus,
            kills_on_rest: true,
        }
    }

    /// With this off, pucks only leave the table when a synced position puts
    /// them in the killing volume. The non-authoritative peer runs this way.
    pub fn set_kills_on_rest(&mut self, enabled: bool) {
        self.kills_on_rest = enabled;
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn pucks(&self) -> &[Puck] {
        &self.pucks
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn puck(&self, turn_id: u32) -> Option<&Puck> {
        self.pucks.iter().find(|p| p.turn_id == turn_id)
    }

    pub fn puck_mut(&mut self, turn_id: u32) -> Option<&mut Puck> {
        self.pucks.iter_mut().find(|p| p.turn_id == turn_id)
    }

    pub fn any_moving(&self) -> bool {
        self.pucks.iter().any(Puck::is_moving)
    }

    /// Place a new puck at the start position; a puck never released is superseded
    pub fn spawn_puck(&mut self, color: PuckColor, turn_id: u32) -> &mut Puck {
        self.pucks.retain(|p| {
            let superseded = p.state() == PuckState::Setup;
            if superseded {
                debug!("Puck of turn {} superseded before release", p.turn_id);
            }
            !superseded
        });

        let radius = self.physics.puck_radius;
        let body = self.factory.spawn(self.config.start_position, radius);
        self.pucks.push(Puck::new(color, turn_id, radius, body));
        let index = self.pucks.len() - 1;
        &mut self.pucks[index]
    }

    pub fn clear_pucks(&mut self) {
        self.pucks.clear();
    }

    /// Advance every puck; reports the ones that came to rest this tick
    pub fn tick(&mut self, dt: f32) -> Vec<RestOutcome> {
        let mut outcomes = Vec::new();
        for puck in &mut self.pucks {
            if let Some(rest) = puck.tick(dt, &self.physics) {
                let destroyed = self.kills_on_rest && rest.bounds.intersects(&self.config.killing_volume);
                outcomes.push(RestOutcome { rest, destroyed });
            }
        }

        for outcome in &outcomes {
            let rest = outcome.rest;
            if outcome.destroyed {
                self.pucks.retain(|p| p.turn_id != rest.turn_id);
                info!("Puck of turn {} fell off the table", rest.turn_id);
                self.bus.publish(GameEvent::PuckDestroyed {
                    turn_id: rest.turn_id,
                    color: rest.color,
                });
            } else {
                self.bus.publish(GameEvent::PuckRested {
                    turn_id: rest.turn_id,
                    color: rest.color,
                    position: rest.position,
                });
            }
        }

        self.knock_pins();
        outcomes
    }

    fn knock_pins(&mut self) {
        if self.pins.is_empty() {
            return;
        }

        let reach = self.config.bowling_pin_radius + self.physics.puck_radius;
        for puck in self.pucks.iter().filter(|p| p.is_moving()) {
            let at = puck.position().truncate();
            for (index, pin) in self.pins.iter_mut().enumerate() {
                if pin.standing && at.distance(pin.position.truncate()) <= reach {
                    pin.standing = false;
                    debug!("Pin {} knocked by puck of turn {}", index, puck.turn_id);
                    self.bus.publish(GameEvent::PinKnocked { index });
                }
            }
        }
    }

    /// Positions for a sync message; `All` leaves out pucks still on the start line
    pub fn snapshot(&self, target: SyncTarget) -> Vec<PuckSnapshot> {
        self.pucks
            .iter()
            .filter(|p| match target {
                SyncTarget::Puck(turn_id) => p.turn_id == turn_id,
                SyncTarget::All => p.state() != PuckState::Setup,
            })
            .map(|p| PuckSnapshot {
                turn_id: p.turn_id,
                position: p.position(),
            })
            .collect()
    }

    /// Snap pucks to authoritative positions; unknown turn ids are skipped
    pub fn apply_sync(&mut self, entries: &[PuckSnapshot]) -> usize {
        let mut applied = 0;
        for entry in entries {
            match self.puck_mut(entry.turn_id) {
                Some(puck) => {
                    let drift = puck.position().distance(entry.position);
                    if drift > 0.0 {
                        debug!("Correcting puck {} drift of {:.6}", entry.turn_id, drift);
                    }
                    puck.correct_position(entry.position);
                    applied += 1;
                }
                None => debug!("Sync for unknown puck {}", entry.turn_id),
            }
        }

        if !self.kills_on_rest {
            self.remove_killed();
        }
        applied
    }

    fn remove_killed(&mut self) {
        let killing_volume = self.config.killing_volume;
        let (killed, kept): (Vec<Puck>, Vec<Puck>) = std::mem::take(&mut self.pucks)
            .into_iter()
            .partition(|p| p.state() != PuckState::Setup && p.bounding_box().intersects(&killing_volume));
        self.pucks = kept;

        for puck in killed {
            info!("Puck of turn {} fell off the table", puck.turn_id);
            self.bus.publish(GameEvent::PuckDestroyed {
                turn_id: puck.turn_id,
                color: puck.color,
            });
        }
    }

    pub fn scored_pucks(&self) -> Vec<ScoredPuck> {
        self.pucks
            .iter()
            .map(|p| ScoredPuck {
                color: p.color,
                position: p.position(),
            })
            .collect()
    }

    pub fn round_score(&self) -> RoundScore {
        calculate_round_score(&self.scored_pucks(), &self.config.zones, self.config.scoring_axis)
    }

    /// Highest score one round can produce
    pub fn max_round_points(&self, pucks_per_player: u32) -> u32 {
        let best = self.config.zones.iter().map(|z| z.points).max().unwrap_or(0);
        best * pucks_per_player
    }

    /// Stand ten pins in a triangle pointing back at the thrower
    pub fn setup_bowling(&mut self) -> usize {
        let center = self.config.bowling_center;
        let spacing = self.config.bowling_pin_spacing;
        let forward = self.config.scoring_axis.truncate().normalize_or(Vec2::X);
        let side = forward.perp();

        // Row depth of an equilateral triangle
        let row_depth = spacing * 3f32.sqrt() / 2.0;
        let first_row = -row_depth * (BOWLING_ROWS as f32 - 1.0) / 2.0;

        self.pins.clear();
        for row in 0..BOWLING_ROWS {
            let depth = first_row + row as f32 * row_depth;
            for slot in 0..=row {
                let offset = (slot as f32 - row as f32 / 2.0) * spacing;
                let at = center.truncate() + forward * depth + side * offset;
                self.pins.push(Pin {
                    position: at.extend(center.z),
                    standing: true,
                });
            }
        }

        info!("Bowling setup with {} pins", self.pins.len());
        self.bus.publish(GameEvent::BowlingSetup {
            pins: self.pins.len(),
        });
        self.pins.len()
    }

    pub fn standing_pins(&self) -> usize {
        self.pins.iter().filter(|p| p.standing).count()
    }
}
