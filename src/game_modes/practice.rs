// Practice mode - one player, no opponent, no match
// Every rest hands out the next puck and reports where the last one landed.

use std::time::Instant;

use glam::Vec3;
use tracing::{info, warn};

use crate::config::Config;
use crate::controller::{Controller, PlayerAction};
use crate::game::scoring::zone_points;
use crate::game::{EventBus, PuckColor, SlidingWorld, Table};
use crate::network::SyncLimits;
use crate::session::perform;

use super::common::{limit_frame_rate, Pace};

// A throw not finished within this much game time is abandoned
const MAX_THROW_SECS: f32 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrowReport {
    pub turn_id: u32,
    pub position: Vec3,
    /// Zone points; `None` outside every zone
    pub points: Option<u32>,
    pub destroyed: bool,
}

/// Let `controller` throw `throws` pucks of `color`
pub fn run_practice(
    config: &Config,
    mut controller: Box<dyn Controller>,
    color: PuckColor,
    throws: u32,
    pace: Pace,
) -> anyhow::Result<Vec<ThrowReport>> {
    info!("Practice: {} throws for {}", throws, controller.name());

    let mut table = Table::new(config, Box::new(SlidingWorld::new(&config.physics)), EventBus::new());
    let limits = SyncLimits::from_physics(&config.physics);
    let mut reports = Vec::new();

    for turn_id in 1..=throws {
        table.spawn_puck(color, turn_id);
        controller.handle_new_throw(turn_id);

        let mut elapsed = 0.0;
        let report = 'throw: loop {
            let frame_start = Instant::now();

            while let Some(action) = controller.next_action(pace.dt) {
                let Some(puck) = table.puck_mut(turn_id) else {
                    break;
                };
                if perform(puck, action, &limits) == Some(PlayerAction::RequestNewThrow) {
                    break 'throw None;
                }
            }

            for outcome in table.tick(pace.dt) {
                if outcome.rest.turn_id != turn_id {
                    continue;
                }
                controller.on_puck_resting(&outcome.rest);
                break 'throw Some(ThrowReport {
                    turn_id,
                    position: outcome.rest.position,
                    points: if outcome.destroyed {
                        None
                    } else {
                        zone_points(&table.config().zones, outcome.rest.position)
                    },
                    destroyed: outcome.destroyed,
                });
            }

            elapsed += pace.dt;
            if elapsed > MAX_THROW_SECS {
                warn!("Throw {} never came to rest, skipping it", turn_id);
                break None;
            }
            limit_frame_rate(frame_start, &pace);
        };

        match report {
            Some(report) => {
                match report.points {
                    Some(points) => println!("Throw {}: {} points", turn_id, points),
                    None if report.destroyed => println!("Throw {}: off the table", turn_id),
                    None => println!("Throw {}: no score", turn_id),
                }
                reports.push(report);
            }
            None => println!("Throw {}: taken back", turn_id),
        }
    }

    let total: u32 = reports.iter().filter_map(|r| r.points).sum();
    info!("Practice finished with {} points from {} throws", total, reports.len());
    Ok(reports)
}
