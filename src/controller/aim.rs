// Throw planning: where to place the puck and how hard to throw it

use glam::{Vec2, Vec3};

use crate::config::{PhysicsConfig, TableConfig};
use crate::game::physics::{force_for_distance, slide_distance};
use crate::game::puck::Spin;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrowPlan {
    /// Placement on the start line
    pub position: Vec3,
    pub force: Vec2,
    pub spin: Option<Spin>,
    /// Distance along the scoring axis the plan aims for
    pub distance: f32,
    /// The target needed more than the maximum force; `force` is the maximum
    pub clamped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum AimError {
    #[error("table has no scoring zones")]
    NoZones,
}

/// Aim at the middle of the most valuable zone, shifted by the given errors
///
/// A target beyond reach gets the hardest allowed throw instead.
pub fn plan_throw(
    table: &TableConfig,
    physics: &PhysicsConfig,
    distance_error: f32,
    lateral_error: f32,
) -> Result<ThrowPlan, AimError> {
    let zone = table
        .zones
        .iter()
        .max_by_key(|z| z.points)
        .ok_or(AimError::NoZones)?;

    let forward = table.scoring_axis.truncate().normalize_or(Vec2::X);
    let side = forward.perp();

    let offset = (zone.bounds.center() - table.start_position).truncate();
    let distance = (offset.dot(forward) + distance_error).max(0.0);
    let lateral = offset.dot(side) + lateral_error;

    let position = table.start_position + (side * lateral).extend(0.0);
    let strength = force_for_distance(distance, physics.puck_mass, physics.friction_deceleration);
    if strength > physics.throw_force_max {
        return Ok(full_force(position, forward, physics));
    }

    Ok(ThrowPlan {
        position,
        force: forward * strength,
        spin: None,
        distance,
        clamped: false,
    })
}

/// Hardest allowed throw straight down the table from the start position
pub fn straight_throw(table: &TableConfig, physics: &PhysicsConfig) -> ThrowPlan {
    let forward = table.scoring_axis.truncate().normalize_or(Vec2::X);
    full_force(table.start_position, forward, physics)
}

fn full_force(position: Vec3, forward: Vec2, physics: &PhysicsConfig) -> ThrowPlan {
    let strength = physics.throw_force_max;
    ThrowPlan {
        position,
        force: forward * strength,
        spin: None,
        distance: slide_distance(strength, physics.puck_mass, physics.friction_deceleration),
        clamped: true,
    }
}
