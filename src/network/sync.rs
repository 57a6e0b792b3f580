// Receiver-side validation of gameplay commands
// Nothing from the peer touches the table before passing through here

use glam::Vec3;
use tracing::{debug, warn};

use super::protocol::{ChatCommand, ProtocolError};
use crate::config::PhysicsConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncLimits {
    pub throw_force_max: f32,
    pub max_position: f32,
}

impl SyncLimits {
    pub fn from_physics(physics: &PhysicsConfig) -> Self {
        Self {
            throw_force_max: physics.throw_force_max,
            max_position: physics.max_position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Current,
    /// Belongs to a turn already played; drop silently
    Stale,
}

/// Check a command against the local turn counter and the physical limits
pub fn validate(
    command: &ChatCommand,
    counter: u32,
    limits: &SyncLimits,
) -> Result<Freshness, ProtocolError> {
    let Some(turn) = command.turn() else {
        return Ok(Freshness::Current);
    };

    if turn < counter {
        debug!("Dropping stale {} for turn {} (counter {})", command.name(), turn, counter);
        return Ok(Freshness::Stale);
    }
    if turn > counter {
        return Err(violation(ProtocolError::TurnAhead {
            command: command.name(),
            turn,
            counter,
        }));
    }

    match command {
        ChatCommand::Move { position, .. } => check_position("move", *position, limits)?,
        ChatCommand::Throw { force, .. } => check_magnitude("throw", force.length(), limits)?,
        ChatCommand::Spin { angle, velocity, .. } => {
            if !angle.is_finite() {
                return Err(violation(ProtocolError::ForceOutOfRange {
                    command: "spin",
                    magnitude: *angle,
                    max: limits.throw_force_max,
                }));
            }
            check_magnitude("spin", velocity.abs(), limits)?;
        }
        ChatCommand::Sync { pucks, .. } => {
            for puck in pucks {
                check_position("sync", puck.position, limits)?;
            }
        }
        _ => {}
    }

    Ok(Freshness::Current)
}

fn check_magnitude(command: &'static str, magnitude: f32, limits: &SyncLimits) -> Result<(), ProtocolError> {
    // NaN fails the comparison too
    if magnitude <= limits.throw_force_max {
        Ok(())
    } else {
        Err(violation(ProtocolError::ForceOutOfRange {
            command,
            magnitude,
            max: limits.throw_force_max,
        }))
    }
}

fn check_position(command: &'static str, position: Vec3, limits: &SyncLimits) -> Result<(), ProtocolError> {
    if position.is_finite() && position.abs().max_element() <= limits.max_position {
        Ok(())
    } else {
        Err(violation(ProtocolError::PositionOutOfRange { command, position }))
    }
}

fn violation(error: ProtocolError) -> ProtocolError {
    warn!("Protocol violation: {}", error);
    error
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::game::table::PuckSnapshot;

    fn limits() -> SyncLimits {
        SyncLimits::from_physics(&PhysicsConfig::default())
    }

    fn throw(turn: u32, fx: f32) -> ChatCommand {
        ChatCommand::Throw {
            turn,
            force: Vec2::new(fx, 0.0),
        }
    }

    #[test]
    fn test_stale_commands_dropped_silently() {
        let stale = [
            throw(2, 50.0),
            ChatCommand::Move {
                turn: 2,
                position: Vec3::ZERO,
            },
            ChatCommand::Sync {
                turn: 2,
                pucks: vec![],
            },
            ChatCommand::Turn { turn: 2 },
        ];
        for command in &stale {
            assert_eq!(validate(command, 3, &limits()), Ok(Freshness::Stale));
        }
    }

    #[test]
    fn test_stale_check_precedes_range_checks() {
        assert_eq!(validate(&throw(1, 1e9), 3, &limits()), Ok(Freshness::Stale));
    }

    #[test]
    fn test_future_turn_is_violation() {
        assert!(matches!(
            validate(&ChatCommand::Turn { turn: 4 }, 3, &limits()),
            Err(ProtocolError::TurnAhead { turn: 4, counter: 3, .. })
        ));
    }

    #[test]
    fn test_force_limits() {
        assert_eq!(validate(&throw(3, 150.0), 3, &limits()), Ok(Freshness::Current));
        assert!(validate(&throw(3, 151.0), 3, &limits()).is_err());
        assert!(validate(&throw(3, f32::NAN), 3, &limits()).is_err());

        let spin = |velocity: f32| ChatCommand::Spin {
            turn: 3,
            angle: 0.3,
            velocity,
        };
        assert!(validate(&spin(-20.0), 3, &limits()).is_ok());
        assert!(validate(&spin(-200.0), 3, &limits()).is_err());
    }

    #[test]
    fn test_position_limits() {
        let at = |position: Vec3| ChatCommand::Move { turn: 3, position };
        assert!(validate(&at(Vec3::new(999.0, -999.0, 0.0)), 3, &limits()).is_ok());
        assert!(validate(&at(Vec3::new(1001.0, 0.0, 0.0)), 3, &limits()).is_err());
        assert!(validate(&at(Vec3::new(f32::INFINITY, 0.0, 0.0)), 3, &limits()).is_err());

        let sync = ChatCommand::Sync {
            turn: 3,
            pucks: vec![
                PuckSnapshot {
                    turn_id: 2,
                    position: Vec3::ZERO,
                },
                PuckSnapshot {
                    turn_id: 3,
                    position: Vec3::new(0.0, f32::NAN, 0.0),
                },
            ],
        };
        assert!(matches!(
            validate(&sync, 3, &limits()),
            Err(ProtocolError::PositionOutOfRange { command: "sync", .. })
        ));
    }

    #[test]
    fn test_unstamped_commands_pass() {
        assert_eq!(validate(&ChatCommand::Bowl, 9, &limits()), Ok(Freshness::Current));
        assert_eq!(
            validate(&ChatCommand::Heartbeat { seq: 0 }, 9, &limits()),
            Ok(Freshness::Current)
        );
    }
}
