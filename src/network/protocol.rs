// Chat command protocol
// Every command is a single line of space-separated tokens; the first token names it.
// Floats are carried as decimal bit patterns (see codec).

use std::fmt;

use glam::{Vec2, Vec3};

use super::codec::{decode_f32, decode_vec2, decode_vec3, encode_f32, encode_vec2, encode_vec3};
use crate::game::puck::PuckColor;
use crate::game::scoring::RoundScore;
use crate::game::table::PuckSnapshot;

// Ints per sync entry: turn id plus three coordinates
const SYNC_ENTRY_LEN: usize = 4;

/// Messages exchanged between peers as chat text
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Handshake step 1
    TravelSyn { syn: i32 },

    /// Handshake step 2
    TravelSynAck { syn: i32, ack: i32 },

    /// Handshake step 3
    TravelAck { syn: i32, ack: i32 },

    /// Receiver committed
    Travel,

    /// Advance past turn `turn`
    Turn { turn: u32 },

    /// Reposition the active puck before release
    Move { turn: u32, position: Vec3 },

    Throw { turn: u32, force: Vec2 },

    Spin { turn: u32, angle: f32, velocity: f32 },

    /// Authoritative puck positions
    Sync { turn: u32, pucks: Vec<PuckSnapshot> },

    /// Round result computed by the host
    ScoreSync { score: RoundScore },

    Bowl,

    Heartbeat { seq: u32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command}: expected {expected} arguments, got {found}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{command}: '{value}' is not a valid number")]
    BadNumber { command: &'static str, value: String },

    #[error("score-sync: '{0}' is not a color")]
    BadColor(String),

    #[error("score-sync: empty round with {0} points")]
    PointsWithoutWinner(u32),

    #[error("{command} for turn {turn} is ahead of the local counter {counter}")]
    TurnAhead {
        command: &'static str,
        turn: u32,
        counter: u32,
    },

    #[error("{command}: magnitude {magnitude} exceeds {max}")]
    ForceOutOfRange {
        command: &'static str,
        magnitude: f32,
        max: f32,
    },

    #[error("{command}: position {position} is not finite or out of range")]
    PositionOutOfRange { command: &'static str, position: Vec3 },

    #[error("{command}: round score {points} exceeds the maximum of {max}")]
    ScoreOutOfRange {
        command: &'static str,
        points: u32,
        max: u32,
    },

    #[error("{0} is only accepted from the authoritative peer")]
    NotAuthoritative(&'static str),
}

impl ChatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ChatCommand::TravelSyn { .. } => "travel-syn",
            ChatCommand::TravelSynAck { .. } => "travel-syn-ack",
            ChatCommand::TravelAck { .. } => "travel-ack",
            ChatCommand::Travel => "travel",
            ChatCommand::Turn { .. } => "turn",
            ChatCommand::Move { .. } => "move",
            ChatCommand::Throw { .. } => "throw",
            ChatCommand::Spin { .. } => "spin",
            ChatCommand::Sync { .. } => "sync",
            ChatCommand::ScoreSync { .. } => "score-sync",
            ChatCommand::Bowl => "bowl",
            ChatCommand::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Turn stamp of gameplay commands
    pub fn turn(&self) -> Option<u32> {
        match self {
            ChatCommand::Turn { turn }
            | ChatCommand::Move { turn, .. }
            | ChatCommand::Throw { turn, .. }
            | ChatCommand::Spin { turn, .. }
            | ChatCommand::Sync { turn, .. } => Some(*turn),
            _ => None,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            ChatCommand::TravelSyn { .. }
                | ChatCommand::TravelSynAck { .. }
                | ChatCommand::TravelAck { .. }
                | ChatCommand::Travel
        )
    }

    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let mut tokens = body.split_whitespace();
        let command = tokens.next().ok_or(ProtocolError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match command {
            "travel-syn" => {
                let args = Args::exact("travel-syn", &args, 1)?;
                Ok(ChatCommand::TravelSyn { syn: args.int(0)? })
            }
            "travel-syn-ack" => {
                let args = Args::exact("travel-syn-ack", &args, 2)?;
                Ok(ChatCommand::TravelSynAck {
                    syn: args.int(0)?,
                    ack: args.int(1)?,
                })
            }
            "travel-ack" => {
                let args = Args::exact("travel-ack", &args, 2)?;
                Ok(ChatCommand::TravelAck {
                    syn: args.int(0)?,
                    ack: args.int(1)?,
                })
            }
            "travel" => {
                Args::exact("travel", &args, 0)?;
                Ok(ChatCommand::Travel)
            }
            "turn" => {
                let args = Args::exact("turn", &args, 1)?;
                Ok(ChatCommand::Turn { turn: args.uint(0)? })
            }
            "move" => {
                let args = Args::exact("move", &args, 4)?;
                Ok(ChatCommand::Move {
                    turn: args.uint(0)?,
                    position: decode_vec3([args.int(1)?, args.int(2)?, args.int(3)?]),
                })
            }
            "throw" => {
                let args = Args::exact("throw", &args, 3)?;
                Ok(ChatCommand::Throw {
                    turn: args.uint(0)?,
                    force: decode_vec2([args.int(1)?, args.int(2)?]),
                })
            }
            "spin" => {
                let args = Args::exact("spin", &args, 3)?;
                Ok(ChatCommand::Spin {
                    turn: args.uint(0)?,
                    angle: decode_f32(args.int(1)?),
                    velocity: decode_f32(args.int(2)?),
                })
            }
            "sync" => parse_sync(&args),
            "score-sync" => {
                let args = Args::exact("score-sync", &args, 2)?;
                let points = args.uint(1)?;
                let winner = match args.raw(0) {
                    "none" => None,
                    color => Some(
                        color
                            .parse::<PuckColor>()
                            .map_err(|_| ProtocolError::BadColor(color.to_string()))?,
                    ),
                };
                if winner.is_none() && points != 0 {
                    return Err(ProtocolError::PointsWithoutWinner(points));
                }
                Ok(ChatCommand::ScoreSync {
                    score: RoundScore { winner, points },
                })
            }
            "bowl" => {
                Args::exact("bowl", &args, 0)?;
                Ok(ChatCommand::Bowl)
            }
            "heartbeat" => {
                let args = Args::exact("heartbeat", &args, 1)?;
                Ok(ChatCommand::Heartbeat { seq: args.uint(0)? })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_sync(args: &[&str]) -> Result<ChatCommand, ProtocolError> {
    if args.len() < 2 {
        return Err(ProtocolError::ArgumentCount {
            command: "sync",
            expected: 2,
            found: args.len(),
        });
    }

    let header = Args { command: "sync", args };
    let turn = header.uint(0)?;
    let count = header.uint(1)? as usize;

    let expected = count
        .checked_mul(SYNC_ENTRY_LEN)
        .and_then(|n| n.checked_add(2))
        .unwrap_or(usize::MAX);
    let args = Args::exact("sync", args, expected)?;

    let pucks = (0..count)
        .map(|i| {
            let at = 2 + i * SYNC_ENTRY_LEN;
            Ok(PuckSnapshot {
                turn_id: args.uint(at)?,
                position: decode_vec3([args.int(at + 1)?, args.int(at + 2)?, args.int(at + 3)?]),
            })
        })
        .collect::<Result<Vec<_>, ProtocolError>>()?;

    Ok(ChatCommand::Sync { turn, pucks })
}

struct Args<'a> {
    command: &'static str,
    args: &'a [&'a str],
}

impl<'a> Args<'a> {
    fn exact(command: &'static str, args: &'a [&'a str], expected: usize) -> Result<Self, ProtocolError> {
        if args.len() != expected {
            return Err(ProtocolError::ArgumentCount {
                command,
                expected,
                found: args.len(),
            });
        }
        Ok(Self { command, args })
    }

    fn raw(&self, index: usize) -> &'a str {
        self.args[index]
    }

    fn int(&self, index: usize) -> Result<i32, ProtocolError> {
        self.args[index].parse().map_err(|_| self.bad(index))
    }

    fn uint(&self, index: usize) -> Result<u32, ProtocolError> {
        self.args[index].parse().map_err(|_| self.bad(index))
    }

    fn bad(&self, index: usize) -> ProtocolError {
        ProtocolError::BadNumber {
            command: self.command,
            value: self.args[index].to_string(),
        }
    }
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            ChatCommand::TravelSyn { syn } => write!(f, " {}", syn),
            ChatCommand::TravelSynAck { syn, ack } | ChatCommand::TravelAck { syn, ack } => {
                write!(f, " {} {}", syn, ack)
            }
            ChatCommand::Travel | ChatCommand::Bowl => Ok(()),
            ChatCommand::Turn { turn } => write!(f, " {}", turn),
            ChatCommand::Move { turn, position } => {
                let [x, y, z] = encode_vec3(*position);
                write!(f, " {} {} {} {}", turn, x, y, z)
            }
            ChatCommand::Throw { turn, force } => {
                let [x, y] = encode_vec2(*force);
                write!(f, " {} {} {}", turn, x, y)
            }
            ChatCommand::Spin { turn, angle, velocity } => {
                write!(f, " {} {} {}", turn, encode_f32(*angle), encode_f32(*velocity))
            }
            ChatCommand::Sync { turn, pucks } => {
                write!(f, " {} {}", turn, pucks.len())?;
                for puck in pucks {
                    let [x, y, z] = encode_vec3(puck.position);
                    write!(f, " {} {} {} {}", puck.turn_id, x, y, z)?;
                }
                Ok(())
            }
            ChatCommand::ScoreSync { score } => match score.winner {
                Some(color) => write!(f, " {} {}", color.as_str().to_ascii_lowercase(), score.points),
                None => write!(f, " none {}", score.points),
            },
            ChatCommand::Heartbeat { seq } => write!(f, " {}", seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throw_wire_format() {
        let cmd = ChatCommand::Throw {
            turn: 3,
            force: Vec2::new(1.0, -2.0),
        };
        // 1.0 = 0x3f800000, -2.0 = 0xc0000000
        assert_eq!(cmd.to_string(), "throw 3 1065353216 -1073741824");
        assert_eq!(ChatCommand::parse("throw 3 1065353216 -1073741824"), Ok(cmd));
    }

    #[test]
    fn test_handshake_commands() {
        assert_eq!(
            ChatCommand::parse("travel-syn-ack 7 -2147483648"),
            Ok(ChatCommand::TravelSynAck {
                syn: 7,
                ack: i32::MIN
            })
        );
        assert_eq!(ChatCommand::parse("travel"), Ok(ChatCommand::Travel));
        assert_eq!(ChatCommand::TravelAck { syn: 1, ack: 2 }.to_string(), "travel-ack 1 2");
    }

    #[test]
    fn test_sync_with_entries() {
        let cmd = ChatCommand::Sync {
            turn: 5,
            pucks: vec![
                PuckSnapshot {
                    turn_id: 4,
                    position: Vec3::new(240.0, -1.5, 0.0),
                },
                PuckSnapshot {
                    turn_id: 5,
                    position: Vec3::new(12.25, 0.0, -0.0),
                },
            ],
        };
        let text = cmd.to_string();
        assert!(text.starts_with("sync 5 2 4 "));
        assert_eq!(ChatCommand::parse(&text), Ok(cmd));
    }

    #[test]
    fn test_sync_count_must_match_entries() {
        assert!(matches!(
            ChatCommand::parse("sync 5 2 4 0 0 0"),
            Err(ProtocolError::ArgumentCount { command: "sync", .. })
        ));
        assert!(matches!(
            ChatCommand::parse("sync 5"),
            Err(ProtocolError::ArgumentCount { .. })
        ));
        // Huge count does not overflow
        assert!(ChatCommand::parse("sync 5 4294967295").is_err());
        assert_eq!(
            ChatCommand::parse("sync 2 0"),
            Ok(ChatCommand::Sync {
                turn: 2,
                pucks: vec![]
            })
        );
    }

    #[test]
    fn test_score_sync() {
        let red = ChatCommand::ScoreSync {
            score: RoundScore {
                winner: Some(PuckColor::Red),
                points: 4,
            },
        };
        assert_eq!(red.to_string(), "score-sync red 4");
        assert_eq!(ChatCommand::parse("score-sync red 4"), Ok(red));

        let empty = ChatCommand::ScoreSync {
            score: RoundScore::none(),
        };
        assert_eq!(empty.to_string(), "score-sync none 0");
        assert_eq!(ChatCommand::parse("score-sync none 0"), Ok(empty));

        assert_eq!(
            ChatCommand::parse("score-sync none 3"),
            Err(ProtocolError::PointsWithoutWinner(3))
        );
        assert!(matches!(
            ChatCommand::parse("score-sync green 3"),
            Err(ProtocolError::BadColor(_))
        ));
    }

    #[test]
    fn test_malformed_messages() {
        assert_eq!(ChatCommand::parse("   "), Err(ProtocolError::Empty));
        assert!(matches!(
            ChatCommand::parse("dance 1"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            ChatCommand::parse("move 1 2 3"),
            Err(ProtocolError::ArgumentCount {
                command: "move",
                expected: 4,
                found: 3
            })
        ));
        assert!(matches!(
            ChatCommand::parse("turn -1"),
            Err(ProtocolError::BadNumber { command: "turn", .. })
        ));
        assert!(matches!(
            ChatCommand::parse("throw 1 1.5 0"),
            Err(ProtocolError::BadNumber { .. })
        ));
        assert!(ChatCommand::parse("travel extra").is_err());
    }

    #[test]
    fn test_turn_stamp() {
        assert_eq!(ChatCommand::Turn { turn: 9 }.turn(), Some(9));
        assert_eq!(ChatCommand::Bowl.turn(), None);
        assert!(ChatCommand::Travel.is_handshake());
        assert!(!ChatCommand::Heartbeat { seq: 1 }.is_handshake());
    }
}
