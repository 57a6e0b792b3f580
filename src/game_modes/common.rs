//! Common utilities shared across all game modes
//!
//! Loop pacing, match summaries and the progress lines printed for the player.

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::DisplayConfig;
use crate::game::{GameEvent, Match, MatchState, PuckColor};

/// How a game mode paces its tick loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pace {
    /// Simulated seconds per tick
    pub dt: f32,

    /// Wall-clock length of a frame; `None` runs ticks back to back
    pub frame: Option<Duration>,
}

impl Pace {
    pub fn realtime(display: &DisplayConfig) -> Self {
        let fps = display.target_fps.max(1);
        Self {
            dt: 1.0 / fps as f32,
            frame: Some(Duration::from_secs_f64(1.0 / fps as f64)),
        }
    }

    /// Same simulation steps without sleeping
    pub fn fast(display: &DisplayConfig) -> Self {
        Self {
            frame: None,
            ..Self::realtime(display)
        }
    }
}

/// Apply frame rate limiting to maintain consistent game speed.
///
/// Call at the end of each loop iteration; sleeps for whatever is left of the
/// frame when it finished early. Does nothing for a fast pace.
pub fn limit_frame_rate(frame_start: Instant, pace: &Pace) {
    let Some(frame) = pace.frame else {
        return;
    };
    let elapsed = frame_start.elapsed();
    if elapsed < frame {
        std::thread::sleep(frame - elapsed);
    }
}

/// Standings when a game mode returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub winner: Option<PuckColor>,
    pub red: u32,
    pub blue: u32,
    pub rounds: u32,
    pub abandoned: bool,
}

impl MatchSummary {
    pub fn from_match(game: &Match, abandoned: bool) -> Self {
        let winner = match game.state() {
            MatchState::WinnerDeclared => game.last_round_score().winner,
            _ => None,
        };
        Self {
            winner,
            red: game.score(PuckColor::Red),
            blue: game.score(PuckColor::Blue),
            rounds: game.round(),
            abandoned,
        }
    }
}

/// Print match progress for the player
pub fn announce(event: &GameEvent) {
    match event {
        GameEvent::RoundStarted { round, first } => {
            info!("Round {} started, {} throws first", round, first);
        }
        GameEvent::RoundScored { score, red, blue } => match score.winner {
            Some(color) => println!(
                "{} takes the round with {} (Red {} - Blue {})",
                color, score.points, red, blue
            ),
            None => println!("Nobody scored this round (Red {} - Blue {})", red, blue),
        },
        GameEvent::WinnerDeclared { color, score } => {
            println!("{} wins the match with {} points!", color, score);
        }
        GameEvent::BowlingSetup { pins } => println!("{} pins set up", pins),
        GameEvent::MatchAbandoned { reason } => println!("Match abandoned: {}", reason),
        _ => {}
    }
}
