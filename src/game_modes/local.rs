use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::controller::Controller;
use crate::game::{MatchState, PuckColor, SlidingWorld};
use crate::session::Session;

use super::common::{announce, limit_frame_rate, MatchSummary, Pace};

/// Run a match between two controllers on this machine
///
/// Rounds follow each other until a winner is declared.
pub fn run_game_local(
    config: &Config,
    red: Box<dyn Controller>,
    blue: Box<dyn Controller>,
    pace: Pace,
) -> anyhow::Result<MatchSummary> {
    info!("Local match: {} vs {}", red.name(), blue.name());

    let mut session = Session::local(config, Box::new(SlidingWorld::new(&config.physics)));
    let events = session.bus().subscribe();
    session.seat(PuckColor::Red, red)?;
    session.seat(PuckColor::Blue, blue)?;
    session.start()?;

    loop {
        let frame_start = Instant::now();

        session.tick(pace.dt);
        for event in events.try_iter() {
            announce(&event);
        }

        match session.game().state() {
            MatchState::WinnerDeclared => break,
            MatchState::RoundEnd => session.continue_round()?,
            _ => {}
        }

        limit_frame_rate(frame_start, &pace);
    }

    Ok(MatchSummary::from_match(session.game(), false))
}
