mod common;
mod local;
mod network;
mod practice;

pub use common::{announce, limit_frame_rate, MatchSummary, Pace};
pub use local::run_game_local;
pub use network::{run_game_network, run_handshake, Invitation};
pub use practice::{run_practice, ThrowReport};
