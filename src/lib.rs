// p2shuffle - two-player table shuffleboard over a chat channel

pub mod config;
pub mod controller;
pub mod game;
pub mod game_modes;
pub mod logging;
pub mod network;
pub mod session;

pub use session::{PeerLink, Session, SessionError};
