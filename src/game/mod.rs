pub mod bounds;
pub mod events;
pub mod physics;
pub mod puck;
pub mod scoring;
pub mod state;
pub mod table;

pub use bounds::Aabb;
pub use events::{EventBus, GameEvent};
pub use physics::{BodyFactory, PuckBody, SlidingBody, SlidingWorld};
pub use puck::{Puck, PuckColor, PuckRest, PuckState};
pub use scoring::{calculate_round_score, RoundScore, ScoringZone};
pub use state::{Match, MatchError, MatchState, ScoringAuthority, TurnOutcome};
pub use table::{PuckSnapshot, RestOutcome, SyncTarget, Table};
