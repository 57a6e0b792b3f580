// Match state machine
// Decides whose turn it is, when a round ends and who won the match

use tracing::{debug, error, info, warn};

use super::events::{EventBus, GameEvent};
use super::puck::PuckColor;
use super::scoring::RoundScore;
use super::table::Table;
use crate::config::RulesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Player1Turn,
    Player2Turn,
    /// Round over; the authoritative score has not arrived yet
    WaitingForPeerSync,
    RoundEnd,
    WinnerDeclared,
}

impl MatchState {
    pub fn is_between_rounds(self) -> bool {
        matches!(self, MatchState::RoundEnd | MatchState::WinnerDeclared)
    }
}

/// Who computes round scores for this copy of the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringAuthority {
    Local,
    /// Scores arrive from the peer as `score-sync`
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSlot {
    pub color: PuckColor,
    pub score: u32,
    pub pucks_to_play: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// `color` is expected to throw the puck of `turn_id`
    NewThrow { color: PuckColor, turn_id: u32 },
    RoundScored { score: RoundScore, state: MatchState },
    AwaitingPeerScore,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("match needs two players, {0} registered")]
    MissingOpponent(usize),

    #[error("{0} is already registered")]
    DuplicatePlayer(PuckColor),

    #[error("turn {requested} is ahead of the local counter {current}")]
    TurnAhead { requested: u32, current: u32 },

    #[error("cannot advance while waiting for the peer's round score")]
    AwaitingPeerScore,

    #[error("round score received in state {0:?}")]
    UnexpectedScore(MatchState),
}

#[derive(Debug)]
pub struct Match {
    state: MatchState,
    turn_counter: u32,
    round: u32,
    players: Vec<PlayerSlot>,
    first_player: Option<PuckColor>,
    active: Option<PuckColor>,
    winning_score: u32,
    pucks_per_player: u32,
    authority: ScoringAuthority,
    last_score: RoundScore,
    bus: EventBus,
}

impl Match {
    pub fn new(rules: &RulesConfig, authority: ScoringAuthority, bus: EventBus) -> Self {
        Self {
            state: MatchState::RoundEnd,
            turn_counter: 0,
            round: 0,
            players: Vec::with_capacity(2),
            first_player: None,
            active: None,
            winning_score: rules.winning_score,
            pucks_per_player: rules.pucks_per_player,
            authority,
            last_score: RoundScore::none(),
            bus,
        }
    }

    /// The first registered color is player 1
    pub fn register_player(&mut self, color: PuckColor) -> Result<(), MatchError> {
        if self.players.iter().any(|p| p.color == color) {
            return Err(MatchError::DuplicatePlayer(color));
        }
        self.players.push(PlayerSlot {
            color,
            score: 0,
            pucks_to_play: 0,
        });
        if self.first_player.is_none() {
            self.first_player = Some(color);
        }
        debug!("Registered {} as player {}", color, self.players.len());
        Ok(())
    }

    pub fn set_scoring_authority(&mut self, authority: ScoringAuthority) {
        self.authority = authority;
    }

    pub fn scoring_authority(&self) -> ScoringAuthority {
        self.authority
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn turn_counter(&self) -> u32 {
        self.turn_counter
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn players(&self) -> &[PlayerSlot] {
        &self.players
    }

    pub fn first_player(&self) -> Option<PuckColor> {
        self.first_player
    }

    pub fn active_color(&self) -> Option<PuckColor> {
        match self.state {
            MatchState::Player1Turn | MatchState::Player2Turn => self.active,
            _ => None,
        }
    }

    pub fn score(&self, color: PuckColor) -> u32 {
        self.slot(color).map(|p| p.score).unwrap_or(0)
    }

    pub fn remaining(&self, color: PuckColor) -> u32 {
        self.slot(color).map(|p| p.pucks_to_play).unwrap_or(0)
    }

    pub fn last_round_score(&self) -> RoundScore {
        self.last_score
    }

    pub fn winning_score(&self) -> u32 {
        self.winning_score
    }

    fn slot(&self, color: PuckColor) -> Option<&PlayerSlot> {
        self.players.iter().find(|p| p.color == color)
    }

    fn slot_mut(&mut self, color: PuckColor) -> Option<&mut PlayerSlot> {
        self.players.iter_mut().find(|p| p.color == color)
    }

    fn set_state(&mut self, state: MatchState) {
        if self.state != state {
            self.state = state;
            self.bus.publish(GameEvent::StateChanged { state });
        }
    }

    /// Advance only when `turn_id` is the current counter.
    ///
    /// Returns `Ok(None)` for an older id, so a rest seen locally and a `turn`
    /// from the peer advance the match once between them.
    pub fn request_next_turn(
        &mut self,
        turn_id: u32,
        table: &mut Table,
    ) -> Result<Option<TurnOutcome>, MatchError> {
        if turn_id < self.turn_counter {
            debug!("Ignoring turn {} (counter is {})", turn_id, self.turn_counter);
            return Ok(None);
        }
        if turn_id > self.turn_counter {
            warn!("Turn {} requested ahead of counter {}", turn_id, self.turn_counter);
            return Err(MatchError::TurnAhead {
                requested: turn_id,
                current: self.turn_counter,
            });
        }
        self.next_turn(table).map(Some)
    }

    pub fn next_turn(&mut self, table: &mut Table) -> Result<TurnOutcome, MatchError> {
        if self.players.len() < 2 {
            error!("Cannot advance the match without an opponent");
            return Err(MatchError::MissingOpponent(self.players.len()));
        }
        if self.state == MatchState::WaitingForPeerSync {
            warn!("Turn advance rejected while waiting for the round score");
            return Err(MatchError::AwaitingPeerScore);
        }

        let round_start = self.state.is_between_rounds();
        if round_start {
            self.setup_round(table);
        }

        self.turn_counter += 1;

        if self.players.iter().all(|p| p.pucks_to_play == 0) {
            return Ok(self.finish_round(table));
        }

        let Some(color) = self.next_thrower(round_start) else {
            // Unreachable with two registered players
            return Err(MatchError::MissingOpponent(self.players.len()));
        };
        if let Some(slot) = self.slot_mut(color) {
            slot.pucks_to_play -= 1;
        }
        self.active = Some(color);

        let state = if self.players[0].color == color {
            MatchState::Player1Turn
        } else {
            MatchState::Player2Turn
        };
        self.set_state(state);

        let turn_id = self.turn_counter;
        debug!("Turn {} goes to {} ({} left)", turn_id, color, self.remaining(color));
        self.bus.publish(GameEvent::TurnStarted { turn_id, color });
        Ok(TurnOutcome::NewThrow { color, turn_id })
    }

    fn setup_round(&mut self, table: &mut Table) {
        table.clear_pucks();

        if self.state == MatchState::WinnerDeclared {
            info!("Starting a new match");
            for player in &mut self.players {
                player.score = 0;
            }
        }

        if self.round > 0 {
            self.first_player = self.first_player.map(PuckColor::opposite);
        }
        self.round += 1;

        let pucks = self.pucks_per_player;
        for player in &mut self.players {
            player.pucks_to_play = pucks;
        }
        self.active = None;

        let first = self.first_player.unwrap_or(self.players[0].color);
        info!("Round {} begins, {} throws first", self.round, first);
        self.bus.publish(GameEvent::RoundStarted {
            round: self.round,
            first,
        });
    }

    fn next_thrower(&self, round_start: bool) -> Option<PuckColor> {
        let preferred = if round_start {
            self.first_player?
        } else {
            self.active?.opposite()
        };

        if self.remaining(preferred) > 0 {
            Some(preferred)
        } else {
            Some(preferred.opposite()).filter(|c| self.remaining(*c) > 0)
        }
    }

    fn finish_round(&mut self, table: &Table) -> TurnOutcome {
        self.active = None;

        if self.authority == ScoringAuthority::Remote {
            info!("Round {} over, waiting for the peer's score", self.round);
            self.set_state(MatchState::WaitingForPeerSync);
            return TurnOutcome::AwaitingPeerScore;
        }

        let score = table.round_score();
        let state = self.award(score);
        TurnOutcome::RoundScored { score, state }
    }

    /// Apply the round score computed by the authoritative peer
    pub fn apply_peer_score(&mut self, score: RoundScore) -> Result<MatchState, MatchError> {
        if self.state != MatchState::WaitingForPeerSync {
            warn!("Round score arrived in state {:?}", self.state);
            return Err(MatchError::UnexpectedScore(self.state));
        }
        Ok(self.award(score))
    }

    fn award(&mut self, score: RoundScore) -> MatchState {
        self.last_score = score;

        let mut winner = None;
        if let Some(color) = score.winner {
            let winning_score = self.winning_score;
            if let Some(slot) = self.slot_mut(color) {
                slot.score += score.points;
                if slot.score >= winning_score {
                    winner = Some((color, slot.score));
                }
            }
        }

        let red = self.score(PuckColor::Red);
        let blue = self.score(PuckColor::Blue);
        info!(
            "Round {} scored: {:?} +{} (Red {}, Blue {})",
            self.round, score.winner, score.points, red, blue
        );
        self.bus.publish(GameEvent::RoundScored { score, red, blue });

        match winner {
            Some((color, total)) => {
                info!("{} wins the match with {}", color, total);
                self.set_state(MatchState::WinnerDeclared);
                self.bus.publish(GameEvent::WinnerDeclared {
                    color,
                    score: total,
                });
            }
            None => self.set_state(MatchState::RoundEnd),
        }
        self.state
    }
}
