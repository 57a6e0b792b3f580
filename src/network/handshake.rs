// Three-way handshake deciding who hosts the match
//
//   initiator                      receiver
//   travel-syn A          ->
//                         <-       travel-syn-ack B (A+1)
//   travel-ack (B+1) (A+1) ->      (initiator commits as host)
//                         <-       travel  (receiver commits as invitee)

use rand::Rng;
use tracing::{debug, error, info, warn};

use super::protocol::ChatCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiator; authoritative for rest, sync and scoring
    Host,
    Invitee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    SynSent { syn: i32 },
    SynAckSent { syn: i32, peer_syn: i32 },
    Committed(Role),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("faulty handshake: expected {expected}, got {found}")]
    Mismatch { expected: i32, found: i32 },

    #[error("both sides initiated at once")]
    SimultaneousOpen,

    #[error("{command} is not expected in state {state:?}")]
    Unexpected {
        command: &'static str,
        state: HandshakeState,
    },
}

#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        match self.state {
            HandshakeState::Committed(role) => Some(role),
            _ => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.role().is_some()
    }

    pub fn has_failed(&self) -> bool {
        self.state == HandshakeState::Failed
    }

    pub fn initiate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ChatCommand {
        self.initiate_with(random_syn(rng))
    }

    pub fn initiate_with(&mut self, syn: i32) -> ChatCommand {
        info!("Initiating handshake");
        self.state = HandshakeState::SynSent { syn };
        ChatCommand::TravelSyn { syn }
    }

    /// Feed a handshake command from the peer; returns the reply to send, if any
    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        command: &ChatCommand,
        rng: &mut R,
    ) -> Result<Option<ChatCommand>, HandshakeError> {
        debug!("Handshake in {:?} received {}", self.state, command);

        match (command, self.state) {
            (&ChatCommand::TravelSyn { .. }, HandshakeState::SynSent { .. }) => {
                error!("Faulty handshake: both peers initiated");
                self.state = HandshakeState::Failed;
                Err(HandshakeError::SimultaneousOpen)
            }
            (&ChatCommand::TravelSyn { syn: peer_syn }, state) if !matches!(state, HandshakeState::Committed(_)) => {
                if state != HandshakeState::Idle {
                    info!("Peer restarted the handshake");
                }
                let syn = random_syn(rng);
                self.state = HandshakeState::SynAckSent { syn, peer_syn };
                Ok(Some(ChatCommand::TravelSynAck {
                    syn,
                    ack: peer_syn.wrapping_add(1),
                }))
            }
            (&ChatCommand::TravelSynAck { syn: peer_syn, ack }, HandshakeState::SynSent { syn }) => {
                let expected = syn.wrapping_add(1);
                if ack != expected {
                    return Err(self.fail(expected, ack));
                }
                self.state = HandshakeState::Committed(Role::Host);
                info!("Handshake complete, hosting the match");
                Ok(Some(ChatCommand::TravelAck {
                    syn: peer_syn.wrapping_add(1),
                    ack,
                }))
            }
            (&ChatCommand::TravelAck { syn: echoed, ack }, HandshakeState::SynAckSent { syn, peer_syn }) => {
                let expected = syn.wrapping_add(1);
                if echoed != expected {
                    return Err(self.fail(expected, echoed));
                }
                let expected_ack = peer_syn.wrapping_add(1);
                if ack != expected_ack {
                    return Err(self.fail(expected_ack, ack));
                }
                self.state = HandshakeState::Committed(Role::Invitee);
                info!("Handshake complete, joining as invitee");
                Ok(Some(ChatCommand::Travel))
            }
            (&ChatCommand::Travel, HandshakeState::Committed(Role::Host)) => {
                debug!("Peer confirmed the handshake");
                Ok(None)
            }
            (_, state) => {
                warn!("Unexpected {} during handshake ({:?})", command.name(), state);
                Err(HandshakeError::Unexpected {
                    command: command.name(),
                    state,
                })
            }
        }
    }

    fn fail(&mut self, expected: i32, found: i32) -> HandshakeError {
        error!("Faulty handshake: expected {}, got {}", expected, found);
        self.state = HandshakeState::Failed;
        HandshakeError::Mismatch { expected, found }
    }
}

fn random_syn<R: Rng + ?Sized>(rng: &mut R) -> i32 {
    rng.gen_range(0..i32::MAX)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_honest_handshake_commits_both() {
        let mut rng = rng();
        let mut a = Handshake::new();
        let mut b = Handshake::new();

        let syn = a.initiate(&mut rng);
        let syn_ack = b.handle(&syn, &mut rng).unwrap().unwrap();
        let ack = a.handle(&syn_ack, &mut rng).unwrap().unwrap();
        assert_eq!(a.role(), Some(Role::Host));

        let travel = b.handle(&ack, &mut rng).unwrap().unwrap();
        assert_eq!(travel, ChatCommand::Travel);
        assert_eq!(b.role(), Some(Role::Invitee));

        // Confirmation is idempotent at the host
        assert_eq!(a.handle(&travel, &mut rng), Ok(None));
        assert_eq!(a.handle(&travel, &mut rng), Ok(None));
    }

    #[test]
    fn test_corrupted_ack_commits_neither() {
        let mut rng = rng();
        let mut a = Handshake::new();
        let mut b = Handshake::new();

        let syn = a.initiate(&mut rng);
        let Some(ChatCommand::TravelSynAck { syn: b_syn, ack }) = b.handle(&syn, &mut rng).unwrap() else {
            panic!("expected a syn-ack");
        };

        let corrupted = ChatCommand::TravelSynAck {
            syn: b_syn,
            ack: ack.wrapping_add(1),
        };
        assert!(matches!(
            a.handle(&corrupted, &mut rng),
            Err(HandshakeError::Mismatch { .. })
        ));
        assert!(a.has_failed());
        assert!(!a.is_committed());
        assert!(!b.is_committed());
    }

    #[test]
    fn test_receiver_rejects_bad_final_ack() {
        let mut rng = rng();
        let mut b = Handshake::new();
        let reply = b.handle(&ChatCommand::TravelSyn { syn: 10 }, &mut rng).unwrap();
        let Some(ChatCommand::TravelSynAck { syn, .. }) = reply else {
            panic!("expected a syn-ack");
        };

        let bad = ChatCommand::TravelAck { syn, ack: 11 };
        assert!(b.handle(&bad, &mut rng).is_err());
        assert!(!b.is_committed());
    }

    #[test]
    fn test_arithmetic_wraps() {
        let mut rng = rng();
        let mut a = Handshake::new();
        let mut b = Handshake::new();

        let syn = a.initiate_with(i32::MAX);
        let syn_ack = b.handle(&syn, &mut rng).unwrap().unwrap();
        assert!(matches!(syn_ack, ChatCommand::TravelSynAck { ack: i32::MIN, .. }));

        let ack = a.handle(&syn_ack, &mut rng).unwrap().unwrap();
        b.handle(&ack, &mut rng).unwrap();
        assert!(a.is_committed() && b.is_committed());
    }

    #[test]
    fn test_simultaneous_open_fails() {
        let mut rng = rng();
        let mut a = Handshake::new();
        a.initiate(&mut rng);
        assert_eq!(
            a.handle(&ChatCommand::TravelSyn { syn: 3 }, &mut rng),
            Err(HandshakeError::SimultaneousOpen)
        );
        assert!(a.has_failed());
    }

    #[test]
    fn test_new_syn_restarts_receiver() {
        let mut rng = rng();
        let mut b = Handshake::new();
        b.handle(&ChatCommand::TravelSyn { syn: 1 }, &mut rng).unwrap();
        let reply = b.handle(&ChatCommand::TravelSyn { syn: 50 }, &mut rng).unwrap();

        assert!(matches!(reply, Some(ChatCommand::TravelSynAck { ack: 51, .. })));
        assert!(matches!(b.state(), HandshakeState::SynAckSent { peer_syn: 50, .. }));
    }

    #[test]
    fn test_out_of_order_commands_rejected() {
        let mut rng = rng();
        let mut a = Handshake::new();
        assert!(a.handle(&ChatCommand::Travel, &mut rng).is_err());
        assert!(a
            .handle(&ChatCommand::TravelAck { syn: 1, ack: 2 }, &mut rng)
            .is_err());
        assert_eq!(a.state(), HandshakeState::Idle);
    }
}
