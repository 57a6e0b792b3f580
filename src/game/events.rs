// Match event bus
// One bus per session; subscribers get their own channel and can drop it at any time

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use glam::Vec3;

use super::puck::PuckColor;
use super::scoring::RoundScore;
use super::state::MatchState;

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A round was set up; pucks cleared
    RoundStarted { round: u32, first: PuckColor },

    /// A new throw is expected from `color`
    TurnStarted { turn_id: u32, color: PuckColor },

    PuckRested { turn_id: u32, color: PuckColor, position: Vec3 },

    /// Puck removed by the killing volume
    PuckDestroyed { turn_id: u32, color: PuckColor },

    RoundScored { score: RoundScore, red: u32, blue: u32 },

    StateChanged { state: MatchState },

    WinnerDeclared { color: PuckColor, score: u32 },

    BowlingSetup { pins: usize },

    PinKnocked { index: usize },

    /// Peer lost; no further synchronization
    MatchAbandoned { reason: String },
}

/// Cloneable handle; every clone publishes to the same subscribers
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<GameEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<GameEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Deliver to every live subscriber, forgetting the ones that hung up
    pub fn publish(&self, event: GameEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.clone().subscribe();

        bus.publish(GameEvent::TurnStarted {
            turn_id: 1,
            color: PuckColor::Red,
        });

        assert!(matches!(a.try_recv(), Ok(GameEvent::TurnStarted { turn_id: 1, .. })));
        assert!(matches!(b.try_recv(), Ok(GameEvent::TurnStarted { turn_id: 1, .. })));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(GameEvent::BowlingSetup { pins: 10 });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
