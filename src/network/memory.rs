// In-process chat hub
// Lets two sessions play in one process; can drop or duplicate messages to
// exercise the protocol under the same faults a real chat service shows.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::chat::{ChatError, ChatEvent, ChatMessage, ChatTransport};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Faults {
    /// Chance each message is lost
    pub drop_chance: f64,
    /// Chance a delivered message arrives twice
    pub duplicate_chance: f64,
}

#[derive(Debug)]
struct HubInner {
    users: HashMap<String, mpsc::Sender<ChatEvent>>,
    // Logical clock, one tick per message
    clock: u64,
    faults: Faults,
    rng: StdRng,
}

#[derive(Debug, Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::with_faults(Faults::default(), 0)
    }

    pub fn with_faults(faults: Faults, seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                users: HashMap::new(),
                clock: 1,
                faults,
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.faults = faults;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubInner>, ChatError> {
        self.inner.lock().map_err(|_| ChatError::Closed)
    }

    pub fn login(&self, user: &str) -> Result<MemoryChat, ChatError> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(user) {
            return Err(ChatError::AlreadyLoggedIn(user.to_string()));
        }

        let (tx, rx) = mpsc::channel();
        broadcast_presence(&mut inner, user, true);
        inner.users.insert(user.to_string(), tx);
        inner.clock += 1;

        debug!("{} logged in to the memory hub", user);
        Ok(MemoryChat {
            hub: self.clone(),
            user: user.to_string(),
            login_ms: inner.clock,
            rx,
            logged_in: true,
        })
    }

    /// Deliver a message stamped with an explicit time, e.g. one sent before a login
    pub fn inject(&self, from: &str, to: &str, body: &str, timestamp_ms: u64) {
        if let Ok(inner) = self.inner.lock() {
            if let Some(tx) = inner.users.get(to) {
                let _ = tx.send(ChatEvent::Message(ChatMessage {
                    from: from.to_string(),
                    body: body.to_string(),
                    timestamp_ms,
                }));
            }
        }
    }

    fn deliver(&self, from: &str, to: &str, body: &str) -> Result<(), ChatError> {
        let mut inner = self.lock()?;
        inner.clock += 1;
        let message = ChatMessage {
            from: from.to_string(),
            body: body.to_string(),
            timestamp_ms: inner.clock,
        };

        let faults = inner.faults;
        if faults.drop_chance > 0.0 && inner.rng.gen_bool(faults.drop_chance.min(1.0)) {
            debug!("Hub dropped '{}' from {}", body, from);
            return Ok(());
        }
        let copies = if faults.duplicate_chance > 0.0 && inner.rng.gen_bool(faults.duplicate_chance.min(1.0)) {
            2
        } else {
            1
        };

        // Unknown recipients are offline; chat services swallow those silently
        if let Some(tx) = inner.users.get(to) {
            for _ in 0..copies {
                let _ = tx.send(ChatEvent::Message(message.clone()));
            }
        }
        Ok(())
    }

    fn leave(&self, user: &str) -> Result<(), ChatError> {
        let mut inner = self.lock()?;
        inner.users.remove(user);
        broadcast_presence(&mut inner, user, false);
        debug!("{} logged out of the memory hub", user);
        Ok(())
    }
}

fn broadcast_presence(inner: &mut HubInner, user: &str, online: bool) {
    for tx in inner.users.values() {
        let _ = tx.send(ChatEvent::Presence {
            user: user.to_string(),
            online,
        });
    }
}

#[derive(Debug)]
pub struct MemoryChat {
    hub: MemoryHub,
    user: String,
    login_ms: u64,
    rx: mpsc::Receiver<ChatEvent>,
    logged_in: bool,
}

impl ChatTransport for MemoryChat {
    fn self_id(&self) -> &str {
        &self.user
    }

    fn login_timestamp_ms(&self) -> u64 {
        self.login_ms
    }

    fn send_chat(&mut self, to: &str, body: &str) -> Result<(), ChatError> {
        if !self.logged_in {
            return Err(ChatError::NotLoggedIn);
        }
        self.hub.deliver(&self.user, to, body)
    }

    fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }

    fn logout(&mut self) -> Result<(), ChatError> {
        if !self.logged_in {
            return Err(ChatError::NotLoggedIn);
        }
        self.logged_in = false;
        self.hub.leave(&self.user)
    }
}

impl Drop for MemoryChat {
    fn drop(&mut self) {
        if self.logged_in {
            let _ = self.hub.leave(&self.user);
        }
    }
}
