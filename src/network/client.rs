// Relay client handle for the game loop
// Talks to the relay thread over channels so the game loop never blocks on the socket

use std::sync::mpsc;
use std::time::Duration;

use tracing::{info, warn};

use super::chat::{ChatError, ChatEvent, ChatTransport};
use super::runtime;

// How long to wait for the relay to accept the login
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands the game loop sends to the relay thread
#[derive(Debug)]
pub enum RelayCommand {
    Send { to: String, body: String },
    Logout,
}

pub struct RelayClient {
    user: String,
    login_ms: u64,

    /// Send commands TO the relay thread
    tx: mpsc::Sender<RelayCommand>,

    /// Receive events FROM the relay thread
    rx: mpsc::Receiver<ChatEvent>,

    logged_in: bool,
}

impl RelayClient {
    /// Connect to `url`, log in as `user` and wait for the relay to accept
    pub fn connect(url: &str, user: &str) -> Result<Self, ChatError> {
        let (event_tx, event_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (login_tx, login_rx) = mpsc::channel();

        runtime::spawn_relay_thread(url.to_string(), user.to_string(), event_tx, cmd_rx, login_tx)
            .map_err(|e| ChatError::LoginFailed(e.to_string()))?;

        let login_ms = match login_rx.recv_timeout(LOGIN_TIMEOUT) {
            Ok(Ok(timestamp_ms)) => timestamp_ms,
            Ok(Err(message)) => return Err(ChatError::LoginFailed(message)),
            Err(_) => return Err(ChatError::LoginFailed("relay did not answer".into())),
        };
        info!("Logged in to {} as {}", url, user);

        Ok(Self {
            user: user.to_string(),
            login_ms,
            tx: cmd_tx,
            rx: event_rx,
            logged_in: true,
        })
    }
}

impl ChatTransport for RelayClient {
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
        self.tx
            .send(RelayCommand::Send {
                to: to.to_string(),
                body: body.to_string(),
            })
            .map_err(|_| ChatError::Closed)
    }

    fn try_recv(&mut self) -> Option<ChatEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                if self.logged_in {
                    warn!("Relay thread is gone");
                    self.logged_in = false;
                    Some(ChatEvent::Disconnected)
                } else {
                    None
                }
            }
        }
    }

    fn logout(&mut self) -> Result<(), ChatError> {
        if !self.logged_in {
            return Err(ChatError::NotLoggedIn);
        }
        self.logged_in = false;
        self.tx.send(RelayCommand::Logout).map_err(|_| ChatError::Closed)
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if self.logged_in {
            let _ = self.tx.send(RelayCommand::Logout);
        }
    }
}
