// Chat transport interface
// Lossy, may duplicate, no sequence numbers. The game only ever sees text.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: String,
    pub body: String,
    /// Transport clock when the message was sent
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),

    /// A user logged in or out
    Presence { user: String, online: bool },

    /// Our own connection to the transport is gone
    Disconnected,

    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("user '{0}' is already logged in")]
    AlreadyLoggedIn(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("transport closed")]
    Closed,
}

pub trait ChatTransport {
    fn self_id(&self) -> &str;

    /// Messages stamped before this are left over from an earlier session
    fn login_timestamp_ms(&self) -> u64;

    fn send_chat(&mut self, to: &str, body: &str) -> Result<(), ChatError>;

    /// Non-blocking
    fn try_recv(&mut self) -> Option<ChatEvent>;

    fn logout(&mut self) -> Result<(), ChatError>;
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
