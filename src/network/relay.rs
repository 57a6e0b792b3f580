// Chat relay wire frames
// JSON text frames over WebSocket, shared by the relay server and its clients

use serde::{Deserialize, Serialize};

pub type UserId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Claim a user name on this connection
    Login { user: UserId },

    /// Server accepted the login; its clock at that moment
    LoginOk { user: UserId, timestamp_ms: u64 },

    /// Client to server: `from` is ignored and replaced with the sender's login.
    /// Server to client: a message for this user.
    Chat {
        #[serde(default)]
        from: UserId,
        to: UserId,
        body: String,
        timestamp_ms: u64,
    },

    Presence { user: UserId, online: bool },

    Logout,

    Error { message: String },
}

impl RelayFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
