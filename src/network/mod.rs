// Peer networking for p2shuffle
// Chat transports, the text protocol spoken over them, and the handshake that pairs two players

pub mod chat;
pub mod client;
pub mod codec;
pub mod handshake;
pub mod memory;
pub mod protocol;
pub mod relay;
pub mod runtime;
pub mod sync;

pub use chat::{ChatError, ChatEvent, ChatMessage, ChatTransport};
pub use client::RelayClient;
pub use handshake::{Handshake, HandshakeError, Role};
pub use memory::{Faults, MemoryChat, MemoryHub};
pub use protocol::{ChatCommand, ProtocolError};
pub use sync::{Freshness, SyncLimits};

/// Log in to the chat relay at `url`
pub fn connect_relay(url: &str, user: &str) -> Result<RelayClient, ChatError> {
    RelayClient::connect(url, user)
}
