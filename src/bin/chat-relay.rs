// Chat relay server
// Relays chat lines between logged-in users and tells them who is online
//
// Usage: cargo run --bin chat-relay [listen-address]

use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use p2shuffle::network::chat::now_ms;
use p2shuffle::network::relay::{RelayFrame, UserId};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

type Users = Arc<RwLock<HashMap<UserId, UnboundedSender<Message>>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat relay listening on {}", addr);

    let users: Users = Arc::new(RwLock::new(HashMap::new()));

    while let Ok((stream, addr)) = listener.accept().await {
        let users = users.clone();
        tokio::spawn(handle_connection(stream, addr, users));
    }

    Ok(())
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, users: Users) {
    debug!("New connection from {}", addr);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut user: Option<UserId> = None;

    // Spawn task to send frames to this user
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Error receiving from {}: {}", addr, e);
                break;
            }
        };

        let Message::Text(text) = msg else {
            continue;
        };

        match RelayFrame::from_json(&text) {
            Ok(RelayFrame::Logout) => break,
            Ok(frame) => handle_frame(frame, &mut user, &tx, &users).await,
            Err(e) => {
                warn!("Unreadable frame from {}: {}", addr, e);
                send(
                    &tx,
                    &RelayFrame::Error {
                        message: format!("invalid frame: {}", e),
                    },
                );
            }
        }
    }

    // Clean up on disconnect
    if let Some(name) = user {
        users.write().await.remove(&name);
        info!("{} logged out", name);
        broadcast_presence(&users, &name, false).await;
    }

    send_task.abort();
}

async fn handle_frame(
    frame: RelayFrame,
    user: &mut Option<UserId>,
    tx: &UnboundedSender<Message>,
    users: &Users,
) {
    match frame {
        RelayFrame::Login { user: name } => {
            if user.is_some() {
                send(tx, &RelayFrame::Error {
                    message: "already logged in on this connection".into(),
                });
                return;
            }

            let online: Vec<UserId> = {
                let mut users = users.write().await;
                if users.contains_key(&name) {
                    warn!("Rejected second login for {}", name);
                    send(tx, &RelayFrame::Error {
                        message: format!("{} is already logged in", name),
                    });
                    return;
                }
                let online = users.keys().cloned().collect();
                users.insert(name.clone(), tx.clone());
                online
            };

            info!("{} logged in", name);
            *user = Some(name.clone());
            send(tx, &RelayFrame::LoginOk {
                user: name.clone(),
                timestamp_ms: now_ms(),
            });
            for other in online {
                send(tx, &RelayFrame::Presence {
                    user: other,
                    online: true,
                });
            }
            broadcast_presence(users, &name, true).await;
        }

        RelayFrame::Chat { to, body, .. } => {
            let Some(from) = user.clone() else {
                send(tx, &RelayFrame::Error {
                    message: "log in before chatting".into(),
                });
                return;
            };

            // The relay clock stamps every message so it compares with login times
            let frame = RelayFrame::Chat {
                from: from.clone(),
                to: to.clone(),
                body,
                timestamp_ms: now_ms(),
            };
            match users.read().await.get(&to) {
                Some(peer_tx) => {
                    debug!("Relaying chat from {} to {}", from, to);
                    send(peer_tx, &frame);
                }
                None => debug!("{} is offline, dropping chat from {}", to, from),
            }
        }

        other => warn!("Unexpected frame from client: {:?}", other),
    }
}

async fn broadcast_presence(users: &Users, name: &str, online: bool) {
    let frame = RelayFrame::Presence {
        user: name.to_string(),
        online,
    };
    for (other, peer_tx) in users.read().await.iter() {
        if other != name {
            send(peer_tx, &frame);
        }
    }
}

fn send(tx: &UnboundedSender<Message>, frame: &RelayFrame) {
    match frame.to_json() {
        Ok(json) => {
            if tx.send(Message::Text(json)).is_err() {
                debug!("Connection already gone, frame dropped");
            }
        }
        Err(e) => error!("Could not encode frame: {}", e),
    }
}
