// Relay runtime - runs the WebSocket connection in a background thread
// Bridges the async socket with the sync game loop via channels

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::runtime::Builder;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::chat::{now_ms, ChatEvent, ChatMessage};
use super::client::RelayCommand;
use super::relay::RelayFrame;

// How often queued game commands are flushed to the socket
const COMMAND_POLL: Duration = Duration::from_millis(5);

pub type LoginResult = std::result::Result<u64, String>;

pub fn spawn_relay_thread(
    url: String,
    user: String,
    event_tx: mpsc::Sender<ChatEvent>,
    cmd_rx: mpsc::Receiver<RelayCommand>,
    login_tx: mpsc::Sender<LoginResult>,
) -> std::io::Result<()> {
    thread::Builder::new().name("chat-relay".into()).spawn(move || {
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                let _ = login_tx.send(Err(format!("failed to create tokio runtime: {}", e)));
                return;
            }
        };

        rt.block_on(async move {
            if let Err(e) = run_relay(&url, &user, &event_tx, &cmd_rx, &login_tx).await {
                error!("Relay connection error: {:#}", e);
                // Only one of these has a listener, depending on how far we got
                let _ = login_tx.send(Err(e.to_string()));
                let _ = event_tx.send(ChatEvent::Error(e.to_string()));
                let _ = event_tx.send(ChatEvent::Disconnected);
            }
        });

        debug!("Relay thread ending");
    })?;

    Ok(())
}

async fn run_relay(
    url: &str,
    user: &str,
    event_tx: &mpsc::Sender<ChatEvent>,
    cmd_rx: &mpsc::Receiver<RelayCommand>,
    login_tx: &mpsc::Sender<LoginResult>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to relay {}", url))?;
    info!("Connected to relay {}", url);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let login = RelayFrame::Login { user: user.to_string() };
    ws_sink.send(Message::Text(login.to_json()?)).await?;

    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => match RelayFrame::from_json(&text)? {
                RelayFrame::LoginOk { timestamp_ms, .. } => {
                    let _ = login_tx.send(Ok(timestamp_ms));
                    break;
                }
                RelayFrame::Error { message } => {
                    let _ = login_tx.send(Err(message));
                    return Ok(());
                }
                other => debug!("Ignoring {:?} before login", other),
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => bail!("relay closed the connection during login"),
        }
    }

    let mut poll = tokio::time::interval(COMMAND_POLL);

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&text, event_tx),
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay closed the connection");
                    let _ = event_tx.send(ChatEvent::Disconnected);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = poll.tick() => {
                while let Ok(cmd) = cmd_rx.try_recv() {
                    match cmd {
                        RelayCommand::Send { to, body } => {
                            let frame = RelayFrame::Chat {
                                from: user.to_string(),
                                to,
                                body,
                                timestamp_ms: now_ms(),
                            };
                            ws_sink.send(Message::Text(frame.to_json()?)).await?;
                        }
                        RelayCommand::Logout => {
                            info!("Logging out of relay");
                            ws_sink.send(Message::Text(RelayFrame::Logout.to_json()?)).await?;
                            let _ = ws_sink.close().await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn handle_frame(text: &str, event_tx: &mpsc::Sender<ChatEvent>) {
    let frame = match RelayFrame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Unreadable relay frame: {}", e);
            return;
        }
    };

    let event = match frame {
        RelayFrame::Chat {
            from,
            body,
            timestamp_ms,
            ..
        } => ChatEvent::Message(ChatMessage {
            from,
            body,
            timestamp_ms,
        }),
        RelayFrame::Presence { user, online } => ChatEvent::Presence { user, online },
        RelayFrame::Error { message } => ChatEvent::Error(message),
        other => {
            debug!("Ignoring relay frame {:?}", other);
            return;
        }
    };

    let _ = event_tx.send(event);
}
