use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::events::{ClientEvent, ServerEvent};
use crate::db::models::{Identity, MessageMetadata};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::{protocol, ConnectionHandle, ConnectionSender};

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the writer gets to flush queued frames after the reader stops.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// A decoded inbound frame, or the reason it could not be decoded.
type Inbound = Result<ClientEvent, ChatError>;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// - Writer task: owns the sink, forwards frames from the connection channel
/// - Reader task: decodes text frames into the inbound queue, answers pings
/// - Ping task: liveness check, ends the connection on pong timeout
/// - This task: drains the inbound queue in arrival order
///
/// Any part of the system can push to this client through the registry
/// handle, which wraps a clone of the channel sender.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    identity: Identity,
    metadata: MessageMetadata,
) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(&identity.id, tx.clone());
    let connection_id = handle.id;
    state.connections.register(identity.role, handle);

    tracing::info!(
        user_id = %identity.id,
        role = identity.role.as_str(),
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut ping_handle = tokio::spawn(ping_task(tx.clone(), pong_rx));

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Inbound>();
    let reader_handle = tokio::spawn(reader_task(
        ws_receiver,
        inbound_tx,
        tx.clone(),
        pong_tx,
        identity.id.clone(),
    ));

    loop {
        tokio::select! {
            inbound = inbound_rx.recv() => match inbound {
                Some(Ok(event)) => {
                    protocol::dispatch(event, &state, &identity, &metadata, &tx).await;
                }
                Some(Err(err)) => {
                    tracing::debug!(user_id = %identity.id, error = %err, "Rejected inbound frame");
                    push(&tx, &ServerEvent::error(&err));
                }
                // Reader finished and the queue is drained
                None => break,
            },
            _ = &mut ping_handle => {
                tracing::info!(user_id = %identity.id, "Connection failed liveness check");
                break;
            }
        }
    }

    reader_handle.abort();
    ping_handle.abort();

    state
        .connections
        .unregister(&identity.id, identity.role, connection_id);

    // With the registry entry gone and this sender dropped, the writer sees
    // its channel close once queued frames are flushed.
    drop(tx);
    let writer_abort = writer_handle.abort_handle();
    if timeout(WRITER_DRAIN, writer_handle).await.is_err() {
        writer_abort.abort();
    }

    tracing::info!(
        user_id = %identity.id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

fn push(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(frame) = event.to_frame() {
        let _ = tx.send(frame);
    }
}

/// Reader task: decodes frames and queues them for the dispatcher.
async fn reader_task(
    mut ws_receiver: SplitStream<WebSocket>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    tx: ConnectionSender,
    pong_tx: mpsc::UnboundedSender<()>,
    user_id: String,
) {
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    if inbound_tx.send(ClientEvent::decode(text.as_str())).is_err() {
                        break;
                    }
                }
                Message::Binary(_) => {
                    let rejected = Err(ChatError::Validation(
                        "Binary frames are not supported".to_string(),
                    ));
                    if inbound_tx.send(rejected).is_err() {
                        break;
                    }
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }
}

/// Ping task: returns when the peer misses a pong or the writer is gone.
async fn ping_task(tx: ConnectionSender, mut pong_rx: mpsc::UnboundedReceiver<()>) {
    let mut ping_timer = interval(PING_INTERVAL);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Discard pongs that arrived unprompted since the last ping
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            break;
        }

        match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}

/// Writer task: receives frames from the channel and forwards them to the sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
