//! Connection lifecycle.
//!
//! Each accepted socket runs through the same sequence: authenticate within
//! the handshake window, register with the router and auto-join the
//! connection's user room plus `global:all`, then enter the event loop until
//! the peer leaves or the heartbeat deadline passes. Cleanup is idempotent,
//! so a connection that dies mid-handshake and one that closes cleanly take
//! the same path out.

use crate::auth::AuthError;
use crate::dispatch::{self, DispatchOutcome};
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::server::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_core::{EventEnvelope, Identity, RoomKind, RoomName};
use surge_protocol::{codec, ServerMessage};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// Drive one WebSocket connection from handshake to cleanup.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    let (mut sender, mut receiver) = socket.split();

    let identity = match authenticate(&state, token, &mut sender).await {
        Some(identity) => identity,
        None => return,
    };

    debug!(
        connection = %connection_id,
        user = %identity.user_id,
        "WebSocket connected"
    );

    // Events from subscribed rooms are merged into one mpsc so the select
    // loop has a single receive arm regardless of membership.
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<Arc<EventEnvelope>>();
    let mut subscription_tasks: HashMap<RoomName, tokio::task::JoinHandle<()>> = HashMap::new();

    let mut joined = Vec::new();
    for (room, rx) in establish_session(&state, &connection_id, identity) {
        joined.push(room.to_string());
        subscription_tasks.insert(room, spawn_forwarder(rx, sub_tx.clone()));
    }
    metrics::set_active_rooms(state.router.stats().room_count);

    if send(&mut sender, &ServerMessage::connected(&connection_id, joined))
        .await
        .is_err()
    {
        state.router.disconnect(&connection_id);
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_millis(
        state.config.heartbeat.interval_ms,
    ));
    heartbeat.tick().await; // First tick fires immediately.
    let idle_limit = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            biased;

            // Forward room events to the client.
            Some(envelope) = sub_rx.recv() => {
                match serde_json::to_string(envelope.as_ref()) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                        metrics::record_event_delivered();
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Envelope encoding failed");
                    }
                }
            }

            _ = heartbeat.tick() => {
                if last_activity.elapsed() > idle_limit {
                    warn!(connection = %connection_id, "Heartbeat deadline passed, closing");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        let outcome = match codec::decode_client(&text) {
                            Ok(client_msg) => {
                                dispatch::handle_client_message(&state.router, &connection_id, client_msg)
                            }
                            Err(e) => {
                                debug!(connection = %connection_id, error = %e, "Bad client message");
                                DispatchOutcome::Reply(ServerMessage::error(e.to_string()))
                            }
                        };

                        if apply_outcome(
                            outcome,
                            &state,
                            &connection_id,
                            &mut sender,
                            &mut subscription_tasks,
                            &sub_tx,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = Instant::now();
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        last_activity = Instant::now();
                        if send(&mut sender, &ServerMessage::error("Expected text frames"))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    for (_, handle) in subscription_tasks {
        handle.abort();
    }
    state.router.disconnect(&connection_id);
    metrics::set_active_rooms(state.router.stats().room_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Verify the handshake credential within the configured window.
///
/// Runs before anything touches the registry or router: a connection that
/// fails here never gains a registry entry or a room membership.
async fn verify_credential(
    state: &AppState,
    token: Option<String>,
) -> Result<Identity, AuthError> {
    let window = Duration::from_millis(state.config.heartbeat.handshake_timeout_ms);

    match token {
        Some(token) => match tokio::time::timeout(window, state.verifier.verify(&token)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::VerifierUnavailable),
        },
        None => Err(AuthError::MissingCredential),
    }
}

/// Verify the credential; on failure send a terminal error, close the
/// socket, and return `None` so the caller can bail without registering
/// anything.
async fn authenticate(
    state: &Arc<AppState>,
    token: Option<String>,
    sender: &mut WsSender,
) -> Option<Identity> {
    match verify_credential(state, token).await {
        Ok(identity) => Some(identity),
        Err(e) => {
            metrics::record_auth_failure();
            warn!(error = %e, "Handshake authentication failed");
            let _ = send(sender, &ServerMessage::error(e.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            None
        }
    }
}

/// Register an authenticated connection and join its standing rooms: the
/// wallet's own user room and `global:all`.
///
/// Returns the joined rooms with their receivers; a failed join is logged
/// and skipped so the connection still comes up with the rest.
fn establish_session(
    state: &AppState,
    connection_id: &str,
    identity: Identity,
) -> Vec<(RoomName, broadcast::Receiver<Arc<EventEnvelope>>)> {
    state.registry.register(connection_id, identity.clone());

    let auto_joins = [
        (RoomKind::User, identity.wallet_address.as_str()),
        (RoomKind::Global, "all"),
    ];
    let mut joined = Vec::with_capacity(auto_joins.len());
    for (kind, id) in auto_joins {
        match state.router.subscribe(connection_id, kind, id) {
            Ok(pair) => joined.push(pair),
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Auto-join failed");
            }
        }
    }
    joined
}

/// Apply a dispatch outcome: adjust forwarding tasks, then write the reply.
async fn apply_outcome(
    outcome: DispatchOutcome,
    state: &Arc<AppState>,
    connection_id: &str,
    sender: &mut WsSender,
    subscription_tasks: &mut HashMap<RoomName, tokio::task::JoinHandle<()>>,
    sub_tx: &mpsc::UnboundedSender<Arc<EventEnvelope>>,
) -> Result<(), axum::Error> {
    match outcome {
        DispatchOutcome::Reply(reply) => send(sender, &reply).await,

        DispatchOutcome::Subscribed {
            reply,
            room,
            receiver,
        } => {
            // Re-subscribing hands back a fresh receiver; drop the old
            // forwarder so each event is still delivered exactly once.
            if let Some(old) = subscription_tasks.remove(&room) {
                old.abort();
            }
            subscription_tasks.insert(room, spawn_forwarder(receiver, sub_tx.clone()));
            metrics::record_subscription();
            metrics::set_active_rooms(state.router.stats().room_count);
            debug!(connection = %connection_id, "Subscribe applied");
            send(sender, &reply).await
        }

        DispatchOutcome::Unsubscribed { reply, room } => {
            if let Some(handle) = subscription_tasks.remove(&room) {
                handle.abort();
            }
            metrics::set_active_rooms(state.router.stats().room_count);
            send(sender, &reply).await
        }
    }
}

/// Forward a room's broadcast stream into the connection's merged queue.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Arc<EventEnvelope>>,
    tx: mpsc::UnboundedSender<Arc<EventEnvelope>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if tx.send(envelope).is_err() {
                        break; // Connection loop is gone.
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    metrics::record_events_dropped(n);
                }
            }
        }
    })
}

/// Write one server message as a text frame. An encoding failure is logged
/// and swallowed; the connection stays open.
async fn send(sender: &mut WsSender, msg: &ServerMessage) -> Result<(), axum::Error> {
    match codec::encode_server(msg) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            warn!(error = %e, "Server message encoding failed");
            Ok(())
        }
    }
}
