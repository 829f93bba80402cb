//! WebSocket subscription client over `tokio-tungstenite`.
//!
//! Full implementation with:
//! - Background tokio task owning the socket
//! - `connection_init` / `connection_ack` handshake before any traffic
//! - Protocol-level ping/pong health check
//! - Exponential backoff reconnection with jitter
//! - Active-subscription tracking + auto-resubscribe on reconnect
//! - Per-subscription event channels, multiplexed by protocol id

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::graphql::{Operation, OperationPayload};
use crate::ws::protocol::{ClientMessage, ServerMessage};
use crate::ws::subscriptions::{Subscription, SubscriptionEvent};
use crate::ws::{ReadyState, WsConfig, WsEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Commands from public API to background task ─────────────────────────────

pub(crate) enum Command {
    Subscribe {
        id: String,
        payload: OperationPayload,
        events: mpsc::Sender<SubscriptionEvent>,
    },
    Complete {
        id: String,
    },
    Disconnect,
}

// ─── Disconnect reasons for reconnection decision ────────────────────────────

enum DisconnectReason {
    UserRequested,
    NormalClose,
    PongTimeout,
    Error(String),
}

// ─── Background task state ───────────────────────────────────────────────────

struct ActiveSubscription {
    payload: OperationPayload,
    events: mpsc::Sender<SubscriptionEvent>,
}

struct TaskState {
    config: WsConfig,
    event_tx: mpsc::Sender<WsEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    active: HashMap<String, ActiveSubscription>,
    reconnect_attempts: u32,
    ready_state: Arc<AtomicU16>,
}

impl TaskState {
    fn emit(&self, event: WsEvent) {
        let _ = self.event_tx.try_send(event);
    }

    fn should_reconnect(&self) -> bool {
        self.config.reconnect && self.reconnect_attempts < self.config.max_reconnect_attempts
    }

    fn deliver(&mut self, id: &str, event: SubscriptionEvent) {
        if let Some(sub) = self.active.get(id) {
            if sub.events.try_send(event).is_err() {
                tracing::debug!(id, "subscriber gone or lagging, dropping event");
            }
        } else {
            tracing::debug!(id, "event for unknown subscription id");
        }
    }
}

// ─── Public WsClient ─────────────────────────────────────────────────────────

/// WebSocket subscription client.
///
/// Uses a background tokio task for connection management. The public API
/// communicates with it via mpsc channels; every subscription shares the one
/// socket.
pub struct WsClient {
    config: WsConfig,
    cmd_tx: Option<mpsc::Sender<Command>>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<WsEvent>>,
    event_tx: mpsc::Sender<WsEvent>,
    task_handle: Option<JoinHandle<()>>,
    ready_state: Arc<AtomicU16>,
    next_id: AtomicU64,
}

impl WsClient {
    /// Create a new WS client. Does not connect yet.
    pub fn new(config: WsConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            config,
            cmd_tx: None,
            event_rx: tokio::sync::Mutex::new(event_rx),
            event_tx,
            task_handle: None,
            ready_state: Arc::new(AtomicU16::new(ReadyState::Closed as u16)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect to the WebSocket server.
    ///
    /// Spawns a background tokio task that manages the socket, the
    /// `connection_init` handshake, keepalive, reconnection, and
    /// subscription routing.
    pub async fn connect(&mut self) -> Result<(), WsError> {
        if self.cmd_tx.is_some() {
            return Ok(());
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        self.cmd_tx = Some(cmd_tx);
        self.ready_state
            .store(ReadyState::Connecting as u16, Ordering::SeqCst);

        let state = TaskState {
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
            cmd_rx,
            active: HashMap::new(),
            reconnect_attempts: 0,
            ready_state: Arc::clone(&self.ready_state),
        };

        let handle = tokio::spawn(run_task(state));
        self.task_handle = Some(handle);

        Ok(())
    }

    /// Disconnect from the WebSocket server.
    ///
    /// Sends a graceful close to the background task and waits for it to
    /// finish. Active subscriptions end their streams.
    pub async fn disconnect(&mut self) -> Result<(), WsError> {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Disconnect).await;
        }

        if let Some(handle) = self.task_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        self.ready_state
            .store(ReadyState::Closed as u16, Ordering::SeqCst);
        Ok(())
    }

    /// Open a subscription for the given operation.
    ///
    /// The adapted payload is forwarded over the shared socket; the returned
    /// handle is both the event stream and the unsubscribe handle. Returns
    /// `WsError::NotConnected` if `connect` has not been called.
    pub fn subscribe(&self, operation: &Operation) -> Result<Subscription, WsError> {
        let cmd_tx = self.cmd_tx.clone().ok_or(WsError::NotConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        tracing::debug!(request = ?operation, id = %id, "subscription requested");

        let payload = operation.payload();
        tracing::debug!(input = ?payload, id = %id, "forwarding adapted subscription payload");

        let (events_tx, events_rx) = mpsc::channel(64);
        cmd_tx
            .try_send(Command::Subscribe {
                id: id.clone(),
                payload,
                events: events_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    WsError::SendFailed("Command channel full".into())
                }
                mpsc::error::TrySendError::Closed(_) => WsError::NotConnected,
            })?;

        Ok(Subscription::new(id, events_rx, cmd_tx))
    }

    /// Whether the WebSocket is currently open (handshake acknowledged).
    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Current connection state.
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.ready_state.load(Ordering::SeqCst))
    }

    /// Get a stream of connection lifecycle events.
    ///
    /// The returned stream borrows `self`, so it must be dropped before
    /// calling `disconnect()`.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = WsEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    loop {
        // ── 1. Attempt connection + handshake ────────────────────────────
        let parts = match open_session(&state.config).await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!("WebSocket connection failed: {}", e);
                state.emit(WsEvent::Error(format!("Connection failed: {}", e)));

                if state.should_reconnect() {
                    backoff_sleep(&mut state).await;
                    if !drain_commands(&mut state) {
                        return;
                    }
                    continue;
                } else {
                    state.emit(WsEvent::ReconnectExhausted);
                    state
                        .ready_state
                        .store(ReadyState::Closed as u16, Ordering::SeqCst);
                    return;
                }
            }
        };
        let (mut sink, stream) = parts;

        // ── 2. Connected and acknowledged ────────────────────────────────
        state.reconnect_attempts = 0;
        state
            .ready_state
            .store(ReadyState::Open as u16, Ordering::SeqCst);
        state.emit(WsEvent::Connected);

        // ── 3. Resubscribe everything still held by a live handle ────────
        resubscribe_all(&mut sink, &state.active).await;

        // ── 4. Inner select! loop ────────────────────────────────────────
        let reason = run_connected(&mut state, sink, stream).await;

        // ── 5. Post-disconnect decision ──────────────────────────────────
        state
            .ready_state
            .store(ReadyState::Closed as u16, Ordering::SeqCst);

        if let DisconnectReason::Error(why) = &reason {
            tracing::warn!("Connection lost: {}", why);
        }

        match reason {
            DisconnectReason::UserRequested | DisconnectReason::NormalClose => return,
            DisconnectReason::PongTimeout | DisconnectReason::Error(_) => {
                if state.should_reconnect() {
                    state
                        .ready_state
                        .store(ReadyState::Connecting as u16, Ordering::SeqCst);
                    backoff_sleep(&mut state).await;
                    if !drain_commands(&mut state) {
                        return;
                    }
                    continue;
                }
                state.emit(WsEvent::ReconnectExhausted);
                return;
            }
        }
    }
}

/// The inner connected loop — runs until the connection breaks.
async fn run_connected(
    state: &mut TaskState,
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
) -> DisconnectReason {
    let ping_dur = Duration::from_millis(state.config.ping_interval_ms);
    let pong_dur = Duration::from_millis(state.config.pong_timeout_ms);

    let mut ping_interval = tokio::time::interval(ping_dur);
    ping_interval.reset(); // skip immediate first tick

    let mut pong_deadline: Option<tokio::time::Instant> = None;

    // Sleep future reset whenever a pong deadline is set; parked far in the
    // future while no ping is outstanding.
    let far_future = tokio::time::Instant::now() + Duration::from_secs(86400);
    let pong_sleep = tokio::time::sleep_until(far_future);
    tokio::pin!(pong_sleep);

    loop {
        tokio::select! {
            // ── a) Incoming WS message ───────────────────────────────────
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = text.as_ref();
                        match serde_json::from_str::<ServerMessage>(text_str) {
                            Ok(ServerMessage::Next { id, payload }) => {
                                state.deliver(&id, SubscriptionEvent::Next(payload));
                            }
                            Ok(ServerMessage::Error { id, payload }) => {
                                // Protocol: error terminates the subscription.
                                state.deliver(&id, SubscriptionEvent::Errors(payload));
                                state.active.remove(&id);
                            }
                            Ok(ServerMessage::Complete { id }) => {
                                state.deliver(&id, SubscriptionEvent::Complete);
                                state.active.remove(&id);
                            }
                            Ok(ServerMessage::Ping { .. }) => {
                                let _ = send_msg(&mut sink, &ClientMessage::Pong).await;
                            }
                            Ok(ServerMessage::Pong { .. }) => {
                                pong_deadline = None;
                                pong_sleep.as_mut().reset(far_future);
                            }
                            Ok(ServerMessage::ConnectionAck { .. }) => {
                                // Already acknowledged during handshake.
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "WS deserialization error: {} — raw: {}",
                                    e,
                                    text_str
                                );
                                state.emit(WsEvent::Error(format!(
                                    "Deserialization error: {}",
                                    e
                                )));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // WS-level pong — harmless, ignore
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        state.emit(WsEvent::Disconnected {
                            code: Some(code),
                            reason: reason.clone(),
                        });
                        return match code {
                            1000 => DisconnectReason::NormalClose,
                            _ => DisconnectReason::Error(reason),
                        };
                    }
                    Some(Ok(_)) => {} // Binary, Frame — ignore
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        tracing::error!("WebSocket error: {}", reason);
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason: reason.clone(),
                        });
                        return DisconnectReason::Error(reason);
                    }
                    None => {
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason: "Stream ended".into(),
                        });
                        return DisconnectReason::Error("Stream ended".into());
                    }
                }
            }

            // ── b) Command from public API ───────────────────────────────
            cmd = state.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Subscribe { id, payload, events }) => {
                        let frame = ClientMessage::Subscribe {
                            id: id.clone(),
                            payload: payload.clone(),
                        };
                        state.active.insert(id, ActiveSubscription { payload, events });
                        if let Err(e) = send_msg(&mut sink, &frame).await {
                            tracing::warn!("Subscribe send failed: {}", e);
                        }
                    }
                    Some(Command::Complete { id }) => {
                        if state.active.remove(&id).is_some() {
                            let frame = ClientMessage::Complete { id };
                            if let Err(e) = send_msg(&mut sink, &frame).await {
                                tracing::warn!("Complete send failed: {}", e);
                            }
                        }
                    }
                    Some(Command::Disconnect) => {
                        let _ = sink.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "Client disconnect".into(),
                        }))).await;
                        return DisconnectReason::UserRequested;
                    }
                    None => {
                        // WsClient dropped — clean exit
                        return DisconnectReason::UserRequested;
                    }
                }
            }

            // ── c) Keepalive ping ────────────────────────────────────────
            _ = ping_interval.tick() => {
                if let Err(e) = send_msg(&mut sink, &ClientMessage::Ping).await {
                    tracing::warn!("Failed to send ping: {}", e);
                } else {
                    let deadline = tokio::time::Instant::now() + pong_dur;
                    pong_deadline = Some(deadline);
                    pong_sleep.as_mut().reset(deadline);
                }
            }

            // ── d) Pong timeout ──────────────────────────────────────────
            () = &mut pong_sleep, if pong_deadline.is_some() => {
                tracing::warn!(
                    "Pong timeout — no response within {}ms",
                    state.config.pong_timeout_ms
                );
                state.emit(WsEvent::Disconnected {
                    code: None,
                    reason: "Pong timeout".into(),
                });
                let _ = sink.close().await;
                return DisconnectReason::PongTimeout;
            }
        }
    }
}

// ─── Session setup ───────────────────────────────────────────────────────────

/// Establish the socket and complete the `connection_init` handshake.
async fn open_session(
    config: &WsConfig,
) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>), String> {
    let (ws_stream, _) =
        tokio::time::timeout(Duration::from_secs(30), connect_async(config.url.as_str()))
        .await
        .map_err(|_| "Connection timeout".to_string())?
        .map_err(|e| e.to_string())?;

    let (mut sink, mut stream) = ws_stream.split();
    await_ack(&mut sink, &mut stream, config.ack_timeout_ms).await?;
    Ok((sink, stream))
}

/// Send `connection_init` and wait for `connection_ack`.
async fn await_ack(
    sink: &mut SplitSink<WsStream, Message>,
    stream: &mut SplitStream<WsStream>,
    ack_timeout_ms: u64,
) -> Result<(), String> {
    send_msg(sink, &ClientMessage::ConnectionInit { payload: None }).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(ack_timeout_ms);

    loop {
        let msg = tokio::time::timeout_at(deadline, stream.next())
            .await
            .map_err(|_| "Timed out waiting for connection_ack".to_string())?;

        match msg {
            Some(Ok(Message::Text(text))) => {
                let text_str: &str = text.as_ref();
                match serde_json::from_str::<ServerMessage>(text_str) {
                    Ok(ServerMessage::ConnectionAck { .. }) => return Ok(()),
                    Ok(ServerMessage::Ping { .. }) => {
                        send_msg(sink, &ClientMessage::Pong).await?;
                    }
                    Ok(other) => {
                        return Err(format!("Unexpected frame before connection_ack: {other:?}"))
                    }
                    Err(e) => return Err(format!("Invalid frame during handshake: {e}")),
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = sink.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = extract_close(frame.as_ref());
                return Err(format!("Closed during handshake: code={code} reason={reason}"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.to_string()),
            None => return Err("Stream ended during handshake".into()),
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Serialize and send a protocol frame over the sink.
async fn send_msg(
    sink: &mut SplitSink<WsStream, Message>,
    msg: &ClientMessage,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}

async fn resubscribe_all(
    sink: &mut SplitSink<WsStream, Message>,
    active: &HashMap<String, ActiveSubscription>,
) {
    if active.is_empty() {
        return;
    }
    tracing::info!("Resubscribing {} active subscription(s)", active.len());
    for (id, sub) in active {
        let frame = ClientMessage::Subscribe {
            id: id.clone(),
            payload: sub.payload.clone(),
        };
        if let Err(e) = send_msg(sink, &frame).await {
            tracing::warn!(id = %id, "Failed to resubscribe: {}", e);
        }
    }
}

/// Handle commands that arrive while disconnected: subscriptions are tracked
/// and sent on the next (re)connect, completions drop the tracking entry.
/// Returns `false` if a disconnect was requested.
fn drain_commands(state: &mut TaskState) -> bool {
    while let Ok(cmd) = state.cmd_rx.try_recv() {
        match cmd {
            Command::Subscribe { id, payload, events } => {
                state.active.insert(id, ActiveSubscription { payload, events });
            }
            Command::Complete { id } => {
                state.active.remove(&id);
            }
            Command::Disconnect => {
                return false;
            }
        }
    }
    true
}

// ─── Reconnection backoff ────────────────────────────────────────────────────

async fn backoff_sleep(state: &mut TaskState) {
    state.reconnect_attempts += 1;

    let exp = (state.reconnect_attempts - 1).min(10);
    let base = state
        .config
        .base_reconnect_delay_ms
        .saturating_mul(1u32 << exp);

    let jitter = rand::random::<u32>() % 500;
    let delay = base.saturating_add(jitter).min(60_000);

    tracing::info!(
        "Reconnect attempt {}/{} in {}ms",
        state.reconnect_attempts,
        state.config.max_reconnect_attempts,
        delay
    );

    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WsConfig {
        WsConfig::new("ws://localhost:8080/ws")
    }

    #[test]
    fn test_ws_client_new_does_not_connect() {
        let client = WsClient::new(test_config());
        assert!(client.cmd_tx.is_none());
        assert_eq!(client.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn test_subscribe_when_not_connected() {
        let client = WsClient::new(test_config());
        let result = client.subscribe(&Operation::new("subscription { x }"));
        assert!(matches!(result, Err(WsError::NotConnected)));
    }

    #[tokio::test]
    async fn test_subscription_ids_are_unique() {
        let mut client = WsClient::new(test_config());
        client.connect().await.unwrap();

        let a = client.subscribe(&Operation::new("subscription { a }")).unwrap();
        let b = client.subscribe(&Operation::new("subscription { b }")).unwrap();
        assert_ne!(a.id(), b.id());

        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let mut client = WsClient::new(test_config());
        let result = client.disconnect().await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_extract_close_with_frame() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "goodbye".into(),
        };
        let (code, reason) = extract_close(Some(&frame));
        assert_eq!(code, 1000);
        assert_eq!(reason, "goodbye");
    }

    #[test]
    fn test_extract_close_no_frame() {
        let (code, reason) = extract_close(None);
        assert_eq!(code, 1006);
        assert_eq!(reason, "No close frame");
    }

    #[test]
    fn test_drain_commands_tracks_and_untracks() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let mut state = TaskState {
            config: test_config(),
            event_tx,
            cmd_rx,
            active: HashMap::new(),
            reconnect_attempts: 0,
            ready_state: Arc::new(AtomicU16::new(ReadyState::Closed as u16)),
        };

        let (events, _rx) = mpsc::channel(8);
        cmd_tx
            .try_send(Command::Subscribe {
                id: "1".into(),
                payload: Operation::new("subscription { x }").payload(),
                events: events.clone(),
            })
            .unwrap();
        cmd_tx
            .try_send(Command::Subscribe {
                id: "2".into(),
                payload: Operation::new("subscription { y }").payload(),
                events,
            })
            .unwrap();
        cmd_tx.try_send(Command::Complete { id: "1".into() }).unwrap();

        drain_commands(&mut state);
        assert_eq!(state.active.len(), 1);
        assert!(state.active.contains_key("2"));
    }

    #[test]
    fn test_should_reconnect_respects_limit() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (_cmd_tx, cmd_rx) = mpsc::channel::<Command>(8);
        let mut state = TaskState {
            config: test_config(),
            event_tx,
            cmd_rx,
            active: HashMap::new(),
            reconnect_attempts: 0,
            ready_state: Arc::new(AtomicU16::new(ReadyState::Closed as u16)),
        };

        assert!(state.should_reconnect());
        state.reconnect_attempts = state.config.max_reconnect_attempts;
        assert!(!state.should_reconnect());

        state.reconnect_attempts = 0;
        state.config.reconnect = false;
        assert!(!state.should_reconnect());
    }
}
