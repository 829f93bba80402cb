//! WebSocket subscription layer.
//!
//! Speaks the graphql-transport-ws protocol over `tokio-tungstenite`: one
//! shared socket per client, with every subscription multiplexed over it by
//! id. The socket URL carries no chain or application scoping — that travels
//! inside each operation's payload.

pub mod protocol;
pub mod subscriptions;

pub mod native;

pub use native::WsClient;
pub use subscriptions::{Subscription, SubscriptionEvent};

// ─── WsEvent ─────────────────────────────────────────────────────────────────

/// Connection lifecycle events emitted by the WS client to the consumer.
///
/// Subscription traffic is delivered through [`Subscription`] handles, not
/// through this stream.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// Connection established and acknowledged by the server.
    Connected,
    /// Connection lost (may trigger reconnect).
    Disconnected { code: Option<u16>, reason: String },
    /// A deserialization or protocol error.
    Error(String),
    /// Reconnection gave up after the configured number of attempts.
    ReconnectExhausted,
}

// ─── ReadyState ──────────────────────────────────────────────────────────────

/// Connection state of the WS client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl From<u16> for ReadyState {
    fn from(v: u16) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }
}

/// Configuration for the WS client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay_ms: u32,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    /// How long to wait for `connection_ack` after `connection_init`.
    pub ack_timeout_ms: u64,
}

impl WsConfig {
    /// A config for the given URL with default tuning.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            max_reconnect_attempts: 10,
            base_reconnect_delay_ms: 1000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            ack_timeout_ms: 10_000,
        }
    }
}
