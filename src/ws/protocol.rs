//! graphql-transport-ws protocol messages.
//!
//! Wire format per the protocol spoken by `graphql-ws` servers: every frame
//! is a JSON object tagged by `type`. The client opens with `connection_init`
//! and must receive `connection_ack` before subscribing. Subscriptions are
//! multiplexed by `id`; the server terminates one with `complete` or `error`,
//! the client with `complete`.

use crate::graphql::{GraphQlError, OperationPayload, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Client → server ─────────────────────────────────────────────────────────

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: OperationPayload,
    },
    Complete {
        id: String,
    },
    Ping,
    Pong,
}

// ─── Server → client ─────────────────────────────────────────────────────────

/// Frames received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default)]
        payload: Option<Value>,
    },
    Next {
        id: String,
        payload: Response,
    },
    Error {
        id: String,
        payload: Vec<GraphQlError>,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<Value>,
    },
}
