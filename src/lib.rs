//! # chainql
//!
//! A GraphQL client SDK for chain-scoped application services: a node that
//! serves one GraphQL endpoint per deployed application over HTTP, plus a
//! shared GraphQL-over-WebSocket endpoint for subscriptions.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core** — scope newtypes, endpoint derivation, GraphQL wire types
//! 2. **HTTP transport** — queries and mutations with per-call retry policies
//! 3. **WebSocket transport** — graphql-transport-ws subscriptions over
//!    `tokio-tungstenite`
//! 4. **High-Level Client** — `ChainClient` with response caching and a lazily
//!    opened subscription socket
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainql::prelude::*;
//!
//! let client = ChainClient::new("1", "42", "8080");
//!
//! let accounts = client.query(Operation::new("{ accounts { owner } }")).await?;
//! let mut notifications = client
//!     .subscribe(Operation::new("subscription { notifications }"))
//!     .await?;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Chain and application identifier newtypes.
pub mod scope;

/// Endpoint URL derivation.
pub mod network;

/// GraphQL operation and response wire types.
pub mod graphql;

/// Unified SDK error types.
pub mod error;

// ── Layer 2: HTTP transport ──────────────────────────────────────────────────

/// HTTP transport with retry policies.
pub mod http;

// ── Layer 3: WebSocket transport ─────────────────────────────────────────────

/// WebSocket subscription client: protocol messages, subscriptions, events.
pub mod ws;

// ── Layer 4: High-Level Client ───────────────────────────────────────────────

/// `ChainClient` — the primary entry point.
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    pub use crate::scope::{ApplicationId, ChainId};

    pub use crate::network::Endpoints;

    pub use crate::graphql::{GraphQlError, Operation, OperationPayload, Response};

    pub use crate::error::{ClientError, HttpError, WsError};

    pub use crate::http::retry::{RetryConfig, RetryPolicy};
    pub use crate::http::HttpTransport;

    pub use crate::ws::{Subscription, SubscriptionEvent, WsConfig, WsEvent};

    pub use crate::client::{ChainClient, ChainClientBuilder};
}
