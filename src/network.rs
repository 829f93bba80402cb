//! Endpoint URL derivation.
//!
//! The node serves queries and mutations on a per-application HTTP path and
//! all subscriptions on a single shared WebSocket path. The WebSocket URL is
//! deliberately not parameterized by chain or application — scoping for
//! subscriptions travels inside each operation's payload.

use crate::scope::{ApplicationId, ChainId};

/// Default host for a locally running node.
pub const DEFAULT_HOST: &str = "localhost";

/// Shared WebSocket path on the node.
pub const WS_PATH: &str = "/ws";

/// The pair of endpoint URLs a client is bound to.
///
/// Both URLs always share the same host and port and differ only in scheme
/// and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub http_url: String,
    pub ws_url: String,
}

impl Endpoints {
    /// Derive the endpoints for an application on a local node.
    ///
    /// No validation is performed on any input; a malformed identifier or a
    /// non-numeric port simply yields a URL the transports will reject.
    pub fn localhost(chain_id: &ChainId, application_id: &ApplicationId, port: &str) -> Self {
        Self::new(DEFAULT_HOST, chain_id, application_id, port)
    }

    /// Derive the endpoints for an application on an arbitrary host.
    pub fn new(
        host: &str,
        chain_id: &ChainId,
        application_id: &ApplicationId,
        port: &str,
    ) -> Self {
        Self {
            http_url: format!(
                "http://{}:{}/chains/{}/applications/{}",
                host, port, chain_id, application_id
            ),
            ws_url: format!("ws://{}:{}{}", host, port, WS_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_exact_template() {
        let eps = Endpoints::localhost(&ChainId::new("1"), &ApplicationId::new("42"), "8080");
        assert_eq!(eps.http_url, "http://localhost:8080/chains/1/applications/42");
    }

    #[test]
    fn test_ws_url_exact_template() {
        let eps = Endpoints::localhost(&ChainId::new("1"), &ApplicationId::new("42"), "8080");
        assert_eq!(eps.ws_url, "ws://localhost:8080/ws");
    }

    #[test]
    fn test_ws_url_independent_of_scope() {
        let a = Endpoints::localhost(&ChainId::new("1"), &ApplicationId::new("42"), "8080");
        let b = Endpoints::localhost(&ChainId::new("9"), &ApplicationId::new("77"), "8080");
        assert_eq!(a.ws_url, b.ws_url);
        assert_ne!(a.http_url, b.http_url);
    }

    #[test]
    fn test_custom_host() {
        let eps = Endpoints::new(
            "node.internal",
            &ChainId::new("abc"),
            &ApplicationId::new("def"),
            "9000",
        );
        assert_eq!(
            eps.http_url,
            "http://node.internal:9000/chains/abc/applications/def"
        );
        assert_eq!(eps.ws_url, "ws://node.internal:9000/ws");
    }

    #[test]
    fn test_no_port_validation() {
        // Garbage ports pass through; the transport rejects them later.
        let eps = Endpoints::localhost(&ChainId::new("1"), &ApplicationId::new("2"), "not-a-port");
        assert_eq!(
            eps.http_url,
            "http://localhost:not-a-port/chains/1/applications/2"
        );
    }
}
