//! High-level client — `ChainClient`.
//!
//! One client per (chain, application, port) scope. Queries and mutations go
//! over HTTP to the scoped application endpoint; subscriptions share one
//! lazily opened WebSocket. Each client owns its cache and socket — two
//! clients never share state.

use crate::error::ClientError;
use crate::graphql::{Operation, Response};
use crate::http::{HttpTransport, RetryPolicy};
use crate::network::{Endpoints, DEFAULT_HOST};
use crate::scope::{ApplicationId, ChainId};
use crate::ws::native::WsClient;
use crate::ws::{Subscription, WsConfig};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// The primary entry point: a GraphQL client scoped to one application on
/// one chain.
pub struct ChainClient {
    chain_id: ChainId,
    application_id: ApplicationId,
    endpoints: Endpoints,
    http: HttpTransport,
    ws_config: WsConfig,
    /// Shared subscription socket, opened on first subscribe.
    ws: Arc<Mutex<Option<WsClient>>>,
    /// Response cache: payload cache key → (response, fetched_at)
    cache: Arc<RwLock<HashMap<String, (Response, Instant)>>>,
    cache_ttl: Duration,
}

impl ChainClient {
    /// Construct a client for an application on a local node.
    ///
    /// Pure construction: no connection is opened until the first request,
    /// and the WebSocket not until the first subscription. Every call yields
    /// an independent client.
    pub fn new(
        chain_id: impl Into<ChainId>,
        application_id: impl Into<ApplicationId>,
        port: &str,
    ) -> Self {
        Self::builder(chain_id, application_id, port).build()
    }

    /// A builder for non-default host, cache TTL, or WebSocket tuning.
    pub fn builder(
        chain_id: impl Into<ChainId>,
        application_id: impl Into<ApplicationId>,
        port: &str,
    ) -> ChainClientBuilder {
        ChainClientBuilder {
            host: DEFAULT_HOST.to_string(),
            chain_id: chain_id.into(),
            application_id: application_id.into(),
            port: port.to_string(),
            cache_ttl: Duration::from_secs(60),
            ws_reconnect: true,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    /// The derived endpoint URLs this client is bound to.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Issue a query, serving repeats from the response cache within the TTL.
    ///
    /// Only successful (error-free) responses are cached.
    pub async fn query(&self, operation: impl Into<Operation>) -> Result<Response, ClientError> {
        let payload = operation.into().payload();
        let key = payload.cache_key();

        if let Some((resp, fetched_at)) = self.cache.read().await.get(&key) {
            if fetched_at.elapsed() < self.cache_ttl {
                tracing::debug!(key = %payload.query, "query served from cache");
                return Ok(resp.clone());
            }
        }

        let policy = RetryPolicy::for_document(&payload.query);
        let resp = self.http.execute(&payload, policy).await?;
        if resp.is_ok() {
            self.cache
                .write()
                .await
                .insert(key, (resp.clone(), Instant::now()));
        }
        Ok(resp)
    }

    /// Issue a query and extract its data, turning execution errors into `Err`.
    pub async fn query_data(
        &self,
        operation: impl Into<Operation>,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        self.query(operation)
            .await?
            .into_data()
            .map_err(ClientError::from)
    }

    /// Issue a query, bypassing the response cache.
    pub async fn query_uncached(
        &self,
        operation: impl Into<Operation>,
    ) -> Result<Response, ClientError> {
        let payload = operation.into().payload();
        let policy = RetryPolicy::for_document(&payload.query);
        Ok(self.http.execute(&payload, policy).await?)
    }

    /// Issue a mutation. Never retried, never cached; a successful mutation
    /// invalidates the response cache.
    pub async fn mutate(&self, operation: impl Into<Operation>) -> Result<Response, ClientError> {
        let payload = operation.into().payload();
        let resp = self.http.execute(&payload, RetryPolicy::None).await?;
        if resp.is_ok() {
            self.cache.write().await.clear();
        }
        Ok(resp)
    }

    /// Open a subscription.
    ///
    /// The shared WebSocket is connected on the first call; later calls are
    /// multiplexed over it. The returned handle streams events and
    /// unsubscribes on drop.
    pub async fn subscribe(
        &self,
        operation: impl Into<Operation>,
    ) -> Result<Subscription, ClientError> {
        let operation = operation.into();
        let mut guard = self.ws.lock().await;

        let ws = match guard.as_mut() {
            Some(ws) => ws,
            None => {
                let mut ws = WsClient::new(self.ws_config.clone());
                ws.connect().await.map_err(ClientError::Ws)?;
                guard.insert(ws)
            }
        };

        Ok(ws.subscribe(&operation)?)
    }

    /// Drop all cached responses.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

impl Clone for ChainClient {
    fn clone(&self) -> Self {
        Self {
            chain_id: self.chain_id.clone(),
            application_id: self.application_id.clone(),
            endpoints: self.endpoints.clone(),
            http: self.http.clone(),
            ws_config: self.ws_config.clone(),
            ws: self.ws.clone(),
            cache: self.cache.clone(),
            cache_ttl: self.cache_ttl,
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct ChainClientBuilder {
    host: String,
    chain_id: ChainId,
    application_id: ApplicationId,
    port: String,
    cache_ttl: Duration,
    ws_reconnect: bool,
}

impl ChainClientBuilder {
    /// Target a node on a non-localhost host.
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// How long query responses stay fresh in the cache.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Disable automatic WebSocket reconnection.
    pub fn ws_reconnect(mut self, reconnect: bool) -> Self {
        self.ws_reconnect = reconnect;
        self
    }

    pub fn build(self) -> ChainClient {
        let endpoints = Endpoints::new(
            &self.host,
            &self.chain_id,
            &self.application_id,
            &self.port,
        );
        let http = HttpTransport::new(&endpoints.http_url);
        let ws_config = WsConfig {
            reconnect: self.ws_reconnect,
            ..WsConfig::new(endpoints.ws_url.clone())
        };

        ChainClient {
            chain_id: self.chain_id,
            application_id: self.application_id,
            endpoints,
            http,
            ws_config,
            ws: Arc::new(Mutex::new(None)),
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: self.cache_ttl,
        }
    }
}
