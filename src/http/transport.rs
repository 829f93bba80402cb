//! Low-level HTTP transport — `HttpTransport`.
//!
//! Posts adapted operation payloads to the scoped application endpoint and
//! decodes execution results. Failures are surfaced as `HttpError` without
//! translation; the retry loop only re-issues requests the policy marks
//! retryable.

use crate::error::HttpError;
use crate::graphql::{OperationPayload, Response};
use crate::http::retry::{RetryConfig, RetryPolicy};

use reqwest::Client;
use std::time::Duration;

/// HTTP transport bound to one application endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    /// Build a transport for the given endpoint URL.
    ///
    /// No connection is opened until the first request.
    pub fn new(endpoint: &str) -> Self {
        let builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10);

        Self {
            endpoint: endpoint.to_string(),
            client: builder.build().expect("Failed to build HTTP client"),
        }
    }

    /// The endpoint URL this transport posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute one GraphQL operation over HTTP.
    pub async fn execute(
        &self,
        payload: &OperationPayload,
        retry: RetryPolicy,
    ) -> Result<Response, HttpError> {
        let config = match &retry {
            RetryPolicy::None => {
                return self.do_request(payload).await;
            }
            RetryPolicy::Idempotent => RetryConfig::idempotent(),
            RetryPolicy::Custom(c) => c.clone(),
        };

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            match self.do_request(payload).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let should_retry = match &e {
                        HttpError::ServerError { status, .. } => {
                            config.retryable_statuses.contains(status)
                        }
                        HttpError::RateLimited { retry_after_ms } => {
                            if let Some(ms) = retry_after_ms {
                                tokio::time::sleep(Duration::from_millis(*ms)).await;
                            }
                            config.retryable_statuses.contains(&429)
                        }
                        HttpError::Reqwest(re) => {
                            re.is_connect() || re.is_timeout() || re.is_request()
                        }
                        _ => false,
                    };

                    if should_retry && attempt < config.max_retries {
                        let delay = config.delay_for_attempt(attempt);
                        tracing::debug!(
                            attempt = attempt + 1,
                            max = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request to {}",
                            self.endpoint
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(HttpError::MaxRetriesExceeded {
            attempts: config.max_retries + 1,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn do_request(&self, payload: &OperationPayload) -> Result<Response, HttpError> {
        let resp = self.client.post(&self.endpoint).json(payload).send().await?;
        let status = resp.status();

        if status.is_success() {
            let parsed = resp.json::<Response>().await?;
            return Ok(parsed);
        }

        let status_code = status.as_u16();
        let body_text = resp.text().await.unwrap_or_default();

        match status_code {
            401 => Err(HttpError::Unauthorized),
            404 => Err(HttpError::NotFound(body_text)),
            429 => Err(HttpError::RateLimited {
                retry_after_ms: None,
            }),
            400..=499 => Err(HttpError::BadRequest(body_text)),
            _ => Err(HttpError::ServerError {
                status: status_code,
                body: body_text,
            }),
        }
    }
}
