//! Shared JSON-over-HTTP plumbing for collaborator adapters

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use core_kernel::PortError;
use crate::ports::CallContext;

/// Header carrying the claim id across services
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Builds the client shared by all adapters
pub fn build_client(connect_timeout: Duration) -> Result<Client, PortError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(format!("claims-orchestrator/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PortError::internal(format!("Failed to create HTTP client: {}", e)))
}

/// A collaborator base URL
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl HttpEndpoint {
    pub fn new(client: Client, base_url: impl Into<String>, service: &'static str) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            service,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Joins `path` onto the base URL; an empty path addresses the base itself
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path.trim_start_matches('/'))
        }
    }

    /// POSTs `body` as JSON and decodes the JSON answer
    ///
    /// The request is bounded by `ctx.timeout` and abandoned when `ctx.cancel` fires.
    pub async fn post_json<B, R>(&self, path: &str, body: &B, ctx: &CallContext) -> Result<R, PortError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let mut request = self.client.post(&url).timeout(ctx.timeout).json(body);
        if let Some(correlation_id) = &ctx.metadata.correlation_id {
            request = request.header(CORRELATION_HEADER, correlation_id);
        }

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| map_transport_error(self.service, ctx.timeout, e))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let body = response.text().await.unwrap_or_default();
                warn!(service = self.service, url = %url, status = %status, "Collaborator returned an error");
                return Err(map_status(self.service, &url, status, retry_after, &body));
            }

            let decoded = response.json::<R>().await.map_err(|e| {
                PortError::transformation(format!("Failed to decode {} response: {}", self.service, e))
            })?;
            debug!(service = self.service, url = %url, "Collaborator call succeeded");
            Ok(decoded)
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(PortError::cancelled(self.service)),
            result = exchange => result,
        }
    }
}

/// Maps a failure to reach the collaborator
pub fn map_transport_error(service: &str, timeout: Duration, err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::timeout(service, timeout.as_millis() as u64)
    } else if err.is_connect() {
        PortError::Connection {
            message: format!("Failed to connect to {}", service),
            source: Some(Box::new(err)),
        }
    } else if err.is_decode() {
        PortError::transformation(format!("Failed to decode {} response: {}", service, err))
    } else {
        PortError::Internal {
            message: format!("{} request failed", service),
            source: Some(Box::new(err)),
        }
    }
}

/// Maps a non-success HTTP status
pub fn map_status(
    service: &str,
    url: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> PortError {
    match status {
        StatusCode::NOT_FOUND => PortError::not_found(service, url),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("{} answered {}", service, status),
        },
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(0),
        },
        s if s.is_server_error() => PortError::unavailable(service),
        s => PortError::internal(format!("{} answered {}: {}", service, s, body)),
    }
}
